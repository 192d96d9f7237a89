use crate::bytecode::Literal;
use crate::ir::{IcmpPred, Operand, Ty};
use crate::rt::RuntimeHelper;
use crate::rt::layout::global_cache;

use super::error::JitResult;
use super::translator::Translator;

impl Translator<'_> {
    /// Constant lookup through a global cache entry.
    ///
    /// The entry's value is used without a call while its recorded serial
    /// equals the process-wide one; any constant redefinition bumps the
    /// global serial and sends the lookup back to the runtime.
    pub(super) fn push_const_fast(&mut self, name: u32, cache: u32) -> JitResult<()> {
        let sym = self.symbol(name)?;
        let Literal::GlobalCache(entry) = self.literal(cache)? else {
            let result = self.lookup_const(sym, cache);
            self.check_for_exception(result);
            return self.push(result);
        };

        let use_cache = self.b.new_block("use_cache");
        let use_call = self.b.new_block("use_call");
        let cont = self.b.new_block("const_cont");

        let record = Operand::address(entry.address());
        let global = self
            .b
            .load(Ty::I64, Operand::address(entry.global().address()), "global_serial");
        let serial = self
            .b
            .load_field(Ty::I64, record, global_cache::SERIAL, "serial");
        let current = self
            .b
            .icmp(IcmpPred::Eq, global.into(), serial.into(), "serial_current");
        self.cond_branch(current.into(), use_cache, use_call);

        self.switch_to(use_cache);
        let cached = self
            .b
            .load_field(Ty::I64, record, global_cache::VALUE, "cached_const");
        let cached_from = self.b.current();
        self.branch(cont);

        self.switch_to(use_call);
        let looked_up = self.lookup_const(sym, cache);
        self.check_for_exception_then(looked_up, cont);
        let call_from = self.b.current();

        self.switch_to(cont);
        let result = self.b.phi(
            Ty::I64,
            vec![(cached.into(), cached_from), (looked_up, call_from)],
            "constant",
        );
        self.push(result)
    }

    fn lookup_const(&mut self, sym: Operand, cache: u32) -> Operand {
        self.reset_sp();
        let call_args = vec![self.vm(), self.call_frame(), sym, Operand::int32(cache as i64)];
        self.b
            .call(RuntimeHelper::PushConstFast, call_args, "const_fast")
            .into()
    }
}
