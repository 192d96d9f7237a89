//! Call sites: the argument record, cache dispatch and the helper-based
//! send shapes.

use crate::ir::{Operand, Ty};
use crate::rt::layout::{args as out, inline_cache};
use crate::rt::{InlineCache, RuntimeHelper, value};

use super::error::JitResult;
use super::translator::Translator;

impl Translator<'_> {
    fn setup_out_args(&mut self, recv: Operand, block: Operand, count: usize, arguments: Operand) {
        let record = self.out_args;
        self.b.store_field(recv, record, out::RECV);
        self.b.store_field(block, record, out::BLOCK);
        self.b.store_field(Operand::word(count as i64), record, out::TOTAL);
        self.b.store_field(arguments, record, out::ARGUMENTS);
        self.b.store_field(Operand::null(), record, out::ARRAY);
    }

    fn send_done(&mut self) {
        self.sends_done += 1;
        self.allow_private = false;
    }

    /// Call through the cache's execute pointer. The pointer is read when the
    /// call runs, so the runtime can retarget the site at any time.
    fn inline_cache_send(&mut self, cache: &InlineCache) -> Operand {
        let record = Operand::address(cache.address());
        let execute = self
            .b
            .load_field(Ty::Ptr, record, inline_cache::EXECUTE, "execute");
        let call_args = vec![self.vm(), record, self.call_frame(), self.out_args];
        let result = self.b.call_indirect(execute.into(), Ty::I64, call_args, "ic_send");
        self.send_done();
        result.into()
    }

    /// `send` with `args` arguments above the receiver and no block.
    pub(super) fn send_stack(&mut self, cache_index: u32, args: usize) -> JitResult<()> {
        let cache = self.cache(cache_index)?;
        if self.try_inline(&cache, args)? {
            return Ok(());
        }

        let recv = self.back(args)?;
        let arguments = if args > 0 { self.objects(args)? } else { Operand::null() };
        self.setup_out_args(recv, Operand::word(value::Q_NIL), args, arguments);
        self.reset_sp();
        let result = self.inline_cache_send(&cache);
        self.remove(args + 1)?;
        self.check_for_exception(result);
        self.push(result)
    }

    /// Receiver, `args` arguments, then the block on top.
    pub(super) fn send_stack_with_block(&mut self, cache_index: u32, args: usize) -> JitResult<()> {
        let cache = self.cache(cache_index)?;
        let recv = self.back(args + 1)?;
        let block = self.top()?;
        let arguments = self.objects(args + 1)?;
        self.setup_out_args(recv, block, args, arguments);
        let result = self.inline_cache_send(&cache);
        self.remove(args + 2)?;
        let result = self.check_for_return(result);
        self.push(result)
    }

    /// Receiver, `args` arguments, the splat array and the block.
    pub(super) fn send_stack_with_splat(&mut self, cache_index: u32, args: usize) -> JitResult<()> {
        let cache = self.cache(cache_index)?;
        let helper = if self.allow_private {
            RuntimeHelper::SplatSendPrivate
        } else {
            RuntimeHelper::SplatSend
        };
        let values = self.objects(args + 3)?;
        let call_args = vec![
            self.vm(),
            self.call_frame(),
            Operand::word(cache.name().word()),
            Operand::word(args as i64),
            values,
        ];
        let result = self.b.call(helper, call_args, "splat_send");
        self.send_done();
        self.remove(args + 3)?;
        self.check_for_exception(result.into());
        self.push(result)
    }

    /// `super` with `args` arguments and a block; the receiver is implicit.
    pub(super) fn send_super_with_block(&mut self, cache_index: u32, args: usize) -> JitResult<()> {
        let cache = self.cache(cache_index)?;
        let values = self.objects(args + 1)?;
        let call_args = vec![
            self.vm(),
            self.call_frame(),
            Operand::word(cache.name().word()),
            Operand::word(args as i64),
            values,
        ];
        let result = self.b.call(RuntimeHelper::SuperSend, call_args, "super_send");
        self.send_done();
        self.remove(args + 1)?;
        let result = self.check_for_return(result.into());
        self.push(result)
    }

    pub(super) fn send_super_with_splat(&mut self, cache_index: u32, args: usize) -> JitResult<()> {
        let cache = self.cache(cache_index)?;
        let values = self.objects(args + 2)?;
        let call_args = vec![
            self.vm(),
            self.call_frame(),
            Operand::word(cache.name().word()),
            Operand::word(args as i64),
            values,
        ];
        let result = self.b.call(RuntimeHelper::SuperSplatSend, call_args, "super_send");
        self.send_done();
        self.remove(args + 2)?;
        self.check_for_exception(result.into());
        self.push(result)
    }

    /// Uncached dispatch of `name` to the receiver `args` positions below the
    /// top. Leaves the stack alone.
    pub(super) fn simple_send(&mut self, name: i64, args: usize) -> JitResult<Operand> {
        let values = self.objects(args + 1)?;
        let call_args = vec![
            self.vm(),
            self.call_frame(),
            Operand::word(name),
            Operand::word(args as i64),
            values,
        ];
        let result = self.b.call(RuntimeHelper::SimpleSend, call_args, "simple_send");
        self.send_done();
        Ok(result.into())
    }

    /// `call` on a proc-like receiver with `count` arguments.
    pub(super) fn meta_send_call(&mut self, count: usize) -> JitResult<()> {
        let values = self.objects(count + 1)?;
        let call_args = vec![self.vm(), self.call_frame(), Operand::int32(count as i64), values];
        let result = self.b.call(RuntimeHelper::MetaSendCall, call_args, "meta_call");
        self.send_done();
        self.remove(count + 1)?;
        self.check_for_exception(result.into());
        self.push(result)
    }
}
