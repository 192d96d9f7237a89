//! The shared exit path of a translated method.

use crate::ir::{BlockId, IrBuilder, Operand, Param, ValueId};
use crate::rt::{RuntimeHelper, value};

/// Where a method's result goes.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ExitTarget {
    /// Return it from the function.
    Return,
    /// Feed `phi` in the caller's `merge` block; the body is being inlined.
    Inline { phi: ValueId, merge: BlockId },
}

impl ExitTarget {
    /// Terminate the current block by handing `value` to the exit.
    pub(crate) fn deliver(&self, b: &mut IrBuilder, value: Operand) {
        match *self {
            ExitTarget::Return => b.ret(value),
            ExitTarget::Inline { phi, merge } => {
                let from = b.current();
                b.add_incoming(phi, value, from);
                b.br(merge);
            }
        }
    }

    pub(crate) fn is_inline(&self) -> bool {
        matches!(self, ExitTarget::Inline { .. })
    }
}

/// One pair of exits per translated body.
///
/// `entry` asks the runtime whether a non-local return targets this frame:
/// if so its value is claimed and delivered, otherwise the body exits with
/// null so the interpreter takes over. `null_exit` skips the question and is
/// used when a raise is already known to be pending.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EscapeGate {
    pub(crate) entry: BlockId,
    pub(crate) null_exit: BlockId,
}

impl EscapeGate {
    /// Build the gate blocks. The insertion point is left where it was.
    /// `flush_scope` is the variable scope to publish to the heap before a
    /// top-level exit, if the method's scope may outlive it.
    pub(crate) fn install(b: &mut IrBuilder, exit: ExitTarget, flush_scope: Option<Operand>) -> Self {
        let here = b.current();
        let entry = b.new_block("bail_out");
        let raise_value = b.new_block("ret_raise_val");
        let null_exit = b.new_block("ret_null");
        let vm = Operand::Param(Param::Vm);

        b.set_block(entry);
        let pending = b.call(
            RuntimeHelper::ReturnToHere,
            vec![vm, Operand::Param(Param::CallFrame)],
            "rth",
        );
        b.cond_br(pending.into(), raise_value, null_exit);

        b.set_block(raise_value);
        let carried = b.call(RuntimeHelper::ClearRaiseValue, vec![vm], "crv");
        if let Some(scope) = flush_scope {
            b.call_void(RuntimeHelper::FlushScope, vec![vm, scope]);
        }
        exit.deliver(b, carried.into());

        b.set_block(null_exit);
        if let Some(scope) = flush_scope {
            b.call_void(RuntimeHelper::FlushScope, vec![vm, scope]);
        }
        exit.deliver(b, Operand::word(value::NULL));

        b.set_block(here);
        Self { entry, null_exit }
    }
}
