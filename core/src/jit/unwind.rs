//! Exception handlers and the non-local control checks around calls.

use crate::bytecode::UnwindKind;
use crate::ir::{BlockId, IcmpPred, Operand, Ty};
use crate::rt::{RuntimeHelper, value};

use super::error::{JitError, JitResult};
use super::translator::Translator;

/// Handler entry blocks opened by `setup_unwind`, innermost last.
#[derive(Debug, Default)]
pub(crate) struct HandlerStack {
    entries: Vec<BlockId>,
}

impl HandlerStack {
    pub(crate) fn push(&mut self, entry: BlockId) {
        self.entries.push(entry);
    }

    pub(crate) fn pop(&mut self) -> Option<BlockId> {
        self.entries.pop()
    }

    pub(crate) fn top(&self) -> Option<BlockId> {
        self.entries.last().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Translator<'_> {
    /// Where a known pending raise goes.
    fn exception_target(&self) -> BlockId {
        self.handlers.top().unwrap_or(self.gate.null_exit)
    }

    /// Where an unclassified unwind goes: the gate entry still has to ask
    /// whether it is a return aimed at this frame.
    fn unwind_target(&self) -> BlockId {
        self.handlers.top().unwrap_or(self.gate.entry)
    }

    fn is_null(&mut self, value: Operand) -> Operand {
        self.b
            .icmp(IcmpPred::Eq, value, Operand::word(value::NULL), "is_null")
            .into()
    }

    /// Branch to the active handler when `value` is null, else continue in a
    /// fresh block.
    pub(crate) fn check_for_exception(&mut self, value: Operand) {
        let cont = self.b.new_block("continue");
        self.check_for_exception_then(value, cont);
        self.switch_to(cont);
    }

    pub(crate) fn check_for_exception_then(&mut self, value: Operand, cont: BlockId) {
        let is_null = self.is_null(value);
        let target = self.exception_target();
        self.cond_branch(is_null, target, cont);
    }

    /// Check the result of a call that may deliver a block `break`.
    ///
    /// Null either means a break aimed at this frame, whose value is claimed
    /// and used as the result, or an unwind that is handed to the active
    /// handler. Returns the merged result.
    pub(crate) fn check_for_return(&mut self, value: Operand) -> Operand {
        let is_break = self.b.new_block("is_break");
        let push_break_val = self.b.new_block("push_break_val");
        let normal = self.b.new_block("normal_cont");
        let next = self.b.new_block("next");

        let is_null = self.is_null(value);
        self.cond_branch(is_null, is_break, normal);

        self.switch_to(is_break);
        let vm = self.vm();
        let frame = self.call_frame();
        let break_here = self.b.call(RuntimeHelper::BreakToHere, vec![vm, frame], "bth");
        let unwind = self.unwind_target();
        self.cond_branch(break_here.into(), push_break_val, unwind);

        self.switch_to(push_break_val);
        let carried = self.b.call(RuntimeHelper::ClearRaiseValue, vec![vm], "crv");
        self.branch(next);

        self.switch_to(normal);
        self.branch(next);

        self.switch_to(next);
        self.b
            .phi(
                Ty::I64,
                vec![(value, normal), (carried.into(), push_break_val)],
                "break_val",
            )
            .into()
    }

    /// Unconditionally continue unwinding; nothing after this is reachable.
    pub(crate) fn propagate_exception(&mut self) {
        let target = self.unwind_target();
        self.branch(target);
        self.mark_dead();
    }

    pub(crate) fn setup_unwind(&mut self, target: usize, kind: UnwindKind) -> JitResult<()> {
        let handler = self.blocks.edge(target, self.stack.depth())?;
        let entry = match kind {
            UnwindKind::Rescue => {
                // Re-entered while unwinding: only take the rescue if a raise
                // is in flight, else keep going outwards.
                let check = self.b.new_block("is_exception");
                let outer = self.unwind_target();
                let here = self.b.current();
                self.b.set_block(check);
                let vm = self.vm();
                let raising = self.b.call(RuntimeHelper::RaisingException, vec![vm], "rae");
                self.b.cond_br(raising.into(), handler, outer);
                self.b.set_block(here);
                check
            }
            UnwindKind::Ensure => handler,
        };
        self.handlers.push(entry);
        Ok(())
    }

    pub(crate) fn pop_unwind(&mut self) -> JitResult<()> {
        self.handlers
            .pop()
            .map(|_| ())
            .ok_or(JitError::HandlerUnderflow { ip: self.ip })
    }
}
