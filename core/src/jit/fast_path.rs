//! Inline versions of the operator sends the interpreter special-cases.
//!
//! Each operator checks the tags of its two operands. When they allow it the
//! result is computed on the words directly; otherwise, or when a fixnum
//! result would overflow, the operator is sent like any other method. Both
//! paths meet in a phi.

use crate::ir::{BinaryOp, BlockId, CastOp, IcmpPred, Intrinsic, Operand, Ty};
use crate::rt::{intern, value};

use super::error::JitResult;
use super::translator::Translator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FastOp {
    Equal,
    Tequal,
    Lt,
    Gt,
    Plus,
    Minus,
}

impl FastOp {
    pub(crate) fn selector(self) -> &'static str {
        match self {
            FastOp::Equal => "==",
            FastOp::Tequal => "===",
            FastOp::Lt => "<",
            FastOp::Gt => ">",
            FastOp::Plus => "+",
            FastOp::Minus => "-",
        }
    }
}

impl Translator<'_> {
    pub(super) fn fast_op(&mut self, op: FastOp) -> JitResult<()> {
        let recv = self.back(1)?;
        let arg = self.back(0)?;
        let dispatch = self.b.new_block("dispatch");
        let fast = self.b.new_block("fast");
        let cont = self.b.new_block("cont");

        match op {
            FastOp::Equal | FastOp::Tequal => self.branch_unless_immediates(recv, arg, fast, dispatch),
            _ => self.branch_unless_fixnums(recv, arg, fast, dispatch),
        }

        self.switch_to(fast);
        let fast_result = match op {
            FastOp::Equal | FastOp::Tequal => self.compare(IcmpPred::Eq, recv, arg),
            FastOp::Lt => self.compare(IcmpPred::Slt, recv, arg),
            FastOp::Gt => self.compare(IcmpPred::Sgt, recv, arg),
            FastOp::Plus => self.checked_arith(Intrinsic::SAddWithOverflow, recv, arg, dispatch),
            FastOp::Minus => self.checked_arith(Intrinsic::SSubWithOverflow, recv, arg, dispatch),
        };
        let fast_from = self.b.current();
        self.branch(cont);

        self.switch_to(dispatch);
        let sent = self.simple_send(intern(op.selector()).word(), 1)?;
        self.check_for_exception_then(sent, cont);
        let sent_from = self.b.current();

        self.switch_to(cont);
        let result = self.b.phi(
            Ty::I64,
            vec![(fast_result, fast_from), (sent, sent_from)],
            "fast_result",
        );
        self.remove(2)?;
        self.push(result)
    }

    fn is_reference(&mut self, word: Operand) -> Operand {
        let tag = self
            .b
            .binary(BinaryOp::And, word, Operand::word(value::TAG_REF_MASK), "ref_tag");
        self.b
            .icmp(IcmpPred::Eq, tag.into(), Operand::word(value::TAG_REF), "is_ref")
            .into()
    }

    /// Equality on immediates is identity; references need a real send.
    fn branch_unless_immediates(&mut self, recv: Operand, arg: Operand, fast: BlockId, dispatch: BlockId) {
        let check_arg = self.b.new_block("check_ref");
        let recv_ref = self.is_reference(recv);
        self.cond_branch(recv_ref, dispatch, check_arg);

        self.switch_to(check_arg);
        let arg_ref = self.is_reference(arg);
        self.cond_branch(arg_ref, dispatch, fast);
    }

    fn branch_unless_fixnums(&mut self, recv: Operand, arg: Operand, fast: BlockId, dispatch: BlockId) {
        let both = self.b.binary(BinaryOp::And, recv, arg, "both");
        let tag = self
            .b
            .binary(BinaryOp::And, both.into(), Operand::word(value::TAG_FIXNUM_MASK), "fixnum_tag");
        let fixnums = self
            .b
            .icmp(IcmpPred::Eq, tag.into(), Operand::word(value::TAG_FIXNUM), "both_fixnums");
        self.cond_branch(fixnums.into(), fast, dispatch);
    }

    /// Tagged fixnums order like their payloads, so the words compare as is.
    fn compare(&mut self, pred: IcmpPred, recv: Operand, arg: Operand) -> Operand {
        let cmp = self.b.icmp(pred, recv, arg, "cmp");
        self.b
            .select(
                cmp.into(),
                Operand::word(value::Q_TRUE),
                Operand::word(value::Q_FALSE),
                "cmp_bool",
            )
            .into()
    }

    fn untag(&mut self, word: Operand) -> Operand {
        let shifted = self.b.binary(
            BinaryOp::AShr,
            word,
            Operand::word(value::TAG_FIXNUM_SHIFT as i64),
            "untagged",
        );
        self.b.cast(CastOp::Trunc, shifted.into(), Ty::I63, "payload").into()
    }

    /// Add or subtract two fixnum payloads. Overflow leaves for `dispatch`;
    /// otherwise the tagged result is produced in a fresh block.
    fn checked_arith(&mut self, intrinsic: Intrinsic, recv: Operand, arg: Operand, dispatch: BlockId) -> Operand {
        let lhs = self.untag(recv);
        let rhs = self.untag(arg);
        let checked = self.b.overflow(intrinsic, lhs, rhs, "checked");
        let sum = self.b.extract(checked.into(), 0, "sum");
        let overflowed = self.b.extract(checked.into(), 1, "overflowed");
        let tag_now = self.b.new_block("tagnow");
        self.cond_branch(overflowed.into(), dispatch, tag_now);

        self.switch_to(tag_now);
        let wide = self.b.cast(CastOp::SExt, sum.into(), Ty::I64, "wide");
        let shifted = self.b.binary(
            BinaryOp::Shl,
            wide.into(),
            Operand::word(value::TAG_FIXNUM_SHIFT as i64),
            "shifted",
        );
        self.b
            .binary(BinaryOp::Or, shifted.into(), Operand::word(value::TAG_FIXNUM), "tagged")
            .into()
    }
}
