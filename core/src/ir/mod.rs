//! Low-level IR produced by the translator.
//!
//! The model mirrors the subset of LLVM IR the JIT emits: a function is an
//! arena of basic blocks, each a list of instructions in SSA form followed by
//! one terminator. Object words are `i64`, runtime records are opaque `ptr`s
//! addressed in word-sized steps. [`printer`] renders a function as textual
//! LLVM IR and [`eval`] executes it against a [`eval::Runtime`].

mod builder;
pub mod eval;
pub mod printer;

use std::collections::BTreeSet;

use serde::Serialize;

use crate::rt::RuntimeHelper;

pub use builder::IrBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ValueId(u32);

impl ValueId {
    fn new(raw: usize) -> Self {
        Self(raw as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockId(u32);

impl BlockId {
    const ENTRY: BlockId = BlockId(0);

    pub const fn entry() -> Self {
        BlockId::ENTRY
    }

    fn new(raw: usize) -> Self {
        Self(raw as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ty {
    Void,
    I1,
    I32,
    /// Untagged fixnum payload.
    I63,
    I64,
    Ptr,
    /// `{ i63, i1 }` result of a checked arithmetic intrinsic.
    Overflow,
}

impl Ty {
    pub fn llvm(self) -> &'static str {
        match self {
            Ty::Void => "void",
            Ty::I1 => "i1",
            Ty::I32 => "i32",
            Ty::I63 => "i63",
            Ty::I64 => "i64",
            Ty::Ptr => "ptr",
            Ty::Overflow => "{ i63, i1 }",
        }
    }
}

/// Incoming parameters of every compiled function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Param {
    Vm,
    CallFrame,
    Args,
}

impl Param {
    pub const ALL: [Param; 3] = [Param::Vm, Param::CallFrame, Param::Args];

    pub fn name(self) -> &'static str {
        match self {
            Param::Vm => "vm",
            Param::CallFrame => "call_frame",
            Param::Args => "args",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Param::Vm => 0,
            Param::CallFrame => 1,
            Param::Args => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Value(ValueId),
    Param(Param),
    /// Typed constant. A `Ptr` constant is an absolute address baked into
    /// the code (zero prints as `null`).
    Const(Ty, i64),
}

impl Operand {
    pub fn word(value: i64) -> Self {
        Operand::Const(Ty::I64, value)
    }

    pub fn int32(value: i64) -> Self {
        Operand::Const(Ty::I32, value)
    }

    pub fn address(addr: u64) -> Self {
        Operand::Const(Ty::Ptr, addr as i64)
    }

    pub fn null() -> Self {
        Operand::Const(Ty::Ptr, 0)
    }
}

impl From<ValueId> for Operand {
    fn from(value: ValueId) -> Self {
        Operand::Value(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Shl,
    AShr,
}

impl BinaryOp {
    pub fn llvm(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::AShr => "ashr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IcmpPred {
    Eq,
    Ne,
    Slt,
    Sgt,
}

impl IcmpPred {
    pub fn llvm(self) -> &'static str {
        match self {
            IcmpPred::Eq => "eq",
            IcmpPred::Ne => "ne",
            IcmpPred::Slt => "slt",
            IcmpPred::Sgt => "sgt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CastOp {
    Trunc,
    SExt,
    /// Reinterpret a reference word as the address it holds.
    IntToPtr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intrinsic {
    SAddWithOverflow,
    SSubWithOverflow,
}

impl Intrinsic {
    pub fn symbol(self) -> &'static str {
        match self {
            Intrinsic::SAddWithOverflow => "llvm.sadd.with.overflow.i63",
            Intrinsic::SSubWithOverflow => "llvm.ssub.with.overflow.i63",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Callee {
    Helper(RuntimeHelper),
    /// Call through a function pointer loaded at run time.
    Indirect(Operand),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstKind {
    /// `count` stack words in the entry block.
    Alloca { count: u32 },
    /// Address of word `offset` of `base`.
    ElementPtr { base: Operand, offset: i64 },
    Load { ty: Ty, ptr: Operand },
    Store { value: Operand, ptr: Operand },
    Binary { op: BinaryOp, lhs: Operand, rhs: Operand },
    Icmp { pred: IcmpPred, lhs: Operand, rhs: Operand },
    Select { cond: Operand, then_value: Operand, else_value: Operand },
    Cast { op: CastOp, value: Operand, to: Ty },
    Overflow { intrinsic: Intrinsic, lhs: Operand, rhs: Operand },
    Extract { aggregate: Operand, index: u32 },
    Call { callee: Callee, ret: Ty, args: Vec<Operand> },
    Phi { ty: Ty, incoming: Vec<(Operand, BlockId)> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inst {
    pub result: Option<ValueId>,
    pub kind: InstKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Terminator {
    Br { target: BlockId },
    CondBr { cond: Operand, then_block: BlockId, else_block: BlockId },
    Ret { value: Operand },
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Br { target } => vec![*target],
            Terminator::CondBr {
                then_block, else_block, ..
            } => vec![*then_block, *else_block],
            Terminator::Ret { .. } | Terminator::Unreachable => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub id: BlockId,
    pub label: String,
    pub insts: Vec<Inst>,
    pub terminator: Option<Terminator>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueInfo {
    pub ty: Ty,
    pub hint: &'static str,
}

/// A translated method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub name: String,
    pub blocks: Vec<Block>,
    /// Emission order of `blocks`; the entry block is always first.
    pub layout: Vec<BlockId>,
    pub values: Vec<ValueInfo>,
    pub helpers: BTreeSet<RuntimeHelper>,
    pub intrinsics: BTreeSet<Intrinsic>,
}

impl Function {
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    pub fn value_ty(&self, id: ValueId) -> Ty {
        self.values.get(id.index()).map(|info| info.ty).unwrap_or(Ty::Void)
    }

    pub fn operand_ty(&self, operand: &Operand) -> Ty {
        match operand {
            Operand::Value(id) => self.value_ty(*id),
            Operand::Param(_) => Ty::Ptr,
            Operand::Const(ty, _) => *ty,
        }
    }

    /// Blocks in emission order.
    pub fn ordered_blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.layout.iter().filter_map(|id| self.block(*id))
    }

    /// Number of call sites to `helper`.
    pub fn count_calls(&self, helper: RuntimeHelper) -> usize {
        self.blocks
            .iter()
            .flat_map(|block| block.insts.iter())
            .filter(|inst| {
                matches!(
                    &inst.kind,
                    InstKind::Call {
                        callee: Callee::Helper(h),
                        ..
                    } if *h == helper
                )
            })
            .count()
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
