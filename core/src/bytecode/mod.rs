//! Bytecode consumed by the translator.
//!
//! Instructions are addressed by their instruction pointer (ip), the word
//! offset of the opcode inside the method's code: an instruction occupies one
//! word for the opcode plus one per operand. Branch targets are ips.

mod method;

pub use method::{CompiledMethod, Literal};

use serde::{Deserialize, Serialize};

/// Kind of region protected by `setup_unwind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnwindKind {
    /// `rescue`: the handler only runs for raised exceptions.
    Rescue,
    /// `ensure`: the handler runs for every unwind.
    Ensure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    Noop,
    Pop,
    PushNil,
    PushTrue,
    PushFalse,
    PushInt { value: i64 },
    #[serde(rename = "meta_push_0")]
    MetaPush0,
    #[serde(rename = "meta_push_1")]
    MetaPush1,
    #[serde(rename = "meta_push_2")]
    MetaPush2,
    #[serde(rename = "meta_push_neg_1")]
    MetaPushNeg1,
    Ret,
    SwapStack,
    DupTop,
    Rotate { count: u32 },
    MoveDown { positions: u32 },
    MetaSendOpEqual,
    MetaSendOpTequal,
    MetaSendOpLt,
    MetaSendOpGt,
    MetaSendOpPlus,
    MetaSendOpMinus,
    PushLiteral { literal: u32 },
    StringDup,
    PushLocal { index: u32 },
    SetLocal { index: u32 },
    PushSelf,
    AllowPrivate,
    SetCallFlags { flags: u32 },
    SendStack { cache: u32, args: u32 },
    SendMethod { cache: u32 },
    CreateBlock { literal: u32 },
    SendStackWithBlock { cache: u32, args: u32 },
    SendStackWithSplat { cache: u32, args: u32 },
    CastArray,
    PushBlock,
    SendSuperStackWithBlock { cache: u32, args: u32 },
    SendSuperStackWithSplat { cache: u32, args: u32 },
    AddScope,
    PushConstFast { name: u32, cache: u32 },
    PushConst { name: u32 },
    SetConst { name: u32 },
    SetConstAt { name: u32 },
    SetLiteral { literal: u32 },
    PushVariables,
    PushScope,
    CastForSingleBlockArg,
    CastForMultiBlockArg,
    CastForSplatBlockArg,
    SetLocalDepth { depth: u32, index: u32 },
    PushLocalDepth { depth: u32, index: u32 },
    Goto { target: u32 },
    GotoIfTrue { target: u32 },
    GotoIfFalse { target: u32 },
    YieldStack { count: u32 },
    YieldSplat { count: u32 },
    CheckInterrupts,
    CheckSerial { cache: u32, serial: u32 },
    PushMyOffset { offset: u32 },
    SetupUnwind { target: u32, kind: UnwindKind },
    PopUnwind,
    Reraise,
    RaiseReturn,
    EnsureReturn,
    RaiseBreak,
    PushException,
    ClearException,
    PopException,
    FindConst { name: u32 },
    InstanceOf,
    KindOf,
    IsNil,
    MakeArray { count: u32 },
    MetaSendCall { count: u32 },
    PassedArg { index: u32 },
    PassedBlockarg { count: u32 },
    PushCpathTop,
    PushIvar { name: u32 },
    SetIvar { name: u32 },
    PushMyField { index: u32 },
    StoreMyField { index: u32 },
    ShiftArray,
    StringAppend,
}

impl Instruction {
    pub fn name(&self) -> &'static str {
        use Instruction::*;
        match self {
            Noop => "noop",
            Pop => "pop",
            PushNil => "push_nil",
            PushTrue => "push_true",
            PushFalse => "push_false",
            PushInt { .. } => "push_int",
            MetaPush0 => "meta_push_0",
            MetaPush1 => "meta_push_1",
            MetaPush2 => "meta_push_2",
            MetaPushNeg1 => "meta_push_neg_1",
            Ret => "ret",
            SwapStack => "swap_stack",
            DupTop => "dup_top",
            Rotate { .. } => "rotate",
            MoveDown { .. } => "move_down",
            MetaSendOpEqual => "meta_send_op_equal",
            MetaSendOpTequal => "meta_send_op_tequal",
            MetaSendOpLt => "meta_send_op_lt",
            MetaSendOpGt => "meta_send_op_gt",
            MetaSendOpPlus => "meta_send_op_plus",
            MetaSendOpMinus => "meta_send_op_minus",
            PushLiteral { .. } => "push_literal",
            StringDup => "string_dup",
            PushLocal { .. } => "push_local",
            SetLocal { .. } => "set_local",
            PushSelf => "push_self",
            AllowPrivate => "allow_private",
            SetCallFlags { .. } => "set_call_flags",
            SendStack { .. } => "send_stack",
            SendMethod { .. } => "send_method",
            CreateBlock { .. } => "create_block",
            SendStackWithBlock { .. } => "send_stack_with_block",
            SendStackWithSplat { .. } => "send_stack_with_splat",
            CastArray => "cast_array",
            PushBlock => "push_block",
            SendSuperStackWithBlock { .. } => "send_super_stack_with_block",
            SendSuperStackWithSplat { .. } => "send_super_stack_with_splat",
            AddScope => "add_scope",
            PushConstFast { .. } => "push_const_fast",
            PushConst { .. } => "push_const",
            SetConst { .. } => "set_const",
            SetConstAt { .. } => "set_const_at",
            SetLiteral { .. } => "set_literal",
            PushVariables => "push_variables",
            PushScope => "push_scope",
            CastForSingleBlockArg => "cast_for_single_block_arg",
            CastForMultiBlockArg => "cast_for_multi_block_arg",
            CastForSplatBlockArg => "cast_for_splat_block_arg",
            SetLocalDepth { .. } => "set_local_depth",
            PushLocalDepth { .. } => "push_local_depth",
            Goto { .. } => "goto",
            GotoIfTrue { .. } => "goto_if_true",
            GotoIfFalse { .. } => "goto_if_false",
            YieldStack { .. } => "yield_stack",
            YieldSplat { .. } => "yield_splat",
            CheckInterrupts => "check_interrupts",
            CheckSerial { .. } => "check_serial",
            PushMyOffset { .. } => "push_my_offset",
            SetupUnwind { .. } => "setup_unwind",
            PopUnwind => "pop_unwind",
            Reraise => "reraise",
            RaiseReturn => "raise_return",
            EnsureReturn => "ensure_return",
            RaiseBreak => "raise_break",
            PushException => "push_exception",
            ClearException => "clear_exception",
            PopException => "pop_exception",
            FindConst { .. } => "find_const",
            InstanceOf => "instance_of",
            KindOf => "kind_of",
            IsNil => "is_nil",
            MakeArray { .. } => "make_array",
            MetaSendCall { .. } => "meta_send_call",
            PassedArg { .. } => "passed_arg",
            PassedBlockarg { .. } => "passed_blockarg",
            PushCpathTop => "push_cpath_top",
            PushIvar { .. } => "push_ivar",
            SetIvar { .. } => "set_ivar",
            PushMyField { .. } => "push_my_field",
            StoreMyField { .. } => "store_my_field",
            ShiftArray => "shift_array",
            StringAppend => "string_append",
        }
    }

    pub fn operand_count(&self) -> usize {
        use Instruction::*;
        match self {
            SendStack { .. }
            | SendStackWithBlock { .. }
            | SendStackWithSplat { .. }
            | SendSuperStackWithBlock { .. }
            | SendSuperStackWithSplat { .. }
            | PushConstFast { .. }
            | SetLocalDepth { .. }
            | PushLocalDepth { .. }
            | CheckSerial { .. }
            | SetupUnwind { .. } => 2,
            PushInt { .. }
            | Rotate { .. }
            | MoveDown { .. }
            | PushLiteral { .. }
            | PushLocal { .. }
            | SetLocal { .. }
            | SetCallFlags { .. }
            | SendMethod { .. }
            | CreateBlock { .. }
            | PushConst { .. }
            | SetConst { .. }
            | SetConstAt { .. }
            | SetLiteral { .. }
            | Goto { .. }
            | GotoIfTrue { .. }
            | GotoIfFalse { .. }
            | YieldStack { .. }
            | YieldSplat { .. }
            | PushMyOffset { .. }
            | FindConst { .. }
            | MakeArray { .. }
            | MetaSendCall { .. }
            | PassedArg { .. }
            | PassedBlockarg { .. }
            | PushIvar { .. }
            | SetIvar { .. }
            | PushMyField { .. }
            | StoreMyField { .. } => 1,
            _ => 0,
        }
    }

    /// Width in code words.
    pub fn width(&self) -> usize {
        1 + self.operand_count()
    }

    /// Ips this instruction may transfer control to, besides falling through.
    pub fn branch_target(&self) -> Option<usize> {
        match self {
            Instruction::Goto { target }
            | Instruction::GotoIfTrue { target }
            | Instruction::GotoIfFalse { target }
            | Instruction::SetupUnwind { target, .. } => Some(*target as usize),
            _ => None,
        }
    }

    /// Values consumed from and pushed onto the operand stack, as `(pops, pushes)`.
    /// Instructions that read the top in place count it on both sides.
    pub fn stack_effect(&self) -> (usize, usize) {
        use Instruction::*;
        match *self {
            Noop | AllowPrivate | SetCallFlags { .. } | Goto { .. } | CheckInterrupts => (0, 0),
            SetupUnwind { .. } | PopUnwind | Reraise | ClearException => (0, 0),
            Pop | Ret | AddScope | PopException => (1, 0),
            GotoIfTrue { .. } | GotoIfFalse { .. } => (1, 0),
            PushNil | PushTrue | PushFalse | PushInt { .. } => (0, 1),
            MetaPush0 | MetaPush1 | MetaPush2 | MetaPushNeg1 => (0, 1),
            PushLiteral { .. } | PushLocal { .. } | PushSelf | PushBlock => (0, 1),
            CreateBlock { .. } | PushConstFast { .. } | PushConst { .. } => (0, 1),
            PushVariables | PushScope | PushLocalDepth { .. } | PushMyOffset { .. } => (0, 1),
            CastForSingleBlockArg | CastForMultiBlockArg | CastForSplatBlockArg => (0, 1),
            PushException | PassedArg { .. } | PassedBlockarg { .. } | PushCpathTop => (0, 1),
            PushIvar { .. } | PushMyField { .. } => (0, 1),
            StringDup | SetLocal { .. } | SendMethod { .. } | CastArray => (1, 1),
            SetConst { .. } | SetLiteral { .. } | SetLocalDepth { .. } | CheckSerial { .. } => (1, 1),
            RaiseReturn | EnsureReturn | RaiseBreak => (1, 1),
            FindConst { .. } | IsNil | SetIvar { .. } | StoreMyField { .. } => (1, 1),
            SwapStack => (2, 2),
            DupTop | ShiftArray => (1, 2),
            Rotate { count } => (count as usize, count as usize),
            MoveDown { positions } => (positions as usize + 1, positions as usize + 1),
            MetaSendOpEqual | MetaSendOpTequal | MetaSendOpLt | MetaSendOpGt => (2, 1),
            MetaSendOpPlus | MetaSendOpMinus => (2, 1),
            SetConstAt { .. } | InstanceOf | KindOf | StringAppend => (2, 1),
            SendStack { args, .. } | SendSuperStackWithBlock { args, .. } => (args as usize + 1, 1),
            SendStackWithBlock { args, .. } | SendSuperStackWithSplat { args, .. } => {
                (args as usize + 2, 1)
            }
            SendStackWithSplat { args, .. } => (args as usize + 3, 1),
            YieldStack { count } | MakeArray { count } => (count as usize, 1),
            YieldSplat { count } | MetaSendCall { count } => (count as usize + 1, 1),
        }
    }

    /// Control never falls through to the next instruction.
    pub fn ends_block(&self) -> bool {
        use Instruction::*;
        matches!(
            self,
            Goto { .. } | Ret | Reraise | RaiseReturn | EnsureReturn | RaiseBreak
        )
    }

    /// Whether the instruction's translation only touches state that is still
    /// correct when its method body is spliced into a caller's frame.
    pub fn is_inlinable(&self) -> bool {
        use Instruction::*;
        matches!(
            self,
            Pop | PushNil
                | PushTrue
                | PushFalse
                | PushInt { .. }
                | MetaPush0
                | MetaPush1
                | MetaPush2
                | MetaPushNeg1
                | Ret
                | SwapStack
                | DupTop
                | Rotate { .. }
                | MoveDown { .. }
                | MetaSendOpEqual
                | MetaSendOpTequal
                | MetaSendOpLt
                | MetaSendOpGt
                | MetaSendOpPlus
                | MetaSendOpMinus
                | PushLiteral { .. }
                | PushLocal { .. }
                | SetLocal { .. }
                | PushSelf
                | AllowPrivate
                | SendStack { .. }
                | SendMethod { .. }
                | Goto { .. }
                | GotoIfTrue { .. }
                | GotoIfFalse { .. }
                | CheckInterrupts
                | IsNil
                | PassedArg { .. }
                | PushIvar { .. }
                | SetIvar { .. }
                | PushMyField { .. }
                | StoreMyField { .. }
        )
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Instruction::*;
        let name = self.name();
        match *self {
            PushInt { value } => write!(f, "{name} {value}"),
            Rotate { count: a }
            | MoveDown { positions: a }
            | PushLiteral { literal: a }
            | PushLocal { index: a }
            | SetLocal { index: a }
            | SetCallFlags { flags: a }
            | SendMethod { cache: a }
            | CreateBlock { literal: a }
            | PushConst { name: a }
            | SetConst { name: a }
            | SetConstAt { name: a }
            | SetLiteral { literal: a }
            | Goto { target: a }
            | GotoIfTrue { target: a }
            | GotoIfFalse { target: a }
            | YieldStack { count: a }
            | YieldSplat { count: a }
            | PushMyOffset { offset: a }
            | FindConst { name: a }
            | MakeArray { count: a }
            | MetaSendCall { count: a }
            | PassedArg { index: a }
            | PassedBlockarg { count: a }
            | PushIvar { name: a }
            | SetIvar { name: a }
            | PushMyField { index: a }
            | StoreMyField { index: a } => write!(f, "{name} {a}"),
            SendStack { cache: a, args: b }
            | SendStackWithBlock { cache: a, args: b }
            | SendStackWithSplat { cache: a, args: b }
            | SendSuperStackWithBlock { cache: a, args: b }
            | SendSuperStackWithSplat { cache: a, args: b }
            | PushConstFast { name: a, cache: b }
            | SetLocalDepth { depth: a, index: b }
            | PushLocalDepth { depth: a, index: b }
            | CheckSerial { cache: a, serial: b } => write!(f, "{name} {a} {b}"),
            SetupUnwind { target, kind } => write!(f, "{name} {target} {kind:?}"),
            _ => f.write_str(name),
        }
    }
}
