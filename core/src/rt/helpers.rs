use serde::Serialize;

use crate::ir::Ty;

/// External routines emitted code calls into.
///
/// Each helper has a fixed C signature owned by the runtime; the translator
/// only ever references them by symbol. Arguments are ordered VM first, then
/// the call frame (for helpers that need one), then operation-specific
/// operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHelper {
    ReturnToHere,
    ClearRaiseValue,
    BreakToHere,
    RaisingException,
    SimpleSend,
    SplatSend,
    SplatSendPrivate,
    SuperSend,
    SuperSplatSend,
    ContinueUncommon,
    ClassId,
    StringDup,
    CreateBlock,
    CastArray,
    AddScope,
    PushConstFast,
    PushConst,
    SetConst,
    SetConstAt,
    SetLiteral,
    PromoteVariables,
    CastForSingleBlockArg,
    CastForMultiBlockArg,
    CastForSplatBlockArg,
    SetLocalDepth,
    PushLocalDepth,
    WriteBarrier,
    FlushScope,
    YieldStack,
    YieldSplat,
    CheckInterrupts,
    CheckSerial,
    RaiseReturn,
    EnsureReturn,
    RaiseBreak,
    CurrentException,
    ClearException,
    PopException,
    FindConst,
    InstanceOf,
    KindOf,
    MakeArray,
    MetaSendCall,
    PassedArg,
    PassedBlockarg,
    PushSystemObject,
    PushIvar,
    SetIvar,
    PushMyField,
    SetMyField,
    ShiftArray,
    StringAppend,
    EndProfiling,
}

use crate::ir::Ty::{I1, I32, I64 as Obj, Ptr, Void};

const SEND: &[Ty] = &[Ptr, Ptr, Obj, Obj, Ptr];
const VM: &[Ty] = &[Ptr];
const VM_CF: &[Ty] = &[Ptr, Ptr];
const VM_CF_OBJ: &[Ty] = &[Ptr, Ptr, Obj];
const VM_OBJ_OBJ: &[Ty] = &[Ptr, Obj, Obj];
const VM_ARGS: &[Ty] = &[Ptr, Ptr];
const VM_ARGS_INT: &[Ty] = &[Ptr, Ptr, I32];
const VM_CF_INT_ARRAY: &[Ty] = &[Ptr, Ptr, I32, Ptr];

impl RuntimeHelper {
    pub fn symbol(self) -> &'static str {
        match self {
            RuntimeHelper::ReturnToHere => "rbx_return_to_here",
            RuntimeHelper::ClearRaiseValue => "rbx_clear_raise_value",
            RuntimeHelper::BreakToHere => "rbx_break_to_here",
            RuntimeHelper::RaisingException => "rbx_raising_exception",
            RuntimeHelper::SimpleSend => "rbx_simple_send",
            RuntimeHelper::SplatSend => "rbx_splat_send",
            RuntimeHelper::SplatSendPrivate => "rbx_splat_send_private",
            RuntimeHelper::SuperSend => "rbx_super_send",
            RuntimeHelper::SuperSplatSend => "rbx_super_splat_send",
            RuntimeHelper::ContinueUncommon => "rbx_continue_uncommon",
            RuntimeHelper::ClassId => "rbx_class_id",
            RuntimeHelper::StringDup => "rbx_string_dup",
            RuntimeHelper::CreateBlock => "rbx_create_block",
            RuntimeHelper::CastArray => "rbx_cast_array",
            RuntimeHelper::AddScope => "rbx_add_scope",
            RuntimeHelper::PushConstFast => "rbx_push_const_fast",
            RuntimeHelper::PushConst => "rbx_push_const",
            RuntimeHelper::SetConst => "rbx_set_const",
            RuntimeHelper::SetConstAt => "rbx_set_const_at",
            RuntimeHelper::SetLiteral => "rbx_set_literal",
            RuntimeHelper::PromoteVariables => "rbx_promote_variables",
            RuntimeHelper::CastForSingleBlockArg => "rbx_cast_for_single_block_arg",
            RuntimeHelper::CastForMultiBlockArg => "rbx_cast_for_multi_block_arg",
            RuntimeHelper::CastForSplatBlockArg => "rbx_cast_for_splat_block_arg",
            RuntimeHelper::SetLocalDepth => "rbx_set_local_depth",
            RuntimeHelper::PushLocalDepth => "rbx_push_local_depth",
            RuntimeHelper::WriteBarrier => "rbx_write_barrier",
            RuntimeHelper::FlushScope => "rbx_flush_scope",
            RuntimeHelper::YieldStack => "rbx_yield_stack",
            RuntimeHelper::YieldSplat => "rbx_yield_splat",
            RuntimeHelper::CheckInterrupts => "rbx_check_interrupts",
            RuntimeHelper::CheckSerial => "rbx_check_serial",
            RuntimeHelper::RaiseReturn => "rbx_raise_return",
            RuntimeHelper::EnsureReturn => "rbx_ensure_return",
            RuntimeHelper::RaiseBreak => "rbx_raise_break",
            RuntimeHelper::CurrentException => "rbx_current_exception",
            RuntimeHelper::ClearException => "rbx_clear_exception",
            RuntimeHelper::PopException => "rbx_pop_exception",
            RuntimeHelper::FindConst => "rbx_find_const",
            RuntimeHelper::InstanceOf => "rbx_instance_of",
            RuntimeHelper::KindOf => "rbx_kind_of",
            RuntimeHelper::MakeArray => "rbx_make_array",
            RuntimeHelper::MetaSendCall => "rbx_meta_send_call",
            RuntimeHelper::PassedArg => "rbx_passed_arg",
            RuntimeHelper::PassedBlockarg => "rbx_passed_blockarg",
            RuntimeHelper::PushSystemObject => "rbx_push_system_object",
            RuntimeHelper::PushIvar => "rbx_push_ivar",
            RuntimeHelper::SetIvar => "rbx_set_ivar",
            RuntimeHelper::PushMyField => "rbx_push_my_field",
            RuntimeHelper::SetMyField => "rbx_set_my_field",
            RuntimeHelper::ShiftArray => "rbx_shift_array",
            RuntimeHelper::StringAppend => "rbx_string_append",
            RuntimeHelper::EndProfiling => "rbx_end_profiling",
        }
    }

    /// Return type and parameter types.
    pub fn signature(self) -> (Ty, &'static [Ty]) {
        match self {
            RuntimeHelper::ReturnToHere | RuntimeHelper::BreakToHere => (I1, VM_CF),
            RuntimeHelper::RaisingException => (I1, VM),
            RuntimeHelper::ClearRaiseValue
            | RuntimeHelper::CurrentException
            | RuntimeHelper::ClearException => (Obj, VM),
            RuntimeHelper::SimpleSend
            | RuntimeHelper::SplatSend
            | RuntimeHelper::SplatSendPrivate
            | RuntimeHelper::SuperSend
            | RuntimeHelper::SuperSplatSend => (Obj, SEND),
            RuntimeHelper::ContinueUncommon => (Obj, &[Ptr, Ptr, Ptr, Ptr, Obj]),
            RuntimeHelper::ClassId => (Obj, &[Ptr, Obj]),
            RuntimeHelper::StringDup
            | RuntimeHelper::CastArray
            | RuntimeHelper::AddScope
            | RuntimeHelper::PushConst
            | RuntimeHelper::RaiseReturn
            | RuntimeHelper::EnsureReturn
            | RuntimeHelper::RaiseBreak => (Obj, VM_CF_OBJ),
            RuntimeHelper::CreateBlock => (Obj, &[Ptr, Ptr, I32]),
            RuntimeHelper::PushConstFast => (Obj, &[Ptr, Ptr, Obj, I32]),
            RuntimeHelper::SetConst => (Obj, &[Ptr, Ptr, Obj, Obj]),
            RuntimeHelper::SetConstAt => (Obj, &[Ptr, Obj, Obj, Obj]),
            RuntimeHelper::SetLiteral => (Obj, &[Ptr, Ptr, I32, Obj]),
            RuntimeHelper::PromoteVariables | RuntimeHelper::CheckInterrupts => (Obj, VM_CF),
            RuntimeHelper::CastForSingleBlockArg
            | RuntimeHelper::CastForMultiBlockArg
            | RuntimeHelper::CastForSplatBlockArg => (Obj, VM_ARGS),
            RuntimeHelper::SetLocalDepth => (Obj, &[Ptr, Ptr, Obj, I32, I32]),
            RuntimeHelper::PushLocalDepth => (Obj, &[Ptr, Ptr, I32, I32]),
            RuntimeHelper::WriteBarrier => (Void, &[Ptr, Ptr, Obj]),
            RuntimeHelper::FlushScope => (Void, &[Ptr, Ptr]),
            RuntimeHelper::YieldStack | RuntimeHelper::YieldSplat | RuntimeHelper::MetaSendCall => {
                (Obj, VM_CF_INT_ARRAY)
            }
            RuntimeHelper::CheckSerial => (Obj, &[Ptr, Ptr, I32, I32, Obj]),
            RuntimeHelper::PopException => (Obj, &[Ptr, Obj]),
            RuntimeHelper::FindConst => (Obj, &[Ptr, Ptr, I32, Obj]),
            RuntimeHelper::InstanceOf | RuntimeHelper::KindOf | RuntimeHelper::StringAppend => {
                (Obj, VM_OBJ_OBJ)
            }
            RuntimeHelper::MakeArray => (Obj, &[Ptr, I32, Ptr]),
            RuntimeHelper::PassedArg | RuntimeHelper::PassedBlockarg => (Obj, VM_ARGS_INT),
            RuntimeHelper::PushSystemObject => (Obj, &[Ptr, I32]),
            RuntimeHelper::PushIvar => (Obj, VM_OBJ_OBJ),
            RuntimeHelper::SetIvar => (Obj, &[Ptr, Obj, Obj, Obj]),
            RuntimeHelper::PushMyField => (Obj, &[Ptr, Obj, I32]),
            RuntimeHelper::SetMyField => (Obj, &[Ptr, Obj, I32, Obj]),
            RuntimeHelper::ShiftArray => (Obj, &[Ptr, Ptr]),
            RuntimeHelper::EndProfiling => (Void, &[Ptr]),
        }
    }
}
