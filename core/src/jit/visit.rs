//! One translation per instruction.

use crate::bytecode::Instruction;
use crate::ir::{BinaryOp, CastOp, IcmpPred, Operand, Ty};
use crate::rt::layout::{self, WORD_SIZE, method as method_record, scope};
use crate::rt::{RuntimeHelper as H, value};

use super::error::{JitError, JitResult};
use super::fast_path::FastOp;
use super::translator::Translator;

impl Translator<'_> {
    pub(super) fn visit(&mut self, instr: &Instruction) -> JitResult<()> {
        use Instruction::*;
        match *instr {
            Noop | SetCallFlags { .. } => Err(JitError::UnsupportedInstruction {
                ip: self.ip,
                name: instr.name(),
            }),

            Pop => self.remove(1),
            PushNil => self.push(Operand::word(value::Q_NIL)),
            PushTrue => self.push(Operand::word(value::Q_TRUE)),
            PushFalse => self.push(Operand::word(value::Q_FALSE)),
            PushInt { value } => self.push_int(value),
            MetaPush0 => self.push_int(0),
            MetaPush1 => self.push_int(1),
            MetaPush2 => self.push_int(2),
            MetaPushNeg1 => self.push_int(-1),
            Ret => self.ret(),

            SwapStack => {
                let ip = self.ip;
                self.stack.swap(self.b).map_err(|f| f.at(ip))
            }
            DupTop => {
                let ip = self.ip;
                self.stack.dup(self.b).map_err(|f| f.at(ip))
            }
            Rotate { count } => {
                let ip = self.ip;
                self.stack.rotate(self.b, count as usize).map_err(|f| f.at(ip))
            }
            MoveDown { positions } => {
                let ip = self.ip;
                self.stack.move_down(self.b, positions as usize).map_err(|f| f.at(ip))
            }

            MetaSendOpEqual => self.fast_op(FastOp::Equal),
            MetaSendOpTequal => self.fast_op(FastOp::Tequal),
            MetaSendOpLt => self.fast_op(FastOp::Lt),
            MetaSendOpGt => self.fast_op(FastOp::Gt),
            MetaSendOpPlus => self.fast_op(FastOp::Plus),
            MetaSendOpMinus => self.fast_op(FastOp::Minus),

            PushLiteral { literal } => self.push_literal(literal),
            StringDup => {
                let string = self.pop()?;
                let dup = self.call(H::StringDup, vec![self.call_frame(), string], "string_dup");
                self.push(dup)
            }
            PushLocal { index } => {
                let slot = self.local_slot(index)?;
                let local = self.b.load_field(Ty::I64, self.vars, slot, "local");
                self.push(local)
            }
            SetLocal { index } => {
                let slot = self.local_slot(index)?;
                let top = self.top()?;
                self.b.store_field(top, self.vars, slot);
                Ok(())
            }
            PushSelf => {
                let this = self.get_self();
                self.push(this)
            }
            PushBlock => {
                let block = self
                    .b
                    .load_field(Ty::I64, self.vars, layout::vars::BLOCK, "block");
                self.push(block)
            }
            AllowPrivate => {
                self.allow_private = true;
                Ok(())
            }

            SendStack { cache, args } => self.send_stack(cache, args as usize),
            SendMethod { cache } => self.send_stack(cache, 0),
            SendStackWithBlock { cache, args } => self.send_stack_with_block(cache, args as usize),
            SendStackWithSplat { cache, args } => self.send_stack_with_splat(cache, args as usize),
            SendSuperStackWithBlock { cache, args } => self.send_super_with_block(cache, args as usize),
            SendSuperStackWithSplat { cache, args } => self.send_super_with_splat(cache, args as usize),
            MetaSendCall { count } => self.meta_send_call(count as usize),

            CreateBlock { literal } => {
                self.literal(literal)?;
                let block = self.call(
                    H::CreateBlock,
                    vec![self.call_frame(), Operand::int32(literal as i64)],
                    "block",
                );
                self.push(block)
            }
            CastArray => {
                let object = self.pop()?;
                let array = self.call(H::CastArray, vec![self.call_frame(), object], "array");
                self.push(array)
            }
            AddScope => {
                let module = self.pop()?;
                let vm = self.vm();
                let cf = self.call_frame();
                self.b.call_void(H::AddScope, vec![vm, cf, module]);
                Ok(())
            }
            PushScope => {
                let cf = self.call_frame();
                let cm = self.b.load_field(Ty::Ptr, cf, layout::call_frame::CM, "cm");
                let static_scope =
                    self.b
                        .load_field(Ty::I64, cm.into(), method_record::STATIC_SCOPE, "scope");
                self.push(static_scope)
            }
            PushVariables => {
                let vars = self.call(H::PromoteVariables, vec![self.call_frame()], "promo_vars");
                self.push(vars)
            }

            PushConstFast { name, cache } => self.push_const_fast(name, cache),
            PushConst { name } => {
                let sym = self.symbol(name)?;
                self.reset_sp();
                let constant = self.call(H::PushConst, vec![self.call_frame(), sym], "constant");
                self.check_for_exception(constant);
                self.push(constant)
            }
            SetConst { name } => {
                let sym = self.symbol(name)?;
                let top = self.top()?;
                let (vm, cf) = (self.vm(), self.call_frame());
                self.b.call_void(H::SetConst, vec![vm, cf, sym, top]);
                Ok(())
            }
            SetConstAt { name } => {
                let sym = self.symbol(name)?;
                let val = self.pop()?;
                let module = self.pop()?;
                let vm = self.vm();
                self.b.call_void(H::SetConstAt, vec![vm, sym, module, val]);
                self.push(val)
            }
            SetLiteral { literal } => {
                self.literal(literal)?;
                let top = self.top()?;
                let (vm, cf) = (self.vm(), self.call_frame());
                self.b
                    .call_void(H::SetLiteral, vec![vm, cf, Operand::int32(literal as i64), top]);
                Ok(())
            }
            FindConst { name } => {
                self.literal(name)?;
                let under = self.pop()?;
                let constant = self.call(
                    H::FindConst,
                    vec![self.call_frame(), Operand::int32(name as i64), under],
                    "constant",
                );
                self.push(constant)
            }

            CastForSingleBlockArg => self.cast_block_args(H::CastForSingleBlockArg),
            CastForMultiBlockArg => self.cast_block_args(H::CastForMultiBlockArg),
            CastForSplatBlockArg => self.cast_block_args(H::CastForSplatBlockArg),

            PushLocalDepth { depth, index } => self.push_local_depth(depth, index),
            SetLocalDepth { depth, index } => self.set_local_depth(depth, index),

            Goto { target } => {
                let block = self.jump_target(target as usize)?;
                self.branch(block);
                self.mark_dead();
                Ok(())
            }
            GotoIfTrue { target } => self.goto_if(target as usize, true),
            GotoIfFalse { target } => self.goto_if(target as usize, false),

            YieldStack { count } => self.yield_values(H::YieldStack, count as usize, count as usize),
            YieldSplat { count } => self.yield_values(H::YieldSplat, count as usize, count as usize + 1),
            CheckInterrupts => {
                let status = self.call(H::CheckInterrupts, vec![self.call_frame()], "ci");
                self.check_for_exception(status);
                Ok(())
            }
            CheckSerial { cache, serial } => {
                self.cache(cache)?;
                let recv = self.pop()?;
                let matches = self.call(
                    H::CheckSerial,
                    vec![
                        self.call_frame(),
                        Operand::int32(cache as i64),
                        Operand::int32(serial as i64),
                        recv,
                    ],
                    "cs",
                );
                self.push(matches)
            }

            PushMyOffset { offset } => {
                if offset as i64 % WORD_SIZE != 0 {
                    return Err(JitError::InvalidOperand {
                        ip: self.ip,
                        detail: format!("offset {offset} is not word aligned"),
                    });
                }
                let this = self.get_self();
                let object = self.b.cast(CastOp::IntToPtr, this, Ty::Ptr, "obj_array");
                let field = self
                    .b
                    .load_field(Ty::I64, object.into(), offset as i64 / WORD_SIZE, "field");
                self.push(field)
            }

            SetupUnwind { target, kind } => self.setup_unwind(target as usize, kind),
            PopUnwind => self.pop_unwind(),
            Reraise => {
                self.propagate_exception();
                Ok(())
            }
            RaiseReturn => self.raise_with(H::RaiseReturn),
            EnsureReturn => self.raise_with(H::EnsureReturn),
            RaiseBreak => self.raise_with(H::RaiseBreak),
            PushException => {
                let exception = self.call(H::CurrentException, Vec::new(), "ce");
                self.push(exception)
            }
            ClearException => {
                let vm = self.vm();
                self.b.call_void(H::ClearException, vec![vm]);
                Ok(())
            }
            PopException => {
                let saved = self.pop()?;
                let vm = self.vm();
                self.b.call_void(H::PopException, vec![vm, saved]);
                Ok(())
            }

            InstanceOf => self.class_test(H::InstanceOf),
            KindOf => self.class_test(H::KindOf),
            IsNil => {
                let object = self.pop()?;
                let nil = self
                    .b
                    .icmp(IcmpPred::Eq, object, Operand::word(value::Q_NIL), "is_nil");
                let result = self.b.select(
                    nil.into(),
                    Operand::word(value::Q_TRUE),
                    Operand::word(value::Q_FALSE),
                    "select_bool",
                );
                self.push(result)
            }
            MakeArray { count } => {
                let count = count as usize;
                let values = self.objects(count)?;
                let array = self.call(H::MakeArray, vec![Operand::int32(count as i64), values], "array");
                self.remove(count)?;
                self.push(array)
            }

            PassedArg { index } => match self.inline_args {
                Some(passed) => {
                    let word = value::boolean((index as usize) < passed);
                    self.push(Operand::word(word))
                }
                None => {
                    let passed = self.call(
                        H::PassedArg,
                        vec![self.args_param(), Operand::int32(index as i64)],
                        "pa",
                    );
                    self.push(passed)
                }
            },
            PassedBlockarg { count } => {
                let passed = self.call(
                    H::PassedBlockarg,
                    vec![self.args_param(), Operand::int32(count as i64)],
                    "pa",
                );
                self.push(passed)
            }
            PushCpathTop => {
                let object = self.call(H::PushSystemObject, vec![Operand::int32(0)], "so");
                self.push(object)
            }

            PushIvar { name } => {
                let sym = self.symbol(name)?;
                let this = self.get_self();
                let ivar = self.call(H::PushIvar, vec![this, sym], "ivar");
                self.push(ivar)
            }
            SetIvar { name } => {
                let sym = self.symbol(name)?;
                let this = self.get_self();
                let top = self.top()?;
                let vm = self.vm();
                self.b.call_void(H::SetIvar, vec![vm, this, sym, top]);
                Ok(())
            }
            PushMyField { index } => {
                let this = self.get_self();
                let field = self.call(H::PushMyField, vec![this, Operand::int32(index as i64)], "field");
                self.check_for_exception(field);
                self.push(field)
            }
            StoreMyField { index } => {
                let this = self.get_self();
                let top = self.top()?;
                let vm = self.vm();
                self.b
                    .call_void(H::SetMyField, vec![vm, this, Operand::int32(index as i64), top]);
                Ok(())
            }
            ShiftArray => {
                let array = self.position(0)?;
                let shifted = self.call(H::ShiftArray, vec![array], "shifted");
                self.push(shifted)
            }
            StringAppend => {
                let appended = self.pop()?;
                let string = self.pop()?;
                let result = self.call(H::StringAppend, vec![appended, string], "string");
                self.push(result)
            }
        }
    }

    /// Call `helper` with the VM prepended to `args`.
    fn call(&mut self, helper: H, args: Vec<Operand>, hint: &'static str) -> Operand {
        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(self.vm());
        call_args.extend(args);
        self.b.call(helper, call_args, hint).into()
    }

    fn push_int(&mut self, n: i64) -> JitResult<()> {
        let word = value::fixnum(n).ok_or_else(|| JitError::InvalidOperand {
            ip: self.ip,
            detail: format!("{n} does not fit in a fixnum"),
        })?;
        self.push(Operand::word(word))
    }

    /// Immediates are embedded; heap literals are read from the running
    /// method's literal tuple.
    fn push_literal(&mut self, index: u32) -> JitResult<()> {
        let literal = self.literal(index)?;
        if let Some(word) = literal.immediate() {
            return self.push(Operand::word(word));
        }
        let cf = self.call_frame();
        let cm = self.b.load_field(Ty::Ptr, cf, layout::call_frame::CM, "cm");
        let literals = self
            .b
            .load_field(Ty::Ptr, cm.into(), method_record::LITERALS, "literals");
        let object = self
            .b
            .load_field(Ty::I64, literals.into(), index as i64, "literal");
        self.push(object)
    }

    fn cast_block_args(&mut self, helper: H) -> JitResult<()> {
        let cast = self.call(helper, vec![self.args_param()], "cast_args");
        self.push(cast)
    }

    fn goto_if(&mut self, target: usize, when: bool) -> JitResult<()> {
        let cond = self.pop()?;
        let low = self
            .b
            .binary(BinaryOp::And, cond, Operand::word(value::FALSE_MASK), "and");
        let pred = if when { IcmpPred::Ne } else { IcmpPred::Eq };
        let taken = self.b.icmp(pred, low.into(), Operand::word(value::Q_FALSE), "is_true");
        let block = self.jump_target(target)?;
        let cont = self.b.new_block("continue");
        self.cond_branch(taken.into(), block, cont);
        self.switch_to(cont);
        Ok(())
    }

    fn yield_values(&mut self, helper: H, count: usize, consumed: usize) -> JitResult<()> {
        let values = self.objects(consumed)?;
        let result = self.call(
            helper,
            vec![self.call_frame(), Operand::int32(count as i64), values],
            "ys",
        );
        self.remove(consumed)?;
        self.check_for_exception(result);
        self.push(result)
    }

    /// Register the top value as the pending transfer, then unwind.
    fn raise_with(&mut self, helper: H) -> JitResult<()> {
        let top = self.top()?;
        let (vm, cf) = (self.vm(), self.call_frame());
        self.b.call_void(helper, vec![vm, cf, top]);
        self.propagate_exception();
        Ok(())
    }

    fn class_test(&mut self, helper: H) -> JitResult<()> {
        let object = self.pop()?;
        let class = self.pop()?;
        let result = self.call(helper, vec![object, class], "constant");
        self.push(result)
    }

    fn scope_locals(&mut self) -> Operand {
        let parent = self
            .b
            .load_field(Ty::Ptr, self.vars, layout::vars::PARENT, "parent");
        self.b
            .load_field(Ty::Ptr, parent.into(), scope::LOCALS, "locals")
            .into()
    }

    fn push_local_depth(&mut self, depth: u32, index: u32) -> JitResult<()> {
        match depth {
            0 => {
                self.anomaly(format!("push_local_depth with depth 0 (local {index})"));
                let slot = self.local_slot(index)?;
                let local = self.b.load_field(Ty::I64, self.vars, slot, "local");
                self.push(local)
            }
            1 => {
                let locals = self.scope_locals();
                let local = self.b.load_field(Ty::I64, locals, index as i64, "local");
                self.push(local)
            }
            _ => {
                let local = self.call(
                    H::PushLocalDepth,
                    vec![
                        self.call_frame(),
                        Operand::int32(depth as i64),
                        Operand::int32(index as i64),
                    ],
                    "vs_uplocal",
                );
                self.push(local)
            }
        }
    }

    fn set_local_depth(&mut self, depth: u32, index: u32) -> JitResult<()> {
        match depth {
            0 => {
                self.anomaly(format!("set_local_depth with depth 0 (local {index})"));
                let slot = self.local_slot(index)?;
                let top = self.top()?;
                self.b.store_field(top, self.vars, slot);
                Ok(())
            }
            1 => {
                let val = self.top()?;
                let parent = self
                    .b
                    .load_field(Ty::Ptr, self.vars, layout::vars::PARENT, "parent");
                let locals = self
                    .b
                    .load_field(Ty::Ptr, parent.into(), scope::LOCALS, "locals");
                self.b.store_field(val, locals.into(), index as i64);
                let vm = self.vm();
                self.b.call_void(H::WriteBarrier, vec![vm, parent.into(), val]);
                Ok(())
            }
            _ => {
                let val = self.pop()?;
                let stored = self.call(
                    H::SetLocalDepth,
                    vec![
                        self.call_frame(),
                        val,
                        Operand::int32(depth as i64),
                        Operand::int32(index as i64),
                    ],
                    "vs_uplocal",
                );
                self.push(stored)
            }
        }
    }
}
