use std::sync::Arc;

use crate::bytecode::{CompiledMethod, Literal};
use crate::ir::{BlockId, IcmpPred, IrBuilder, Operand, Param, Ty};
use crate::rt::layout::{self, call_frame};
use crate::rt::{InlineCache, RuntimeHelper, value};

use super::bailout::{EscapeGate, ExitTarget};
use super::blocks::BlockTable;
use super::error::{JitError, JitResult};
use super::inline::InlinePolicy;
use super::options::JitOptions;
use super::stack::OperandStack;
use super::unwind::HandlerStack;

/// Translation state for one method body.
///
/// A top-level translation owns the function's prologue and returns through
/// `ret`; an inlined body shares the caller's builder and hands its result to
/// the caller's merge phi instead.
pub(crate) struct Translator<'c> {
    pub(super) b: &'c mut IrBuilder,
    pub(super) method: &'c CompiledMethod,
    pub(super) options: &'c JitOptions,
    pub(super) policy: &'c dyn InlinePolicy,
    pub(super) stack: OperandStack,
    pub(super) blocks: BlockTable,
    pub(super) handlers: HandlerStack,
    pub(super) gate: EscapeGate,
    pub(super) exit: ExitTarget,
    /// Frame-local variable record: self, block, parent scope, locals.
    pub(super) vars: Operand,
    /// Outgoing argument record shared by every dispatch site.
    pub(super) out_args: Operand,
    /// Argument count of an inlined call, known at compile time.
    pub(super) inline_args: Option<usize>,
    pub(super) ip: usize,
    /// The current block already has a terminator.
    dead: bool,
    /// The current block has at least one potential predecessor.
    reachable: bool,
    pub(super) allow_private: bool,
    pub(super) sends_done: usize,
    /// Call sites replaced by their callee's body.
    pub(super) inlined: usize,
    pub(super) anomalies: Vec<String>,
}

struct Frame {
    vars: Operand,
    out_args: Operand,
    stack: OperandStack,
}

fn frame_storage(b: &mut IrBuilder, method: &CompiledMethod) -> Frame {
    let vars = b.entry_alloca(layout::vars::size(method.local_count) as u32, "vars");
    let out_args = b.entry_alloca(layout::args::SIZE as u32, "out_args");
    let stack = b.entry_alloca(method.stack_size as u32, "stack");
    Frame {
        vars: vars.into(),
        out_args: out_args.into(),
        stack: OperandStack::new(stack.into(), method.stack_size),
    }
}

impl<'c> Translator<'c> {
    /// Start a top-level translation: emit the prologue that builds the
    /// frame's variable scope from the incoming arguments.
    pub(crate) fn for_method(
        b: &'c mut IrBuilder,
        method: &'c CompiledMethod,
        options: &'c JitOptions,
        policy: &'c dyn InlinePolicy,
    ) -> JitResult<Self> {
        let frame = frame_storage(b, method);
        let vars = frame.vars;
        let args = Operand::Param(Param::Args);
        let cf = Operand::Param(Param::CallFrame);

        let recv = b.load_field(Ty::I64, args, layout::args::RECV, "recv");
        b.store_field(recv.into(), vars, layout::vars::SELF);
        let block = b.load_field(Ty::I64, args, layout::args::BLOCK, "block");
        b.store_field(block.into(), vars, layout::vars::BLOCK);
        let parent = b.load_field(Ty::Ptr, cf, call_frame::TOP_SCOPE, "top_scope");
        b.store_field(parent.into(), vars, layout::vars::PARENT);

        if method.required_args > 0 {
            let argv = b.load_field(Ty::Ptr, args, layout::args::ARGUMENTS, "argv");
            for i in 0..method.required_args {
                let arg = b.load_field(Ty::I64, argv.into(), i as i64, "arg");
                b.store_field(arg.into(), vars, layout::vars::LOCALS + i as i64);
            }
        }
        for i in method.required_args..method.local_count {
            b.store_field(Operand::word(value::Q_NIL), vars, layout::vars::LOCALS + i as i64);
        }
        b.store_field(vars, cf, call_frame::SCOPE);

        let flush_scope = options.use_full_scope.then_some(vars);
        let gate = EscapeGate::install(b, ExitTarget::Return, flush_scope);
        let blocks = BlockTable::scan(method, b)?;
        tracing::trace!(method = %method.name, targets = blocks.len(), "scanned branch targets");
        Ok(Self::assemble(
            b,
            method,
            options,
            policy,
            frame,
            blocks,
            gate,
            ExitTarget::Return,
            None,
        ))
    }

    /// Start translating `body` in place of a call, at the builder's current
    /// block. `args` are the call's argument values, lowest first.
    pub(super) fn for_inline(
        b: &'c mut IrBuilder,
        body: &'c CompiledMethod,
        options: &'c JitOptions,
        policy: &'c dyn InlinePolicy,
        recv: Operand,
        args: &[Operand],
        exit: ExitTarget,
    ) -> JitResult<Self> {
        let frame = frame_storage(b, body);
        let vars = frame.vars;
        b.store_field(recv, vars, layout::vars::SELF);
        b.store_field(Operand::word(value::Q_NIL), vars, layout::vars::BLOCK);
        b.store_field(Operand::null(), vars, layout::vars::PARENT);
        for i in 0..body.local_count {
            let local = args.get(i).copied().unwrap_or(Operand::word(value::Q_NIL));
            b.store_field(local, vars, layout::vars::LOCALS + i as i64);
        }

        let gate = EscapeGate::install(b, exit, None);
        let blocks = BlockTable::scan(body, b)?;
        Ok(Self::assemble(
            b,
            body,
            options,
            policy,
            frame,
            blocks,
            gate,
            exit,
            Some(args.len()),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        b: &'c mut IrBuilder,
        method: &'c CompiledMethod,
        options: &'c JitOptions,
        policy: &'c dyn InlinePolicy,
        frame: Frame,
        blocks: BlockTable,
        gate: EscapeGate,
        exit: ExitTarget,
        inline_args: Option<usize>,
    ) -> Self {
        Self {
            b,
            method,
            options,
            policy,
            stack: frame.stack,
            blocks,
            handlers: HandlerStack::default(),
            gate,
            exit,
            vars: frame.vars,
            out_args: frame.out_args,
            inline_args,
            ip: 0,
            dead: false,
            reachable: true,
            allow_private: false,
            sends_done: 0,
            inlined: 0,
            anomalies: Vec::new(),
        }
    }

    /// Translate every instruction in program order.
    pub(crate) fn run(&mut self) -> JitResult<()> {
        let method = self.method;
        for (ip, instr) in method.instructions() {
            self.ip = ip;
            self.enter(ip)?;
            if !self.exit.is_inline() {
                let cf = self.call_frame();
                self.b.store_field(Operand::word(ip as i64), cf, call_frame::IP);
            }
            tracing::trace!(method = %method.name, ip, depth = self.stack.depth(), "{instr}");
            self.visit(instr)?;
        }

        if !self.handlers.is_empty() {
            return Err(JitError::UnbalancedHandlers {
                open: self.handlers.len(),
            });
        }
        if !self.dead && self.reachable {
            return Err(JitError::FallsOffEnd);
        }
        Ok(())
    }

    /// Switch blocks at instruction boundaries. Code after a terminator that
    /// no branch targets is still translated, into a block nothing reaches.
    fn enter(&mut self, ip: usize) -> JitResult<()> {
        if let Some(entry) = self.blocks.get(ip) {
            let (block, depth, reachable) = if !self.dead {
                let depth = self.stack.depth();
                let block = self.blocks.edge(ip, depth)?;
                self.branch(block);
                (block, depth, true)
            } else if let Some(depth) = entry.depth.or_else(|| self.blocks.inferred_depth(ip)) {
                (self.blocks.edge(ip, depth)?, depth, true)
            } else {
                // No path from the entry gets here; leave the depth open.
                (entry.block, self.stack.depth(), false)
            };
            self.switch_to(block);
            self.stack.enter_block(depth).map_err(|f| f.at(ip))?;
            self.dead = false;
            self.reachable = reachable;
        } else if self.dead {
            let block = self.b.new_block("unreachable");
            self.switch_to(block);
            let depth = self.stack.depth();
            self.stack.enter_block(depth).map_err(|f| f.at(ip))?;
            self.dead = false;
            self.reachable = false;
        }
        Ok(())
    }

    pub(super) fn vm(&self) -> Operand {
        Operand::Param(Param::Vm)
    }

    pub(super) fn call_frame(&self) -> Operand {
        Operand::Param(Param::CallFrame)
    }

    pub(super) fn args_param(&self) -> Operand {
        Operand::Param(Param::Args)
    }

    pub(super) fn is_inline(&self) -> bool {
        self.exit.is_inline()
    }

    pub(super) fn mark_dead(&mut self) {
        self.dead = true;
    }

    /// Make `block` the insertion point, laid out after the current one.
    pub(super) fn switch_to(&mut self, block: BlockId) {
        let current = self.b.current();
        self.b.move_after(block, current);
        self.b.set_block(block);
    }

    /// Leave the current block. The stack is written back first so the
    /// target sees it in memory.
    pub(super) fn branch(&mut self, target: BlockId) {
        self.stack.flush(self.b);
        self.b.br(target);
    }

    pub(super) fn cond_branch(&mut self, cond: Operand, then_block: BlockId, else_block: BlockId) {
        self.stack.flush(self.b);
        self.b.cond_br(cond, then_block, else_block);
    }

    /// Branch to a registered bytecode target, fixing or checking its depth.
    pub(super) fn jump_target(&mut self, target: usize) -> JitResult<BlockId> {
        self.blocks.edge(target, self.stack.depth())
    }

    pub(super) fn push(&mut self, value: impl Into<Operand>) -> JitResult<()> {
        let ip = self.ip;
        self.stack.push(value.into()).map_err(|f| f.at(ip))
    }

    pub(super) fn pop(&mut self) -> JitResult<Operand> {
        let ip = self.ip;
        self.stack.pop(self.b).map_err(|f| f.at(ip))
    }

    pub(super) fn top(&mut self) -> JitResult<Operand> {
        let ip = self.ip;
        self.stack.top(self.b).map_err(|f| f.at(ip))
    }

    pub(super) fn back(&mut self, k: usize) -> JitResult<Operand> {
        let ip = self.ip;
        self.stack.back(self.b, k).map_err(|f| f.at(ip))
    }

    pub(super) fn remove(&mut self, count: usize) -> JitResult<()> {
        let ip = self.ip;
        self.stack.remove(count).map_err(|f| f.at(ip))
    }

    /// Pointer to the top `count` values, lowest first.
    pub(super) fn objects(&mut self, count: usize) -> JitResult<Operand> {
        let ip = self.ip;
        self.stack.objects(self.b, count).map_err(|f| f.at(ip))
    }

    pub(super) fn position(&mut self, k: usize) -> JitResult<Operand> {
        let ip = self.ip;
        self.stack.position(self.b, k).map_err(|f| f.at(ip))
    }

    /// Publish the stack depth to the frame before a helper that inspects it.
    pub(super) fn reset_sp(&mut self) {
        if self.is_inline() {
            return;
        }
        self.stack.flush(self.b);
        let depth = Operand::word(self.stack.depth() as i64);
        let cf = self.call_frame();
        self.b.store_field(depth, cf, call_frame::SP);
    }

    pub(super) fn literal(&self, index: u32) -> JitResult<&'c Literal> {
        let method: &'c CompiledMethod = self.method;
        method.literal(index).ok_or_else(|| JitError::InvalidOperand {
            ip: self.ip,
            detail: format!("literal {index} out of range ({} literals)", method.literals.len()),
        })
    }

    /// The tagged symbol word of literal `index`.
    pub(super) fn symbol(&self, index: u32) -> JitResult<Operand> {
        let literal = self.literal(index)?;
        literal
            .as_symbol()
            .map(|sym| Operand::word(sym.word()))
            .ok_or_else(|| JitError::InvalidOperand {
                ip: self.ip,
                detail: format!("literal {index} is not a symbol"),
            })
    }

    pub(super) fn cache(&self, index: u32) -> JitResult<Arc<InlineCache>> {
        self.method
            .cache(index)
            .cloned()
            .ok_or_else(|| JitError::InvalidOperand {
                ip: self.ip,
                detail: format!("inline cache {index} out of range ({} caches)", self.method.caches.len()),
            })
    }

    /// Word offset of local `index` inside `vars`.
    pub(super) fn local_slot(&self, index: u32) -> JitResult<i64> {
        if (index as usize) < self.method.local_count {
            Ok(layout::vars::LOCALS + index as i64)
        } else {
            Err(JitError::InvalidOperand {
                ip: self.ip,
                detail: format!("local {index} out of range ({} locals)", self.method.local_count),
            })
        }
    }

    pub(super) fn get_self(&mut self) -> Operand {
        self.b
            .load_field(Ty::I64, self.vars, layout::vars::SELF, "self")
            .into()
    }

    pub(super) fn anomaly(&mut self, message: String) {
        tracing::warn!(method = %self.method.name, ip = self.ip, "{message}");
        self.anomalies.push(format!("ip {}: {message}", self.ip));
    }

    /// Hand the top of the stack to the method's exit.
    pub(super) fn ret(&mut self) -> JitResult<()> {
        let result = self.top()?;
        if !self.is_inline() {
            if self.options.include_profiling {
                self.end_profiling();
            }
            if self.options.use_full_scope {
                let vm = self.vm();
                self.b.call_void(RuntimeHelper::FlushScope, vec![vm, self.vars]);
            }
        }
        self.exit.deliver(self.b, result);
        self.mark_dead();
        Ok(())
    }

    fn end_profiling(&mut self) {
        let cf = self.call_frame();
        let Some(flag_address) = self.options.profiling_flag_address else {
            self.b.call_void(RuntimeHelper::EndProfiling, vec![cf]);
            return;
        };
        let profiling = self.b.new_block("profiling");
        let cont = self.b.new_block("profile_done");
        let flag = self.b.load(Ty::I64, Operand::address(flag_address), "profiling_flag");
        let on = self
            .b
            .icmp(IcmpPred::Ne, flag.into(), Operand::word(0), "profiling_on");
        self.b.cond_br(on.into(), profiling, cont);

        self.switch_to(profiling);
        self.b.call_void(RuntimeHelper::EndProfiling, vec![cf]);
        self.b.br(cont);

        self.switch_to(cont);
    }
}
