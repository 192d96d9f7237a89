//! Splicing monomorphic call targets into the caller.

use std::sync::Arc;

use crate::bytecode::CompiledMethod;
use crate::ir::{IcmpPred, Operand, Ty};
use crate::rt::{InlineCache, RuntimeHelper, Symbol};

use super::bailout::ExitTarget;
use super::error::JitResult;
use super::translator::Translator;

/// A call site the translator could splice its cached target into.
#[derive(Debug, Clone, Copy)]
pub struct InlineSite<'a> {
    pub caller: &'a CompiledMethod,
    pub ip: usize,
    pub name: Symbol,
    pub args: usize,
    pub callee: &'a CompiledMethod,
}

/// Decides whether an eligible call site is actually inlined.
///
/// Only consulted once the site is known to be safe to splice: the cache is
/// monomorphic, the callee body is available and inlinable, and no handler
/// is active.
pub trait InlinePolicy: Send + Sync {
    fn should_inline(&self, site: &InlineSite<'_>) -> bool;
}

/// Inline whatever the cache predicts, up to a callee size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheDirected {
    pub max_size: usize,
}

impl CacheDirected {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }
}

impl InlinePolicy for CacheDirected {
    fn should_inline(&self, site: &InlineSite<'_>) -> bool {
        site.callee.code_size() <= self.max_size
    }
}

/// Never inline; every send goes through its cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverInline;

impl InlinePolicy for NeverInline {
    fn should_inline(&self, _site: &InlineSite<'_>) -> bool {
        false
    }
}

impl Translator<'_> {
    /// Try to replace a send of `args` arguments by the body its cache
    /// predicts. On success the call's result is on the stack.
    pub(super) fn try_inline(&mut self, cache: &Arc<InlineCache>, args: usize) -> JitResult<bool> {
        if !self.options.inlining || self.is_inline() || !self.handlers.is_empty() {
            return Ok(false);
        }
        let Some(target) = cache.inline_target() else {
            return Ok(false);
        };
        let body = target.body;
        if body.required_args != args || !body.is_inlinable() {
            return Ok(false);
        }
        let site = InlineSite {
            caller: self.method,
            ip: self.ip,
            name: cache.name(),
            args,
            callee: &body,
        };
        if !self.policy.should_inline(&site) {
            return Ok(false);
        }
        tracing::debug!(
            caller = %self.method.name,
            callee = %body.name,
            ip = self.ip,
            klass = target.klass,
            "inlining call site"
        );

        let recv = self.back(args)?;
        let arg_values = (0..args)
            .rev()
            .map(|k| self.back(k))
            .collect::<JitResult<Vec<_>>>()?;

        let vm = self.vm();
        let class_id = self.b.call(RuntimeHelper::ClassId, vec![vm, recv], "class_id");
        let guard = self
            .b
            .icmp(IcmpPred::Eq, class_id.into(), Operand::word(target.klass), "guard");
        let inline_body = self.b.new_block("inline_body");
        let uncommon = self.b.new_block("uncommon");
        let merge = self.b.new_block("inline_merge");
        self.cond_branch(guard.into(), inline_body, uncommon);

        // The receiver's class changed: let the interpreter resume at this
        // send with the stack as it is now.
        self.switch_to(uncommon);
        let resume_args = vec![
            vm,
            self.call_frame(),
            self.args_param(),
            self.stack.base(),
            Operand::word(self.stack.depth() as i64),
        ];
        let resumed = self.b.call(RuntimeHelper::ContinueUncommon, resume_args, "uncommon");
        self.exit.deliver(self.b, resumed.into());

        self.b.set_block(merge);
        let phi = self.b.phi(Ty::I64, Vec::new(), "inline_ret");
        self.switch_to(inline_body);

        let (sends, anomalies) = {
            let mut callee = Translator::for_inline(
                &mut *self.b,
                &body,
                self.options,
                self.policy,
                recv,
                &arg_values,
                ExitTarget::Inline { phi, merge },
            )?;
            callee.run()?;
            (callee.sends_done, std::mem::take(&mut callee.anomalies))
        };
        self.sends_done += sends;
        self.anomalies.extend(anomalies);
        self.inlined += 1;

        self.switch_to(merge);
        self.remove(args + 1)?;
        self.check_for_exception(phi.into());
        self.push(phi)?;
        self.allow_private = false;
        Ok(true)
    }
}
