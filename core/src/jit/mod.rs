//! Bytecode-to-IR translation.
//!
//! [`JitCompiler::compile`] walks one [`CompiledMethod`] in program order and
//! emits an IR [`Function`] with the calling convention
//! `i64 (ptr vm, ptr call_frame, ptr args)`. A null result means either a
//! pending raise/break/return in the VM or a request to continue in the
//! interpreter; see [`crate::rt::ExitOutcome`].

mod bailout;
mod blocks;
mod const_cache;
mod error;
mod fast_path;
mod inline;
mod options;
mod passes;
mod send;
mod stack;
mod translator;
mod unwind;
mod visit;

#[cfg(test)]
mod jit_test;

use std::sync::Arc;

use crate::bytecode::CompiledMethod;
use crate::ir::printer::{ModuleHeader, render_module};
use crate::ir::{Function, IrBuilder};

pub use error::{JitError, JitResult};
pub use inline::{CacheDirected, InlinePolicy, InlineSite, NeverInline};
pub use options::{JitOptions, OptLevel};
pub use passes::run_opt;

use translator::Translator;

/// Result of compiling one method.
#[derive(Debug, Clone)]
pub struct JitArtifact {
    pub function: Function,
    /// Textual LLVM module holding `function` and its declarations.
    pub ir: String,
    /// `ir` after `opt`, when optimisation was requested and succeeded.
    pub optimised_ir: Option<String>,
    /// Dispatch sites emitted, including those inside inlined bodies.
    pub sends_done: usize,
    /// Call sites replaced by the body of their cached target.
    pub inlined: usize,
    /// Bytecode oddities that were tolerated.
    pub anomalies: Vec<String>,
}

pub struct JitCompiler {
    options: JitOptions,
    policy: Arc<dyn InlinePolicy>,
}

impl JitCompiler {
    pub fn new(options: JitOptions) -> Self {
        let policy = Arc::new(CacheDirected::new(options.max_inline_size));
        Self { options, policy }
    }

    pub fn with_policy(options: JitOptions, policy: Arc<dyn InlinePolicy>) -> Self {
        Self { options, policy }
    }

    pub fn options(&self) -> &JitOptions {
        &self.options
    }

    pub fn compile(&self, method: &CompiledMethod) -> JitResult<JitArtifact> {
        let mut builder = IrBuilder::new(method.name.clone());
        let (sends_done, inlined, anomalies) = {
            let mut translator = Translator::for_method(&mut builder, method, &self.options, self.policy.as_ref())?;
            translator.run()?;
            (translator.sends_done, translator.inlined, translator.anomalies)
        };
        let function = builder.finish();

        let header = ModuleHeader {
            module_name: &self.options.module_name,
            target_triple: self.options.target_triple.as_deref(),
        };
        let ir = render_module(&function, &header);
        let optimised_ir = if self.options.run_optimizations {
            match run_opt(&ir, self.options.opt_level) {
                Ok(optimised) => optimised,
                Err(err) => {
                    tracing::warn!(method = %method.name, "optimisation failed: {err:#}");
                    None
                }
            }
        } else {
            None
        };

        tracing::debug!(
            method = %method.name,
            blocks = function.blocks.len(),
            sends = sends_done,
            inlined,
            "translated method"
        );
        Ok(JitArtifact {
            function,
            ir,
            optimised_ir,
            sends_done,
            inlined,
            anomalies,
        })
    }
}

impl Default for JitCompiler {
    fn default() -> Self {
        Self::new(JitOptions::default())
    }
}
