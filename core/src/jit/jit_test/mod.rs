pub(super) use std::sync::Arc;

pub(super) use crate::{
    bytecode::{CompiledMethod, Instruction, Literal, UnwindKind},
    ir::{Function, eval::Memory},
    jit::{JitArtifact, JitCompiler, JitError, JitOptions, NeverInline},
    rt::{ExitOutcome, GlobalCacheEntry, GlobalSerial, InlineCache, RuntimeHelper, intern, layout, value},
};

pub(super) use mock::{GENERIC_EXECUTE, Harness, MockVm, Pending, Reply, class};

mod mock;

pub(super) fn fix(n: i64) -> i64 {
    value::fixnum(n).unwrap()
}

pub(super) fn sym(name: &str) -> i64 {
    intern(name).word()
}

pub(super) fn cache(name: &str) -> Arc<InlineCache> {
    Arc::new(InlineCache::new(intern(name), GENERIC_EXECUTE))
}

pub(super) fn compile(method: &CompiledMethod) -> JitArtifact {
    compile_with(method, JitOptions::default())
}

pub(super) fn compile_with(method: &CompiledMethod, options: JitOptions) -> JitArtifact {
    JitCompiler::new(options).compile(method).unwrap()
}

pub(super) fn compile_err(method: &CompiledMethod) -> JitError {
    JitCompiler::default().compile(method).unwrap_err()
}

/// Compile `method` and run it once on `recv` with `argv`.
pub(super) fn run(method: &CompiledMethod, vm: &mut MockVm, recv: i64, argv: &[i64]) -> i64 {
    let artifact = compile(method);
    Harness::new(method).run(&artifact.function, vm, recv, argv).unwrap()
}

mod control_flow;
mod inline;
mod unwind;
