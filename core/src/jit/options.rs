use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Optimization level to feed into LLVM's `opt` tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptLevel {
    #[serde(rename = "O0")]
    None,
    O1,
    #[default]
    O2,
    O3,
}

impl OptLevel {
    pub fn as_flag(&self) -> &'static str {
        match self {
            OptLevel::None => "-O0",
            OptLevel::O1 => "-O1",
            OptLevel::O2 => "-O2",
            OptLevel::O3 => "-O3",
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptLevel::None => write!(f, "O0"),
            OptLevel::O1 => write!(f, "O1"),
            OptLevel::O2 => write!(f, "O2"),
            OptLevel::O3 => write!(f, "O3"),
        }
    }
}

/// Configures a [`super::JitCompiler`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitOptions {
    /// Module name emitted in the IR header.
    pub module_name: String,
    /// Target triple to record in the module (if provided).
    pub target_triple: Option<String>,
    /// Splice monomorphic call targets into the caller.
    pub inlining: bool,
    /// Largest callee, in code words, the default inline policy accepts.
    pub max_inline_size: usize,
    /// Call the profiler's method-exit hook on return.
    pub include_profiling: bool,
    /// Address of the word that switches the profiler on. Without one the
    /// exit hook is called unconditionally.
    pub profiling_flag_address: Option<u64>,
    /// The method's scope may be captured, so it is flushed to the heap
    /// before returning.
    pub use_full_scope: bool,
    /// Whether to run LLVM optimisation passes via `opt`.
    pub run_optimizations: bool,
    /// Optimisation level when [`JitOptions::run_optimizations`] is true.
    pub opt_level: OptLevel,
}

impl Default for JitOptions {
    fn default() -> Self {
        Self {
            module_name: "bcjit_module".to_string(),
            target_triple: None,
            inlining: true,
            max_inline_size: 64,
            include_profiling: false,
            profiling_flag_address: None,
            use_full_scope: false,
            run_optimizations: false,
            opt_level: OptLevel::default(),
        }
    }
}

const INLINE_ENV: &str = "BCJIT_INLINE";
const PROFILE_ENV: &str = "BCJIT_PROFILE";

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("{key} must be 0 or 1, got `{other}`"),
    }
}

impl JitOptions {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).context("parse JIT options")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let source =
            std::fs::read_to_string(path).with_context(|| format!("read JIT options from {}", path.display()))?;
        Self::from_toml_str(&source).with_context(|| format!("in {}", path.display()))
    }

    /// Apply `BCJIT_INLINE` / `BCJIT_PROFILE` from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(INLINE_ENV) {
            self.inlining = parse_flag(INLINE_ENV, &raw)?;
        }
        if let Some(raw) = lookup(PROFILE_ENV) {
            self.include_profiling = parse_flag(PROFILE_ENV, &raw)?;
        }
        Ok(self)
    }
}
