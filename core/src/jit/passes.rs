//! Optional LLVM `opt` run over a rendered module.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};

use super::options::OptLevel;

const OPT_ENV: &str = "BCJIT_LLVM_OPT";

/// `BCJIT_LLVM_OPT` if it names an existing file, then the toolchain's
/// bundled `opt`, then whatever `opt` is on `PATH`.
fn resolve_opt_path() -> PathBuf {
    std::env::var_os(OPT_ENV)
        .map(PathBuf::from)
        .filter(|path| path.exists())
        .or_else(bundled_opt)
        .unwrap_or_else(|| PathBuf::from("opt"))
}

#[cfg(feature = "llvm")]
fn bundled_opt() -> Option<PathBuf> {
    llvm_tools::LlvmTools::new().ok()?.tool("opt")
}

#[cfg(not(feature = "llvm"))]
fn bundled_opt() -> Option<PathBuf> {
    None
}

/// Optimise `ir` at `opt_level`.
///
/// `Ok(None)` means the module could not be optimised (no `opt`, or `opt`
/// rejected it); the caller keeps the unoptimised text.
pub fn run_opt(ir: &str, opt_level: OptLevel) -> Result<Option<String>> {
    run_opt_with(&resolve_opt_path(), ir, opt_level)
}

pub(crate) fn run_opt_with(opt: &Path, ir: &str, opt_level: OptLevel) -> Result<Option<String>> {
    let dir = tempfile::Builder::new()
        .prefix("bcjit-opt")
        .tempdir()
        .context("create scratch directory for opt")?;
    let input = dir.path().join("module.ll");
    let output = dir.path().join("module.opt.ll");
    std::fs::write(&input, ir).context("write module for opt")?;

    let run = Command::new(opt)
        .arg(opt_level.as_flag())
        .arg("-S")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .output();

    match run {
        Ok(run) if run.status.success() => {
            let optimised = std::fs::read_to_string(&output).context("read module written by opt")?;
            tracing::debug!(level = %opt_level, bytes = optimised.len(), "optimised module");
            Ok(Some(optimised))
        }
        Ok(run) => {
            let stderr = String::from_utf8_lossy(&run.stderr);
            tracing::warn!(
                opt = %opt.display(),
                status = %run.status,
                "opt rejected the module: {}",
                stderr.trim()
            );
            Ok(None)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(opt = %opt.display(), "opt not found; module left unoptimised");
            Ok(None)
        }
        Err(err) => Err(err).with_context(|| format!("spawn {}", opt.display())),
    }
}
