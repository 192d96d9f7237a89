use std::io::Write as _;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use bcjit_core::jit::{JitArtifact, JitCompiler, JitOptions, OptLevel};
use bcjit_core::rt::GlobalSerial;
use clap::{Parser, Subcommand, ValueEnum};

mod method_file;

use method_file::MethodSpec;

const LOG_ENV: &str = "BCJIT_LOG";
const DEFAULT_LOG_FILTER: &str = "bcjit_core=info,bcjit_cli=info";

#[derive(Debug, Parser)]
#[command(
    name = "bcjit",
    author,
    version,
    about = "Translate method bytecode into LLVM IR",
    long_about = None
)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmitKind {
    /// Textual LLVM module.
    Ir,
    /// The translated function as JSON.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OptLevelCli {
    O0,
    O1,
    O2,
    O3,
}

impl From<OptLevelCli> for OptLevel {
    fn from(value: OptLevelCli) -> Self {
        match value {
            OptLevelCli::O0 => OptLevel::None,
            OptLevelCli::O1 => OptLevel::O1,
            OptLevelCli::O2 => OptLevel::O2,
            OptLevelCli::O3 => OptLevel::O3,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Translate one method description.
    Compile {
        /// Method description (JSON)
        #[arg(value_name = "METHOD", value_parser = parse_sanitized_path)]
        method: PathBuf,
        /// JIT options (TOML); `BCJIT_INLINE` / `BCJIT_PROFILE` still apply
        #[arg(long, value_name = "FILE", value_parser = parse_sanitized_path)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = EmitKind::Ir)]
        emit: EmitKind,
        /// Send every call through its cache
        #[arg(long)]
        no_inline: bool,
        /// Call the profiler hook on return
        #[arg(long)]
        profiling: bool,
        /// Run LLVM `opt` over the module and emit its output
        #[arg(long, value_enum)]
        opt: Option<OptLevelCli>,
        /// Write the output here instead of stdout
        #[arg(short, long, value_name = "OUT", value_parser = parse_sanitized_path)]
        output: Option<PathBuf>,
    },
}

pub(crate) fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(anyhow::anyhow!(
                "Parent directory components ('..') are not allowed in file paths."
            ));
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;

    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|expr| EnvFilter::try_new(expr.trim()).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = fmt().with_writer(std::io::stderr).with_env_filter(filter).try_init();
}

pub(crate) struct CompileRequest<'a> {
    config: Option<&'a Path>,
    no_inline: bool,
    profiling: bool,
    opt: Option<OptLevelCli>,
}

/// Resolve options: defaults or the config file, then the environment, then
/// command-line flags.
pub(crate) fn resolve_options(request: &CompileRequest<'_>) -> anyhow::Result<JitOptions> {
    let base = match request.config {
        Some(path) => JitOptions::from_path(path)?,
        None => JitOptions::default(),
    };
    let mut options = base.apply_env()?;
    if request.no_inline {
        options.inlining = false;
    }
    if request.profiling {
        options.include_profiling = true;
    }
    if let Some(level) = request.opt {
        options.run_optimizations = true;
        options.opt_level = level.into();
    }
    tracing::debug!(
        inlining = options.inlining,
        profiling = options.include_profiling,
        opt = %options.opt_level,
        "resolved JIT options"
    );
    Ok(options)
}

fn render(artifact: &JitArtifact, emit: EmitKind) -> anyhow::Result<String> {
    match emit {
        EmitKind::Ir => Ok(artifact.optimised_ir.clone().unwrap_or_else(|| artifact.ir.clone())),
        EmitKind::Json => artifact.function.to_json(),
    }
}

fn summary(name: &str, artifact: &JitArtifact) -> String {
    format!(
        "{name}: {} blocks, {} sends, {} inlined, {} anomalies",
        artifact.function.blocks.len(),
        artifact.sends_done,
        artifact.inlined,
        artifact.anomalies.len()
    )
}

fn compile(method_path: &Path, request: &CompileRequest<'_>, emit: EmitKind, output: Option<&Path>) -> anyhow::Result<()> {
    let options = resolve_options(request)?;
    let spec = MethodSpec::from_path(method_path)?;
    let method = spec.build(&Arc::new(GlobalSerial::new(1)))?;

    let artifact = JitCompiler::new(options)
        .compile(&method)
        .with_context(|| format!("translate `{}`", method.name))?;

    let text = render(&artifact, emit)?;
    match output {
        Some(path) => {
            std::fs::write(path, &text).with_context(|| format!("write {}", path.display()))?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes()).context("write to stdout")?;
            if !text.ends_with('\n') {
                stdout.write_all(b"\n").context("write to stdout")?;
            }
        }
    }
    eprintln!("{}", summary(&method.name, &artifact));
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let CliArgs { command } = CliArgs::parse();
    match command {
        Commands::Compile {
            method,
            config,
            emit,
            no_inline,
            profiling,
            opt,
            output,
        } => {
            let request = CompileRequest {
                config: config.as_deref(),
                no_inline,
                profiling,
                opt,
            };
            compile(&method, &request, emit, output.as_deref())
        }
    }
}
