use std::fmt;

/// Why a method could not be translated.
///
/// Every variant aborts the compile of one method only; the interpreter keeps
/// running it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JitError {
    UnsupportedInstruction { ip: usize, name: &'static str },
    /// Two predecessors reach the block at `ip` with different stack depths.
    StackDepthMismatch { ip: usize, expected: usize, found: usize },
    StackUnderflow { ip: usize, needed: usize, depth: usize },
    StackOverflow { ip: usize, capacity: usize },
    /// A branch points outside the method or into the middle of an instruction.
    InvalidBranchTarget { ip: usize, target: usize },
    /// `pop_unwind` with no active handler.
    HandlerUnderflow { ip: usize },
    /// Handlers still open when the method ends.
    UnbalancedHandlers { open: usize },
    /// An operand indexes past the literal table, the caches or the locals.
    InvalidOperand { ip: usize, detail: String },
    /// Control runs past the last instruction.
    FallsOffEnd,
}

pub type JitResult<T> = Result<T, JitError>;

impl fmt::Display for JitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitError::UnsupportedInstruction { ip, name } => {
                write!(f, "unsupported instruction `{name}` at ip {ip}")
            }
            JitError::StackDepthMismatch { ip, expected, found } => write!(
                f,
                "stack depth mismatch entering ip {ip}: block expects {expected}, edge carries {found}"
            ),
            JitError::StackUnderflow { ip, needed, depth } => {
                write!(f, "stack underflow at ip {ip}: needs {needed} values, depth is {depth}")
            }
            JitError::StackOverflow { ip, capacity } => {
                write!(f, "stack overflow at ip {ip}: capacity is {capacity}")
            }
            JitError::InvalidBranchTarget { ip, target } => {
                write!(f, "instruction at ip {ip} branches to invalid target {target}")
            }
            JitError::HandlerUnderflow { ip } => write!(f, "pop_unwind at ip {ip} with no active handler"),
            JitError::UnbalancedHandlers { open } => {
                write!(f, "{open} unwind handler(s) still open at end of method")
            }
            JitError::InvalidOperand { ip, detail } => write!(f, "invalid operand at ip {ip}: {detail}"),
            JitError::FallsOffEnd => write!(f, "control falls off the end of the method"),
        }
    }
}

impl std::error::Error for JitError {}
