//! Runtime ABI facts the translator consumes: the tagged-word scheme, record
//! layouts, shared cache records and the helper table.

mod global_cache;
mod helpers;
mod inline_cache;
pub mod layout;
pub mod symbol;
pub mod value;

pub use global_cache::{GlobalCacheEntry, GlobalSerial};
pub use helpers::RuntimeHelper;
pub use inline_cache::{IcState, InlineCache, InlineTarget};
pub use symbol::{Symbol, intern};

/// What a call into compiled code (or a helper) produced, decoded from the
/// null-sentinel convention the runtime helpers use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// A real object word.
    Value(i64),
    /// Null, and the VM holds a raise, break or non-local return that some
    /// outer frame must handle.
    Pending,
    /// Null with nothing pending: the method gave up and the interpreter must
    /// run it instead.
    Fallback,
}

impl ExitOutcome {
    /// Classify a raw result word. `pending` reports whether the VM currently
    /// carries a non-local transfer.
    pub fn classify(word: i64, pending: bool) -> Self {
        if word != value::NULL {
            ExitOutcome::Value(word)
        } else if pending {
            ExitOutcome::Pending
        } else {
            ExitOutcome::Fallback
        }
    }

    pub fn value(self) -> Option<i64> {
        match self {
            ExitOutcome::Value(word) => Some(word),
            _ => None,
        }
    }
}
