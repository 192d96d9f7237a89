//! Process-wide symbol interning.
//!
//! Symbols are baked into emitted code as immediate words, so the id assigned
//! to a name must be stable for the lifetime of the process and identical on
//! every thread that compiles methods.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use once_cell::sync::Lazy;

use super::value;

static SYMBOLS: Lazy<SymbolTable> = Lazy::new(SymbolTable::default);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u64);

impl Symbol {
    pub fn id(self) -> u64 {
        self.0
    }

    /// Tagged object word for this symbol.
    pub fn word(self) -> i64 {
        value::symbol_word(self.0)
    }

    pub fn from_word(word: i64) -> Option<Symbol> {
        value::is_symbol(word).then(|| Symbol(value::symbol_id(word)))
    }

    pub fn name(self) -> Option<Arc<str>> {
        name_of(self.0)
    }
}

#[derive(Default)]
struct SymbolTable {
    by_name: DashMap<Arc<str>, u64>,
    by_id: DashMap<u64, Arc<str>>,
    next: AtomicU64,
}

impl SymbolTable {
    fn intern(&self, name: &str) -> Symbol {
        if let Some(id) = self.by_name.get(name) {
            return Symbol(*id);
        }
        let key: Arc<str> = Arc::from(name);
        let id = *self
            .by_name
            .entry(key.clone())
            .or_insert_with(|| self.next.fetch_add(1, Ordering::Relaxed) + 1);
        self.by_id.entry(id).or_insert(key);
        Symbol(id)
    }
}

/// Intern `name`, returning the same symbol for equal names on every thread.
pub fn intern(name: &str) -> Symbol {
    SYMBOLS.intern(name)
}

pub fn name_of(id: u64) -> Option<Arc<str>> {
    SYMBOLS.by_id.get(&id).map(|entry| entry.value().clone())
}
