//! Word offsets of the runtime records emitted code touches directly.
//!
//! All records are arrays of machine words; an offset `n` addresses the
//! `n`-th word (byte offset `n * WORD_SIZE`).

pub const WORD_SIZE: i64 = 8;

pub mod call_frame {
    /// Current instruction pointer, persisted at every instruction boundary.
    pub const IP: i64 = 0;
    /// Operand stack depth published before calls that may inspect the frame.
    pub const SP: i64 = 1;
    /// Pointer to the running method record.
    pub const CM: i64 = 2;
    /// The frame's own variable scope, written by the method prologue.
    pub const SCOPE: i64 = 3;
    /// Lexically enclosing scope (blocks), provided by the caller.
    pub const TOP_SCOPE: i64 = 4;
    pub const SIZE: i64 = 5;
}

pub mod vars {
    pub const SELF: i64 = 0;
    pub const BLOCK: i64 = 1;
    pub const PARENT: i64 = 2;
    /// First local slot; locals follow contiguously.
    pub const LOCALS: i64 = 3;

    pub const fn size(locals: usize) -> i64 {
        LOCALS + locals as i64
    }
}

/// Heap variable scope as seen through `vars::PARENT`.
pub mod scope {
    /// Pointer to the locals table.
    pub const LOCALS: i64 = 0;
}

pub mod method {
    /// Pointer to the literal tuple (one word per literal).
    pub const LITERALS: i64 = 0;
    pub const STATIC_SCOPE: i64 = 1;
    pub const SIZE: i64 = 2;
}

/// Outgoing argument record shared by every dispatch site of a function.
pub mod args {
    pub const RECV: i64 = 0;
    pub const BLOCK: i64 = 1;
    pub const TOTAL: i64 = 2;
    /// Pointer to the first argument word.
    pub const ARGUMENTS: i64 = 3;
    /// Materialized argument array, or null.
    pub const ARRAY: i64 = 4;
    pub const SIZE: i64 = 5;
}

pub mod inline_cache {
    pub const NAME: i64 = 0;
    pub const KLASS: i64 = 1;
    pub const METHOD: i64 = 2;
    pub const EXECUTE: i64 = 3;
    pub const HITS: i64 = 4;
    pub const WORDS: i64 = 5;
}

pub mod global_cache {
    pub const SERIAL: i64 = 0;
    pub const VALUE: i64 = 1;
    pub const WORDS: i64 = 2;
}
