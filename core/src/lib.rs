//! Translates Rubinius-style stack bytecode into an SSA IR that lowers to
//! textual LLVM, one method at a time.

pub mod bytecode;
pub mod ir;
pub mod jit;
pub mod rt;
