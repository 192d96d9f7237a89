//! Tagged object words as the VM lays them out.
//!
//! Every object handle is one machine word. Heap references are 8-byte
//! aligned and carry `TAG_REF` in their two low bits; small integers
//! ("fixnums") set the low bit and keep a 63-bit two's-complement payload in
//! the remaining bits; symbols and the special constants live in the other
//! immediate tag space. Emitted code relies on two properties of this scheme:
//! fixnum tagging preserves signed ordering, and every falsy value (`false`,
//! `nil`) shares the same low nibble under [`FALSE_MASK`].

/// Tag bits of a heap reference.
pub const TAG_REF: i64 = 0x0;
pub const TAG_REF_MASK: i64 = 0x3;

pub const TAG_FIXNUM: i64 = 0x1;
pub const TAG_FIXNUM_MASK: i64 = 0x1;
pub const TAG_FIXNUM_SHIFT: u32 = 1;

pub const TAG_SYMBOL: i64 = 0x6;
pub const TAG_SYMBOL_MASK: i64 = 0x7;
pub const TAG_SYMBOL_SHIFT: u32 = 3;

/// Encoded `false`.
pub const Q_FALSE: i64 = 0x0a;
/// Encoded `true`.
pub const Q_TRUE: i64 = 0x12;
/// Encoded `nil`.
pub const Q_NIL: i64 = 0x1a;
/// Encoded "no value" marker used for absent optional arguments.
pub const Q_UNDEF: i64 = 0x22;

/// `(word & FALSE_MASK) == Q_FALSE` holds exactly for `false` and `nil`.
pub const FALSE_MASK: i64 = 0xf;

/// Null object word. Never a valid object; helpers return it to signal that
/// a non-local transfer is pending (or that no result exists).
pub const NULL: i64 = 0;

/// Width in bits of a fixnum payload.
pub const FIXNUM_BITS: u32 = 63;
pub const FIXNUM_MAX: i64 = (1 << (FIXNUM_BITS - 1)) - 1;
pub const FIXNUM_MIN: i64 = -(1 << (FIXNUM_BITS - 1));

#[inline]
pub const fn fixnum_fits(value: i64) -> bool {
    value >= FIXNUM_MIN && value <= FIXNUM_MAX
}

/// Encode `value` as a fixnum word. Returns `None` when the value needs more
/// than 63 bits.
#[inline]
pub const fn fixnum(value: i64) -> Option<i64> {
    if fixnum_fits(value) {
        Some((value << TAG_FIXNUM_SHIFT) | TAG_FIXNUM)
    } else {
        None
    }
}

#[inline]
pub const fn is_fixnum(word: i64) -> bool {
    word & TAG_FIXNUM_MASK == TAG_FIXNUM
}

/// Payload of a fixnum word. Only meaningful when [`is_fixnum`] holds.
#[inline]
pub const fn fixnum_value(word: i64) -> i64 {
    word >> TAG_FIXNUM_SHIFT
}

#[inline]
pub const fn is_reference(word: i64) -> bool {
    word & TAG_REF_MASK == TAG_REF
}

#[inline]
pub const fn is_symbol(word: i64) -> bool {
    word & TAG_SYMBOL_MASK == TAG_SYMBOL
}

#[inline]
pub const fn symbol_word(id: u64) -> i64 {
    ((id as i64) << TAG_SYMBOL_SHIFT) | TAG_SYMBOL
}

#[inline]
pub const fn symbol_id(word: i64) -> u64 {
    (word >> TAG_SYMBOL_SHIFT) as u64
}

#[inline]
pub const fn boolean(flag: bool) -> i64 {
    if flag { Q_TRUE } else { Q_FALSE }
}

/// Interpreter truthiness: everything except `false` and `nil`.
#[inline]
pub const fn is_truthy(word: i64) -> bool {
    word & FALSE_MASK != Q_FALSE
}

/// Decoded view of an immediate word, used by tooling and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Immediate {
    Nil,
    True,
    False,
    Undef,
    Fixnum(i64),
    Symbol(u64),
    Reference(i64),
    Null,
}

impl Immediate {
    pub fn decode(word: i64) -> Self {
        match word {
            NULL => Immediate::Null,
            Q_NIL => Immediate::Nil,
            Q_TRUE => Immediate::True,
            Q_FALSE => Immediate::False,
            Q_UNDEF => Immediate::Undef,
            w if is_fixnum(w) => Immediate::Fixnum(fixnum_value(w)),
            w if is_symbol(w) => Immediate::Symbol(symbol_id(w)),
            w => Immediate::Reference(w),
        }
    }
}

impl std::fmt::Display for Immediate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Immediate::Nil => write!(f, "nil"),
            Immediate::True => write!(f, "true"),
            Immediate::False => write!(f, "false"),
            Immediate::Undef => write!(f, "undef"),
            Immediate::Fixnum(v) => write!(f, "{v}"),
            Immediate::Symbol(id) => match super::symbol::name_of(*id) {
                Some(name) => write!(f, ":{name}"),
                None => write!(f, ":#{id}"),
            },
            Immediate::Reference(addr) => write!(f, "#<ref {addr:#x}>"),
            Immediate::Null => write!(f, "NULL"),
        }
    }
}
