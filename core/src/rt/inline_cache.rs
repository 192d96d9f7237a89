use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::bytecode::CompiledMethod;

use super::layout::inline_cache as field;
use super::symbol::Symbol;

/// How much receiver diversity a call site has observed.
///
/// Sites only move forward through the states; a megamorphic site never
/// becomes monomorphic again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IcState {
    Uninitialized = 0,
    Monomorphic = 1,
    Polymorphic = 2,
    Megamorphic = 3,
}

impl IcState {
    #[inline]
    pub const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Uninitialized,
            1 => Self::Monomorphic,
            2 => Self::Polymorphic,
            _ => Self::Megamorphic,
        }
    }

    #[inline]
    pub const fn is_monomorphic(self) -> bool {
        matches!(self, Self::Monomorphic)
    }
}

/// Number of distinct receiver classes a polymorphic site tolerates before it
/// gives up on guarded dispatch.
const POLYMORPHIC_LIMIT: u64 = 4;

/// Per-call-site dispatch record.
///
/// The first [`field::WORDS`] words are laid out exactly as emitted code
/// reads them: generated IR bakes [`InlineCache::address`] as a constant and
/// loads `execute` from word [`field::EXECUTE`] on every dispatch. The runtime
/// swaps the fields while compiled code runs; every word is an atomic so such
/// reads are always well-defined, and a stale read only ever sends a call
/// down the generic path.
#[repr(C)]
#[derive(Debug)]
pub struct InlineCache {
    name: AtomicU64,
    klass: AtomicU64,
    method: AtomicU64,
    execute: AtomicU64,
    hits: AtomicU64,
    state: AtomicU8,
    seen: AtomicU64,
    body: RwLock<Option<Arc<CompiledMethod>>>,
}

/// A monomorphic target whose body is available for splicing.
#[derive(Debug, Clone)]
pub struct InlineTarget {
    pub klass: i64,
    pub body: Arc<CompiledMethod>,
}

impl InlineCache {
    pub fn new(name: Symbol, execute: u64) -> Self {
        Self {
            name: AtomicU64::new(name.word() as u64),
            klass: AtomicU64::new(0),
            method: AtomicU64::new(0),
            execute: AtomicU64::new(execute),
            hits: AtomicU64::new(0),
            state: AtomicU8::new(IcState::Uninitialized as u8),
            seen: AtomicU64::new(0),
            body: RwLock::new(None),
        }
    }

    /// Stable address of the record, baked into emitted code.
    pub fn address(&self) -> u64 {
        self as *const InlineCache as u64
    }

    pub fn name(&self) -> Symbol {
        let word = self.name.load(Ordering::Relaxed) as i64;
        Symbol::from_word(word).unwrap_or_else(|| super::symbol::intern("<invalid>"))
    }

    pub fn state(&self) -> IcState {
        IcState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn klass(&self) -> i64 {
        self.klass.load(Ordering::Acquire) as i64
    }

    pub fn execute(&self) -> u64 {
        self.execute.load(Ordering::Acquire)
    }

    pub fn set_execute(&self, execute: u64) {
        self.execute.store(execute, Ordering::Release);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dispatch to `method` for a receiver of class `klass`.
    ///
    /// `body` is the callee's bytecode when the callee is itself a compiled
    /// method; only a monomorphic site keeps it.
    pub fn record(&self, klass: i64, method: u64, body: Option<Arc<CompiledMethod>>) {
        match self.state() {
            IcState::Uninitialized => {
                self.install(klass, method, body);
                self.seen.store(1, Ordering::Relaxed);
                self.state.store(IcState::Monomorphic as u8, Ordering::Release);
            }
            IcState::Monomorphic if self.klass() == klass => {}
            IcState::Monomorphic | IcState::Polymorphic => {
                self.install(klass, method, None);
                let seen = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
                let next = if seen > POLYMORPHIC_LIMIT {
                    IcState::Megamorphic
                } else {
                    IcState::Polymorphic
                };
                self.state.store(next as u8, Ordering::Release);
            }
            IcState::Megamorphic => {}
        }
    }

    fn install(&self, klass: i64, method: u64, body: Option<Arc<CompiledMethod>>) {
        match self.body.write() {
            Ok(mut guard) => *guard = body,
            Err(poisoned) => *poisoned.into_inner() = body,
        }
        self.method.store(method, Ordering::Relaxed);
        self.klass.store(klass as u64, Ordering::Release);
    }

    /// The spliceable target, if the site is monomorphic and its callee has a
    /// known body.
    pub fn inline_target(&self) -> Option<InlineTarget> {
        if !self.state().is_monomorphic() {
            return None;
        }
        let body = match self.body.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }?;
        Some(InlineTarget {
            klass: self.klass(),
            body,
        })
    }

    /// Read word `index` of the emitted-code view of this record.
    pub fn read_field(&self, index: i64) -> Option<i64> {
        let word = match index {
            field::NAME => self.name.load(Ordering::Relaxed),
            field::KLASS => self.klass.load(Ordering::Acquire),
            field::METHOD => self.method.load(Ordering::Relaxed),
            field::EXECUTE => self.execute.load(Ordering::Acquire),
            field::HITS => self.hits.load(Ordering::Relaxed),
            _ => return None,
        };
        Some(word as i64)
    }
}
