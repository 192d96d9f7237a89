use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::layout::global_cache as field;
use super::value;

/// Process-wide modification counter. Bumped whenever a constant binding
/// changes anywhere; every cached constant lookup compares against it.
#[repr(C)]
#[derive(Debug)]
pub struct GlobalSerial(AtomicU64);

impl GlobalSerial {
    pub fn new(initial: u64) -> Self {
        Self(AtomicU64::new(initial))
    }

    pub fn address(&self) -> u64 {
        &self.0 as *const AtomicU64 as u64
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Invalidate every constant cache entry at once.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

const UNFILLED: u64 = u64::MAX;

/// Cached result of one constant-lookup site.
///
/// Emitted code reads [`field::SERIAL`] and [`field::VALUE`] through the
/// address of the record; only the runtime refills it.
#[repr(C)]
#[derive(Debug)]
pub struct GlobalCacheEntry {
    serial: AtomicU64,
    value: AtomicU64,
    global: Arc<GlobalSerial>,
}

impl GlobalCacheEntry {
    /// An empty entry. Its recorded serial is one the global counter does not
    /// reach, so the first lookup always misses.
    pub fn new(global: Arc<GlobalSerial>) -> Self {
        Self {
            serial: AtomicU64::new(UNFILLED),
            value: AtomicU64::new(value::Q_NIL as u64),
            global,
        }
    }

    pub fn address(&self) -> u64 {
        self as *const GlobalCacheEntry as u64
    }

    pub fn global(&self) -> &Arc<GlobalSerial> {
        &self.global
    }

    pub fn serial(&self) -> u64 {
        self.serial.load(Ordering::Acquire)
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Acquire) as i64
    }

    pub fn is_valid(&self) -> bool {
        self.serial() == self.global.get()
    }

    /// Store a freshly looked-up value, stamped with the current serial.
    ///
    /// The value is published before the serial so a reader that observes the
    /// new serial also observes the new value.
    pub fn fill(&self, value: i64) {
        self.value.store(value as u64, Ordering::Release);
        self.serial.store(self.global.get(), Ordering::Release);
    }

    pub fn read_field(&self, index: i64) -> Option<i64> {
        match index {
            field::SERIAL => Some(self.serial() as i64),
            field::VALUE => Some(self.value()),
            _ => None,
        }
    }
}
