//! 64-bit fingerprints and the recently-seen fingerprint cache

use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

/// Default number of cache slots
pub const DEFAULT_CACHE_CAPACITY: usize = 1 << 20;

// slot value meaning "empty"; fingerprints equal to it are remapped
const EMPTY: u64 = 0;
const EMPTY_REMAP: u64 = 0x9e37_79b9_7f4a_7c15;

/// Signed 64-bit fingerprint of a string
///
/// The first eight bytes of the SHA-256 digest, big-endian. Stable across
/// processes and platforms, so every node of a crawl computes the same value.
pub fn fingerprint64(s: &str) -> i64 {
    let digest = Sha256::digest(s.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

/// Bounded, lossy set of recently seen fingerprints
///
/// A direct-mapped table of atomic slots: a fingerprint lives in exactly one
/// slot and evicts whatever was there. Test-and-insert is a single atomic
/// swap, so concurrent callers never corrupt the table and at most one of
/// two racing callers with the same fingerprint sees it as new.
pub struct RecentlySeenCache {
    slots: Box<[AtomicU64]>,
    mask: usize,
}

impl RecentlySeenCache {
    /// Cache with at least `capacity` slots (rounded up to a power of two)
    pub fn new(capacity: usize) -> Self {
        let size = capacity.max(1).next_power_of_two();
        let slots = (0..size).map(|_| AtomicU64::new(EMPTY)).collect();
        Self {
            slots,
            mask: size - 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Insert `fp`; returns `true` if it was not already present
    pub fn add(&self, fp: i64) -> bool {
        let value = slot_value(fp);
        self.slot(value).swap(value, Ordering::AcqRel) != value
    }

    /// Whether `fp` is currently present
    pub fn contains(&self, fp: i64) -> bool {
        let value = slot_value(fp);
        self.slot(value).load(Ordering::Acquire) == value
    }

    fn slot(&self, value: u64) -> &AtomicU64 {
        &self.slots[smear(value) as usize & self.mask]
    }

    /// Forget everything
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.store(EMPTY, Ordering::Release);
        }
    }
}

impl Default for RecentlySeenCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

fn slot_value(fp: i64) -> u64 {
    match fp as u64 {
        EMPTY => EMPTY_REMAP,
        v => v,
    }
}

// spread high bits into the low bits used for indexing
fn smear(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x
}
