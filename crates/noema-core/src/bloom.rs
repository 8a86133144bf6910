//! Counting bloom filter (C1).
//!
//! A superset membership structure over lowercased entity names (spec.md
//! §4.1, invariant P3). Supports removal via small saturating counters, and
//! persists to a sidecar file next to the database (§6 on-disk layout).

use std::io::{Read, Write};
use std::path::Path;

use tracing::{debug, warn};

const MAGIC: u32 = 0x4E42_4C4D; // "NBLM"
const VERSION: u32 = 1;
const COUNTER_MAX: u8 = 255;

/// A counting bloom filter sized from `expected_items` / `false_positive_rate`.
#[derive(Debug, Clone)]
pub struct CountingBloomFilter {
    counters: Vec<u8>,
    num_bits: usize,
    num_hashes: u32,
    seeds: Vec<u64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BloomStats {
    pub num_bits: usize,
    pub num_hashes: u32,
    pub load: f64,
    pub saturated: usize,
}

impl CountingBloomFilter {
    /// Size the filter from the standard bloom-filter formulas:
    /// `m = -(n * ln(p)) / (ln(2)^2)`, `k = (m/n) * ln(2)`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(1e-6, 0.5);
        let m = (-(n * p.ln()) / (std::f64::consts::LN_2.powi(2))).ceil().max(8.0);
        let k = ((m / n) * std::f64::consts::LN_2).round().clamp(1.0, 16.0) as u32;
        let num_bits = m as usize;
        let seeds = (0..k).map(|i| 0x9E37_79B9_7F4A_7C15u64.wrapping_mul(i as u64 + 1).wrapping_add(0xD1B5_4A32_D192_ED03)).collect();
        Self { counters: vec![0u8; num_bits], num_bits, num_hashes: k, seeds }
    }

    fn slots(&self, key: &str) -> impl Iterator<Item = usize> + '_ {
        let lower = key.to_lowercase();
        self.seeds.iter().map(move |seed| {
            let mut hash = *seed;
            for b in lower.bytes() {
                hash = hash.wrapping_mul(1_099_511_628_211).wrapping_add(b as u64);
            }
            (hash as usize) % self.num_bits
        })
    }

    /// Increment every hashed slot (saturating at `COUNTER_MAX`).
    pub fn add(&mut self, key: &str) {
        for slot in self.slots(key).collect::<Vec<_>>() {
            if self.counters[slot] < COUNTER_MAX {
                self.counters[slot] += 1;
            }
        }
    }

    /// Decrement every hashed slot. Best-effort: a saturated counter is left
    /// at `COUNTER_MAX` (we no longer know its true count), which keeps the
    /// filter a superset per spec.md §4.1.
    pub fn remove(&mut self, key: &str) {
        for slot in self.slots(key).collect::<Vec<_>>() {
            if self.counters[slot] < COUNTER_MAX && self.counters[slot] > 0 {
                self.counters[slot] -= 1;
            }
        }
    }

    /// True iff every hashed slot is non-zero. May false-positive; never
    /// false-negatives a name that was added and not fully removed (P3).
    pub fn contains(&self, key: &str) -> bool {
        self.slots(key).all(|slot| self.counters[slot] != 0)
    }

    pub fn stats(&self) -> BloomStats {
        let nonzero = self.counters.iter().filter(|&&c| c != 0).count();
        let saturated = self.counters.iter().filter(|&&c| c == COUNTER_MAX).count();
        BloomStats {
            num_bits: self.num_bits,
            num_hashes: self.num_hashes,
            load: nonzero as f64 / self.num_bits.max(1) as f64,
            saturated,
        }
    }

    /// Rebuild from scratch using the given committed entity names.
    pub fn rebuild_from<'a>(&mut self, names: impl Iterator<Item = &'a str>) {
        self.counters.iter_mut().for_each(|c| *c = 0);
        for name in names {
            self.add(name);
        }
    }

    /// Write the sidecar atomically: header + counter array, little-endian,
    /// via a temp file + rename so a crash never leaves a half-written file.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let tmp = path.with_extension("cbloom.tmp");
        {
            let mut f = std::fs::File::create(&tmp)?;
            f.write_all(&MAGIC.to_le_bytes())?;
            f.write_all(&VERSION.to_le_bytes())?;
            f.write_all(&(self.num_bits as u64).to_le_bytes())?;
            f.write_all(&self.num_hashes.to_le_bytes())?;
            f.write_all(&(self.seeds.len() as u32).to_le_bytes())?;
            for seed in &self.seeds {
                f.write_all(&seed.to_le_bytes())?;
            }
            f.write_all(&self.counters)?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        debug!(bits = self.num_bits, "bloom sidecar written");
        Ok(())
    }

    /// Load the sidecar; any parse failure or header mismatch is reported as
    /// `None` so the caller rebuilds from the entities table (self-validating,
    /// per §6).
    pub fn load(path: &Path) -> Option<Self> {
        let mut f = std::fs::File::open(path).ok()?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf).ok()?;
        Self::parse(&buf)
    }

    fn parse(buf: &[u8]) -> Option<Self> {
        let mut cursor = 0usize;
        let read_u32 = |buf: &[u8], at: &mut usize| -> Option<u32> {
            let v = u32::from_le_bytes(buf.get(*at..*at + 4)?.try_into().ok()?);
            *at += 4;
            Some(v)
        };
        let read_u64 = |buf: &[u8], at: &mut usize| -> Option<u64> {
            let v = u64::from_le_bytes(buf.get(*at..*at + 8)?.try_into().ok()?);
            *at += 8;
            Some(v)
        };

        let magic = read_u32(buf, &mut cursor)?;
        let version = read_u32(buf, &mut cursor)?;
        if magic != MAGIC || version != VERSION {
            warn!("bloom sidecar header mismatch, will rebuild");
            return None;
        }
        let num_bits = read_u64(buf, &mut cursor)? as usize;
        let num_hashes = read_u32(buf, &mut cursor)?;
        let num_seeds = read_u32(buf, &mut cursor)? as usize;
        let mut seeds = Vec::with_capacity(num_seeds);
        for _ in 0..num_seeds {
            seeds.push(read_u64(buf, &mut cursor)?);
        }
        let counters = buf.get(cursor..cursor + num_bits)?.to_vec();
        Some(Self { counters, num_bits, num_hashes, seeds })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_contains() {
        let mut bloom = CountingBloomFilter::new(1_000, 0.01);
        bloom.add("Alice");
        assert!(bloom.contains("alice"));
        assert!(bloom.contains("ALICE"));
    }

    #[test]
    fn remove_clears_membership_when_not_shared() {
        let mut bloom = CountingBloomFilter::new(1_000, 0.01);
        bloom.add("solo-name-xyz");
        bloom.remove("solo-name-xyz");
        assert!(!bloom.contains("solo-name-xyz"));
    }

    #[test]
    fn never_false_negative_while_still_present() {
        let mut bloom = CountingBloomFilter::new(100, 0.05);
        for i in 0..50 {
            bloom.add(&format!("name-{i}"));
        }
        for i in 0..50 {
            assert!(bloom.contains(&format!("name-{i}")), "false negative on name-{i}");
        }
    }

    #[test]
    fn roundtrips_through_save_and_load() {
        let mut bloom = CountingBloomFilter::new(500, 0.01);
        bloom.add("persisted");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.cbloom");
        bloom.save(&path).unwrap();
        let loaded = CountingBloomFilter::load(&path).unwrap();
        assert!(loaded.contains("persisted"));
        assert_eq!(loaded.num_bits, bloom.num_bits);
    }

    #[test]
    fn rejects_corrupt_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.cbloom");
        std::fs::write(&path, b"not a bloom file").unwrap();
        assert!(CountingBloomFilter::load(&path).is_none());
    }
}
