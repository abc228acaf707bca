//! Keyed storage with an incrementally maintained running sum.
//!
//! Every per-thread ledger (register liveness, memory liveness, load times,
//! remote breakdowns) is an [`AggregateMap`]. The map keeps a fixed number of
//! buckets chosen at construction; each bucket is a small inline list of
//! `(key, value)` pairs searched linearly. Alongside the pairs it tracks the
//! sum of the numeric value of everything stored, so `sum()` never scans.
//!
//! # Example
//!
//! ```
//! use avf_trace::ledger::AggregateMap;
//!
//! let mut map: AggregateMap<String, f64> = AggregateMap::new(16);
//! map.put("eax".to_string(), 3.0).unwrap();
//! map.put("ebx".to_string(), 4.0).unwrap();
//! map.put("eax".to_string(), 1.0).unwrap();
//!
//! assert_eq!(map.count(), 2);
//! assert_eq!(map.sum(), 5.0);
//! ```
//!
//! Pathological key distributions pile pairs into a few buckets and lookups
//! degrade towards a linear scan. That costs time, never correctness.

use std::borrow::Borrow;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{BuildHasher, BuildHasherDefault, Hash};

use smallvec::SmallVec;
use thiserror::Error;

/// Bucket count used by [`AggregateMap::default`].
pub const DEFAULT_BUCKETS: usize = 64;

/// Errors raised by ledger storage.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    /// The value has no finite numeric interpretation.
    #[error("value {value} stored under {key} is not a finite number")]
    NonFinite {
        /// Debug rendering of the offending key.
        key: String,
        /// The rejected numeric interpretation.
        value: f64,
    },
}

/// Numeric interpretation of a stored value.
///
/// The running sum of an [`AggregateMap`] is the sum of `tally()` over all
/// stored values.
pub trait Tally {
    /// Numeric contribution of this value to the map's running sum.
    fn tally(&self) -> f64;
}

impl Tally for f64 {
    fn tally(&self) -> f64 {
        *self
    }
}

impl Tally for u64 {
    fn tally(&self) -> f64 {
        *self as f64
    }
}

impl Tally for i64 {
    fn tally(&self) -> f64 {
        *self as f64
    }
}

impl Tally for u32 {
    fn tally(&self) -> f64 {
        f64::from(*self)
    }
}

type Bucket<K, V> = SmallVec<[(K, V); 4]>;

/// Hash map with fixed bucket count and O(1) aggregate sum.
#[derive(Clone)]
pub struct AggregateMap<K, V> {
    buckets: Vec<Bucket<K, V>>,
    len: usize,
    sum: f64,
    hasher: BuildHasherDefault<DefaultHasher>,
}

impl<K, V> Default for AggregateMap<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKETS)
    }
}

impl<K, V> AggregateMap<K, V> {
    /// Create an empty map with `bucket_count` buckets (at least one).
    pub fn new(bucket_count: usize) -> Self {
        let bucket_count = bucket_count.max(1);
        let mut buckets = Vec::with_capacity(bucket_count);
        buckets.resize_with(bucket_count, SmallVec::new);
        Self {
            buckets,
            len: 0,
            sum: 0.0,
            hasher: BuildHasherDefault::default(),
        }
    }

    /// Number of distinct keys stored.
    #[inline]
    pub fn count(&self) -> usize {
        self.len
    }

    /// True if nothing has been stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Running total of the numeric value of every stored entry.
    #[inline]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Number of buckets fixed at construction.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Iterate over all entries in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.iter().map(|(k, v)| (k, v)))
    }

    /// Drop every entry and reset the running sum.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.len = 0;
        self.sum = 0.0;
    }

    /// Entries sorted by key, for stable report output.
    pub fn sorted(&self) -> Vec<(&K, &V)>
    where
        K: Ord,
    {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl<K: Hash + Eq, V> AggregateMap<K, V> {
    fn bucket_of<Q>(&self, key: &Q) -> usize
    where
        Q: Hash + ?Sized,
    {
        (self.hasher.hash_one(key) % self.buckets.len() as u64) as usize
    }

    /// Look up the value stored under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.buckets[self.bucket_of(key)]
            .iter()
            .find(|(k, _)| k.borrow() == key)
            .map(|(_, v)| v)
    }
}

impl<K, V> AggregateMap<K, V>
where
    K: Hash + Eq + fmt::Debug,
    V: Tally,
{
    /// Insert or replace the value under `key`.
    ///
    /// Returns the previous value, if any. The running sum moves by
    /// `new - old` on replacement and by `new` on insertion.
    pub fn put(&mut self, key: K, value: V) -> Result<Option<V>, LedgerError> {
        let weight = value.tally();
        if !weight.is_finite() {
            return Err(LedgerError::NonFinite {
                key: format!("{:?}", key),
                value: weight,
            });
        }

        let index = self.bucket_of(&key);
        let bucket = &mut self.buckets[index];

        if let Some(slot) = bucket.iter_mut().find(|(k, _)| *k == key) {
            let old = std::mem::replace(&mut slot.1, value);
            self.sum += weight - old.tally();
            return Ok(Some(old));
        }

        bucket.push((key, value));
        self.len += 1;
        self.sum += weight;
        Ok(None)
    }

    /// Add `delta` to the numeric value under `key`, starting from zero.
    pub fn accumulate(&mut self, key: K, delta: V) -> Result<(), LedgerError>
    where
        V: Copy + std::ops::Add<Output = V>,
    {
        let next = match self.get(&key) {
            Some(current) => *current + delta,
            None => delta,
        };
        self.put(key, next).map(|_| ())
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for AggregateMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateMap")
            .field("len", &self.len)
            .field("sum", &self.sum)
            .field("buckets", &self.buckets.len())
            .finish()
    }
}
