//! C8: a persistent, non-overlapping set of `[begin, end)` byte intervals, used as
//! the Online Indexer's build checkpoint (§4.4). Intervals are stored one per row —
//! `(begin) -> end` — under the index's child of the `index_build` subspace, the
//! "practical scheme" §4.4 names explicitly. `begin` is a raw record-subspace key,
//! so it is appended to the subspace prefix unescaped via `Subspace::pack_raw`
//! rather than re-encoded as a tuple component.

use strata_core::StoreError;
use strata_keyspace::{Keyspace, Tuple};
use strata_storage_kv::KvTransaction;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeSet {
    /// Sorted, non-overlapping, non-adjacent (coalesced) intervals.
    intervals: Vec<(Vec<u8>, Vec<u8>)>,
}

impl RangeSet {
    pub fn new() -> Self { Self::default() }

    pub fn intervals(&self) -> &[(Vec<u8>, Vec<u8>)] { &self.intervals }

    fn child(keyspace: &Keyspace, index_name: &str) -> strata_keyspace::Subspace { keyspace.index_build.child(index_name) }

    pub async fn load(txn: &mut dyn KvTransaction, keyspace: &Keyspace, index_name: &str) -> Result<Self, StoreError> {
        let sub = Self::child(keyspace, index_name);
        let (begin, end) = sub.prefix_range(&Tuple::empty());
        let pairs = txn.get_range(&begin, &end, None).await?;
        let prefix_len = sub.as_bytes().len();
        let intervals = pairs.into_iter().map(|(k, v)| (k[prefix_len..].to_vec(), v)).collect();
        Ok(Self { intervals })
    }

    /// Rewrites every row this range-set owns. Called inside the same transaction
    /// as the index writes it checkpoints (§4.5's crash-safety requirement).
    pub async fn persist(&self, txn: &mut dyn KvTransaction, keyspace: &Keyspace, index_name: &str) -> Result<(), StoreError> {
        let sub = Self::child(keyspace, index_name);
        let (begin, end) = sub.prefix_range(&Tuple::empty());
        txn.clear_range(&begin, &end).await?;
        for (b, e) in &self.intervals {
            txn.set(&sub.pack_raw(b), e).await?;
        }
        Ok(())
    }

    /// Idempotent; merges touching/overlapping intervals (§4.4).
    pub fn insert(&mut self, begin: Vec<u8>, end: Vec<u8>) {
        if begin >= end {
            return;
        }
        let mut merged_begin = begin;
        let mut merged_end = end;
        let mut out = Vec::with_capacity(self.intervals.len() + 1);
        let mut placed = false;
        for (b, e) in self.intervals.drain(..) {
            if e < merged_begin {
                out.push((b, e));
            } else if merged_end < b {
                if !placed {
                    out.push((merged_begin.clone(), merged_end.clone()));
                    placed = true;
                }
                out.push((b, e));
            } else {
                if b < merged_begin {
                    merged_begin = b;
                }
                if e > merged_end {
                    merged_end = e;
                }
            }
        }
        if !placed {
            out.push((merged_begin, merged_end));
        }
        self.intervals = out;
    }

    /// The complement of the covered union, restricted to `[full_begin, full_end)`,
    /// as a canonical sorted list (§4.4, §3.3 invariant 6).
    pub fn missing(&self, full_begin: &[u8], full_end: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        if full_begin >= full_end {
            return Vec::new();
        }
        let full_end = full_end.to_vec();
        let mut gaps = Vec::new();
        let mut cursor = full_begin.to_vec();
        for (b, e) in &self.intervals {
            if *e <= cursor || *b >= full_end {
                continue;
            }
            let clipped_b = if *b > cursor { b.clone() } else { cursor.clone() };
            if clipped_b > cursor {
                gaps.push((cursor.clone(), clipped_b));
            }
            let clipped_e = if *e < full_end { e.clone() } else { full_end.clone() };
            if clipped_e > cursor {
                cursor = clipped_e;
            }
            if cursor >= full_end {
                break;
            }
        }
        if cursor < full_end {
            gaps.push((cursor, full_end));
        }
        gaps
    }

    /// Fraction of `[full_begin, full_end)` covered, in `[0, 1]` (§4.4). Keys are
    /// compared as fixed-point fractions of their leading bytes rather than exact
    /// big-integer arithmetic — enough precision for a progress estimate without
    /// pulling in a bignum dependency.
    pub fn progress(&self, full_begin: &[u8], full_end: &[u8]) -> f64 {
        if full_begin >= full_end {
            return 1.0;
        }
        let depth = 16usize;
        let total = key_fraction(full_end, depth) - key_fraction(full_begin, depth);
        if total <= 0.0 {
            return 1.0;
        }
        let mut covered = 0.0;
        for (b, e) in &self.intervals {
            let cb = clamp_key(b, full_begin, full_end);
            let ce = clamp_key(e, full_begin, full_end);
            if cb < ce {
                covered += key_fraction(&ce, depth) - key_fraction(&cb, depth);
            }
        }
        (covered / total).clamp(0.0, 1.0)
    }
}

fn key_fraction(key: &[u8], depth: usize) -> f64 {
    let mut frac = 0.0;
    let mut scale = 1.0 / 256.0;
    for i in 0..depth {
        let byte = *key.get(i).unwrap_or(&0) as f64;
        frac += byte * scale;
        scale /= 256.0;
    }
    frac
}

fn clamp_key(k: &[u8], lo: &[u8], hi: &[u8]) -> Vec<u8> {
    if k < lo {
        lo.to_vec()
    } else if k > hi {
        hi.to_vec()
    } else {
        k.to_vec()
    }
}
