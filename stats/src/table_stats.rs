//! `TableStats` (§3.2): row count and estimated average row size for one record
//! type, built from a sampled ranged scan over the `record` subspace (§4.6).

use crate::sampling::sampled_in;
use serde::{Deserialize, Serialize};
use strata_core::StoreError;
use strata_keyspace::{Keyspace, Tuple, TypedValue};
use strata_storage_kv::KvTransaction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub row_count: i64,
    pub avg_row_bytes: i32,
    pub sample_rate: f64,
    pub timestamp: i64,
}

impl TableStats {
    /// Scans every record of `record_type`, counting every row but only accumulating
    /// byte size for the `sample_rate` fraction of keys that hash into the sample
    /// (§4.6: "with probability `sample_rate`, accumulate byte size"). `row_count`
    /// always reflects the full scan; `avg_row_bytes` is an estimate from the sample
    /// alone. `now_ms` is supplied by the caller rather than read from the wall clock.
    pub async fn collect(
        txn: &mut dyn KvTransaction,
        keyspace: &Keyspace,
        record_type: &str,
        sample_rate: f64,
        batch_size: usize,
        now_ms: i64,
    ) -> Result<Self, StoreError> {
        if record_type.is_empty() {
            return Err(StoreError::InvalidArgument("record_type must not be empty".into()));
        }
        if !(sample_rate > 0.0 && sample_rate <= 1.0) {
            return Err(StoreError::InvalidArgument(format!("sample_rate must be in (0, 1], got {sample_rate}")));
        }

        let (begin, end) = keyspace.record.prefix_range(&Tuple::new(vec![TypedValue::String(record_type.to_string())]));
        let mut cursor_begin = begin;
        let mut row_count = 0i64;
        let mut sample_bytes = 0i64;
        let mut sample_count = 0i64;

        loop {
            let batch = txn.get_range(&cursor_begin, &end, Some(batch_size.max(1))).await?;
            if batch.is_empty() {
                break;
            }
            let exhausted = batch.len() < batch_size.max(1);
            for (k, v) in &batch {
                row_count += 1;
                if sampled_in(k, sample_rate) {
                    sample_bytes += (k.len() + v.len()) as i64;
                    sample_count += 1;
                }
            }
            cursor_begin = strata_keyspace::lex_successor(batch.last().unwrap().0.clone());
            if exhausted {
                break;
            }
        }

        let avg_row_bytes = if sample_count > 0 { (sample_bytes / sample_count) as i32 } else { 0 };
        Ok(Self { row_count, avg_row_bytes, sample_rate, timestamp: now_ms })
    }
}
