//! `IndexStats` (§3.2): per-index distinct count, null count, min/max, and an
//! equi-height histogram over the index's leading key-tuple dimension (§4.6).

use crate::histogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strata_core::StoreError;
use strata_keyspace::{decode_first_component, Keyspace, Tuple, TypedValue};
use strata_ql::Literal;
use strata_storage_kv::KvTransaction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub distinct_count: i64,
    pub null_count: i64,
    pub min: Option<Literal>,
    pub max: Option<Literal>,
    pub histogram: Histogram,
    pub timestamp: i64,
}

impl IndexStats {
    /// Scans every entry of `index_name`, extracting the first key-tuple component
    /// after the index's own name as the histogram dimension (§4.6: "extracting the
    /// first key-tuple element as the histogram dimension"). `bucket_count` must
    /// already be validated into `1..=10_000`.
    pub async fn collect(
        txn: &mut dyn KvTransaction,
        keyspace: &Keyspace,
        index_name: &str,
        bucket_count: usize,
        batch_size: usize,
        now_ms: i64,
    ) -> Result<Self, StoreError> {
        if !(1..=10_000).contains(&bucket_count) {
            return Err(StoreError::InvalidArgument(format!("bucket_count must be in 1..=10_000, got {bucket_count}")));
        }

        let (begin, end) =
            keyspace.index.prefix_range(&Tuple::new(vec![TypedValue::String(index_name.to_string())]));
        let prefix_len = keyspace.index.as_bytes().len();

        let mut cursor_begin = begin;
        // Run-length encoded dimension values, in ascending key order: consecutive
        // entries sharing the same leading component collapse into one run, since
        // the tuple encoding preserves the same total order the planner relies on.
        let mut runs: Vec<(Literal, i64)> = Vec::new();
        let mut distinct_keys: HashSet<Vec<u8>> = HashSet::new();
        let mut null_count = 0i64;

        loop {
            let batch = txn.get_range(&cursor_begin, &end, Some(batch_size.max(1))).await?;
            if batch.is_empty() {
                break;
            }
            let exhausted = batch.len() < batch_size.max(1);
            for (k, _) in &batch {
                let rest = &k[prefix_len..];
                // The first component is the index name itself (the subspace's own
                // tuple component); the dimension is the component that follows it.
                let Some((_, consumed_name)) = decode_first_component(rest) else { continue };
                let Some((dim, dim_len)) = decode_first_component(&rest[consumed_name..]) else { continue };
                distinct_keys.insert(rest[consumed_name..consumed_name + dim_len].to_vec());

                let Some(lit) = typed_to_literal(dim) else { continue };
                if matches!(lit, Literal::Null) {
                    null_count += 1;
                }
                match runs.last_mut() {
                    Some((last, count)) if *last == lit => *count += 1,
                    _ => runs.push((lit, 1)),
                }
            }
            cursor_begin = strata_keyspace::lex_successor(batch.last().unwrap().0.clone());
            if exhausted {
                break;
            }
        }

        let min = runs.first().map(|(l, _)| l.clone());
        let max = runs.last().map(|(l, _)| l.clone());
        let histogram = Histogram::build(&runs, bucket_count);

        Ok(Self {
            distinct_count: distinct_keys.len() as i64,
            null_count,
            min,
            max,
            histogram,
            timestamp: now_ms,
        })
    }
}

/// `TypedValue::Bytes` has no `Literal` counterpart (§6 draws the Codec's value
/// union narrower than the keyspace's); an index keyed on raw bytes simply
/// contributes nothing to the histogram rather than failing collection outright.
fn typed_to_literal(value: TypedValue) -> Option<Literal> {
    match value {
        TypedValue::Null => Some(Literal::Null),
        TypedValue::Bool(b) => Some(Literal::Bool(b)),
        TypedValue::I64(v) => Some(Literal::I64(v)),
        TypedValue::F64(v) => Some(Literal::F64(v)),
        TypedValue::String(s) => Some(Literal::String(s)),
        TypedValue::Bytes(_) => None,
    }
}
