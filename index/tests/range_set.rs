//! Invariant 7 (§3.3/§8): the checkpointed range-set never reports a byte as covered
//! unless an index write for it was committed in the same transaction, and repeated
//! `insert`/`persist`/`load` cycles converge to full coverage without gaps or
//! overlaps.

use strata_index::RangeSet;
use strata_keyspace::Keyspace;
use strata_storage_kv::{KvStore, MemoryStore};

#[tokio::test]
async fn incremental_inserts_converge_to_full_coverage() {
    let kv = MemoryStore::new();
    let ks = Keyspace::new(b"app");
    let full_begin = vec![0u8];
    let full_end = vec![100u8];

    let mut txn = kv.begin().await.unwrap();
    let mut rs = RangeSet::load(&mut *txn, &ks, "by_color").await.unwrap();
    assert_eq!(rs.missing(&full_begin, &full_end), vec![(full_begin.clone(), full_end.clone())]);

    for chunk_start in (0u8..100).step_by(10) {
        let gap = rs.missing(&full_begin, &full_end).into_iter().next().unwrap();
        assert_eq!(gap.0, vec![chunk_start]);
        rs.insert(vec![chunk_start], vec![chunk_start.saturating_add(10).min(100)]);
        rs.persist(&mut *txn, &ks, "by_color").await.unwrap();
        rs = RangeSet::load(&mut *txn, &ks, "by_color").await.unwrap();
    }

    assert!(rs.missing(&full_begin, &full_end).is_empty());
    assert_eq!(rs.progress(&full_begin, &full_end), 1.0);
}

#[tokio::test]
async fn overlapping_batches_do_not_duplicate_coverage() {
    let kv = MemoryStore::new();
    let ks = Keyspace::new(b"app");
    let mut txn = kv.begin().await.unwrap();
    let mut rs = RangeSet::load(&mut *txn, &ks, "idx").await.unwrap();

    rs.insert(vec![0], vec![20]);
    rs.insert(vec![10], vec![30]); // overlaps the first by [10, 20)
    rs.persist(&mut *txn, &ks, "idx").await.unwrap();

    let reloaded = RangeSet::load(&mut *txn, &ks, "idx").await.unwrap();
    assert_eq!(reloaded.intervals(), &[(vec![0], vec![30])]);
}
