//! Scenario E (§8): a backfill that crashes mid-way and resumes must not duplicate
//! index entries or skip records. Simulated here by running `run_batch` to
//! completion over several small batches, as a crash-and-resume would look from the
//! outside (each batch commits independently; nothing but the checkpoint ties them
//! together).

use std::sync::Arc;
use strata_core::{Codec, Index, IndexKind, KeyExpression, RecordStore, RecordType, Schema, StoreError};
use strata_index::{IndexMaintainer, IndexState, IndexStateManager, IndexerConfig, OnlineIndexer};
use strata_keyspace::{Keyspace, Tuple, TypedValue};
use strata_storage_kv::{KvStore, MemoryStore};

#[derive(Clone, Debug, PartialEq)]
struct Item {
    id: i64,
    bucket: String,
}

struct ItemCodec;

impl Codec for ItemCodec {
    type Record = Item;
    fn encode(&self, r: &Item) -> Result<Vec<u8>, StoreError> { Ok(format!("{}\u{1}{}", r.id, r.bucket).into_bytes()) }
    fn decode(&self, _t: &str, bytes: &[u8]) -> Result<Item, StoreError> {
        let s = String::from_utf8(bytes.to_vec()).unwrap();
        let mut parts = s.split('\u{1}');
        let id = parts.next().unwrap().parse().unwrap();
        let bucket = parts.next().unwrap().to_string();
        Ok(Item { id, bucket })
    }
    fn primary_key_of(&self, _rt: &RecordType, r: &Item) -> Tuple { Tuple::new(vec![TypedValue::I64(r.id)]) }
    fn field_value(&self, r: &Item, path: &str) -> Option<TypedValue> {
        match path {
            "id" => Some(TypedValue::I64(r.id)),
            "bucket" => Some(TypedValue::String(r.bucket.clone())),
            _ => None,
        }
    }
}

fn schema() -> Arc<Schema> {
    let rt = RecordType { name: "Item".into(), primary_key: KeyExpression::field("id") };
    let by_bucket = Index {
        name: "by_bucket".into(),
        record_type: "Item".into(),
        kind: IndexKind::Value,
        key_expr: KeyExpression::field("bucket"),
        unique: false,
        grouping_expr: None,
        value_expr: None,
    };
    Arc::new(Schema::new(vec![rt], vec![by_bucket]).unwrap())
}

#[tokio::test]
async fn resumed_backfill_produces_exactly_one_entry_per_record() {
    let ks = Keyspace::new(b"app");
    let schema = schema();
    let maintainer = Arc::new(IndexMaintainer::new(schema.clone(), ks.clone()));
    let store = RecordStore::new(schema.clone(), ks.clone(), ItemCodec);
    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());

    {
        let mut txn = kv.begin().await.unwrap();
        for i in 0..23 {
            store
                .save(&mut *txn, &*maintainer, "Item", &Item { id: i, bucket: format!("b{}", i % 3) })
                .await
                .unwrap();
        }
        txn.commit().await.unwrap();
    }

    let config = IndexerConfig { batch_size: 5, ..Default::default() };
    let indexer = OnlineIndexer::new(maintainer, Arc::new(ItemCodec), ks.clone(), config);

    {
        let mut txn = kv.begin().await.unwrap();
        IndexStateManager::transition(&mut *txn, &ks, "by_bucket", IndexState::Disabled, IndexState::WriteOnly)
            .await
            .unwrap();
        txn.commit().await.unwrap();
    }

    // Drive batches one at a time, as if each ran in its own process lifetime.
    loop {
        let done = indexer.run_batch(&*kv, &schema, "by_bucket").await.unwrap();
        if done {
            break;
        }
    }

    let mut txn = kv.begin().await.unwrap();
    let (begin, end) = ks.index.prefix_range(&Tuple::new(vec![TypedValue::String("by_bucket".into())]));
    let entries = txn.get_range(&begin, &end, None).await.unwrap();
    assert_eq!(entries.len(), 23, "every record indexed exactly once, no duplicates and no gaps");
}

#[tokio::test]
async fn run_to_completion_transitions_to_readable() {
    let ks = Keyspace::new(b"app");
    let schema = schema();
    let maintainer = Arc::new(IndexMaintainer::new(schema.clone(), ks.clone()));
    let store = RecordStore::new(schema.clone(), ks.clone(), ItemCodec);
    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());

    {
        let mut txn = kv.begin().await.unwrap();
        for i in 0..5 {
            store.save(&mut *txn, &*maintainer, "Item", &Item { id: i, bucket: "only".into() }).await.unwrap();
        }
        txn.commit().await.unwrap();
    }

    let indexer = OnlineIndexer::new(maintainer, Arc::new(ItemCodec), ks.clone(), IndexerConfig::default());
    indexer.start(&*kv, "by_bucket").await.unwrap();
    let cancel = strata_core::Cancellation::new();
    indexer.run_to_completion(&*kv, &schema, "by_bucket", &cancel).await.unwrap();

    let mut txn = kv.begin().await.unwrap();
    assert_eq!(IndexStateManager::get(&mut *txn, &ks, "by_bucket").await.unwrap(), IndexState::Readable);
}
