//! C6: state-aware index maintenance. Stateless and parameterized by the schema
//! (§9's cyclic-reference redesign note), implementing `strata_core::IndexSink` so
//! `RecordStore::save`/`delete` can dispatch here without either crate depending on
//! the other in both directions.
//!
//! Grounded on the shape of `storage/sled/src/index.rs`'s persistence idioms, but
//! that file's own `backfill` is a single synchronous full-tree walk with no
//! resumability; the batched, crash-safe protocol here is new, built directly
//! against §4.2/§4.5 rather than adapted from that walk.

use crate::state::IndexStateManager;
use async_trait::async_trait;
use std::sync::Arc;
use strata_core::{Codec, Index, IndexKind, IndexSink, RecordType, Schema, StoreError};
use strata_keyspace::{Keyspace, Tuple, TypedValue};
use strata_storage_kv::KvTransaction;

/// Sentinel grouping key for aggregate indexes when the grouping expression can't
/// be evaluated against a record — a missing field, or a field holding an explicit
/// null (§4.2: "aggregate indexes count them under a designated null_group key").
/// `\u{0}` can never appear in a user-supplied string field without being escaped
/// by the tuple encoder first, so this can't collide with a real group value.
fn null_group() -> Tuple { Tuple::new(vec![TypedValue::String("\u{0}null_group".to_string())]) }

pub struct IndexMaintainer {
    schema: Arc<Schema>,
    keyspace: Keyspace,
}

impl IndexMaintainer {
    pub fn new(schema: Arc<Schema>, keyspace: Keyspace) -> Self { Self { schema, keyspace } }

    pub fn schema(&self) -> &Schema { &self.schema }
    pub fn keyspace(&self) -> &Keyspace { &self.keyspace }

    /// Recomputes and writes this index's entry for a single record, without
    /// retracting any prior entry first. Used by the Online Indexer, which only
    /// ever encounters each historical record once (§4.5).
    pub async fn build_index_entry<C: Codec>(
        &self,
        txn: &mut dyn KvTransaction,
        codec: &C,
        index_name: &str,
        record_type: &RecordType,
        record: &C::Record,
    ) -> Result<(), StoreError> {
        let index = self
            .schema
            .index(index_name)
            .ok_or_else(|| StoreError::InvalidArgument(format!("unknown index '{index_name}'")))?;
        let pk = record_type
            .primary_key
            .evaluate(codec, record)
            .ok_or_else(|| StoreError::SerializationError("primary key field is absent".into()))?;
        self.insert(txn, codec, index, &pk, record).await
    }

    async fn insert<C: Codec>(
        &self,
        txn: &mut dyn KvTransaction,
        codec: &C,
        index: &Index,
        pk: &Tuple,
        record: &C::Record,
    ) -> Result<(), StoreError> {
        match index.kind {
            IndexKind::Value => {
                let Some(key) = value_index_key(codec, index, record) else { return Ok(()) };
                let mut full = Tuple::new(vec![TypedValue::String(index.name.clone())]);
                full.0.extend(key.0.clone());
                let pk_start = full.0.len();
                full.0.extend(pk.0.clone());

                if index.unique {
                    let prefix = Tuple::new(full.0[..pk_start].to_vec());
                    let (begin, end) = self.keyspace.index.prefix_range(&prefix);
                    let existing = txn.get_range(&begin, &end, None).await?;
                    let own_key = self.keyspace.index.pack(&full);
                    for (k, _) in existing {
                        if k != own_key {
                            return Err(StoreError::UniqueViolation { index: index.name.clone() });
                        }
                    }
                }
                txn.set(&self.keyspace.index.pack(&full), &[]).await?;
                Ok(())
            }
            IndexKind::Count => {
                let group = grouping_key(codec, index, record);
                let key = self.aggregate_key(index, &group);
                txn.atomic_add(&key, 1).await?;
                Ok(())
            }
            IndexKind::Sum => {
                let group = grouping_key(codec, index, record);
                let key = self.aggregate_key(index, &group);
                let delta = sum_value(codec, index, record);
                txn.atomic_add(&key, delta).await?;
                Ok(())
            }
        }
    }

    async fn retract<C: Codec>(
        &self,
        txn: &mut dyn KvTransaction,
        codec: &C,
        index: &Index,
        pk: &Tuple,
        record: &C::Record,
    ) -> Result<(), StoreError> {
        match index.kind {
            IndexKind::Value => {
                let Some(key) = value_index_key(codec, index, record) else { return Ok(()) };
                let mut full = Tuple::new(vec![TypedValue::String(index.name.clone())]);
                full.0.extend(key.0);
                full.0.extend(pk.0.clone());
                txn.clear(&self.keyspace.index.pack(&full)).await?;
                Ok(())
            }
            IndexKind::Count => {
                let group = grouping_key(codec, index, record);
                let key = self.aggregate_key(index, &group);
                txn.atomic_add(&key, -1).await?;
                Ok(())
            }
            IndexKind::Sum => {
                let group = grouping_key(codec, index, record);
                let key = self.aggregate_key(index, &group);
                let delta = sum_value(codec, index, record);
                txn.atomic_add(&key, -delta).await?;
                Ok(())
            }
        }
    }

    fn aggregate_key(&self, index: &Index, group: &Tuple) -> Vec<u8> {
        let mut full = Tuple::new(vec![TypedValue::String(index.name.clone())]);
        full.0.extend(group.0.clone());
        self.keyspace.index.pack(&full)
    }

    async fn for_each_maintained_index<'a>(
        &'a self,
        txn: &mut dyn KvTransaction,
        record_type: &str,
    ) -> Result<Vec<&'a Index>, StoreError> {
        let mut out = Vec::new();
        for index in self.schema.indexes_for(record_type) {
            if IndexStateManager::get(txn, &self.keyspace, &index.name).await?.is_maintained() {
                out.push(index);
            }
        }
        Ok(out)
    }
}

/// The key an index's `key_expr` produces for a record, or `None` if the field is
/// absent or the evaluated tuple contains an explicit null — both excluded from
/// value indexes per §4.2.
fn value_index_key<C: Codec>(codec: &C, index: &Index, record: &C::Record) -> Option<Tuple> {
    let tuple = index.key_expr.evaluate(codec, record)?;
    if tuple.0.iter().any(|v| matches!(v, TypedValue::Null)) {
        return None;
    }
    Some(tuple)
}

fn grouping_key<C: Codec>(codec: &C, index: &Index, record: &C::Record) -> Tuple {
    let expr = index.grouping_expr.as_ref().expect("count/sum index without a grouping expression");
    match expr.evaluate(codec, record) {
        Some(tuple) if !tuple.0.iter().any(|v| matches!(v, TypedValue::Null)) => tuple,
        _ => null_group(),
    }
}

fn sum_value<C: Codec>(codec: &C, index: &Index, record: &C::Record) -> i64 {
    let expr = index.value_expr.as_ref().expect("sum index without a value expression");
    match expr.evaluate(codec, record).map(|t| t.0.into_iter().next()) {
        Some(Some(TypedValue::I64(v))) => v,
        Some(Some(TypedValue::F64(v))) => v as i64,
        _ => 0,
    }
}

#[async_trait]
impl<C: Codec> IndexSink<C> for IndexMaintainer {
    async fn on_save(
        &self,
        txn: &mut dyn KvTransaction,
        codec: &C,
        record_type: &RecordType,
        pk: &Tuple,
        old: Option<&C::Record>,
        new: &C::Record,
    ) -> Result<(), StoreError> {
        let indexes = self.for_each_maintained_index(txn, &record_type.name).await?;
        for index in indexes {
            if let Some(old_record) = old {
                self.retract(txn, codec, index, pk, old_record).await?;
            }
            self.insert(txn, codec, index, pk, new).await?;
        }
        Ok(())
    }

    async fn on_delete(
        &self,
        txn: &mut dyn KvTransaction,
        codec: &C,
        record_type: &RecordType,
        pk: &Tuple,
        old: &C::Record,
    ) -> Result<(), StoreError> {
        let indexes = self.for_each_maintained_index(txn, &record_type.name).await?;
        for index in indexes {
            self.retract(txn, codec, index, pk, old).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{IndexState, IndexStateManager};
    use strata_core::{KeyExpression, RecordStore};
    use strata_storage_kv::MemoryStore;

    #[derive(Clone, Debug, PartialEq)]
    struct User {
        id: i64,
        email: String,
        city: Option<String>,
        age: i64,
    }

    struct UserCodec;

    impl Codec for UserCodec {
        type Record = User;
        fn encode(&self, r: &User) -> Result<Vec<u8>, StoreError> {
            Ok(bincode_like_encode(r))
        }
        fn decode(&self, _t: &str, bytes: &[u8]) -> Result<User, StoreError> { Ok(bincode_like_decode(bytes)) }
        fn primary_key_of(&self, _rt: &RecordType, r: &User) -> Tuple { Tuple::new(vec![TypedValue::I64(r.id)]) }
        fn field_value(&self, r: &User, path: &str) -> Option<TypedValue> {
            match path {
                "id" => Some(TypedValue::I64(r.id)),
                "email" => Some(TypedValue::String(r.email.clone())),
                "city" => r.city.clone().map(TypedValue::String),
                "age" => Some(TypedValue::I64(r.age)),
                _ => None,
            }
        }
    }

    // A tiny ad hoc codec, not bincode: keeps this test crate's dependency list minimal.
    fn bincode_like_encode(r: &User) -> Vec<u8> {
        let city = r.city.clone().unwrap_or_default();
        format!("{}\u{1}{}\u{1}{}\u{1}{}\u{1}{}", r.id, r.email, r.city.is_some(), city, r.age).into_bytes()
    }
    fn bincode_like_decode(bytes: &[u8]) -> User {
        let s = String::from_utf8(bytes.to_vec()).unwrap();
        let mut parts = s.split('\u{1}');
        let id = parts.next().unwrap().parse().unwrap();
        let email = parts.next().unwrap().to_string();
        let has_city: bool = parts.next().unwrap().parse().unwrap();
        let city_raw = parts.next().unwrap().to_string();
        let age = parts.next().unwrap().parse().unwrap();
        User { id, email, city: has_city.then_some(city_raw), age }
    }

    fn schema() -> Arc<Schema> {
        let rt = RecordType { name: "User".into(), primary_key: KeyExpression::field("id") };
        let by_email = Index {
            name: "by_email".into(),
            record_type: "User".into(),
            kind: IndexKind::Value,
            key_expr: KeyExpression::field("email"),
            unique: true,
            grouping_expr: None,
            value_expr: None,
        };
        let count_by_city = Index {
            name: "count_by_city".into(),
            record_type: "User".into(),
            kind: IndexKind::Count,
            key_expr: KeyExpression::field("city"),
            unique: false,
            grouping_expr: Some(KeyExpression::field("city")),
            value_expr: None,
        };
        let sum_age_by_city = Index {
            name: "sum_age_by_city".into(),
            record_type: "User".into(),
            kind: IndexKind::Sum,
            key_expr: KeyExpression::field("city"),
            unique: false,
            grouping_expr: Some(KeyExpression::field("city")),
            value_expr: Some(KeyExpression::field("age")),
        };
        Arc::new(Schema::new(vec![rt], vec![by_email, count_by_city, sum_age_by_city]).unwrap())
    }

    async fn make_readable(txn: &mut dyn KvTransaction, ks: &Keyspace, name: &str) {
        IndexStateManager::transition(txn, ks, name, IndexState::Disabled, IndexState::WriteOnly).await.unwrap();
        IndexStateManager::transition(txn, ks, name, IndexState::WriteOnly, IndexState::Readable).await.unwrap();
    }

    #[tokio::test]
    async fn unique_violation_on_duplicate_email() {
        let ks = Keyspace::new(b"app");
        let schema = schema();
        let maintainer = IndexMaintainer::new(schema.clone(), ks.clone());
        let store = RecordStore::new(schema, ks.clone(), UserCodec);
        let kv = MemoryStore::new();
        let mut txn = kv.begin().await.unwrap();
        make_readable(&mut *txn, &ks, "by_email").await;

        let a = User { id: 1, email: "a@x".into(), city: Some("SF".into()), age: 30 };
        store.save(&mut *txn, &maintainer, "User", &a).await.unwrap();

        let b = User { id: 2, email: "a@x".into(), city: Some("LA".into()), age: 40 };
        let err = store.save(&mut *txn, &maintainer, "User", &b).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn count_index_tracks_group_membership_through_delete() {
        let ks = Keyspace::new(b"app");
        let schema = schema();
        let maintainer = IndexMaintainer::new(schema.clone(), ks.clone());
        let store = RecordStore::new(schema, ks.clone(), UserCodec);
        let kv = MemoryStore::new();
        let mut txn = kv.begin().await.unwrap();
        make_readable(&mut *txn, &ks, "count_by_city").await;

        for i in 0..3 {
            let u = User { id: i, email: format!("sf{i}@x"), city: Some("SF".into()), age: 20 };
            store.save(&mut *txn, &maintainer, "User", &u).await.unwrap();
        }
        for i in 3..5 {
            let u = User { id: i, email: format!("la{i}@x"), city: Some("LA".into()), age: 20 };
            store.save(&mut *txn, &maintainer, "User", &u).await.unwrap();
        }

        let sf_key = ks.index.pack(&Tuple::new(vec![
            TypedValue::String("count_by_city".into()),
            TypedValue::String("SF".into()),
        ]));
        let la_key = ks.index.pack(&Tuple::new(vec![
            TypedValue::String("count_by_city".into()),
            TypedValue::String("LA".into()),
        ]));
        assert_eq!(strata_storage_kv::decode_counter(txn.get(&sf_key).await.unwrap().as_deref()), 3);
        assert_eq!(strata_storage_kv::decode_counter(txn.get(&la_key).await.unwrap().as_deref()), 2);

        store.delete(&mut *txn, &maintainer, "User", &Tuple::new(vec![TypedValue::I64(0)])).await.unwrap();
        assert_eq!(strata_storage_kv::decode_counter(txn.get(&sf_key).await.unwrap().as_deref()), 2);
    }

    #[tokio::test]
    async fn sum_index_accumulates_and_updates_on_group_change() {
        let ks = Keyspace::new(b"app");
        let schema = schema();
        let maintainer = IndexMaintainer::new(schema.clone(), ks.clone());
        let store = RecordStore::new(schema, ks.clone(), UserCodec);
        let kv = MemoryStore::new();
        let mut txn = kv.begin().await.unwrap();
        make_readable(&mut *txn, &ks, "sum_age_by_city").await;

        let u = User { id: 1, email: "a@x".into(), city: Some("SF".into()), age: 30 };
        store.save(&mut *txn, &maintainer, "User", &u).await.unwrap();
        let u2 = User { id: 2, email: "b@x".into(), city: Some("SF".into()), age: 20 };
        store.save(&mut *txn, &maintainer, "User", &u2).await.unwrap();

        let sf_key =
            ks.index.pack(&Tuple::new(vec![TypedValue::String("sum_age_by_city".into()), TypedValue::String("SF".into())]));
        assert_eq!(strata_storage_kv::decode_counter(txn.get(&sf_key).await.unwrap().as_deref()), 50);

        // Move user 1 to LA: sum moves with it.
        let moved = User { id: 1, email: "a@x".into(), city: Some("LA".into()), age: 30 };
        store.save(&mut *txn, &maintainer, "User", &moved).await.unwrap();

        let la_key =
            ks.index.pack(&Tuple::new(vec![TypedValue::String("sum_age_by_city".into()), TypedValue::String("LA".into())]));
        assert_eq!(strata_storage_kv::decode_counter(txn.get(&sf_key).await.unwrap().as_deref()), 20);
        assert_eq!(strata_storage_kv::decode_counter(txn.get(&la_key).await.unwrap().as_deref()), 30);
    }

    #[tokio::test]
    async fn disabled_index_is_not_maintained() {
        let ks = Keyspace::new(b"app");
        let schema = schema();
        let maintainer = IndexMaintainer::new(schema.clone(), ks.clone());
        let store = RecordStore::new(schema, ks.clone(), UserCodec);
        let kv = MemoryStore::new();
        let mut txn = kv.begin().await.unwrap();
        // by_email left disabled.
        let u = User { id: 1, email: "a@x".into(), city: Some("SF".into()), age: 30 };
        store.save(&mut *txn, &maintainer, "User", &u).await.unwrap();
        let u2 = User { id: 2, email: "a@x".into(), city: Some("LA".into()), age: 30 };
        // No unique violation: the index never saw either write.
        store.save(&mut *txn, &maintainer, "User", &u2).await.unwrap();
    }

    #[tokio::test]
    async fn null_city_groups_under_null_group_sentinel() {
        let ks = Keyspace::new(b"app");
        let schema = schema();
        let maintainer = IndexMaintainer::new(schema.clone(), ks.clone());
        let store = RecordStore::new(schema, ks.clone(), UserCodec);
        let kv = MemoryStore::new();
        let mut txn = kv.begin().await.unwrap();
        make_readable(&mut *txn, &ks, "count_by_city").await;

        let u = User { id: 1, email: "a@x".into(), city: None, age: 30 };
        store.save(&mut *txn, &maintainer, "User", &u).await.unwrap();

        let null_key = ks.index.pack(&Tuple::new(vec![TypedValue::String("count_by_city".into()), TypedValue::String("\u{0}null_group".into())]));
        assert_eq!(strata_storage_kv::decode_counter(txn.get(&null_key).await.unwrap().as_deref()), 1);
    }
}
