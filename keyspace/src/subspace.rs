//! The five fixed subspaces of §3.1, each a tagged prefix under a user-chosen root.

use crate::tuple::{lex_successor, Tuple};
use crate::value::TypedValue;

/// A prefix namespace formed by tuple-encoding its tag onto a root prefix. Every key
/// this crate hands to the KV layer is `subspace.pack(tuple)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    pub fn root(root: &[u8]) -> Self { Self { prefix: root.to_vec() } }

    /// A subspace nested under this one, tagged by `tag` (e.g. `"record"`, `"index"`).
    pub fn child(&self, tag: &str) -> Self {
        let tuple = Tuple::new(vec![TypedValue::String(tag.to_string())]);
        let mut prefix = self.prefix.clone();
        prefix.extend(tuple.encode());
        Self { prefix }
    }

    pub fn pack(&self, tuple: &Tuple) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend(tuple.encode());
        key
    }

    /// Appends a raw byte suffix directly, without tuple-encoding it. Used by the
    /// range-set's `(begin) -> end` bookkeeping (§4.4), where `begin` is already an
    /// opaque byte string (a record-subspace key) and re-encoding it as a tuple
    /// component would only cost an escaping pass for no benefit.
    pub fn pack_raw(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(suffix);
        key
    }

    /// `[begin, end)` covering every key in this subspace whose tuple starts with
    /// `prefix_tuple`. Passing an empty tuple covers the whole subspace.
    pub fn prefix_range(&self, prefix_tuple: &Tuple) -> (Vec<u8>, Vec<u8>) {
        let begin = self.pack(prefix_tuple);
        let end = lex_successor(begin.clone());
        (begin, end)
    }

    pub fn as_bytes(&self) -> &[u8] { &self.prefix }
}

/// The five fixed subspaces a `Schema`-bound store operates over.
#[derive(Debug, Clone)]
pub struct Keyspace {
    pub record: Subspace,
    pub index: Subspace,
    pub index_state: Subspace,
    pub index_build: Subspace,
    pub stats: Subspace,
}

impl Keyspace {
    pub fn new(root: &[u8]) -> Self {
        let root = Subspace::root(root);
        Self {
            record: root.child("record"),
            index: root.child("index"),
            index_state: root.child("index_state"),
            index_build: root.child("index_build"),
            stats: root.child("stats"),
        }
    }
}
