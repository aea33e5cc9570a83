//! Keyspace primitives: typed values, tuple encoding, and the five fixed subspaces
//! records, indexes, index state, index build bookkeeping, and statistics live in.

pub mod subspace;
pub mod tuple;
pub mod value;

pub use subspace::{Keyspace, Subspace};
pub use tuple::{encode_string_prefix, lex_successor, Tuple};
pub use value::TypedValue;
