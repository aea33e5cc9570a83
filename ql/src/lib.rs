//! Filter expression tree and value-ordering primitives shared by the schema, index, and
//! query layers.

pub mod ast;
pub mod collation;

pub use ast::{ComparisonOperator, Literal, Predicate};
pub use collation::{Collatable, RangeBound};
