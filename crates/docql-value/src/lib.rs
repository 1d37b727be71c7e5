//! docql value algebra
//!
//! This crate defines the ordered value domain expressions evaluate over:
//! - `Value` with its MISSING/NULL sentinels and JSON-like variants
//! - Collation, three-valued equality and comparison, truth
//! - Canonical marshaling used for hashing and constant rendering
//! - `Scope`, the evaluation item handed to expressions

mod marshal;
mod number;
mod scope;
mod types;
mod value;

pub use marshal::write_string;
pub use number::Number;
pub use scope::{Attachments, Scope};
pub use types::ValueType;
pub use value::{Comparison, Object, Value};
