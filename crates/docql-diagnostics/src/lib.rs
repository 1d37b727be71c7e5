//! docql diagnostics and error handling
//!
//! Source spans carried by expression nodes, structured error codes, and the
//! error type surfaced by the parser and the configuration layer.

mod error;
mod error_code;
mod span;

pub use error::*;
pub use error_code::*;
pub use span::*;

/// Result type for docql front-end operations
pub type Result<T> = std::result::Result<T, DocqlError>;
