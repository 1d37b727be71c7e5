//! The `docql` command-line tool
//!
//! Each subcommand lives in its own module with a plain config struct, so the
//! binary only maps arguments onto configs.

pub mod cover;
pub mod eval;
pub mod input;
pub mod output;
pub mod rewrite;
