//! Shared domain records, error definitions, and utilities used across all hublink crates.

pub mod error;
pub mod types;

pub use error::{Error, FromMessage, Result};
