//! Shared helpers for the pipeline.
//!
//! - [`decimal`] - arbitrary-precision decimal utilities (pow10 scaling,
//!   JSON field parsing, stored-scale rounding)
//! - [`cursor`] - durable marker file holding the last processed level

mod cursor;
mod decimal;

pub use cursor::LevelCursor;
pub use decimal::{big_pow10, json_decimal, round_stored};
