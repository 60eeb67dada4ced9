mod client;
mod ops;

pub use client::PostgresClient;
pub use ops::{V2PoolRow, V3PoolRow};
