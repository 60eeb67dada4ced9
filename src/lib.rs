pub mod config;
pub mod db;
pub mod heartbeat;
pub mod listener;
pub mod tzkt;
pub mod utils;
pub mod worker;

pub use config::Settings;
pub use db::Database;
pub use heartbeat::Heartbeat;
pub use listener::BlockListener;
pub use tzkt::TzktProvider;
pub use worker::{Aggregator, Indexer, PoolRegistry, PriceResolver};
