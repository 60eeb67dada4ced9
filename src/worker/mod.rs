pub mod aggregator;
pub mod classifier;
pub mod price_resolver;
pub mod registry;
pub mod worker;

pub use aggregator::Aggregator;
pub use classifier::{EntrypointAction, PoolGeneration};
pub use price_resolver::PriceResolver;
pub use registry::PoolRegistry;
pub use worker::Indexer;
