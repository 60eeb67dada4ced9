mod aggregate;
mod checkpoint;
mod pool;
mod spot_price;
mod token;
mod transaction;

pub use aggregate::{Period, PlentyAggregateRow, PoolAggregateRow, TokenAggregateRow};
pub use checkpoint::PoolCheckpoint;
pub use pool::{Pool, PoolFee, PoolKind};
pub use spot_price::SpotPrice;
pub use token::{Token, TokenStandard};
pub use transaction::{AmountPair, TokenSide, TransactionKind, TransactionRecord};
