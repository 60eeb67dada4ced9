use bigdecimal::BigDecimal;
use postgres_types::{FromSql, ToSql};

use crate::db::models::Pool;

/// One of the two fixed token slots of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSide {
    Token1,
    Token2,
}

impl TokenSide {
    pub const BOTH: [TokenSide; 2] = [TokenSide::Token1, TokenSide::Token2];
}

/// Classified transaction kind, stored as the `transaction_type` enum.
///
/// The swap variants name the swapped-in side (the token the trader
/// supplied to the pool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ToSql, FromSql)]
#[postgres(name = "transaction_type")]
pub enum TransactionKind {
    #[postgres(name = "SWAP_TOKEN_1")]
    SwapToken1,
    #[postgres(name = "SWAP_TOKEN_2")]
    SwapToken2,
    #[postgres(name = "ADD_LIQUIDITY")]
    AddLiquidity,
    #[postgres(name = "REMOVE_LIQUIDITY")]
    RemoveLiquidity,
}

impl TransactionKind {
    pub fn is_swap(&self) -> bool {
        matches!(self, Self::SwapToken1 | Self::SwapToken2)
    }

    /// The swapped-in side, if this is a swap.
    pub fn swapped_in(&self) -> Option<TokenSide> {
        match self {
            Self::SwapToken1 => Some(TokenSide::Token1),
            Self::SwapToken2 => Some(TokenSide::Token2),
            _ => None,
        }
    }
}

/// A (token1, token2) pair of decimal quantities.
///
/// Used for amounts, reserves, fees, prices and USD values so the per-side
/// bookkeeping in the aggregation engine stays uniform.
#[derive(Debug, Clone, Default)]
pub struct AmountPair {
    pub token1: BigDecimal,
    pub token2: BigDecimal,
}

impl AmountPair {
    pub fn new(token1: BigDecimal, token2: BigDecimal) -> Self {
        Self { token1, token2 }
    }

    pub fn side(&self, side: TokenSide) -> &BigDecimal {
        match side {
            TokenSide::Token1 => &self.token1,
            TokenSide::Token2 => &self.token2,
        }
    }
}

/// Canonical post-classification transaction record.
///
/// Constructed once per qualifying operation step and persisted exactly
/// once (the classifier's idempotency gate on `id` guarantees uniqueness);
/// never mutated after insert.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    /// Operation id, unique and monotonically increasing across the chain
    pub id: i64,
    pub hash: String,
    /// Epoch seconds
    pub timestamp: i64,
    /// Originating account (initiator when present, sender otherwise)
    pub account: String,
    pub pool: Pool,
    pub kind: TransactionKind,
    pub amounts: AmountPair,
    /// Pool reserves right after this transaction executed
    pub reserves: AmountPair,
    pub fees: AmountPair,
    pub prices: AmountPair,
    pub values: AmountPair,
    pub fee_values: AmountPair,
}

impl TransactionRecord {
    /// Whether `side` is the swapped-in side of this transaction.
    pub fn is_swap_in(&self, side: TokenSide) -> bool {
        self.kind.swapped_in() == Some(side)
    }

    /// USD value recorded on the transaction row: both sides for liquidity
    /// events, the swapped-in side only for swaps.
    pub fn recorded_value(&self) -> BigDecimal {
        match self.kind {
            TransactionKind::AddLiquidity | TransactionKind::RemoveLiquidity => {
                &self.values.token1 + &self.values.token2
            },
            TransactionKind::SwapToken1 => self.values.token1.clone(),
            TransactionKind::SwapToken2 => self.values.token2.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapped_in_side() {
        assert_eq!(
            TransactionKind::SwapToken1.swapped_in(),
            Some(TokenSide::Token1)
        );
        assert_eq!(
            TransactionKind::SwapToken2.swapped_in(),
            Some(TokenSide::Token2)
        );
        assert_eq!(TransactionKind::AddLiquidity.swapped_in(), None);
        assert!(!TransactionKind::RemoveLiquidity.is_swap());
    }
}
