//! Incremental aggregation.
//!
//! Persists each fully priced transaction and folds it into three layered
//! aggregate views (pool, token, system-wide) at hourly and daily
//! granularity. Cumulative fields only grow within a bucket; locked-value
//! fields are point-in-time snapshots corrected by subtract-old/add-new
//! deltas, which keeps every update O(1) instead of rescanning all pools.

use std::sync::Arc;

use bigdecimal::{BigDecimal, Zero};

use crate::db::models::{
    AmountPair, Period, PlentyAggregateRow, PoolAggregateRow, TokenAggregateRow, TokenSide,
    TransactionKind, TransactionRecord,
};
use crate::utils::round_stored;
use crate::Database;

pub struct Aggregator {
    db: Arc<Database>,
}

impl Aggregator {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
        }
    }

    /// Record one transaction and update all aggregate views.
    ///
    /// Effects run in a fixed order; later steps read values written by
    /// earlier ones. There is no cross-statement rollback: a mid-sequence
    /// failure propagates, and the idempotency gate keeps the operation
    /// from being re-applied partially on reprocessing.
    pub async fn record(&self, txn: &TransactionRecord) -> anyhow::Result<()> {
        // 1. the raw transaction row (id uniqueness guaranteed upstream)
        self.db.postgres.insert_transaction(txn).await?;

        // 2. an unpriced transaction must not pollute volume/fee/TVL sums
        if txn.prices.token1.is_zero() || txn.prices.token2.is_zero() {
            return Ok(());
        }

        // 3. reserves as they stood before this transaction, needed for
        // the locked-value delta below
        let old_reserves = reconstruct_old_reserves(txn);

        // Bootstrap flag, read before any aggregate write: a pool with no
        // aggregate history contributes its full reserve, not a delta
        let pool_seen = self.db.postgres.pool_seen(&txn.pool.address).await?;

        for period in [Period::Hour, Period::Day] {
            self.record_pool(txn, period).await?;
        }

        for period in [Period::Hour, Period::Day] {
            self.record_token(txn, &old_reserves, pool_seen, period).await?;
        }

        for period in [Period::Hour, Period::Day] {
            self.record_plenty(txn, &old_reserves, period).await?;
        }

        Ok(())
    }

    /// Pool-level bucket: volume/fees accumulate on the swapped-in side
    /// only; locked fields are overwritten with the current reserves
    /// (last observation wins).
    async fn record_pool(&self, txn: &TransactionRecord, period: Period) -> anyhow::Result<()> {
        let ts = period.bucket_start(txn.timestamp);
        let locked_value = pool_locked_value(txn);

        let existing = self
            .db
            .postgres
            .get_pool_aggregate(period, ts, &txn.pool.address)
            .await?;

        match existing {
            None => {
                let swapped = txn.kind.swapped_in();
                let row = PoolAggregateRow {
                    ts,
                    pool: txn.pool.address.clone(),
                    token_1_volume: seed_if(txn.is_swap_in(TokenSide::Token1), &txn.amounts.token1),
                    token_2_volume: seed_if(txn.is_swap_in(TokenSide::Token2), &txn.amounts.token2),
                    volume_value: swapped
                        .map(|side| txn.values.side(side).clone())
                        .unwrap_or_else(BigDecimal::zero),
                    token_1_fees: seed_if(txn.is_swap_in(TokenSide::Token1), &txn.fees.token1),
                    token_2_fees: seed_if(txn.is_swap_in(TokenSide::Token2), &txn.fees.token2),
                    fees_value: swapped
                        .map(|side| txn.fee_values.side(side).clone())
                        .unwrap_or_else(BigDecimal::zero),
                    token_1_locked: txn.reserves.token1.clone(),
                    token_2_locked: txn.reserves.token2.clone(),
                    locked_value,
                };

                self.db.postgres.insert_pool_aggregate(period, &row).await
            },
            Some(mut row) => {
                if let Some(side) = txn.kind.swapped_in() {
                    match side {
                        TokenSide::Token1 => {
                            row.token_1_volume += &txn.amounts.token1;
                            row.token_1_fees += &txn.fees.token1;
                        },
                        TokenSide::Token2 => {
                            row.token_2_volume += &txn.amounts.token2;
                            row.token_2_fees += &txn.fees.token2;
                        },
                    }
                    row.volume_value += txn.values.side(side);
                    row.fees_value += txn.fee_values.side(side);
                }

                row.token_1_locked = txn.reserves.token1.clone();
                row.token_2_locked = txn.reserves.token2.clone();
                row.locked_value = locked_value;

                self.db.postgres.update_pool_aggregate(period, &row).await
            },
        }
    }

    /// Token-level bucket for both tokens of the pool.
    ///
    /// A token can sit in many pools, so its locked figure is a cross-pool
    /// sum: only this pool's reserve delta is applied, never the whole
    /// reserve (except on the pool's first-ever observation).
    async fn record_token(
        &self,
        txn: &TransactionRecord,
        old_reserves: &AmountPair,
        pool_seen: bool,
        period: Period,
    ) -> anyhow::Result<()> {
        let ts = period.bucket_start(txn.timestamp);

        for side in TokenSide::BOTH {
            let token = match side {
                TokenSide::Token1 => &txn.pool.token1,
                TokenSide::Token2 => &txn.pool.token2,
            };
            let is_swap_in = txn.is_swap_in(side);
            let price = txn.prices.side(side);
            let new_reserve = txn.reserves.side(side);
            let old_reserve = old_reserves.side(side);

            let existing = self
                .db
                .postgres
                .get_token_aggregate(period, ts, token.id)
                .await?;

            match existing {
                None => {
                    // Carry the locked figure forward from the latest
                    // earlier bucket before applying this pool's delta
                    let carried = self
                        .db
                        .postgres
                        .latest_token_aggregate_before(period, token.id, ts)
                        .await?
                        .map(|row| row.locked)
                        .unwrap_or_else(BigDecimal::zero);

                    let locked = if pool_seen {
                        carried - old_reserve + new_reserve
                    } else {
                        carried + new_reserve
                    };

                    let row = TokenAggregateRow {
                        ts,
                        token: token.id,
                        open_price: price.clone(),
                        high_price: price.clone(),
                        low_price: price.clone(),
                        close_price: price.clone(),
                        volume: seed_if(is_swap_in, txn.amounts.side(side)),
                        volume_value: seed_if(is_swap_in, txn.values.side(side)),
                        fees: seed_if(is_swap_in, txn.fees.side(side)),
                        fees_value: seed_if(is_swap_in, txn.fee_values.side(side)),
                        locked_value: round_stored(&locked * price),
                        locked,
                    };

                    self.db.postgres.insert_token_aggregate(period, &row).await?;
                },
                Some(mut row) => {
                    if *price > row.high_price {
                        row.high_price = price.clone();
                    }
                    if *price < row.low_price {
                        row.low_price = price.clone();
                    }
                    row.close_price = price.clone();

                    if is_swap_in {
                        row.volume += txn.amounts.side(side);
                        row.volume_value += txn.values.side(side);
                        row.fees += txn.fees.side(side);
                        row.fees_value += txn.fee_values.side(side);
                    }

                    row.locked = if pool_seen {
                        row.locked - old_reserve + new_reserve
                    } else {
                        row.locked + new_reserve
                    };
                    row.locked_value = round_stored(&row.locked * price);

                    self.db.postgres.update_token_aggregate(period, &row).await?;
                },
            }
        }

        Ok(())
    }

    /// System-wide bucket: volume/fees accumulate only for swaps; TVL is
    /// reconciled with this pool's locked-value delta.
    async fn record_plenty(
        &self,
        txn: &TransactionRecord,
        old_reserves: &AmountPair,
        period: Period,
    ) -> anyhow::Result<()> {
        let ts = period.bucket_start(txn.timestamp);
        let hour_ts = Period::Hour.bucket_start(txn.timestamp);

        let old_value = round_stored(
            old_reserves.side(TokenSide::Token1) * &txn.prices.token1
                + old_reserves.side(TokenSide::Token2) * &txn.prices.token2,
        );
        let new_value = pool_locked_value(txn);
        let swapped = txn.kind.swapped_in();

        let existing = self.db.postgres.get_plenty_aggregate(period, ts).await?;

        match existing {
            None => {
                // Fresh bucket: the token aggregates were updated above
                // and already include this transaction, so the cross-token
                // sum is exact and needs no delta adjustment
                let tvl = self.db.postgres.total_locked_value(hour_ts).await?;

                let row = PlentyAggregateRow {
                    ts,
                    volume_value: swapped
                        .map(|side| txn.values.side(side).clone())
                        .unwrap_or_else(BigDecimal::zero),
                    fees_value: swapped
                        .map(|side| txn.fee_values.side(side).clone())
                        .unwrap_or_else(BigDecimal::zero),
                    tvl_value: tvl,
                };

                self.db.postgres.insert_plenty_aggregate(period, &row).await
            },
            Some(mut row) => {
                // The hour bucket is written first and carries the most
                // precise TVL; the day bucket copies it when available
                let tvl = match period {
                    Period::Hour => &row.tvl_value - &old_value + &new_value,
                    Period::Day => match self.db.postgres.latest_hour_tvl(hour_ts).await? {
                        Some(hour_tvl) => hour_tvl,
                        None => &row.tvl_value - &old_value + &new_value,
                    },
                };

                if let Some(side) = swapped {
                    row.volume_value += txn.values.side(side);
                    row.fees_value += txn.fee_values.side(side);
                }
                row.tvl_value = tvl;

                self.db.postgres.update_plenty_aggregate(period, &row).await
            },
        }
    }
}

/// Reserves as they stood before the transaction executed.
///
/// A side the transaction deposited into (an in-swap or a liquidity add)
/// has the amount subtracted back out; a side it withdrew from has the
/// amount added back in.
pub(crate) fn reconstruct_old_reserves(txn: &TransactionRecord) -> AmountPair {
    let token1_added = matches!(
        txn.kind,
        TransactionKind::SwapToken1 | TransactionKind::AddLiquidity
    );
    let token2_added = matches!(
        txn.kind,
        TransactionKind::SwapToken2 | TransactionKind::AddLiquidity
    );

    let old1 = if token1_added {
        &txn.reserves.token1 - &txn.amounts.token1
    } else {
        &txn.reserves.token1 + &txn.amounts.token1
    };
    let old2 = if token2_added {
        &txn.reserves.token2 - &txn.amounts.token2
    } else {
        &txn.reserves.token2 + &txn.amounts.token2
    };

    AmountPair::new(old1, old2)
}

/// USD value locked in the pool at its current reserves.
fn pool_locked_value(txn: &TransactionRecord) -> BigDecimal {
    round_stored(
        &txn.reserves.token1 * &txn.prices.token1 + &txn.reserves.token2 * &txn.prices.token2,
    )
}

fn seed_if(condition: bool, value: &BigDecimal) -> BigDecimal {
    if condition {
        value.clone()
    } else {
        BigDecimal::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Pool, PoolFee, PoolKind, Token, TokenStandard};

    fn token(id: i64, symbol: &str) -> Token {
        Token {
            id,
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            decimals: 6,
            standard: TokenStandard::Fa12,
            address: Some(format!("KT1token{}", id)),
            token_id: None,
        }
    }

    fn txn(kind: TransactionKind, amounts: (i64, i64), reserves: (i64, i64)) -> TransactionRecord {
        TransactionRecord {
            id: 1,
            hash: "op1".to_string(),
            timestamp: 1654091110,
            account: "tz1abc".to_string(),
            pool: Pool {
                address: "KT1pool".to_string(),
                token1: token(1, "PLY"),
                token2: token(2, "USDt"),
                fee: PoolFee::Divisor(500),
                kind: PoolKind::Volatile,
            },
            kind,
            amounts: AmountPair::new(BigDecimal::from(amounts.0), BigDecimal::from(amounts.1)),
            reserves: AmountPair::new(BigDecimal::from(reserves.0), BigDecimal::from(reserves.1)),
            fees: AmountPair::default(),
            prices: AmountPair::new(BigDecimal::from(2), BigDecimal::from(1)),
            values: AmountPair::default(),
            fee_values: AmountPair::default(),
        }
    }

    #[test]
    fn swap_in_subtracts_only_the_deposited_side() {
        // 10 token1 in, 19 token2 out, post reserves (1010, 1981)
        let t = txn(TransactionKind::SwapToken1, (10, 19), (1010, 1981));
        let old = reconstruct_old_reserves(&t);
        assert_eq!(old.token1, BigDecimal::from(1000));
        assert_eq!(old.token2, BigDecimal::from(2000));
    }

    #[test]
    fn add_liquidity_subtracts_both_sides() {
        let t = txn(TransactionKind::AddLiquidity, (100, 200), (1100, 2200));
        let old = reconstruct_old_reserves(&t);
        assert_eq!(old.token1, BigDecimal::from(1000));
        assert_eq!(old.token2, BigDecimal::from(2000));
    }

    #[test]
    fn remove_liquidity_adds_both_sides_back() {
        let t = txn(TransactionKind::RemoveLiquidity, (100, 200), (900, 1800));
        let old = reconstruct_old_reserves(&t);
        assert_eq!(old.token1, BigDecimal::from(1000));
        assert_eq!(old.token2, BigDecimal::from(2000));
    }

    #[test]
    fn tvl_delta_matches_reserve_move() {
        // TVL reconciliation: new - old must equal the value moved by the
        // transaction at current prices
        let t = txn(TransactionKind::SwapToken2, (50, 100), (950, 2100));
        let old = reconstruct_old_reserves(&t);

        let old_value = &old.token1 * &t.prices.token1 + &old.token2 * &t.prices.token2;
        let new_value = &t.reserves.token1 * &t.prices.token1 + &t.reserves.token2 * &t.prices.token2;

        assert_eq!(old.token1, BigDecimal::from(1000));
        assert_eq!(old.token2, BigDecimal::from(2000));
        // (950-1000)*2 + (2100-2000)*1 = 0 for this value-conserving swap
        assert_eq!(new_value - old_value, BigDecimal::zero());
    }
}
