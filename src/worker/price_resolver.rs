use std::sync::Arc;

use bigdecimal::{BigDecimal, One, Zero};

use crate::db::models::{AmountPair, PoolKind, SpotPrice, Token, TransactionKind, TransactionRecord};
use crate::utils::round_stored;
use crate::Database;

/// USD price resolution for the two tokens of a classified transaction.
///
/// Resolution priority follows the reference-asset tree:
/// 1. Group 0 (hard-pegged stablecoins) → exactly $1.00, never looked up
/// 2. Any other token → most recent spot price at or before the
///    transaction timestamp
/// 3. When one side of the pair sits in the tree, the other side is
///    derived from it through the pricing basis (reserves for volatile
///    pools, executed amounts for stable and concentrated pools)
///
/// A pair matching no tree group keeps its spot prices, possibly zero;
/// "unpriced" is an accepted outcome handled downstream.
pub struct PriceResolver {
    db: Arc<Database>,
    tree: Vec<Vec<String>>,
}

impl PriceResolver {
    pub fn new(db: Arc<Database>, tree: Vec<Vec<String>>) -> Self {
        Self {
            db,
            tree,
        }
    }

    /// Resolve the USD unit price pair for a transaction. The record's
    /// amounts and reserves must already be populated; prices are not yet.
    pub async fn resolve(&self, txn: &TransactionRecord) -> anyhow::Result<AmountPair> {
        let spot1 = self.price_at(txn.timestamp, &txn.pool.token1).await?;
        let spot2 = self.price_at(txn.timestamp, &txn.pool.token2).await?;

        Ok(derive_pair_prices(&self.tree, txn, spot1, spot2))
    }

    /// Persist both tokens' spot prices at the transaction timestamp.
    /// Group-0 stablecoins are definitionally constant and not stored.
    pub async fn record_spot_prices(&self, txn: &TransactionRecord) -> anyhow::Result<()> {
        let sides = [
            (&txn.pool.token1, &txn.prices.token1),
            (&txn.pool.token2, &txn.prices.token2),
        ];

        for (token, price) in sides {
            if self.is_pegged(&token.symbol) {
                continue;
            }

            self.db
                .postgres
                .upsert_spot_price(&SpotPrice {
                    ts: txn.timestamp,
                    token: token.id,
                    value: price.clone(),
                })
                .await?;
        }

        Ok(())
    }

    /// Most recent known price at or before `ts`; zero when the token has
    /// never been priced.
    async fn price_at(&self, ts: i64, token: &Token) -> anyhow::Result<BigDecimal> {
        if self.is_pegged(&token.symbol) {
            return Ok(BigDecimal::one());
        }

        Ok(self
            .db
            .postgres
            .latest_spot_price(token.id, ts)
            .await?
            .unwrap_or_else(BigDecimal::zero))
    }

    fn is_pegged(&self, symbol: &str) -> bool {
        self.tree
            .first()
            .is_some_and(|group| group.iter().any(|s| s == symbol))
    }
}

/// Walk the reference tree and derive the pair's prices.
///
/// The first token matching a tree group (in priority order) anchors the
/// pair; the other side's price becomes
/// `anchor_base * anchor_price / other_base`.
fn derive_pair_prices(
    tree: &[Vec<String>],
    txn: &TransactionRecord,
    spot1: BigDecimal,
    spot2: BigDecimal,
) -> AmountPair {
    let pool = &txn.pool;

    // Balanced stable deposits keep their trusted spot prices; deriving
    // from deposit ratios would only add noise.
    if pool.kind == PoolKind::Stable
        && txn.kind == TransactionKind::AddLiquidity
        && !spot1.is_zero()
        && !spot2.is_zero()
    {
        return AmountPair::new(spot1, spot2);
    }

    // Concentrated pools only reveal an executed rate on swaps.
    if pool.kind == PoolKind::Concentrated && !txn.kind.is_swap() {
        return AmountPair::new(spot1, spot2);
    }

    // Reserve ratios are a poor proxy for the instantaneous price in
    // low-slippage and tick-based designs; use the executed amounts there.
    let use_amounts = matches!(pool.kind, PoolKind::Stable | PoolKind::Concentrated);
    let (base1, base2) = if use_amounts {
        (&txn.amounts.token1, &txn.amounts.token2)
    } else {
        (&txn.reserves.token1, &txn.reserves.token2)
    };

    let mut price1 = spot1;
    let mut price2 = spot2;

    for group in tree {
        if group.iter().any(|s| s == &pool.token1.symbol) {
            if !base2.is_zero() {
                price2 = round_stored(base1 * &price1 / base2);
            }
            break;
        } else if group.iter().any(|s| s == &pool.token2.symbol) {
            if !base1.is_zero() {
                price1 = round_stored(base2 * &price2 / base1);
            }
            break;
        }
    }

    AmountPair::new(price1, price2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Pool, PoolFee, TokenStandard};

    fn tree() -> Vec<Vec<String>> {
        vec![
            vec!["USDt".to_string(), "USDC.e".to_string()],
            vec!["CTez".to_string()],
            vec!["uUSD".to_string(), "kUSD".to_string()],
            vec!["YOU".to_string()],
        ]
    }

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

    fn txn(pool: Pool, kind: TransactionKind, amounts: AmountPair, reserves: AmountPair) -> TransactionRecord {
        TransactionRecord {
            id: 1,
            hash: "op1".to_string(),
            timestamp: 1654091110,
            account: "tz1abc".to_string(),
            pool,
            kind,
            amounts,
            reserves,
            fees: AmountPair::default(),
            prices: AmountPair::default(),
            values: AmountPair::default(),
            fee_values: AmountPair::default(),
        }
    }

    fn volatile_pool(symbol1: &str, symbol2: &str) -> Pool {
        Pool {
            address: "KT1pool".to_string(),
            token1: token(1, symbol1),
            token2: token(2, symbol2),
            fee: PoolFee::Divisor(500),
            kind: PoolKind::Volatile,
        }
    }

    #[test]
    fn volatile_pool_prices_by_reserve_ratio() {
        // Reserves (1000 TokenA, 2000 USDt), USDt pegged to $1:
        // TokenA resolves to 2000 * 1 / 1000 = $2.00
        let pool = volatile_pool("TokenA", "USDt");
        let t = txn(
            pool,
            TransactionKind::SwapToken1,
            AmountPair::new(BigDecimal::from(10), BigDecimal::from(20)),
            AmountPair::new(BigDecimal::from(1000), BigDecimal::from(2000)),
        );

        let prices = derive_pair_prices(&tree(), &t, BigDecimal::zero(), BigDecimal::one());
        assert_eq!(prices.token1, BigDecimal::from(2));
        assert_eq!(prices.token2, BigDecimal::one());
    }

    #[test]
    fn pegged_token_is_always_one() {
        // Whatever the reserves say, the anchor side stays at $1 and only
        // the other side is derived from it
        let pool = volatile_pool("USDt", "TokenB");
        let t = txn(
            pool,
            TransactionKind::SwapToken2,
            AmountPair::new(BigDecimal::from(5), BigDecimal::from(50)),
            AmountPair::new(BigDecimal::from(300), BigDecimal::from(600)),
        );

        let prices = derive_pair_prices(&tree(), &t, BigDecimal::one(), BigDecimal::zero());
        assert_eq!(prices.token1, BigDecimal::one());
        assert_eq!(prices.token2, "0.5".parse::<BigDecimal>().unwrap());
    }

    #[test]
    fn stable_deposit_keeps_known_spot_prices() {
        // Both sides already priced from a prior swap: a balanced stable
        // deposit must not re-derive from the deposit ratio
        let mut pool = volatile_pool("CTez", "USDt");
        pool.kind = PoolKind::Stable;
        let t = txn(
            pool,
            TransactionKind::AddLiquidity,
            AmountPair::new(BigDecimal::from(100), BigDecimal::from(150)),
            AmountPair::new(BigDecimal::from(1100), BigDecimal::from(1150)),
        );

        let spot1: BigDecimal = "1.02".parse().unwrap();
        let prices = derive_pair_prices(&tree(), &t, spot1.clone(), BigDecimal::one());
        assert_eq!(prices.token1, spot1);
        assert_eq!(prices.token2, BigDecimal::one());
    }

    #[test]
    fn stable_swap_prices_by_executed_amounts() {
        let mut pool = volatile_pool("TokenC", "USDt");
        pool.kind = PoolKind::Stable;
        // 100 TokenC in, 98 USDt out: executed rate 0.98
        let t = txn(
            pool,
            TransactionKind::SwapToken1,
            AmountPair::new(BigDecimal::from(100), BigDecimal::from(98)),
            AmountPair::new(BigDecimal::from(100_000), BigDecimal::from(90_000)),
        );

        let prices = derive_pair_prices(&tree(), &t, BigDecimal::zero(), BigDecimal::one());
        assert_eq!(prices.token1, "0.98".parse::<BigDecimal>().unwrap());
    }

    #[test]
    fn concentrated_liquidity_event_keeps_spot_prices() {
        let mut pool = volatile_pool("TokenD", "USDt");
        pool.kind = PoolKind::Concentrated;
        let t = txn(
            pool,
            TransactionKind::AddLiquidity,
            AmountPair::new(BigDecimal::from(10), BigDecimal::from(30)),
            AmountPair::new(BigDecimal::from(500), BigDecimal::from(900)),
        );

        let spot1: BigDecimal = "3.5".parse().unwrap();
        let prices = derive_pair_prices(&tree(), &t, spot1.clone(), BigDecimal::one());
        // Amount ratio (3.0) must not override the known spot price
        assert_eq!(prices.token1, spot1);
    }

    #[test]
    fn unmatched_pair_stays_unpriced() {
        let pool = volatile_pool("TokenE", "TokenF");
        let t = txn(
            pool,
            TransactionKind::SwapToken1,
            AmountPair::new(BigDecimal::from(10), BigDecimal::from(20)),
            AmountPair::new(BigDecimal::from(100), BigDecimal::from(200)),
        );

        let prices = derive_pair_prices(&tree(), &t, BigDecimal::zero(), BigDecimal::zero());
        assert!(prices.token1.is_zero());
        assert!(prices.token2.is_zero());
    }

    #[test]
    fn zero_base_leaves_price_at_spot() {
        // Freshly created pool: nothing on the other side yet, the derived
        // price stays at its (zero) spot value instead of dividing by zero
        let pool = volatile_pool("USDt", "TokenG");
        let t = txn(
            pool,
            TransactionKind::AddLiquidity,
            AmountPair::new(BigDecimal::from(10), BigDecimal::zero()),
            AmountPair::new(BigDecimal::from(10), BigDecimal::zero()),
        );

        let prices = derive_pair_prices(&tree(), &t, BigDecimal::one(), BigDecimal::zero());
        assert!(prices.token2.is_zero());
    }

    #[test]
    fn tree_priority_anchors_on_earliest_group() {
        // CTez (group 1) outranks uUSD (group 2): CTez anchors and uUSD
        // gets derived, not the other way round
        let pool = volatile_pool("uUSD", "CTez");
        let t = txn(
            pool,
            TransactionKind::SwapToken1,
            AmountPair::new(BigDecimal::from(10), BigDecimal::from(9)),
            AmountPair::new(BigDecimal::from(1000), BigDecimal::from(500)),
        );

        let ctez_spot: BigDecimal = "2".parse().unwrap();
        let uusd_spot: BigDecimal = "7".parse().unwrap();
        let prices = derive_pair_prices(&tree(), &t, uusd_spot, ctez_spot.clone());
        // token2 (CTez) anchors: price1 = 500 * 2 / 1000 = 1
        assert_eq!(prices.token1, BigDecimal::one());
        assert_eq!(prices.token2, ctez_spot);
    }
}
