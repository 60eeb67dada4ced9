use anyhow::bail;
use bigdecimal::BigDecimal;

use crate::db::models::Token;
use crate::utils::big_pow10;

/// Pool implementation generation tag.
///
/// Drives entrypoint recognition, reserve extraction, fee arithmetic and
/// the pricing basis:
/// - `Stable` / `Volatile` / `Tez` are paired-reserve pools (the `Tez`
///   variant holds the native asset on one side)
/// - `Concentrated` is the tick-based design with no simple paired
///   reserves in storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Stable,
    Volatile,
    Tez,
    Concentrated,
}

impl PoolKind {
    pub fn from_db(s: &str) -> anyhow::Result<Self> {
        match s {
            "STABLE" => Ok(Self::Stable),
            "VOLATILE" => Ok(Self::Volatile),
            "TEZ" => Ok(Self::Tez),
            "V3" => Ok(Self::Concentrated),
            other => bail!("Unknown pool type: {}", other),
        }
    }
}

/// Fee parameter of a pool.
///
/// Legacy paired pools store a plain divisor (fee = amount / divisor);
/// concentrated pools store basis points (fee = amount * bps / 10000).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolFee {
    Divisor(u64),
    BasisPoints(u64),
}

impl PoolFee {
    /// Fee charged on a given base amount.
    pub fn amount(&self, base: &BigDecimal) -> BigDecimal {
        match self {
            Self::Divisor(d) => base / BigDecimal::from(*d),
            Self::BasisPoints(bps) => base * BigDecimal::from(*bps) / BigDecimal::from(10_000u32),
        }
    }
}

/// A two-token AMM pool instance.
///
/// The token1/token2 ordering is fixed for the lifetime of the pool; all
/// aggregate rows key off this ordering.
#[derive(Debug, Clone)]
pub struct Pool {
    pub address: String,
    pub token1: Token,
    pub token2: Token,
    pub fee: PoolFee,
    pub kind: PoolKind,
}

impl Pool {
    /// Scale a raw on-chain token1 quantity down by its decimals.
    pub fn normalize_token1(&self, raw: &BigDecimal) -> BigDecimal {
        raw / big_pow10(self.token1.decimals)
    }

    /// Scale a raw on-chain token2 quantity down by its decimals.
    pub fn normalize_token2(&self, raw: &BigDecimal) -> BigDecimal {
        raw / big_pow10(self.token2.decimals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn divisor_fee() {
        // fees=500 on legacy pools means 0.2%
        let fee = PoolFee::Divisor(500);
        let base = BigDecimal::from(1000);
        assert_eq!(fee.amount(&base), BigDecimal::from(2));
    }

    #[test]
    fn basis_points_fee() {
        let fee = PoolFee::BasisPoints(30);
        let base = BigDecimal::from(1000);
        assert_eq!(fee.amount(&base), BigDecimal::from_str("3").unwrap());
    }
}
