use bigdecimal::BigDecimal;

/// Aggregation bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Hour,
    Day,
}

impl Period {
    /// Start timestamp (UTC) of the bucket containing `ts`.
    pub fn bucket_start(&self, ts: i64) -> i64 {
        match self {
            Period::Hour => ts / 3600 * 3600,
            Period::Day => ts / 86400 * 86400,
        }
    }

    /// Table name suffix (`pool_aggregate_hour`, `pool_aggregate_day`, ...).
    pub fn suffix(&self) -> &'static str {
        match self {
            Period::Hour => "hour",
            Period::Day => "day",
        }
    }
}

/// Per-pool aggregate row (`pool_aggregate_hour` / `pool_aggregate_day`).
///
/// Volume and fee fields are cumulative within the bucket; locked fields
/// hold the last observed reserves, not a sum.
#[derive(Debug, Clone)]
pub struct PoolAggregateRow {
    pub ts: i64,
    pub pool: String,
    pub token_1_volume: BigDecimal,
    pub token_2_volume: BigDecimal,
    pub volume_value: BigDecimal,
    pub token_1_fees: BigDecimal,
    pub token_2_fees: BigDecimal,
    pub fees_value: BigDecimal,
    pub token_1_locked: BigDecimal,
    pub token_2_locked: BigDecimal,
    pub locked_value: BigDecimal,
}

/// Per-token aggregate row (`token_aggregate_hour` / `token_aggregate_day`).
///
/// `locked` is a cross-pool sum reconciled by per-pool deltas; a token
/// held by several pools is never double counted.
#[derive(Debug, Clone)]
pub struct TokenAggregateRow {
    pub ts: i64,
    pub token: i64,
    pub open_price: BigDecimal,
    pub high_price: BigDecimal,
    pub low_price: BigDecimal,
    pub close_price: BigDecimal,
    pub volume: BigDecimal,
    pub volume_value: BigDecimal,
    pub fees: BigDecimal,
    pub fees_value: BigDecimal,
    pub locked: BigDecimal,
    pub locked_value: BigDecimal,
}

/// System-wide aggregate row (`plenty_aggregate_hour` / `plenty_aggregate_day`).
#[derive(Debug, Clone)]
pub struct PlentyAggregateRow {
    pub ts: i64,
    pub volume_value: BigDecimal,
    pub fees_value: BigDecimal,
    pub tvl_value: BigDecimal,
}
