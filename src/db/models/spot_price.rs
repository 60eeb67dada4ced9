use bigdecimal::BigDecimal;

/// Most recent known USD unit price of a token at an instant
/// (`price_spot` table, keyed by (ts, token)).
#[derive(Debug, Clone)]
pub struct SpotPrice {
    pub ts: i64,
    pub token: i64,
    pub value: BigDecimal,
}
