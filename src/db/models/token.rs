use anyhow::bail;

/// On-chain token standard.
///
/// `Tez` is the sentinel for the chain's native asset; it has no contract
/// address and its transfers are recognized by a non-zero native amount on
/// an operation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStandard {
    Fa12,
    Fa2,
    Tez,
}

impl TokenStandard {
    pub fn from_db(s: &str) -> anyhow::Result<Self> {
        match s {
            "FA1.2" => Ok(Self::Fa12),
            "FA2" => Ok(Self::Fa2),
            "TEZ" => Ok(Self::Tez),
            other => bail!("Unknown token standard: {}", other),
        }
    }
}

/// Token metadata loaded from the registry (`token` table).
///
/// Immutable for the lifetime of a processing run.
#[derive(Debug, Clone)]
pub struct Token {
    /// Registry row id, used as the foreign key in aggregate tables
    pub id: i64,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub standard: TokenStandard,
    /// Contract address; absent for the native asset
    pub address: Option<String>,
    /// FA2 sub-id; absent for FA1.2 and the native asset
    pub token_id: Option<i64>,
}
