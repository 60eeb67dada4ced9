//! Transaction classification.
//!
//! Given an operation group and a target pool, locates the step that calls
//! a recognized entrypoint, decides the transaction kind, and extracts the
//! moved token amounts and post-transaction reserves.
//!
//! Entrypoint names vary by pool implementation generation; each
//! generation carries its own closed mapping instead of scattering string
//! lists through the classifier.

use anyhow::{bail, Context};
use bigdecimal::{BigDecimal, Zero};
use serde_json::Value;

use crate::db::models::{AmountPair, Pool, PoolKind, Token, TokenStandard, TransactionKind};
use crate::tzkt::OperationStep;
use crate::utils::{big_pow10, json_decimal};

/// Storage field aliases for the token1 reserve, in priority order
/// (volatile, stable, native-paired pool generations respectively).
const TOKEN_1_RESERVE_FIELDS: [&str; 3] = ["token1Pool", "token1_pool", "tezPool"];

/// Storage field aliases for the token2 reserve, in priority order.
const TOKEN_2_RESERVE_FIELDS: [&str; 3] = ["token2Pool", "token2_pool", "ctezPool"];

/// Pool implementation generation, selected from the pool's stored type
/// tag and the configured native/wrapped pair address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolGeneration {
    /// Paired-reserve pools with a generic `Swap` entrypoint
    V2,
    /// The designated native/wrapped pair whose swap entrypoint names
    /// encode the direction
    TezPaired,
    /// Concentrated-liquidity pools
    Clmm,
}

/// Semantic action behind a recognized entrypoint name.
///
/// Swap direction is encoded in the name where the generation allows it;
/// otherwise it is resolved later from the call parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrypointAction {
    SwapToken1In,
    SwapToken2In,
    SwapByRequiredToken,
    AddLiquidity,
    RemoveLiquidity,
    SetPosition,
    UpdatePosition,
}

impl PoolGeneration {
    pub fn for_pool(pool: &Pool, tez_ctez_pool: &str) -> Self {
        if pool.kind == PoolKind::Concentrated {
            Self::Clmm
        } else if pool.address == tez_ctez_pool {
            Self::TezPaired
        } else {
            Self::V2
        }
    }

    /// Map an entrypoint name to its action, or `None` when the name is
    /// not a recognized economic event for this generation.
    pub fn classify_entrypoint(&self, name: &str) -> Option<EntrypointAction> {
        match self {
            Self::V2 => match name {
                "Swap" => Some(EntrypointAction::SwapByRequiredToken),
                "add_liquidity" | "AddLiquidity" => Some(EntrypointAction::AddLiquidity),
                "remove_liquidity" | "RemoveLiquidity" => Some(EntrypointAction::RemoveLiquidity),
                _ => None,
            },
            Self::TezPaired => match name {
                "tez_to_ctez" => Some(EntrypointAction::SwapToken1In),
                "ctez_to_tez" => Some(EntrypointAction::SwapToken2In),
                "add_liquidity" | "AddLiquidity" => Some(EntrypointAction::AddLiquidity),
                "remove_liquidity" | "RemoveLiquidity" => Some(EntrypointAction::RemoveLiquidity),
                _ => None,
            },
            Self::Clmm => match name {
                "x_to_y" => Some(EntrypointAction::SwapToken1In),
                "y_to_x" => Some(EntrypointAction::SwapToken2In),
                "set_position" => Some(EntrypointAction::SetPosition),
                "update_position" => Some(EntrypointAction::UpdatePosition),
                _ => None,
            },
        }
    }

    /// All entrypoint names this generation recognizes, used to filter the
    /// operation listing upstream.
    pub fn entrypoints(&self) -> &'static [&'static str] {
        match self {
            Self::V2 => &[
                "Swap",
                "add_liquidity",
                "AddLiquidity",
                "remove_liquidity",
                "RemoveLiquidity",
            ],
            Self::TezPaired => &[
                "tez_to_ctez",
                "ctez_to_tez",
                "add_liquidity",
                "AddLiquidity",
                "remove_liquidity",
                "RemoveLiquidity",
            ],
            Self::Clmm => &["x_to_y", "y_to_x", "set_position", "update_position"],
        }
    }
}

/// Decide the transaction kind for a qualifying step.
///
/// Returns `Ok(None)` for pure fee collections (zero liquidity delta),
/// which are deliberately not recorded.
pub fn resolve_kind(
    pool: &Pool,
    step: &OperationStep,
    action: EntrypointAction,
) -> anyhow::Result<Option<TransactionKind>> {
    match action {
        EntrypointAction::SwapToken1In => Ok(Some(TransactionKind::SwapToken1)),
        EntrypointAction::SwapToken2In => Ok(Some(TransactionKind::SwapToken2)),
        EntrypointAction::AddLiquidity => Ok(Some(TransactionKind::AddLiquidity)),
        EntrypointAction::RemoveLiquidity => Ok(Some(TransactionKind::RemoveLiquidity)),
        EntrypointAction::SwapByRequiredToken => {
            // The "required token" is the side the trader wants out; when
            // it names token1, token2 was swapped in.
            let params = parameter_value(step);
            let required_address = params
                .and_then(|v| v.get("requiredTokenAddress"))
                .and_then(Value::as_str);
            let required_id = params
                .and_then(|v| v.get("requiredTokenId"))
                .and_then(Value::as_str)
                .unwrap_or("");

            let token1_matches = required_address == pool.token1.address.as_deref()
                && required_id == pool.token1.token_id.unwrap_or(0).to_string();

            if token1_matches {
                Ok(Some(TransactionKind::SwapToken2))
            } else {
                Ok(Some(TransactionKind::SwapToken1))
            }
        },
        EntrypointAction::SetPosition => {
            let liquidity = position_field(step, "liquidity")?;
            if liquidity.is_zero() {
                Ok(None)
            } else {
                Ok(Some(TransactionKind::AddLiquidity))
            }
        },
        EntrypointAction::UpdatePosition => {
            let delta = position_field(step, "liquidity_delta")?;
            if delta.is_zero() {
                Ok(None)
            } else if delta > BigDecimal::zero() {
                Ok(Some(TransactionKind::AddLiquidity))
            } else {
                Ok(Some(TransactionKind::RemoveLiquidity))
            }
        },
    }
}

/// Amount of `token` moved by the operation, scanning forward from the
/// qualifying step at `start`.
///
/// The qualifying call itself rarely carries the amounts; the internal
/// transfer steps that follow do. Native-asset movements are recognized by
/// a non-zero native amount, token transfers by target address plus a
/// transfer-shaped parameter, disambiguated by sub-id for FA2.
///
/// The scan is bounded by the operation length; a missing transfer step is
/// an error, not a silent zero, since a partial record would corrupt the
/// running aggregates downstream.
pub fn token_amount(
    token: &Token,
    operation: &[OperationStep],
    start: usize,
) -> anyhow::Result<BigDecimal> {
    for step in operation.iter().skip(start) {
        match token.standard {
            TokenStandard::Tez => {
                if step.amount != 0 {
                    return Ok(BigDecimal::from(step.amount) / big_pow10(token.decimals));
                }
            },
            TokenStandard::Fa2 => {
                if is_transfer_of(step, token) {
                    // parameter shape: [ { from_, txs: [ { to_, token_id, amount } ] } ]
                    let tx = parameter_value(step)
                        .and_then(|v| v.get(0))
                        .and_then(|batch| batch.get("txs"))
                        .and_then(|txs| txs.get(0));

                    let Some(tx) = tx else { continue };

                    let id_matches = tx
                        .get("token_id")
                        .and_then(Value::as_str)
                        .is_some_and(|id| id == token.token_id.unwrap_or(0).to_string());

                    if id_matches {
                        let amount = tx
                            .get("amount")
                            .and_then(json_decimal)
                            .with_context(|| {
                                format!("Malformed FA2 transfer amount for {}", token.symbol)
                            })?;
                        return Ok(amount / big_pow10(token.decimals));
                    }
                }
            },
            TokenStandard::Fa12 => {
                if is_transfer_of(step, token) {
                    let amount = parameter_value(step)
                        .and_then(|v| v.get("value"))
                        .and_then(json_decimal)
                        .with_context(|| {
                            format!("Malformed FA1.2 transfer amount for {}", token.symbol)
                        })?;
                    return Ok(amount / big_pow10(token.decimals));
                }
            },
        }
    }

    bail!(
        "No transfer step found for token {} in operation",
        token.symbol
    )
}

/// Post-transaction reserves of both pool tokens, read from the qualifying
/// step's storage snapshot. Field names vary by pool generation; aliases
/// are tried in priority order.
pub fn reserves_from_storage(step: &OperationStep, pool: &Pool) -> anyhow::Result<AmountPair> {
    let raw1 = storage_field(&step.storage, &TOKEN_1_RESERVE_FIELDS)
        .with_context(|| format!("No token1 reserve in storage of pool {}", pool.address))?;
    let raw2 = storage_field(&step.storage, &TOKEN_2_RESERVE_FIELDS)
        .with_context(|| format!("No token2 reserve in storage of pool {}", pool.address))?;

    Ok(AmountPair::new(
        pool.normalize_token1(&raw1),
        pool.normalize_token2(&raw2),
    ))
}

fn storage_field(storage: &Value, aliases: &[&str]) -> Option<BigDecimal> {
    aliases
        .iter()
        .find_map(|field| storage.get(field).and_then(json_decimal))
}

fn parameter_value(step: &OperationStep) -> Option<&Value> {
    step.parameter.as_ref().map(|p| &p.value)
}

fn is_transfer_of(step: &OperationStep, token: &Token) -> bool {
    token
        .address
        .as_deref()
        .is_some_and(|address| step.targets(address))
        && step.entrypoint() == Some("transfer")
}

/// Signed liquidity field of a position-management call.
fn position_field(step: &OperationStep, field: &str) -> anyhow::Result<BigDecimal> {
    parameter_value(step)
        .and_then(|v| v.get(field))
        .and_then(json_decimal)
        .with_context(|| format!("Position call is missing the {} field", field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::PoolFee;
    use serde_json::json;

    fn token(id: i64, symbol: &str, decimals: u8, standard: TokenStandard) -> Token {
        Token {
            id,
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            decimals,
            standard,
            address: match standard {
                TokenStandard::Tez => None,
                _ => Some(format!("KT1token{}", id)),
            },
            token_id: match standard {
                TokenStandard::Fa2 => Some(0),
                _ => None,
            },
        }
    }

    fn volatile_pool() -> Pool {
        Pool {
            address: "KT1pool".to_string(),
            token1: token(1, "PLY", 6, TokenStandard::Fa12),
            token2: token(2, "USDt", 6, TokenStandard::Fa2),
            fee: PoolFee::Divisor(500),
            kind: PoolKind::Volatile,
        }
    }

    fn clmm_pool() -> Pool {
        Pool {
            address: "KT1clmm".to_string(),
            token1: token(3, "uUSD", 12, TokenStandard::Fa2),
            token2: token(4, "USDt", 6, TokenStandard::Fa2),
            fee: PoolFee::BasisPoints(10),
            kind: PoolKind::Concentrated,
        }
    }

    fn step(value: serde_json::Value) -> OperationStep {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn generation_selection() {
        let pool = volatile_pool();
        assert_eq!(
            PoolGeneration::for_pool(&pool, "KT1tezctez"),
            PoolGeneration::V2
        );
        let mut tez = volatile_pool();
        tez.address = "KT1tezctez".to_string();
        assert_eq!(
            PoolGeneration::for_pool(&tez, "KT1tezctez"),
            PoolGeneration::TezPaired
        );
        assert_eq!(
            PoolGeneration::for_pool(&clmm_pool(), "KT1tezctez"),
            PoolGeneration::Clmm
        );
    }

    #[test]
    fn entrypoint_dispatch_per_generation() {
        assert_eq!(
            PoolGeneration::V2.classify_entrypoint("Swap"),
            Some(EntrypointAction::SwapByRequiredToken)
        );
        assert_eq!(
            PoolGeneration::V2.classify_entrypoint("AddLiquidity"),
            Some(EntrypointAction::AddLiquidity)
        );
        assert_eq!(PoolGeneration::V2.classify_entrypoint("x_to_y"), None);

        assert_eq!(
            PoolGeneration::TezPaired.classify_entrypoint("tez_to_ctez"),
            Some(EntrypointAction::SwapToken1In)
        );
        assert_eq!(
            PoolGeneration::TezPaired.classify_entrypoint("ctez_to_tez"),
            Some(EntrypointAction::SwapToken2In)
        );

        assert_eq!(
            PoolGeneration::Clmm.classify_entrypoint("update_position"),
            Some(EntrypointAction::UpdatePosition)
        );
        assert_eq!(PoolGeneration::Clmm.classify_entrypoint("Swap"), None);
    }

    #[test]
    fn swap_direction_from_required_token() {
        let pool = volatile_pool();

        // Trader wants token1 out, so token2 was swapped in
        let wants_token1 = step(json!({
            "id": 1,
            "parameter": {
                "entrypoint": "Swap",
                "value": { "requiredTokenAddress": "KT1token1", "requiredTokenId": "0" }
            }
        }));
        assert_eq!(
            resolve_kind(&pool, &wants_token1, EntrypointAction::SwapByRequiredToken).unwrap(),
            Some(TransactionKind::SwapToken2)
        );

        let wants_token2 = step(json!({
            "id": 2,
            "parameter": {
                "entrypoint": "Swap",
                "value": { "requiredTokenAddress": "KT1token2", "requiredTokenId": "0" }
            }
        }));
        assert_eq!(
            resolve_kind(&pool, &wants_token2, EntrypointAction::SwapByRequiredToken).unwrap(),
            Some(TransactionKind::SwapToken1)
        );
    }

    #[test]
    fn update_position_sign_decides_kind() {
        let pool = clmm_pool();

        let add = step(json!({
            "id": 1,
            "parameter": { "entrypoint": "update_position", "value": { "liquidity_delta": "5000" } }
        }));
        assert_eq!(
            resolve_kind(&pool, &add, EntrypointAction::UpdatePosition).unwrap(),
            Some(TransactionKind::AddLiquidity)
        );

        let remove = step(json!({
            "id": 2,
            "parameter": { "entrypoint": "update_position", "value": { "liquidity_delta": "-5000" } }
        }));
        assert_eq!(
            resolve_kind(&pool, &remove, EntrypointAction::UpdatePosition).unwrap(),
            Some(TransactionKind::RemoveLiquidity)
        );

        // Pure fee collection: skipped entirely, not an error
        let collect = step(json!({
            "id": 3,
            "parameter": { "entrypoint": "update_position", "value": { "liquidity_delta": "0" } }
        }));
        assert_eq!(
            resolve_kind(&pool, &collect, EntrypointAction::UpdatePosition).unwrap(),
            None
        );
    }

    #[test]
    fn set_position_with_zero_liquidity_is_skipped() {
        let pool = clmm_pool();
        let zero = step(json!({
            "id": 1,
            "parameter": { "entrypoint": "set_position", "value": { "liquidity": "0" } }
        }));
        assert_eq!(
            resolve_kind(&pool, &zero, EntrypointAction::SetPosition).unwrap(),
            None
        );

        let nonzero = step(json!({
            "id": 2,
            "parameter": { "entrypoint": "set_position", "value": { "liquidity": "123" } }
        }));
        assert_eq!(
            resolve_kind(&pool, &nonzero, EntrypointAction::SetPosition).unwrap(),
            Some(TransactionKind::AddLiquidity)
        );
    }

    #[test]
    fn malformed_position_call_fails_loudly() {
        let pool = clmm_pool();
        let missing = step(json!({
            "id": 1,
            "parameter": { "entrypoint": "update_position", "value": {} }
        }));
        assert!(resolve_kind(&pool, &missing, EntrypointAction::UpdatePosition).is_err());
    }

    #[test]
    fn forward_scan_finds_fa12_transfer() {
        let pool = volatile_pool();
        let operation = vec![
            step(json!({
                "id": 10,
                "target": { "address": "KT1pool" },
                "parameter": { "entrypoint": "Swap", "value": {} }
            })),
            step(json!({
                "id": 11,
                "target": { "address": "KT1token1" },
                "parameter": { "entrypoint": "transfer", "value": { "from": "tz1a", "to": "KT1pool", "value": "2500000" } }
            })),
        ];

        let amount = token_amount(&pool.token1, &operation, 0).unwrap();
        assert_eq!(amount, "2.5".parse::<BigDecimal>().unwrap());
    }

    #[test]
    fn forward_scan_matches_fa2_sub_id() {
        let pool = volatile_pool();
        let operation = vec![
            // A transfer of a different sub-id on the same contract must
            // be skipped by the scan
            step(json!({
                "id": 20,
                "target": { "address": "KT1token2" },
                "parameter": { "entrypoint": "transfer", "value": [
                    { "from_": "tz1a", "txs": [ { "to_": "KT1pool", "token_id": "7", "amount": "999" } ] }
                ] }
            })),
            step(json!({
                "id": 21,
                "target": { "address": "KT1token2" },
                "parameter": { "entrypoint": "transfer", "value": [
                    { "from_": "tz1a", "txs": [ { "to_": "KT1pool", "token_id": "0", "amount": "3000000" } ] }
                ] }
            })),
        ];

        let amount = token_amount(&pool.token2, &operation, 0).unwrap();
        assert_eq!(amount, BigDecimal::from(3));
    }

    #[test]
    fn forward_scan_finds_native_amount() {
        let tez = token(5, "TEZ", 6, TokenStandard::Tez);
        let operation = vec![
            step(json!({ "id": 30, "amount": 0 })),
            step(json!({ "id": 31, "amount": 1500000 })),
        ];

        let amount = token_amount(&tez, &operation, 0).unwrap();
        assert_eq!(amount, "1.5".parse::<BigDecimal>().unwrap());
    }

    #[test]
    fn missing_transfer_step_is_an_error() {
        let pool = volatile_pool();
        let operation = vec![step(json!({
            "id": 40,
            "target": { "address": "KT1pool" },
            "parameter": { "entrypoint": "Swap", "value": {} }
        }))];

        assert!(token_amount(&pool.token1, &operation, 0).is_err());
    }

    #[test]
    fn reserves_from_storage_tries_aliases() {
        let pool = volatile_pool();

        let snake = step(json!({
            "id": 50,
            "storage": { "token1_pool": "1000000000", "token2_pool": "2000000000" }
        }));
        let reserves = reserves_from_storage(&snake, &pool).unwrap();
        assert_eq!(reserves.token1, BigDecimal::from(1000));
        assert_eq!(reserves.token2, BigDecimal::from(2000));

        let tez_style = step(json!({
            "id": 51,
            "storage": { "tezPool": "5000000", "ctezPool": "4000000" }
        }));
        let reserves = reserves_from_storage(&tez_style, &pool).unwrap();
        assert_eq!(reserves.token1, BigDecimal::from(5));
        assert_eq!(reserves.token2, BigDecimal::from(4));
    }

    #[test]
    fn missing_reserves_are_an_error() {
        let pool = volatile_pool();
        let empty = step(json!({ "id": 60, "storage": {} }));
        assert!(reserves_from_storage(&empty, &pool).is_err());
    }
}
