use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Account reference as returned by the indexer API.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountRef {
    pub address: String,
}

/// Call parameter of an operation step.
#[derive(Debug, Clone, Deserialize)]
pub struct StepParameter {
    pub entrypoint: String,
    #[serde(default)]
    pub value: Value,
}

/// One internal step of an operation group.
///
/// An operation group is an ordered sequence of these; the step carrying
/// the economically relevant call is typically followed by internal
/// transfer steps that move the actual token amounts.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationStep {
    /// Unique, monotonically increasing across the chain's transaction log
    pub id: i64,
    #[serde(default)]
    pub level: i64,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sender: Option<AccountRef>,
    #[serde(default)]
    pub initiator: Option<AccountRef>,
    #[serde(default)]
    pub target: Option<AccountRef>,
    /// Native asset amount moved by this step, in raw units
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub parameter: Option<StepParameter>,
    /// Post-execution storage snapshot of the target contract
    #[serde(default)]
    pub storage: Value,
}

impl OperationStep {
    /// Whether this step calls the given contract.
    pub fn targets(&self, address: &str) -> bool {
        self.target.as_ref().is_some_and(|t| t.address == address)
    }

    pub fn entrypoint(&self) -> Option<&str> {
        self.parameter.as_ref().map(|p| p.entrypoint.as_str())
    }

    /// Originating account: the initiator when the step was triggered by
    /// a contract call chain, the sender otherwise.
    pub fn originator(&self) -> Option<&str> {
        self.initiator
            .as_ref()
            .or(self.sender.as_ref())
            .map(|a| a.address.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_a_transaction_step() {
        let step: OperationStep = serde_json::from_value(json!({
            "id": 419561905,
            "level": 2525530,
            "hash": "op9eyCTctELCvbfr9ovUKu8rLGFRNvDjXnsKAT9ZXDTtdbmwkWa",
            "timestamp": "2022-06-01T13:45:10Z",
            "sender": { "address": "tz1abc" },
            "target": { "address": "KT1pool" },
            "amount": 0,
            "parameter": {
                "entrypoint": "Swap",
                "value": { "requiredTokenAddress": "KT1tok", "requiredTokenId": "0" }
            },
            "storage": { "token1_pool": "1000000", "token2_pool": "2000000" }
        }))
        .unwrap();

        assert!(step.targets("KT1pool"));
        assert_eq!(step.entrypoint(), Some("Swap"));
        assert_eq!(step.originator(), Some("tz1abc"));
        assert_eq!(step.timestamp.unwrap().timestamp(), 1654091110);
    }

    #[test]
    fn initiator_wins_over_sender() {
        let step: OperationStep = serde_json::from_value(json!({
            "id": 1,
            "sender": { "address": "KT1router" },
            "initiator": { "address": "tz1user" }
        }))
        .unwrap();

        assert_eq!(step.originator(), Some("tz1user"));
    }

    #[test]
    fn tolerates_non_transaction_items() {
        // Operation groups can contain reveal/other items with few fields
        let step: OperationStep = serde_json::from_value(json!({ "id": 7 })).unwrap();
        assert!(step.entrypoint().is_none());
        assert!(!step.targets("KT1pool"));
    }
}
