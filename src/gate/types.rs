//! Types for gated-content evaluation.

use crate::gate::amount;
use crate::gate::evaluator::GroupTrace;
use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetType {
    Erc20,
    Erc721,
    Erc1155,
    Native,
}

impl AssetType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "ERC20" => Some(AssetType::Erc20),
            "ERC721" => Some(AssetType::Erc721),
            "ERC1155" => Some(AssetType::Erc1155),
            "NATIVE" => Some(AssetType::Native),
            _ => None,
        }
    }

    pub fn is_nft(&self) -> bool {
        matches!(self, AssetType::Erc721 | AssetType::Erc1155)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Comparator {
    Gte,
    Gt,
    Eq,
}

impl Comparator {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "GTE" => Some(Comparator::Gte),
            "GT" => Some(Comparator::Gt),
            "EQ" => Some(Comparator::Eq),
            _ => None,
        }
    }

    /// Whether `balance <op> required` holds.
    pub fn holds(&self, balance: &U256, required: &U256) -> bool {
        match self {
            Comparator::Gte => balance >= required,
            Comparator::Gt => balance > required,
            Comparator::Eq => balance == required,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    And,
    Or,
}

impl Operator {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "AND" => Some(Operator::And),
            "OR" => Some(Operator::Or),
            _ => None,
        }
    }

    /// Value of a group with no children.
    pub fn identity(&self) -> bool {
        match self {
            Operator::And => true,
            Operator::Or => false,
        }
    }
}

/// One validated asset-ownership predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatedCondition {
    pub chain_id: u64,
    pub asset_type: AssetType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Address>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "amount::serialize_opt"
    )]
    pub token_id: Option<U256>,
    pub comparator: Comparator,
    /// Threshold in base units (already scaled by `decimals`).
    #[serde(serialize_with = "amount::serialize")]
    pub amount: U256,
    pub decimals: u8,
}

/// A child of a group: either a leaf condition with its ordinal, or a nested group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionNode {
    Condition {
        ordinal: usize,
        condition: GatedCondition,
    },
    Group(ConditionGroup),
}

impl Serialize for ConditionNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ConditionNode::Condition { condition, .. } => condition.serialize(serializer),
            ConditionNode::Group(group) => group.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionGroup {
    pub operator: Operator,
    pub children: Vec<ConditionNode>,
}

impl ConditionGroup {
    /// Leaves in ordinal order.
    pub fn leaves(&self) -> Vec<(usize, &GatedCondition)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<(usize, &'a GatedCondition)>) {
        for child in &self.children {
            match child {
                ConditionNode::Condition { ordinal, condition } => out.push((*ordinal, condition)),
                ConditionNode::Group(group) => group.collect_leaves(out),
            }
        }
    }
}

/// Per-condition outcome. Serialized as `true`, `false` or `null` (unknown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Outcome {
    Met,
    NotMet,
    /// The read could not be completed; never counts as met.
    Unknown,
}

impl Outcome {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Outcome::Met
        } else {
            Outcome::NotMet
        }
    }

    /// Contribution to the boolean fold.
    pub fn is_met(&self) -> bool {
        matches!(self, Outcome::Met)
    }
}

impl From<Option<bool>> for Outcome {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(v) => Outcome::from_bool(v),
            None => Outcome::Unknown,
        }
    }
}

impl From<Outcome> for Option<bool> {
    fn from(value: Outcome) -> Self {
        match value {
            Outcome::Met => Some(true),
            Outcome::NotMet => Some(false),
            Outcome::Unknown => None,
        }
    }
}

/// Why a condition ended up unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    RpcFailure,
    UnsupportedChain,
}

/// Deterministic cache key for an (account, conditions) pair, hex SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EvaluationKey(String);

impl EvaluationKey {
    pub fn new(account: &Address, canonical_conditions: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(account.as_slice());
        hasher.update([0u8]);
        hasher.update(canonical_conditions);
        EvaluationKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EvaluationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..16])
    }
}

/// Page view state as seen by a visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessState {
    Unauthenticated,
    Evaluating,
    Granted,
    Denied,
    /// Not granted, and at least one condition could not be checked.
    PartiallyUnknown,
}

/// Full outcome of evaluating one account against one page's conditions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub final_result: bool,
    pub per_condition_result: BTreeMap<usize, Outcome>,
    #[serde(serialize_with = "amount::serialize_map")]
    pub balances: BTreeMap<usize, U256>,
    pub errors: BTreeMap<usize, ErrorKind>,
    pub trail: GroupTrace,
    pub computed_at: DateTime<Utc>,
}

impl EvaluationResult {
    pub fn access_state(&self) -> AccessState {
        if self.final_result {
            AccessState::Granted
        } else if self.errors.is_empty() {
            AccessState::Denied
        } else {
            AccessState::PartiallyUnknown
        }
    }

    /// Same verdict and diagnostics, ignoring when it was computed.
    pub fn same_content(&self, other: &EvaluationResult) -> bool {
        self.final_result == other.final_result
            && self.per_condition_result == other.per_condition_result
            && self.balances == other.balances
            && self.errors == other.errors
            && self.trail == other.trail
    }
}
