//! Parsing and validation of page gating rules.
//!
//! Page definitions carry their gating rule as loosely-shaped JSON. A node with
//! an `operator` is a group, a node with an `assetType` is a condition. Every
//! node is validated into the strongly-typed tree up front, so a misconfigured
//! page is rejected before any chain is queried. Conditions are numbered in
//! depth-first order; that ordinal keys every diagnostic map.
//!
//! ERC1155 conditions must name a `tokenId`. The standard interface only
//! answers `balanceOf(account, id)`, so "any token in the collection" cannot
//! be read without an indexer.

use crate::gate::error::SpecError;
use crate::gate::types::{
    AssetType, Comparator, ConditionGroup, ConditionNode, EvaluationKey, GatedCondition, Operator,
};
use alloy_primitives::{Address, U256};
use serde::Deserialize;
use serde_json::Value;

/// Maximum group nesting accepted from page configuration.
pub const MAX_DEPTH: usize = 16;

/// Maximum number of leaf conditions per page.
pub const MAX_CONDITIONS: usize = 64;

/// Largest `decimals` for which a 256-bit amount still has an integer part.
const MAX_DECIMALS: u8 = 77;

/// A validated, immutable gating rule for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionSpec {
    root: ConditionGroup,
    leaf_count: usize,
}

impl ConditionSpec {
    /// Parse and validate a gating rule from its JSON text.
    ///
    /// # Arguments
    /// * `input` - JSON document holding a group or a single condition
    ///
    /// # Returns
    /// The validated tree, or the first `SpecError` found
    pub fn parse_json(input: &str) -> Result<Self, SpecError> {
        let value: Value =
            serde_json::from_str(input).map_err(|e| SpecError::Json(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Validate an already-decoded JSON value. A bare condition is wrapped
    /// in a single-child AND group.
    pub fn from_value(value: &Value) -> Result<Self, SpecError> {
        let mut parser = Parser { next_ordinal: 0 };
        let root = match parser.node(value, "$", 0)? {
            ConditionNode::Group(group) => group,
            // A bare condition is a single-child AND group.
            leaf @ ConditionNode::Condition { .. } => ConditionGroup {
                operator: Operator::And,
                children: vec![leaf],
            },
        };
        Ok(ConditionSpec {
            root,
            leaf_count: parser.next_ordinal,
        })
    }

    pub fn root(&self) -> &ConditionGroup {
        &self.root
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Leaves in ordinal order, cloned for dispatch to the executor.
    pub fn leaves(&self) -> Vec<(usize, GatedCondition)> {
        self.root
            .leaves()
            .into_iter()
            .map(|(ordinal, condition)| (ordinal, condition.clone()))
            .collect()
    }

    /// Stable serialization of the validated tree.
    ///
    /// Struct field order is fixed and every address and amount is normalized,
    /// so two configurations that mean the same thing serialize identically.
    pub fn canonical_json(&self) -> Vec<u8> {
        // Only plain structs, enums and string-valued fields are serialized.
        serde_json::to_vec(&self.root).expect("condition tree always serializes to JSON")
    }

    pub fn cache_key(&self, account: &Address) -> EvaluationKey {
        EvaluationKey::new(account, &self.canonical_json())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawGroup {
    operator: String,
    #[serde(default)]
    children: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Text(String),
    Integer(u64),
}

impl RawNumber {
    fn text(&self) -> String {
        match self {
            RawNumber::Text(s) => s.clone(),
            RawNumber::Integer(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawCondition {
    chain_id: u64,
    asset_type: String,
    contract_address: Option<String>,
    token_id: Option<RawNumber>,
    comparator: Option<String>,
    amount: Option<RawNumber>,
    decimals: Option<i64>,
}

struct Parser {
    next_ordinal: usize,
}

impl Parser {
    fn node(&mut self, value: &Value, path: &str, depth: usize) -> Result<ConditionNode, SpecError> {
        let object = value
            .as_object()
            .ok_or_else(|| SpecError::UnrecognizedNode {
                path: path.to_string(),
            })?;

        if object.contains_key("operator") {
            if depth >= MAX_DEPTH {
                return Err(SpecError::TooDeep { max: MAX_DEPTH });
            }
            let raw: RawGroup = serde_json::from_value(value.clone()).map_err(|e| {
                SpecError::Malformed {
                    path: path.to_string(),
                    reason: e.to_string(),
                }
            })?;
            self.group(raw, path, depth).map(ConditionNode::Group)
        } else if object.contains_key("assetType") {
            let raw: RawCondition = serde_json::from_value(value.clone()).map_err(|e| {
                SpecError::Malformed {
                    path: path.to_string(),
                    reason: e.to_string(),
                }
            })?;
            let condition = condition(raw, path)?;
            if self.next_ordinal >= MAX_CONDITIONS {
                return Err(SpecError::TooManyConditions {
                    max: MAX_CONDITIONS,
                });
            }
            let ordinal = self.next_ordinal;
            self.next_ordinal += 1;
            Ok(ConditionNode::Condition { ordinal, condition })
        } else {
            Err(SpecError::UnrecognizedNode {
                path: path.to_string(),
            })
        }
    }

    fn group(&mut self, raw: RawGroup, path: &str, depth: usize) -> Result<ConditionGroup, SpecError> {
        let operator =
            Operator::from_name(&raw.operator).ok_or_else(|| SpecError::UnsupportedOperator {
                path: path.to_string(),
                value: raw.operator.clone(),
            })?;

        let mut children = Vec::with_capacity(raw.children.len());
        for (i, child) in raw.children.iter().enumerate() {
            let child_path = format!("{}.children[{}]", path, i);
            children.push(self.node(child, &child_path, depth + 1)?);
        }

        Ok(ConditionGroup { operator, children })
    }
}

fn condition(raw: RawCondition, path: &str) -> Result<GatedCondition, SpecError> {
    let asset_type =
        AssetType::from_name(&raw.asset_type).ok_or_else(|| SpecError::UnsupportedAssetType {
            path: path.to_string(),
            value: raw.asset_type.clone(),
        })?;

    let contract_address = match (asset_type, raw.contract_address.as_deref()) {
        (AssetType::Native, Some(_)) => {
            return Err(SpecError::UnexpectedField {
                path: path.to_string(),
                field: "contractAddress",
            })
        }
        (AssetType::Native, None) => None,
        (_, None) => {
            return Err(SpecError::MissingField {
                path: path.to_string(),
                field: "contractAddress",
            })
        }
        (_, Some(address)) => Some(parse_address(address).ok_or_else(|| {
            SpecError::InvalidAddress {
                path: path.to_string(),
                value: address.to_string(),
            }
        })?),
    };

    let token_id = match (asset_type, raw.token_id.as_ref()) {
        (AssetType::Erc20 | AssetType::Native, Some(_)) => {
            return Err(SpecError::UnexpectedField {
                path: path.to_string(),
                field: "tokenId",
            })
        }
        (AssetType::Erc1155, None) => {
            return Err(SpecError::MissingField {
                path: path.to_string(),
                field: "tokenId",
            })
        }
        (_, None) => None,
        (_, Some(id)) => Some(number(&id.text(), path, "tokenId")?),
    };

    let comparator = match raw.comparator.as_deref() {
        None => Comparator::Gte,
        Some(name) => Comparator::from_name(name).ok_or_else(|| SpecError::UnsupportedComparator {
            path: path.to_string(),
            value: name.to_string(),
        })?,
    };

    let amount = match (asset_type, raw.amount.as_ref()) {
        (_, Some(amount)) => number(&amount.text(), path, "amount")?,
        (AssetType::Erc721 | AssetType::Erc1155, None) => U256::from(1u64),
        (_, None) => {
            return Err(SpecError::MissingField {
                path: path.to_string(),
                field: "amount",
            })
        }
    };

    let decimals = match (asset_type, raw.decimals) {
        (AssetType::Erc721 | AssetType::Erc1155, None | Some(0)) => 0,
        (AssetType::Erc721 | AssetType::Erc1155, Some(_)) => {
            return Err(SpecError::InvalidDecimals {
                path: path.to_string(),
                reason: "NFT conditions must use 0 decimals".to_string(),
            })
        }
        (AssetType::Native, None) => 18,
        (AssetType::Erc20, None) => {
            return Err(SpecError::MissingField {
                path: path.to_string(),
                field: "decimals",
            })
        }
        (_, Some(d)) => u8::try_from(d)
            .ok()
            .filter(|d| *d <= MAX_DECIMALS)
            .ok_or_else(|| SpecError::InvalidDecimals {
                path: path.to_string(),
                reason: format!("{} is outside 0..={}", d, MAX_DECIMALS),
            })?,
    };

    Ok(GatedCondition {
        chain_id: raw.chain_id,
        asset_type,
        contract_address,
        token_id,
        comparator,
        amount,
        decimals,
    })
}

/// `0x`-prefixed 20-byte hex address, any letter case.
pub(crate) fn parse_address(input: &str) -> Option<Address> {
    let trimmed = input.trim();
    if !trimmed.starts_with("0x") && !trimmed.starts_with("0X") {
        return None;
    }
    trimmed.parse().ok()
}

/// Decimal or `0x` hex integer that fits in 256 bits.
fn number(text: &str, path: &str, field: &'static str) -> Result<U256, SpecError> {
    let trimmed = text.trim();
    if trimmed.starts_with('-') {
        return Err(SpecError::NegativeAmount {
            path: path.to_string(),
            value: text.to_string(),
        });
    }
    trimmed.parse::<U256>().map_err(|_| SpecError::InvalidNumber {
        path: path.to_string(),
        field,
        value: text.to_string(),
    })
}
