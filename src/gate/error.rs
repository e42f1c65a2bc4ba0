//! Error types for gated-content evaluation.

use thiserror::Error;

/// A page's condition tree failed validation.
///
/// This is the only error class that aborts an evaluation, and it is raised
/// before any chain read is issued. `path` points into the submitted JSON
/// (e.g. `$.children[1].amount`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("Malformed condition JSON: {0}")]
    Json(String),

    #[error("Unrecognized node at {path}: expected a group (operator) or a condition (assetType)")]
    UnrecognizedNode { path: String },

    #[error("Unsupported asset type at {path}: {value}")]
    UnsupportedAssetType { path: String, value: String },

    #[error("Unsupported operator at {path}: {value}")]
    UnsupportedOperator { path: String, value: String },

    #[error("Unsupported comparator at {path}: {value}")]
    UnsupportedComparator { path: String, value: String },

    #[error("Missing field {field} at {path}")]
    MissingField { path: String, field: &'static str },

    #[error("Field {field} is not allowed for this asset type at {path}")]
    UnexpectedField { path: String, field: &'static str },

    #[error("Negative amount at {path}: {value}")]
    NegativeAmount { path: String, value: String },

    #[error("Invalid {field} at {path}: {value}")]
    InvalidNumber {
        path: String,
        field: &'static str,
        value: String,
    },

    #[error("Invalid address at {path}: {value}")]
    InvalidAddress { path: String, value: String },

    #[error("Invalid decimals at {path}: {reason}")]
    InvalidDecimals { path: String, reason: String },

    #[error("Invalid node at {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Condition tree nesting exceeds {max} levels")]
    TooDeep { max: usize },

    #[error("Condition tree has more than {max} conditions")]
    TooManyConditions { max: usize },
}

/// Failure of a single chain read.
///
/// Never aborts an evaluation: the executor records it against the
/// condition's ordinal and the condition becomes unknown.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Read timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("Failed to reach chain RPC at {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Failed to decode RPC response: {0}")]
    Decode(String),

    #[error("No reader registered for chain {chain_id}")]
    UnsupportedChain { chain_id: u64 },
}

impl ReadError {
    /// True when the node reports the call itself reverted.
    pub fn is_revert(&self) -> bool {
        match self {
            ReadError::Rpc { code, message } => *code == 3 || message.contains("revert"),
            _ => false,
        }
    }
}

/// Errors from the protected payload store.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Page not found: {0}")]
    NotFound(String),

    #[error("Invalid page path segment: {0:?}")]
    InvalidPath(String),

    #[error("Failed to read page data: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse page data: {0}")]
    Parse(String),

    #[error("Page conditions are invalid: {0}")]
    Spec(#[from] SpecError),
}

/// Errors surfaced to callers of the gate.
///
/// None of these are an access denial: a denial is a successful evaluation
/// whose verdict is false.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Invalid account address: {0}")]
    InvalidAccount(String),

    #[error("Invalid condition spec: {0}")]
    InvalidConditionSpec(#[from] SpecError),

    #[error("Protected payload unavailable: {0}")]
    Payload(#[from] PayloadError),
}
