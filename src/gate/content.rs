//! Release of protected page content.
//!
//! `ProtectedContentGate` is the only holder of both a visitor's verdict and
//! the payload accessor. The payload is fetched after a `true` verdict and at
//! no other time.

use crate::gate::amount::{self, format_units};
use crate::gate::condition::ConditionSpec;
use crate::gate::engine::{parse_account, AccessEngine, EvaluationRequest};
use crate::gate::error::{GateError, PayloadError};
use crate::gate::types::{AccessState, Comparator, ErrorKind, EvaluationResult, Outcome};
use alloy_primitives::U256;
use async_trait::async_trait;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Location of a protected page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRef {
    pub site: String,
    pub page: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl std::fmt::Display for PageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.slug {
            Some(slug) => write!(f, "{}/{}/{}", self.site, self.page, slug),
            None => write!(f, "{}/{}", self.site, self.page),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtectedPayload {
    pub page: PageRef,
    pub body: serde_json::Value,
}

/// `FetchProtectedPayload`. Only `ProtectedContentGate` calls this.
#[async_trait]
pub trait PayloadSource: Send + Sync {
    async fn fetch_protected_payload(&self, page: &PageRef) -> Result<ProtectedPayload, PayloadError>;
}

/// Human-readable line for one condition: owns X of required Y.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionDetail {
    pub ordinal: usize,
    pub chain_id: u64,
    pub outcome: Outcome,
    pub comparator: Comparator,
    pub required: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owned: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

/// Why access was not granted; safe to show to the visitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Denial {
    pub per_condition_result: BTreeMap<usize, Outcome>,
    #[serde(serialize_with = "amount::serialize_map")]
    pub balances: BTreeMap<usize, U256>,
    pub errors: BTreeMap<usize, ErrorKind>,
    pub details: Vec<ConditionDetail>,
}

impl Denial {
    pub fn new(spec: &ConditionSpec, result: &EvaluationResult) -> Self {
        let details = spec
            .root()
            .leaves()
            .into_iter()
            .map(|(ordinal, condition)| ConditionDetail {
                ordinal,
                chain_id: condition.chain_id,
                outcome: result
                    .per_condition_result
                    .get(&ordinal)
                    .copied()
                    .unwrap_or(Outcome::Unknown),
                comparator: condition.comparator,
                required: format_units(condition.amount, condition.decimals),
                owned: result
                    .balances
                    .get(&ordinal)
                    .map(|b| format_units(*b, condition.decimals)),
                error: result.errors.get(&ordinal).copied(),
            })
            .collect();

        Self {
            per_condition_result: result.per_condition_result.clone(),
            balances: result.balances.clone(),
            errors: result.errors.clone(),
            details,
        }
    }
}

#[derive(Debug, Clone)]
pub enum GateDecision {
    /// No wallet connected; nothing was evaluated or fetched.
    NeedsWallet,
    Granted {
        payload: ProtectedPayload,
        result: Arc<EvaluationResult>,
    },
    Denied(Denial),
    /// Not granted and some conditions could not be checked; retry may help.
    PartiallyUnknown(Denial),
}

impl GateDecision {
    pub fn state(&self) -> AccessState {
        match self {
            GateDecision::NeedsWallet => AccessState::Unauthenticated,
            GateDecision::Granted { .. } => AccessState::Granted,
            GateDecision::Denied(_) => AccessState::Denied,
            GateDecision::PartiallyUnknown(_) => AccessState::PartiallyUnknown,
        }
    }
}

pub struct ProtectedContentGate {
    engine: Arc<AccessEngine>,
    payloads: Arc<dyn PayloadSource>,
}

impl ProtectedContentGate {
    /// # Arguments
    /// * `engine` - Source of verdicts
    /// * `payloads` - The only accessor for protected page bodies
    pub fn new(engine: Arc<AccessEngine>, payloads: Arc<dyn PayloadSource>) -> Self {
        Self { engine, payloads }
    }

    pub fn engine(&self) -> &Arc<AccessEngine> {
        &self.engine
    }

    /// Evaluate `account` against `spec` and release `page` only on a `true` verdict.
    pub async fn open(
        &self,
        account: Option<&str>,
        spec: Arc<ConditionSpec>,
        page: &PageRef,
    ) -> Result<GateDecision, GateError> {
        let Some(request) = Self::request(account, spec)? else {
            return Ok(GateDecision::NeedsWallet);
        };
        let result = self.engine.evaluate(&request).await;
        self.decide(&request, result, page).await
    }

    /// Like [`open`](Self::open), but re-reads every chain and replaces any
    /// cached verdict.
    pub async fn retry(
        &self,
        account: Option<&str>,
        spec: Arc<ConditionSpec>,
        page: &PageRef,
    ) -> Result<GateDecision, GateError> {
        let Some(request) = Self::request(account, spec)? else {
            return Ok(GateDecision::NeedsWallet);
        };
        let result = self.engine.retry(&request).await;
        self.decide(&request, result, page).await
    }

    fn request(
        account: Option<&str>,
        spec: Arc<ConditionSpec>,
    ) -> Result<Option<EvaluationRequest>, GateError> {
        match account {
            None => Ok(None),
            Some(account) => Ok(Some(EvaluationRequest::new(parse_account(account)?, spec))),
        }
    }

    async fn decide(
        &self,
        request: &EvaluationRequest,
        result: Arc<EvaluationResult>,
        page: &PageRef,
    ) -> Result<GateDecision, GateError> {
        match result.access_state() {
            AccessState::Granted => {
                let payload = self.payloads.fetch_protected_payload(page).await.map_err(|e| {
                    error!("failed to load protected payload for {}: {}", page, e);
                    e
                })?;
                info!("released {} to {:#}", page, request.account);
                Ok(GateDecision::Granted { payload, result })
            }
            AccessState::PartiallyUnknown => {
                warn!(
                    "could not fully verify {} for {:#}: {} condition(s) unknown",
                    page,
                    request.account,
                    result.errors.len()
                );
                Ok(GateDecision::PartiallyUnknown(Denial::new(&request.spec, &result)))
            }
            _ => {
                info!("denied {} to {:#}", page, request.account);
                Ok(GateDecision::Denied(Denial::new(&request.spec, &result)))
            }
        }
    }
}
