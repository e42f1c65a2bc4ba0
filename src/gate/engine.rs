//! Verdict computation: executor, fold and cache wired together.
//!
//! The engine never touches protected content; it only answers whether an
//! account satisfies a page's conditions and why.

use crate::gate::cache::EvaluationCache;
use crate::gate::condition::ConditionSpec;
use crate::gate::error::GateError;
use crate::gate::evaluator::GroupEvaluator;
use crate::gate::executor::ConditionExecutor;
use crate::gate::condition::parse_address;
use crate::gate::types::{EvaluationKey, EvaluationResult, Outcome};
use alloy_primitives::Address;
use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable (account, conditions) pair.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub account: Address,
    pub spec: Arc<ConditionSpec>,
}

impl EvaluationRequest {
    pub fn new(account: Address, spec: Arc<ConditionSpec>) -> Self {
        Self { account, spec }
    }

    pub fn key(&self) -> EvaluationKey {
        self.spec.cache_key(&self.account)
    }
}

/// Response of `CheckGatedConditions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub result: bool,
    pub partial_results: BTreeMap<usize, Outcome>,
    pub balances: BTreeMap<usize, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CheckResponse {
    pub fn from_result(result: &EvaluationResult) -> Self {
        Self {
            result: result.final_result,
            partial_results: result.per_condition_result.clone(),
            balances: result
                .balances
                .iter()
                .map(|(ordinal, balance)| (*ordinal, balance.to_string()))
                .collect(),
            error_message: describe_errors(result),
        }
    }

    pub fn wallet_required() -> Self {
        Self {
            result: false,
            partial_results: BTreeMap::new(),
            balances: BTreeMap::new(),
            error_message: Some("Connect a wallet to check access".to_string()),
        }
    }
}

fn describe_errors(result: &EvaluationResult) -> Option<String> {
    if result.errors.is_empty() {
        return None;
    }
    let failed: Vec<String> = result
        .errors
        .iter()
        .map(|(ordinal, kind)| format!("{} ({:?})", ordinal, kind))
        .collect();
    Some(format!(
        "Could not verify condition(s) {}; retry later",
        failed.join(", ")
    ))
}

pub struct AccessEngine {
    executor: Arc<ConditionExecutor>,
    cache: Arc<EvaluationCache>,
}

impl AccessEngine {
    /// Wire an executor and a cache together.
    ///
    /// # Arguments
    /// * `executor` - Reads leaf conditions from their chains
    /// * `cache` - Holds recent verdicts, shared across requests
    pub fn new(executor: Arc<ConditionExecutor>, cache: Arc<EvaluationCache>) -> Self {
        Self { executor, cache }
    }

    /// Read every leaf, then fold. Bypasses the cache.
    pub async fn compute(&self, request: &EvaluationRequest) -> EvaluationResult {
        let report = self
            .executor
            .execute(&request.account, request.spec.leaves())
            .await;
        let trail = GroupEvaluator::evaluate(request.spec.root(), &report.per_condition_result);

        info!(
            "verdict for {:#}: {} ({} conditions, {} unknown)",
            request.account,
            trail.result,
            request.spec.leaf_count(),
            report.errors.len()
        );

        EvaluationResult {
            final_result: trail.result,
            per_condition_result: report.per_condition_result,
            balances: report.balances,
            errors: report.errors,
            trail,
            computed_at: Utc::now(),
        }
    }

    /// Cached evaluation; concurrent calls for the same request share one computation.
    pub async fn evaluate(&self, request: &EvaluationRequest) -> Arc<EvaluationResult> {
        let key = request.key();
        self.cache.evaluate(&key, self.compute(request)).await
    }

    pub async fn invalidate(&self, request: &EvaluationRequest) {
        self.cache.invalidate(&request.key()).await;
    }

    /// Evaluate with fresh reads and replace whatever is cached for the request.
    ///
    /// Never joins a computation already in flight, since that one may have
    /// started before the failure the caller is retrying.
    pub async fn retry(&self, request: &EvaluationRequest) -> Arc<EvaluationResult> {
        let result = self.compute(request).await;
        self.cache.replace(&request.key(), result).await
    }

    /// `CheckGatedConditions`: verdict and diagnostics only, never content.
    pub async fn check_conditions(
        &self,
        account: Option<&str>,
        spec: Arc<ConditionSpec>,
    ) -> Result<CheckResponse, GateError> {
        let Some(account) = account else {
            return Ok(CheckResponse::wallet_required());
        };
        let account = parse_account(account)?;
        let result = self.evaluate(&EvaluationRequest::new(account, spec)).await;
        Ok(CheckResponse::from_result(&result))
    }
}

/// Validate a wallet address supplied by a visitor.
pub fn parse_account(account: &str) -> Result<Address, GateError> {
    parse_address(account).ok_or_else(|| GateError::InvalidAccount(account.to_string()))
}
