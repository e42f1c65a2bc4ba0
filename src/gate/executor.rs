//! Concurrent execution of leaf conditions.

use crate::gate::error::ReadError;
use crate::gate::reader::{AssetQuery, ChainReader, ChainReaderRegistry};
use crate::gate::types::{ErrorKind, GatedCondition, Outcome};
use alloy_primitives::{Address, U256};
use futures_util::stream::{self, StreamExt};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// In-flight reads per evaluation, to stay under provider rate limits.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 8;

/// Per-read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-ordinal outcomes of one batch of reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    pub per_condition_result: BTreeMap<usize, Outcome>,
    pub balances: BTreeMap<usize, U256>,
    pub errors: BTreeMap<usize, ErrorKind>,
}

struct LeafFailure {
    kind: ErrorKind,
    reason: String,
}

impl From<ReadError> for LeafFailure {
    fn from(e: ReadError) -> Self {
        let kind = match e {
            ReadError::UnsupportedChain { .. } => ErrorKind::UnsupportedChain,
            _ => ErrorKind::RpcFailure,
        };
        LeafFailure {
            kind,
            reason: e.to_string(),
        }
    }
}

/// Fans leaf conditions out to their chain readers.
///
/// Every read runs as its own task with its own timeout. A failed read only
/// affects its own ordinal; the batch as a whole never fails.
pub struct ConditionExecutor {
    registry: Arc<ChainReaderRegistry>,
    concurrency_limit: usize,
    read_timeout: Duration,
}

impl ConditionExecutor {
    pub fn new(registry: Arc<ChainReaderRegistry>) -> Self {
        Self {
            registry,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ChainReaderRegistry {
        &self.registry
    }

    pub async fn execute(
        &self,
        account: &Address,
        leaves: Vec<(usize, GatedCondition)>,
    ) -> ExecutionReport {
        let timeout = self.read_timeout;

        // buffer_unordered polls at most `concurrency_limit` of these futures at
        // once, and each spawns its read only when first polled.
        let reads = leaves.into_iter().map(|(ordinal, condition)| {
            let reader = self.registry.get(condition.chain_id);
            let query = AssetQuery::new(*account, &condition);
            async move {
                let task = tokio::spawn(read_leaf(reader, query, timeout));
                let read = match task.await {
                    Ok(read) => read,
                    Err(e) => Err(LeafFailure {
                        kind: ErrorKind::RpcFailure,
                        reason: format!("read task failed: {}", e),
                    }),
                };
                (ordinal, condition, read)
            }
        });

        let results: Vec<_> = stream::iter(reads)
            .buffer_unordered(self.concurrency_limit)
            .collect()
            .await;

        let mut report = ExecutionReport::default();
        for (ordinal, condition, read) in results {
            match read {
                Ok(balance) => {
                    let met = condition.comparator.holds(&balance, &condition.amount);
                    debug!(
                        "condition {} on chain {}: balance {} {:?} {} -> {}",
                        ordinal, condition.chain_id, balance, condition.comparator, condition.amount, met
                    );
                    report
                        .per_condition_result
                        .insert(ordinal, Outcome::from_bool(met));
                    report.balances.insert(ordinal, balance);
                }
                Err(failure) => {
                    warn!(
                        "condition {} on chain {} for {:#} could not be read: {}",
                        ordinal,
                        condition.chain_id,
                        account,
                        failure.reason
                    );
                    report.per_condition_result.insert(ordinal, Outcome::Unknown);
                    report.errors.insert(ordinal, failure.kind);
                }
            }
        }
        report
    }
}

async fn read_leaf(
    reader: Option<Arc<dyn ChainReader>>,
    query: AssetQuery,
    timeout: Duration,
) -> Result<U256, LeafFailure> {
    let reader = reader.ok_or(ReadError::UnsupportedChain {
        chain_id: query.chain_id,
    })?;

    match tokio::time::timeout(timeout, reader.balance_of(&query)).await {
        Ok(read) => Ok(read?),
        Err(_) => Err(ReadError::Timeout {
            after_ms: timeout.as_millis() as u64,
        }
        .into()),
    }
}
