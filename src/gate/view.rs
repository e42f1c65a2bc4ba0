//! Per-page-view access state.
//!
//! An evaluation started for one account keeps running when the visitor
//! switches wallets, since other callers may share it through the cache. Its
//! result is applied only if it still matches the key the view is waiting for.

use crate::gate::types::{AccessState, EvaluationKey, EvaluationResult};
use log::debug;

#[derive(Debug, Clone)]
pub struct PageView {
    state: AccessState,
    pending: Option<EvaluationKey>,
}

impl Default for PageView {
    fn default() -> Self {
        Self::new()
    }
}

impl PageView {
    pub fn new() -> Self {
        Self {
            state: AccessState::Unauthenticated,
            pending: None,
        }
    }

    pub fn state(&self) -> AccessState {
        self.state
    }

    pub fn current_key(&self) -> Option<&EvaluationKey> {
        self.pending.as_ref()
    }

    /// Wallet connected, account changed, or retry requested.
    pub fn begin(&mut self, key: EvaluationKey) {
        self.state = AccessState::Evaluating;
        self.pending = Some(key);
    }

    /// Wallet disconnected.
    pub fn disconnect(&mut self) {
        self.state = AccessState::Unauthenticated;
        self.pending = None;
    }

    /// Apply a finished evaluation. Returns false, leaving the view unchanged,
    /// if `key` is not the one this view is waiting for.
    pub fn apply(&mut self, key: &EvaluationKey, result: &EvaluationResult) -> bool {
        if self.state != AccessState::Evaluating || self.pending.as_ref() != Some(key) {
            debug!("discarding stale result for {}", key);
            return false;
        }
        self.state = result.access_state();
        true
    }
}
