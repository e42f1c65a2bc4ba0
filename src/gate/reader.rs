//! Chain reader seam and per-network registry.

use crate::gate::error::ReadError;
use crate::gate::types::{AssetType, GatedCondition};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// What to read for one condition: the asset and the holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetQuery {
    pub chain_id: u64,
    pub account: Address,
    pub asset_type: AssetType,
    pub contract_address: Option<Address>,
    pub token_id: Option<U256>,
}

impl AssetQuery {
    pub fn new(account: Address, condition: &GatedCondition) -> Self {
        Self {
            chain_id: condition.chain_id,
            account,
            asset_type: condition.asset_type,
            contract_address: condition.contract_address,
            token_id: condition.token_id,
        }
    }
}

/// Reads asset balances from one network.
///
/// Implementations only read chain state. For an ERC721 query with a token
/// id, the balance is 1 if the account owns that token and 0 otherwise.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn balance_of(&self, query: &AssetQuery) -> Result<U256, ReadError>;
}

/// Chain id to reader mapping.
#[derive(Clone, Default)]
pub struct ChainReaderRegistry {
    readers: HashMap<u64, Arc<dyn ChainReader>>,
}

impl ChainReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `reader` for `chain_id`, replacing any earlier reader.
    ///
    /// # Arguments
    /// * `chain_id` - EIP-155 chain id the reader answers for
    /// * `reader` - Reader shared by every evaluation on that chain
    pub fn register(&mut self, chain_id: u64, reader: Arc<dyn ChainReader>) {
        self.readers.insert(chain_id, reader);
    }

    pub fn with_reader(mut self, chain_id: u64, reader: Arc<dyn ChainReader>) -> Self {
        self.register(chain_id, reader);
        self
    }

    /// Reader for `chain_id`, or `None` when the chain is unsupported.
    pub fn get(&self, chain_id: u64) -> Option<Arc<dyn ChainReader>> {
        self.readers.get(&chain_id).cloned()
    }

    pub fn chains(&self) -> Vec<u64> {
        let mut chains: Vec<u64> = self.readers.keys().copied().collect();
        chains.sort_unstable();
        chains
    }
}

impl std::fmt::Debug for ChainReaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainReaderRegistry")
            .field("chains", &self.chains())
            .finish()
    }
}
