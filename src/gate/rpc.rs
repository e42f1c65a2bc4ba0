//! Chain reader for EVM networks, built on an alloy HTTP provider.
//!
//! Native balances use `eth_getBalance`; token balances call the standard
//! ERC20/ERC721/ERC1155 view functions at the latest block.

use crate::gate::error::ReadError;
use crate::gate::reader::{AssetQuery, ChainReader};
use crate::gate::types::AssetType;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::sol;
use alloy::transports::http::reqwest::Url;
use alloy::transports::{RpcError, TransportError};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use log::debug;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
    }

    #[sol(rpc)]
    interface IERC721 {
        function balanceOf(address owner) external view returns (uint256);
        function ownerOf(uint256 tokenId) external view returns (address);
    }

    #[sol(rpc)]
    interface IERC1155 {
        function balanceOf(address account, uint256 id) external view returns (uint256);
    }
}

pub struct EvmRpcReader {
    chain_id: u64,
    rpc_url: String,
    provider: DynProvider,
}

impl EvmRpcReader {
    /// Create a reader for one network.
    ///
    /// # Arguments
    /// * `chain_id` - Chain id the endpoint serves
    /// * `rpc_url` - HTTP(S) JSON-RPC endpoint
    ///
    /// # Returns
    /// The reader, or `ReadError::Transport` if the URL does not parse
    pub fn new(chain_id: u64, rpc_url: &str) -> Result<Self, ReadError> {
        let url = Url::parse(rpc_url).map_err(|e| ReadError::Transport {
            url: rpc_url.to_string(),
            reason: format!("invalid endpoint url: {}", e),
        })?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self {
            chain_id,
            rpc_url: rpc_url.to_string(),
            provider,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn native_balance(&self, account: Address) -> Result<U256, ReadError> {
        self.provider
            .get_balance(account)
            .await
            .map_err(|e| self.transport_error(e))
    }

    /// 1 if `account` owns `token_id`, else 0.
    async fn owns_token(
        &self,
        contract: Address,
        account: Address,
        token_id: U256,
    ) -> Result<U256, ReadError> {
        let nft = IERC721::new(contract, self.provider.clone());
        match nft.ownerOf(token_id).call().await {
            Ok(owner) if owner == account => Ok(U256::from(1u64)),
            Ok(_) => Ok(U256::ZERO),
            Err(e) => match self.contract_error(e) {
                // Nonexistent or burned tokens revert; nobody owns them.
                e if e.is_revert() => Ok(U256::ZERO),
                e => Err(e),
            },
        }
    }

    fn transport_error(&self, err: TransportError) -> ReadError {
        match err {
            RpcError::ErrorResp(payload) => ReadError::Rpc {
                code: payload.code,
                message: payload.message.to_string(),
            },
            other => ReadError::Transport {
                url: self.rpc_url.clone(),
                reason: other.to_string(),
            },
        }
    }

    fn contract_error(&self, err: alloy::contract::Error) -> ReadError {
        match err {
            alloy::contract::Error::TransportError(e) => self.transport_error(e),
            // Empty return data usually means no contract at that address.
            other => ReadError::Decode(other.to_string()),
        }
    }
}

#[async_trait]
impl ChainReader for EvmRpcReader {
    async fn balance_of(&self, query: &AssetQuery) -> Result<U256, ReadError> {
        debug!(
            "chain {} {:?} read for {:#}",
            self.chain_id, query.asset_type, query.account
        );

        let contract = match (query.asset_type, query.contract_address) {
            (AssetType::Native, _) => return self.native_balance(query.account).await,
            (_, Some(contract)) => contract,
            (_, None) => {
                return Err(ReadError::Decode(
                    "token query without contract address".to_string(),
                ))
            }
        };

        match (query.asset_type, query.token_id) {
            (AssetType::Erc721, Some(token_id)) => {
                self.owns_token(contract, query.account, token_id).await
            }
            (AssetType::Erc721, None) => IERC721::new(contract, self.provider.clone())
                .balanceOf(query.account)
                .call()
                .await
                .map_err(|e| self.contract_error(e)),
            (AssetType::Erc1155, Some(token_id)) => IERC1155::new(contract, self.provider.clone())
                .balanceOf(query.account, token_id)
                .call()
                .await
                .map_err(|e| self.contract_error(e)),
            (AssetType::Erc1155, None) => Err(ReadError::Decode(
                "ERC1155 query without token id".to_string(),
            )),
            _ => IERC20::new(contract, self.provider.clone())
                .balanceOf(query.account)
                .call()
                .await
                .map_err(|e| self.contract_error(e)),
        }
    }
}

impl std::fmt::Debug for EvmRpcReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmRpcReader")
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.rpc_url)
            .finish()
    }
}
