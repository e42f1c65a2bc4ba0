//! Token-gated page access.
//!
//! Decides whether a wallet may view a page whose configuration attaches
//! on-chain asset-ownership conditions, and releases the page content only
//! when it may.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐   ┌───────────────────┐   ┌─────────────┐
//! │ ConditionSpec │──▶│ ConditionExecutor │──▶│ ChainReader │ (per chain id)
//! │  (validated)  │   │  (bounded fan-out)│   │ alloy RPC   │
//! └───────────────┘   └───────────────────┘   └─────────────┘
//!         │                     │
//!         ▼                     ▼
//! ┌───────────────┐   ┌───────────────────┐   ┌──────────────────────┐
//! │EvaluationCache│◀──│  GroupEvaluator   │   │ ProtectedContentGate │
//! │ (TTL, 1/key)  │   │   (AND/OR fold)   │   │  verdict + payload   │
//! └───────────────┘   └───────────────────┘   └──────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use token_gate::gate::{
//!     AccessEngine, ChainReaderRegistry, ConditionExecutor, ConditionSpec, EvaluationCache,
//!     EvmRpcReader, FsPageStore, PageRef, ProtectedContentGate,
//! };
//!
//! let registry = ChainReaderRegistry::new().with_reader(
//!     137,
//!     Arc::new(EvmRpcReader::new(137, "https://polygon-rpc.com")?),
//! );
//! let executor = Arc::new(ConditionExecutor::new(Arc::new(registry)));
//! let engine = Arc::new(AccessEngine::new(executor, Arc::new(EvaluationCache::default())));
//! let gate = ProtectedContentGate::new(engine, Arc::new(FsPageStore::new("./content")));
//!
//! let spec = Arc::new(ConditionSpec::parse_json(page_config)?);
//! match gate.open(Some("0xabc..."), spec, &page).await? {
//!     GateDecision::Granted { payload, .. } => { /* render payload */ }
//!     GateDecision::PartiallyUnknown(denial) => { /* offer retry */ }
//!     GateDecision::Denied(denial) => { /* show requirements */ }
//!     GateDecision::NeedsWallet => { /* prompt wallet connect */ }
//! }
//! ```

pub mod amount;
pub mod cache;
pub mod condition;
pub mod content;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod reader;
pub mod rpc;
pub mod store;
pub mod types;
pub mod view;

// Re-export main types for convenience
pub use alloy_primitives::{Address, U256};
pub use cache::EvaluationCache;
pub use condition::ConditionSpec;
pub use content::{
    ConditionDetail, Denial, GateDecision, PageRef, PayloadSource, ProtectedContentGate,
    ProtectedPayload,
};
pub use engine::{AccessEngine, CheckResponse, EvaluationRequest};
pub use error::{GateError, PayloadError, ReadError, SpecError};
pub use evaluator::{GroupEvaluator, GroupTrace, TraceNode};
pub use executor::{ConditionExecutor, ExecutionReport};
pub use reader::{AssetQuery, ChainReader, ChainReaderRegistry};
pub use rpc::EvmRpcReader;
pub use store::FsPageStore;
pub use types::{
    AccessState, AssetType, Comparator, ConditionGroup, ConditionNode, ErrorKind,
    EvaluationKey, EvaluationResult, GatedCondition, Operator, Outcome,
};
pub use view::PageView;
