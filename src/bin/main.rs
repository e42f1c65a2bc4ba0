use std::sync::Arc;

use log::{info, warn};
use tokio::net::TcpListener;
use token_gate::config::GateSettings;
use token_gate::gate::{
    AccessEngine, ChainReaderRegistry, ConditionExecutor, EvaluationCache, EvmRpcReader,
    FsPageStore, ProtectedContentGate,
};
use token_gate::modules::http_gate::{router, GateApiState};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let settings = GateSettings::from_env()?;

    // One reader per configured chain
    let mut registry = ChainReaderRegistry::new();
    for (chain_id, url) in &settings.chain_rpc_urls {
        info!("Registering chain {} at {}", chain_id, url);
        registry.register(*chain_id, Arc::new(EvmRpcReader::new(*chain_id, url)?));
    }
    if settings.chain_rpc_urls.is_empty() {
        warn!("GATE_CHAIN_RPC_URLS is empty; every condition will evaluate as unknown");
    }

    let executor = Arc::new(
        ConditionExecutor::new(Arc::new(registry))
            .with_concurrency_limit(settings.concurrency_limit)
            .with_read_timeout(settings.rpc_timeout),
    );
    let cache = Arc::new(EvaluationCache::new(
        settings.cache_ttl,
        settings.cache_max_entries,
    ));
    let engine = Arc::new(AccessEngine::new(executor, cache));
    let pages = Arc::new(FsPageStore::new(settings.content_dir.clone()));
    let gate = Arc::new(ProtectedContentGate::new(engine, pages.clone()));

    let app = router(Arc::new(GateApiState { gate, pages }));

    // Bind the server
    let listener = TcpListener::bind(format!("0.0.0.0:{}", settings.port)).await?;
    info!("Listening on: 0.0.0.0:{}", settings.port);
    axum::serve(listener, app).await?;

    Ok(())
}
