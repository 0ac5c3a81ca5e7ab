// Copyright 2025 ReductSoftware UG
// Licensed under the Business Source License 1.1

use crate::cfg::CfgParser;
use crate::core::env::GetEnv;
use crate::provider::{EvictionObserver, ProvidedFileCache};
use cache_base::error::CacheError;
use cache_base::internal_error;
use cache_base::logger::Logger;
use log::info;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

struct LogObserver;

impl EvictionObserver for LogObserver {
    fn on_evicted(&self, paths: &[PathBuf]) {
        for path in paths {
            info!("Evicted {:?}", path);
        }
    }
}

/// Opens the local cache configured by the environment.
///
/// Existing files are indexed and the budget is enforced. In periodic mode
/// the eviction worker runs until `shutdown` completes.
pub async fn launch<EnvGetter, Shutdown>(
    env_getter: EnvGetter,
    shutdown: Shutdown,
) -> Result<(), CacheError>
where
    EnvGetter: GetEnv,
    Shutdown: Future<Output = ()>,
{
    let version: &str = env!("CARGO_PKG_VERSION");
    let parser = CfgParser::from_env(env_getter);
    Logger::init(&parser.cfg.log_level);

    info!("Content Cache {}", version);
    info!("Configuration: \n{}", parser.env.message());

    let cache = Arc::new(ProvidedFileCache::new(&parser.cfg.cache)?);
    cache.add_observer(Box::new(LogObserver));
    info!("Cache stats: {}", stats_json(&cache)?);

    if let Some(worker) = ProvidedFileCache::spawn_eviction_worker(&cache) {
        shutdown.await;
        worker.abort();

        cache.enforce_budget()?;
        info!("Cache stats: {}", stats_json(&cache)?);
        info!("Eviction worker has been stopped.");
    }

    Ok(())
}

/// Completes on Ctrl-C.
pub async fn shutdown_ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", err);
        return;
    }
    info!("Received Ctrl-C, shutting down...");
}

fn stats_json(cache: &ProvidedFileCache) -> Result<String, CacheError> {
    serde_json::to_string(&cache.stats())
        .map_err(|err| internal_error!("Failed to serialize stats: {}", err))
}
