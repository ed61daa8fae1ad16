//! Process wiring: logging, chains, orchestrator, API and metrics servers
//!
//! Hosts construct a [`Relayer`] from loaded settings, their chain adapters
//! and a store, then call [`Relayer::run`] until a shutdown signal arrives.

use crate::api::{self, AppState};
use crate::chain::{ChainManager, ChainParamsTable, NativeChain, PortalChain};
use crate::config::{LoggingConfig, Settings};
use crate::coordination::Orchestrator;
use crate::metrics::{self, MetricsServer};
use crate::state::SwapStore;

use anyhow::{bail, Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

const DEFAULT_LOG_FILTER: &str = "info,portal_relayer=debug,hyper=warn";

/// Install the global tracing subscriber
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

/// A fully wired relayer instance
pub struct Relayer {
    settings: Settings,
    store: Arc<dyn SwapStore>,
    chains: Arc<ChainManager>,
    orchestrator: Arc<Orchestrator>,
}

impl Relayer {
    /// Wire the relayer; every adapter must name a chain enabled in the settings
    pub fn new(
        settings: Settings,
        portal: Arc<dyn PortalChain>,
        natives: Vec<(String, Arc<dyn NativeChain>)>,
        store: Arc<dyn SwapStore>,
    ) -> Result<Self> {
        let params = ChainParamsTable::from_config(settings.enabled_chains())?;
        let chains = Arc::new(ChainManager::new(
            portal,
            params,
            Duration::from_secs(settings.relayer.chain_call_timeout_secs),
        ));

        for (name, client) in natives {
            match settings.chains.get(&name) {
                Some(chain) if chain.enabled => {
                    chains
                        .register_native(name.as_str(), client)
                        .with_context(|| format!("Failed to register chain {}", name))?;
                }
                Some(_) => warn!("Chain {} is disabled in configuration, skipping", name),
                None => bail!("Chain {} has no configuration section", name),
            }
        }

        let orchestrator = Arc::new(Orchestrator::new(
            chains.clone(),
            store.clone(),
            settings.relayer.clone(),
        ));

        Ok(Self {
            settings,
            store,
            chains,
            orchestrator,
        })
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.orchestrator.clone()
    }

    pub fn chains(&self) -> Arc<ChainManager> {
        self.chains.clone()
    }

    /// Run until SIGINT or SIGTERM
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves, then stop every component
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!(
            instance_id = %self.settings.relayer.instance_id,
            address = %self.settings.relayer.portal_address,
            "Starting Portal relayer v{}",
            env!("CARGO_PKG_VERSION")
        );

        // Subscribe before the adapters start so no event is missed
        let orchestrator_handle = tokio::spawn({
            let orchestrator = self.orchestrator.clone();
            async move {
                if let Err(e) = orchestrator.run().await {
                    error!("Orchestrator error: {}", e);
                }
            }
        });

        self.chains
            .start_all(self.store.as_ref())
            .await
            .context("Failed to start chain adapters")?;
        info!(
            "Chain adapters started: {}",
            self.chains.connected_chains().join(", ")
        );

        if self.store.has_unfinished_swaps().await? {
            info!("Resuming unfinished swaps from store");
        }

        let api_handle = if self.settings.api.enabled {
            let config = self.settings.api.clone();
            let state = AppState {
                store: self.store.clone(),
                chains: self.chains.clone(),
                orchestrator: self.orchestrator.clone(),
            };
            Some(tokio::spawn(async move {
                if let Err(e) = api::run_server(config, state).await {
                    error!("API server error: {}", e);
                }
            }))
        } else {
            None
        };

        let metrics_handle = if self.settings.metrics.enabled {
            let server = MetricsServer::new(self.settings.metrics.port);
            Some(tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    error!("Metrics server error: {}", e);
                }
            }))
        } else {
            None
        };

        let health_handle = tokio::spawn({
            let chains = self.chains.clone();
            let store = self.store.clone();
            let interval = self.settings.relayer.health_check_interval_secs;
            async move {
                loop {
                    tokio::time::sleep(Duration::from_secs(interval)).await;

                    let mut healthy = true;
                    for (chain, ok) in chains.health_check().await {
                        if !ok {
                            warn!("Chain {} health check failed", chain);
                            healthy = false;
                        }
                    }

                    if let Err(e) = store.health_check().await {
                        warn!("Store health check failed: {}", e);
                        healthy = false;
                    }

                    if healthy {
                        metrics::record_health_check();
                    } else {
                        metrics::record_health_check_failure();
                    }
                }
            }
        });

        info!("Portal relayer is running");
        if self.settings.api.enabled {
            info!(
                "API server: http://{}:{}",
                self.settings.api.host, self.settings.api.port
            );
        }
        if self.settings.metrics.enabled {
            info!("Metrics: http://0.0.0.0:{}/metrics", self.settings.metrics.port);
        }

        shutdown.await;
        info!("Shutdown signal received, stopping...");

        self.orchestrator.stop();
        self.chains.stop().await;

        health_handle.abort();
        if let Some(h) = api_handle {
            h.abort();
        }
        if let Some(h) = metrics_handle {
            h.abort();
        }
        if let Err(e) = orchestrator_handle.await {
            warn!("Orchestrator task ended abnormally: {}", e);
        }

        info!("Portal relayer stopped");
        Ok(())
    }
}

/// Resolve on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
