//! # Parameter Sync Controller
//!
//! A Kubernetes controller that renders parameter-store projects into
//! cluster resources.
//!
//! ## Overview
//!
//! Each reconciliation pass:
//!
//! 1. **Lists `ParameterMapping` resources** - grouped by namespace, one root mapping per namespace
//! 2. **Lists projects** - from the upstream parameter store
//! 3. **Resolves inclusion** - merges each project's included projects underneath its own parameters
//! 4. **Renders templates** - the governing mapping's `resourceTemplates`, strict about undefined variables
//! 5. **Applies documents** - create, update if labelled as managed, otherwise leave untouched
//!
//! Passes run once at startup, then on every interval, SIGHUP, or
//! `ParameterMapping` change. SIGINT/SIGTERM stop the controller between passes.

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use parameter_sync_controller::cluster::{ClusterClient, KubeClusterClient};
use parameter_sync_controller::config::ControllerConfig;
use parameter_sync_controller::controller::{
    report_pass_error, Polling, Reconciler, ReconcilerOptions, Wakeup,
};
use parameter_sync_controller::observability::metrics;
use parameter_sync_controller::provider::{ParameterSource, ParameterStoreClient};
use parameter_sync_controller::server::{start_server, ServerState};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Render parameter-store projects into Kubernetes resources
#[derive(Debug, Parser)]
#[command(name = "parameter-sync-controller", version, long_about = None)]
struct Cli {
    /// Seconds between scheduled reconciliation passes
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Render only; log what would be applied and exit after one pass
    #[arg(long)]
    dry_run: bool,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    /// Debug logging, and `debug` set in template contexts
    #[arg(long)]
    debug: bool,

    /// Create missing target namespaces
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    create_namespaces: Option<bool>,

    /// Parameter store organization
    #[arg(long)]
    organization: Option<String>,

    /// Default parameter environment
    #[arg(long)]
    environment: Option<String>,

    /// Default parameter tag
    #[arg(long)]
    tag: Option<String>,

    /// Parameter store base URL
    #[arg(long, value_name = "URL")]
    store_url: Option<String>,

    /// Port of the metrics and health server
    #[arg(long, value_name = "PORT")]
    metrics_port: Option<u16>,

    /// Run a pass whenever a ParameterMapping changes
    #[arg(long, overrides_with = "no_watch")]
    watch: bool,

    /// Only run passes on the interval and on SIGHUP
    #[arg(long, overrides_with = "watch")]
    no_watch: bool,
}

impl Cli {
    /// Layer flags over environment configuration
    fn apply(self, config: &mut ControllerConfig) {
        if let Some(interval) = self.interval {
            config.sync_interval_secs = interval;
        }
        config.dry_run |= self.dry_run;
        config.once |= self.once;
        config.debug |= self.debug;
        if let Some(create_namespaces) = self.create_namespaces {
            config.create_namespaces = create_namespaces;
        }
        if let Some(organization) = self.organization {
            config.parameter_store.organization = organization;
        }
        if self.environment.is_some() {
            config.parameter_store.environment = self.environment;
        }
        if self.tag.is_some() {
            config.parameter_store.tag = self.tag;
        }
        if let Some(url) = self.store_url {
            config.parameter_store.url = url;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if self.watch {
            config.watch_mappings = true;
        } else if self.no_watch {
            config.watch_mappings = false;
        }
    }
}

fn init_tracing(config: &ControllerConfig) -> Result<()> {
    let level = if config.debug {
        "debug".to_string()
    } else {
        config.log_level.to_ascii_lowercase()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("parameter_sync_controller={level}").into());

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.log_format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!(e).context("Failed to initialize tracing"))
}

/// Resolve once SIGINT or SIGTERM arrives
async fn shutdown_signal() -> Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        _ = terminate.recv() => info!("SIGTERM received"),
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for SIGINT")?;
            info!("SIGINT received");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must precede any TLS use by kube or reqwest
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|provider| {
            anyhow::anyhow!("Failed to install rustls crypto provider: {provider:?}")
        })?;

    let mut config = ControllerConfig::from_env();
    Cli::parse().apply(&mut config);
    init_tracing(&config)?;

    info!("Starting Parameter Sync Controller");
    info!(
        timestamp = env!("BUILD_TIMESTAMP"),
        datetime = env!("BUILD_DATETIME"),
        git_hash = env!("BUILD_GIT_HASH"),
        "Build info"
    );
    info!(
        interval_secs = config.sync_interval_secs,
        dry_run = config.dry_run,
        once = config.once,
        watch = config.watch_mappings,
        create_namespaces = config.create_namespaces,
        parameter_store = ?config.parameter_store,
        "Loaded configuration"
    );

    metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_port = config.metrics_port;
    let state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, state).await {
            error!(error = %e, "HTTP server error");
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let cluster: Arc<dyn ClusterClient> = Arc::new(KubeClusterClient::new(client));
    let source: Arc<dyn ParameterSource> =
        Arc::new(ParameterStoreClient::new(&config.parameter_store)?);
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&cluster),
        source,
        ReconcilerOptions::from(&config),
    ));

    if config.single_pass() {
        let result = reconciler.run_pass().await;
        server_state.mark_ready();
        return match result {
            Ok(_) => Ok(()),
            Err(e) => {
                report_pass_error(&e);
                Err(anyhow::Error::new(e).context("Reconciliation pass failed"))
            }
        };
    }

    let wakeup = Wakeup::new();
    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    let interrupt = wakeup.clone();
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("SIGHUP received; running a pass now");
            interrupt.wake();
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!(error = %e, "Signal handling unavailable"),
        }
    });

    let mut polling = Polling::new(config.sync_interval())
        .with_wakeup(wakeup)
        .until(shutdown_rx);
    if config.watch_mappings {
        polling = polling.watching(cluster);
    }

    polling
        .run(|| {
            let reconciler = Arc::clone(&reconciler);
            let server_state = Arc::clone(&server_state);
            async move {
                let result = reconciler.run_pass().await.map(|_| ());
                server_state.mark_ready();
                result
            }
        })
        .await;

    info!("Controller stopped");
    Ok(())
}
