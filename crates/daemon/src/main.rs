//! Delegate Dispatch Engine - Main Entry Point

mod config;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{DaemonConfig, LogFormat};
use dispatch_api_rpc::{RateLimiter, RpcContext, RpcHandler, RpcServer, RpcServerConfig};
use dispatch_core::application::{
    shutdown_channel, BroadcastHelper, ConnectionService, DetectorConfig, DisconnectedDetector,
    PeriodicScheduler, RebroadcastConfig, RebroadcastService, ShutdownToken, TaskDispatchService,
};
use dispatch_core::port::id_provider::UuidProvider;
use dispatch_core::port::time_provider::SystemTimeProvider;
use dispatch_core::port::{IdProvider, LeaderElection};
use dispatch_infra_memory::{
    AlwaysPrimary, CachedDelegateLookup, DelegateLifecycleEvent, InMemoryBroadcaster,
    LifecycleEventBus, StaticFeatureFlags,
};
use dispatch_infra_sqlite::{
    create_pool, run_migrations, SqliteConnectionRepository, SqliteDelegateRepository,
    SqliteLeaderLease, SqliteTaskRepository,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_logging(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("dispatch=info"))
        .context("Failed to create env filter")?;

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .init(),
    }
    Ok(())
}

/// Log lifecycle events until shutdown
async fn log_lifecycle_events(bus: Arc<LifecycleEventBus>, mut shutdown: ShutdownToken) {
    let mut events = bus.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(DelegateLifecycleEvent::Disconnected { account_id, delegate_id, connection_id }) => {
                    info!(
                        account_id = %account_id,
                        delegate_id = %delegate_id,
                        connection_id = %connection_id,
                        "Delegate disconnected"
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Lifecycle event consumer lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = shutdown.wait() => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = DaemonConfig::from_env().context("Invalid configuration")?;

    // 2. Initialize logging
    init_logging(config.log_format)?;
    info!("Dispatch Engine v{} starting...", VERSION);

    // 3. Initialize database
    info!(db_path = %config.db_path, "Initializing database...");
    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create data directory {}", parent.display()))?;
    }
    let pool = create_pool(&config.db_path)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);

    let task_repo = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let connection_repo = Arc::new(SqliteConnectionRepository::new(pool.clone()));
    let delegate_repo = Arc::new(SqliteDelegateRepository::new(pool.clone()));

    let delegate_cache = Arc::new(CachedDelegateLookup::new(
        delegate_repo.clone(),
        time_provider.clone(),
        config.delegate_cache_ttl,
    ));
    let broadcaster = Arc::new(InMemoryBroadcaster::new());
    let feature_flags = Arc::new(
        StaticFeatureFlags::parse(&config.feature_flags).context("Invalid DISPATCH_FEATURE_FLAGS")?,
    );
    let lifecycle = Arc::new(LifecycleEventBus::new());

    let leader_lease = config.leader_lease.map(|lease| {
        Arc::new(SqliteLeaderLease::new(
            pool.clone(),
            id_provider.generate_id(),
            lease,
            time_provider.clone(),
        ))
    });
    let leader: Arc<dyn LeaderElection> = match &leader_lease {
        Some(lease) => {
            info!(holder = %lease.holder_id(), "Primary election via SQLite lease");
            lease.clone()
        }
        None => {
            info!("Leader lease disabled; running as primary");
            Arc::new(AlwaysPrimary)
        }
    };

    // 5. Services
    let broadcast_helper =
        BroadcastHelper::new(broadcaster.clone(), feature_flags, time_provider.clone());

    let dispatch = Arc::new(TaskDispatchService::new(
        task_repo.clone(),
        broadcast_helper.clone(),
        id_provider.clone(),
        time_provider.clone(),
    ));
    let connections = Arc::new(ConnectionService::new(
        connection_repo.clone(),
        delegate_repo,
        delegate_cache.clone(),
        id_provider,
        time_provider.clone(),
    ));
    let detector = Arc::new(DisconnectedDetector::new(
        connection_repo.clone(),
        delegate_cache,
        lifecycle.clone(),
        leader,
        time_provider.clone(),
        DetectorConfig {
            expiry: config.connection_expiry,
            batch_size: config.sweep_batch_size,
        },
    ));
    let rebroadcast = Arc::new(RebroadcastService::new(
        task_repo.clone(),
        broadcast_helper,
        time_provider.clone(),
        RebroadcastConfig::default(),
    ));

    // 6. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let handler = RpcHandler::new(
        RpcContext {
            dispatch,
            connections,
            detector: detector.clone(),
            task_repo,
            connection_repo,
            time_provider,
            connection_expiry: config.connection_expiry,
        },
        RateLimiter::new(config.rate_limit_burst, config.rate_limit_rate),
    );
    let rpc_config = RpcServerConfig {
        port: config.rpc_port,
        ..Default::default()
    };
    let (rpc_addr, rpc_handle) = RpcServer::new(rpc_config, handler)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    // 7. Start background loops
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let sweep_handle = tokio::spawn(
        PeriodicScheduler::new(detector, config.sweep_interval).run(shutdown_rx.clone()),
    );
    let rebroadcast_handle = tokio::spawn(
        PeriodicScheduler::new(rebroadcast, config.rebroadcast_interval).run(shutdown_rx.clone()),
    );
    let lifecycle_handle = tokio::spawn(log_lifecycle_events(lifecycle, shutdown_rx));

    info!(rpc_addr = %rpc_addr, "System ready");
    info!("Press Ctrl+C to shutdown");

    // 8. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 9. Graceful shutdown
    shutdown_tx.shutdown();
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;

    for handle in [sweep_handle, rebroadcast_handle, lifecycle_handle] {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    if let Some(lease) = leader_lease {
        if let Err(e) = lease.release().await {
            warn!(error = %e, "Failed to release primary lease");
        }
    }
    pool.close().await;

    info!("Shutdown complete.");

    Ok(())
}
