use axum::http::{header, HeaderValue, Method};
use psp_orchestrator::api::{self, AppState};
use psp_orchestrator::config::{AppConfig, ServerConfig};
use psp_orchestrator::database::in_memory::InMemoryStore;
use psp_orchestrator::database::merchant_repository::MerchantRepository;
use psp_orchestrator::database::repository::{
    MerchantDirectory, SubscriptionStore, TransactionLedger,
};
use psp_orchestrator::database::subscription_repository::SubscriptionRepository;
use psp_orchestrator::database::transaction_repository::TransactionRepository;
use psp_orchestrator::database::{init_pool_from_config, run_migrations};
use psp_orchestrator::logging::init_tracing;
use psp_orchestrator::middleware::logging::{request_logging_middleware, UuidRequestId};
use psp_orchestrator::payments::providers::BankGatewayClient;
use psp_orchestrator::services::{OutboundDispatcher, WebshopNotifier};
use psp_orchestrator::workers::outbound_dispatch::OutboundDispatchWorker;
use psp_orchestrator::workers::pending_transaction_monitor::{
    PendingMonitorConfig, PendingTransactionMonitor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown");
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::PATCH,
        ])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        enabled_methods = ?config.rails.enabled_methods,
        "🚀 Starting PSP orchestrator"
    );

    // Stores: Postgres, or the seeded in-memory store in demo mode
    let (db_pool, merchants, ledger, subscriptions): (
        Option<sqlx::PgPool>,
        Arc<dyn MerchantDirectory>,
        Arc<dyn TransactionLedger>,
        Arc<dyn SubscriptionStore>,
    ) = if config.server.skip_externals {
        info!("⏭️  Skipping database initialization (SKIP_EXTERNALS=true), using in-memory store");
        let store = Arc::new(InMemoryStore::demo());
        let merchants: Arc<dyn MerchantDirectory> = store.clone();
        let ledger: Arc<dyn TransactionLedger> = store.clone();
        let subscriptions: Arc<dyn SubscriptionStore> = store;
        (None, merchants, ledger, subscriptions)
    } else {
        info!("📊 Initializing database connection pool...");
        let pool = init_pool_from_config(&config.database).await.map_err(|e| {
            error!("Failed to initialize database pool: {}", e);
            e
        })?;
        info!(
            max_connections = pool.options().get_max_connections(),
            "✅ Database connection pool initialized"
        );

        if config.database.run_migrations {
            run_migrations(&pool).await?;
        }

        let merchants: Arc<dyn MerchantDirectory> =
            Arc::new(MerchantRepository::new(pool.clone()));
        let ledger: Arc<dyn TransactionLedger> =
            Arc::new(TransactionRepository::new(pool.clone()));
        let subscriptions: Arc<dyn SubscriptionStore> =
            Arc::new(SubscriptionRepository::new(pool.clone()));
        (Some(pool), merchants, ledger, subscriptions)
    };

    // Outbound queue and background workers
    let (dispatcher, dispatch_rx) =
        OutboundDispatcher::channel(config.rails.outbound_queue_capacity);
    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);

    let dispatch_worker = OutboundDispatchWorker::new(
        dispatch_rx,
        Arc::new(BankGatewayClient::new(
            &config.rails.bank_gateway_url,
            config.rails.outbound_timeout,
        )?),
        Arc::new(WebshopNotifier::new(
            &config.rails.webshop_notify_url,
            config.rails.outbound_timeout,
        )?),
    )
    .with_max_in_flight(config.rails.outbound_max_in_flight);
    let dispatch_handle = tokio::spawn(dispatch_worker.run(worker_shutdown_rx.clone()));
    info!("📤 Outbound dispatch worker started");

    let monitor_config = PendingMonitorConfig::from_env();
    let monitor_handle = if monitor_config.enabled {
        let monitor = PendingTransactionMonitor::new(ledger.clone(), monitor_config);
        info!("⏳ Pending transaction monitor started");
        Some(tokio::spawn(monitor.run(worker_shutdown_rx)))
    } else {
        info!("⏭️  Pending transaction monitor disabled");
        None
    };

    let state = AppState::new(
        merchants,
        ledger,
        subscriptions,
        &config.rails,
        dispatcher,
        db_pool,
    )?;

    let app = api::router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(axum::middleware::from_fn(request_logging_middleware))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(cors_layer(&config.server)),
    );

    info!("✅ Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight requests have finished, so anything they queued is in the channel
    let _ = worker_shutdown_tx.send(true);

    // Room for the dispatch worker to drain a full queue
    let rounds = config.rails.outbound_queue_capacity / config.rails.outbound_max_in_flight + 1;
    let drain_timeout = config.rails.outbound_timeout * rounds as u32 + Duration::from_secs(5);
    let mut handles = vec![dispatch_handle];
    handles.extend(monitor_handle);
    for handle in handles {
        match tokio::time::timeout(drain_timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Worker task failed"),
            Err(_) => error!(timeout = ?drain_timeout, "Timed out waiting for worker shutdown"),
        }
    }

    info!("👋 Server shutdown complete");

    Ok(())
}
