//! Server assembly: shared state, router, and task lifecycle.
//!
//! All shared mutable structures (pool, cache, subscription sets, session
//! registry, work queue) are owned by a single [`AppState`] constructed at
//! startup and passed by `Arc` into the tasks that need them; each structure
//! synchronizes itself.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            Gateway                                   │
//! │                                                                     │
//! │  ┌────────────┐   ┌────────────┐   ┌──────────────┐                 │
//! │  │  WS accept │──▶│ work queue │──▶│  dispatcher  │──▶ reply frames │
//! │  │  + reader  │   │ (bounded)  │   │  (per-item   │                 │
//! │  └────────────┘   └────────────┘   │   tasks)     │                 │
//! │                                    └──────┬───────┘                 │
//! │  ┌────────────┐   ┌────────────┐          ▼                         │
//! │  │poll driver │──▶│ registry   │   ┌──────────────┐                 │
//! │  │+ probe     │   │ fan-out    │   │ cache / pool │                 │
//! │  └────────────┘   └────────────┘   └──────────────┘                 │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Long-lived tasks (accept loop, dispatcher pump, poll driver, health
//! probe) all watch one `CancellationToken` and join before
//! [`Gateway::run`] returns.

mod http;
mod ws;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use steem_rpc::ClientConfig;

use crate::cache::GatewayCache;
use crate::config::Settings;
use crate::dispatcher::{self, WorkItem};
use crate::error::{GatewayError, Result};
use crate::session::SessionRegistry;
use crate::subscriptions::SubscriptionRegistry;
use crate::upstream::{RetryingCaller, UpstreamPool};
use crate::{poller, VERSION};

// ═══════════════════════════════════════════════════════════════════════════════
// APP STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared state owned by the gateway and referenced by every task.
#[derive(Debug)]
pub struct AppState {
    /// Effective configuration.
    pub settings: Settings,
    /// Upstream endpoint pool.
    pub pool: Arc<UpstreamPool>,
    /// Tiered cache.
    pub cache: Arc<GatewayCache>,
    /// Retrying caller over the pool.
    pub caller: RetryingCaller,
    /// Per-feed subscription sets.
    pub subscriptions: SubscriptionRegistry,
    /// Open sessions, bounded by the connection cap.
    pub sessions: SessionRegistry,
    /// Producer side of the bounded work queue.
    pub work_tx: mpsc::Sender<WorkItem>,
    /// Server start instant, for `/status` uptime.
    pub started_at: Instant,
}

impl AppState {
    /// Build the state and the work-queue consumer from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream pool cannot be constructed.
    pub fn new(settings: Settings) -> Result<(Arc<Self>, mpsc::Receiver<WorkItem>)> {
        let client_config =
            ClientConfig::default().with_timeout(settings.upstream.request_timeout());
        let pool = Arc::new(UpstreamPool::new(
            &settings.upstream.endpoints,
            &client_config,
            settings.upstream.recovery_window(),
        )?);
        let cache = Arc::new(GatewayCache::new(settings.cache.clone()));
        let caller = RetryingCaller::new(
            Arc::clone(&pool),
            Arc::clone(&cache),
            settings.upstream.max_retries,
            settings.upstream.retry_base_delay(),
        );

        let (work_tx, work_rx) = mpsc::channel(settings.server.queue_capacity);
        let sessions = SessionRegistry::new(settings.server.max_connections);

        let state = Arc::new(Self {
            settings,
            pool,
            cache,
            caller,
            subscriptions: SubscriptionRegistry::new(),
            sessions,
            work_tx,
            started_at: Instant::now(),
        });

        Ok((state, work_rx))
    }

    /// Current depth of the work queue.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.work_tx.max_capacity() - self.work_tx.capacity()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GATEWAY
// ═══════════════════════════════════════════════════════════════════════════════

/// The assembled gateway: state plus the work-queue consumer.
#[derive(Debug)]
pub struct Gateway {
    state: Arc<AppState>,
    work_rx: mpsc::Receiver<WorkItem>,
}

impl Gateway {
    /// Build a gateway from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream pool cannot be constructed.
    pub fn new(settings: Settings) -> Result<Self> {
        let (state, work_rx) = AppState::new(settings)?;
        Ok(Self { state, work_rx })
    }

    /// Shared state, for introspection in tests.
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Bind the configured address and serve until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Bind failure is fatal; everything after a successful bind is
    /// recoverable and handled internally.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.state.settings.server.socket_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| GatewayError::Initialization(format!("Failed to bind {addr}: {e}")))?;
        info!(%addr, "Gateway listening");
        self.run_with_listener(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error only if the HTTP server itself fails.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let Self { state, work_rx } = self;

        let pump = tokio::spawn(run_dispatcher_pump(
            Arc::clone(&state),
            work_rx,
            shutdown.clone(),
        ));
        let poll_driver = tokio::spawn(poller::PollDriver::new(Arc::clone(&state)).run(shutdown.clone()));
        let health_probe =
            tokio::spawn(poller::HealthProbe::new(Arc::clone(&state)).run(shutdown.clone()));

        let app = build_router(Arc::clone(&state));
        let serve_shutdown = shutdown.clone();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
            .await
            .map_err(|e| GatewayError::Initialization(format!("Server error: {e}")));

        // The server has stopped; make sure every task observes shutdown,
        // then join them all before returning.
        shutdown.cancel();
        for (name, handle) in [
            ("dispatcher", pump),
            ("poll-driver", poll_driver),
            ("health-probe", health_probe),
        ] {
            if let Err(e) = handle.await {
                error!(task = name, error = %e, "Task panicked during shutdown");
            }
        }

        info!("Gateway stopped");
        result
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Assemble the axum router: WebSocket at `/`, introspection endpoints, and
/// a descriptive document for every other path.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(ws::websocket_or_document))
        .route("/health", get(http::health))
        .route("/status", get(http::status))
        .fallback(http::service_document)
        .layer(cors_layer(&state.settings.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the CORS layer from the configured origin list.
///
/// A literal `"*"` entry permits any origin; otherwise only the listed
/// origins are allowed (entries that fail to parse are skipped).
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISPATCHER PUMP
// ═══════════════════════════════════════════════════════════════════════════════

/// Drain the work queue, dispatching each item in its own task.
async fn run_dispatcher_pump(
    state: Arc<AppState>,
    mut work_rx: mpsc::Receiver<WorkItem>,
    shutdown: CancellationToken,
) {
    info!("Dispatcher started");
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            item = work_rx.recv() => {
                let Some(WorkItem { session, frame }) = item else { break };
                let task_state = Arc::clone(&state);
                tokio::spawn(async move {
                    dispatcher::dispatch(&task_state, &session, frame).await;
                });
            }
        }
    }
    debug!("Dispatcher stopped");
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE INFO
// ═══════════════════════════════════════════════════════════════════════════════

/// Service name reported by the introspection endpoints.
pub const SERVICE_NAME: &str = "steem-gateway";

/// Service version reported by the introspection endpoints.
#[must_use]
pub const fn service_version() -> &'static str {
    VERSION
}
