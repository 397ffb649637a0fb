use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{Router, middleware, routing::get};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use authsvc_introspect::{IntrospectionEngine, KeyStore, load_key_set};

use crate::{config::AppConfig, handlers, middleware as app_middleware, watch};

/// Shared state for all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub engine: IntrospectionEngine,
}

impl AppState {
    pub fn new(engine: IntrospectionEngine) -> Self {
        Self { engine }
    }
}

pub struct AuthsvcServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
    config: AppConfig,
    config_path: Option<PathBuf>,
}

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        .route("/health", get(handlers::health))
        .route("/readyz", get(handlers::readyz))
        .route(
            "/introspect",
            get(handlers::introspect_get).post(handlers::introspect_post),
        )
        .with_state(state)
        // Outermost first: request id -> trace -> timeout -> body limit
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(app_middleware::request_id))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &axum::http::Request<_>| {
                            use tracing::field::Empty;
                            let req_id = req
                                .extensions()
                                .get::<axum::http::HeaderValue>()
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("")
                                .to_string();
                            // Only the path is logged; query strings may carry tokens.
                            tracing::info_span!(
                                "http.request",
                                http.method = %req.method(),
                                http.target = %req.uri().path(),
                                http.status_code = Empty,
                                request_id = %req_id
                            )
                        })
                        .on_response(
                            |res: &axum::http::Response<_>,
                             latency: std::time::Duration,
                             span: &tracing::Span| {
                                span.record(
                                    "http.status_code",
                                    tracing::field::display(res.status().as_u16()),
                                );
                                tracing::info!(
                                    http.status = %res.status().as_u16(),
                                    elapsed_ms = %latency.as_millis(),
                                    "request handled"
                                );
                            },
                        ),
                )
                .layer(TimeoutLayer::new(cfg.request_timeout()))
                .layer(axum::extract::DefaultBodyLimit::max(body_limit)),
        )
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    config_path: Option<PathBuf>,
    keys: Option<Arc<KeyStore>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            config_path: None,
            keys: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Watch this file for hot-reloadable settings once running.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Use a pre-populated key store instead of loading `trust` from the config.
    pub fn with_key_store(mut self, keys: Arc<KeyStore>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Loads the key material and assembles the engine and router.
    ///
    /// Fails if any key source is invalid or no key could be loaded at all.
    pub fn build(self) -> anyhow::Result<AuthsvcServer> {
        let keys = match self.keys {
            Some(keys) => keys,
            None => {
                let set = load_key_set(&self.config.trust).context("failed to load keys")?;
                Arc::new(KeyStore::new(set))
            }
        };
        if !keys.is_loaded() {
            anyhow::bail!("no verification keys configured; add [[trust.keys]] or [trust.jwks_file]");
        }

        let engine = IntrospectionEngine::new(self.config.introspection.clone(), keys);
        let state = AppState::new(engine);
        let app = build_app(state.clone(), &self.config);

        Ok(AuthsvcServer {
            addr: self.addr,
            app,
            state,
            config: self.config,
            config_path: self.config_path,
        })
    }
}

impl AuthsvcServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let sweeper = self.state.engine.start_sweeper();
        let _key_watcher =
            watch::start_key_watcher(self.config.trust.clone(), Arc::clone(self.state.engine.keys()));
        let _config_watcher = self.config_path.clone().and_then(watch::start_config_watcher);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;
        tracing::info!("listening on {}", self.addr);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        sweeper.shutdown().await;
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
