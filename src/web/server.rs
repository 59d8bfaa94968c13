//! Axum HTTP server for the operator API.

use std::sync::Arc;

use axum::Router;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tracing::info;

use crate::actions::accounts::AccountConfigs;
use crate::actions::fetcher::ContentFetcher;
use crate::actions::generator::ContentGenerator;
use crate::actions::store::ActionStore;
use crate::actions::trigger::TriggerEvaluator;
use crate::config::WebConfig;
use crate::screenshot::ScreenshotCapturer;

use super::routes;

/// Shared state for all web routes.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub store: Arc<dyn ActionStore>,
    pub accounts: Arc<dyn AccountConfigs>,
    pub evaluator: Arc<TriggerEvaluator>,
    pub generator: Arc<ContentGenerator>,
    pub fetcher: Option<Arc<dyn ContentFetcher>>,
    pub capturer: Option<Arc<ScreenshotCapturer>>,
}

pub struct WebServer {
    config: WebConfig,
    state: AppState,
}

impl WebServer {
    pub fn new(config: WebConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Serve until `shutdown` flips to true.
    pub async fn start(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let app = Router::new()
            .merge(routes::api_routes())
            .with_state(self.state);

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.port));
        info!(port = self.config.port, "web api starting");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await?;

        Ok(())
    }
}
