//! HTTP API
//!
//! Axum server exposing crawl submission and report queries.

pub mod handlers;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::Method;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::cli::config::ServerSettings;
use crate::crawler::CrawlerController;

use handlers::AppState;
use routes::create_router;

/// HTTP API server
pub struct HttpServer {
    settings: ServerSettings,
    controller: Arc<CrawlerController>,
}

impl HttpServer {
    pub fn new(settings: ServerSettings, controller: Arc<CrawlerController>) -> Self {
        Self { settings, controller }
    }

    fn listen_addr(&self) -> Result<SocketAddr> {
        self.settings
            .listen_addr
            .parse()
            .context(format!("Invalid listen address: {}", self.settings.listen_addr))
    }

    /// Serve until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let addr = self.listen_addr()?;

        let mut app = create_router(AppState {
            controller: self.controller.clone(),
        });

        if self.settings.cors_enabled {
            let cors = CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .allow_origin(Any);
            app = app.layer(cors);
        }

        app = app.layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(&addr)
            .await
            .context("Failed to bind HTTP server")?;

        info!("HTTP API listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("HTTP server shutting down");
            })
            .await
            .context("HTTP server error")?;

        Ok(())
    }
}
