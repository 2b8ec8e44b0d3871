//! HTTP surface: `/search`, `/stream` and a liveness route.

pub mod error;
pub mod routes;
pub mod stream;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{Router, routing::get};
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::ytm::{AudioResolver, Catalog};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn Catalog>,
    pub resolver: Arc<dyn AudioResolver>,
    /// Client for fetching media bytes. No overall timeout: streams are long.
    pub http: reqwest::Client,
    pub search_limit: usize,
}

impl AppState {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        resolver: Arc<dyn AudioResolver>,
        search_limit: usize,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("build upstream http client")?;
        Ok(Self {
            catalog,
            resolver,
            http,
            search_limit,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::home))
        .route("/search", get(routes::search))
        .route("/stream", get(stream::stream_by_query))
        .route("/stream/{id}", get(stream::stream_by_path))
        .fallback(routes::not_found)
        .layer(TraceLayer::new_for_http())
        // Browsers play the stream from the frontend's origin.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running HTTP server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {}", err);
    }
    tracing::info!("shutting down");
}
