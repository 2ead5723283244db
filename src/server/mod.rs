#[cfg(test)]
#[path = "handlers_test.rs"]
mod tests;

pub mod error;
pub mod handlers;

pub use error::ApiError;

use axum::{
    Router,
    routing::{get, post},
};
use eyre::{Context, Result};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::config::Configuration;
use crate::storage::{ArcStorage, new_storage};
use crate::upstream::{ArcUpstream, new_upstream};

#[derive(Clone)]
pub struct AppState {
    pub storage: ArcStorage,
    pub upstream: ArcUpstream,
    pub default_model: String,
    /// Capacity of the per-run frame channel.
    pub frame_buffer: usize,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/assistant",
            get(handlers::list_assistants).post(handlers::create_assistant),
        )
        .route(
            "/assistant/{id}",
            get(handlers::get_assistant).put(handlers::update_assistant),
        )
        .route("/thread/{assistant_id}", post(handlers::create_thread))
        .route("/threads/{assistant_id}", get(handlers::list_threads))
        .route("/messages/{thread_id}", get(handlers::list_messages))
        .route("/sync/{thread_id}", post(handlers::sync_messages))
        .route("/chat/{assistant_id}", post(handlers::chat));

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(config: &Configuration) -> Result<()> {
    let storage = new_storage(&config.storage)
        .await
        .wrap_err("initializing storage")?;
    let upstream = new_upstream(&config.upstream).wrap_err("initializing upstream")?;
    log::info!("using upstream {}", upstream.name());

    let state = AppState {
        storage,
        upstream,
        default_model: config.upstream.default_model.clone(),
        frame_buffer: config.server.frame_buffer,
    };

    let listener = TcpListener::bind(&config.server.listen)
        .await
        .wrap_err(format!("binding {}", config.server.listen))?;
    log::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("shutting down");
        })
        .await
        .wrap_err("serving http")?;
    Ok(())
}
