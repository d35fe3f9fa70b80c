//! HTTP server wiring for the pizzaiolo API

use anyhow::Result;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::llm::DEFAULT_OLLAMA_URL;
use crate::pipeline::{build_pipeline, QaPipeline};

use super::middleware::{auth_middleware, AuthState};
use super::routes::{ask_pizza, cache_entries, cache_stats, health_check, login, AppState};

/// Configuration for the API server
pub struct ApiServerConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub data_dir: PathBuf,
    pub ollama_url: String,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            jwt_secret: std::env::var("JWT_SECRET")
                .unwrap_or_else(|_| "default_secret_change_in_production".to_string()),
            data_dir: PathBuf::from("./data"),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
        }
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    pipeline: Option<Arc<QaPipeline>>,
}

impl ApiServer {
    /// Create a new API server; the pipeline is built on start from the
    /// configured data directory
    pub fn new(config: ApiServerConfig) -> Self {
        Self {
            config,
            pipeline: None,
        }
    }

    /// Create a new API server around an existing pipeline
    pub fn with_pipeline(config: ApiServerConfig, pipeline: Arc<QaPipeline>) -> Self {
        Self {
            config,
            pipeline: Some(pipeline),
        }
    }

    /// Start the API server
    pub async fn start(self) -> Result<()> {
        let pipeline = match self.pipeline {
            Some(pipeline) => pipeline,
            None => Arc::new(build_pipeline(&self.config.data_dir, &self.config.ollama_url).await?),
        };

        let app_state = Arc::new(AppState { pipeline });
        let auth_state = AuthState::new(&self.config.jwt_secret);

        // Build router
        let app = Router::new()
            // Public routes
            .route("/health", get(health_check))
            .route("/login", post(login))
            .with_state(auth_state.clone())
            .route("/ask-pizza", post(ask_pizza))
            // Admin routes behind the JWT middleware
            .route(
                "/admin/cache/stats",
                get(cache_stats)
                    .route_layer(from_fn_with_state(auth_state.clone(), auth_middleware)),
            )
            .route(
                "/admin/cache/entries",
                get(cache_entries)
                    .route_layer(from_fn_with_state(auth_state.clone(), auth_middleware)),
            )
            .with_state(app_state)
            // Add CORS layer
            .layer(CorsLayer::permissive());

        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("Starting API server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
