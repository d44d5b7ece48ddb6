//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: the store and the live gateway shared by handlers
//! - `gateway.rs`: broadcast channel + `/ws/live`
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request DTOs and the JSON body extractor
//! - `errors.rs`: the `{ok, data}` / `{ok, error, message}` envelopes

use std::sync::Arc;

use anyhow::Context;
use axum::{Extension, Router, http::HeaderValue, routing::get};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use classroom_auth::Hs256JwtValidator;
use classroom_infra::{AppConfig, InMemoryStore, Persistence, PostgresStore, Store};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod gateway;
pub mod routes;
pub mod services;

/// Open the configured store; Postgres schemas are applied before serving.
pub async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    match &config.persistence {
        Persistence::InMemory => {
            tracing::warn!("using in-memory store; data is lost on restart");
            Ok(Arc::new(InMemoryStore::new()))
        }
        Persistence::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PostgresStore::connect(database_url, *max_connections)
                .await
                .context("failed to connect to postgres")?;
            store.migrate().await.context("failed to apply schema")?;
            Ok(Arc::new(store))
        }
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(config: AppConfig, store: Arc<dyn Store>) -> Router {
    let jwt = Arc::new(Hs256JwtValidator::new(config.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState {
        jwt,
        store: store.clone(),
    };

    let services = Arc::new(services::AppServices::new(store, gateway::LiveGateway::new()));

    // Protected routes: require a resolved identity.
    let protected = routes::router().route_layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));
    let api = routes::public_router().merge(protected);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/ws/live", get(gateway::ws_live))
        .nest("/api", api)
        .layer(Extension(services))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.allowed_origins)),
        )
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
