use axum::{Router, routing::post};

pub mod assignments;
pub mod audit;
pub mod auth;
pub mod classes;
pub mod curriculum;
pub mod independent;
pub mod live;
pub mod moderation;
pub mod policy;
pub mod reports;
pub mod system;

/// Endpoints reachable without a bearer token.
pub fn public_router() -> Router {
    Router::new()
        .route("/auth/email/sign-in", post(auth::email_sign_in))
        .route("/auth/oauth/google/callback", post(auth::oauth_callback))
        .route("/auth/oauth/microsoft/callback", post(auth::oauth_callback))
        .route("/auth/oauth/district/callback", post(auth::oauth_callback))
        .route("/auth/guest/join-session", post(auth::guest_join_session))
}

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/classes", classes::router())
        .nest("/curriculum", curriculum::router())
        .nest("/assignments", assignments::router())
        .nest("/independent", independent::router())
        .nest("/live", live::router())
        .nest("/moderation", moderation::router())
        .nest("/policy", policy::router())
        .nest("/audit", audit::router())
        .nest("/reports", reports::router())
}
