pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::middleware::{
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::services::{
    AuditLogger, AuthService, Clock, GoogleClient, IdentityStore, OAuthStateManager,
    ReconciliationEngine, SessionStore, TokenIssuer,
};
use service_core::error::AppError;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub store: Arc<dyn IdentityStore>,
    pub sessions: SessionStore,
    pub tokens: TokenIssuer,
    pub oauth_states: OAuthStateManager,
    pub google: GoogleClient,
    pub reconciliation: ReconciliationEngine,
    pub auth_service: AuthService,
}

impl AppState {
    /// Wire every component from one configuration, store and clock.
    pub fn new(
        config: IdentityConfig,
        store: Arc<dyn IdentityStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let audit = AuditLogger::new(store.clone(), clock.clone());
        let sessions = SessionStore::new(store.clone(), clock.clone(), audit.clone());
        let tokens = TokenIssuer::new(&config.token, store.clone(), clock.clone());
        let oauth_states = OAuthStateManager::new(store.clone(), clock.clone());
        let google = GoogleClient::new(&config.google, config.redirect_uri())?;
        let reconciliation = ReconciliationEngine::new(
            store.clone(),
            sessions.clone(),
            audit.clone(),
            clock.clone(),
        );
        let auth_service = AuthService::new(store.clone(), sessions.clone(), audit, clock);

        Ok(Self {
            config,
            store,
            sessions,
            tokens,
            oauth_states,
            google,
            reconciliation,
            auth_service,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    // Routes that need an authenticated caller (session cookie or bearer token)
    let protected = Router::new()
        .route("/auth/session", get(handlers::auth::current_session))
        .route("/auth/token", post(handlers::auth::issue_token))
        .route("/auth/google/link", get(handlers::auth::google_link))
        .route(
            "/users/me",
            get(handlers::user::get_me).patch(handlers::user::update_me),
        )
        .route("/users/me/password", post(handlers::user::change_password))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let allowed_origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect();

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/google", get(handlers::auth::google_signin))
        .route(
            "/auth/google/callback",
            get(handlers::auth::google_callback),
        )
        .merge(protected)
        .with_state(state)
        // Add tracing layer
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            },
        ))
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        // Add security headers middleware
        .layer(from_fn(security_headers_middleware))
        // Add CORS layer
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        )
}

/// Service health check
///
/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "database": "up"
        }
    })))
}
