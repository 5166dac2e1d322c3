//! HTTP router assembly.

use crate::handlers::{self, AppState};
use crate::openapi::{serve_openapi_spec, serve_swagger_ui};
use crate::{solbot_handler, token_handler};
use axum::{
    http::{header, HeaderName, Method},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

/// Request size limit: 5MB.
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Every route except `/health`.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // API Documentation
        .route("/docs", get(serve_swagger_ui))
        .route("/api-docs/openapi.json", get(serve_openapi_spec))
        // Credit analysis
        .route("/api/v1/energy-bills", post(handlers::create_energy_bill))
        .route(
            "/api/v1/analyze-energy-bill",
            post(handlers::analyze_energy_bill),
        )
        .route(
            "/api/v1/open-finance/connections",
            post(handlers::create_open_finance_connection),
        )
        .route(
            "/api/v1/connect-open-finance",
            post(handlers::connect_open_finance),
        )
        .route("/api/v1/credit-analysis", get(handlers::get_credit_analysis))
        .route(
            "/api/v1/credit-analysis/history",
            get(handlers::get_credit_analysis_history),
        )
        // Profile, roles, cooperative term
        .route("/api/v1/me/roles", get(handlers::get_my_roles))
        .route("/api/v1/profile", put(handlers::update_profile))
        .route(
            "/api/v1/cooperative-terms/current",
            get(handlers::get_current_term),
        )
        .route("/api/v1/cooperative-terms/sign", post(handlers::sign_term))
        .route("/api/v1/simulator", post(handlers::run_simulation))
        // Energy tokens
        .route(
            "/api/v1/tokens",
            get(token_handler::list_marketplace).post(token_handler::mint_token),
        )
        .route("/api/v1/tokens/mine", get(token_handler::list_my_tokens))
        .route(
            "/api/v1/tokens/:id/validate-transfer",
            post(token_handler::validate_transfer),
        )
        .route(
            "/api/v1/tokens/:id/transfer",
            post(token_handler::transfer_token),
        )
        .route("/api/v1/tokens/:id/burn", post(token_handler::burn_token))
        .route("/api/v1/transactions", get(token_handler::list_transactions))
        .route("/api/v1/purchases", get(token_handler::list_purchases))
        // SolBot
        .route("/api/v1/solbot", post(solbot_handler::solbot_chat))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
}

/// CORS for the web client: any origin, the headers its SDK sends.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            header::CONTENT_TYPE,
        ])
}

/// Builds the application. With `rate_limited`, API routes are limited per client IP
/// (one token every 100ms, i.e. 10 req/s, burst 20), keyed on forwarding headers
/// or the peer address from connect info.
pub fn build_router(state: Arc<AppState>, rate_limited: bool) -> anyhow::Result<Router> {
    let mut protected_routes = api_routes();

    if rate_limited {
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_millisecond(100)
                .burst_size(20)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
        );
        protected_routes = protected_routes.layer(ServiceBuilder::new().layer(GovernorLayer {
            config: governor_conf,
        }));
    }

    // Health check bypasses rate limiting
    Ok(Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer()))
}
