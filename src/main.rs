use solar_credit_api::api::app::build_router;
use solar_credit_api::api::auth::RoleDirectory;
use solar_credit_api::api::handlers::AppState;
use solar_credit_api::config::Config;
use solar_credit_api::db::Database;
use solar_credit_api::integrations::credit_sources::{MockBillExtractor, MockOpenFinanceProvider};
use solar_credit_api::integrations::gateway_client::AiGatewayClient;
use solar_credit_api::roster::GeneratorRoster;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database pool (and optionally the
/// schema), the role cache, the LLM gateway client and the generator roster, then
/// starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solar_credit_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    if config.run_migrations {
        db.migrate().await?;
        tracing::info!("Database migrations applied");
    }

    let roster = GeneratorRoster::from_optional_path(config.generator_roster_path.as_deref())?;
    tracing::info!("Generator roster loaded ({} profiles)", roster.len());

    let gateway_client = AiGatewayClient::new(
        config.ai_gateway_url.clone(),
        config.ai_gateway_api_key.clone(),
        config.ai_model.clone(),
    )?;
    tracing::info!("AI gateway client initialized: {}", config.ai_gateway_url);

    // Roles are cached per user (5 minute TTL, 10k max entries)
    let roles = RoleDirectory::new(db.pool.clone());

    let app_state = Arc::new(AppState {
        db: db.pool.clone(),
        config: config.clone(),
        gateway_client,
        roster: Arc::new(roster),
        bill_extractor: Arc::new(MockBillExtractor),
        financial_provider: Arc::new(MockOpenFinanceProvider),
        roles,
    });

    let app = build_router(app_state, true)?;

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Connect info feeds the per-IP rate limiter and the signature IP
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
