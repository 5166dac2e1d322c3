use serde::Deserialize;

pub const DEFAULT_AI_GATEWAY_URL: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";
pub const DEFAULT_AI_MODEL: &str = "google/gemini-2.5-flash";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub ai_gateway_api_key: String,
    pub ai_gateway_url: String,
    pub ai_model: String,
    pub generator_roster_path: Option<String>,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DATABASE_URL or DB_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable required"))
                .and_then(|secret| {
                    if secret.trim().is_empty() {
                        anyhow::bail!("JWT_SECRET cannot be empty");
                    }
                    Ok(secret)
                })?,
            jwt_audience: std::env::var("JWT_AUDIENCE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "authenticated".to_string()),
            ai_gateway_api_key: std::env::var("AI_GATEWAY_API_KEY")
                .or_else(|_| std::env::var("LOVABLE_API_KEY"))
                .map_err(|_| anyhow::anyhow!("AI_GATEWAY_API_KEY is not configured"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("AI_GATEWAY_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            ai_gateway_url: std::env::var("AI_GATEWAY_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|raw| -> anyhow::Result<String> {
                    let parsed = url::Url::parse(&raw)
                        .map_err(|e| anyhow::anyhow!("AI_GATEWAY_URL is not a valid URL: {}", e))?;
                    if parsed.scheme() != "http" && parsed.scheme() != "https" {
                        anyhow::bail!("AI_GATEWAY_URL must start with http:// or https://");
                    }
                    Ok(raw)
                })
                .transpose()?
                .unwrap_or_else(|| DEFAULT_AI_GATEWAY_URL.to_string()),
            ai_model: std::env::var("AI_MODEL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            generator_roster_path: std::env::var("GENERATOR_ROSTER_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            run_migrations: std::env::var("RUN_MIGRATIONS")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        // Never log secrets; the DB URL is truncated
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            config.database_url.chars().take(20).collect::<String>()
        );
        tracing::debug!("AI gateway URL: {}", config.ai_gateway_url);
        tracing::debug!("AI model: {}", config.ai_model);
        if let Some(ref path) = config.generator_roster_path {
            tracing::info!("Generator roster will be loaded from {}", path);
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
