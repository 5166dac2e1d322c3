//! Caller identity and platform roles.

use crate::errors::{AppError, ResultExt};
use crate::handlers::AppState;
use crate::models::AppRole;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Claims issued by the hosted auth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    #[serde(default)]
    pub email: Option<String>,
}

/// Extracts the token from `Authorization: Bearer <jwt>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing Authorization header".to_string()))?;

    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("invalid auth scheme".to_string()))
}

/// Verifies an HS256 token against the shared secret and expected audience.
pub fn decode_token(token: &str, secret: &str, audience: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[audience]);
    let key = DecodingKey::from_secret(secret.as_bytes());

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| AppError::Unauthorized(format!("invalid or expired token: {}", e)))
}

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let claims = decode_token(token, &state.config.jwt_secret, &state.config.jwt_audience)?;

        Ok(AuthUser {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}

/// First assigned role wins.
pub fn primary_role(roles: &[AppRole]) -> Option<AppRole> {
    roles.first().copied()
}

/// Role lookups backed by `user_roles`, cached per user for five minutes.
#[derive(Clone)]
pub struct RoleDirectory {
    pool: PgPool,
    cache: Cache<Uuid, Arc<Vec<AppRole>>>,
}

impl RoleDirectory {
    pub fn new(pool: PgPool) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(300))
            .max_capacity(10_000)
            .build();
        Self { pool, cache }
    }

    pub async fn roles(&self, user_id: Uuid) -> Result<Arc<Vec<AppRole>>, AppError> {
        let pool = self.pool.clone();
        self.cache
            .try_get_with(user_id, async move {
                let raw: Vec<String> = sqlx::query_scalar::<_, String>(
                    "SELECT role FROM user_roles WHERE user_id = $1 ORDER BY created_at ASC",
                )
                .bind(user_id)
                .fetch_all(&pool)
                .await
                .context("Failed to load user roles")?;

                let roles = raw
                    .iter()
                    .filter_map(|r| match r.parse::<AppRole>() {
                        Ok(role) => Some(role),
                        Err(e) => {
                            tracing::warn!("Ignoring role for user {}: {}", user_id, e);
                            None
                        }
                    })
                    .collect::<Vec<_>>();
                Ok::<_, AppError>(Arc::new(roles))
            })
            .await
            .map_err(|e: Arc<AppError>| (*e).clone())
    }

    pub async fn has_role(&self, user_id: Uuid, role: AppRole) -> Result<bool, AppError> {
        Ok(self.roles(user_id).await?.contains(&role))
    }

    /// `Forbidden` unless the user holds one of `allowed`.
    pub async fn require_any(&self, user_id: Uuid, allowed: &[AppRole]) -> Result<(), AppError> {
        for role in allowed {
            if self.has_role(user_id, *role).await? {
                return Ok(());
            }
        }
        let names: Vec<&str> = allowed.iter().map(AppRole::as_str).collect();
        Err(AppError::Forbidden(format!(
            "One of the roles [{}] is required",
            names.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token(sub: Uuid, aud: &str, exp_offset: i64) -> String {
        #[derive(Serialize)]
        struct Raw<'a> {
            sub: Uuid,
            aud: &'a str,
            exp: i64,
            email: &'a str,
        }
        let claims = Raw {
            sub,
            aud,
            exp: chrono::Utc::now().timestamp() + exp_offset,
            email: "cliente@example.com",
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_valid_token() {
        let user = Uuid::new_v4();
        let claims = decode_token(&token(user, "authenticated", 3600), SECRET, "authenticated")
            .unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.email.as_deref(), Some("cliente@example.com"));
    }

    #[test]
    fn test_rejects_wrong_audience_secret_and_expiry() {
        let user = Uuid::new_v4();
        assert!(decode_token(&token(user, "anon", 3600), SECRET, "authenticated").is_err());
        assert!(
            decode_token(&token(user, "authenticated", 3600), "other", "authenticated").is_err()
        );
        assert!(decode_token(&token(user, "authenticated", -3600), SECRET, "authenticated").is_err());
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }

    #[test]
    fn test_primary_role_is_first() {
        assert_eq!(primary_role(&[]), None);
        assert_eq!(
            primary_role(&[AppRole::Instalador, AppRole::AdminBanco]),
            Some(AppRole::Instalador)
        );
    }
}
