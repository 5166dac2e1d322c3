//! Cooperative adhesion term and its digital signature.

use crate::errors::{AppError, ResultExt};
use crate::models::{CooperativeTerm, TermStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

pub const TERM_VERSION: &str = "v1.0";

/// Adhesion term under ANEEL Normative Resolution 482/2012.
pub const TERM_CONTENT: &str = include_str!("../assets/cooperative_term_v1.txt");

/// What the signer attests to; hashed into the signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureMetadata {
    pub timestamp: String,
    pub user_id: Uuid,
    pub email: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl SignatureMetadata {
    pub fn new(
        at: DateTime<Utc>,
        user_id: Uuid,
        email: Option<String>,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Self {
        Self {
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            user_id,
            email,
            user_agent,
            ip_address,
        }
    }
}

/// Hex SHA-256 of the metadata's JSON encoding.
pub fn signature_hash(metadata: &SignatureMetadata) -> Result<String, AppError> {
    let encoded = serde_json::to_vec(metadata).map_err(|e| {
        AppError::InternalError(format!("Failed to encode signature metadata: {}", e))
    })?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}

pub struct TermStorage {
    pool: PgPool,
}

impl TermStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Latest term row of the user.
    pub async fn current(&self, user_id: Uuid) -> Result<Option<CooperativeTerm>, AppError> {
        sqlx::query_as::<_, CooperativeTerm>(
            r#"
            SELECT * FROM cooperative_terms
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load cooperative term")
    }

    /// Signs the user's pending term, or creates and signs the current version.
    pub async fn sign(
        &self,
        metadata: &SignatureMetadata,
        signed_at: DateTime<Utc>,
    ) -> Result<CooperativeTerm, AppError> {
        let hash = signature_hash(metadata)?;
        let metadata_json = serde_json::to_value(metadata).map_err(|e| {
            AppError::InternalError(format!("Failed to encode signature metadata: {}", e))
        })?;

        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, CooperativeTerm>(
            r#"
            SELECT * FROM cooperative_terms
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(metadata.user_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to lock cooperative term")?;

        let term = match existing {
            Some(term) if term.status == TermStatus::Signed.as_str() => {
                return Err(AppError::Conflict(
                    "Termo de adesão já assinado".to_string(),
                ));
            }
            Some(term) => sqlx::query_as::<_, CooperativeTerm>(
                r#"
                UPDATE cooperative_terms
                SET status = $2, signed_at = $3, signature_hash = $4,
                    signature_metadata = $5, ip_address = $6, updated_at = now()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(term.id)
            .bind(TermStatus::Signed.as_str())
            .bind(signed_at)
            .bind(&hash)
            .bind(&metadata_json)
            .bind(&metadata.ip_address)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to sign cooperative term")?,
            None => sqlx::query_as::<_, CooperativeTerm>(
                r#"
                INSERT INTO cooperative_terms
                    (user_id, term_version, term_content, status, signed_at,
                     signature_hash, signature_metadata, ip_address)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING *
                "#,
            )
            .bind(metadata.user_id)
            .bind(TERM_VERSION)
            .bind(TERM_CONTENT)
            .bind(TermStatus::Signed.as_str())
            .bind(signed_at)
            .bind(&hash)
            .bind(&metadata_json)
            .bind(&metadata.ip_address)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to create cooperative term")?,
        };

        tx.commit().await?;

        tracing::info!(
            "Cooperative term {} ({}) signed by user {}",
            term.id,
            term.term_version,
            metadata.user_id
        );
        Ok(term)
    }
}
