use crate::errors::{AppError, ResultExt};
use crate::ledger::{
    check_transfer, generate_transaction_hash, plan_burn, plan_transfer, validate_amount,
    validate_token_transfer, NewToken, TransferDenial, TransferPlan,
};
use crate::models::{
    BurnResponse, EnergyToken, MarketplaceQuery, MarketplaceSort, MintTokenResponse, RecipientRef,
    TokenStatus, TokenTransaction, TransactionType, TransferMode, TransferResponse,
};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

pub const DEFAULT_MAX_PRICE: f64 = 10_000.0;
pub const DEFAULT_MAX_KWH: f64 = 100_000.0;
pub const DEFAULT_TRANSACTIONS_LIMIT: i64 = 20;
pub const MAX_TRANSACTIONS_LIMIT: i64 = 100;
const MARKETPLACE_PAGE_SIZE: i64 = 200;

const CONFIRMED: &str = "confirmed";

/// Validated marketplace filters.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketplaceFilter {
    pub min_price: f64,
    pub max_price: f64,
    pub min_kwh: f64,
    pub max_kwh: f64,
    pub search: Option<String>,
    pub sort: MarketplaceSort,
}

impl MarketplaceFilter {
    pub fn from_query(query: &MarketplaceQuery) -> Result<Self, AppError> {
        let filter = Self {
            min_price: query.min_price.unwrap_or(0.0),
            max_price: query.max_price.unwrap_or(DEFAULT_MAX_PRICE),
            min_kwh: query.min_kwh.unwrap_or(0.0),
            max_kwh: query.max_kwh.unwrap_or(DEFAULT_MAX_KWH),
            search: query
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            sort: query.sort,
        };

        let bounds = [
            filter.min_price,
            filter.max_price,
            filter.min_kwh,
            filter.max_kwh,
        ];
        if bounds.iter().any(|b| !b.is_finite() || *b < 0.0) {
            return Err(AppError::BadRequest(
                "Price and kWh filters must be non-negative numbers".to_string(),
            ));
        }
        if filter.min_price > filter.max_price {
            return Err(AppError::BadRequest(
                "min_price must not exceed max_price".to_string(),
            ));
        }
        if filter.min_kwh > filter.max_kwh {
            return Err(AppError::BadRequest(
                "min_kwh must not exceed max_kwh".to_string(),
            ));
        }
        Ok(filter)
    }
}

/// Escapes `%`, `_` and `\` so user input matches literally inside ILIKE.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn clamp_transactions_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_TRANSACTIONS_LIMIT)
        .clamp(1, MAX_TRANSACTIONS_LIMIT)
}

pub fn denial_error(denial: TransferDenial) -> AppError {
    match denial {
        TransferDenial::InvalidAmount => {
            AppError::BadRequest("Digite uma quantidade válida de kWh".to_string())
        }
        TransferDenial::NotOwner => {
            AppError::Forbidden("Validação de transferência falhou: token de outro usuário".to_string())
        }
        TransferDenial::NotAvailable(status) => AppError::Conflict(format!(
            "Validação de transferência falhou: token com status {}",
            status
        )),
        TransferDenial::InsufficientBalance { available, .. } => AppError::BadRequest(format!(
            "Validação de transferência falhou: saldo disponível {} kWh",
            available
        )),
    }
}

struct LedgerEntry<'a> {
    token_id: Uuid,
    from_user_id: Option<Uuid>,
    to_user_id: Uuid,
    transaction_type: TransactionType,
    amount_kwh: f64,
    transaction_hash: &'a str,
    metadata: Value,
}

/// Energy-token ledger. Every mutating operation runs in a single database transaction.
pub struct TokenLedger {
    pool: PgPool,
}

impl TokenLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn marketplace(
        &self,
        filter: &MarketplaceFilter,
    ) -> Result<Vec<EnergyToken>, AppError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM energy_tokens WHERE status = ");
        qb.push_bind(TokenStatus::Available.as_str());
        qb.push(" AND price_per_kwh BETWEEN ")
            .push_bind(filter.min_price)
            .push(" AND ")
            .push_bind(filter.max_price);
        qb.push(" AND amount_kwh BETWEEN ")
            .push_bind(filter.min_kwh)
            .push(" AND ")
            .push_bind(filter.max_kwh);
        if let Some(search) = &filter.search {
            qb.push(" AND farm_name ILIKE ")
                .push_bind(format!("%{}%", escape_like(search)));
        }
        qb.push(" ORDER BY ").push(filter.sort.order_by());
        qb.push(" LIMIT ").push_bind(MARKETPLACE_PAGE_SIZE);

        qb.build_query_as::<EnergyToken>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list marketplace tokens")
    }

    pub async fn owned_by(&self, user_id: Uuid) -> Result<Vec<EnergyToken>, AppError> {
        sqlx::query_as::<_, EnergyToken>(
            r#"
            SELECT * FROM energy_tokens
            WHERE created_by = $1 AND status = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(TokenStatus::Available.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list user tokens")
    }

    /// Inserts the token and its `mint` ledger entry.
    pub async fn mint(&self, token: &NewToken) -> Result<MintTokenResponse, AppError> {
        let mut tx = self.pool.begin().await?;

        let created = insert_token(&mut tx, token).await?;
        let hash = generate_transaction_hash(created.id, None, token.owner, token.amount_kwh);
        insert_ledger_entry(
            &mut tx,
            LedgerEntry {
                token_id: created.id,
                from_user_id: None,
                to_user_id: token.owner,
                transaction_type: TransactionType::Mint,
                amount_kwh: token.amount_kwh,
                transaction_hash: &hash,
                metadata: json!({ "farm_id": created.farm_id, "farm_name": created.farm_name }),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Minted token {} ({} kWh @ {}) for user {}",
            created.token_id,
            created.amount_kwh,
            created.price_per_kwh,
            token.owner
        );
        Ok(MintTokenResponse {
            token: created,
            transaction_hash: hash,
        })
    }

    /// Read-only validator. An unknown token is simply not transferable.
    pub async fn validate_transfer(
        &self,
        token_id: Uuid,
        from_user_id: Uuid,
        amount_kwh: f64,
    ) -> Result<bool, AppError> {
        let token = sqlx::query_as::<_, EnergyToken>("SELECT * FROM energy_tokens WHERE id = $1")
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load token")?;

        Ok(token
            .map(|t| validate_token_transfer(&t, from_user_id, amount_kwh))
            .unwrap_or(false))
    }

    /// Locks the token, validates, records the ledger entry and moves ownership
    /// (whole token or split) atomically.
    pub async fn transfer(
        &self,
        token_id: Uuid,
        from_user_id: Uuid,
        recipient: &RecipientRef,
        amount_kwh: f64,
    ) -> Result<TransferResponse, AppError> {
        validate_amount(amount_kwh)?;

        let mut tx = self.pool.begin().await?;

        let token = lock_token(&mut tx, token_id).await?;
        let recipient_id = resolve_recipient(&mut tx, recipient).await?;
        if recipient_id == from_user_id {
            return Err(AppError::BadRequest(
                "Não é possível transferir para você mesmo".to_string(),
            ));
        }

        if let Err(denial) = check_transfer(&token, from_user_id, amount_kwh) {
            tracing::warn!(
                "Transfer of {} kWh from token {} by {} denied: {}",
                amount_kwh,
                token.id,
                from_user_id,
                denial
            );
            return Err(denial_error(denial));
        }

        let hash = generate_transaction_hash(token.id, Some(from_user_id), recipient_id, amount_kwh);
        let plan = plan_transfer(&token, recipient_id, amount_kwh, Utc::now());

        let mut metadata = json!({
            "recipient": recipient,
            "transfer_date": Utc::now().to_rfc3339(),
        });
        if let TransferPlan::Split { split, .. } = &plan {
            metadata["split_token_id"] = json!(split.token_id);
        }

        insert_ledger_entry(
            &mut tx,
            LedgerEntry {
                token_id: token.id,
                from_user_id: Some(from_user_id),
                to_user_id: recipient_id,
                transaction_type: TransactionType::Transfer,
                amount_kwh,
                transaction_hash: &hash,
                metadata,
            },
        )
        .await?;

        let (mode, split_token_id) = match plan {
            TransferPlan::Reassign { new_owner } => {
                sqlx::query("UPDATE energy_tokens SET created_by = $2 WHERE id = $1")
                    .bind(token.id)
                    .bind(new_owner)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to reassign token")?;
                (TransferMode::Full, None)
            }
            TransferPlan::Split {
                split,
                remaining_kwh,
                remaining_value,
            } => {
                let created = insert_token(&mut tx, &split).await?;
                update_balance(
                    &mut tx,
                    token.id,
                    remaining_kwh,
                    remaining_value,
                    TokenStatus::Available,
                )
                .await?;
                (TransferMode::Split, Some(created.id))
            }
        };

        tx.commit().await?;

        tracing::info!(
            "Transferred {} kWh of token {} from {} to {} ({:?}, tx {})",
            amount_kwh,
            token.token_id,
            from_user_id,
            recipient_id,
            mode,
            hash
        );

        Ok(TransferResponse {
            transaction_hash: hash,
            mode,
            token_id: token.id,
            recipient_id,
            amount_kwh,
            split_token_id,
        })
    }

    /// Retires energy from a token the caller owns; a token burned to zero becomes `sold`.
    pub async fn burn(
        &self,
        token_id: Uuid,
        owner_id: Uuid,
        amount_kwh: f64,
    ) -> Result<BurnResponse, AppError> {
        validate_amount(amount_kwh)?;

        let mut tx = self.pool.begin().await?;

        let token = lock_token(&mut tx, token_id).await?;
        check_transfer(&token, owner_id, amount_kwh).map_err(denial_error)?;

        let plan = plan_burn(&token, amount_kwh);
        let hash = generate_transaction_hash(token.id, Some(owner_id), owner_id, amount_kwh);

        insert_ledger_entry(
            &mut tx,
            LedgerEntry {
                token_id: token.id,
                from_user_id: Some(owner_id),
                to_user_id: owner_id,
                transaction_type: TransactionType::Burn,
                amount_kwh,
                transaction_hash: &hash,
                metadata: json!({ "remaining_kwh": plan.remaining_kwh }),
            },
        )
        .await?;
        update_balance(
            &mut tx,
            token.id,
            plan.remaining_kwh,
            plan.remaining_value,
            plan.status,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Burned {} kWh of token {} (remaining {}, status {})",
            amount_kwh,
            token.token_id,
            plan.remaining_kwh,
            plan.status
        );

        Ok(BurnResponse {
            transaction_hash: hash,
            token_id: token.id,
            remaining_kwh: plan.remaining_kwh,
            status: plan.status,
        })
    }

    pub async fn transactions(
        &self,
        user_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<TokenTransaction>, AppError> {
        sqlx::query_as::<_, TokenTransaction>(
            r#"
            SELECT * FROM token_transactions
            WHERE from_user_id = $1 OR to_user_id = $1
            ORDER BY block_timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(clamp_transactions_limit(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list token transactions")
    }

    /// Transfers received by the user.
    pub async fn purchases(&self, user_id: Uuid) -> Result<Vec<TokenTransaction>, AppError> {
        sqlx::query_as::<_, TokenTransaction>(
            r#"
            SELECT * FROM token_transactions
            WHERE to_user_id = $1 AND transaction_type = $2
            ORDER BY block_timestamp DESC
            "#,
        )
        .bind(user_id)
        .bind(TransactionType::Transfer.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list purchases")
    }
}

async fn lock_token(
    tx: &mut Transaction<'_, Postgres>,
    token_id: Uuid,
) -> Result<EnergyToken, AppError> {
    sqlx::query_as::<_, EnergyToken>("SELECT * FROM energy_tokens WHERE id = $1 FOR UPDATE")
        .bind(token_id)
        .fetch_optional(&mut **tx)
        .await
        .context("Failed to lock token")?
        .ok_or_else(|| AppError::NotFound("Token não encontrado".to_string()))
}

/// Resolves a recipient to a user id. A display name must match exactly one profile.
async fn resolve_recipient(
    tx: &mut Transaction<'_, Postgres>,
    recipient: &RecipientRef,
) -> Result<Uuid, AppError> {
    let matches: Vec<Uuid> = match recipient {
        RecipientRef::UserId { user_id } => {
            sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&mut **tx)
                .await
                .context("Failed to look up recipient")?
        }
        RecipientRef::FullName { full_name } => {
            sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM profiles WHERE full_name = $1 LIMIT 2")
                .bind(full_name.trim())
                .fetch_all(&mut **tx)
                .await
                .context("Failed to look up recipient")?
        }
    };

    match matches.as_slice() {
        [only] => Ok(*only),
        [] => Err(AppError::NotFound(
            "Usuário destinatário não encontrado".to_string(),
        )),
        _ => Err(AppError::Conflict(
            "Mais de um usuário com esse nome; informe o user_id do destinatário".to_string(),
        )),
    }
}

async fn insert_token(
    tx: &mut Transaction<'_, Postgres>,
    token: &NewToken,
) -> Result<EnergyToken, AppError> {
    sqlx::query_as::<_, EnergyToken>(
        r#"
        INSERT INTO energy_tokens
            (token_id, farm_id, farm_name, amount_kwh, price_per_kwh, total_value, status, created_by, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(&token.token_id)
    .bind(&token.farm_id)
    .bind(&token.farm_name)
    .bind(token.amount_kwh)
    .bind(token.price_per_kwh)
    .bind(token.total_value)
    .bind(TokenStatus::Available.as_str())
    .bind(token.owner)
    .bind(&token.metadata)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("Token {} already exists", token.token_id))
        }
        _ => AppError::DatabaseError(e),
    })
}

async fn update_balance(
    tx: &mut Transaction<'_, Postgres>,
    token_id: Uuid,
    amount_kwh: f64,
    total_value: f64,
    status: TokenStatus,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE energy_tokens SET amount_kwh = $2, total_value = $3, status = $4 WHERE id = $1",
    )
    .bind(token_id)
    .bind(amount_kwh)
    .bind(total_value)
    .bind(status.as_str())
    .execute(&mut **tx)
    .await
    .context("Failed to update token balance")?;
    Ok(())
}

async fn insert_ledger_entry(
    tx: &mut Transaction<'_, Postgres>,
    entry: LedgerEntry<'_>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO token_transactions
            (token_id, from_user_id, to_user_id, transaction_type, amount_kwh, transaction_hash, status, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(entry.token_id)
    .bind(entry.from_user_id)
    .bind(entry.to_user_id)
    .bind(entry.transaction_type.as_str())
    .bind(entry.amount_kwh)
    .bind(entry.transaction_hash)
    .bind(CONFIRMED)
    .bind(&entry.metadata)
    .execute(&mut **tx)
    .await
    .context("Failed to record token transaction")?;
    Ok(())
}
