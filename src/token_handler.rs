use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::ledger::NewToken;
use crate::models::{
    AmountRequest, AppRole, BurnResponse, EnergyToken, MarketplaceQuery, MintTokenRequest,
    MintTokenResponse, PurchasesResponse, TokenTransaction, TransactionsQuery, TransferRequest,
    TransferResponse, ValidateTransferResponse,
};
use crate::token_storage::{MarketplaceFilter, TokenLedger};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Roles allowed to mint energy tokens.
pub const MINTER_ROLES: [AppRole; 2] = [AppRole::GestorDistribuicao, AppRole::GestorCooperativa];

pub fn total_kwh(purchases: &[TokenTransaction]) -> f64 {
    purchases.iter().map(|p| p.amount_kwh).sum()
}

/// GET /api/v1/tokens
///
/// Marketplace of available tokens.
#[utoipa::path(
    get,
    path = "/api/v1/tokens",
    params(
        ("min_price" = Option<f64>, Query, description = "Minimum price per kWh (default 0)"),
        ("max_price" = Option<f64>, Query, description = "Maximum price per kWh (default 10000)"),
        ("min_kwh" = Option<f64>, Query, description = "Minimum amount (default 0)"),
        ("max_kwh" = Option<f64>, Query, description = "Maximum amount (default 100000)"),
        ("search" = Option<String>, Query, description = "Farm name substring"),
        ("sort" = Option<crate::models::MarketplaceSort>, Query, description = "Sort order (default recent)")
    ),
    responses(
        (status = 200, description = "Available tokens", body = [EnergyToken]),
        (status = 400, description = "Invalid filters")
    ),
    tag = "tokens"
)]
pub async fn list_marketplace(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MarketplaceQuery>,
) -> Result<Json<Vec<EnergyToken>>, AppError> {
    let filter = MarketplaceFilter::from_query(&query)?;
    tracing::debug!("GET /tokens - filter: {:?}", filter);

    let tokens = TokenLedger::new(state.db.clone()).marketplace(&filter).await?;
    Ok(Json(tokens))
}

/// GET /api/v1/tokens/mine
#[utoipa::path(
    get,
    path = "/api/v1/tokens/mine",
    responses((status = 200, description = "Caller's available tokens", body = [EnergyToken])),
    security(("bearer_auth" = [])),
    tag = "tokens"
)]
pub async fn list_my_tokens(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<EnergyToken>>, AppError> {
    let tokens = TokenLedger::new(state.db.clone())
        .owned_by(user.user_id)
        .await?;
    Ok(Json(tokens))
}

/// POST /api/v1/tokens
///
/// Mints a token for the caller. Distribution and cooperative managers only.
#[utoipa::path(
    post,
    path = "/api/v1/tokens",
    request_body = MintTokenRequest,
    responses(
        (status = 201, description = "Token minted", body = MintTokenResponse),
        (status = 400, description = "Invalid amount or price"),
        (status = 403, description = "Caller cannot mint"),
        (status = 409, description = "Token id already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "tokens"
)]
pub async fn mint_token(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<MintTokenRequest>,
) -> Result<(StatusCode, Json<MintTokenResponse>), AppError> {
    tracing::info!(
        "POST /tokens - user {} minting {} kWh for {}",
        user.user_id,
        payload.amount_kwh,
        payload.farm_name
    );
    state.roles.require_any(user.user_id, &MINTER_ROLES).await?;

    let token = NewToken::mint(&payload, user.user_id, Utc::now())?;
    let minted = TokenLedger::new(state.db.clone()).mint(&token).await?;

    Ok((StatusCode::CREATED, Json(minted)))
}

/// POST /api/v1/tokens/{id}/validate-transfer
#[utoipa::path(
    post,
    path = "/api/v1/tokens/{id}/validate-transfer",
    params(("id" = Uuid, Path, description = "Token row id")),
    request_body = AmountRequest,
    responses((status = 200, description = "Whether the caller may transfer the amount", body = ValidateTransferResponse)),
    security(("bearer_auth" = [])),
    tag = "tokens"
)]
pub async fn validate_transfer(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(token_id): Path<Uuid>,
    Json(payload): Json<AmountRequest>,
) -> Result<Json<ValidateTransferResponse>, AppError> {
    let valid = TokenLedger::new(state.db.clone())
        .validate_transfer(token_id, user.user_id, payload.amount_kwh)
        .await?;
    Ok(Json(ValidateTransferResponse { valid }))
}

/// POST /api/v1/tokens/{id}/transfer
///
/// Moves energy to another user: the whole token when the full balance is sent,
/// otherwise a split token for the recipient.
#[utoipa::path(
    post,
    path = "/api/v1/tokens/{id}/transfer",
    params(("id" = Uuid, Path, description = "Token row id")),
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer recorded", body = TransferResponse),
        (status = 400, description = "Invalid amount or insufficient balance"),
        (status = 403, description = "Caller does not own the token"),
        (status = 404, description = "Unknown token or recipient"),
        (status = 409, description = "Token unavailable or ambiguous recipient")
    ),
    security(("bearer_auth" = [])),
    tag = "tokens"
)]
pub async fn transfer_token(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(token_id): Path<Uuid>,
    Json(payload): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, AppError> {
    tracing::info!(
        "POST /tokens/{}/transfer - {} kWh from {}",
        token_id,
        payload.amount_kwh,
        user.user_id
    );

    let response = TokenLedger::new(state.db.clone())
        .transfer(token_id, user.user_id, &payload.recipient, payload.amount_kwh)
        .await?;
    Ok(Json(response))
}

/// POST /api/v1/tokens/{id}/burn
#[utoipa::path(
    post,
    path = "/api/v1/tokens/{id}/burn",
    params(("id" = Uuid, Path, description = "Token row id")),
    request_body = AmountRequest,
    responses(
        (status = 200, description = "Energy retired", body = BurnResponse),
        (status = 400, description = "Invalid amount or insufficient balance"),
        (status = 403, description = "Caller does not own the token"),
        (status = 404, description = "Unknown token")
    ),
    security(("bearer_auth" = [])),
    tag = "tokens"
)]
pub async fn burn_token(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(token_id): Path<Uuid>,
    Json(payload): Json<AmountRequest>,
) -> Result<Json<BurnResponse>, AppError> {
    tracing::info!(
        "POST /tokens/{}/burn - {} kWh by {}",
        token_id,
        payload.amount_kwh,
        user.user_id
    );

    let response = TokenLedger::new(state.db.clone())
        .burn(token_id, user.user_id, payload.amount_kwh)
        .await?;
    Ok(Json(response))
}

/// GET /api/v1/transactions
#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    params(("limit" = Option<i64>, Query, description = "1..=100, default 20")),
    responses((status = 200, description = "Caller's ledger entries, newest first", body = [TokenTransaction])),
    security(("bearer_auth" = [])),
    tag = "tokens"
)]
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Vec<TokenTransaction>>, AppError> {
    let transactions = TokenLedger::new(state.db.clone())
        .transactions(user.user_id, query.limit)
        .await?;
    Ok(Json(transactions))
}

/// GET /api/v1/purchases
#[utoipa::path(
    get,
    path = "/api/v1/purchases",
    responses((status = 200, description = "Transfers received by the caller", body = PurchasesResponse)),
    security(("bearer_auth" = [])),
    tag = "tokens"
)]
pub async fn list_purchases(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<PurchasesResponse>, AppError> {
    let purchases = TokenLedger::new(state.db.clone())
        .purchases(user.user_id)
        .await?;
    Ok(Json(PurchasesResponse {
        total_kwh: total_kwh(&purchases),
        purchases,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purchase(amount_kwh: f64) -> TokenTransaction {
        TokenTransaction {
            id: Uuid::new_v4(),
            token_id: Uuid::new_v4(),
            from_user_id: Some(Uuid::new_v4()),
            to_user_id: Uuid::new_v4(),
            transaction_type: "transfer".to_string(),
            amount_kwh,
            transaction_hash: "0xabc".to_string(),
            status: "confirmed".to_string(),
            block_timestamp: Utc::now(),
            metadata: None,
        }
    }

    #[test]
    fn test_total_kwh() {
        assert_eq!(total_kwh(&[]), 0.0);
        assert_eq!(total_kwh(&[purchase(12.5), purchase(7.5)]), 20.0);
    }

    #[test]
    fn test_minter_roles() {
        assert!(MINTER_ROLES.contains(&AppRole::GestorDistribuicao));
        assert!(!MINTER_ROLES.contains(&AppRole::ClienteAssino));
    }
}
