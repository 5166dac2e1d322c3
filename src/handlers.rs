use crate::auth::{primary_role, AuthUser, RoleDirectory};
use crate::config::Config;
use crate::credit_sources::{BillDocument, BillExtractor, FinancialDataProvider};
use crate::db_storage::CreditStorage;
use crate::errors::{AppError, ResultExt};
use crate::gateway_client::AiGatewayClient;
use crate::models::*;
use crate::roster::GeneratorRoster;
use crate::scoring::{bill_decision, financial_decision, BillMetrics, CreditDecision};
use crate::simulator::{simulate, SimulationRequest, SimulationResult};
use crate::terms::{SignatureMetadata, TermStorage};
use crate::validation::{
    validate_bank_code, validate_bill_file, validate_br_phone, validate_full_name,
};
use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// LLM gateway client used by the chat assistant.
    pub gateway_client: AiGatewayClient,
    /// Generators the chat assistant matches against.
    pub roster: Arc<GeneratorRoster>,
    /// Reads consumption and payment history from uploaded bills.
    pub bill_extractor: Arc<dyn BillExtractor>,
    /// Fetches account data through an open-finance consent.
    pub financial_provider: Arc<dyn FinancialDataProvider>,
    /// Cached `user_roles` lookups.
    pub roles: RoleDirectory,
}

fn analysis_response(decision: &CreditDecision) -> CreditAnalysisResponse {
    CreditAnalysisResponse {
        success: true,
        score: decision.score,
        status: decision.status,
        approved_amount: decision.approved_amount,
        interest_rate: decision.interest_rate,
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "solar-credit-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/v1/energy-bills
///
/// Registers an uploaded energy bill; analysis runs separately.
#[utoipa::path(
    post,
    path = "/api/v1/energy-bills",
    request_body = CreateBillRequest,
    responses(
        (status = 201, description = "Bill registered", body = EnergyBill),
        (status = 400, description = "Unsupported file type or size"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "credit"
)]
pub async fn create_energy_bill(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CreateBillRequest>,
) -> Result<(StatusCode, Json<EnergyBill>), AppError> {
    tracing::info!(
        "POST /energy-bills - user {} file {} ({})",
        user.user_id,
        payload.file_name,
        payload.file_type
    );
    validate_bill_file(&payload.file_type, payload.file_size)?;

    let bill = CreditStorage::new(state.db.clone())
        .create_bill(user.user_id, payload.file_url.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(bill)))
}

/// POST /api/v1/analyze-energy-bill
///
/// Scores the caller from the bill's consumption and payment history and stores
/// the analysis.
#[utoipa::path(
    post,
    path = "/api/v1/analyze-energy-bill",
    request_body = AnalyzeBillRequest,
    responses(
        (status = 200, description = "Analysis stored", body = CreditAnalysisResponse),
        (status = 400, description = "Bill without history"),
        (status = 404, description = "Unknown bill"),
        (status = 500, description = "Analysis failed")
    ),
    security(("bearer_auth" = [])),
    tag = "credit"
)]
pub async fn analyze_energy_bill(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<AnalyzeBillRequest>,
) -> Result<Json<CreditAnalysisResponse>, AppError> {
    tracing::info!("Processing energy bill: {}", payload.bill_id);

    let storage = CreditStorage::new(state.db.clone());
    let bill = storage
        .find_user_bill(payload.bill_id, user.user_id)
        .await?;

    let document = BillDocument {
        bill_id: bill.id,
        file_name: payload.file_name,
        file_type: payload.file_type,
    };
    let extracted = state
        .bill_extractor
        .extract(&document)
        .await
        .context("Bill extraction failed")?;

    let metrics = BillMetrics::from_history(&extracted.monthly_consumption, &extracted.payment_history)?;
    let decision = bill_decision(&metrics);

    storage
        .record_bill_analysis(&bill, &extracted, &metrics, &decision)
        .await?;

    tracing::info!(
        "Bill {} analyzed: score={} status={} amount={} rate={}",
        bill.id,
        decision.score,
        decision.status,
        decision.approved_amount,
        decision.interest_rate
    );
    Ok(Json(analysis_response(&decision)))
}

/// POST /api/v1/open-finance/connections
#[utoipa::path(
    post,
    path = "/api/v1/open-finance/connections",
    request_body = CreateConnectionRequest,
    responses(
        (status = 201, description = "Pending connection created", body = FinancialConnection),
        (status = 400, description = "Invalid bank code")
    ),
    security(("bearer_auth" = [])),
    tag = "credit"
)]
pub async fn create_open_finance_connection(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CreateConnectionRequest>,
) -> Result<(StatusCode, Json<FinancialConnection>), AppError> {
    let bank_code = validate_bank_code(payload.bank_code.as_deref())?;

    let connection = CreditStorage::new(state.db.clone())
        .create_connection(user.user_id, &bank_code)
        .await?;

    Ok((StatusCode::CREATED, Json(connection)))
}

/// POST /api/v1/connect-open-finance
///
/// Completes the consent, scores the caller from account data and stores the analysis.
#[utoipa::path(
    post,
    path = "/api/v1/connect-open-finance",
    request_body = ConnectOpenFinanceRequest,
    responses(
        (status = 200, description = "Analysis stored", body = CreditAnalysisResponse),
        (status = 404, description = "Unknown connection"),
        (status = 500, description = "Analysis failed")
    ),
    security(("bearer_auth" = [])),
    tag = "credit"
)]
pub async fn connect_open_finance(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<ConnectOpenFinanceRequest>,
) -> Result<Json<CreditAnalysisResponse>, AppError> {
    tracing::info!("Connecting Open Finance: {}", payload.connection_id);

    let storage = CreditStorage::new(state.db.clone());
    let connection = storage
        .find_user_connection(payload.connection_id, user.user_id)
        .await?;

    let snapshot = state
        .financial_provider
        .fetch(&connection)
        .await
        .context("Open finance fetch failed")?;
    let decision = financial_decision(&snapshot);

    storage
        .record_open_finance_analysis(&connection, &snapshot, &decision, Utc::now())
        .await?;

    tracing::info!(
        "Open finance {} analyzed: score={} status={} amount={}",
        connection.id,
        decision.score,
        decision.status,
        decision.approved_amount
    );
    Ok(Json(analysis_response(&decision)))
}

/// GET /api/v1/credit-analysis
#[utoipa::path(
    get,
    path = "/api/v1/credit-analysis",
    responses(
        (status = 200, description = "Current analysis", body = CreditAnalysisView),
        (status = 404, description = "No analysis yet")
    ),
    security(("bearer_auth" = [])),
    tag = "credit"
)]
pub async fn get_credit_analysis(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<CreditAnalysisView>, AppError> {
    let analysis = CreditStorage::new(state.db.clone())
        .current_analysis(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No credit analysis yet".to_string()))?;

    Ok(Json(analysis.into()))
}

/// GET /api/v1/credit-analysis/history
#[utoipa::path(
    get,
    path = "/api/v1/credit-analysis/history",
    responses((status = 200, description = "Every analysis, newest first", body = [CreditAnalysisView])),
    security(("bearer_auth" = [])),
    tag = "credit"
)]
pub async fn get_credit_analysis_history(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<CreditAnalysisView>>, AppError> {
    let history = CreditStorage::new(state.db.clone())
        .analysis_history(user.user_id)
        .await?;

    Ok(Json(history.into_iter().map(Into::into).collect()))
}

/// GET /api/v1/me/roles
#[utoipa::path(
    get,
    path = "/api/v1/me/roles",
    responses((status = 200, description = "Roles of the caller", body = RolesResponse)),
    security(("bearer_auth" = [])),
    tag = "profile"
)]
pub async fn get_my_roles(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<RolesResponse>, AppError> {
    let roles = state.roles.roles(user.user_id).await?;

    Ok(Json(RolesResponse {
        user_id: user.user_id,
        primary_role: primary_role(&roles),
        roles: roles.as_ref().clone(),
    }))
}

/// PUT /api/v1/profile
#[utoipa::path(
    put,
    path = "/api/v1/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile saved", body = Profile),
        (status = 400, description = "Blank name or invalid phone")
    ),
    security(("bearer_auth" = [])),
    tag = "profile"
)]
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    if payload.full_name.is_none() && payload.phone.is_none() {
        return Err(AppError::BadRequest(
            "Nothing to update: send full_name and/or phone".to_string(),
        ));
    }
    let full_name = payload.full_name.as_deref().map(validate_full_name).transpose()?;
    let phone = payload.phone.as_deref().map(validate_br_phone).transpose()?;

    let profile = sqlx::query_as::<_, Profile>(
        r#"
        INSERT INTO profiles (user_id, full_name, phone)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id) DO UPDATE
        SET full_name = COALESCE(EXCLUDED.full_name, profiles.full_name),
            phone = COALESCE(EXCLUDED.phone, profiles.phone),
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(user.user_id)
    .bind(&full_name)
    .bind(&phone)
    .fetch_one(&state.db)
    .await
    .context("Failed to save profile")?;

    tracing::info!("Profile updated for user {}", user.user_id);
    Ok(Json(profile))
}

/// GET /api/v1/cooperative-terms/current
#[utoipa::path(
    get,
    path = "/api/v1/cooperative-terms/current",
    responses(
        (status = 200, description = "Latest term of the caller", body = CooperativeTerm),
        (status = 404, description = "No term yet")
    ),
    security(("bearer_auth" = [])),
    tag = "cooperative"
)]
pub async fn get_current_term(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<CooperativeTerm>, AppError> {
    TermStorage::new(state.db.clone())
        .current(user.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Nenhum termo de adesão encontrado".to_string()))
}

/// First `X-Forwarded-For` hop, else the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// POST /api/v1/cooperative-terms/sign
#[utoipa::path(
    post,
    path = "/api/v1/cooperative-terms/sign",
    request_body = SignTermRequest,
    responses(
        (status = 200, description = "Term signed", body = CooperativeTerm),
        (status = 400, description = "Terms not accepted"),
        (status = 409, description = "Already signed")
    ),
    security(("bearer_auth" = [])),
    tag = "cooperative"
)]
pub async fn sign_term(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<SignTermRequest>,
) -> Result<Json<CooperativeTerm>, AppError> {
    if !payload.agreed {
        return Err(AppError::BadRequest(
            "Você precisa concordar com os termos para continuar".to_string(),
        ));
    }

    let now = Utc::now();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let metadata = SignatureMetadata::new(
        now,
        user.user_id,
        user.email.clone(),
        user_agent,
        client_ip(&headers, peer.map(|ConnectInfo(addr)| addr)),
    );

    let term = TermStorage::new(state.db.clone()).sign(&metadata, now).await?;
    Ok(Json(term))
}

/// POST /api/v1/simulator
#[utoipa::path(
    post,
    path = "/api/v1/simulator",
    request_body = SimulationRequest,
    responses(
        (status = 200, description = "Savings estimate", body = SimulationResult),
        (status = 400, description = "Consumption out of range")
    ),
    tag = "simulator"
)]
pub async fn run_simulation(
    Json(payload): Json<SimulationRequest>,
) -> Result<Json<SimulationResult>, AppError> {
    Ok(Json(simulate(payload.monthly_consumption_kwh)?))
}
