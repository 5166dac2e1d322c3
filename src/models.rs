use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Declares a TEXT-backed status enum with `as_str`, `Display` and `FromStr`.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

text_enum!(
    /// Lifecycle of an uploaded energy bill.
    BillStatus {
        PendingUpload => "pending_upload",
        Processing => "processing",
        Validated => "validated",
        Invalid => "invalid",
    }
);

text_enum!(
    /// Lifecycle of an open-finance consent.
    ConnectionStatus {
        Pending => "pending",
        Connected => "connected",
        Expired => "expired",
    }
);

text_enum!(
    CreditStatus {
        Pending => "pending",
        Analyzing => "analyzing",
        Approved => "approved",
        Rejected => "rejected",
        RequiresMoreInfo => "requires_more_info",
    }
);

text_enum!(
    TokenStatus {
        Available => "available",
        Reserved => "reserved",
        Sold => "sold",
    }
);

text_enum!(
    TransactionType {
        Mint => "mint",
        Transfer => "transfer",
        Burn => "burn",
    }
);

text_enum!(
    /// Platform roles, one row per role in `user_roles`.
    AppRole {
        ClienteGero => "cliente_gero",
        ClienteAssino => "cliente_assino",
        Instalador => "instalador",
        AdminBanco => "admin_banco",
        GestorCooperativa => "gestor_cooperativa",
        ParceiroFinanceiro => "parceiro_financeiro",
        GestorDistribuicao => "gestor_distribuicao",
    }
);

text_enum!(
    TermStatus {
        Pending => "pending",
        Signed => "signed",
    }
);

// ============ Database Models ============

/// An uploaded energy bill and the metrics derived from it.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct EnergyBill {
    pub id: Uuid,
    pub user_id: Uuid,
    pub file_url: Option<String>,
    pub status: String,
    #[schema(value_type = Option<Object>)]
    pub extracted_data: Option<Value>,
    pub average_consumption: Option<f64>,
    pub average_payment: Option<f64>,
    pub payment_history_months: Option<i32>,
    pub on_time_payments: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct FinancialConnection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bank_code: String,
    pub connection_status: String,
    pub consent_id: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub financial_data: Option<Value>,
    pub connected_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Current credit analysis of a user (one row per user).
#[derive(Debug, Clone, FromRow)]
pub struct CreditAnalysis {
    pub id: Uuid,
    pub user_id: Uuid,
    pub score: Option<i32>,
    pub status: String,
    pub approved_amount: Option<BigDecimal>,
    pub interest_rate: Option<BigDecimal>,
    pub analysis_data: Option<Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One entry of the append-only analysis log.
#[derive(Debug, Clone, FromRow)]
pub struct CreditAnalysisRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub score: i32,
    pub status: String,
    pub approved_amount: BigDecimal,
    pub interest_rate: BigDecimal,
    pub analysis_data: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct EnergyToken {
    pub id: Uuid,
    pub token_id: String,
    pub farm_id: String,
    pub farm_name: String,
    pub amount_kwh: f64,
    pub price_per_kwh: f64,
    pub total_value: Option<f64>,
    pub status: String,
    pub created_by: Uuid,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Immutable ledger entry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct TokenTransaction {
    pub id: Uuid,
    pub token_id: Uuid,
    pub from_user_id: Option<Uuid>,
    pub to_user_id: Uuid,
    pub transaction_type: String,
    pub amount_kwh: f64,
    pub transaction_hash: String,
    pub status: String,
    pub block_timestamp: DateTime<Utc>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct CooperativeTerm {
    pub id: Uuid,
    pub user_id: Uuid,
    pub term_version: String,
    pub term_content: String,
    pub status: String,
    pub signed_at: Option<DateTime<Utc>>,
    pub signature_hash: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub signature_metadata: Option<Value>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============ Credit API ============

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateBillRequest {
    pub file_url: Option<String>,
    pub file_name: String,
    pub file_type: String,
    /// Declared upload size in bytes.
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeBillRequest {
    pub bill_id: Uuid,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateConnectionRequest {
    pub bank_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOpenFinanceRequest {
    pub connection_id: Uuid,
}

/// Body returned by both analysis endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditAnalysisResponse {
    pub success: bool,
    pub score: u8,
    pub status: CreditStatus,
    pub approved_amount: i64,
    pub interest_rate: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreditAnalysisView {
    pub user_id: Uuid,
    pub score: Option<i32>,
    pub status: String,
    pub approved_amount: Option<f64>,
    pub interest_rate: Option<f64>,
    #[schema(value_type = Option<Object>)]
    pub analysis_data: Option<Value>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<CreditAnalysis> for CreditAnalysisView {
    fn from(row: CreditAnalysis) -> Self {
        Self {
            user_id: row.user_id,
            score: row.score,
            status: row.status,
            approved_amount: row.approved_amount.as_ref().and_then(|v| v.to_f64()),
            interest_rate: row.interest_rate.as_ref().and_then(|v| v.to_f64()),
            analysis_data: row.analysis_data,
            updated_at: row.updated_at.or(row.created_at),
        }
    }
}

impl From<CreditAnalysisRecord> for CreditAnalysisView {
    fn from(row: CreditAnalysisRecord) -> Self {
        Self {
            user_id: row.user_id,
            score: Some(row.score),
            status: row.status,
            approved_amount: row.approved_amount.to_f64(),
            interest_rate: row.interest_rate.to_f64(),
            analysis_data: Some(row.analysis_data),
            updated_at: Some(row.created_at),
        }
    }
}

// ============ Token API ============

/// Who receives a transfer: an explicit user id, or a profile display name
/// that must match exactly one profile.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(untagged)]
pub enum RecipientRef {
    UserId { user_id: Uuid },
    FullName { full_name: String },
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TransferRequest {
    pub recipient: RecipientRef,
    pub amount_kwh: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    Full,
    Split,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferResponse {
    pub transaction_hash: String,
    pub mode: TransferMode,
    pub token_id: Uuid,
    pub recipient_id: Uuid,
    pub amount_kwh: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_token_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AmountRequest {
    pub amount_kwh: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ValidateTransferResponse {
    pub valid: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MintTokenRequest {
    pub token_id: Option<String>,
    pub farm_id: Option<String>,
    pub farm_name: String,
    pub amount_kwh: f64,
    pub price_per_kwh: f64,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MintTokenResponse {
    pub token: EnergyToken,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BurnResponse {
    pub transaction_hash: String,
    pub token_id: Uuid,
    pub remaining_kwh: f64,
    pub status: TokenStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MarketplaceSort {
    #[default]
    Recent,
    PriceAsc,
    PriceDesc,
    KwhAsc,
    KwhDesc,
}

impl MarketplaceSort {
    pub fn order_by(&self) -> &'static str {
        match self {
            MarketplaceSort::Recent => "created_at DESC",
            MarketplaceSort::PriceAsc => "price_per_kwh ASC, created_at DESC",
            MarketplaceSort::PriceDesc => "price_per_kwh DESC, created_at DESC",
            MarketplaceSort::KwhAsc => "amount_kwh ASC, created_at DESC",
            MarketplaceSort::KwhDesc => "amount_kwh DESC, created_at DESC",
        }
    }
}

/// Marketplace filters. Missing bounds fall back to the UI defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketplaceQuery {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_kwh: Option<f64>,
    pub max_kwh: Option<f64>,
    pub search: Option<String>,
    #[serde(default)]
    pub sort: MarketplaceSort,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PurchasesResponse {
    pub purchases: Vec<TokenTransaction>,
    pub total_kwh: f64,
}

// ============ Chat API ============

text_enum!(
    ChatRole {
        System => "system",
        User => "user",
        Assistant => "assistant",
    }
);

/// A turn as forwarded to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// A turn as sent by the client. The role stays free text until validated.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChatTurn {
    #[schema(example = "user")]
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
}

// ============ Misc API ============

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SignTermRequest {
    #[serde(default)]
    pub agreed: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RolesResponse {
    pub user_id: Uuid,
    pub roles: Vec<AppRole>,
    pub primary_role: Option<AppRole>,
}
