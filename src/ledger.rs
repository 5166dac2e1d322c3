//! Energy-token ledger rules: transfer validation, transfer/burn planning and
//! transaction hashes. Everything here is pure; `token_storage` applies the plans
//! inside a database transaction.

use crate::errors::AppError;
use crate::models::{EnergyToken, MintTokenRequest, TokenStatus};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Remaining balances below this are treated as fully consumed.
pub const KWH_EPSILON: f64 = 1e-9;

/// Rejects non-numeric, zero and negative amounts before any storage work.
pub fn validate_amount(amount_kwh: f64) -> Result<(), AppError> {
    if !amount_kwh.is_finite() || amount_kwh <= 0.0 {
        return Err(AppError::BadRequest(
            "Digite uma quantidade válida de kWh".to_string(),
        ));
    }
    Ok(())
}

/// Why a transfer (or burn) from a token was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferDenial {
    InvalidAmount,
    NotOwner,
    NotAvailable(String),
    InsufficientBalance { available: f64, requested: f64 },
}

impl fmt::Display for TransferDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferDenial::InvalidAmount => write!(f, "amount must be a positive number"),
            TransferDenial::NotOwner => write!(f, "token is not owned by the sender"),
            TransferDenial::NotAvailable(status) => {
                write!(f, "token is not available (status {})", status)
            }
            TransferDenial::InsufficientBalance {
                available,
                requested,
            } => write!(
                f,
                "insufficient balance: {} kWh available, {} kWh requested",
                available, requested
            ),
        }
    }
}

/// Checks ownership, availability and balance for moving `amount_kwh` out of `token`.
pub fn check_transfer(
    token: &EnergyToken,
    from_user_id: Uuid,
    amount_kwh: f64,
) -> Result<(), TransferDenial> {
    if !amount_kwh.is_finite() || amount_kwh <= 0.0 {
        return Err(TransferDenial::InvalidAmount);
    }
    if token.created_by != from_user_id {
        return Err(TransferDenial::NotOwner);
    }
    if token.status != TokenStatus::Available.as_str() {
        return Err(TransferDenial::NotAvailable(token.status.clone()));
    }
    if token.amount_kwh < amount_kwh {
        return Err(TransferDenial::InsufficientBalance {
            available: token.amount_kwh,
            requested: amount_kwh,
        });
    }
    Ok(())
}

/// Boolean form of [`check_transfer`].
pub fn validate_token_transfer(token: &EnergyToken, from_user_id: Uuid, amount_kwh: f64) -> bool {
    check_transfer(token, from_user_id, amount_kwh).is_ok()
}

/// A token row to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewToken {
    pub token_id: String,
    pub farm_id: String,
    pub farm_name: String,
    pub amount_kwh: f64,
    pub price_per_kwh: f64,
    pub total_value: f64,
    pub owner: Uuid,
    pub metadata: Option<Value>,
}

impl NewToken {
    /// Validates a mint request and fills generated identifiers.
    pub fn mint(
        request: &MintTokenRequest,
        owner: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let farm_name = request.farm_name.trim();
        if farm_name.is_empty() {
            return Err(AppError::BadRequest("farm_name is required".to_string()));
        }
        validate_amount(request.amount_kwh)?;
        if !request.price_per_kwh.is_finite() || request.price_per_kwh <= 0.0 {
            return Err(AppError::BadRequest(
                "price_per_kwh must be a positive number".to_string(),
            ));
        }

        let token_id = match request.token_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("SOL-{}", now.timestamp_millis()),
        };
        let farm_id = match request.farm_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        Ok(Self {
            token_id,
            farm_id,
            farm_name: farm_name.to_string(),
            amount_kwh: request.amount_kwh,
            price_per_kwh: request.price_per_kwh,
            total_value: request.amount_kwh * request.price_per_kwh,
            owner,
            metadata: request.metadata.clone(),
        })
    }
}

/// What a validated transfer does to the token table.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferPlan {
    /// The whole remaining amount moves: the token changes owner, amounts untouched.
    Reassign { new_owner: Uuid },
    /// Part of the amount moves into a new token owned by the recipient.
    Split {
        split: NewToken,
        remaining_kwh: f64,
        remaining_value: f64,
    },
}

/// `"{original}-split-{unix millis}"`
pub fn split_token_id(original: &str, now: DateTime<Utc>) -> String {
    format!("{}-split-{}", original, now.timestamp_millis())
}

/// Plans a transfer that already passed [`check_transfer`].
pub fn plan_transfer(
    token: &EnergyToken,
    recipient: Uuid,
    amount_kwh: f64,
    now: DateTime<Utc>,
) -> TransferPlan {
    let remaining = token.amount_kwh - amount_kwh;
    if remaining.abs() < KWH_EPSILON {
        return TransferPlan::Reassign {
            new_owner: recipient,
        };
    }

    TransferPlan::Split {
        split: NewToken {
            token_id: split_token_id(&token.token_id, now),
            farm_id: token.farm_id.clone(),
            farm_name: token.farm_name.clone(),
            amount_kwh,
            price_per_kwh: token.price_per_kwh,
            total_value: amount_kwh * token.price_per_kwh,
            owner: recipient,
            metadata: Some(serde_json::json!({ "split_from": token.token_id })),
        },
        remaining_kwh: remaining,
        remaining_value: remaining * token.price_per_kwh,
    }
}

/// Balance left on a token after retiring energy from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurnPlan {
    pub remaining_kwh: f64,
    pub remaining_value: f64,
    pub status: TokenStatus,
}

/// Plans a burn that already passed [`check_transfer`]. A fully burned token is marked sold.
pub fn plan_burn(token: &EnergyToken, amount_kwh: f64) -> BurnPlan {
    let mut remaining = token.amount_kwh - amount_kwh;
    if remaining.abs() < KWH_EPSILON {
        remaining = 0.0;
    }
    BurnPlan {
        remaining_kwh: remaining,
        remaining_value: remaining * token.price_per_kwh,
        status: if remaining == 0.0 {
            TokenStatus::Sold
        } else {
            TokenStatus::Available
        },
    }
}

/// Hex SHA-256 over the transaction fields and a nonce, prefixed with `0x`.
pub fn hash_transaction(
    token_id: Uuid,
    from_user_id: Option<Uuid>,
    to_user_id: Uuid,
    amount_kwh: f64,
    at: DateTime<Utc>,
    nonce: Uuid,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token_id.as_bytes());
    hasher.update(from_user_id.unwrap_or_else(Uuid::nil).as_bytes());
    hasher.update(to_user_id.as_bytes());
    hasher.update(amount_kwh.to_be_bytes());
    hasher.update(at.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
    hasher.update(nonce.as_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

/// Fresh, unique transaction hash.
pub fn generate_transaction_hash(
    token_id: Uuid,
    from_user_id: Option<Uuid>,
    to_user_id: Uuid,
    amount_kwh: f64,
) -> String {
    hash_transaction(
        token_id,
        from_user_id,
        to_user_id,
        amount_kwh,
        Utc::now(),
        Uuid::new_v4(),
    )
}
