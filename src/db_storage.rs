use crate::credit_sources::ExtractedBill;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    BillStatus, ConnectionStatus, CreditAnalysis, CreditAnalysisRecord, EnergyBill,
    FinancialConnection,
};
use crate::scoring::{BillMetrics, CreditDecision, FinancialSnapshot, PAYMENT_CAPACITY_RATIO};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use sqlx::{PgPool, Postgres, Transaction};
use std::str::FromStr;
use uuid::Uuid;

/// Open-finance consents last 90 days.
pub const CONNECTION_VALIDITY_DAYS: i64 = 90;

/// Builds the `analysis_data` metadata for a bill-based analysis.
pub fn bill_analysis_data(bill_id: Uuid, metrics: &BillMetrics) -> Value {
    json!({
        "source": "energy_bill",
        "bill_id": bill_id,
        "metrics": {
            "on_time_payment_rate": metrics.on_time_rate() * 100.0,
            "average_monthly_payment": metrics.average_payment,
            "payment_capacity": metrics.average_payment * PAYMENT_CAPACITY_RATIO,
        },
    })
}

/// Builds the `analysis_data` metadata for an open-finance analysis.
pub fn open_finance_analysis_data(connection_id: Uuid, snapshot: &FinancialSnapshot) -> Value {
    json!({
        "source": "open_finance",
        "connection_id": connection_id,
        "metrics": {
            "monthly_income": snapshot.monthly_income,
            "monthly_expenses": snapshot.monthly_expenses,
            "disposable_income": snapshot.disposable_income(),
            "credit_score": snapshot.credit_score,
        },
    })
}

pub fn connection_expiry(connected_at: DateTime<Utc>) -> DateTime<Utc> {
    connected_at + Duration::days(CONNECTION_VALIDITY_DAYS)
}

fn decimal(value: f64) -> Result<BigDecimal, AppError> {
    BigDecimal::from_str(&value.to_string())
        .map_err(|e| AppError::InternalError(format!("Invalid decimal {}: {}", value, e)))
}

/// Persistence for bills, open-finance connections and credit analyses.
pub struct CreditStorage {
    pool: PgPool,
}

impl CreditStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_bill(
        &self,
        user_id: Uuid,
        file_url: Option<&str>,
    ) -> Result<EnergyBill, AppError> {
        let bill = sqlx::query_as::<_, EnergyBill>(
            r#"
            INSERT INTO energy_bills (user_id, file_url, status)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(file_url)
        .bind(BillStatus::Processing.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to create energy bill")?;

        tracing::info!("Energy bill {} registered for user {}", bill.id, user_id);
        Ok(bill)
    }

    /// Loads a bill owned by `user_id`. Bills of other users are reported as missing.
    pub async fn find_user_bill(
        &self,
        bill_id: Uuid,
        user_id: Uuid,
    ) -> Result<EnergyBill, AppError> {
        sqlx::query_as::<_, EnergyBill>("SELECT * FROM energy_bills WHERE id = $1 AND user_id = $2")
            .bind(bill_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load energy bill")?
            .ok_or_else(|| AppError::NotFound(format!("Energy bill {} not found", bill_id)))
    }

    /// Marks the bill validated with its derived metrics and stores the analysis,
    /// all in one transaction.
    pub async fn record_bill_analysis(
        &self,
        bill: &EnergyBill,
        extracted: &ExtractedBill,
        metrics: &BillMetrics,
        decision: &CreditDecision,
    ) -> Result<(), AppError> {
        let extracted_json = serde_json::to_value(extracted)
            .map_err(|e| AppError::InternalError(format!("Failed to encode bill data: {}", e)))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE energy_bills
            SET status = $2,
                extracted_data = $3,
                average_consumption = $4,
                average_payment = $5,
                payment_history_months = $6,
                on_time_payments = $7,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(bill.id)
        .bind(BillStatus::Validated.as_str())
        .bind(&extracted_json)
        .bind(metrics.average_consumption)
        .bind(metrics.average_payment)
        .bind(metrics.total_months as i32)
        .bind(metrics.on_time_payments as i32)
        .execute(&mut *tx)
        .await
        .context("Failed to update energy bill")?;

        let analysis_data = bill_analysis_data(bill.id, metrics);
        store_analysis(&mut tx, bill.user_id, decision, &analysis_data).await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn create_connection(
        &self,
        user_id: Uuid,
        bank_code: &str,
    ) -> Result<FinancialConnection, AppError> {
        let connection = sqlx::query_as::<_, FinancialConnection>(
            r#"
            INSERT INTO open_finance_connections (user_id, bank_code, connection_status)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(bank_code)
        .bind(ConnectionStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to create open finance connection")?;

        tracing::info!(
            "Open finance connection {} created for user {} (bank {})",
            connection.id,
            user_id,
            bank_code
        );
        Ok(connection)
    }

    pub async fn find_user_connection(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
    ) -> Result<FinancialConnection, AppError> {
        sqlx::query_as::<_, FinancialConnection>(
            "SELECT * FROM open_finance_connections WHERE id = $1 AND user_id = $2",
        )
        .bind(connection_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load open finance connection")?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Open finance connection {} not found",
                connection_id
            ))
        })
    }

    /// Marks the connection connected (90-day consent) and stores the analysis atomically.
    pub async fn record_open_finance_analysis(
        &self,
        connection: &FinancialConnection,
        snapshot: &FinancialSnapshot,
        decision: &CreditDecision,
        connected_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let snapshot_json = serde_json::to_value(snapshot).map_err(|e| {
            AppError::InternalError(format!("Failed to encode financial data: {}", e))
        })?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE open_finance_connections
            SET connection_status = $2,
                financial_data = $3,
                connected_at = $4,
                expires_at = $5,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(connection.id)
        .bind(ConnectionStatus::Connected.as_str())
        .bind(&snapshot_json)
        .bind(connected_at)
        .bind(connection_expiry(connected_at))
        .execute(&mut *tx)
        .await
        .context("Failed to update open finance connection")?;

        let analysis_data = open_finance_analysis_data(connection.id, snapshot);
        store_analysis(&mut tx, connection.user_id, decision, &analysis_data).await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn current_analysis(&self, user_id: Uuid) -> Result<Option<CreditAnalysis>, AppError> {
        sqlx::query_as::<_, CreditAnalysis>("SELECT * FROM credit_analysis WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load credit analysis")
    }

    pub async fn analysis_history(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<CreditAnalysisRecord>, AppError> {
        sqlx::query_as::<_, CreditAnalysisRecord>(
            "SELECT * FROM credit_analysis_history WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load credit analysis history")
    }
}

/// Latest analysis wins in `credit_analysis`; every analysis is appended to the history log.
async fn store_analysis(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    decision: &CreditDecision,
    analysis_data: &Value,
) -> Result<(), AppError> {
    let approved_amount = BigDecimal::from(decision.approved_amount);
    let interest_rate = decimal(decision.interest_rate)?;

    sqlx::query(
        r#"
        INSERT INTO credit_analysis
            (user_id, score, status, approved_amount, interest_rate, analysis_data, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, now())
        ON CONFLICT (user_id) DO UPDATE
        SET score = EXCLUDED.score,
            status = EXCLUDED.status,
            approved_amount = EXCLUDED.approved_amount,
            interest_rate = EXCLUDED.interest_rate,
            analysis_data = EXCLUDED.analysis_data,
            updated_at = now()
        "#,
    )
    .bind(user_id)
    .bind(decision.score as i32)
    .bind(decision.status.as_str())
    .bind(&approved_amount)
    .bind(&interest_rate)
    .bind(analysis_data)
    .execute(&mut **tx)
    .await
    .context("Failed to upsert credit analysis")?;

    sqlx::query(
        r#"
        INSERT INTO credit_analysis_history
            (user_id, score, status, approved_amount, interest_rate, analysis_data)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(user_id)
    .bind(decision.score as i32)
    .bind(decision.status.as_str())
    .bind(&approved_amount)
    .bind(&interest_rate)
    .bind(analysis_data)
    .execute(&mut **tx)
    .await
    .context("Failed to append credit analysis history")?;

    tracing::info!(
        "Credit analysis stored for user {}: score={}, status={}, amount={}",
        user_id,
        decision.score,
        decision.status,
        decision.approved_amount
    );
    Ok(())
}
