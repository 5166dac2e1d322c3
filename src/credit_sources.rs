//! Data sources feeding the scoring formulas.
//!
//! Bill OCR and the open-finance bank integration are not wired to real providers yet;
//! the mock implementations return fixed histories so the rest of the pipeline
//! (scoring, persistence, responses) runs end to end.

use crate::errors::AppError;
use crate::models::FinancialConnection;
use crate::scoring::{FinancialSnapshot, MonthlyConsumption, PaymentRecord};
use axum::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields read from an uploaded energy bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedBill {
    /// Masked CPF as printed on the bill.
    pub cpf: String,
    pub customer_name: String,
    pub installation_number: String,
    pub monthly_consumption: Vec<MonthlyConsumption>,
    pub payment_history: Vec<PaymentRecord>,
}

/// The uploaded document handed to an extractor.
#[derive(Debug, Clone)]
pub struct BillDocument {
    pub bill_id: Uuid,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
}

#[async_trait]
pub trait BillExtractor: Send + Sync {
    async fn extract(&self, document: &BillDocument) -> Result<ExtractedBill, AppError>;
}

#[async_trait]
pub trait FinancialDataProvider: Send + Sync {
    async fn fetch(&self, connection: &FinancialConnection)
        -> Result<FinancialSnapshot, AppError>;
}

fn record(month: &str, paid: bool, days_late: u32) -> PaymentRecord {
    PaymentRecord {
        month: month.to_string(),
        paid,
        days_late,
    }
}

fn sample(month: &str, kwh: f64, value: f64) -> MonthlyConsumption {
    MonthlyConsumption {
        month: month.to_string(),
        kwh,
        value,
    }
}

/// Returns a fixed six-month history (Nov/2024 back to Jun/2024, one payment two days late).
#[derive(Debug, Clone, Default)]
pub struct MockBillExtractor;

impl MockBillExtractor {
    pub fn sample_bill() -> ExtractedBill {
        ExtractedBill {
            cpf: "***.***.***-**".to_string(),
            customer_name: "Cliente Exemplo".to_string(),
            installation_number: "123456789".to_string(),
            monthly_consumption: vec![
                sample("Nov/2024", 250.0, 180.50),
                sample("Out/2024", 270.0, 195.30),
                sample("Set/2024", 240.0, 172.80),
                sample("Ago/2024", 260.0, 187.40),
                sample("Jul/2024", 255.0, 183.60),
                sample("Jun/2024", 245.0, 176.40),
            ],
            payment_history: vec![
                record("Nov/2024", true, 0),
                record("Out/2024", true, 0),
                record("Set/2024", true, 2),
                record("Ago/2024", true, 0),
                record("Jul/2024", true, 0),
                record("Jun/2024", true, 0),
            ],
        }
    }
}

#[async_trait]
impl BillExtractor for MockBillExtractor {
    async fn extract(&self, document: &BillDocument) -> Result<ExtractedBill, AppError> {
        tracing::debug!(
            "Mock OCR for bill {} ({:?}, {:?})",
            document.bill_id,
            document.file_name,
            document.file_type
        );
        Ok(Self::sample_bill())
    }
}

/// Returns a fixed snapshot (income 3200, expenses 2100, bureau 680, one loan payment 3 days late).
#[derive(Debug, Clone, Default)]
pub struct MockOpenFinanceProvider;

impl MockOpenFinanceProvider {
    pub fn sample_snapshot() -> FinancialSnapshot {
        FinancialSnapshot {
            account_balance: 2500.00,
            monthly_income: 3200.00,
            monthly_expenses: 2100.00,
            credit_score: 680,
            active_loans: 1,
            loan_payment_history: vec![
                record("Nov/2024", true, 0),
                record("Out/2024", true, 0),
                record("Set/2024", true, 0),
                record("Ago/2024", true, 3),
                record("Jul/2024", true, 0),
                record("Jun/2024", true, 0),
            ],
        }
    }
}

#[async_trait]
impl FinancialDataProvider for MockOpenFinanceProvider {
    async fn fetch(
        &self,
        connection: &FinancialConnection,
    ) -> Result<FinancialSnapshot, AppError> {
        tracing::debug!(
            "Mock open-finance fetch for connection {} (bank {})",
            connection.id,
            connection.bank_code
        );
        Ok(Self::sample_snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{bill_decision, financial_decision, BillMetrics};
    use crate::models::CreditStatus;

    #[tokio::test]
    async fn test_mock_bill_scores_as_documented() {
        let doc = BillDocument {
            bill_id: Uuid::new_v4(),
            file_name: Some("conta.pdf".into()),
            file_type: Some("application/pdf".into()),
        };
        let bill = MockBillExtractor.extract(&doc).await.unwrap();
        let metrics =
            BillMetrics::from_history(&bill.monthly_consumption, &bill.payment_history).unwrap();

        assert_eq!(metrics.on_time_payments, 5);
        assert_eq!(metrics.total_months, 6);
        assert!((metrics.average_consumption - 253.333).abs() < 0.01);

        // 5/6 * 70 + 182.67/500 * 30 = 58.33 + 10.96 = 69.29
        let decision = bill_decision(&metrics);
        assert_eq!(decision.score, 69);
        assert_eq!(decision.status, CreditStatus::Approved);
        assert_eq!(decision.approved_amount, 6393);
        assert_eq!(decision.interest_rate, 2.5);
    }

    #[test]
    fn test_mock_snapshot_scores_as_documented() {
        // 1100/2000*40 + 5/6*35 + 680/850*25 = 22 + 29.17 + 20 = 71.17
        let decision = financial_decision(&MockOpenFinanceProvider::sample_snapshot());
        assert_eq!(decision.score, 71);
        assert_eq!(decision.status, CreditStatus::Approved);
        assert_eq!(decision.approved_amount, 44000);
        assert_eq!(decision.interest_rate, 1.8);
    }

    #[test]
    fn test_extracted_bill_wire_format() {
        let json = serde_json::to_value(MockBillExtractor::sample_bill()).unwrap();
        assert_eq!(json["customerName"], "Cliente Exemplo");
        assert_eq!(json["paymentHistory"][2]["daysLate"], 2);
        assert_eq!(json["monthlyConsumption"][0]["value"], 180.5);
    }
}
