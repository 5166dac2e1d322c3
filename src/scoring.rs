//! Credit scoring formulas ("Score Sol F").
//!
//! Two independent paths produce the same [`CreditDecision`] shape:
//!
//! - bill history: on-time payment ratio (0-70 pts) + payment capacity (0-30 pts)
//! - open finance: disposable income (0-40 pts) + loan payment ratio (0-35 pts)
//!   + bureau score (0-25 pts)
//!
//! The two paths deliberately keep different approval thresholds and amount rules;
//! see [`BILL_POLICY`] and [`OPEN_FINANCE_POLICY`].

use crate::errors::AppError;
use crate::models::CreditStatus;
use serde::{Deserialize, Serialize};

/// Average monthly bill at which the capacity component saturates.
pub const CAPACITY_SATURATION_PAYMENT: f64 = 500.0;
/// Disposable income at which the income component saturates.
pub const INCOME_SATURATION: f64 = 2000.0;
/// Upper bound of the bureau score scale.
pub const BUREAU_SCALE: f64 = 850.0;
/// Open-finance loans may reach 40x the disposable income (36-month horizon).
pub const DISPOSABLE_INCOME_MULTIPLIER: f64 = 40.0;
/// Share of the average bill that can become an installment.
pub const PAYMENT_CAPACITY_RATIO: f64 = 0.3;

/// One month of consumption read from a bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyConsumption {
    pub month: String,
    pub kwh: f64,
    /// Amount paid that month (R$).
    pub value: f64,
}

/// Whether a given month was paid and how late.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub month: String,
    pub paid: bool,
    pub days_late: u32,
}

impl PaymentRecord {
    pub fn is_on_time(&self) -> bool {
        self.paid && self.days_late == 0
    }
}

/// Counts records paid with zero days late.
pub fn count_on_time(history: &[PaymentRecord]) -> u32 {
    history.iter().filter(|p| p.is_on_time()).count() as u32
}

/// Aggregates derived from a bill history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BillMetrics {
    pub average_consumption: f64,
    pub average_payment: f64,
    pub on_time_payments: u32,
    pub total_months: u32,
}

impl BillMetrics {
    /// Averages run over the consumption samples; the on-time ratio over the payment history.
    pub fn from_history(
        consumption: &[MonthlyConsumption],
        payments: &[PaymentRecord],
    ) -> Result<Self, AppError> {
        if consumption.is_empty() {
            return Err(AppError::BadRequest(
                "Bill history has no consumption samples".to_string(),
            ));
        }
        if payments.is_empty() {
            return Err(AppError::BadRequest(
                "Bill history has no payment records".to_string(),
            ));
        }
        if consumption
            .iter()
            .any(|m| !m.kwh.is_finite() || !m.value.is_finite())
        {
            return Err(AppError::BadRequest(
                "Bill history contains non-numeric samples".to_string(),
            ));
        }

        let samples = consumption.len() as f64;
        let total_kwh: f64 = consumption.iter().map(|m| m.kwh).sum();
        let total_paid: f64 = consumption.iter().map(|m| m.value).sum();

        Ok(Self {
            average_consumption: total_kwh / samples,
            average_payment: total_paid / samples,
            on_time_payments: count_on_time(payments),
            total_months: payments.len() as u32,
        })
    }

    pub fn on_time_rate(&self) -> f64 {
        if self.total_months == 0 {
            return 0.0;
        }
        self.on_time_payments as f64 / self.total_months as f64
    }
}

/// Mocked or real open-finance data for one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSnapshot {
    pub account_balance: f64,
    pub monthly_income: f64,
    pub monthly_expenses: f64,
    /// Traditional bureau score, 0-850.
    pub credit_score: u32,
    pub active_loans: u32,
    pub loan_payment_history: Vec<PaymentRecord>,
}

impl FinancialSnapshot {
    pub fn disposable_income(&self) -> f64 {
        self.monthly_income - self.monthly_expenses
    }
}

/// Descending score thresholds mapped to values, with a floor value below the last one.
#[derive(Debug, Clone, Copy)]
pub struct StepTable {
    pub steps: [(u8, f64); 4],
    pub floor: f64,
}

impl StepTable {
    pub fn lookup(&self, score: u8) -> f64 {
        self.steps
            .iter()
            .find(|(threshold, _)| score >= *threshold)
            .map(|(_, value)| *value)
            .unwrap_or(self.floor)
    }
}

/// How a score becomes an approval status, an amount and a monthly rate.
#[derive(Debug, Clone, Copy)]
pub struct CreditPolicy {
    pub approval_threshold: u8,
    pub interest_rates: StepTable,
    /// Multiplier over the average bill; `None` when the amount derives from income.
    pub amount_multipliers: Option<StepTable>,
}

impl CreditPolicy {
    pub fn status_for(&self, score: u8) -> CreditStatus {
        if score >= self.approval_threshold {
            CreditStatus::Approved
        } else {
            CreditStatus::RequiresMoreInfo
        }
    }

    pub fn interest_rate(&self, score: u8) -> f64 {
        self.interest_rates.lookup(score)
    }
}

pub const BILL_POLICY: CreditPolicy = CreditPolicy {
    approval_threshold: 60,
    interest_rates: StepTable {
        steps: [(90, 1.5), (80, 1.8), (70, 2.1), (60, 2.5)],
        floor: 3.0,
    },
    amount_multipliers: Some(StepTable {
        steps: [(90, 50.0), (80, 45.0), (70, 40.0), (60, 35.0)],
        floor: 30.0,
    }),
};

pub const OPEN_FINANCE_POLICY: CreditPolicy = CreditPolicy {
    approval_threshold: 70,
    interest_rates: StepTable {
        steps: [(90, 1.2), (80, 1.5), (70, 1.8), (60, 2.2)],
        floor: 2.8,
    },
    amount_multipliers: None,
};

/// Outcome of one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CreditDecision {
    pub score: u8,
    pub status: CreditStatus,
    pub approved_amount: i64,
    /// Monthly rate in percent.
    pub interest_rate: f64,
}

fn round_score(raw: f64) -> u8 {
    if !raw.is_finite() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

fn round_amount(raw: f64) -> i64 {
    if !raw.is_finite() {
        return 0;
    }
    raw.max(0.0).round() as i64
}

/// `(on_time / months) * weight`; zero when there is no history.
pub fn payment_score(on_time: u32, months: u32, weight: f64) -> f64 {
    if months == 0 {
        return 0.0;
    }
    (on_time as f64 / months as f64) * weight
}

/// `min(average_payment / 500 * 30, 30)`.
pub fn capacity_score(average_payment: f64) -> f64 {
    ((average_payment / CAPACITY_SATURATION_PAYMENT) * 30.0).min(30.0)
}

pub fn bill_score(metrics: &BillMetrics) -> u8 {
    let payment = payment_score(metrics.on_time_payments, metrics.total_months, 70.0);
    let capacity = capacity_score(metrics.average_payment);
    round_score(payment + capacity)
}

pub fn bill_approved_amount(score: u8, average_payment: f64) -> i64 {
    let multiplier = BILL_POLICY
        .amount_multipliers
        .map(|table| table.lookup(score))
        .unwrap_or(30.0);
    round_amount(average_payment * multiplier)
}

pub fn bill_decision(metrics: &BillMetrics) -> CreditDecision {
    let score = bill_score(metrics);
    CreditDecision {
        score,
        status: BILL_POLICY.status_for(score),
        approved_amount: bill_approved_amount(score, metrics.average_payment),
        interest_rate: BILL_POLICY.interest_rate(score),
    }
}

pub fn financial_score(snapshot: &FinancialSnapshot) -> u8 {
    let income = ((snapshot.disposable_income() / INCOME_SATURATION) * 40.0).min(40.0);
    let history = &snapshot.loan_payment_history;
    let payment = payment_score(count_on_time(history), history.len() as u32, 35.0);
    let bureau = ((snapshot.credit_score as f64 / BUREAU_SCALE) * 25.0).min(25.0);
    round_score(income + payment + bureau)
}

pub fn financial_approved_amount(snapshot: &FinancialSnapshot) -> i64 {
    round_amount(snapshot.disposable_income() * DISPOSABLE_INCOME_MULTIPLIER)
}

pub fn financial_decision(snapshot: &FinancialSnapshot) -> CreditDecision {
    let score = financial_score(snapshot);
    CreditDecision {
        score,
        status: OPEN_FINANCE_POLICY.status_for(score),
        approved_amount: financial_approved_amount(snapshot),
        interest_rate: OPEN_FINANCE_POLICY.interest_rate(score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on_time(n: usize) -> Vec<PaymentRecord> {
        (0..n)
            .map(|i| PaymentRecord {
                month: format!("m{}", i),
                paid: true,
                days_late: 0,
            })
            .collect()
    }

    #[test]
    fn test_step_table_boundaries() {
        let rates = BILL_POLICY.interest_rates;
        assert_eq!(rates.lookup(100), 1.5);
        assert_eq!(rates.lookup(90), 1.5);
        assert_eq!(rates.lookup(89), 1.8);
        assert_eq!(rates.lookup(60), 2.5);
        assert_eq!(rates.lookup(59), 3.0);
        assert_eq!(rates.lookup(0), 3.0);
    }

    #[test]
    fn test_bill_multiplier_steps() {
        assert_eq!(bill_approved_amount(95, 100.0), 5000);
        assert_eq!(bill_approved_amount(85, 100.0), 4500);
        assert_eq!(bill_approved_amount(75, 100.0), 4000);
        assert_eq!(bill_approved_amount(65, 100.0), 3500);
        assert_eq!(bill_approved_amount(10, 100.0), 3000);
    }

    #[test]
    fn test_capacity_saturates() {
        assert_eq!(capacity_score(500.0), 30.0);
        assert_eq!(capacity_score(5000.0), 30.0);
        assert!((capacity_score(250.0) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_late_payment_counts_as_missed() {
        let mut history = on_time(6);
        history[2].days_late = 2;
        history[4].paid = false;
        assert_eq!(count_on_time(&history), 4);
    }

    #[test]
    fn test_empty_bill_history_rejected() {
        assert!(BillMetrics::from_history(&[], &on_time(3)).is_err());
        let samples = vec![MonthlyConsumption {
            month: "Nov/2024".into(),
            kwh: 200.0,
            value: 150.0,
        }];
        assert!(BillMetrics::from_history(&samples, &[]).is_err());
    }

    #[test]
    fn test_non_finite_samples_rejected() {
        let samples = vec![MonthlyConsumption {
            month: "Nov/2024".into(),
            kwh: f64::NAN,
            value: 150.0,
        }];
        assert!(BillMetrics::from_history(&samples, &on_time(1)).is_err());
    }

    #[test]
    fn test_financial_thresholds_are_stricter() {
        assert_eq!(BILL_POLICY.status_for(65), CreditStatus::Approved);
        assert_eq!(
            OPEN_FINANCE_POLICY.status_for(65),
            CreditStatus::RequiresMoreInfo
        );
        assert_eq!(OPEN_FINANCE_POLICY.status_for(70), CreditStatus::Approved);
    }

    #[test]
    fn test_negative_disposable_income_clamps() {
        let snapshot = FinancialSnapshot {
            account_balance: 0.0,
            monthly_income: 1000.0,
            monthly_expenses: 9000.0,
            credit_score: 0,
            active_loans: 0,
            loan_payment_history: vec![],
        };
        let decision = financial_decision(&snapshot);
        assert_eq!(decision.score, 0);
        assert_eq!(decision.approved_amount, 0);
        assert_eq!(decision.status, CreditStatus::RequiresMoreInfo);
        assert_eq!(decision.interest_rate, 2.8);
    }

    #[test]
    fn test_empty_loan_history_scores_zero_payment_component() {
        let snapshot = FinancialSnapshot {
            account_balance: 0.0,
            monthly_income: 4000.0,
            monthly_expenses: 2000.0,
            credit_score: 850,
            active_loans: 0,
            loan_payment_history: vec![],
        };
        // 40 income + 0 payment + 25 bureau
        assert_eq!(financial_score(&snapshot), 65);
    }
}
