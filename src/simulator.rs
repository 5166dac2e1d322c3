//! Residential solar savings estimate.

use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Average residential tariff, R$/kWh.
pub const AVERAGE_TARIFF: f64 = 0.78;
/// Monthly generation per installed kWp.
pub const KWH_PER_KWP: f64 = 100.0;
/// Share of the bill left after solar (availability cost and fees).
pub const RESIDUAL_BILL_SHARE: f64 = 0.22;
pub const COST_PER_KWP: f64 = 5000.0;
pub const FINANCING_INSTALLMENTS: u32 = 180;
/// Monthly payment factor over the system cost (about 5.5% a year).
pub const INSTALLMENT_FACTOR: f64 = 0.0079;

pub const MIN_CONSUMPTION_KWH: f64 = 1.0;
pub const MAX_CONSUMPTION_KWH: f64 = 100_000.0;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SimulationRequest {
    pub monthly_consumption_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SimulationResult {
    pub monthly_consumption_kwh: f64,
    pub system_size_kwp: u32,
    pub monthly_generation_kwh: f64,
    pub average_tariff: f64,
    pub current_bill: f64,
    pub bill_with_solar: f64,
    pub monthly_savings: f64,
    pub yearly_savings: f64,
    pub savings_25_years: f64,
    pub system_cost: f64,
    pub installments: u32,
    pub monthly_installment: f64,
}

pub fn simulate(monthly_consumption_kwh: f64) -> Result<SimulationResult, AppError> {
    if !monthly_consumption_kwh.is_finite()
        || !(MIN_CONSUMPTION_KWH..=MAX_CONSUMPTION_KWH).contains(&monthly_consumption_kwh)
    {
        return Err(AppError::BadRequest(format!(
            "monthly_consumption_kwh must be between {} and {}",
            MIN_CONSUMPTION_KWH, MAX_CONSUMPTION_KWH
        )));
    }

    let system_size_kwp = (monthly_consumption_kwh / KWH_PER_KWP).ceil() as u32;
    let current_bill = monthly_consumption_kwh * AVERAGE_TARIFF;
    let bill_with_solar = current_bill * RESIDUAL_BILL_SHARE;
    let monthly_savings = current_bill - bill_with_solar;
    let yearly_savings = monthly_savings * 12.0;
    let system_cost = f64::from(system_size_kwp) * COST_PER_KWP;

    Ok(SimulationResult {
        monthly_consumption_kwh,
        system_size_kwp,
        monthly_generation_kwh: f64::from(system_size_kwp) * KWH_PER_KWP,
        average_tariff: AVERAGE_TARIFF,
        current_bill,
        bill_with_solar,
        monthly_savings,
        yearly_savings,
        savings_25_years: yearly_savings * 25.0,
        system_cost,
        installments: FINANCING_INSTALLMENTS,
        monthly_installment: system_cost * INSTALLMENT_FACTOR,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_default_consumption() {
        let r = simulate(450.0).unwrap();
        assert_eq!(r.system_size_kwp, 5);
        assert_eq!(r.monthly_generation_kwh, 500.0);
        assert!(close(r.current_bill, 351.0));
        assert!(close(r.bill_with_solar, 77.22));
        assert!(close(r.monthly_savings, 273.78));
        assert!(close(r.yearly_savings, 3285.36));
        assert!(close(r.savings_25_years, 82134.0));
        assert_eq!(r.system_cost, 25000.0);
        assert!(close(r.monthly_installment, 197.5));
        assert_eq!(r.installments, 180);
    }

    #[test]
    fn test_exact_hundreds_do_not_round_up() {
        assert_eq!(simulate(300.0).unwrap().system_size_kwp, 3);
        assert_eq!(simulate(301.0).unwrap().system_size_kwp, 4);
    }

    #[test]
    fn test_out_of_range() {
        assert!(simulate(0.0).is_err());
        assert!(simulate(100_001.0).is_err());
        assert!(simulate(f64::NAN).is_err());
    }
}
