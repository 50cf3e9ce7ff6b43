use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MONTHS: u32 = 12;
pub const MAX_LOAN_YEARS: u32 = 100;

/// What the sweep does with the rest of a year's row after a rejection.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionPolicy {
    Abort,
    Continue,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionPolicies {
    pub downpayment: RejectionPolicy,
    pub installment: RejectionPolicy,
    pub loan_principal: RejectionPolicy,
}

impl Default for RejectionPolicies {
    fn default() -> Self {
        Self {
            downpayment: RejectionPolicy::Abort,
            installment: RejectionPolicy::Continue,
            loan_principal: RejectionPolicy::Continue,
        }
    }
}

/// Bank, tax and running-cost parameters. Rates are decimals (0.075 = 7.5%).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancingParams {
    pub annual_interest_rate: f64,
    pub loan_giving_fee_rate: f64,
    pub mortgage_fee_rate: f64,
    pub loan_stamps_rate: f64,
    pub max_downpayment: f64,
    pub max_monthly_installment: Option<f64>,
    pub min_loan_principal: Option<f64>,
    pub monthly_operating_expenses: f64,
    pub annual_maintenance: f64,
    pub taxable_rent_share: f64,
    pub govt_tax_rate: f64,
    pub default_reletting_factor: f64,
    pub horizon_years: u32,
    pub policies: RejectionPolicies,
}

impl Default for FinancingParams {
    fn default() -> Self {
        Self {
            annual_interest_rate: 0.075,
            loan_giving_fee_rate: 0.01,
            mortgage_fee_rate: 0.012,
            loan_stamps_rate: 0.003,
            max_downpayment: 30_000.0,
            max_monthly_installment: None,
            min_loan_principal: None,
            monthly_operating_expenses: 30.0,
            annual_maintenance: 100.0,
            taxable_rent_share: 0.80,
            govt_tax_rate: 0.15,
            default_reletting_factor: 3.0,
            horizon_years: 10,
            policies: RejectionPolicies::default(),
        }
    }
}

impl FinancingParams {
    pub fn monthly_interest_rate(&self) -> f64 {
        self.annual_interest_rate / MONTHS as f64
    }

    pub fn monthly_maintenance(&self) -> f64 {
        self.annual_maintenance / MONTHS as f64
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("annual interest rate", self.annual_interest_rate),
            ("loan giving fee rate", self.loan_giving_fee_rate),
            ("mortgage fee rate", self.mortgage_fee_rate),
            ("loan stamps rate", self.loan_stamps_rate),
            ("max downpayment", self.max_downpayment),
            ("monthly operating expenses", self.monthly_operating_expenses),
            ("annual maintenance", self.annual_maintenance),
            ("default reletting factor", self.default_reletting_factor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{name} must be a finite value >= 0"));
            }
        }

        for (name, value) in [
            ("taxable rent share", self.taxable_rent_share),
            ("govt tax rate", self.govt_tax_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be between 0 and 1"));
            }
        }

        for (name, value) in [
            ("max monthly installment", self.max_monthly_installment),
            ("min loan principal", self.min_loan_principal),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(format!("{name} must be a finite value >= 0"));
                }
            }
        }

        if self.horizon_years == 0 {
            return Err("horizon years must be > 0".to_string());
        }

        Ok(())
    }
}

/// Inclusive bounds of the (years x downpayment%) grid.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRange {
    pub min_years: u32,
    pub max_years: u32,
    pub min_downpayment_percent: u32,
    pub max_downpayment_percent: u32,
}

impl Default for SweepRange {
    fn default() -> Self {
        Self {
            min_years: 1,
            max_years: 30,
            min_downpayment_percent: 20,
            max_downpayment_percent: 100,
        }
    }
}

impl SweepRange {
    pub fn single(num_years: u32, downpayment_percent: u32) -> Self {
        Self {
            min_years: num_years,
            max_years: num_years,
            min_downpayment_percent: downpayment_percent,
            max_downpayment_percent: downpayment_percent,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.min_years == 0 {
            return Err("min years must be >= 1".to_string());
        }
        if self.max_years < self.min_years {
            return Err("max years must be >= min years".to_string());
        }
        if self.max_years > MAX_LOAN_YEARS {
            return Err(format!("max years must be <= {MAX_LOAN_YEARS}"));
        }
        if self.min_downpayment_percent == 0 || self.max_downpayment_percent > 100 {
            return Err("downpayment percent must be between 1 and 100".to_string());
        }
        if self.max_downpayment_percent < self.min_downpayment_percent {
            return Err("max downpayment percent must be >= min downpayment percent".to_string());
        }
        Ok(())
    }

    pub fn cell_count(&self) -> usize {
        let years = (self.max_years - self.min_years + 1) as usize;
        let percents = (self.max_downpayment_percent - self.min_downpayment_percent + 1) as usize;
        years * percents
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PropertyError {
    #[error("{field} must be a finite value >= 0, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("price must be > 0")]
    NonPositivePrice,
    #[error("gov tax discount must be between 0 and 1, got {0}")]
    DiscountOutOfRange(f64),
}

/// Raw property figures as supplied by a loader or API caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyInput {
    pub price: f64,
    pub rent: f64,
    #[serde(default)]
    pub area: f64,
    #[serde(default)]
    pub extra_onetime_expense: f64,
    #[serde(default)]
    pub reletting_factor: Option<f64>,
    #[serde(default)]
    pub gov_tax_discount: Option<f64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub name: String,
    pub url: String,
    pub price: f64,
    pub rent: f64,
    pub area: f64,
    pub extra_onetime_expense: f64,
    pub reletting_factor: f64,
    pub gov_tax_discount: f64,
    pub annual_rent: f64,
    pub expense_annual_govt_tax: f64,
    pub expense_monthly_govt_tax: f64,
    pub expense_annual_reletting: f64,
    pub expense_monthly_reletting: f64,
    pub expense_total_monthly: f64,
    pub afterloan_monthly_income: f64,
    pub afterloan_annual_income: f64,
}

impl Property {
    /// Validates the raw figures and derives the recurring expenses once.
    pub fn new(input: PropertyInput, params: &FinancingParams) -> Result<Self, PropertyError> {
        let reletting_factor = input
            .reletting_factor
            .unwrap_or(params.default_reletting_factor);
        let gov_tax_discount = input.gov_tax_discount.unwrap_or(0.0);

        for (field, value) in [
            ("price", input.price),
            ("rent", input.rent),
            ("area", input.area),
            ("extra onetime expense", input.extra_onetime_expense),
            ("reletting factor", reletting_factor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PropertyError::Negative { field, value });
            }
        }
        if input.price == 0.0 {
            return Err(PropertyError::NonPositivePrice);
        }
        if !(0.0..=1.0).contains(&gov_tax_discount) {
            return Err(PropertyError::DiscountOutOfRange(gov_tax_discount));
        }

        let months = MONTHS as f64;
        let annual_rent = input.rent * months;
        let expense_annual_govt_tax = annual_rent
            * params.taxable_rent_share
            * params.govt_tax_rate
            * (1.0 - gov_tax_discount);
        let expense_monthly_govt_tax = expense_annual_govt_tax / months;
        let expense_annual_reletting = input.rent * reletting_factor;
        let expense_monthly_reletting = expense_annual_reletting / months;
        let expense_total_monthly = params.monthly_operating_expenses
            + expense_monthly_govt_tax
            + expense_monthly_reletting
            + params.monthly_maintenance();
        let afterloan_monthly_income = input.rent - expense_total_monthly;

        Ok(Self {
            name: input.name,
            url: input.url,
            price: input.price,
            rent: input.rent,
            area: input.area,
            extra_onetime_expense: input.extra_onetime_expense,
            reletting_factor,
            gov_tax_discount,
            annual_rent,
            expense_annual_govt_tax,
            expense_monthly_govt_tax,
            expense_annual_reletting,
            expense_monthly_reletting,
            expense_total_monthly,
            afterloan_monthly_income,
            afterloan_annual_income: afterloan_monthly_income * months,
        })
    }
}

/// Figures of one successfully financed scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permutation {
    pub requested_years: u32,
    pub num_years: u32,
    pub downpayment_percent: u32,
    pub downpayment: f64,
    pub loan_principal: f64,
    pub num_payments: u32,
    pub monthly_installment: f64,
    pub loan_giving_fee: f64,
    pub mortgage_fee: f64,
    pub loan_stamps_fee: f64,
    pub total_fees: f64,
    pub total_monthly_outcome: f64,
    pub total_monthly_income: f64,
    pub total_annual_income: f64,
    pub equity: f64,
    pub monthly_roi: f64,
    pub annual_roi: f64,
    pub afterloan_annual_income: f64,
    pub equity_with_loan: f64,
    pub afterloan_annual_roi: f64,
    pub horizon_years: u32,
    pub equity_x_years: f64,
    pub total_income_x_years: f64,
    pub x_years_avg_annual_roi: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Rejection {
    #[error("downpayment {downpayment:.2} exceeds max downpayment {cap:.2}")]
    ExceededMaxDownpayment { downpayment: f64, cap: f64 },
    #[error("monthly installment {installment:.2} exceeds max monthly installment {cap:.2}")]
    ExceededMaxMonthlyInstallment { installment: f64, cap: f64 },
    #[error("loan principal {principal:.2} is below min loan principal {floor:.2}")]
    BelowMinLoanPrincipal { principal: f64, floor: f64 },
    #[error("loan term of {num_years} years is outside 1..={max}", max = MAX_LOAN_YEARS)]
    InvalidLoanTerm { num_years: u32 },
}

impl Rejection {
    pub fn policy(&self, policies: &RejectionPolicies) -> RejectionPolicy {
        match self {
            Rejection::ExceededMaxDownpayment { .. } => policies.downpayment,
            Rejection::ExceededMaxMonthlyInstallment { .. } => policies.installment,
            Rejection::BelowMinLoanPrincipal { .. } => policies.loan_principal,
            // The cash purchase cell of the same row is still valid.
            Rejection::InvalidLoanTerm { .. } => RejectionPolicy::Continue,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", content = "scenario", rename_all = "camelCase")]
pub enum ScenarioOutcome {
    Success(Permutation),
    Rejected(Rejection),
}

impl ScenarioOutcome {
    pub fn permutation(&self) -> Option<&Permutation> {
        match self {
            ScenarioOutcome::Success(permutation) => Some(permutation),
            ScenarioOutcome::Rejected(_) => None,
        }
    }
}

/// years -> downpayment% -> outcome, iterated in sweep order.
pub type ScenarioGrid = BTreeMap<u32, BTreeMap<u32, ScenarioOutcome>>;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Winners {
    pub best_annual_roi: Option<Permutation>,
    pub best_horizon_roi: Option<Permutation>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyResult {
    pub property: Property,
    pub grid: ScenarioGrid,
    pub winners: Winners,
    pub successful_scenarios: usize,
    pub rejected_scenarios: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalWinner {
    pub property_index: usize,
    pub property_name: String,
    pub permutation: Permutation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioResult {
    pub params: FinancingParams,
    pub range: SweepRange,
    pub properties: Vec<PropertyResult>,
    pub global_winner: Option<GlobalWinner>,
}
