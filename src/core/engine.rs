use std::collections::BTreeMap;

use super::types::{
    FinancingParams, MAX_LOAN_YEARS, MONTHS, Permutation, Property, PropertyResult, Rejection, RejectionPolicy,
    ScenarioGrid, ScenarioOutcome, SweepRange, Winners,
};

#[derive(Debug, Clone, Copy)]
struct LoanFees {
    giving: f64,
    mortgage: f64,
    stamps: f64,
}

impl LoanFees {
    fn for_principal(principal: f64, params: &FinancingParams) -> Self {
        Self {
            giving: principal * params.loan_giving_fee_rate,
            mortgage: principal * params.mortgage_fee_rate,
            stamps: principal * params.loan_stamps_rate,
        }
    }

    fn total(self) -> f64 {
        self.giving + self.mortgage + self.stamps
    }
}

#[derive(Debug, Clone, Copy)]
struct HorizonOutcome {
    equity_x_years: f64,
    total_income_x_years: f64,
    x_years_avg_annual_roi: f64,
}

/// Computes one financing scenario. Pure: no state survives between calls.
pub fn calculate_permutation(
    property: &Property,
    params: &FinancingParams,
    num_years: u32,
    downpayment_percent: u32,
) -> Result<Permutation, Rejection> {
    let months = MONTHS as f64;
    let requested_years = num_years;

    let downpayment = property.price * (downpayment_percent as f64 / 100.0);
    if downpayment > params.max_downpayment {
        return Err(Rejection::ExceededMaxDownpayment {
            downpayment,
            cap: params.max_downpayment,
        });
    }
    let loan_principal = property.price - downpayment;

    let fees = LoanFees::for_principal(loan_principal, params);
    if let Some(floor) = params.min_loan_principal {
        if loan_principal > 0.0 && loan_principal < floor {
            return Err(Rejection::BelowMinLoanPrincipal {
                principal: loan_principal,
                floor,
            });
        }
    }

    let cash_purchase = downpayment_percent >= 100;
    if !cash_purchase && !(1..=MAX_LOAN_YEARS).contains(&num_years) {
        return Err(Rejection::InvalidLoanTerm { num_years });
    }
    let num_years = if cash_purchase { 0 } else { num_years };
    let num_payments = num_years * MONTHS;
    let monthly_installment = if cash_purchase {
        0.0
    } else {
        monthly_installment(
            loan_principal,
            params.monthly_interest_rate(),
            num_payments,
        )
    };
    if let Some(cap) = params.max_monthly_installment {
        if monthly_installment > cap {
            return Err(Rejection::ExceededMaxMonthlyInstallment {
                installment: monthly_installment,
                cap,
            });
        }
    }

    let total_monthly_outcome = property.expense_total_monthly + monthly_installment;
    let total_monthly_income = property.rent - total_monthly_outcome;
    let total_annual_income = total_monthly_income * months;

    let total_fees = fees.total();
    let equity = downpayment + total_fees;
    let monthly_roi = total_monthly_income / equity;
    let annual_roi = total_annual_income / equity;

    let equity_with_loan = equity_after_shortfall(equity, total_annual_income, num_years);
    let afterloan_annual_roi = property.afterloan_annual_income / equity_with_loan;

    let horizon = horizon_roi(
        equity,
        total_annual_income,
        property.afterloan_annual_income,
        num_years,
        params.horizon_years,
    );

    Ok(Permutation {
        requested_years,
        num_years,
        downpayment_percent,
        downpayment,
        loan_principal,
        num_payments,
        monthly_installment,
        loan_giving_fee: fees.giving,
        mortgage_fee: fees.mortgage,
        loan_stamps_fee: fees.stamps,
        total_fees,
        total_monthly_outcome,
        total_monthly_income,
        total_annual_income,
        equity,
        monthly_roi,
        annual_roi,
        afterloan_annual_income: property.afterloan_annual_income,
        equity_with_loan,
        afterloan_annual_roi,
        horizon_years: params.horizon_years,
        equity_x_years: horizon.equity_x_years,
        total_income_x_years: horizon.total_income_x_years,
        x_years_avg_annual_roi: horizon.x_years_avg_annual_roi,
    })
}

/// Standard amortizing-loan payment. A zero rate spreads the principal evenly.
pub fn monthly_installment(principal: f64, monthly_rate: f64, num_payments: u32) -> f64 {
    if principal <= 0.0 || num_payments == 0 {
        return 0.0;
    }
    if monthly_rate == 0.0 {
        return principal / num_payments as f64;
    }
    let base = 1.0 + monthly_rate;
    let term = match i32::try_from(num_payments) {
        Ok(n) => base.powi(n),
        Err(_) => base.powf(num_payments as f64),
    };
    if term.is_infinite() {
        // Interest-only limit of the annuity.
        return principal * monthly_rate;
    }
    principal * ((monthly_rate * term) / (term - 1.0))
}

// Shortfalls paid out of pocket during the loan years count as capital at risk.
fn equity_after_shortfall(equity: f64, total_annual_income: f64, num_years: u32) -> f64 {
    if total_annual_income < 0.0 {
        equity + total_annual_income.abs() * num_years as f64
    } else {
        equity
    }
}

fn horizon_roi(
    equity: f64,
    total_annual_income: f64,
    afterloan_annual_income: f64,
    num_years: u32,
    horizon_years: u32,
) -> HorizonOutcome {
    let equity_x_years = equity_after_shortfall(equity, total_annual_income, num_years);
    let loan_period_income = if total_annual_income > 0.0 {
        total_annual_income * num_years.min(horizon_years) as f64
    } else {
        0.0
    };
    let remaining_years = horizon_years.saturating_sub(num_years);
    let total_income_x_years =
        loan_period_income + afterloan_annual_income * remaining_years as f64;

    HorizonOutcome {
        equity_x_years,
        total_income_x_years,
        x_years_avg_annual_roi: (total_income_x_years / horizon_years as f64) / equity_x_years,
    }
}

/// Runs every (years, downpayment%) cell of `range` for one property.
pub fn sweep_property(
    property: Property,
    params: &FinancingParams,
    range: &SweepRange,
) -> PropertyResult {
    let mut grid = ScenarioGrid::new();
    let mut successful_scenarios = 0_usize;
    let mut rejected_scenarios = 0_usize;

    for num_years in range.min_years..=range.max_years {
        let row = grid.entry(num_years).or_insert_with(BTreeMap::new);
        for downpayment_percent in range.min_downpayment_percent..=range.max_downpayment_percent {
            match calculate_permutation(&property, params, num_years, downpayment_percent) {
                Ok(permutation) => {
                    successful_scenarios += 1;
                    row.insert(downpayment_percent, ScenarioOutcome::Success(permutation));
                }
                Err(rejection) => {
                    rejected_scenarios += 1;
                    row.insert(downpayment_percent, ScenarioOutcome::Rejected(rejection));
                    if rejection.policy(&params.policies) == RejectionPolicy::Abort {
                        break;
                    }
                }
            }
        }
    }

    let winners = Winners::from_grid(&grid);

    PropertyResult {
        property,
        grid,
        winners,
        successful_scenarios,
        rejected_scenarios,
    }
}

impl Winners {
    /// Folds the grid in sweep order; a later scenario only wins on a strictly
    /// greater metric.
    pub fn from_grid(grid: &ScenarioGrid) -> Self {
        grid.values()
            .flat_map(|row| row.values())
            .filter_map(ScenarioOutcome::permutation)
            .fold(Winners::default(), |winners, candidate| Winners {
                best_annual_roi: pick_strictly_greater(
                    winners.best_annual_roi,
                    candidate,
                    |p| p.annual_roi,
                ),
                best_horizon_roi: pick_strictly_greater(
                    winners.best_horizon_roi,
                    candidate,
                    |p| p.x_years_avg_annual_roi,
                ),
            })
    }
}

pub(crate) fn pick_strictly_greater(
    current: Option<Permutation>,
    candidate: &Permutation,
    metric: impl Fn(&Permutation) -> f64,
) -> Option<Permutation> {
    match current {
        Some(best) if metric(candidate) > metric(&best) => Some(*candidate),
        Some(best) => Some(best),
        None => Some(*candidate),
    }
}
