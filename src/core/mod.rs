mod engine;
mod portfolio;
mod types;

pub use engine::{calculate_permutation, monthly_installment, sweep_property};
pub use portfolio::run_portfolio;
pub use types::{
    FinancingParams, GlobalWinner, MAX_LOAN_YEARS, MONTHS, Permutation, PortfolioResult, Property, PropertyError,
    PropertyInput, PropertyResult, Rejection, RejectionPolicies, RejectionPolicy, ScenarioGrid,
    ScenarioOutcome, SweepRange, Winners,
};
