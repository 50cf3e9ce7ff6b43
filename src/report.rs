use std::io::Write;

use serde::Serialize;

use crate::core::{Permutation, PortfolioResult, ScenarioOutcome};
use crate::error::RoiError;

pub fn write_json<W: Write>(writer: W, result: &PortfolioResult) -> Result<(), RoiError> {
    serde_json::to_writer_pretty(writer, result)?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct ScenarioRow<'a> {
    property: &'a str,
    years: u32,
    downpayment_percent: u32,
    status: &'static str,
    reason: Option<String>,
    monthly_installment: Option<f64>,
    total_fees: Option<f64>,
    total_annual_income: Option<f64>,
    equity: Option<f64>,
    annual_roi: Option<f64>,
    afterloan_annual_roi: Option<f64>,
    x_years_avg_annual_roi: Option<f64>,
}

impl<'a> ScenarioRow<'a> {
    fn new(property: &'a str, years: u32, downpayment_percent: u32, outcome: &ScenarioOutcome) -> Self {
        let mut row = Self {
            property,
            years,
            downpayment_percent,
            status: "ok",
            reason: None,
            monthly_installment: None,
            total_fees: None,
            total_annual_income: None,
            equity: None,
            annual_roi: None,
            afterloan_annual_roi: None,
            x_years_avg_annual_roi: None,
        };
        match outcome {
            ScenarioOutcome::Success(p) => {
                row.monthly_installment = Some(p.monthly_installment);
                row.total_fees = Some(p.total_fees);
                row.total_annual_income = Some(p.total_annual_income);
                row.equity = Some(p.equity);
                row.annual_roi = Some(p.annual_roi);
                row.afterloan_annual_roi = Some(p.afterloan_annual_roi);
                row.x_years_avg_annual_roi = Some(p.x_years_avg_annual_roi);
            }
            ScenarioOutcome::Rejected(rejection) => {
                row.status = "rejected";
                row.reason = Some(rejection.to_string());
            }
        }
        row
    }
}

/// One CSV row per grid cell, in sweep order.
pub fn write_scenarios_csv<W: Write>(writer: W, result: &PortfolioResult) -> Result<(), RoiError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for property_result in &result.properties {
        let name = property_result.property.name.as_str();
        for (years, row) in &property_result.grid {
            for (percent, outcome) in row {
                csv_writer.serialize(ScenarioRow::new(name, *years, *percent, outcome))?;
            }
        }
    }
    csv_writer.flush()?;
    Ok(())
}

fn describe(p: &Permutation) -> String {
    format!(
        "{} years @ {}% down: installment {:.2}, equity {:.2}, annual ROI {:.2}%, after-loan ROI {:.2}%, {}-year ROI {:.2}%",
        p.num_years,
        p.downpayment_percent,
        p.monthly_installment,
        p.equity,
        p.annual_roi * 100.0,
        p.afterloan_annual_roi * 100.0,
        p.horizon_years,
        p.x_years_avg_annual_roi * 100.0,
    )
}

pub fn render_summary(result: &PortfolioResult) -> String {
    let mut out = String::new();
    for property_result in &result.properties {
        let property = &property_result.property;
        out.push_str(&format!(
            "{} (price {:.2}, rent {:.2}) {}\n",
            property.name, property.price, property.rent, property.url
        ));
        out.push_str(&format!(
            "  scenarios: {} ok, {} rejected\n",
            property_result.successful_scenarios, property_result.rejected_scenarios
        ));
        let winners = &property_result.winners;
        out.push_str(&format!(
            "  best immediate: {}\n",
            winners.best_annual_roi.as_ref().map_or_else(|| "none".to_string(), describe)
        ));
        out.push_str(&format!(
            "  best horizon:   {}\n",
            winners.best_horizon_roi.as_ref().map_or_else(|| "none".to_string(), describe)
        ));
    }
    match &result.global_winner {
        Some(winner) => out.push_str(&format!(
            "GLOBAL WINNER: {} -> {}\n",
            winner.property_name,
            describe(&winner.permutation)
        )),
        None => out.push_str("GLOBAL WINNER: none\n"),
    }
    out
}
