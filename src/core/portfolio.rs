use tracing::{debug, info, warn};

use super::engine::sweep_property;
use super::types::{
    FinancingParams, GlobalWinner, PortfolioResult, Property, PropertyResult, SweepRange,
};
use crate::error::RoiError;

pub fn run_portfolio(
    properties: Vec<Property>,
    params: FinancingParams,
    range: SweepRange,
) -> Result<PortfolioResult, RoiError> {
    params.validate().map_err(RoiError::InvalidParams)?;
    range.validate().map_err(RoiError::InvalidRange)?;

    if properties.is_empty() {
        warn!("no properties loaded");
        return Err(RoiError::NoInputData);
    }

    info!(
        properties = properties.len(),
        cells_per_property = range.cell_count(),
        "processing properties"
    );

    let results: Vec<PropertyResult> = properties
        .into_iter()
        .map(|property| {
            let result = sweep_property(property, &params, &range);
            debug!(
                name = %result.property.name,
                successful = result.successful_scenarios,
                rejected = result.rejected_scenarios,
                best_annual_roi = ?result.winners.best_annual_roi.map(|p| p.annual_roi),
                "swept property"
            );
            result
        })
        .collect();

    let global_winner = global_winner(&results);
    match &global_winner {
        Some(winner) => info!(
            property = %winner.property_name,
            years = winner.permutation.requested_years,
            downpayment_percent = winner.permutation.downpayment_percent,
            annual_roi = winner.permutation.annual_roi,
            "global winner"
        ),
        None => warn!("every scenario was rejected; no global winner"),
    }

    Ok(PortfolioResult {
        params,
        range,
        properties: results,
        global_winner,
    })
}

/// First property wins ties: a later winner must have a strictly greater ROI.
fn global_winner(results: &[PropertyResult]) -> Option<GlobalWinner> {
    results
        .iter()
        .enumerate()
        .filter_map(|(idx, result)| result.winners.best_annual_roi.map(|p| (idx, result, p)))
        .fold(None, |best: Option<GlobalWinner>, (idx, result, candidate)| match best {
            Some(current) if candidate.annual_roi <= current.permutation.annual_roi => {
                Some(current)
            }
            _ => Some(GlobalWinner {
                property_index: idx,
                property_name: result.property.name.clone(),
                permutation: candidate,
            }),
        })
}
