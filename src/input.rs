use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::core::{FinancingParams, Property, PropertyInput};
use crate::error::RoiError;

#[derive(Debug, Deserialize)]
struct PropertyRow {
    price: f64,
    rent: f64,
    area: f64,
    extra_onetime_expense: f64,
    #[serde(default)]
    reletting_factor: Option<f64>,
    #[serde(default)]
    gov_tax_discount: Option<f64>,
    name: String,
    url: String,
}

impl From<PropertyRow> for PropertyInput {
    fn from(row: PropertyRow) -> Self {
        Self {
            price: row.price,
            rent: row.rent,
            area: row.area,
            extra_onetime_expense: row.extra_onetime_expense,
            reletting_factor: row.reletting_factor,
            gov_tax_discount: row.gov_tax_discount,
            name: row.name,
            url: row.url,
        }
    }
}

pub fn load_properties(path: &Path, params: &FinancingParams) -> Result<Vec<Property>, RoiError> {
    let file = File::open(path)?;
    let properties = parse_properties(file, params)?;
    info!(path = %path.display(), count = properties.len(), "loaded properties");
    Ok(properties)
}

/// Parses a headed CSV. Row numbers in errors are 1-based and exclude the header.
pub fn parse_properties<R: Read>(
    reader: R,
    params: &FinancingParams,
) -> Result<Vec<Property>, RoiError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut properties = Vec::new();

    for (idx, record) in csv_reader.deserialize::<PropertyRow>().enumerate() {
        let row = record?;
        let property = Property::new(row.into(), params)
            .map_err(|source| RoiError::InvalidProperty { row: idx + 1, source })?;
        debug!(name = %property.name, price = property.price, rent = property.rent, "parsed property");
        properties.push(property);
    }

    Ok(properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PropertyError;

    const EPS: f64 = 1e-9;

    #[test]
    fn parses_extended_field_set() {
        let csv = "\
price,rent,reletting_factor,gov_tax_discount,area,extra_onetime_expense,name,url
100000,800,2.5,0.25,50,1500,Downtown flat,http://example.com/1
";
        let properties =
            parse_properties(csv.as_bytes(), &FinancingParams::default()).expect("parses");
        assert_eq!(properties.len(), 1);
        let property = &properties[0];
        assert_eq!(property.name, "Downtown flat");
        assert_eq!(property.url, "http://example.com/1");
        assert!((property.reletting_factor - 2.5).abs() < EPS);
        assert!((property.gov_tax_discount - 0.25).abs() < EPS);
        assert!((property.extra_onetime_expense - 1_500.0).abs() < EPS);
        assert!((property.expense_annual_reletting - 2_000.0).abs() < EPS);
    }

    #[test]
    fn reduced_field_set_uses_defaults() {
        let csv = "\
price,rent,area,extra_onetime_expense,name,url
80000, 700 ,45,0,Suburb,http://example.com/2
";
        let params = FinancingParams::default();
        let properties = parse_properties(csv.as_bytes(), &params).expect("parses");
        let property = &properties[0];
        assert!((property.reletting_factor - params.default_reletting_factor).abs() < EPS);
        assert_eq!(property.gov_tax_discount, 0.0);
        assert!((property.rent - 700.0).abs() < EPS);
    }

    #[test]
    fn empty_optional_cells_use_defaults() {
        let csv = "\
price,rent,reletting_factor,gov_tax_discount,area,extra_onetime_expense,name,url
80000,700,,,45,0,Suburb,http://example.com/2
";
        let properties =
            parse_properties(csv.as_bytes(), &FinancingParams::default()).expect("parses");
        assert!((properties[0].reletting_factor - 3.0).abs() < EPS);
        assert_eq!(properties[0].gov_tax_discount, 0.0);
    }

    #[test]
    fn invalid_property_reports_row_number() {
        let csv = "\
price,rent,area,extra_onetime_expense,name,url
80000,700,45,0,Fine,http://example.com/1
0,700,45,0,Free,http://example.com/2
";
        let err = parse_properties(csv.as_bytes(), &FinancingParams::default())
            .expect_err("zero price row");
        match err {
            RoiError::InvalidProperty { row, source } => {
                assert_eq!(row, 2);
                assert_eq!(source, PropertyError::NonPositivePrice);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_number_is_csv_error() {
        let csv = "\
price,rent,area,extra_onetime_expense,name,url
lots,700,45,0,Bad,http://example.com/1
";
        let err = parse_properties(csv.as_bytes(), &FinancingParams::default())
            .expect_err("bad number");
        assert!(matches!(err, RoiError::Csv(_)));
    }

    #[test]
    fn header_only_input_yields_no_properties() {
        let csv = "price,rent,area,extra_onetime_expense,name,url\n";
        let properties =
            parse_properties(csv.as_bytes(), &FinancingParams::default()).expect("parses");
        assert!(properties.is_empty());
    }
}
