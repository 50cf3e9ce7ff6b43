use axum::{
    Router,
    extract::Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    FinancingParams, PortfolioResult, Property, PropertyInput, RejectionPolicies,
    RejectionPolicy, SweepRange, run_portfolio,
};
use crate::error::RoiError;
use crate::{input, report, telemetry};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliRejectionPolicy {
    Abort,
    Continue,
}

impl From<CliRejectionPolicy> for RejectionPolicy {
    fn from(value: CliRejectionPolicy) -> Self {
        match value {
            CliRejectionPolicy::Abort => RejectionPolicy::Abort,
            CliRejectionPolicy::Continue => RejectionPolicy::Continue,
        }
    }
}

impl From<RejectionPolicy> for CliRejectionPolicy {
    fn from(value: RejectionPolicy) -> Self {
        match value {
            RejectionPolicy::Abort => CliRejectionPolicy::Abort,
            RejectionPolicy::Continue => CliRejectionPolicy::Continue,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "rental-roi",
    about = "Rental property ROI across a loan term x downpayment scenario grid",
    version
)]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sweep every property in a CSV file and report the winners
    Analyze(AnalyzeArgs),
    /// Serve the ROI engine as a JSON HTTP API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// CSV with price, rent, area, extra_onetime_expense, name, url and
    /// optional reletting_factor, gov_tax_discount columns
    #[arg(long)]
    input: PathBuf,
    /// Write the full result bundle as JSON
    #[arg(long)]
    json: Option<PathBuf>,
    /// Write one CSV row per scenario cell
    #[arg(long)]
    scenarios_csv: Option<PathBuf>,
    /// Do not print the text summary
    #[arg(long)]
    quiet: bool,
    #[command(flatten)]
    financing: FinancingArgs,
    #[command(flatten)]
    range: RangeArgs,
}

#[derive(Args, Debug, Clone)]
struct FinancingArgs {
    #[arg(long, default_value_t = 7.5, help = "Nominal annual interest rate in percent")]
    interest_rate: f64,
    #[arg(long, default_value_t = 1.0, help = "Loan origination fee in percent of principal")]
    loan_giving_fee: f64,
    #[arg(long, default_value_t = 1.2, help = "Mortgage registration fee in percent of principal")]
    mortgage_fee: f64,
    #[arg(long, default_value_t = 0.3, help = "Stamp duty in percent of principal")]
    loan_stamps: f64,
    #[arg(long, default_value_t = 30_000.0)]
    max_downpayment: f64,
    #[arg(long, help = "Reject scenarios whose monthly installment exceeds this")]
    max_monthly_installment: Option<f64>,
    #[arg(long, help = "Reject financed scenarios whose loan principal is below this")]
    min_loan_principal: Option<f64>,
    #[arg(long, default_value_t = 30.0)]
    monthly_operating_expenses: f64,
    #[arg(long, default_value_t = 100.0)]
    annual_maintenance: f64,
    #[arg(long, default_value_t = 80.0, help = "Share of rent subject to tax in percent")]
    taxable_rent_share: f64,
    #[arg(long, default_value_t = 15.0, help = "Government tax rate in percent")]
    gov_tax_rate: f64,
    #[arg(
        long,
        default_value_t = 3.0,
        help = "Months of rent reserved per year for reletting when a property has none"
    )]
    default_reletting_factor: f64,
    #[arg(long, default_value_t = 10)]
    horizon_years: u32,
    #[arg(long, value_enum, default_value_t = CliRejectionPolicy::Abort)]
    downpayment_policy: CliRejectionPolicy,
    #[arg(long, value_enum, default_value_t = CliRejectionPolicy::Continue)]
    installment_policy: CliRejectionPolicy,
    #[arg(long, value_enum, default_value_t = CliRejectionPolicy::Continue)]
    loan_principal_policy: CliRejectionPolicy,
}

impl Default for FinancingArgs {
    fn default() -> Self {
        Self {
            interest_rate: 7.5,
            loan_giving_fee: 1.0,
            mortgage_fee: 1.2,
            loan_stamps: 0.3,
            max_downpayment: 30_000.0,
            max_monthly_installment: None,
            min_loan_principal: None,
            monthly_operating_expenses: 30.0,
            annual_maintenance: 100.0,
            taxable_rent_share: 80.0,
            gov_tax_rate: 15.0,
            default_reletting_factor: 3.0,
            horizon_years: 10,
            downpayment_policy: CliRejectionPolicy::Abort,
            installment_policy: CliRejectionPolicy::Continue,
            loan_principal_policy: CliRejectionPolicy::Continue,
        }
    }
}

#[derive(Args, Debug, Clone, Copy)]
struct RangeArgs {
    #[arg(long, default_value_t = 1)]
    min_years: u32,
    #[arg(long, default_value_t = 30)]
    max_years: u32,
    #[arg(long, default_value_t = 20)]
    min_downpayment_percent: u32,
    #[arg(long, default_value_t = 100)]
    max_downpayment_percent: u32,
}

impl Default for RangeArgs {
    fn default() -> Self {
        Self {
            min_years: 1,
            max_years: 30,
            min_downpayment_percent: 20,
            max_downpayment_percent: 100,
        }
    }
}

impl From<RangeArgs> for SweepRange {
    fn from(value: RangeArgs) -> Self {
        SweepRange {
            min_years: value.min_years,
            max_years: value.max_years,
            min_downpayment_percent: value.min_downpayment_percent,
            max_downpayment_percent: value.max_downpayment_percent,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RoiPayload {
    properties: Vec<PropertyInput>,
    params: ParamsPayload,
    range: RangePayload,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ParamsPayload {
    interest_rate: Option<f64>,
    loan_giving_fee: Option<f64>,
    mortgage_fee: Option<f64>,
    loan_stamps: Option<f64>,
    max_downpayment: Option<f64>,
    max_monthly_installment: Option<f64>,
    min_loan_principal: Option<f64>,
    monthly_operating_expenses: Option<f64>,
    annual_maintenance: Option<f64>,
    taxable_rent_share: Option<f64>,
    gov_tax_rate: Option<f64>,
    default_reletting_factor: Option<f64>,
    horizon_years: Option<u32>,
    downpayment_policy: Option<RejectionPolicy>,
    installment_policy: Option<RejectionPolicy>,
    loan_principal_policy: Option<RejectionPolicy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RangePayload {
    min_years: Option<u32>,
    max_years: Option<u32>,
    min_downpayment_percent: Option<u32>,
    max_downpayment_percent: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_params(args: &FinancingArgs) -> Result<FinancingParams, String> {
    for (name, value) in [
        ("--interest-rate", args.interest_rate),
        ("--loan-giving-fee", args.loan_giving_fee),
        ("--mortgage-fee", args.mortgage_fee),
        ("--loan-stamps", args.loan_stamps),
        ("--taxable-rent-share", args.taxable_rent_share),
        ("--gov-tax-rate", args.gov_tax_rate),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(format!("{name} must be between 0 and 100"));
        }
    }

    if !args.max_downpayment.is_finite() || args.max_downpayment < 0.0 {
        return Err("--max-downpayment must be >= 0".to_string());
    }

    if let Some(cap) = args.max_monthly_installment {
        if !cap.is_finite() || cap <= 0.0 {
            return Err("--max-monthly-installment must be > 0".to_string());
        }
    }

    if let Some(floor) = args.min_loan_principal {
        if !floor.is_finite() || floor < 0.0 {
            return Err("--min-loan-principal must be >= 0".to_string());
        }
    }

    if args.monthly_operating_expenses < 0.0 || args.annual_maintenance < 0.0 {
        return Err("--monthly-operating-expenses and --annual-maintenance must be >= 0".to_string());
    }

    if !args.default_reletting_factor.is_finite() || args.default_reletting_factor < 0.0 {
        return Err("--default-reletting-factor must be >= 0".to_string());
    }

    if args.horizon_years == 0 {
        return Err("--horizon-years must be > 0".to_string());
    }

    Ok(FinancingParams {
        annual_interest_rate: args.interest_rate / 100.0,
        loan_giving_fee_rate: args.loan_giving_fee / 100.0,
        mortgage_fee_rate: args.mortgage_fee / 100.0,
        loan_stamps_rate: args.loan_stamps / 100.0,
        max_downpayment: args.max_downpayment,
        max_monthly_installment: args.max_monthly_installment,
        min_loan_principal: args.min_loan_principal,
        monthly_operating_expenses: args.monthly_operating_expenses,
        annual_maintenance: args.annual_maintenance,
        taxable_rent_share: args.taxable_rent_share / 100.0,
        govt_tax_rate: args.gov_tax_rate / 100.0,
        default_reletting_factor: args.default_reletting_factor,
        horizon_years: args.horizon_years,
        policies: RejectionPolicies {
            downpayment: args.downpayment_policy.into(),
            installment: args.installment_policy.into(),
            loan_principal: args.loan_principal_policy.into(),
        },
    })
}

pub async fn run_cli() -> Result<(), RoiError> {
    let cli = Cli::parse();
    telemetry::init(&cli.log_level)?;

    match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::Serve { port } => Ok(run_http_server(port).await?),
    }
}

fn run_analyze(args: AnalyzeArgs) -> Result<(), RoiError> {
    let params = build_params(&args.financing).map_err(RoiError::InvalidParams)?;
    let properties = input::load_properties(&args.input, &params)?;
    let result = run_portfolio(properties, params, args.range.into())?;

    if let Some(path) = &args.json {
        let mut writer = BufWriter::new(File::create(path)?);
        report::write_json(&mut writer, &result)?;
        writer.flush()?;
        info!(path = %path.display(), "wrote JSON results");
    }

    if let Some(path) = &args.scenarios_csv {
        report::write_scenarios_csv(BufWriter::new(File::create(path)?), &result)?;
        info!(path = %path.display(), "wrote scenario table");
    }

    if !args.quiet {
        print!("{}", report::render_summary(&result));
    }
    Ok(())
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/roi", post(roi_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "rental ROI HTTP API listening");

    axum::serve(listener, router()).await
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn roi_handler(Json(payload): Json<RoiPayload>) -> Response {
    match analyze_payload(payload) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

fn analyze_payload(payload: RoiPayload) -> Result<PortfolioResult, RoiError> {
    let mut financing = FinancingArgs::default();
    apply_params_payload(&mut financing, payload.params);
    let params = build_params(&financing).map_err(RoiError::InvalidParams)?;

    let mut range = RangeArgs::default();
    apply_range_payload(&mut range, payload.range);

    let properties = payload
        .properties
        .into_iter()
        .enumerate()
        .map(|(idx, input)| {
            Property::new(input, &params)
                .map_err(|source| RoiError::InvalidProperty { row: idx + 1, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    run_portfolio(properties, params, range.into())
}

fn apply_params_payload(args: &mut FinancingArgs, payload: ParamsPayload) {
    if let Some(v) = payload.interest_rate {
        args.interest_rate = v;
    }
    if let Some(v) = payload.loan_giving_fee {
        args.loan_giving_fee = v;
    }
    if let Some(v) = payload.mortgage_fee {
        args.mortgage_fee = v;
    }
    if let Some(v) = payload.loan_stamps {
        args.loan_stamps = v;
    }
    if let Some(v) = payload.max_downpayment {
        args.max_downpayment = v;
    }
    if payload.max_monthly_installment.is_some() {
        args.max_monthly_installment = payload.max_monthly_installment;
    }
    if payload.min_loan_principal.is_some() {
        args.min_loan_principal = payload.min_loan_principal;
    }
    if let Some(v) = payload.monthly_operating_expenses {
        args.monthly_operating_expenses = v;
    }
    if let Some(v) = payload.annual_maintenance {
        args.annual_maintenance = v;
    }
    if let Some(v) = payload.taxable_rent_share {
        args.taxable_rent_share = v;
    }
    if let Some(v) = payload.gov_tax_rate {
        args.gov_tax_rate = v;
    }
    if let Some(v) = payload.default_reletting_factor {
        args.default_reletting_factor = v;
    }
    if let Some(v) = payload.horizon_years {
        args.horizon_years = v;
    }
    if let Some(v) = payload.downpayment_policy {
        args.downpayment_policy = v.into();
    }
    if let Some(v) = payload.installment_policy {
        args.installment_policy = v.into();
    }
    if let Some(v) = payload.loan_principal_policy {
        args.loan_principal_policy = v.into();
    }
}

fn apply_range_payload(args: &mut RangeArgs, payload: RangePayload) {
    if let Some(v) = payload.min_years {
        args.min_years = v;
    }
    if let Some(v) = payload.max_years {
        args.max_years = v;
    }
    if let Some(v) = payload.min_downpayment_percent {
        args.min_downpayment_percent = v;
    }
    if let Some(v) = payload.max_downpayment_percent {
        args.max_downpayment_percent = v;
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    const EPS: f64 = 1e-12;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn payload_from_json(json: &str) -> RoiPayload {
        serde_json::from_str(json).expect("payload should parse")
    }

    async fn send(request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router().oneshot(request).await.expect("router responds");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    fn post_roi(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/roi")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    }

    #[test]
    fn default_args_build_default_params() {
        let params = build_params(&FinancingArgs::default()).expect("valid params");
        let defaults = FinancingParams::default();
        assert_approx(params.annual_interest_rate, defaults.annual_interest_rate);
        assert_approx(params.loan_giving_fee_rate, defaults.loan_giving_fee_rate);
        assert_approx(params.mortgage_fee_rate, defaults.mortgage_fee_rate);
        assert_approx(params.loan_stamps_rate, defaults.loan_stamps_rate);
        assert_approx(params.taxable_rent_share, defaults.taxable_rent_share);
        assert_approx(params.govt_tax_rate, defaults.govt_tax_rate);
        assert_eq!(params.max_downpayment, defaults.max_downpayment);
        assert_eq!(params.horizon_years, defaults.horizon_years);
        assert_eq!(params.policies, defaults.policies);
        assert_eq!(SweepRange::from(RangeArgs::default()), SweepRange::default());
    }

    #[test]
    fn cli_defaults_match_api_defaults() {
        let cli = Cli::try_parse_from(["rental-roi", "analyze", "--input", "props.csv"])
            .expect("cli parses");
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze command");
        };
        let from_cli = build_params(&args.financing).expect("valid params");
        let from_default = build_params(&FinancingArgs::default()).expect("valid params");
        assert_eq!(from_cli, from_default);
        assert_eq!(SweepRange::from(args.range), SweepRange::default());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn cli_parses_overrides() {
        let cli = Cli::try_parse_from([
            "rental-roi",
            "analyze",
            "--input",
            "props.csv",
            "--interest-rate",
            "5",
            "--max-monthly-installment",
            "750",
            "--installment-policy",
            "abort",
            "--max-years",
            "20",
            "--log-level",
            "debug",
        ])
        .expect("cli parses");
        assert_eq!(cli.log_level, "debug");
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze command");
        };
        let params = build_params(&args.financing).expect("valid params");
        assert_approx(params.annual_interest_rate, 0.05);
        assert_eq!(params.max_monthly_installment, Some(750.0));
        assert_eq!(params.policies.installment, RejectionPolicy::Abort);
        assert_eq!(args.range.max_years, 20);
    }

    #[test]
    fn build_params_rejects_out_of_range_rate() {
        let mut args = FinancingArgs::default();
        args.interest_rate = -1.0;
        let err = build_params(&args).expect_err("negative rate");
        assert!(err.contains("--interest-rate"));

        let mut args = FinancingArgs::default();
        args.max_monthly_installment = Some(0.0);
        let err = build_params(&args).expect_err("zero cap");
        assert!(err.contains("--max-monthly-installment"));

        let mut args = FinancingArgs::default();
        args.horizon_years = 0;
        assert!(build_params(&args).is_err());
    }

    #[test]
    fn payload_overrides_defaults() {
        let payload = payload_from_json(
            r#"{
              "properties": [
                {"price": 100000, "rent": 800, "area": 50, "name": "Test", "url": "http://x"}
              ],
              "params": {
                "interestRate": 6,
                "maxDownpayment": 50000,
                "installmentPolicy": "abort",
                "horizonYears": 15
              },
              "range": {"minYears": 10, "maxYears": 12, "maxDownpaymentPercent": 60}
            }"#,
        );
        let result = analyze_payload(payload).expect("analysis runs");

        assert_approx(result.params.annual_interest_rate, 0.06);
        assert_eq!(result.params.max_downpayment, 50_000.0);
        assert_eq!(result.params.horizon_years, 15);
        assert_eq!(result.params.policies.installment, RejectionPolicy::Abort);
        assert_eq!(result.range.min_years, 10);
        assert_eq!(result.range.max_years, 12);
        assert_eq!(result.range.min_downpayment_percent, 20);
        assert_eq!(result.range.max_downpayment_percent, 60);
        assert_eq!(result.properties.len(), 1);
        assert_eq!(result.properties[0].grid.len(), 3);
    }

    #[test]
    fn payload_reports_invalid_property_index() {
        let payload = payload_from_json(
            r#"{"properties": [
                {"price": 100000, "rent": 800},
                {"price": 90000, "rent": -5}
            ]}"#,
        );
        let err = analyze_payload(payload).expect_err("negative rent");
        assert!(matches!(err, RoiError::InvalidProperty { row: 2, .. }));
    }

    #[tokio::test]
    async fn roi_endpoint_returns_result_bundle() {
        let (status, body) = send(post_roi(
            r#"{
              "properties": [{"price": 100000, "rent": 800, "area": 50, "name": "Test", "url": "http://x"}],
              "range": {"minYears": 10, "maxYears": 10, "minDownpaymentPercent": 20, "maxDownpaymentPercent": 20}
            }"#,
        ))
        .await;

        assert_eq!(status, StatusCode::OK);
        let scenario = &body["properties"][0]["grid"]["10"]["20"];
        assert_eq!(scenario["status"], "success");
        assert_eq!(scenario["scenario"]["downpayment"], 20000.0);
        assert_eq!(scenario["scenario"]["loanPrincipal"], 80000.0);
        assert!(scenario["scenario"]["monthlyInstallment"].as_f64().expect("number") > 0.0);
        assert_eq!(body["globalWinner"]["propertyName"], "Test");
    }

    #[tokio::test]
    async fn roi_endpoint_rejects_empty_portfolio() {
        let (status, body) = send(post_roi(r#"{"properties": []}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "no input to process");
    }

    #[tokio::test]
    async fn unknown_route_is_json_not_found() {
        let request = Request::builder()
            .uri("/nope")
            .body(Body::empty())
            .expect("request builds");
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found");
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("request builds");
        let response = router().oneshot(request).await.expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        assert_eq!(&bytes[..], b"ok");
    }
}
