use napi::Result as NapiResult;
use napi_derive::napi;
use serde::de::DeserializeOwned;
use serde::Serialize;

use risk_budget_core::RiskBudgetResult;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// Parse `input_json`, run `op`, and serialise its output.
fn json_call<I, O>(input_json: &str, op: impl FnOnce(&I) -> RiskBudgetResult<O>) -> NapiResult<String>
where
    I: DeserializeOwned,
    O: Serialize,
{
    let input: I = serde_json::from_str(input_json).map_err(to_napi_error)?;
    let output = op(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_returns(input_json: String) -> NapiResult<String> {
    json_call(
        &input_json,
        risk_budget_core::estimation::returns::calculate_returns_from_input,
    )
}

#[napi]
pub fn calculate_covariance(input_json: String) -> NapiResult<String> {
    json_call(
        &input_json,
        risk_budget_core::estimation::covariance::estimate_covariance,
    )
}

// ---------------------------------------------------------------------------
// Risk budgeting
// ---------------------------------------------------------------------------

#[napi]
pub fn optimize_erc(input_json: String) -> NapiResult<String> {
    json_call(&input_json, risk_budget_core::risk_budgeting::erc::optimize_erc)
}

#[napi]
pub fn optimize_expected_shortfall(input_json: String) -> NapiResult<String> {
    json_call(
        &input_json,
        risk_budget_core::risk_budgeting::expected_shortfall::optimize_expected_shortfall,
    )
}

#[napi]
pub fn analyze_risk_contributions(input_json: String) -> NapiResult<String> {
    use risk_budget_core::risk_budgeting::contributions::{self, RiskContributionInput};
    json_call(&input_json, |input: &RiskContributionInput| {
        contributions::analyze_risk_contributions(&input.weights, &input.covariance_matrix)
    })
}

// ---------------------------------------------------------------------------
// Backtest
// ---------------------------------------------------------------------------

#[napi]
pub fn run_backtest(input_json: String) -> NapiResult<String> {
    json_call(&input_json, risk_budget_core::backtest::run_backtest)
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_max_drawdown(input_json: String) -> NapiResult<String> {
    use risk_budget_core::analytics::metrics::{self, DrawdownInput};
    json_call(&input_json, |input: &DrawdownInput| {
        Ok(metrics::calculate_max_drawdown(&input.values))
    })
}

#[napi]
pub fn find_worst_period(input_json: String) -> NapiResult<String> {
    json_call(
        &input_json,
        risk_budget_core::analytics::metrics::find_worst_period_from_input,
    )
}

#[napi]
pub fn run_volatility_stress(input_json: String) -> NapiResult<String> {
    json_call(
        &input_json,
        risk_budget_core::analytics::stress::run_volatility_stress,
    )
}
