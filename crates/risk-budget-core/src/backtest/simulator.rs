use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::analytics::metrics::{
    period_return, rolling_sharpe, rolling_volatility, summarize, BacktestMetrics,
};
use crate::error::RiskBudgetError;
use crate::estimation::covariance::calculate_covariance_matrix;
use crate::estimation::returns::{annualized_mean_returns, calculate_returns};
use crate::risk_budgeting::contributions::risk_shares_or_weights;
use crate::risk_budgeting::erc::{solve_erc, ErcSettings};
use crate::risk_budgeting::expected_shortfall::{solve_es, EsInput};
use crate::risk_budgeting::OptimizerKind;
use crate::types::{with_metadata, ComputationOutput, Money, Rate, EPSILON};
use crate::RiskBudgetResult;

use super::config::BacktestInput;
use super::schedule::{parse_dates, should_rebalance};
use super::state::{DividendPolicy, SimulationState};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Trailing window (trading days) for rolling volatility and Sharpe.
const ROLLING_WINDOW: usize = 252;
/// Lookback (trading days) for the quarterly-return snapshot.
const QUARTER_DAYS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceStatus {
    /// New targets from the optimiser
    Optimized,
    /// Reset to the initial weights
    FixedWeights,
    /// Optimisation failed; previous targets kept and nothing traded
    Retained,
}

/// Per-asset row of a rebalance event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRebalance {
    pub ticker: String,
    pub weight_before: f64,
    pub weight_after: f64,
    /// weight_before minus the previous rebalance's target
    pub drift: f64,
    /// Signed dollar trade (positive = buy)
    pub trade_amount: Money,
    pub price: f64,
    /// Risk share of the new target under the window covariance
    pub risk_contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceEvent {
    pub date: String,
    pub status: RebalanceStatus,
    pub assets: Vec<AssetRebalance>,
    pub trading_volume: Money,
    pub transaction_cost: Money,
    /// Post-trade portfolio value
    pub portfolio_value: Money,
    pub rolling_volatility: Rate,
    pub rolling_sharpe: f64,
    pub quarterly_return: Rate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimizer_converged: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub tickers: Vec<String>,
    /// Daily portfolio values from the output start, rebased to initial capital
    pub values: Vec<Money>,
    /// Daily returns; one fewer than `values`
    pub returns: Vec<Rate>,
    pub dates: Vec<String>,
    pub rebalance_events: Vec<RebalanceEvent>,
    pub metrics: BacktestMetrics,
    /// Dividend cash received inside the output window
    pub dividend_income: Money,
    /// Dividend cash received by the opposite-policy portfolio
    pub shadow_dividend_income: Money,
    pub shadow_final_value: Money,
    pub shadow_total_return: Rate,
    /// Actual final value minus shadow final value
    pub missed_opportunity: Money,
    /// Drifted weights of the ending holdings
    pub final_weights: Vec<f64>,
    /// Risk shares of the ending holdings under the trailing covariance
    pub final_risk_contributions: Vec<f64>,
}

/// Window returns per asset and their annualised covariance.
type WindowEstimate = (Vec<Vec<f64>>, Vec<Vec<f64>>);

struct TargetDecision {
    weights: Vec<f64>,
    status: RebalanceStatus,
    converged: Option<bool>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Day-by-day simulation of a risk-budgeted portfolio with periodic
/// re-optimisation, transaction costs and a dividend-policy shadow.
pub fn run_backtest(input: &BacktestInput) -> RiskBudgetResult<ComputationOutput<BacktestResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let (prices, dividends) = input.aligned_series()?;
    let dates = parse_dates(&input.dates)?;
    let n = input.tickers.len();
    let m = dates.len();

    if m < 2 {
        warnings.push("Fewer than 2 dates; returning the starting portfolio".into());
        let elapsed = start.elapsed().as_micros() as u64;
        return Ok(with_metadata(
            methodology(input),
            &assumptions(input),
            warnings,
            elapsed,
            trivial_result(input),
        ));
    }

    tracing::info!(
        assets = n,
        days = m,
        optimizer = ?input.optimizer,
        frequency = ?input.rebalance.frequency,
        "backtest started"
    );

    let price_row = |t: usize| -> Vec<f64> { prices.iter().map(|p| p[t]).collect() };
    let dividend_row = |t: usize| -> Vec<f64> { dividends.iter().map(|d| d[t]).collect() };

    let policy = DividendPolicy::from_reinvest(input.reinvest_dividends);
    let opening = price_row(0);
    let mut actual =
        SimulationState::allocate(input.initial_capital, &input.initial_weights, &opening, policy);
    let mut shadow = SimulationState::allocate(
        input.initial_capital,
        &input.initial_weights,
        &opening,
        policy.opposite(),
    );

    let lookback = input.lookback_days();
    let mut targets = input.initial_weights.clone();
    let mut last_rebalance = dates[0];
    let mut values: Vec<Money> = vec![actual.value(&opening)];
    let mut shadow_values: Vec<Money> = vec![shadow.value(&opening)];
    let mut returns: Vec<Rate> = Vec::with_capacity(m - 1);
    let mut events: Vec<(usize, RebalanceEvent)> = Vec::new();
    let mut dividend_snapshot = (0.0, 0.0);
    let mut retained = 0usize;
    let mut unconverged = 0usize;

    for t in 1..m {
        let today = price_row(t);
        let previous = price_row(t - 1);
        let paid = dividend_row(t);

        actual = actual.accrue_dividends(&paid, &previous);
        shadow = shadow.accrue_dividends(&paid, &previous);

        let mut pending_event = None;
        if should_rebalance(dates[t], last_rebalance, input.rebalance.frequency) {
            let weights_before = actual.weights(&today);
            let estimate = window_estimates(&prices, &dividends, t, lookback);
            let decision = match decide_targets(input, estimate.as_ref(), &targets) {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::warn!(date = %input.dates[t], error = %e, "rebalance failed; keeping previous targets");
                    retained += 1;
                    TargetDecision {
                        weights: targets.clone(),
                        status: RebalanceStatus::Retained,
                        converged: None,
                    }
                }
            };
            if decision.converged == Some(false) {
                unconverged += 1;
            }

            let (volume, cost, trade_amounts) = if decision.status == RebalanceStatus::Retained {
                (0.0, 0.0, vec![0.0; n])
            } else {
                let (next, trades) =
                    actual.rebalance(&decision.weights, &today, input.rebalance.transaction_cost);
                actual = next;
                let (next_shadow, _) =
                    shadow.rebalance(&decision.weights, &today, input.rebalance.transaction_cost);
                shadow = next_shadow;
                (trades.volume, trades.cost, trades.trade_amounts)
            };

            let risk_snapshot = match estimate {
                Ok((_, ref cov)) => risk_shares_or_weights(&decision.weights, cov),
                Err(_) => decision.weights.clone(),
            };
            let weights_after = actual.weights(&today);
            let assets = (0..n)
                .map(|i| AssetRebalance {
                    ticker: input.tickers[i].clone(),
                    weight_before: weights_before[i],
                    weight_after: weights_after[i],
                    drift: weights_before[i] - targets[i],
                    trade_amount: trade_amounts[i],
                    price: today[i],
                    risk_contribution: risk_snapshot[i],
                })
                .collect::<Vec<_>>();

            pending_event = Some((assets, volume, cost, decision.status, decision.converged));
            targets = decision.weights;
            last_rebalance = dates[t];
        }

        let value = actual.value(&today);
        let prev_value = values[t - 1];
        returns.push(if prev_value.abs() > EPSILON {
            (value - prev_value) / prev_value
        } else {
            0.0
        });
        values.push(value);
        shadow_values.push(shadow.value(&today));

        if let Some((assets, trading_volume, transaction_cost, status, optimizer_converged)) =
            pending_event
        {
            events.push((
                t,
                RebalanceEvent {
                    date: input.dates[t].clone(),
                    status,
                    assets,
                    trading_volume,
                    transaction_cost,
                    portfolio_value: value,
                    rolling_volatility: rolling_volatility(&returns, ROLLING_WINDOW),
                    rolling_sharpe: rolling_sharpe(&returns, ROLLING_WINDOW),
                    quarterly_return: period_return(&values, QUARTER_DAYS),
                    optimizer_converged,
                },
            ));
        }

        if t == input.output_start_idx {
            dividend_snapshot = (actual.dividend_income, shadow.dividend_income);
        }
    }

    // Ending exposure
    let closing = price_row(m - 1);
    let final_weights = actual.weights(&closing);
    let final_risk_contributions = match window_estimates(&prices, &dividends, m - 1, lookback) {
        Ok((_, cov)) => risk_shares_or_weights(&final_weights, &cov),
        Err(_) => final_weights.clone(),
    };

    // Burn-in slice
    let mut k = input.output_start_idx;
    if k > m - 1 {
        tracing::warn!(requested = k, clamped = m - 1, "output_start_idx beyond data; clamped");
        warnings.push(format!(
            "output_start_idx {} exceeds the last date index; clamped to {}",
            k,
            m - 1
        ));
        k = m - 1;
        dividend_snapshot = (actual.dividend_income, shadow.dividend_income);
    }

    let scale = rebase_factor(input.initial_capital, values[k]);
    let shadow_scale = rebase_factor(input.initial_capital, shadow_values[k]);
    let out_values: Vec<Money> = values[k..].iter().map(|v| v * scale).collect();
    let out_returns: Vec<Rate> = returns[k..].to_vec();
    let out_dates: Vec<String> = input.dates[k..].to_vec();
    let rebalance_events: Vec<RebalanceEvent> = events
        .into_iter()
        .filter(|(t, _)| *t >= k)
        .map(|(_, event)| rebase_event(event, scale))
        .collect();

    let shadow_final_value = shadow_values[m - 1] * shadow_scale;
    let shadow_total_return = shadow_final_value / input.initial_capital - 1.0;
    let final_value = out_values.last().copied().unwrap_or(input.initial_capital);
    let metrics = summarize(&out_values, &out_returns, &out_dates);

    if retained > 0 {
        warnings.push(format!(
            "{} rebalance(s) kept the previous targets after an optimiser error",
            retained
        ));
    }
    if unconverged > 0 {
        warnings.push(format!("{} optimisation(s) did not converge", unconverged));
    }

    tracing::info!(
        final_value,
        total_return = metrics.total_return,
        rebalances = rebalance_events.len(),
        "backtest finished"
    );

    let result = BacktestResult {
        tickers: input.tickers.clone(),
        values: out_values,
        returns: out_returns,
        dates: out_dates,
        rebalance_events,
        metrics,
        dividend_income: actual.dividend_income - dividend_snapshot.0,
        shadow_dividend_income: shadow.dividend_income - dividend_snapshot.1,
        shadow_final_value,
        shadow_total_return,
        missed_opportunity: final_value - shadow_final_value,
        final_weights,
        final_risk_contributions,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        methodology(input),
        &assumptions(input),
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Per-asset returns and annualised covariance over the trailing window
/// ending at `end`; without a lookback the window starts at day 0.
fn window_estimates(
    prices: &[&[f64]],
    dividends: &[Vec<f64>],
    end: usize,
    lookback: Option<usize>,
) -> RiskBudgetResult<WindowEstimate> {
    let begin = end - lookback.map_or(end, |days| days.min(end));
    let returns = prices
        .iter()
        .zip(dividends.iter())
        .map(|(p, d)| calculate_returns(&p[begin..=end], Some(&d[begin..=end])))
        .collect::<RiskBudgetResult<Vec<_>>>()?;
    let cov = calculate_covariance_matrix(&returns)?;
    Ok((returns, cov))
}

fn decide_targets(
    input: &BacktestInput,
    estimate: Result<&WindowEstimate, &RiskBudgetError>,
    previous: &[f64],
) -> RiskBudgetResult<TargetDecision> {
    if input.maintain_fixed_weights {
        return Ok(TargetDecision {
            weights: input.initial_weights.clone(),
            status: RebalanceStatus::FixedWeights,
            converged: None,
        });
    }
    let (returns, cov) = estimate
        .map_err(|e| RiskBudgetError::InsufficientData(format!("Estimation window: {}", e)))?;
    let result = match input.optimizer {
        OptimizerKind::Erc => solve_erc(cov, input.target_budgets.as_deref(), &ErcSettings::default())?,
        OptimizerKind::Es => {
            let mut es = EsInput::new(annualized_mean_returns(returns), cov.clone());
            // Equal tail-risk budgets unless the caller sets them
            let n = previous.len();
            es.budgets = Some(
                input
                    .target_budgets
                    .clone()
                    .unwrap_or_else(|| vec![1.0 / n as f64; n]),
            );
            es.confidence_level = input.confidence_level;
            es.initial_weights = Some(previous.to_vec());
            solve_es(&es)?
        }
    };
    Ok(TargetDecision {
        weights: result.weights,
        status: RebalanceStatus::Optimized,
        converged: Some(result.converged),
    })
}

fn rebase_factor(initial_capital: Money, base: Money) -> f64 {
    if base.abs() > EPSILON {
        initial_capital / base
    } else {
        1.0
    }
}

fn rebase_event(mut event: RebalanceEvent, scale: f64) -> RebalanceEvent {
    event.portfolio_value *= scale;
    event.trading_volume *= scale;
    event.transaction_cost *= scale;
    for asset in &mut event.assets {
        asset.trade_amount *= scale;
    }
    event
}

fn trivial_result(input: &BacktestInput) -> BacktestResult {
    BacktestResult {
        tickers: input.tickers.clone(),
        values: vec![input.initial_capital],
        returns: Vec::new(),
        dates: input.dates.clone(),
        rebalance_events: Vec::new(),
        metrics: BacktestMetrics::zero(),
        dividend_income: 0.0,
        shadow_dividend_income: 0.0,
        shadow_final_value: input.initial_capital,
        shadow_total_return: 0.0,
        missed_opportunity: 0.0,
        final_weights: input.initial_weights.clone(),
        final_risk_contributions: input.initial_weights.clone(),
    }
}

fn methodology(input: &BacktestInput) -> &'static str {
    match (input.maintain_fixed_weights, input.optimizer) {
        (true, _) => "Rolling backtest with fixed-weight rebalancing",
        (false, OptimizerKind::Erc) => "Rolling backtest with Equal Risk Contribution rebalancing",
        (false, OptimizerKind::Es) => "Rolling backtest with Gaussian Expected Shortfall rebalancing",
    }
}

fn assumptions(input: &BacktestInput) -> serde_json::Value {
    serde_json::json!({
        "num_assets": input.tickers.len(),
        "num_dates": input.dates.len(),
        "frequency": input.rebalance.frequency,
        "transaction_cost": input.rebalance.transaction_cost,
        "initial_capital": input.initial_capital,
        "reinvest_dividends": input.reinvest_dividends,
        "lookback_days": input.lookback_days(),
        "optimizer": input.optimizer,
        "maintain_fixed_weights": input.maintain_fixed_weights,
        "output_start_idx": input.output_start_idx,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::config::RebalanceFrequency;
    use std::collections::BTreeMap;

    fn business_dates(n: usize) -> Vec<String> {
        let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| (start + chrono::Duration::days(i as i64)).format("%Y-%m-%d").to_string())
            .collect()
    }

    fn two_asset_input(n: usize) -> BacktestInput {
        let mut prices = BTreeMap::new();
        prices.insert(
            "AAA".to_string(),
            (0..n).map(|i| 100.0 * (1.0 + 0.01 * ((i as f64) * 0.7).sin())).collect(),
        );
        prices.insert(
            "BBB".to_string(),
            (0..n).map(|i| 50.0 * (1.0 + 0.02 * ((i as f64) * 0.3).cos())).collect(),
        );
        BacktestInput::new(
            vec!["AAA".into(), "BBB".into()],
            business_dates(n),
            prices,
            vec![0.5, 0.5],
        )
    }

    #[test]
    fn test_fewer_than_two_dates_is_trivial() {
        let out = run_backtest(&two_asset_input(1)).unwrap();
        assert_eq!(out.result.values, vec![10_000.0]);
        assert!(out.result.rebalance_events.is_empty());
        assert_eq!(out.result.final_risk_contributions, vec![0.5, 0.5]);
        assert_eq!(out.result.metrics.total_return, 0.0);
    }

    #[test]
    fn test_values_start_at_initial_capital() {
        let out = run_backtest(&two_asset_input(90)).unwrap().result;
        assert_eq!(out.values.len(), 90);
        assert_eq!(out.returns.len(), 89);
        assert!((out.values[0] - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_burn_in_rebases_to_initial_capital() {
        let mut input = two_asset_input(120);
        input.output_start_idx = 40;
        let out = run_backtest(&input).unwrap().result;
        assert_eq!(out.values.len(), 80);
        assert_eq!(out.dates[0], input.dates[40]);
        assert!((out.values[0] - 10_000.0).abs() < 1e-9);
        assert!(out
            .rebalance_events
            .iter()
            .all(|e| e.date.as_str() >= input.dates[40].as_str()));
    }

    #[test]
    fn test_burn_in_beyond_data_is_clamped() {
        let mut input = two_asset_input(10);
        input.output_start_idx = 50;
        let out = run_backtest(&input).unwrap();
        assert_eq!(out.result.values.len(), 1);
        assert!(out.warnings.iter().any(|w| w.contains("clamped")));
    }

    #[test]
    fn test_short_window_rebalance_is_retained() {
        let mut input = two_asset_input(5);
        input.rebalance.frequency = RebalanceFrequency::Daily;
        let out = run_backtest(&input).unwrap().result;
        // Day 1 has a single return, too few for a covariance matrix
        let first = &out.rebalance_events[0];
        assert_eq!(first.status, RebalanceStatus::Retained);
        assert_eq!(first.trading_volume, 0.0);
        assert!(out.rebalance_events[1..]
            .iter()
            .all(|e| e.status == RebalanceStatus::Optimized));
    }

    #[test]
    fn test_transaction_costs_reduce_value() {
        let mut free = two_asset_input(60);
        free.rebalance.frequency = RebalanceFrequency::Weekly;
        free.rebalance.transaction_cost = 0.0;
        let mut costly = free.clone();
        costly.rebalance.transaction_cost = 0.01;
        let a = run_backtest(&free).unwrap().result;
        let b = run_backtest(&costly).unwrap().result;
        assert!(b.values.last().unwrap() < a.values.last().unwrap());
        assert!(b.rebalance_events.iter().any(|e| e.transaction_cost > 0.0));
    }

    #[test]
    fn test_unknown_date_format_rejected() {
        let mut input = two_asset_input(3);
        input.dates[2] = "yesterday".into();
        assert!(matches!(
            run_backtest(&input),
            Err(RiskBudgetError::DateError(_))
        ));
    }
}
