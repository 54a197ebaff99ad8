use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use pretty_assertions::assert_eq;

use risk_budget_core::backtest::simulator::RebalanceStatus;
use risk_budget_core::backtest::{run_backtest, BacktestInput, RebalanceFrequency};
use risk_budget_core::risk_budgeting::OptimizerKind;
use risk_budget_core::RiskBudgetError;

// ===========================================================================
// Backtest engine tests
// ===========================================================================

fn calendar(start: &str, n: usize) -> Vec<String> {
    let first = NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap();
    (0..n)
        .map(|i| (first + Duration::days(i as i64)).format("%Y-%m-%d").to_string())
        .collect()
}

/// Three assets with distinct deterministic wiggles so covariances are
/// non-degenerate.
fn sample_input(start: &str, n: usize) -> BacktestInput {
    let mut prices = BTreeMap::new();
    prices.insert(
        "BOND".to_string(),
        (0..n).map(|i| 100.0 + 0.5 * ((i as f64) * 0.9).sin() + 0.01 * i as f64).collect(),
    );
    prices.insert(
        "EQTY".to_string(),
        (0..n).map(|i| 40.0 + 2.0 * ((i as f64) * 0.4).sin() + 0.05 * i as f64).collect(),
    );
    prices.insert(
        "GOLD".to_string(),
        (0..n).map(|i| 180.0 + 4.0 * ((i as f64) * 0.25).cos()).collect(),
    );
    BacktestInput::new(
        vec!["BOND".into(), "EQTY".into(), "GOLD".into()],
        calendar(start, n),
        prices,
        vec![0.4, 0.3, 0.3],
    )
}

fn with_dividends(mut input: BacktestInput) -> BacktestInput {
    let n = input.dates.len();
    let payout: Vec<f64> = (0..n).map(|i| if i % 20 == 10 { 0.8 } else { 0.0 }).collect();
    input.dividends.insert("EQTY".to_string(), payout);
    input
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[test]
fn test_quarterly_rebalance_on_quarter_crossing() {
    let mut input = sample_input("2024-03-20", 20);
    input.rebalance.frequency = RebalanceFrequency::Quarterly;
    let out = run_backtest(&input).unwrap().result;
    let dates: Vec<&str> = out.rebalance_events.iter().map(|e| e.date.as_str()).collect();
    assert_eq!(dates, vec!["2024-04-01"]);
}

#[test]
fn test_no_quarterly_rebalance_within_quarter() {
    let mut input = sample_input("2024-04-02", 40);
    input.rebalance.frequency = RebalanceFrequency::Quarterly;
    let out = run_backtest(&input).unwrap().result;
    assert!(out.rebalance_events.is_empty());
}

// ---------------------------------------------------------------------------
// Dividends and the shadow portfolio
// ---------------------------------------------------------------------------

#[test]
fn test_shadow_matches_opposite_policy_run() {
    let mut reinvest = with_dividends(sample_input("2024-01-01", 120));
    reinvest.maintain_fixed_weights = true;
    reinvest.rebalance.frequency = RebalanceFrequency::Monthly;
    let mut accumulate = reinvest.clone();
    accumulate.reinvest_dividends = false;

    let a = run_backtest(&reinvest).unwrap().result;
    let b = run_backtest(&accumulate).unwrap().result;

    let b_final = *b.values.last().unwrap();
    let a_final = *a.values.last().unwrap();
    assert!(
        (a.shadow_final_value - b_final).abs() < 1e-6,
        "shadow {} vs opposite run {}",
        a.shadow_final_value,
        b_final
    );
    assert!((b.shadow_final_value - a_final).abs() < 1e-6);
    assert!((a.shadow_dividend_income - b.dividend_income).abs() < 1e-9);
    assert!((a.missed_opportunity - (a_final - a.shadow_final_value)).abs() < 1e-9);
    assert!(a.dividend_income > 0.0);
}

#[test]
fn test_fixed_weight_rebalances_restore_initial_weights() {
    let mut input = sample_input("2024-01-01", 100);
    input.maintain_fixed_weights = true;
    input.rebalance.transaction_cost = 0.0;
    let out = run_backtest(&input).unwrap().result;
    assert!(!out.rebalance_events.is_empty());
    for event in &out.rebalance_events {
        assert_eq!(event.status, RebalanceStatus::FixedWeights);
        for (asset, w0) in event.assets.iter().zip(input.initial_weights.iter()) {
            assert!((asset.weight_after - w0).abs() < 1e-12);
        }
    }
}

// ---------------------------------------------------------------------------
// Burn-in
// ---------------------------------------------------------------------------

#[test]
fn test_burn_in_output_rebased() {
    let mut input = sample_input("2024-01-01", 200);
    input.output_start_idx = 60;
    let out = run_backtest(&input).unwrap().result;

    assert_eq!(out.values.len(), 140);
    assert_eq!(out.returns.len(), 139);
    assert!((out.values[0] - input.initial_capital).abs() < 1e-9);
    for event in &out.rebalance_events {
        let idx = out.dates.iter().position(|d| *d == event.date).unwrap();
        assert!(
            (event.portfolio_value - out.values[idx]).abs() < 1e-6,
            "event value {} vs path value {}",
            event.portfolio_value,
            out.values[idx]
        );
    }
}

#[test]
fn test_burn_in_scales_trade_flows() {
    let full_input = sample_input("2024-01-01", 200);
    let mut sliced_input = full_input.clone();
    sliced_input.output_start_idx = 60;

    let full = run_backtest(&full_input).unwrap().result;
    let sliced = run_backtest(&sliced_input).unwrap().result;
    let scale = full_input.initial_capital / full.values[60];

    assert!(!sliced.rebalance_events.is_empty());
    for event in &sliced.rebalance_events {
        let unsliced = full
            .rebalance_events
            .iter()
            .find(|e| e.date == event.date)
            .unwrap();
        assert!((event.portfolio_value - unsliced.portfolio_value * scale).abs() < 1e-6);
        assert!((event.trading_volume - unsliced.trading_volume * scale).abs() < 1e-6);
        assert!((event.transaction_cost - unsliced.transaction_cost * scale).abs() < 1e-9);
        for (asset, raw) in event.assets.iter().zip(unsliced.assets.iter()) {
            assert!(
                (asset.trade_amount - raw.trade_amount * scale).abs() < 1e-6,
                "{} trade {} vs {} scaled",
                asset.ticker,
                asset.trade_amount,
                raw.trade_amount * scale
            );
            assert_eq!(asset.weight_after, raw.weight_after);
        }
    }
}

// ---------------------------------------------------------------------------
// Optimisers inside the loop
// ---------------------------------------------------------------------------

#[test]
fn test_es_backtest_produces_feasible_targets() {
    let mut input = sample_input("2024-01-01", 150);
    input.optimizer = OptimizerKind::Es;
    let out = run_backtest(&input).unwrap().result;
    let optimised: Vec<_> = out
        .rebalance_events
        .iter()
        .filter(|e| e.status == RebalanceStatus::Optimized)
        .collect();
    assert!(!optimised.is_empty());
    for event in optimised {
        let total: f64 = event.assets.iter().map(|a| a.weight_after).sum();
        assert!((total - 1.0).abs() < 1e-9, "weights sum to {}", total);
    }
}

#[test]
fn test_es_backtest_defaults_to_equal_risk_budgets() {
    let mut implicit = sample_input("2024-01-01", 150);
    implicit.optimizer = OptimizerKind::Es;
    let mut explicit = implicit.clone();
    explicit.target_budgets = Some(vec![1.0 / 3.0; 3]);

    let a = run_backtest(&implicit).unwrap().result;
    let b = run_backtest(&explicit).unwrap().result;
    assert_eq!(a.rebalance_events, b.rebalance_events);
    assert_eq!(a.values, b.values);
}

#[test]
fn test_expanding_window_differs_after_one_year() {
    let mut expanding = sample_input("2024-01-01", 400);
    expanding.rebalance.frequency = RebalanceFrequency::Monthly;
    let mut trailing = expanding.clone();
    trailing.lookback_years = Some(1.0);

    let a = run_backtest(&expanding).unwrap().result;
    let b = run_backtest(&trailing).unwrap().result;
    assert_eq!(a.rebalance_events.len(), b.rebalance_events.len());

    // Up to day 252 both windows cover the whole history
    let cutoff = expanding.dates[252].as_str();
    let weights = |e: &risk_budget_core::backtest::RebalanceEvent| -> Vec<f64> {
        e.assets.iter().map(|a| a.weight_after).collect()
    };
    let mut diverged = false;
    for (ea, eb) in a.rebalance_events.iter().zip(b.rebalance_events.iter()) {
        assert_eq!(ea.date, eb.date);
        if ea.date.as_str() <= cutoff {
            assert_eq!(weights(ea), weights(eb), "windows should agree on {}", ea.date);
        } else if weights(ea)
            .iter()
            .zip(weights(eb).iter())
            .any(|(x, y)| (x - y).abs() > 1e-6)
        {
            diverged = true;
        }
    }
    assert!(diverged, "expanding and one-year windows never diverged");
}

#[test]
fn test_final_risk_contributions_sum_to_one() {
    let out = run_backtest(&sample_input("2024-01-01", 150)).unwrap().result;
    let total: f64 = out.final_risk_contributions.iter().sum();
    assert!((total - 1.0).abs() < 1e-9);
    let weights: f64 = out.final_weights.iter().sum();
    assert!((weights - 1.0).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn test_price_length_mismatch_is_error() {
    let mut input = sample_input("2024-01-01", 30);
    input.prices.get_mut("GOLD").unwrap().pop();
    let err = run_backtest(&input).unwrap_err();
    assert!(err.is_data_error());
    assert!(matches!(err, RiskBudgetError::DimensionMismatch { .. }));
}

#[test]
fn test_single_date_returns_trivial_result() {
    let out = run_backtest(&sample_input("2024-01-01", 1)).unwrap();
    assert_eq!(out.result.values, vec![10_000.0]);
    assert_eq!(out.result.final_risk_contributions, vec![0.4, 0.3, 0.3]);
    assert_eq!(out.result.metrics.max_drawdown, 0.0);
}
