use serde::{Deserialize, Serialize};

use crate::error::RiskBudgetError;
use crate::types::{Rate, EPSILON, TRADING_DAYS_PER_YEAR};
use crate::RiskBudgetResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

const DEFAULT_WORST_WINDOW_DAYS: usize = 30;

/// Largest peak-to-trough decline of a value series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownResult {
    /// Decline as a positive fraction of the peak
    pub max_drawdown: Rate,
    pub peak_index: usize,
    pub trough_index: usize,
}

/// Input for a standalone drawdown calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawdownInput {
    pub values: Vec<f64>,
}

/// Input for the worst-window scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorstPeriodInput {
    pub values: Vec<f64>,
    pub dates: Vec<String>,
    #[serde(default = "default_window_days")]
    pub window_days: usize,
}

fn default_window_days() -> usize {
    DEFAULT_WORST_WINDOW_DAYS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorstPeriod {
    pub start_date: String,
    pub end_date: String,
    /// Signed relative change over the window (negative for a loss)
    pub loss: Rate,
}

/// Summary statistics of a backtest value path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_return: Rate,
    pub annualized_return: Rate,
    pub annualized_volatility: Rate,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown: Rate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_drawdown_peak_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_drawdown_trough_date: Option<String>,
}

impl BacktestMetrics {
    /// All-zero metrics for a path too short to measure.
    pub fn zero() -> Self {
        Self {
            total_return: 0.0,
            annualized_return: 0.0,
            annualized_volatility: 0.0,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            calmar_ratio: 0.0,
            max_drawdown: 0.0,
            max_drawdown_peak_date: None,
            max_drawdown_trough_date: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Max drawdown via a single forward scan that tracks the running peak.
pub fn calculate_max_drawdown(values: &[f64]) -> DrawdownResult {
    let mut result = DrawdownResult {
        max_drawdown: 0.0,
        peak_index: 0,
        trough_index: 0,
    };
    let Some(&first) = values.first() else {
        return result;
    };

    let mut peak = first;
    let mut peak_index = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > peak {
            peak = v;
            peak_index = i;
        }
        if peak > EPSILON {
            let dd = (peak - v) / peak;
            if dd > result.max_drawdown {
                result = DrawdownResult {
                    max_drawdown: dd,
                    peak_index,
                    trough_index: i,
                };
            }
        }
    }
    result
}

/// Relative change from first to last value.
pub fn total_return(values: &[f64]) -> Rate {
    match (values.first(), values.last()) {
        (Some(&first), Some(&last)) if values.len() >= 2 && first.abs() > EPSILON => {
            last / first - 1.0
        }
        _ => 0.0,
    }
}

/// (1 + total_return)^(252 / periods) - 1, where `periods` is the number of
/// daily steps in the path.
pub fn annualized_return(total_return: Rate, periods: usize) -> Rate {
    if periods == 0 {
        return 0.0;
    }
    let growth = 1.0 + total_return;
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(TRADING_DAYS_PER_YEAR / periods as f64) - 1.0
}

/// Sample standard deviation of daily returns scaled by sqrt(252).
pub fn annualized_volatility(returns: &[f64]) -> Rate {
    sample_std_dev(returns) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Return over volatility with a zero risk-free rate; 0 for a flat path.
pub fn sharpe_ratio(annualized_return: Rate, annualized_volatility: Rate) -> f64 {
    if annualized_volatility > EPSILON {
        annualized_return / annualized_volatility
    } else {
        0.0
    }
}

/// Like Sharpe but only penalises downside dispersion (target return 0).
pub fn sortino_ratio(annualized_return: Rate, returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let downside = returns
        .iter()
        .map(|r| r.min(0.0).powi(2))
        .sum::<f64>()
        / returns.len() as f64;
    let downside_dev = downside.sqrt() * TRADING_DAYS_PER_YEAR.sqrt();
    if downside_dev > EPSILON {
        annualized_return / downside_dev
    } else {
        0.0
    }
}

pub fn calmar_ratio(annualized_return: Rate, max_drawdown: Rate) -> f64 {
    if max_drawdown > EPSILON {
        annualized_return / max_drawdown
    } else {
        0.0
    }
}

/// Annualised volatility of the trailing `window` returns.
pub fn rolling_volatility(returns: &[f64], window: usize) -> Rate {
    annualized_volatility(trailing(returns, window))
}

/// Annualised Sharpe over the trailing `window` returns.
pub fn rolling_sharpe(returns: &[f64], window: usize) -> f64 {
    let tail = trailing(returns, window);
    if tail.is_empty() {
        return 0.0;
    }
    let mean = tail.iter().sum::<f64>() / tail.len() as f64;
    sharpe_ratio(mean * TRADING_DAYS_PER_YEAR, annualized_volatility(tail))
}

/// V_last / V_{last - lookback} - 1, with the lookback clamped to the path.
pub fn period_return(values: &[f64], lookback: usize) -> Rate {
    if values.len() < 2 {
        return 0.0;
    }
    let last = values.len() - 1;
    let start = last.saturating_sub(lookback);
    let base = values[start];
    if base.abs() > EPSILON {
        values[last] / base - 1.0
    } else {
        0.0
    }
}

/// Full metric set for a value path and its daily returns.
pub fn summarize(values: &[f64], returns: &[f64], dates: &[String]) -> BacktestMetrics {
    if values.len() < 2 {
        return BacktestMetrics::zero();
    }
    let total = total_return(values);
    let ann_return = annualized_return(total, values.len() - 1);
    let ann_vol = annualized_volatility(returns);
    let drawdown = calculate_max_drawdown(values);
    let has_drawdown = drawdown.max_drawdown > 0.0;

    BacktestMetrics {
        total_return: total,
        annualized_return: ann_return,
        annualized_volatility: ann_vol,
        sharpe_ratio: sharpe_ratio(ann_return, ann_vol),
        sortino_ratio: sortino_ratio(ann_return, returns),
        calmar_ratio: calmar_ratio(ann_return, drawdown.max_drawdown),
        max_drawdown: drawdown.max_drawdown,
        max_drawdown_peak_date: dates
            .get(drawdown.peak_index)
            .filter(|_| has_drawdown)
            .cloned(),
        max_drawdown_trough_date: dates
            .get(drawdown.trough_index)
            .filter(|_| has_drawdown)
            .cloned(),
    }
}

/// Window with the most negative relative change. The window is clamped to
/// `len - 1` so short series still produce one full-length window.
pub fn find_worst_period(
    values: &[f64],
    dates: &[String],
    window_days: usize,
) -> RiskBudgetResult<WorstPeriod> {
    if values.len() < 2 {
        return Err(RiskBudgetError::InsufficientData(
            "At least 2 values required to find a worst period".into(),
        ));
    }
    if dates.len() != values.len() {
        return Err(RiskBudgetError::mismatch("dates", values.len(), dates.len()));
    }
    if window_days == 0 {
        return Err(RiskBudgetError::invalid("window_days", "Must be at least 1"));
    }

    let window = window_days.min(values.len() - 1);
    let mut worst: Option<(usize, f64)> = None;
    for start in 0..values.len() - window {
        let base = values[start];
        if base.abs() <= EPSILON {
            continue;
        }
        let change = values[start + window] / base - 1.0;
        if worst.map_or(true, |(_, w)| change < w) {
            worst = Some((start, change));
        }
    }

    let (start, loss) = worst.ok_or_else(|| {
        RiskBudgetError::InsufficientData("Every window starts at a zero value".into())
    })?;
    Ok(WorstPeriod {
        start_date: dates[start].clone(),
        end_date: dates[start + window].clone(),
        loss,
    })
}

pub fn find_worst_period_from_input(input: &WorstPeriodInput) -> RiskBudgetResult<WorstPeriod> {
    find_worst_period(&input.values, &input.dates, input.window_days)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn trailing(values: &[f64], window: usize) -> &[f64] {
    &values[values.len().saturating_sub(window)..]
}

fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.max(0.0).sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("2024-01-{:02}", i + 1)).collect()
    }

    #[test]
    fn test_max_drawdown_worked_example() {
        let dd = calculate_max_drawdown(&[100.0, 110.0, 105.0, 90.0, 95.0, 120.0]);
        assert!((dd.max_drawdown - 20.0 / 110.0).abs() < 1e-12);
        assert_eq!(dd.peak_index, 1);
        assert_eq!(dd.trough_index, 3);
    }

    #[test]
    fn test_max_drawdown_monotone_path() {
        let dd = calculate_max_drawdown(&[1.0, 2.0, 3.0]);
        assert_eq!(dd.max_drawdown, 0.0);
        assert_eq!(calculate_max_drawdown(&[]).max_drawdown, 0.0);
    }

    #[test]
    fn test_annualized_return_one_year() {
        // 252 steps with 10% growth annualises to 10%
        assert!((annualized_return(0.10, 252) - 0.10).abs() < 1e-12);
        assert_eq!(annualized_return(0.10, 0), 0.0);
    }

    #[test]
    fn test_flat_path_has_zero_ratios() {
        let values = vec![100.0; 5];
        let returns = vec![0.0; 4];
        let m = summarize(&values, &returns, &dates(5));
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.annualized_volatility, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.sortino_ratio, 0.0);
        assert!(m.max_drawdown_peak_date.is_none());
    }

    #[test]
    fn test_summarize_reports_drawdown_dates() {
        let values = vec![100.0, 110.0, 105.0, 90.0, 95.0, 120.0];
        let returns: Vec<f64> = values.windows(2).map(|w| w[1] / w[0] - 1.0).collect();
        let m = summarize(&values, &returns, &dates(6));
        assert_eq!(m.max_drawdown_peak_date.as_deref(), Some("2024-01-02"));
        assert_eq!(m.max_drawdown_trough_date.as_deref(), Some("2024-01-04"));
        assert!((m.total_return - 0.2).abs() < 1e-12);
        assert!(m.calmar_ratio > 0.0);
    }

    #[test]
    fn test_period_return_clamps_lookback() {
        let values = vec![100.0, 105.0, 110.0];
        assert!((period_return(&values, 60) - 0.10).abs() < 1e-12);
        assert!((period_return(&values, 1) - (110.0 / 105.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_worst_period_finds_most_negative_window() {
        let values = vec![100.0, 120.0, 90.0, 95.0, 100.0];
        let worst = find_worst_period(&values, &dates(5), 1).unwrap();
        assert_eq!(worst.start_date, "2024-01-02");
        assert_eq!(worst.end_date, "2024-01-03");
        assert!((worst.loss + 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_worst_period_window_clamped() {
        let values = vec![100.0, 80.0, 90.0];
        let worst = find_worst_period(&values, &dates(3), 30).unwrap();
        assert_eq!(worst.start_date, "2024-01-01");
        assert_eq!(worst.end_date, "2024-01-03");
        assert!((worst.loss + 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_worst_period_validation() {
        assert!(find_worst_period(&[100.0], &dates(1), 30).is_err());
        assert!(find_worst_period(&[100.0, 90.0], &dates(3), 30).is_err());
        assert!(find_worst_period(&[100.0, 90.0], &dates(2), 0).is_err());
    }

    #[test]
    fn test_rolling_volatility_uses_trailing_window() {
        let mut returns = vec![0.05, -0.05, 0.05, -0.05];
        returns.extend(vec![0.0; 10]);
        assert_eq!(rolling_volatility(&returns, 10), 0.0);
        assert!(rolling_volatility(&returns, 14) > 0.0);
    }
}
