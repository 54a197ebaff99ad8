use chrono::{Datelike, NaiveDate};

use crate::error::RiskBudgetError;
use crate::RiskBudgetResult;

use super::config::RebalanceFrequency;

/// Parse ISO `YYYY-MM-DD` dates, naming the first offending entry on failure.
pub fn parse_dates(dates: &[String]) -> RiskBudgetResult<Vec<NaiveDate>> {
    dates
        .iter()
        .enumerate()
        .map(|(i, d)| {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|e| RiskBudgetError::DateError(format!("dates[{}] = {:?}: {}", i, d, e)))
        })
        .collect()
}

/// Whether `date` starts a new rebalance period relative to `last`.
///
/// Weekly counts elapsed calendar days; the other frequencies compare
/// calendar buckets, so Mar 31 -> Apr 1 crosses a quarter.
pub fn should_rebalance(date: NaiveDate, last: NaiveDate, frequency: RebalanceFrequency) -> bool {
    match frequency {
        RebalanceFrequency::Daily => true,
        RebalanceFrequency::Weekly => (date - last).num_days() >= 7,
        RebalanceFrequency::Monthly => date.month() != last.month() || date.year() != last.year(),
        RebalanceFrequency::Quarterly => {
            date.month0() / 3 != last.month0() / 3 || date.year() != last.year()
        }
        RebalanceFrequency::Annually => date.year() != last.year(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_quarter_boundary_triggers() {
        assert!(should_rebalance(d("2024-04-01"), d("2024-03-31"), RebalanceFrequency::Quarterly));
        assert!(!should_rebalance(d("2024-03-29"), d("2024-01-02"), RebalanceFrequency::Quarterly));
        assert!(should_rebalance(d("2025-01-02"), d("2024-12-31"), RebalanceFrequency::Quarterly));
    }

    #[test]
    fn test_monthly_and_annual_buckets() {
        assert!(should_rebalance(d("2024-02-01"), d("2024-01-31"), RebalanceFrequency::Monthly));
        assert!(!should_rebalance(d("2024-01-31"), d("2024-01-02"), RebalanceFrequency::Monthly));
        // Same month, different year
        assert!(should_rebalance(d("2025-01-15"), d("2024-01-15"), RebalanceFrequency::Monthly));
        assert!(!should_rebalance(d("2024-12-31"), d("2024-01-01"), RebalanceFrequency::Annually));
        assert!(should_rebalance(d("2025-01-01"), d("2024-12-31"), RebalanceFrequency::Annually));
    }

    #[test]
    fn test_weekly_counts_days() {
        assert!(!should_rebalance(d("2024-01-07"), d("2024-01-01"), RebalanceFrequency::Weekly));
        assert!(should_rebalance(d("2024-01-08"), d("2024-01-01"), RebalanceFrequency::Weekly));
        assert!(should_rebalance(d("2024-01-01"), d("2024-01-01"), RebalanceFrequency::Daily));
    }

    #[test]
    fn test_bad_date_is_date_error() {
        let err = parse_dates(&["2024-01-02".into(), "02/01/2024".into()]).unwrap_err();
        assert!(matches!(err, RiskBudgetError::DateError(ref m) if m.contains("dates[1]")));
    }
}
