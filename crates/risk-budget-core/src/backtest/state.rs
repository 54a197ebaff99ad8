//! Portfolio holdings advanced one trading day at a time.
//!
//! Every step consumes the state and returns the next one, so the actual and
//! shadow portfolios run through identical code with only the dividend
//! policy differing.

use serde::{Deserialize, Serialize};

use crate::types::{Money, EPSILON};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DividendPolicy {
    /// Buy more of the paying asset at the previous close
    Reinvest,
    /// Hold dividends as idle cash until the next rebalance
    Accumulate,
}

impl DividendPolicy {
    pub fn from_reinvest(reinvest: bool) -> Self {
        if reinvest {
            DividendPolicy::Reinvest
        } else {
            DividendPolicy::Accumulate
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            DividendPolicy::Reinvest => DividendPolicy::Accumulate,
            DividendPolicy::Accumulate => DividendPolicy::Reinvest,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    pub shares: Vec<f64>,
    pub cash: Money,
    /// Cumulative dividend cash received, whatever the policy
    pub dividend_income: Money,
    pub policy: DividendPolicy,
}

/// Dollar flows of one rebalance.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeSummary {
    /// target$ - current$, per asset
    pub trade_amounts: Vec<Money>,
    pub volume: Money,
    pub cost: Money,
}

impl SimulationState {
    /// Buy `weights` of `capital` at `prices`. Assets with no price stay empty
    /// and their allocation is held as cash.
    pub fn allocate(capital: Money, weights: &[f64], prices: &[f64], policy: DividendPolicy) -> Self {
        let mut cash = 0.0;
        let shares = weights
            .iter()
            .zip(prices.iter())
            .map(|(w, p)| {
                if *p > EPSILON {
                    capital * w / p
                } else {
                    cash += capital * w;
                    0.0
                }
            })
            .collect();
        Self {
            shares,
            cash,
            dividend_income: 0.0,
            policy,
        }
    }

    /// Cash plus marked-to-market holdings.
    pub fn value(&self, prices: &[f64]) -> Money {
        self.cash
            + self
                .shares
                .iter()
                .zip(prices.iter())
                .map(|(s, p)| s * p)
                .sum::<f64>()
    }

    /// Holdings as fractions of total value; zero value gives zero weights.
    pub fn weights(&self, prices: &[f64]) -> Vec<f64> {
        let total = self.value(prices);
        self.shares
            .iter()
            .zip(prices.iter())
            .map(|(s, p)| if total > EPSILON { s * p / total } else { 0.0 })
            .collect()
    }

    /// Credit per-share `dividends`. Reinvested cash buys shares at
    /// `prev_prices`; a non-positive previous price leaves the cash idle.
    pub fn accrue_dividends(mut self, dividends: &[f64], prev_prices: &[f64]) -> Self {
        for i in 0..self.shares.len() {
            let payment = self.shares[i] * dividends[i];
            if payment == 0.0 {
                continue;
            }
            self.dividend_income += payment;
            match self.policy {
                DividendPolicy::Reinvest if prev_prices[i] > EPSILON => {
                    self.shares[i] += payment / prev_prices[i];
                }
                _ => self.cash += payment,
            }
        }
        self
    }

    /// Trade to `targets` at `prices`. Volume is measured against the
    /// pre-cost value; the cost is then deducted and the remainder (idle
    /// cash included) is invested at the target weights.
    pub fn rebalance(
        mut self,
        targets: &[f64],
        prices: &[f64],
        cost_fraction: f64,
    ) -> (Self, TradeSummary) {
        let value = self.value(prices);
        let trade_amounts: Vec<Money> = targets
            .iter()
            .zip(self.shares.iter())
            .zip(prices.iter())
            .map(|((w, s), p)| w * value - s * p)
            .collect();
        let volume: Money = trade_amounts.iter().map(|a| a.abs()).sum();
        let cost = volume * cost_fraction;

        let investable = value - cost;
        let mut cash = 0.0;
        for i in 0..self.shares.len() {
            if prices[i] > EPSILON {
                self.shares[i] = investable * targets[i] / prices[i];
            } else {
                self.shares[i] = 0.0;
                cash += investable * targets[i];
            }
        }
        self.cash = cash;

        (
            self,
            TradeSummary {
                trade_amounts,
                volume,
                cost,
            },
        )
    }
}
