//! Daily Risk Budget
//!
//! Caps the sum of stop_pct × leverage admitted per calendar date:
//! - Ledger keyed by date, so a new date starts from zero
//! - Gate is pass/fail only, a trade is never shrunk to fit
//! - Old dates pruned after a retention window

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Tolerance for float accumulation at the limit
const EPSILON: f64 = 1e-12;

/// Risk used per date
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskLedger {
    days: BTreeMap<NaiveDate, f64>,
}

impl RiskLedger {
    pub fn used(&self, date: NaiveDate) -> f64 {
        self.days.get(&date).copied().unwrap_or(0.0)
    }

    pub fn add(&mut self, date: NaiveDate, risk: f64) {
        *self.days.entry(date).or_insert(0.0) += risk;
    }

    /// Drop dates more than `days` before `today`
    pub fn prune_before(&mut self, today: NaiveDate, days: i64) {
        let cutoff = today - chrono::Duration::days(days.max(0));
        self.days.retain(|d, _| *d >= cutoff);
    }

    pub fn dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.days.keys()
    }
}

/// Why a trade failed the daily gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetRejection {
    pub used: f64,
    pub requested: f64,
    pub limit: f64,
}

/// Daily risk budget over a ledger
#[derive(Debug, Clone)]
pub struct DailyRiskBudget {
    limit: f64,
    retention_days: i64,
    ledger: RiskLedger,
    current_date: Option<NaiveDate>,
}

impl DailyRiskBudget {
    pub fn new(limit: f64, retention_days: i64, ledger: RiskLedger) -> Self {
        Self {
            limit,
            retention_days,
            ledger,
            current_date: None,
        }
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn ledger(&self) -> &RiskLedger {
        &self.ledger
    }

    pub fn replace_ledger(&mut self, ledger: RiskLedger) {
        self.ledger = ledger;
    }

    /// Note the active date; a change starts the new day at zero
    pub fn roll_to(&mut self, today: NaiveDate) {
        if self.current_date != Some(today) {
            if let Some(previous) = self.current_date {
                info!(
                    "Daily risk reset: {} closed at {:.4}, {} starts at {:.4}",
                    previous,
                    self.ledger.used(previous),
                    today,
                    self.ledger.used(today)
                );
            }
            self.current_date = Some(today);
            self.ledger.prune_before(today, self.retention_days);
        }
    }

    pub fn used(&self, date: NaiveDate) -> f64 {
        self.ledger.used(date)
    }

    pub fn remaining(&self, date: NaiveDate) -> f64 {
        (self.limit - self.used(date)).max(0.0)
    }

    /// Pass/fail for adding `risk` on `date`
    pub fn check(&self, date: NaiveDate, risk: f64) -> Result<(), BudgetRejection> {
        let used = self.used(date);
        if !risk.is_finite() || risk < 0.0 || used + risk > self.limit + EPSILON {
            return Err(BudgetRejection { used, requested: risk, limit: self.limit });
        }
        Ok(())
    }

    /// Book risk for an admitted trade
    pub fn commit(&mut self, date: NaiveDate, risk: f64) {
        self.roll_to(date);
        self.ledger.add(date, risk);
        debug!("Daily risk {} now {:.4} / {:.4}", date, self.used(date), self.limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, d).unwrap()
    }

    #[test]
    fn test_first_violating_trade_rejected() {
        let mut budget = DailyRiskBudget::new(0.01, 30, RiskLedger::default());
        for _ in 0..3 {
            budget.check(day(1), 0.003).unwrap();
            budget.commit(day(1), 0.003);
        }
        let rejection = budget.check(day(1), 0.003).unwrap_err();
        assert!((rejection.used - 0.009).abs() < 1e-12);
        assert!((budget.remaining(day(1)) - 0.001).abs() < 1e-12);
        // Smaller trade still fits
        assert!(budget.check(day(1), 0.001).is_ok());
    }

    #[test]
    fn test_rollover_starts_at_zero() {
        let mut budget = DailyRiskBudget::new(0.01, 30, RiskLedger::default());
        budget.commit(day(1), 0.01);
        assert!(budget.check(day(1), 0.001).is_err());
        budget.roll_to(day(2));
        assert_eq!(budget.used(day(2)), 0.0);
        assert!(budget.check(day(2), 0.01).is_ok());
    }

    #[test]
    fn test_exact_limit_admitted() {
        let budget = DailyRiskBudget::new(0.01, 30, RiskLedger::default());
        assert!(budget.check(day(1), 0.01).is_ok());
        assert!(budget.check(day(1), 0.0100001).is_err());
    }

    #[test]
    fn test_retention_prunes_old_dates() {
        let mut ledger = RiskLedger::default();
        ledger.add(day(1), 0.005);
        ledger.add(day(20), 0.005);
        let mut budget = DailyRiskBudget::new(0.01, 5, ledger);
        budget.roll_to(day(22));
        assert_eq!(budget.ledger().dates().count(), 1);
        assert_eq!(budget.used(day(1)), 0.0);
    }
}
