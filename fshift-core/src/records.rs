//! Plain value records consumed by the calculation functions.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_amount, ensure_rate, CalcError, Result};

/// A debt account (credit card, loan, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebtAccount {
    pub name: String,
    /// Outstanding balance; zero means paid off
    pub balance: f64,
    /// Annual percentage rate, in percent (24.0 = 24%)
    #[serde(alias = "interest_rate")]
    pub apr: f64,
    #[serde(default)]
    pub minimum_payment: f64,
}

impl DebtAccount {
    /// Create a new DebtAccount
    pub fn new(name: impl Into<String>, balance: f64, apr: f64, minimum_payment: f64) -> Self {
        Self {
            name: name.into(),
            balance,
            apr,
            minimum_payment,
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure_amount("balance", self.balance)?;
        ensure_rate("apr", self.apr)?;
        ensure_amount("minimum_payment", self.minimum_payment)
    }

    /// Paid-off accounts are excluded from active calculations
    pub fn is_active(&self) -> bool {
        self.balance > 0.0
    }

    /// Monthly periodic rate as a fraction
    pub fn monthly_rate(&self) -> f64 {
        self.apr / 100.0 / 12.0
    }
}

/// Direction of a transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

/// A single income or expense entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Always non-negative; direction is carried by `kind`
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
}

impl Transaction {
    pub fn expense(amount: f64, category: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            amount,
            kind: TransactionType::Expense,
            category: category.into(),
            date,
            description: String::new(),
        }
    }

    pub fn income(amount: f64, category: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            amount,
            kind: TransactionType::Income,
            category: category.into(),
            date,
            description: String::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure_amount("transaction.amount", self.amount)
    }

    pub fn is_expense(&self) -> bool {
        self.kind == TransactionType::Expense
    }

    pub fn is_income(&self) -> bool {
        self.kind == TransactionType::Income
    }

    /// True if the transaction falls in the given calendar month
    pub fn in_month(&self, month: u32, year: i32) -> bool {
        self.date.month() == month && self.date.year() == year
    }
}

/// Monthly spending limit for one category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Budget {
    pub category: String,
    pub monthly_limit: f64,
    /// 1-12
    pub month: u32,
    pub year: i32,
}

impl Budget {
    pub fn new(category: impl Into<String>, monthly_limit: f64, month: u32, year: i32) -> Self {
        Self {
            category: category.into(),
            monthly_limit,
            month,
            year,
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure_amount("monthly_limit", self.monthly_limit)?;
        if !(1..=12).contains(&self.month) {
            return Err(CalcError::InvalidDateRange(format!(
                "budget month {} is outside 1-12",
                self.month
            )));
        }
        Ok(())
    }
}

/// A savings goal with a deadline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    #[serde(default)]
    pub name: String,
    pub target_amount: f64,
    /// May exceed `target_amount` (over-funded)
    #[serde(default)]
    pub current_amount: f64,
    pub target_date: NaiveDate,
    /// Current savings rate per month, if known
    #[serde(default)]
    pub monthly_contribution: Option<f64>,
}

impl Goal {
    pub fn new(
        name: impl Into<String>,
        target_amount: f64,
        current_amount: f64,
        target_date: NaiveDate,
    ) -> Self {
        Self {
            name: name.into(),
            target_amount,
            current_amount,
            target_date,
            monthly_contribution: None,
        }
    }

    pub fn with_monthly_contribution(mut self, amount: f64) -> Self {
        self.monthly_contribution = Some(amount);
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure_amount("target_amount", self.target_amount)?;
        ensure_amount("current_amount", self.current_amount)?;
        if let Some(c) = self.monthly_contribution {
            ensure_amount("monthly_contribution", c)?;
        }
        Ok(())
    }

    /// Amount still needed; zero when over-funded
    pub fn remaining(&self) -> f64 {
        (self.target_amount - self.current_amount).max(0.0)
    }
}

/// Round a dollar amount to whole cents.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_debt_account_validation() {
        assert!(DebtAccount::new("Visa", 1000.0, 24.0, 50.0).validate().is_ok());
        assert!(DebtAccount::new("Visa", -1.0, 24.0, 50.0).validate().is_err());
        assert!(DebtAccount::new("Visa", 1.0, f64::NAN, 50.0).validate().is_err());
        assert!(!DebtAccount::new("Paid", 0.0, 10.0, 0.0).is_active());
    }

    #[test]
    fn test_debt_account_accepts_interest_rate_alias() {
        let json = r#"{"name":"Loan","balance":500.0,"interest_rate":12.0,"minimum_payment":25.0}"#;
        let debt: DebtAccount = serde_json::from_str(json).unwrap();
        assert_eq!(debt.apr, 12.0);
        assert!((debt.monthly_rate() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_transaction_serde_uses_type_field() {
        let json = r#"{"amount":12.5,"type":"expense","category":"Food","date":"2026-03-04"}"#;
        let txn: Transaction = serde_json::from_str(json).unwrap();
        assert!(txn.is_expense());
        assert!(txn.in_month(3, 2026));
        assert!(!txn.in_month(4, 2026));
    }

    #[test]
    fn test_budget_month_validation() {
        assert!(Budget::new("Food", 400.0, 12, 2026).validate().is_ok());
        assert!(matches!(
            Budget::new("Food", 400.0, 13, 2026).validate(),
            Err(CalcError::InvalidDateRange(_))
        ));
    }

    #[test]
    fn test_goal_remaining_never_negative() {
        let goal = Goal::new("Trip", 1000.0, 1500.0, date(2026, 12, 1));
        assert_eq!(goal.remaining(), 0.0);
    }

    #[test]
    fn test_round_cents() {
        assert_eq!(round_cents(10.005_1), 10.01);
        assert_eq!(round_cents(3.333), 3.33);
        assert_eq!(round_cents(0.0), 0.0);
    }
}
