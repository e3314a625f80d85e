//! Budget variance: spending against monthly category limits.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::records::{round_cents, Budget, Transaction};

/// Share of the limit at which a budget turns to `Warning`
pub const WARNING_THRESHOLD: f64 = 0.80;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    /// Under 80% of the limit
    Good,
    /// 80% to 100% inclusive
    Warning,
    /// Over the limit
    Over,
}

impl BudgetStatus {
    pub fn from_usage(spent: f64, limit: f64) -> Self {
        if limit <= 0.0 {
            return if spent > 0.0 { BudgetStatus::Over } else { BudgetStatus::Good };
        }
        let ratio = spent / limit;
        if ratio > 1.0 {
            BudgetStatus::Over
        } else if ratio >= WARNING_THRESHOLD {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Good
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetVariance {
    pub category: String,
    pub month: u32,
    pub year: i32,
    pub limit: f64,
    pub spent: f64,
    /// Negative when over budget
    pub remaining: f64,
    /// `None` for a zero limit
    pub percent_used: Option<f64>,
    pub transaction_count: usize,
    pub status: BudgetStatus,
}

fn same_category(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Compare each budget with the expenses of its category and month.
///
/// Results follow the order of `budgets`.
pub fn calculate_budget_variance(budgets: &[Budget], transactions: &[Transaction]) -> Result<Vec<BudgetVariance>> {
    budgets.iter().try_for_each(Budget::validate)?;
    transactions.iter().try_for_each(Transaction::validate)?;

    let out = budgets
        .iter()
        .map(|budget| {
            let matching: Vec<&Transaction> = transactions
                .iter()
                .filter(|t| {
                    t.is_expense()
                        && t.in_month(budget.month, budget.year)
                        && same_category(&t.category, &budget.category)
                })
                .collect();
            let spent = round_cents(matching.iter().map(|t| t.amount).sum());
            let limit = budget.monthly_limit;
            BudgetVariance {
                category: budget.category.clone(),
                month: budget.month,
                year: budget.year,
                limit,
                spent,
                remaining: round_cents(limit - spent),
                percent_used: (limit > 0.0).then(|| spent / limit * 100.0),
                transaction_count: matching.len(),
                status: BudgetStatus::from_usage(spent, limit),
            }
        })
        .collect();
    Ok(out)
}

/// Totals across a set of variances
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BudgetSummary {
    pub total_limit: f64,
    pub total_spent: f64,
    pub total_remaining: f64,
    pub good: usize,
    pub warning: usize,
    pub over: usize,
}

pub fn summarize_budgets(variances: &[BudgetVariance]) -> BudgetSummary {
    let mut summary = BudgetSummary::default();
    for v in variances {
        summary.total_limit += v.limit;
        summary.total_spent += v.spent;
        match v.status {
            BudgetStatus::Good => summary.good += 1,
            BudgetStatus::Warning => summary.warning += 1,
            BudgetStatus::Over => summary.over += 1,
        }
    }
    summary.total_limit = round_cents(summary.total_limit);
    summary.total_spent = round_cents(summary.total_spent);
    summary.total_remaining = round_cents(summary.total_limit - summary.total_spent);
    summary
}
