//! Debt payoff projection (avalanche / snowball with payment waterfall).
//!
//! The monthly budget is the sum of the active debts' minimum payments plus
//! the extra payment, and stays constant: once a debt is paid off its minimum
//! rolls, together with the extra, onto the next debt in priority order.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ensure_amount, ensure_rate, CalcError, Result};
use crate::records::{round_cents, DebtAccount};

/// Safety cap on simulated months (50 years)
pub const MAX_PAYOFF_MONTHS: u32 = 600;

/// Order in which extra payments are directed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PayoffStrategy {
    /// Highest APR first
    Avalanche,
    /// Smallest balance first
    Snowball,
}

impl PayoffStrategy {
    /// Stable sort of active debts into payoff priority.
    pub fn prioritize(&self, debts: &[DebtAccount]) -> Vec<DebtAccount> {
        let mut active: Vec<DebtAccount> = debts.iter().filter(|d| d.is_active()).cloned().collect();
        match self {
            PayoffStrategy::Avalanche => active.sort_by(|a, b| b.apr.total_cmp(&a.apr)),
            PayoffStrategy::Snowball => active.sort_by(|a, b| a.balance.total_cmp(&b.balance)),
        }
        active
    }
}

impl fmt::Display for PayoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayoffStrategy::Avalanche => write!(f, "avalanche"),
            PayoffStrategy::Snowball => write!(f, "snowball"),
        }
    }
}

impl FromStr for PayoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "avalanche" => Ok(PayoffStrategy::Avalanche),
            "snowball" => Ok(PayoffStrategy::Snowball),
            other => Err(format!("unknown payoff strategy '{other}' (expected avalanche or snowball)")),
        }
    }
}

/// One debt's activity in one month
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebtPayment {
    pub name: String,
    pub interest: f64,
    pub payment: f64,
    pub ending_balance: f64,
}

/// Ledger row for one simulated month
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthLedger {
    /// 1-based month index
    pub month: u32,
    pub date: NaiveDate,
    pub payments: Vec<DebtPayment>,
    pub interest: f64,
    pub paid: f64,
    pub remaining_balance: f64,
}

/// Per-debt outcome of a payoff plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebtSummary {
    pub name: String,
    pub starting_balance: f64,
    pub apr: f64,
    pub payoff_month: u32,
    pub payoff_date: NaiveDate,
    pub interest_paid: f64,
    pub total_paid: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayoffResult {
    pub strategy: PayoffStrategy,
    pub extra_payment: f64,
    pub monthly_budget: f64,
    pub schedule: Vec<MonthLedger>,
    /// In payoff priority order
    pub debts: Vec<DebtSummary>,
    pub total_months: u32,
    pub total_interest: f64,
    pub total_paid: f64,
    pub debt_free_date: NaiveDate,
    /// Interest under minimum payments only; `None` when that never pays off
    pub minimum_only_interest: Option<f64>,
    pub minimum_only_months: Option<u32>,
    /// Interest saved versus minimum payments only
    pub strategy_savings: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Waterfall,
    MinimumOnly,
}

struct Simulation {
    schedule: Vec<MonthLedger>,
    debts: Vec<DebtSummary>,
    months: u32,
    interest: f64,
    paid: f64,
}

fn add_months(start: NaiveDate, months: u32) -> Result<NaiveDate> {
    start
        .checked_add_months(Months::new(months))
        .ok_or_else(|| CalcError::InvalidDateRange(format!("{start} + {months} months overflows")))
}

/// Month-by-month simulation of debts already in priority order.
fn simulate(priority: &[DebtAccount], extra: f64, mode: Mode, start: NaiveDate) -> Result<Simulation> {
    let mut balances: Vec<f64> = priority.iter().map(|d| d.balance).collect();
    let mut interest_paid = vec![0.0; priority.len()];
    let mut total_paid = vec![0.0; priority.len()];
    let mut payoff_month: Vec<Option<u32>> = vec![None; priority.len()];
    let budget = round_cents(priority.iter().map(|d| d.minimum_payment).sum::<f64>() + extra);

    let mut schedule = Vec::new();
    let mut month = 0u32;

    while balances.iter().any(|b| *b > 0.0) {
        if month == MAX_PAYOFF_MONTHS {
            return Err(CalcError::MonthCapExceeded {
                months: MAX_PAYOFF_MONTHS,
            });
        }
        month += 1;

        let mut interest = vec![0.0; priority.len()];
        let mut payment = vec![0.0; priority.len()];

        for (i, debt) in priority.iter().enumerate() {
            if balances[i] > 0.0 {
                interest[i] = round_cents(balances[i] * debt.monthly_rate());
                balances[i] = round_cents(balances[i] + interest[i]);
            }
        }

        let mut pool = budget;
        for (i, debt) in priority.iter().enumerate() {
            if balances[i] > 0.0 {
                let pay = debt.minimum_payment.min(balances[i]);
                balances[i] = round_cents(balances[i] - pay);
                payment[i] += pay;
                pool = round_cents(pool - pay);
            }
        }

        if mode == Mode::Waterfall {
            for i in 0..priority.len() {
                if pool <= 0.0 {
                    break;
                }
                if balances[i] > 0.0 {
                    let pay = pool.min(balances[i]);
                    balances[i] = round_cents(balances[i] - pay);
                    payment[i] += pay;
                    pool = round_cents(pool - pay);
                }
            }
        }

        check_convergence(priority, &balances, &interest, &payment, budget, mode)?;

        let mut rows = Vec::new();
        for (i, debt) in priority.iter().enumerate() {
            if interest[i] == 0.0 && payment[i] == 0.0 && payoff_month[i].is_some() {
                continue;
            }
            interest_paid[i] += interest[i];
            total_paid[i] += payment[i];
            if balances[i] <= 0.0 && payoff_month[i].is_none() {
                payoff_month[i] = Some(month);
            }
            rows.push(DebtPayment {
                name: debt.name.clone(),
                interest: interest[i],
                payment: round_cents(payment[i]),
                ending_balance: balances[i],
            });
        }

        schedule.push(MonthLedger {
            month,
            date: add_months(start, month)?,
            interest: round_cents(interest.iter().sum()),
            paid: round_cents(payment.iter().sum()),
            remaining_balance: round_cents(balances.iter().sum()),
            payments: rows,
        });
    }

    let mut debts = Vec::with_capacity(priority.len());
    for (i, debt) in priority.iter().enumerate() {
        let m = payoff_month[i].unwrap_or(month);
        debts.push(DebtSummary {
            name: debt.name.clone(),
            starting_balance: debt.balance,
            apr: debt.apr,
            payoff_month: m,
            payoff_date: add_months(start, m)?,
            interest_paid: round_cents(interest_paid[i]),
            total_paid: round_cents(total_paid[i]),
        });
    }

    Ok(Simulation {
        schedule,
        months: month,
        interest: round_cents(interest_paid.iter().sum()),
        paid: round_cents(total_paid.iter().sum()),
        debts,
    })
}

/// Fail when a month shows the schedule can never finish.
///
/// In waterfall mode the targeted debt (first still owing) diverges when its
/// payment does not beat its interest and either the whole budget cannot beat
/// it or no other debt is shrinking to free up payment capacity.
fn check_convergence(
    priority: &[DebtAccount],
    balances: &[f64],
    interest: &[f64],
    payment: &[f64],
    budget: f64,
    mode: Mode,
) -> Result<()> {
    let stuck = |i: usize| balances[i] > 0.0 && payment[i] <= interest[i];

    let failing = match mode {
        Mode::MinimumOnly => (0..priority.len()).find(|&i| stuck(i)),
        Mode::Waterfall => {
            let target = (0..priority.len()).find(|&i| balances[i] > 0.0);
            target.filter(|&t| {
                stuck(t) && {
                    let others_shrinking = (0..priority.len()).any(|i| i != t && payment[i] > interest[i]);
                    budget <= interest[t] || !others_shrinking
                }
            })
        }
    };

    match failing {
        Some(i) => Err(CalcError::NonConvergent {
            debt: priority[i].name.clone(),
            payment: round_cents(payment[i]),
            interest: interest[i],
        }),
        None => Ok(()),
    }
}

fn validate_inputs(debts: &[DebtAccount], extra_payment: f64) -> Result<()> {
    debts.iter().try_for_each(DebtAccount::validate)?;
    ensure_amount("extra_payment", extra_payment)
}

/// Project a payoff schedule for `debts` under `strategy`, starting the month after `start`.
pub fn calculate_debt_payoff(
    debts: &[DebtAccount],
    strategy: PayoffStrategy,
    extra_payment: f64,
    start: NaiveDate,
) -> Result<PayoffResult> {
    validate_inputs(debts, extra_payment)?;

    let priority = strategy.prioritize(debts);
    let sim = simulate(&priority, extra_payment, Mode::Waterfall, start)?;

    let baseline = simulate(&priority, 0.0, Mode::MinimumOnly, start).ok();
    let minimum_only_interest = baseline.as_ref().map(|b| b.interest);
    let strategy_savings = minimum_only_interest.map(|base| round_cents((base - sim.interest).max(0.0)));

    Ok(PayoffResult {
        strategy,
        extra_payment,
        monthly_budget: round_cents(priority.iter().map(|d| d.minimum_payment).sum::<f64>() + extra_payment),
        debt_free_date: add_months(start, sim.months)?,
        total_months: sim.months,
        total_interest: sim.interest,
        total_paid: sim.paid,
        schedule: sim.schedule,
        debts: sim.debts,
        minimum_only_interest,
        minimum_only_months: baseline.map(|b| b.months),
        strategy_savings,
    })
}

/// Both strategies side by side
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyComparison {
    pub avalanche: PayoffResult,
    pub snowball: PayoffResult,
    /// Cheaper in interest; avalanche on ties
    pub recommended: PayoffStrategy,
    /// Snowball interest minus avalanche interest
    pub interest_difference: f64,
    /// Snowball months minus avalanche months
    pub month_difference: i64,
}

pub fn compare_strategies(debts: &[DebtAccount], extra_payment: f64, start: NaiveDate) -> Result<StrategyComparison> {
    let avalanche = calculate_debt_payoff(debts, PayoffStrategy::Avalanche, extra_payment, start)?;
    let snowball = calculate_debt_payoff(debts, PayoffStrategy::Snowball, extra_payment, start)?;
    let interest_difference = round_cents(snowball.total_interest - avalanche.total_interest);
    let recommended = if interest_difference >= 0.0 {
        PayoffStrategy::Avalanche
    } else {
        PayoffStrategy::Snowball
    };
    Ok(StrategyComparison {
        month_difference: i64::from(snowball.total_months) - i64::from(avalanche.total_months),
        interest_difference,
        recommended,
        avalanche,
        snowball,
    })
}

/// Closed-form months to pay off one balance with a constant payment.
///
/// `n = -ln(1 - r*B/P) / ln(1 + r)` with `r` the monthly rate. Returns a
/// fractional month count; callers usually take the ceiling.
pub fn estimate_months(balance: f64, apr: f64, payment: f64) -> Result<f64> {
    ensure_amount("balance", balance)?;
    ensure_rate("apr", apr)?;
    ensure_amount("payment", payment)?;

    if balance == 0.0 {
        return Ok(0.0);
    }
    let r = apr / 100.0 / 12.0;
    let interest = r * balance;
    if payment <= interest {
        return Err(CalcError::NonConvergent {
            debt: "balance".to_string(),
            payment,
            interest: round_cents(interest),
        });
    }
    if r == 0.0 {
        return Ok(balance / payment);
    }
    Ok(-(1.0 - interest / payment).ln() / (1.0 + r).ln())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
    }

    fn three_debts() -> Vec<DebtAccount> {
        vec![
            DebtAccount::new("A", 1000.0, 24.0, 50.0),
            DebtAccount::new("B", 500.0, 12.0, 25.0),
            DebtAccount::new("C", 2000.0, 6.0, 60.0),
        ]
    }

    #[test]
    fn test_avalanche_first_month_ledger() {
        let result = calculate_debt_payoff(&three_debts(), PayoffStrategy::Avalanche, 100.0, start()).unwrap();
        assert_eq!(result.monthly_budget, 235.0);

        let first = &result.schedule[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        let a = &first.payments[0];
        assert_eq!(a.name, "A");
        assert_eq!(a.interest, 20.0);
        assert_eq!(a.payment, 150.0);
        assert_eq!(a.ending_balance, 870.0);
        let b = &first.payments[1];
        assert_eq!((b.interest, b.payment, b.ending_balance), (5.0, 25.0, 480.0));
        let c = &first.payments[2];
        assert_eq!((c.interest, c.payment, c.ending_balance), (10.0, 60.0, 1950.0));
    }

    #[test]
    fn test_avalanche_pays_a_first_matching_closed_form() {
        let result = calculate_debt_payoff(&three_debts(), PayoffStrategy::Avalanche, 100.0, start()).unwrap();
        let order: Vec<_> = result.debts.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);

        let a = &result.debts[0];
        let expected = estimate_months(1000.0, 24.0, 150.0).unwrap().ceil() as u32;
        assert_eq!(a.payoff_month, expected);
        assert_eq!(a.payoff_month, 8);
        // 7 payments of 150 plus the final 34.21
        assert_eq!(a.total_paid, 1084.21);
        assert_eq!(a.interest_paid, 84.21);
        assert!(result.debts[1].payoff_month <= result.debts[2].payoff_month);
    }

    #[test]
    fn test_waterfall_redirects_minimum_and_extra() {
        let result = calculate_debt_payoff(&three_debts(), PayoffStrategy::Avalanche, 100.0, start()).unwrap();
        // Month 8: A takes its final 34.21; the rest of A's 150 cascades to B.
        let m8 = &result.schedule[7];
        let b = m8.payments.iter().find(|p| p.name == "B").unwrap();
        assert!((b.payment - (25.0 + 150.0 - 34.21)).abs() < 0.005);
        // Month 9: B gets its minimum plus A's freed 150.
        let m9 = &result.schedule[8];
        assert!(m9.payments.iter().all(|p| p.name != "A"));
        let b9 = m9.payments.iter().find(|p| p.name == "B").unwrap();
        assert!(b9.payment == 175.0 || b9.ending_balance == 0.0);
        // The budget is spent in full while more than one month remains.
        assert_eq!(m9.paid, 235.0);
    }

    #[test]
    fn test_snowball_orders_by_balance_stably() {
        let debts = vec![
            DebtAccount::new("first", 500.0, 10.0, 20.0),
            DebtAccount::new("big", 900.0, 30.0, 30.0),
            DebtAccount::new("second", 500.0, 20.0, 20.0),
        ];
        let order: Vec<_> = PayoffStrategy::Snowball
            .prioritize(&debts)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(order, vec!["first", "second", "big"]);

        let order: Vec<_> = PayoffStrategy::Avalanche
            .prioritize(&debts)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(order, vec!["big", "second", "first"]);
    }

    #[test]
    fn test_paid_off_accounts_are_excluded() {
        let debts = vec![
            DebtAccount::new("done", 0.0, 20.0, 100.0),
            DebtAccount::new("open", 100.0, 0.0, 50.0),
        ];
        let result = calculate_debt_payoff(&debts, PayoffStrategy::Avalanche, 0.0, start()).unwrap();
        assert_eq!(result.monthly_budget, 50.0);
        assert_eq!(result.total_months, 2);
        assert_eq!(result.debts.len(), 1);
    }

    #[test]
    fn test_no_active_debts() {
        let result = calculate_debt_payoff(&[], PayoffStrategy::Snowball, 50.0, start()).unwrap();
        assert_eq!(result.total_months, 0);
        assert_eq!(result.debt_free_date, start());
        assert_eq!(result.strategy_savings, Some(0.0));
    }

    #[test]
    fn test_non_convergent_payment_is_signaled() {
        let debts = vec![DebtAccount::new("Card", 10_000.0, 24.0, 100.0)];
        let err = calculate_debt_payoff(&debts, PayoffStrategy::Avalanche, 50.0, start()).unwrap_err();
        assert_eq!(
            err,
            CalcError::NonConvergent {
                debt: "Card".to_string(),
                payment: 150.0,
                interest: 200.0,
            }
        );
    }

    #[test]
    fn test_shrinking_low_priority_debt_defers_divergence_check() {
        // A's minimum alone never covers its interest, but B pays off in two
        // months and frees enough to finish A.
        let debts = vec![
            DebtAccount::new("A", 1000.0, 24.0, 10.0),
            DebtAccount::new("B", 200.0, 0.0, 100.0),
        ];
        let result = calculate_debt_payoff(&debts, PayoffStrategy::Avalanche, 0.0, start()).unwrap();
        assert!(result.total_months > 2);
        // The baseline never pays A off.
        assert_eq!(result.minimum_only_interest, None);
        assert_eq!(result.strategy_savings, None);
    }

    #[test]
    fn test_extra_payment_saves_interest() {
        let debts = three_debts();
        let base = calculate_debt_payoff(&debts, PayoffStrategy::Avalanche, 0.0, start()).unwrap();
        let extra = calculate_debt_payoff(&debts, PayoffStrategy::Avalanche, 100.0, start()).unwrap();
        assert!(extra.total_months <= base.total_months);
        assert!(extra.total_interest < base.total_interest);
        assert!(extra.strategy_savings.unwrap() > base.strategy_savings.unwrap());
    }

    #[test]
    fn test_invalid_inputs_fail_fast() {
        let debts = vec![DebtAccount::new("bad", -5.0, 10.0, 10.0)];
        assert!(matches!(
            calculate_debt_payoff(&debts, PayoffStrategy::Avalanche, 0.0, start()),
            Err(CalcError::InvalidAmount { field: "balance", .. })
        ));
        assert!(matches!(
            calculate_debt_payoff(&three_debts(), PayoffStrategy::Avalanche, f64::NAN, start()),
            Err(CalcError::InvalidAmount { field: "extra_payment", .. })
        ));
    }

    #[test]
    fn test_compare_strategies_prefers_avalanche_on_interest() {
        let cmp = compare_strategies(&three_debts(), 100.0, start()).unwrap();
        assert!(cmp.avalanche.total_interest <= cmp.snowball.total_interest);
        assert_eq!(cmp.recommended, PayoffStrategy::Avalanche);
        assert!(cmp.interest_difference >= 0.0);
    }

    #[test]
    fn test_estimate_months_edge_cases() {
        assert_eq!(estimate_months(0.0, 20.0, 10.0).unwrap(), 0.0);
        assert_eq!(estimate_months(1200.0, 0.0, 100.0).unwrap(), 12.0);
        assert!(matches!(
            estimate_months(1000.0, 24.0, 20.0),
            Err(CalcError::NonConvergent { .. })
        ));
        assert!(matches!(
            estimate_months(1000.0, 24.0, 10.0),
            Err(CalcError::NonConvergent { .. })
        ));
        let n = estimate_months(1000.0, 24.0, 150.0).unwrap();
        assert!((n - 7.2263).abs() < 0.001, "got {n}");
    }

    #[test]
    fn test_strategy_parse_and_display() {
        assert_eq!("Avalanche".parse::<PayoffStrategy>().unwrap(), PayoffStrategy::Avalanche);
        assert_eq!(PayoffStrategy::Snowball.to_string(), "snowball");
        assert!("random".parse::<PayoffStrategy>().is_err());
    }
}
