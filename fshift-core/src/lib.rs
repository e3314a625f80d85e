//! fshift-core: pure financial calculations for the Financial $hift dashboard
//!
//! Shift pay, debt payoff projection, tax estimation, budget variance and
//! goal projection. Every function takes plain records, validates them, and
//! returns a result without I/O or mutation of its inputs.

pub mod error;
pub mod records;
pub mod pay;
pub mod debt;
pub mod tax;
pub mod budget;
pub mod goals;

pub use error::{CalcError, Result};
pub use records::{round_cents, Budget, DebtAccount, Goal, Transaction, TransactionType};
pub use pay::{
    calculate_pay_period, calculate_shift_pay, AppliedDifferential, Differential,
    DifferentialConditions, PayBreakdown, PayPeriodSummary, RateType, Shift, ShiftRule,
};
pub use debt::{
    calculate_debt_payoff, compare_strategies, estimate_months, DebtPayment, DebtSummary,
    MonthLedger, PayoffResult, PayoffStrategy, StrategyComparison, MAX_PAYOFF_MONTHS,
};
pub use tax::{
    compute_tax_burden, BracketTax, FicaRates, FilingStatus, StateTax, TaxBracket, TaxConfig,
    TaxDetails, TaxSchedule,
};
pub use budget::{calculate_budget_variance, summarize_budgets, BudgetStatus, BudgetSummary, BudgetVariance};
pub use goals::{calculate_goal_projection, ProjectionResult};
