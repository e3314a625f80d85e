//! Savings goal projection

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::records::{round_cents, Goal};

/// Average Gregorian month length in days
pub const AVG_DAYS_PER_MONTH: f64 = 30.4375;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectionResult {
    pub remaining: f64,
    /// Not capped at 100
    pub percent_complete: f64,
    /// Negative once the target date has passed
    pub days_remaining: i64,
    pub months_remaining: f64,
    /// Monthly saving needed to hit the target date
    pub required_monthly_rate: f64,
    /// Contribution used for the projection
    pub savings_rate: f64,
    /// Months left at the required rate
    pub months_to_completion: u32,
    /// Months left at `savings_rate`; `None` when nothing is being saved
    pub months_at_current_rate: Option<u32>,
    /// Date reached at `savings_rate`
    pub projected_completion_date: Option<NaiveDate>,
    pub on_track: bool,
    pub is_complete: bool,
}

/// Months of saving `rate` needed to cover `remaining`, at least one.
fn whole_months(remaining: f64, rate: f64) -> u32 {
    // Tolerate float noise so an exact fit doesn't spill into another month.
    (remaining / rate - 1e-9).ceil().max(1.0) as u32
}

/// Project when `goal` completes, as seen from `today`.
///
/// Without a known `monthly_contribution` the goal is assumed to be funded
/// at exactly the required rate.
pub fn calculate_goal_projection(goal: &Goal, today: NaiveDate) -> Result<ProjectionResult> {
    goal.validate()?;

    let remaining = goal.remaining();
    let percent_complete = if goal.target_amount > 0.0 {
        goal.current_amount / goal.target_amount * 100.0
    } else {
        100.0
    };
    let days_remaining = (goal.target_date - today).num_days();
    let months_remaining = days_remaining.max(0) as f64 / AVG_DAYS_PER_MONTH;

    if remaining == 0.0 {
        return Ok(ProjectionResult {
            remaining,
            percent_complete,
            days_remaining,
            months_remaining,
            required_monthly_rate: 0.0,
            savings_rate: goal.monthly_contribution.unwrap_or(0.0),
            months_to_completion: 0,
            months_at_current_rate: Some(0),
            projected_completion_date: Some(today),
            on_track: true,
            is_complete: true,
        });
    }

    let required = remaining / months_remaining.max(1.0);
    let savings_rate = goal.monthly_contribution.unwrap_or(required);

    let months_to_completion = whole_months(remaining, required);
    let months_at_current_rate = (savings_rate > 0.0).then(|| whole_months(remaining, savings_rate));
    let projected_completion_date =
        months_at_current_rate.and_then(|m| today.checked_add_months(Months::new(m)));

    Ok(ProjectionResult {
        remaining: round_cents(remaining),
        percent_complete,
        days_remaining,
        months_remaining,
        required_monthly_rate: round_cents(required),
        savings_rate: round_cents(savings_rate),
        months_to_completion,
        months_at_current_rate,
        projected_completion_date,
        on_track: days_remaining > 0 && savings_rate >= required,
        is_complete: false,
    })
}
