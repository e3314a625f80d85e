//! Shift pay: regular/overtime split, pay differentials and withholding.
//!
//! Overtime is either per shift (`daily_overtime_threshold`) or weekly, in
//! which case the hours already worked that week are carried on the shift as
//! `prior_week_hours`. Differentials match on a daily time window (which may
//! wrap past midnight) and an optional set of weekdays.

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ensure_amount, ensure_rate, CalcError, Result};
use crate::records::round_cents;

/// How a differential's `amount` is applied
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateType {
    /// Fixed dollars added per eligible hour
    FlatAmount,
    /// Multiplier on the base rate for eligible hours
    Multiplier,
}

/// When a differential applies
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DifferentialConditions {
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    /// Empty means every day
    #[serde(default, deserialize_with = "deserialize_weekdays")]
    pub days_of_week: Vec<Weekday>,
}

/// A conditional pay adjustment layered on the base rate (night, weekend, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Differential {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub rate_type: RateType,
    pub amount: f64,
    #[serde(default)]
    pub conditions: DifferentialConditions,
    #[serde(default)]
    pub is_stackable: bool,
}

impl Differential {
    pub fn flat(name: impl Into<String>, amount: f64) -> Self {
        Self {
            name: name.into(),
            kind: String::new(),
            rate_type: RateType::FlatAmount,
            amount,
            conditions: DifferentialConditions::default(),
            is_stackable: false,
        }
    }

    pub fn multiplier(name: impl Into<String>, amount: f64) -> Self {
        Self {
            rate_type: RateType::Multiplier,
            ..Self::flat(name, amount)
        }
    }

    pub fn between(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.conditions.start_time = Some(start);
        self.conditions.end_time = Some(end);
        self
    }

    pub fn on_days(mut self, days: &[Weekday]) -> Self {
        self.conditions.days_of_week = days.to_vec();
        self
    }

    pub fn stackable(mut self) -> Self {
        self.is_stackable = true;
        self
    }

    fn validate(&self) -> Result<()> {
        ensure_amount("differential.amount", self.amount)?;
        if self.rate_type == RateType::Multiplier && self.amount < 1.0 {
            return Err(CalcError::InvalidRate {
                field: "differential.amount",
                value: self.amount,
            });
        }
        Ok(())
    }

    /// Pay for `hours` eligible hours at `base_rate`
    fn pay_for(&self, hours: f64, base_rate: f64) -> f64 {
        match self.rate_type {
            RateType::FlatAmount => self.amount * hours,
            RateType::Multiplier => base_rate * (self.amount - 1.0) * hours,
        }
    }

    /// Offsets of the daily window in seconds from midnight; end may exceed a day.
    fn window_secs(&self) -> (i64, i64) {
        let secs = |t: NaiveTime| i64::from(t.num_seconds_from_midnight());
        let start = self.conditions.start_time.map(secs).unwrap_or(0);
        let mut end = self.conditions.end_time.map(secs).unwrap_or(SECS_PER_DAY);
        if end <= start {
            end += SECS_PER_DAY;
        }
        (start, end)
    }
}

const SECS_PER_DAY: i64 = 86_400;

/// Weekdays indexed with 0 = Sunday.
const SUNDAY_FIRST: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

fn default_weekly_threshold() -> f64 {
    40.0
}

fn default_overtime_multiplier() -> f64 {
    1.5
}

fn default_double_time_multiplier() -> f64 {
    2.0
}

fn default_withholding_rate() -> f64 {
    0.20
}

/// Pay rules for a job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShiftRule {
    pub base_hourly_rate: f64,
    /// Weekly regular-hours threshold
    #[serde(default = "default_weekly_threshold")]
    pub overtime_threshold: f64,
    /// Per-shift threshold; takes precedence over the weekly one
    #[serde(default)]
    pub daily_overtime_threshold: Option<f64>,
    #[serde(default = "default_overtime_multiplier")]
    pub overtime_multiplier: f64,
    /// Per-shift hours beyond which double time is paid
    #[serde(default)]
    pub double_time_threshold: Option<f64>,
    #[serde(default = "default_double_time_multiplier")]
    pub double_time_multiplier: f64,
    /// Flat estimate of withholding as a fraction of gross
    #[serde(default = "default_withholding_rate")]
    pub withholding_rate: f64,
    #[serde(default)]
    pub differentials: Vec<Differential>,
}

impl ShiftRule {
    pub fn new(base_hourly_rate: f64) -> Self {
        Self {
            base_hourly_rate,
            overtime_threshold: default_weekly_threshold(),
            daily_overtime_threshold: None,
            overtime_multiplier: default_overtime_multiplier(),
            double_time_threshold: None,
            double_time_multiplier: default_double_time_multiplier(),
            withholding_rate: default_withholding_rate(),
            differentials: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure_amount("base_hourly_rate", self.base_hourly_rate)?;
        ensure_amount("overtime_threshold", self.overtime_threshold)?;
        if let Some(t) = self.daily_overtime_threshold {
            ensure_amount("daily_overtime_threshold", t)?;
        }
        if let Some(t) = self.double_time_threshold {
            ensure_amount("double_time_threshold", t)?;
        }
        if !self.overtime_multiplier.is_finite() || self.overtime_multiplier < 1.0 {
            return Err(CalcError::InvalidRate {
                field: "overtime_multiplier",
                value: self.overtime_multiplier,
            });
        }
        if !self.double_time_multiplier.is_finite() || self.double_time_multiplier < 1.0 {
            return Err(CalcError::InvalidRate {
                field: "double_time_multiplier",
                value: self.double_time_multiplier,
            });
        }
        ensure_rate("withholding_rate", self.withholding_rate)?;
        if self.withholding_rate > 1.0 {
            return Err(CalcError::InvalidRate {
                field: "withholding_rate",
                value: self.withholding_rate,
            });
        }
        self.differentials.iter().try_for_each(Differential::validate)
    }
}

/// A worked shift
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shift {
    pub start_datetime: NaiveDateTime,
    pub end_datetime: NaiveDateTime,
    /// Paid hours; derived from the window when absent
    #[serde(default)]
    pub hours_worked: Option<f64>,
    /// Restricts the rule's differentials to these names when non-empty
    #[serde(default)]
    pub differentials: Vec<String>,
    /// Regular hours already worked this week before this shift
    #[serde(default)]
    pub prior_week_hours: f64,
}

impl Shift {
    pub fn new(start_datetime: NaiveDateTime, end_datetime: NaiveDateTime) -> Self {
        Self {
            start_datetime,
            end_datetime,
            hours_worked: None,
            differentials: Vec::new(),
            prior_week_hours: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.end_datetime < self.start_datetime {
            return Err(CalcError::InvalidDateRange(format!(
                "shift ends ({}) before it starts ({})",
                self.end_datetime, self.start_datetime
            )));
        }
        if let Some(h) = self.hours_worked {
            ensure_amount("hours_worked", h)?;
        }
        ensure_amount("prior_week_hours", self.prior_week_hours)
    }

    /// Paid hours for this shift
    pub fn hours(&self) -> f64 {
        self.hours_worked.unwrap_or_else(|| self.window_hours())
    }

    fn window_hours(&self) -> f64 {
        (self.end_datetime - self.start_datetime).num_seconds() as f64 / 3600.0
    }
}

/// A differential that contributed to a shift's pay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppliedDifferential {
    pub name: String,
    pub rate_type: RateType,
    pub hours: f64,
    pub amount: f64,
}

/// Pay computed for a single shift (or summed over a period)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PayBreakdown {
    pub hours_worked: f64,
    pub regular_hours: f64,
    pub overtime_hours: f64,
    pub double_time_hours: f64,
    pub base_pay: f64,
    pub overtime_pay: f64,
    pub differential_pay: f64,
    pub differentials_applied: Vec<AppliedDifferential>,
    pub gross_pay: f64,
    pub tax_withholding: f64,
    pub net_pay: f64,
}

/// Split paid hours into (regular, overtime, double time).
fn split_hours(hours: f64, prior_week_hours: f64, rule: &ShiftRule) -> (f64, f64, f64) {
    let double = rule
        .double_time_threshold
        .map(|t| (hours - t).max(0.0))
        .unwrap_or(0.0);
    let remaining = hours - double;
    let overtime = match rule.daily_overtime_threshold {
        Some(daily) => (remaining - daily).max(0.0),
        None => {
            let capacity = (rule.overtime_threshold - prior_week_hours).max(0.0);
            (remaining - capacity).max(0.0)
        }
    };
    (remaining - overtime, overtime, double)
}

/// Hours of the shift window falling inside the differential's daily window.
fn overlap_hours(shift: &Shift, diff: &Differential) -> f64 {
    let (win_start, win_end) = diff.window_secs();
    let start = shift.start_datetime;
    let end = shift.end_datetime;

    // A window anchored on the previous day can reach into this one.
    let mut day = start.date() - Duration::days(1);
    let mut total = 0i64;
    while day <= end.date() {
        let midnight = day.and_hms_opt(0, 0, 0).unwrap_or(start);
        let ws = midnight + Duration::seconds(win_start);
        let we = midnight + Duration::seconds(win_end);
        let lo = ws.max(start);
        let hi = we.min(end);
        if hi > lo {
            total += (hi - lo).num_seconds();
        }
        day += Duration::days(1);
    }
    total as f64 / 3600.0
}

fn eligible_hours(shift: &Shift, diff: &Differential, hours: f64) -> f64 {
    let cond = &diff.conditions;
    if !cond.days_of_week.is_empty() && !cond.days_of_week.contains(&shift.start_datetime.weekday()) {
        return 0.0;
    }
    if cond.start_time.is_none() && cond.end_time.is_none() {
        return hours;
    }
    overlap_hours(shift, diff).min(hours)
}

/// Evaluate the rule's differentials against a shift.
///
/// Stackable matches all apply. Of the non-stackable matches only one applies:
/// the one paying the most for this shift, so eligible hours count as well as
/// the per-hour amount. Ties keep the earlier differential.
fn apply_differentials(shift: &Shift, rule: &ShiftRule, hours: f64) -> Vec<AppliedDifferential> {
    let mut applied = Vec::new();
    let mut best_exclusive: Option<AppliedDifferential> = None;

    for diff in &rule.differentials {
        if !shift.differentials.is_empty() && !shift.differentials.iter().any(|n| n == &diff.name) {
            continue;
        }
        let eligible = eligible_hours(shift, diff, hours);
        if eligible <= 0.0 {
            continue;
        }
        let candidate = AppliedDifferential {
            name: diff.name.clone(),
            rate_type: diff.rate_type,
            hours: eligible,
            amount: round_cents(diff.pay_for(eligible, rule.base_hourly_rate)),
        };
        if diff.is_stackable {
            applied.push(candidate);
        } else if best_exclusive
            .as_ref()
            .map_or(true, |best| candidate.amount > best.amount)
        {
            best_exclusive = Some(candidate);
        }
    }

    if let Some(best) = best_exclusive {
        applied.push(best);
    }
    applied
}

/// Compute the pay breakdown for one shift under `rule`.
pub fn calculate_shift_pay(shift: &Shift, rule: &ShiftRule) -> Result<PayBreakdown> {
    shift.validate()?;
    rule.validate()?;

    let hours = shift.hours();
    if hours == 0.0 {
        return Ok(PayBreakdown::default());
    }

    let rate = rule.base_hourly_rate;
    let (regular, overtime, double) = split_hours(hours, shift.prior_week_hours, rule);

    let base_pay = round_cents(regular * rate);
    let overtime_pay =
        round_cents(overtime * rate * rule.overtime_multiplier + double * rate * rule.double_time_multiplier);

    let differentials_applied = apply_differentials(shift, rule, hours);
    let differential_pay = round_cents(differentials_applied.iter().map(|d| d.amount).sum());

    let gross_pay = round_cents(base_pay + overtime_pay + differential_pay);
    let tax_withholding = round_cents(gross_pay * rule.withholding_rate);

    Ok(PayBreakdown {
        hours_worked: hours,
        regular_hours: regular,
        overtime_hours: overtime,
        double_time_hours: double,
        base_pay,
        overtime_pay,
        differential_pay,
        differentials_applied,
        gross_pay,
        tax_withholding,
        net_pay: round_cents(gross_pay - tax_withholding),
    })
}

/// Per-shift pay plus totals for a pay period
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayPeriodSummary {
    pub shifts: Vec<PayBreakdown>,
    pub total: PayBreakdown,
}

/// Pay a set of shifts, carrying weekly hours across shifts in the same ISO week.
///
/// Shifts are processed in start order; the returned breakdowns follow that order.
pub fn calculate_pay_period(shifts: &[Shift], rule: &ShiftRule) -> Result<PayPeriodSummary> {
    let mut ordered: Vec<&Shift> = shifts.iter().collect();
    ordered.sort_by_key(|s| s.start_datetime);

    let mut week: Option<chrono::IsoWeek> = None;
    let mut week_hours = 0.0;
    let mut breakdowns = Vec::with_capacity(ordered.len());

    for shift in ordered {
        let iso = shift.start_datetime.iso_week();
        if week != Some(iso) {
            week = Some(iso);
            week_hours = 0.0;
        }
        let mut carried = shift.clone();
        carried.prior_week_hours = week_hours;
        let pay = calculate_shift_pay(&carried, rule)?;
        week_hours += pay.hours_worked;
        breakdowns.push(pay);
    }

    let total = sum_breakdowns(&breakdowns);
    Ok(PayPeriodSummary {
        shifts: breakdowns,
        total,
    })
}

fn sum_breakdowns(items: &[PayBreakdown]) -> PayBreakdown {
    let mut total = PayBreakdown::default();
    for b in items {
        total.hours_worked += b.hours_worked;
        total.regular_hours += b.regular_hours;
        total.overtime_hours += b.overtime_hours;
        total.double_time_hours += b.double_time_hours;
        total.base_pay += b.base_pay;
        total.overtime_pay += b.overtime_pay;
        total.differential_pay += b.differential_pay;
        total.tax_withholding += b.tax_withholding;
        total.net_pay += b.net_pay;
        for d in &b.differentials_applied {
            match total.differentials_applied.iter_mut().find(|t| t.name == d.name) {
                Some(t) => {
                    t.hours += d.hours;
                    t.amount = round_cents(t.amount + d.amount);
                }
                None => total.differentials_applied.push(d.clone()),
            }
        }
    }
    total.base_pay = round_cents(total.base_pay);
    total.overtime_pay = round_cents(total.overtime_pay);
    total.differential_pay = round_cents(total.differential_pay);
    total.gross_pay = round_cents(total.base_pay + total.overtime_pay + total.differential_pay);
    total.tax_withholding = round_cents(total.tax_withholding);
    total.net_pay = round_cents(total.net_pay);
    total
}

/// Accept weekdays as names ("mon", "Monday") or numbers (0 = Sunday).
fn deserialize_weekdays<'de, D>(deserializer: D) -> std::result::Result<Vec<Weekday>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Day {
        Index(u8),
        Name(String),
    }

    let raw: Vec<Day> = Vec::deserialize(deserializer)?;
    raw.into_iter()
        .map(|d| match d {
            Day::Index(i) => SUNDAY_FIRST
                .get(usize::from(i))
                .copied()
                .ok_or_else(|| serde::de::Error::custom(format!("weekday index {i} out of range"))),
            Day::Name(s) => s
                .parse::<Weekday>()
                .map_err(|_| serde::de::Error::custom(format!("unknown weekday '{s}'"))),
        })
        .collect()
}
