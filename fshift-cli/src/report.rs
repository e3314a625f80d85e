//! Plain-text rendering of calculation results.

use fshift_core::{
    BudgetSummary, BudgetVariance, Goal, PayBreakdown, PayPeriodSummary, PayoffResult, ProjectionResult,
    StrategyComparison, TaxDetails,
};

/// `$1,234.56`, with a leading `-` for negatives
pub fn money(v: f64) -> String {
    let cents = (v.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if v < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

fn pct(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

pub fn print_pay(p: &PayBreakdown) {
    println!(
        "Hours: {:.2} (regular {:.2}, overtime {:.2}, double {:.2})",
        p.hours_worked, p.regular_hours, p.overtime_hours, p.double_time_hours
    );
    println!("Base pay:          {}", money(p.base_pay));
    println!("Overtime pay:      {}", money(p.overtime_pay));
    println!("Differential pay:  {}", money(p.differential_pay));
    for d in &p.differentials_applied {
        println!("  - {} ({:.2}h): {}", d.name, d.hours, money(d.amount));
    }
    println!("Gross:             {}", money(p.gross_pay));
    println!("Withholding:       {}", money(p.tax_withholding));
    println!("Net:               {}", money(p.net_pay));
}

pub fn print_period(s: &PayPeriodSummary) {
    for (i, p) in s.shifts.iter().enumerate() {
        println!(
            "#{:<3} {:>6.2}h  gross {:>12}  net {:>12}",
            i + 1,
            p.hours_worked,
            money(p.gross_pay),
            money(p.net_pay)
        );
    }
    println!();
    print_pay(&s.total);
}

pub fn print_payoff(r: &PayoffResult) {
    println!(
        "Strategy: {} | monthly budget {} (extra {})",
        r.strategy,
        money(r.monthly_budget),
        money(r.extra_payment)
    );
    println!(
        "Debt free in {} months ({}) | interest {} | total paid {}",
        r.total_months,
        r.debt_free_date,
        money(r.total_interest),
        money(r.total_paid)
    );
    match (r.minimum_only_months, r.strategy_savings) {
        (Some(months), Some(saved)) => {
            println!("Minimum payments only: {months} months, saves {}", money(saved))
        }
        _ => println!("Minimum payments only: never paid off"),
    }
    println!();
    for d in &r.debts {
        println!(
            "  {:<24} paid off month {:>3} ({})  interest {:>11}",
            d.name,
            d.payoff_month,
            d.payoff_date,
            money(d.interest_paid)
        );
    }
}

pub fn print_comparison(c: &StrategyComparison) {
    print_payoff(&c.avalanche);
    println!();
    print_payoff(&c.snowball);
    println!();
    println!(
        "Recommended: {} (snowball costs {} more interest, {} more months)",
        c.recommended,
        money(c.interest_difference),
        c.month_difference
    );
}

pub fn print_tax(t: &TaxDetails) {
    println!("Gross income:       {} ({})", money(t.gross_income), t.filing_status);
    println!("Standard deduction: {}", money(t.standard_deduction));
    println!("Taxable income:     {}", money(t.taxable_income));
    for b in t.brackets.iter().filter(|b| b.taxable > 0.0) {
        println!("  {:>6} on {:>12}: {}", pct(b.rate), money(b.taxable), money(b.tax));
    }
    println!("Federal:            {}", money(t.federal_tax));
    println!("Social Security:    {}", money(t.social_security));
    println!("Medicare:           {}", money(t.medicare));
    println!("State:              {}", money(t.state_tax));
    println!("Total tax:          {}", money(t.total_tax));
    println!("Marginal / effective: {} / {}", pct(t.marginal_rate), pct(t.effective_rate));
    println!("After tax:          {}", money(t.after_tax_income));
}

pub fn print_budgets(variances: &[BudgetVariance], summary: &BudgetSummary) {
    for v in variances {
        let used = v
            .percent_used
            .map(|p| format!("{p:.0}%"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:04}-{:02}  {:>11} / {:>11}  {:>5}  {:?}",
            v.category,
            v.year,
            v.month,
            money(v.spent),
            money(v.limit),
            used,
            v.status
        );
    }
    println!();
    println!(
        "Total {} of {} ({} left) | good {} warning {} over {}",
        money(summary.total_spent),
        money(summary.total_limit),
        money(summary.total_remaining),
        summary.good,
        summary.warning,
        summary.over
    );
}

pub fn print_goal(goal: &Goal, p: &ProjectionResult) {
    println!(
        "{}: {} of {} ({:.1}%)",
        if goal.name.is_empty() { "Goal" } else { goal.name.as_str() },
        money(goal.current_amount),
        money(goal.target_amount),
        p.percent_complete
    );
    if p.is_complete {
        println!("Complete.");
        return;
    }
    println!(
        "Target {} ({} days) | need {}/month for {} months | saving {}/month",
        goal.target_date,
        p.days_remaining,
        money(p.required_monthly_rate),
        p.months_to_completion,
        money(p.savings_rate)
    );
    match p.projected_completion_date {
        Some(date) => println!(
            "Projected completion: {date} ({} months) | {}",
            p.months_at_current_rate.unwrap_or_default(),
            if p.on_track { "on track" } else { "behind" }
        ),
        None => println!("Projected completion: never (no savings)"),
    }
}
