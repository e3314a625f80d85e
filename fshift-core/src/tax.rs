//! Progressive income-tax estimation: federal brackets, FICA and state tax.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ensure_amount, CalcError, Result};
use crate::records::round_cents;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilingStatus {
    Single,
    MarriedFilingJointly,
    MarriedFilingSeparately,
    HeadOfHousehold,
}

impl fmt::Display for FilingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilingStatus::Single => "single",
            FilingStatus::MarriedFilingJointly => "married_filing_jointly",
            FilingStatus::MarriedFilingSeparately => "married_filing_separately",
            FilingStatus::HeadOfHousehold => "head_of_household",
        };
        f.write_str(s)
    }
}

impl FromStr for FilingStatus {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "single" => Ok(FilingStatus::Single),
            "married_filing_jointly" | "married_jointly" | "mfj" => Ok(FilingStatus::MarriedFilingJointly),
            "married_filing_separately" | "married_separately" | "mfs" => {
                Ok(FilingStatus::MarriedFilingSeparately)
            }
            "head_of_household" | "hoh" => Ok(FilingStatus::HeadOfHousehold),
            _ => Err(CalcError::UnknownFilingStatus(s.to_string())),
        }
    }
}

/// One marginal bracket; `max = None` is unbounded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TaxBracket {
    pub min: f64,
    pub max: Option<f64>,
    /// Fraction, e.g. 0.22
    pub rate: f64,
}

impl TaxBracket {
    pub fn new(min: f64, max: Option<f64>, rate: f64) -> Self {
        Self { min, max, rate }
    }
}

/// Bracket table for one filing status and year
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaxConfig {
    pub year: i32,
    pub filing_status: FilingStatus,
    pub brackets: Vec<TaxBracket>,
    #[serde(default)]
    pub standard_deduction: f64,
}

impl TaxConfig {
    /// Brackets must start at zero, be contiguous and ascending, and end unbounded.
    pub fn validate(&self) -> Result<()> {
        ensure_amount("standard_deduction", self.standard_deduction)?;
        validate_brackets(&self.brackets)
    }
}

fn validate_brackets(brackets: &[TaxBracket]) -> Result<()> {
    let first = brackets
        .first()
        .ok_or_else(|| CalcError::InvalidTaxTable("no brackets".to_string()))?;
    if first.min != 0.0 {
        return Err(CalcError::InvalidTaxTable(format!(
            "first bracket starts at {} instead of 0",
            first.min
        )));
    }
    for (i, b) in brackets.iter().enumerate() {
        if !b.rate.is_finite() || !(0.0..=1.0).contains(&b.rate) {
            return Err(CalcError::InvalidTaxTable(format!("bracket {i} has rate {}", b.rate)));
        }
        let last = i + 1 == brackets.len();
        match (b.max, last) {
            (None, true) => {}
            (None, false) => {
                return Err(CalcError::InvalidTaxTable(format!("bracket {i} is unbounded but not last")));
            }
            (Some(_), true) => {
                return Err(CalcError::InvalidTaxTable("last bracket must be unbounded".to_string()));
            }
            (Some(max), false) => {
                if !(max > b.min) {
                    return Err(CalcError::InvalidTaxTable(format!(
                        "bracket {i} max {max} is not above min {}",
                        b.min
                    )));
                }
                if brackets[i + 1].min != max {
                    return Err(CalcError::InvalidTaxTable(format!(
                        "bracket {} starts at {} but bracket {i} ends at {max}",
                        i + 1,
                        brackets[i + 1].min
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Unrounded tax owed on `amount` under `brackets`, with the per-bracket split
/// and the marginal rate.
fn bracket_tax(amount: f64, brackets: &[TaxBracket]) -> (f64, Vec<BracketTax>, f64) {
    let mut total = 0.0;
    let mut rows = Vec::new();
    let mut marginal = brackets.first().map(|b| b.rate).unwrap_or(0.0);
    for b in brackets {
        if amount <= b.min {
            break;
        }
        let top = b.max.map_or(amount, |max| amount.min(max));
        let taxed = top - b.min;
        let tax = taxed * b.rate;
        total += tax;
        marginal = b.rate;
        rows.push(BracketTax {
            min: b.min,
            max: b.max,
            rate: b.rate,
            taxable: round_cents(taxed),
            tax: round_cents(tax),
        });
    }
    (total, rows, marginal)
}

/// Flat payroll taxes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FicaRates {
    pub social_security_rate: f64,
    pub medicare_rate: f64,
}

impl Default for FicaRates {
    fn default() -> Self {
        Self {
            social_security_rate: 0.062,
            medicare_rate: 0.0145,
        }
    }
}

/// State income tax model
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateTax {
    #[default]
    None,
    Flat { rate: f64 },
    Brackets { brackets: Vec<TaxBracket> },
}

impl StateTax {
    fn validate(&self) -> Result<()> {
        match self {
            StateTax::None => Ok(()),
            StateTax::Flat { rate } if rate.is_finite() && (0.0..=1.0).contains(rate) => Ok(()),
            StateTax::Flat { rate } => Err(CalcError::InvalidRate {
                field: "state_tax.rate",
                value: *rate,
            }),
            StateTax::Brackets { brackets } => validate_brackets(brackets),
        }
    }

    fn tax_on(&self, income: f64) -> f64 {
        match self {
            StateTax::None => 0.0,
            StateTax::Flat { rate } => income * rate,
            StateTax::Brackets { brackets } => bracket_tax(income, brackets).0,
        }
    }
}

/// Everything needed to estimate a year's tax burden
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaxSchedule {
    /// One table per filing status
    pub federal: Vec<TaxConfig>,
    #[serde(default)]
    pub fica: FicaRates,
    #[serde(default)]
    pub state: StateTax,
}

impl TaxSchedule {
    pub fn new(federal: Vec<TaxConfig>) -> Self {
        Self {
            federal,
            fica: FicaRates::default(),
            state: StateTax::None,
        }
    }

    pub fn with_state(mut self, state: StateTax) -> Self {
        self.state = state;
        self
    }

    pub fn table(&self, status: FilingStatus) -> Result<&TaxConfig> {
        self.federal
            .iter()
            .find(|t| t.filing_status == status)
            .ok_or_else(|| CalcError::UnknownFilingStatus(status.to_string()))
    }

    /// IRS 2024 federal brackets and standard deductions.
    pub fn federal_2024() -> Self {
        fn table(status: FilingStatus, deduction: f64, bounds: [f64; 6]) -> TaxConfig {
            const RATES: [f64; 7] = [0.10, 0.12, 0.22, 0.24, 0.32, 0.35, 0.37];
            let mut brackets = Vec::with_capacity(RATES.len());
            let mut min = 0.0;
            for (i, rate) in RATES.iter().enumerate() {
                let max = bounds.get(i).copied();
                brackets.push(TaxBracket::new(min, max, *rate));
                if let Some(m) = max {
                    min = m;
                }
            }
            TaxConfig {
                year: 2024,
                filing_status: status,
                brackets,
                standard_deduction: deduction,
            }
        }

        Self::new(vec![
            table(
                FilingStatus::Single,
                14_600.0,
                [11_600.0, 47_150.0, 100_525.0, 191_950.0, 243_725.0, 609_350.0],
            ),
            table(
                FilingStatus::MarriedFilingJointly,
                29_200.0,
                [23_200.0, 94_300.0, 201_050.0, 383_900.0, 487_450.0, 731_200.0],
            ),
            table(
                FilingStatus::MarriedFilingSeparately,
                14_600.0,
                [11_600.0, 47_150.0, 100_525.0, 191_950.0, 243_725.0, 365_600.0],
            ),
            table(
                FilingStatus::HeadOfHousehold,
                21_900.0,
                [16_550.0, 63_100.0, 100_500.0, 191_950.0, 243_700.0, 609_350.0],
            ),
        ])
    }
}

/// Tax paid within one bracket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BracketTax {
    pub min: f64,
    pub max: Option<f64>,
    pub rate: f64,
    pub taxable: f64,
    pub tax: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaxDetails {
    pub gross_income: f64,
    pub filing_status: FilingStatus,
    pub standard_deduction: f64,
    pub taxable_income: f64,
    pub brackets: Vec<BracketTax>,
    pub federal_tax: f64,
    pub social_security: f64,
    pub medicare: f64,
    pub state_tax: f64,
    pub total_tax: f64,
    /// Federal rate on the last taxable dollar
    pub marginal_rate: f64,
    /// `total_tax / gross_income`; zero at zero income
    pub effective_rate: f64,
    pub after_tax_income: f64,
}

/// Estimate the annual tax burden on `income`.
pub fn compute_tax_burden(income: f64, filing_status: FilingStatus, schedule: &TaxSchedule) -> Result<TaxDetails> {
    ensure_amount("income", income)?;
    let table = schedule.table(filing_status)?;
    table.validate()?;
    schedule.state.validate()?;
    for (field, rate) in [
        ("social_security_rate", schedule.fica.social_security_rate),
        ("medicare_rate", schedule.fica.medicare_rate),
    ] {
        if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
            return Err(CalcError::InvalidRate { field, value: rate });
        }
    }

    let taxable_income = (income - table.standard_deduction).max(0.0);
    let (federal_raw, brackets, marginal_rate) = bracket_tax(taxable_income, &table.brackets);
    let ss_raw = income * schedule.fica.social_security_rate;
    let medicare_raw = income * schedule.fica.medicare_rate;
    let state_raw = schedule.state.tax_on(income);
    let raw_total = federal_raw + ss_raw + medicare_raw + state_raw;

    let federal_tax = round_cents(federal_raw);
    let social_security = round_cents(ss_raw);
    let medicare = round_cents(medicare_raw);
    let state_tax = round_cents(state_raw);
    let total_tax = round_cents(federal_tax + social_security + medicare + state_tax);

    Ok(TaxDetails {
        gross_income: income,
        filing_status,
        standard_deduction: table.standard_deduction,
        taxable_income: round_cents(taxable_income),
        brackets,
        federal_tax,
        social_security,
        medicare,
        state_tax,
        total_tax,
        marginal_rate,
        // From unrounded parts so cent rounding can't break progressivity.
        effective_rate: if income > 0.0 { raw_total / income } else { 0.0 },
        after_tax_income: round_cents(income - total_tax),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_schedule() -> TaxSchedule {
        TaxSchedule::new(vec![TaxConfig {
            year: 2026,
            filing_status: FilingStatus::Single,
            brackets: vec![
                TaxBracket::new(0.0, Some(10_000.0), 0.10),
                TaxBracket::new(10_000.0, Some(40_000.0), 0.20),
                TaxBracket::new(40_000.0, None, 0.30),
            ],
            standard_deduction: 5_000.0,
        }])
    }

    #[test]
    fn test_zero_income_owes_nothing() {
        let details = compute_tax_burden(0.0, FilingStatus::Single, &simple_schedule()).unwrap();
        assert_eq!(details.total_tax, 0.0);
        assert_eq!(details.effective_rate, 0.0);
        assert_eq!(details.taxable_income, 0.0);
    }

    #[test]
    fn test_progressive_brackets() {
        let details = compute_tax_burden(55_000.0, FilingStatus::Single, &simple_schedule()).unwrap();
        // taxable 50,000: 1,000 + 6,000 + 3,000
        assert_eq!(details.taxable_income, 50_000.0);
        assert_eq!(details.federal_tax, 10_000.0);
        assert_eq!(details.brackets.len(), 3);
        assert_eq!(details.marginal_rate, 0.30);
        assert_eq!(details.social_security, 3_410.0);
        assert_eq!(details.medicare, 797.5);
        assert_eq!(details.total_tax, 14_207.5);
        assert!((details.effective_rate - 14_207.5 / 55_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_deduction_never_makes_income_negative() {
        let details = compute_tax_burden(3_000.0, FilingStatus::Single, &simple_schedule()).unwrap();
        assert_eq!(details.taxable_income, 0.0);
        assert_eq!(details.federal_tax, 0.0);
        assert!(details.brackets.is_empty());
    }

    #[test]
    fn test_state_tax_flat_and_bracketed() {
        let flat = simple_schedule().with_state(StateTax::Flat { rate: 0.05 });
        let details = compute_tax_burden(20_000.0, FilingStatus::Single, &flat).unwrap();
        assert_eq!(details.state_tax, 1_000.0);

        let bracketed = simple_schedule().with_state(StateTax::Brackets {
            brackets: vec![
                TaxBracket::new(0.0, Some(10_000.0), 0.01),
                TaxBracket::new(10_000.0, None, 0.04),
            ],
        });
        let details = compute_tax_burden(20_000.0, FilingStatus::Single, &bracketed).unwrap();
        assert_eq!(details.state_tax, 500.0);
    }

    #[test]
    fn test_unknown_filing_status() {
        let err = compute_tax_burden(50_000.0, FilingStatus::HeadOfHousehold, &simple_schedule()).unwrap_err();
        assert_eq!(err, CalcError::UnknownFilingStatus("head_of_household".to_string()));
        assert!("widow".parse::<FilingStatus>().is_err());
        assert_eq!("MFJ".parse::<FilingStatus>().unwrap(), FilingStatus::MarriedFilingJointly);
    }

    #[test]
    fn test_malformed_tables_rejected() {
        let mut gap = simple_schedule();
        gap.federal[0].brackets[1].min = 12_000.0;
        assert!(matches!(
            compute_tax_burden(1.0, FilingStatus::Single, &gap),
            Err(CalcError::InvalidTaxTable(_))
        ));

        let mut bounded = simple_schedule();
        bounded.federal[0].brackets[2].max = Some(90_000.0);
        assert!(matches!(
            compute_tax_burden(1.0, FilingStatus::Single, &bounded),
            Err(CalcError::InvalidTaxTable(_))
        ));

        assert!(matches!(
            compute_tax_burden(-1.0, FilingStatus::Single, &simple_schedule()),
            Err(CalcError::InvalidAmount { field: "income", .. })
        ));
    }

    #[test]
    fn test_federal_2024_tables_are_valid() {
        let schedule = TaxSchedule::federal_2024();
        for status in [
            FilingStatus::Single,
            FilingStatus::MarriedFilingJointly,
            FilingStatus::MarriedFilingSeparately,
            FilingStatus::HeadOfHousehold,
        ] {
            schedule.table(status).unwrap().validate().unwrap();
        }
        // 75,000 single: taxable 60,400
        let details = compute_tax_burden(75_000.0, FilingStatus::Single, &schedule).unwrap();
        assert_eq!(details.federal_tax, 8_341.0);
        assert_eq!(details.marginal_rate, 0.22);
    }

    #[test]
    fn test_schedule_deserializes_state_tag() {
        let json = r#"{
            "federal": [{"year": 2026, "filing_status": "single",
                         "brackets": [{"min": 0.0, "max": null, "rate": 0.1}]}],
            "state": {"kind": "flat", "rate": 0.03}
        }"#;
        let schedule: TaxSchedule = serde_json::from_str(json).unwrap();
        assert_eq!(schedule.state, StateTax::Flat { rate: 0.03 });
        assert_eq!(schedule.fica, FicaRates::default());
    }
}
