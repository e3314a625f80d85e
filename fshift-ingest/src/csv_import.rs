//! Header-driven CSV import of bank/card exports into `Transaction` records.
//!
//! Recognized columns (case-insensitive): `date`, `description` (or `memo`,
//! `payee`), `amount`, optional `type` and `category`. Rows whose date or
//! amount cannot be parsed (or is NaN or infinite) are skipped.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use fshift_core::{Transaction, TransactionType};
use std::io::Read;
use std::path::Path;

use crate::categorize::CategoryRules;

/// How to read the sign of `amount` when there is no `type` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignConvention {
    /// Checking-style exports: withdrawals are negative
    #[default]
    NegativeIsExpense,
    /// Card-style exports: charges are positive
    PositiveIsExpense,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    pub sign: SignConvention,
}

struct Columns {
    date: usize,
    description: Option<usize>,
    amount: usize,
    kind: Option<usize>,
    category: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        let Some(date) = find(&["date", "transaction date", "trans date"]) else {
            bail!("missing date column");
        };
        let Some(amount) = find(&["amount"]) else {
            bail!("missing amount column");
        };
        Ok(Self {
            date,
            amount,
            description: find(&["description", "memo", "payee"]),
            kind: find(&["type"]),
            category: find(&["category"]),
        })
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .ok()
}

fn parse_amount(s: &str) -> Option<f64> {
    let cleaned: String = s.trim().chars().filter(|c| !matches!(c, '$' | ',' | ' ')).collect();
    // (12.34) accounting notation
    let value = match cleaned.strip_prefix('(').and_then(|c| c.strip_suffix(')')) {
        Some(inner) => -inner.parse::<f64>().ok()?,
        None => cleaned.parse::<f64>().ok()?,
    };
    value.is_finite().then_some(value)
}

fn parse_kind(s: &str) -> Option<TransactionType> {
    match s.trim().to_lowercase().as_str() {
        "income" | "credit" | "deposit" => Some(TransactionType::Income),
        "expense" | "debit" | "charge" | "withdrawal" => Some(TransactionType::Expense),
        _ => None,
    }
}

fn kind_from_sign(amount: f64, sign: SignConvention) -> TransactionType {
    let negative = amount < 0.0;
    match (sign, negative) {
        (SignConvention::NegativeIsExpense, true) | (SignConvention::PositiveIsExpense, false) => {
            TransactionType::Expense
        }
        _ => TransactionType::Income,
    }
}

/// Parse transactions from any CSV reader.
pub fn parse_transactions_reader<R: Read>(
    reader: R,
    rules: &CategoryRules,
    options: ImportOptions,
) -> Result<Vec<Transaction>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let cols = Columns::from_headers(rdr.headers().context("reading CSV header")?)?;
    let mut txns = Vec::new();

    for result in rdr.records() {
        let record = result?;
        let Some(date) = record.get(cols.date).and_then(parse_date) else {
            continue;
        };
        let Some(raw_amount) = record.get(cols.amount).and_then(parse_amount) else {
            continue;
        };
        let description = cols
            .description
            .and_then(|i| record.get(i))
            .unwrap_or("")
            .to_string();
        let kind = cols
            .kind
            .and_then(|i| record.get(i))
            .and_then(parse_kind)
            .unwrap_or_else(|| kind_from_sign(raw_amount, options.sign));
        let category = match cols.category.and_then(|i| record.get(i)) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => rules.categorize(&description).to_string(),
        };

        txns.push(Transaction {
            amount: raw_amount.abs(),
            kind,
            category,
            date,
            description,
        });
    }

    Ok(txns)
}

/// Parse a CSV file of transactions.
pub fn parse_transactions_csv(
    path: impl AsRef<Path>,
    rules: &CategoryRules,
    options: ImportOptions,
) -> Result<Vec<Transaction>> {
    let file = std::fs::File::open(path.as_ref())
        .with_context(|| format!("opening {}", path.as_ref().display()))?;
    parse_transactions_reader(file, rules, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> CategoryRules {
        CategoryRules::default_rules().unwrap()
    }

    #[test]
    fn test_signed_checking_export() {
        let csv = "\
Date,Description,Amount
2026-03-01,ACME PAYROLL,\"1,250.00\"
03/02/2026,Kroger #12,-54.20
03/03/2026,Rent March,(1200.00)
not a date,ignored,1.00
";
        let txns = parse_transactions_reader(csv.as_bytes(), &rules(), ImportOptions::default()).unwrap();
        assert_eq!(txns.len(), 3);
        assert_eq!(txns[0].kind, TransactionType::Income);
        assert_eq!(txns[0].amount, 1250.0);
        assert_eq!(txns[0].category, "Income");
        assert_eq!(txns[1].kind, TransactionType::Expense);
        assert_eq!(txns[1].amount, 54.2);
        assert_eq!(txns[1].category, "Groceries");
        assert_eq!(txns[2].amount, 1200.0);
        assert_eq!(txns[2].category, "Housing");
    }

    #[test]
    fn test_card_export_positive_charges() {
        let csv = "date,description,amount\n2026-03-05,NETFLIX.COM,15.49\n2026-03-06,Refund,-15.49\n";
        let options = ImportOptions {
            sign: SignConvention::PositiveIsExpense,
        };
        let txns = parse_transactions_reader(csv.as_bytes(), &rules(), options).unwrap();
        assert_eq!(txns[0].kind, TransactionType::Expense);
        assert_eq!(txns[0].category, "Subscriptions");
        assert_eq!(txns[1].kind, TransactionType::Income);
    }

    #[test]
    fn test_explicit_type_and_category_columns_win() {
        let csv = "Date,Memo,Amount,Type,Category\n2026-03-05,Shell Oil,40,expense,Car\n2026-03-06,Tips,-20,income,\n";
        let txns = parse_transactions_reader(csv.as_bytes(), &rules(), ImportOptions::default()).unwrap();
        assert_eq!(txns[0].category, "Car");
        assert_eq!(txns[0].description, "Shell Oil");
        assert_eq!(txns[1].kind, TransactionType::Income);
        assert_eq!(txns[1].amount, 20.0);
        assert_eq!(txns[1].category, "Uncategorized");
    }

    #[test]
    fn test_non_finite_amounts_are_skipped() {
        let csv = "Date,Description,Amount\n2026-03-02,Kroger,NaN\n2026-03-03,Kroger,inf\n2026-03-04,Kroger,(-infinity)\n2026-03-05,Kroger,-12.50\n";
        let txns = parse_transactions_reader(csv.as_bytes(), &rules(), ImportOptions::default()).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, 12.5);
    }

    #[test]
    fn test_missing_amount_column_is_an_error() {
        let csv = "Date,Description\n2026-03-05,x\n";
        assert!(parse_transactions_reader(csv.as_bytes(), &rules(), ImportOptions::default()).is_err());
    }
}
