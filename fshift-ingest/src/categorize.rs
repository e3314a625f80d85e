//! Deterministic category rules for transaction descriptions.
//!
//! Rules are checked in order; the first matching pattern wins.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const UNCATEGORIZED: &str = "Uncategorized";

/// Default (category, pattern) pairs, case-insensitive
const DEFAULT_RULES: &[(&str, &str)] = &[
    ("Income", r"payroll|direct dep(osit)?|salary|stipend|paycheck"),
    ("Housing", r"\brent\b|lease|landlord|apartment|mortgage|property mgmt"),
    ("Debt Payment", r"autopay|credit card|card payment|payment thank you|loan pmt"),
    ("Groceries", r"grocery|h-e-b|\bheb\b|kroger|safeway|trader joe|whole foods|aldi|costco"),
    ("Dining", r"restaurant|doordash|uber eats|grubhub|cafe|coffee|starbucks|pizza"),
    ("Transportation", r"\buber\b|lyft|shell|chevron|exxon|\bfuel\b|parking|transit|clipper"),
    ("Utilities", r"electric|water bill|utility|comcast|xfinity|at&t|verizon|t-mobile|internet"),
    ("Subscriptions", r"netflix|spotify|hulu|youtube|icloud|apple\.com/bill|github|openai|subscription|gym"),
    ("Healthcare", r"pharmacy|\bcvs\b|walgreens|clinic|hospital|dental|medical"),
    ("Savings", r"transfer to savings|savings deposit|vanguard|fidelity|marcus"),
];

/// A user-supplied rule as stored in a rules file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSpec {
    pub category: String,
    pub pattern: String,
}

#[derive(Debug, Clone)]
pub struct CategoryRules {
    rules: Vec<(String, Regex)>,
}

impl CategoryRules {
    /// Compile (category, pattern) pairs; patterns match case-insensitively.
    pub fn new<'a>(rules: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|(category, pattern)| {
                let re = Regex::new(&format!("(?i){pattern}"))
                    .with_context(|| format!("compiling rule for {category}"))?;
                Ok((category.to_string(), re))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn default_rules() -> Result<Self> {
        Self::new(DEFAULT_RULES.iter().copied())
    }

    /// User rules first, then the defaults.
    pub fn with_overrides(specs: &[RuleSpec]) -> Result<Self> {
        let user = specs.iter().map(|r| (r.category.as_str(), r.pattern.as_str()));
        Self::new(user.chain(DEFAULT_RULES.iter().copied()))
    }

    /// Load a JSON array of `{category, pattern}` and put it ahead of the defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
        let specs: Vec<RuleSpec> = serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))?;
        Self::with_overrides(&specs)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Category for a description, or `Uncategorized`
    pub fn categorize(&self, description: &str) -> &str {
        self.rules
            .iter()
            .find(|(_, re)| re.is_match(description))
            .map(|(category, _)| category.as_str())
            .unwrap_or(UNCATEGORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_defaults() {
        let rules = CategoryRules::default_rules().unwrap();
        assert_eq!(rules.categorize("ACME CORP PAYROLL"), "Income");
        assert_eq!(rules.categorize("Monthly rent - apartment 4B"), "Housing");
        assert_eq!(rules.categorize("H-E-B #455 SAN MARCOS TX"), "Groceries");
        assert_eq!(rules.categorize("DOORDASH*WINGSTOP"), "Dining");
        assert_eq!(rules.categorize("Spotify USA"), "Subscriptions");
        assert_eq!(rules.categorize("AMEX AUTOPAY"), "Debt Payment");
        assert_eq!(rules.categorize("Mystery vendor"), UNCATEGORIZED);
    }

    #[test]
    fn test_first_rule_wins() {
        let rules = CategoryRules::new([("A", "coffee"), ("B", "coffee shop")]).unwrap();
        assert_eq!(rules.categorize("Coffee Shop"), "A");
    }

    #[test]
    fn test_overrides_take_precedence() {
        let specs = vec![RuleSpec {
            category: "Coffee".into(),
            pattern: "starbucks".into(),
        }];
        let rules = CategoryRules::with_overrides(&specs).unwrap();
        assert_eq!(rules.categorize("STARBUCKS #991"), "Coffee");
        assert_eq!(rules.categorize("Kroger"), "Groceries");
        assert_eq!(rules.len(), DEFAULT_RULES.len() + 1);
    }

    #[test]
    fn test_bad_pattern_is_an_error() {
        assert!(CategoryRules::new([("Broken", "(unclosed")]).is_err());
    }
}
