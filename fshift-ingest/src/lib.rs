//! fshift-ingest: CSV transaction import and deterministic category rules.

pub mod categorize;
pub mod csv_import;

pub use categorize::{CategoryRules, RuleSpec, UNCATEGORIZED};
pub use csv_import::{parse_transactions_csv, parse_transactions_reader, ImportOptions, SignConvention};
