//! Error type shared by every calculation in this crate.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("invalid amount for {field}: {value}")]
    InvalidAmount { field: &'static str, value: f64 },

    #[error("invalid rate for {field}: {value}")]
    InvalidRate { field: &'static str, value: f64 },

    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("invalid tax table: {0}")]
    InvalidTaxTable(String),

    #[error("no tax table for filing status {0}")]
    UnknownFilingStatus(String),

    /// Payments never outrun accruing interest.
    #[error("payoff never converges for '{debt}': payment {payment:.2} does not cover interest {interest:.2}")]
    NonConvergent {
        debt: String,
        payment: f64,
        interest: f64,
    },

    #[error("payoff not reached within {months} months")]
    MonthCapExceeded { months: u32 },
}

pub type Result<T> = std::result::Result<T, CalcError>;

/// Reject negative or non-finite money amounts.
pub(crate) fn ensure_amount(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CalcError::InvalidAmount { field, value })
    }
}

/// Reject negative or non-finite rates.
pub(crate) fn ensure_rate(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CalcError::InvalidRate { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_amount() {
        assert!(ensure_amount("balance", 0.0).is_ok());
        assert!(ensure_amount("balance", 12.5).is_ok());
        assert_eq!(
            ensure_amount("balance", -1.0),
            Err(CalcError::InvalidAmount { field: "balance", value: -1.0 })
        );
        assert!(ensure_amount("balance", f64::NAN).is_err());
        assert!(ensure_amount("balance", f64::INFINITY).is_err());
    }

    #[test]
    fn test_error_messages_are_descriptive() {
        let err = CalcError::NonConvergent {
            debt: "Visa".to_string(),
            payment: 10.0,
            interest: 25.0,
        };
        assert_eq!(
            err.to_string(),
            "payoff never converges for 'Visa': payment 10.00 does not cover interest 25.00"
        );
    }
}
