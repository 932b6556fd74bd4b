//! Interest on a loan's full term.
//!
//! Rates are nominal percentages per month or per year. A yearly rate is
//! spread evenly over twelve months; compounding always happens monthly,
//! whatever the stated frequency.

pub mod compound;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{round_currency, Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::types::{InterestFrequency, InterestType};

pub use compound::{compound_factor, simple_factor};

/// the terms interest is computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestTerms {
    pub principal: Money,
    pub rate: Rate,
    pub duration_months: u32,
    pub interest_type: InterestType,
    pub interest_frequency: InterestFrequency,
}

impl InterestTerms {
    pub fn new(
        principal: Money,
        rate: Rate,
        duration_months: u32,
        interest_type: InterestType,
        interest_frequency: InterestFrequency,
    ) -> Self {
        Self {
            principal,
            rate,
            duration_months,
            interest_type,
            interest_frequency,
        }
    }

    /// reject terms the calculator is not defined for
    pub fn validate(&self) -> Result<()> {
        if !self.principal.is_positive() {
            return Err(LedgerError::validation(
                "principal_amount",
                format!("must be greater than zero, got {}", self.principal),
            ));
        }
        if !self.rate.is_positive() {
            return Err(LedgerError::validation(
                "interest_rate",
                format!("must be greater than zero, got {}", self.rate),
            ));
        }
        if self.duration_months < 1 {
            return Err(LedgerError::validation(
                "duration_months",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// compute interest for these terms
    pub fn compute(&self) -> Result<InterestBreakdown> {
        compute_interest(
            self.principal,
            self.rate,
            self.duration_months,
            self.interest_type,
            self.interest_frequency,
        )
    }
}

/// interest result, every amount rounded to currency precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestBreakdown {
    pub monthly_interest: Money,
    pub total_interest: Money,
    pub total_amount: Money,
}

/// per-month decimal multiplier for a nominal percentage rate
pub fn monthly_rate(rate: Rate, frequency: InterestFrequency) -> Decimal {
    match frequency {
        InterestFrequency::Monthly => rate.as_decimal(),
        InterestFrequency::Yearly => rate.monthly_rate().as_decimal(),
    }
}

/// Compute monthly interest, total interest and total payable amount.
///
/// Pure. The caller validates the inputs first (see [`InterestTerms::validate`]);
/// only arithmetic overflow is reported here.
pub fn compute_interest(
    principal: Money,
    rate: Rate,
    duration_months: u32,
    interest_type: InterestType,
    interest_frequency: InterestFrequency,
) -> Result<InterestBreakdown> {
    let period_rate = monthly_rate(rate, interest_frequency);

    let factor = match interest_type {
        InterestType::Simple => simple_factor(period_rate, duration_months)?,
        InterestType::Compound => compound_factor(period_rate, duration_months)?,
    };

    let principal = principal.as_decimal();
    let total_amount = principal.checked_mul(factor).ok_or_else(|| LedgerError::Calculation {
        message: format!("total amount overflow for principal {principal}"),
    })?;
    let total_interest = total_amount - principal;
    let monthly_interest = if duration_months == 0 {
        Decimal::ZERO
    } else {
        total_interest / Decimal::from(duration_months)
    };

    Ok(InterestBreakdown {
        monthly_interest: Money::from_decimal(round_currency(monthly_interest)),
        total_interest: Money::from_decimal(round_currency(total_interest)),
        total_amount: Money::from_decimal(round_currency(total_amount)),
    })
}
