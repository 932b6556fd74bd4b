use rust_decimal::Decimal;

use crate::errors::{LedgerError, Result};

/// growth factor (1 + r)^n, by exact square-and-multiply
pub fn compound_factor(period_rate: Decimal, periods: u32) -> Result<Decimal> {
    let overflow = || LedgerError::Calculation {
        message: format!("compound factor overflow: (1 + {period_rate})^{periods}"),
    };

    let mut base = Decimal::ONE + period_rate;
    let mut factor = Decimal::ONE;
    let mut remaining = periods;
    while remaining > 0 {
        if remaining & 1 == 1 {
            factor = factor.checked_mul(base).ok_or_else(overflow)?;
        }
        remaining >>= 1;
        // only square while a higher power is still needed
        if remaining > 0 {
            base = base.checked_mul(base).ok_or_else(overflow)?;
        }
    }
    Ok(factor)
}

/// growth factor 1 + r * n
pub fn simple_factor(period_rate: Decimal, periods: u32) -> Result<Decimal> {
    period_rate
        .checked_mul(Decimal::from(periods))
        .and_then(|growth| growth.checked_add(Decimal::ONE))
        .ok_or_else(|| LedgerError::Calculation {
            message: format!("simple factor overflow: 1 + {period_rate} * {periods}"),
        })
}
