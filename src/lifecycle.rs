//! Loan status transitions.
//!
//! ```text
//! ACTIVE ──due date passed, balance left──▶ OVERDUE
//!   │                                         │
//!   └──────────balance reaches zero───────────┴──▶ COMPLETED
//! ```
//!
//! The overdue check is a pure function of the loan and a point in time. It
//! runs whenever a loan is read; nothing sweeps loans in the background.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, Result};
use crate::loan::Loan;
use crate::types::LoanStatus;

/// a status change applied to a loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: LoanStatus,
    pub to: LoanStatus,
    pub reason: String,
}

/// start date plus whole calendar months; month ends clamp (Jan 31 + 1 = Feb 29 in 2024)
pub fn due_date(start_date: DateTime<Utc>, duration_months: u32) -> Result<DateTime<Utc>> {
    start_date
        .checked_add_months(Months::new(duration_months))
        .ok_or_else(|| LedgerError::Calculation {
            message: format!("due date out of range: {start_date} + {duration_months} months"),
        })
}

/// status the loan should have at `now`
pub fn status_at(loan: &Loan, now: DateTime<Utc>) -> LoanStatus {
    match loan.status {
        LoanStatus::Active if now > loan.due_date && loan.remaining_balance.is_positive() => {
            LoanStatus::Overdue
        }
        status => status,
    }
}

/// apply the overdue check, returning the transition if one happened
pub fn refresh_status(loan: &mut Loan, now: DateTime<Utc>) -> Option<StatusTransition> {
    let next = status_at(loan, now);
    if next == loan.status {
        return None;
    }

    let transition = StatusTransition {
        from: loan.status,
        to: next,
        reason: format!(
            "due date {} passed with {} outstanding",
            loan.due_date.format("%Y-%m-%d"),
            loan.remaining_balance.to_currency()
        ),
    };
    loan.status = next;
    loan.updated_at = now;
    Some(transition)
}

/// complete the loan once nothing is left to repay, whatever its due date
pub fn settle_if_repaid(loan: &mut Loan, now: DateTime<Utc>) -> Option<StatusTransition> {
    if loan.status.is_terminal() || loan.remaining_balance.is_positive() {
        return None;
    }

    let transition = StatusTransition {
        from: loan.status,
        to: LoanStatus::Completed,
        reason: "balance repaid".to_string(),
    };
    loan.status = LoanStatus::Completed;
    loan.updated_at = now;
    Some(transition)
}

/// active loan falling due within `window` of `now`
pub fn is_upcoming(loan: &Loan, now: DateTime<Utc>, window: Duration) -> bool {
    status_at(loan, now) == LoanStatus::Active && loan.due_date <= now + window
}
