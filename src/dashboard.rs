//! Cross-loan totals and recent activity for one owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::LedgerConfig;
use crate::decimal::Money;
use crate::lifecycle;
use crate::loan::Loan;
use crate::payments::{sort_newest_first, Payment};
use crate::types::{LoanId, LoanStatus, LoanType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_lent: Money,
    pub total_borrowed: Money,
    pub total_interest_earned: Money,
    pub total_outstanding: Money,
    pub total_loans: usize,
    pub active_loans: usize,
    pub overdue_count: usize,
    pub upcoming_payments: Vec<Loan>,
    pub overdue_payments: Vec<Loan>,
    pub recent_transactions: Vec<RecentTransaction>,
}

/// a payment annotated with the loan it repaid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentTransaction {
    #[serde(flatten)]
    pub payment: Payment,
    /// absent when the loan has since been deleted
    pub loan_type: Option<LoanType>,
    pub principal_amount: Option<Money>,
}

/// Summarise an owner's loans and payments as of `now`.
///
/// Statuses are read through [`lifecycle::status_at`], so loans whose
/// overdue transition has not been persisted yet are still counted right.
pub fn summarize(
    loans: &[Loan],
    payments: &[Payment],
    now: DateTime<Utc>,
    config: &LedgerConfig,
) -> DashboardSummary {
    let window = config.upcoming_window();

    let mut total_lent = Money::ZERO;
    let mut total_borrowed = Money::ZERO;
    let mut total_interest_earned = Money::ZERO;
    let mut total_outstanding = Money::ZERO;
    let mut active_loans = 0;
    let mut upcoming_payments = Vec::new();
    let mut overdue_payments = Vec::new();

    for loan in loans {
        let status = lifecycle::status_at(loan, now);

        match loan.loan_type {
            LoanType::Given => {
                total_lent += loan.principal_amount;
                if status == LoanStatus::Completed {
                    total_interest_earned += loan.total_interest;
                } else {
                    total_outstanding += loan.remaining_balance;
                }
            }
            LoanType::Taken => {
                total_borrowed += loan.principal_amount;
            }
        }

        match status {
            LoanStatus::Overdue => {
                let mut loan = loan.clone();
                loan.status = status;
                overdue_payments.push(loan);
            }
            LoanStatus::Active => {
                active_loans += 1;
                if lifecycle::is_upcoming(loan, now, window) {
                    upcoming_payments.push(loan.clone());
                }
            }
            LoanStatus::Completed => {}
        }
    }

    DashboardSummary {
        total_lent,
        total_borrowed,
        total_interest_earned,
        total_outstanding,
        total_loans: loans.len(),
        active_loans,
        overdue_count: overdue_payments.len(),
        upcoming_payments,
        overdue_payments,
        recent_transactions: recent_transactions(loans, payments, config.recent_transactions_limit),
    }
}

/// the `limit` most recently dated payments, newest first
pub fn recent_transactions(loans: &[Loan], payments: &[Payment], limit: usize) -> Vec<RecentTransaction> {
    let by_id: HashMap<LoanId, &Loan> = loans.iter().map(|l| (l.id, l)).collect();

    let mut sorted = payments.to_vec();
    sort_newest_first(&mut sorted);

    sorted
        .into_iter()
        .take(limit)
        .map(|payment| {
            let loan = by_id.get(&payment.loan_id);
            RecentTransaction {
                loan_type: loan.map(|l| l.loan_type),
                principal_amount: loan.map(|l| l.principal_amount),
                payment,
            }
        })
        .collect()
}
