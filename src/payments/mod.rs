//! Repayments and their effect on a loan's balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::loan::Loan;
use crate::types::{LoanId, LoanStatus, OwnerId, PaymentId, PaymentMethod};

/// a recorded repayment; never changed after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub owner_id: OwnerId,
    pub loan_id: LoanId,
    pub amount: Money,
    pub payment_date: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// payment request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPayment {
    pub loan_id: LoanId,
    pub amount: Money,
    #[serde(default)]
    pub payment_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewPayment {
    pub fn new(loan_id: LoanId, amount: Money) -> Self {
        Self {
            loan_id,
            amount,
            payment_date: None,
            payment_method: None,
            notes: None,
        }
    }

    pub fn on(mut self, payment_date: DateTime<Utc>) -> Self {
        self.payment_date = Some(payment_date);
        self
    }

    pub fn via(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_positive() {
            return Err(LedgerError::validation(
                "amount",
                format!("must be greater than zero, got {}", self.amount),
            ));
        }
        Ok(())
    }
}

impl Payment {
    /// build the immutable record; date defaults to `now`, method to cash
    pub fn record(owner_id: OwnerId, request: NewPayment, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            loan_id: request.loan_id,
            amount: request.amount,
            payment_date: request.payment_date.unwrap_or(now),
            payment_method: request.payment_method.unwrap_or_default(),
            notes: request.notes,
            created_at: now,
        }
    }
}

/// what recording a payment returns to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub remaining_balance: Money,
    pub loan_status: LoanStatus,
}

/// how a payment amount landed on the balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceApplication {
    pub previous_balance: Money,
    pub applied: Money,
    /// overpayment absorbed without credit
    pub excess: Money,
    pub remaining_balance: Money,
}

/// decrement the loan's balance by `amount`, flooring at zero
pub fn apply_to_balance(loan: &mut Loan, amount: Money, now: DateTime<Utc>) -> BalanceApplication {
    let previous_balance = loan.remaining_balance;
    let applied = amount.min(previous_balance).max(Money::ZERO);
    let remaining_balance = previous_balance.saturating_sub(amount);

    loan.remaining_balance = remaining_balance;
    loan.updated_at = now;

    BalanceApplication {
        previous_balance,
        applied,
        excess: amount - applied,
        remaining_balance,
    }
}

/// sum of a loan's payment history
pub fn total_paid<'a>(payments: impl IntoIterator<Item = &'a Payment>) -> Money {
    payments.into_iter().map(|p| p.amount).sum()
}

/// balance implied by the full payment history
pub fn reconciled_balance<'a>(total_amount: Money, payments: impl IntoIterator<Item = &'a Payment>) -> Money {
    total_amount.saturating_sub(total_paid(payments))
}

/// newest payment date first, later-created first on ties
pub fn sort_newest_first(payments: &mut [Payment]) {
    payments.sort_by(|a, b| {
        b.payment_date
            .cmp(&a.payment_date)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}
