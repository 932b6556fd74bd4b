use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::lifecycle::StatusTransition;
use crate::types::{LoanId, LoanStatus, LoanType, OwnerId, PaymentId};

/// everything the loan book reports about a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    LoanOriginated {
        loan_id: LoanId,
        owner_id: OwnerId,
        loan_type: LoanType,
        principal: Money,
        total_amount: Money,
        due_date: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    StatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    LoanCompleted {
        loan_id: LoanId,
        final_payment: Option<Money>,
        timestamp: DateTime<Utc>,
    },
    LoanDeleted {
        loan_id: LoanId,
        orphaned_payments: usize,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentReceived {
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        applied: Money,
        excess: Money,
        remaining_balance: Money,
        timestamp: DateTime<Utc>,
    },

    // recalculation events
    TermsRecalculated {
        loan_id: LoanId,
        old_total: Money,
        new_total: Money,
        remaining_balance: Money,
        timestamp: DateTime<Utc>,
    },
    BalanceReconciled {
        loan_id: LoanId,
        old_balance: Money,
        new_balance: Money,
        payments_total: Money,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn status_changed(loan_id: LoanId, transition: StatusTransition, timestamp: DateTime<Utc>) -> Self {
        Event::StatusChanged {
            loan_id,
            old_status: transition.from,
            new_status: transition.to,
            reason: transition.reason,
            timestamp,
        }
    }

    pub fn loan_id(&self) -> LoanId {
        match self {
            Event::LoanOriginated { loan_id, .. }
            | Event::StatusChanged { loan_id, .. }
            | Event::LoanCompleted { loan_id, .. }
            | Event::LoanDeleted { loan_id, .. }
            | Event::PaymentReceived { loan_id, .. }
            | Event::TermsRecalculated { loan_id, .. }
            | Event::BalanceReconciled { loan_id, .. } => *loan_id,
        }
    }
}

/// events emitted during operations, held until the caller drains them
#[derive(Debug, Default)]
pub struct EventStore {
    pending: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: Event) {
        tracing::trace!(loan_id = %event.loan_id(), ?event, "event emitted");
        self.pending.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending(&self) -> &[Event] {
        &self.pending
    }
}
