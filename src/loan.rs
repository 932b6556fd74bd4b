use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::interest::{InterestBreakdown, InterestTerms};
use crate::lifecycle;
use crate::types::{
    CustomerId, InterestFrequency, InterestType, LoanId, LoanStatus, LoanType, OwnerId,
};

/// a loan given to, or taken from, a customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub owner_id: OwnerId,
    pub customer_id: CustomerId,
    pub loan_type: LoanType,

    // terms
    pub principal_amount: Money,
    pub interest_rate: Rate,
    pub interest_type: InterestType,
    pub interest_frequency: InterestFrequency,
    pub start_date: DateTime<Utc>,
    pub duration_months: u32,

    // computed from the terms
    pub monthly_interest: Money,
    pub total_interest: Money,
    pub total_amount: Money,
    pub due_date: DateTime<Utc>,

    // balance
    pub remaining_balance: Money,
    pub status: LoanStatus,

    // extras
    pub document_ref: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// the part of a loan that drives its computed fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal_amount: Money,
    pub interest_rate: Rate,
    #[serde(default)]
    pub interest_type: InterestType,
    #[serde(default)]
    pub interest_frequency: InterestFrequency,
    pub start_date: DateTime<Utc>,
    pub duration_months: u32,
}

impl LoanTerms {
    pub fn interest_terms(&self) -> InterestTerms {
        InterestTerms::new(
            self.principal_amount,
            self.interest_rate,
            self.duration_months,
            self.interest_type,
            self.interest_frequency,
        )
    }
}

/// request to create a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLoan {
    pub customer_id: CustomerId,
    pub loan_type: LoanType,
    #[serde(flatten)]
    pub terms: LoanTerms,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub document_ref: Option<String>,
}

/// Changes a caller may make to a stored loan.
///
/// Computed fields are not part of this list; new terms always go back
/// through the interest calculator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoanUpdate {
    /// `Some(None)` clears the notes
    #[serde(default, deserialize_with = "crate::types::nullable", skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::types::nullable", skip_serializing_if = "Option::is_none")]
    pub document_ref: Option<Option<String>>,
    #[serde(default)]
    pub terms: Option<LoanTerms>,
}

impl LoanUpdate {
    pub fn is_empty(&self) -> bool {
        self.notes.is_none() && self.document_ref.is_none() && self.terms.is_none()
    }
}

impl Loan {
    /// originate a loan from a request, computing interest and due date
    pub fn originate(owner_id: OwnerId, request: NewLoan, now: DateTime<Utc>) -> Result<Self> {
        let interest_terms = request.terms.interest_terms();
        interest_terms.validate()?;
        // cheap range check before the calculator runs
        let due_date = lifecycle::due_date(request.terms.start_date, request.terms.duration_months)?;
        let breakdown = interest_terms.compute()?;

        Ok(Self {
            id: Uuid::new_v4(),
            owner_id,
            customer_id: request.customer_id,
            loan_type: request.loan_type,
            principal_amount: request.terms.principal_amount,
            interest_rate: request.terms.interest_rate,
            interest_type: request.terms.interest_type,
            interest_frequency: request.terms.interest_frequency,
            start_date: request.terms.start_date,
            duration_months: request.terms.duration_months,
            monthly_interest: breakdown.monthly_interest,
            total_interest: breakdown.total_interest,
            total_amount: breakdown.total_amount,
            due_date,
            remaining_balance: breakdown.total_amount,
            status: LoanStatus::Active,
            document_ref: request.document_ref,
            notes: request.notes,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn terms(&self) -> LoanTerms {
        LoanTerms {
            principal_amount: self.principal_amount,
            interest_rate: self.interest_rate,
            interest_type: self.interest_type,
            interest_frequency: self.interest_frequency,
            start_date: self.start_date,
            duration_months: self.duration_months,
        }
    }

    pub fn breakdown(&self) -> InterestBreakdown {
        InterestBreakdown {
            monthly_interest: self.monthly_interest,
            total_interest: self.total_interest,
            total_amount: self.total_amount,
        }
    }

    /// amount repaid so far according to the stored balance
    pub fn amount_repaid(&self) -> Money {
        self.total_amount.saturating_sub(self.remaining_balance)
    }

    pub fn is_completed(&self) -> bool {
        self.status == LoanStatus::Completed
    }

    /// Replace the terms and recompute every derived field.
    ///
    /// `paid` is the sum of the loan's payment history; the new balance is
    /// the new total minus that sum, floored at zero. Terms are frozen once
    /// the loan is completed.
    pub fn apply_terms(&mut self, terms: LoanTerms, paid: Money, now: DateTime<Utc>) -> Result<InterestBreakdown> {
        if self.is_completed() {
            return Err(LedgerError::validation(
                "terms",
                "a completed loan's terms cannot change",
            ));
        }

        let interest_terms = terms.interest_terms();
        interest_terms.validate()?;
        let due_date = lifecycle::due_date(terms.start_date, terms.duration_months)?;
        let breakdown = interest_terms.compute()?;

        self.principal_amount = terms.principal_amount;
        self.interest_rate = terms.interest_rate;
        self.interest_type = terms.interest_type;
        self.interest_frequency = terms.interest_frequency;
        self.start_date = terms.start_date;
        self.duration_months = terms.duration_months;
        self.monthly_interest = breakdown.monthly_interest;
        self.total_interest = breakdown.total_interest;
        self.total_amount = breakdown.total_amount;
        self.due_date = due_date;
        self.remaining_balance = breakdown.total_amount.saturating_sub(paid);
        self.updated_at = now;

        Ok(breakdown)
    }
}
