//! Persistence the loan book runs against.
//!
//! Every lookup is scoped by owner: a record owned by someone else behaves
//! exactly like a missing one. Implementations guarantee that a single
//! record write is atomic and nothing more.

pub mod memory;

use thiserror::Error;

use crate::customer::Customer;
use crate::loan::Loan;
use crate::payments::Payment;
use crate::types::{CustomerId, LoanId, OwnerId};

pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("duplicate {entity} id: {id}")]
    Duplicate {
        entity: &'static str,
        id: uuid::Uuid,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub trait LoanStore: Send + Sync {
    fn find_loan(&self, owner_id: OwnerId, id: LoanId) -> StoreResult<Option<Loan>>;
    fn list_loans(&self, owner_id: OwnerId) -> StoreResult<Vec<Loan>>;
    fn insert_loan(&self, loan: &Loan) -> StoreResult<()>;
    /// overwrite the stored loan; `false` when the owner has no such loan
    fn update_loan(&self, loan: &Loan) -> StoreResult<bool>;
    fn delete_loan(&self, owner_id: OwnerId, id: LoanId) -> StoreResult<bool>;
}

/// payments are append-only
pub trait PaymentStore: Send + Sync {
    fn insert_payment(&self, payment: &Payment) -> StoreResult<()>;
    /// the owner's payments, all of them or those of one loan
    fn list_payments(&self, owner_id: OwnerId, loan_id: Option<LoanId>) -> StoreResult<Vec<Payment>>;
}

pub trait CustomerStore: Send + Sync {
    fn find_customer(&self, owner_id: OwnerId, id: CustomerId) -> StoreResult<Option<Customer>>;
    fn list_customers(&self, owner_id: OwnerId) -> StoreResult<Vec<Customer>>;
    fn insert_customer(&self, customer: &Customer) -> StoreResult<()>;
    fn update_customer(&self, customer: &Customer) -> StoreResult<bool>;
    fn delete_customer(&self, owner_id: OwnerId, id: CustomerId) -> StoreResult<bool>;
}

/// everything the loan book needs from persistence
pub trait LedgerStore: LoanStore + PaymentStore + CustomerStore {}

impl<T: LoanStore + PaymentStore + CustomerStore> LedgerStore for T {}
