pub mod book;
pub mod config;
pub mod customer;
pub mod dashboard;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod interest;
pub mod lifecycle;
pub mod loan;
pub mod payments;
pub mod store;
pub mod types;

// re-export key types
pub use book::LoanBook;
pub use config::LedgerConfig;
pub use customer::{Customer, CustomerUpdate, NewCustomer};
pub use dashboard::{DashboardSummary, RecentTransaction};
pub use decimal::{Money, Rate};
pub use errors::{LedgerError, Result};
pub use events::{Event, EventStore};
pub use interest::{compute_interest, InterestBreakdown, InterestTerms};
pub use lifecycle::StatusTransition;
pub use loan::{Loan, LoanTerms, LoanUpdate, NewLoan};
pub use payments::{NewPayment, Payment, PaymentReceipt};
pub use store::{LedgerStore, MemoryStore, StoreError};
pub use types::{
    CustomerId, InterestFrequency, InterestType, LoanId, LoanStatus, LoanType, OwnerId,
    PaymentId, PaymentMethod,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
