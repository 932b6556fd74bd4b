use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// identity that owns loans, payments and customers
pub type OwnerId = Uuid;
pub type LoanId = Uuid;
pub type PaymentId = Uuid;
pub type CustomerId = Uuid;

/// direction of the money
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanType {
    /// owner lent money to the customer
    Given,
    /// owner borrowed money from the customer
    Taken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterestType {
    #[default]
    Simple,
    Compound,
}

/// period the stated interest rate refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterestFrequency {
    #[default]
    Monthly,
    Yearly,
}

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    /// performing, due date not yet passed
    #[default]
    Active,
    /// due date passed with a balance left
    Overdue,
    /// fully repaid; terminal
    Completed,
}

impl LoanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Upi,
    BankTransfer,
    Cheque,
    Other,
}

/// Patch field: absent leaves the value alone, `null` clears it.
///
/// Use with `#[serde(default, deserialize_with = "crate::types::nullable")]`
/// on an `Option<Option<T>>`.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
