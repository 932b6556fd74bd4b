use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: Uuid,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("calculation error: {message}")]
    Calculation {
        message: String,
    },
}

impl LedgerError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn loan_not_found(id: Uuid) -> Self {
        LedgerError::NotFound { entity: "loan", id }
    }

    pub fn customer_not_found(id: Uuid) -> Self {
        LedgerError::NotFound { entity: "customer", id }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, LedgerError::Validation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
