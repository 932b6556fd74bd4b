use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{LedgerError, Result};
use crate::types::{CustomerId, OwnerId};

/// counterparty of a loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub owner_id: OwnerId,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewCustomer {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomerUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "crate::types::nullable", skip_serializing_if = "Option::is_none")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::types::nullable", skip_serializing_if = "Option::is_none")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::types::nullable", skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
}

fn clean_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::validation("name", "customer name is required"));
    }
    Ok(trimmed.to_string())
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

impl Customer {
    pub fn create(owner_id: OwnerId, request: NewCustomer, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id,
            name: clean_name(&request.name)?,
            phone: clean_optional(request.phone),
            address: clean_optional(request.address),
            notes: request.notes,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply(&mut self, update: CustomerUpdate, now: DateTime<Utc>) -> Result<()> {
        if let Some(name) = update.name {
            self.name = clean_name(&name)?;
        }
        if let Some(phone) = update.phone {
            self.phone = clean_optional(phone);
        }
        if let Some(address) = update.address {
            self.address = clean_optional(address);
        }
        if let Some(notes) = update.notes {
            self.notes = notes;
        }
        self.updated_at = now;
        Ok(())
    }
}
