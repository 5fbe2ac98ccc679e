// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Temp-email persistence boundary.
//!
//! Production deployments back this with the relational store; the
//! in-memory implementation serves tests and single-node demos.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// A created temporary address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TempEmail {
    pub id: Uuid,
    /// Owning user; `None` for anonymous addresses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub email: String,
    pub domain_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Input to [`TempEmailStore::create_temp_email`].
#[derive(Debug, Clone)]
pub struct NewTempEmail {
    pub user_id: Option<String>,
    pub email: String,
    pub domain_id: String,
    pub ttl: Duration,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Address already exists: {0}")]
    Duplicate(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Expiry out of range for ttl {0}")]
    ExpiryOutOfRange(Duration),
}

#[async_trait]
pub trait TempEmailStore: Send + Sync {
    async fn create_temp_email(&self, new: NewTempEmail) -> Result<TempEmail, StoreError>;
}

/// Process-local store keyed by address.
#[derive(Default)]
pub struct InMemoryTempEmailStore {
    by_address: DashMap<String, TempEmail>,
}

impl InMemoryTempEmailStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, email: &str) -> Option<TempEmail> {
        self.by_address
            .get(&email.to_lowercase())
            .map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

#[async_trait]
impl TempEmailStore for InMemoryTempEmailStore {
    async fn create_temp_email(&self, new: NewTempEmail) -> Result<TempEmail, StoreError> {
        let created_at = Utc::now();
        let expires_at = created_at
            .checked_add_signed(new.ttl)
            .ok_or(StoreError::ExpiryOutOfRange(new.ttl))?;
        let record = TempEmail {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            email: new.email,
            domain_id: new.domain_id,
            created_at,
            expires_at,
        };

        match self.by_address.entry(record.email.to_lowercase()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StoreError::Duplicate(record.email))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }
}
