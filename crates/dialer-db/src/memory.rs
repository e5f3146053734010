//! In-memory storage backend
//!
//! Implements every repository trait over `parking_lot` locks. Used by tests
//! and by deployments started without a database URL. Data lives for the
//! lifetime of the process.

use async_trait::async_trait;
use dialer_core::{
    models::{BudgetLedger, CallRecord, CallStatus, Contact, ContactStatus},
    traits::{BudgetRepository, CallRepository, ContactRepository, LedgerOp},
    AppError, AppResult,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Process-local store for contacts, call records and budget ledgers
#[derive(Default)]
pub struct InMemoryStore {
    contacts: RwLock<HashMap<Uuid, Contact>>,
    calls: RwLock<HashMap<Uuid, CallRecord>>,
    ledgers: Mutex<HashMap<String, BudgetLedger>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored call records
    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }

    fn provider_id_taken(
        calls: &HashMap<Uuid, CallRecord>,
        record: &CallRecord,
    ) -> bool {
        match &record.provider_call_id {
            Some(pid) => calls
                .values()
                .any(|c| c.id != record.id && c.provider_call_id.as_deref() == Some(pid.as_str())),
            None => false,
        }
    }
}

// ==================== Call records ====================

#[async_trait]
impl CallRepository for InMemoryStore {
    async fn insert(&self, record: &CallRecord) -> AppResult<CallRecord> {
        if !self.contacts.read().contains_key(&record.contact_id) {
            return Err(AppError::ContactNotFound(record.contact_id.to_string()));
        }

        let mut calls = self.calls.write();
        if calls.contains_key(&record.id) {
            return Err(AppError::AlreadyExists(format!("call record {}", record.id)));
        }
        if Self::provider_id_taken(&calls, record) {
            return Err(AppError::AlreadyExists(format!(
                "provider call id {:?}",
                record.provider_call_id
            )));
        }
        calls.insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<CallRecord>> {
        Ok(self.calls.read().get(&id).cloned())
    }

    async fn find_by_provider_call_id(&self, provider_call_id: &str) -> AppResult<Option<CallRecord>> {
        Ok(self
            .calls
            .read()
            .values()
            .find(|c| c.provider_call_id.as_deref() == Some(provider_call_id))
            .cloned())
    }

    async fn update(&self, record: &mut CallRecord) -> AppResult<bool> {
        let mut calls = self.calls.write();
        if Self::provider_id_taken(&calls, record) {
            return Err(AppError::AlreadyExists(format!(
                "provider call id {:?}",
                record.provider_call_id
            )));
        }

        match calls.get_mut(&record.id) {
            Some(stored) if stored.status.is_terminal() => {
                debug!("Call record {} not written: already {}", record.id, stored.status);
                Ok(false)
            }
            Some(stored) if stored.version != record.version => {
                debug!(
                    "Call record {} not written: version {} is stale, stored {}",
                    record.id, record.version, stored.version
                );
                Ok(false)
            }
            Some(stored) => {
                record.version += 1;
                *stored = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_unplaced(&self) -> AppResult<Vec<CallRecord>> {
        let calls = self.calls.read();
        let mut unplaced: Vec<CallRecord> = calls
            .values()
            .filter(|c| {
                matches!(c.status, CallStatus::Pending | CallStatus::Queued)
                    && c.provider_call_id.is_none()
            })
            .cloned()
            .collect();
        unplaced.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(unplaced)
    }

    async fn list(
        &self,
        status: Option<CallStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<CallRecord>, i64)> {
        let calls = self.calls.read();
        let mut matching: Vec<&CallRecord> = calls
            .values()
            .filter(|c| status.map_or(true, |s| c.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }
}

// ==================== Contacts ====================

#[async_trait]
impl ContactRepository for InMemoryStore {
    async fn insert(&self, contact: &Contact) -> AppResult<Contact> {
        let mut contacts = self.contacts.write();
        if contacts
            .values()
            .any(|c| c.phone_number == contact.phone_number)
        {
            return Err(AppError::AlreadyExists(format!(
                "contact {}",
                contact.phone_number
            )));
        }
        contacts.insert(contact.id, contact.clone());
        Ok(contact.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Contact>> {
        Ok(self.contacts.read().get(&id).cloned())
    }

    async fn find_by_phone(&self, phone_number: &str) -> AppResult<Option<Contact>> {
        Ok(self
            .contacts
            .read()
            .values()
            .find(|c| c.phone_number == phone_number)
            .cloned())
    }

    async fn update(&self, contact: &Contact) -> AppResult<Contact> {
        let mut contacts = self.contacts.write();
        let stored = contacts
            .get_mut(&contact.id)
            .ok_or_else(|| AppError::ContactNotFound(contact.id.to_string()))?;
        *stored = contact.clone();
        Ok(contact.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let removed = self.contacts.write().remove(&id).is_some();
        if removed {
            let mut calls = self.calls.write();
            let before = calls.len();
            calls.retain(|_, c| c.contact_id != id);
            info!(
                "Deleted contact {} and {} call records",
                id,
                before - calls.len()
            );
        }
        Ok(removed)
    }

    async fn set_status(&self, ids: &[Uuid], status: ContactStatus) -> AppResult<u64> {
        let mut contacts = self.contacts.write();
        let mut changed = 0;
        for id in ids {
            if let Some(contact) = contacts.get_mut(id) {
                contact.set_status(status);
                changed += 1;
            }
        }
        Ok(changed)
    }
}

// ==================== Budget ledgers ====================

#[async_trait]
impl BudgetRepository for InMemoryStore {
    async fn ensure(&self, ledger: &BudgetLedger) -> AppResult<BudgetLedger> {
        let mut ledgers = self.ledgers.lock();
        Ok(ledgers
            .entry(ledger.name().to_string())
            .or_insert_with(|| ledger.clone())
            .clone())
    }

    async fn get(&self, name: &str) -> AppResult<Option<BudgetLedger>> {
        Ok(self.ledgers.lock().get(name).cloned())
    }

    async fn modify(&self, name: &str, op: LedgerOp<'_>) -> AppResult<BudgetLedger> {
        let mut ledgers = self.ledgers.lock();
        let stored = ledgers
            .get_mut(name)
            .ok_or_else(|| AppError::Internal(format!("budget ledger {} not found", name)))?;

        // Work on a copy so a failed op leaves the row untouched
        let mut ledger = stored.clone();
        op(&mut ledger)?;
        *stored = ledger.clone();
        Ok(ledger)
    }
}
