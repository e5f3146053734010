//! Contact service
//!
//! Contacts are built in explicit, ordered steps:
//! normalize phone, validate E.164, safety allow-list, normalize tags, then
//! the uniqueness check against storage. Nothing runs implicitly on save.

use dialer_core::{
    models::{Contact, ContactStatus, SafetyPolicy},
    traits::ContactRepository,
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub struct ContactService {
    repo: Arc<dyn ContactRepository>,
    safety: SafetyPolicy,
}

impl ContactService {
    pub fn new(repo: Arc<dyn ContactRepository>, safety: SafetyPolicy) -> Self {
        Self { repo, safety }
    }

    /// Normalize, validate and safety-check a raw destination
    pub fn prepare_destination(&self, raw: &str) -> AppResult<String> {
        let phone = Contact::normalize_phone(raw);
        Contact::validate_e164(&phone)?;
        self.safety.check(&phone)?;
        Ok(phone)
    }

    /// Create a contact; the phone number must not exist yet
    #[instrument(skip(self, tags))]
    pub async fn create(
        &self,
        phone_number: &str,
        name: Option<String>,
        campaign_tag: Option<String>,
        tags: Vec<String>,
    ) -> AppResult<Contact> {
        let phone = self.prepare_destination(phone_number)?;
        let contact = Contact::new(&phone, name, campaign_tag, tags)?;

        if self.repo.find_by_phone(&contact.phone_number).await?.is_some() {
            return Err(AppError::AlreadyExists(format!(
                "contact with phone {}",
                contact.phone_number
            )));
        }

        let created = self.repo.insert(&contact).await?;
        info!("Created contact {} ({})", created.id, created.phone_number);
        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Contact> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::ContactNotFound(id.to_string()))
    }

    /// Fail unless an existing contact for `phone` may be dialed
    ///
    /// `phone` must already be normalized.
    pub async fn ensure_dialable(&self, phone: &str) -> AppResult<Option<Contact>> {
        match self.repo.find_by_phone(phone).await? {
            Some(contact) if !contact.status.can_be_dialed() => Err(AppError::Validation(format!(
                "contact {} is {} and must not be dialed",
                phone, contact.status
            ))),
            other => Ok(other),
        }
    }

    /// Contact for an inbound call request, created on first sight
    ///
    /// `phone` must already be normalized.
    #[instrument(skip(self))]
    pub async fn find_or_create_for_request(
        &self,
        phone: &str,
        campaign_tag: Option<String>,
    ) -> AppResult<Contact> {
        if let Some(existing) = self.ensure_dialable(phone).await? {
            return Ok(existing);
        }

        match self.create(phone, None, campaign_tag, Vec::new()).await {
            Ok(contact) => Ok(contact),
            // Lost a race with a concurrent create for the same number
            Err(AppError::AlreadyExists(_)) => self
                .ensure_dialable(phone)
                .await?
                .ok_or_else(|| AppError::Internal(format!("contact {} vanished", phone))),
            Err(e) => Err(e),
        }
    }

    /// Add tags to many contacts; every tag is checked before any write
    #[instrument(skip(self, tags))]
    pub async fn bulk_tag(&self, ids: &[Uuid], tags: Vec<String>) -> AppResult<Vec<Contact>> {
        let tags: Vec<String> = Contact::normalize_tags(tags)?.into_iter().collect();

        let mut contacts = Vec::with_capacity(ids.len());
        for id in ids {
            let mut contact = self.get(*id).await?;
            contact.add_tags(tags.iter().cloned())?;
            contacts.push(contact);
        }

        let mut updated = Vec::with_capacity(contacts.len());
        for contact in &contacts {
            updated.push(self.repo.update(contact).await?);
        }

        info!("Tagged {} contacts with {:?}", updated.len(), tags);
        Ok(updated)
    }

    /// Change lifecycle status for many contacts
    #[instrument(skip(self))]
    pub async fn bulk_set_status(&self, ids: &[Uuid], status: ContactStatus) -> AppResult<u64> {
        let changed = self.repo.set_status(ids, status).await?;
        if changed < ids.len() as u64 {
            warn!(
                "Only {} of {} contacts changed to {}",
                changed,
                ids.len(),
                status
            );
        }
        Ok(changed)
    }

    /// Delete a contact together with its call records
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        if !self.repo.delete(id).await? {
            return Err(AppError::ContactNotFound(id.to_string()));
        }
        info!("Deleted contact {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct MockContactRepository {
        contacts: Mutex<HashMap<Uuid, Contact>>,
    }

    impl MockContactRepository {
        fn new() -> Self {
            Self {
                contacts: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl ContactRepository for MockContactRepository {
        async fn insert(&self, contact: &Contact) -> AppResult<Contact> {
            self.contacts.lock().insert(contact.id, contact.clone());
            Ok(contact.clone())
        }

        async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Contact>> {
            Ok(self.contacts.lock().get(&id).cloned())
        }

        async fn find_by_phone(&self, phone_number: &str) -> AppResult<Option<Contact>> {
            Ok(self
                .contacts
                .lock()
                .values()
                .find(|c| c.phone_number == phone_number)
                .cloned())
        }

        async fn update(&self, contact: &Contact) -> AppResult<Contact> {
            self.contacts.lock().insert(contact.id, contact.clone());
            Ok(contact.clone())
        }

        async fn delete(&self, id: Uuid) -> AppResult<bool> {
            Ok(self.contacts.lock().remove(&id).is_some())
        }

        async fn set_status(&self, ids: &[Uuid], status: ContactStatus) -> AppResult<u64> {
            let mut contacts = self.contacts.lock();
            let mut changed = 0;
            for id in ids {
                if let Some(c) = contacts.get_mut(id) {
                    c.set_status(status);
                    changed += 1;
                }
            }
            Ok(changed)
        }
    }

    fn service(safety: SafetyPolicy) -> ContactService {
        ContactService::new(Arc::new(MockContactRepository::new()), safety)
    }

    #[tokio::test]
    async fn test_create_normalizes_and_rejects_duplicates() {
        let svc = service(SafetyPolicy::unrestricted());
        let contact = svc
            .create("+1 (500) 555-0006", Some("Ada".into()), None, vec!["VIP ".into()])
            .await
            .unwrap();

        assert_eq!(contact.phone_number, "+15005550006");
        assert!(contact.tags.contains("vip"));

        let err = svc.create("15005550006", None, None, vec![]).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_safety_applies_before_storage() {
        let svc = service(SafetyPolicy::restricted(["+1"]));
        let err = svc.create("+442071838750", None, None, vec![]).await.unwrap_err();
        assert!(matches!(err, AppError::UnsafeDestination(_)));
    }

    #[tokio::test]
    async fn test_blocked_contact_not_dialable() {
        let svc = service(SafetyPolicy::unrestricted());
        let contact = svc.create("+15005550006", None, None, vec![]).await.unwrap();
        svc.bulk_set_status(&[contact.id], ContactStatus::DoNotCall)
            .await
            .unwrap();

        let err = svc
            .find_or_create_for_request("+15005550006", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_find_or_create_reuses_contact() {
        let svc = service(SafetyPolicy::unrestricted());
        let first = svc.find_or_create_for_request("+15005550006", None).await.unwrap();
        let second = svc.find_or_create_for_request("+15005550006", None).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_bulk_tag_respects_limit() {
        let svc = service(SafetyPolicy::unrestricted());
        let contact = svc.create("+15005550006", None, None, vec![]).await.unwrap();

        let too_many: Vec<String> = (0..21).map(|i| format!("tag{}", i)).collect();
        assert!(svc.bulk_tag(&[contact.id], too_many).await.is_err());

        let tagged = svc
            .bulk_tag(&[contact.id], vec!["spring".into(), "Spring".into()])
            .await
            .unwrap();
        assert_eq!(tagged[0].tags.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_contact() {
        let svc = service(SafetyPolicy::unrestricted());
        let err = svc.delete(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::ContactNotFound(_)));
    }
}
