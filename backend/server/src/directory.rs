use std::collections::HashMap;

use async_trait::async_trait;
use sos_core::{Contact, Identity};
use tokio::sync::RwLock;

use crate::store::StoreError;

/// Trusted contacts, owned by the contacts service.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Contacts in the order they were saved.
    async fn find_contacts_by_owner(&self, owner_id: &str) -> Result<Vec<Contact>, StoreError>;
}

/// Session tokens issued by the auth service. The identity is trusted as-is.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve_session(&self, token: &str) -> Result<Option<Identity>, StoreError>;
}

#[derive(Default)]
pub struct MemoryDirectory {
    contacts: RwLock<HashMap<String, Vec<Contact>>>,
    sessions: RwLock<HashMap<String, Identity>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_contact(&self, contact: Contact) {
        self.contacts
            .write()
            .await
            .entry(contact.owner_id.clone())
            .or_default()
            .push(contact);
    }

    pub async fn insert_session(&self, token: &str, identity: Identity) {
        self.sessions
            .write()
            .await
            .insert(token.to_string(), identity);
    }
}

#[async_trait]
impl ContactDirectory for MemoryDirectory {
    async fn find_contacts_by_owner(&self, owner_id: &str) -> Result<Vec<Contact>, StoreError> {
        let contacts = self.contacts.read().await;
        Ok(contacts.get(owner_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl SessionResolver for MemoryDirectory {
    async fn resolve_session(&self, token: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self.sessions.read().await.get(token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(owner: &str, name: &str) -> Contact {
        Contact {
            id: format!("{owner}-{name}"),
            owner_id: owner.to_string(),
            display_name: name.to_string(),
            raw_phone: "9876543210".to_string(),
        }
    }

    #[tokio::test]
    async fn test_contacts_keep_order_per_owner() {
        let directory = MemoryDirectory::new();
        directory.insert_contact(contact("alice", "Mom")).await;
        directory.insert_contact(contact("bob", "Dad")).await;
        directory.insert_contact(contact("alice", "Sister")).await;

        let names: Vec<String> = directory
            .find_contacts_by_owner("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.display_name)
            .collect();

        assert_eq!(names, vec!["Mom", "Sister"]);
        assert!(directory.find_contacts_by_owner("carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sessions() {
        let directory = MemoryDirectory::new();
        let identity = Identity {
            user_id: "alice".to_string(),
            display_name: "Alice".to_string(),
        };
        directory.insert_session("token-1", identity.clone()).await;

        assert_eq!(directory.resolve_session("token-1").await.unwrap(), Some(identity));
        assert_eq!(directory.resolve_session("token-2").await.unwrap(), None);
    }
}
