//! # Incident Store
//!
//! Every SOS trigger leaves exactly one incident behind, written in full or not
//! at all. After creation the only mutation is the owner flipping `status` to
//! resolved, done as a single conditional update so a concurrent resolve can
//! neither clobber another write nor bring back a missing incident.
//!
//! Backends:
//! - [`crate::database::RedisStore`] for deployments
//! - [`MemoryStore`] when no Redis is configured, and in tests
use async_trait::async_trait;
use sos_core::{Incident, IncidentStatus};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved,
    NotFound,
    Forbidden,
}

#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn insert(&self, incident: &Incident) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Incident>, StoreError>;

    /// Sets `Resolved` only if the incident exists and belongs to `owner_id`.
    async fn resolve(&self, id: &str, owner_id: &str) -> Result<ResolveOutcome, StoreError>;

    /// Newest first.
    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Incident>, StoreError>;
}

#[derive(Default)]
pub struct MemoryStore {
    incidents: RwLock<Vec<Incident>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.incidents.read().await.len()
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn insert(&self, incident: &Incident) -> Result<(), StoreError> {
        self.incidents.write().await.push(incident.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Incident>, StoreError> {
        let incidents = self.incidents.read().await;
        Ok(incidents.iter().find(|incident| incident.id == id).cloned())
    }

    async fn resolve(&self, id: &str, owner_id: &str) -> Result<ResolveOutcome, StoreError> {
        let mut incidents = self.incidents.write().await;

        let Some(incident) = incidents.iter_mut().find(|incident| incident.id == id) else {
            return Ok(ResolveOutcome::NotFound);
        };

        if incident.owner_id != owner_id {
            return Ok(ResolveOutcome::Forbidden);
        }

        incident.status = IncidentStatus::Resolved;
        Ok(ResolveOutcome::Resolved)
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Incident>, StoreError> {
        let incidents = self.incidents.read().await;

        // insertion order reversed first so equal timestamps still come out newest first
        let mut owned: Vec<Incident> = incidents
            .iter()
            .rev()
            .filter(|incident| incident.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(owned)
    }
}
