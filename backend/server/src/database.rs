//! # Redis
//!
//! Durable home for incidents, plus read access to the contacts and sessions the
//! other services write.
//!
//! ## Requirements
//!
//! - One incident per SOS trigger, never partially written
//! - Owner lookups newest first
//! - Resolve must be atomic per incident and must not recreate a deleted one
//!
//! ## Layout
//!
//! - `sos:incident:{id}`: hash with `owner_id`, `status`, `doc`
//!   (JSON of the whole incident at creation time)
//! - `sos:owner:{owner_id}`: sorted set of incident ids scored by creation millis
//! - `sos:contacts:{owner_id}`: list of JSON contacts, in saved order
//! - `sos:session:{token}`: hash with `user_id`, `display_name`
//!
//! `status` lives in its own field so resolve can flip it with a Lua script that
//! checks existence and ownership in the same step, without decoding `doc`.
//! The incident hash and the owner index go in together through `MULTI`.
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client, RedisError, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use sos_core::{Contact, Identity, Incident, IncidentStatus};

use crate::{
    directory::{ContactDirectory, SessionResolver},
    store::{IncidentStore, ResolveOutcome, StoreError},
};

pub const INCIDENT_PREFIX: &str = "sos:incident:";
pub const OWNER_PREFIX: &str = "sos:owner:";
pub const CONTACTS_PREFIX: &str = "sos:contacts:";
pub const SESSION_PREFIX: &str = "sos:session:";

const RESOLVE_SCRIPT: &str = r#"
local owner = redis.call('HGET', KEYS[1], 'owner_id')
if not owner then
    return 0
end
if owner ~= ARGV[1] then
    return -1
end
redis.call('HSET', KEYS[1], 'status', ARGV[2])
return 1
"#;

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, RedisError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    client.get_connection_manager_with_config(config).await
}

pub fn incident_key(id: &str) -> String {
    format!("{INCIDENT_PREFIX}{id}")
}

pub fn owner_key(owner_id: &str) -> String {
    format!("{OWNER_PREFIX}{owner_id}")
}

pub fn contacts_key(owner_id: &str) -> String {
    format!("{CONTACTS_PREFIX}{owner_id}")
}

pub fn session_key(token: &str) -> String {
    format!("{SESSION_PREFIX}{token}")
}

/// Rebuilds an incident from its hash. `None` for an empty (missing) hash.
pub fn decode_incident(
    key: &str,
    fields: &HashMap<String, String>,
) -> Result<Option<Incident>, StoreError> {
    if fields.is_empty() {
        return Ok(None);
    }

    let corrupt = |reason: String| StoreError::Corrupt {
        key: key.to_string(),
        reason,
    };

    let doc = fields
        .get("doc")
        .ok_or_else(|| corrupt("missing doc".to_string()))?;
    let mut incident: Incident = serde_json::from_str(doc).map_err(|e| corrupt(e.to_string()))?;

    if let Some(status) = fields.get("status") {
        incident.status = status.parse::<IncidentStatus>().map_err(corrupt)?;
    }

    Ok(Some(incident))
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    resolve_script: Script,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            resolve_script: Script::new(RESOLVE_SCRIPT),
        }
    }
}

#[async_trait]
impl IncidentStore for RedisStore {
    async fn insert(&self, incident: &Incident) -> Result<(), StoreError> {
        let doc = serde_json::to_string(incident)?;
        let mut connection = self.connection.clone();

        redis::pipe()
            .atomic()
            .hset_multiple(
                incident_key(&incident.id),
                &[
                    ("owner_id", incident.owner_id.as_str()),
                    ("status", incident.status.as_str()),
                    ("doc", doc.as_str()),
                ],
            )
            .ignore()
            .zadd(
                owner_key(&incident.owner_id),
                &incident.id,
                incident.created_at.timestamp_millis(),
            )
            .ignore()
            .query_async::<()>(&mut connection)
            .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Incident>, StoreError> {
        let key = incident_key(id);
        let mut connection = self.connection.clone();

        let fields: HashMap<String, String> = connection.hgetall(&key).await?;
        decode_incident(&key, &fields)
    }

    async fn resolve(&self, id: &str, owner_id: &str) -> Result<ResolveOutcome, StoreError> {
        let mut connection = self.connection.clone();

        let code: i64 = self
            .resolve_script
            .key(incident_key(id))
            .arg(owner_id)
            .arg(IncidentStatus::Resolved.as_str())
            .invoke_async(&mut connection)
            .await?;

        Ok(match code {
            1 => ResolveOutcome::Resolved,
            -1 => ResolveOutcome::Forbidden,
            _ => ResolveOutcome::NotFound,
        })
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Incident>, StoreError> {
        let mut connection = self.connection.clone();

        let ids: Vec<String> = connection.zrevrange(owner_key(owner_id), 0, -1).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(incident_key(id));
        }
        let rows: Vec<HashMap<String, String>> = pipe.query_async(&mut connection).await?;

        let mut incidents = Vec::with_capacity(rows.len());
        for (id, fields) in ids.iter().zip(rows.iter()) {
            if let Some(incident) = decode_incident(&incident_key(id), fields)? {
                incidents.push(incident);
            }
        }

        Ok(incidents)
    }
}

#[derive(Clone)]
pub struct RedisDirectory {
    connection: ConnectionManager,
}

impl RedisDirectory {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl ContactDirectory for RedisDirectory {
    async fn find_contacts_by_owner(&self, owner_id: &str) -> Result<Vec<Contact>, StoreError> {
        let key = contacts_key(owner_id);
        let mut connection = self.connection.clone();

        let raw: Vec<String> = connection.lrange(&key, 0, -1).await?;

        raw.iter()
            .map(|entry| {
                serde_json::from_str(entry).map_err(|e| StoreError::Corrupt {
                    key: key.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl SessionResolver for RedisDirectory {
    async fn resolve_session(&self, token: &str) -> Result<Option<Identity>, StoreError> {
        let mut connection = self.connection.clone();

        let fields: HashMap<String, String> = connection.hgetall(session_key(token)).await?;

        Ok(match (fields.get("user_id"), fields.get("display_name")) {
            (Some(user_id), Some(display_name)) => Some(Identity {
                user_id: user_id.clone(),
                display_name: display_name.clone(),
            }),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use sos_core::Location;

    use super::*;

    fn stored(incident: &Incident, status: &str) -> HashMap<String, String> {
        HashMap::from([
            ("owner_id".to_string(), incident.owner_id.clone()),
            ("status".to_string(), status.to_string()),
            ("doc".to_string(), serde_json::to_string(incident).unwrap()),
        ])
    }

    /// Live Redis from `REDIS_URL`; the tests below are `#[ignore]`d and skip without it.
    async fn live_store() -> Option<(RedisStore, ConnectionManager)> {
        let Ok(url) = std::env::var("REDIS_URL") else {
            eprintln!("REDIS_URL not set, skipping");
            return None;
        };

        let connection = init_redis(&url).await.unwrap();
        Some((RedisStore::new(connection.clone()), connection))
    }

    async fn cleanup(connection: &mut ConnectionManager, incidents: &[&Incident]) {
        for incident in incidents {
            let _: () = connection.del(incident_key(&incident.id)).await.unwrap();
            let _: () = connection.del(owner_key(&incident.owner_id)).await.unwrap();
        }
    }

    fn incident_for(owner: &str) -> Incident {
        Incident::new(owner, Location { lat: 28.6, lng: 77.2 }, Vec::new())
    }

    #[tokio::test]
    #[ignore = "needs REDIS_URL"]
    async fn test_redis_insert_and_find() {
        let Some((store, mut connection)) = live_store().await else {
            return;
        };
        let owner = format!("test-owner-{}", incident_for("x").id);
        let created = incident_for(&owner);

        store.insert(&created).await.unwrap();

        let found = store.find_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.owner_id, owner);
        assert_eq!(found.status, IncidentStatus::Active);
        assert_eq!(store.find_by_id("no-such-incident").await.unwrap(), None);

        cleanup(&mut connection, &[&created]).await;
    }

    #[tokio::test]
    #[ignore = "needs REDIS_URL"]
    async fn test_redis_resolve_checks_owner() {
        let Some((store, mut connection)) = live_store().await else {
            return;
        };
        let owner = format!("test-owner-{}", incident_for("x").id);
        let created = incident_for(&owner);
        store.insert(&created).await.unwrap();

        assert_eq!(
            store.resolve(&created.id, "mallory").await.unwrap(),
            ResolveOutcome::Forbidden
        );
        let unchanged = store.find_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, IncidentStatus::Active);

        assert_eq!(
            store.resolve(&created.id, &owner).await.unwrap(),
            ResolveOutcome::Resolved
        );
        assert_eq!(
            store.resolve(&created.id, &owner).await.unwrap(),
            ResolveOutcome::Resolved
        );
        let resolved = store.find_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(resolved.status, IncidentStatus::Resolved);

        cleanup(&mut connection, &[&created]).await;
    }

    #[tokio::test]
    #[ignore = "needs REDIS_URL"]
    async fn test_redis_resolve_missing_does_not_create() {
        let Some((store, mut connection)) = live_store().await else {
            return;
        };
        let ghost = incident_for("ghost-owner");

        assert_eq!(
            store.resolve(&ghost.id, "ghost-owner").await.unwrap(),
            ResolveOutcome::NotFound
        );

        let exists: bool = connection.exists(incident_key(&ghost.id)).await.unwrap();
        assert!(!exists);
    }

    #[tokio::test]
    #[ignore = "needs REDIS_URL"]
    async fn test_redis_concurrent_resolves() {
        let Some((store, mut connection)) = live_store().await else {
            return;
        };
        let owner = format!("test-owner-{}", incident_for("x").id);
        let created = incident_for(&owner);
        store.insert(&created).await.unwrap();

        let (first, second, stranger) = tokio::join!(
            store.resolve(&created.id, &owner),
            store.resolve(&created.id, &owner),
            store.resolve(&created.id, "mallory"),
        );

        assert_eq!(first.unwrap(), ResolveOutcome::Resolved);
        assert_eq!(second.unwrap(), ResolveOutcome::Resolved);
        assert_eq!(stranger.unwrap(), ResolveOutcome::Forbidden);

        let resolved = store.find_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(resolved.status, IncidentStatus::Resolved);
        assert_eq!(resolved.owner_id, owner);

        cleanup(&mut connection, &[&created]).await;
    }

    #[tokio::test]
    #[ignore = "needs REDIS_URL"]
    async fn test_redis_find_by_owner_newest_first() {
        let Some((store, mut connection)) = live_store().await else {
            return;
        };
        let owner = format!("test-owner-{}", incident_for("x").id);

        let mut older = incident_for(&owner);
        older.created_at = chrono::Utc::now() - chrono::Duration::minutes(5);
        let newer = incident_for(&owner);
        let other = incident_for(&format!("{owner}-other"));

        store.insert(&newer).await.unwrap();
        store.insert(&older).await.unwrap();
        store.insert(&other).await.unwrap();

        let ids: Vec<String> = store
            .find_by_owner(&owner)
            .await
            .unwrap()
            .into_iter()
            .map(|incident| incident.id)
            .collect();
        assert_eq!(ids, vec![newer.id.clone(), older.id.clone()]);
        assert!(store.find_by_owner("nobody").await.unwrap().is_empty());

        cleanup(&mut connection, &[&newer, &older, &other]).await;
    }

    #[tokio::test]
    #[ignore = "needs REDIS_URL"]
    async fn test_redis_directory() {
        let Some((_, mut connection)) = live_store().await else {
            return;
        };
        let owner = format!("test-owner-{}", incident_for("x").id);
        let token = format!("token-{owner}");
        let directory = RedisDirectory::new(connection.clone());

        let contacts = [
            r#"{"id":"1","ownerId":"OWNER","name":"Mom","phone":"9876543210"}"#,
            r#"{"id":"2","ownerId":"OWNER","name":"Dad","phone":"+91 98765 00000"}"#,
        ];
        for contact in contacts {
            let _: () = connection
                .rpush(contacts_key(&owner), contact.replace("OWNER", &owner))
                .await
                .unwrap();
        }
        let _: () = connection
            .hset_multiple(
                session_key(&token),
                &[("user_id", owner.as_str()), ("display_name", "Alice")],
            )
            .await
            .unwrap();

        let found = directory.find_contacts_by_owner(&owner).await.unwrap();
        let names: Vec<&str> = found.iter().map(|c| c.display_name.as_str()).collect();
        assert_eq!(names, vec!["Mom", "Dad"]);

        let identity = directory.resolve_session(&token).await.unwrap().unwrap();
        assert_eq!(identity.user_id, owner);
        assert_eq!(identity.display_name, "Alice");
        assert_eq!(directory.resolve_session("forged").await.unwrap(), None);

        let _: () = connection.del(contacts_key(&owner)).await.unwrap();
        let _: () = connection.del(session_key(&token)).await.unwrap();
    }

    #[test]
    fn test_keys() {
        assert_eq!(incident_key("abc"), "sos:incident:abc");
        assert_eq!(owner_key("u1"), "sos:owner:u1");
        assert_eq!(contacts_key("u1"), "sos:contacts:u1");
        assert_eq!(session_key("t"), "sos:session:t");
    }

    #[test]
    fn test_decode_missing() {
        assert_eq!(decode_incident("k", &HashMap::new()).unwrap(), None);
    }

    #[test]
    fn test_decode_status_field_wins() {
        let incident = Incident::new("u1", Location { lat: 1.0, lng: 2.0 }, Vec::new());
        let decoded = decode_incident("k", &stored(&incident, "resolved"))
            .unwrap()
            .unwrap();

        assert_eq!(decoded.id, incident.id);
        assert_eq!(decoded.status, IncidentStatus::Resolved);
    }

    #[test]
    fn test_decode_corrupt() {
        let incident = Incident::new("u1", Location { lat: 1.0, lng: 2.0 }, Vec::new());

        let bad_status = decode_incident("k", &stored(&incident, "pending"));
        assert!(matches!(bad_status, Err(StoreError::Corrupt { .. })));

        let no_doc = HashMap::from([("status".to_string(), "active".to_string())]);
        assert!(matches!(
            decode_incident("k", &no_doc),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
