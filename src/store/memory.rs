//! In-memory document and identity store.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::auth::principal::Principal;
use crate::store::{
    Document, IdentityStore, ListQuery, ResourceKind, ResourceStore, StoreError,
};

struct UserRecord {
    principal: Principal,
    password: String,
}

/// Thread-safe store keeping everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    documents: DashMap<(ResourceKind, String), Document>,
    users: DashMap<String, UserRecord>,
    counter: AtomicU32,
}

#[derive(Deserialize)]
struct SeedUser {
    #[serde(flatten)]
    principal: Principal,
    password: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SeedFile {
    users: Vec<SeedUser>,
    farms: Vec<Document>,
    crops: Vec<Document>,
    posts: Vec<Document>,
    uploads: Vec<Document>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Constant-time comparison so password checks do not leak prefix length.
fn secrets_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load users and documents from a JSON seed file.
    pub fn from_seed_file(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Backend(format!("cannot read seed file: {e}")))?;
        let seed: SeedFile = serde_json::from_str(&content)
            .map_err(|e| StoreError::Backend(format!("invalid seed file: {e}")))?;

        let store = Self::new();
        for user in seed.users {
            store.add_user(user.principal, &user.password);
        }
        for (kind, docs) in [
            (ResourceKind::Farm, seed.farms),
            (ResourceKind::Crop, seed.crops),
            (ResourceKind::Post, seed.posts),
            (ResourceKind::Upload, seed.uploads),
        ] {
            for doc in docs {
                store.put(kind, doc)?;
            }
        }

        tracing::info!(
            users = store.users.len(),
            documents = store.documents.len(),
            path = ?path,
            "Loaded seed data"
        );
        Ok(store)
    }

    pub fn add_user(&self, principal: Principal, password: &str) {
        self.users.insert(
            principal.id.clone(),
            UserRecord {
                principal,
                password: password.to_string(),
            },
        );
    }

    /// Flip a user's active flag. Returns `false` for unknown ids.
    pub fn set_user_active(&self, id: &str, active: bool) -> bool {
        match self.users.get_mut(id) {
            Some(mut record) => {
                record.principal.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Store a document as-is, keeping its `_id` (one is assigned if missing).
    pub fn put(&self, kind: ResourceKind, mut document: Document) -> Result<Document, StoreError> {
        let object = document
            .as_object_mut()
            .ok_or_else(|| StoreError::Backend(format!("{kind} document is not an object")))?;

        let id = match object.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = self.next_id();
                object.insert("_id".into(), Value::String(id.clone()));
                id
            }
        };
        object
            .entry("createdAt")
            .or_insert_with(|| Value::from(now_millis()));

        self.documents.insert((kind, id), document.clone());
        Ok(document)
    }

    /// ObjectId-shaped identifier: 8 hex of seconds, 10 random hex, 6 hex counter.
    fn next_id(&self) -> String {
        let secs = (now_millis() / 1000) as u32;
        let random = Uuid::new_v4().simple().to_string();
        let count = self.counter.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;
        format!("{secs:08x}{}{count:06x}", &random[..10])
    }
}

fn matches_filter(document: &Document, filter: &[(String, Value)]) -> bool {
    filter
        .iter()
        .all(|(field, expected)| document.get(field) == Some(expected))
}

fn created_at(document: &Document) -> u64 {
    document
        .get("createdAt")
        .and_then(Value::as_u64)
        .unwrap_or_default()
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn find_by_id(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self
            .documents
            .get(&(kind, id.to_string()))
            .map(|r| r.value().clone()))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        query: &ListQuery,
    ) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = self
            .documents
            .iter()
            .filter(|r| r.key().0 == kind && matches_filter(r.value(), &query.filter))
            .map(|r| r.value().clone())
            .collect();

        // Newest first
        docs.sort_by(|a, b| created_at(b).cmp(&created_at(a)));

        let limit = if query.limit == 0 { usize::MAX } else { query.limit };
        Ok(docs.into_iter().skip(query.skip).take(limit).collect())
    }

    async fn insert(
        &self,
        kind: ResourceKind,
        mut document: Document,
    ) -> Result<Document, StoreError> {
        if let Some(object) = document.as_object_mut() {
            object.remove("_id");
            object.insert("createdAt".into(), Value::from(now_millis()));
        }
        self.put(kind, document)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        patch: Document,
    ) -> Result<Option<Document>, StoreError> {
        let Some(mut entry) = self.documents.get_mut(&(kind, id.to_string())) else {
            return Ok(None);
        };

        let patch: Map<String, Value> = match patch {
            Value::Object(map) => map,
            _ => return Err(StoreError::Backend("update patch must be an object".into())),
        };

        if let Some(object) = entry.value_mut().as_object_mut() {
            for (key, value) in patch {
                if key == "_id" {
                    continue;
                }
                object.insert(key, value);
            }
            object.insert("updatedAt".into(), Value::from(now_millis()));
        }
        Ok(Some(entry.value().clone()))
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<bool, StoreError> {
        Ok(self.documents.remove(&(kind, id.to_string())).is_some())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_principal(&self, id: &str) -> Result<Option<Principal>, StoreError> {
        Ok(self.users.get(id).map(|r| r.principal.clone()))
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Principal>, StoreError> {
        let email = email.trim().to_lowercase();
        let found = self
            .users
            .iter()
            .find(|r| r.principal.email.to_lowercase() == email)
            .filter(|r| secrets_match(&r.password, password))
            .map(|r| r.principal.clone());
        Ok(found)
    }
}
