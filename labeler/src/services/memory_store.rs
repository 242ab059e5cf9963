//! In-memory annotation and item stores
//!
//! Backing stores for the binary and the test suite. Both can be seeded from
//! JSON files:
//!
//! - annotations: `{ "user": { "instance_id": { "schema": "label" } } }`
//! - items: `[ { "id": "instance_id", "text": "..." }, ... ]` in dataset order

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::{LabelerError, LabelerResult};
use crate::traits::{AnnotationStore, ItemStore, UserAnnotations};

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> LabelerResult<T> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| LabelerError::store(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_slice(&content)
        .map_err(|e| LabelerError::store(format!("cannot parse {}: {}", path.display(), e)))
}

/// Human annotations keyed by user
#[derive(Default)]
pub struct InMemoryAnnotationStore {
    users: RwLock<BTreeMap<String, UserAnnotations>>,
}

impl InMemoryAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(users: BTreeMap<String, UserAnnotations>) -> Self {
        Self {
            users: RwLock::new(users),
        }
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> LabelerResult<Self> {
        Ok(Self::from_map(read_json(path.as_ref()).await?))
    }

    /// Record one label; a later label for the same user, item and schema wins
    pub async fn annotate(&self, user_id: &str, instance_id: &str, schema_name: &str, label: &str) {
        self.users
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .entry(instance_id.to_string())
            .or_default()
            .insert(schema_name.to_string(), label.to_string());
    }
}

#[async_trait]
impl AnnotationStore for InMemoryAnnotationStore {
    async fn list_users(&self) -> LabelerResult<Vec<String>> {
        Ok(self.users.read().await.keys().cloned().collect())
    }

    async fn get_user_annotations(&self, user_id: &str) -> LabelerResult<UserAnnotations> {
        Ok(self.users.read().await.get(user_id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct ItemRecord {
    id: String,
    text: String,
}

#[derive(Default)]
struct Items {
    order: Vec<String>,
    text: HashMap<String, String>,
}

/// Item texts in dataset order
#[derive(Default)]
pub struct InMemoryItemStore {
    items: RwLock<Items>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut items = Items::default();
        for (id, text) in pairs {
            Self::insert_into(&mut items, id.into(), text.into());
        }
        Self {
            items: RwLock::new(items),
        }
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> LabelerResult<Self> {
        let records: Vec<ItemRecord> = read_json(path.as_ref()).await?;
        Ok(Self::from_pairs(records.into_iter().map(|r| (r.id, r.text))))
    }

    fn insert_into(items: &mut Items, id: String, text: String) {
        if items.text.insert(id.clone(), text).is_none() {
            items.order.push(id);
        }
    }

    /// Add or replace an item; new ids are appended to the dataset order
    pub async fn insert(&self, id: &str, text: &str) {
        let mut items = self.items.write().await;
        Self::insert_into(&mut items, id.to_string(), text.to_string());
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn get_text(&self, instance_id: &str) -> LabelerResult<Option<String>> {
        Ok(self.items.read().await.text.get(instance_id).cloned())
    }

    async fn list_instance_ids(&self) -> LabelerResult<Vec<String>> {
        Ok(self.items.read().await.order.clone())
    }
}
