use crate::error::{Error, Result};
use crate::{ViewCount, ViewCountStore};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct Tables {
    communities: HashSet<String>,
    rows:        HashMap<i64, ViewCount>,
    by_object:   HashMap<(String, String), i64>,
    next_id:     i64,
}

/// Process-local [`ViewCountStore`], used when no database is configured.
/// Nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemoryStore(Arc<Mutex<Tables>>);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ViewCountStore for MemoryStore {
    async fn add_community(&self, community: &str) -> Result<()> {
        self.0.lock().await.communities.insert(community.to_owned());
        Ok(())
    }

    async fn community_exists(&self, community: &str) -> Result<bool> {
        Ok(self.0.lock().await.communities.contains(community))
    }

    async fn find_view_count(&self, community: &str, object_id: &str) -> Result<Option<ViewCount>> {
        let tables = self.0.lock().await;
        let key = (community.to_owned(), object_id.to_owned());
        Ok(tables
            .by_object
            .get(&key)
            .and_then(|id| tables.rows.get(id))
            .cloned())
    }

    async fn init_view_count(&self, community: &str, object_id: &str) -> Result<ViewCount> {
        let mut tables = self.0.lock().await;
        if !tables.communities.contains(community) {
            return Err(Error::UnknownCommunity(community.to_owned().into()));
        }

        let key = (community.to_owned(), object_id.to_owned());
        if let Some(existing) = tables.by_object.get(&key).and_then(|id| tables.rows.get(id)) {
            return Ok(existing.clone());
        }

        tables.next_id += 1;
        let now = Utc::now();
        let record = ViewCount {
            id:         tables.next_id,
            chain:      key.0.clone(),
            object_id:  key.1.clone(),
            view_count: 0,
            created_at: now,
            updated_at: now,
        };
        tables.by_object.insert(key, record.id);
        tables.rows.insert(record.id, record.clone());
        debug!(id = record.id, chain = %record.chain, object_id = %record.object_id, "view count initialized");
        Ok(record)
    }

    async fn increment_view_count(&self, id: i64) -> Result<ViewCount> {
        let mut tables = self.0.lock().await;
        let record = tables
            .rows
            .get_mut(&id)
            .ok_or(Error::ViewCountNotFound(id))?;
        record.view_count += 1;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}
