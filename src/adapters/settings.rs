//! Settings Store Adapter
//!
//! In-memory implementation of the `SettingsStore` port. Production agents
//! back this with the controller's key-value store; keys are
//! (stable uuid, field name) either way.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::ports::SettingsStore;

/// Concurrent in-memory settings store.
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    entries: DashMap<(Uuid, String), String>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn get(&self, uuid: Uuid, field: &str) -> Option<String> {
        self.entries
            .get(&(uuid, field.to_string()))
            .map(|entry| entry.value().clone())
    }

    async fn put(&self, uuid: Uuid, field: &str, value: String) {
        self.entries.insert((uuid, field.to_string()), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let store = InMemorySettingsStore::new();
        let uuid = Uuid::new_v4();

        assert_eq!(store.get(uuid, "asset_tag").await, None);

        store.put(uuid, "asset_tag", "rack-7/drawer-0".to_string()).await;
        assert_eq!(
            store.get(uuid, "asset_tag").await.as_deref(),
            Some("rack-7/drawer-0")
        );

        // Distinct fields under the same uuid do not collide.
        store.put(uuid, "owner", "fleet-ops".to_string()).await;
        assert_eq!(store.len(), 2);
    }
}
