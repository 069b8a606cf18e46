//! Where circuit breaker state lives between calls and processes

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::db::Database;
use crate::error::Result;
use crate::types::CircuitSnapshot;

#[async_trait]
pub trait CircuitStateStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<CircuitSnapshot>>;

    async fn save(&self, key: &str, snapshot: &CircuitSnapshot) -> Result<()>;

    async fn list(&self) -> Result<Vec<(String, CircuitSnapshot)>>;

    /// Whether other processes may write to this store. Shared stores are
    /// re-read before every admission decision.
    fn is_shared(&self) -> bool {
        false
    }
}

/// Process-local store for single-instance deployments and tests
#[derive(Debug, Default)]
pub struct InMemoryCircuitStore {
    states: Mutex<BTreeMap<String, CircuitSnapshot>>,
}

impl InMemoryCircuitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CircuitStateStore for InMemoryCircuitStore {
    async fn load(&self, key: &str) -> Result<Option<CircuitSnapshot>> {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        Ok(states.get(key).cloned())
    }

    async fn save(&self, key: &str, snapshot: &CircuitSnapshot) -> Result<()> {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.insert(key.to_string(), snapshot.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(String, CircuitSnapshot)>> {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        Ok(states
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Store backed by the `circuit_states` table, shared by every process
/// using the same database.
#[derive(Clone)]
pub struct SqliteCircuitStore {
    db: Database,
}

impl SqliteCircuitStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CircuitStateStore for SqliteCircuitStore {
    async fn load(&self, key: &str) -> Result<Option<CircuitSnapshot>> {
        self.db.load_circuit_state(key).await
    }

    async fn save(&self, key: &str, snapshot: &CircuitSnapshot) -> Result<()> {
        self.db.save_circuit_state(key, snapshot).await
    }

    async fn list(&self) -> Result<Vec<(String, CircuitSnapshot)>> {
        self.db.list_circuit_states().await
    }

    fn is_shared(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CircuitState;

    fn open() -> CircuitSnapshot {
        CircuitSnapshot {
            state: CircuitState::Open,
            consecutive_failures: 3,
            last_failure_at: Some(10),
            opened_at: Some(10),
        }
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryCircuitStore::new();
        assert!(store.load("twitter").await.unwrap().is_none());

        store.save("twitter", &open()).await.unwrap();
        assert_eq!(store.load("twitter").await.unwrap(), Some(open()));
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(!store.is_shared());
    }

    #[tokio::test]
    async fn test_sqlite_store_survives_reopen() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("breakers.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteCircuitStore::new(Database::new(path).await.unwrap());
            store.save("facebook", &open()).await.unwrap();
            assert!(store.is_shared());
        }

        let store = SqliteCircuitStore::new(Database::new(path).await.unwrap());
        assert_eq!(store.load("facebook").await.unwrap(), Some(open()));
    }
}
