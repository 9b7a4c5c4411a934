//! Event existence checks
//!
//! Bookings reference events by id only. The store has no cross-table
//! foreign key, so the write path asks an [`EventExistenceChecker`] instead.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use db::DbPool;
use error::DatabaseError;

/// Answers whether an event id currently exists.
#[allow(async_fn_in_trait)]
pub trait EventExistenceChecker: Send + Sync {
    async fn exists(&self, event_id: &str) -> Result<bool, DatabaseError>;
}

impl<T: EventExistenceChecker> EventExistenceChecker for Arc<T> {
    async fn exists(&self, event_id: &str) -> Result<bool, DatabaseError> {
        (**self).exists(event_id).await
    }
}

/// Checks the `events` table.
#[derive(Debug, Clone)]
pub struct MySqlEventStore {
    pool: DbPool,
}

impl MySqlEventStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl EventExistenceChecker for MySqlEventStore {
    async fn exists(&self, event_id: &str) -> Result<bool, DatabaseError> {
        let found = sqlx::query_scalar::<_, i64>("SELECT EXISTS(SELECT 1 FROM events WHERE id = ?)")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Event lookup failed for {}: {}", event_id, e);
                DatabaseError::QueryFailed(e.to_string())
            })?;
        Ok(found != 0)
    }
}

/// In-memory event ids for testing and development.
///
/// [`set_available`](Self::set_available) simulates an unreachable store.
#[derive(Debug)]
pub struct InMemoryEventStore {
    ids: RwLock<HashSet<String>>,
    available: AtomicBool,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            ids: RwLock::new(HashSet::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn with_events<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for id in ids {
            store.insert(id);
        }
        store
    }

    pub fn insert(&self, id: impl Into<String>) {
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into());
    }

    pub fn remove(&self, id: &str) -> bool {
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventExistenceChecker for InMemoryEventStore {
    async fn exists(&self, event_id: &str) -> Result<bool, DatabaseError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(DatabaseError::ConnectionFailed(
                "event store unavailable".to_string(),
            ));
        }
        Ok(self
            .ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(event_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_exists() {
        let store = InMemoryEventStore::with_events(["E1", "E2"]);
        assert!(store.exists("E1").await.unwrap());
        assert!(!store.exists("E3").await.unwrap());

        assert!(store.remove("E1"));
        assert!(!store.exists("E1").await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = Arc::new(InMemoryEventStore::with_events(["E1"]));
        store.set_available(false);
        assert!(store.exists("E1").await.is_err());

        store.set_available(true);
        assert!(store.exists("E1").await.unwrap());
    }
}
