//! Session persistence helpers.
//!
//! `MemorySessionStore` backs sessions when no database is configured. Both it
//! and `tower_sessions_sqlx_store::PostgresStore` implement `ExpiredDeletion`,
//! so `spawn_expired_deletion` can sweep either one.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::{task::JoinHandle, time::Duration};
use tower_sessions::{
    ExpiredDeletion, SessionStore,
    session::{Id, Record},
    session_store,
};

/// Time between two sweeps of expired session records.
pub const EXPIRED_SESSION_SWEEP: Duration = Duration::from_secs(60);

/// MemorySessionStore
///
/// In-process session records. Expired records are hidden on load and removed
/// by `delete_expired`.
#[derive(Clone, Debug, Default)]
pub struct MemorySessionStore(Arc<Mutex<HashMap<Id, Record>>>);

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired or not.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        let mut records = self.0.lock();
        while records.contains_key(&record.id) {
            record.id = Id::default();
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.0.lock().insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .0
            .lock()
            .get(session_id)
            .filter(|record| record.expiry_date > now)
            .cloned())
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.0.lock().remove(session_id);
        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for MemorySessionStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        let now = OffsetDateTime::now_utc();
        let mut records = self.0.lock();
        let before = records.len();
        records.retain(|_, record| record.expiry_date > now);
        tracing::debug!(removed = before - records.len(), "swept expired sessions");
        Ok(())
    }
}

/// spawn_expired_deletion
///
/// Runs `delete_expired` on the store every `period` in a background task. The
/// task only ends if the store reports an error, which is logged.
pub fn spawn_expired_deletion<Store>(store: Store, period: Duration) -> JoinHandle<()>
where
    Store: ExpiredDeletion + Clone,
{
    tokio::spawn(async move {
        if let Err(e) = store.continuously_delete_expired(period).await {
            tracing::error!(error = %e, "expired session cleanup stopped");
        }
    })
}

#[cfg(test)]
mod tests {
    use time::Duration as TimeDuration;

    use super::*;

    fn record_expiring_in(offset: TimeDuration) -> Record {
        Record {
            id: Id::default(),
            data: Default::default(),
            expiry_date: OffsetDateTime::now_utc() + offset,
        }
    }

    #[tokio::test]
    async fn expired_records_are_hidden_and_swept() {
        let store = MemorySessionStore::new();
        let mut live = record_expiring_in(TimeDuration::minutes(15));
        let mut stale = record_expiring_in(TimeDuration::minutes(-1));
        store.create(&mut live).await.unwrap();
        store.create(&mut stale).await.unwrap();

        assert_eq!(store.load(&stale.id).await.unwrap(), None);
        assert_eq!(store.len(), 2);

        store.delete_expired().await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.load(&live.id).await.unwrap(), Some(live));
    }

    #[tokio::test]
    async fn create_never_overwrites_an_existing_id() {
        let store = MemorySessionStore::new();
        let mut first = record_expiring_in(TimeDuration::minutes(15));
        store.create(&mut first).await.unwrap();
        let mut second = record_expiring_in(TimeDuration::minutes(15));
        second.id = first.id;

        store.create(&mut second).await.unwrap();

        assert_ne!(second.id, first.id);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn background_task_removes_expired_records() {
        let store = MemorySessionStore::new();
        let mut stale = record_expiring_in(TimeDuration::minutes(-1));
        store.create(&mut stale).await.unwrap();

        let task = spawn_expired_deletion(store.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.abort();

        assert!(store.is_empty());
    }
}
