//! Job storage behind a trait so the HTTP layer never touches a global map.
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::jobs::record::JobRecord;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, id: &str) -> Option<JobRecord>;
    /// Insert or replace the record stored under `record.id`.
    async fn put(&self, record: JobRecord);
    /// Insert `record` unless a live record already holds its id, in which
    /// case that record is handed back and nothing changes.
    async fn insert_new(&self, record: JobRecord) -> Result<(), JobRecord>;
    /// Store the outcome of a run. Only the submission that owns the id
    /// (same `number`, still pending) may write; returns whether it did.
    /// A record evicted while running is written back.
    async fn finish(&self, record: JobRecord) -> bool;
    /// All live records ordered by submission number.
    async fn list(&self) -> Vec<JobRecord>;
    async fn remove(&self, id: &str) -> Option<JobRecord>;
}

struct Entry {
    record: JobRecord,
    touched: Instant,
}

/// In-process store bounded by entry count and age.
///
/// Entries older than `ttl` (since their last write) are invisible and
/// purged on the next write. When `capacity` is exceeded the least recently
/// written entries go first.
pub struct InMemoryJobStore {
    entries: RwLock<HashMap<String, Entry>>,
    capacity: usize,
    ttl: Duration,
}

impl InMemoryJobStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        InMemoryJobStore {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    fn is_live(&self, entry: &Entry, now: Instant) -> bool {
        now.duration_since(entry.touched) < self.ttl
    }

    fn evict(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        let before = entries.len();
        entries.retain(|_, e| now.duration_since(e.touched) < self.ttl);

        while entries.len() > self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| (e.touched, e.record.number))
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    entries.remove(&id);
                }
                None => break,
            }
        }

        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!("Evicted {} job record(s)", evicted);
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get(&self, id: &str) -> Option<JobRecord> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        entries
            .get(id)
            .filter(|e| self.is_live(e, now))
            .map(|e| e.record.clone())
    }

    async fn put(&self, record: JobRecord) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.insert(record.id.clone(), Entry { record, touched: now });
        self.evict(&mut entries, now);
    }

    async fn insert_new(&self, record: JobRecord) -> Result<(), JobRecord> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        if let Some(existing) = entries.get(&record.id).filter(|e| self.is_live(e, now)) {
            return Err(existing.record.clone());
        }
        entries.insert(record.id.clone(), Entry { record, touched: now });
        self.evict(&mut entries, now);
        Ok(())
    }

    async fn finish(&self, record: JobRecord) -> bool {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let owned = match entries.get(&record.id).filter(|e| self.is_live(e, now)) {
            Some(e) => e.record.number == record.number && !e.record.state.is_terminal(),
            None => true,
        };
        if owned {
            entries.insert(record.id.clone(), Entry { record, touched: now });
            self.evict(&mut entries, now);
        }
        owned
    }

    async fn list(&self) -> Vec<JobRecord> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        let mut records: Vec<JobRecord> = entries
            .values()
            .filter(|e| self.is_live(e, now))
            .map(|e| e.record.clone())
            .collect();
        records.sort_by_key(|r| r.number);
        records
    }

    async fn remove(&self, id: &str) -> Option<JobRecord> {
        self.entries.write().await.remove(id).map(|e| e.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::record::JobState;

    #[tokio::test]
    async fn put_get_and_replace() {
        let store = InMemoryJobStore::new(10, Duration::from_secs(60));
        assert!(store.get("a").await.is_none());

        store.put(JobRecord::pending("a", 1, "fox")).await;
        assert_eq!(store.get("a").await.unwrap().state, JobState::Pending);

        let mut done = JobRecord::pending("a", 1, "fox");
        done.state = JobState::Completed { filename: "x.png".into() };
        store.put(done).await;
        assert_eq!(
            store.get("a").await.unwrap().state,
            JobState::Completed { filename: "x.png".into() }
        );
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_written() {
        let store = InMemoryJobStore::new(2, Duration::from_secs(60));
        store.put(JobRecord::pending("a", 1, "1")).await;
        store.put(JobRecord::pending("b", 2, "2")).await;
        store.put(JobRecord::pending("c", 3, "3")).await;

        let ids: Vec<String> = store.list().await.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b".to_string(), "c".to_string()]);
        assert!(store.get("a").await.is_none());
    }

    #[tokio::test]
    async fn expired_records_are_hidden_and_purged() {
        let store = InMemoryJobStore::new(10, Duration::from_millis(20));
        store.put(JobRecord::pending("old", 1, "x")).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.get("old").await.is_none());
        assert!(store.list().await.is_empty());

        store.put(JobRecord::pending("new", 2, "y")).await;
        assert_eq!(store.entries.read().await.len(), 1);
    }

    #[tokio::test]
    async fn insert_new_keeps_the_first_submission() {
        let store = InMemoryJobStore::new(10, Duration::from_secs(60));
        assert!(store.insert_new(JobRecord::pending("dup", 1, "first")).await.is_ok());

        let existing = store.insert_new(JobRecord::pending("dup", 2, "second")).await.unwrap_err();
        assert_eq!(existing.number, 1);
        assert_eq!(store.get("dup").await.unwrap().prompt, "first");
    }

    #[tokio::test]
    async fn insert_new_reuses_expired_ids() {
        let store = InMemoryJobStore::new(10, Duration::from_millis(20));
        store.insert_new(JobRecord::pending("a", 1, "x")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.insert_new(JobRecord::pending("a", 2, "y")).await.is_ok());
        assert_eq!(store.get("a").await.unwrap().number, 2);
    }

    #[tokio::test]
    async fn finish_only_writes_for_the_owning_submission() {
        let store = InMemoryJobStore::new(10, Duration::from_secs(60));
        store.put(JobRecord::pending("dup", 2, "second")).await;

        let mut stale = JobRecord::pending("dup", 1, "first");
        stale.state = JobState::Failed { message: "boom".into() };
        assert!(!store.finish(stale).await);
        assert_eq!(store.get("dup").await.unwrap().state, JobState::Pending);

        let mut done = JobRecord::pending("dup", 2, "second");
        done.state = JobState::Completed { filename: "x.png".into() };
        assert!(store.finish(done.clone()).await);
        assert_eq!(store.get("dup").await.unwrap().state, done.state);

        let mut again = JobRecord::pending("dup", 2, "second");
        again.state = JobState::Failed { message: "late".into() };
        assert!(!store.finish(again).await);
        assert_eq!(store.get("dup").await.unwrap().state, done.state);
    }

    #[tokio::test]
    async fn finish_writes_back_an_evicted_job() {
        let store = InMemoryJobStore::new(1, Duration::from_secs(60));
        store.put(JobRecord::pending("a", 1, "x")).await;
        store.put(JobRecord::pending("b", 2, "y")).await;
        assert!(store.get("a").await.is_none());

        let mut done = JobRecord::pending("a", 1, "x");
        done.state = JobState::Completed { filename: "a.png".into() };
        assert!(store.finish(done).await);
        assert!(store.get("a").await.unwrap().state.is_terminal());
    }

    #[tokio::test]
    async fn remove_returns_record() {
        let store = InMemoryJobStore::new(10, Duration::from_secs(60));
        store.put(JobRecord::pending("a", 1, "fox")).await;
        assert_eq!(store.remove("a").await.unwrap().id, "a");
        assert!(store.remove("a").await.is_none());
    }
}
