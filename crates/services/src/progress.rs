use std::sync::Arc;

use gestu_core::model::{self, CompletionKey, Lesson, ProgressSet, RoadmapEntry};
use storage::repository::{KeyValueStore, StoreChange};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};

use crate::config::DEFAULT_PROGRESS_KEY;
use crate::error::ProgressError;

/// Completed-lesson set persisted as one JSON array under a fixed key.
///
/// Every read goes back to storage, so writes made by another handle on the
/// same store (another window, another process) are seen on the next call.
#[derive(Clone)]
pub struct ProgressStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    write_lock: Arc<Mutex<()>>,
}

impl ProgressStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            key: DEFAULT_PROGRESS_KEY.to_string(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current set; missing, unreadable or malformed data reads as empty.
    pub async fn load(&self) -> ProgressSet {
        match self.kv.get(&self.key).await {
            Ok(raw) => ProgressSet::decode_lenient(raw.as_deref()),
            Err(err) => {
                warn!(key = %self.key, error = %err, "progress read failed; treating as empty");
                ProgressSet::new()
            }
        }
    }

    pub async fn has(&self, key: &CompletionKey) -> bool {
        self.load().await.contains(key)
    }

    /// Insert `key`. Returns whether it was newly added; nothing is written otherwise.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the write fails.
    pub async fn add(&self, key: CompletionKey) -> Result<bool, ProgressError> {
        self.update(|set| set.insert(key)).await
    }

    /// Remove `key`. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the write fails.
    pub async fn remove(&self, key: &CompletionKey) -> Result<bool, ProgressError> {
        self.update(|set| set.remove(key)).await
    }

    /// Flip membership of `key`. Returns whether it is present afterwards.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the write fails.
    pub async fn toggle(&self, key: CompletionKey) -> Result<bool, ProgressError> {
        let mut present = false;
        self.update(|set| {
            present = set.toggle(key);
            true
        })
        .await?;
        Ok(present)
    }

    /// Drop every completion.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the removal fails.
    pub async fn clear(&self) -> Result<(), ProgressError> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove(&self.key).await?;
        Ok(())
    }

    /// Completed under either of the lesson's keys.
    pub async fn is_completed(&self, lesson: &Lesson) -> bool {
        self.load().await.is_lesson_completed(lesson)
    }

    /// Record `lesson` as completed under its preferred key unless any of
    /// its keys is already present. Returns whether anything was written.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the write fails.
    pub async fn mark_lesson(&self, lesson: &Lesson) -> Result<bool, ProgressError> {
        self.update(|set| {
            if set.is_lesson_completed(lesson) {
                false
            } else {
                set.insert(lesson.completion_key())
            }
        })
        .await
    }

    /// Manual toggle: clears every key of a completed lesson, otherwise marks it.
    /// Returns whether the lesson is completed afterwards.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the write fails.
    pub async fn toggle_lesson(&self, lesson: &Lesson) -> Result<bool, ProgressError> {
        let mut completed = false;
        self.update(|set| {
            if set.is_lesson_completed(lesson) {
                for key in lesson.completion_keys() {
                    set.remove(&key);
                }
                completed = false;
            } else {
                set.insert(lesson.completion_key());
                completed = true;
            }
            true
        })
        .await?;
        Ok(completed)
    }

    /// Unlock check against freshly read progress.
    pub async fn is_unlocked(&self, lesson: &Lesson, lessons: &[Lesson]) -> bool {
        model::is_unlocked(&self.load().await, lesson, lessons)
    }

    pub async fn roadmap(&self, lessons: &[Lesson]) -> Vec<RoadmapEntry> {
        model::roadmap(&self.load().await, lessons)
    }

    /// Subscribe to writes of the progress key from any handle on the store.
    #[must_use]
    pub fn watch(&self) -> ProgressWatcher {
        ProgressWatcher {
            store: self.clone(),
            changes: self.kv.subscribe(),
        }
    }

    async fn update(
        &self,
        mutate: impl FnOnce(&mut ProgressSet) -> bool,
    ) -> Result<bool, ProgressError> {
        let _guard = self.write_lock.lock().await;
        let mut set = self.load().await;
        if !mutate(&mut set) {
            return Ok(false);
        }
        self.kv.set(&self.key, &set.encode()).await?;
        debug!(key = %self.key, entries = set.len(), "progress saved");
        Ok(true)
    }
}

/// Yields the fresh progress set after each external or local write.
pub struct ProgressWatcher {
    store: ProgressStore,
    changes: broadcast::Receiver<StoreChange>,
}

impl ProgressWatcher {
    /// Wait for the next write to the progress key. Returns `None` once the
    /// store has gone away.
    pub async fn changed(&mut self) -> Option<ProgressSet> {
        loop {
            match self.changes.recv().await {
                Ok(change) if change.key == self.store.key => return Some(self.store.load().await),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "progress watcher lagged; reloading");
                    return Some(self.store.load().await);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use gestu_core::model::{CategorySlug, LessonDraft, LessonId};
    use storage::repository::InMemoryStore;

    use super::*;

    fn slug(raw: &str) -> CategorySlug {
        CategorySlug::new(raw).unwrap()
    }

    fn lesson(order: u32, id: Option<u64>) -> Lesson {
        let mut draft = LessonDraft::new(slug("words"), order, format!("L{order}"));
        if let Some(id) = id {
            draft = draft.with_id(LessonId::new(id));
        }
        draft.validate().unwrap()
    }

    fn key(raw: &str) -> CompletionKey {
        CompletionKey::new(raw).unwrap()
    }

    fn store() -> (Arc<InMemoryStore>, ProgressStore) {
        let kv = Arc::new(InMemoryStore::new());
        let store = ProgressStore::new(kv.clone());
        (kv, store)
    }

    #[tokio::test]
    async fn toggle_twice_restores_membership() {
        let (_, store) = store();
        let k = key("words:3");
        assert!(store.toggle(k.clone()).await.unwrap());
        assert!(store.has(&k).await);
        assert!(!store.toggle(k.clone()).await.unwrap());
        assert!(!store.has(&k).await);
    }

    #[tokio::test]
    async fn add_is_idempotent_and_skips_redundant_writes() {
        let (kv, store) = store();
        let mut changes = kv.subscribe();
        assert!(store.add(key("7")).await.unwrap());
        assert!(!store.add(key("7")).await.unwrap());
        assert_eq!(store.load().await.len(), 1);
        assert!(changes.try_recv().is_ok());
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_storage_reads_as_empty() {
        let kv = Arc::new(InMemoryStore::new().with_entry(DEFAULT_PROGRESS_KEY, "{not json"));
        let store = ProgressStore::new(kv);
        assert!(store.load().await.is_empty());
        assert!(store.add(key("words:1")).await.unwrap());
        assert_eq!(store.load().await.encode(), r#"["words:1"]"#);
    }

    #[tokio::test]
    async fn mark_lesson_respects_either_key() {
        let (_, store) = store();
        let with_id = lesson(2, Some(42));
        store.add(key("words:2")).await.unwrap();
        assert!(store.is_completed(&with_id).await);
        assert!(!store.mark_lesson(&with_id).await.unwrap());

        let fresh = lesson(3, Some(43));
        assert!(store.mark_lesson(&fresh).await.unwrap());
        assert!(store.has(&key("43")).await);
        assert!(!store.has(&key("words:3")).await);
    }

    #[tokio::test]
    async fn toggle_lesson_clears_both_keys() {
        let (_, store) = store();
        let l = lesson(2, Some(42));
        store.add(key("42")).await.unwrap();
        store.add(key("words:2")).await.unwrap();
        assert!(!store.toggle_lesson(&l).await.unwrap());
        assert!(store.load().await.is_empty());
        assert!(store.toggle_lesson(&l).await.unwrap());
        assert!(store.has(&key("42")).await);
    }

    #[tokio::test]
    async fn unlock_tracks_predecessor_completion() {
        let (_, store) = store();
        let lessons = vec![lesson(1, None), lesson(2, None), lesson(3, None)];
        assert!(store.is_unlocked(&lessons[0], &lessons).await);
        assert!(!store.is_unlocked(&lessons[1], &lessons).await);
        store.mark_lesson(&lessons[0]).await.unwrap();
        assert!(store.is_unlocked(&lessons[1], &lessons).await);
        store.toggle_lesson(&lessons[0]).await.unwrap();
        assert!(!store.is_unlocked(&lessons[1], &lessons).await);
    }

    #[tokio::test]
    async fn clear_empties_the_set() {
        let (_, store) = store();
        store.add(key("1")).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn watcher_sees_writes_from_another_handle() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let first = ProgressStore::new(Arc::clone(&kv));
        let second = ProgressStore::new(kv);
        let mut watcher = first.watch();

        second.add(key("words:5")).await.unwrap();
        let seen = watcher.changed().await.unwrap();
        assert!(seen.contains(&key("words:5")));
        assert!(first.has(&key("words:5")).await);
    }

    #[tokio::test]
    async fn watcher_ignores_other_keys() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let store = ProgressStore::new(Arc::clone(&kv));
        let mut watcher = store.watch();

        kv.set("unrelated", "1").await.unwrap();
        store.add(key("9")).await.unwrap();
        let seen = watcher.changed().await.unwrap();
        assert!(seen.contains(&key("9")));
    }
}
