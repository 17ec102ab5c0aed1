//! Client-local "watch later" list.
//!
//! Never synced to the backend. The list is rehydrated from local storage when
//! loaded and written back after every mutation. A single owner drives it, so
//! there is no locking here.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::local_storage::LocalStorage;

const WATCH_LATER_KEY: &str = "watchLater";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchLaterEntry {
    pub lecture_id: String,
    pub course_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub video_url: String,
    #[serde(default)]
    pub course_title: String,
}

impl WatchLaterEntry {
    fn is(&self, lecture_id: &str, course_id: &str) -> bool {
        self.lecture_id == lecture_id && self.course_id == course_id
    }
}

pub struct WatchLaterList<S: LocalStorage> {
    storage: S,
    entries: Vec<WatchLaterEntry>,
}

impl<S: LocalStorage> WatchLaterList<S> {
    /// Rehydrates the list. Unreadable stored data starts an empty list instead of failing.
    pub async fn load(storage: S) -> Result<Self> {
        let entries = match storage.get(WATCH_LATER_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable watch-later data: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        Ok(Self { storage, entries })
    }

    pub fn entries(&self) -> &[WatchLaterEntry] {
        &self.entries
    }

    pub fn contains(&self, lecture_id: &str, course_id: &str) -> bool {
        self.entries.iter().any(|e| e.is(lecture_id, course_id))
    }

    /// Appends the entry unless its (lecture, course) pair is already saved.
    /// Returns whether the list changed.
    pub async fn add(&mut self, entry: WatchLaterEntry) -> Result<bool> {
        if self.contains(&entry.lecture_id, &entry.course_id) {
            return Ok(false);
        }
        let mut next = self.entries.clone();
        next.push(entry);
        self.commit(next).await?;
        Ok(true)
    }

    /// Removes the matching pair. Absent pairs are a no-op.
    pub async fn remove(&mut self, lecture_id: &str, course_id: &str) -> Result<bool> {
        if !self.contains(lecture_id, course_id) {
            return Ok(false);
        }
        let next: Vec<WatchLaterEntry> = self
            .entries
            .iter()
            .filter(|e| !e.is(lecture_id, course_id))
            .cloned()
            .collect();
        self.commit(next).await?;
        Ok(true)
    }

    /// Writes `next` to storage and adopts it only once the write succeeded.
    async fn commit(&mut self, next: Vec<WatchLaterEntry>) -> Result<()> {
        let raw = serde_json::to_string(&next)
            .map_err(|e| AppError::ExternalService(format!("failed to encode watch-later list: {}", e)))?;
        self.storage.set(WATCH_LATER_KEY, &raw).await?;
        self.entries = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_storage::{FileStorage, MemoryStorage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory storage whose writes can be switched off.
    #[derive(Default)]
    struct FailingWrites {
        inner: MemoryStorage,
        failing: AtomicBool,
    }

    #[async_trait]
    impl<'a> LocalStorage for &'a FailingWrites {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::ExternalService("disk full".to_string()));
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
    }

    fn entry(lecture: &str, course: &str) -> WatchLaterEntry {
        WatchLaterEntry {
            lecture_id: lecture.to_string(),
            course_id: course.to_string(),
            title: format!("Lecture {}", lecture),
            description: String::new(),
            video_url: format!("https://www.youtube.com/watch?v={}", lecture),
            course_title: format!("Course {}", course),
        }
    }

    #[tokio::test]
    async fn duplicate_pair_is_stored_once() {
        let mut list = WatchLaterList::load(MemoryStorage::default()).await.unwrap();
        assert!(list.add(entry("l1", "c1")).await.unwrap());
        assert!(!list.add(entry("l1", "c1")).await.unwrap());
        assert_eq!(list.entries().len(), 1);
    }

    #[tokio::test]
    async fn same_lecture_in_another_course_is_distinct() {
        let mut list = WatchLaterList::load(MemoryStorage::default()).await.unwrap();
        list.add(entry("l1", "c1")).await.unwrap();
        list.add(entry("l1", "c2")).await.unwrap();
        assert_eq!(list.entries().len(), 2);
    }

    #[tokio::test]
    async fn removing_absent_pair_is_a_noop() {
        let mut list = WatchLaterList::load(MemoryStorage::default()).await.unwrap();
        list.add(entry("l1", "c1")).await.unwrap();
        assert!(!list.remove("l9", "c1").await.unwrap());
        assert!(!list.remove("l1", "c9").await.unwrap());
        assert_eq!(list.entries().len(), 1);
        assert!(list.remove("l1", "c1").await.unwrap());
        assert!(list.entries().is_empty());
    }

    #[tokio::test]
    async fn list_survives_reload_from_file_storage() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut list = WatchLaterList::load(FileStorage::new(dir.path())).await.unwrap();
            list.add(entry("l1", "c1")).await.unwrap();
            list.add(entry("l2", "c1")).await.unwrap();
            list.remove("l1", "c1").await.unwrap();
        }
        let list = WatchLaterList::load(FileStorage::new(dir.path())).await.unwrap();
        assert_eq!(list.entries(), &[entry("l2", "c1")]);
    }

    #[tokio::test]
    async fn corrupt_storage_starts_empty() {
        let storage = MemoryStorage::default();
        storage.set(WATCH_LATER_KEY, "{not json").await.unwrap();
        let list = WatchLaterList::load(storage).await.unwrap();
        assert!(list.entries().is_empty());
    }

    #[tokio::test]
    async fn failed_write_leaves_the_list_unchanged() {
        let storage = FailingWrites::default();
        let mut list = WatchLaterList::load(&storage).await.unwrap();

        storage.failing.store(true, Ordering::SeqCst);
        assert!(list.add(entry("l1", "c1")).await.is_err());
        assert!(list.entries().is_empty());

        storage.failing.store(false, Ordering::SeqCst);
        assert!(list.add(entry("l1", "c1")).await.unwrap());
        let reloaded = WatchLaterList::load(&storage).await.unwrap();
        assert_eq!(reloaded.entries(), &[entry("l1", "c1")]);

        storage.failing.store(true, Ordering::SeqCst);
        assert!(list.remove("l1", "c1").await.is_err());
        assert!(list.contains("l1", "c1"));
    }
}
