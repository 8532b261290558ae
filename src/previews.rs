//! Short-lived handles for a selected file's preview.
//!
//! A handle is created when a file is picked and released the first time the
//! preview is fetched. Handles nobody fetched are released once they outlive
//! the TTL; the sweep runs on every new acquisition.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub data: Vec<u8>,
    pub content_type: String,
}

struct Entry {
    preview: Preview,
    created: Instant,
}

pub struct PreviewStore {
    entries: Mutex<HashMap<Uuid, Entry>>,
    ttl: Duration,
}

impl PreviewStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn acquire(&self, preview: Preview) -> Uuid {
        self.acquire_at(preview, Instant::now())
    }

    fn acquire_at(&self, preview: Preview, now: Instant) -> Uuid {
        let id = Uuid::new_v4();
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.created) < self.ttl);
        if entries.len() < before {
            tracing::debug!(released = before - entries.len(), "Released expired previews");
        }
        entries.insert(id, Entry { preview, created: now });
        id
    }

    /// Hands out the preview and releases it. A second call returns `None`.
    pub fn take(&self, id: Uuid) -> Option<Preview> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id)
            .map(|entry| entry.preview)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preview() -> Preview {
        Preview {
            data: vec![1, 2, 3],
            content_type: "image/png".into(),
        }
    }

    #[test]
    fn preview_is_served_once() {
        let store = PreviewStore::new(Duration::from_secs(60));
        let id = store.acquire(preview());
        assert_eq!(store.take(id), Some(preview()));
        assert_eq!(store.take(id), None);
        assert!(store.is_empty());
    }

    #[test]
    fn unfetched_previews_expire_on_next_acquire() {
        let store = PreviewStore::new(Duration::from_secs(60));
        let start = Instant::now();
        let stale = store.acquire_at(preview(), start);
        let fresh = store.acquire_at(preview(), start + Duration::from_secs(61));

        assert_eq!(store.len(), 1);
        assert_eq!(store.take(stale), None);
        assert!(store.take(fresh).is_some());
    }
}
