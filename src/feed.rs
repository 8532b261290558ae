//! Feed loading and reduction.
//!
//! A feed is rebuilt from scratch on every load: memes come back from the
//! repository with their raw reaction rows and are folded into per-kind counts
//! plus the viewer's own reaction. The last good feed per viewer is kept so a
//! failed load leaves the viewer looking at what they saw before.

use crate::domain::MemeRepository;
use crate::models::{MemeWithReactions, ReactionKind, ReactionRef, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Separator placed between top and bottom captions.
pub const CAPTION_SEPARATOR: &str = " · ";

/// Per-kind reaction counts. Every kind is always present.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactionCounts {
    pub heart: u32,
    pub laugh: u32,
    pub wow: u32,
    pub sad: u32,
}

impl ReactionCounts {
    pub fn get(&self, kind: ReactionKind) -> u32 {
        match kind {
            ReactionKind::Heart => self.heart,
            ReactionKind::Laugh => self.laugh,
            ReactionKind::Wow => self.wow,
            ReactionKind::Sad => self.sad,
        }
    }

    pub fn increment(&mut self, kind: ReactionKind) {
        let slot = match kind {
            ReactionKind::Heart => &mut self.heart,
            ReactionKind::Laugh => &mut self.laugh,
            ReactionKind::Wow => &mut self.wow,
            ReactionKind::Sad => &mut self.sad,
        };
        *slot += 1;
    }

    pub fn total(&self) -> u32 {
        ReactionKind::ALL.into_iter().map(|kind| self.get(kind)).sum()
    }
}

/// A display-ready meme as seen by one viewer.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MemeView {
    pub id: Uuid,
    pub url: String,
    pub caption: String,
    pub caption_top: Option<String>,
    pub caption_bottom: Option<String>,
    pub user_id: UserId,
    pub category: Option<String>,
    pub template_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub reactions: ReactionCounts,
    pub user_reaction: Option<ReactionKind>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// Builds the single caption shown under a meme.
///
/// Top/bottom captions win over the legacy caption; the separator only
/// appears when both halves are present.
pub fn derive_caption(top: Option<&str>, bottom: Option<&str>, legacy: Option<&str>) -> String {
    match (non_empty(top), non_empty(bottom)) {
        (Some(top), Some(bottom)) => format!("{top}{CAPTION_SEPARATOR}{bottom}").trim().to_string(),
        (Some(only), None) | (None, Some(only)) => only.trim().to_string(),
        (None, None) => legacy.unwrap_or_default().to_string(),
    }
}

/// Folds reaction rows into counts and the viewer's own reaction.
///
/// If the store holds more than one row for the viewer the last one wins.
pub fn tally(reactions: &[ReactionRef], viewer: &UserId) -> (ReactionCounts, Option<ReactionKind>) {
    let mut counts = ReactionCounts::default();
    let mut own = None;
    for reaction in reactions {
        counts.increment(reaction.kind);
        if &reaction.user_id == viewer {
            own = Some(reaction.kind);
        }
    }
    (counts, own)
}

pub fn reduce_meme(entry: MemeWithReactions, viewer: &UserId) -> MemeView {
    let (reactions, user_reaction) = tally(&entry.reactions, viewer);
    let meme = entry.meme;
    let caption = derive_caption(
        meme.caption_top.as_deref(),
        meme.caption_bottom.as_deref(),
        meme.caption.as_deref(),
    );

    MemeView {
        id: meme.id,
        url: meme.url,
        caption,
        caption_top: meme.caption_top,
        caption_bottom: meme.caption_bottom,
        user_id: meme.user_id,
        category: meme.category,
        template_id: meme.template_id,
        created_at: meme.created_at,
        reactions,
        user_reaction,
    }
}

/// Reduces a whole feed, preserving input order.
pub fn reduce_feed(entries: Vec<MemeWithReactions>, viewer: &UserId) -> Vec<MemeView> {
    entries.into_iter().map(|entry| reduce_meme(entry, viewer)).collect()
}

/// Loads feeds and remembers the last successful one per viewer.
pub struct FeedLoader {
    memes: Arc<dyn MemeRepository>,
    last_good: RwLock<HashMap<UserId, Vec<MemeView>>>,
}

impl FeedLoader {
    pub fn new(memes: Arc<dyn MemeRepository>) -> Self {
        Self {
            memes,
            last_good: RwLock::new(HashMap::new()),
        }
    }

    /// Fetches and reduces the feed for `viewer`.
    ///
    /// On failure the error is logged and the previous feed is returned
    /// unchanged. There is no retry.
    pub async fn load(&self, viewer: &UserId) -> Vec<MemeView> {
        match self.memes.list_with_reactions().await {
            Ok(entries) => {
                let views = reduce_feed(entries, viewer);
                tracing::debug!(viewer = %viewer, memes = views.len(), "Feed reloaded");
                self.last_good.write().await.insert(viewer.clone(), views.clone());
                views
            }
            Err(e) => {
                tracing::error!(viewer = %viewer, error = %e, "Failed to load feed, keeping previous one");
                self.current(viewer).await
            }
        }
    }

    /// The last feed loaded for `viewer`, without touching the store.
    pub async fn current(&self, viewer: &UserId) -> Vec<MemeView> {
        self.last_good
            .read()
            .await
            .get(viewer)
            .cloned()
            .unwrap_or_default()
    }

    /// Drops the cached feed, e.g. when the viewer signs out.
    pub async fn forget(&self, viewer: &UserId) {
        if self.last_good.write().await.remove(viewer).is_some() {
            tracing::debug!(viewer = %viewer, "Dropped cached feed");
        }
    }

    pub async fn is_cached(&self, viewer: &UserId) -> bool {
        self.last_good.read().await.contains_key(viewer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RepoError;
    use crate::memory::MemoryStore;
    use crate::models::Meme;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn meme_at(secs: i64) -> Meme {
        Meme {
            id: Uuid::new_v4(),
            url: format!("https://img.example/{secs}.png"),
            caption: None,
            caption_top: None,
            caption_bottom: None,
            category: None,
            template_id: None,
            user_id: UserId::new("owner"),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    fn reaction(kind: ReactionKind, user: &str) -> ReactionRef {
        ReactionRef {
            kind,
            user_id: UserId::new(user),
        }
    }

    #[test]
    fn caption_joins_top_and_bottom() {
        assert_eq!(derive_caption(Some("A"), Some("B"), None), "A · B");
        assert_eq!(derive_caption(Some("A"), None, Some("C")), "A");
        assert_eq!(derive_caption(Some("A"), Some(""), None), "A");
        assert_eq!(derive_caption(None, Some("B"), None), "B");
        assert_eq!(derive_caption(None, None, Some("C")), "C");
        assert_eq!(derive_caption(Some(""), None, Some("C")), "C");
        assert_eq!(derive_caption(None, None, None), "");
    }

    #[test]
    fn meme_without_reactions_reports_zero_counts() {
        let view = reduce_meme(
            MemeWithReactions {
                meme: meme_at(1),
                reactions: vec![],
            },
            &UserId::new("viewer"),
        );
        for kind in ReactionKind::ALL {
            assert_eq!(view.reactions.get(kind), 0);
        }
        assert_eq!(view.user_reaction, None);
        assert_eq!(view.caption, "");
    }

    #[test]
    fn tally_counts_every_row_and_tracks_viewer() {
        let viewer = UserId::new("viewer");
        let rows = vec![
            reaction(ReactionKind::Heart, "a"),
            reaction(ReactionKind::Heart, "b"),
            reaction(ReactionKind::Sad, "viewer"),
            reaction(ReactionKind::Wow, "c"),
        ];
        let (counts, own) = tally(&rows, &viewer);
        assert_eq!(counts.heart, 2);
        assert_eq!(counts.laugh, 0);
        assert_eq!(counts.wow, 1);
        assert_eq!(counts.sad, 1);
        assert_eq!(counts.total(), 4);
        assert_eq!(own, Some(ReactionKind::Sad));
    }

    #[test]
    fn duplicate_viewer_rows_take_the_last_one() {
        let viewer = UserId::new("viewer");
        let rows = vec![
            reaction(ReactionKind::Heart, "viewer"),
            reaction(ReactionKind::Laugh, "viewer"),
        ];
        let (counts, own) = tally(&rows, &viewer);
        assert_eq!(counts.total(), 2);
        assert_eq!(own, Some(ReactionKind::Laugh));
    }

    #[test]
    fn reduction_preserves_order() {
        let newer = meme_at(200);
        let older = meme_at(100);
        let views = reduce_feed(
            vec![
                MemeWithReactions { meme: newer.clone(), reactions: vec![] },
                MemeWithReactions { meme: older.clone(), reactions: vec![] },
            ],
            &UserId::new("viewer"),
        );
        let ids: Vec<_> = views.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn loader_returns_newest_first() {
        let store = Arc::new(MemoryStore::default());
        let older = meme_at(100);
        let newer = meme_at(200);
        store.insert_meme(older.clone()).await;
        store.insert_meme(newer.clone()).await;

        let loader = FeedLoader::new(store);
        let views = loader.load(&UserId::new("viewer")).await;
        let ids: Vec<_> = views.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    /// Succeeds until told to fail.
    struct FlakyMemes {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    #[async_trait]
    impl MemeRepository for FlakyMemes {
        async fn create(&self, meme: &Meme) -> Result<(), RepoError> {
            self.inner.create(meme).await
        }

        async fn list_with_reactions(&self) -> Result<Vec<MemeWithReactions>, RepoError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(RepoError::BackendError(anyhow::anyhow!("connection reset")));
            }
            self.inner.list_with_reactions().await
        }
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_feed() {
        let memes = Arc::new(FlakyMemes {
            inner: MemoryStore::default(),
            failing: AtomicBool::new(false),
        });
        memes.inner.insert_meme(meme_at(1)).await;
        let loader = FeedLoader::new(memes.clone());
        let viewer = UserId::new("viewer");

        let first = loader.load(&viewer).await;
        assert_eq!(first.len(), 1);

        memes.inner.insert_meme(meme_at(2)).await;
        memes.failing.store(true, Ordering::SeqCst);
        let second = loader.load(&viewer).await;
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn forget_drops_cached_feed() {
        let loader = FeedLoader::new(Arc::new(MemoryStore::default()));
        let viewer = UserId::new("viewer");
        loader.load(&viewer).await;
        assert!(loader.is_cached(&viewer).await);
        loader.forget(&viewer).await;
        assert!(!loader.is_cached(&viewer).await);
    }
}
