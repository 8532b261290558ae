//! The reaction toggle.
//!
//! Per (meme, viewer) there is either no reaction or exactly one. The current
//! state is read from the store on every call, then one of insert / update /
//! delete is applied and the viewer's feed is reloaded.
//!
//! Lookup and mutation are two separate round trips with nothing wrapping
//! them, so two concurrent toggles by the same viewer on the same meme can
//! both see `None` and insert twice, or lose an update. The feed reduction
//! tolerates duplicates; the race itself is left open.

use crate::{
    domain::ReactionRepository,
    errors::{AppError, RepoError},
    feed::{FeedLoader, MemeView},
    models::{Reaction, ReactionKind, UserId},
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// What the toggle decided to do for a requested kind.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "action", content = "kind", rename_all = "snake_case")]
pub enum Transition {
    Insert(ReactionKind),
    Update(ReactionKind),
    Delete,
}

impl Transition {
    /// Plans the mutation from the viewer's current reaction.
    pub fn plan(current: Option<ReactionKind>, requested: ReactionKind) -> Self {
        match current {
            None => Transition::Insert(requested),
            Some(existing) if existing == requested => Transition::Delete,
            Some(_) => Transition::Update(requested),
        }
    }

    /// The viewer's reaction once the transition has been applied.
    pub fn resulting_state(self) -> Option<ReactionKind> {
        match self {
            Transition::Insert(kind) | Transition::Update(kind) => Some(kind),
            Transition::Delete => None,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToggleOutcome {
    Applied { transition: Transition },
    /// The mutation failed; the reloaded feed shows the store's real state.
    MutationFailed { transition: Transition },
    /// The lookup failed for a reason other than "no row", nothing was changed.
    Abandoned,
}

#[derive(Serialize, Debug, Clone)]
pub struct ToggleResult {
    pub outcome: ToggleOutcome,
    pub feed: Vec<MemeView>,
}

pub struct ReactionToggle {
    reactions: Arc<dyn ReactionRepository>,
    feed: Arc<FeedLoader>,
}

impl ReactionToggle {
    pub fn new(reactions: Arc<dyn ReactionRepository>, feed: Arc<FeedLoader>) -> Self {
        Self { reactions, feed }
    }

    /// Toggles `requested` on `meme_id` for `viewer`.
    ///
    /// Refuses without touching the store when there is no viewer. Store
    /// failures are logged, never returned.
    pub async fn toggle(
        &self,
        meme_id: Uuid,
        requested: ReactionKind,
        viewer: Option<&UserId>,
    ) -> Result<ToggleResult, AppError> {
        let viewer = viewer.ok_or(AppError::NotAuthenticated)?;

        let existing = match self.reactions.find(meme_id, viewer).await {
            Ok(row) => Some(row),
            Err(RepoError::NotFound(_)) => None,
            Err(e) => {
                tracing::error!(%meme_id, viewer = %viewer, error = %e, "Reaction lookup failed, abandoning toggle");
                return Ok(ToggleResult {
                    outcome: ToggleOutcome::Abandoned,
                    feed: self.feed.current(viewer).await,
                });
            }
        };

        let transition = Transition::plan(existing.as_ref().map(|r| r.kind), requested);
        let applied = match (transition, &existing) {
            (Transition::Insert(kind), None) => {
                self.reactions
                    .insert(&Reaction::new(meme_id, viewer.clone(), kind))
                    .await
            }
            (Transition::Update(kind), Some(row)) => self.reactions.update_kind(row, kind).await,
            (Transition::Delete, Some(row)) => self.reactions.delete(row).await,
            // plan() pairs Insert with no row and Update/Delete with a row
            _ => Err(RepoError::NotFound(format!("reaction on meme {} by {}", meme_id, viewer))),
        };

        let outcome = match applied {
            Ok(()) => {
                tracing::debug!(%meme_id, viewer = %viewer, ?transition, "Reaction toggled");
                ToggleOutcome::Applied { transition }
            }
            Err(e) => {
                tracing::error!(%meme_id, viewer = %viewer, ?transition, error = %e, "Reaction mutation failed");
                ToggleOutcome::MutationFailed { transition }
            }
        };

        // The reload is the only resynchronization; it runs whatever happened above.
        let feed = self.feed.load(viewer).await;
        Ok(ToggleResult { outcome, feed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MemeRepository;
    use crate::memory::MemoryStore;
    use crate::models::{Meme, MemeWithReactions};
    use async_trait::async_trait;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::sync::Mutex;

    /// Records every call and forwards to a `MemoryStore`.
    #[derive(Default)]
    struct Recording {
        store: MemoryStore,
        calls: Mutex<Vec<String>>,
        fail_lookup: bool,
        fail_mutations: bool,
    }

    impl Recording {
        fn log(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn mutation_result(&self) -> Result<(), RepoError> {
            if self.fail_mutations {
                Err(RepoError::BackendError(anyhow::anyhow!("write rejected")))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ReactionRepository for Recording {
        async fn find(&self, meme_id: Uuid, user_id: &UserId) -> Result<Reaction, RepoError> {
            self.log("find");
            if self.fail_lookup {
                return Err(RepoError::BackendError(anyhow::anyhow!("timeout")));
            }
            self.store.find(meme_id, user_id).await
        }

        async fn insert(&self, reaction: &Reaction) -> Result<(), RepoError> {
            self.log(format!("insert:{}", reaction.kind));
            self.mutation_result()?;
            self.store.insert(reaction).await
        }

        async fn update_kind(&self, existing: &Reaction, kind: ReactionKind) -> Result<(), RepoError> {
            self.log(format!("update:{}", kind));
            self.mutation_result()?;
            self.store.update_kind(existing, kind).await
        }

        async fn delete(&self, existing: &Reaction) -> Result<(), RepoError> {
            self.log("delete");
            self.mutation_result()?;
            ReactionRepository::delete(&self.store, existing).await
        }
    }

    #[async_trait]
    impl MemeRepository for Recording {
        async fn create(&self, meme: &Meme) -> Result<(), RepoError> {
            self.log("create_meme");
            self.store.create(meme).await
        }

        async fn list_with_reactions(&self) -> Result<Vec<MemeWithReactions>, RepoError> {
            self.log("list");
            self.store.list_with_reactions().await
        }
    }

    fn meme() -> Meme {
        Meme {
            id: Uuid::new_v4(),
            url: "https://img.example/m.png".into(),
            caption: Some("hi".into()),
            caption_top: None,
            caption_bottom: None,
            category: None,
            template_id: None,
            user_id: UserId::new("owner"),
            created_at: Utc::now(),
        }
    }

    async fn setup(recording: Recording) -> (Arc<Recording>, ReactionToggle, Uuid) {
        let recording = Arc::new(recording);
        let m = meme();
        recording.store.insert_meme(m.clone()).await;
        let feed = Arc::new(FeedLoader::new(recording.clone()));
        let toggle = ReactionToggle::new(recording.clone(), feed);
        (recording, toggle, m.id)
    }

    #[test]
    fn plan_covers_every_state() {
        use ReactionKind::*;
        assert_eq!(Transition::plan(None, Heart), Transition::Insert(Heart));
        assert_eq!(Transition::plan(Some(Heart), Heart), Transition::Delete);
        assert_eq!(Transition::plan(Some(Heart), Sad), Transition::Update(Sad));
    }

    #[tokio::test]
    async fn refuses_without_viewer_and_touches_nothing() {
        let (recording, toggle, meme_id) = setup(Recording::default()).await;
        let result = toggle.toggle(meme_id, ReactionKind::Heart, None).await;
        assert!(matches!(result, Err(AppError::NotAuthenticated)));
        assert!(recording.calls().is_empty());
    }

    #[tokio::test]
    async fn not_found_inserts_once_then_reloads() {
        let (recording, toggle, meme_id) = setup(Recording::default()).await;
        let viewer = UserId::new("v");

        let result = toggle.toggle(meme_id, ReactionKind::Heart, Some(&viewer)).await.unwrap();

        assert_eq!(recording.calls(), vec!["find", "insert:heart", "list"]);
        assert_eq!(
            result.outcome,
            ToggleOutcome::Applied { transition: Transition::Insert(ReactionKind::Heart) }
        );
        assert_eq!(result.feed[0].reactions.heart, 1);
        assert_eq!(result.feed[0].user_reaction, Some(ReactionKind::Heart));
    }

    #[tokio::test]
    async fn changing_kind_updates_the_same_row() {
        let (recording, toggle, meme_id) = setup(Recording::default()).await;
        let viewer = UserId::new("v");

        toggle.toggle(meme_id, ReactionKind::Heart, Some(&viewer)).await.unwrap();
        let before = recording.store.reactions_for(meme_id, &viewer).await;
        toggle.toggle(meme_id, ReactionKind::Wow, Some(&viewer)).await.unwrap();
        let after = recording.store.reactions_for(meme_id, &viewer).await;

        assert_eq!(after.len(), 1);
        assert_eq!(after[0].kind, ReactionKind::Wow);
        assert_eq!(after[0].id, before[0].id);
    }

    #[tokio::test]
    async fn same_kind_twice_removes_the_row() {
        let (recording, toggle, meme_id) = setup(Recording::default()).await;
        let viewer = UserId::new("v");

        toggle.toggle(meme_id, ReactionKind::Laugh, Some(&viewer)).await.unwrap();
        let result = toggle.toggle(meme_id, ReactionKind::Laugh, Some(&viewer)).await.unwrap();

        assert!(recording.store.reactions_for(meme_id, &viewer).await.is_empty());
        assert_eq!(result.feed[0].user_reaction, None);
        assert_eq!(result.feed[0].reactions.total(), 0);
    }

    #[tokio::test]
    async fn failed_lookup_abandons_without_reload() {
        let (recording, toggle, meme_id) = setup(Recording {
            fail_lookup: true,
            ..Recording::default()
        })
        .await;
        let viewer = UserId::new("v");

        let result = toggle.toggle(meme_id, ReactionKind::Heart, Some(&viewer)).await.unwrap();

        assert_eq!(result.outcome, ToggleOutcome::Abandoned);
        assert_eq!(recording.calls(), vec!["find"]);
    }

    #[tokio::test]
    async fn failed_mutation_still_reloads() {
        let (recording, toggle, meme_id) = setup(Recording {
            fail_mutations: true,
            ..Recording::default()
        })
        .await;
        let viewer = UserId::new("v");

        let result = toggle.toggle(meme_id, ReactionKind::Sad, Some(&viewer)).await.unwrap();

        assert_eq!(
            result.outcome,
            ToggleOutcome::MutationFailed { transition: Transition::Insert(ReactionKind::Sad) }
        );
        assert_eq!(recording.calls(), vec!["find", "insert:sad", "list"]);
        assert_eq!(result.feed[0].reactions.total(), 0);
    }

    fn kind_strategy() -> impl Strategy<Value = ReactionKind> {
        prop::sample::select(ReactionKind::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn toggling_the_same_kind_alternates(kind in kind_strategy(), times in 1usize..8) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let state = rt.block_on(async {
                let (recording, toggle, meme_id) = setup(Recording::default()).await;
                let viewer = UserId::new("v");
                for _ in 0..times {
                    toggle.toggle(meme_id, kind, Some(&viewer)).await.unwrap();
                }
                recording.store.reactions_for(meme_id, &viewer).await
            });

            if times % 2 == 1 {
                prop_assert_eq!(state.len(), 1);
                prop_assert_eq!(state[0].kind, kind);
            } else {
                prop_assert!(state.is_empty());
            }
        }
    }
}
