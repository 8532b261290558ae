//! In-process store for local development (`MEMEBOARD_STORE=memory`) and tests.

use crate::{
    domain::{MemeRepository, ReactionRepository, TemplateRepository},
    errors::RepoError,
    models::{Meme, MemeWithReactions, Reaction, ReactionKind, ReactionRef, Template, UserId},
};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryStore {
    memes: RwLock<Vec<Meme>>,
    reactions: RwLock<Vec<Reaction>>,
    templates: RwLock<Vec<Template>>,
}

impl MemoryStore {
    pub async fn insert_meme(&self, meme: Meme) {
        self.memes.write().await.push(meme);
    }

    pub async fn insert_template(&self, template: Template) {
        self.templates.write().await.push(template);
    }

    /// Every reaction row for the pair, in insertion order.
    pub async fn reactions_for(&self, meme_id: Uuid, user_id: &UserId) -> Vec<Reaction> {
        self.reactions
            .read()
            .await
            .iter()
            .filter(|r| r.meme_id == meme_id && &r.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn memes(&self) -> Vec<Meme> {
        self.memes.read().await.clone()
    }
}

#[async_trait]
impl MemeRepository for MemoryStore {
    async fn create(&self, meme: &Meme) -> Result<(), RepoError> {
        self.memes.write().await.push(meme.clone());
        Ok(())
    }

    async fn list_with_reactions(&self) -> Result<Vec<MemeWithReactions>, RepoError> {
        let mut memes = self.memes.read().await.clone();
        memes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let reactions = self.reactions.read().await;

        Ok(memes
            .into_iter()
            .map(|meme| {
                let attached = reactions
                    .iter()
                    .filter(|r| r.meme_id == meme.id)
                    .map(ReactionRef::from)
                    .collect();
                MemeWithReactions { meme, reactions: attached }
            })
            .collect())
    }
}

#[async_trait]
impl ReactionRepository for MemoryStore {
    async fn find(&self, meme_id: Uuid, user_id: &UserId) -> Result<Reaction, RepoError> {
        self.reactions
            .read()
            .await
            .iter()
            .find(|r| r.meme_id == meme_id && &r.user_id == user_id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(format!("reaction on meme {} by {}", meme_id, user_id)))
    }

    async fn insert(&self, reaction: &Reaction) -> Result<(), RepoError> {
        self.reactions.write().await.push(reaction.clone());
        Ok(())
    }

    async fn update_kind(&self, existing: &Reaction, kind: ReactionKind) -> Result<(), RepoError> {
        let mut reactions = self.reactions.write().await;
        let row = reactions
            .iter_mut()
            .find(|r| r.id == existing.id)
            .ok_or_else(|| RepoError::NotFound(format!("reaction {}", existing.id)))?;
        row.kind = kind;
        Ok(())
    }

    async fn delete(&self, existing: &Reaction) -> Result<(), RepoError> {
        self.reactions.write().await.retain(|r| r.id != existing.id);
        Ok(())
    }
}

#[async_trait]
impl TemplateRepository for MemoryStore {
    async fn list(&self) -> Result<Vec<Template>, RepoError> {
        let mut templates = self.templates.read().await.clone();
        templates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(templates)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Template>, RepoError> {
        Ok(self.templates.read().await.iter().find(|t| t.id == id).cloned())
    }
}
