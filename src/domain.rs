use crate::errors::{RepoError, SessionError, StorageError};
use crate::models::{Meme, MemeWithReactions, Reaction, ReactionKind, Template, UserId};
use async_trait::async_trait;
use uuid::Uuid;

/// Storage of meme rows and the read-side join with their reactions.
#[async_trait]
pub trait MemeRepository: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Inserts a new meme row.
    async fn create(&self, meme: &Meme) -> Result<(), RepoError>;

    /// Lists every meme with its reactions attached, newest first.
    async fn list_with_reactions(&self) -> Result<Vec<MemeWithReactions>, RepoError>;
}

/// Storage of reaction rows.
///
/// Nothing here enforces one row per (meme, user); that invariant belongs to
/// the toggle in `reactions`.
#[async_trait]
pub trait ReactionRepository: Send + Sync + 'static {
    /// Finds the viewer's reaction on a meme.
    /// Returns `RepoError::NotFound` when there is none.
    async fn find(&self, meme_id: Uuid, user_id: &UserId) -> Result<Reaction, RepoError>;

    async fn insert(&self, reaction: &Reaction) -> Result<(), RepoError>;

    /// Changes the kind of an existing row, keeping its id.
    async fn update_kind(&self, existing: &Reaction, kind: ReactionKind) -> Result<(), RepoError>;

    async fn delete(&self, existing: &Reaction) -> Result<(), RepoError>;
}

/// Read-only catalogue of generator backgrounds.
#[async_trait]
pub trait TemplateRepository: Send + Sync + 'static {
    /// Lists templates, newest first.
    async fn list(&self) -> Result<Vec<Template>, RepoError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Template>, RepoError>;
}

/// A host that stores uploaded images and serves them from a public URL.
#[async_trait]
pub trait MediaHost: Send + Sync + 'static {
    /// Uploads the file and returns the URL it is served from.
    async fn upload(&self, file_name: &str, data: Vec<u8>, content_type: Option<String>) -> Result<String, StorageError>;
}

/// The identity provider that owns user sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync + 'static {
    /// Resolves an access token to its user, or `None` if the session is not valid.
    async fn resolve(&self, token: &str) -> Result<Option<UserId>, SessionError>;

    async fn sign_out(&self, token: &str) -> Result<(), SessionError>;
}
