pub mod aws_clients;
pub mod cloudinary;
pub mod config;
pub mod domain;
pub mod errors;
pub mod feed;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod overlay;
pub mod previews;
pub mod reactions;
pub mod repositories;
pub mod routes;
pub mod session;
pub mod startup;
pub mod storage;
pub mod submission;
pub mod templates;

use crate::{
    domain::{MediaHost, MemeRepository, ReactionRepository, SessionProvider, TemplateRepository},
    feed::FeedLoader,
    overlay::CaptionRenderer,
    previews::PreviewStore,
    reactions::ReactionToggle,
    session::SessionContext,
    submission::MemeSubmitter,
};
use std::{sync::Arc, time::Duration};

/// The external collaborators the service is wired to.
pub struct Backends {
    pub memes: Arc<dyn MemeRepository>,
    pub reactions: Arc<dyn ReactionRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub media: Arc<dyn MediaHost>,
    pub sessions: Arc<dyn SessionProvider>,
}

/// AppState holds shared resources for the web server.
pub struct AppState {
    pub session: SessionContext,
    pub feed: Arc<FeedLoader>,
    pub toggle: ReactionToggle,
    pub submitter: MemeSubmitter,
    pub templates: Arc<dyn TemplateRepository>,
    /// `None` when no caption font is configured.
    pub renderer: Option<CaptionRenderer>,
    pub previews: PreviewStore,
}

impl AppState {
    pub fn new(backends: Backends, renderer: Option<CaptionRenderer>, preview_ttl: Duration) -> Self {
        let feed = Arc::new(FeedLoader::new(backends.memes.clone()));
        Self {
            session: SessionContext::new(backends.sessions),
            toggle: ReactionToggle::new(backends.reactions, feed.clone()),
            submitter: MemeSubmitter::new(backends.memes, backends.media),
            feed,
            templates: backends.templates,
            renderer,
            previews: PreviewStore::new(preview_ttl),
        }
    }
}
