//! Session context: who is making a request, and who just signed in or out.
//!
//! `SessionContext` lives in `AppState` and is the only place viewer identity
//! comes from. Interested parties subscribe to `SessionEvent`s; the listener
//! started by `spawn_listener` is owned by the returned `SessionSubscription`
//! and stops when that guard is dropped.

use crate::{
    domain::SessionProvider,
    errors::{AppError, SessionError},
    feed::FeedLoader,
    models::UserId,
    AppState,
};
use anyhow::Context;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};
use serde::Deserialize;
use std::{
    collections::HashMap,
    sync::Arc,
};
use tokio::{
    sync::{broadcast, RwLock},
    task::JoinHandle,
};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(UserId),
    SignedOut(UserId),
}

/// The current token of every signed-in user, indexed both ways.
///
/// A user holds at most one entry: a rotated token replaces the old one.
#[derive(Debug, Default)]
struct KnownSessions {
    by_token: HashMap<String, UserId>,
    by_user: HashMap<UserId, String>,
}

/// What recording a resolved token changed.
#[derive(Debug, Default, PartialEq)]
struct Recorded {
    /// The user had no session before.
    signed_in: bool,
    /// A different user previously held this token.
    displaced: Option<UserId>,
}

impl KnownSessions {
    fn record(&mut self, token: &str, user: &UserId) -> Recorded {
        if self.by_token.get(token) == Some(user) {
            return Recorded::default();
        }

        let displaced = self.remove(token);
        let signed_in = match self.by_user.insert(user.clone(), token.to_string()) {
            Some(rotated) => {
                self.by_token.remove(&rotated);
                false
            }
            None => true,
        };
        self.by_token.insert(token.to_string(), user.clone());
        Recorded { signed_in, displaced }
    }

    /// Forgets `token`, returning its user.
    fn remove(&mut self, token: &str) -> Option<UserId> {
        let user = self.by_token.remove(token)?;
        if self.by_user.get(&user).map(String::as_str) == Some(token) {
            self.by_user.remove(&user);
        }
        Some(user)
    }
}

pub struct SessionContext {
    provider: Arc<dyn SessionProvider>,
    /// Used to notice sign-in, expiry and token rotation.
    known: RwLock<KnownSessions>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionContext {
    pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            provider,
            known: RwLock::new(KnownSessions::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Resolves the viewer for `token`. The provider is asked every time.
    pub async fn current_user(&self, token: Option<&str>) -> Result<Option<UserId>, AppError> {
        let Some(token) = token else {
            return Ok(None);
        };

        let resolved = self.provider.resolve(token).await?;
        match &resolved {
            Some(user) => {
                let recorded = self.known.write().await.record(token, user);
                if let Some(previous) = recorded.displaced {
                    tracing::info!(user = %previous, "Session replaced by another user");
                    self.publish(SessionEvent::SignedOut(previous));
                }
                if recorded.signed_in {
                    tracing::info!(user = %user, "Session started");
                    self.publish(SessionEvent::SignedIn(user.clone()));
                }
            }
            None => {
                if let Some(user) = self.known.write().await.remove(token) {
                    tracing::info!(user = %user, "Session expired");
                    self.publish(SessionEvent::SignedOut(user));
                }
            }
        }
        Ok(resolved)
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), AppError> {
        self.provider.sign_out(token).await?;
        if let Some(user) = self.known.write().await.remove(token) {
            tracing::info!(user = %user, "Signed out");
            self.publish(SessionEvent::SignedOut(user));
        }
        Ok(())
    }
}

/// Owns the session listener task; dropping it unsubscribes.
pub struct SessionSubscription {
    handle: JoinHandle<()>,
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Keeps the feed cache in step with sessions: prime on sign-in, evict on sign-out.
pub fn spawn_listener(session: &SessionContext, feed: Arc<FeedLoader>) -> SessionSubscription {
    let mut events = session.subscribe();
    let handle = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::SignedIn(user)) => {
                    feed.load(&user).await;
                }
                Ok(SessionEvent::SignedOut(user)) => {
                    feed.forget(&user).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Session listener lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("Session listener stopped");
    });
    SessionSubscription { handle }
}

// --- Providers ---

#[derive(Deserialize)]
struct ProviderUser {
    id: String,
}

/// Talks to a hosted identity provider over HTTP.
///
/// `GET {base}/user` with the access token resolves the user; `401`/`403`
/// means no session. `POST {base}/logout` ends it.
pub struct HttpSessionProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpSessionProvider {
    pub fn new(http: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn resolve(&self, token: &str) -> Result<Option<UserId>, SessionError> {
        let resp = self
            .http
            .get(format!("{}/user", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
            .context("Identity provider: user lookup request failed")?;

        if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Ok(None);
        }

        let user: ProviderUser = resp
            .error_for_status()
            .context("Identity provider: user lookup rejected")?
            .json()
            .await
            .context("Identity provider: malformed user response")?;
        Ok(Some(UserId::new(user.id)))
    }

    async fn sign_out(&self, token: &str) -> Result<(), SessionError> {
        self.http
            .post(format!("{}/logout", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
            .context("Identity provider: logout request failed")?
            .error_for_status()
            .context("Identity provider: logout rejected")?;
        Ok(())
    }
}

/// Fixed token table for local development, e.g. `DEV_SESSIONS=tok1=alice,tok2=bob`.
pub struct StaticSessionProvider {
    tokens: RwLock<HashMap<String, UserId>>,
}

impl StaticSessionProvider {
    pub fn new(tokens: HashMap<String, UserId>) -> Self {
        Self {
            tokens: RwLock::new(tokens),
        }
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn resolve(&self, token: &str) -> Result<Option<UserId>, SessionError> {
        Ok(self.tokens.read().await.get(token).cloned())
    }

    async fn sign_out(&self, token: &str) -> Result<(), SessionError> {
        self.tokens.write().await.remove(token);
        Ok(())
    }
}

// --- Extractors ---

/// The bearer token on a request, if any.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The viewer behind a request, or `None` when there is no valid session.
pub struct Viewer(pub Option<UserId>);

impl Viewer {
    pub fn require(self) -> Result<UserId, AppError> {
        self.0.ok_or(AppError::NotAuthenticated)
    }
}

impl FromRequestParts<Arc<AppState>> for Viewer {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let user = state.session.current_user(bearer_token(parts)).await?;
        Ok(Viewer(user))
    }
}

/// The raw bearer token, required.
pub struct AccessToken(pub String);

impl<S: Send + Sync> FromRequestParts<S> for AccessToken {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer_token(parts)
            .map(|t| AccessToken(t.to_string()))
            .ok_or(AppError::NotAuthenticated)
    }
}
