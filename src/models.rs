use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Opaque subject identifier handed out by the identity provider.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fixed set of reactions a viewer can leave on a meme.
///
/// Counting, rendering and toggling all go through this enum, so adding a
/// kind is a compile error everywhere it is not handled.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Heart,
    Laugh,
    Wow,
    Sad,
}

impl ReactionKind {
    /// Display order.
    pub const ALL: [ReactionKind; 4] = [
        ReactionKind::Heart,
        ReactionKind::Laugh,
        ReactionKind::Wow,
        ReactionKind::Sad,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReactionKind::Heart => "heart",
            ReactionKind::Laugh => "laugh",
            ReactionKind::Wow => "wow",
            ReactionKind::Sad => "sad",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            ReactionKind::Heart => "❤️",
            ReactionKind::Laugh => "😂",
            ReactionKind::Wow => "😮",
            ReactionKind::Sad => "😢",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown reaction kind: {0}")]
pub struct UnknownReaction(pub String);

impl FromStr for ReactionKind {
    type Err = UnknownReaction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReactionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownReaction(s.to_string()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Meme {
    pub id: Uuid,
    pub url: String,
    /// Single caption used by plain uploads.
    pub caption: Option<String>,
    pub caption_top: Option<String>,
    pub caption_bottom: Option<String>,
    pub category: Option<String>,
    pub template_id: Option<Uuid>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// A stored reaction row.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Reaction {
    pub id: Uuid,
    pub meme_id: Uuid,
    pub user_id: UserId,
    pub kind: ReactionKind,
    pub created_at: DateTime<Utc>,
}

impl Reaction {
    pub fn new(meme_id: Uuid, user_id: UserId, kind: ReactionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            meme_id,
            user_id,
            kind,
            created_at: Utc::now(),
        }
    }
}

/// The slice of a reaction row the feed needs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReactionRef {
    pub kind: ReactionKind,
    pub user_id: UserId,
}

impl From<&Reaction> for ReactionRef {
    fn from(reaction: &Reaction) -> Self {
        Self {
            kind: reaction.kind,
            user_id: reaction.user_id.clone(),
        }
    }
}

/// A meme joined with every reaction attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct MemeWithReactions {
    pub meme: Meme,
    pub reactions: Vec<ReactionRef>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_kind_parses_its_own_names() {
        for kind in ReactionKind::ALL {
            assert_eq!(kind.as_str().parse::<ReactionKind>(), Ok(kind));
        }
        assert!("angry".parse::<ReactionKind>().is_err());
    }

    #[test]
    fn reaction_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ReactionKind::Laugh).unwrap();
        assert_eq!(json, "\"laugh\"");
    }
}
