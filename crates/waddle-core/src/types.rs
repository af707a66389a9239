use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque session identifier (UUIDv7 — time-sortable, unique per inbound event).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Tenant boundary — all caches, permissions, configuration, and scoring are
/// scoped to a community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommunityId(pub i64);

impl fmt::Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A platform-addressable location: `platform:server:channel`.
///
/// Created by the Gateway Creator when a community activates a platform
/// channel; destroyed on deactivation. A community may own many entities;
/// an entity belongs to exactly one community.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(platform: &Platform, server_id: &str, channel_id: &str) -> Self {
        Self(format!("{}:{}:{}", platform, server_id, channel_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat platform a session or entity originates from.
///
/// The source product's `Platform` enum lists YouTube alongside the others
/// without a corresponding receiver implementation in the reviewed slice;
/// it is kept here as a recognized variant so entity/session plumbing
/// round-trips it, without implying this workspace implements a YouTube
/// receiver (out of scope — receivers are external collaborators).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitch,
    Discord,
    Slack,
    Kick,
    YouTube,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Twitch => write!(f, "twitch"),
            Platform::Discord => write!(f, "discord"),
            Platform::Slack => write!(f, "slack"),
            Platform::Kick => write!(f, "kick"),
            Platform::YouTube => write!(f, "youtube"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twitch" => Ok(Platform::Twitch),
            "discord" => Ok(Platform::Discord),
            "slack" => Ok(Platform::Slack),
            "kick" => Ok(Platform::Kick),
            "youtube" => Ok(Platform::YouTube),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Community role hierarchy, least to most privileged for comparisons.
///
/// Default required role per interaction module is `Member`; modules may
/// raise the bar. `Visitor` covers users the community has never seen
/// before (e.g. a first chat message).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Visitor,
    #[default]
    Member,
    Moderator,
    Admin,
    Owner,
}

impl UserRole {
    pub fn satisfies(&self, required: UserRole) -> bool {
        *self >= required
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Visitor => write!(f, "visitor"),
            UserRole::Member => write!(f, "member"),
            UserRole::Moderator => write!(f, "moderator"),
            UserRole::Admin => write!(f, "admin"),
            UserRole::Owner => write!(f, "owner"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "visitor" => Ok(UserRole::Visitor),
            "member" => Ok(UserRole::Member),
            "moderator" => Ok(UserRole::Moderator),
            "admin" => Ok(UserRole::Admin),
            "owner" => Ok(UserRole::Owner),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// The event family the router classifies an inbound message into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    ChatMessage,
    SlashCommand,
    Interaction,
    Event,
    Scheduled,
}

/// Either form of credential the HTTP boundary accepts; both resolve to the
/// same internal user context.
#[derive(Debug, Clone)]
pub enum Credential {
    Jwt(JwtClaims),
    ApiKey(ApiKeyRecord),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub username: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub key_id: String,
    pub owner: String,
    pub permissions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_satisfies() {
        assert!(UserRole::Owner.satisfies(UserRole::Member));
        assert!(UserRole::Admin.satisfies(UserRole::Moderator));
        assert!(!UserRole::Member.satisfies(UserRole::Moderator));
        assert!(UserRole::Member.satisfies(UserRole::Member));
    }

    #[test]
    fn entity_id_round_trip() {
        let e = EntityId::new(&Platform::Twitch, "s1", "c7");
        assert_eq!(e.as_str(), "twitch:s1:c7");
    }

    #[test]
    fn platform_from_str_round_trip() {
        for p in [
            Platform::Twitch,
            Platform::Discord,
            Platform::Slack,
            Platform::Kick,
            Platform::YouTube,
        ] {
            let s = p.to_string();
            assert_eq!(s.parse::<Platform>().unwrap(), p);
        }
    }
}
