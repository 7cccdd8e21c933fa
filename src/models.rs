use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::FromRow;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ===== Entity Models =====

/// The two kinds of record the service stores and imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Team,
}

impl EntityKind {
    /// Collection name used on the wire (`"users"` / `"teams"`).
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Team => "teams",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::User => f.write_str("user"),
            EntityKind::Team => f.write_str("team"),
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    /// Accepts the wire collection names only; matching is exact.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "users" => Ok(EntityKind::User),
            "teams" => Ok(EntityKind::Team),
            other => Err(format!("Invalid entity type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user that has not been written yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewUser {
    /// Stamp a new user with the current time.
    pub fn now(email: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            email: email.into(),
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Ids of member users, ascending.
    pub members: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTeam {
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewTeam {
    pub fn now(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            title: title.into(),
            description: description.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, JsonSchema)]
pub struct TeamSummary {
    pub id: i32,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UserWithTeams {
    #[serde(flatten)]
    pub user: User,
    pub teams: Vec<TeamSummary>,
}

/// Team ids a membership rewrite touched, for cache invalidation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipChange {
    pub previous: Vec<i32>,
    pub current: Vec<i32>,
}

impl MembershipChange {
    /// Every team on either side of the change, deduplicated.
    pub fn affected_teams(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self
            .previous
            .iter()
            .chain(self.current.iter())
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

// ===== Response Envelope =====

/// Success envelope wrapped around every payload the API returns.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Payload for operations that have nothing to return but an acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
