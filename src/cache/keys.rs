//! Canonical cache keys.
//!
//! Every key is derived from the entity kind plus its id, or names a list
//! query. Repositories must go through these helpers so readers and
//! invalidators always agree on the spelling.

pub const USERS_LIST: &str = "users_list";
pub const TEAMS_LIST: &str = "teams_list";

pub fn user(id: i32) -> String {
    format!("user_{}", id)
}

/// A user together with the teams it belongs to.
pub fn user_teams(id: i32) -> String {
    format!("user_teams_{}", id)
}

pub fn team(id: i32) -> String {
    format!("team_{}", id)
}
