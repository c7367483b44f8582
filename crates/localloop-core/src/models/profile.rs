//! User profile model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// Per-user display data and reputation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub user: UserId,
    pub display_name: String,
    #[serde(default)]
    pub dorm: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lender_score: f64,
    #[serde(default)]
    pub borrower_score: f64,
    /// Points balance earned by lending
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl UserProfile {
    /// Combined rating shown next to a user's name.
    pub fn reputation(&self) -> f64 {
        (self.lender_score + self.borrower_score) / 2.0
    }
}

/// Editable profile fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub display_name: String,
    pub dorm: String,
    #[serde(default)]
    pub bio: String,
}

/// Display data for the user behind a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl Actor {
    /// Actor with no profile data available.
    pub fn unknown(user_id: UserId) -> Self {
        Self {
            user_id,
            display_name: "Unknown User".to_string(),
            avatar_url: None,
        }
    }
}

impl From<&UserProfile> for Actor {
    fn from(profile: &UserProfile) -> Self {
        Self {
            user_id: profile.user.clone(),
            display_name: profile.display_name.clone(),
            avatar_url: profile.avatar_url.clone(),
        }
    }
}
