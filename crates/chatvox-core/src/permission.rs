//! Per-user TTS permission records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored permission record for one user.
///
/// Unknown users are treated as [`UserPermission::new`]: not explicitly
/// allowed, not blacklisted, team level 0, no assigned voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPermission {
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    /// Explicit whitelist flag; bypasses chat and team-level restrictions.
    #[serde(default)]
    pub allow_tts: bool,
    #[serde(default)]
    pub is_blacklisted: bool,
    #[serde(default)]
    pub team_level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_voice: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl UserPermission {
    /// Default record for a user seen for the first time.
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            allow_tts: false,
            is_blacklisted: false,
            team_level: 0,
            assigned_voice: None,
            updated_at: Utc::now(),
        }
    }

    /// Mark the record as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// An operator action on a user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PermissionChange {
    Allow,
    Deny,
    Blacklist,
    Unblacklist,
    SetTeamLevel { level: u8 },
    AssignVoice { voice: Option<String> },
}

impl PermissionChange {
    /// Apply this change to `record`.
    pub fn apply(&self, record: &mut UserPermission) {
        match self {
            Self::Allow => record.allow_tts = true,
            Self::Deny => record.allow_tts = false,
            Self::Blacklist => record.is_blacklisted = true,
            Self::Unblacklist => record.is_blacklisted = false,
            Self::SetTeamLevel { level } => record.team_level = *level,
            Self::AssignVoice { voice } => record.assigned_voice.clone_from(voice),
        }
        record.touch();
    }
}

/// Aggregate counts over the permission table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionStats {
    pub total_users: usize,
    pub allowed: usize,
    pub blacklisted: usize,
    pub with_assigned_voice: usize,
}

impl PermissionStats {
    pub fn from_users<'a>(users: impl IntoIterator<Item = &'a UserPermission>) -> Self {
        users
            .into_iter()
            .fold(Self::default(), |mut stats, user| {
                stats.total_users += 1;
                stats.allowed += usize::from(user.allow_tts);
                stats.blacklisted += usize::from(user.is_blacklisted);
                stats.with_assigned_voice += usize::from(user.assigned_voice.is_some());
                stats
            })
    }
}
