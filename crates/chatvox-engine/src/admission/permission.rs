//! Permission gate.
//!
//! Decides whether a user may speak at all. The decision is a pure function
//! of the stored [`UserPermission`] record and the global [`GatePolicy`]; the
//! gate itself only adds the store lookup and the admin write path.

use std::sync::{Arc, PoisonError, RwLock};

use chatvox_core::{
    DenyReason, PermissionChange, PermissionStats, PermissionStore, StoreError, TtsSettings,
    UserPermission,
};
use tracing::{debug, info};

/// Global chat policy applied on top of per-user records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    pub enabled_for_chat: bool,
    pub team_min_level: u8,
}

impl GatePolicy {
    pub const fn from_settings(settings: &TtsSettings) -> Self {
        Self {
            enabled_for_chat: settings.enabled_for_chat,
            team_min_level: settings.team_min_level,
        }
    }
}

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The user may speak. Carries the record for voice resolution.
    Allowed(UserPermission),
    Denied(DenyReason),
}

/// Evaluate a record against the policy.
///
/// Order matters: a blacklist always wins, an explicit allow bypasses the
/// chat switch and the team-level requirement.
pub fn evaluate(record: &UserPermission, policy: GatePolicy) -> Result<(), DenyReason> {
    if record.is_blacklisted {
        return Err(DenyReason::Blacklisted);
    }
    if record.allow_tts {
        return Ok(());
    }
    if !policy.enabled_for_chat {
        return Err(DenyReason::NotWhitelisted);
    }
    if record.team_level < policy.team_min_level {
        return Err(DenyReason::BelowTeamLevel {
            level: record.team_level,
            required: policy.team_min_level,
        });
    }
    Ok(())
}

pub struct PermissionGate {
    store: Arc<dyn PermissionStore>,
    policy: RwLock<GatePolicy>,
}

impl PermissionGate {
    pub fn new(store: Arc<dyn PermissionStore>, policy: GatePolicy) -> Self {
        Self {
            store,
            policy: RwLock::new(policy),
        }
    }

    pub fn policy(&self) -> GatePolicy {
        *self.policy.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_policy(&self, policy: GatePolicy) {
        *self.policy.write().unwrap_or_else(PoisonError::into_inner) = policy;
    }

    /// Load a user's record, or the default record for unknown users.
    pub async fn lookup(&self, user_id: &str, username: &str) -> Result<UserPermission, StoreError> {
        Ok(self
            .store
            .get(user_id)
            .await?
            .unwrap_or_else(|| UserPermission::new(user_id, username)))
    }

    /// Check whether `user_id` may speak.
    pub async fn check(&self, user_id: &str, username: &str) -> Result<GateDecision, StoreError> {
        let record = self.lookup(user_id, username).await?;
        Ok(match evaluate(&record, self.policy()) {
            Ok(()) => GateDecision::Allowed(record),
            Err(reason) => {
                debug!(target: "chatvox.admission", user_id, %reason, "Permission denied");
                GateDecision::Denied(reason)
            }
        })
    }

    /// Apply an operator change to a user, creating the record if needed.
    pub async fn apply(
        &self,
        user_id: &str,
        username: &str,
        change: &PermissionChange,
    ) -> Result<UserPermission, StoreError> {
        let mut record = self.lookup(user_id, username).await?;
        if !username.is_empty() {
            username.clone_into(&mut record.username);
        }
        change.apply(&mut record);
        self.store.upsert(record.clone()).await?;
        info!(target: "chatvox.admission", user_id, ?change, "User permission updated");
        Ok(record)
    }

    pub async fn list(&self) -> Result<Vec<UserPermission>, StoreError> {
        self.store.list().await
    }

    pub async fn stats(&self) -> Result<PermissionStats, StoreError> {
        let users = self.store.list().await?;
        Ok(PermissionStats::from_users(&users))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct MapStore(Mutex<BTreeMap<String, UserPermission>>);

    #[async_trait]
    impl PermissionStore for MapStore {
        async fn get(&self, user_id: &str) -> Result<Option<UserPermission>, StoreError> {
            Ok(self.0.lock().unwrap().get(user_id).cloned())
        }

        async fn upsert(&self, record: UserPermission) -> Result<(), StoreError> {
            self.0
                .lock()
                .unwrap()
                .insert(record.user_id.clone(), record);
            Ok(())
        }

        async fn list(&self) -> Result<Vec<UserPermission>, StoreError> {
            Ok(self.0.lock().unwrap().values().cloned().collect())
        }
    }

    const OPEN: GatePolicy = GatePolicy {
        enabled_for_chat: true,
        team_min_level: 0,
    };

    #[test]
    fn blacklist_beats_allow() {
        let mut user = UserPermission::new("u", "u");
        user.allow_tts = true;
        user.is_blacklisted = true;
        assert_eq!(evaluate(&user, OPEN), Err(DenyReason::Blacklisted));
    }

    #[test]
    fn allow_bypasses_policy() {
        let mut user = UserPermission::new("u", "u");
        user.allow_tts = true;
        let closed = GatePolicy {
            enabled_for_chat: false,
            team_min_level: 5,
        };
        assert_eq!(evaluate(&user, closed), Ok(()));
    }

    #[test]
    fn chat_disabled_requires_whitelist() {
        let user = UserPermission::new("u", "u");
        let closed = GatePolicy {
            enabled_for_chat: false,
            team_min_level: 0,
        };
        assert_eq!(evaluate(&user, closed), Err(DenyReason::NotWhitelisted));
    }

    #[test]
    fn team_level_requirement() {
        let mut user = UserPermission::new("u", "u");
        user.team_level = 1;
        let policy = GatePolicy {
            enabled_for_chat: true,
            team_min_level: 2,
        };
        assert_eq!(
            evaluate(&user, policy),
            Err(DenyReason::BelowTeamLevel {
                level: 1,
                required: 2
            })
        );
        user.team_level = 2;
        assert_eq!(evaluate(&user, policy), Ok(()));
    }

    #[tokio::test]
    async fn unknown_user_gets_default_record() {
        let gate = PermissionGate::new(Arc::new(MapStore::default()), OPEN);
        let decision = gate.check("new", "newbie").await.unwrap();
        assert!(matches!(decision, GateDecision::Allowed(ref r) if r.username == "newbie"));
    }

    #[tokio::test]
    async fn apply_persists_changes() {
        let gate = PermissionGate::new(Arc::new(MapStore::default()), OPEN);
        gate.apply("u1", "alice", &PermissionChange::Blacklist)
            .await
            .unwrap();

        let decision = gate.check("u1", "alice").await.unwrap();
        assert_eq!(decision, GateDecision::Denied(DenyReason::Blacklisted));

        let stats = gate.stats().await.unwrap();
        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.blacklisted, 1);
    }
}
