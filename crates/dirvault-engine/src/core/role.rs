//! Static role records and the dual-account rotation state machine.

use chrono::{DateTime, Utc};
use dirvault_directory::SecureString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::error::{EngineError, Result};
use crate::core::time::{duration_seconds, option_duration_seconds};

/// Shortest rotation period the engine accepts.
pub const MINIMUM_ROTATION_PERIOD: Duration = Duration::from_secs(5);

/// Shortest grace period a dual-account role may configure.
pub const MINIMUM_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Which sibling account currently serves credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveAccount {
    #[default]
    A,
    B,
}

impl ActiveAccount {
    /// The standby side.
    pub fn other(&self) -> ActiveAccount {
        match self {
            ActiveAccount::A => ActiveAccount::B,
            ActiveAccount::B => ActiveAccount::A,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActiveAccount::A => "a",
            ActiveAccount::B => "b",
        }
    }
}

impl std::fmt::Display for ActiveAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage form of the rotation phase. Persisted separately from the grace
/// deadline so records written before the dual-account feature decode
/// unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPhase {
    #[default]
    Active,
    GracePeriod,
}

impl RotationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationPhase::Active => "active",
            RotationPhase::GracePeriod => "grace_period",
        }
    }
}

/// The dual-account rotation state machine.
///
/// `Active → GracePeriod` on a successful standby rotation (flipping the
/// active account); `GracePeriod → Active` once `end_at` passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    /// One account is active, the other standby.
    Active,

    /// Both accounts' credentials are served until `end_at`.
    GracePeriod { end_at: DateTime<Utc> },
}

/// A static role: one managed service account, or a dual-account pair.
///
/// Identity fields (`username`, `dn`, `username_b`, `dn_b`,
/// `dual_account_mode`, `skip_import_rotation`) are immutable after create;
/// `rotation_period` and `grace_period` may be updated. Everything else is
/// derived by the rotation engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticRole {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub dn: String,

    #[serde(default, with = "duration_seconds")]
    pub rotation_period: Duration,

    #[serde(default)]
    pub password: SecureString,

    #[serde(default)]
    pub last_password: SecureString,

    /// When the engine last rotated this role; `None` until first rotation.
    #[serde(default)]
    pub last_vault_rotation: Option<DateTime<Utc>>,

    /// When the next periodic rotation is due. Backfilled at engine
    /// initialization for records written before this field existed.
    #[serde(default)]
    pub next_vault_rotation: Option<DateTime<Utc>>,

    #[serde(default)]
    pub skip_import_rotation: bool,

    // Dual-account fields.
    #[serde(default)]
    pub dual_account_mode: bool,

    #[serde(default)]
    pub username_b: String,

    #[serde(default)]
    pub dn_b: String,

    #[serde(default)]
    pub password_b: SecureString,

    #[serde(default)]
    pub last_password_b: SecureString,

    #[serde(default)]
    pub last_rotation_b: Option<DateTime<Utc>>,

    #[serde(default, with = "option_duration_seconds")]
    pub grace_period: Option<Duration>,

    #[serde(default)]
    pub active_account: ActiveAccount,

    #[serde(default)]
    pub rotation_state: RotationPhase,

    #[serde(default)]
    pub grace_period_end: Option<DateTime<Utc>>,
}

impl StaticRole {
    /// Validate the role's configuration invariants.
    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            return Err(EngineError::validation("username is required"));
        }
        if self.rotation_period < MINIMUM_ROTATION_PERIOD {
            return Err(EngineError::validation(
                "rotation_period must be 5 seconds or more",
            ));
        }

        if !self.dual_account_mode {
            return Ok(());
        }

        if self.username_b.is_empty() {
            return Err(EngineError::validation(
                "username_b is required for dual-account roles and must not be empty",
            ));
        }
        if self.username_b == self.username {
            return Err(EngineError::validation(
                "username_b must be different from username",
            ));
        }
        let grace = self.grace_period.ok_or_else(|| {
            EngineError::validation("grace_period is required for dual-account roles")
        })?;
        if grace < MINIMUM_GRACE_PERIOD {
            return Err(EngineError::validation(
                "grace_period must be 5 seconds or more",
            ));
        }
        if grace >= self.rotation_period {
            return Err(EngineError::validation(
                "grace_period must be less than rotation_period",
            ));
        }
        Ok(())
    }

    /// Schedule the next periodic rotation relative to `from`.
    pub fn set_next_vault_rotation(&mut self, from: DateTime<Utc>) {
        self.next_vault_rotation =
            Some(from + chrono::Duration::from_std(self.rotation_period).unwrap_or_else(|_| chrono::Duration::zero()));
    }

    /// The current state machine position.
    pub fn rotation_state(&self) -> RotationState {
        match self.rotation_state {
            RotationPhase::Active => RotationState::Active,
            RotationPhase::GracePeriod => {
                // A missing deadline is recomputed from the last rotation;
                // the ticker persists the repair.
                let end_at = self.grace_period_end.unwrap_or_else(|| {
                    let last = self.last_vault_rotation.unwrap_or_else(Utc::now);
                    last + chrono::Duration::from_std(self.grace_period.unwrap_or_default())
                        .unwrap_or_else(|_| chrono::Duration::zero())
                });
                RotationState::GracePeriod { end_at }
            }
        }
    }

    /// True while a dual-account role is inside its grace window.
    pub fn in_grace_period(&self) -> bool {
        self.dual_account_mode && self.rotation_state == RotationPhase::GracePeriod
    }

    /// Every username this role owns.
    pub fn usernames(&self) -> Vec<&str> {
        let mut names = vec![self.username.as_str()];
        if self.dual_account_mode && !self.username_b.is_empty() {
            names.push(self.username_b.as_str());
        }
        names
    }

    /// The standby side's `(dn, username)` for the next dual rotation.
    pub fn standby_identity(&self) -> (&str, &str) {
        match self.active_account {
            ActiveAccount::A => (self.dn_b.as_str(), self.username_b.as_str()),
            ActiveAccount::B => (self.dn.as_str(), self.username.as_str()),
        }
    }

    /// Time until the next rotation, floored at zero. This is the TTL
    /// reported with served credentials.
    pub fn password_ttl(&self, now: DateTime<Utc>) -> Duration {
        match self.next_vault_rotation {
            Some(next) if next > now => (next - now).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }
}
