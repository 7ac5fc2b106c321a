//! Root bind-credential rotation and rollback.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use dirvault_directory::SecureString;

use crate::backend::Backend;
use crate::core::config::EngineConfig;
use crate::core::error::{EngineError, Result};
use crate::password::generate_formatted_password;
use crate::storage::records;

/// Exponential backoff policy for rolling back a failed root rotation.
///
/// Active Directory may still be propagating the previous change when the
/// rollback starts, so early attempts are expected to fail.
#[derive(Debug, Clone)]
pub struct RollbackPolicy {
    /// Attempts before giving up.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub min_delay: Duration,

    /// Cap on the exponentially growing delay.
    pub max_delay: Duration,

    /// Growth factor between attempts.
    pub multiplier: f64,
}

impl Default for RollbackPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RollbackPolicy {
    /// Delay before the given 0-based attempt, bounded by `[min, max]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exact = self.min_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(exact.min(self.max_delay.as_secs_f64()))
    }
}

impl Backend {
    /// Rotate the bind credentials the engine itself uses.
    ///
    /// The new password goes to the directory first; only then is the
    /// configuration persisted. When persistence fails the engine cannot be
    /// left holding a password it does not know, so the directory is rolled
    /// back to the old password with bounded retries. A rollback failure is
    /// fatal and tells the operator how to recover.
    pub async fn rotate_root_credentials(&self, cancel: &CancellationToken) -> Result<()> {
        let mut config = records::read_config(self.storage.as_ref())
            .await?
            .ok_or_else(|| EngineError::validation("the config is currently unset"))?;

        let new_password = if let Some(policy) = &config.password_policy {
            self.system.generate_password_from_policy(policy).await?
        } else {
            generate_formatted_password(&config.formatter, config.length)?
        };
        let old_password = config.directory.bindpass.clone();

        // Exclusive: nothing else may use or swap the bind identity while
        // it changes underneath.
        let _guard = self.config_lock.lock().await;

        self.client
            .update_dn_password(&config.directory, &config.directory.binddn, &new_password)
            .await?;

        config.directory.bindpass = SecureString::new(new_password);
        config.last_bind_password = Some(old_password.clone());
        config.last_bind_password_rotation = Some(chrono::Utc::now());

        if let Err(storing_error) = records::write_config(self.storage.as_ref(), &config).await {
            // The directory has the new password but the engine could not
            // record it. Roll the directory back to the old password; that
            // is the only credential still known after a restart.
            tracing::error!(error = %storing_error, "unable to store new bind password, rolling back");
            if let Err(rollback_error) = self
                .roll_back_password(&config, old_password.expose(), cancel)
                .await
            {
                return Err(EngineError::fatal(format!(
                    "unable to store new password due to {storing_error} and unable to return to \
                     previous password due to {rollback_error}, configure a new binddn and \
                     bindpass to restore directory function"
                )));
            }
            return Err(EngineError::storage(
                "config",
                format!("unable to update password due to storage err: {storing_error}"),
            ));
        }

        tracing::info!("rotated bind credentials");
        Ok(())
    }

    /// Re-issue the old bind password with exponential backoff.
    pub(crate) async fn roll_back_password(
        &self,
        config: &EngineConfig,
        old_password: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let policy = self.rollback_policy.lock().clone();
        let mut last_error: Option<EngineError> = None;

        for attempt in 0..policy.max_attempts {
            let delay = policy.delay_for(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(EngineError::cancelled(
                        "unable to roll back password because enclosing environment is shutting down",
                    ));
                }
            }

            match self
                .client
                .update_dn_password(&config.directory, &config.directory.binddn, old_password)
                .await
            {
                Ok(()) => return Ok(()),
                Err(error) => {
                    tracing::warn!(attempt, error = %error, "rollback attempt failed");
                    last_error = Some(error.into());
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| EngineError::fatal("rollback failed without attempting")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_exponentially_within_bounds() {
        let policy = RollbackPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
        // Capped at max_delay.
        assert_eq!(policy.delay_for(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for(9), Duration::from_secs(30));
    }

    #[test]
    fn test_custom_policy_bounds() {
        let policy = RollbackPolicy {
            max_attempts: 3,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(250));
    }
}
