//! Queue population and the periodic rotation ticker.

use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::core::role::RotationPhase;
use crate::queue::QueueItem;
use crate::storage::records;
use crate::storage::wal::{self, LoadedWal};

/// Interval at which the queue is checked for due rotations.
pub const QUEUE_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Back-off applied to a role after a failed rotation attempt.
pub const ROTATION_BACKOFF: Duration = Duration::from_secs(10);

/// Lifecycle event emitted after a successful rotation.
pub const EVENT_ROTATE: &str = "rotate";

/// Lifecycle event emitted after a failed rotation attempt.
pub const EVENT_ROTATE_FAIL: &str = "rotate-fail";

/// Lifecycle event emitted when a dual-account grace window closes.
pub const EVENT_GRACE_PERIOD_END: &str = "dual-account-grace-period-end";

impl Backend {
    /// Load every static role into the rotation queue.
    ///
    /// Runs once at initialization, after leftover WAL entries have been
    /// pruned to at most one current entry per role. Roles with a live WAL
    /// are scheduled immediately so the interrupted rotation resumes on the
    /// first tick.
    pub(crate) async fn populate_queue(&self) {
        tracing::info!("populating role rotation queue");

        let mut wal_map = match self.load_rotation_wals().await {
            Ok(map) => map,
            Err(error) => {
                tracing::warn!(error = %error, "unable to load rotation WALs");
                HashMap::new()
            }
        };

        let role_names = match records::static_role_names(self.storage.as_ref()).await {
            Ok(names) => names,
            Err(error) => {
                tracing::error!(error = %error, "unable to list static roles");
                return;
            }
        };

        for role_name in role_names {
            let mut role = match self.static_role(&role_name).await {
                Ok(Some(role)) => role,
                Ok(None) => {
                    tracing::error!(role = %role_name, "role not found in storage");
                    continue;
                }
                Err(error) => {
                    tracing::error!(role = %role_name, error = %error, "unable to load role");
                    continue;
                }
            };

            // Roles written before next_vault_rotation existed carry no
            // deadline. Derive one and persist it: from the last rotation
            // when there was one, otherwise from now (skip_import roles
            // were stored with a zero last rotation).
            if role.next_vault_rotation.is_none() {
                tracing::debug!(role = %role_name, "next_vault_rotation is unset, backfilling");
                let from = role.last_vault_rotation.unwrap_or_else(Utc::now);
                role.set_next_vault_rotation(from);

                if let Err(error) =
                    records::store_static_role(self.storage.as_ref(), &role_name, &role).await
                {
                    tracing::warn!(role = %role_name, error = %error, "failed to persist backfilled rotation time");
                }
            }

            let mut item = QueueItem::new(
                role_name.clone(),
                role.next_vault_rotation
                    .map(|t| t.timestamp())
                    .unwrap_or_else(|| Utc::now().timestamp()),
            );

            // Dual-account roles parked in a grace window wake up when it
            // ends, not at the next rotation.
            if role.dual_account_mode && role.rotation_state == RotationPhase::GracePeriod {
                if let Some(end) = role.grace_period_end {
                    item.priority = end.timestamp();
                }
            }

            if let Some(wal_entry) = wal_map.remove(&role_name) {
                match wal_entry.entry.last_vault_rotation {
                    None => {
                        // A WAL without a rotation time can only come from a
                        // role that was never successfully created; it must
                        // be a hangover from an earlier attempt at this name.
                        tracing::debug!(wal_id = %wal_entry.id, "deleting WAL with zero last rotation time");
                        self.delete_wal_logged(&wal_entry.id).await;
                    }
                    Some(wal_rotation)
                        if role
                            .last_vault_rotation
                            .is_some_and(|role_rotation| wal_rotation < role_rotation) =>
                    {
                        // Older than the role's own data; the rotation it
                        // recorded already completed.
                        tracing::debug!(wal_id = %wal_entry.id, "deleting outdated WAL");
                        self.delete_wal_logged(&wal_entry.id).await;
                    }
                    Some(_) => {
                        tracing::info!(role = %role_name, wal_id = %wal_entry.id, "found WAL for role");
                        item.wal_id = Some(wal_entry.id);
                        item.priority = Utc::now().timestamp();
                    }
                }
            }

            self.push_item(item);
        }
    }

    /// Read all WAL entries of our kind and keep the newest per role,
    /// deleting duplicates and entries for roles that no longer exist.
    pub(crate) async fn load_rotation_wals(
        &self,
    ) -> crate::core::error::Result<HashMap<String, LoadedWal>> {
        let ids = wal::list_wal_ids(self.storage.as_ref()).await?;
        let mut wal_map: HashMap<String, LoadedWal> = HashMap::new();

        for id in ids {
            let loaded = match wal::find_rotation_wal(self.storage.as_ref(), &id).await {
                Ok(Some(loaded)) => loaded,
                Ok(None) => continue,
                Err(error) => {
                    tracing::error!(wal_id = %id, error = %error, "error loading static WAL");
                    continue;
                }
            };

            let role_name = loaded.entry.role_name.clone();
            match self.static_role(&role_name).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::debug!(wal_id = %loaded.id, "deleting WAL for missing role");
                    self.delete_wal_logged(&loaded.id).await;
                    continue;
                }
                Err(error) => {
                    tracing::warn!(role = %role_name, error = %error, "unable to read static role");
                    continue;
                }
            }

            if let Some(existing) = wal_map.get(&role_name) {
                if loaded.created_at > existing.created_at {
                    tracing::debug!(wal_id = %existing.id, "deleting stale loaded WAL");
                    self.delete_wal_logged(&existing.id).await;
                } else {
                    tracing::debug!(wal_id = %loaded.id, "deleting stale candidate WAL");
                    self.delete_wal_logged(&loaded.id).await;
                    continue;
                }
            }

            tracing::debug!(wal_id = %loaded.id, role = %role_name, "loaded WAL");
            wal_map.insert(role_name, loaded);
        }
        Ok(wal_map)
    }

    pub(crate) async fn delete_wal_logged(&self, id: &str) {
        if let Err(error) = wal::delete_wal(self.storage.as_ref(), id).await {
            tracing::warn!(wal_id = %id, error = %error, "unable to delete WAL");
        }
    }

    /// Periodic ticker driving automatic credential rotation.
    pub(crate) async fn run_ticker(&self, cancel: CancellationToken) {
        tracing::info!("starting periodic ticker");
        let mut tick = tokio::time::interval(QUEUE_TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; skip it so the first
        // pass over the queue happens one full interval after start.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.rotate_credentials(&cancel).await;
                }
                _ = cancel.cancelled() => {
                    tracing::info!("stopping periodic ticker");
                    return;
                }
            }
        }
    }

    /// Rotate every queued role that is due, most urgent first.
    pub(crate) async fn rotate_credentials(&self, cancel: &CancellationToken) {
        while self.rotate_next_credential(cancel).await {}
    }

    /// Run one drain of due queue items, exactly as a ticker firing would.
    pub async fn tick(&self) {
        let cancel = CancellationToken::new();
        self.rotate_credentials(&cancel).await;
    }

    /// Pop one item and process it. Returns false when the loop should
    /// stop for this tick: queue empty, front item not yet due, or
    /// cancellation.
    async fn rotate_next_credential(&self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        let Some(mut item) = self.pop_item() else {
            return false;
        };

        // Exclusive per-role lock: no writes may land while this role's
        // rotation is mid-flight.
        let lock = self.role_locks.lock_for(&item.key);
        let _guard = lock.lock().await;

        let mut role = match self.static_role(&item.key).await {
            Ok(Some(role)) => role,
            Ok(None) => {
                tracing::warn!(role = %item.key, "role not found, discarding queue item");
                return true;
            }
            Err(error) => {
                tracing::error!(role = %item.key, error = %error, "unable to load role");
                item.priority = (Utc::now() + chrono::Duration::from_std(ROTATION_BACKOFF).unwrap_or_else(|_| chrono::Duration::zero())).timestamp();
                self.push_item(item);
                return true;
            }
        };

        let now = Utc::now();
        if now.timestamp() < item.priority {
            // Not due yet; put it back and stop draining.
            self.push_item(item);
            return false;
        }

        // Dual-account grace-period bookkeeping happens on the ticker, not
        // in the rotation path: the role wakes up here when its window is
        // over.
        if role.dual_account_mode && role.rotation_state == RotationPhase::GracePeriod {
            return self.handle_grace_period(item, &mut role, now).await;
        }

        match self
            .set_static_account_password(&item.key, &mut role, item.wal_id.take())
            .await
        {
            Ok(rotation_time) => {
                item.wal_id = None;
                let rotation_time = rotation_time.unwrap_or(now);

                // Dual-account roles enter their grace window after a
                // standby rotation; wake up when it ends. Initial dual
                // setup and single accounts sleep until the next period.
                item.priority = if role.in_grace_period() {
                    role.grace_period_end
                        .map(|t| t.timestamp())
                        .unwrap_or_else(|| Utc::now().timestamp())
                } else {
                    (rotation_time
                        + chrono::Duration::from_std(role.rotation_period).unwrap_or_else(|_| chrono::Duration::zero()))
                    .timestamp()
                };
                self.push_item(item.clone());

                tracing::info!(role = %item.key, "successfully rotated in periodic function");
                self.events.emit(EVENT_ROTATE, &item.key, true);
                true
            }
            Err(attempt) => {
                tracing::error!(role = %item.key, error = %attempt.error, "unable to rotate credentials in periodic function");
                self.events.emit(EVENT_ROTATE_FAIL, &item.key, false);

                // Push far enough out that the next tick will not retry
                // immediately.
                item.priority = (now
                    + chrono::Duration::from_std(ROTATION_BACKOFF).unwrap_or_else(|_| chrono::Duration::zero()))
                .timestamp();
                item.wal_id = attempt.wal_id;
                self.push_item(item);
                true
            }
        }
    }

    /// Close an expired grace window, or re-queue the role for when it
    /// expires.
    async fn handle_grace_period(
        &self,
        mut item: QueueItem,
        role: &mut crate::core::role::StaticRole,
        now: chrono::DateTime<Utc>,
    ) -> bool {
        let end = match role.grace_period_end {
            Some(end) => end,
            None => {
                // Repair a missing deadline from the last rotation.
                tracing::error!(role = %item.key, "grace period end time is unset, recomputing from last rotation");
                let last = role.last_vault_rotation.unwrap_or(now);
                let end = last
                    + chrono::Duration::from_std(role.grace_period.unwrap_or_default())
                        .unwrap_or_else(|_| chrono::Duration::zero());
                role.grace_period_end = Some(end);
                end
            }
        };

        if now >= end {
            tracing::info!(
                role = %item.key,
                active_account = %role.active_account,
                "grace period expired, transitioning to active state"
            );
            role.rotation_state = RotationPhase::Active;
            role.grace_period_end = None;

            if let Err(error) =
                records::store_static_role(self.storage.as_ref(), &item.key, role).await
            {
                tracing::error!(role = %item.key, error = %error, "unable to persist grace period transition");
                item.priority = (now
                    + chrono::Duration::from_std(ROTATION_BACKOFF).unwrap_or_else(|_| chrono::Duration::zero()))
                .timestamp();
                self.push_item(item);
                return true;
            }

            item.priority = role
                .next_vault_rotation
                .map(|t| t.timestamp())
                .unwrap_or_else(|| now.timestamp());
            item.wal_id = None;
            self.push_item(item.clone());

            tracing::info!(role = %item.key, "successfully transitioned from grace period to active");
            self.events.emit(EVENT_GRACE_PERIOD_END, &item.key, true);
            return true;
        }

        // Window still open; wake up when it closes.
        item.priority = end.timestamp();
        self.push_item(item);
        false
    }
}
