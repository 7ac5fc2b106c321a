//! The engine backend: shared state behind every request handler and the
//! rotation ticker.

use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

use dirvault_directory::DirectoryClient;

use crate::core::error::Result;
use crate::core::role::StaticRole;
use crate::host::{EventSink, StorageBackend, SystemView};
use crate::locks::LockTable;
use crate::queue::{QueueItem, RotationQueue};
use crate::registry::ManagedUserRegistry;
use crate::rotation::root::RollbackPolicy;
use crate::storage::records;

/// The secrets engine.
///
/// One instance exists per mount. The queue handle is optional: only the
/// active rotator instance (primary or local mount) carries a queue and a
/// ticker; standbys serve reads and forward writes.
pub struct Backend {
    pub(crate) storage: Arc<dyn StorageBackend>,
    pub(crate) client: Arc<dyn DirectoryClient>,
    pub(crate) system: Arc<dyn SystemView>,
    pub(crate) events: Arc<dyn EventSink>,

    pub(crate) queue: RwLock<Option<Arc<RotationQueue>>>,
    pub(crate) role_locks: LockTable,
    pub(crate) managed_users: ManagedUserRegistry,

    /// Serializes root-credential rotation and configuration swaps.
    pub(crate) config_lock: tokio::sync::Mutex<()>,

    /// Cancels the background ticker.
    pub(crate) ticker_cancel: Mutex<Option<CancellationToken>>,

    /// Backoff applied when rolling back a failed root rotation.
    pub(crate) rollback_policy: Mutex<RollbackPolicy>,

    /// Handle on our own allocation, for spawning the ticker task.
    weak_self: Weak<Backend>,
}

impl Backend {
    /// Build a backend over the host's ports.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        client: Arc<dyn DirectoryClient>,
        system: Arc<dyn SystemView>,
        events: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            storage,
            client,
            system,
            events,
            queue: RwLock::new(None),
            role_locks: LockTable::new(),
            managed_users: ManagedUserRegistry::new(),
            config_lock: tokio::sync::Mutex::new(()),
            ticker_cancel: Mutex::new(None),
            rollback_policy: Mutex::new(RollbackPolicy::default()),
            weak_self: weak.clone(),
        })
    }

    /// Replace the rollback backoff policy.
    pub fn set_rollback_policy(&self, policy: RollbackPolicy) {
        *self.rollback_policy.lock() = policy;
    }

    /// Initialize the engine after mount.
    ///
    /// Rebuilds the managed-username registry from storage; on the active
    /// rotator instance this also processes leftover WAL entries, populates
    /// the rotation queue and spawns the ticker.
    pub async fn initialize(&self) -> Result<()> {
        self.rebuild_managed_users().await?;

        if !self.system.active_rotator() {
            tracing::info!("not the active rotator, skipping rotation queue setup");
            return Ok(());
        }

        let queue = Arc::new(RotationQueue::new());
        *self.queue.write() = Some(queue);

        self.populate_queue().await;

        let cancel = CancellationToken::new();
        *self.ticker_cancel.lock() = Some(cancel.clone());
        if let Some(backend) = self.weak_self.upgrade() {
            tokio::spawn(async move {
                backend.run_ticker(cancel).await;
            });
        }
        Ok(())
    }

    /// Stop the ticker and drop the queue. In-flight rotation work finishes
    /// its current step; any WAL it leaves behind is recovered on the next
    /// [`Backend::initialize`].
    pub fn shutdown(&self) {
        if let Some(cancel) = self.ticker_cancel.lock().take() {
            cancel.cancel();
        }
        *self.queue.write() = None;
    }

    /// Rebuild the managed-username registry with a full pass over the role
    /// and library stores.
    pub(crate) async fn rebuild_managed_users(&self) -> Result<()> {
        let mut usernames: Vec<String> = Vec::new();

        for name in records::static_role_names(self.storage.as_ref()).await? {
            if let Some(role) = records::load_static_role(self.storage.as_ref(), &name).await? {
                usernames.extend(role.usernames().into_iter().map(String::from));
            }
        }
        for name in records::library_set_names(self.storage.as_ref()).await? {
            if let Some(set) = records::load_library_set(self.storage.as_ref(), &name).await? {
                usernames.extend(set.service_account_names.iter().cloned());
            }
        }

        self.managed_users.replace_all(usernames);
        Ok(())
    }

    /// Load a static role by name.
    pub(crate) async fn static_role(&self, name: &str) -> Result<Option<StaticRole>> {
        records::load_static_role(self.storage.as_ref(), name).await
    }

    /// Push an item onto the rotation queue, if one exists. The queue is
    /// absent on standby instances and after shutdown; pushes there are
    /// dropped.
    pub(crate) fn push_item(&self, item: QueueItem) {
        match self.queue.read().as_ref() {
            Some(queue) => queue.push(item),
            None => tracing::warn!("no queue found during push item"),
        }
    }

    /// Pop the most urgent item from the rotation queue.
    pub(crate) fn pop_item(&self) -> Option<QueueItem> {
        self.queue.read().as_ref()?.pop()
    }

    /// Remove a specific role's item from the rotation queue.
    pub(crate) fn pop_item_by_key(&self, key: &str) -> Option<QueueItem> {
        self.queue.read().as_ref()?.pop_by_key(key)
    }

    /// Queue length; test and introspection helper.
    pub fn queue_len(&self) -> usize {
        self.queue.read().as_ref().map_or(0, |queue| queue.len())
    }

    /// Scheduled deadline for the most urgent queued role.
    pub fn next_due_at(&self) -> Option<i64> {
        self.queue.read().as_ref()?.peek_priority()
    }

    /// Sorted snapshot of the managed-username registry.
    pub fn managed_user_snapshot(&self) -> Vec<String> {
        self.managed_users.snapshot()
    }

    /// Whether a username is currently owned by a role or library set.
    pub fn is_managed_user(&self, username: &str) -> bool {
        self.managed_users.is_managed(username)
    }
}
