//! `rotate-root` and `rotate-role/<name>` paths: manual rotations.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::core::error::{EngineError, Result};
use crate::paths::{Operation, Request, Response};
use crate::queue::QueueItem;
use crate::rotation::engine::ROTATION_BACKOFF;

impl Backend {
    pub(crate) async fn handle_rotate_root(&self, req: Request) -> Result<Response> {
        match req.operation {
            Operation::Create | Operation::Update => {
                // Manual requests carry no cancellation signal of their own;
                // the rollback loop still wants one for shutdown.
                let cancel = CancellationToken::new();
                self.rotate_root_credentials(&cancel).await?;
                Ok(Response::empty())
            }
            _ => Err(EngineError::validation(
                "rotate-root only supports create and update",
            )),
        }
    }

    /// Rotate one static role's credentials on demand.
    ///
    /// The rotation itself is synchronous, but a failure is not surfaced as
    /// a request error: the role is re-queued with back-off (keeping any
    /// WAL for roll-forward) and the ticker retries, exactly as if the
    /// periodic rotation had failed.
    pub(crate) async fn handle_rotate_role(
        &self,
        operation: Operation,
        name: &str,
    ) -> Result<Response> {
        if !matches!(operation, Operation::Create | Operation::Update) {
            return Err(EngineError::validation(
                "rotate-role only supports create and update",
            ));
        }
        if name.is_empty() {
            return Err(EngineError::validation("empty role name attribute given"));
        }

        let lock = self.role_locks.lock_for(name);
        let _guard = lock.lock().await;

        let Some(mut role) = self.static_role(name).await? else {
            return Err(EngineError::validation("no static role found for role name"));
        };

        let mut item = self
            .pop_item_by_key(name)
            .unwrap_or_else(|| QueueItem::new(name, 0));

        match self
            .set_static_account_password(name, &mut role, item.wal_id.take())
            .await
        {
            Ok(rotation_time) => {
                item.wal_id = None;
                item.priority = if role.in_grace_period() {
                    role.grace_period_end
                        .map(|t| t.timestamp())
                        .unwrap_or_else(|| Utc::now().timestamp())
                } else {
                    let rotated = rotation_time.unwrap_or_else(Utc::now);
                    (rotated + chrono::Duration::from_std(role.rotation_period).unwrap_or_else(|_| chrono::Duration::zero()))
                        .timestamp()
                };
            }
            Err(failure) => {
                tracing::warn!(role = %name, error = %failure.error, "unable to rotate credentials in rotate-role");
                item.priority = (Utc::now()
                    + chrono::Duration::from_std(ROTATION_BACKOFF).unwrap_or_else(|_| chrono::Duration::zero()))
                .timestamp();
                item.wal_id = failure.wal_id;
            }
        }

        self.push_item(item);
        Ok(Response::empty())
    }
}
