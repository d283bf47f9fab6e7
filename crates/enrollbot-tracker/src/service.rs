//! Registration and tracking: the control plane behind the chat commands.

use std::collections::HashMap;
use std::sync::Arc;

use enrollbot_core::error::Result;
use enrollbot_core::traits::StateStore;
use enrollbot_core::types::{PollMode, TrackedRequest, TrackingMap, UserId};
use enrollbot_scheduler::{CronTrigger, PollJob, SchedulerEngine, job_id};
use tokio::sync::Mutex;

use crate::poll::{PollOutcome, PollTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// The request number is already tracked; nothing changed.
    AlreadyRegistered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Whether the request number was tracked.
    pub removed: bool,
    /// The user's mapping after the call.
    pub remaining: TrackingMap,
}

/// Serializes read-modify-write of one user's mapping.
#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    async fn get(&self, user: UserId) -> Arc<Mutex<()>> {
        self.locks.lock().await.entry(user).or_default().clone()
    }
}

pub struct TrackingService {
    store: Arc<dyn StateStore>,
    scheduler: Arc<Mutex<SchedulerEngine>>,
    poll: Arc<PollTask>,
    trigger: CronTrigger,
    locks: UserLocks,
}

impl TrackingService {
    pub fn new(
        store: Arc<dyn StateStore>,
        scheduler: Arc<Mutex<SchedulerEngine>>,
        poll: Arc<PollTask>,
        trigger: CronTrigger,
    ) -> Self {
        Self {
            store,
            scheduler,
            poll,
            trigger,
            locks: UserLocks::default(),
        }
    }

    /// Start watching a request. Creates the poll job unless one with the
    /// same id already exists.
    pub async fn register(
        &self,
        user: UserId,
        request_number: &str,
        pin_code: &str,
    ) -> Result<RegisterOutcome> {
        let lock = self.locks.get(user).await;
        let _guard = lock.lock().await;

        let mut tracking = self.store.get_tracking(user).await?;
        if tracking.contains(request_number) {
            tracing::debug!(user, request_number, "already registered");
            return Ok(RegisterOutcome::AlreadyRegistered);
        }

        let id = job_id(user, request_number, pin_code);
        let created = {
            let mut scheduler = self.scheduler.lock().await;
            if scheduler.has_job(&id) {
                false
            } else {
                scheduler.add_job(PollJob::new(user, request_number, pin_code, &self.trigger))?
            }
        };

        tracking.insert(request_number, pin_code);
        if let Err(e) = self.store.set_tracking(user, &tracking).await {
            if created {
                if let Err(rollback) = self.scheduler.lock().await.remove_job(&id) {
                    tracing::error!("failed to roll back job '{id}': {rollback}");
                }
            }
            return Err(e);
        }

        tracing::info!(user, request_number, "request registered");
        Ok(RegisterOutcome::Registered)
    }

    /// Tracked requests in registration order.
    pub async fn list(&self, user: UserId) -> Result<Vec<TrackedRequest>> {
        let tracking = self.store.get_tracking(user).await?;
        Ok(tracking.iter().cloned().collect())
    }

    /// Stop watching a request. Unknown request numbers are a no-op.
    pub async fn delete(&self, user: UserId, request_number: &str) -> Result<DeleteOutcome> {
        let lock = self.locks.get(user).await;
        let _guard = lock.lock().await;

        let mut tracking = self.store.get_tracking(user).await?;
        let Some(entry) = tracking.remove(request_number) else {
            return Ok(DeleteOutcome {
                removed: false,
                remaining: tracking,
            });
        };

        let id = job_id(user, &entry.request_number, &entry.pin_code);
        let removed_job = {
            let mut scheduler = self.scheduler.lock().await;
            let job = scheduler.get_job(&id).cloned();
            if !scheduler.remove_job(&id)? {
                tracing::debug!("job '{id}' was already gone");
            }
            job
        };

        if let Err(e) = self.store.set_tracking(user, &tracking).await {
            // Still tracked, so it must keep polling.
            if let Some(job) = removed_job {
                if let Err(rollback) = self.scheduler.lock().await.add_job(job) {
                    tracing::error!("failed to restore job '{id}': {rollback}");
                }
            }
            return Err(e);
        }
        self.store.clear_last_check(user, request_number).await?;

        tracing::info!(user, request_number, "request deleted");
        Ok(DeleteOutcome {
            removed: true,
            remaining: tracking,
        })
    }

    /// Check a request right now. Always reports; never touches stored state.
    pub async fn manual_check(
        &self,
        user: UserId,
        request_number: &str,
        pin_code: &str,
    ) -> PollOutcome {
        self.poll
            .poll(user, request_number, pin_code, PollMode::Manual)
            .await
    }
}
