//! Poll task: fetch the status, compare with the last reported one, notify.

use std::sync::Arc;

use async_trait::async_trait;
use enrollbot_core::error::ScrapeError;
use enrollbot_core::traits::{Notifier, StateStore, StatusScraper};
use enrollbot_core::types::{PollMode, UserId};
use enrollbot_scheduler::{JobRunner, PollJob};

use crate::messages;

/// What a single poll invocation ended with. Informational only: every
/// failure has already been turned into (at most) one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The status text was sent to the user.
    Reported(String),
    /// Sending the status text failed; the cache was left as it was.
    Undelivered(String),
    /// Same status as last reported; nothing sent.
    Unchanged,
    /// The scrape failed and the generic failure message was sent.
    Failed(ScrapeError),
    /// The last-check cache could not be read or written; nothing sent.
    StoreUnavailable,
}

/// The unit of work behind every poll job and every `/check`.
pub struct PollTask {
    scraper: Arc<dyn StatusScraper>,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
}

impl PollTask {
    pub fn new(
        scraper: Arc<dyn StatusScraper>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            scraper,
            store,
            notifier,
        }
    }

    /// Run one check. Never returns an error and sends at most one message.
    pub async fn poll(
        &self,
        user: UserId,
        request_number: &str,
        pin_code: &str,
        mode: PollMode,
    ) -> PollOutcome {
        let result = match self.scraper.check_status(request_number, pin_code).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(user, request_number, ?mode, "status check failed: {e}");
                self.deliver(user, messages::SCRAPE_FAILED).await;
                return PollOutcome::Failed(e);
            }
        };

        match mode {
            PollMode::Manual => self.report(user, result).await,
            PollMode::Scheduled => self.report_if_changed(user, request_number, result).await,
        }
    }

    async fn report(&self, user: UserId, result: String) -> PollOutcome {
        if self.deliver(user, &result).await {
            PollOutcome::Reported(result)
        } else {
            PollOutcome::Undelivered(result)
        }
    }

    async fn report_if_changed(
        &self,
        user: UserId,
        request_number: &str,
        result: String,
    ) -> PollOutcome {
        let previous = match self.store.get_last_check(user, request_number).await {
            Ok(previous) => previous,
            Err(e) => {
                tracing::error!(user, request_number, "last check unavailable: {e}");
                return PollOutcome::StoreUnavailable;
            }
        };
        if previous.as_deref() == Some(result.as_str()) {
            tracing::debug!(user, request_number, "status unchanged");
            return PollOutcome::Unchanged;
        }

        let outcome = self.report(user, result).await;
        if let PollOutcome::Reported(result) = &outcome {
            if let Err(e) = self.store.set_last_check(user, request_number, result).await {
                tracing::error!(user, request_number, "failed to save last check: {e}");
            }
        }
        outcome
    }

    async fn deliver(&self, user: UserId, text: &str) -> bool {
        match self.notifier.send(user, text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(user, "notification failed: {e}");
                false
            }
        }
    }
}

#[async_trait]
impl JobRunner for PollTask {
    async fn run(&self, job: &PollJob) {
        let outcome = self
            .poll(
                job.user_id,
                &job.request_number,
                &job.pin_code,
                PollMode::Scheduled,
            )
            .await;
        tracing::info!("📣 Job '{}' finished: {:?}", job.id, outcome);
    }
}
