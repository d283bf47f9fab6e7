//! Poll job definitions. One recurring job per (user, request, pin).

use chrono::{DateTime, Utc};
use enrollbot_core::types::UserId;

use crate::cron::CronTrigger;

/// Deterministic job id for a (user, request number, PIN) triple.
///
/// Never stored as the source of truth: deletion recomputes it from the
/// tracking mapping, so the format must stay stable across releases.
pub fn job_id(user: UserId, request_number: &str, pin_code: &str) -> String {
    format!("{user}_{request_number}_{pin_code}_parse_job")
}

/// A recurring status poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollJob {
    /// See [`job_id`].
    pub id: String,
    pub user_id: UserId,
    pub request_number: String,
    pub pin_code: String,
    /// Cron expression the job fires on (UTC).
    pub cron: String,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u32,
}

impl PollJob {
    pub fn new(user_id: UserId, request_number: &str, pin_code: &str, trigger: &CronTrigger) -> Self {
        let now = Utc::now();
        Self {
            id: job_id(user_id, request_number, pin_code),
            user_id,
            request_number: request_number.to_string(),
            pin_code: pin_code.to_string(),
            cron: trigger.expression().to_string(),
            created_at: now,
            last_run: None,
            next_run: trigger.next_after(now),
            run_count: 0,
        }
    }

    /// Due at `now`?
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run.is_some_and(|next| now >= next)
    }
}
