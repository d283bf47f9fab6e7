//! Scheduler engine: owns the poll jobs and decides which ones fire.
//! The loop in [`spawn_scheduler`] ticks on a tokio interval and hands due
//! jobs to a [`JobRunner`]; at most one run per job id is ever in flight.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use enrollbot_core::error::Result;
use futures::FutureExt;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;

use crate::cron::CronTrigger;
use crate::jobs::PollJob;
use crate::persistence::SchedulerDb;

/// Work performed when a job fires. Must not fail: errors are the runner's
/// to report.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &PollJob);
}

/// Manages poll jobs and claims due ones.
pub struct SchedulerEngine {
    jobs: Vec<PollJob>,
    db: SchedulerDb,
    in_flight: HashSet<String>,
}

impl SchedulerEngine {
    /// Load the persisted job set. Firings missed while the process was down
    /// are dropped; each job resumes at its next future firing.
    pub fn new(db: SchedulerDb) -> Result<Self> {
        let jobs = db.load_jobs()?;
        let mut engine = Self {
            jobs,
            db,
            in_flight: HashSet::new(),
        };
        engine.reschedule_missed(Utc::now());
        tracing::info!("📅 Scheduler loaded {} job(s)", engine.jobs.len());
        Ok(engine)
    }

    fn reschedule_missed(&mut self, now: DateTime<Utc>) {
        let mut changed = Vec::new();
        for job in self.jobs.iter_mut() {
            if job.next_run.is_some_and(|next| next > now) {
                continue;
            }
            let trigger = match CronTrigger::parse(&job.cron) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!("⚠️ Job '{}' left unscheduled: {e}", job.id);
                    job.next_run = None;
                    continue;
                }
            };
            if job.next_run.is_some() {
                tracing::info!("⏭️ Skipping missed firing of '{}'", job.id);
            }
            job.next_run = trigger.next_after(now);
            changed.push(job.id.clone());
        }
        self.save(&changed);
    }

    /// Whether a job with this id is scheduled.
    pub fn has_job(&self, id: &str) -> bool {
        self.jobs.iter().any(|j| j.id == id)
    }

    pub fn get_job(&self, id: &str) -> Option<&PollJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Add a job. Returns `false` (and changes nothing) if the id exists.
    pub fn add_job(&mut self, job: PollJob) -> Result<bool> {
        if self.has_job(&job.id) {
            tracing::debug!("📅 Job '{}' already scheduled", job.id);
            return Ok(false);
        }
        self.db.save_job(&job)?;
        tracing::info!(
            "📅 Job added: '{}' ({}), next run {}",
            job.id,
            job.cron,
            job.next_run
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".into())
        );
        self.jobs.push(job);
        Ok(true)
    }

    /// Remove a job by id. Returns `false` if it was not scheduled.
    /// A run already in flight is allowed to finish.
    pub fn remove_job(&mut self, id: &str) -> Result<bool> {
        let stored = self.db.delete_job(id)?;
        let len = self.jobs.len();
        self.jobs.retain(|j| j.id != id);
        let removed = stored || self.jobs.len() < len;
        if removed {
            tracing::info!("🗑️ Job removed: '{id}'");
        }
        Ok(removed)
    }

    pub fn list_jobs(&self) -> &[PollJob] {
        &self.jobs
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Claim every job due at `now`, advance its next run, and mark it in
    /// flight. A due job whose previous run is still in flight is skipped
    /// for this firing.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<PollJob> {
        let mut claimed = Vec::new();
        let mut changed = Vec::new();

        for job in self.jobs.iter_mut() {
            if !job.is_due(now) {
                continue;
            }
            job.next_run = CronTrigger::parse(&job.cron)
                .ok()
                .and_then(|t| t.next_after(now));
            changed.push(job.id.clone());

            if !self.in_flight.insert(job.id.clone()) {
                tracing::warn!("⏭️ Job '{}' still running, firing skipped", job.id);
                continue;
            }
            job.last_run = Some(now);
            job.run_count += 1;
            tracing::info!("🔔 Job fired: '{}' (run #{})", job.id, job.run_count);
            claimed.push(job.clone());
        }

        self.save(&changed);
        claimed
    }

    /// Release the in-flight slot of a finished run.
    pub fn finish(&mut self, id: &str) {
        self.in_flight.remove(id);
    }

    fn save(&mut self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        let jobs: Vec<&PollJob> = self
            .jobs
            .iter()
            .filter(|j| ids.contains(&j.id))
            .collect();
        if let Err(e) = self.db.save_jobs(&jobs) {
            tracing::warn!("⚠️ Failed to save job state: {e}");
        }
    }
}

/// Run the scheduler loop until `shutdown` flips to `true`.
/// On shutdown no new firings start; runs already in flight are awaited.
pub async fn spawn_scheduler(
    engine: Arc<Mutex<SchedulerEngine>>,
    runner: Arc<dyn JobRunner>,
    check_interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("⏰ Scheduler started (check every {}s)", check_interval_secs);

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(check_interval_secs));
    let mut running = JoinSet::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        while running.try_join_next().is_some() {}

        let due = engine.lock().await.take_due(Utc::now());
        for job in due {
            let engine = engine.clone();
            let runner = runner.clone();
            running.spawn(async move {
                if AssertUnwindSafe(runner.run(&job)).catch_unwind().await.is_err() {
                    tracing::error!("💥 Job '{}' panicked", job.id);
                }
                engine.lock().await.finish(&job.id);
            });
        }
    }

    if !running.is_empty() {
        tracing::info!("⏳ Waiting for {} running job(s)", running.len());
    }
    while running.join_next().await.is_some() {}
    tracing::info!("⏰ Scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn engine() -> SchedulerEngine {
        SchedulerEngine::new(SchedulerDb::open_in_memory().unwrap()).unwrap()
    }

    fn job(user: i64, request: &str, pin: &str) -> PollJob {
        PollJob::new(user, request, pin, &CronTrigger::daily_at(18, 0).unwrap())
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut engine = engine();
        assert!(engine.add_job(job(1, "1111/0000", "123456")).unwrap());
        assert!(!engine.add_job(job(1, "1111/0000", "123456")).unwrap());
        assert_eq!(engine.job_count(), 1);
        assert!(engine.has_job("1_1111/0000_123456_parse_job"));
    }

    #[test]
    fn test_remove_missing_job() {
        let mut engine = engine();
        assert!(!engine.remove_job("nope").unwrap());
        engine.add_job(job(1, "1111/0000", "123456")).unwrap();
        assert!(engine.remove_job("1_1111/0000_123456_parse_job").unwrap());
        assert!(!engine.has_job("1_1111/0000_123456_parse_job"));
    }

    #[test]
    fn test_take_due_advances_and_caps_in_flight() {
        let mut engine = engine();
        let j = job(1, "1111/0000", "123456");
        let first = j.next_run.unwrap();
        engine.add_job(j).unwrap();

        assert!(engine.take_due(first - chrono::Duration::seconds(1)).is_empty());

        let claimed = engine.take_due(first);
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].run_count, 1);
        let second = engine.list_jobs()[0].next_run.unwrap();
        assert_eq!(second, first + chrono::Duration::days(1));

        // Previous run still in flight: the next firing is skipped, not queued.
        assert!(engine.take_due(second).is_empty());
        assert_eq!(engine.in_flight_count(), 1);
        let third = engine.list_jobs()[0].next_run.unwrap();
        assert_eq!(third, second + chrono::Duration::days(1));

        engine.finish(&claimed[0].id);
        assert_eq!(engine.take_due(third).len(), 1);
    }

    #[test]
    fn test_reload_skips_missed_firings() {
        let dir = std::env::temp_dir().join("enrollbot-engine-reload-test");
        std::fs::remove_dir_all(&dir).ok();
        let path = dir.join("scheduler.db");

        let mut stale = job(1, "1111/0000", "123456");
        stale.next_run = Some(Utc::now() - chrono::Duration::days(3));
        SchedulerDb::open(&path).unwrap().save_job(&stale).unwrap();

        let mut engine = SchedulerEngine::new(SchedulerDb::open(&path).unwrap()).unwrap();
        let next = engine.list_jobs()[0].next_run.unwrap();
        assert!(next > Utc::now());
        assert!(engine.take_due(Utc::now()).is_empty());

        // The rescheduled time is persisted.
        let reloaded = SchedulerDb::open(&path).unwrap().load_jobs().unwrap();
        assert_eq!(reloaded[0].next_run, Some(next));
        std::fs::remove_dir_all(&dir).ok();
    }

    struct CountingRunner {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl JobRunner for CountingRunner {
        async fn run(&self, _job: &PollJob) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_loop_runs_due_job_and_stops() {
        let mut eng = engine();
        let mut j = job(1, "1111/0000", "123456");
        j.next_run = Some(Utc::now() - chrono::Duration::seconds(1));
        eng.jobs.push(j);
        let engine = Arc::new(Mutex::new(eng));
        let runner = Arc::new(CountingRunner {
            runs: AtomicUsize::new(0),
        });
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(spawn_scheduler(engine.clone(), runner.clone(), 1, rx));
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
        let eng = engine.lock().await;
        assert_eq!(eng.in_flight_count(), 0);
        assert_eq!(eng.list_jobs()[0].run_count, 1);
    }
}
