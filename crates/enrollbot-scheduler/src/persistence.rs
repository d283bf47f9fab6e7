//! SQLite-backed persistence for poll jobs.

use crate::jobs::PollJob;
use chrono::{DateTime, Utc};
use enrollbot_core::error::{EnrollBotError, Result};
use std::path::Path;

fn db_err(context: &str, e: rusqlite::Error) -> EnrollBotError {
    EnrollBotError::Scheduler(format!("{context}: {e}"))
}

fn parse_time(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// SQLite-backed job store.
pub struct SchedulerDb {
    conn: rusqlite::Connection,
}

impl SchedulerDb {
    /// Open or create the scheduler database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path).map_err(|e| db_err("DB open", e))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Throwaway database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(|e| db_err("DB open", e))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS poll_jobs (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                request_number TEXT NOT NULL,
                pin_code TEXT NOT NULL,
                cron TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_run TEXT,
                next_run TEXT,
                run_count INTEGER NOT NULL DEFAULT 0
            );
            ",
            )
            .map_err(|e| db_err("Migration", e))?;
        Ok(())
    }

    /// Insert or update a job.
    pub fn save_job(&self, job: &PollJob) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO poll_jobs
                 (id, user_id, request_number, pin_code, cron, created_at, last_run, next_run, run_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    job.id,
                    job.user_id,
                    job.request_number,
                    job.pin_code,
                    job.cron,
                    job.created_at.to_rfc3339(),
                    job.last_run.map(|t| t.to_rfc3339()),
                    job.next_run.map(|t| t.to_rfc3339()),
                    job.run_count,
                ],
            )
            .map_err(|e| db_err("Save job", e))?;
        Ok(())
    }

    /// Save several jobs in one transaction.
    pub fn save_jobs(&mut self, jobs: &[&PollJob]) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| db_err("Begin", e))?;
        for job in jobs {
            tx.execute(
                "UPDATE poll_jobs SET last_run = ?1, next_run = ?2, run_count = ?3 WHERE id = ?4",
                rusqlite::params![
                    job.last_run.map(|t| t.to_rfc3339()),
                    job.next_run.map(|t| t.to_rfc3339()),
                    job.run_count,
                    job.id,
                ],
            )
            .map_err(|e| db_err("Update job", e))?;
        }
        tx.commit().map_err(|e| db_err("Commit", e))?;
        Ok(())
    }

    /// Load all jobs, oldest first.
    pub fn load_jobs(&self) -> Result<Vec<PollJob>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, request_number, pin_code, cron, created_at, last_run, next_run, run_count
                 FROM poll_jobs ORDER BY created_at",
            )
            .map_err(|e| db_err("Load jobs", e))?;

        let rows = stmt
            .query_map([], |row| {
                let created_at: String = row.get(5)?;
                Ok(PollJob {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    request_number: row.get(2)?,
                    pin_code: row.get(3)?,
                    cron: row.get(4)?,
                    created_at: parse_time(Some(created_at)).unwrap_or_else(Utc::now),
                    last_run: parse_time(row.get(6)?),
                    next_run: parse_time(row.get(7)?),
                    run_count: row.get(8)?,
                })
            })
            .map_err(|e| db_err("Load jobs", e))?;

        let jobs = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("Load jobs", e))?;
        Ok(jobs)
    }

    /// Delete a job. Returns whether a row existed.
    pub fn delete_job(&self, id: &str) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM poll_jobs WHERE id = ?1", [id])
            .map_err(|e| db_err("Delete job", e))?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::CronTrigger;

    #[test]
    fn test_open_and_migrate() {
        let db = SchedulerDb::open_in_memory().unwrap();
        assert!(db.load_jobs().unwrap().is_empty());
    }

    #[test]
    fn test_save_load_delete() {
        let dir = std::env::temp_dir().join("enrollbot-sched-db-test");
        std::fs::remove_dir_all(&dir).ok();
        let path = dir.join("scheduler.db");
        let trigger = CronTrigger::daily_at(18, 0).unwrap();
        let job = PollJob::new(42, "1111/0000", "123456", &trigger);
        {
            let db = SchedulerDb::open(&path).unwrap();
            db.save_job(&job).unwrap();
        }

        let db = SchedulerDb::open(&path).unwrap();
        let loaded = db.load_jobs().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "42_1111/0000_123456_parse_job");
        assert_eq!(loaded[0].cron, "0 18 * * *");
        assert_eq!(loaded[0].next_run, job.next_run);

        assert!(db.delete_job(&job.id).unwrap());
        assert!(!db.delete_job(&job.id).unwrap());
        assert!(db.load_jobs().unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_jobs_updates_run_state() {
        let mut db = SchedulerDb::open_in_memory().unwrap();
        let trigger = CronTrigger::daily_at(18, 0).unwrap();
        let mut job = PollJob::new(1, "1111/0000", "1", &trigger);
        db.save_job(&job).unwrap();

        job.run_count = 3;
        job.last_run = Some(Utc::now());
        db.save_jobs(&[&job]).unwrap();

        let loaded = db.load_jobs().unwrap();
        assert_eq!(loaded[0].run_count, 3);
        assert!(loaded[0].last_run.is_some());
    }
}
