//! SQLite state store. No in-process caching: every call hits the database.

use async_trait::async_trait;
use chrono::Utc;
use enrollbot_core::error::{EnrollBotError, Result};
use enrollbot_core::traits::StateStore;
use enrollbot_core::types::{TrackedRequest, TrackingMap, UserId};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

fn store_err(e: impl std::fmt::Display) -> EnrollBotError {
    EnrollBotError::Store(e.to_string())
}

pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open or create the state database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err)?;
        Self::with_connection(conn)
    }

    /// Throwaway database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tracked_requests (
                user_id INTEGER NOT NULL,
                request_number TEXT NOT NULL,
                pin_code TEXT NOT NULL,
                position INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, request_number)
            );

            -- One cached result per tracked request
            CREATE TABLE IF NOT EXISTS last_checks (
                user_id INTEGER NOT NULL,
                request_number TEXT NOT NULL,
                result TEXT NOT NULL,
                checked_at TEXT NOT NULL,
                PRIMARY KEY (user_id, request_number)
            );
            ",
        )
        .map_err(store_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(store_err)
    }

    /// Number of users with at least one tracked request.
    pub fn user_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(DISTINCT user_id) FROM tracked_requests",
            [],
            |r| r.get::<_, i64>(0),
        )
        .map(|n| n as usize)
        .map_err(store_err)
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get_tracking(&self, user: UserId) -> Result<TrackingMap> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT request_number, pin_code FROM tracked_requests
                 WHERE user_id = ?1 ORDER BY position",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([user], |row| {
                Ok(TrackedRequest {
                    request_number: row.get(0)?,
                    pin_code: row.get(1)?,
                })
            })
            .map_err(store_err)?;
        let tracking = rows
            .collect::<rusqlite::Result<TrackingMap>>()
            .map_err(store_err)?;
        Ok(tracking)
    }

    async fn set_tracking(&self, user: UserId, tracking: &TrackingMap) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(store_err)?;
        tx.execute("DELETE FROM tracked_requests WHERE user_id = ?1", [user])
            .map_err(store_err)?;
        let now = Utc::now().to_rfc3339();
        for (position, entry) in tracking.iter().enumerate() {
            tx.execute(
                "INSERT INTO tracked_requests (user_id, request_number, pin_code, position, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    user,
                    entry.request_number,
                    entry.pin_code,
                    position as i64,
                    now
                ],
            )
            .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;
        tracing::debug!("💾 Saved {} tracked request(s) for user {user}", tracking.len());
        Ok(())
    }

    async fn get_last_check(&self, user: UserId, request_number: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT result FROM last_checks WHERE user_id = ?1 AND request_number = ?2",
            rusqlite::params![user, request_number],
            |row| row.get(0),
        )
        .optional()
        .map_err(store_err)
    }

    async fn set_last_check(&self, user: UserId, request_number: &str, result: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO last_checks (user_id, request_number, result, checked_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![user, request_number, result, Utc::now().to_rfc3339()],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn clear_last_check(&self, user: UserId, request_number: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM last_checks WHERE user_id = ?1 AND request_number = ?2",
            rusqlite::params![user, request_number],
        )
        .map_err(store_err)?;
        Ok(())
    }
}
