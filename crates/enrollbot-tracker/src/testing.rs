//! Hand-written fakes for the scraper and chat collaborators.

use std::sync::Mutex;

use async_trait::async_trait;
use enrollbot_core::error::{EnrollBotError, Result, ScrapeError};
use enrollbot_core::traits::{Notifier, StateStore, StatusScraper};
use enrollbot_core::types::{TrackingMap, UserId};
use enrollbot_store::SqliteStateStore;

/// Returns a scripted status (or failure) for every request.
pub struct FakeScraper {
    next: Mutex<std::result::Result<String, ScrapeError>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl Default for FakeScraper {
    fn default() -> Self {
        Self {
            next: Mutex::new(Err(ScrapeError::MissingResult)),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeScraper {
    pub fn set_result(&self, result: &str) {
        *self.next.lock().unwrap() = Ok(result.to_string());
    }

    pub fn fail_with(&self, error: ScrapeError) {
        *self.next.lock().unwrap() = Err(error);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl StatusScraper for FakeScraper {
    async fn fetch_form_token(&self) -> std::result::Result<String, ScrapeError> {
        match &*self.next.lock().unwrap() {
            Err(ScrapeError::MissingToken) => Err(ScrapeError::MissingToken),
            Err(ScrapeError::Http(e)) => Err(ScrapeError::Http(e.clone())),
            _ => Ok("token".into()),
        }
    }

    async fn submit(
        &self,
        _token: &str,
        request_number: &str,
        pin_code: &str,
    ) -> std::result::Result<String, ScrapeError> {
        self.calls
            .lock()
            .unwrap()
            .push((request_number.to_string(), pin_code.to_string()));
        Ok(String::new())
    }

    fn extract_result(&self, _raw_response: &str) -> std::result::Result<String, ScrapeError> {
        self.next.lock().unwrap().clone()
    }
}

/// Records every message; can be switched to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(UserId, String)>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn texts_for(&self, user: UserId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, user: UserId, text: &str) -> Result<()> {
        if *self.failing.lock().unwrap() {
            return Err(EnrollBotError::Channel("chat unavailable".into()));
        }
        self.sent.lock().unwrap().push((user, text.to_string()));
        Ok(())
    }
}

/// In-memory store whose reads or writes can be switched to fail.
pub struct FlakyStore {
    inner: SqliteStateStore,
    fail_reads: Mutex<bool>,
    fail_writes: Mutex<bool>,
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self {
            inner: SqliteStateStore::open_in_memory().unwrap(),
            fail_reads: Mutex::new(false),
            fail_writes: Mutex::new(false),
        }
    }
}

impl FlakyStore {
    pub fn fail_reads(&self, failing: bool) {
        *self.fail_reads.lock().unwrap() = failing;
    }

    pub fn fail_writes(&self, failing: bool) {
        *self.fail_writes.lock().unwrap() = failing;
    }

    fn check(flag: &Mutex<bool>) -> Result<()> {
        if *flag.lock().unwrap() {
            return Err(EnrollBotError::Store("database is locked".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn get_tracking(&self, user: UserId) -> Result<TrackingMap> {
        Self::check(&self.fail_reads)?;
        self.inner.get_tracking(user).await
    }

    async fn set_tracking(&self, user: UserId, tracking: &TrackingMap) -> Result<()> {
        Self::check(&self.fail_writes)?;
        self.inner.set_tracking(user, tracking).await
    }

    async fn get_last_check(&self, user: UserId, request_number: &str) -> Result<Option<String>> {
        Self::check(&self.fail_reads)?;
        self.inner.get_last_check(user, request_number).await
    }

    async fn set_last_check(&self, user: UserId, request_number: &str, result: &str) -> Result<()> {
        Self::check(&self.fail_writes)?;
        self.inner.set_last_check(user, request_number, result).await
    }

    async fn clear_last_check(&self, user: UserId, request_number: &str) -> Result<()> {
        Self::check(&self.fail_writes)?;
        self.inner.clear_last_check(user, request_number).await
    }
}
