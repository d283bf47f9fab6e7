//! Collaborator seams: the tracker only talks to the outside world through these.

use async_trait::async_trait;

use crate::error::{Result, ScrapeError};
use crate::types::{TrackingMap, UserId};

/// Durable per-user state: tracked requests and the last observed results.
/// Implementations must not cache; every call round-trips to storage.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The user's tracked requests (empty if none).
    async fn get_tracking(&self, user: UserId) -> Result<TrackingMap>;

    /// Replace the user's tracked requests as one unit.
    async fn set_tracking(&self, user: UserId, tracking: &TrackingMap) -> Result<()>;

    /// Last result reported by a scheduled poll for this request.
    async fn get_last_check(&self, user: UserId, request_number: &str) -> Result<Option<String>>;

    async fn set_last_check(&self, user: UserId, request_number: &str, result: &str) -> Result<()>;

    /// Drop the cached result for a request that is no longer tracked.
    async fn clear_last_check(&self, user: UserId, request_number: &str) -> Result<()>;
}

/// Two-step form scrape of the enrollment status page.
#[async_trait]
pub trait StatusScraper: Send + Sync {
    /// Step one: load the form and read its anti-forgery token.
    async fn fetch_form_token(&self) -> std::result::Result<String, ScrapeError>;

    /// Step two: post the credentials, returning the raw response body.
    async fn submit(
        &self,
        token: &str,
        request_number: &str,
        pin_code: &str,
    ) -> std::result::Result<String, ScrapeError>;

    /// Pull the status message out of a submit response.
    fn extract_result(&self, raw_response: &str) -> std::result::Result<String, ScrapeError>;

    /// Run all three steps.
    async fn check_status(
        &self,
        request_number: &str,
        pin_code: &str,
    ) -> std::result::Result<String, ScrapeError> {
        let token = self.fetch_form_token().await?;
        let raw = self.submit(&token, request_number, pin_code).await?;
        self.extract_result(&raw)
    }
}

/// Delivers a text message to a user. Best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, user: UserId, text: &str) -> Result<()>;
}
