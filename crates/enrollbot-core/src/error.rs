//! Error types shared by every EnrollBot crate.

use thiserror::Error;

/// Top-level error.
#[derive(Debug, Error)]
pub enum EnrollBotError {
    #[error("Config error: {0}")]
    Config(String),

    /// The state store could not be reached or rejected the operation.
    #[error("Store unavailable: {0}")]
    Store(String),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures of the two-step status page scrape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The anti-forgery token input was absent from the form page.
    #[error("verification token not found on status page")]
    MissingToken,

    /// The response carried no validation summary message.
    #[error("result message not found in response")]
    MissingResult,
}

pub type Result<T> = std::result::Result<T, EnrollBotError>;
