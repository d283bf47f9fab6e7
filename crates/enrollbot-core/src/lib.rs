//! # EnrollBot Core
//!
//! Shared building blocks for the enrollment watcher:
//! configuration, the error taxonomy, domain types and the traits the
//! tracker uses to talk to its collaborators (store, scraper, chat).

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::EnrollBotConfig;
pub use error::{EnrollBotError, Result, ScrapeError};
pub use traits::{Notifier, StateStore, StatusScraper};
pub use types::{PollMode, TrackedRequest, TrackingMap, UserId};
