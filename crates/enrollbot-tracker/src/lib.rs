//! # EnrollBot Tracker
//!
//! Ties user actions to the scheduler and the status checks:
//!
//! ```text
//! /start  → TrackingService::register  → mapping + SchedulerEngine job
//! /delete → TrackingService::delete    → mapping − job
//! /list   → TrackingService::list
//! /check  → PollTask (manual)          → Notifier
//! cron    → PollTask (scheduled)       → StateStore last check → Notifier
//! ```

pub mod bot;
pub mod messages;
pub mod poll;
pub mod service;

#[cfg(test)]
mod testing;

pub use bot::{Bot, CallbackAction, parse_credentials};
pub use poll::{PollOutcome, PollTask};
pub use service::{DeleteOutcome, RegisterOutcome, TrackingService};
