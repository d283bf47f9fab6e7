//! # EnrollBot Store
//!
//! Durable per-user state: which requests a user tracks and the last
//! status text a scheduled poll reported for each of them.

pub mod sqlite;

pub use sqlite::SqliteStateStore;
