//! Domain types: tracked requests and the per-user tracking mapping.

use serde::{Deserialize, Serialize};

/// Telegram user id. Private chats share the id with the user.
pub type UserId = i64;

/// A (request number, PIN) pair a user watches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedRequest {
    pub request_number: String,
    pub pin_code: String,
}

impl TrackedRequest {
    pub fn new(request_number: &str, pin_code: &str) -> Self {
        Self {
            request_number: request_number.to_string(),
            pin_code: pin_code.to_string(),
        }
    }
}

/// A user's tracked requests, keyed by request number, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingMap {
    entries: Vec<TrackedRequest>,
}

impl TrackingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// PIN stored for `request_number`, if tracked.
    pub fn get(&self, request_number: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.request_number == request_number)
            .map(|e| e.pin_code.as_str())
    }

    pub fn contains(&self, request_number: &str) -> bool {
        self.get(request_number).is_some()
    }

    /// Insert or overwrite the PIN for a request number.
    /// Overwriting keeps the original position.
    pub fn insert(&mut self, request_number: &str, pin_code: &str) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.request_number == request_number)
        {
            Some(entry) => entry.pin_code = pin_code.to_string(),
            None => self
                .entries
                .push(TrackedRequest::new(request_number, pin_code)),
        }
    }

    /// Remove a request number, returning the entry if it was tracked.
    pub fn remove(&mut self, request_number: &str) -> Option<TrackedRequest> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.request_number == request_number)?;
        Some(self.entries.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedRequest> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<TrackedRequest> for TrackingMap {
    fn from_iter<I: IntoIterator<Item = TrackedRequest>>(iter: I) -> Self {
        let mut map = TrackingMap::new();
        for entry in iter {
            map.insert(&entry.request_number, &entry.pin_code);
        }
        map
    }
}

/// How a poll task was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Fired by the scheduler: deduplicated against the last-check cache.
    Scheduled,
    /// Requested by the user: always reported, cache untouched.
    Manual,
}
