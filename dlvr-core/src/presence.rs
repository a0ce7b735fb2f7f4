//! Tracks which users currently have the app in front of them.
//!
//! A user is in the foreground while at least one notification stream is
//! open for them, or for a short window after their last poll. The fanout
//! only escalates to out-of-band alerts for users who are not.
//!
//! Entries for users who only ever polled are swept once their window has
//! passed, at most once per window, so the map tracks live users only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use compact_str::CompactString;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Presence {
    open_streams: usize,
    last_poll: Option<Instant>,
}

impl Presence {
    fn is_live(&self, window: Duration) -> bool {
        self.open_streams > 0 || self.last_poll.is_some_and(|at| at.elapsed() <= window)
    }
}

#[derive(Debug)]
struct Users {
    by_id: HashMap<CompactString, Presence>,
    last_sweep: Instant,
}

#[derive(Debug, Clone)]
pub struct PresenceRegistry {
    users: Arc<Mutex<Users>>,
    poll_window: Duration,
}

/// Keeps a stream counted as open until dropped.
#[derive(Debug)]
pub struct StreamPresence {
    registry: PresenceRegistry,
    user_id: CompactString,
}

impl PresenceRegistry {
    pub fn new(poll_window: Duration) -> Self {
        Self {
            users: Arc::new(Mutex::new(Users {
                by_id: HashMap::new(),
                last_sweep: Instant::now(),
            })),
            poll_window,
        }
    }

    /// Count a stream for `user_id` as open for the lifetime of the guard.
    pub fn stream_opened(&self, user_id: &str) -> StreamPresence {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users.by_id.entry(user_id.into()).or_default().open_streams += 1;
        StreamPresence {
            registry: self.clone(),
            user_id: user_id.into(),
        }
    }

    pub fn record_poll(&self, user_id: &str) {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        users.by_id.entry(user_id.into()).or_default().last_poll = Some(now);
        if now.duration_since(users.last_sweep) >= self.poll_window {
            let window = self.poll_window;
            users.by_id.retain(|_, presence| presence.is_live(window));
            users.last_sweep = now;
        }
    }

    pub fn is_foreground(&self, user_id: &str) -> bool {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users
            .by_id
            .get(user_id)
            .is_some_and(|p| p.is_live(self.poll_window))
    }

    pub fn open_streams(&self, user_id: &str) -> usize {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users.by_id.get(user_id).map_or(0, |p| p.open_streams)
    }

    /// Number of users with an entry, live or not yet swept.
    pub fn tracked_users(&self) -> usize {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users.by_id.len()
    }

    fn stream_closed(&self, user_id: &str) {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(presence) = users.by_id.get_mut(user_id) {
            presence.open_streams = presence.open_streams.saturating_sub(1);
            if !presence.is_live(self.poll_window) {
                users.by_id.remove(user_id);
            }
        }
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Drop for StreamPresence {
    fn drop(&mut self) {
        self.registry.stream_closed(&self.user_id);
    }
}
