//! Append-only behavioral event log
//!
//! One ordered log per user, kept in memory and mirrored to a
//! [`KeyValueStore`]. The in-memory copy is authoritative: persistence is
//! best-effort and a failed write never undoes an append.

use crate::store::backend::KeyValueStore;
use crate::types::{Event, EventMetadata, EventType};
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default retention window in days
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Default cap on events kept per user
pub const DEFAULT_MAX_EVENTS: usize = 1000;

/// Storage key for a user's event log
pub fn events_key(user_id: &str) -> String {
    format!("{EVENTS_PREFIX}{user_id}")
}

const EVENTS_PREFIX: &str = "events:";

/// A single user's ordered log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserLog {
    /// Next insertion index to hand out
    next_sequence: u64,
    /// Events ordered by `(timestamp, sequence)`
    events: Vec<Event>,
    /// In-memory change counter, used to drop stale writes
    #[serde(skip)]
    revision: u64,
}

impl UserLog {
    /// Rebuild a log from persisted JSON, restoring order and sequence
    fn from_json(user_id: &str, json: &str) -> Result<Self, serde_json::Error> {
        let mut log: UserLog = serde_json::from_str(json)?;
        log.events.retain(|e| e.user_id == user_id);
        log.events.sort_by_key(Event::order_key);
        let max_seen = log.events.iter().map(|e| e.sequence + 1).max().unwrap_or(0);
        log.next_sequence = log.next_sequence.max(max_seen);
        log.revision = 0;
        Ok(log)
    }

    fn insert(&mut self, event: Event) {
        let key = event.order_key();
        let pos = self.events.partition_point(|e| e.order_key() <= key);
        self.events.insert(pos, event);
    }

    /// Drop the oldest events beyond `max_events`, returning how many went
    fn enforce_cap(&mut self, max_events: usize) -> usize {
        let excess = self.events.len().saturating_sub(max_events);
        if excess > 0 {
            self.events.drain(..excess);
        }
        excess
    }

    /// Remove events strictly older than `cutoff`, returning how many went
    fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.events.len();
        self.events.retain(|e| e.timestamp >= cutoff);
        before - self.events.len()
    }
}

/// Thread-safe event log for any number of users
///
/// Writers (`append`, `prune`, `clear`) take an exclusive lock; readers get a
/// copied snapshot, so a reader never observes a half-applied change and a
/// later prune cannot invalidate events a reader already holds.
pub struct EventStore {
    backend: Arc<dyn KeyValueStore>,
    logs: RwLock<HashMap<String, UserLog>>,
    /// Last revision successfully written, per user. Held while writing.
    persisted: Mutex<HashMap<String, u64>>,
    max_events: usize,
}

impl EventStore {
    /// Create a store with the default size cap
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::with_max_events(backend, DEFAULT_MAX_EVENTS)
    }

    /// Create a store keeping at most `max_events` per user
    pub fn with_max_events(backend: Arc<dyn KeyValueStore>, max_events: usize) -> Self {
        Self {
            backend,
            logs: RwLock::new(HashMap::new()),
            persisted: Mutex::new(HashMap::new()),
            max_events: max_events.max(1),
        }
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    /// Append an event and return it with its assigned identity
    pub fn append(
        &self,
        user_id: &str,
        event_type: EventType,
        timestamp: DateTime<Utc>,
        metadata: EventMetadata,
        duration: Option<u64>,
    ) -> Event {
        self.ensure_loaded(user_id);

        let (event, pending) = {
            let mut logs = self.logs.write();
            let log = logs.entry(user_id.to_string()).or_default();

            let event = Event {
                id: Uuid::new_v4().to_string(),
                sequence: log.next_sequence,
                user_id: user_id.to_string(),
                event_type,
                timestamp,
                duration,
                metadata,
            };
            log.next_sequence += 1;
            log.insert(event.clone());

            let dropped = log.enforce_cap(self.max_events);
            if dropped > 0 {
                debug!(user_id, dropped, "Event log over capacity, oldest events dropped");
            }
            log.revision += 1;
            (event, log.clone())
        };

        debug!(
            user_id,
            event_type = %event.event_type,
            sequence = event.sequence,
            "Event appended"
        );
        self.persist(user_id, pending);
        event
    }

    /// Copy of a user's events in `(timestamp, sequence)` order, optionally
    /// limited to events at or after `since`
    pub fn snapshot(&self, user_id: &str, since: Option<DateTime<Utc>>) -> Vec<Event> {
        self.ensure_loaded(user_id);
        let logs = self.logs.read();
        match logs.get(user_id) {
            Some(log) => log
                .events
                .iter()
                .filter(|e| since.map_or(true, |s| e.timestamp >= s))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Remove every event older than `now - retention_days` for all users,
    /// loading persisted logs first. Returns the number of events removed.
    pub fn prune(&self, retention_days: i64, now: DateTime<Utc>) -> usize {
        self.load_persisted_users();
        let cutoff = now - Duration::days(retention_days.max(0));
        let changed: Vec<(String, UserLog, usize)> = {
            let mut logs = self.logs.write();
            logs.iter_mut()
                .filter_map(|(user_id, log)| {
                    let removed = log.prune_before(cutoff);
                    (removed > 0).then(|| {
                        log.revision += 1;
                        (user_id.clone(), log.clone(), removed)
                    })
                })
                .collect()
        };

        let mut total = 0;
        for (user_id, log, removed) in changed {
            info!(user_id = %user_id, removed, retention_days, "Pruned expired events");
            total += removed;
            self.persist(&user_id, log);
        }
        total
    }

    /// Load `user_id` (if needed) and prune only that user's log
    pub fn prune_user(&self, user_id: &str, retention_days: i64, now: DateTime<Utc>) -> usize {
        self.ensure_loaded(user_id);
        let cutoff = now - Duration::days(retention_days.max(0));
        let pending = {
            let mut logs = self.logs.write();
            let Some(log) = logs.get_mut(user_id) else {
                return 0;
            };
            let removed = log.prune_before(cutoff);
            if removed == 0 {
                return 0;
            }
            log.revision += 1;
            (log.clone(), removed)
        };

        info!(user_id, removed = pending.1, retention_days, "Pruned expired events");
        self.persist(user_id, pending.0);
        pending.1
    }

    /// Drop every event for `user_id`
    pub fn clear(&self, user_id: &str) {
        self.ensure_loaded(user_id);
        let pending = {
            let mut logs = self.logs.write();
            let log = logs.entry(user_id.to_string()).or_default();
            log.events.clear();
            log.revision += 1;
            log.clone()
        };
        info!(user_id, "Event log cleared");
        self.persist(user_id, pending);
    }

    /// Number of events held for `user_id`
    pub fn len(&self, user_id: &str) -> usize {
        self.ensure_loaded(user_id);
        self.logs.read().get(user_id).map_or(0, |log| log.events.len())
    }

    /// Users with a log in memory, sorted
    pub fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.logs.read().keys().cloned().collect();
        users.sort();
        users
    }

    /// Load every user with a persisted log. If the backend cannot list its
    /// keys only users already in memory are covered.
    fn load_persisted_users(&self) {
        let keys = match self.backend.keys(EVENTS_PREFIX) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list persisted users");
                return;
            }
        };
        for key in keys {
            if let Some(user_id) = key.strip_prefix(EVENTS_PREFIX) {
                self.ensure_loaded(user_id);
            }
        }
    }

    /// Load a user's persisted log on first touch
    fn ensure_loaded(&self, user_id: &str) {
        if self.logs.read().contains_key(user_id) {
            return;
        }

        let loaded = self.load_user(user_id);
        self.logs
            .write()
            .entry(user_id.to_string())
            .or_insert(loaded);
    }

    /// Read a user's log from the backend; unreadable data yields an empty log
    fn load_user(&self, user_id: &str) -> UserLog {
        let raw = match self.backend.load(&events_key(user_id)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return UserLog::default(),
            Err(e) => {
                warn!(user_id, error = %e, "Failed to read persisted events, starting empty");
                return UserLog::default();
            }
        };

        match UserLog::from_json(user_id, &raw) {
            Ok(mut log) => {
                let dropped = log.enforce_cap(self.max_events);
                debug!(user_id, events = log.events.len(), dropped, "Loaded persisted events");
                log
            }
            Err(e) => {
                warn!(user_id, error = %e, "Discarding malformed persisted events");
                UserLog::default()
            }
        }
    }

    /// Write a log copy unless a newer revision was already written
    fn persist(&self, user_id: &str, log: UserLog) {
        let mut persisted = self.persisted.lock();
        if persisted.get(user_id).is_some_and(|&last| last >= log.revision) {
            debug!(user_id, revision = log.revision, "Skipping stale event log write");
            return;
        }

        let json = match serde_json::to_string(&log) {
            Ok(json) => json,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to serialize event log");
                return;
            }
        };

        match self.backend.save(&events_key(user_id), &json) {
            Ok(()) => {
                persisted.insert(user_id.to_string(), log.revision);
            }
            Err(e) => {
                warn!(user_id, error = %e, "Failed to persist event log, keeping in-memory state");
            }
        }
    }
}
