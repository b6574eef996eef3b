//! Process-wide diagnostic sync log.
//!
//! A bounded, ordered, in-memory ring of timestamped entries with a single
//! optional live subscriber. Entries are strictly local diagnostics; nothing
//! here is ever sent to a remote system. Every append is mirrored as a
//! `tracing` event at the matching level.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use satchel_core::{LogEntry, LogLevel};

/// Default maximum number of retained entries.
pub const DEFAULT_LOG_CAPACITY: usize = 200;

/// Shortest contiguous base64/hex run treated as key-like material.
const REDACTION_RUN_LEN: usize = 32;

/// Callback receiving the full current entry sequence on every change.
pub type LogSubscriber = Arc<dyn Fn(&[LogEntry]) + Send + Sync>;

struct LogState {
    entries: VecDeque<LogEntry>,
    subscriber: Option<LogSubscriber>,
}

/// Bounded diagnostic log with one optional live subscriber.
///
/// Cheap to clone; clones share the same ring. The subscriber slot is
/// single-writer: only [`set_subscriber`](Self::set_subscriber) mutates it,
/// and attaching a new subscriber replaces the previous one.
#[derive(Clone)]
pub struct SyncLog {
    inner: Arc<LogInner>,
}

struct LogInner {
    capacity: usize,
    state: Mutex<LogState>,
}

impl SyncLog {
    /// Create a log with [`DEFAULT_LOG_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// Create a log retaining at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(LogInner {
                capacity: capacity.max(1),
                state: Mutex::new(LogState {
                    entries: VecDeque::new(),
                    subscriber: None,
                }),
            }),
        }
    }

    /// Append an entry and notify the subscriber, if attached, with the full
    /// current sequence.
    ///
    /// Messages are redacted of key-like material before storage: the sync
    /// key must never appear in the log, even by accident. Eviction happens
    /// before the append, so the subscriber always sees a bounded, current
    /// view.
    pub fn add(&self, message: impl Into<String>, level: LogLevel) {
        let message = redact(message.into());
        match level {
            LogLevel::Info => tracing::info!(target: "satchel_sync::log", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "satchel_sync::log", "{message}"),
            LogLevel::Verbose => tracing::debug!(target: "satchel_sync::log", "{message}"),
            LogLevel::Error => tracing::error!(target: "satchel_sync::log", "{message}"),
        }

        let (subscriber, snapshot) = {
            let mut state = self.inner.state.lock();
            while state.entries.len() >= self.inner.capacity {
                state.entries.pop_front();
            }
            state.entries.push_back(LogEntry {
                timestamp: Utc::now(),
                message,
                level,
            });
            let snapshot: Vec<LogEntry> = state.entries.iter().cloned().collect();
            (state.subscriber.clone(), snapshot)
        };

        // Invoked outside the lock so a subscriber may itself append.
        if let Some(subscriber) = subscriber {
            subscriber(&snapshot);
        }
    }

    /// Replace or clear the subscriber. Passing `None` detaches without
    /// needing the previous callback.
    pub fn set_subscriber(&self, subscriber: Option<LogSubscriber>) {
        self.inner.state.lock().subscriber = subscriber;
    }

    /// The current entry sequence, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner.state.lock().entries.iter().cloned().collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().entries.is_empty()
    }
}

impl Default for SyncLog {
    fn default() -> Self {
        Self::new()
    }
}

fn is_keylike_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')
}

/// Replace contiguous base64/hex runs of [`REDACTION_RUN_LEN`] or more
/// characters with a placeholder.
///
/// Ordinary prose never forms such runs; encoded key material always does.
/// UUIDs survive because their dashes break the run.
fn redact(message: String) -> String {
    let mut out = String::with_capacity(message.len());
    let mut run = String::new();
    for c in message.chars() {
        if is_keylike_char(c) {
            run.push(c);
            continue;
        }
        flush_run(&mut out, &mut run);
        out.push(c);
    }
    flush_run(&mut out, &mut run);
    out
}

fn flush_run(out: &mut String, run: &mut String) {
    if run.len() >= REDACTION_RUN_LEN {
        out.push_str("[redacted]");
    } else {
        out.push_str(run);
    }
    run.clear();
}
