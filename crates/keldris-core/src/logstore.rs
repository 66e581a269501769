//! Ring-buffered log store (component C12).
//!
//! A fixed-capacity circular buffer guarded by a single `RwLock`. Writes take
//! the writer lock and are O(1); reads take the reader lock and walk the
//! buffer newest-first, applying filters and enforcing retention as they go.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

/// Numeric log levels, ordered so "≥ filterLevel" comparisons are a plain
/// integer comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" | "err" => Self::Error,
            _ => Self::Info,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub component: String,
    pub time: DateTime<Utc>,
    pub fields: HashMap<String, Value>,
}

/// The raw JSON-line shape produced by the logging layer. Everything beyond
/// `level`/`message`/`component`/`time` is folded into `fields`.
#[derive(Debug, Deserialize)]
struct RawLine {
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    component: Option<String>,
    #[serde(default)]
    time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    rest: HashMap<String, Value>,
}

/// Parse one JSON log line into an entry. Missing `level`/`component`/`time`
/// fall back to sensible defaults so a malformed producer never loses the
/// line entirely; `message` defaults to the empty string.
#[must_use]
pub fn parse_line(json_line: &str, fallback_time: DateTime<Utc>) -> LogEntry {
    match serde_json::from_str::<RawLine>(json_line) {
        Ok(raw) => LogEntry {
            level: raw.level.as_deref().map(LogLevel::parse).unwrap_or(LogLevel::Info),
            message: raw.message.unwrap_or_default(),
            component: raw.component.unwrap_or_default(),
            time: raw.time.unwrap_or(fallback_time),
            fields: raw.rest,
        },
        Err(_) => LogEntry {
            level: LogLevel::Info,
            message: json_line.to_owned(),
            component: String::new(),
            time: fallback_time,
            fields: HashMap::new(),
        },
    }
}

struct RingState {
    buffer: Vec<Option<LogEntry>>,
    write_pos: usize,
    wrapped: bool,
}

pub struct LogStore {
    state: RwLock<RingState>,
    capacity: usize,
    retention: chrono::Duration,
}

impl LogStore {
    #[must_use]
    pub fn new(capacity: usize, retention: chrono::Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: RwLock::new(RingState { buffer: (0..capacity).map(|_| None).collect(), write_pos: 0, wrapped: false }),
            capacity,
            retention,
        }
    }

    /// Write one entry, overwriting the oldest slot once the buffer has
    /// wrapped. O(1): no shifting, no allocation on the hot path.
    pub async fn write(&self, entry: LogEntry) {
        let mut state = self.state.write().await;
        let pos = state.write_pos;
        state.buffer[pos] = Some(entry);
        state.write_pos = (pos + 1) % self.capacity;
        if state.write_pos == 0 {
            state.wrapped = true;
        }
    }

    /// Convenience wrapper: parse a raw JSON line and write it.
    pub async fn write_line(&self, json_line: &str, now: DateTime<Utc>) {
        self.write(parse_line(json_line, now)).await;
    }

    /// Newest-first read with filters applied and retention enforced at read
    /// time — entries older than `now - retention` are skipped regardless of
    /// whether they are still physically present in the buffer.
    #[must_use]
    pub async fn query(&self, filter: &LogQuery, now: DateTime<Utc>) -> Vec<LogEntry> {
        let state = self.state.read().await;
        let cutoff = now - self.retention;

        let ordered = newest_first_order(state.write_pos, self.capacity, state.wrapped);
        let matches: Vec<LogEntry> = ordered
            .into_iter()
            .filter_map(|idx| state.buffer[idx].clone())
            .filter(|entry| entry.time >= cutoff)
            .filter(|entry| matches_filter(entry, filter))
            .collect();

        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(matches.len());
        matches.into_iter().skip(offset).take(limit).collect()
    }
}

/// Index order walking the ring from the most-recently-written slot backward.
fn newest_first_order(write_pos: usize, capacity: usize, wrapped: bool) -> Vec<usize> {
    let len = if wrapped { capacity } else { write_pos };
    (0..len).map(|i| (write_pos + capacity - 1 - i) % capacity).collect()
}

#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub min_level: Option<LogLevel>,
    pub component: Option<String>,
    pub search: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

fn matches_filter(entry: &LogEntry, filter: &LogQuery) -> bool {
    if let Some(min) = filter.min_level {
        if entry.level < min {
            return false;
        }
    }
    if let Some(component) = &filter.component {
        if &entry.component != component {
            return false;
        }
    }
    if let Some(since) = filter.since {
        if entry.time < since {
            return false;
        }
    }
    if let Some(until) = filter.until {
        if entry.time > until {
            return false;
        }
    }
    if let Some(needle) = &filter.search {
        let needle = needle.to_ascii_lowercase();
        let haystack_hit = entry.message.to_ascii_lowercase().contains(&needle)
            || entry.component.to_ascii_lowercase().contains(&needle)
            || entry.fields.values().any(|v| value_contains(v, &needle));
        if !haystack_hit {
            return false;
        }
    }
    true
}

fn value_contains(value: &Value, needle_lowercase: &str) -> bool {
    match value {
        Value::String(s) => s.to_ascii_lowercase().contains(needle_lowercase),
        _ => false,
    }
}
