/// Windowed, eviction-aware message history for chart-like widgets
///
/// Retains a bounded per-widget sequence of received messages, each
/// annotated with a derived `{category, x, y}` data point. Eviction
/// policies (reset-on-empty-array, latest-per-category, count-window per
/// series, time-window) compose per widget configuration; eviction never
/// reorders surviving entries.
use crate::config::{AxisKind, AppendAction, HistoryConfig, SeriesRef};
use crate::message::message_topic;
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Data point derived from an inbound payload for chart ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Series label (topic/label field of the source message)
    pub label: String,

    /// Category value, per the widget's series descriptor
    pub category: String,

    /// X position as epoch milliseconds
    pub x: f64,

    /// Y value; an array for multi-property series descriptors
    pub y: Value,
}

/// One stored message with its derived point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The message as received (post-pipeline)
    pub msg: Value,

    /// Derived chart point
    pub point: DataPoint,
}

/// Append-only, per-widget message history with configurable eviction
#[derive(Debug, Default)]
pub struct HistoryStore {
    /// Map: widget_id -> ordered entries (insertion order)
    entries: Arc<RwLock<HashMap<String, Vec<HistoryEntry>>>>,
}

impl HistoryStore {
    /// Create an empty history store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message for a widget and run the eviction pipeline
    ///
    /// An empty-array payload is an explicit reset signal: history is
    /// cleared and nothing is stored. An array payload otherwise produces
    /// one entry per element.
    pub fn append(&self, widget_id: &str, msg: &Value, config: &HistoryConfig) {
        let payload = extract_payload(msg);

        if matches!(payload, Value::Array(items) if items.is_empty()) {
            tracing::debug!("History reset for widget {}", widget_id);
            self.clear(widget_id);
            return;
        }

        let now_ms = Utc::now().timestamp_millis() as f64;
        let label = message_topic(msg).unwrap_or_default().to_string();

        let mut new_entries = Vec::new();
        match payload {
            Value::Array(items) => {
                for item in items {
                    new_entries.push(HistoryEntry {
                        msg: msg.clone(),
                        point: derive_point(item, &label, config, now_ms),
                    });
                }
            }
            single => {
                new_entries.push(HistoryEntry {
                    msg: msg.clone(),
                    point: derive_point(single, &label, config, now_ms),
                });
            }
        }

        let mut entries = self.entries.write();
        let bucket = entries.entry(widget_id.to_string()).or_default();

        if config.action == AppendAction::Replace {
            bucket.clear();
        }
        bucket.extend(new_entries);

        match config.axis {
            AxisKind::Category => collapse_categories(bucket),
            AxisKind::Time => {
                if let Some(n) = config.max_points {
                    window_by_count(bucket, n);
                }
                if let Some(window) = config.window {
                    let cutoff = now_ms - window.as_millis() as f64;
                    window_by_time(bucket, cutoff);
                }
            }
        }
    }

    /// Last stored message for a widget, if any
    pub fn latest(&self, widget_id: &str) -> Option<Value> {
        let entries = self.entries.read();
        entries
            .get(widget_id)
            .and_then(|bucket| bucket.last())
            .map(|entry| entry.msg.clone())
    }

    /// All stored entries for a widget, in insertion order
    pub fn all(&self, widget_id: &str) -> Vec<HistoryEntry> {
        let entries = self.entries.read();
        entries.get(widget_id).cloned().unwrap_or_default()
    }

    /// Number of stored entries for a widget
    pub fn len(&self, widget_id: &str) -> usize {
        let entries = self.entries.read();
        entries.get(widget_id).map(Vec::len).unwrap_or(0)
    }

    /// Whether a widget has no stored entries
    pub fn is_empty(&self, widget_id: &str) -> bool {
        self.len(widget_id) == 0
    }

    /// Drop all history for a widget
    pub fn clear(&self, widget_id: &str) {
        self.entries.write().remove(widget_id);
    }

    /// Drop everything
    pub fn clear_all(&self) {
        self.entries.write().clear();
    }
}

/// Payload of a message object, or the message itself when it is a bare value
fn extract_payload(msg: &Value) -> &Value {
    match msg {
        Value::Object(map) => map.get("payload").unwrap_or(msg),
        other => other,
    }
}

/// Compute the derived point for one payload element
fn derive_point(payload: &Value, label: &str, config: &HistoryConfig, now_ms: f64) -> DataPoint {
    let category = match &config.series {
        SeriesRef::Topic => label.to_string(),
        SeriesRef::Literal(s) => s.clone(),
        SeriesRef::Property(prop) => payload
            .get(prop)
            .map(value_to_label)
            .unwrap_or_else(|| label.to_string()),
        SeriesRef::Properties(_) => label.to_string(),
    };

    match payload {
        // Bare number: {x: now, y: value}
        Value::Number(_) | Value::Bool(_) | Value::String(_) | Value::Null => DataPoint {
            label: label.to_string(),
            category,
            x: now_ms,
            y: payload.clone(),
        },
        obj => {
            let x = obj
                .get("x")
                .map(|v| normalize_timestamp(v, now_ms))
                .unwrap_or(now_ms);

            let y = match &config.series {
                SeriesRef::Properties(props) => Value::Array(
                    props
                        .iter()
                        .map(|p| obj.get(p).cloned().unwrap_or(Value::Null))
                        .collect(),
                ),
                SeriesRef::Property(prop) => obj
                    .get("y")
                    .or_else(|| obj.get(prop))
                    .cloned()
                    .unwrap_or(Value::Null),
                _ => obj.get("y").cloned().unwrap_or_else(|| obj.clone()),
            };

            DataPoint {
                label: label.to_string(),
                category,
                x,
                y,
            }
        }
    }
}

/// Normalize a timestamp value to epoch milliseconds
///
/// Accepts numeric epoch millis or date-like strings; anything
/// unparseable coerces to `now` rather than failing the append.
pub fn normalize_timestamp(value: &Value, now_ms: f64) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(now_ms),
        Value::String(s) => parse_date_string(s).unwrap_or(now_ms),
        _ => now_ms,
    }
}

fn parse_date_string(s: &str) -> Option<f64> {
    if let Ok(n) = s.parse::<f64>() {
        return Some(n);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis() as f64);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive).timestamp_millis() as f64);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&naive).timestamp_millis() as f64);
    }
    None
}

fn value_to_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Keep exactly one entry per distinct category: the most recently
/// appended occurrence wins, surviving entries keep insertion order
fn collapse_categories(bucket: &mut Vec<HistoryEntry>) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut keep = vec![false; bucket.len()];
    for i in (0..bucket.len()).rev() {
        if seen.insert(bucket[i].point.category.clone()) {
            keep[i] = true;
        }
    }
    let mut iter = keep.into_iter();
    bucket.retain(|_| iter.next().unwrap_or(false));
}

/// Keep at most `n` entries per distinct series label, newest first,
/// independently per label
fn window_by_count(bucket: &mut Vec<HistoryEntry>, n: usize) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut keep = vec![false; bucket.len()];
    for i in (0..bucket.len()).rev() {
        let count = counts.entry(bucket[i].point.label.clone()).or_insert(0);
        if *count < n {
            keep[i] = true;
            *count += 1;
        }
    }
    let mut iter = keep.into_iter();
    bucket.retain(|_| iter.next().unwrap_or(false));
}

/// Drop entries whose x timestamp falls before the cutoff
fn window_by_time(bucket: &mut Vec<HistoryEntry>, cutoff_ms: f64) {
    bucket.retain(|entry| entry.point.x >= cutoff_ms);
}
