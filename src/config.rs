/// Configuration for the sync coordinator and per-widget history buffers
///
/// Coordinator knobs load from `DASHBOARD_SYNC_*` environment variables with
/// typed parsing and defaults; widget-level chart/history configuration is
/// supplied by the host at registration time.
use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default quiescence interval for coalesced config emissions (milliseconds)
pub const DEFAULT_EMIT_DEBOUNCE_MS: u64 = 300;

/// Coordinator runtime configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Quiescence interval before a pending `ui-config` emission fires
    pub emit_debounce: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            emit_debounce: Duration::from_millis(DEFAULT_EMIT_DEBOUNCE_MS),
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from environment variables
    ///
    /// - `DASHBOARD_SYNC_EMIT_DEBOUNCE_MS` (optional): debounce interval in
    ///   milliseconds (default: 300)
    pub fn from_env() -> Result<Self, SyncError> {
        let debounce_ms = parse_env_var(
            "DASHBOARD_SYNC_EMIT_DEBOUNCE_MS",
            DEFAULT_EMIT_DEBOUNCE_MS,
        )?;

        let config = Self {
            emit_debounce: Duration::from_millis(debounce_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.emit_debounce.is_zero() {
            return Err(SyncError::Config(
                "emit debounce must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env_var<T>(key: &str, default: T) -> Result<T, SyncError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| SyncError::Config(format!("invalid value for {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

/// Axis kind for a chart-like widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    /// Continuous time axis; count/time windows apply
    Time,
    /// Categorical axis; latest-per-category collapse applies
    Category,
}

/// Chart kind, used when deriving data points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Scatter,
    Bar,
}

/// How the series/category of a derived data point is computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum SeriesRef {
    /// Use the message topic as the series label
    Topic,
    /// Fixed literal label
    Literal(String),
    /// Look up a single property on the payload object
    Property(String),
    /// Multiple properties, each becoming its own y value (multi-line/bar)
    Properties(Vec<String>),
}

impl Default for SeriesRef {
    fn default() -> Self {
        Self::Topic
    }
}

/// What an append does to existing history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppendAction {
    /// Keep prior entries, subject to eviction
    #[default]
    Append,
    /// Clear prior entries before appending
    Replace,
}

/// Per-widget history buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Axis kind; selects the eviction family
    pub axis: AxisKind,

    /// Chart kind
    pub chart: ChartKind,

    /// Maximum retained points per series label (time axis only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_points: Option<usize>,

    /// Retention window; entries with older x timestamps are dropped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<Duration>,

    /// Series/category descriptor
    #[serde(default)]
    pub series: SeriesRef,

    /// Append vs replace behavior
    #[serde(default)]
    pub action: AppendAction,
}

impl HistoryConfig {
    /// Line chart over time, unbounded
    pub fn time_series() -> Self {
        Self {
            axis: AxisKind::Time,
            chart: ChartKind::Line,
            max_points: None,
            window: None,
            series: SeriesRef::Topic,
            action: AppendAction::Append,
        }
    }

    /// Retain only the most recent message (non-chart widgets)
    pub fn latest_only() -> Self {
        Self {
            axis: AxisKind::Time,
            chart: ChartKind::Line,
            max_points: None,
            window: None,
            series: SeriesRef::Topic,
            action: AppendAction::Replace,
        }
    }

    /// Bar chart over categories
    pub fn categorical() -> Self {
        Self {
            axis: AxisKind::Category,
            chart: ChartKind::Bar,
            max_points: None,
            window: None,
            series: SeriesRef::Topic,
            action: AppendAction::Append,
        }
    }

    pub fn with_max_points(mut self, n: usize) -> Self {
        self.max_points = Some(n);
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_series(mut self, series: SeriesRef) -> Self {
        self.series = series;
        self
    }

    pub fn with_action(mut self, action: AppendAction) -> Self {
        self.action = action;
        self
    }
}

/// Host-supplied topic decoration applied before forwarding a message
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum TopicPolicy {
    /// Leave the message topic untouched
    #[default]
    None,
    /// Set the topic to the widget id
    WidgetId,
    /// Set a fixed topic string
    Fixed(String),
    /// Copy the topic from a payload property
    FromProperty(String),
}
