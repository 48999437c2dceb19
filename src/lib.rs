/// Dashboard Sync Core
///
/// Synchronization engine for multi-client real-time dashboards
///
/// Features:
/// - Connection/session registry with per-connection delivery filtering
/// - Inbound event router with a pluggable hook pipeline
/// - Debounced full-config broadcast merged with persisted state overrides
/// - Windowed, eviction-aware history buffers for chart-like widgets
/// - Widget/group/page/theme registry with cascading lifecycle cleanup
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod history;
pub mod hooks;
pub mod message;
pub mod registry;
pub mod router;
pub mod state;

pub use config::{
    AppendAction, AxisKind, ChartKind, CoordinatorConfig, HistoryConfig, SeriesRef, TopicPolicy,
};
pub use connection::{ConnectionId, ConnectionInfo, ConnectionRegistry};
pub use coordinator::Coordinator;
pub use error::SyncError;
pub use history::{DataPoint, HistoryEntry, HistoryStore};
pub use hooks::{DownstreamSink, HookChain, HookPoint, SyncPlugin, WidgetHandler};
pub use message::{InboundEvent, OutboundEvent, RESERVED_WIDGET_PREFIX};
pub use registry::{
    Dashboard, DeregisterOutcome, Group, Layout, Page, RegisterOutcome, Theme, Widget,
    WidgetRegistry, WidgetSource, WidgetSpec,
};
pub use router::EventRouter;
pub use state::StateStore;

/// Initialize tracing for the sync core
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashboard_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
