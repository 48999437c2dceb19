/// Broadcast coordinator: the top-level per-dashboard-instance object
///
/// Owns the connection registry, widget registry, state/history stores and
/// broadcast scheduling. Registration changes schedule a debounced
/// `ui-config` emission; the emitted snapshot merges State Store overrides
/// into the registry view and goes to every eligible live connection.
use crate::config::CoordinatorConfig;
use crate::connection::{ConnectionId, ConnectionInfo, ConnectionRegistry};
use crate::error::SyncError;
use crate::history::{HistoryEntry, HistoryStore};
use crate::hooks::{DownstreamSink, HookChain, HookPoint, SyncPlugin};
use crate::message::{InboundEvent, OutboundEvent, EVENT_MSG_INPUT_PREFIX, EVENT_UI_CONFIG};
use crate::registry::{
    Dashboard, DeregisterOutcome, Group, Page, Theme, Widget, WidgetRegistry, WidgetSpec,
};
use crate::router::EventRouter;
use crate::state::StateStore;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Default state entries seeded on first registration of a widget
const DEFAULT_STATE: [(&str, fn() -> Value); 3] = [
    ("enabled", || Value::Bool(true)),
    ("visible", || Value::Bool(true)),
    ("class", || Value::String(String::new())),
];

/// Top-level coordinator for one dashboard instance
pub struct Coordinator {
    id: String,
    config: CoordinatorConfig,

    connections: Arc<ConnectionRegistry>,
    registry: Arc<WidgetRegistry>,
    state: Arc<StateStore>,
    history: Arc<HistoryStore>,
    hooks: Arc<HookChain>,
    router: Arc<EventRouter>,

    /// Guards the single outstanding debounce timer
    emit_pending: Arc<AtomicBool>,

    closed: Arc<AtomicBool>,
}

impl Coordinator {
    /// Create a coordinator wired to the host's downstream sink
    pub fn new(
        id: impl Into<String>,
        config: CoordinatorConfig,
        sink: Arc<dyn DownstreamSink>,
    ) -> Arc<Self> {
        let connections = Arc::new(ConnectionRegistry::new());
        let registry = Arc::new(WidgetRegistry::new());
        let state = Arc::new(StateStore::new());
        let history = Arc::new(HistoryStore::new());
        let hooks = Arc::new(HookChain::new());

        let router = Arc::new(EventRouter::new(
            registry.clone(),
            state.clone(),
            history.clone(),
            connections.clone(),
            hooks.clone(),
            sink,
        ));

        let id = id.into();
        tracing::info!("Created coordinator {}", id);

        Arc::new(Self {
            id,
            config,
            connections,
            registry,
            state,
            history,
            hooks,
            router,
            emit_pending: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Coordinator instance id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Register a plugin and run its setup hook
    pub async fn register_plugin(&self, plugin: Arc<dyn SyncPlugin>) {
        self.hooks.register(plugin.clone());
        plugin.on_setup().await;
    }

    /// Host registration call: upsert page/group/widget and schedule an
    /// emission
    ///
    /// On first registration of a widget, default state entries
    /// (`enabled`, `visible`, `class`) seed into the State Store only if
    /// absent; a redeploy never overwrites them.
    pub fn register(
        &self,
        page: Option<Page>,
        group: Option<Group>,
        widget: Option<WidgetSpec>,
    ) -> Result<(), SyncError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SyncError::CoordinatorClosed);
        }

        let snapshot = match &widget {
            Some(spec) => {
                for (property, default) in DEFAULT_STATE {
                    self.state.set_if_absent(&spec.id, property, default());
                }
                self.state.all(&spec.id)
            }
            None => Map::new(),
        };

        let widget_id = widget.as_ref().map(|w| w.id.clone());
        self.registry.register(page, group, widget, snapshot);

        if let Some(widget_id) = widget_id {
            if let Some(widget) = self.registry.get(&widget_id) {
                self.router.bind_socket_events(&widget);
            }
        }

        self.request_emit();
        Ok(())
    }

    /// Register a dashboard entity
    pub fn add_dashboard(&self, dashboard: Dashboard) {
        self.registry.add_dashboard(dashboard);
        self.request_emit();
    }

    /// Register a theme entity
    pub fn add_theme(&self, theme: Theme) {
        self.registry.add_theme(theme);
        self.request_emit();
    }

    /// Host removal call: drop any combination of page, group and widget,
    /// cascade container pruning, release transport bindings and schedule
    /// an emission
    pub fn deregister(
        &self,
        page_id: Option<&str>,
        group_id: Option<&str>,
        widget_id: Option<&str>,
    ) -> DeregisterOutcome {
        let outcome = self.registry.deregister(page_id, group_id, widget_id);

        if outcome.changed() {
            for widget_id in &outcome.removed_widgets {
                self.router.release_socket_events(widget_id);
                self.state.remove(widget_id);
                self.history.clear(widget_id);
            }
            for group_id in &outcome.removed_groups {
                self.state.remove(group_id);
            }
            for page_id in &outcome.removed_pages {
                self.state.remove(page_id);
            }
            self.request_emit();
        }

        outcome
    }

    /// Schedule a debounced full-config emission
    ///
    /// Idempotent: while an emission is pending this is a no-op. The
    /// pending flag clears only when the timer fires, so late requests
    /// during scheduling coalesce into the same emission.
    pub fn request_emit(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if self.emit_pending.swap(true, Ordering::SeqCst) {
            return;
        }

        let emit_pending = Arc::clone(&self.emit_pending);
        let closed = Arc::clone(&self.closed);
        let connections = Arc::clone(&self.connections);
        let registry = Arc::clone(&self.registry);
        let state = Arc::clone(&self.state);
        let hooks = Arc::clone(&self.hooks);
        let scope = self.id.clone();
        let debounce = self.config.emit_debounce;

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            emit_pending.store(false, Ordering::SeqCst);

            if closed.load(Ordering::SeqCst) {
                return;
            }

            let snapshot = build_snapshot(&scope, &registry, &state);
            let sent = connections
                .broadcast(
                    OutboundEvent::broadcast(EVENT_UI_CONFIG, snapshot),
                    None,
                    &hooks,
                )
                .await;
            tracing::debug!("Emitted ui-config to {} connections", sent);
        });
    }

    /// Immutable merged view of the registry with State Store overrides
    /// applied (state wins on conflicting keys)
    pub fn build_snapshot(&self) -> Value {
        build_snapshot(&self.id, &self.registry, &self.state)
    }

    /// Accept a new client connection
    ///
    /// The connection immediately receives the merged-current snapshot
    /// (non-debounced); subsequent updates arrive via the coalesced
    /// `ui-config` emissions. Rejected once the coordinator is closed.
    pub fn connect(
        &self,
        scope_token: Option<String>,
    ) -> Result<(ConnectionInfo, UnboundedReceiver<OutboundEvent>), SyncError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SyncError::CoordinatorClosed);
        }

        let (info, rx) = self.connections.register(&self.id, scope_token);

        let snapshot = self.build_snapshot();
        if let Err(err) = self.connections.send_to(
            info.id,
            OutboundEvent::targeted(EVENT_UI_CONFIG, snapshot, info.id),
        ) {
            tracing::warn!("Failed to deliver initial snapshot: {}", err);
        }

        Ok((info, rx))
    }

    /// Drop a client connection
    pub fn disconnect(&self, conn_id: ConnectionId) {
        self.connections.unregister(conn_id);
    }

    /// Route one inbound event from a connection
    ///
    /// Events from a single connection are processed in arrival order by
    /// awaiting each call before issuing the next.
    pub async fn handle_event(&self, conn: ConnectionId, event: InboundEvent) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.router.handle(conn, event).await;
    }

    /// Direct server-to-client push bypassing the router
    pub async fn emit(
        &self,
        event: impl Into<String>,
        payload: Value,
        origin_widget: Option<&str>,
    ) -> usize {
        if self.closed.load(Ordering::SeqCst) {
            return 0;
        }
        self.connections
            .broadcast(
                OutboundEvent::broadcast(event, payload),
                origin_widget,
                &self.hooks,
            )
            .await
    }

    /// Fan out an input notification (`msg-input:<id>`) for a widget
    ///
    /// Runs the `on_input` hook chain first; a suppressed message is not
    /// delivered.
    pub async fn notify_input(&self, widget_id: &str, msg: Value) -> usize {
        if self.closed.load(Ordering::SeqCst) {
            return 0;
        }
        let Some(msg) = self.hooks.apply(HookPoint::Input, msg).await else {
            return 0;
        };
        self.connections
            .broadcast(
                OutboundEvent::broadcast(format!("{}{}", EVENT_MSG_INPUT_PREFIX, widget_id), msg),
                Some(widget_id),
                &self.hooks,
            )
            .await
    }

    /// Set a dynamic state override and schedule an emission
    ///
    /// Mutation happens before scheduling so the emitted snapshot always
    /// reflects it (read-modify-then-schedule).
    pub fn set_state(&self, entity_id: &str, property: &str, value: Value) {
        self.state.set(entity_id, property, value);
        self.request_emit();
    }

    /// Read-only query of State Store contents for a widget
    pub fn state_of(&self, widget_id: &str) -> Map<String, Value> {
        self.state.all(widget_id)
    }

    /// Read-only query of History Store contents for a widget
    pub fn history_of(&self, widget_id: &str) -> Vec<HistoryEntry> {
        self.history.all(widget_id)
    }

    /// Live connection count
    pub fn connection_count(&self) -> usize {
        self.connections.connection_count()
    }

    /// Whether the coordinator has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tear down: stop broadcasting, drop all connections, clear every
    /// registry and store
    ///
    /// In-flight handler invocations finish on their own; their output is
    /// discarded because the registries are already empty.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Closing coordinator {}", self.id);
        self.connections.clear();
        self.registry.clear();
        self.state.clear();
        self.history.clear_all();
    }
}

/// Build the merged `{dashboards, pages, themes, groups, widgets}` view
fn build_snapshot(scope: &str, registry: &WidgetRegistry, state: &StateStore) -> Value {
    let widgets: Vec<Value> = registry
        .widgets()
        .iter()
        .map(|w| widget_json(w, state))
        .collect();

    let groups: Vec<Value> = registry
        .groups()
        .iter()
        .map(|g| {
            let value = serde_json::to_value(g).unwrap_or_default();
            merge_overrides(&g.id, value, state)
        })
        .collect();

    let pages: Vec<Value> = registry
        .pages()
        .iter()
        .map(|p| {
            let value = serde_json::to_value(p).unwrap_or_default();
            merge_overrides(&p.id, value, state)
        })
        .collect();

    json!({
        "scope": scope,
        "dashboards": serde_json::to_value(registry.dashboards()).unwrap_or_default(),
        "pages": pages,
        "themes": serde_json::to_value(registry.themes()).unwrap_or_default(),
        "groups": groups,
        "widgets": widgets,
    })
}

fn widget_json(widget: &Widget, state: &StateStore) -> Value {
    let mut props = widget.props.clone();
    state.merge_into(&widget.id, &mut props);

    let mut state_view = widget.state.clone();
    state.merge_into(&widget.id, &mut state_view);

    let mut obj = Map::new();
    obj.insert("id".to_string(), json!(widget.id));
    obj.insert("type".to_string(), json!(widget.kind));
    obj.insert("props".to_string(), Value::Object(props));
    obj.insert(
        "layout".to_string(),
        serde_json::to_value(&widget.layout).unwrap_or_default(),
    );
    obj.insert("state".to_string(), Value::Object(state_view));
    if let Some(group_id) = &widget.group_id {
        obj.insert("group".to_string(), json!(group_id));
    }
    if let Some(source) = &widget.source {
        obj.insert(
            "source".to_string(),
            serde_json::to_value(source).unwrap_or_default(),
        );
    }
    Value::Object(obj)
}

fn merge_overrides(entity_id: &str, value: Value, state: &StateStore) -> Value {
    match value {
        Value::Object(mut map) => {
            state.merge_into(entity_id, &mut map);
            Value::Object(map)
        }
        other => other,
    }
}
