/// Inbound event router
///
/// Receives the four client event kinds plus custom socket events, runs
/// the plugin hook chain, resolves the target widget and dispatches to
/// widget-specific or default handlers. Every failure is contained per
/// invocation and routed through the three-tier fallback reporter (widget
/// hook, widget node, coordinator log); a failing widget never aborts
/// processing for other widgets or connections.
use crate::config::{HistoryConfig, TopicPolicy};
use crate::connection::{ConnectionId, ConnectionRegistry};
use crate::error::SyncError;
use crate::history::HistoryStore;
use crate::hooks::{DownstreamSink, HookChain, HookPoint};
use crate::message::{
    set_message_topic, unwrap_payload_envelope, InboundEvent, OutboundEvent,
    EVENT_WIDGET_LOAD_PREFIX, RESERVED_WIDGET_PREFIX,
};
use crate::registry::{Widget, WidgetRegistry};
use crate::state::StateStore;
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Routes inbound events from connections to widget handlers and the
/// host-owned downstream sink
pub struct EventRouter {
    registry: Arc<WidgetRegistry>,
    state: Arc<StateStore>,
    history: Arc<HistoryStore>,
    connections: Arc<ConnectionRegistry>,
    hooks: Arc<HookChain>,
    sink: Arc<dyn DownstreamSink>,

    /// Map: custom event name -> owning widget id
    socket_bindings: DashMap<String, String>,
}

impl EventRouter {
    /// Create a router over the shared component set
    pub fn new(
        registry: Arc<WidgetRegistry>,
        state: Arc<StateStore>,
        history: Arc<HistoryStore>,
        connections: Arc<ConnectionRegistry>,
        hooks: Arc<HookChain>,
        sink: Arc<dyn DownstreamSink>,
    ) -> Self {
        Self {
            registry,
            state,
            history,
            connections,
            hooks,
            sink,
            socket_bindings: DashMap::new(),
        }
    }

    /// Process one inbound event from a connection
    ///
    /// Never returns an error: failures are routed through the fallback
    /// reporter so one widget cannot break event processing for others.
    pub async fn handle(&self, conn: ConnectionId, event: InboundEvent) {
        let widget_id = event.widget_id().to_string();

        let result = match event {
            InboundEvent::Action { payload, .. } => self.handle_action(&widget_id, payload).await,
            InboundEvent::Change { payload, .. } => {
                self.handle_update(&widget_id, payload, HookPoint::Change).await
            }
            InboundEvent::Send { payload, .. } => {
                self.handle_update(&widget_id, payload, HookPoint::Send).await
            }
            InboundEvent::Load { .. } => self.handle_load(conn, &widget_id).await,
            InboundEvent::Custom { event, payload, .. } => {
                self.handle_custom(conn, &event, payload).await
            }
        };

        if let Err(err) = result {
            self.report_error(&widget_id, err);
        }
    }

    /// Forwarded, read-only interaction (e.g. a button press)
    async fn handle_action(&self, widget_id: &str, payload: Value) -> Result<(), SyncError> {
        let Some(msg) = self.hooks.apply(HookPoint::Action, payload).await else {
            return Ok(());
        };

        // Widget deleted post-deploy: silent no-op, never an error
        let Some(widget) = self.registry.get(widget_id) else {
            tracing::debug!("Action for unknown widget {}, ignoring", widget_id);
            return Ok(());
        };

        let msg = decorate_topic(&widget, msg);
        let msg = match &widget.handler {
            Some(handler) => handler.before_send(msg).await?,
            None => msg,
        };

        self.sink.forward(widget_id, msg).await
    }

    /// Stateful update; `Change` loads the prior stored message, `Send`
    /// starts from an empty base
    async fn handle_update(
        &self,
        widget_id: &str,
        payload: Value,
        point: HookPoint,
    ) -> Result<(), SyncError> {
        let Some(incoming) = self.hooks.apply(point, payload).await else {
            return Ok(());
        };

        let Some(widget) = self.registry.get(widget_id) else {
            tracing::debug!("Update for unknown widget {}, ignoring", widget_id);
            return Ok(());
        };

        let base = if point == HookPoint::Change {
            self.history.latest(widget_id).unwrap_or_else(|| json!({}))
        } else {
            json!({})
        };

        let msg = match &widget.handler {
            Some(handler) => match handler.on_change(base.clone(), incoming.clone()).await {
                Some(custom) => custom?,
                None => default_update(base, incoming),
            },
            None => default_update(base, incoming),
        };

        let msg = decorate_topic(&widget, msg);
        let msg = match &widget.handler {
            Some(handler) => handler.before_send(msg).await?,
            None => msg,
        };

        let history_config = widget
            .history
            .clone()
            .unwrap_or_else(HistoryConfig::latest_only);
        self.history.append(widget_id, &msg, &history_config);

        if let Some(payload) = msg.get("payload") {
            self.state.set(widget_id, "payload", payload.clone());
        }

        self.sink.forward(widget_id, msg).await
    }

    /// Client requests the last known value on (re)connect
    ///
    /// Ids with the reserved prefix are answered even without a
    /// server-side widget (built-in client-only widgets).
    async fn handle_load(&self, conn: ConnectionId, widget_id: &str) -> Result<(), SyncError> {
        if !self.registry.contains(widget_id) && !widget_id.starts_with(RESERVED_WIDGET_PREFIX) {
            tracing::debug!("Load for unknown widget {}, ignoring", widget_id);
            return Ok(());
        }

        let Some(latest) = self.history.latest(widget_id) else {
            return Ok(());
        };

        let Some(msg) = self.hooks.apply(HookPoint::Load, latest).await else {
            return Ok(());
        };

        self.connections.send_to(
            conn,
            OutboundEvent::targeted(
                format!("{}{}", EVENT_WIDGET_LOAD_PREFIX, widget_id),
                msg,
                conn,
            ),
        )
    }

    /// Custom transport event declared by a widget's socket-hook map
    ///
    /// Errors are attributed to the bound widget resolved from the event
    /// name; the inbound envelope's widget id is not trusted for routing.
    async fn handle_custom(
        &self,
        conn: ConnectionId,
        event: &str,
        payload: Value,
    ) -> Result<(), SyncError> {
        let Some(widget_id) = self
            .socket_bindings
            .get(event)
            .map(|entry| entry.value().clone())
        else {
            tracing::warn!("No widget bound for custom event {}", event);
            return Ok(());
        };

        let Some(widget) = self.registry.get(&widget_id) else {
            return Ok(());
        };

        if let Some(handler) = &widget.handler {
            if let Err(err) = handler.on_socket(event, conn, payload).await {
                self.report_error(&widget_id, err);
            }
        }
        Ok(())
    }

    /// Register a widget's custom socket events for dispatch
    pub fn bind_socket_events(&self, widget: &Widget) {
        if let Some(handler) = &widget.handler {
            for event in handler.socket_events() {
                tracing::debug!("Binding custom event {} to widget {}", event, widget.id);
                self.socket_bindings.insert(event, widget.id.clone());
            }
        }
    }

    /// Release every custom event binding held by a widget
    ///
    /// Must run on widget removal so no live connection keeps a leaked
    /// binding.
    pub fn release_socket_events(&self, widget_id: &str) {
        self.socket_bindings
            .retain(|_, bound| bound != widget_id);
    }

    /// Three-tier fallback: widget `on_error` hook, widget node reporter,
    /// then the coordinator's log. First available wins; never escalates.
    fn report_error(&self, widget_id: &str, err: SyncError) {
        if let Some(widget) = self.registry.get(widget_id) {
            if let Some(handler) = &widget.handler {
                if handler.on_error(&err) {
                    return;
                }
            }
        }

        if self.sink.report_error(widget_id, &err) {
            return;
        }

        tracing::error!("Unhandled error for widget {}: {}", widget_id, err);
    }
}

/// Default change/send handler: set `payload` from the incoming value,
/// unwrapping a `{payload: ...}` envelope if present
fn default_update(base: Value, incoming: Value) -> Value {
    let payload = unwrap_payload_envelope(incoming);
    let mut map = match base {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.insert("payload".to_string(), payload);
    Value::Object(map)
}

/// Apply the widget's host-supplied topic decoration
fn decorate_topic(widget: &Widget, msg: Value) -> Value {
    match &widget.topic {
        TopicPolicy::None => msg,
        TopicPolicy::WidgetId => set_message_topic(msg, widget.id.clone()),
        TopicPolicy::Fixed(topic) => set_message_topic(msg, topic.clone()),
        TopicPolicy::FromProperty(prop) => {
            let topic = msg
                .get("payload")
                .and_then(|p| p.get(prop))
                .or_else(|| msg.get(prop))
                .and_then(Value::as_str)
                .map(str::to_string);
            match topic {
                Some(topic) => set_message_topic(msg, topic),
                None => msg,
            }
        }
    }
}
