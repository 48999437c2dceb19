/// Plugin hook chain and per-widget handler seams
///
/// Plugins contribute zero or one callback per lifecycle point; hooks run
/// in registration order and a `None` return short-circuits the message to
/// "suppressed". Widget-level handlers customize the router pipeline for a
/// single widget.
use crate::connection::{ConnectionId, ConnectionInfo};
use crate::error::SyncError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

/// Lifecycle points a plugin may hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    Action,
    Change,
    Send,
    Load,
    Input,
}

/// Plugin-supplied hook set
///
/// Every method has a pass-through default; a plugin overrides only the
/// points it cares about.
#[async_trait]
pub trait SyncPlugin: Send + Sync {
    /// Plugin name, for logging
    fn name(&self) -> &str;

    /// Called once when the plugin is registered with a coordinator
    async fn on_setup(&self) {}

    /// Veto delivery of a message to a connection
    async fn is_valid_connection(&self, _conn: &ConnectionInfo, _msg: &Value) -> bool {
        true
    }

    async fn on_action(&self, msg: Value) -> Option<Value> {
        Some(msg)
    }

    async fn on_change(&self, msg: Value) -> Option<Value> {
        Some(msg)
    }

    async fn on_send(&self, msg: Value) -> Option<Value> {
        Some(msg)
    }

    async fn on_load(&self, msg: Value) -> Option<Value> {
        Some(msg)
    }

    async fn on_input(&self, msg: Value) -> Option<Value> {
        Some(msg)
    }
}

/// Ordered chain of registered plugins
#[derive(Default)]
pub struct HookChain {
    plugins: RwLock<Vec<Arc<dyn SyncPlugin>>>,
}

impl HookChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin at the end of the chain
    pub fn register(&self, plugin: Arc<dyn SyncPlugin>) {
        tracing::info!("Registered sync plugin {}", plugin.name());
        self.plugins.write().push(plugin);
    }

    /// Number of registered plugins
    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    /// Whether no plugins are registered
    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn SyncPlugin>> {
        self.plugins.read().clone()
    }

    /// Run all `on_setup` hooks in registration order
    pub async fn setup(&self) {
        for plugin in self.snapshot() {
            plugin.on_setup().await;
        }
    }

    /// Apply the chain for one lifecycle point
    ///
    /// Hooks run in registration order; each may transform the message.
    /// `None` from any hook suppresses the message and ends the chain.
    pub async fn apply(&self, point: HookPoint, msg: Value) -> Option<Value> {
        let mut current = msg;
        for plugin in self.snapshot() {
            let next = match point {
                HookPoint::Action => plugin.on_action(current).await,
                HookPoint::Change => plugin.on_change(current).await,
                HookPoint::Send => plugin.on_send(current).await,
                HookPoint::Load => plugin.on_load(current).await,
                HookPoint::Input => plugin.on_input(current).await,
            };
            match next {
                Some(msg) => current = msg,
                None => {
                    tracing::debug!("Message suppressed by plugin {} at {:?}", plugin.name(), point);
                    return None;
                }
            }
        }
        Some(current)
    }

    /// Ask every plugin whether a connection may receive a message
    ///
    /// Absence of any objection is the default: all hooks must agree.
    pub async fn connection_valid(&self, conn: &ConnectionInfo, msg: &Value) -> bool {
        for plugin in self.snapshot() {
            if !plugin.is_valid_connection(conn, msg).await {
                return false;
            }
        }
        true
    }
}

/// Optional per-widget handlers supplied by the host at registration
///
/// All methods default to the standard pipeline behavior; a widget
/// overrides only what it customizes.
#[async_trait]
pub trait WidgetHandler: Send + Sync {
    /// Transform an outbound message just before it is forwarded
    async fn before_send(&self, msg: Value) -> Result<Value, SyncError> {
        Ok(msg)
    }

    /// Custom change handler; `Some` supersedes the default
    /// set-payload-from-incoming behavior
    async fn on_change(&self, _base: Value, _incoming: Value) -> Option<Result<Value, SyncError>> {
        None
    }

    /// Widget-specific error hook; `true` marks the error handled
    fn on_error(&self, _err: &SyncError) -> bool {
        false
    }

    /// Custom transport event names this widget listens for
    fn socket_events(&self) -> Vec<String> {
        Vec::new()
    }

    /// Handle a custom transport event declared in `socket_events`
    async fn on_socket(
        &self,
        _event: &str,
        _conn: ConnectionId,
        _msg: Value,
    ) -> Result<(), SyncError> {
        Ok(())
    }
}

/// Host-owned downstream for forwarded messages and error reporting
#[async_trait]
pub trait DownstreamSink: Send + Sync {
    /// Deliver a routed message to the host's per-widget sink
    async fn forward(&self, widget_id: &str, msg: Value) -> Result<(), SyncError>;

    /// Widget-node error reporter (tier 2); `true` marks the error handled
    fn report_error(&self, _widget_id: &str, _err: &SyncError) -> bool {
        false
    }
}
