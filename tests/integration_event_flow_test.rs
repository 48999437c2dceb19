/// Integration tests for the inbound event flow
///
/// Exercises the complete path: connection -> router -> hook chain ->
/// history/state mutation -> downstream sink, plus targeted load replies.
use async_trait::async_trait;
use dashboard_sync::{
    ConnectionInfo, Coordinator, CoordinatorConfig, DownstreamSink, HistoryConfig, InboundEvent,
    SyncError, SyncPlugin, WidgetSpec,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

/// Sink recording every forwarded message
#[derive(Default)]
struct RecordingSink {
    forwarded: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl DownstreamSink for RecordingSink {
    async fn forward(&self, widget_id: &str, msg: Value) -> Result<(), SyncError> {
        self.forwarded.lock().push((widget_id.to_string(), msg));
        Ok(())
    }
}

fn test_coordinator() -> (Arc<Coordinator>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let coordinator = Coordinator::new("dash-1", CoordinatorConfig::default(), sink.clone());
    (coordinator, sink)
}

#[tokio::test]
async fn test_change_round_trips_through_load() {
    let (coordinator, sink) = test_coordinator();
    coordinator
        .register(None, None, Some(WidgetSpec::new("slider-1", "slider")))
        .unwrap();

    let (conn, mut rx) = coordinator.connect(None).unwrap();
    let _snapshot = rx.recv().await.unwrap();

    coordinator
        .handle_event(
            conn.id,
            InboundEvent::Change {
                widget_id: "slider-1".to_string(),
                payload: json!({"payload": 63}),
            },
        )
        .await;

    assert_eq!(sink.forwarded.lock().len(), 1);

    // A reconnecting client asks for the last known value
    coordinator
        .handle_event(
            conn.id,
            InboundEvent::Load {
                widget_id: "slider-1".to_string(),
            },
        )
        .await;

    let reply = rx.recv().await.unwrap();
    assert_eq!(reply.event, "widget-load:slider-1");
    assert_eq!(reply.payload["payload"], json!(63));
}

#[tokio::test]
async fn test_chart_history_window_applies_across_events() {
    let (coordinator, _sink) = test_coordinator();
    coordinator
        .register(
            None,
            None,
            Some(
                WidgetSpec::new("chart-1", "chart")
                    .with_history(HistoryConfig::time_series().with_max_points(3)),
            ),
        )
        .unwrap();

    let (conn, _rx) = coordinator.connect(None).unwrap();

    for i in 0..5 {
        coordinator
            .handle_event(
                conn.id,
                InboundEvent::Send {
                    widget_id: "chart-1".to_string(),
                    payload: json!(i),
                },
            )
            .await;
    }

    let entries = coordinator.history_of("chart-1");
    assert_eq!(entries.len(), 3);
    let ys: Vec<_> = entries.iter().map(|e| e.point.y.clone()).collect();
    assert_eq!(ys, vec![json!(2), json!(3), json!(4)]);
}

#[tokio::test]
async fn test_empty_array_reset_clears_chart() {
    let (coordinator, _sink) = test_coordinator();
    coordinator
        .register(
            None,
            None,
            Some(WidgetSpec::new("chart-1", "chart").with_history(HistoryConfig::time_series())),
        )
        .unwrap();

    let (conn, _rx) = coordinator.connect(None).unwrap();

    for i in 0..3 {
        coordinator
            .handle_event(
                conn.id,
                InboundEvent::Send {
                    widget_id: "chart-1".to_string(),
                    payload: json!(i),
                },
            )
            .await;
    }
    assert_eq!(coordinator.history_of("chart-1").len(), 3);

    coordinator
        .handle_event(
            conn.id,
            InboundEvent::Send {
                widget_id: "chart-1".to_string(),
                payload: json!([]),
            },
        )
        .await;
    assert!(coordinator.history_of("chart-1").is_empty());
}

struct AuditPlugin {
    seen: Arc<Mutex<Vec<Value>>>,
}

#[async_trait]
impl SyncPlugin for AuditPlugin {
    fn name(&self) -> &str {
        "audit"
    }

    async fn on_change(&self, msg: Value) -> Option<Value> {
        self.seen.lock().push(msg.clone());
        Some(msg)
    }
}

#[tokio::test]
async fn test_plugin_observes_change_events() {
    let (coordinator, _sink) = test_coordinator();
    let seen = Arc::new(Mutex::new(Vec::new()));
    coordinator
        .register_plugin(Arc::new(AuditPlugin { seen: seen.clone() }))
        .await;

    coordinator
        .register(None, None, Some(WidgetSpec::new("slider-1", "slider")))
        .unwrap();

    let (conn, _rx) = coordinator.connect(None).unwrap();
    coordinator
        .handle_event(
            conn.id,
            InboundEvent::Change {
                widget_id: "slider-1".to_string(),
                payload: json!({"payload": 5}),
            },
        )
        .await;

    assert_eq!(seen.lock().len(), 1);
}

struct ScopedDelivery;

#[async_trait]
impl SyncPlugin for ScopedDelivery {
    fn name(&self) -> &str {
        "scoped-delivery"
    }

    async fn is_valid_connection(&self, conn: &ConnectionInfo, msg: &Value) -> bool {
        match msg.get("audience").and_then(Value::as_str) {
            Some(audience) => conn.scope_token.as_deref() == Some(audience),
            None => true,
        }
    }
}

#[tokio::test]
async fn test_scoped_emit_respects_validity_hooks() {
    let (coordinator, _sink) = test_coordinator();
    coordinator.register_plugin(Arc::new(ScopedDelivery)).await;

    let (_ops, mut rx_ops) = coordinator.connect(Some("ops".to_string())).unwrap();
    let (_guest, mut rx_guest) = coordinator.connect(Some("guest".to_string())).unwrap();
    let _ = rx_ops.recv().await;
    let _ = rx_guest.recv().await;

    let sent = coordinator
        .emit("notification", json!({"audience": "ops", "text": "restart"}), None)
        .await;

    assert_eq!(sent, 1);
    assert_eq!(rx_ops.recv().await.unwrap().event, "notification");
    assert!(rx_guest.try_recv().is_err());
}

#[tokio::test]
async fn test_events_after_close_are_dropped() {
    let (coordinator, sink) = test_coordinator();
    coordinator
        .register(None, None, Some(WidgetSpec::new("btn-1", "button")))
        .unwrap();
    let (conn, _rx) = coordinator.connect(None).unwrap();

    coordinator.close();
    coordinator
        .handle_event(
            conn.id,
            InboundEvent::Action {
                widget_id: "btn-1".to_string(),
                payload: json!({}),
            },
        )
        .await;

    assert!(sink.forwarded.lock().is_empty());
}
