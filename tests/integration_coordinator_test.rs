/// Integration tests for the broadcast coordinator
///
/// Covers debounce coalescing, snapshot merging with state overrides, the
/// immediate snapshot on connect, and teardown semantics.
use async_trait::async_trait;
use dashboard_sync::{
    Coordinator, CoordinatorConfig, DownstreamSink, Group, Page, SyncError, WidgetSpec,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Sink that discards forwarded messages
struct NullSink;

#[async_trait]
impl DownstreamSink for NullSink {
    async fn forward(&self, _widget_id: &str, _msg: Value) -> Result<(), SyncError> {
        Ok(())
    }
}

fn test_coordinator() -> Arc<Coordinator> {
    Coordinator::new("dash-1", CoordinatorConfig::default(), Arc::new(NullSink))
}

fn page(id: &str) -> Page {
    Page {
        id: id.to_string(),
        name: id.to_string(),
        dashboard_id: None,
        theme_id: None,
        order: 0,
    }
}

fn group(id: &str, page_id: &str) -> Group {
    Group {
        id: id.to_string(),
        name: id.to_string(),
        page_id: Some(page_id.to_string()),
        order: 0,
    }
}

#[tokio::test(start_paused = true)]
async fn test_registration_burst_coalesces_to_one_emission() {
    let coordinator = test_coordinator();
    let (_conn, mut rx) = coordinator.connect(None).unwrap();

    // Immediate snapshot on connect, before any registration
    let initial = rx.recv().await.unwrap();
    assert_eq!(initial.event, "ui-config");
    assert!(initial.payload["widgets"].as_array().unwrap().is_empty());

    for i in 0..5 {
        coordinator
            .register(
                Some(page("p1")),
                Some(group("g1", "p1")),
                Some(WidgetSpec::new(format!("w{}", i), "gauge")),
            )
            .unwrap();
    }

    sleep(Duration::from_millis(400)).await;

    let update = rx.recv().await.unwrap();
    assert_eq!(update.event, "ui-config");
    assert_eq!(update.payload["widgets"].as_array().unwrap().len(), 5);
    assert_eq!(update.payload["scope"], json!("dash-1"));

    // The whole burst produced exactly one emission
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_separate_bursts_emit_separately() {
    let coordinator = test_coordinator();
    let (_conn, mut rx) = coordinator.connect(None).unwrap();
    let _initial = rx.recv().await.unwrap();

    coordinator
        .register(None, None, Some(WidgetSpec::new("w1", "gauge")))
        .unwrap();
    sleep(Duration::from_millis(400)).await;
    assert_eq!(rx.recv().await.unwrap().payload["widgets"].as_array().unwrap().len(), 1);

    coordinator
        .register(None, None, Some(WidgetSpec::new("w2", "gauge")))
        .unwrap();
    sleep(Duration::from_millis(400)).await;
    assert_eq!(rx.recv().await.unwrap().payload["widgets"].as_array().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_merges_state_overrides() {
    let coordinator = test_coordinator();

    coordinator
        .register(
            Some(page("p1")),
            Some(group("g1", "p1")),
            Some(WidgetSpec::new("w1", "gauge")),
        )
        .unwrap();
    coordinator.set_state("w1", "class", json!("alert"));
    coordinator.set_state("g1", "collapsed", json!(true));

    let (_conn, mut rx) = coordinator.connect(None).unwrap();
    let snapshot = rx.recv().await.unwrap().payload;

    let widget = &snapshot["widgets"][0];
    assert_eq!(widget["id"], json!("w1"));
    // Seeded defaults plus the override, visible in both props and state
    assert_eq!(widget["state"]["enabled"], json!(true));
    assert_eq!(widget["state"]["visible"], json!(true));
    assert_eq!(widget["state"]["class"], json!("alert"));
    assert_eq!(widget["props"]["class"], json!("alert"));

    let group = &snapshot["groups"][0];
    assert_eq!(group["id"], json!("g1"));
    assert_eq!(group["collapsed"], json!(true));
}

#[tokio::test(start_paused = true)]
async fn test_state_overrides_win_over_props() {
    let coordinator = test_coordinator();

    let mut props = serde_json::Map::new();
    props.insert("label".to_string(), json!("Initial"));
    coordinator
        .register(
            None,
            None,
            Some(WidgetSpec::new("w1", "text").with_props(props)),
        )
        .unwrap();
    coordinator.set_state("w1", "label", json!("Overridden"));

    let (_conn, mut rx) = coordinator.connect(None).unwrap();
    let snapshot = rx.recv().await.unwrap().payload;

    assert_eq!(snapshot["widgets"][0]["props"]["label"], json!("Overridden"));
}

#[tokio::test(start_paused = true)]
async fn test_defaults_seed_once_across_redeploys() {
    let coordinator = test_coordinator();

    coordinator
        .register(None, None, Some(WidgetSpec::new("w1", "gauge")))
        .unwrap();
    coordinator.set_state("w1", "enabled", json!(false));

    // Redeploy of the same widget id
    coordinator
        .register(None, None, Some(WidgetSpec::new("w1", "gauge")))
        .unwrap();

    assert_eq!(coordinator.state_of("w1")["enabled"], json!(false));
}

#[tokio::test(start_paused = true)]
async fn test_deregistration_cascade_reaches_snapshot() {
    let coordinator = test_coordinator();

    coordinator
        .register(
            Some(page("p1")),
            Some(group("g1", "p1")),
            Some(WidgetSpec::new("w1", "gauge")),
        )
        .unwrap();
    sleep(Duration::from_millis(400)).await;

    let outcome = coordinator.deregister(None, None, Some("w1"));
    assert_eq!(outcome.removed_widgets, vec!["w1"]);
    assert_eq!(outcome.removed_groups, vec!["g1"]);
    assert_eq!(outcome.removed_pages, vec!["p1"]);

    let (_conn, mut rx) = coordinator.connect(None).unwrap();
    let snapshot = rx.recv().await.unwrap().payload;
    assert!(snapshot["widgets"].as_array().unwrap().is_empty());
    assert!(snapshot["groups"].as_array().unwrap().is_empty());
    assert!(snapshot["pages"].as_array().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_widgetless_group_can_be_deregistered() {
    let coordinator = test_coordinator();

    // A container registered without any widget
    coordinator
        .register(Some(page("p1")), Some(group("g1", "p1")), None)
        .unwrap();

    let (_conn, mut rx) = coordinator.connect(None).unwrap();
    let snapshot = rx.recv().await.unwrap().payload;
    assert_eq!(snapshot["groups"].as_array().unwrap().len(), 1);

    let outcome = coordinator.deregister(None, Some("g1"), None);
    assert_eq!(outcome.removed_groups, vec!["g1"]);
    assert_eq!(outcome.removed_pages, vec!["p1"]);

    sleep(Duration::from_millis(400)).await;
    let snapshot = rx.recv().await.unwrap().payload;
    assert!(snapshot["groups"].as_array().unwrap().is_empty());
    assert!(snapshot["pages"].as_array().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_between_mutation_and_emission_sees_current_state() {
    let coordinator = test_coordinator();

    coordinator
        .register(None, None, Some(WidgetSpec::new("w1", "gauge")))
        .unwrap();
    coordinator.set_state("w1", "visible", json!(false));

    // No debounce interval has elapsed, but the new client still sees
    // the merged-current view
    let (_conn, mut rx) = coordinator.connect(None).unwrap();
    let snapshot = rx.recv().await.unwrap().payload;
    assert_eq!(snapshot["widgets"][0]["state"]["visible"], json!(false));
}

#[tokio::test(start_paused = true)]
async fn test_close_during_pending_debounce_emits_nothing() {
    let coordinator = test_coordinator();
    let (_conn, mut rx) = coordinator.connect(None).unwrap();
    let _initial = rx.recv().await.unwrap();

    coordinator
        .register(None, None, Some(WidgetSpec::new("w1", "gauge")))
        .unwrap();
    coordinator.close();

    sleep(Duration::from_millis(400)).await;

    // Teardown dropped the channel without a further emission
    assert!(rx.recv().await.is_none());
    assert!(coordinator.is_closed());
    assert_eq!(coordinator.connection_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_register_after_close_is_rejected() {
    let coordinator = test_coordinator();
    coordinator.close();

    let result = coordinator.register(None, None, Some(WidgetSpec::new("w1", "gauge")));
    assert!(matches!(result, Err(SyncError::CoordinatorClosed)));
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_close_is_rejected() {
    let coordinator = test_coordinator();
    coordinator.close();

    let result = coordinator.connect(None);
    assert!(matches!(result, Err(SyncError::CoordinatorClosed)));
    assert_eq!(coordinator.connection_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_emit_pushes_directly_to_all_connections() {
    let coordinator = test_coordinator();
    let (_a, mut rx_a) = coordinator.connect(None).unwrap();
    let (_b, mut rx_b) = coordinator.connect(None).unwrap();
    let _ = rx_a.recv().await;
    let _ = rx_b.recv().await;

    let sent = coordinator
        .emit("notification", json!({"text": "deploy complete"}), None)
        .await;

    assert_eq!(sent, 2);
    assert_eq!(rx_a.recv().await.unwrap().event, "notification");
    assert_eq!(rx_b.recv().await.unwrap().event, "notification");
}

#[tokio::test(start_paused = true)]
async fn test_notify_input_uses_widget_scoped_event_name() {
    let coordinator = test_coordinator();
    coordinator
        .register(None, None, Some(WidgetSpec::new("w1", "text")))
        .unwrap();

    let (_conn, mut rx) = coordinator.connect(None).unwrap();
    let _ = rx.recv().await;

    let sent = coordinator.notify_input("w1", json!({"payload": 9})).await;
    assert_eq!(sent, 1);

    let event = rx.recv().await.unwrap();
    assert_eq!(event.event, "msg-input:w1");
    assert_eq!(event.payload["payload"], json!(9));
}
