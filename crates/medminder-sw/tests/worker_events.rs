//! End-to-end event tests against the in-memory host.

use medminder_sw::{
    ClickOutcome, DecodeTier, FetchRequest, LogKind, LogMessage, MemoryHost, MessageOutcome,
    NotificationClickEvent, NotificationCloseEvent, PushEvent, PushOutcome, ServiceWorker,
    ServiceWorkerError, WorkerConfig,
};
use serde_json::json;
use url::Url;

const ORIGIN: &str = "https://app.medminder.test";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("medminder_sw=debug")
        .with_test_writer()
        .try_init();
}

fn config(cache_name: &str) -> WorkerConfig {
    WorkerConfig::for_origin(ORIGIN)
        .unwrap()
        .with_cache_name(cache_name)
}

/// A host with one observer window so relayed logs can be inspected.
async fn host_with_observer() -> (MemoryHost, String) {
    let host = MemoryHost::new();
    let observer = host
        .clients
        .add_window(&format!("{}/settings", ORIGIN))
        .await
        .unwrap();
    (host, observer)
}

async fn logs(host: &MemoryHost, client_id: &str) -> Vec<LogMessage> {
    host.clients
        .delivered_to(client_id)
        .await
        .iter()
        .map(|raw| serde_json::from_str(raw).unwrap())
        .collect()
}

async fn serve_shell(host: &MemoryHost) {
    host.network.serve_ok(&format!("{}/", ORIGIN), "<html>").await;
    host.network
        .serve_ok(&format!("{}/manifest.json", ORIGIN), "{}")
        .await;
    host.network
        .serve_ok(&format!("{}/notification-icon.png", ORIGIN), "png")
        .await;
}

fn url(path: &str) -> Url {
    Url::parse(&format!("{}{}", ORIGIN, path)).unwrap()
}

// ==================== Lifecycle ====================

#[tokio::test]
async fn install_then_activate_replaces_old_versions() {
    init_tracing();
    let (host, _) = host_with_observer().await;
    serve_shell(&host).await;
    host.caches.seed("it-lifecycle-v1", Vec::new()).await;
    host.caches.seed("it-lifecycle-v2", Vec::new()).await;

    let worker = ServiceWorker::new(config("it-lifecycle-v3"), host.host()).unwrap();

    let cached = worker.install().finished().await.unwrap().unwrap();
    assert_eq!(cached, 3);

    let report = worker.activate().finished().await.unwrap();
    assert_eq!(report.deleted.len(), 2);
    assert_eq!(host.caches.names().await, vec!["it-lifecycle-v3".to_string()]);
    assert!(host.clients.is_claimed());
    assert!(host.registration.skipped_waiting());
}

#[tokio::test]
async fn activate_retains_current_bucket_for_any_version() {
    for version in [1u32, 2, 9, 40] {
        let host = MemoryHost::new();
        let current = format!("it-versions-{}-v{}", version, version);
        for other in 0..3 {
            host.caches.seed(&format!("it-versions-old-{}", other), Vec::new()).await;
        }
        host.caches.seed(&current, Vec::new()).await;

        let worker = ServiceWorker::new(config(&current), host.host()).unwrap();
        worker.activate().finished().await.unwrap();

        assert_eq!(host.caches.names().await, vec![current]);
    }
}

#[tokio::test]
async fn install_fails_when_any_asset_is_missing() {
    let (host, observer) = host_with_observer().await;
    host.network.serve_ok(&format!("{}/", ORIGIN), "<html>").await;
    host.network
        .serve_ok(&format!("{}/manifest.json", ORIGIN), "{}")
        .await;

    let worker = ServiceWorker::new(config("it-strict-v1"), host.host()).unwrap();
    let result = worker.install().finished().await.unwrap();

    assert!(matches!(
        result,
        Err(ServiceWorkerError::PrecacheFailed { ref url, .. }) if url.ends_with("/notification-icon.png")
    ));
    assert!(host.caches.bucket("it-strict-v1").await.unwrap().is_empty());

    let logs = logs(&host, &observer).await;
    assert!(logs
        .iter()
        .any(|l| l.log_type == LogKind::Error && l.message == "Precache failed"));
}

#[tokio::test]
async fn install_fails_when_offline() {
    let host = MemoryHost::new();
    host.network.set_offline(true);

    let worker = ServiceWorker::new(config("it-offline-v1"), host.host()).unwrap();
    let result = worker.install().finished().await.unwrap();
    assert!(matches!(result, Err(ServiceWorkerError::PrecacheFailed { .. })));
}

// ==================== Fetch ====================

#[tokio::test]
async fn cached_requests_never_reach_network() {
    let host = MemoryHost::new();
    serve_shell(&host).await;
    let worker = ServiceWorker::new(config("it-fetch-v1"), host.host()).unwrap();
    worker.install().finished().await.unwrap().unwrap();
    let fetched_during_install = host.network.requests().await.len();

    let response = worker
        .fetch(FetchRequest::navigate(url("/")))
        .finished()
        .await
        .unwrap()
        .unwrap();
    assert!(response.from_cache);
    assert_eq!(host.network.requests().await.len(), fetched_during_install);

    host.network
        .serve_ok(&format!("{}/api/schedule", ORIGIN), "[]")
        .await;
    let response = worker
        .fetch(FetchRequest::get(url("/api/schedule")))
        .finished()
        .await
        .unwrap()
        .unwrap();
    assert!(!response.from_cache);
    assert_eq!(
        host.network.requests().await.last().map(String::as_str),
        Some("https://app.medminder.test/api/schedule")
    );
}

#[tokio::test]
async fn writes_to_precached_url_reach_network() {
    let host = MemoryHost::new();
    serve_shell(&host).await;
    let worker = ServiceWorker::new(config("it-fetch-post-v1"), host.host()).unwrap();
    worker.install().finished().await.unwrap().unwrap();
    let fetched_during_install = host.network.requests().await.len();

    let mut request = FetchRequest::get(url("/"));
    request.method = "POST".to_string();
    let response = worker.fetch(request).finished().await.unwrap().unwrap();
    assert!(!response.from_cache);
    assert_eq!(host.network.requests().await.len(), fetched_during_install + 1);
}

#[tokio::test]
async fn uncached_request_fails_when_offline() {
    let host = MemoryHost::new();
    host.network.set_offline(true);
    let worker = ServiceWorker::new(config("it-fetch-offline-v1"), host.host()).unwrap();

    let result = worker
        .fetch(FetchRequest::get(url("/api/schedule")))
        .finished()
        .await
        .unwrap();
    assert!(matches!(result, Err(ServiceWorkerError::NetworkError(_))));
}

// ==================== Push ====================

#[tokio::test]
async fn json_payload_fields_are_used_verbatim() {
    init_tracing();
    let (host, observer) = host_with_observer().await;
    let worker = ServiceWorker::new(config("it-push-v1"), host.host()).unwrap();

    let report = worker
        .push(PushEvent::json(&json!({
            "title": "Metformin 500mg",
            "body": "Take with dinner",
            "data": { "reminderId": "r-12" }
        })))
        .finished()
        .await
        .unwrap();

    assert_eq!(report.decode, DecodeTier::Json);
    assert!(matches!(report.outcome, PushOutcome::Primary(_)));

    let shown = host.notifications.shown().await;
    assert_eq!(shown.len(), 1);
    let request = &shown[0].1;
    assert_eq!(request.title, "Metformin 500mg");
    assert_eq!(request.options.body, "Take with dinner");
    assert_eq!(request.options.data, json!({ "reminderId": "r-12" }));
    assert!(request.options.require_interaction);
    assert_eq!(request.options.icon, "/notification-icon.png");
    assert_eq!(request.options.badge.as_deref(), Some("/notification-icon.png"));

    let logs = logs(&host, &observer).await;
    assert!(logs
        .iter()
        .any(|l| l.log_type == LogKind::Success && l.message == "Push data parsed as JSON"));
}

#[tokio::test]
async fn text_payload_becomes_body_with_warning() {
    let (host, observer) = host_with_observer().await;
    let worker = ServiceWorker::new(config("it-push-text-v1"), host.host()).unwrap();

    let report = worker
        .push(PushEvent::text("Time for your inhaler"))
        .finished()
        .await
        .unwrap();
    assert_eq!(report.decode, DecodeTier::Text);

    let shown = host.notifications.shown().await;
    assert_eq!(shown[0].1.options.body, "Time for your inhaler");
    assert_eq!(shown[0].1.title, "Medication Reminder");

    let logs = logs(&host, &observer).await;
    assert!(logs
        .iter()
        .any(|l| l.log_type == LogKind::Warning && l.message.contains("text fallback")));
}

#[tokio::test]
async fn missing_payload_uses_defaults() {
    let (host, observer) = host_with_observer().await;
    let config = config("it-push-empty-v1");
    let default_body = config.default_body.clone();
    let worker = ServiceWorker::new(config, host.host()).unwrap();

    let report = worker.push(PushEvent::empty()).finished().await.unwrap();
    assert_eq!(report.decode, DecodeTier::Absent);

    let shown = host.notifications.shown().await;
    assert_eq!(shown[0].1.title, "Medication Reminder");
    assert_eq!(shown[0].1.options.body, default_body);
    assert_eq!(shown[0].1.options.data, json!({}));

    let logs = logs(&host, &observer).await;
    assert!(logs
        .iter()
        .any(|l| l.log_type == LogKind::Warning && l.message.contains("No data")));
}

#[tokio::test]
async fn binary_payload_falls_back_to_empty() {
    let (host, observer) = host_with_observer().await;
    let worker = ServiceWorker::new(config("it-push-binary-v1"), host.host()).unwrap();

    let report = worker
        .push(PushEvent::bytes(vec![0xc3, 0x28, 0xff]))
        .finished()
        .await
        .unwrap();
    assert_eq!(report.decode, DecodeTier::Empty);
    assert!(matches!(report.outcome, PushOutcome::Primary(_)));

    let logs = logs(&host, &observer).await;
    assert!(logs.iter().any(|l| l.log_type == LogKind::Error));
}

#[tokio::test]
async fn primary_render_failure_uses_fallback() {
    let (host, _) = host_with_observer().await;
    host.notifications.fail_next(1);
    let config = config("it-render-v1");
    let (fallback_title, fallback_body) = (config.fallback_title.clone(), config.fallback_body.clone());
    let worker = ServiceWorker::new(config, host.host()).unwrap();

    let report = worker
        .push(PushEvent::json(&json!({ "title": "Lisinopril", "body": "10mg" })))
        .finished()
        .await
        .unwrap();
    assert!(matches!(report.outcome, PushOutcome::Fallback(_)));

    let attempts = host.notifications.attempts().await;
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].title, "Lisinopril");
    assert_eq!(attempts[1].title, fallback_title);
    assert_eq!(attempts[1].options.body, fallback_body);
    assert_eq!(attempts[1].options.icon, attempts[0].options.icon);
}

#[tokio::test]
async fn both_render_failures_are_logged_and_swallowed() {
    let (host, observer) = host_with_observer().await;
    host.notifications.fail_next(2);
    let worker = ServiceWorker::new(config("it-render-fail-v1"), host.host()).unwrap();

    let report = worker
        .push(PushEvent::text("Take your pills"))
        .finished()
        .await
        .unwrap();
    assert_eq!(report.outcome, PushOutcome::Failed);
    assert!(host.notifications.shown().await.is_empty());
    assert_eq!(host.notifications.attempts().await.len(), 2);

    let errors: Vec<String> = logs(&host, &observer)
        .await
        .into_iter()
        .filter(|l| l.log_type == LogKind::Error)
        .map(|l| l.message)
        .collect();
    assert_eq!(
        errors,
        vec![
            "Failed to show notification".to_string(),
            "Failed to show fallback notification".to_string(),
        ]
    );
}

// ==================== Notification clicks ====================

#[tokio::test]
async fn click_focuses_matching_window() {
    let host = MemoryHost::new();
    host.clients.add_window("https://other.test/").await.unwrap();
    let app = host.clients.add_window(&format!("{}/today", ORIGIN)).await.unwrap();
    let worker = ServiceWorker::new(config("it-click-v1"), host.host()).unwrap();

    let report = worker.push(PushEvent::empty()).finished().await.unwrap();
    let PushOutcome::Primary(id) = report.outcome else {
        panic!("expected primary notification, got {:?}", report.outcome);
    };

    let outcome = worker
        .notification_click(NotificationClickEvent::new(id))
        .finished()
        .await
        .unwrap();
    assert_eq!(outcome, ClickOutcome::Focused(app.clone()));

    let clients = host.clients.all().await;
    assert_eq!(clients.len(), 2);
    assert!(clients.iter().any(|c| c.id == app && c.focused));
    assert!(host.notifications.shown().await.is_empty());
}

#[tokio::test]
async fn click_without_windows_opens_one() {
    let host = MemoryHost::new();
    let worker = ServiceWorker::new(config("it-click-open-v1"), host.host()).unwrap();
    let report = worker.push(PushEvent::empty()).finished().await.unwrap();
    let PushOutcome::Primary(id) = report.outcome else {
        panic!("expected primary notification, got {:?}", report.outcome);
    };

    let outcome = worker
        .notification_click(NotificationClickEvent::new(id))
        .finished()
        .await
        .unwrap();
    assert!(matches!(outcome, ClickOutcome::Opened(_)));

    let clients = host.clients.all().await;
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].url.as_str(), "https://app.medminder.test/notifications");
}

#[tokio::test]
async fn close_event_is_relayed() {
    let (host, observer) = host_with_observer().await;
    let worker = ServiceWorker::new(config("it-close-v1"), host.host()).unwrap();
    let report = worker.push(PushEvent::empty()).finished().await.unwrap();
    let PushOutcome::Primary(id) = report.outcome else {
        panic!("expected primary notification, got {:?}", report.outcome);
    };

    worker
        .notification_close(NotificationCloseEvent { notification: id })
        .finished()
        .await
        .unwrap();

    let logs = logs(&host, &observer).await;
    assert_eq!(logs.last().map(|l| l.message.as_str()), Some("Notification dismissed"));
}

// ==================== Messages & relay ====================

#[tokio::test]
async fn control_messages() {
    let (host, observer) = host_with_observer().await;
    let worker = ServiceWorker::new(config("it-messages-v1"), host.host()).unwrap();

    let ack = worker
        .message(json!({ "type": "TEST_CONNECTION" }))
        .finished()
        .await
        .unwrap();
    assert_eq!(ack, MessageOutcome::Acknowledged);
    assert_eq!(logs(&host, &observer).await.len(), 1);
    assert_eq!(logs(&host, &observer).await[0].log_type, LogKind::Success);

    let logged = worker
        .message(json!({ "type": "TEST_LOG" }))
        .finished()
        .await
        .unwrap();
    assert_eq!(logged, MessageOutcome::Logged(2));
    assert_eq!(logs(&host, &observer).await.len(), 3);

    let ignored = worker
        .message(json!({ "type": "SOMETHING_ELSE" }))
        .finished()
        .await
        .unwrap();
    assert_eq!(ignored, MessageOutcome::Ignored);
    assert_eq!(logs(&host, &observer).await.len(), 3);
}

#[tokio::test]
async fn relay_failure_does_not_affect_push() {
    let (host, observer) = host_with_observer().await;
    let broken = host
        .clients
        .add_window(&format!("{}/broken", ORIGIN))
        .await
        .unwrap();
    host.clients.set_unreachable(&broken).await;
    let worker = ServiceWorker::new(config("it-relay-v1"), host.host()).unwrap();

    let report = worker
        .push(PushEvent::text("Vitamin D"))
        .finished()
        .await
        .unwrap();
    assert!(matches!(report.outcome, PushOutcome::Primary(_)));
    assert!(!logs(&host, &observer).await.is_empty());
    assert!(host.clients.delivered_to(&broken).await.is_empty());

    for log in logs(&host, &observer).await {
        assert_eq!(log.message_type, "SW_LOG");
        assert!(chrono::DateTime::parse_from_rfc3339(&log.timestamp).is_ok());
    }
}
