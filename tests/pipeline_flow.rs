//! End-to-end pipeline tests driving the library with instrumented stage
//! doubles at the transport seam and a recording notifier.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use serde_json::Value;

use trip_orchestrator::config::RetryConfig;
use trip_orchestrator::notify::{Notification, NotificationType, Notify, RunContext};
use trip_orchestrator::pipeline::Coordinator;
use trip_orchestrator::registry::{RequestRegistry, RunStatus};
use trip_orchestrator::runner::BackgroundRunner;
use trip_orchestrator::stage::StageEndpoints;
use trip_orchestrator::stage_client::{
    StageCallError, StageClient, StageTransport, TransportReply,
};

const GENERATE_URL: &str = "http://gen/generate";
const PARSE_URL: &str = "http://parse/parse";
const GEOCODE_URL: &str = "http://geo/geocode";
const RENDER_URL: &str = "http://map/render";

fn endpoints() -> StageEndpoints {
    StageEndpoints {
        generation: GENERATE_URL.to_string(),
        extraction: PARSE_URL.to_string(),
        geocoding: GEOCODE_URL.to_string(),
        rendering: RENDER_URL.to_string(),
    }
}

fn generate_body() -> &'static str {
    r#"{"raw_text": "Day 1: Colosseum. Day 2: Vatican. Day 3: Trastevere."}"#
}

fn parse_body() -> &'static str {
    r#"{
        "sequence": ["Rome"],
        "cities": [{"name": "Rome", "priority": "mandatory"}],
        "landmarks": ["Colosseum", "Vatican"],
        "hotels": [],
        "roads": [],
        "transport_segments": [],
        "parse_strategy": "hybrid"
    }"#
}

fn geocode_body() -> &'static str {
    r#"{
        "cities": [{"name": "Rome", "lat": 41.9028, "lon": 12.4964, "type": "city"}],
        "landmarks": [
            {"name": "Colosseum", "lat": 41.8902, "lon": 12.4922, "type": "landmark"},
            {"name": "Vatican", "lat": 41.9029, "lon": 12.4534, "type": "landmark"}
        ],
        "hotels": [],
        "roads": [],
        "transport_segments": [],
        "bounding_box": {"min_lat": 41.8902, "max_lat": 41.9029, "min_lon": 12.4534, "max_lon": 12.4964}
    }"#
}

fn render_body() -> &'static str {
    "<html><body><div id=\"map\">Rome</div></body></html>"
}

/// Scripted transport: records call order and fails the stages it is told
/// to, for the first `fail_first` attempts (`u32::MAX` = always).
struct ScriptedTransport {
    calls: Mutex<Vec<String>>,
    failing_url: Option<&'static str>,
    fail_first: u32,
    failures_sent: AtomicU32,
}

impl ScriptedTransport {
    fn healthy() -> Self {
        ScriptedTransport {
            calls: Mutex::new(Vec::new()),
            failing_url: None,
            fail_first: 0,
            failures_sent: AtomicU32::new(0),
        }
    }

    fn failing(url: &'static str, fail_first: u32) -> Self {
        ScriptedTransport {
            calls: Mutex::new(Vec::new()),
            failing_url: Some(url),
            fail_first,
            failures_sent: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StageTransport for ScriptedTransport {
    async fn post_json(&self, url: &str, _: &Value) -> Result<TransportReply, StageCallError> {
        self.calls.lock().unwrap().push(url.to_string());

        if self.failing_url == Some(url)
            && self.failures_sent.fetch_add(1, Ordering::SeqCst) < self.fail_first
        {
            return Ok(TransportReply {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: Bytes::from_static(b"geocoder offline"),
            });
        }

        let body = match url {
            GENERATE_URL => generate_body(),
            PARSE_URL => parse_body(),
            GEOCODE_URL => geocode_body(),
            RENDER_URL => render_body(),
            other => panic!("unexpected stage url: {other}"),
        };
        Ok(TransportReply {
            status: StatusCode::OK,
            body: Bytes::from_static(body.as_bytes()),
        })
    }
}

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn events(&self) -> Vec<Notification> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notify for RecordingNotifier {
    async fn notify(&self, _: &str, notification: &Notification, _: Option<&str>) {
        self.events.lock().unwrap().push(notification.clone());
    }
}

struct Harness {
    transport: Arc<ScriptedTransport>,
    notifier: Arc<RecordingNotifier>,
    registry: Arc<RequestRegistry>,
    runner: BackgroundRunner,
}

fn harness(transport: ScriptedTransport) -> Harness {
    let transport = Arc::new(transport);
    let notifier = Arc::new(RecordingNotifier::default());
    let registry = Arc::new(RequestRegistry::new());
    let retry = RetryConfig {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    };
    let stages = StageClient::new(
        transport.clone(),
        endpoints(),
        retry,
        notifier.clone(),
        false,
    );
    let coordinator = Arc::new(Coordinator::new(stages, notifier.clone(), registry.clone()));
    Harness {
        transport,
        notifier,
        registry,
        runner: BackgroundRunner::new(coordinator),
    }
}

async fn poll_terminal(registry: &RequestRegistry, request_id: &str) -> RunStatus {
    for _ in 0..500 {
        if let Some(state) = registry.get(request_id) {
            if state.status.is_terminal() {
                return state.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("run {request_id} never reached a terminal state");
}

fn submit(h: &Harness, request_id: &str) {
    h.registry.create(request_id, "u1");
    h.runner.submit(
        RunContext::new(request_id, None),
        "3 days in Rome".to_string(),
    );
}

#[tokio::test]
async fn all_stages_succeed_end_to_end() {
    let h = harness(ScriptedTransport::healthy());
    submit(&h, "req-ok");

    let status = poll_terminal(&h.registry, "req-ok").await;
    assert_eq!(status, RunStatus::Completed);

    let state = h.registry.get("req-ok").unwrap();
    let result = state.result.unwrap();
    assert!(result.travel_plan.contains("Colosseum"));
    assert!(result.map_html.contains("map"));
    assert_eq!(result.enriched_data.cities.len(), 1);
    assert!(result.enriched_data.bounding_box.is_some());
    assert!(state.end_time.is_some());
    assert_eq!(
        state.last_milestone.as_deref(),
        Some("Map rendered successfully")
    );

    // Stages were invoked exactly once each, in pipeline order.
    assert_eq!(
        h.transport.calls(),
        vec![GENERATE_URL, PARSE_URL, GEOCODE_URL, RENDER_URL]
    );

    // Exactly four successful stage-call notifications, in call order.
    let completions: Vec<String> = h
        .notifier
        .events()
        .into_iter()
        .filter(|n| {
            n.kind == NotificationType::Success && n.message.contains("stage completed successfully")
        })
        .map(|n| n.message)
        .collect();
    assert_eq!(
        completions,
        vec![
            "generation stage completed successfully",
            "extraction stage completed successfully",
            "geocoding stage completed successfully",
            "rendering stage completed successfully",
        ]
    );
}

#[tokio::test]
async fn geocoding_failure_short_circuits_rendering() {
    let h = harness(ScriptedTransport::failing(GEOCODE_URL, u32::MAX));
    submit(&h, "req-geo-down");

    let status = poll_terminal(&h.registry, "req-geo-down").await;
    assert_eq!(status, RunStatus::Error);

    let state = h.registry.get("req-geo-down").unwrap();
    let detail = state.error.unwrap();
    assert!(detail.contains("geocoding"), "detail was: {detail}");
    assert!(state.result.is_none());

    let calls = h.transport.calls();
    // Geocoding consumed its whole attempt budget, rendering never ran.
    assert_eq!(calls.iter().filter(|u| *u == GEOCODE_URL).count(), 3);
    assert!(!calls.iter().any(|u| u == RENDER_URL));

    // An error notification carries the failing stage's detail.
    let errors: Vec<Notification> = h
        .notifier
        .events()
        .into_iter()
        .filter(|n| n.kind == NotificationType::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("geocoding"));
    assert!(
        errors[0].details.as_ref().unwrap()["error"]
            .as_str()
            .unwrap()
            .contains("geocoder offline")
    );
}

#[tokio::test]
async fn transient_stage_failure_recovers_within_budget() {
    // Geocoding fails twice, then succeeds on the final attempt.
    let h = harness(ScriptedTransport::failing(GEOCODE_URL, 2));
    submit(&h, "req-flaky");

    let status = poll_terminal(&h.registry, "req-flaky").await;
    assert_eq!(status, RunStatus::Completed);

    let calls = h.transport.calls();
    assert_eq!(calls.iter().filter(|u| *u == GEOCODE_URL).count(), 3);
    assert_eq!(calls.last().map(String::as_str), Some(RENDER_URL));
}

#[tokio::test]
async fn generation_failure_invokes_no_later_stage() {
    let h = harness(ScriptedTransport::failing(GENERATE_URL, u32::MAX));
    submit(&h, "req-gen-down");

    let status = poll_terminal(&h.registry, "req-gen-down").await;
    assert_eq!(status, RunStatus::Error);

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|u| u == GENERATE_URL));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_runs_do_not_interfere() {
    let h = Arc::new(harness(ScriptedTransport::healthy()));
    let ids: Vec<String> = (0..8).map(|i| format!("req-{i}")).collect();
    for id in &ids {
        submit(&h, id);
    }
    for id in &ids {
        assert_eq!(poll_terminal(&h.registry, id).await, RunStatus::Completed);
    }
    assert_eq!(h.registry.len(), 8);
}

#[tokio::test]
async fn milestone_notifications_follow_stage_order() {
    let h = harness(ScriptedTransport::healthy());
    submit(&h, "req-notify");
    poll_terminal(&h.registry, "req-notify").await;

    let milestones: Vec<Notification> = h
        .notifier
        .events()
        .into_iter()
        .filter(|n| n.kind == NotificationType::Success && !n.message.contains("stage completed"))
        .collect();
    let messages: Vec<&str> = milestones.iter().map(|n| n.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "Travel plan generated successfully",
            "Travel plan parsed successfully",
            "Geotagging completed successfully",
            "Map rendered successfully",
        ]
    );

    // Detail payloads keep the callback wire shape: the generated plan is
    // previewed, and the count summaries are nested under their data keys.
    let generated = milestones[0].details.as_ref().unwrap();
    assert!(generated["travel_plan"].as_str().unwrap().contains("Colosseum"));
    let parsed = milestones[1].details.as_ref().unwrap();
    assert_eq!(parsed["parsed_data"]["cities"], 1);
    assert_eq!(parsed["parsed_data"]["landmarks"], 2);
    let geo = milestones[2].details.as_ref().unwrap();
    assert_eq!(geo["geo_data"]["landmarks"], 2);
    assert_eq!(geo["geo_data"]["bounding_box"], true);
}

#[tokio::test]
async fn run_handles_are_tracked_until_completion() {
    let h = harness(ScriptedTransport::healthy());
    submit(&h, "req-handle");

    // The handle is registered at submission, before the run is polled.
    assert!(h.runner.is_running("req-handle"));
    assert!(!h.runner.is_running("never-issued"));

    poll_terminal(&h.registry, "req-handle").await;
    for _ in 0..100 {
        if !h.runner.is_running("req-handle") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!h.runner.is_running("req-handle"));
}
