use cyclops_realtime::{
    AdminHub, AgentCredentials, AgentGateway, AgentRegistry, ConnectionHandle, EventBus, Inbound,
    LivenessMonitor, Outbound, OutboundReceiver, PreviewDefaults, PreviewRelay, RecordingService,
    SessionHandler, SweepReport, forward_events,
};
use cyclops_storage::{
    InMemoryLocationDirectory, InMemoryRecordingJobStore, LocationRecord, RecordingJobStatus,
    RecordingJobStore,
};
use domain::permissions::{AGENT_MONITOR, AGENT_PREVIEW};
use domain::{AgentActivity, PeerMetadata, TenantContext};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    registry: Arc<AgentRegistry>,
    relay: Arc<PreviewRelay>,
    jobs: Arc<InMemoryRecordingJobStore>,
    gateway: AgentGateway,
    hub: AdminHub,
}

fn harness() -> Harness {
    let registry = Arc::new(AgentRegistry::new(EventBus::new(64)));
    let relay = Arc::new(PreviewRelay::new(registry.clone(), PreviewDefaults::default()));
    let directory = Arc::new(InMemoryLocationDirectory::with_locations(vec![LocationRecord {
        location_id: "loc-1".to_string(),
        tenant_id: "tenant-1".to_string(),
        name: "court 1".to_string(),
        api_key: "key-1".to_string(),
    }]));
    let jobs = Arc::new(InMemoryRecordingJobStore::new());
    let gateway = AgentGateway::new(registry.clone(), relay.clone(), directory, jobs.clone());
    let recordings = RecordingService::new(registry.clone(), jobs.clone(), 2);
    let hub = AdminHub::new(registry.clone(), relay.clone(), recordings);
    Harness {
        registry,
        relay,
        jobs,
        gateway,
        hub,
    }
}

fn connect_agent(h: &Harness) -> OutboundReceiver {
    let (handle, rx) = ConnectionHandle::channel("agent", 16);
    h.gateway.attach(
        AgentCredentials {
            location_id: "loc-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            api_key: "key-1".to_string(),
        },
        handle,
        PeerMetadata {
            remote_address: "10.0.0.5".to_string(),
            user_agent: "agent/1.0".to_string(),
            api_key: Some("key-1".to_string()),
        },
    );
    rx
}

fn texts(rx: &mut OutboundReceiver) -> Vec<Value> {
    rx.drain()
        .into_iter()
        .filter_map(|message| match message {
            Outbound::Text(text) => serde_json::from_str(&text).ok(),
            _ => None,
        })
        .collect()
}

fn operator(permissions: &[&str]) -> TenantContext {
    TenantContext::new(
        "tenant-1",
        "user-1",
        Vec::new(),
        permissions.iter().map(|perm| perm.to_string()).collect(),
    )
}

#[tokio::test]
async fn snapshot_first_without_secrets() {
    let h = harness();
    let _agent_rx = connect_agent(&h);
    let (handle, mut rx) = ConnectionHandle::channel("op", 16);
    let (_session, _events) = h.hub.connect(handle, None);

    let messages = texts(&mut rx);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "snapshot");
    let agent = &messages[0]["agents"][0];
    assert_eq!(agent["locationId"], "loc-1");
    assert_eq!(agent["status"], "connected");
    assert_eq!(agent["remoteAddress"], "10.0.0.5");
    assert!(agent.get("apiKey").is_none());
}

#[tokio::test]
async fn events_follow_snapshot() {
    let h = harness();
    let (handle, mut rx) = ConnectionHandle::channel("op", 16);
    let (_session, events) = h.hub.connect(handle.clone(), None);
    let forwarder = tokio::spawn(forward_events(handle.clone(), events));

    let _agent_rx = connect_agent(&h);
    let mut received = Vec::new();
    while received.len() < 3 {
        let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timely")
            .expect("message");
        if let Outbound::Text(text) = message {
            received.push(serde_json::from_str::<Value>(&text).expect("json"));
        }
    }
    let kinds: Vec<_> = received.iter().map(|value| value["type"].clone()).collect();
    assert_eq!(kinds, vec!["snapshot", "connected", "upsert"]);
    assert!(received[1]["agent"].get("apiKey").is_none());

    forwarder.abort();
}

#[tokio::test]
async fn preview_requests_drive_agent_commands() {
    let h = harness();
    let mut agent_rx = connect_agent(&h);
    let (handle, _rx) = ConnectionHandle::channel("op", 16);
    let (session, _events) = h.hub.connect(handle.clone(), None);

    session
        .handle_text(r#"{"type":"preview-start","locationId":"loc-1","fps":5}"#)
        .await;
    session.handle_text(r#"{"type":"preview-start","locationId":""}"#).await;
    assert_eq!(h.relay.watcher_count("loc-1"), 1);
    session
        .handle_text(r#"{"type":"preview-stop","locationId":"loc-1"}"#)
        .await;

    let commands = texts(&mut agent_rx);
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0]["cmd"], "startPreview");
    assert_eq!(commands[0]["fps"], 5);
    assert_eq!(commands[0]["quality"], 6);
    assert_eq!(commands[1]["cmd"], "stopPreview");
}

#[tokio::test]
async fn closing_admin_stops_its_previews() {
    let h = harness();
    let mut agent_rx = connect_agent(&h);
    let (handle, _rx) = ConnectionHandle::channel("op", 16);
    let (session, _events) = h.hub.connect(handle, None);
    session
        .handle_text(r#"{"type":"preview-start","locationId":"loc-1"}"#)
        .await;
    agent_rx.drain();

    session.finish();
    assert_eq!(h.relay.watcher_count("loc-1"), 0);
    assert_eq!(texts(&mut agent_rx)[0]["cmd"], "stopPreview");
}

#[tokio::test]
async fn operator_without_permission_cannot_preview() {
    let h = harness();
    let mut agent_rx = connect_agent(&h);
    let (handle, _rx) = ConnectionHandle::channel("op", 16);
    let (session, _events) = h.hub.connect(handle, Some(operator(&[AGENT_MONITOR])));

    session
        .handle_text(r#"{"type":"preview-start","locationId":"loc-1"}"#)
        .await;
    assert_eq!(h.relay.watcher_count("loc-1"), 0);
    assert!(texts(&mut agent_rx).is_empty());

    let (handle, _rx) = ConnectionHandle::channel("op-2", 16);
    let (session, _events) = h.hub.connect(handle, Some(operator(&[AGENT_PREVIEW])));
    session
        .handle_text(r#"{"type":"preview-start","locationId":"loc-1"}"#)
        .await;
    assert_eq!(h.relay.watcher_count("loc-1"), 1);
}

#[tokio::test]
async fn start_recording_acks_and_creates_job() {
    let h = harness();
    let mut agent_rx = connect_agent(&h);
    let (handle, mut rx) = ConnectionHandle::channel("op", 16);
    let (session, _events) = h.hub.connect(handle, None);
    rx.drain();

    session
        .handle_text(
            r#"{"type":"start_recording","locationId":"loc-1","durationSec":150,
                "recordingId":"rec_a","metadata":{"court":"A"}}"#,
        )
        .await;

    let ack = &texts(&mut rx)[0];
    assert_eq!(ack["type"], "start_recording_ack");
    assert_eq!(ack["status"], "ok");
    assert_eq!(ack["recordingId"], "rec_a");
    assert_eq!(ack["durationMinutes"], 2);

    let command = &texts(&mut agent_rx)[0];
    assert_eq!(command["cmd"], "startRecording");
    assert_eq!(command["recordingId"], "rec_a");
    assert_eq!(command["locationId"], "loc-1");
    assert_eq!(command["metadata"]["court"], "A");

    let record = h.registry.get("loc-1").expect("record");
    assert_eq!(record.activity, AgentActivity::Recording);
    let job = h.jobs.find_job("rec_a").await.expect("find").expect("job");
    assert_eq!(job.status, RecordingJobStatus::Recording);
    assert_eq!(job.duration_minutes, 2);

    session
        .handle_text(r#"{"type":"start_recording","locationId":"loc-1"}"#)
        .await;
    let busy = &texts(&mut rx)[0];
    assert_eq!(busy["status"], "error");
    assert_eq!(busy["error"], "agent busy");
}

#[tokio::test]
async fn start_recording_for_offline_agent_errors() {
    let h = harness();
    let (handle, mut rx) = ConnectionHandle::channel("op", 16);
    let (session, _events) = h.hub.connect(handle, None);
    rx.drain();

    session
        .handle_text(r#"{"type":"start_recording","locationId":"loc-1"}"#)
        .await;
    let ack = &texts(&mut rx)[0];
    assert_eq!(ack["status"], "error");
    assert_eq!(ack["error"], "agent offline");
    assert_eq!(ack["durationMinutes"], 2);
    assert!(ack.get("recordingId").is_none());
}

#[tokio::test]
async fn stop_recording_sends_command() {
    let h = harness();
    let mut agent_rx = connect_agent(&h);
    let (handle, mut rx) = ConnectionHandle::channel("op", 16);
    let (session, _events) = h.hub.connect(handle, None);
    rx.drain();

    session
        .handle_text(r#"{"type":"stop_recording","locationId":"loc-1"}"#)
        .await;
    assert_eq!(texts(&mut rx)[0]["type"], "stop_recording_ack");
    assert_eq!(texts(&mut agent_rx)[0]["cmd"], "stopRecording");
}

#[tokio::test]
async fn unknown_admin_messages_are_ignored() {
    let h = harness();
    let (handle, mut rx) = ConnectionHandle::channel("op", 16);
    let (session, _events) = h.hub.connect(handle, None);
    rx.drain();

    session.handle_text("{").await;
    session.handle_text(r#"{"type":"refresh"}"#).await;
    assert!(rx.drain().is_empty());
}

#[tokio::test]
async fn silent_operator_is_terminated_by_liveness_sweep() {
    let h = harness();
    let mut agent_rx = connect_agent(&h);
    let agent = h.registry.connection("loc-1").expect("agent connection");
    let (handle, rx) = ConnectionHandle::channel("op", 16);
    let (session, _events) = h.hub.connect(handle.clone(), None);
    session
        .handle_text(r#"{"type":"preview-start","locationId":"loc-1"}"#)
        .await;
    agent_rx.drain();
    assert_eq!(h.hub.live_connections(), vec![handle.clone()]);

    let monitor = LivenessMonitor::new(h.registry.clone(), Duration::from_secs(30))
        .with_operators(h.hub.clone());
    assert_eq!(monitor.sweep(), SweepReport { pinged: 2, terminated: 0 });

    agent.mark_alive();
    session.on_message(Inbound::Pong).await;
    assert_eq!(monitor.sweep(), SweepReport { pinged: 2, terminated: 0 });

    agent.mark_alive();
    assert_eq!(monitor.sweep(), SweepReport { pinged: 1, terminated: 1 });
    assert!(rx.is_terminated());
    assert!(h.registry.is_connected("loc-1"));

    // socket 协程退出后执行的清理
    session.finish();
    assert!(h.hub.live_connections().is_empty());
    assert_eq!(h.relay.watcher_count("loc-1"), 0);
    assert_eq!(texts(&mut agent_rx)[0]["cmd"], "stopPreview");
}
