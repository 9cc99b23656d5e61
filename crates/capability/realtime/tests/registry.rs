use cyclops_realtime::{
    AgentEvent, AgentRegistry, CLOSE_POLICY_VIOLATION, ConnectionHandle, EventBus, Outbound,
    RecordingError,
};
use domain::{AgentActivity, AgentPatch, AgentStatus, PeerMetadata};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

fn registry() -> AgentRegistry {
    AgentRegistry::new(EventBus::new(64))
}

fn peer(address: &str) -> PeerMetadata {
    PeerMetadata {
        remote_address: address.to_string(),
        user_agent: "agent/1.0".to_string(),
        api_key: Some("secret".to_string()),
    }
}

fn kinds(events: &mut cyclops_realtime::EventSubscription) -> Vec<&'static str> {
    std::iter::from_fn(|| events.try_next())
        .map(|event| event.kind())
        .collect()
}

#[test]
fn upsert_creates_disconnected_stub() {
    let registry = registry();
    let record = registry.upsert(
        "loc-1",
        AgentPatch {
            agent_id: Some("agent-7".to_string()),
            ..AgentPatch::default()
        },
    );

    assert_eq!(record.status, AgentStatus::Disconnected);
    assert_eq!(record.agent_id.as_deref(), Some("agent-7"));
    assert!(record.connected_at_ms.is_none());
    assert!(!registry.is_connected("loc-1"));
}

#[test]
fn bind_publishes_connected_then_replaced() {
    let registry = registry();
    let mut events = registry.events().subscribe();
    let (first, _rx1) = ConnectionHandle::channel("10.0.0.1", 4);
    let (second, _rx2) = ConnectionHandle::channel("10.0.0.2", 4);

    assert!(registry.bind("loc-1", first.clone(), peer("10.0.0.1")).is_none());
    let connected_at = registry.get("loc-1").and_then(|record| record.connected_at_ms);
    assert!(connected_at.is_some());

    let previous = registry.bind("loc-1", second.clone(), peer("10.0.0.2"));
    assert_eq!(previous, Some(first));
    assert_eq!(registry.connection("loc-1"), Some(second));

    let record = registry.get("loc-1").expect("record");
    assert_eq!(record.connected_at_ms, connected_at);
    assert_eq!(record.peer.remote_address, "10.0.0.2");
    assert_eq!(kinds(&mut events), vec!["connected", "upsert", "replaced", "upsert"]);
}

#[test]
fn stale_release_does_not_disconnect_replacement() {
    let registry = registry();
    let (first, _rx1) = ConnectionHandle::channel("a", 4);
    let (second, _rx2) = ConnectionHandle::channel("b", 4);
    registry.bind("loc-1", first.clone(), peer("a"));
    registry.bind("loc-1", second.clone(), peer("b"));

    assert!(!registry.release("loc-1", first.id(), Some("close")));
    assert!(registry.is_connected("loc-1"));

    assert!(registry.release("loc-1", second.id(), Some("close")));
    let record = registry.get("loc-1").expect("record");
    assert_eq!(record.status, AgentStatus::Disconnected);
    assert!(registry.connection("loc-1").is_none());
}

#[test]
fn disconnect_and_reconnect_resets_connected_at() {
    let registry = registry();
    let (first, _rx1) = ConnectionHandle::channel("a", 4);
    registry.bind("loc-1", first, peer("a"));
    let mut events = registry.events().subscribe();

    assert!(registry.mark_disconnected("loc-1", Some("closed")).is_some());
    assert!(registry.mark_disconnected("loc-1", None).is_none());
    let received: Vec<_> = std::iter::from_fn(|| events.try_next()).collect();
    assert!(matches!(
        received[0].as_ref(),
        AgentEvent::Disconnected { reason: Some(reason), .. } if reason == "closed"
    ));

    let (second, _rx2) = ConnectionHandle::channel("b", 4);
    registry.bind("loc-1", second, peer("b"));
    assert_eq!(kinds(&mut events), vec!["connected", "upsert"]);
}

#[test]
fn heartbeat_ignores_unknown_location() {
    let registry = registry();
    let mut events = registry.events().subscribe();
    assert!(!registry.heartbeat("loc-9"));
    assert!(registry.get("loc-9").is_none());
    assert!(events.try_next().is_none());

    registry.upsert("loc-1", AgentPatch::default());
    assert!(registry.heartbeat("loc-1"));
    assert!(registry.get("loc-1").and_then(|record| record.last_seen_ms).is_some());
}

#[test]
fn begin_recording_rejects_offline_and_busy() {
    let registry = registry();
    assert_eq!(
        registry.begin_recording("loc-1", "rec_1").unwrap_err(),
        RecordingError::AgentOffline
    );

    let (handle, _rx) = ConnectionHandle::channel("a", 4);
    registry.bind("loc-1", handle.clone(), peer("a"));
    assert_eq!(registry.begin_recording("loc-1", "rec_1"), Ok(handle));

    let record = registry.get("loc-1").expect("record");
    assert_eq!(record.activity, AgentActivity::Recording);
    assert_eq!(record.active_job_id.as_deref(), Some("rec_1"));
    assert_eq!(
        registry.begin_recording("loc-1", "rec_2").unwrap_err(),
        RecordingError::AgentBusy
    );
}

#[test]
fn snapshot_is_sorted_and_followed_by_new_events() {
    let registry = registry();
    registry.upsert("loc-b", AgentPatch::default());
    registry.upsert("loc-a", AgentPatch::default());

    let (snapshot, mut events) = registry.snapshot_and_subscribe();
    let ids: Vec<_> = snapshot.iter().map(|record| record.location_id.as_str()).collect();
    assert_eq!(ids, vec!["loc-a", "loc-b"]);
    assert!(events.try_next().is_none());

    registry.heartbeat("loc-a");
    let event = events.try_next().expect("event");
    assert_eq!(event.location_id(), "loc-a");
    assert_eq!(event.kind(), "heartbeat");
}

#[test]
fn send_command_requires_live_connection() {
    let registry = registry();
    let command = api_contract::AgentCommand::StopPreview;
    assert!(!registry.send_command("loc-1", &command));

    let (handle, mut rx) = ConnectionHandle::channel("a", 4);
    registry.bind("loc-1", handle, peer("a"));
    assert!(registry.send_command("loc-1", &command));
    assert_eq!(rx.drain().len(), 1);
}

#[test]
fn concurrent_binds_leave_one_open_connection() {
    let registry = Arc::new(registry());
    let barrier = Arc::new(Barrier::new(8));

    let workers: Vec<_> = (0..8)
        .map(|n| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut bound = Vec::new();
                let mut replaced = Vec::new();
                barrier.wait();
                for i in 0..200 {
                    let (handle, rx) = ConnectionHandle::channel(format!("{n}-{i}"), 4);
                    if let Some(previous) =
                        registry.bind("loc-1", handle.clone(), PeerMetadata::default())
                    {
                        previous.close(CLOSE_POLICY_VIOLATION, "Replaced by new connection");
                        replaced.push(previous.id());
                    }
                    bound.push((handle, rx));
                }
                (bound, replaced)
            })
        })
        .collect();

    let mut bound = Vec::new();
    let mut replaced = Vec::new();
    for worker in workers {
        let (handles, ids) = worker.join().expect("bind thread");
        bound.extend(handles);
        replaced.extend(ids);
    }

    // 每个旧连接只被交还一次
    let unique: HashSet<_> = replaced.iter().copied().collect();
    assert_eq!(unique.len(), replaced.len());
    assert_eq!(replaced.len(), bound.len() - 1);

    let open: Vec<ConnectionHandle> = bound
        .iter()
        .filter(|(handle, _)| !handle.is_closed())
        .map(|(handle, _)| handle.clone())
        .collect();
    assert_eq!(open.len(), 1);
    assert_eq!(registry.connection("loc-1"), Some(open[0].clone()));
    assert_eq!(
        registry.get("loc-1").expect("record").status,
        AgentStatus::Connected
    );

    for (handle, rx) in &mut bound {
        let closes = rx
            .drain()
            .into_iter()
            .filter(|message| matches!(message, Outbound::Close { .. }))
            .count();
        assert_eq!(closes, usize::from(handle.is_closed()));
    }
}
