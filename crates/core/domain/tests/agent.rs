use domain::{
    AgentActivity, AgentPatch, AgentRecord, AgentStatus, CameraInfo, PeerMetadata,
    TelemetrySnapshot,
};

#[test]
fn stub_is_disconnected_and_idle() {
    let record = AgentRecord::stub("loc-1");
    assert_eq!(record.status, AgentStatus::Disconnected);
    assert_eq!(record.activity, AgentActivity::Idle);
    assert!(record.connected_at_ms.is_none());
    assert!(!record.is_connected());
}

#[test]
fn patch_only_touches_present_fields() {
    let mut record = AgentRecord::stub("loc-1");
    record.agent_id = Some("agent-a".to_string());
    record.active_job_id = Some("rec_1".to_string());

    AgentPatch {
        activity: Some(AgentActivity::Recording),
        camera: Some(CameraInfo {
            reachable: Some(true),
            ..CameraInfo::default()
        }),
        ..AgentPatch::default()
    }
    .apply(&mut record);

    assert_eq!(record.agent_id.as_deref(), Some("agent-a"));
    assert_eq!(record.active_job_id.as_deref(), Some("rec_1"));
    assert!(record.is_recording());
    assert_eq!(record.camera.and_then(|camera| camera.reachable), Some(true));
}

#[test]
fn patch_can_clear_active_job() {
    let mut record = AgentRecord::stub("loc-1");
    record.active_job_id = Some("rec_1".to_string());

    AgentPatch {
        active_job_id: Some(None),
        ..AgentPatch::default()
    }
    .apply(&mut record);

    assert!(record.active_job_id.is_none());
    assert!(AgentPatch::default().is_empty());
}

#[test]
fn record_serializes_camel_case_without_secret() {
    let mut record = AgentRecord::stub("loc-1");
    record.status = AgentStatus::Connected;
    record.peer = PeerMetadata {
        remote_address: "10.0.0.8:5123".to_string(),
        user_agent: "cyclops-agent/1.0".to_string(),
        api_key: Some("secret".to_string()),
    };
    record.telemetry = Some(TelemetrySnapshot {
        uptime_sec: Some(12.0),
        ..TelemetrySnapshot::default()
    });

    let json = serde_json::to_value(&record).expect("json");
    assert_eq!(json["locationId"], "loc-1");
    assert_eq!(json["status"], "connected");
    assert_eq!(json["activity"], "IDLE");
    assert_eq!(json["remoteAddress"], "10.0.0.8:5123");
    assert_eq!(json["telemetry"]["uptimeSec"], 12.0);
    assert!(json.get("apiKey").is_none());
    assert!(!json.to_string().contains("secret"));
}
