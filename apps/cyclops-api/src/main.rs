//! Cyclops 连接服务：设备 WebSocket 网关、运维端 Hub 与管理 REST 接口。

mod handlers;
mod middleware;
mod routes;
mod utils;
mod ws;

use cyclops_auth::JwtManager;
use cyclops_config::AppConfig;
use cyclops_realtime::{
    AdminHub, AgentGateway, AgentRegistry, EventBus, LivenessMonitor, PreviewDefaults,
    PreviewRelay, RecordingService,
};
use cyclops_storage::{
    InMemoryLocationDirectory, InMemoryRecordingJobStore, LocationDirectory, LocationRecord,
    PgLocationDirectory, PgRecordingJobStore, RecordingJobStore, connect_pool,
};
use cyclops_telemetry::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: Arc<JwtManager>,
    pub registry: Arc<AgentRegistry>,
    pub gateway: AgentGateway,
    pub hub: AdminHub,
    pub recordings: RecordingService,
}

/// 组装连接层各组件。
pub fn build_state(
    config: AppConfig,
    directory: Arc<dyn LocationDirectory>,
    jobs: Arc<dyn RecordingJobStore>,
) -> AppState {
    let jwt = Arc::new(JwtManager::new(
        config.jwt_secret.clone(),
        config.jwt_access_ttl_seconds,
    ));
    let registry = Arc::new(AgentRegistry::new(EventBus::new(config.event_buffer)));
    let relay = Arc::new(PreviewRelay::new(
        registry.clone(),
        PreviewDefaults {
            fps: config.preview_fps,
            quality: config.preview_quality,
        },
    ));
    let gateway = AgentGateway::new(registry.clone(), relay.clone(), directory, jobs.clone())
        .with_secret_check(config.verify_agent_secret);
    let recordings = RecordingService::new(
        registry.clone(),
        jobs,
        config.default_recording_minutes,
    );
    let hub = AdminHub::new(registry.clone(), relay, recordings.clone());
    AppState {
        config: Arc::new(config),
        jwt,
        registry,
        gateway,
        hub,
        recordings,
    }
}

/// 配置了数据库时使用 Postgres，否则使用预置场地的内存存储。
async fn build_stores(
    config: &AppConfig,
) -> Result<(Arc<dyn LocationDirectory>, Arc<dyn RecordingJobStore>), Box<dyn std::error::Error>> {
    if let Some(database_url) = &config.database_url {
        let pool = connect_pool(database_url).await?;
        info!(target: "cyclops.api", "storage_postgres");
        let directory: Arc<dyn LocationDirectory> = Arc::new(PgLocationDirectory::new(pool.clone()));
        let jobs: Arc<dyn RecordingJobStore> = Arc::new(PgRecordingJobStore::new(pool));
        return Ok((directory, jobs));
    }

    let locations: Vec<LocationRecord> = config
        .seed_locations
        .iter()
        .map(|seed| LocationRecord {
            location_id: seed.location_id.clone(),
            tenant_id: seed.tenant_id.clone(),
            name: seed.location_id.clone(),
            api_key: seed.api_key.clone(),
        })
        .collect();
    if locations.is_empty() {
        warn!(target: "cyclops.api", "storage_in_memory_without_locations");
    } else {
        info!(target: "cyclops.api", locations = locations.len(), "storage_in_memory");
    }
    let directory: Arc<dyn LocationDirectory> =
        Arc::new(InMemoryLocationDirectory::with_locations(locations));
    let jobs: Arc<dyn RecordingJobStore> = Arc::new(InMemoryRecordingJobStore::new());
    Ok((directory, jobs))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    let (directory, jobs) = build_stores(&config).await?;
    let http_addr = config.http_addr.clone();
    let ping_interval = Duration::from_secs(config.ping_interval_seconds);
    let state = build_state(config, directory, jobs);

    // 心跳扫描随进程常驻
    let _liveness = LivenessMonitor::new(state.registry.clone(), ping_interval)
        .with_operators(state.hub.clone())
        .spawn();

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    info!(target: "cyclops.api", addr = %http_addr, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
