//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 内存模式下预置的场地（location）与设备密钥。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedLocation {
    pub location_id: String,
    pub api_key: String,
    pub tenant_id: String,
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    /// 未设置时使用内存存储。
    pub database_url: Option<String>,
    pub seed_locations: Vec<SeedLocation>,
    pub jwt_secret: String,
    pub jwt_access_ttl_seconds: u64,
    pub admin_auth_required: bool,
    pub verify_agent_secret: bool,
    pub ping_interval_seconds: u64,
    pub event_buffer: usize,
    pub outbound_queue: usize,
    pub preview_fps: u32,
    pub preview_quality: u32,
    pub default_recording_minutes: u32,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = env::var("CYCLOPS_JWT_SECRET")
            .map_err(|_| ConfigError::Missing("CYCLOPS_JWT_SECRET".to_string()))?;
        let jwt_access_ttl_seconds =
            read_u64_with_default("CYCLOPS_JWT_ACCESS_TTL_SECONDS", 3600)?;
        let http_addr =
            env::var("CYCLOPS_HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let database_url = read_optional("CYCLOPS_DATABASE_URL");
        let seed_locations = match read_optional("CYCLOPS_AGENT_LOCATIONS") {
            Some(raw) => parse_seed_locations(&raw)?,
            None => Vec::new(),
        };
        let admin_auth_required = read_bool_with_default("CYCLOPS_ADMIN_AUTH", true);
        let verify_agent_secret = read_bool_with_default("CYCLOPS_VERIFY_AGENT_SECRET", true);
        let ping_interval_seconds = read_u64_with_default("CYCLOPS_PING_INTERVAL_SECONDS", 30)?;
        if ping_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "CYCLOPS_PING_INTERVAL_SECONDS".to_string(),
                "0".to_string(),
            ));
        }
        let event_buffer = read_usize_with_default("CYCLOPS_EVENT_BUFFER", 256)?;
        let outbound_queue = read_usize_with_default("CYCLOPS_OUTBOUND_QUEUE", 64)?;
        let preview_fps = read_u32_with_default("CYCLOPS_PREVIEW_FPS", 10)?;
        let preview_quality = read_u32_with_default("CYCLOPS_PREVIEW_QUALITY", 6)?;
        let default_recording_minutes = read_u32_with_default("CYCLOPS_RECORDING_MINUTES", 2)?;

        Ok(Self {
            http_addr,
            database_url,
            seed_locations,
            jwt_secret,
            jwt_access_ttl_seconds,
            admin_auth_required,
            verify_agent_secret,
            ping_interval_seconds,
            event_buffer: event_buffer.max(1),
            outbound_queue: outbound_queue.max(1),
            preview_fps,
            preview_quality,
            default_recording_minutes: default_recording_minutes.max(1),
        })
    }
}

/// 解析 `loc=secret[@tenant];loc2=secret2`。
pub fn parse_seed_locations(raw: &str) -> Result<Vec<SeedLocation>, ConfigError> {
    let mut seeds = Vec::new();
    for item in raw.split(';').map(str::trim).filter(|item| !item.is_empty()) {
        let invalid = || ConfigError::Invalid("CYCLOPS_AGENT_LOCATIONS".to_string(), item.to_string());
        let (location_id, rest) = item.split_once('=').ok_or_else(invalid)?;
        let (api_key, tenant_id) = match rest.split_once('@') {
            Some((api_key, tenant_id)) => (api_key, tenant_id),
            None => (rest, "default"),
        };
        let location_id = location_id.trim();
        let api_key = api_key.trim();
        if location_id.is_empty() || api_key.is_empty() {
            return Err(invalid());
        }
        seeds.push(SeedLocation {
            location_id: location_id.to_string(),
            api_key: api_key.to_string(),
            tenant_id: tenant_id.trim().to_string(),
        });
    }
    Ok(seeds)
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
