//! 预览中继。
//!
//! 每个 location 维护一个观看者集合。集合大小 0→1 时向设备发送 `startPreview`，
//! 1→0 时发送 `stopPreview`；命令在中继锁内排入设备队列，保证命令顺序与成员变化一致。
//! 锁顺序固定为：中继 → 注册表。
//!
//! 帧转发先在锁内复制观看者句柄列表，释放锁后逐个 `try_send`，
//! 不可写的观看者直接跳过，不会拖慢设备读循环。

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::registry::AgentRegistry;
use api_contract::AgentCommand;
use bytes::Bytes;
use cyclops_telemetry::{record_frame_delivery_skipped, record_frame_dropped, record_frames_delivered};
use domain::PeerMetadata;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

/// 预览默认参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewDefaults {
    pub fps: u32,
    pub quality: u32,
}

impl Default for PreviewDefaults {
    fn default() -> Self {
        Self { fps: 10, quality: 6 }
    }
}

/// 观看请求携带的可选参数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreviewOptions {
    pub fps: Option<u32>,
    pub quality: Option<u32>,
}

struct WatcherSet {
    members: HashMap<ConnectionId, ConnectionHandle>,
    fps: u32,
    quality: u32,
}

impl WatcherSet {
    fn start_command(&self) -> AgentCommand {
        AgentCommand::StartPreview {
            fps: self.fps,
            quality: self.quality,
        }
    }
}

pub struct PreviewRelay {
    registry: Arc<AgentRegistry>,
    watchers: Mutex<HashMap<String, WatcherSet>>,
    defaults: PreviewDefaults,
}

impl PreviewRelay {
    pub fn new(registry: Arc<AgentRegistry>, defaults: PreviewDefaults) -> Self {
        Self {
            registry,
            watchers: Mutex::new(HashMap::new()),
            defaults,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WatcherSet>> {
        self.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 加入观看；返回 true 表示本次加入触发了 `startPreview`。
    pub fn subscribe(
        &self,
        location_id: &str,
        watcher: &ConnectionHandle,
        options: PreviewOptions,
    ) -> bool {
        let mut watchers = self.lock();
        let set = watchers
            .entry(location_id.to_string())
            .or_insert_with(|| WatcherSet {
                members: HashMap::new(),
                fps: options.fps.unwrap_or(self.defaults.fps),
                quality: options.quality.unwrap_or(self.defaults.quality),
            });
        let inserted = set.members.insert(watcher.id(), watcher.clone()).is_none();
        if !(inserted && set.members.len() == 1) {
            return false;
        }
        let command = set.start_command();
        self.registry.send_command(location_id, &command);
        info!(
            target: "cyclops.realtime",
            location_id,
            watcher = %watcher.id(),
            "preview_started"
        );
        true
    }

    /// 退出观看；返回 true 表示本次退出触发了 `stopPreview`。
    pub fn unsubscribe(&self, location_id: &str, watcher_id: ConnectionId) -> bool {
        let mut watchers = self.lock();
        let Some(set) = watchers.get_mut(location_id) else {
            return false;
        };
        if set.members.remove(&watcher_id).is_none() || !set.members.is_empty() {
            return false;
        }
        watchers.remove(location_id);
        self.registry
            .send_command(location_id, &AgentCommand::StopPreview);
        info!(
            target: "cyclops.realtime",
            location_id,
            watcher = %watcher_id,
            "preview_stopped"
        );
        true
    }

    /// 运维连接关闭时从所有集合移除，返回因此停止预览的 location。
    pub fn remove_watcher_everywhere(&self, watcher_id: ConnectionId) -> Vec<String> {
        let mut watchers = self.lock();
        let mut stopped = Vec::new();
        watchers.retain(|location_id, set| {
            if set.members.remove(&watcher_id).is_some() && set.members.is_empty() {
                stopped.push(location_id.clone());
                return false;
            }
            true
        });
        stopped.sort();
        for location_id in &stopped {
            self.registry
                .send_command(location_id, &AgentCommand::StopPreview);
            info!(
                target: "cyclops.realtime",
                location_id = %location_id,
                watcher = %watcher_id,
                "preview_stopped"
            );
        }
        stopped
    }

    /// 绑定设备连接；仍有观看者时向新连接补发 `startPreview`。
    ///
    /// 绑定与补发都在中继锁内完成，并发的 0→1 订阅要么发生在绑定之前（由补发覆盖），
    /// 要么发生在之后（由订阅自己发送），新连接只会收到一次 `startPreview`。
    pub fn bind_agent(
        &self,
        location_id: &str,
        handle: ConnectionHandle,
        peer: PeerMetadata,
    ) -> Option<ConnectionHandle> {
        let watchers = self.lock();
        let connection_id = handle.id();
        let previous = self.registry.bind(location_id, handle, peer);
        if let Some(set) = watchers.get(location_id) {
            let command = set.start_command();
            if self.registry.send_command(location_id, &command) {
                info!(
                    target: "cyclops.realtime",
                    location_id,
                    connection_id = %connection_id,
                    watchers = set.members.len(),
                    "preview_resumed"
                );
            }
        }
        previous
    }

    /// 把一帧原样转发给所有可写的观看者，返回成功投递数。
    pub fn forward_frame(&self, location_id: &str, frame: Bytes) -> usize {
        let targets: Vec<ConnectionHandle> = {
            let watchers = self.lock();
            match watchers.get(location_id) {
                Some(set) => set.members.values().cloned().collect(),
                None => Vec::new(),
            }
        };
        if targets.is_empty() {
            record_frame_dropped();
            return 0;
        }

        let mut delivered = 0;
        for target in &targets {
            if target.is_writable() && target.send_binary(frame.clone()) {
                delivered += 1;
            } else {
                record_frame_delivery_skipped();
            }
        }
        record_frames_delivered(delivered as u64);
        delivered
    }

    pub fn watcher_count(&self, location_id: &str) -> usize {
        self.lock()
            .get(location_id)
            .map_or(0, |set| set.members.len())
    }

    /// 某个运维连接正在观看的 location（排序）。
    pub fn watched_by(&self, watcher_id: ConnectionId) -> Vec<String> {
        let mut locations: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, set)| set.members.contains_key(&watcher_id))
            .map(|(location_id, _)| location_id.clone())
            .collect();
        locations.sort();
        locations
    }
}
