//! 设备注册表：location_id → 记录 + 当前连接。
//!
//! 所有变更在同一把锁内完成并在锁内发布事件，因此事件顺序与变更顺序一致，
//! [`AgentRegistry::snapshot_and_subscribe`] 取到的快照与随后收到的事件之间既不重复也不遗漏。
//! 锁内只做内存操作与非阻塞的队列推送。

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::error::RecordingError;
use crate::events::{AgentEvent, EventBus, EventSubscription};
use crate::now_epoch_ms;
use api_contract::AgentCommand;
use cyclops_telemetry::{record_command_sent, record_command_undelivered};
use domain::{AgentActivity, AgentPatch, AgentRecord, AgentStatus, PeerMetadata};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

struct Entry {
    record: AgentRecord,
    /// 仅在 CONNECTED 时存在。
    connection: Option<ConnectionHandle>,
}

impl Entry {
    fn stub(location_id: &str) -> Self {
        Self {
            record: AgentRecord::stub(location_id),
            connection: None,
        }
    }
}

pub struct AgentRegistry {
    entries: Mutex<BTreeMap<String, Entry>>,
    events: EventBus,
}

impl AgentRegistry {
    pub fn new(events: EventBus) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 绑定新连接，返回此前绑定的连接（可能与新连接相同）。
    ///
    /// 旧连接仍在时发布 `replaced`，否则发布 `connected`，随后都发布 `upsert`。
    /// 关闭旧连接由调用方负责。
    pub fn bind(
        &self,
        location_id: &str,
        handle: ConnectionHandle,
        peer: PeerMetadata,
    ) -> Option<ConnectionHandle> {
        let now = now_epoch_ms();
        let mut entries = self.lock();
        let entry = entries
            .entry(location_id.to_string())
            .or_insert_with(|| Entry::stub(location_id));
        let replaced = entry
            .connection
            .as_ref()
            .is_some_and(|previous| previous.id() != handle.id());
        let previous = entry.connection.replace(handle);

        let record = &mut entry.record;
        if record.status == AgentStatus::Disconnected || record.connected_at_ms.is_none() {
            record.connected_at_ms = Some(now);
        }
        record.status = AgentStatus::Connected;
        record.last_seen_ms = Some(now);
        record.peer = peer;

        let agent = record.clone();
        if replaced {
            self.events.publish(AgentEvent::Replaced {
                location_id: location_id.to_string(),
            });
        } else {
            self.events.publish(AgentEvent::Connected {
                agent: agent.clone(),
            });
        }
        self.events.publish(AgentEvent::Upsert { agent });
        previous
    }

    /// 合并字段；未知 location 先建立 DISCONNECTED 占位记录。
    pub fn upsert(&self, location_id: &str, patch: AgentPatch) -> AgentRecord {
        let mut entries = self.lock();
        let entry = entries
            .entry(location_id.to_string())
            .or_insert_with(|| Entry::stub(location_id));
        patch.apply(&mut entry.record);
        let agent = entry.record.clone();
        self.events.publish(AgentEvent::Upsert {
            agent: agent.clone(),
        });
        agent
    }

    /// 刷新 last_seen；未知 location 不做任何事。
    pub fn heartbeat(&self, location_id: &str) -> bool {
        let now = now_epoch_ms();
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(location_id) else {
            return false;
        };
        entry.record.last_seen_ms = Some(now);
        self.events.publish(AgentEvent::Heartbeat {
            location_id: location_id.to_string(),
            at_ms: now,
        });
        true
    }

    /// 无条件标记断开，返回被清除的连接。
    pub fn mark_disconnected(
        &self,
        location_id: &str,
        reason: Option<&str>,
    ) -> Option<ConnectionHandle> {
        let mut entries = self.lock();
        let entry = entries.get_mut(location_id)?;
        let previous = entry.connection.take();
        self.disconnect_locked(location_id, entry, reason);
        previous
    }

    /// 仅当 `connection_id` 仍是当前绑定的连接时标记断开。
    ///
    /// 被替换的旧连接稍后关闭时调用此方法不会影响新连接。
    pub fn release(
        &self,
        location_id: &str,
        connection_id: ConnectionId,
        reason: Option<&str>,
    ) -> bool {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(location_id) else {
            return false;
        };
        let is_current = entry
            .connection
            .as_ref()
            .is_some_and(|current| current.id() == connection_id);
        if !is_current {
            debug!(
                target: "cyclops.realtime",
                location_id,
                connection_id = %connection_id,
                "stale_release_ignored"
            );
            return false;
        }
        entry.connection = None;
        self.disconnect_locked(location_id, entry, reason);
        true
    }

    fn disconnect_locked(&self, location_id: &str, entry: &mut Entry, reason: Option<&str>) {
        let now = now_epoch_ms();
        entry.record.status = AgentStatus::Disconnected;
        entry.record.last_seen_ms = Some(now);
        self.events.publish(AgentEvent::Disconnected {
            location_id: location_id.to_string(),
            at_ms: now,
            reason: reason.map(str::to_string),
        });
        self.events.publish(AgentEvent::Upsert {
            agent: entry.record.clone(),
        });
    }

    /// 录制开始前的占用检查：在线且空闲时置为 RECORDING 并返回当前连接。
    pub fn begin_recording(
        &self,
        location_id: &str,
        recording_id: &str,
    ) -> Result<ConnectionHandle, RecordingError> {
        let mut entries = self.lock();
        let entry = entries
            .get_mut(location_id)
            .ok_or(RecordingError::AgentOffline)?;
        let connection = entry
            .connection
            .clone()
            .ok_or(RecordingError::AgentOffline)?;
        if entry.record.is_recording() {
            return Err(RecordingError::AgentBusy);
        }
        entry.record.activity = AgentActivity::Recording;
        entry.record.active_job_id = Some(recording_id.to_string());
        self.events.publish(AgentEvent::Upsert {
            agent: entry.record.clone(),
        });
        Ok(connection)
    }

    /// 向当前连接排入一条命令；离线或队列已满时返回 false。
    pub fn send_command(&self, location_id: &str, command: &AgentCommand) -> bool {
        let connection = self.connection(location_id);
        let delivered = connection
            .as_ref()
            .is_some_and(|connection| connection.send_command(command));
        if delivered {
            record_command_sent();
        } else {
            record_command_undelivered();
            debug!(
                target: "cyclops.realtime",
                location_id,
                command = command.name(),
                online = connection.is_some(),
                "command_undelivered"
            );
        }
        delivered
    }

    pub fn get(&self, location_id: &str) -> Option<AgentRecord> {
        self.lock()
            .get(location_id)
            .map(|entry| entry.record.clone())
    }

    /// 按 location_id 排序的全部记录。
    pub fn list(&self) -> Vec<AgentRecord> {
        self.lock()
            .values()
            .map(|entry| entry.record.clone())
            .collect()
    }

    pub fn connection(&self, location_id: &str) -> Option<ConnectionHandle> {
        self.lock()
            .get(location_id)
            .and_then(|entry| entry.connection.clone())
    }

    pub fn is_connected(&self, location_id: &str) -> bool {
        self.lock()
            .get(location_id)
            .is_some_and(|entry| entry.connection.is_some())
    }

    /// 当前所有在线连接（供心跳扫描使用）。
    pub fn live_connections(&self) -> Vec<(String, ConnectionHandle)> {
        self.lock()
            .iter()
            .filter_map(|(location_id, entry)| {
                entry
                    .connection
                    .clone()
                    .map(|connection| (location_id.clone(), connection))
            })
            .collect()
    }

    /// 在同一把锁内取快照并订阅事件。
    pub fn snapshot_and_subscribe(&self) -> (Vec<AgentRecord>, EventSubscription) {
        let entries = self.lock();
        let subscription = self.events.subscribe();
        let snapshot = entries.values().map(|entry| entry.record.clone()).collect();
        (snapshot, subscription)
    }
}
