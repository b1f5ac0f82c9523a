use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use super::{ConnectionStatus, Snapshot, SnapshotStream, Store, parse_path};
use crate::error::StoreError;

type SnapshotSender = mpsc::UnboundedSender<Result<Snapshot, StoreError>>;

#[derive(Default)]
struct Inner {
    collections: BTreeMap<String, Snapshot>,
    watchers: HashMap<String, Vec<SnapshotSender>>,
    disconnect_actions: BTreeMap<String, Value>,
    history: Vec<(String, Value)>,
    fail_writes: bool,
    fail_reads: bool,
    drop_new_watches: bool,
}

impl Inner {
    fn apply_set(&mut self, collection: &str, child: &str, value: Value) {
        self.history
            .push((format!("{}/{}", collection, child), value.clone()));
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(child.to_string(), value);
        self.notify(collection);
    }

    fn notify(&mut self, collection: &str) {
        let snapshot = self
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default();
        if let Some(senders) = self.watchers.get_mut(collection) {
            senders.retain(|tx| tx.send(Ok(snapshot.clone())).is_ok());
        }
    }
}

/// 进程内存储，用于测试和本地演示
///
/// 行为与远端存储一致：整条覆盖、完整快照推送、一次性断线动作
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    status: watch::Sender<ConnectionStatus>,
}

impl InMemoryStore {
    /// 创建存储，初始为已连接状态
    pub fn new() -> Self {
        let (status, _) = watch::channel(ConnectionStatus::connected(1));
        Self {
            inner: Mutex::new(Inner::default()),
            status,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().connected
    }

    /// 模拟连接异常断开：先执行已注册的断线动作，再通知连接断开
    pub fn simulate_disconnect(&self) {
        if !self.is_connected() {
            return;
        }

        {
            let mut inner = self.lock();
            let actions = std::mem::take(&mut inner.disconnect_actions);
            for (path, value) in actions {
                if let Some((collection, child)) = super::keys::split_path(&path) {
                    tracing::debug!("Firing on-disconnect action for {}", path);
                    inner.apply_set(collection, child, value);
                }
            }
        }

        self.status.send_modify(|status| status.connected = false);
    }

    /// 模拟重新连上
    pub fn simulate_reconnect(&self) {
        self.status.send_modify(|status| {
            if !status.connected {
                status.connected = true;
                status.generation += 1;
            }
        });
    }

    /// 后续写入全部失败
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// 后续读取和新的订阅全部失败
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// 之后建立的订阅在推送初始快照后立即失败
    pub fn set_drop_new_watches(&self, enabled: bool) {
        self.lock().drop_new_watches = enabled;
    }

    /// 向集合的所有订阅推送一个错误并关闭这些订阅
    pub fn break_watchers(&self, collection: &str) {
        let senders = self.lock().watchers.remove(collection).unwrap_or_default();
        for tx in senders {
            let _ = tx.send(Err(StoreError::Unavailable(format!(
                "watch on {} lost",
                collection
            ))));
        }
    }

    /// 某条路径上的全部写入记录，按写入顺序
    pub fn write_history(&self, path: &str) -> Vec<Value> {
        self.lock()
            .history
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn pending_disconnect_actions(&self) -> Vec<String> {
        self.lock().disconnect_actions.keys().cloned().collect()
    }

    pub fn watcher_count(&self, collection: &str) -> usize {
        self.lock()
            .watchers
            .get(collection)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let (collection, child) = parse_path(path)?;
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(StoreError::Unavailable("writes are failing".to_string()));
        }
        inner.apply_set(collection, child, value);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let (collection, child) = parse_path(path)?;
        let inner = self.lock();
        if inner.fail_reads {
            return Err(StoreError::Unavailable("reads are failing".to_string()));
        }
        Ok(inner
            .collections
            .get(collection)
            .and_then(|c| c.get(child))
            .cloned())
    }

    async fn snapshot(&self, collection: &str) -> Result<Snapshot, StoreError> {
        let inner = self.lock();
        if inner.fail_reads {
            return Err(StoreError::Unavailable("reads are failing".to_string()));
        }
        Ok(inner.collections.get(collection).cloned().unwrap_or_default())
    }

    async fn watch_collection(&self, collection: &str) -> Result<SnapshotStream, StoreError> {
        let mut inner = self.lock();
        if inner.fail_reads {
            return Err(StoreError::Unavailable("reads are failing".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let current = inner.collections.get(collection).cloned().unwrap_or_default();
        let _ = tx.send(Ok(current));
        if inner.drop_new_watches {
            let _ = tx.send(Err(StoreError::Unavailable(format!(
                "watch on {} dropped",
                collection
            ))));
            return Ok(rx);
        }
        inner
            .watchers
            .entry(collection.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }

    fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    async fn on_disconnect_set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        parse_path(path)?;
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(StoreError::Unavailable("writes are failing".to_string()));
        }
        inner.disconnect_actions.insert(path.to_string(), value);
        Ok(())
    }

    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), StoreError> {
        self.lock().disconnect_actions.remove(path);
        Ok(())
    }
}
