// 实时键值存储
// 提供整条覆盖写入、集合订阅、连接状态和一次性断线动作

pub mod keys;
pub mod memory;
pub mod redis_store;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::error::StoreError;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;

/// 集合快照 `child -> value`
pub type Snapshot = BTreeMap<String, Value>;

/// 集合订阅，先推送当前快照，之后每次变更推送完整快照
pub type SnapshotStream = mpsc::UnboundedReceiver<Result<Snapshot, StoreError>>;

/// 连接状态
///
/// `generation` 在每次连上时递增，观察方即使错过了一次断开，也能识别出新连接
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub generation: u64,
}

impl ConnectionStatus {
    pub fn connected(generation: u64) -> Self {
        Self {
            connected: true,
            generation,
        }
    }

    pub fn disconnected(generation: u64) -> Self {
        Self {
            connected: false,
            generation,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// 整条覆盖写入 `collection/child`
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    async fn snapshot(&self, collection: &str) -> Result<Snapshot, StoreError>;

    async fn watch_collection(&self, collection: &str) -> Result<SnapshotStream, StoreError>;

    fn connection_status(&self) -> watch::Receiver<ConnectionStatus>;

    /// 注册断线动作：连接异常断开时由存储端写入 `value`，触发一次后失效
    async fn on_disconnect_set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), StoreError>;
}

pub type SharedStore = Arc<dyn Store>;

pub(crate) fn parse_path(path: &str) -> Result<(&str, &str), StoreError> {
    keys::split_path(path).ok_or_else(|| StoreError::InvalidPath(path.to_string()))
}

/// 序列化后整条写入
pub async fn set_record<T: Serialize + ?Sized>(
    store: &dyn Store,
    path: &str,
    record: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(record)?;
    store.set(path, value).await
}

/// 序列化后注册为断线动作
pub async fn set_record_on_disconnect<T: Serialize + ?Sized>(
    store: &dyn Store,
    path: &str,
    record: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(record)?;
    store.on_disconnect_set(path, value).await
}
