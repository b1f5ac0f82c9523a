use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::SubscriptionError;
use crate::models::{LiveLocationSet, Location};
use crate::store::keys::{LOCATIONS, STATUS};
use crate::store::{SharedStore, Snapshot};

pub type SubscriptionId = Uuid;

/// 位置订阅
///
/// 持有每个订阅的后台任务句柄，取消订阅时释放；实例销毁时全部释放
pub struct LocationSubscriber {
    store: SharedStore,
    handles: Mutex<HashMap<SubscriptionId, JoinHandle<()>>>,
}

impl LocationSubscriber {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<SubscriptionId, JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 登记新订阅，同时清理已经结束的订阅
    fn track(&self, id: SubscriptionId, handle: JoinHandle<()>) {
        let mut handles = self.handles();
        handles.retain(|_, handle| !handle.is_finished());
        handles.insert(id, handle);
    }

    /// 订阅全部在线用户的位置
    ///
    /// 位置集合或在线状态集合每次变化，都会以完整的 [`LiveLocationSet`] 回调一次。
    /// 回调收到错误后该订阅结束，需要重新订阅。
    pub async fn subscribe<F>(&self, on_update: F) -> Result<SubscriptionId, SubscriptionError>
    where
        F: Fn(Result<LiveLocationSet, SubscriptionError>) + Send + Sync + 'static,
    {
        let mut locations = self
            .store
            .watch_collection(LOCATIONS)
            .await
            .map_err(|e| SubscriptionError::read(LOCATIONS, &e))?;
        let mut status = self
            .store
            .watch_collection(STATUS)
            .await
            .map_err(|e| SubscriptionError::read(STATUS, &e))?;

        let id = Uuid::new_v4();
        let handle = tokio::spawn(async move {
            let mut latest_locations: Option<Snapshot> = None;
            let mut latest_status: Option<Snapshot> = None;

            loop {
                tokio::select! {
                    item = locations.recv() => match item {
                        Some(Ok(snapshot)) => latest_locations = Some(snapshot),
                        Some(Err(e)) => {
                            tracing::error!("Location subscription failed: {}", e);
                            on_update(Err(SubscriptionError::read(LOCATIONS, &e)));
                            break;
                        }
                        None => {
                            on_update(Err(SubscriptionError::Closed));
                            break;
                        }
                    },
                    item = status.recv() => match item {
                        Some(Ok(snapshot)) => latest_status = Some(snapshot),
                        Some(Err(e)) => {
                            tracing::error!("Presence subscription failed: {}", e);
                            on_update(Err(SubscriptionError::read(STATUS, &e)));
                            break;
                        }
                        None => {
                            on_update(Err(SubscriptionError::Closed));
                            break;
                        }
                    },
                }

                if let (Some(locations), Some(status)) = (&latest_locations, &latest_status) {
                    let set = LiveLocationSet::derive(locations, status);
                    tracing::debug!("Live location set updated: {} online", set.len());
                    on_update(Ok(set));
                }
            }
        });

        self.track(id, handle);
        tracing::debug!("Subscribed to all locations ({})", id);
        Ok(id)
    }

    /// 订阅单个用户的位置，记录变化时回调，记录不存在时为 `None`
    pub async fn subscribe_user<F>(
        &self,
        user_id: &str,
        on_update: F,
    ) -> Result<SubscriptionId, SubscriptionError>
    where
        F: Fn(Result<Option<Location>, SubscriptionError>) + Send + Sync + 'static,
    {
        let mut locations = self
            .store
            .watch_collection(LOCATIONS)
            .await
            .map_err(|e| SubscriptionError::read(LOCATIONS, &e))?;

        let id = Uuid::new_v4();
        let user_id = user_id.to_string();
        let handle = tokio::spawn(async move {
            let mut last: Option<Option<Value>> = None;

            loop {
                match locations.recv().await {
                    Some(Ok(snapshot)) => {
                        let current = snapshot.get(&user_id).cloned();
                        if last.as_ref() == Some(&current) {
                            continue;
                        }

                        let location = current.as_ref().and_then(|raw| {
                            serde_json::from_value::<Location>(raw.clone())
                                .map_err(|e| {
                                    tracing::warn!("Malformed location for {}: {}", user_id, e)
                                })
                                .ok()
                        });
                        last = Some(current);
                        on_update(Ok(location));
                    }
                    Some(Err(e)) => {
                        tracing::error!("Subscription to {} failed: {}", user_id, e);
                        on_update(Err(SubscriptionError::read(LOCATIONS, &e)));
                        break;
                    }
                    None => {
                        on_update(Err(SubscriptionError::Closed));
                        break;
                    }
                }
            }
        });

        self.track(id, handle);
        Ok(id)
    }

    /// 取消订阅，重复调用无副作用
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.handles().remove(&id) {
            Some(handle) => {
                handle.abort();
                tracing::debug!("Unsubscribed {}", id);
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe_all(&self) {
        for (_, handle) in self.handles().drain() {
            handle.abort();
        }
    }

    /// 仍在运行的订阅数，因错误结束的订阅不计入
    pub fn active_subscriptions(&self) -> usize {
        let mut handles = self.handles();
        handles.retain(|_, handle| !handle.is_finished());
        handles.len()
    }
}

impl Drop for LocationSubscriber {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}
