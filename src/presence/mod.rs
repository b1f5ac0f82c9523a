// 在线状态
// 每次连上存储时写入在线记录，并重新注册断线时写离线记录的一次性动作

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;

use crate::clock::SharedClock;
use crate::models::PresenceRecord;
use crate::store::keys::status_key;
use crate::store::{SharedStore, set_record, set_record_on_disconnect};

/// 断线动作状态
///
/// 存储端的断线动作触发一次后失效，重新连上后必须再次注册
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Disarmed,
    Armed,
    Fired,
}

struct TrackerInner {
    user_id: Option<String>,
    hook: HookState,
    task: Option<JoinHandle<()>>,
}

/// 在线状态跟踪
///
/// 写入失败只记录日志：在线状态尽力而为，最多在一个重连周期内显示错误
pub struct PresenceTracker {
    store: SharedStore,
    clock: SharedClock,
    inner: Arc<Mutex<TrackerInner>>,
}

fn lock(inner: &Mutex<TrackerInner>) -> MutexGuard<'_, TrackerInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

impl PresenceTracker {
    pub fn new(store: SharedStore, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            inner: Arc::new(Mutex::new(TrackerInner {
                user_id: None,
                hook: HookState::Disarmed,
                task: None,
            })),
        }
    }

    /// 为用户启动在线状态跟踪，每个会话只生效一次
    pub fn initialize(&self, user_id: &str) -> bool {
        let mut inner = lock(&self.inner);
        if let Some(current) = &inner.user_id {
            tracing::warn!(
                "Presence already initialized for {}, ignoring {}",
                current,
                user_id
            );
            return false;
        }

        inner.user_id = Some(user_id.to_string());
        inner.task = Some(tokio::spawn(watch_connection(
            self.store.clone(),
            self.clock.clone(),
            self.inner.clone(),
            user_id.to_string(),
        )));

        tracing::info!("Presence tracking started for {}", user_id);
        true
    }

    pub fn hook_state(&self) -> HookState {
        lock(&self.inner).hook
    }

    pub fn user_id(&self) -> Option<String> {
        lock(&self.inner).user_id.clone()
    }

    /// 主动退出：取消断线动作并写入离线记录
    pub async fn sign_out(&self) {
        let user_id = {
            let mut inner = lock(&self.inner);
            if let Some(task) = inner.task.take() {
                task.abort();
            }
            inner.hook = HookState::Disarmed;
            inner.user_id.take()
        };

        let Some(user_id) = user_id else {
            return;
        };

        let path = status_key(&user_id);
        if let Err(e) = self.store.cancel_on_disconnect(&path).await {
            tracing::warn!("Failed to cancel on-disconnect for {}: {}", user_id, e);
        }

        let offline = PresenceRecord::offline(&user_id, self.clock.now_millis());
        if let Err(e) = set_record(self.store.as_ref(), &path, &offline).await {
            tracing::warn!("Failed to write offline presence for {}: {}", user_id, e);
        }

        tracing::info!("Presence tracking stopped for {}", user_id);
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.inner).task.take() {
            task.abort();
        }
    }
}

async fn watch_connection(
    store: SharedStore,
    clock: SharedClock,
    inner: Arc<Mutex<TrackerInner>>,
    user_id: String,
) {
    let mut status_rx = store.connection_status();
    let mut armed_generation: Option<u64> = None;

    loop {
        let status = *status_rx.borrow_and_update();

        if status.connected {
            // 新的连接代次：之前注册的动作要么已触发，要么随旧连接失效
            if armed_generation != Some(status.generation) {
                armed_generation = Some(status.generation);
                on_connected(&store, &clock, &inner, &user_id).await;
            }
        } else {
            let mut inner = lock(&inner);
            if inner.hook == HookState::Armed {
                inner.hook = HookState::Fired;
                tracing::info!("Connection lost, on-disconnect for {} fired", user_id);
            }
        }

        if status_rx.changed().await.is_err() {
            tracing::debug!("Connection status channel closed");
            break;
        }
    }
}

async fn on_connected(
    store: &SharedStore,
    clock: &SharedClock,
    inner: &Arc<Mutex<TrackerInner>>,
    user_id: &str,
) {
    let path = status_key(user_id);
    let now = clock.now_millis();

    {
        let mut inner = lock(inner);
        if inner.hook == HookState::Armed {
            inner.hook = HookState::Fired;
        }
    }

    let online = PresenceRecord::online(user_id, now);
    if let Err(e) = set_record(store.as_ref(), &path, &online).await {
        tracing::warn!("Failed to write online presence for {}: {}", user_id, e);
    }

    let offline = PresenceRecord::offline(user_id, now);
    match set_record_on_disconnect(store.as_ref(), &path, &offline).await {
        Ok(()) => {
            lock(inner).hook = HookState::Armed;
            tracing::info!("Presence online for {}, on-disconnect armed", user_id);
        }
        Err(e) => {
            lock(inner).hook = HookState::Disarmed;
            tracing::warn!("Failed to arm on-disconnect for {}: {}", user_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{InMemoryStore, Store};

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    async fn presence(store: &InMemoryStore, user_id: &str) -> Option<PresenceRecord> {
        store
            .get(&status_key(user_id))
            .await
            .unwrap()
            .map(|v| serde_json::from_value(v).unwrap())
    }

    fn setup() -> (Arc<InMemoryStore>, PresenceTracker) {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let tracker = PresenceTracker::new(store.clone(), clock);
        (store, tracker)
    }

    #[tokio::test]
    async fn test_initialize_writes_online_and_arms() {
        let (store, tracker) = setup();
        assert!(tracker.initialize("u1"));

        wait_until(|| tracker.hook_state() == HookState::Armed).await;

        let record = presence(&store, "u1").await.unwrap();
        assert!(record.is_online);
        assert_eq!(record.last_active, 1_000);
        assert_eq!(store.pending_disconnect_actions(), vec![status_key("u1")]);
    }

    #[tokio::test]
    async fn test_initialize_only_once() {
        let (store, tracker) = setup();
        assert!(tracker.initialize("u1"));
        assert!(!tracker.initialize("u2"));

        wait_until(|| tracker.hook_state() == HookState::Armed).await;
        assert!(presence(&store, "u2").await.is_none());
    }

    #[tokio::test]
    async fn test_ungraceful_disconnect_marks_offline() {
        let (store, tracker) = setup();
        tracker.initialize("u1");
        wait_until(|| tracker.hook_state() == HookState::Armed).await;

        store.simulate_disconnect();
        wait_until(|| tracker.hook_state() == HookState::Fired).await;
        assert!(!presence(&store, "u1").await.unwrap().is_online);
    }

    #[tokio::test]
    async fn test_rearms_after_reconnect() {
        let (store, tracker) = setup();
        tracker.initialize("u1");
        wait_until(|| tracker.hook_state() == HookState::Armed).await;

        store.simulate_disconnect();
        wait_until(|| tracker.hook_state() == HookState::Fired).await;

        store.simulate_reconnect();
        wait_until(|| tracker.hook_state() == HookState::Armed).await;
        assert!(presence(&store, "u1").await.unwrap().is_online);

        // 第二次断线同样会被标记为离线
        store.simulate_disconnect();
        wait_until(|| tracker.hook_state() == HookState::Fired).await;
        assert!(!presence(&store, "u1").await.unwrap().is_online);
    }

    #[tokio::test]
    async fn test_write_failures_are_swallowed() {
        let (store, tracker) = setup();
        store.set_fail_writes(true);
        tracker.initialize("u1");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.hook_state(), HookState::Disarmed);
        assert!(store.pending_disconnect_actions().is_empty());

        // 下一次重连恢复
        store.set_fail_writes(false);
        store.simulate_disconnect();
        store.simulate_reconnect();
        wait_until(|| tracker.hook_state() == HookState::Armed).await;
    }

    #[tokio::test]
    async fn test_sign_out_cancels_hook_and_writes_offline() {
        let (store, tracker) = setup();
        tracker.initialize("u1");
        wait_until(|| tracker.hook_state() == HookState::Armed).await;

        tracker.sign_out().await;

        assert_eq!(tracker.hook_state(), HookState::Disarmed);
        assert!(store.pending_disconnect_actions().is_empty());
        assert!(!presence(&store, "u1").await.unwrap().is_online);
        assert!(tracker.user_id().is_none());
    }
}
