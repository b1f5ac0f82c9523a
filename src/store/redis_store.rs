use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client as RedisClient};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::keys::{
    redis_changes_channel, redis_collection_pattern, redis_lease_key, redis_on_disconnect_key,
    redis_on_disconnect_pattern, redis_record_key,
};
use super::{ConnectionStatus, Snapshot, SnapshotStream, Store, parse_path};
use crate::error::StoreError;

const MIN_PING_INTERVAL: Duration = Duration::from_millis(100);

/// KEYS[1] 断线动作哈希，KEYS[2] 租约
const CLAIM_EXPIRED_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[2]) == 1 then
    return {}
end
local actions = redis.call('HGETALL', KEYS[1])
redis.call('DEL', KEYS[1])
return actions
";

/// 从 `{prefix}{child}` 形式的键中取出 child
fn strip_key_prefix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix).filter(|child| !child.is_empty())
}

/// 解析断线动作，无法解析的动作丢弃，按路径排序
fn decode_actions(actions: HashMap<String, String>) -> Vec<(String, Value)> {
    let mut decoded: Vec<(String, Value)> = actions
        .into_iter()
        .filter_map(|(path, json)| match serde_json::from_str(&json) {
            Ok(value) => Some((path, value)),
            Err(e) => {
                tracing::warn!("Dropping undecodable on-disconnect action {}: {}", path, e);
                None
            }
        })
        .collect();
    decoded.sort_by(|a, b| a.0.cmp(&b.0));
    decoded
}

/// 根据一次心跳的结果更新连接状态，状态有变化时返回 true
///
/// 从断开变为连上时递增 `generation`
fn apply_heartbeat(status: &mut ConnectionStatus, alive: bool) -> bool {
    if status.connected == alive {
        return false;
    }
    status.connected = alive;
    if alive {
        status.generation += 1;
    }
    true
}

#[derive(Clone)]
struct RedisShared {
    client: Arc<RedisClient>,
    namespace: String,
}

impl RedisShared {
    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// 写入记录并发布集合变更通知
    async fn write(
        &self,
        conn: &mut MultiplexedConnection,
        path: &str,
        value: &Value,
    ) -> Result<(), StoreError> {
        let (collection, child) = parse_path(path)?;
        let key = redis_record_key(&self.namespace, collection, child);
        let json = serde_json::to_string(value)?;

        let _: () = conn.set(&key, json).await?;
        let _: () = conn
            .publish(redis_changes_channel(&self.namespace, collection), child)
            .await?;

        Ok(())
    }

    async fn snapshot(&self, collection: &str) -> Result<Snapshot, StoreError> {
        let mut conn = self.connection().await?;
        let pattern = redis_collection_pattern(&self.namespace, collection);
        let prefix = format!("{}:{}:", self.namespace, collection);

        let keys: Vec<String> = conn.keys(&pattern).await?;
        let mut snapshot = Snapshot::new();

        for key in keys {
            let Some(child) = strip_key_prefix(&key, &prefix) else {
                continue;
            };
            let result: Option<String> = conn.get(&key).await?;
            if let Some(json) = result {
                match serde_json::from_str::<Value>(&json) {
                    Ok(value) => {
                        snapshot.insert(child.to_string(), value);
                    }
                    Err(e) => {
                        tracing::warn!("Skipping undecodable record {}: {}", key, e);
                    }
                }
            }
        }

        Ok(snapshot)
    }

    /// 执行租约已过期连接留下的断线动作
    async fn reap_expired(&self, conn: &mut MultiplexedConnection) -> Result<(), StoreError> {
        let hook_keys: Vec<String> = conn.keys(redis_on_disconnect_pattern(&self.namespace)).await?;
        let prefix = format!("{}:ondisconnect:", self.namespace);

        for hook_key in hook_keys {
            let Some(session_id) = strip_key_prefix(&hook_key, &prefix) else {
                continue;
            };

            let actions = self.claim_expired(conn, session_id).await?;
            for (path, value) in decode_actions(actions) {
                tracing::info!("Firing on-disconnect action for {} (session {})", path, session_id);
                self.write(conn, &path, &value).await?;
            }
        }

        Ok(())
    }

    /// 租约已过期时取走并删除该连接的全部断线动作，租约仍在时返回空
    ///
    /// 租约检查、读取和删除在同一个脚本里执行：连接恢复后续期租约并重新注册的动作不会被别的客户端取走
    async fn claim_expired(
        &self,
        conn: &mut MultiplexedConnection,
        session_id: &str,
    ) -> Result<HashMap<String, String>, StoreError> {
        let actions: HashMap<String, String> = redis::Script::new(CLAIM_EXPIRED_SCRIPT)
            .key(redis_on_disconnect_key(&self.namespace, session_id))
            .key(redis_lease_key(&self.namespace, session_id))
            .invoke_async(&mut *conn)
            .await?;
        Ok(actions)
    }

    /// 清理过期连接，然后续期本连接的租约
    async fn heartbeat(&self, session_id: &str, lease_ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("PING").query_async(&mut conn).await?;

        self.reap_expired(&mut conn).await?;

        let _: () = conn
            .set_ex(
                redis_lease_key(&self.namespace, session_id),
                1,
                lease_ttl.as_secs().max(1),
            )
            .await?;

        Ok(())
    }
}

/// 基于 Redis 的实时存储
///
/// - 记录以 JSON 字符串保存在 `{ns}:{collection}:{child}`
/// - 每次写入后向 `{ns}:changes:{collection}` 发布通知，订阅方收到后重新读取整个集合
/// - 连接状态由周期性 PING 得出
/// - 断线动作保存在 `{ns}:ondisconnect:{session}`，本连接的租约 `{ns}:lease:{session}`
///   过期后由任意在线客户端执行并删除
pub struct RedisStore {
    shared: RedisShared,
    session_id: String,
    status: Arc<watch::Sender<ConnectionStatus>>,
    monitor: JoinHandle<()>,
}

impl RedisStore {
    pub async fn connect(
        client: Arc<RedisClient>,
        namespace: &str,
        lease_ttl: Duration,
        ping_interval: Duration,
    ) -> Result<Self, StoreError> {
        let shared = RedisShared {
            client,
            namespace: namespace.to_string(),
        };
        let session_id = Uuid::new_v4().to_string();

        shared.heartbeat(&session_id, lease_ttl).await?;
        tracing::info!("Connected to redis store, session {}", session_id);

        let (status, _) = watch::channel(ConnectionStatus::connected(1));
        let status = Arc::new(status);

        let monitor = tokio::spawn(run_monitor(
            shared.clone(),
            session_id.clone(),
            lease_ttl,
            ping_interval,
            status.clone(),
        ));

        Ok(Self {
            shared,
            session_id,
            status,
            monitor,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 停止连接监控，租约到期后本连接的断线动作会被执行
    pub fn close(&self) {
        self.monitor.abort();
    }
}

impl Drop for RedisStore {
    fn drop(&mut self) {
        self.monitor.abort();
    }
}

async fn run_monitor(
    shared: RedisShared,
    session_id: String,
    lease_ttl: Duration,
    ping_interval: Duration,
    status: Arc<watch::Sender<ConnectionStatus>>,
) {
    let mut ticker = tokio::time::interval(ping_interval.max(MIN_PING_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let result = shared.heartbeat(&session_id, lease_ttl).await;
        let alive = result.is_ok();
        if !status.send_if_modified(|s| apply_heartbeat(s, alive)) {
            continue;
        }

        match result {
            Ok(()) => tracing::info!("Redis store connection restored"),
            Err(e) => tracing::warn!("Redis store connection lost: {}", e),
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let mut conn = self.shared.connection().await?;
        self.shared.write(&mut conn, path, &value).await
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let (collection, child) = parse_path(path)?;
        let mut conn = self.shared.connection().await?;

        let key = redis_record_key(&self.shared.namespace, collection, child);
        let result: Option<String> = conn.get(&key).await?;

        match result {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn snapshot(&self, collection: &str) -> Result<Snapshot, StoreError> {
        self.shared.snapshot(collection).await
    }

    async fn watch_collection(&self, collection: &str) -> Result<SnapshotStream, StoreError> {
        // 先订阅再读初始快照，避免漏掉两者之间的写入
        let mut pubsub = self.shared.client.get_async_pubsub().await?;
        pubsub
            .subscribe(redis_changes_channel(&self.shared.namespace, collection))
            .await?;

        let initial = self.shared.snapshot(collection).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Ok(initial));

        let shared = self.shared.clone();
        let collection = collection.to_string();

        tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            loop {
                tokio::select! {
                    msg = messages.next() => match msg {
                        Some(_) => {
                            let snapshot = shared.snapshot(&collection).await;
                            let failed = snapshot.is_err();
                            if tx.send(snapshot).is_err() || failed {
                                break;
                            }
                        }
                        None => {
                            let _ = tx.send(Err(StoreError::Unavailable(format!(
                                "pub/sub stream for {} ended",
                                collection
                            ))));
                            break;
                        }
                    },
                    _ = tx.closed() => break,
                }
            }
            tracing::debug!("Stopped watching collection {}", collection);
        });

        Ok(rx)
    }

    fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    async fn on_disconnect_set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        parse_path(path)?;
        let mut conn = self.shared.connection().await?;
        let json = serde_json::to_string(&value)?;

        let _: () = conn
            .hset(
                redis_on_disconnect_key(&self.shared.namespace, &self.session_id),
                path,
                json,
            )
            .await?;

        Ok(())
    }

    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), StoreError> {
        let mut conn = self.shared.connection().await?;
        let _: () = conn
            .hdel(
                redis_on_disconnect_key(&self.shared.namespace, &self.session_id),
                path,
            )
            .await?;

        Ok(())
    }
}
