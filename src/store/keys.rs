/// 位置集合
pub const LOCATIONS: &str = "locations";

/// 在线状态集合
pub const STATUS: &str = "status";

/// 生成用户位置路径
pub fn location_key(user_id: &str) -> String {
    format!("{}/{}", LOCATIONS, user_id)
}

/// 生成用户在线状态路径
pub fn status_key(user_id: &str) -> String {
    format!("{}/{}", STATUS, user_id)
}

/// 把 `collection/child` 拆成两段，两段都不能为空
pub fn split_path(path: &str) -> Option<(&str, &str)> {
    let (collection, child) = path.split_once('/')?;
    if collection.is_empty() || child.is_empty() || child.contains('/') {
        return None;
    }
    Some((collection, child))
}

/// Redis 记录键 `{ns}:{collection}:{child}`
pub fn redis_record_key(namespace: &str, collection: &str, child: &str) -> String {
    format!("{}:{}:{}", namespace, collection, child)
}

/// Redis 集合扫描模式
pub fn redis_collection_pattern(namespace: &str, collection: &str) -> String {
    format!("{}:{}:*", namespace, collection)
}

/// 集合变更通知频道
pub fn redis_changes_channel(namespace: &str, collection: &str) -> String {
    format!("{}:changes:{}", namespace, collection)
}

/// 连接租约键，连接存活期间周期性续期
pub fn redis_lease_key(namespace: &str, session_id: &str) -> String {
    format!("{}:lease:{}", namespace, session_id)
}

/// 断线动作哈希键
pub fn redis_on_disconnect_key(namespace: &str, session_id: &str) -> String {
    format!("{}:ondisconnect:{}", namespace, session_id)
}

/// 断线动作哈希键扫描模式
pub fn redis_on_disconnect_pattern(namespace: &str) -> String {
    format!("{}:ondisconnect:*", namespace)
}
