use serde::{Deserialize, Serialize};

/// 在线状态记录，存储在 `status/{userId}`
///
/// `is_online = true` 只说明写入时连接存在，读取方需要结合 `last_active` 判断是否过期
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: String,
    pub is_online: bool,
    pub last_active: i64,
}

impl PresenceRecord {
    pub fn online(user_id: &str, now: i64) -> Self {
        Self {
            user_id: user_id.to_string(),
            is_online: true,
            last_active: now,
        }
    }

    pub fn offline(user_id: &str, now: i64) -> Self {
        Self {
            user_id: user_id.to_string(),
            is_online: false,
            last_active: now,
        }
    }
}
