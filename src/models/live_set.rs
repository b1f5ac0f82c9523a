use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use super::{Location, PresenceRecord};

/// 当前在线用户的位置集合 `userId -> Location`
///
/// 只能通过过滤构造，集合中不会出现 `is_online = false` 的记录
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveLocationSet {
    entries: HashMap<String, Location>,
}

impl LiveLocationSet {
    /// 从位置集合和在线状态集合的快照重新推导
    ///
    /// 位置记录本身必须在线；若存在对应的在线状态记录，也必须在线。
    /// 无法解析的记录会被跳过。
    pub fn derive(locations: &BTreeMap<String, Value>, status: &BTreeMap<String, Value>) -> Self {
        let mut entries = HashMap::with_capacity(locations.len());

        for (user_id, raw) in locations {
            let location: Location = match serde_json::from_value(raw.clone()) {
                Ok(location) => location,
                Err(e) => {
                    tracing::warn!("Skipping malformed location for {}: {}", user_id, e);
                    continue;
                }
            };

            if !location.is_online {
                continue;
            }

            if let Some(raw_status) = status.get(user_id) {
                match serde_json::from_value::<PresenceRecord>(raw_status.clone()) {
                    Ok(presence) if !presence.is_online => continue,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Ignoring malformed presence for {}: {}", user_id, e);
                    }
                }
            }

            entries.insert(user_id.clone(), location);
        }

        Self { entries }
    }

    pub fn get(&self, user_id: &str) -> Option<&Location> {
        self.entries.get(user_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.entries.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Location)> {
        self.entries.iter()
    }

    pub fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }
}
