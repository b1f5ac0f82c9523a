use std::time::Duration;

use crate::models::{LiveLocationSet, Location};

/// 默认过期阈值：45 秒没有心跳的在线用户视为过期
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerLiveness {
    Fresh,
    Stale,
}

/// 过期判断
///
/// 只影响显示（例如变暗），不会从集合中移除记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    threshold: Duration,
}

impl StalenessPolicy {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn liveness(&self, location: &Location, now_millis: i64) -> PeerLiveness {
        let age = now_millis.saturating_sub(location.last_active);
        let threshold = i64::try_from(self.threshold.as_millis()).unwrap_or(i64::MAX);
        if age > threshold {
            PeerLiveness::Stale
        } else {
            PeerLiveness::Fresh
        }
    }

    pub fn is_stale(&self, location: &Location, now_millis: i64) -> bool {
        self.liveness(location, now_millis) == PeerLiveness::Stale
    }

    /// 集合中过期用户的 ID，按字典序
    pub fn stale_peers(&self, live: &LiveLocationSet, now_millis: i64) -> Vec<String> {
        let mut ids: Vec<String> = live
            .iter()
            .filter(|(_, location)| self.is_stale(location, now_millis))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_THRESHOLD)
    }
}
