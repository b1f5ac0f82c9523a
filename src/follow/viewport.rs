use super::FollowState;
use crate::models::{Coordinates, LiveLocationSet};

/// 缩放级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportConfig {
    /// 显示本地位置时的总览缩放
    pub default_zoom: u8,
    /// 跟随他人时的缩放
    pub follow_zoom: u8,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            default_zoom: 13,
            follow_zoom: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewportTarget {
    Local,
    Peer(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub center: Coordinates,
    pub zoom: u8,
    pub target: ViewportTarget,
}

/// 计算地图视图
///
/// 跟随的用户在线时以其位置为中心；否则（包括跟随自己、对方已离线）以本地位置为中心。
/// 本地位置未知且没有可跟随的位置时返回 `None`。
pub fn compute_viewport(
    self_id: Option<&str>,
    current: Option<Coordinates>,
    live: &LiveLocationSet,
    follow: &FollowState,
    config: &ViewportConfig,
) -> Option<Viewport> {
    if let Some(peer_id) = follow.followed_id() {
        let is_self = self_id == Some(peer_id);
        if let Some(location) = live.get(peer_id).filter(|_| !is_self) {
            return Some(Viewport {
                center: location.coordinates(),
                zoom: config.follow_zoom,
                target: ViewportTarget::Peer(peer_id.to_string()),
            });
        }
    }

    current.map(|center| Viewport {
        center,
        zoom: config.default_zoom,
        target: ViewportTarget::Local,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    fn live(entries: &[(&str, f64, f64)]) -> LiveLocationSet {
        let mut locations = BTreeMap::new();
        for (user_id, lat, lng) in entries {
            locations.insert(
                user_id.to_string(),
                json!({
                    "lat": lat,
                    "lng": lng,
                    "timestamp": 1,
                    "userId": user_id,
                    "displayName": user_id,
                    "lastActive": 1,
                    "isOnline": true,
                }),
            );
        }
        LiveLocationSet::derive(&locations, &BTreeMap::new())
    }

    #[test]
    fn test_unfollowed_centers_on_local() {
        let viewport = compute_viewport(
            Some("me"),
            Some(Coordinates::new(1.0, 2.0)),
            &live(&[("b", 10.0, 20.0)]),
            &FollowState::Unfollowed,
            &ViewportConfig::default(),
        )
        .unwrap();

        assert_eq!(viewport.center, Coordinates::new(1.0, 2.0));
        assert_eq!(viewport.zoom, 13);
        assert_eq!(viewport.target, ViewportTarget::Local);
    }

    #[test]
    fn test_following_centers_on_peer() {
        let viewport = compute_viewport(
            Some("me"),
            Some(Coordinates::new(1.0, 2.0)),
            &live(&[("b", 10.0, 20.0)]),
            &FollowState::Following("b".into()),
            &ViewportConfig::default(),
        )
        .unwrap();

        assert_eq!(viewport.center, Coordinates::new(10.0, 20.0));
        assert_eq!(viewport.zoom, 15);
        assert_eq!(viewport.target, ViewportTarget::Peer("b".into()));
    }

    #[test]
    fn test_absent_peer_falls_back_to_local() {
        let follow = FollowState::Following("gone".into());
        let viewport = compute_viewport(
            Some("me"),
            Some(Coordinates::new(1.0, 2.0)),
            &live(&[("b", 10.0, 20.0)]),
            &follow,
            &ViewportConfig::default(),
        )
        .unwrap();

        assert_eq!(viewport.center, Coordinates::new(1.0, 2.0));
        assert_eq!(viewport.target, ViewportTarget::Local);
        // 跟随状态本身不变
        assert_eq!(follow, FollowState::Following("gone".into()));
    }

    #[test]
    fn test_following_self_centers_on_local() {
        let viewport = compute_viewport(
            Some("me"),
            Some(Coordinates::new(1.0, 2.0)),
            &live(&[("me", 50.0, 50.0)]),
            &FollowState::Following("me".into()),
            &ViewportConfig::default(),
        )
        .unwrap();

        assert_eq!(viewport.center, Coordinates::new(1.0, 2.0));
        assert_eq!(viewport.zoom, 13);
    }

    #[test]
    fn test_no_position_yet() {
        assert!(
            compute_viewport(
                None,
                None,
                &LiveLocationSet::default(),
                &FollowState::Unfollowed,
                &ViewportConfig::default(),
            )
            .is_none()
        );

        // 本地位置未知时仍可跟随在线用户
        assert!(
            compute_viewport(
                Some("me"),
                None,
                &live(&[("b", 3.0, 4.0)]),
                &FollowState::Following("b".into()),
                &ViewportConfig::default(),
            )
            .is_some()
        );
    }
}
