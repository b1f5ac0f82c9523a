use super::StalenessPolicy;
use crate::follow::FollowState;
use crate::models::{Coordinates, LiveLocationSet, UserProfile};

/// 本人标记未设置昵称时的显示名
pub const SELF_DISPLAY_NAME: &str = "You";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowAction {
    Follow,
    Unfollow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerPopup {
    pub display_name: String,
    pub photo_url: Option<String>,
    pub timestamp: i64,
    /// 只有他人的标记有跟随按钮
    pub follow_action: Option<FollowAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub user_id: String,
    pub position: Coordinates,
    pub is_self: bool,
    pub stale: bool,
    pub popup: MarkerPopup,
}

/// 生成地图标记
///
/// 本人的标记使用本地当前位置，覆盖集合中本人发布的记录；其余在线用户按 ID 排序
pub fn build_markers(
    me: Option<&UserProfile>,
    current: Option<Coordinates>,
    live: &LiveLocationSet,
    follow: &FollowState,
    staleness: &StalenessPolicy,
    now_millis: i64,
) -> Vec<Marker> {
    let self_id = me.map(|profile| profile.user_id.as_str());
    let mut markers = Vec::with_capacity(live.len() + 1);

    for user_id in live.user_ids() {
        let Some(location) = live.get(&user_id) else {
            continue;
        };

        let is_self = self_id == Some(user_id.as_str());
        if is_self && current.is_some() {
            continue;
        }

        let follow_action = match (me, is_self) {
            (Some(_), false) if follow.followed_id() == Some(user_id.as_str()) => {
                Some(FollowAction::Unfollow)
            }
            (Some(_), false) => Some(FollowAction::Follow),
            _ => None,
        };

        markers.push(Marker {
            position: location.coordinates(),
            is_self,
            stale: staleness.is_stale(location, now_millis),
            popup: MarkerPopup {
                display_name: location.display_name.clone(),
                photo_url: location.photo_url.clone(),
                timestamp: location.timestamp,
                follow_action,
            },
            user_id,
        });
    }

    if let (Some(profile), Some(position)) = (me, current) {
        markers.push(Marker {
            user_id: profile.user_id.clone(),
            position,
            is_self: true,
            stale: false,
            popup: MarkerPopup {
                display_name: profile
                    .display_name
                    .clone()
                    .unwrap_or_else(|| SELF_DISPLAY_NAME.to_string()),
                photo_url: profile.photo_url.clone(),
                timestamp: now_millis,
                follow_action: None,
            },
        });
    }

    markers
}
