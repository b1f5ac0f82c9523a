// 跟随与视图中心

pub mod viewport;

pub use viewport::{Viewport, ViewportConfig, ViewportTarget, compute_viewport};

/// 跟随状态，同一时间最多跟随一个用户
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FollowState {
    #[default]
    Unfollowed,
    Following(String),
}

impl FollowState {
    pub fn followed_id(&self) -> Option<&str> {
        match self {
            FollowState::Following(peer_id) => Some(peer_id),
            FollowState::Unfollowed => None,
        }
    }
}

/// 跟随控制
///
/// 只按用户 ID 跟随。被跟随的用户离线时不会自动取消跟随，由视图计算回退到本地位置
#[derive(Debug, Default)]
pub struct FollowController {
    state: FollowState,
}

impl FollowController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FollowState {
        &self.state
    }

    /// 跟随用户，覆盖之前的跟随
    pub fn follow(&mut self, peer_id: impl Into<String>) {
        let peer_id = peer_id.into();
        tracing::info!("Following {}", peer_id);
        self.state = FollowState::Following(peer_id);
    }

    pub fn unfollow(&mut self) {
        if let FollowState::Following(peer_id) = &self.state {
            tracing::info!("Stopped following {}", peer_id);
        }
        self.state = FollowState::Unfollowed;
    }

    pub fn is_following(&self, peer_id: &str) -> bool {
        self.state.followed_id() == Some(peer_id)
    }

    /// 已跟随该用户时取消，否则改为跟随该用户
    pub fn toggle(&mut self, peer_id: &str) {
        if self.is_following(peer_id) {
            self.unfollow();
        } else {
            self.follow(peer_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_overwrites_previous() {
        let mut controller = FollowController::new();
        controller.follow("a");
        controller.follow("b");
        assert_eq!(controller.state(), &FollowState::Following("b".to_string()));
    }

    #[test]
    fn test_unfollow_from_any_state() {
        let mut controller = FollowController::new();
        controller.unfollow();
        assert_eq!(controller.state(), &FollowState::Unfollowed);

        controller.follow("a");
        controller.unfollow();
        assert_eq!(controller.state(), &FollowState::Unfollowed);
    }

    #[test]
    fn test_toggle() {
        let mut controller = FollowController::new();
        controller.toggle("a");
        assert!(controller.is_following("a"));

        controller.toggle("b");
        assert!(controller.is_following("b"));

        controller.toggle("b");
        assert_eq!(controller.state(), &FollowState::Unfollowed);
    }
}
