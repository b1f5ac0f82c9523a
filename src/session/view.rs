use super::{SessionSettings, ViewState};
use crate::error::SubscriptionError;
use crate::follow::{Viewport, compute_viewport};
use crate::policy::{GeoErrorView, Marker, build_markers, error_view};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum MapStatus {
    /// 还没有可显示的位置
    #[default]
    Locating,
    /// 定位出错，地图不显示
    Blocked(GeoErrorView),
    Ready {
        viewport: Viewport,
        markers: Vec<Marker>,
    },
}

/// 会话当前的地图视图
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapView {
    pub status: MapStatus,
    /// 订阅他人位置失败时的错误，地图仍显示最后一次收到的数据
    pub peers_error: Option<SubscriptionError>,
}

impl MapView {
    pub fn viewport(&self) -> Option<&Viewport> {
        match &self.status {
            MapStatus::Ready { viewport, .. } => Some(viewport),
            _ => None,
        }
    }

    pub fn markers(&self) -> &[Marker] {
        match &self.status {
            MapStatus::Ready { markers, .. } => markers,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&GeoErrorView> {
        match &self.status {
            MapStatus::Blocked(view) => Some(view),
            _ => None,
        }
    }
}

pub(super) fn derive_view(state: &ViewState, settings: &SessionSettings, now_millis: i64) -> MapView {
    let status = match state.geo_error {
        Some(error) => MapStatus::Blocked(error_view(error)),
        None => {
            let viewport = compute_viewport(
                Some(&state.user.user_id),
                state.current,
                &state.live,
                state.follow.state(),
                &settings.viewport,
            );
            match viewport {
                Some(viewport) => MapStatus::Ready {
                    viewport,
                    markers: build_markers(
                        Some(&state.user),
                        state.current,
                        &state.live,
                        state.follow.state(),
                        &settings.staleness,
                        now_millis,
                    ),
                },
                None => MapStatus::Locating,
            }
        }
    };

    MapView {
        status,
        peers_error: state.peers_error.clone(),
    }
}
