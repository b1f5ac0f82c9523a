// 地图渲染接口

use crate::follow::{Viewport, ViewportTarget};
use crate::policy::{GeoErrorView, Marker};

/// 地图渲染器，接收视图中心、缩放和标记列表
pub trait MapRenderer: Send + Sync {
    fn render(&self, viewport: &Viewport, markers: &[Marker]);

    fn render_error(&self, view: &GeoErrorView);

    fn render_locating(&self);
}

/// 把每一帧写入日志的渲染器
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRenderer;

impl MapRenderer for TracingRenderer {
    fn render(&self, viewport: &Viewport, markers: &[Marker]) {
        let target = match &viewport.target {
            ViewportTarget::Local => "local".to_string(),
            ViewportTarget::Peer(peer_id) => format!("peer {}", peer_id),
        };
        tracing::info!(
            "Map centered on ({:.6}, {:.6}) zoom {} [{}], {} markers",
            viewport.center.lat,
            viewport.center.lng,
            viewport.zoom,
            target,
            markers.len()
        );

        for marker in markers {
            tracing::debug!(
                "  {} {} ({:.6}, {:.6}){}{}",
                if marker.is_self { "*" } else { "-" },
                marker.popup.display_name,
                marker.position.lat,
                marker.position.lng,
                if marker.stale { " stale" } else { "" },
                match marker.popup.follow_action {
                    Some(action) => format!(" [{:?}]", action),
                    None => String::new(),
                }
            );
        }
    }

    fn render_error(&self, view: &GeoErrorView) {
        if view.retry_available {
            tracing::warn!("{} (retry available)", view.message);
        } else {
            tracing::warn!("{}", view.message);
        }
    }

    fn render_locating(&self) {
        tracing::info!("Waiting for the first location fix");
    }
}
