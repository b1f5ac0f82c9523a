// 过期判断、定位错误展示和地图标记

pub mod geo_error;
pub mod markers;
pub mod staleness;

pub use geo_error::{GeoErrorView, error_view};
pub use markers::{FollowAction, Marker, MarkerPopup, build_markers};
pub use staleness::{DEFAULT_STALE_THRESHOLD, PeerLiveness, StalenessPolicy};
