use std::env;

use thiserror::Error;

/// 定位错误，对应设备定位接口返回的错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum GeoError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("location request timed out")]
    Timeout,
    #[error("geolocation is not supported on this device")]
    Unsupported,
}

/// 存储写入/读取错误
///
/// 位置发布和在线状态写入失败时只记录日志，不向用户展示
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid store path: {0}")]
    InvalidPath(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// 订阅错误，订阅失败时没有任何其他用户可见，需要提示用户
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("failed to read collection {collection}: {reason}")]
    Read { collection: String, reason: String },
    #[error("subscription closed by the store")]
    Closed,
}

impl SubscriptionError {
    pub fn read(collection: &str, err: &StoreError) -> Self {
        Self::Read {
            collection: collection.to_string(),
            reason: err.to_string(),
        }
    }
}

/// 轨迹文件错误
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("failed to read track file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid track line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] env::VarError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    #[error(transparent)]
    Track(#[from] TrackError),
}
