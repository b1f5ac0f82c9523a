// 定位来源
// 封装设备定位接口：先给出一次定位，再持续推送位置变化，直到调用 stop

pub mod feed;
pub mod track;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::GeoError;
use crate::models::Position;

pub use feed::FeedDevice;

/// 定位事件
pub type GeoEvent = Result<Position, GeoError>;

/// 定位事件流，发送端在后台任务中
pub type GeoStream = mpsc::UnboundedReceiver<GeoEvent>;

/// 设备位置监听
pub type DeviceWatch = mpsc::UnboundedReceiver<GeoEvent>;

/// 定位参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoConfig {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    /// 可接受的缓存定位最大时长，0 表示必须重新定位
    pub max_cache_age_ms: u64,
}

impl GeoConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 10_000,
            max_cache_age_ms: 0,
        }
    }
}

/// 定位权限状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
    Unknown,
}

impl PermissionState {
    /// 无法查询权限时按已开启处理
    pub fn is_enabled(&self) -> bool {
        !matches!(self, PermissionState::Denied | PermissionState::Prompt)
    }
}

/// 设备定位接口
#[async_trait]
pub trait PositionDevice: Send + Sync {
    fn is_supported(&self) -> bool {
        true
    }

    async fn permission_state(&self) -> PermissionState {
        PermissionState::Unknown
    }

    /// 单次定位，超时返回 [`GeoError::Timeout`]
    async fn current_position(&self, config: &GeoConfig) -> GeoEvent;

    /// 开始监听位置变化，丢弃返回的接收端即停止监听
    async fn watch_position(&self, config: &GeoConfig) -> Result<DeviceWatch, GeoError>;
}

pub type SharedDevice = Arc<dyn PositionDevice>;

/// 定位来源
///
/// 同一时间只有一个后台监听；再次 `start` 会先停止旧的监听
pub struct GeolocationSource {
    device: SharedDevice,
    active: Option<JoinHandle<()>>,
}

impl GeolocationSource {
    pub fn new(device: SharedDevice) -> Self {
        Self {
            device,
            active: None,
        }
    }

    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    /// 开始定位，返回事件流
    ///
    /// 不做任何重试，错误原样推送给调用方；监听意外结束时推送 `PositionUnavailable`
    pub fn start(&mut self, config: GeoConfig) -> GeoStream {
        self.stop();

        let (tx, rx) = mpsc::unbounded_channel();
        let device = self.device.clone();

        self.active = Some(tokio::spawn(async move {
            run_source(device, config, tx).await;
        }));

        rx
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.abort();
            tracing::debug!("Geolocation watch stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for GeolocationSource {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_source(
    device: SharedDevice,
    config: GeoConfig,
    tx: mpsc::UnboundedSender<GeoEvent>,
) {
    if !device.is_supported() {
        let _ = tx.send(Err(GeoError::Unsupported));
        return;
    }

    // 先建立监听，再取首次定位，首次定位之后到达的更新不会丢失
    let watch = device.watch_position(&config).await;

    let initial = match tokio::time::timeout(config.timeout(), device.current_position(&config)).await
    {
        Ok(event) => event,
        Err(_) => Err(GeoError::Timeout),
    };
    let initial_fix = initial.as_ref().ok().copied();
    let initial_error = initial.as_ref().err().copied();
    if tx.send(initial).is_err() {
        return;
    }

    let mut watch = match watch {
        Ok(watch) => watch,
        Err(e) => {
            if initial_error != Some(e) {
                let _ = tx.send(Err(e));
            }
            return;
        }
    };

    let mut skip_duplicate = initial_fix;
    loop {
        tokio::select! {
            event = watch.recv() => match event {
                Some(event) => {
                    // 首次定位可能同时进入了监听，丢弃重复的一条
                    let first = skip_duplicate.take();
                    if matches!((&event, first), (Ok(position), Some(fix)) if *position == fix) {
                        continue;
                    }
                    if tx.send(event).is_err() {
                        return;
                    }
                }
                None => {
                    tracing::warn!("Geolocation watch ended unexpectedly");
                    let _ = tx.send(Err(GeoError::PositionUnavailable));
                    return;
                }
            },
            _ = tx.closed() => return,
        }
    }
}
