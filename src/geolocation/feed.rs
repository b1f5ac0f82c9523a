use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::{DeviceWatch, GeoConfig, GeoEvent, PermissionState, PositionDevice};
use crate::clock::SharedClock;
use crate::error::GeoError;
use crate::models::{Coordinates, Position};

struct FeedState {
    supported: bool,
    permission: PermissionState,
    last_fix: Option<Position>,
    waiters: Vec<oneshot::Sender<GeoEvent>>,
    watchers: Vec<mpsc::UnboundedSender<GeoEvent>>,
}

/// 由外部推送位置的定位设备
///
/// 轨迹回放和测试通过 `push_fix`/`push_error` 模拟设备上报
pub struct FeedDevice {
    clock: SharedClock,
    state: Mutex<FeedState>,
}

impl FeedDevice {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            state: Mutex::new(FeedState {
                supported: true,
                permission: PermissionState::Granted,
                last_fix: None,
                waiters: Vec::new(),
                watchers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_supported(&self, supported: bool) {
        self.lock().supported = supported;
    }

    pub fn set_permission(&self, permission: PermissionState) {
        self.lock().permission = permission;
    }

    /// 上报一次定位，采集时间取自时钟
    pub fn push_fix(&self, lat: f64, lng: f64, accuracy: f64) -> Position {
        let position = Position {
            coords: Coordinates::new(lat, lng),
            accuracy,
            timestamp: self.clock.now_millis(),
        };

        let mut state = self.lock();
        state.last_fix = Some(position);
        Self::dispatch(&mut state, Ok(position));
        position
    }

    pub fn push_error(&self, error: GeoError) {
        let mut state = self.lock();
        Self::dispatch(&mut state, Err(error));
    }

    /// 关闭所有监听，模拟设备监听意外终止
    pub fn end_watches(&self) {
        self.lock().watchers.clear();
    }

    pub fn watcher_count(&self) -> usize {
        self.lock()
            .watchers
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    /// 等待至少 `count` 个监听建立
    pub async fn wait_for_watchers(&self, count: usize) {
        while self.watcher_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn dispatch(state: &mut FeedState, event: GeoEvent) {
        for waiter in state.waiters.drain(..) {
            let _ = waiter.send(event);
        }
        state.watchers.retain(|tx| tx.send(event).is_ok());
    }
}

#[async_trait]
impl PositionDevice for FeedDevice {
    fn is_supported(&self) -> bool {
        self.lock().supported
    }

    async fn permission_state(&self) -> PermissionState {
        self.lock().permission
    }

    async fn current_position(&self, config: &GeoConfig) -> GeoEvent {
        let rx = {
            let mut state = self.lock();
            if state.permission == PermissionState::Denied {
                return Err(GeoError::PermissionDenied);
            }

            if let Some(fix) = state.last_fix {
                let age = self.clock.now_millis() - fix.timestamp;
                if age >= 0 && age as u64 <= config.max_cache_age_ms {
                    return Ok(fix);
                }
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            rx
        };

        rx.await.unwrap_or(Err(GeoError::PositionUnavailable))
    }

    async fn watch_position(&self, _config: &GeoConfig) -> Result<DeviceWatch, GeoError> {
        let mut state = self.lock();
        if state.permission == PermissionState::Denied {
            return Err(GeoError::PermissionDenied);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.watchers.push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_cached_fix_within_max_age() {
        let clock = Arc::new(ManualClock::new(1_000));
        let device = FeedDevice::new(clock.clone());
        device.push_fix(1.0, 2.0, 3.0);

        clock.advance(500);
        let config = GeoConfig {
            max_cache_age_ms: 1_000,
            ..GeoConfig::default()
        };
        let fix = device.current_position(&config).await.unwrap();
        assert_eq!(fix.coords, Coordinates::new(1.0, 2.0));
        assert_eq!(fix.timestamp, 1_000);
    }

    #[tokio::test]
    async fn test_stale_cache_waits_for_next_fix() {
        let clock = Arc::new(ManualClock::new(1_000));
        let device = Arc::new(FeedDevice::new(clock.clone()));
        device.push_fix(1.0, 2.0, 3.0);
        clock.advance(5_000);

        let waiting = {
            let device = device.clone();
            tokio::spawn(async move { device.current_position(&GeoConfig::default()).await })
        };

        while device.lock().waiters.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        device.push_fix(3.0, 4.0, 3.0);

        let fix = waiting.await.unwrap().unwrap();
        assert_eq!(fix.coords, Coordinates::new(3.0, 4.0));
    }

    #[tokio::test]
    async fn test_denied_permission() {
        let clock = Arc::new(ManualClock::new(0));
        let device = FeedDevice::new(clock);
        device.set_permission(PermissionState::Denied);

        assert_eq!(
            device.current_position(&GeoConfig::default()).await,
            Err(GeoError::PermissionDenied)
        );
        assert!(device.watch_position(&GeoConfig::default()).await.is_err());
        assert!(!device.permission_state().await.is_enabled());
    }

    #[tokio::test]
    async fn test_errors_reach_watchers() {
        let clock = Arc::new(ManualClock::new(0));
        let device = FeedDevice::new(clock);
        let mut watch = device.watch_position(&GeoConfig::default()).await.unwrap();

        device.push_error(GeoError::Timeout);
        assert_eq!(watch.recv().await, Some(Err(GeoError::Timeout)));
    }
}
