use std::sync::atomic::{AtomicI64, Ordering};

use crate::clock::SharedClock;
use crate::error::StoreError;
use crate::models::{Coordinates, Location, UserProfile};
use crate::store::keys::location_key;
use crate::store::{SharedStore, set_record};

/// 位置发布
///
/// 每个被接受的定位结果对应一次整条覆盖写入，不做节流
pub struct LocationPublisher {
    store: SharedStore,
    clock: SharedClock,
    last_stamp: AtomicI64,
}

impl LocationPublisher {
    pub fn new(store: SharedStore, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            last_stamp: AtomicI64::new(i64::MIN),
        }
    }

    /// 时钟回拨时沿用上一次的时间，保证同一用户的时间戳不减
    fn stamp(&self) -> i64 {
        let now = self.clock.now_millis();
        let previous = self.last_stamp.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }

    fn build(&self, user: &UserProfile, coords: Coordinates, is_online: bool) -> Location {
        let stamp = self.stamp();
        Location {
            lat: coords.lat,
            lng: coords.lng,
            timestamp: stamp,
            user_id: user.user_id.clone(),
            display_name: user.display_name_or_default(),
            photo_url: user.photo_url.clone(),
            last_active: stamp,
            is_online,
        }
    }

    /// 写入 `locations/{userId}`，返回写入的记录
    pub async fn publish(&self, user: &UserProfile, coords: Coordinates) -> Result<Location, StoreError> {
        let location = self.build(user, coords, true);
        set_record(self.store.as_ref(), &location_key(&user.user_id), &location).await?;

        tracing::debug!(
            "Published location for {}: ({}, {}) at {}",
            user.user_id,
            location.lat,
            location.lng,
            location.timestamp
        );
        Ok(location)
    }

    /// 退出时写入离线的位置记录，记录本身保留
    pub async fn publish_offline(
        &self,
        user: &UserProfile,
        coords: Coordinates,
    ) -> Result<Location, StoreError> {
        let location = self.build(user, coords, false);
        set_record(self.store.as_ref(), &location_key(&user.user_id), &location).await?;

        tracing::info!("Marked location of {} offline", user.user_id);
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{InMemoryStore, Store};

    fn setup(start: i64) -> (Arc<InMemoryStore>, Arc<ManualClock>, LocationPublisher) {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(start));
        let publisher = LocationPublisher::new(store.clone(), clock.clone());
        (store, clock, publisher)
    }

    #[tokio::test]
    async fn test_publish_writes_full_record() {
        let (store, _, publisher) = setup(5_000);
        let user = UserProfile::new("u1").with_photo_url("https://example.com/p.png");

        let location = publisher
            .publish(&user, Coordinates::new(10.0, 20.0))
            .await
            .unwrap();

        assert!(location.is_online);
        assert_eq!(location.display_name, "Anonymous");
        assert_eq!(location.timestamp, 5_000);
        assert_eq!(location.last_active, 5_000);

        let history = store.write_history("locations/u1");
        assert_eq!(history.len(), 1);
        let stored: Location = serde_json::from_value(history[0].clone()).unwrap();
        assert_eq!(stored, location);
    }

    #[tokio::test]
    async fn test_one_write_per_sample_with_non_decreasing_timestamps() {
        let (store, clock, publisher) = setup(10_000);
        let user = UserProfile::new("u1");

        // 时钟回拨
        let offsets = [0, 100, -500, 0, 2_000, -3_000];
        for (i, offset) in offsets.iter().enumerate() {
            clock.advance(*offset);
            publisher
                .publish(&user, Coordinates::new(i as f64, i as f64))
                .await
                .unwrap();
        }

        let history = store.write_history("locations/u1");
        assert_eq!(history.len(), offsets.len());

        let stamps: Vec<i64> = history
            .iter()
            .map(|v| v["timestamp"].as_i64().unwrap())
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]), "{stamps:?}");
    }

    #[tokio::test]
    async fn test_publish_failure_is_returned() {
        let (store, _, publisher) = setup(0);
        store.set_fail_writes(true);

        let result = publisher
            .publish(&UserProfile::new("u1"), Coordinates::new(1.0, 1.0))
            .await;
        assert!(result.is_err());

        // 下一次定位正常发布
        store.set_fail_writes(false);
        assert!(
            publisher
                .publish(&UserProfile::new("u1"), Coordinates::new(1.0, 1.0))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_publish_offline_keeps_record() {
        let (store, _, publisher) = setup(0);
        let user = UserProfile::new("u1").with_display_name("Lan");
        publisher.publish(&user, Coordinates::new(1.0, 2.0)).await.unwrap();
        publisher
            .publish_offline(&user, Coordinates::new(1.0, 2.0))
            .await
            .unwrap();

        let stored = store.snapshot("locations").await.unwrap();
        assert_eq!(stored["u1"]["isOnline"], false);
        assert_eq!(stored["u1"]["displayName"], "Lan");
    }
}
