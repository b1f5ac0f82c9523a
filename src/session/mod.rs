// 登录会话
// 每个登录用户一套：定位来源、在线状态、位置发布、位置订阅和跟随状态

mod view;

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::SharedClock;
use crate::error::SubscriptionError;
use crate::follow::{FollowController, FollowState, ViewportConfig};
use crate::geolocation::{GeoConfig, GeoStream, GeolocationSource, SharedDevice};
use crate::location::{LocationPublisher, LocationSubscriber, SubscriptionId};
use crate::models::{LiveLocationSet, UserProfile};
use crate::policy::StalenessPolicy;
use crate::presence::{HookState, PresenceTracker};
use crate::store::SharedStore;

pub use view::{MapStatus, MapView};

/// 会话依赖的外部组件
#[derive(Clone)]
pub struct SessionDeps {
    pub store: SharedStore,
    pub device: SharedDevice,
    pub clock: SharedClock,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSettings {
    pub geo: GeoConfig,
    pub viewport: ViewportConfig,
    pub staleness: StalenessPolicy,
}

struct ViewState {
    user: UserProfile,
    current: Option<crate::models::Coordinates>,
    geo_error: Option<crate::error::GeoError>,
    live: LiveLocationSet,
    follow: FollowController,
    peers_error: Option<SubscriptionError>,
}

struct SessionShared {
    state: Mutex<ViewState>,
    view_tx: watch::Sender<MapView>,
    clock: SharedClock,
    settings: SessionSettings,
}

impl SessionShared {
    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 修改状态后重新计算视图
    fn update(&self, mutate: impl FnOnce(&mut ViewState)) {
        let view = {
            let mut state = self.lock();
            mutate(&mut state);
            view::derive_view(&state, &self.settings, self.clock.now_millis())
        };
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }
}

/// 登录会话
///
/// 退出登录或销毁时停止定位监听、取消所有订阅
pub struct Session {
    shared: Arc<SessionShared>,
    device: SharedDevice,
    geo: GeolocationSource,
    pump: Option<JoinHandle<()>>,
    presence: PresenceTracker,
    publisher: Arc<LocationPublisher>,
    subscriber: LocationSubscriber,
    subscription: Option<SubscriptionId>,
}

impl Session {
    /// 登录：启动在线状态、订阅在线用户位置并开始定位
    ///
    /// 订阅失败不会阻止登录，错误体现在视图的 `peers_error` 中，可调用 [`Session::resubscribe`] 重试
    pub async fn sign_in(user: UserProfile, deps: SessionDeps, settings: SessionSettings) -> Self {
        tracing::info!("Signing in {}", user.user_id);

        let (view_tx, _) = watch::channel(MapView::default());
        let shared = Arc::new(SessionShared {
            state: Mutex::new(ViewState {
                user: user.clone(),
                current: None,
                geo_error: None,
                live: LiveLocationSet::default(),
                follow: FollowController::new(),
                peers_error: None,
            }),
            view_tx,
            clock: deps.clock.clone(),
            settings,
        });

        let presence = PresenceTracker::new(deps.store.clone(), deps.clock.clone());
        presence.initialize(&user.user_id);

        let mut session = Self {
            shared,
            device: deps.device.clone(),
            geo: GeolocationSource::new(deps.device),
            pump: None,
            presence,
            publisher: Arc::new(LocationPublisher::new(deps.store.clone(), deps.clock)),
            subscriber: LocationSubscriber::new(deps.store),
            subscription: None,
        };

        if let Err(e) = session.resubscribe().await {
            tracing::error!("Failed to subscribe to locations: {}", e);
        }
        session.start_geolocation();

        session
    }

    pub fn user(&self) -> UserProfile {
        self.shared.lock().user.clone()
    }

    /// 重新订阅在线用户位置，替换之前的订阅
    pub async fn resubscribe(&mut self) -> Result<(), SubscriptionError> {
        if let Some(id) = self.subscription.take() {
            self.subscriber.unsubscribe(id);
        }

        let shared = self.shared.clone();
        let result = self
            .subscriber
            .subscribe(move |update| match update {
                Ok(live) => shared.update(|state| {
                    state.live = live;
                    state.peers_error = None;
                }),
                Err(e) => shared.update(|state| state.peers_error = Some(e)),
            })
            .await;

        match result {
            Ok(id) => {
                // peers_error 只由订阅回调清除
                self.subscription = Some(id);
                Ok(())
            }
            Err(e) => {
                let error = e.clone();
                self.shared.update(|state| state.peers_error = Some(error));
                Err(e)
            }
        }
    }

    fn start_geolocation(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        let stream = self.geo.start(self.shared.settings.geo);
        self.pump = Some(tokio::spawn(run_pump(
            self.shared.clone(),
            self.publisher.clone(),
            stream,
        )));
    }

    /// 定位出错后的手动重试，重新启动定位来源
    pub fn retry_location(&mut self) {
        tracing::info!("Retrying geolocation");
        self.shared.update(|state| state.geo_error = None);
        self.start_geolocation();
    }

    /// 设备定位权限是否开启，无法查询时视为开启
    pub async fn location_enabled(&self) -> bool {
        self.device.permission_state().await.is_enabled()
    }

    pub fn follow(&self, peer_id: &str) {
        self.shared.update(|state| state.follow.follow(peer_id));
    }

    pub fn unfollow(&self) {
        self.shared.update(|state| state.follow.unfollow());
    }

    pub fn toggle_follow(&self, peer_id: &str) {
        self.shared.update(|state| state.follow.toggle(peer_id));
    }

    pub fn follow_state(&self) -> FollowState {
        self.shared.lock().follow.state().clone()
    }

    pub fn live_locations(&self) -> LiveLocationSet {
        self.shared.lock().live.clone()
    }

    pub fn presence_hook(&self) -> HookState {
        self.presence.hook_state()
    }

    pub fn view(&self) -> MapView {
        self.shared.view_tx.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<MapView> {
        self.shared.view_tx.subscribe()
    }

    /// 重新计算视图，用于按时间刷新过期标记
    pub fn refresh(&self) {
        self.shared.update(|_| {});
    }

    fn stop_background(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.geo.stop();
        self.subscriber.unsubscribe_all();
        self.subscription = None;
    }

    /// 退出登录
    pub async fn sign_out(mut self) {
        let (user, current) = {
            let state = self.shared.lock();
            (state.user.clone(), state.current)
        };
        tracing::info!("Signing out {}", user.user_id);

        self.stop_background();
        self.presence.sign_out().await;

        if let Some(coords) = current {
            if let Err(e) = self.publisher.publish_offline(&user, coords).await {
                tracing::warn!("Failed to mark location offline for {}: {}", user.user_id, e);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_background();
    }
}

/// 处理定位事件：更新本地位置并发布，出错时进入错误状态，不写存储
async fn run_pump(shared: Arc<SessionShared>, publisher: Arc<LocationPublisher>, mut stream: GeoStream) {
    while let Some(event) = stream.recv().await {
        match event {
            Ok(position) => {
                let mut user = None;
                shared.update(|state| {
                    state.current = Some(position.coords);
                    state.geo_error = None;
                    user = Some(state.user.clone());
                });

                if let Some(user) = user {
                    if let Err(e) = publisher.publish(&user, position.coords).await {
                        tracing::warn!("Failed to publish location for {}: {}", user.user_id, e);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Geolocation error: {}", e);
                shared.update(|state| state.geo_error = Some(e));
            }
        }
    }
    tracing::debug!("Geolocation stream closed");
}
