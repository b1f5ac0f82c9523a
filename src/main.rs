use std::sync::Arc;
use std::time::Duration;

use geotrack::{
    AppError, MapStatus, MapView, Session, SessionDeps,
    clock::system_clock,
    config::Config,
    geolocation::{FeedDevice, track},
    render::{MapRenderer, TracingRenderer},
    store::redis_store::RedisStore,
};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 过期标记的刷新周期
const REFRESH_INTERVAL: Duration = Duration::from_secs(5);
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    if let Err(e) = run(config).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).map_err(geotrack::StoreError::from)?;
    let store = Arc::new(
        RedisStore::connect(
            Arc::new(redis_client),
            &config.store_namespace,
            config.lease_ttl(),
            config.ping_interval(),
        )
        .await?,
    );

    // 定位来源：回放轨迹文件
    let clock = system_clock();
    let device = Arc::new(FeedDevice::new(clock.clone()));
    let replay = match &config.track_file {
        Some(path) => {
            let points = track::load_track(path).await?;
            tracing::info!("Replaying {} track points from {}", points.len(), path);
            Some(tokio::spawn(track::replay(
                device.clone(),
                points,
                config.track_interval(),
                true,
            )))
        }
        None => {
            tracing::warn!("TRACK_FILE not set, waiting for positions that never arrive");
            None
        }
    };

    let deps = SessionDeps {
        store: store.clone(),
        device,
        clock,
    };
    let mut session = Session::sign_in(config.user_profile(), deps, config.session_settings()).await;

    if !session.location_enabled().await {
        tracing::warn!("Location permission is not granted");
    }

    if let Some(peer_id) = &config.follow_user_id {
        tracing::info!("Following {}", peer_id);
        session.follow(peer_id);
    }

    let renderer = TracingRenderer;
    let mut views = session.subscribe_view();
    let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
    let mut resubscribe_at: Option<Instant> = None;

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                render(&renderer, &views);
                if views.borrow().peers_error.is_some() && resubscribe_at.is_none() {
                    resubscribe_at = Some(Instant::now() + RESUBSCRIBE_DELAY);
                }
            }
            _ = tokio::time::sleep_until(resubscribe_at.unwrap_or_else(Instant::now)), if resubscribe_at.is_some() => {
                resubscribe_at = None;
                if let Err(e) = session.resubscribe().await {
                    tracing::error!("Failed to resubscribe: {}", e);
                    resubscribe_at = Some(Instant::now() + RESUBSCRIBE_DELAY);
                }
            }
            _ = refresh.tick() => {
                session.refresh();
                // 重新订阅后立即以相同错误失败时视图不会变化
                if session.view().peers_error.is_some() && resubscribe_at.is_none() {
                    resubscribe_at = Some(Instant::now() + RESUBSCRIBE_DELAY);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    if let Some(replay) = replay {
        replay.abort();
    }
    session.sign_out().await;
    store.close();

    Ok(())
}

fn render(renderer: &impl MapRenderer, views: &watch::Receiver<MapView>) {
    let view = views.borrow().clone();
    match &view.status {
        MapStatus::Locating => renderer.render_locating(),
        MapStatus::Blocked(error) => renderer.render_error(error),
        MapStatus::Ready { viewport, markers } => renderer.render(viewport, markers),
    }
    if let Some(e) = &view.peers_error {
        tracing::warn!("Peer locations unavailable: {}", e);
    }
}
