use std::env;
use std::time::Duration;

use crate::follow::ViewportConfig;
use crate::geolocation::GeoConfig;
use crate::models::UserProfile;
use crate::policy::StalenessPolicy;
use crate::session::SessionSettings;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub redis_url: String,
    pub store_namespace: String,
    pub user_id: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub follow_user_id: Option<String>,
    pub track_file: Option<String>,
    pub track_interval_ms: u64,
    pub geo_high_accuracy: bool,
    pub geo_timeout_ms: u64,
    pub geo_max_cache_age_ms: u64,
    pub stale_threshold_secs: u64,
    pub default_zoom: u8,
    pub follow_zoom: u8,
    pub presence_lease_secs: u64,
    pub presence_ping_interval_secs: u64,
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match optional(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid {}={:?}, using default", key, raw);
            default
        }),
        None => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let mut config = Config {
            redis_url: env::var("REDIS_URL")?,
            store_namespace: optional("STORE_NAMESPACE").unwrap_or_else(|| "geotrack".into()),
            user_id: env::var("USER_ID")?,
            display_name: optional("DISPLAY_NAME"),
            photo_url: optional("PHOTO_URL"),
            follow_user_id: optional("FOLLOW_USER_ID"),
            track_file: optional("TRACK_FILE"),
            track_interval_ms: parse_or("TRACK_INTERVAL_MS", 1000),
            geo_high_accuracy: parse_or("GEO_HIGH_ACCURACY", true),
            geo_timeout_ms: parse_or("GEO_TIMEOUT_MS", 10_000),
            geo_max_cache_age_ms: parse_or("GEO_MAX_CACHE_AGE_MS", 0),
            stale_threshold_secs: parse_or("STALE_THRESHOLD_SECS", 45),
            default_zoom: parse_or("DEFAULT_ZOOM", 13),
            follow_zoom: parse_or("FOLLOW_ZOOM", 15),
            presence_lease_secs: parse_or("PRESENCE_LEASE_SECS", 15),
            presence_ping_interval_secs: parse_or("PRESENCE_PING_INTERVAL_SECS", 5),
        };
        config.normalize();
        Ok(config)
    }

    /// 修正会让后台任务无法运行的取值
    ///
    /// 间隔不能为 0；心跳间隔必须小于租约，否则存活的连接会被其他客户端当作断线
    fn normalize(&mut self) {
        if self.track_interval_ms == 0 {
            tracing::warn!("TRACK_INTERVAL_MS must be positive, using 1");
            self.track_interval_ms = 1;
        }
        if self.presence_lease_secs < 2 {
            tracing::warn!("PRESENCE_LEASE_SECS must be at least 2, using 2");
            self.presence_lease_secs = 2;
        }
        let max_ping = self.presence_lease_secs / 2;
        if self.presence_ping_interval_secs == 0 || self.presence_ping_interval_secs > max_ping {
            let ping = self.presence_ping_interval_secs.clamp(1, max_ping);
            tracing::warn!(
                "PRESENCE_PING_INTERVAL_SECS={} does not fit lease of {}s, using {}",
                self.presence_ping_interval_secs,
                self.presence_lease_secs,
                ping
            );
            self.presence_ping_interval_secs = ping;
        }
    }

    pub fn geo_config(&self) -> GeoConfig {
        GeoConfig {
            high_accuracy: self.geo_high_accuracy,
            timeout_ms: self.geo_timeout_ms,
            max_cache_age_ms: self.geo_max_cache_age_ms,
        }
    }

    pub fn viewport_config(&self) -> ViewportConfig {
        ViewportConfig {
            default_zoom: self.default_zoom,
            follow_zoom: self.follow_zoom,
        }
    }

    pub fn staleness_policy(&self) -> StalenessPolicy {
        StalenessPolicy::new(Duration::from_secs(self.stale_threshold_secs))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            geo: self.geo_config(),
            viewport: self.viewport_config(),
            staleness: self.staleness_policy(),
        }
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.presence_lease_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.presence_ping_interval_secs)
    }

    pub fn track_interval(&self) -> Duration {
        Duration::from_millis(self.track_interval_ms)
    }

    pub fn user_profile(&self) -> UserProfile {
        let mut profile = UserProfile::new(self.user_id.clone());
        if let Some(name) = &self.display_name {
            profile = profile.with_display_name(name.clone());
        }
        if let Some(url) = &self.photo_url {
            profile = profile.with_photo_url(url.clone());
        }
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            redis_url: "redis://127.0.0.1/".into(),
            store_namespace: "geotrack".into(),
            user_id: "u1".into(),
            display_name: None,
            photo_url: None,
            follow_user_id: None,
            track_file: None,
            track_interval_ms: 1000,
            geo_high_accuracy: true,
            geo_timeout_ms: 10_000,
            geo_max_cache_age_ms: 0,
            stale_threshold_secs: 45,
            default_zoom: 13,
            follow_zoom: 15,
            presence_lease_secs: 15,
            presence_ping_interval_secs: 5,
        }
    }

    #[test]
    fn test_normalize_keeps_valid_values() {
        let mut config = config();
        config.normalize();
        assert_eq!(config.ping_interval(), Duration::from_secs(5));
        assert_eq!(config.lease_ttl(), Duration::from_secs(15));
        assert_eq!(config.track_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_normalize_rejects_zero_intervals() {
        let mut config = config();
        config.presence_ping_interval_secs = 0;
        config.track_interval_ms = 0;
        config.normalize();
        assert_eq!(config.ping_interval(), Duration::from_secs(1));
        assert_eq!(config.track_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_normalize_keeps_ping_below_lease() {
        let mut config = config();
        config.presence_ping_interval_secs = 15;
        config.normalize();
        assert_eq!(config.ping_interval(), Duration::from_secs(7));

        config.presence_lease_secs = 0;
        config.normalize();
        assert_eq!(config.lease_ttl(), Duration::from_secs(2));
        assert_eq!(config.ping_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_user_profile_from_config() {
        let mut config = config();
        config.display_name = Some("Alice".into());
        let profile = config.user_profile();
        assert_eq!(profile.user_id, "u1");
        assert_eq!(profile.display_name_or_default(), "Alice");
        assert_eq!(profile.photo_url, None);
    }
}
