use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::FeedDevice;
use crate::error::TrackError;
use crate::models::Coordinates;

/// 未给出精度时使用的默认精度（米）
pub const DEFAULT_ACCURACY: f64 = 10.0;

/// 轨迹点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub coords: Coordinates,
    pub accuracy: f64,
}

/// 解析轨迹文本，每行 `lat,lng[,accuracy]`，空行和 `#` 开头的行忽略
pub fn parse_track(content: &str) -> Result<Vec<TrackPoint>, TrackError> {
    let mut points = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parse_error = |reason: String| TrackError::Parse {
            line: index + 1,
            reason,
        };

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 2 || fields.len() > 3 {
            return Err(parse_error(format!("expected 2 or 3 fields, got {}", fields.len())));
        }

        let number = |field: &str| {
            field
                .parse::<f64>()
                .map_err(|e| parse_error(format!("{}: {}", field, e)))
        };

        let lat = number(fields[0])?;
        let lng = number(fields[1])?;
        let accuracy = match fields.get(2) {
            Some(&field) => number(field)?,
            None => DEFAULT_ACCURACY,
        };

        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(parse_error(format!("coordinates out of range: {}, {}", lat, lng)));
        }

        points.push(TrackPoint {
            coords: Coordinates::new(lat, lng),
            accuracy,
        });
    }

    Ok(points)
}

pub async fn load_track(path: impl AsRef<Path>) -> Result<Vec<TrackPoint>, TrackError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_track(&content)
}

/// 按固定间隔把轨迹点推送到设备，`looped` 为真时循环回放
pub async fn replay(device: Arc<FeedDevice>, points: Vec<TrackPoint>, interval: Duration, looped: bool) {
    if points.is_empty() {
        tracing::warn!("Track is empty, nothing to replay");
        return;
    }

    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    loop {
        for point in &points {
            ticker.tick().await;
            device.push_fix(point.coords.lat, point.coords.lng, point.accuracy);
        }
        if !looped {
            break;
        }
    }

    tracing::info!("Track replay finished ({} points)", points.len());
}
