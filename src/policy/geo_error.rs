use crate::error::GeoError;

/// 定位错误的展示方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoErrorView {
    pub kind: GeoError,
    pub message: String,
    /// 是否显示重试按钮，重试会重新启动定位
    pub retry_available: bool,
}

/// 所有定位错误都阻断地图显示；不自动重试，避免权限被拒时持续耗电
pub fn error_view(error: GeoError) -> GeoErrorView {
    let (message, retry_available) = match error {
        GeoError::PermissionDenied => ("Please allow access to your location", true),
        GeoError::PositionUnavailable => ("Location information is unavailable", true),
        GeoError::Timeout => ("The location request timed out", true),
        GeoError::Unsupported => ("Your device does not support geolocation", false),
    };

    GeoErrorView {
        kind: error,
        message: message.to_string(),
        retry_available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        for error in [
            GeoError::PermissionDenied,
            GeoError::PositionUnavailable,
            GeoError::Timeout,
        ] {
            let view = error_view(error);
            assert!(view.retry_available);
            assert_eq!(view.kind, error);
        }
        assert!(!error_view(GeoError::Unsupported).retry_available);
    }

    #[test]
    fn test_permission_message() {
        assert_eq!(
            error_view(GeoError::PermissionDenied).message,
            "Please allow access to your location"
        );
    }
}
