use serde::{Deserialize, Serialize};

/// 未设置昵称时发布的默认显示名
pub const ANONYMOUS_DISPLAY_NAME: &str = "Anonymous";

/// 身份提供方登录后给出的用户资料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            photo_url: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }

    /// 空昵称同样视为未设置
    pub fn display_name_or_default(&self) -> String {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => ANONYMOUS_DISPLAY_NAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(UserProfile::new("u1").display_name_or_default(), "Anonymous");
        assert_eq!(
            UserProfile::new("u1")
                .with_display_name("  ")
                .display_name_or_default(),
            "Anonymous"
        );
        assert_eq!(
            UserProfile::new("u1")
                .with_display_name("Lan")
                .display_name_or_default(),
            "Lan"
        );
    }
}
