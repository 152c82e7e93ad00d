use serde::Serialize;

const TITLE: &str = "Tienda Online";
const DEFAULT_BODY: &str = "Hay novedades en la tienda";
const ICON: &str = "/images/icon-192x192.png";
const BADGE: &str = "/images/badge-72x72.png";
const VIBRATE: [u32; 3] = [100, 50, 100];

pub const ACTION_EXPLORE: &str = "explore";
pub const ACTION_CLOSE: &str = "close";

/// URL a notification click opens.
pub const EXPLORE_URL: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: &'static str,
    pub title: &'static str,
    pub icon: &'static str,
}

/// A rendered push notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Text payloads become the body; an empty push gets a stock message.
    pub fn from_push(payload: Option<&str>) -> Self {
        let body = payload
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .unwrap_or(DEFAULT_BODY);
        Self {
            title: TITLE.to_string(),
            body: body.to_string(),
            icon: ICON.to_string(),
            badge: BADGE.to_string(),
            vibrate: VIBRATE.to_vec(),
            actions: vec![
                NotificationAction {
                    action: ACTION_EXPLORE,
                    title: "Ver productos",
                    icon: "/images/checkmark.png",
                },
                NotificationAction {
                    action: ACTION_CLOSE,
                    title: "Cerrar",
                    icon: "/images/xmark.png",
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationClick {
    Explore,
    Close,
    /// Click on the notification itself rather than an action button.
    Body,
    Unknown,
}

impl NotificationClick {
    pub fn from_action(action: Option<&str>) -> Self {
        match action {
            None | Some("") => NotificationClick::Body,
            Some(ACTION_EXPLORE) => NotificationClick::Explore,
            Some(ACTION_CLOSE) => NotificationClick::Close,
            Some(_) => NotificationClick::Unknown,
        }
    }

    pub fn opens_window(self) -> bool {
        matches!(self, NotificationClick::Explore | NotificationClick::Body)
    }
}
