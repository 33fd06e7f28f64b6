//! Notification interaction handling.

use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

use crate::config::WorkerConfig;
use crate::host::{ClientMatchOptions, ClientsApi, NotificationHost, NotificationId};
use crate::relay::ClientLogRelay;

/// The user clicked a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationClickEvent {
    pub notification: NotificationId,
    /// Data attached when the notification was shown.
    pub data: JsonValue,
    /// Action button pressed, if any.
    pub action: Option<String>,
}

impl NotificationClickEvent {
    pub fn new(notification: NotificationId) -> Self {
        Self {
            notification,
            data: JsonValue::Null,
            action: None,
        }
    }
}

/// The user dismissed a notification without clicking it.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationCloseEvent {
    pub notification: NotificationId,
}

/// What a click led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// An open app window was focused.
    Focused(String),
    /// A new window was opened.
    Opened(String),
    /// Neither worked.
    Failed,
}

/// Routes notification clicks to an app window.
#[derive(Clone)]
pub struct ClickHandler {
    config: Arc<WorkerConfig>,
    clients: Arc<dyn ClientsApi>,
    notifications: Arc<dyn NotificationHost>,
    relay: ClientLogRelay,
}

impl ClickHandler {
    pub fn new(
        config: Arc<WorkerConfig>,
        clients: Arc<dyn ClientsApi>,
        notifications: Arc<dyn NotificationHost>,
        relay: ClientLogRelay,
    ) -> Self {
        Self {
            config,
            clients,
            notifications,
            relay,
        }
    }

    /// Dismiss the notification, then focus the first same-origin window or
    /// open a new one at the click route.
    pub async fn handle_click(&self, event: &NotificationClickEvent) -> ClickOutcome {
        self.relay
            .info(
                "Notification clicked",
                Some(json!({ "action": event.action, "data": event.data })),
            )
            .await;

        if let Err(e) = self.notifications.close_notification(event.notification).await {
            self.relay
                .warning(
                    "Failed to close notification",
                    Some(json!({ "error": e.to_string() })),
                )
                .await;
        }

        let windows = match self.clients.match_all(ClientMatchOptions::all_windows()).await {
            Ok(windows) => windows,
            Err(e) => {
                self.relay
                    .error(
                        "Failed to enumerate windows",
                        Some(json!({ "error": e.to_string() })),
                    )
                    .await;
                return ClickOutcome::Failed;
            }
        };

        if let Some(window) = windows.iter().find(|w| self.config.is_same_origin(&w.url)) {
            return match self.clients.focus(&window.id).await {
                Ok(client) => {
                    self.relay
                        .success(
                            "Focused existing window",
                            Some(json!({ "url": client.url.as_str() })),
                        )
                        .await;
                    ClickOutcome::Focused(client.id)
                }
                Err(e) => {
                    self.relay
                        .error(
                            "Failed to focus window",
                            Some(json!({ "clientId": window.id, "error": e.to_string() })),
                        )
                        .await;
                    ClickOutcome::Failed
                }
            };
        }

        let target = match self.config.click_target() {
            Ok(target) => target,
            Err(e) => {
                self.relay
                    .error(
                        "Invalid notification click route",
                        Some(json!({ "error": e.to_string() })),
                    )
                    .await;
                return ClickOutcome::Failed;
            }
        };

        match self.clients.open_window(&target).await {
            Ok(client) => {
                self.relay
                    .success("Opened new window", Some(json!({ "url": target.as_str() })))
                    .await;
                ClickOutcome::Opened(client.id)
            }
            Err(e) => {
                self.relay
                    .error(
                        "Failed to open window",
                        Some(json!({ "url": target.as_str(), "error": e.to_string() })),
                    )
                    .await;
                ClickOutcome::Failed
            }
        }
    }

    /// Note that a notification was dismissed.
    pub async fn handle_close(&self, event: &NotificationCloseEvent) {
        self.relay
            .info(
                "Notification dismissed",
                Some(json!({ "notification": event.notification.as_u64() })),
            )
            .await;
    }
}
