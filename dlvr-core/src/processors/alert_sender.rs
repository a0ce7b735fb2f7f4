//! AlertSender processor.
//!
//! The AlertSender is responsible for:
//! - Receiving `AlertRequest` from the queue
//! - Posting each request to the configured push gateway
//! - Following endpoint changes when the config is reloaded
//!
//! Alerts are best-effort. A failed request is logged and never retried;
//! the notification itself is still stored and reaches the user the next
//! time they open the app.

use dlvr_sdk::objects::Priority;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{AlertConfig, ConfigStore};
use crate::events::{AlertRequest, AlertRequestReceiver};

#[derive(Debug, Error)]
pub enum AlertError {
    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The gateway answered with a non-success status
    #[error("alert delivery failed with status {status}: {body}")]
    DeliveryFailed { status: u16, body: String },
}

/// JSON body posted to the push gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload<'a> {
    pub user_id: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub tag: &'a str,
    pub urgency: Priority,
    /// Urgent alerts stay on screen until dismissed.
    pub require_interaction: bool,
}

impl<'a> From<&'a AlertRequest> for AlertPayload<'a> {
    fn from(request: &'a AlertRequest) -> Self {
        Self {
            user_id: &request.user_id,
            title: &request.title,
            body: &request.body,
            tag: &request.tag,
            urgency: request.urgency,
            require_interaction: request.urgency == Priority::Urgent,
        }
    }
}

/// AlertSender delivers alert requests to the platform push gateway.
pub struct AlertSender {
    alert_rx: AlertRequestReceiver,
    shutdown_rx: watch::Receiver<bool>,
    config: ConfigStore<AlertConfig>,
    http_client: reqwest::Client,
}

impl AlertSender {
    /// Create a new AlertSender.
    ///
    /// # Arguments
    ///
    /// * `alert_rx` - Receiver for AlertRequest events
    /// * `shutdown_rx` - Receiver for shutdown signal
    /// * `config` - Gateway endpoint and timeout, reloadable
    pub fn new(
        alert_rx: AlertRequestReceiver,
        shutdown_rx: watch::Receiver<bool>,
        config: ConfigStore<AlertConfig>,
    ) -> Self {
        Self {
            alert_rx,
            shutdown_rx,
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// Run the AlertSender.
    pub async fn run(mut self) {
        info!("AlertSender started");
        let mut config_watcher = self.config.subscribe();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("AlertSender received shutdown signal");
                        break;
                    }
                }

                Ok(config) = config_watcher.changed() => {
                    match &config.endpoint {
                        Some(endpoint) => info!(endpoint = %endpoint, "Alert endpoint updated"),
                        None => info!("Alert endpoint cleared, alerts disabled"),
                    }
                }

                Some(request) = self.alert_rx.recv() => {
                    debug!(
                        notification_id = %request.notification_id,
                        user_id = %request.user_id,
                        "Received AlertRequest"
                    );

                    if let Err(e) = self.send_alert(&request).await {
                        error!(
                            notification_id = %request.notification_id,
                            error = %e,
                            "Failed to deliver alert"
                        );
                    }
                }

                else => {
                    info!("AlertRequest channel closed");
                    break;
                }
            }
        }

        info!("AlertSender shutdown complete");
    }

    async fn send_alert(&self, request: &AlertRequest) -> Result<(), AlertError> {
        let config = self.config.read();
        let Some(endpoint) = config.endpoint.as_ref() else {
            debug!(notification_id = %request.notification_id, "No alert endpoint configured");
            return Ok(());
        };

        let response = self
            .http_client
            .post(endpoint.as_str())
            .timeout(config.request_timeout)
            .json(&AlertPayload::from(request))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(notification_id = %request.notification_id, "Alert delivered");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(notification_id = %request.notification_id, status = %status, "Alert rejected");
            Err(AlertError::DeliveryFailed {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlvr_sdk::objects::NotificationId;

    fn request(urgency: Priority) -> AlertRequest {
        AlertRequest {
            user_id: "u-1".into(),
            notification_id: NotificationId::derive("u-1", "system:x"),
            title: "Delivered".to_string(),
            body: "Enjoy".to_string(),
            tag: "order-1".to_string(),
            urgency,
        }
    }

    #[test]
    fn test_payload_shape() {
        let high = request(Priority::High);
        let value = serde_json::to_value(AlertPayload::from(&high)).unwrap();
        assert_eq!(value["userId"], "u-1");
        assert_eq!(value["tag"], "order-1");
        assert_eq!(value["urgency"], "high");
        assert_eq!(value["requireInteraction"], false);

        let urgent = request(Priority::Urgent);
        let value = serde_json::to_value(AlertPayload::from(&urgent)).unwrap();
        assert_eq!(value["requireInteraction"], true);
    }

    #[tokio::test]
    async fn test_missing_endpoint_drops_alert_quietly() {
        let (_tx, rx) = crate::events::alert_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let sender = AlertSender::new(rx, shutdown_rx, ConfigStore::new(AlertConfig::default()));
        assert!(sender.send_alert(&request(Priority::High)).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let (_tx, rx) = crate::events::alert_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sender = AlertSender::new(rx, shutdown_rx, ConfigStore::new(AlertConfig::default()));
        let task = tokio::spawn(sender.run());
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
