//! Forwarding of dashboard actions to the homelab.
//!
//! Two targets: the homelab agent's webhook (reboot, restart, DNS flush and
//! whatever else the agent understands) and Home Assistant's toggle
//! service. Both are fire-and-forget: the request is validated locally,
//! then sent from a spawned task whose outcome only reaches the logs.

use reqwest::{Client, StatusCode};
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{HomeAssistantConfig, WebhookConfig};
use crate::metrics::LabMetrics;
use crate::sources::{endpoint, non_empty};

/// Longest accepted action identifier
pub const MAX_ACTION_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("invalid action identifier '{0}'")]
    InvalidAction(String),

    #[error("invalid entity id '{0}'")]
    InvalidEntity(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {0}")]
    Status(StatusCode),
}

/// Action ids end up in a URL path: `[A-Za-z0-9_-]{1,64}`
pub fn validate_action(action: &str) -> Result<(), ActionError> {
    let ok = !action.is_empty()
        && action.len() <= MAX_ACTION_LEN
        && action
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(ActionError::InvalidAction(action.to_string()))
    }
}

/// Home Assistant entity ids look like `light.server_rack`
pub fn validate_entity(entity_id: &str) -> Result<(), ActionError> {
    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    };
    match entity_id.split_once('.') {
        Some((domain, object)) if valid_part(domain) && valid_part(object) => Ok(()),
        _ => Err(ActionError::InvalidEntity(entity_id.to_string())),
    }
}

#[derive(Debug, Clone)]
struct WebhookTarget {
    base_url: String,
    secret: Option<String>,
}

#[derive(Debug, Clone)]
struct HomeAssistantTarget {
    base_url: String,
    token: String,
}

/// Sends actions to the homelab; cheap to clone
#[derive(Clone)]
pub struct ActionDispatcher {
    client: Client,
    webhook: Option<WebhookTarget>,
    home_assistant: Option<HomeAssistantTarget>,
    metrics: Option<LabMetrics>,
}

impl ActionDispatcher {
    pub fn new(client: Client, webhook: &WebhookConfig, home_assistant: &HomeAssistantConfig) -> Self {
        let webhook = non_empty(&webhook.url).map(|url| WebhookTarget {
            base_url: url.to_string(),
            secret: non_empty(&webhook.secret).map(str::to_string),
        });
        let home_assistant = match (non_empty(&home_assistant.url), non_empty(&home_assistant.token)) {
            (Some(url), Some(token)) => Some(HomeAssistantTarget {
                base_url: url.to_string(),
                token: token.to_string(),
            }),
            _ => None,
        };

        Self {
            client,
            webhook,
            home_assistant,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: LabMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn webhook_configured(&self) -> bool {
        self.webhook.is_some()
    }

    pub fn home_assistant_configured(&self) -> bool {
        self.home_assistant.is_some()
    }

    /// `POST {tunnel}/webhook/{action}` and wait for the answer
    pub async fn send_webhook(&self, action: &str) -> Result<StatusCode, ActionError> {
        validate_action(action)?;
        let target = self
            .webhook
            .as_ref()
            .ok_or(ActionError::NotConfigured("webhook"))?;

        let mut request = self
            .client
            .post(endpoint(&target.base_url, &format!("webhook/{}", action)));
        if let Some(secret) = &target.secret {
            request = request.bearer_auth(secret);
        }

        let status = request.send().await?.status();
        if status.is_success() {
            Ok(status)
        } else {
            Err(ActionError::Status(status))
        }
    }

    /// Ask Home Assistant to toggle an entity and wait for the answer
    pub async fn send_toggle(&self, entity_id: &str) -> Result<StatusCode, ActionError> {
        validate_entity(entity_id)?;
        let target = self
            .home_assistant
            .as_ref()
            .ok_or(ActionError::NotConfigured("home assistant"))?;

        let status = self
            .client
            .post(endpoint(&target.base_url, "api/services/homeassistant/toggle"))
            .bearer_auth(&target.token)
            .json(&json!({ "entity_id": entity_id }))
            .send()
            .await?
            .status();
        if status.is_success() {
            Ok(status)
        } else {
            Err(ActionError::Status(status))
        }
    }

    /// Validate, then forward in the background.
    ///
    /// Returns `None` when no webhook is configured; the action is dropped
    /// but the caller still succeeds.
    pub fn dispatch_webhook(&self, action: &str) -> Result<Option<JoinHandle<()>>, ActionError> {
        validate_action(action)?;
        if !self.webhook_configured() {
            debug!("No webhook configured, dropping action {}", action);
            return Ok(None);
        }

        let dispatcher = self.clone();
        let action = action.to_string();
        Ok(Some(tokio::spawn(async move {
            let result = dispatcher.send_webhook(&action).await;
            dispatcher.report("webhook", &action, result);
        })))
    }

    /// Validate, then toggle in the background
    pub fn dispatch_toggle(&self, entity_id: &str) -> Result<Option<JoinHandle<()>>, ActionError> {
        validate_entity(entity_id)?;
        if !self.home_assistant_configured() {
            debug!("Home Assistant not configured, dropping toggle of {}", entity_id);
            return Ok(None);
        }

        let dispatcher = self.clone();
        let entity_id = entity_id.to_string();
        Ok(Some(tokio::spawn(async move {
            let result = dispatcher.send_toggle(&entity_id).await;
            dispatcher.report("ha_toggle", &entity_id, result);
        })))
    }

    fn report(&self, kind: &str, subject: &str, result: Result<StatusCode, ActionError>) {
        let label = match &result {
            Ok(status) => {
                info!("{} {} delivered ({})", kind, subject, status);
                "ok"
            }
            Err(e) => {
                warn!("{} {} swallowed: {}", kind, subject, e);
                "error"
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_action(kind, label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn unconfigured() -> ActionDispatcher {
        let client = crate::sources::http_client(Duration::from_secs(1)).unwrap();
        ActionDispatcher::new(client, &WebhookConfig::default(), &HomeAssistantConfig::default())
    }

    #[test]
    fn test_validate_action() {
        assert!(validate_action("reboot").is_ok());
        assert!(validate_action("flush-dns_cache2").is_ok());
        assert!(validate_action("").is_err());
        assert!(validate_action("../admin").is_err());
        assert!(validate_action("a b").is_err());
        assert!(validate_action(&"x".repeat(MAX_ACTION_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_entity() {
        assert!(validate_entity("light.server_rack").is_ok());
        assert!(validate_entity("switch.nas_2").is_ok());
        assert!(validate_entity("light").is_err());
        assert!(validate_entity(".rack").is_err());
        assert!(validate_entity("Light.Rack").is_err());
        assert!(validate_entity("light.rack/../x").is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_dispatch_is_silent_success() {
        let dispatcher = unconfigured();
        assert!(dispatcher.dispatch_webhook("reboot").unwrap().is_none());
        assert!(dispatcher.dispatch_toggle("light.rack").unwrap().is_none());
        assert!(dispatcher.dispatch_webhook("not valid").is_err());
    }

    #[tokio::test]
    async fn test_send_without_target_reports_not_configured() {
        let err = unconfigured().send_webhook("reboot").await.unwrap_err();
        assert!(matches!(err, ActionError::NotConfigured("webhook")));
    }
}
