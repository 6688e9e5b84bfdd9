use crate::{crd::NotificationType, errors::*};
use serde::Deserialize;
use std::{collections::HashMap, path::Path, time::Duration};

/// Controller settings, read from a YAML file.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    /// How often Approvaling checks for a decision or timeout.
    pub approval_poll_seconds: u64,
    /// How often Scaling samples replica convergence.
    pub scaling_poll_seconds: u64,
    /// How often Completed checks replicas draining back.
    pub restore_poll_seconds: u64,
    pub error_backoff_seconds: u64,
    /// Upper bound of the random delay added to `error_backoff_seconds`.
    pub error_jitter_seconds: u64,
    pub notify_timeout_seconds: u64,
    pub notifiers: HashMap<NotificationType, WebhookConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            approval_poll_seconds: 10,
            scaling_poll_seconds: 10,
            restore_poll_seconds: 5,
            error_backoff_seconds: 60,
            error_jitter_seconds: 10,
            notify_timeout_seconds: 5,
            notifiers: HashMap::new(),
        }
    }
}

impl ControllerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .chain_err(|| format!("reading config {}", path.display()))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn approval_poll(&self) -> Duration {
        Duration::from_secs(self.approval_poll_seconds)
    }

    pub fn scaling_poll(&self) -> Duration {
        Duration::from_secs(self.scaling_poll_seconds)
    }

    pub fn restore_poll(&self) -> Duration {
        Duration::from_secs(self.restore_poll_seconds)
    }
}

/// Where and how a notification type is delivered.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub format: PayloadFormat,
    /// WXWork user ids to mention.
    #[serde(default)]
    pub mentioned_list: Vec<String>,
    #[serde(default)]
    pub at_all: bool,
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// `{"msgtype":"text","text":{...}}` as the WXWork group robot expects.
    #[default]
    Wxwork,
    /// `{"subject": ..., "body": ...}` for a generic relay (e.g. a mail gateway).
    Json,
}
