use crate::{
    config::{ControllerConfig, PayloadFormat, WebhookConfig},
    crd::{AlertScale, NotificationType},
    errors::*,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
#[cfg(test)]
use mockall::automock;
use serde_json::json;
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

/// Lifecycle points that produce a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifyEvent {
    Pending,
    Approved,
    Rejected,
    Scaled,
    Completed,
    Archived,
    Failed,
}

impl fmt::Display for NotifyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotifyEvent::Pending => "pending",
            NotifyEvent::Approved => "approved",
            NotifyEvent::Rejected => "rejected",
            NotifyEvent::Scaled => "scaled",
            NotifyEvent::Completed => "completed",
            NotifyEvent::Archived => "archived",
            NotifyEvent::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_notify(&self, message: &str) -> Result<()>;
}

/// Posts messages to an HTTP webhook.
pub struct WebhookNotifier {
    http: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    pub fn new(http: reqwest::Client, config: WebhookConfig) -> Self {
        WebhookNotifier { http, config }
    }

    fn payload(&self, message: &str) -> serde_json::Value {
        match self.config.format {
            PayloadFormat::Wxwork => {
                let mut mobiles = Vec::new();
                if self.config.at_all {
                    mobiles.push("@all".to_string());
                }
                json!({
                    "msgtype": "text",
                    "text": {
                        "content": message,
                        "mentioned_list": self.config.mentioned_list,
                        "mentioned_mobile_list": mobiles,
                    }
                })
            }
            PayloadFormat::Json => {
                let subject = message.lines().next().unwrap_or_default();
                json!({ "subject": subject, "body": message })
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_notify(&self, message: &str) -> Result<()> {
        self.http
            .post(&self.config.url)
            .json(&self.payload(message))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Routes notifications to the notifier configured for the AlertScale's type.
#[derive(Clone, Default)]
pub struct Dispatcher {
    notifiers: HashMap<NotificationType, Arc<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new(notifiers: HashMap<NotificationType, Arc<dyn Notifier>>) -> Self {
        Dispatcher { notifiers }
    }

    pub fn from_config(config: &ControllerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.notify_timeout_seconds))
            .build()?;
        let notifiers = config
            .notifiers
            .iter()
            .map(|(kind, webhook)| {
                let notifier: Arc<dyn Notifier> =
                    Arc::new(WebhookNotifier::new(http.clone(), webhook.clone()));
                (*kind, notifier)
            })
            .collect();
        Ok(Dispatcher { notifiers })
    }

    /// Send a notification for `event`. Failures are logged and swallowed.
    pub async fn notify(&self, scale: &AlertScale, event: NotifyEvent, now: DateTime<Utc>) {
        let kind = match scale.spec.scale_notification_type {
            Some(kind) => kind,
            None => {
                debug!("{}: no notification type, skipping {}", scale.key(), event);
                return;
            }
        };
        let notifier = match self.notifiers.get(&kind) {
            Some(n) => n,
            None => {
                debug!("{}: no {:?} notifier configured, skipping {}", scale.key(), kind, event);
                return;
            }
        };

        let message = render_message(scale, event, now);
        match notifier.send_notify(&message).await {
            Ok(()) => info!("{}: sent {} notification", scale.key(), event),
            Err(e) => warn!("{}: failed to send {} notification: {}", scale.key(), event, e),
        }
    }
}

/// Default message layout.
pub fn render_message(scale: &AlertScale, event: NotifyEvent, now: DateTime<Utc>) -> String {
    let spec = &scale.spec;
    let status = scale.scale_status();
    let fmt_time = |t: DateTime<Utc>| t.format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let begin = status
        .scale_begin_time
        .as_ref()
        .map(|t| fmt_time(t.0))
        .unwrap_or_else(|| "-".to_string());
    let target = spec.scale_target.resolve(&scale.metadata.namespace.clone().unwrap_or_default());

    format!(
        "AlertScale {key}: {event}\n\
         \n\
         Target: {kind}/{name}\n\
         Namespace: {ns}\n\
         Reason: {reason}\n\
         Status: {status}\n\
         Origin replicas: {origin}\n\
         Scaled replicas: {scaled}\n\
         Threshold: {threshold}\n\
         Duration: {duration}\n\
         Auto approval: {auto}\n\
         Started: {begin}\n\
         Now: {now}",
        key = scale.key(),
        event = event,
        kind = target.kind,
        name = target.name,
        ns = target.namespace,
        reason = spec.scale_reason,
        status = status.status,
        origin = status.origin_replicas,
        scaled = status.scaled_replicas,
        threshold = spec.scale_threshold,
        duration = spec.scale_duration,
        auto = spec.scale_auto_approval,
        begin = begin,
        now = fmt_time(now),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::alert_scale;

    fn wx(config: WebhookConfig) -> WebhookNotifier {
        WebhookNotifier::new(reqwest::Client::new(), config)
    }

    #[test]
    fn wxwork_payload_mentions_users() {
        let notifier = wx(WebhookConfig {
            url: "http://localhost/hook".into(),
            format: PayloadFormat::Wxwork,
            mentioned_list: vec!["bob".into()],
            at_all: true,
        });
        let payload = notifier.payload("hello");
        assert_eq!(payload["msgtype"], "text");
        assert_eq!(payload["text"]["content"], "hello");
        assert_eq!(payload["text"]["mentioned_list"][0], "bob");
        assert_eq!(payload["text"]["mentioned_mobile_list"][0], "@all");
    }

    #[test]
    fn json_payload_uses_first_line_as_subject() {
        let notifier = wx(WebhookConfig {
            url: "http://localhost/hook".into(),
            format: PayloadFormat::Json,
            mentioned_list: vec![],
            at_all: false,
        });
        let payload = notifier.payload("AlertScale ns/a: scaled\n\nTarget: x");
        assert_eq!(payload["subject"], "AlertScale ns/a: scaled");
        assert_eq!(payload["body"], "AlertScale ns/a: scaled\n\nTarget: x");
    }

    #[test]
    fn message_names_target_and_event() {
        let mut scale = alert_scale("prod", "spike");
        scale.spec.scale_reason = "High CPU Usage".into();
        scale.scale_status_mut().origin_replicas = 2;
        let msg = render_message(&scale, NotifyEvent::Approved, Utc::now());
        assert!(msg.starts_with("AlertScale prod/spike: approved"));
        assert!(msg.contains("Target: Deployment/web"));
        assert!(msg.contains("Namespace: prod"));
        assert!(msg.contains("Reason: High CPU Usage"));
        assert!(msg.contains("Origin replicas: 2"));
    }

    #[tokio::test]
    async fn dispatch_uses_notifier_for_type() {
        let mut mock = MockNotifier::new();
        mock.expect_send_notify()
            .withf(|m: &str| m.contains(": scaled"))
            .times(1)
            .returning(|_| Ok(()));
        let mut notifiers: HashMap<NotificationType, Arc<dyn Notifier>> = HashMap::new();
        notifiers.insert(NotificationType::Email, Arc::new(mock));
        let dispatcher = Dispatcher::new(notifiers);

        let mut scale = alert_scale("ns", "a");
        scale.spec.scale_notification_type = Some(NotificationType::Email);
        dispatcher.notify(&scale, NotifyEvent::Scaled, Utc::now()).await;
    }

    #[tokio::test]
    async fn dispatch_skips_unconfigured_types() {
        let mut mock = MockNotifier::new();
        mock.expect_send_notify().times(0);
        let mut notifiers: HashMap<NotificationType, Arc<dyn Notifier>> = HashMap::new();
        notifiers.insert(NotificationType::Email, Arc::new(mock));
        let dispatcher = Dispatcher::new(notifiers);

        let mut scale = alert_scale("ns", "a");
        dispatcher.notify(&scale, NotifyEvent::Pending, Utc::now()).await;

        scale.spec.scale_notification_type = Some(NotificationType::WxWorkRobot);
        dispatcher.notify(&scale, NotifyEvent::Pending, Utc::now()).await;
    }

    #[tokio::test]
    async fn dispatch_swallows_send_failures() {
        let mut mock = MockNotifier::new();
        mock.expect_send_notify()
            .times(1)
            .returning(|_| Err("webhook returned 500".into()));
        let mut notifiers: HashMap<NotificationType, Arc<dyn Notifier>> = HashMap::new();
        notifiers.insert(NotificationType::WxWorkRobot, Arc::new(mock));
        let dispatcher = Dispatcher::new(notifiers);

        let mut scale = alert_scale("ns", "a");
        scale.spec.scale_notification_type = Some(NotificationType::WxWorkRobot);
        dispatcher.notify(&scale, NotifyEvent::Failed, Utc::now()).await;
    }
}
