use crate::{
    api::AlertScaleApi,
    config::ControllerConfig,
    crd::{AlertScale, ScaleStatus, ScaleTarget},
    errors::*,
    notify::{Dispatcher, NotifyEvent},
    strategy::ScaleStrategy,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Everything a state handler needs for one reconcile of one AlertScale.
///
/// Built fresh per reconcile and dropped at the end of it.
pub struct ScaleContext<'a> {
    pub alert_scale: AlertScale,
    /// `spec.scaleTarget` with its namespace resolved.
    pub target: ScaleTarget,
    pub api: &'a dyn AlertScaleApi,
    pub strategy: Arc<dyn ScaleStrategy>,
    pub notifier: &'a Dispatcher,
    pub config: &'a ControllerConfig,
    /// Wall clock for this reconcile. Every time comparison uses it.
    pub now: DateTime<Utc>,
}

impl<'a> ScaleContext<'a> {
    pub fn status(&self) -> ScaleStatus {
        self.alert_scale.scale_status()
    }

    pub fn status_mut(&mut self) -> &mut ScaleStatus {
        self.alert_scale.scale_status_mut()
    }

    /// Persist the status subresource and adopt the stored copy, so a
    /// following write in the same reconcile carries the new resourceVersion.
    pub async fn save_status(&mut self) -> Result<()> {
        self.alert_scale = self.api.replace_status(&self.alert_scale).await?;
        Ok(())
    }

    /// Persist metadata (annotations) and adopt the stored copy.
    pub async fn save_metadata(&mut self) -> Result<()> {
        self.alert_scale = self.api.replace(&self.alert_scale).await?;
        Ok(())
    }

    pub async fn notify(&self, event: NotifyEvent) {
        self.notifier.notify(&self.alert_scale, event, self.now).await
    }

    pub async fn current_replicas(&self) -> Result<i32> {
        self.strategy.current_replicas(&self.target).await
    }

    pub async fn available_replicas(&self) -> Result<i32> {
        self.strategy.available_replicas(&self.target).await
    }

    pub async fn scale_to(&self, replicas: i32) -> Result<()> {
        self.strategy.scale(&self.target, replicas).await
    }
}
