use super::{transition, StateHandler};
use crate::{
    context::ScaleContext,
    crd::ScaleStatus,
    errors::*,
    notify::NotifyEvent,
    phase::{Requeue, ScalePhase},
};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use log::info;

/// Initializes objects with no (or an unrecognized) status.
pub struct DefaultHandler;

#[async_trait]
impl StateHandler for DefaultHandler {
    fn name(&self) -> &'static str {
        "Default"
    }

    async fn handle(&self, ctx: &mut ScaleContext<'_>) -> Result<Requeue> {
        info!(
            "{}: initializing status (was '{}')",
            ctx.alert_scale.key(),
            ctx.status().status
        );
        *ctx.status_mut() = ScaleStatus {
            scale_begin_time: Some(Time(ctx.now)),
            ..ScaleStatus::default()
        };
        transition(self, ctx, ScalePhase::Pending).await?;
        Ok(Requeue::Immediate)
    }

    fn can_transition(&self, to: ScalePhase) -> bool {
        to == ScalePhase::Pending
    }
}

/// Records the target's replica count and opens the approval window.
pub struct PendingHandler;

#[async_trait]
impl StateHandler for PendingHandler {
    fn name(&self) -> &'static str {
        "Pending"
    }

    async fn handle(&self, ctx: &mut ScaleContext<'_>) -> Result<Requeue> {
        let origin = ctx.current_replicas().await?;
        let status = ctx.status_mut();
        status.origin_replicas = origin;
        status.scaled_replicas = origin;
        transition(self, ctx, ScalePhase::Approvaling).await?;
        info!(
            "{}: {} has {} replicas before scaling",
            ctx.alert_scale.key(),
            ctx.target,
            origin
        );

        ctx.notify(NotifyEvent::Pending).await;
        Ok(Requeue::Immediate)
    }

    fn can_transition(&self, to: ScalePhase) -> bool {
        to == ScalePhase::Approvaling
    }
}
