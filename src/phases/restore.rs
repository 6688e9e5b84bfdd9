use super::{transition, StateHandler};
use crate::{
    context::ScaleContext,
    errors::*,
    notify::NotifyEvent,
    phase::{Requeue, ScalePhase},
};
use async_trait::async_trait;
use log::{debug, info, warn};

/// Puts the target back to its original size, then archives.
pub struct CompletedHandler;

#[async_trait]
impl StateHandler for CompletedHandler {
    fn name(&self) -> &'static str {
        "Completed"
    }

    async fn handle(&self, ctx: &mut ScaleContext<'_>) -> Result<Requeue> {
        let origin = ctx.status().origin_replicas;
        let current = ctx.current_replicas().await?;

        if current == origin {
            transition(self, ctx, ScalePhase::Archived).await?;
            ctx.notify(NotifyEvent::Archived).await;
            return Ok(Requeue::Never);
        }

        info!(
            "{}: restoring {} from {} to {} replicas",
            ctx.alert_scale.key(),
            ctx.target,
            current,
            origin
        );
        ctx.scale_to(origin).await?;
        Ok(Requeue::After(ctx.config.restore_poll()))
    }

    fn can_transition(&self, to: ScalePhase) -> bool {
        to == ScalePhase::Archived
    }
}

/// Terminal. Makes a best effort to restore the original size and stops.
pub struct FailedHandler;

#[async_trait]
impl StateHandler for FailedHandler {
    fn name(&self) -> &'static str {
        "Failed"
    }

    async fn handle(&self, ctx: &mut ScaleContext<'_>) -> Result<Requeue> {
        let origin = ctx.status().origin_replicas;
        let current = ctx.current_replicas().await?;
        if current != origin {
            warn!(
                "{}: scaling failed, restoring {} to {} replicas",
                ctx.alert_scale.key(),
                ctx.target,
                origin
            );
            ctx.scale_to(origin).await?;
        }
        Ok(Requeue::Never)
    }

    fn can_transition(&self, _to: ScalePhase) -> bool {
        false
    }
}

pub struct ArchivedHandler;

#[async_trait]
impl StateHandler for ArchivedHandler {
    fn name(&self) -> &'static str {
        "Archived"
    }

    async fn handle(&self, ctx: &mut ScaleContext<'_>) -> Result<Requeue> {
        debug!("{}: archived, nothing to do", ctx.alert_scale.key());
        Ok(Requeue::Never)
    }

    fn can_transition(&self, _to: ScalePhase) -> bool {
        false
    }
}
