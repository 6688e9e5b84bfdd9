use super::{deadline, expired, poll_until, transition, StateHandler};
use crate::{
    context::ScaleContext,
    duration::parse_duration,
    errors::*,
    notify::NotifyEvent,
    phase::{Requeue, ScalePhase},
};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use log::{debug, info, warn};

/// Drives the target to the threshold and waits for it to become available.
pub struct ScalingHandler;

#[async_trait]
impl StateHandler for ScalingHandler {
    fn name(&self) -> &'static str {
        "Scaling"
    }

    async fn handle(&self, ctx: &mut ScaleContext<'_>) -> Result<Requeue> {
        let spec = ctx.alert_scale.spec.clone();
        let now = ctx.now;
        let before = ctx.status();
        let begin = before.scale_begin_time.as_ref().map(|t| t.0);

        // every duration is checked before the target is touched
        let timeout = parse_duration(&spec.scale_timeout)?;
        let until = deadline(begin.unwrap_or(now), timeout, &spec.scale_timeout)?;
        let hold = parse_duration(&spec.scale_duration)?;
        let hold_end = deadline(now, hold, &spec.scale_duration)?;
        let threshold = spec.scale_threshold;

        if ctx.current_replicas().await? != threshold {
            ctx.scale_to(threshold).await?;
        }
        let available = ctx.available_replicas().await?;
        ctx.status_mut().scaled_replicas = available;

        if available == threshold {
            let status = ctx.status_mut();
            status.scale_begin_time = Some(Time(now));
            status.scale_end_time = Some(Time(hold_end));
            transition(self, ctx, ScalePhase::Scaled).await?;
            ctx.notify(NotifyEvent::Scaled).await;
            return Ok(Requeue::Immediate);
        }

        if begin.is_none() {
            ctx.status_mut().scale_begin_time = Some(Time(now));
        }

        if expired(until, now) {
            warn!(
                "{}: {} has {}/{} available replicas after {}, giving up",
                ctx.alert_scale.key(),
                ctx.target,
                available,
                threshold,
                timeout
            );
            ctx.status_mut().scale_end_time = Some(Time(now));
            transition(self, ctx, ScalePhase::Failed).await?;
            ctx.notify(NotifyEvent::Failed).await;
            return Ok(Requeue::Immediate);
        }

        if ctx.status() != before {
            ctx.save_status().await?;
        }
        debug!(
            "{}: {}/{} replicas available",
            ctx.alert_scale.key(),
            available,
            threshold
        );
        Ok(poll_until(ctx.config.scaling_poll(), until, now))
    }

    fn can_transition(&self, to: ScalePhase) -> bool {
        matches!(to, ScalePhase::Scaled | ScalePhase::Failed)
    }
}

/// Holds the scaled size until the end time.
pub struct ScaledHandler;

#[async_trait]
impl StateHandler for ScaledHandler {
    fn name(&self) -> &'static str {
        "Scaled"
    }

    async fn handle(&self, ctx: &mut ScaleContext<'_>) -> Result<Requeue> {
        let status = ctx.status();
        let end = match status.scale_end_time {
            Some(t) => t.0,
            None => {
                let raw = &ctx.alert_scale.spec.scale_duration;
                let hold = parse_duration(raw)?;
                let from = status.scale_begin_time.map(|t| t.0).unwrap_or(ctx.now);
                let end = deadline(from, hold, raw)?;
                ctx.status_mut().scale_end_time = Some(Time(end));
                ctx.save_status().await?;
                end
            }
        };

        if ctx.now >= end {
            info!("{}: hold period over", ctx.alert_scale.key());
            transition(self, ctx, ScalePhase::Completed).await?;
            ctx.notify(NotifyEvent::Completed).await;
            return Ok(Requeue::Immediate);
        }

        debug!("{}: holding until {}", ctx.alert_scale.key(), end);
        Ok(Requeue::at_deadline(end - ctx.now))
    }

    fn can_transition(&self, to: ScalePhase) -> bool {
        to == ScalePhase::Completed
    }
}
