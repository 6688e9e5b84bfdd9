use super::{deadline, expired, poll_until, transition, StateHandler};
use crate::{
    approval::{self, Decision},
    context::ScaleContext,
    duration::parse_duration,
    errors::*,
    notify::NotifyEvent,
    phase::{Requeue, ScalePhase},
};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use log::{debug, error, info};

/// Waits for an approval decision, auto-approval, or the timeout, in that order.
pub struct ApprovalingHandler;

impl ApprovalingHandler {
    async fn apply_decision(
        &self,
        ctx: &mut ScaleContext<'_>,
        decision: Decision,
    ) -> Result<Requeue> {
        let annotations = ctx.alert_scale.annotations();
        info!(
            "{}: applying {} decision from {}",
            ctx.alert_scale.key(),
            decision.as_str(),
            annotations
                .get(approval::OPERATOR)
                .map(String::as_str)
                .unwrap_or("unknown operator")
        );
        transition(self, ctx, decision.outcome()).await?;
        // Status has moved on; consume the decision so it is never applied again.
        approval::mark_completed(&mut ctx.alert_scale);
        ctx.save_metadata().await?;
        Ok(Requeue::Immediate)
    }
}

#[async_trait]
impl StateHandler for ApprovalingHandler {
    fn name(&self) -> &'static str {
        "Approvaling"
    }

    async fn handle(&self, ctx: &mut ScaleContext<'_>) -> Result<Requeue> {
        match approval::pending_decision(ctx.alert_scale.annotations()) {
            Some(Ok(decision)) => return self.apply_decision(ctx, decision).await,
            Some(Err(e)) => error!("{}: ignoring approval annotation: {}", ctx.alert_scale.key(), e),
            None => {}
        }

        if ctx.alert_scale.spec.scale_auto_approval {
            transition(self, ctx, ScalePhase::Approved).await?;
            approval::stamp_auto_approval(&mut ctx.alert_scale, ctx.now);
            ctx.save_metadata().await?;
            return Ok(Requeue::Immediate);
        }

        let raw_timeout = ctx.alert_scale.spec.scale_timeout.clone();
        let timeout = parse_duration(&raw_timeout)?;
        let begin = match ctx.status().scale_begin_time {
            Some(t) => t.0,
            None => {
                // no window recorded yet; it starts now
                ctx.status_mut().scale_begin_time = Some(Time(ctx.now));
                ctx.save_status().await?;
                ctx.now
            }
        };

        let until = deadline(begin, timeout, &raw_timeout)?;
        if expired(until, ctx.now) {
            info!(
                "{}: no approval within {}, rejecting",
                ctx.alert_scale.key(),
                timeout
            );
            transition(self, ctx, ScalePhase::Rejected).await?;
            return Ok(Requeue::Immediate);
        }

        debug!("{}: waiting for approval", ctx.alert_scale.key());
        Ok(poll_until(ctx.config.approval_poll(), until, ctx.now))
    }

    fn can_transition(&self, to: ScalePhase) -> bool {
        matches!(to, ScalePhase::Approved | ScalePhase::Rejected)
    }
}

/// Starts the scaling window.
pub struct ApprovedHandler;

#[async_trait]
impl StateHandler for ApprovedHandler {
    fn name(&self) -> &'static str {
        "Approved"
    }

    async fn handle(&self, ctx: &mut ScaleContext<'_>) -> Result<Requeue> {
        // the scaling timeout is measured from here, not from creation
        ctx.status_mut().scale_begin_time = Some(Time(ctx.now));
        transition(self, ctx, ScalePhase::Scaling).await?;
        ctx.notify(NotifyEvent::Approved).await;
        Ok(Requeue::Immediate)
    }

    fn can_transition(&self, to: ScalePhase) -> bool {
        to == ScalePhase::Scaling
    }
}

/// A rejected request never scaled; it goes straight to Completed, which
/// confirms the target is at its original size.
pub struct RejectedHandler;

#[async_trait]
impl StateHandler for RejectedHandler {
    fn name(&self) -> &'static str {
        "Rejected"
    }

    async fn handle(&self, ctx: &mut ScaleContext<'_>) -> Result<Requeue> {
        transition(self, ctx, ScalePhase::Completed).await?;
        ctx.notify(NotifyEvent::Rejected).await;
        Ok(Requeue::Immediate)
    }

    fn can_transition(&self, to: ScalePhase) -> bool {
        to == ScalePhase::Completed
    }
}
