//! State handlers for the AlertScale lifecycle.
//!
//! One handler per state, plus a default handler for objects whose status is
//! empty or unrecognized. A handler only ever moves the object to one of the
//! states its `can_transition` allows.

mod approvaling;
mod pending;
mod restore;
mod scaling;

pub use approvaling::{ApprovalingHandler, ApprovedHandler, RejectedHandler};
pub use pending::{DefaultHandler, PendingHandler};
pub use restore::{ArchivedHandler, CompletedHandler, FailedHandler};
pub use scaling::{ScaledHandler, ScalingHandler};

use crate::{context::ScaleContext, errors::*, phase::ScalePhase, phase::Requeue};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::info;
use std::collections::HashMap;

#[async_trait]
pub trait StateHandler: Send + Sync {
    /// Name used in logs and transition errors.
    fn name(&self) -> &'static str;

    /// Recompute and persist the next status from live state. Safe to call
    /// repeatedly with the same observed state.
    async fn handle(&self, ctx: &mut ScaleContext<'_>) -> Result<Requeue>;

    fn can_transition(&self, to: ScalePhase) -> bool;
}

/// Maps each lifecycle state to its handler.
pub struct StateHandlerRegistry {
    handlers: HashMap<ScalePhase, Box<dyn StateHandler>>,
    default: Box<dyn StateHandler>,
}

impl StateHandlerRegistry {
    pub fn new(default: impl StateHandler + 'static) -> Self {
        StateHandlerRegistry {
            handlers: HashMap::new(),
            default: Box::new(default),
        }
    }

    pub fn register(mut self, phase: ScalePhase, handler: impl StateHandler + 'static) -> Self {
        self.handlers.insert(phase, Box::new(handler));
        self
    }

    /// A handler for every state.
    pub fn standard() -> Self {
        StateHandlerRegistry::new(DefaultHandler)
            .register(ScalePhase::Pending, PendingHandler)
            .register(ScalePhase::Approvaling, ApprovalingHandler)
            .register(ScalePhase::Approved, ApprovedHandler)
            .register(ScalePhase::Rejected, RejectedHandler)
            .register(ScalePhase::Scaling, ScalingHandler)
            .register(ScalePhase::Scaled, ScaledHandler)
            .register(ScalePhase::Completed, CompletedHandler)
            .register(ScalePhase::Failed, FailedHandler)
            .register(ScalePhase::Archived, ArchivedHandler)
    }

    /// The handler for `phase`, falling back to the default handler.
    pub fn lookup(&self, phase: Option<ScalePhase>) -> &dyn StateHandler {
        phase
            .and_then(|p| self.handlers.get(&p))
            .unwrap_or(&self.default)
            .as_ref()
    }
}

impl Default for StateHandlerRegistry {
    fn default() -> Self {
        StateHandlerRegistry::standard()
    }
}

/// Move to `to` and persist status, refusing moves `from` does not allow.
/// Any other status fields the caller changed are written with it.
pub(crate) async fn transition(
    from: &dyn StateHandler,
    ctx: &mut ScaleContext<'_>,
    to: ScalePhase,
) -> Result<()> {
    if !from.can_transition(to) {
        bail!(ErrorKind::InvalidTransition(
            from.name().to_string(),
            to.to_string()
        ));
    }
    ctx.status_mut().status = to.to_string();
    ctx.save_status().await?;
    info!("{}: {} -> {}", ctx.alert_scale.key(), from.name(), to);
    Ok(())
}

/// `begin + by`. A duration that runs past the last representable time is
/// reported as invalid, quoting the `raw` spec value it was parsed from.
pub(crate) fn deadline(begin: DateTime<Utc>, by: Duration, raw: &str) -> Result<DateTime<Utc>> {
    begin
        .checked_add_signed(by)
        .ok_or_else(|| ErrorKind::InvalidDuration(raw.to_string()).into())
}

/// Whether `until` has been reached. Exactly at the deadline counts.
pub(crate) fn expired(until: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= until
}

/// Poll after `poll`, but no later than `until`.
pub(crate) fn poll_until(
    poll: std::time::Duration,
    until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Requeue {
    match Requeue::at_deadline(until - now) {
        Requeue::After(remaining) if remaining < poll => Requeue::After(remaining),
        Requeue::Immediate => Requeue::Immediate,
        _ => Requeue::After(poll),
    }
}
