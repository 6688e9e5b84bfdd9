//! Annotation-based approval handshake.
//!
//! An approver records a decision by writing annotations on the AlertScale
//! with `processing=pending`. The controller picks the decision up while the
//! object is Approvaling, moves the status, then flips `processing` to
//! `completed` so the same annotations are never applied twice. Approvers
//! never write status.

use crate::{
    api::AlertScaleApi,
    crd::AlertScale,
    errors::*,
    phase::ScalePhase,
};
use chrono::{DateTime, SecondsFormat, Utc};
use kube::ResourceExt;
use log::info;
use std::collections::BTreeMap;
use std::str::FromStr;

pub const DECISION: &str = "ops.alertscale.io/approval-decision";
pub const TIMESTAMP: &str = "ops.alertscale.io/approval-timestamp";
pub const OPERATOR: &str = "ops.alertscale.io/approval-operator";
pub const REASON: &str = "ops.alertscale.io/approval-reason";
pub const COMMENT: &str = "ops.alertscale.io/approval-comment";
pub const PROCESSING: &str = "ops.alertscale.io/approval-processing";

pub const PROCESSING_PENDING: &str = "pending";
pub const PROCESSING_COMPLETED: &str = "completed";

/// Operator recorded for auto-approvals.
pub const SYSTEM_OPERATOR: &str = "system";
pub const AUTO_APPROVAL_REASON: &str = "auto-approval";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }

    /// The status the controller moves to when applying this decision.
    pub fn outcome(&self) -> ScalePhase {
        match self {
            Decision::Approve => ScalePhase::Approved,
            Decision::Reject => ScalePhase::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "approve" => Ok(Decision::Approve),
            "reject" => Ok(Decision::Reject),
            other => Err(ErrorKind::UnknownDecision(other.to_string()).into()),
        }
    }
}

/// What an approver submits alongside the decision.
#[derive(Clone, Debug, Default)]
pub struct ApprovalRequest {
    pub approver: String,
    pub reason: String,
    pub comment: Option<String>,
}

impl ApprovalRequest {
    fn validate(&self) -> Result<()> {
        if self.approver.trim().is_empty() {
            bail!(ErrorKind::MissingApprovalField("approver"));
        }
        if self.reason.trim().is_empty() {
            bail!(ErrorKind::MissingApprovalField("reason"));
        }
        Ok(())
    }
}

/// A decision waiting to be applied, if there is one.
///
/// `None` when there is no decision annotation or it was already processed.
/// An unparseable decision value comes back as an error.
pub fn pending_decision(annotations: &BTreeMap<String, String>) -> Option<Result<Decision>> {
    let decision = annotations.get(DECISION)?;
    if annotations.get(PROCESSING).map(String::as_str) != Some(PROCESSING_PENDING) {
        return None;
    }
    Some(decision.parse())
}

/// Flip `processing` to completed. The caller persists the object.
pub fn mark_completed(scale: &mut AlertScale) {
    scale
        .annotations_mut()
        .insert(PROCESSING.to_string(), PROCESSING_COMPLETED.to_string());
}

/// Stamp an already-applied auto-approval for the audit trail.
pub fn stamp_auto_approval(scale: &mut AlertScale, now: DateTime<Utc>) {
    let annotations = scale.annotations_mut();
    annotations.insert(DECISION.to_string(), Decision::Approve.as_str().to_string());
    annotations.insert(TIMESTAMP.to_string(), rfc3339(now));
    annotations.insert(OPERATOR.to_string(), SYSTEM_OPERATOR.to_string());
    annotations.insert(REASON.to_string(), AUTO_APPROVAL_REASON.to_string());
    annotations.insert(PROCESSING.to_string(), PROCESSING_COMPLETED.to_string());
}

/// Record an approver's decision on an AlertScale that is waiting for one.
///
/// Only annotations are written, in a single replace; the controller performs
/// the status transition on its next reconcile.
pub async fn record_decision(
    api: &dyn AlertScaleApi,
    namespace: &str,
    name: &str,
    decision: Decision,
    request: &ApprovalRequest,
    now: DateTime<Utc>,
) -> Result<AlertScale> {
    request.validate()?;

    let mut scale = api
        .get(namespace, name)
        .await?
        .ok_or_else(|| format!("alertscale {}/{} not found", namespace, name))?;

    if scale.phase() != Some(ScalePhase::Approvaling) {
        bail!(ErrorKind::NotAwaitingApproval(
            scale.key(),
            scale.scale_status().status
        ));
    }

    let annotations = scale.annotations_mut();
    annotations.insert(DECISION.to_string(), decision.as_str().to_string());
    annotations.insert(TIMESTAMP.to_string(), rfc3339(now));
    annotations.insert(OPERATOR.to_string(), request.approver.clone());
    annotations.insert(REASON.to_string(), request.reason.clone());
    match request.comment.as_deref().filter(|c| !c.is_empty()) {
        Some(comment) => annotations.insert(COMMENT.to_string(), comment.to_string()),
        None => annotations.remove(COMMENT),
    };
    annotations.insert(PROCESSING.to_string(), PROCESSING_PENDING.to_string());

    let recorded = api.replace(&scale).await?;
    info!(
        "recorded {} decision for {} by {}",
        decision.as_str(),
        recorded.key(),
        request.approver
    );
    Ok(recorded)
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}
