use crate::phase::ScalePhase;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const GROUP: &str = "ops.alertscale.io";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ops.alertscale.io",
    version = "v1beta1",
    kind = "AlertScale",
    status = "AlertScaleStatus",
    shortname = "as",
    shortname = "ascale",
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.scaleTarget.name"}"#,
    printcolumn = r#"{"name":"AutoApproval","type":"boolean","jsonPath":".spec.scaleAutoApproval"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.scaleStatus.status"}"#,
    printcolumn = r#"{"name":"Origin-Replicas","type":"integer","jsonPath":".status.scaleStatus.originReplicas"}"#,
    printcolumn = r#"{"name":"Scaled-Replicas","type":"integer","jsonPath":".status.scaleStatus.scaledReplicas"}"#,
    printcolumn = r#"{"name":"Threshold","type":"integer","jsonPath":".spec.scaleThreshold"}"#,
    printcolumn = r#"{"name":"Duration","type":"string","jsonPath":".spec.scaleDuration"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".spec.scaleReason"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AlertScaleSpec {
    /// Free text explaining why the scale was requested, e.g. "High CPU Usage".
    #[serde(default)]
    pub scale_reason: String,

    /// How long to hold the scaled size, `<n><s|m|h|d|w>`. Empty means 5m.
    #[serde(default)]
    pub scale_duration: String,

    /// Replica count to scale the target to.
    #[serde(default)]
    pub scale_threshold: i32,

    /// Longest time allowed in a waiting phase (approval or scaling). Empty means 5m.
    #[serde(default)]
    pub scale_timeout: String,

    /// Skip the approval wait.
    #[serde(default)]
    pub scale_auto_approval: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_notification_type: Option<NotificationType>,

    /// Name of a message template. Messages currently use the default layout.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scale_notify_msg_template: String,

    pub scale_target: ScaleTarget,
}

/// The workload whose replica count is being changed.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScaleTarget {
    pub name: String,

    /// Defaults to the AlertScale's own namespace.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Deployment or StatefulSet.
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
}

impl ScaleTarget {
    /// Fill in the namespace from the owning AlertScale when the target omits it.
    pub fn resolve(&self, owner_namespace: &str) -> ScaleTarget {
        let mut target = self.clone();
        if target.namespace.is_empty() {
            target.namespace = owner_namespace.to_string();
        }
        target
    }
}

impl fmt::Display for ScaleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum NotificationType {
    Email,
    #[serde(rename = "WXWorkRobot")]
    WxWorkRobot,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlertScaleStatus {
    #[serde(default)]
    pub scale_status: ScaleStatus,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScaleStatus {
    /// status is the lifecycle state. Empty or unknown values are reinitialized to Pending.
    #[serde(default)]
    pub status: String,

    /// scaleBeginTime is when the current waiting phase started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_begin_time: Option<Time>,

    /// scaleEndTime is when the scaled size stops being held.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_end_time: Option<Time>,

    /// originReplicas is the target's replica count before scaling.
    #[serde(default)]
    pub origin_replicas: i32,

    /// scaledReplicas is the target's available replica count, sampled while scaling.
    #[serde(default)]
    pub scaled_replicas: i32,
}

impl AlertScale {
    /// Parsed lifecycle state; `None` when uninitialized or unrecognized.
    pub fn phase(&self) -> Option<ScalePhase> {
        self.status
            .as_ref()
            .and_then(|s| s.scale_status.status.parse().ok())
    }

    pub fn scale_status(&self) -> ScaleStatus {
        self.status
            .as_ref()
            .map(|s| s.scale_status.clone())
            .unwrap_or_default()
    }

    pub fn scale_status_mut(&mut self) -> &mut ScaleStatus {
        &mut self.status.get_or_insert_with(Default::default).scale_status
    }

    /// `namespace/name`, for log lines.
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }
}
