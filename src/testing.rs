//! In-memory stand-ins for the cluster, shared by the unit tests.

use crate::{
    api::AlertScaleApi,
    config::ControllerConfig,
    context::ScaleContext,
    crd::{AlertScale, AlertScaleSpec, AlertScaleStatus, NotificationType, ScaleStatus, ScaleTarget},
    errors::*,
    manager::{reconcile_scale, Data},
    notify::{Dispatcher, Notifier},
    phase::Requeue,
    phases::{StateHandler, StateHandlerRegistry},
    strategy::{ScaleStrategy, StrategyProvider},
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{error::ErrorResponse, ResourceExt};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

pub const NAMESPACE: &str = "ns";
pub const NAME: &str = "req";

/// A Deployment-targeting request: threshold 5, hold 1m, timeout 5m, manual approval.
pub fn alert_scale(namespace: &str, name: &str) -> AlertScale {
    let mut scale = AlertScale::new(
        name,
        AlertScaleSpec {
            scale_reason: "High CPU Usage".into(),
            scale_duration: "1m".into(),
            scale_threshold: 5,
            scale_timeout: "5m".into(),
            scale_auto_approval: false,
            scale_notification_type: None,
            scale_notify_msg_template: String::new(),
            scale_target: ScaleTarget {
                name: "web".into(),
                namespace: String::new(),
                kind: "Deployment".into(),
                api_version: "apps/v1".into(),
            },
        },
    );
    scale.metadata.namespace = Some(namespace.to_string());
    scale
}

/// A kube API error response, as the server would return it.
pub fn api_error(code: u16, reason: &str, message: String) -> Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message,
        reason: reason.into(),
        code,
    })
    .into()
}

type Key = (String, String);

fn key_of(scale: &AlertScale) -> Key {
    (scale.namespace().unwrap_or_default(), scale.name_any())
}

#[derive(Default)]
struct Store {
    objects: HashMap<Key, AlertScale>,
    version: u64,
    status_writes: usize,
}

impl Store {
    fn bump(&mut self, scale: &mut AlertScale) {
        self.version += 1;
        scale.metadata.resource_version = Some(self.version.to_string());
    }

    fn check(&self, scale: &AlertScale) -> Result<AlertScale> {
        let key = key_of(scale);
        let stored = self
            .objects
            .get(&key)
            .ok_or_else(|| api_error(404, "NotFound", format!("{}/{} not found", key.0, key.1)))?;
        if stored.resource_version() != scale.resource_version() {
            return Err(api_error(
                409,
                "Conflict",
                format!("{}/{} has been modified", key.0, key.1),
            ));
        }
        Ok(stored.clone())
    }
}

/// An [`AlertScaleApi`] over a map, with resourceVersion conflict checks.
#[derive(Default)]
pub struct FakeAlertScales {
    store: Mutex<Store>,
}

impl FakeAlertScales {
    pub fn insert(&self, mut scale: AlertScale) {
        let mut store = self.store.lock().unwrap();
        store.bump(&mut scale);
        store.objects.insert(key_of(&scale), scale);
    }

    pub fn stored(&self, namespace: &str, name: &str) -> AlertScale {
        let store = self.store.lock().unwrap();
        store.objects[&(namespace.to_string(), name.to_string())].clone()
    }

    /// Edit the stored object as another writer would. Not counted as a status write.
    pub fn update(&self, namespace: &str, name: &str, f: impl FnOnce(&mut AlertScale)) {
        let mut store = self.store.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let mut scale = store.objects[&key].clone();
        f(&mut scale);
        store.bump(&mut scale);
        store.objects.insert(key, scale);
    }

    pub fn delete(&self, namespace: &str, name: &str) {
        let mut store = self.store.lock().unwrap();
        store
            .objects
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Number of successful status subresource writes.
    pub fn status_writes(&self) -> usize {
        self.store.lock().unwrap().status_writes
    }
}

#[async_trait]
impl AlertScaleApi for FakeAlertScales {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<AlertScale>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn replace(&self, scale: &AlertScale) -> Result<AlertScale> {
        let mut store = self.store.lock().unwrap();
        let stored = store.check(scale)?;
        let mut next = scale.clone();
        next.status = stored.status;
        store.bump(&mut next);
        store.objects.insert(key_of(&next), next.clone());
        Ok(next)
    }

    async fn replace_status(&self, scale: &AlertScale) -> Result<AlertScale> {
        let mut store = self.store.lock().unwrap();
        let mut next = store.check(scale)?;
        next.status = scale.status.clone();
        store.bump(&mut next);
        store.status_writes += 1;
        store.objects.insert(key_of(&next), next.clone());
        Ok(next)
    }
}

struct WorkloadState {
    desired: i32,
    available: i32,
    ready_on_scale: bool,
    fail_scaling: bool,
    missing: bool,
    scale_calls: usize,
}

/// A single workload whose replicas become available as soon as they are
/// requested, unless told otherwise.
pub struct FakeWorkload {
    state: Mutex<WorkloadState>,
}

impl FakeWorkload {
    pub fn new(replicas: i32) -> Self {
        FakeWorkload {
            state: Mutex::new(WorkloadState {
                desired: replicas,
                available: replicas,
                ready_on_scale: true,
                fail_scaling: false,
                missing: false,
                scale_calls: 0,
            }),
        }
    }

    pub fn desired(&self) -> i32 {
        self.state.lock().unwrap().desired
    }

    pub fn available(&self) -> i32 {
        self.state.lock().unwrap().available
    }

    pub fn set_available(&self, replicas: i32) {
        self.state.lock().unwrap().available = replicas;
    }

    /// Scaling changes the desired count only; availability stays put.
    pub fn hold_available(&self) {
        self.state.lock().unwrap().ready_on_scale = false;
    }

    pub fn fail_scaling(&self) {
        self.state.lock().unwrap().fail_scaling = true;
    }

    /// The workload is deleted; every call answers 404.
    pub fn remove(&self) {
        self.state.lock().unwrap().missing = true;
    }

    fn ensure_exists(&self) -> Result<()> {
        if self.state.lock().unwrap().missing {
            return Err(api_error(404, "NotFound", "deployments \"web\" not found".into()));
        }
        Ok(())
    }

    pub fn scale_calls(&self) -> usize {
        self.state.lock().unwrap().scale_calls
    }
}

#[async_trait]
impl ScaleStrategy for FakeWorkload {
    async fn scale(&self, _target: &ScaleTarget, replicas: i32) -> Result<()> {
        self.ensure_exists()?;
        let mut state = self.state.lock().unwrap();
        if state.fail_scaling {
            bail!("the server rejected the scale");
        }
        state.scale_calls += 1;
        state.desired = replicas;
        if state.ready_on_scale {
            state.available = replicas;
        }
        Ok(())
    }

    async fn current_replicas(&self, _target: &ScaleTarget) -> Result<i32> {
        self.ensure_exists()?;
        Ok(self.desired())
    }

    async fn available_replicas(&self, _target: &ScaleTarget) -> Result<i32> {
        self.ensure_exists()?;
        Ok(self.available())
    }
}

/// Serves the one fake workload for the supported kinds.
pub struct FakeStrategies {
    workload: Arc<FakeWorkload>,
}

impl StrategyProvider for FakeStrategies {
    fn strategy_for(&self, kind: &str) -> Result<Arc<dyn ScaleStrategy>> {
        match kind {
            "Deployment" | "StatefulSet" => Ok(self.workload.clone() as Arc<dyn ScaleStrategy>),
            other => Err(ErrorKind::UnsupportedTargetKind(other.to_string()).into()),
        }
    }
}

/// Keeps every message it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    /// The event word of each message, in send order.
    pub fn events(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| m.lines().next())
            .filter_map(|first| first.rsplit(": ").next())
            .map(String::from)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_notify(&self, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// One AlertScale (`ns/req`) targeting one fake workload, with a movable clock.
pub struct Harness {
    pub api: Arc<FakeAlertScales>,
    pub workload: Arc<FakeWorkload>,
    pub notices: Arc<RecordingNotifier>,
    pub data: Data,
    pub now: DateTime<Utc>,
}

impl Harness {
    /// The workload starts at `replicas`, all available. The request has an
    /// empty status with a begin time of `now`.
    pub fn new(replicas: i32) -> Self {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let api = Arc::new(FakeAlertScales::default());
        let workload = Arc::new(FakeWorkload::new(replicas));
        let notices = Arc::new(RecordingNotifier::default());

        let mut scale = alert_scale(NAMESPACE, NAME);
        scale.status = Some(AlertScaleStatus {
            scale_status: ScaleStatus {
                scale_begin_time: Some(Time(now)),
                ..Default::default()
            },
        });
        api.insert(scale);

        let notifier: Arc<dyn Notifier> = notices.clone();
        let data = Data {
            api: api.clone(),
            strategies: Arc::new(FakeStrategies {
                workload: workload.clone(),
            }),
            registry: StateHandlerRegistry::standard(),
            dispatcher: Dispatcher::new(HashMap::from([(NotificationType::WxWorkRobot, notifier)])),
            config: ControllerConfig::default(),
        };

        Harness {
            api,
            workload,
            notices,
            data,
            now,
        }
    }

    pub fn stored(&self) -> AlertScale {
        self.api.stored(NAMESPACE, NAME)
    }

    pub fn update_stored(&self, f: impl FnOnce(&mut AlertScale)) {
        self.api.update(NAMESPACE, NAME, f)
    }

    pub fn set_phase(&self, phase: &str) {
        self.update_stored(|s| s.scale_status_mut().status = phase.to_string())
    }

    pub fn annotate(&self, pairs: &[(&str, &str)]) {
        self.update_stored(|s| {
            let annotations = s.annotations_mut();
            for (k, v) in pairs {
                annotations.insert(k.to_string(), v.to_string());
            }
        })
    }

    pub fn advance(&mut self, by: StdDuration) {
        self.now += chrono::Duration::from_std(by).unwrap();
    }

    /// Run one handler against the stored object, bypassing the registry.
    pub async fn run_handler(&self, handler: &dyn StateHandler) -> Result<Requeue> {
        let alert_scale = self.stored();
        let target = alert_scale.spec.scale_target.resolve(NAMESPACE);
        let strategy: Arc<dyn ScaleStrategy> = self.workload.clone();
        let mut ctx = ScaleContext {
            alert_scale,
            target,
            api: self.api.as_ref(),
            strategy,
            notifier: &self.data.dispatcher,
            config: &self.data.config,
            now: self.now,
        };
        handler.handle(&mut ctx).await
    }

    /// Run the controller's reconcile for `ns/req`.
    pub async fn reconcile(&self) -> Result<Requeue> {
        reconcile_scale(&self.data, NAMESPACE, NAME, self.now).await
    }

    /// Reconcile until the controller asks to wait, returning that request.
    pub async fn settle(&self) -> Result<Requeue> {
        for _ in 0..20 {
            match self.reconcile().await? {
                Requeue::Immediate => continue,
                other => return Ok(other),
            }
        }
        panic!("reconcile never settled: {:?}", self.stored().scale_status());
    }
}
