use crate::{crd::ScaleTarget, errors::*};
use async_trait::async_trait;
use k8s_openapi::{
    api::apps::v1::{Deployment, StatefulSet},
    NamespaceResourceScope,
};
use kube::{
    api::{Api, PostParams},
    client::Client,
    Resource,
};
use log::info;
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt::Debug, marker::PhantomData, sync::Arc};

/// Replica count the API server assumes when a workload leaves it unset.
const DEFAULT_REPLICAS: i32 = 1;

/// Reads and writes the replica count of one kind of workload.
#[async_trait]
pub trait ScaleStrategy: Send + Sync {
    /// Set the configured replica count. Only the replica field changes.
    async fn scale(&self, target: &ScaleTarget, replicas: i32) -> Result<()>;

    /// The configured (desired) replica count.
    async fn current_replicas(&self, target: &ScaleTarget) -> Result<i32>;

    /// Replicas the workload reports as available to serve.
    async fn available_replicas(&self, target: &ScaleTarget) -> Result<i32>;
}

/// Picks the strategy for a target kind.
pub trait StrategyProvider: Send + Sync {
    fn strategy_for(&self, kind: &str) -> Result<Arc<dyn ScaleStrategy>>;
}

/// A replica-controlled workload kind.
pub trait ReplicaWorkload:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    const KIND: &'static str;

    fn desired_replicas(&self) -> i32;
    fn set_desired_replicas(&mut self, replicas: i32);
    fn available_replicas(&self) -> i32;
}

impl ReplicaWorkload for Deployment {
    const KIND: &'static str = "Deployment";

    fn desired_replicas(&self) -> i32 {
        self.spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(DEFAULT_REPLICAS)
    }

    fn set_desired_replicas(&mut self, replicas: i32) {
        self.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
    }

    fn available_replicas(&self) -> i32 {
        self.status
            .as_ref()
            .and_then(|s| s.available_replicas)
            .unwrap_or(0)
    }
}

impl ReplicaWorkload for StatefulSet {
    const KIND: &'static str = "StatefulSet";

    fn desired_replicas(&self) -> i32 {
        self.spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(DEFAULT_REPLICAS)
    }

    fn set_desired_replicas(&mut self, replicas: i32) {
        self.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
    }

    fn available_replicas(&self) -> i32 {
        self.status
            .as_ref()
            .and_then(|s| s.available_replicas)
            .unwrap_or(0)
    }
}

/// `workload` with only its replica count changed, or `None` when it already
/// has `replicas`. Metadata, including the resourceVersion that was read, is
/// left as is.
fn rescaled<K: ReplicaWorkload>(mut workload: K, replicas: i32) -> Option<K> {
    if workload.desired_replicas() == replicas {
        return None;
    }
    workload.set_desired_replicas(replicas);
    Some(workload)
}

/// [`ScaleStrategy`] for any [`ReplicaWorkload`], talking to the API server.
pub struct WorkloadStrategy<K> {
    client: Client,
    kind: PhantomData<fn() -> K>,
}

pub type DeploymentStrategy = WorkloadStrategy<Deployment>;
pub type StatefulSetStrategy = WorkloadStrategy<StatefulSet>;

impl<K: ReplicaWorkload> WorkloadStrategy<K> {
    pub fn new(client: Client) -> Self {
        WorkloadStrategy {
            client,
            kind: PhantomData,
        }
    }

    fn api(&self, target: &ScaleTarget) -> Api<K> {
        Api::namespaced(self.client.clone(), &target.namespace)
    }
}

#[async_trait]
impl<K: ReplicaWorkload> ScaleStrategy for WorkloadStrategy<K> {
    async fn scale(&self, target: &ScaleTarget, replicas: i32) -> Result<()> {
        let api = self.api(target);
        // read-modify-write: replace carries the resourceVersion we read, so a
        // concurrent change surfaces as a conflict instead of being overwritten.
        let workload = api.get(&target.name).await?;
        let from = workload.desired_replicas();
        if let Some(updated) = rescaled(workload, replicas) {
            api.replace(&target.name, &PostParams::default(), &updated)
                .await?;
            info!("scaled {} from {} to {} replicas", target, from, replicas);
        }
        Ok(())
    }

    async fn current_replicas(&self, target: &ScaleTarget) -> Result<i32> {
        Ok(self.api(target).get(&target.name).await?.desired_replicas())
    }

    async fn available_replicas(&self, target: &ScaleTarget) -> Result<i32> {
        Ok(self.api(target).get(&target.name).await?.available_replicas())
    }
}

/// The strategies backed by the cluster, one per supported kind.
pub struct KubeStrategies {
    deployment: Arc<dyn ScaleStrategy>,
    stateful_set: Arc<dyn ScaleStrategy>,
}

impl KubeStrategies {
    pub fn new(client: Client) -> Self {
        KubeStrategies {
            deployment: Arc::new(DeploymentStrategy::new(client.clone())),
            stateful_set: Arc::new(StatefulSetStrategy::new(client)),
        }
    }
}

impl StrategyProvider for KubeStrategies {
    fn strategy_for(&self, kind: &str) -> Result<Arc<dyn ScaleStrategy>> {
        if kind == <Deployment as ReplicaWorkload>::KIND {
            Ok(self.deployment.clone())
        } else if kind == <StatefulSet as ReplicaWorkload>::KIND {
            Ok(self.stateful_set.clone())
        } else {
            Err(ErrorKind::UnsupportedTargetKind(kind.to_string()).into())
        }
    }
}
