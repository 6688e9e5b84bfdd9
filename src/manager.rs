use crate::{
    api::{AlertScaleApi, KubeAlertScales},
    config::ControllerConfig,
    context::ScaleContext,
    crd::{AlertScale, GROUP},
    errors::*,
    notify::Dispatcher,
    phase::Requeue,
    phases::StateHandlerRegistry,
    strategy::{KubeStrategies, StrategyProvider},
};
use chrono::{DateTime, Utc};
use futures::{future::BoxFuture, FutureExt, StreamExt};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{api::Api, client::Client, ResourceExt};
use kube_runtime::{
    controller::{Action, Controller},
    watcher,
};
use log::{debug, error, info, warn};
use rand::Rng;
use std::{sync::Arc, time::Duration};

// Context for our reconciler
pub struct Data {
    pub(crate) api: Arc<dyn AlertScaleApi>,
    pub(crate) strategies: Arc<dyn StrategyProvider>,
    pub(crate) registry: StateHandlerRegistry,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) config: ControllerConfig,
}

impl Data {
    pub fn new(client: Client, config: ControllerConfig) -> Result<Self> {
        Ok(Data {
            api: Arc::new(KubeAlertScales::new(client.clone())),
            strategies: Arc::new(KubeStrategies::new(client)),
            registry: StateHandlerRegistry::standard(),
            dispatcher: Dispatcher::from_config(&config)?,
            config,
        })
    }
}

/// One pass of the state machine for `namespace/name`, read fresh from the API.
///
/// A deleted object and configuration errors end the pass without a requeue.
/// Everything else the handlers return is propagated for a retry.
pub(crate) async fn reconcile_scale(
    data: &Data,
    namespace: &str,
    name: &str,
    now: DateTime<Utc>,
) -> Result<Requeue> {
    let alert_scale = match data.api.get(namespace, name).await? {
        Some(scale) => scale,
        None => {
            debug!("{}/{} is gone", namespace, name);
            return Ok(Requeue::Never);
        }
    };
    let key = alert_scale.key();

    let target = alert_scale.spec.scale_target.resolve(namespace);
    let strategy = match data.strategies.strategy_for(&target.kind) {
        Ok(strategy) => strategy,
        Err(e) => {
            error!("{}: {}", key, e);
            return Ok(Requeue::Never);
        }
    };

    let handler = data.registry.lookup(alert_scale.phase());
    debug!("{}: handling as {}", key, handler.name());
    let mut ctx = ScaleContext {
        alert_scale,
        target,
        api: data.api.as_ref(),
        strategy,
        notifier: &data.dispatcher,
        config: &data.config,
        now,
    };

    match handler.handle(&mut ctx).await {
        Ok(requeue) => Ok(requeue),
        Err(e) if e.is_configuration() => {
            error!("{}: {}", key, e);
            Ok(Requeue::Never)
        }
        Err(e) if e.is_not_found() => {
            if data.api.get(namespace, name).await?.is_none() {
                debug!("{} was deleted mid-reconcile", key);
                return Ok(Requeue::Never);
            }
            Err(e)
        }
        Err(e) => Err(e),
    }
}

async fn reconcile(scale: Arc<AlertScale>, data: Arc<Data>) -> Result<Action> {
    let ns = scale
        .namespace()
        .ok_or(ErrorKind::MissingIdentity("namespace"))?;
    let requeue = reconcile_scale(&data, &ns, &scale.name_any(), Utc::now()).await?;
    debug!("{}: next {:?}", scale.key(), requeue);
    Ok(requeue.into())
}

fn error_policy(scale: Arc<AlertScale>, error: &Error, data: Arc<Data>) -> Action {
    let config = &data.config;
    let jitter = rand::thread_rng().gen_range(0..=config.error_jitter_seconds);
    let delay = Duration::from_secs(config.error_backoff_seconds + jitter);
    warn!(
        "reconcile of {} failed, retrying in {:?}: {}",
        scale.key(),
        delay,
        error
    );
    Action::requeue(delay)
}

pub struct Manager {}

/// Manager that owns a Controller for AlertScale
impl Manager {
    /// Lifecycle initialization interface for app
    ///
    /// This returns a `Manager` that drives a `Controller` + a future to be awaited
    /// It is up to `main` to wait for the controller stream. `namespace` limits
    /// the watch to one namespace; `None` watches all of them.
    pub async fn new(
        client: Client,
        config: ControllerConfig,
        namespace: Option<String>,
    ) -> Result<(Self, BoxFuture<'static, ()>)> {
        let crd_name = format!("alertscales.{}", GROUP);
        let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
        crds.get(&crd_name)
            .await
            .chain_err(|| format!("install the {} crd first (`alertscaler crd`)", crd_name))?;

        let scales: Api<AlertScale> = match &namespace {
            Some(ns) => Api::namespaced(client.clone(), ns),
            None => Api::all(client.clone()),
        };
        let data = Arc::new(Data::new(client, config)?);
        info!(
            "watching alertscales in {}",
            namespace.as_deref().unwrap_or("all namespaces")
        );

        let drainer = Controller::new(scales, watcher::Config::default())
            .shutdown_on_signal()
            .run(reconcile, error_policy, data)
            .for_each(|res| {
                match res {
                    Ok((obj, action)) => debug!("reconciled {}: {:?}", obj, action),
                    Err(e) => warn!("reconcile failed: {}", e),
                }
                futures::future::ready(())
            })
            .boxed();
        // what we do with the controller stream from .run() ^^ does not matter
        // but we do need to consume it, hence general printing + return future

        Ok((Self {}, drainer))
    }
}
