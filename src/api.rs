use crate::{crd::AlertScale, errors::*};
use async_trait::async_trait;
use kube::{
    api::{Api, PostParams},
    client::Client,
    ResourceExt,
};

/// Reads and writes of AlertScale objects.
///
/// Both writes send the object's resourceVersion, so a stale copy fails
/// with a conflict and the whole reconcile is retried on fresh state.
#[async_trait]
pub trait AlertScaleApi: Send + Sync {
    /// `None` when the object no longer exists.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<AlertScale>>;

    /// Write metadata and spec (annotations live here). Status is ignored.
    async fn replace(&self, scale: &AlertScale) -> Result<AlertScale>;

    /// Write the status subresource only.
    async fn replace_status(&self, scale: &AlertScale) -> Result<AlertScale>;
}

pub struct KubeAlertScales {
    client: Client,
}

impl KubeAlertScales {
    pub fn new(client: Client) -> Self {
        KubeAlertScales { client }
    }

    fn api_for(&self, scale: &AlertScale) -> Result<(Api<AlertScale>, String)> {
        let ns = scale
            .namespace()
            .ok_or(ErrorKind::MissingIdentity("namespace"))?;
        let name = scale
            .metadata
            .name
            .clone()
            .ok_or(ErrorKind::MissingIdentity("name"))?;
        Ok((Api::namespaced(self.client.clone(), &ns), name))
    }
}

#[async_trait]
impl AlertScaleApi for KubeAlertScales {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<AlertScale>> {
        let api: Api<AlertScale> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn replace(&self, scale: &AlertScale) -> Result<AlertScale> {
        let (api, name) = self.api_for(scale)?;
        Ok(api.replace(&name, &PostParams::default(), scale).await?)
    }

    async fn replace_status(&self, scale: &AlertScale) -> Result<AlertScale> {
        let (api, name) = self.api_for(scale)?;
        let data = serde_json::to_vec(scale)?;
        Ok(api
            .replace_status(&name, &PostParams::default(), data)
            .await?)
    }
}
