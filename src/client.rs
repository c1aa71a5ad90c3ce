//! Cluster access for the suite
//!
//! Every cluster call the workflow makes goes through [`StorageClient`], so
//! the workflow can be tested against a mock while production runs use the
//! kube-backed [`KubeStorageClient`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, PersistentVolume, PersistentVolumeClaim, Pod};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Api, DeleteParams, LogParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::retry::{retry_with_backoff, RetryConfig};
use crate::{Error, Result};

/// Cluster operations used by the provisioning workflow.
///
/// Implementations report a missing resource as [`Error::NotFound`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Create a cluster-scoped storage class
    async fn create_storage_class(&self, storage_class: &StorageClass) -> Result<StorageClass>;

    /// Delete a storage class by name
    async fn delete_storage_class(&self, name: &str) -> Result<()>;

    /// Create a claim in `namespace`
    async fn create_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim>;

    /// Fetch a claim
    async fn get_claim(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim>;

    /// Delete a claim
    async fn delete_claim(&self, namespace: &str, name: &str) -> Result<()>;

    /// Fetch a persistent volume
    async fn get_volume(&self, name: &str) -> Result<PersistentVolume>;

    /// Create a pod in `namespace`
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod>;

    /// Fetch a pod
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// Delete a pod
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    /// Full log output of a pod's only container
    async fn pod_logs(&self, namespace: &str, name: &str) -> Result<String>;

    /// Create a namespace
    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace>;

    /// Delete a namespace without waiting for it to terminate
    async fn delete_namespace(&self, name: &str) -> Result<()>;
}

/// [`StorageClient`] backed by a kube-rs client.
#[derive(Clone)]
pub struct KubeStorageClient {
    client: Client,
}

impl KubeStorageClient {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn claims(&self, namespace: &str) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Turn a 404 into [`Error::NotFound`] and pass everything else through.
fn map_api_error(kind: &str, name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => Error::not_found(kind, name),
        other => other.into(),
    }
}

#[async_trait]
impl StorageClient for KubeStorageClient {
    async fn create_storage_class(&self, storage_class: &StorageClass) -> Result<StorageClass> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        Ok(api.create(&PostParams::default(), storage_class).await?)
    }

    async fn delete_storage_class(&self, name: &str) -> Result<()> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_api_error("StorageClass", name, e))?;
        Ok(())
    }

    async fn create_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim> {
        Ok(self
            .claims(namespace)
            .create(&PostParams::default(), claim)
            .await?)
    }

    async fn get_claim(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim> {
        self.claims(namespace)
            .get(name)
            .await
            .map_err(|e| map_api_error("PersistentVolumeClaim", &format!("{namespace}/{name}"), e))
    }

    async fn delete_claim(&self, namespace: &str, name: &str) -> Result<()> {
        self.claims(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_api_error("PersistentVolumeClaim", &format!("{namespace}/{name}"), e))?;
        Ok(())
    }

    async fn get_volume(&self, name: &str) -> Result<PersistentVolume> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        api.get(name)
            .await
            .map_err(|e| map_api_error("PersistentVolume", name, e))
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod> {
        Ok(self
            .pods(namespace)
            .create(&PostParams::default(), pod)
            .await?)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.pods(namespace)
            .get(name)
            .await
            .map_err(|e| map_api_error("Pod", &format!("{namespace}/{name}"), e))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_api_error("Pod", &format!("{namespace}/{name}"), e))?;
        Ok(())
    }

    async fn pod_logs(&self, namespace: &str, name: &str) -> Result<String> {
        self.pods(namespace)
            .logs(name, &LogParams::default())
            .await
            .map_err(|e| map_api_error("Pod", &format!("{namespace}/{name}"), e))
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.create(&PostParams::default(), namespace).await?)
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::background())
            .await
            .map_err(|e| map_api_error("Namespace", name, e))?;
        Ok(())
    }
}

/// Build a kube client, from `kubeconfig` when given, else from the
/// environment (`KUBECONFIG`, `~/.kube/config`, or in-cluster).
///
/// Retries transient connection failures.
pub async fn connect(kubeconfig: Option<&Path>) -> Result<Client> {
    retry_with_backoff(
        &RetryConfig::with_max_attempts(10),
        "create_kube_client",
        || async move { connect_once(kubeconfig).await },
    )
    .await
}

async fn connect_once(kubeconfig: Option<&Path>) -> Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            debug!(path = %path.display(), "loading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| Error::config(format!("failed to read kubeconfig: {e}")))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::config(format!("failed to load kubeconfig: {e}")))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::config(format!("failed to infer kube config: {e}")))?,
    };

    config.connect_timeout = Some(Duration::from_secs(5));
    config.read_timeout = Some(Duration::from_secs(30));

    Ok(Client::try_from(config)?)
}
