//! Per-scenario namespace lifecycle
//!
//! Each scenario gets a freshly generated namespace so scenarios never see
//! each other's claims or pods, which is what makes running them
//! concurrently safe.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{info, warn};

use crate::client::StorageClient;
use crate::retry::{retry_with_backoff_if, RetryConfig};
use crate::{Error, Result};

/// Label carrying the framework base name on every scenario namespace.
pub const FRAMEWORK_LABEL: &str = "e2e-framework";

/// Settings a driver receives for one scenario.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeTestConfig {
    /// Namespace the scenario runs in
    pub namespace: String,
    /// Prefix for generated object names
    pub prefix: String,
}

/// Creates and removes scenario namespaces.
#[derive(Clone)]
pub struct Framework {
    base_name: String,
    client: Arc<dyn StorageClient>,
    keep_namespaces: bool,
}

impl Framework {
    /// Framework for scenarios of the `base_name` suite
    pub fn new(base_name: impl Into<String>, client: Arc<dyn StorageClient>, keep_namespaces: bool) -> Self {
        Self {
            base_name: base_name.into(),
            client,
            keep_namespaces,
        }
    }

    /// Client shared with the scenarios
    pub fn client(&self) -> Arc<dyn StorageClient> {
        self.client.clone()
    }

    /// Namespace manifest with a generated name.
    pub fn namespace_template(&self) -> Namespace {
        let mut labels = BTreeMap::new();
        labels.insert(FRAMEWORK_LABEL.to_string(), self.base_name.clone());
        Namespace {
            metadata: ObjectMeta {
                generate_name: Some(format!("e2e-tests-{}-", self.base_name)),
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create a fresh namespace and return its server-assigned name.
    ///
    /// Retries transient failures; 4xx answers are returned as-is.
    pub async fn create_namespace(&self) -> Result<String> {
        let template = self.namespace_template();
        let created = retry_with_backoff_if(
            &RetryConfig::with_max_attempts(10),
            "create_namespace",
            || self.client.create_namespace(&template),
            is_transient,
        )
        .await?;

        let name = created
            .metadata
            .name
            .ok_or_else(|| Error::internal("created namespace has no name"))?;
        info!(namespace = %name, "created scenario namespace");
        Ok(name)
    }

    /// Delete a scenario namespace unless namespaces are kept.
    ///
    /// Failures are logged; a leftover namespace never fails a scenario.
    pub async fn delete_namespace(&self, namespace: &str) {
        if self.keep_namespaces {
            info!(namespace, "keeping scenario namespace");
            return;
        }
        match self.client.delete_namespace(namespace).await {
            Ok(()) => info!(namespace, "deleting scenario namespace"),
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(namespace, error = %e, "failed to delete scenario namespace"),
        }
    }

    /// Driver settings for a scenario in `namespace`
    pub fn volume_test_config(&self, namespace: &str) -> VolumeTestConfig {
        VolumeTestConfig {
            namespace: namespace.to_string(),
            prefix: self.base_name.clone(),
        }
    }
}

fn is_transient(err: &Error) -> bool {
    match err {
        Error::Kube {
            source: kube::Error::Api(ae),
        } => !(400..500).contains(&ae.code),
        Error::NotFound { .. } | Error::Config(_) => false,
        _ => true,
    }
}
