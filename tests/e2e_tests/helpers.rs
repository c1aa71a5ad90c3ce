//! Shared setup for live-cluster tests

use std::sync::{Arc, Once};

use ebs_e2e::client::{connect, KubeStorageClient, StorageClient};
use ebs_e2e::framework::Framework;

static INIT: Once = Once::new();

/// Install the crypto provider and a test log subscriber once per process
fn init() {
    INIT.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let _ = tracing_subscriber::fmt()
            .with_env_filter("info,ebs_e2e=debug")
            .with_test_writer()
            .try_init();
    });
}

/// Connect to the cluster named by `KUBECONFIG` (or the default config)
pub async fn kube_client() -> kube::Client {
    init();
    let kubeconfig = std::env::var_os("KUBECONFIG").map(std::path::PathBuf::from);
    connect(kubeconfig.as_deref())
        .await
        .expect("failed to connect to cluster")
}

/// Cluster access through the suite's client seam
pub async fn cluster_client() -> Arc<dyn StorageClient> {
    Arc::new(KubeStorageClient::new(kube_client().await))
}

/// Framework that creates `e2e-tests-<base>-*` namespaces
pub fn framework(base_name: &str, client: Arc<dyn StorageClient>) -> Framework {
    Framework::new(base_name, client, false)
}
