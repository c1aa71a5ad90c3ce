//! The AWS EBS CSI driver

use std::collections::BTreeMap;

use k8s_openapi::api::storage::v1::StorageClass;
use tracing::info;

use super::{DriverInfo, DynamicPvTestDriver, FileSize, TestDriver};
use crate::storage_class::{build_storage_class, ReclaimPolicy};

/// Provisioner name the EBS CSI driver registers under.
pub const DRIVER_NAME: &str = "ebs.csi.aws.com";

/// Filesystem types exercised by the suite ("" leaves the choice to the driver).
pub const VALID_FS_TYPES: [&str; 4] = ["", "ext2", "ext3", "ext4"];

/// EBS volume types exercised by the suite.
pub const VALID_VOLUME_TYPES: [&str; 4] = ["gp2", "io1", "sc1", "st1"];

/// Test driver for the EBS CSI plugin.
///
/// The plugin is expected to be running in the cluster already.
#[derive(Clone, Debug)]
pub struct EbsCsiDriver {
    driver_info: DriverInfo,
}

impl EbsCsiDriver {
    /// Describe the EBS CSI plugin
    pub fn new() -> Self {
        Self {
            driver_info: DriverInfo {
                name: DRIVER_NAME.to_string(),
                feature_tag: String::new(),
                max_file_size: FileSize::Medium,
                supported_fs_types: VALID_FS_TYPES.iter().map(|s| s.to_string()).collect(),
                is_persistent: true,
                is_fs_group_supported: false,
                is_block_supported: true,
            },
        }
    }

    /// Storage class name for `namespace`: `<namespace>-<provisioner>-sc`.
    pub fn storage_class_name(&self, namespace: &str) -> String {
        format!("{}-{}-sc", namespace, self.driver_info.name)
    }
}

impl Default for EbsCsiDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDriver for EbsCsiDriver {
    fn driver_info(&self) -> &DriverInfo {
        &self.driver_info
    }

    fn create_driver(&self) {
        info!(driver = %self.driver_info.name, "create_driver is a no-op, expecting the driver to be installed");
    }

    fn cleanup_driver(&self) {
        info!(driver = %self.driver_info.name, "cleanup_driver is a no-op");
    }
}

impl DynamicPvTestDriver for EbsCsiDriver {
    fn dynamic_provision_storage_class(
        &self,
        parameters: BTreeMap<String, String>,
        reclaim_policy: ReclaimPolicy,
        namespace: &str,
    ) -> StorageClass {
        // The provisioner is the plugin name verbatim; the driver is not
        // deployed under a per-run unique name.
        let provisioner = &self.driver_info.name;
        build_storage_class(
            &self.storage_class_name(namespace),
            provisioner,
            parameters,
            reclaim_policy,
        )
    }
}
