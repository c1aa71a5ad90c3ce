//! Test driver abstraction
//!
//! A test driver describes what a storage plugin under test can do, so the
//! suite only generates scenarios the plugin claims to support. The plugin
//! itself is deployed out of band; a driver here never installs anything.
//!
//! Two traits mirror the upstream multi-driver storage framework:
//! [`TestDriver`] for the capability description and lifecycle hooks, and
//! [`DynamicPvTestDriver`] for drivers that provision volumes on demand.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::storage::v1::StorageClass;

use crate::storage_class::ReclaimPolicy;

pub mod ebs;
pub mod parameters;

pub use ebs::{EbsCsiDriver, DRIVER_NAME, VALID_FS_TYPES, VALID_VOLUME_TYPES};
pub use parameters::{iops_per_gb_for_volume_type, size_for_volume_type};

/// Largest file size class a driver is expected to handle in data tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileSize {
    /// Up to a few KiB
    Small,
    /// Up to a few MiB
    Medium,
    /// Up to a few GiB
    Large,
}

/// Whether the volume is exposed as a filesystem or a raw block device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VolumeMode {
    /// Mounted filesystem
    #[default]
    Filesystem,
    /// Raw block device
    Block,
}

/// The shape of a test a driver may be asked to run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestPattern {
    /// Display name of the pattern
    pub name: String,
    /// Filesystem type ("" means the driver default)
    pub fs_type: String,
    /// Filesystem or block
    pub volume_mode: VolumeMode,
}

/// Static capability description of a storage plugin.
///
/// Built once at suite bootstrap and only read afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverInfo {
    /// Plugin name, also used as the provisioner identifier
    pub name: String,
    /// Optional feature label used to group scenarios
    pub feature_tag: String,
    /// Largest file size class the plugin handles
    pub max_file_size: FileSize,
    /// Filesystem types the plugin can format ("" is the plugin default)
    pub supported_fs_types: BTreeSet<String>,
    /// Volumes outlive the pods that use them
    pub is_persistent: bool,
    /// The plugin honours pod fsGroup ownership changes
    pub is_fs_group_supported: bool,
    /// The plugin can expose raw block devices
    pub is_block_supported: bool,
}

impl DriverInfo {
    /// Whether `fs_type` is one of the supported filesystem types
    pub fn supports_fs_type(&self, fs_type: &str) -> bool {
        self.supported_fs_types.contains(fs_type)
    }
}

/// A storage plugin the suite can run against.
pub trait TestDriver: Send + Sync {
    /// Capability description of the plugin
    fn driver_info(&self) -> &DriverInfo;

    /// Reason to skip `pattern`, or `None` when the driver supports it.
    fn skip_unsupported_test(&self, pattern: &TestPattern) -> Option<String> {
        let info = self.driver_info();
        if !info.supports_fs_type(&pattern.fs_type) {
            return Some(format!(
                "driver {} does not support fsType {:?}",
                info.name, pattern.fs_type
            ));
        }
        if pattern.volume_mode == VolumeMode::Block && !info.is_block_supported {
            return Some(format!("driver {} does not support block volumes", info.name));
        }
        None
    }

    /// Install the plugin before the suite runs
    fn create_driver(&self);

    /// Remove the plugin after the suite ran
    fn cleanup_driver(&self);
}

/// A driver that provisions volumes on demand through a storage class.
pub trait DynamicPvTestDriver: TestDriver {
    /// Storage class for dynamic provisioning in `namespace`
    fn dynamic_provision_storage_class(
        &self,
        parameters: BTreeMap<String, String>,
        reclaim_policy: ReclaimPolicy,
        namespace: &str,
    ) -> StorageClass;
}
