//! Dynamic provisioning scenario matrix
//!
//! One scenario per (volume type, filesystem type) pair. Scenarios carry no
//! state of their own; each one runs in a fresh namespace so they can run in
//! any order or concurrently.

use std::collections::BTreeMap;
use std::fmt;

use crate::driver::{
    iops_per_gb_for_volume_type, size_for_volume_type, TestPattern, VolumeMode,
    VALID_FS_TYPES, VALID_VOLUME_TYPES,
};

/// Storage class parameter naming the EBS volume type.
pub const PARAM_TYPE: &str = "type";
/// Storage class parameter naming the filesystem type.
pub const PARAM_FS_TYPE: &str = "fsType";
/// Storage class parameter for io1 provisioned IOPS per GiB.
pub const PARAM_IOPS_PER_GB: &str = "iopsPerGB";

const SUITE_TAG: &str = "[ebs-csi] Dynamic Provisioning";

/// A single (volume type, filesystem type) combination.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Scenario {
    /// EBS volume type, e.g. "gp2"
    pub volume_type: String,
    /// Filesystem type, "" for the driver default
    pub fs_type: String,
}

impl Scenario {
    /// Create a scenario for the given pair
    pub fn new(volume_type: impl Into<String>, fs_type: impl Into<String>) -> Self {
        Self {
            volume_type: volume_type.into(),
            fs_type: fs_type.into(),
        }
    }

    /// Storage class parameters for this scenario.
    pub fn parameters(&self) -> BTreeMap<String, String> {
        let mut parameters = BTreeMap::new();
        parameters.insert(PARAM_TYPE.to_string(), self.volume_type.clone());
        parameters.insert(PARAM_FS_TYPE.to_string(), self.fs_type.clone());
        if let Some(iops) = iops_per_gb_for_volume_type(&self.volume_type) {
            parameters.insert(PARAM_IOPS_PER_GB.to_string(), iops.to_string());
        }
        parameters
    }

    /// Claim size for this scenario's volume type
    pub fn claim_size(&self) -> &'static str {
        size_for_volume_type(&self.volume_type)
    }

    /// The test pattern this scenario exercises
    pub fn pattern(&self) -> TestPattern {
        TestPattern {
            name: "Dynamic PV (default fs)".to_string(),
            fs_type: self.fs_type.clone(),
            volume_mode: VolumeMode::Filesystem,
        }
    }

    /// Full test name, used for reports and focus/skip filtering
    pub fn name(&self) -> String {
        format!("{SUITE_TAG} {self} should create a volume on demand")
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "with {:?} volumeType and {:?} fsType",
            self.volume_type, self.fs_type
        )
    }
}

/// Every combination of `volume_types` and `fs_types`, volume type outermost.
pub fn cross_product(volume_types: &[&str], fs_types: &[&str]) -> Vec<Scenario> {
    volume_types
        .iter()
        .flat_map(|t| fs_types.iter().map(move |fs| Scenario::new(*t, *fs)))
        .collect()
}

/// The full EBS matrix.
pub fn scenarios() -> Vec<Scenario> {
    cross_product(&VALID_VOLUME_TYPES, &VALID_FS_TYPES)
}

/// Apply focus/skip substring filters to scenario names.
///
/// An empty focus keeps everything; skip wins over focus.
pub fn filter_scenarios(
    scenarios: Vec<Scenario>,
    focus: Option<&str>,
    skip: Option<&str>,
) -> Vec<Scenario> {
    scenarios
        .into_iter()
        .filter(|s| {
            let name = s.name();
            let focused = focus.map_or(true, |f| f.is_empty() || name.contains(f));
            let skipped = skip.is_some_and(|k| !k.is_empty() && name.contains(k));
            focused && !skipped
        })
        .collect()
}
