//! Storage class construction

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::Error;

/// What happens to a provisioned volume once its claim is released.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReclaimPolicy {
    /// The volume and its backing disk are removed
    #[default]
    Delete,
    /// The volume is left for manual handling
    Retain,
}

impl ReclaimPolicy {
    /// API string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "Delete",
            Self::Retain => "Retain",
        }
    }
}

impl fmt::Display for ReclaimPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReclaimPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Delete" => Ok(Self::Delete),
            "Retain" => Ok(Self::Retain),
            other => Err(Error::config(format!("unknown reclaim policy {other:?}"))),
        }
    }
}

/// Build a storage class ready for submission.
///
/// Parameters are passed through untouched; the control plane (or the
/// provisioner) is the one that rejects bad values.
pub fn build_storage_class(
    name: &str,
    provisioner: &str,
    parameters: BTreeMap<String, String>,
    reclaim_policy: ReclaimPolicy,
) -> StorageClass {
    StorageClass {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        provisioner: provisioner.to_string(),
        parameters: Some(parameters),
        reclaim_policy: Some(reclaim_policy.to_string()),
        ..Default::default()
    }
}
