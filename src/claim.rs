//! Persistent volume claim construction

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Resource name of a claim's storage request.
pub const STORAGE_RESOURCE: &str = "storage";

/// Access mode requested by every scenario claim.
pub const READ_WRITE_ONCE: &str = "ReadWriteOnce";

/// Name prefix for generated claims.
const CLAIM_GENERATE_NAME: &str = "pvc-";

/// Build a ReadWriteOnce claim of `size` against `storage_class_name`.
pub fn new_claim(storage_class_name: &str, size: &str, namespace: &str) -> PersistentVolumeClaim {
    let mut requests = BTreeMap::new();
    requests.insert(STORAGE_RESOURCE.to_string(), Quantity(size.to_string()));

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            generate_name: Some(CLAIM_GENERATE_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![READ_WRITE_ONCE.to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            storage_class_name: Some(storage_class_name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The storage request of a claim, if it has one.
pub fn requested_storage(claim: &PersistentVolumeClaim) -> Option<&Quantity> {
    claim
        .spec
        .as_ref()
        .and_then(|s| s.resources.as_ref())
        .and_then(|r| r.requests.as_ref())
        .and_then(|r| r.get(STORAGE_RESOURCE))
}

/// Access modes of a claim (empty when unset).
pub fn claim_access_modes(claim: &PersistentVolumeClaim) -> Vec<String> {
    claim
        .spec
        .as_ref()
        .and_then(|s| s.access_modes.clone())
        .unwrap_or_default()
}

/// `namespace/name` of a claim for log lines and errors.
pub fn claim_key(claim: &PersistentVolumeClaim) -> String {
    format!(
        "{}/{}",
        claim.metadata.namespace.as_deref().unwrap_or_default(),
        claim
            .metadata
            .name
            .as_deref()
            .or(claim.metadata.generate_name.as_deref())
            .unwrap_or_default()
    )
}
