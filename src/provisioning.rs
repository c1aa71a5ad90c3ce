//! Dynamic provisioning workflow
//!
//! One run provisions a storage class and a claim, checks the volume the
//! driver created for it, optionally writes and reads data through a pod,
//! and tears everything down again:
//!
//! ```text
//! create StorageClass ──► create PVC ──► wait Bound ──► re-read PVC
//!        │                    │                            │
//!   defer delete          defer delete                get bound PV
//!                                                          │
//!                                     validate capacity / modes / claimRef /
//!                                     reclaim policy / mount options
//!                                                          │
//!                               [optional] write/read pod (logs, delete)
//!                                                          │
//!                          delete PVC ──► reclaim Delete? wait PV gone
//! ```
//!
//! Deferred deletes sit on a [`CleanupStack`] and run in reverse order on
//! every exit path.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{
    Container, PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimVolumeSource, Pod,
    PodSpec, Volume, VolumeMount,
};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{info, warn};

use crate::claim::{claim_access_modes, claim_key, requested_storage, STORAGE_RESOURCE};
use crate::cleanup::CleanupStack;
use crate::client::StorageClient;
use crate::config::Timeouts;
use crate::quantity::quantity_value;
use crate::storage_class::ReclaimPolicy;
use crate::wait::{wait_for_claim_phase, wait_for_pod_success, wait_for_volume_deleted, PollConfig};
use crate::{Error, Result, DEFAULT_BUSYBOX_IMAGE};

/// Claim phase a provisioned claim must reach.
pub const CLAIM_BOUND: &str = "Bound";

/// Where the claim is mounted inside the write/read pod.
pub const TEST_MOUNT_PATH: &str = "/mnt/test";

/// Shell command of the write/read check.
pub const WRITE_READ_COMMAND: &str =
    "echo 'hello world' > /mnt/test/data && grep 'hello world' /mnt/test/data";

const TESTER_GENERATE_NAME: &str = "pvc-volume-tester-";
const TESTER_CONTAINER: &str = "volume-tester";
const TESTER_VOLUME: &str = "my-volume";

/// Inputs of one provisioning run.
#[derive(Clone)]
pub struct StorageClassTest {
    /// Scenario name, for logs
    pub name: String,
    /// Storage class to submit
    pub storage_class: StorageClass,
    /// Claim to submit against the storage class
    pub claim: PersistentVolumeClaim,
    /// Skip the pod write/read check
    pub skip_write_read_check: bool,
    /// Image for the write/read pod
    pub busybox_image: String,
    /// Poll bounds for the waits
    pub timeouts: Timeouts,
    /// Cluster access
    pub client: Arc<dyn StorageClient>,
}

impl StorageClassTest {
    /// Run with default timeouts, the default image and the write/read check on
    pub fn new(
        name: impl Into<String>,
        storage_class: StorageClass,
        claim: PersistentVolumeClaim,
        client: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            name: name.into(),
            storage_class,
            claim,
            skip_write_read_check: false,
            busybox_image: DEFAULT_BUSYBOX_IMAGE.to_string(),
            timeouts: Timeouts::default(),
            client,
        }
    }
}

/// Run the full provisioning workflow and return the volume that was bound.
///
/// Cleanup runs whatever happened; the first failure of the workflow wins
/// over cleanup failures, which are then only logged.
pub async fn test_dynamic_provisioning(test: &StorageClassTest) -> Result<PersistentVolume> {
    info!(scenario = %test.name, "starting dynamic provisioning");
    let mut cleanup = CleanupStack::new();
    let outcome = provision_and_verify(test, &mut cleanup).await;
    let cleaned = cleanup.run().await;
    match (outcome, cleaned) {
        (Ok(volume), Ok(())) => Ok(volume),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), cleaned) => {
            if let Err(cleanup_err) = cleaned {
                warn!(scenario = %test.name, error = %cleanup_err, "cleanup also failed");
            }
            Err(e)
        }
    }
}

async fn provision_and_verify(
    test: &StorageClassTest,
    cleanup: &mut CleanupStack,
) -> Result<PersistentVolume> {
    let client = &test.client;

    let storage_class = provision_storage_class(&test.storage_class, client.clone(), cleanup).await?;

    let claim = provision_claim(
        &test.claim,
        client.clone(),
        test.timeouts.claim_provision,
        cleanup,
    )
    .await?;

    let volume =
        validate_provisioned_volume(&storage_class, &test.claim, &claim, client.as_ref()).await?;

    if !test.skip_write_read_check {
        validate_pod_can_write_and_read(
            &claim,
            client.clone(),
            &test.busybox_image,
            test.timeouts.pod_start_slow,
        )
        .await?;
    }

    let (namespace, name) = object_identity(&claim.metadata, "PersistentVolumeClaim")?;
    info!(claim = %format!("{namespace}/{name}"), "deleting the claim");
    delete_claim_tolerating_absence(client.as_ref(), &namespace, &name).await?;

    // Retained volumes outlive their claim; only Delete is waited on.
    let volume_name = volume.metadata.name.clone().unwrap_or_default();
    if reclaim_policy_of(&volume) == Some(ReclaimPolicy::Delete.as_str()) {
        info!(volume = %volume_name, "deleting the claim's PV");
        wait_for_volume_deleted(client.as_ref(), &volume_name, test.timeouts.volume_delete).await?;
    }

    Ok(volume)
}

/// Submit a storage class and defer its deletion.
///
/// The delete is deferred even when creation fails, in case the class was
/// persisted anyway; that defensive delete tolerates the class being absent.
pub async fn provision_storage_class(
    storage_class: &StorageClass,
    client: Arc<dyn StorageClient>,
    cleanup: &mut CleanupStack,
) -> Result<StorageClass> {
    let requested_name = storage_class.metadata.name.clone().unwrap_or_default();
    info!(storage_class = %requested_name, "creating a StorageClass");

    let created = client.create_storage_class(storage_class).await;
    match created {
        Ok(created) => {
            let name = created.metadata.name.clone().unwrap_or(requested_name);
            let c = client.clone();
            cleanup.defer(format!("delete storage class {name}"), move || async move {
                info!(storage_class = %name, "deleting storage class");
                c.delete_storage_class(&name).await
            });
            Ok(created)
        }
        Err(e) => {
            warn!(storage_class = %requested_name, error = %e, "failed to create storage class");
            let name = requested_name;
            cleanup.defer(format!("delete storage class {name}"), move || async move {
                match client.delete_storage_class(&name).await {
                    Err(e) if !e.is_not_found() => Err(e),
                    _ => Ok(()),
                }
            });
            Err(e)
        }
    }
}

/// Submit a claim, defer its deletion, wait until it is bound and return
/// a fresh copy carrying the server-assigned fields.
pub async fn provision_claim(
    claim: &PersistentVolumeClaim,
    client: Arc<dyn StorageClient>,
    poll: PollConfig,
    cleanup: &mut CleanupStack,
) -> Result<PersistentVolumeClaim> {
    let namespace = claim.metadata.namespace.clone().unwrap_or_default();
    info!(namespace = %namespace, "creating a PersistentVolumeClaim");

    let created = client.create_claim(&namespace, claim).await?;
    let (namespace, name) = object_identity(&created.metadata, "PersistentVolumeClaim")?;

    {
        let c = client.clone();
        let (namespace, name) = (namespace.clone(), name.clone());
        cleanup.defer(format!("delete claim {namespace}/{name}"), move || async move {
            info!(claim = %format!("{namespace}/{name}"), "deleting PersistentVolumeClaim");
            delete_claim_tolerating_absence(c.as_ref(), &namespace, &name).await
        });
    }

    wait_for_claim_phase(client.as_ref(), &namespace, &name, CLAIM_BOUND, poll).await?;

    info!(claim = %format!("{namespace}/{name}"), "checking the PersistentVolumeClaim");
    client.get_claim(&namespace, &name).await
}

/// Fetch the volume bound to `persisted_claim` and check it against what was
/// requested.
///
/// Checks, in order: claimed and provisioned capacity equal the requested
/// capacity, access modes match the request, the claim reference points
/// back at the claim, and reclaim policy and mount options match the class.
pub async fn validate_provisioned_volume(
    storage_class: &StorageClass,
    requested_claim: &PersistentVolumeClaim,
    persisted_claim: &PersistentVolumeClaim,
    client: &dyn StorageClient,
) -> Result<PersistentVolume> {
    let volume_name = persisted_claim
        .spec
        .as_ref()
        .and_then(|s| s.volume_name.clone())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            Error::assertion(
                format!("volume name of bound claim {}", claim_key(persisted_claim)),
                "a bound volume",
                None::<String>,
            )
        })?;
    let volume = client.get_volume(&volume_name).await?;

    let expected_capacity = capacity_value(requested_storage(requested_claim), "requested capacity")?;
    let claim_capacity = capacity_value(requested_storage(persisted_claim), "claim capacity")?;
    ensure_eq("claimCapacity equals requestedCapacity", expected_capacity, claim_capacity)?;

    let volume_spec = volume.spec.clone().unwrap_or_default();
    let volume_capacity = capacity_value(
        volume_spec
            .capacity
            .as_ref()
            .and_then(|c| c.get(STORAGE_RESOURCE)),
        "volume capacity",
    )?;
    ensure_eq("pvCapacity equals requestedCapacity", expected_capacity, volume_capacity)?;

    info!(volume = %volume_name, "checking the PersistentVolume");
    ensure_eq(
        "volume access modes",
        claim_access_modes(requested_claim),
        volume_spec.access_modes.clone().unwrap_or_default(),
    )?;

    let claim_ref = volume_spec.claim_ref.clone().unwrap_or_default();
    ensure_eq(
        "volume claimRef name",
        persisted_claim.metadata.name.clone(),
        claim_ref.name,
    )?;
    ensure_eq(
        "volume claimRef namespace",
        persisted_claim.metadata.namespace.clone(),
        claim_ref.namespace,
    )?;
    ensure_eq(
        "volume reclaim policy",
        storage_class.reclaim_policy.as_deref(),
        reclaim_policy_of(&volume),
    )?;
    ensure_eq(
        "volume mount options",
        storage_class.mount_options.clone().unwrap_or_default(),
        volume_spec.mount_options.clone().unwrap_or_default(),
    )?;

    Ok(volume)
}

/// Check that a pod can write data to the claim and read it back.
pub async fn validate_pod_can_write_and_read(
    claim: &PersistentVolumeClaim,
    client: Arc<dyn StorageClient>,
    image: &str,
    poll: PollConfig,
) -> Result<()> {
    info!(claim = %claim_key(claim), "checking a pod can write data and then read the same data from a volume");
    run_in_pod_with_volume(claim, WRITE_READ_COMMAND, client, image, poll).await
}

/// Run `command` in a throwaway pod with `claim` mounted at
/// [`TEST_MOUNT_PATH`] and wait for it to succeed.
///
/// The pod's logs are recorded and the pod deleted before returning,
/// whether or not it succeeded.
pub async fn run_in_pod_with_volume(
    claim: &PersistentVolumeClaim,
    command: &str,
    client: Arc<dyn StorageClient>,
    image: &str,
    poll: PollConfig,
) -> Result<()> {
    let (namespace, claim_name) = object_identity(&claim.metadata, "PersistentVolumeClaim")?;
    let pod = tester_pod(&claim_name, command, image);

    let created = client
        .create_pod(&namespace, &pod)
        .await
        .map_err(|e| Error::internal(format!("failed to create pod: {e}")))?;
    let (_, pod_name) = object_identity(&created.metadata, "Pod")?;

    let mut cleanup = CleanupStack::new();
    {
        let c = client.clone();
        let (namespace, pod_name) = (namespace.clone(), pod_name.clone());
        cleanup.defer(format!("delete pod {namespace}/{pod_name}"), move || async move {
            info!(pod = %format!("{namespace}/{pod_name}"), "deleting Pod");
            match c.pod_logs(&namespace, &pod_name).await {
                Ok(logs) => info!(pod = %pod_name, logs = %logs, "pod logs"),
                Err(e) => warn!(pod = %pod_name, error = %e, "error getting pod logs"),
            }
            c.delete_pod(&namespace, &pod_name).await
        });
    }

    let waited = wait_for_pod_success(client.as_ref(), &namespace, &pod_name, poll).await;
    let cleaned = cleanup.run().await;
    match (waited, cleaned) {
        (Ok(()), cleaned) => cleaned,
        (Err(e), cleaned) => {
            if let Err(cleanup_err) = cleaned {
                warn!(pod = %pod_name, error = %cleanup_err, "pod cleanup also failed");
            }
            Err(e)
        }
    }
}

/// Pod manifest for a one-shot shell command against a claim.
pub fn tester_pod(claim_name: &str, command: &str, image: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            generate_name: Some(TESTER_GENERATE_NAME.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: TESTER_CONTAINER.to_string(),
                image: Some(image.to_string()),
                command: Some(vec!["/bin/sh".to_string()]),
                args: Some(vec!["-c".to_string(), command.to_string()]),
                volume_mounts: Some(vec![VolumeMount {
                    name: TESTER_VOLUME.to_string(),
                    mount_path: TEST_MOUNT_PATH.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            restart_policy: Some("Never".to_string()),
            volumes: Some(vec![Volume {
                name: TESTER_VOLUME.to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: claim_name.to_string(),
                    read_only: Some(false),
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Delete a claim; an already-deleted claim is fine, any other error is not.
async fn delete_claim_tolerating_absence(
    client: &dyn StorageClient,
    namespace: &str,
    name: &str,
) -> Result<()> {
    match client.delete_claim(namespace, name).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => {
            info!(claim = %format!("{namespace}/{name}"), "claim already deleted");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn reclaim_policy_of(volume: &PersistentVolume) -> Option<&str> {
    volume
        .spec
        .as_ref()
        .and_then(|s| s.persistent_volume_reclaim_policy.as_deref())
}

fn object_identity(meta: &ObjectMeta, kind: &str) -> Result<(String, String)> {
    let name = meta
        .name
        .clone()
        .ok_or_else(|| Error::internal(format!("{kind} returned by the API server has no name")))?;
    Ok((meta.namespace.clone().unwrap_or_default(), name))
}

fn capacity_value(
    quantity: Option<&k8s_openapi::apimachinery::pkg::api::resource::Quantity>,
    what: &str,
) -> Result<i128> {
    let quantity =
        quantity.ok_or_else(|| Error::assertion(what, "a storage quantity", None::<String>))?;
    quantity_value(quantity)
}

fn ensure_eq<T: PartialEq + std::fmt::Debug>(what: &str, expected: T, actual: T) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::assertion(what, expected, actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::new_claim;
    use crate::client::MockStorageClient;
    use crate::storage_class::build_storage_class;
    use k8s_openapi::api::core::v1::{
        ObjectReference, PersistentVolumeClaimStatus, PersistentVolumeSpec, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const NS: &str = "e2e-tests-ebs-x1";
    const CLAIM: &str = "pvc-k9z2q";
    const VOLUME: &str = "pvc-5f0c7d2e";
    const POD: &str = "pvc-volume-tester-abcde";

    /// How the fake cluster behaves; defaults model a healthy cluster.
    #[derive(Clone)]
    struct Behaviour {
        reclaim_policy: &'static str,
        bound_capacity: &'static str,
        volume_capacity: &'static str,
        mount_options: Option<Vec<String>>,
        access_modes: &'static [&'static str],
        claim_ref_name: &'static str,
        claim_ref_namespace: &'static str,
        claim_phase: &'static str,
        pod_phase: &'static str,
        claim_delete_error: bool,
        pod_delete_error: bool,
        storage_class_delete_error: bool,
    }

    impl Default for Behaviour {
        fn default() -> Self {
            Self {
                reclaim_policy: "Delete",
                bound_capacity: "1Gi",
                volume_capacity: "1Gi",
                mount_options: None,
                access_modes: &["ReadWriteOnce"],
                claim_ref_name: CLAIM,
                claim_ref_namespace: NS,
                claim_phase: "Bound",
                pod_phase: "Succeeded",
                claim_delete_error: false,
                pod_delete_error: false,
                storage_class_delete_error: false,
            }
        }
    }

    type Events = Arc<Mutex<Vec<String>>>;

    fn fast_timeouts() -> Timeouts {
        let poll = PollConfig::new(Duration::from_millis(1), Duration::from_millis(100));
        Timeouts {
            claim_provision: poll,
            pod_start_slow: poll,
            volume_delete: poll,
        }
    }

    fn bound_claim(b: &Behaviour) -> PersistentVolumeClaim {
        let mut claim = new_claim("sc", b.bound_capacity, NS);
        claim.metadata.name = Some(CLAIM.to_string());
        if let Some(spec) = claim.spec.as_mut() {
            spec.volume_name = Some(VOLUME.to_string());
        }
        claim.status = Some(PersistentVolumeClaimStatus {
            phase: Some(b.claim_phase.to_string()),
            ..Default::default()
        });
        claim
    }

    fn bound_volume(b: &Behaviour) -> PersistentVolume {
        let mut capacity = BTreeMap::new();
        capacity.insert("storage".to_string(), Quantity(b.volume_capacity.to_string()));
        PersistentVolume {
            metadata: ObjectMeta {
                name: Some(VOLUME.to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                access_modes: Some(b.access_modes.iter().map(|m| m.to_string()).collect()),
                capacity: Some(capacity),
                claim_ref: Some(ObjectReference {
                    name: Some(b.claim_ref_name.to_string()),
                    namespace: Some(b.claim_ref_namespace.to_string()),
                    ..Default::default()
                }),
                persistent_volume_reclaim_policy: Some(b.reclaim_policy.to_string()),
                mount_options: b.mount_options.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn fake_cluster(b: Behaviour) -> (MockStorageClient, Events, Arc<AtomicU32>) {
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let volume_gets = Arc::new(AtomicU32::new(0));
        let claim_deleted = Arc::new(AtomicBool::new(false));
        let mut client = MockStorageClient::new();

        client
            .expect_create_storage_class()
            .returning(|sc| Ok(sc.clone()));

        let ev = events.clone();
        let storage_class_delete_error = b.storage_class_delete_error;
        client.expect_delete_storage_class().returning(move |name| {
            ev.lock().unwrap().push(format!("delete sc {name}"));
            if storage_class_delete_error {
                return Err(Error::internal("storage class delete forbidden"));
            }
            Ok(())
        });

        client.expect_create_claim().returning(|_, claim| {
            let mut created = claim.clone();
            created.metadata.name = Some(CLAIM.to_string());
            Ok(created)
        });

        let bb = b.clone();
        client
            .expect_get_claim()
            .returning(move |_, _| Ok(bound_claim(&bb)));

        let ev = events.clone();
        let deleted = claim_deleted.clone();
        let claim_delete_error = b.claim_delete_error;
        client.expect_delete_claim().returning(move |ns, name| {
            ev.lock().unwrap().push(format!("delete claim {name}"));
            if claim_delete_error {
                return Err(Error::internal("forbidden"));
            }
            if deleted.swap(true, Ordering::SeqCst) {
                Err(Error::not_found("PersistentVolumeClaim", format!("{ns}/{name}")))
            } else {
                Ok(())
            }
        });

        let bb = b.clone();
        let gets = volume_gets.clone();
        let deleted = claim_deleted.clone();
        client.expect_get_volume().returning(move |name| {
            gets.fetch_add(1, Ordering::SeqCst);
            if deleted.load(Ordering::SeqCst) && bb.reclaim_policy == "Delete" {
                Err(Error::not_found("PersistentVolume", name))
            } else {
                Ok(bound_volume(&bb))
            }
        });

        let ev = events.clone();
        client.expect_create_pod().returning(move |_, pod| {
            ev.lock().unwrap().push("create pod".to_string());
            let mut created = pod.clone();
            created.metadata.name = Some(POD.to_string());
            Ok(created)
        });

        let pod_phase = b.pod_phase;
        client.expect_get_pod().returning(move |_, _| {
            Ok(Pod {
                status: Some(PodStatus {
                    phase: Some(pod_phase.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            })
        });

        let ev = events.clone();
        client.expect_pod_logs().returning(move |_, name| {
            ev.lock().unwrap().push(format!("logs {name}"));
            Ok("hello world\n".to_string())
        });

        let ev = events.clone();
        let pod_delete_error = b.pod_delete_error;
        client.expect_delete_pod().returning(move |_, name| {
            ev.lock().unwrap().push(format!("delete pod {name}"));
            if pod_delete_error {
                return Err(Error::internal("pod delete forbidden"));
            }
            Ok(())
        });

        (client, events, volume_gets)
    }

    fn scenario_test(client: MockStorageClient, policy: ReclaimPolicy) -> StorageClassTest {
        let mut params = BTreeMap::new();
        params.insert("type".to_string(), "gp2".to_string());
        params.insert("fsType".to_string(), "ext4".to_string());
        let sc_name = format!("{NS}-ebs.csi.aws.com-sc");
        let storage_class = build_storage_class(&sc_name, "ebs.csi.aws.com", params, policy);
        let claim = new_claim(&sc_name, "1Gi", NS);
        let mut test = StorageClassTest::new("gp2/ext4", storage_class, claim, Arc::new(client));
        test.timeouts = fast_timeouts();
        test
    }

    fn events_of(events: &Events) -> Vec<String> {
        events.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn gp2_ext4_delete_policy_provisions_and_cleans_up() {
        let (client, events, _) = fake_cluster(Behaviour::default());
        let test = scenario_test(client, ReclaimPolicy::Delete);

        let volume = test_dynamic_provisioning(&test).await.unwrap();

        let capacity = volume.spec.as_ref().unwrap().capacity.as_ref().unwrap();
        assert_eq!(capacity.get("storage"), Some(&Quantity("1Gi".to_string())));
        assert_eq!(reclaim_policy_of(&volume), Some("Delete"));

        let sc = format!("delete sc {NS}-ebs.csi.aws.com-sc");
        assert_eq!(
            events_of(&events),
            vec![
                "create pod".to_string(),
                format!("logs {POD}"),
                format!("delete pod {POD}"),
                format!("delete claim {CLAIM}"),
                // deferred cleanup sees the claim already gone
                format!("delete claim {CLAIM}"),
                sc,
            ]
        );
    }

    #[tokio::test]
    async fn retain_policy_does_not_wait_for_volume_deletion() {
        let (client, _, volume_gets) = fake_cluster(Behaviour {
            reclaim_policy: "Retain",
            ..Default::default()
        });
        let test = scenario_test(client, ReclaimPolicy::Retain);

        test_dynamic_provisioning(&test).await.unwrap();
        assert_eq!(volume_gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delete_policy_polls_until_volume_is_gone() {
        let (client, _, volume_gets) = fake_cluster(Behaviour::default());
        let test = scenario_test(client, ReclaimPolicy::Delete);

        test_dynamic_provisioning(&test).await.unwrap();
        // one read for validation, one poll that observes NotFound
        assert_eq!(volume_gets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn capacity_mismatch_fails_and_still_cleans_up() {
        let (client, events, _) = fake_cluster(Behaviour {
            volume_capacity: "2Gi",
            ..Default::default()
        });
        let test = scenario_test(client, ReclaimPolicy::Delete);

        let err = test_dynamic_provisioning(&test).await.unwrap_err();
        match &err {
            Error::Assertion { what, .. } => assert!(what.contains("pvCapacity")),
            other => panic!("expected Assertion, got {other}"),
        }
        let events = events_of(&events);
        assert!(!events.contains(&"create pod".to_string()));
        let sc = format!("delete sc {NS}-ebs.csi.aws.com-sc");
        assert_eq!(events.last(), Some(&sc));
        assert!(events.contains(&format!("delete claim {CLAIM}")));
    }

    #[tokio::test]
    async fn equal_capacity_in_other_units_passes() {
        let (client, _, _) = fake_cluster(Behaviour {
            bound_capacity: "1024Mi",
            volume_capacity: "1073741824",
            ..Default::default()
        });
        let test = scenario_test(client, ReclaimPolicy::Delete);
        test_dynamic_provisioning(&test).await.unwrap();
    }

    #[tokio::test]
    async fn reclaim_policy_mismatch_fails() {
        let (client, _, _) = fake_cluster(Behaviour {
            reclaim_policy: "Retain",
            ..Default::default()
        });
        let test = scenario_test(client, ReclaimPolicy::Delete);

        let err = test_dynamic_provisioning(&test).await.unwrap_err();
        assert!(err.to_string().contains("reclaim policy"), "{err}");
    }

    #[tokio::test]
    async fn unexpected_mount_options_fail() {
        let (client, _, _) = fake_cluster(Behaviour {
            mount_options: Some(vec!["debug".to_string()]),
            ..Default::default()
        });
        let test = scenario_test(client, ReclaimPolicy::Delete);

        let err = test_dynamic_provisioning(&test).await.unwrap_err();
        assert!(err.to_string().contains("mount options"), "{err}");
    }

    async fn expect_assertion(b: Behaviour, check: &str) -> Events {
        let (client, events, _) = fake_cluster(b);
        let test = scenario_test(client, ReclaimPolicy::Delete);

        match test_dynamic_provisioning(&test).await {
            Err(Error::Assertion { what, .. }) => assert!(what.contains(check), "{what}"),
            other => panic!("expected {check} assertion, got {other:?}"),
        }
        events
    }

    #[tokio::test]
    async fn claim_capacity_differing_from_request_fails() {
        let events = expect_assertion(
            Behaviour {
                bound_capacity: "2Gi",
                volume_capacity: "2Gi",
                ..Default::default()
            },
            "claimCapacity",
        )
        .await;
        assert!(events_of(&events).contains(&format!("delete claim {CLAIM}")));
    }

    #[tokio::test]
    async fn access_mode_mismatch_fails() {
        expect_assertion(
            Behaviour {
                access_modes: &["ReadWriteMany"],
                ..Default::default()
            },
            "access modes",
        )
        .await;
    }

    #[tokio::test]
    async fn claim_ref_to_another_claim_fails() {
        expect_assertion(
            Behaviour {
                claim_ref_name: "other",
                ..Default::default()
            },
            "claimRef name",
        )
        .await;
    }

    #[tokio::test]
    async fn claim_ref_to_another_namespace_fails() {
        expect_assertion(
            Behaviour {
                claim_ref_namespace: "kube-system",
                ..Default::default()
            },
            "claimRef namespace",
        )
        .await;
    }

    #[tokio::test]
    async fn pod_deletion_failure_fails_run_after_remaining_cleanup() {
        let (client, events, _) = fake_cluster(Behaviour {
            pod_delete_error: true,
            ..Default::default()
        });
        let test = scenario_test(client, ReclaimPolicy::Delete);

        match test_dynamic_provisioning(&test).await {
            Err(Error::Cleanup { failures }) => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].starts_with(&format!("delete pod {NS}/{POD}")), "{failures:?}");
            }
            other => panic!("expected Cleanup, got {other:?}"),
        }
        let sc = format!("delete sc {NS}-ebs.csi.aws.com-sc");
        assert_eq!(
            events_of(&events)[2..],
            [format!("delete pod {POD}"), format!("delete claim {CLAIM}"), sc]
        );
    }

    #[tokio::test]
    async fn storage_class_deletion_failure_fails_otherwise_passing_run() {
        let (client, events, _) = fake_cluster(Behaviour {
            storage_class_delete_error: true,
            ..Default::default()
        });
        let test = scenario_test(client, ReclaimPolicy::Delete);

        match test_dynamic_provisioning(&test).await {
            Err(Error::Cleanup { failures }) => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].starts_with("delete storage class"), "{failures:?}");
            }
            other => panic!("expected Cleanup, got {other:?}"),
        }
        let events = events_of(&events);
        assert_eq!(
            events.iter().filter(|e| *e == &format!("delete claim {CLAIM}")).count(),
            2
        );
        assert_eq!(
            events.last(),
            Some(&format!("delete sc {NS}-ebs.csi.aws.com-sc"))
        );
    }

    #[tokio::test]
    async fn rejected_storage_class_aborts_before_claim() {
        let (mut client, events, _) = fake_cluster(Behaviour::default());
        client.checkpoint();
        client
            .expect_create_storage_class()
            .times(1)
            .returning(|_| Err(Error::internal("invalid parameter type")));
        client.expect_create_claim().never();
        let ev = events.clone();
        client.expect_delete_storage_class().times(1).returning(move |name| {
            ev.lock().unwrap().push(format!("delete sc {name}"));
            Err(Error::not_found("StorageClass", name))
        });
        let test = scenario_test(client, ReclaimPolicy::Delete);

        let err = test_dynamic_provisioning(&test).await.unwrap_err();
        assert!(err.to_string().contains("invalid parameter type"));
        assert_eq!(events_of(&events), vec![format!("delete sc {NS}-ebs.csi.aws.com-sc")]);
    }

    #[tokio::test]
    async fn unbound_claim_times_out_and_is_deleted() {
        let (client, events, _) = fake_cluster(Behaviour {
            claim_phase: "Pending",
            ..Default::default()
        });
        let test = scenario_test(client, ReclaimPolicy::Delete);

        let err = test_dynamic_provisioning(&test).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(
            events_of(&events),
            vec![
                format!("delete claim {CLAIM}"),
                format!("delete sc {NS}-ebs.csi.aws.com-sc"),
            ]
        );
    }

    #[tokio::test]
    async fn failed_write_read_pod_fails_after_logs_and_delete() {
        let (client, events, _) = fake_cluster(Behaviour {
            pod_phase: "Failed",
            ..Default::default()
        });
        let test = scenario_test(client, ReclaimPolicy::Delete);

        let err = test_dynamic_provisioning(&test).await.unwrap_err();
        assert!(matches!(err, Error::PodFailed { .. }), "{err}");
        let events = events_of(&events);
        assert_eq!(
            &events[..3],
            &[
                "create pod".to_string(),
                format!("logs {POD}"),
                format!("delete pod {POD}"),
            ]
        );
    }

    #[tokio::test]
    async fn skipped_write_read_check_never_creates_a_pod() {
        let (client, events, _) = fake_cluster(Behaviour::default());
        let mut test = scenario_test(client, ReclaimPolicy::Delete);
        test.skip_write_read_check = true;

        test_dynamic_provisioning(&test).await.unwrap();
        assert!(!events_of(&events).iter().any(|e| e.contains("pod")));
    }

    #[tokio::test]
    async fn claim_deletion_errors_other_than_not_found_fail_the_run() {
        let (client, events, _) = fake_cluster(Behaviour {
            claim_delete_error: true,
            ..Default::default()
        });
        let test = scenario_test(client, ReclaimPolicy::Delete);

        let err = test_dynamic_provisioning(&test).await.unwrap_err();
        assert!(err.to_string().contains("forbidden"), "{err}");
        // the storage class is still removed
        let sc = format!("delete sc {NS}-ebs.csi.aws.com-sc");
        assert_eq!(events_of(&events).last(), Some(&sc));
    }

    #[test]
    fn tester_pod_mounts_claim_and_runs_command() {
        let pod = tester_pod("pvc-1", WRITE_READ_COMMAND, "busybox");
        assert_eq!(pod.metadata.generate_name.as_deref(), Some("pvc-volume-tester-"));
        let spec = pod.spec.unwrap();
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
        let container = &spec.containers[0];
        assert_eq!(container.name, "volume-tester");
        assert_eq!(container.command, Some(vec!["/bin/sh".to_string()]));
        assert_eq!(
            container.args,
            Some(vec!["-c".to_string(), WRITE_READ_COMMAND.to_string()])
        );
        let mount = &container.volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.mount_path, "/mnt/test");
        let volume = &spec.volumes.unwrap()[0];
        assert_eq!(volume.name, mount.name);
        assert_eq!(
            volume.persistent_volume_claim.as_ref().unwrap().claim_name,
            "pvc-1"
        );
    }

    #[test]
    fn write_read_command_targets_mount_path() {
        assert!(WRITE_READ_COMMAND.contains("hello world"));
        assert!(WRITE_READ_COMMAND.contains(TEST_MOUNT_PATH));
    }
}
