//! Dynamic provisioning against a live EBS CSI driver
//!
//! Each test runs in a namespace of its own and removes what it created,
//! including the EBS volume behind a retained PersistentVolume.

use std::time::Duration;

use k8s_openapi::api::core::v1::PersistentVolume;
use kube::api::{Api, Patch, PatchParams};

use ebs_e2e::claim::new_claim;
use ebs_e2e::config::TestContext;
use ebs_e2e::provisioning::{test_dynamic_provisioning, CLAIM_BOUND};
use ebs_e2e::scenario::Scenario;
use ebs_e2e::storage_class::ReclaimPolicy;
use ebs_e2e::suite::{build_scenario_test, register_driver};
use ebs_e2e::wait::{wait_for_volume_deleted, PollConfig};
use ebs_e2e::{VOLUME_DELETE_POLL_INTERVAL, VOLUME_DELETE_TIMEOUT};

use super::helpers::{cluster_client, framework, kube_client};

/// Story: a gp2 volume formatted as ext4 is provisioned, used and reclaimed
///
/// Expected behavior:
/// - The claim binds to a 1Gi ReadWriteOnce volume
/// - A pod writes and reads back data on the volume
/// - Deleting the claim removes the volume
#[tokio::test]
#[ignore = "requires cluster with EBS CSI driver - run with: cargo test --test e2e -- --ignored"]
async fn story_gp2_ext4_volume_is_provisioned_on_demand() {
    let client = cluster_client().await;
    let framework = framework("ebs", client.clone());
    let namespace = framework
        .create_namespace()
        .await
        .expect("failed to create namespace");

    let test = build_scenario_test(
        register_driver(),
        &Scenario::new("gp2", "ext4"),
        &namespace,
        client.clone(),
        &TestContext::default(),
    );
    let result = test_dynamic_provisioning(&test).await;
    framework.delete_namespace(&namespace).await;

    let volume = result.expect("provisioning failed");
    let spec = volume.spec.expect("volume has no spec");
    assert_eq!(spec.persistent_volume_reclaim_policy.as_deref(), Some("Delete"));
    assert_eq!(spec.access_modes, Some(vec!["ReadWriteOnce".to_string()]));

    let name = volume.metadata.name.expect("volume has no name");
    assert!(
        client.get_volume(&name).await.unwrap_err().is_not_found(),
        "volume {name} should be gone"
    );
}

/// Story: a retained volume survives its claim
///
/// Expected behavior:
/// - The workflow succeeds without waiting for the volume
/// - The volume still exists afterwards and carries the Retain policy
#[tokio::test]
#[ignore = "requires cluster with EBS CSI driver - run with: cargo test --test e2e -- --ignored"]
async fn story_retained_volume_outlives_its_claim() {
    let client = cluster_client().await;
    let framework = framework("ebs-retain", client.clone());
    let namespace = framework
        .create_namespace()
        .await
        .expect("failed to create namespace");

    let test = build_scenario_test(
        register_driver(),
        &Scenario::new("gp2", ""),
        &namespace,
        client.clone(),
        &TestContext {
            skip_write_read_check: true,
            reclaim_policy: ReclaimPolicy::Retain,
            ..Default::default()
        },
    );

    let result = test_dynamic_provisioning(&test).await;
    framework.delete_namespace(&namespace).await;
    let volume = result.expect("provisioning failed");
    let name = volume.metadata.name.clone().expect("volume has no name");

    let survivor = client.get_volume(&name).await.expect("retained volume is gone");
    assert_eq!(
        survivor
            .spec
            .and_then(|s| s.persistent_volume_reclaim_policy)
            .as_deref(),
        Some("Retain")
    );

    // Flip the policy so the provisioner also deletes the EBS volume
    let volumes: Api<PersistentVolume> = Api::all(kube_client().await);
    let patch = serde_json::json!({ "spec": { "persistentVolumeReclaimPolicy": "Delete" } });
    volumes
        .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .expect("failed to patch reclaim policy");
    wait_for_volume_deleted(
        client.as_ref(),
        &name,
        PollConfig::new(VOLUME_DELETE_POLL_INTERVAL, VOLUME_DELETE_TIMEOUT),
    )
    .await
    .expect("released volume was not deleted");
}

/// Story: deleting a claim twice reports NotFound the second time
///
/// The claim names a storage class that does not exist, so it stays
/// Pending and no EBS volume is ever created.
#[tokio::test]
#[ignore = "requires cluster - run with: cargo test --test e2e -- --ignored"]
async fn story_claim_deletion_is_idempotent_at_the_api() {
    let client = cluster_client().await;
    let framework = framework("ebs-claim", client.clone());
    let namespace = framework
        .create_namespace()
        .await
        .expect("failed to create namespace");

    let claim = new_claim("no-such-class", "1Gi", &namespace);
    let created = client
        .create_claim(&namespace, &claim)
        .await
        .expect("failed to create claim");
    let name = created.metadata.name.expect("claim has no name");

    let phase = client
        .get_claim(&namespace, &name)
        .await
        .expect("failed to get claim")
        .status
        .and_then(|s| s.phase);
    assert_ne!(phase.as_deref(), Some(CLAIM_BOUND));

    client
        .delete_claim(&namespace, &name)
        .await
        .expect("first delete failed");
    // pvc-protection may keep the object around briefly
    tokio::time::sleep(Duration::from_secs(2)).await;
    let second = client.delete_claim(&namespace, &name).await;
    framework.delete_namespace(&namespace).await;

    assert!(
        second.as_ref().is_err_and(|e| e.is_not_found()),
        "expected NotFound, got {second:?}"
    );
}
