//! Suite bootstrap and the dynamic provisioning suite
//!
//! The driver descriptor is registered once per process and shared by
//! every scenario. Each scenario runs in its own namespace; up to
//! `--parallel` scenarios run at a time.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tracing::info;

use crate::claim::new_claim;
use crate::client::StorageClient;
use crate::config::TestContext;
use crate::driver::{DynamicPvTestDriver, EbsCsiDriver, TestDriver};
use crate::framework::Framework;
use crate::harness::TestHarness;
use crate::provisioning::{test_dynamic_provisioning, StorageClassTest};
use crate::scenario::{filter_scenarios, scenarios, Scenario};
use crate::storage_class::ReclaimPolicy;
use crate::{Error, Result};

/// Base name of scenario namespaces and object prefixes.
pub const FRAMEWORK_BASE_NAME: &str = "ebs";

/// Name of the suite in the summary.
pub const SUITE_NAME: &str = "ebs-csi dynamic provisioning";

static DRIVER: OnceLock<EbsCsiDriver> = OnceLock::new();

/// The process-wide EBS driver descriptor, created on first use.
pub fn register_driver() -> &'static EbsCsiDriver {
    DRIVER.get_or_init(|| {
        let driver = EbsCsiDriver::new();
        driver.create_driver();
        driver
    })
}

/// Register the driver, run the suite against the cluster and report.
pub async fn run(ctx: &TestContext, client: Arc<dyn StorageClient>) -> Result<()> {
    ctx.validate()?;
    let driver = register_driver();
    let harness = run_dynamic_provisioning_suite(driver, ctx, client).await;
    driver.cleanup_driver();
    harness.finish()
}

/// Run every selected scenario and return the collected results.
pub async fn run_dynamic_provisioning_suite(
    driver: &dyn DynamicPvTestDriver,
    ctx: &TestContext,
    client: Arc<dyn StorageClient>,
) -> TestHarness {
    let harness = TestHarness::new(SUITE_NAME);
    let framework = Framework::new(FRAMEWORK_BASE_NAME, client, ctx.keep_namespaces);

    let selected = filter_scenarios(scenarios(), ctx.focus.as_deref(), ctx.skip.as_deref());
    info!(
        scenarios = selected.len(),
        parallel = ctx.parallel,
        "running dynamic provisioning suite"
    );

    let mut runnable = Vec::with_capacity(selected.len());
    for scenario in selected {
        match driver.skip_unsupported_test(&scenario.pattern()) {
            Some(reason) => harness.skip(&scenario.name(), reason),
            None => runnable.push(scenario),
        }
    }

    stream::iter(runnable)
        .map(|scenario| {
            let harness = &harness;
            let framework = &framework;
            async move {
                harness
                    .run(&scenario.name(), || {
                        run_scenario(driver, framework, &scenario, ctx)
                    })
                    .await;
            }
        })
        .buffer_unordered(ctx.parallel.max(1))
        .collect::<Vec<()>>()
        .await;

    harness
}

/// One scenario in a namespace of its own.
///
/// The namespace is deleted on every exit path; a panic is re-raised after
/// that for the harness to record.
async fn run_scenario(
    driver: &dyn DynamicPvTestDriver,
    framework: &Framework,
    scenario: &Scenario,
    ctx: &TestContext,
) -> Result<()> {
    let namespace = framework.create_namespace().await?;
    let config = framework.volume_test_config(&namespace);
    let test = build_scenario_test(driver, scenario, &config.namespace, framework.client(), ctx);

    let outcome = AssertUnwindSafe(test_dynamic_provisioning(&test))
        .catch_unwind()
        .await;
    framework.delete_namespace(&namespace).await;
    match outcome {
        Ok(result) => result.map(|_| ()),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// Storage class, claim and settings of `scenario` in `namespace`.
pub fn build_scenario_test(
    driver: &dyn DynamicPvTestDriver,
    scenario: &Scenario,
    namespace: &str,
    client: Arc<dyn StorageClient>,
    ctx: &TestContext,
) -> StorageClassTest {
    let storage_class =
        driver.dynamic_provision_storage_class(scenario.parameters(), ctx.reclaim_policy, namespace);
    let class_name = storage_class.metadata.name.clone().unwrap_or_default();
    let claim = new_claim(&class_name, scenario.claim_size(), namespace);

    StorageClassTest {
        name: scenario.name(),
        storage_class,
        claim,
        skip_write_read_check: ctx.skip_write_read_check,
        busybox_image: ctx.busybox_image.clone(),
        timeouts: ctx.timeouts(),
        client,
    }
}

/// Render the storage class and claim of every selected scenario as
/// multi-document YAML, without contacting a cluster.
pub fn render_manifests(
    driver: &dyn DynamicPvTestDriver,
    namespace: &str,
    reclaim_policy: ReclaimPolicy,
    focus: Option<&str>,
    skip: Option<&str>,
) -> Result<String> {
    let mut out = String::new();
    for scenario in filter_scenarios(scenarios(), focus, skip) {
        let storage_class =
            driver.dynamic_provision_storage_class(scenario.parameters(), reclaim_policy, namespace);
        let class_name = storage_class.metadata.name.clone().unwrap_or_default();
        let claim = new_claim(&class_name, scenario.claim_size(), namespace);

        out.push_str(&format!("# {}\n", scenario.name()));
        out.push_str("---\n");
        out.push_str(&to_yaml(&storage_class)?);
        out.push_str("---\n");
        out.push_str(&to_yaml(&claim)?);
    }
    Ok(out)
}

fn to_yaml<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_yaml::to_string(value)
        .map_err(|e| Error::internal(format!("failed to render manifest: {e}")))
}
