//! Global test-context flags
//!
//! Every flag has an environment fallback so CI can configure a run without
//! touching the command line. Resolution order (highest first):
//! 1. Command-line flag
//! 2. `EBS_E2E_*` environment variable (`KUBECONFIG` for the kubeconfig)
//! 3. Built-in default

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::storage_class::ReclaimPolicy;
use crate::wait::PollConfig;
use crate::{
    Error, Result, CLAIM_PROVISION_TIMEOUT, DEFAULT_BUSYBOX_IMAGE, DEFAULT_POLL_INTERVAL,
    SLOW_POD_START_TIMEOUT, VOLUME_DELETE_POLL_INTERVAL, VOLUME_DELETE_TIMEOUT,
};

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Flags shared by every suite run.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct TestContext {
    /// Path to the kubeconfig of the cluster under test
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Only run scenarios whose name contains this string
    #[arg(long, env = "EBS_E2E_FOCUS")]
    pub focus: Option<String>,

    /// Skip scenarios whose name contains this string
    #[arg(long, env = "EBS_E2E_SKIP")]
    pub skip: Option<String>,

    /// Maximum number of scenarios running at once
    #[arg(long, env = "EBS_E2E_PARALLEL", default_value_t = 1)]
    pub parallel: usize,

    /// Reclaim policy of every generated storage class (Delete or Retain)
    #[arg(long, env = "EBS_E2E_RECLAIM_POLICY", default_value_t = ReclaimPolicy::Delete)]
    pub reclaim_policy: ReclaimPolicy,

    /// Skip the pod write/read check in every scenario
    #[arg(long, env = "EBS_E2E_SKIP_WRITE_READ_CHECK")]
    pub skip_write_read_check: bool,

    /// Image for the write/read check pod
    #[arg(long, env = "EBS_E2E_BUSYBOX_IMAGE", default_value = DEFAULT_BUSYBOX_IMAGE)]
    pub busybox_image: String,

    /// Seconds to wait for a claim to be bound
    #[arg(long, env = "EBS_E2E_CLAIM_PROVISION_TIMEOUT", default_value_t = CLAIM_PROVISION_TIMEOUT.as_secs())]
    pub claim_provision_timeout: u64,

    /// Seconds to wait for the write/read pod to complete
    #[arg(long, env = "EBS_E2E_POD_START_TIMEOUT", default_value_t = SLOW_POD_START_TIMEOUT.as_secs())]
    pub pod_start_timeout: u64,

    /// Seconds to wait for a released volume to be deleted
    #[arg(long, env = "EBS_E2E_VOLUME_DELETE_TIMEOUT", default_value_t = VOLUME_DELETE_TIMEOUT.as_secs())]
    pub volume_delete_timeout: u64,

    /// Seconds between claim and pod polls
    #[arg(long, env = "EBS_E2E_POLL_INTERVAL", default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    pub poll_interval: u64,

    /// Seconds between volume deletion polls
    #[arg(long, env = "EBS_E2E_VOLUME_DELETE_POLL_INTERVAL", default_value_t = VOLUME_DELETE_POLL_INTERVAL.as_secs())]
    pub volume_delete_poll_interval: u64,

    /// Leave scenario namespaces behind for debugging
    #[arg(long, env = "EBS_E2E_KEEP_NAMESPACES")]
    pub keep_namespaces: bool,

    /// Log output format
    #[arg(long, env = "EBS_E2E_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Default for TestContext {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            focus: None,
            skip: None,
            parallel: 1,
            reclaim_policy: ReclaimPolicy::Delete,
            skip_write_read_check: false,
            busybox_image: DEFAULT_BUSYBOX_IMAGE.to_string(),
            claim_provision_timeout: CLAIM_PROVISION_TIMEOUT.as_secs(),
            pod_start_timeout: SLOW_POD_START_TIMEOUT.as_secs(),
            volume_delete_timeout: VOLUME_DELETE_TIMEOUT.as_secs(),
            poll_interval: DEFAULT_POLL_INTERVAL.as_secs(),
            volume_delete_poll_interval: VOLUME_DELETE_POLL_INTERVAL.as_secs(),
            keep_namespaces: false,
            log_format: LogFormat::Text,
        }
    }
}

impl TestContext {
    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.parallel == 0 {
            return Err(Error::config("--parallel must be at least 1"));
        }
        if self.busybox_image.trim().is_empty() {
            return Err(Error::config("--busybox-image must not be empty"));
        }
        let intervals = [
            ("--poll-interval", self.poll_interval),
            ("--volume-delete-poll-interval", self.volume_delete_poll_interval),
        ];
        for (flag, value) in intervals {
            if value == 0 {
                return Err(Error::config(format!("{flag} must be at least 1 second")));
            }
        }
        Ok(())
    }

    /// Poll bounds derived from the flags
    pub fn timeouts(&self) -> Timeouts {
        let poll = Duration::from_secs(self.poll_interval);
        Timeouts {
            claim_provision: PollConfig::new(poll, Duration::from_secs(self.claim_provision_timeout)),
            pod_start_slow: PollConfig::new(poll, Duration::from_secs(self.pod_start_timeout)),
            volume_delete: PollConfig::new(
                Duration::from_secs(self.volume_delete_poll_interval),
                Duration::from_secs(self.volume_delete_timeout),
            ),
        }
    }
}

/// Poll bounds for the waits of one provisioning run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Claim reaching `Bound`
    pub claim_provision: PollConfig,
    /// Write/read pod reaching `Succeeded`
    pub pod_start_slow: PollConfig,
    /// Released volume disappearing
    pub volume_delete: PollConfig,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            claim_provision: PollConfig::new(DEFAULT_POLL_INTERVAL, CLAIM_PROVISION_TIMEOUT),
            pod_start_slow: PollConfig::new(DEFAULT_POLL_INTERVAL, SLOW_POD_START_TIMEOUT),
            volume_delete: PollConfig::new(VOLUME_DELETE_POLL_INTERVAL, VOLUME_DELETE_TIMEOUT),
        }
    }
}
