//! End-to-end dynamic provisioning tests for the AWS EBS CSI driver
//!
//! The suite drives a live cluster through the driver's dynamic provisioning
//! path: for every (volume type, filesystem type) pair it submits a storage
//! class and a claim, waits for the claim to bind, checks the volume the
//! driver created, optionally writes and reads data through a pod, and
//! removes everything again.
//!
//! # Modules
//!
//! - [`driver`] - Driver descriptor, capability checks and parameter lookups
//! - [`storage_class`] / [`claim`] - Manifest factories
//! - [`scenario`] - The (volume type, fsType) matrix and name filtering
//! - [`provisioning`] - The per-scenario provisioning workflow
//! - [`suite`] - Driver registration and the suite runner
//! - [`client`] - Cluster access seam and its kube-backed implementation
//! - [`wait`] / [`cleanup`] - Bounded polls and deferred teardown
//! - [`framework`] / [`harness`] - Scenario namespaces and result reporting
//! - [`config`] / [`telemetry`] - Flags and logging
//! - [`error`] - Error types for the suite

#![deny(missing_docs)]

use std::time::Duration;

pub mod claim;
pub mod cleanup;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod framework;
pub mod harness;
pub mod provisioning;
pub mod quantity;
pub mod retry;
pub mod scenario;
pub mod storage_class;
pub mod suite;
pub mod telemetry;
pub mod wait;

pub use error::Error;

/// Result type for suite operations
pub type Result<T> = std::result::Result<T, Error>;

/// Interval between claim and pod polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How long a claim may take to bind
pub const CLAIM_PROVISION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How long the write/read pod may take to complete
pub const SLOW_POD_START_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Interval between polls for a released volume
pub const VOLUME_DELETE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How long a released volume may take to be deleted
pub const VOLUME_DELETE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Image for the write/read pod
pub const DEFAULT_BUSYBOX_IMAGE: &str = "docker.io/library/busybox:1.36";
