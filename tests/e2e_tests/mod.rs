//! Tests against a live cluster running the EBS CSI driver
//!
//! # Test Organization
//!
//! - `dynamic_provisioning`: single scenarios of the provisioning workflow,
//!   the reclaim-policy variants, and claim deletion idempotence
//!
//! # Running These Tests
//!
//! ```bash
//! # one gp2/ext4 scenario (~2-3min)
//! cargo test --test e2e gp2_ext4 -- --ignored --nocapture
//!
//! # everything (~10min)
//! cargo test --test e2e -- --ignored --nocapture
//! ```

mod dynamic_provisioning;
mod helpers;
