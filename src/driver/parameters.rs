//! Per-volume-type provisioning parameters for EBS

/// Minimum claim size accepted by EBS for `volume_type`.
///
/// Throughput-optimised HDD types have a 500Gi floor and io1 needs enough
/// capacity to reach its minimum IOPS. Unknown types get the gp2 minimum.
pub fn size_for_volume_type(volume_type: &str) -> &'static str {
    match volume_type {
        "st1" | "sc1" => "500Gi",
        "io1" => "4Gi",
        "gp2" => "1Gi",
        _ => "1Gi",
    }
}

/// The `iopsPerGB` storage-class parameter for `volume_type`.
///
/// Only io1 requires one; every other type returns `None`.
pub fn iops_per_gb_for_volume_type(volume_type: &str) -> Option<&'static str> {
    match volume_type {
        "io1" => Some("3"),
        _ => None,
    }
}
