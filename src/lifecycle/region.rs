use crate::api::InstanceTypeEntry;

use super::LifecycleError;

const US_REGION_PREFIX: &str = "us-";

/// Picks the launch region for `entry`.
///
/// Order is fixed: an explicit request (which must have capacity), then the
/// configured default, then the first `us-` region in catalog order.
///
/// # Errors
///
/// Returns [`LifecycleError::RegionUnavailable`] when the requested region
/// lacks capacity and [`LifecycleError::NoRegionAvailable`] when no fallback
/// applies.
pub fn select_region(
    entry: &InstanceTypeEntry,
    requested: Option<&str>,
    default_region: &str,
) -> Result<String, LifecycleError> {
    if let Some(region) = requested.map(str::trim).filter(|region| !region.is_empty()) {
        if entry.has_capacity_in(region) {
            return Ok(region.to_owned());
        }
        return Err(LifecycleError::RegionUnavailable {
            instance_type: entry.type_name.clone(),
            region: region.to_owned(),
            available: entry.regions_with_capacity.clone(),
        });
    }

    if entry.has_capacity_in(default_region) {
        return Ok(default_region.to_owned());
    }

    entry
        .regions_with_capacity
        .iter()
        .find(|region| region.starts_with(US_REGION_PREFIX))
        .cloned()
        .ok_or_else(|| LifecycleError::NoRegionAvailable {
            instance_type: entry.type_name.clone(),
            default_region: default_region.to_owned(),
            available: entry.regions_with_capacity.clone(),
        })
}
