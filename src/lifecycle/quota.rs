use crate::api::{Instance, InstanceStatus};

/// Active instances whose GPU family matches `family`, ignoring case.
///
/// Non-active instances never count against the cap.
#[must_use]
pub fn matching_active<'a>(instances: &'a [Instance], family: &str) -> Vec<&'a Instance> {
    instances
        .iter()
        .filter(|instance| instance.status == InstanceStatus::Active)
        .filter(|instance| {
            instance
                .family()
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(family))
        })
        .collect()
}
