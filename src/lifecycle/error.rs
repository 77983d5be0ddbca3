//! Error types for the instance lifecycle orchestrator.

use thiserror::Error;

use crate::api::{ApiError, InstanceStatus};
use crate::instance::ResolveError;
use crate::spec::SpecError;

/// Errors raised while creating or operating on instances.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LifecycleError {
    /// Raised when the `<count>x<type>` argument is malformed.
    #[error(transparent)]
    InvalidSpec(#[from] SpecError),
    /// Raised when the catalog has no entry for the requested type.
    #[error("instance type '{name}' not found; available types:{}", bullet_list(.available))]
    UnknownInstanceType {
        /// Provider type name derived from the request.
        name: String,
        /// Types with capacity somewhere, each with its regions.
        available: Vec<String>,
    },
    /// Raised when the requested region has no capacity for the type.
    #[error(
        "region '{region}' has no capacity for {instance_type}; available regions: {}",
        list_or_none(.available)
    )]
    RegionUnavailable {
        /// Provider type name.
        instance_type: String,
        /// Region the caller asked for.
        region: String,
        /// Regions that do have capacity.
        available: Vec<String>,
    },
    /// Raised when neither the default region nor any `us-` region has
    /// capacity.
    #[error(
        "no suitable region for {instance_type} (default {default_region} and no us- region \
         has capacity); available regions: {}",
        list_or_none(.available)
    )]
    NoRegionAvailable {
        /// Provider type name.
        instance_type: String,
        /// Configured default region.
        default_region: String,
        /// Regions that have capacity.
        available: Vec<String>,
    },
    /// Raised when the launch response carries no instance ID.
    #[error("launch of '{name}' returned no instance ID")]
    LaunchFailed {
        /// Instance name submitted with the launch.
        name: String,
    },
    /// Raised when the instance fails or terminates while being polled.
    #[error("instance {instance_id} entered {status} state while provisioning")]
    TerminalState {
        /// Provider instance identifier.
        instance_id: String,
        /// Status reported by the provider.
        status: InstanceStatus,
    },
    /// Raised when polling exhausts its attempt budget.
    #[error(
        "instance {instance_id} not ready after {attempts} checks; it may still come up, \
         check with `lambda list`"
    )]
    PollTimeout {
        /// Provider instance identifier.
        instance_id: String,
        /// Number of polling attempts made.
        attempts: u32,
    },
    /// Raised when no instance matches the identifier.
    #[error("no instance found with ID or name '{identifier}'")]
    NotFound {
        /// Identifier passed by the caller.
        identifier: String,
    },
    /// Raised when a name matches several instances.
    #[error(
        "name '{identifier}' matches multiple instances ({}); use the instance ID instead",
        .matches.join(", ")
    )]
    Ambiguous {
        /// Identifier passed by the caller.
        identifier: String,
        /// IDs of the matching instances.
        matches: Vec<String>,
    },
    /// Raised when the provider does not list the target as affected.
    #[error("{action} of instance {instance_id} was not confirmed by the API")]
    OperationNotConfirmed {
        /// Operation name (`terminate` or `restart`).
        action: String,
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when connect or setup targets an instance that is not usable.
    #[error("instance '{identifier}' is not ready (status {status}, no usable IP yet)")]
    NotReady {
        /// Identifier passed by the caller.
        identifier: String,
        /// Status reported by the provider.
        status: InstanceStatus,
    },
    /// Wrapper for API failures with the step that issued the call.
    #[error("failed to {operation}: {source}")]
    Api {
        /// Step being performed (for example `list instances`).
        operation: String,
        /// Underlying API error.
        #[source]
        source: ApiError,
    },
}

impl LifecycleError {
    pub(crate) fn api(operation: &str) -> impl FnOnce(ApiError) -> Self + '_ {
        move |source| Self::Api {
            operation: operation.to_owned(),
            source,
        }
    }
}

impl From<ResolveError> for LifecycleError {
    fn from(value: ResolveError) -> Self {
        match value {
            ResolveError::NotFound { identifier } => Self::NotFound { identifier },
            ResolveError::Ambiguous {
                identifier,
                matches,
            } => Self::Ambiguous {
                identifier,
                matches,
            },
        }
    }
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return " none".to_owned();
    }
    items.iter().map(|item| format!("\n  {item}")).collect()
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_owned()
    } else {
        items.join(", ")
    }
}
