//! Instance lifecycle orchestration on top of [`LambdaApi`].
//!
//! `create` runs a fixed pipeline: quota check, type lookup, region choice,
//! filesystem ensure, launch, then poll until the instance is reachable.
//! Every step depends on the previous one, so nothing runs concurrently.

mod create;
mod error;
mod filesystem;
mod operations;
mod quota;
mod region;
mod wait;

use std::time::Duration;

use crate::api::{Instance, LambdaApi};

pub use error::LifecycleError;
pub use filesystem::filesystem_name;
pub use operations::{InstanceAction, OperationOutcome};
pub use quota::matching_active;
pub use region::select_region;

/// Default spacing between readiness checks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Default readiness check budget (twenty minutes at the default interval).
pub const MAX_POLL_ATTEMPTS: u32 = 40;
/// Default cap on active instances of one GPU family.
pub const DEFAULT_MAX_PER_TYPE: usize = 2;
/// Default instance name prefix.
pub const DEFAULT_NAME_PREFIX: &str = "generic";

/// Account-level settings the orchestrator needs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LifecycleSettings {
    /// Region tried after an explicit request and before any `us-` region.
    pub default_region: String,
    /// Prefix for the per-region filesystem name.
    pub filesystem_prefix: String,
    /// SSH key registered with the provider, installed on new instances.
    pub ssh_key_name: String,
}

/// Arguments to [`Orchestrator::create`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateRequest {
    /// Raw `<count>x<type>` argument.
    pub spec: String,
    /// Region requested on the command line.
    pub region: Option<String>,
    /// Instance name prefix.
    pub name_prefix: String,
    /// Maximum active instances of the same GPU family.
    pub max_per_type: usize,
}

impl CreateRequest {
    /// Builds a request with the default prefix and quota.
    #[must_use]
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            region: None,
            name_prefix: DEFAULT_NAME_PREFIX.to_owned(),
            max_per_type: DEFAULT_MAX_PER_TYPE,
        }
    }

    /// Requests a specific region.
    #[must_use]
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// Overrides the instance name prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Overrides the per-family quota.
    #[must_use]
    pub const fn with_max_per_type(mut self, max_per_type: usize) -> Self {
        self.max_per_type = max_per_type;
        self
    }
}

/// Result of a create call that did not fail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CreateOutcome {
    /// The instance is active and reachable.
    Created {
        /// Instance as last observed while polling.
        instance: Instance,
        /// Filesystem attached at launch.
        filesystem: String,
    },
    /// Launch skipped because the family already has enough active instances.
    QuotaReached {
        /// GPU family that hit the cap.
        family: String,
        /// Configured cap.
        limit: usize,
        /// Active instances counted against the cap.
        existing: Vec<Instance>,
    },
}

/// Drives create, delete, restart, and lookup flows against an API.
#[derive(Clone, Debug)]
pub struct Orchestrator<A> {
    api: A,
    settings: LifecycleSettings,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl<A: LambdaApi> Orchestrator<A> {
    /// Creates an orchestrator with the default polling budget.
    #[must_use]
    pub const fn new(api: A, settings: LifecycleSettings) -> Self {
        Self {
            api,
            settings,
            poll_interval: POLL_INTERVAL,
            max_poll_attempts: MAX_POLL_ATTEMPTS,
        }
    }

    /// Overrides the spacing between readiness checks.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the number of readiness checks.
    #[must_use]
    pub const fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    /// API the orchestrator talks to.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests;
