//! Core library for the `lambda` GPU instance tool.
//!
//! The crate exposes an API seam over the Lambda Cloud REST endpoints, an
//! orchestrator that turns a `<count>x<type>` request into a running
//! instance (quota, type, region, filesystem, launch, then poll), and an SSH
//! bridge used to attach the local terminal to an instance or push files and
//! run a provisioning script on it.

pub mod api;
pub mod config;
pub mod instance;
pub mod lifecycle;
pub mod logging;
pub mod paths;
pub mod provision;
pub mod render;
pub mod spec;
pub mod ssh;
#[cfg(test)]
pub mod test_helpers;
pub mod test_support;

pub use api::{ApiError, HttpLambdaApi, Instance, InstanceStatus, LambdaApi};
pub use config::{ConfigError, ConfigOverrides, LambdaConfig};
pub use instance::{ResolveError, resolve_identifier};
pub use lifecycle::{
    CreateOutcome, CreateRequest, LifecycleError, LifecycleSettings, OperationOutcome,
    Orchestrator,
};
pub use logging::Verbosity;
pub use provision::{ProvisionError, SetupOptions, SetupPlan, SetupSettings, SetupWorkflow};
pub use render::OutputFormat;
pub use spec::{InstanceSpec, SpecError};
pub use ssh::{Connector, RemoteSession, RusshConnector, SshError, SshSettings};
