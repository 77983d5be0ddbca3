//! Gateway to the Lambda Cloud REST API.
//!
//! [`LambdaApi`] is the seam the orchestrator depends on; [`HttpLambdaApi`]
//! is the production implementation and `test_support::ScriptedApi` the
//! scripted one.

mod client;
mod error;
mod types;

use std::future::Future;
use std::pin::Pin;

pub use client::{DEFAULT_API_URL, HttpLambdaApi};
pub use error::ApiError;
pub use types::{
    Filesystem, Instance, InstanceStatus, InstanceTypeEntry, LaunchRequest,
};

/// Future returned by API operations.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Operations the tool needs from the cloud provider.
pub trait LambdaApi: Send + Sync {
    /// Lists every instance visible to the account.
    fn list_instances(&self) -> ApiFuture<'_, Vec<Instance>>;

    /// Fetches the instance type catalog with per-region capacity.
    fn list_instance_types(&self) -> ApiFuture<'_, Vec<InstanceTypeEntry>>;

    /// Lists persistent filesystems.
    fn list_filesystems(&self) -> ApiFuture<'_, Vec<Filesystem>>;

    /// Creates a filesystem named `name` in `region`.
    fn create_filesystem<'a>(&'a self, name: &'a str, region: &'a str)
    -> ApiFuture<'a, Filesystem>;

    /// Submits a launch request and returns the new instance IDs.
    fn launch<'a>(&'a self, request: &'a LaunchRequest) -> ApiFuture<'a, Vec<String>>;

    /// Terminates instances, returning the IDs the provider acknowledged.
    fn terminate<'a>(&'a self, instance_ids: &'a [String]) -> ApiFuture<'a, Vec<String>>;

    /// Restarts instances, returning the IDs the provider acknowledged.
    fn restart<'a>(&'a self, instance_ids: &'a [String]) -> ApiFuture<'a, Vec<String>>;
}
