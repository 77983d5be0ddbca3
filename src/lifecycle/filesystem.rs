use tracing::{info, warn};

use crate::api::LambdaApi;

use super::{LifecycleError, Orchestrator};

/// Conventional name of the per-region filesystem.
#[must_use]
pub fn filesystem_name(prefix: &str, region: &str) -> String {
    format!("{prefix}-{region}")
}

impl<A: LambdaApi> Orchestrator<A> {
    /// Returns the filesystem name for `region`, creating it when missing.
    pub(super) async fn ensure_filesystem(&self, region: &str) -> Result<String, LifecycleError> {
        let name = filesystem_name(&self.settings.filesystem_prefix, region);
        let existing = self
            .api
            .list_filesystems()
            .await
            .map_err(LifecycleError::api("list filesystems"))?;

        if existing
            .iter()
            .any(|filesystem| filesystem.name == name && filesystem.region == region)
        {
            info!(filesystem = %name, region, "using existing filesystem");
            return Ok(name);
        }

        info!(filesystem = %name, region, "creating filesystem");
        let created = self
            .api
            .create_filesystem(&name, region)
            .await
            .map_err(LifecycleError::api("create filesystem"))?;
        if created.name != name {
            warn!(
                requested = %name,
                returned = %created.name,
                "filesystem create response name differs; continuing with requested name"
            );
        }
        Ok(name)
    }
}
