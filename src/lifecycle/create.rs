use tracing::{info, warn};

use crate::api::{InstanceTypeEntry, LambdaApi, LaunchRequest};
use crate::spec::InstanceSpec;

use super::{CreateOutcome, CreateRequest, LifecycleError, Orchestrator, matching_active, select_region};

impl<A: LambdaApi> Orchestrator<A> {
    /// Creates an instance for `request` and waits until it is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when the instance specification is
    /// malformed, the type or a region cannot be resolved, an API call fails,
    /// the launch yields no ID, or the instance never becomes ready.
    pub async fn create(&self, request: &CreateRequest) -> Result<CreateOutcome, LifecycleError> {
        let spec = InstanceSpec::parse(&request.spec)?;
        let type_name = spec.instance_type_name();
        let instance_name = spec.instance_name(&request.name_prefix);
        info!(spec = %spec, instance_type = %type_name, name = %instance_name, "creating instance");

        let instances = self
            .api
            .list_instances()
            .await
            .map_err(LifecycleError::api("list instances"))?;
        let existing = matching_active(&instances, spec.family());
        if existing.len() >= request.max_per_type {
            warn!(
                family = spec.family(),
                active = existing.len(),
                limit = request.max_per_type,
                "instance quota reached; skipping launch"
            );
            return Ok(CreateOutcome::QuotaReached {
                family: spec.family().to_owned(),
                limit: request.max_per_type,
                existing: existing.into_iter().cloned().collect(),
            });
        }

        let entry = self.resolve_instance_type(&type_name).await?;
        let region = select_region(&entry, request.region.as_deref(), &self.settings.default_region)?;
        info!(instance_type = %type_name, region = %region, "resolved launch region");

        let filesystem = self.ensure_filesystem(&region).await?;

        let launch = LaunchRequest {
            region_name: region,
            instance_type_name: type_name,
            ssh_key_names: vec![self.settings.ssh_key_name.clone()],
            file_system_names: vec![filesystem.clone()],
            name: instance_name,
        };
        let instance_id = self.launch(&launch).await?;
        info!(instance_id = %instance_id, "launch accepted; waiting for instance");

        let instance = self.wait_until_ready(&instance_id).await?;
        Ok(CreateOutcome::Created {
            instance,
            filesystem,
        })
    }

    async fn resolve_instance_type(
        &self,
        type_name: &str,
    ) -> Result<InstanceTypeEntry, LifecycleError> {
        let catalog = self
            .api
            .list_instance_types()
            .await
            .map_err(LifecycleError::api("list instance types"))?;

        if let Some(entry) = catalog.iter().find(|entry| entry.type_name == type_name) {
            return Ok(entry.clone());
        }

        let mut available: Vec<&InstanceTypeEntry> = catalog
            .iter()
            .filter(|entry| !entry.regions_with_capacity.is_empty())
            .collect();
        available.sort_by(|lhs, rhs| lhs.type_name.cmp(&rhs.type_name));
        Err(LifecycleError::UnknownInstanceType {
            name: type_name.to_owned(),
            available: available
                .into_iter()
                .map(|entry| {
                    format!(
                        "{} ({})",
                        entry.type_name,
                        entry.regions_with_capacity.join(", ")
                    )
                })
                .collect(),
        })
    }

    async fn launch(&self, request: &LaunchRequest) -> Result<String, LifecycleError> {
        let ids = self
            .api
            .launch(request)
            .await
            .map_err(LifecycleError::api("launch instance"))?;
        ids.into_iter()
            .find(|id| !id.is_empty())
            .ok_or_else(|| LifecycleError::LaunchFailed {
                name: request.name.clone(),
            })
    }
}
