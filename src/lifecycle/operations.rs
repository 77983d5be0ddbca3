use std::fmt;

use tracing::info;

use crate::api::{Instance, LambdaApi};
use crate::instance::resolve_identifier;

use super::{LifecycleError, Orchestrator};

/// Instance-level operations that go through identifier resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceAction {
    /// Terminate (delete) the instance.
    Terminate,
    /// Reboot the instance.
    Restart,
}

impl InstanceAction {
    /// Lowercase verb used in messages and JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Terminate => "terminate",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for InstanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confirmed result of a terminate or restart request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationOutcome {
    /// Instance the operation targeted.
    pub instance: Instance,
    /// Operation performed.
    pub action: InstanceAction,
}

impl<A: LambdaApi> Orchestrator<A> {
    /// Lists every instance on the account.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Api`] when the list call fails.
    pub async fn list(&self) -> Result<Vec<Instance>, LifecycleError> {
        self.api
            .list_instances()
            .await
            .map_err(LifecycleError::api("list instances"))
    }

    /// Resolves `identifier` to a single instance.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] or [`LifecycleError::Ambiguous`]
    /// when resolution fails, or [`LifecycleError::Api`] when listing fails.
    pub async fn resolve(&self, identifier: &str) -> Result<Instance, LifecycleError> {
        let instances = self.list().await?;
        Ok(resolve_identifier(&instances, identifier)?.clone())
    }

    /// Resolves `identifier` and requires the instance to be reachable.
    ///
    /// # Errors
    ///
    /// As [`Self::resolve`], plus [`LifecycleError::NotReady`] when the
    /// instance is not active or has no usable IP.
    pub async fn resolve_ready(&self, identifier: &str) -> Result<Instance, LifecycleError> {
        let instance = self.resolve(identifier).await?;
        if instance.is_ready() {
            Ok(instance)
        } else {
            Err(LifecycleError::NotReady {
                identifier: identifier.to_owned(),
                status: instance.status,
            })
        }
    }

    /// Terminates the instance named by `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when resolution fails, the API call fails,
    /// or the response does not list the instance.
    pub async fn terminate(&self, identifier: &str) -> Result<OperationOutcome, LifecycleError> {
        self.apply(InstanceAction::Terminate, identifier).await
    }

    /// Restarts the instance named by `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when resolution fails, the API call fails,
    /// or the response does not list the instance.
    pub async fn restart(&self, identifier: &str) -> Result<OperationOutcome, LifecycleError> {
        self.apply(InstanceAction::Restart, identifier).await
    }

    async fn apply(
        &self,
        action: InstanceAction,
        identifier: &str,
    ) -> Result<OperationOutcome, LifecycleError> {
        let instance = self.resolve(identifier).await?;
        let ids = vec![instance.id.clone()];
        info!(action = %action, instance_id = %instance.id, name = %instance.name, "submitting operation");

        let affected = match action {
            InstanceAction::Terminate => self
                .api
                .terminate(&ids)
                .await
                .map_err(LifecycleError::api("terminate instance"))?,
            InstanceAction::Restart => self
                .api
                .restart(&ids)
                .await
                .map_err(LifecycleError::api("restart instance"))?,
        };

        if !affected.iter().any(|id| *id == instance.id) {
            return Err(LifecycleError::OperationNotConfirmed {
                action: action.as_str().to_owned(),
                instance_id: instance.id,
            });
        }
        Ok(OperationOutcome { instance, action })
    }
}
