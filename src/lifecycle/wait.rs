use tokio::time::sleep;
use tracing::{info, warn};

use crate::api::{Instance, LambdaApi};

use super::{LifecycleError, Orchestrator};

impl<A: LambdaApi> Orchestrator<A> {
    /// Polls until `instance_id` is active with a usable IP.
    ///
    /// A failed list call or an instance missing from the listing uses up
    /// the attempt; a terminated or failed status ends the wait at once.
    pub(super) async fn wait_until_ready(
        &self,
        instance_id: &str,
    ) -> Result<Instance, LifecycleError> {
        for attempt in 1..=self.max_poll_attempts {
            sleep(self.poll_interval).await;

            let instances = match self.api.list_instances().await {
                Ok(instances) => instances,
                Err(err) => {
                    warn!(instance_id, attempt, error = %err, "status check failed");
                    continue;
                }
            };

            let Some(instance) = instances.into_iter().find(|item| item.id == instance_id) else {
                info!(
                    instance_id,
                    attempt,
                    max_attempts = self.max_poll_attempts,
                    "instance not listed yet"
                );
                continue;
            };

            if instance.is_ready() {
                info!(instance_id, ip = instance.usable_ip(), "instance is ready");
                return Ok(instance);
            }
            if instance.status.is_terminal_failure() {
                return Err(LifecycleError::TerminalState {
                    instance_id: instance_id.to_owned(),
                    status: instance.status,
                });
            }
            info!(
                instance_id,
                attempt,
                max_attempts = self.max_poll_attempts,
                status = %instance.status,
                "waiting for instance"
            );
        }

        Err(LifecycleError::PollTimeout {
            instance_id: instance_id.to_owned(),
            attempts: self.max_poll_attempts,
        })
    }
}
