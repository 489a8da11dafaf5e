use serde_json::Value as JsonValue;
use tracing::info;

use super::ExecutionLedger;
use crate::auth::Caller;
use crate::error::{Error, Result};
use crate::types::*;

impl ExecutionLedger {
    /// Start a running execution of a published version
    ///
    /// `inputs` is stored verbatim (`{}` when absent). There is no
    /// de-duplication: every call records a new execution.
    pub async fn start_execution(
        &self,
        caller: &Caller,
        workflow_id: WorkflowId,
        version: i32,
        inputs: Option<JsonValue>,
    ) -> Result<WorkflowExecution> {
        let (_, target) = self.gate.version(caller, workflow_id, version).await?;
        if !target.status.is_executable() {
            return Err(not_published(target.status));
        }

        let inputs = inputs.unwrap_or_else(|| JsonValue::Object(Default::default()));

        // The store re-checks the status in the same write; an archive that
        // landed after the read above is reported the same way
        let execution = match self.store.insert_execution(target.id, inputs).await? {
            Some(execution) => execution,
            None => {
                let status = self
                    .store
                    .get_version_by_id(target.id)
                    .await?
                    .map(|v| v.status)
                    .ok_or_else(|| Error::not_found(format!("version {}", target.id)))?;
                return Err(not_published(status));
            }
        };

        info!(
            workflow_id,
            version,
            execution_id = execution.id,
            "execution started"
        );
        Ok(execution)
    }
}

fn not_published(status: VersionStatus) -> Error {
    Error::StateConflict(format!("version not published (status is {})", status))
}
