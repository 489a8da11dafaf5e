use serde_json::Value as JsonValue;
use tracing::info;

use super::ExecutionLedger;
use crate::auth::Caller;
use crate::error::{Error, Result};
use crate::types::*;

impl ExecutionLedger {
    /// Move an execution to `completed` or `failed` and stamp `ended_at`
    pub async fn finish(
        &self,
        caller: &Caller,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        result: Option<JsonValue>,
    ) -> Result<WorkflowExecution> {
        if !status.is_terminal() {
            return Err(Error::Validation(format!(
                "finish status must be completed or failed, got {}",
                status
            )));
        }

        let (_, current) = self.gate.execution(caller, execution_id).await?;
        if current.status.is_terminal() {
            return Err(already_finished(current.status));
        }

        match self.store.finish_execution(execution_id, status, result).await? {
            Some(finished) => {
                info!(execution_id, status = %finished.status, "execution finished");
                Ok(finished)
            }
            // Someone else finished it between the read and the write
            None => {
                let status = self
                    .store
                    .get_execution(execution_id)
                    .await?
                    .map(|e| e.status)
                    .ok_or_else(|| Error::not_found(format!("execution {}", execution_id)))?;
                Err(already_finished(status))
            }
        }
    }
}

fn already_finished(status: ExecutionStatus) -> Error {
    Error::StateConflict(format!("execution already {}", status))
}
