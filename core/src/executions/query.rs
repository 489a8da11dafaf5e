use super::ExecutionLedger;
use crate::auth::Caller;
use crate::error::Result;
use crate::types::*;

impl ExecutionLedger {
    pub async fn get(
        &self,
        caller: &Caller,
        execution_id: ExecutionId,
    ) -> Result<WorkflowExecution> {
        let (_, execution) = self.gate.execution(caller, execution_id).await?;
        Ok(execution)
    }

    /// Execution together with its workflow id and version number
    pub async fn detail(
        &self,
        caller: &Caller,
        execution_id: ExecutionId,
    ) -> Result<ExecutionDetail> {
        let (version, execution) = self.gate.execution(caller, execution_id).await?;
        Ok(ExecutionDetail {
            workflow_id: version.workflow_id,
            version: version.version,
            execution,
        })
    }

    /// Executions of one version in start order
    pub async fn list_for_version(
        &self,
        caller: &Caller,
        workflow_id: WorkflowId,
        version: i32,
    ) -> Result<Vec<WorkflowExecution>> {
        let (_, version) = self.gate.version(caller, workflow_id, version).await?;
        self.store.list_executions(version.id).await
    }
}
