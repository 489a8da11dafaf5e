use tracing::debug;

use super::ExecutionLedger;
use crate::auth::Caller;
use crate::error::{Error, Result};
use crate::types::*;

impl ExecutionLedger {
    /// Append a log entry; entries of one execution never share a timestamp
    pub async fn append_log(
        &self,
        caller: &Caller,
        execution_id: ExecutionId,
        node_id: Option<String>,
        message: String,
        level: LogLevel,
    ) -> Result<ExecutionLog> {
        if message.trim().is_empty() {
            return Err(Error::Validation("log message must not be empty".to_string()));
        }
        self.gate.execution(caller, execution_id).await?;

        let entry = self
            .store
            .append_log(NewLogEntry {
                execution_id,
                node_id,
                message,
                level,
            })
            .await?;

        debug!(execution_id, log_id = entry.id, level = entry.level.as_str(), "log appended");
        Ok(entry)
    }

    /// All entries of an execution, oldest first
    pub async fn get_logs(
        &self,
        caller: &Caller,
        execution_id: ExecutionId,
    ) -> Result<Vec<ExecutionLog>> {
        self.gate.execution(caller, execution_id).await?;
        self.store.list_logs(execution_id).await
    }
}
