//! Persistence seam
//!
//! Services talk to storage only through these traits. `MemoryStore` backs
//! development and tests; `PgStore` is the production backend.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::definition::Definition;
use crate::error::Result;
use crate::types::*;

/// Combined storage trait
pub trait Store: WorkflowStorage + VersionStorage + ExecutionStorage + Send + Sync {}

impl<T> Store for T where T: WorkflowStorage + VersionStorage + ExecutionStorage + Send + Sync {}

/// Outcome of a conditional version status write
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Applied(WorkflowVersion),
    /// The version exists but its status did not match the expected source state
    Rejected { current: VersionStatus },
    Missing,
}

#[async_trait]
pub trait WorkflowStorage: Send + Sync {
    async fn insert_workflow(&self, owner: UserId, workflow: NewWorkflow) -> Result<Workflow>;

    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>>;

    /// Workflows created by `owner`, oldest first
    async fn list_workflows(&self, owner: UserId) -> Result<Vec<Workflow>>;

    async fn update_workflow(
        &self,
        id: WorkflowId,
        changes: WorkflowChanges,
    ) -> Result<Option<Workflow>>;

    /// Delete a workflow together with its versions, executions and logs
    async fn delete_workflow(&self, id: WorkflowId) -> Result<bool>;
}

#[async_trait]
pub trait VersionStorage: Send + Sync {
    /// Store `definition` as the next version of the workflow, status draft
    ///
    /// Numbering is `max(existing) + 1` (1 for the first) and must be atomic
    /// per workflow: concurrent callers never receive the same number.
    async fn insert_next_version(
        &self,
        workflow_id: WorkflowId,
        definition: Definition,
        definition_hash: String,
    ) -> Result<WorkflowVersion>;

    async fn get_version(
        &self,
        workflow_id: WorkflowId,
        version: i32,
    ) -> Result<Option<WorkflowVersion>>;

    async fn get_version_by_id(&self, id: VersionId) -> Result<Option<WorkflowVersion>>;

    /// Version summaries ordered by version number
    async fn list_versions(&self, workflow_id: WorkflowId) -> Result<Vec<VersionSummary>>;

    /// Set the status, optionally only when the current status equals `expected`
    async fn update_version_status(
        &self,
        id: VersionId,
        to: VersionStatus,
        expected: Option<VersionStatus>,
    ) -> Result<StatusUpdate>;
}

#[async_trait]
pub trait ExecutionStorage: Send + Sync {
    /// Create a running execution, only if the version is currently published
    ///
    /// Returns `None` when the version is missing or not published at the
    /// moment of the write.
    async fn insert_execution(
        &self,
        version_id: VersionId,
        inputs: JsonValue,
    ) -> Result<Option<WorkflowExecution>>;

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<WorkflowExecution>>;

    /// Executions of a version ordered by start time
    async fn list_executions(&self, version_id: VersionId) -> Result<Vec<WorkflowExecution>>;

    /// Move a non-terminal execution to a terminal status
    ///
    /// Returns `None` if the execution is missing or already terminal.
    async fn finish_execution(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        result: Option<JsonValue>,
    ) -> Result<Option<WorkflowExecution>>;

    /// Append a log entry whose timestamp is strictly after every earlier
    /// entry of the same execution
    async fn append_log(&self, entry: NewLogEntry) -> Result<ExecutionLog>;

    /// Logs of an execution ordered by timestamp
    async fn list_logs(&self, execution_id: ExecutionId) -> Result<Vec<ExecutionLog>>;
}
