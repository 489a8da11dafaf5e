use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use crate::definition::Definition;

pub type UserId = i64;
pub type WorkflowId = i64;
pub type VersionId = i64;
pub type ExecutionId = i64;
pub type LogId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Draft,
    Published,
    Archived,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Draft => "draft",
            VersionStatus::Published => "published",
            VersionStatus::Archived => "archived",
        }
    }

    /// Only published versions accept new executions
    pub fn is_executable(&self) -> bool {
        matches!(self, VersionStatus::Published)
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Partial update of a workflow's descriptive fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl WorkflowChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// Workflow together with the summaries of all of its versions
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowDetail {
    #[serde(flatten)]
    pub workflow: Workflow,
    pub versions: Vec<VersionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowVersion {
    pub id: VersionId,
    pub workflow_id: WorkflowId,
    pub version: i32,
    pub definition: Definition,
    pub definition_hash: String,
    pub status: VersionStatus,
    pub created_at: DateTime<Utc>,
}

impl WorkflowVersion {
    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            id: self.id,
            version: self.version,
            status: self.status,
            definition_hash: self.definition_hash.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionSummary {
    pub id: VersionId,
    pub version: i32,
    pub status: VersionStatus,
    pub definition_hash: String,
    pub created_at: DateTime<Utc>,
}

/// One node of a version's definition, with its successors resolved from the edges
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowNode {
    pub version_id: VersionId,
    pub id: String,
    pub node_type: String,
    pub config: JsonValue,
    pub position: crate::definition::Position,
    pub next_nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub version_id: VersionId,
    pub status: ExecutionStatus,
    pub inputs: JsonValue,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<JsonValue>,
}

/// Execution as reported to clients, with the owning workflow and version number
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionDetail {
    pub workflow_id: WorkflowId,
    pub version: i32,
    #[serde(flatten)]
    pub execution: WorkflowExecution,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionLog {
    pub id: LogId,
    pub execution_id: ExecutionId,
    pub node_id: Option<String>,
    pub message: String,
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub execution_id: ExecutionId,
    pub node_id: Option<String>,
    pub message: String,
    pub level: LogLevel,
}
