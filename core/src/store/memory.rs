//! In-memory storage implementation

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::*;
use crate::error::Error;

/// In-memory storage for development and testing
///
/// All tables sit behind one lock so that numbering, cascades and
/// conditional updates are atomic exactly like their SQL counterparts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    workflows: BTreeMap<WorkflowId, Workflow>,
    versions: BTreeMap<VersionId, WorkflowVersion>,
    executions: BTreeMap<ExecutionId, WorkflowExecution>,
    logs: BTreeMap<LogId, ExecutionLog>,
    sequence: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStorage for MemoryStore {
    async fn insert_workflow(&self, owner: UserId, workflow: NewWorkflow) -> Result<Workflow> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let record = Workflow {
            id: state.next_id(),
            name: workflow.name,
            description: workflow.description,
            creator_id: owner,
            created_at: now,
            updated_at: now,
        };
        state.workflows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>> {
        let state = self.state.read().await;
        Ok(state.workflows.get(&id).cloned())
    }

    async fn list_workflows(&self, owner: UserId) -> Result<Vec<Workflow>> {
        let state = self.state.read().await;
        Ok(state
            .workflows
            .values()
            .filter(|w| w.creator_id == owner)
            .cloned()
            .collect())
    }

    async fn update_workflow(
        &self,
        id: WorkflowId,
        changes: WorkflowChanges,
    ) -> Result<Option<Workflow>> {
        let mut state = self.state.write().await;
        let Some(workflow) = state.workflows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            workflow.name = name;
        }
        if let Some(description) = changes.description {
            workflow.description = description;
        }
        workflow.updated_at = Utc::now();
        Ok(Some(workflow.clone()))
    }

    async fn delete_workflow(&self, id: WorkflowId) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.workflows.remove(&id).is_none() {
            return Ok(false);
        }

        let version_ids: Vec<VersionId> = state
            .versions
            .values()
            .filter(|v| v.workflow_id == id)
            .map(|v| v.id)
            .collect();
        state.versions.retain(|_, v| v.workflow_id != id);

        let execution_ids: Vec<ExecutionId> = state
            .executions
            .values()
            .filter(|e| version_ids.contains(&e.version_id))
            .map(|e| e.id)
            .collect();
        state
            .executions
            .retain(|_, e| !version_ids.contains(&e.version_id));
        state
            .logs
            .retain(|_, l| !execution_ids.contains(&l.execution_id));

        Ok(true)
    }
}

#[async_trait]
impl VersionStorage for MemoryStore {
    async fn insert_next_version(
        &self,
        workflow_id: WorkflowId,
        definition: Definition,
        definition_hash: String,
    ) -> Result<WorkflowVersion> {
        let mut state = self.state.write().await;
        if !state.workflows.contains_key(&workflow_id) {
            return Err(Error::not_found(format!("workflow {}", workflow_id)));
        }

        let next = state
            .versions
            .values()
            .filter(|v| v.workflow_id == workflow_id)
            .map(|v| v.version)
            .max()
            .unwrap_or(0)
            + 1;

        let record = WorkflowVersion {
            id: state.next_id(),
            workflow_id,
            version: next,
            definition,
            definition_hash,
            status: VersionStatus::Draft,
            created_at: Utc::now(),
        };
        state.versions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_version(
        &self,
        workflow_id: WorkflowId,
        version: i32,
    ) -> Result<Option<WorkflowVersion>> {
        let state = self.state.read().await;
        Ok(state
            .versions
            .values()
            .find(|v| v.workflow_id == workflow_id && v.version == version)
            .cloned())
    }

    async fn get_version_by_id(&self, id: VersionId) -> Result<Option<WorkflowVersion>> {
        let state = self.state.read().await;
        Ok(state.versions.get(&id).cloned())
    }

    async fn list_versions(&self, workflow_id: WorkflowId) -> Result<Vec<VersionSummary>> {
        let state = self.state.read().await;
        let mut summaries: Vec<VersionSummary> = state
            .versions
            .values()
            .filter(|v| v.workflow_id == workflow_id)
            .map(WorkflowVersion::summary)
            .collect();
        summaries.sort_by_key(|s| s.version);
        Ok(summaries)
    }

    async fn update_version_status(
        &self,
        id: VersionId,
        to: VersionStatus,
        expected: Option<VersionStatus>,
    ) -> Result<StatusUpdate> {
        let mut state = self.state.write().await;
        let Some(version) = state.versions.get_mut(&id) else {
            return Ok(StatusUpdate::Missing);
        };
        if let Some(expected) = expected {
            if version.status != expected {
                return Ok(StatusUpdate::Rejected {
                    current: version.status,
                });
            }
        }
        version.status = to;
        Ok(StatusUpdate::Applied(version.clone()))
    }
}

#[async_trait]
impl ExecutionStorage for MemoryStore {
    async fn insert_execution(
        &self,
        version_id: VersionId,
        inputs: JsonValue,
    ) -> Result<Option<WorkflowExecution>> {
        let mut state = self.state.write().await;
        let published = state
            .versions
            .get(&version_id)
            .is_some_and(|v| v.status.is_executable());
        if !published {
            return Ok(None);
        }

        let record = WorkflowExecution {
            id: state.next_id(),
            version_id,
            status: ExecutionStatus::Running,
            inputs,
            started_at: Utc::now(),
            ended_at: None,
            result: None,
        };
        state.executions.insert(record.id, record.clone());
        Ok(Some(record))
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<WorkflowExecution>> {
        let state = self.state.read().await;
        Ok(state.executions.get(&id).cloned())
    }

    async fn list_executions(&self, version_id: VersionId) -> Result<Vec<WorkflowExecution>> {
        let state = self.state.read().await;
        let mut executions: Vec<WorkflowExecution> = state
            .executions
            .values()
            .filter(|e| e.version_id == version_id)
            .cloned()
            .collect();
        executions.sort_by_key(|e| (e.started_at, e.id));
        Ok(executions)
    }

    async fn finish_execution(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        result: Option<JsonValue>,
    ) -> Result<Option<WorkflowExecution>> {
        let mut state = self.state.write().await;
        let Some(execution) = state.executions.get_mut(&id) else {
            return Ok(None);
        };
        if execution.status.is_terminal() {
            return Ok(None);
        }
        execution.status = status;
        execution.result = result;
        execution.ended_at = Some(Utc::now());
        Ok(Some(execution.clone()))
    }

    async fn append_log(&self, entry: NewLogEntry) -> Result<ExecutionLog> {
        let mut state = self.state.write().await;
        if !state.executions.contains_key(&entry.execution_id) {
            return Err(Error::not_found(format!("execution {}", entry.execution_id)));
        }

        let last = state
            .logs
            .values()
            .filter(|l| l.execution_id == entry.execution_id)
            .map(|l| l.timestamp)
            .max();
        let now = Utc::now();
        let timestamp = match last {
            Some(previous) if now <= previous => previous + Duration::microseconds(1),
            _ => now,
        };

        let record = ExecutionLog {
            id: state.next_id(),
            execution_id: entry.execution_id,
            node_id: entry.node_id,
            message: entry.message,
            level: entry.level,
            timestamp,
        };
        state.logs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_logs(&self, execution_id: ExecutionId) -> Result<Vec<ExecutionLog>> {
        let state = self.state.read().await;
        let mut logs: Vec<ExecutionLog> = state
            .logs
            .values()
            .filter(|l| l.execution_id == execution_id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| (l.timestamp, l.id));
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    async fn store_with_workflow() -> (MemoryStore, Workflow) {
        let store = MemoryStore::new();
        let workflow = store
            .insert_workflow(
                1,
                NewWorkflow {
                    name: "Invoice Approval".to_string(),
                    description: String::new(),
                },
            )
            .await
            .unwrap();
        (store, workflow)
    }

    #[tokio::test]
    async fn test_numbering_starts_at_one_and_increments() {
        let (store, workflow) = store_with_workflow().await;

        for expected in 1..=3 {
            let version = store
                .insert_next_version(workflow.id, Definition::default(), "h".into())
                .await
                .unwrap();
            assert_eq!(version.version, expected);
            assert_eq!(version.status, VersionStatus::Draft);
        }
    }

    #[tokio::test]
    async fn test_numbering_is_per_workflow() {
        let (store, first) = store_with_workflow().await;
        let second = store
            .insert_workflow(1, NewWorkflow { name: "Other".into(), description: String::new() })
            .await
            .unwrap();

        store.insert_next_version(first.id, Definition::default(), "h".into()).await.unwrap();
        store.insert_next_version(first.id, Definition::default(), "h".into()).await.unwrap();
        let other = store
            .insert_next_version(second.id, Definition::default(), "h".into())
            .await
            .unwrap();

        assert_eq!(other.version, 1);
    }

    #[tokio::test]
    async fn test_insert_version_for_missing_workflow() {
        let store = MemoryStore::new();
        let err = store
            .insert_next_version(99, Definition::default(), "h".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_inserts_get_distinct_numbers() {
        let (store, workflow) = store_with_workflow().await;
        let store = Arc::new(store);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .insert_next_version(workflow.id, Definition::default(), "h".into())
                        .await
                        .unwrap()
                        .version
                })
            })
            .collect();

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap());
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=16).collect::<Vec<i32>>());
    }

    #[tokio::test]
    async fn test_conditional_status_update() {
        let (store, workflow) = store_with_workflow().await;
        let version = store
            .insert_next_version(workflow.id, Definition::default(), "h".into())
            .await
            .unwrap();

        let applied = store
            .update_version_status(version.id, VersionStatus::Published, Some(VersionStatus::Draft))
            .await
            .unwrap();
        assert!(matches!(applied, StatusUpdate::Applied(ref v) if v.status == VersionStatus::Published));

        let rejected = store
            .update_version_status(version.id, VersionStatus::Published, Some(VersionStatus::Draft))
            .await
            .unwrap();
        assert_eq!(
            rejected,
            StatusUpdate::Rejected { current: VersionStatus::Published }
        );

        let missing = store
            .update_version_status(12345, VersionStatus::Archived, None)
            .await
            .unwrap();
        assert_eq!(missing, StatusUpdate::Missing);
    }

    #[tokio::test]
    async fn test_execution_requires_published_version() {
        let (store, workflow) = store_with_workflow().await;
        let version = store
            .insert_next_version(workflow.id, Definition::default(), "h".into())
            .await
            .unwrap();

        assert!(store
            .insert_execution(version.id, json!({}))
            .await
            .unwrap()
            .is_none());

        store
            .update_version_status(version.id, VersionStatus::Published, None)
            .await
            .unwrap();
        let execution = store
            .insert_execution(version.id, json!({"amount": 10}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert_eq!(execution.inputs, json!({"amount": 10}));
        assert!(execution.ended_at.is_none());
    }

    #[tokio::test]
    async fn test_log_timestamps_strictly_increase() {
        let (store, workflow) = store_with_workflow().await;
        let version = store
            .insert_next_version(workflow.id, Definition::default(), "h".into())
            .await
            .unwrap();
        store
            .update_version_status(version.id, VersionStatus::Published, None)
            .await
            .unwrap();
        let execution = store
            .insert_execution(version.id, json!({}))
            .await
            .unwrap()
            .unwrap();

        for i in 0..50 {
            store
                .append_log(NewLogEntry {
                    execution_id: execution.id,
                    node_id: None,
                    message: format!("entry {}", i),
                    level: LogLevel::Info,
                })
                .await
                .unwrap();
        }

        let logs = store.list_logs(execution.id).await.unwrap();
        assert_eq!(logs.len(), 50);
        for pair in logs.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
        assert_eq!(logs[0].message, "entry 0");
        assert_eq!(logs[49].message, "entry 49");
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let (store, workflow) = store_with_workflow().await;
        let version = store
            .insert_next_version(workflow.id, Definition::default(), "h".into())
            .await
            .unwrap();
        store
            .update_version_status(version.id, VersionStatus::Published, None)
            .await
            .unwrap();
        let execution = store
            .insert_execution(version.id, json!({}))
            .await
            .unwrap()
            .unwrap();
        store
            .append_log(NewLogEntry {
                execution_id: execution.id,
                node_id: Some("node-1".into()),
                message: "started".into(),
                level: LogLevel::Info,
            })
            .await
            .unwrap();

        assert!(store.delete_workflow(workflow.id).await.unwrap());
        assert!(!store.delete_workflow(workflow.id).await.unwrap());
        assert!(store.get_version_by_id(version.id).await.unwrap().is_none());
        assert!(store.get_execution(execution.id).await.unwrap().is_none());
        assert!(store.list_logs(execution.id).await.unwrap().is_empty());
    }
}
