//! Immutable, numbered snapshots of a workflow's definition

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::{AccessGate, Caller};
use crate::definition::Definition;
use crate::error::Result;
use crate::store::Store;
use crate::types::*;

#[derive(Clone)]
pub struct VersionStore {
    store: Arc<dyn Store>,
    gate: AccessGate,
}

impl VersionStore {
    pub fn new(store: Arc<dyn Store>, gate: AccessGate) -> Self {
        Self { store, gate }
    }

    /// Store `definition` as the next draft version of the workflow
    pub async fn create_version(
        &self,
        caller: &Caller,
        workflow_id: WorkflowId,
        definition: Definition,
    ) -> Result<WorkflowVersion> {
        self.gate.workflow(caller, workflow_id).await?;
        self.insert_draft(workflow_id, definition).await
    }

    /// Same as [`create_version`](Self::create_version) for a raw JSON document
    pub async fn create_version_from_value(
        &self,
        caller: &Caller,
        workflow_id: WorkflowId,
        definition: JsonValue,
    ) -> Result<WorkflowVersion> {
        self.gate.workflow(caller, workflow_id).await?;
        let definition = Definition::from_value(definition)?;
        self.insert_draft(workflow_id, definition).await
    }

    /// Caller must already have passed the gate for `workflow_id`
    async fn insert_draft(
        &self,
        workflow_id: WorkflowId,
        definition: Definition,
    ) -> Result<WorkflowVersion> {
        let hash = definition.content_hash();
        let version = self
            .store
            .insert_next_version(workflow_id, definition, hash)
            .await?;

        info!(
            workflow_id,
            version = version.version,
            version_id = version.id,
            "version created"
        );
        Ok(version)
    }

    pub async fn get(
        &self,
        caller: &Caller,
        workflow_id: WorkflowId,
        version: i32,
    ) -> Result<WorkflowVersion> {
        let (_, version) = self.gate.version(caller, workflow_id, version).await?;
        Ok(version)
    }

    /// Summaries in version order
    pub async fn list(&self, caller: &Caller, workflow_id: WorkflowId) -> Result<Vec<VersionSummary>> {
        self.gate.workflow(caller, workflow_id).await?;
        let versions = self.store.list_versions(workflow_id).await?;
        debug!(workflow_id, count = versions.len(), "versions listed");
        Ok(versions)
    }

    /// Per-node view of a stored definition
    pub async fn nodes(
        &self,
        caller: &Caller,
        workflow_id: WorkflowId,
        version: i32,
    ) -> Result<Vec<WorkflowNode>> {
        let version = self.get(caller, workflow_id, version).await?;
        Ok(version.definition.decompose(version.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::{
        ExecutionStorage, MemoryStore, StatusUpdate, VersionStorage, WorkflowStorage,
    };
    use crate::workflows::WorkflowService;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory store that counts workflow lookups
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        workflow_lookups: AtomicUsize,
    }

    #[async_trait]
    impl WorkflowStorage for CountingStore {
        async fn insert_workflow(&self, owner: UserId, workflow: NewWorkflow) -> Result<Workflow> {
            self.inner.insert_workflow(owner, workflow).await
        }

        async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>> {
            self.workflow_lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.get_workflow(id).await
        }

        async fn list_workflows(&self, owner: UserId) -> Result<Vec<Workflow>> {
            self.inner.list_workflows(owner).await
        }

        async fn update_workflow(
            &self,
            id: WorkflowId,
            changes: WorkflowChanges,
        ) -> Result<Option<Workflow>> {
            self.inner.update_workflow(id, changes).await
        }

        async fn delete_workflow(&self, id: WorkflowId) -> Result<bool> {
            self.inner.delete_workflow(id).await
        }
    }

    #[async_trait]
    impl VersionStorage for CountingStore {
        async fn insert_next_version(
            &self,
            workflow_id: WorkflowId,
            definition: Definition,
            definition_hash: String,
        ) -> Result<WorkflowVersion> {
            self.inner
                .insert_next_version(workflow_id, definition, definition_hash)
                .await
        }

        async fn get_version(
            &self,
            workflow_id: WorkflowId,
            version: i32,
        ) -> Result<Option<WorkflowVersion>> {
            self.inner.get_version(workflow_id, version).await
        }

        async fn get_version_by_id(&self, id: VersionId) -> Result<Option<WorkflowVersion>> {
            self.inner.get_version_by_id(id).await
        }

        async fn list_versions(&self, workflow_id: WorkflowId) -> Result<Vec<VersionSummary>> {
            self.inner.list_versions(workflow_id).await
        }

        async fn update_version_status(
            &self,
            id: VersionId,
            to: VersionStatus,
            expected: Option<VersionStatus>,
        ) -> Result<StatusUpdate> {
            self.inner.update_version_status(id, to, expected).await
        }
    }

    #[async_trait]
    impl ExecutionStorage for CountingStore {
        async fn insert_execution(
            &self,
            version_id: VersionId,
            inputs: JsonValue,
        ) -> Result<Option<WorkflowExecution>> {
            self.inner.insert_execution(version_id, inputs).await
        }

        async fn get_execution(&self, id: ExecutionId) -> Result<Option<WorkflowExecution>> {
            self.inner.get_execution(id).await
        }

        async fn list_executions(&self, version_id: VersionId) -> Result<Vec<WorkflowExecution>> {
            self.inner.list_executions(version_id).await
        }

        async fn finish_execution(
            &self,
            id: ExecutionId,
            status: ExecutionStatus,
            result: Option<JsonValue>,
        ) -> Result<Option<WorkflowExecution>> {
            self.inner.finish_execution(id, status, result).await
        }

        async fn append_log(&self, entry: NewLogEntry) -> Result<ExecutionLog> {
            self.inner.append_log(entry).await
        }

        async fn list_logs(&self, execution_id: ExecutionId) -> Result<Vec<ExecutionLog>> {
            self.inner.list_logs(execution_id).await
        }
    }

    struct Fixture {
        versions: VersionStore,
        workflow_id: WorkflowId,
        owner: Caller,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let gate = AccessGate::new(store.clone());
        let owner = Caller::new(1);
        let workflow = WorkflowService::new(store.clone(), gate.clone())
            .create(
                &owner,
                NewWorkflow {
                    name: "Invoice Approval".into(),
                    description: String::new(),
                },
            )
            .await
            .unwrap();

        Fixture {
            versions: VersionStore::new(store, gate),
            workflow_id: workflow.id,
            owner,
        }
    }

    fn two_node_graph() -> JsonValue {
        json!({
            "nodes": [
                {"id": "node-1", "type": "start", "position": {"x": 0, "y": 0}, "data": {}},
                {"id": "node-2", "type": "end", "position": {"x": 200, "y": 0}, "data": {"label": "done"}}
            ],
            "edges": [{"id": "edge-1", "source": "node-1", "target": "node-2"}]
        })
    }

    #[tokio::test]
    async fn test_versions_number_from_one() {
        let f = fixture().await;

        for expected in 1..=3 {
            let version = f
                .versions
                .create_version(&f.owner, f.workflow_id, Definition::default())
                .await
                .unwrap();
            assert_eq!(version.version, expected);
            assert_eq!(version.status, VersionStatus::Draft);
        }

        let numbers: Vec<_> = f
            .versions
            .list(&f.owner, f.workflow_id)
            .await
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_definition_round_trips() {
        let f = fixture().await;
        let created = f
            .versions
            .create_version_from_value(&f.owner, f.workflow_id, two_node_graph())
            .await
            .unwrap();

        let fetched = f.versions.get(&f.owner, f.workflow_id, created.version).await.unwrap();
        assert_eq!(fetched.definition, created.definition);
        assert_eq!(fetched.definition_hash, created.definition.content_hash());
        assert_eq!(serde_json::to_value(&fetched.definition).unwrap(), two_node_graph());
    }

    #[tokio::test]
    async fn test_submitted_document_is_returned_unchanged() {
        let f = fixture().await;
        let submitted = json!({
            "nodes": [
                {"id": "n1", "type": "start", "label": "Begin", "position": {"x": 100, "y": 100}, "data": {}}
            ],
            "edges": [],
            "viewport": {"zoom": 1}
        });

        let created = f
            .versions
            .create_version_from_value(&f.owner, f.workflow_id, submitted.clone())
            .await
            .unwrap();
        let fetched = f.versions.get(&f.owner, f.workflow_id, created.version).await.unwrap();

        assert_eq!(serde_json::to_value(&fetched.definition).unwrap(), submitted);
        assert_eq!(
            fetched.definition_hash,
            Definition::from_value(submitted).unwrap().content_hash()
        );
    }

    #[tokio::test]
    async fn test_create_checks_ownership_once() {
        let store = Arc::new(CountingStore::default());
        let workflow = store
            .insert_workflow(
                1,
                NewWorkflow {
                    name: "Invoice Approval".into(),
                    description: String::new(),
                },
            )
            .await
            .unwrap();
        let shared: Arc<dyn Store> = store.clone();
        let versions = VersionStore::new(shared.clone(), AccessGate::new(shared));
        let owner = Caller::new(1);

        versions
            .create_version_from_value(&owner, workflow.id, two_node_graph())
            .await
            .unwrap();
        assert_eq!(store.workflow_lookups.load(Ordering::SeqCst), 1);

        versions
            .create_version(&owner, workflow.id, Definition::default())
            .await
            .unwrap();
        assert_eq!(store.workflow_lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_definition_creates_nothing() {
        let f = fixture().await;
        let mut graph = two_node_graph();
        graph["edges"][0]["target"] = json!("node-404");

        let result = f
            .versions
            .create_version_from_value(&f.owner, f.workflow_id, graph)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(f.versions.list(&f.owner, f.workflow_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_version_is_not_found() {
        let f = fixture().await;
        assert!(matches!(
            f.versions.get(&f.owner, f.workflow_id, 9).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_other_caller_cannot_create_or_read() {
        let f = fixture().await;
        let stranger = Caller::new(2);

        assert!(matches!(
            f.versions
                .create_version(&stranger, f.workflow_id, Definition::default())
                .await,
            Err(Error::Permission(_))
        ));
        assert!(matches!(
            f.versions.list(&stranger, f.workflow_id).await,
            Err(Error::Permission(_))
        ));
    }

    #[tokio::test]
    async fn test_nodes_decomposition() {
        let f = fixture().await;
        let created = f
            .versions
            .create_version_from_value(&f.owner, f.workflow_id, two_node_graph())
            .await
            .unwrap();

        let nodes = f.versions.nodes(&f.owner, f.workflow_id, created.version).await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].next_nodes, vec!["node-2".to_string()]);
        assert_eq!(nodes[1].config, json!({"label": "done"}));
        assert!(nodes.iter().all(|n| n.version_id == created.id));
    }
}
