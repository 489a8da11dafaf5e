use super::*;
use crate::auth::Caller;
use crate::definition::Definition;
use crate::error::Error;
use crate::lifecycle::LifecycleController;
use crate::store::{ExecutionStorage, MemoryStore, VersionStorage, WorkflowStorage};
use crate::types::*;
use serde_json::json;

struct Harness {
    ledger: ExecutionLedger,
    lifecycle: LifecycleController,
    store: Arc<dyn Store>,
    owner: Caller,
    workflow_id: WorkflowId,
}

/// Fresh in-memory store with one workflow owned by user 1
async fn harness() -> Harness {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let gate = AccessGate::new(store.clone());
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

    Harness {
        ledger: ExecutionLedger::new(store.clone(), gate.clone()),
        lifecycle: LifecycleController::new(store.clone(), gate),
        store,
        owner: Caller::new(1),
        workflow_id: workflow.id,
    }
}

impl Harness {
    async fn draft(&self) -> WorkflowVersion {
        self.store
            .insert_next_version(self.workflow_id, Definition::default(), "hash".into())
            .await
            .unwrap()
    }

    async fn published(&self) -> WorkflowVersion {
        let version = self.draft().await;
        self.lifecycle
            .publish(&self.owner, self.workflow_id, version.version)
            .await
            .unwrap()
    }

    async fn running(&self) -> WorkflowExecution {
        let version = self.published().await;
        self.ledger
            .start_execution(&self.owner, self.workflow_id, version.version, None)
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_execute_requires_published() {
    let h = harness().await;
    let draft = h.draft().await;

    let result = h
        .ledger
        .start_execution(&h.owner, h.workflow_id, draft.version, None)
        .await;
    match result {
        Err(Error::StateConflict(message)) => assert!(message.contains("version not published")),
        other => panic!("expected state conflict, got {:?}", other),
    }
    assert!(h.store.list_executions(draft.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_execute_archived_is_rejected() {
    let h = harness().await;
    let version = h.published().await;
    h.lifecycle
        .archive(&h.owner, h.workflow_id, version.version)
        .await
        .unwrap();

    assert!(matches!(
        h.ledger
            .start_execution(&h.owner, h.workflow_id, version.version, None)
            .await,
        Err(Error::StateConflict(_))
    ));
}

#[tokio::test]
async fn test_execute_published_records_running() {
    let h = harness().await;
    let version = h.published().await;

    let execution = h
        .ledger
        .start_execution(
            &h.owner,
            h.workflow_id,
            version.version,
            Some(json!({"invoice_id": "INV-7", "amount": 1200})),
        )
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Running);
    assert_eq!(execution.version_id, version.id);
    assert!(execution.ended_at.is_none());
    assert_eq!(execution.inputs, json!({"invoice_id": "INV-7", "amount": 1200}));
}

#[tokio::test]
async fn test_inputs_default_to_empty_object() {
    let h = harness().await;
    let execution = h.running().await;
    assert_eq!(execution.inputs, json!({}));
}

#[tokio::test]
async fn test_repeated_execute_is_not_deduplicated() {
    let h = harness().await;
    let version = h.published().await;

    for _ in 0..3 {
        h.ledger
            .start_execution(&h.owner, h.workflow_id, version.version, None)
            .await
            .unwrap();
    }

    let listed = h
        .ledger
        .list_for_version(&h.owner, h.workflow_id, version.version)
        .await
        .unwrap();
    assert_eq!(listed.len(), 3);
}

#[tokio::test]
async fn test_finish_sets_ended_at_once() {
    let h = harness().await;
    let execution = h.running().await;

    let finished = h
        .ledger
        .finish(
            &h.owner,
            execution.id,
            ExecutionStatus::Completed,
            Some(json!({"approved": true})),
        )
        .await
        .unwrap();
    assert_eq!(finished.status, ExecutionStatus::Completed);
    assert!(finished.ended_at.is_some());
    assert_eq!(finished.result, Some(json!({"approved": true})));

    let second = h
        .ledger
        .finish(&h.owner, execution.id, ExecutionStatus::Failed, None)
        .await;
    assert!(matches!(second, Err(Error::StateConflict(_))));

    let stored = h.ledger.get(&h.owner, execution.id).await.unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
    assert_eq!(stored.ended_at, finished.ended_at);
}

#[tokio::test]
async fn test_finish_rejects_non_terminal_status() {
    let h = harness().await;
    let execution = h.running().await;

    assert!(matches!(
        h.ledger
            .finish(&h.owner, execution.id, ExecutionStatus::Running, None)
            .await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn test_logs_keep_append_order() {
    let h = harness().await;
    let execution = h.running().await;

    let steps = [
        (Some("node-1"), "started", LogLevel::Info),
        (Some("node-2"), "waiting on finance", LogLevel::Info),
        (Some("node-2"), "approver slow to respond", LogLevel::Warning),
        (None, "approved", LogLevel::Info),
    ];
    for (node, message, level) in steps {
        h.ledger
            .append_log(
                &h.owner,
                execution.id,
                node.map(str::to_string),
                message.to_string(),
                level,
            )
            .await
            .unwrap();
    }

    let logs = h.ledger.get_logs(&h.owner, execution.id).await.unwrap();
    let messages: Vec<_> = logs.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(
        messages,
        vec!["started", "waiting on finance", "approver slow to respond", "approved"]
    );
    assert!(logs.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
    assert_eq!(logs[2].level, LogLevel::Warning);
    assert_eq!(logs[3].node_id, None);
}

#[tokio::test]
async fn test_empty_log_message_is_rejected() {
    let h = harness().await;
    let execution = h.running().await;

    assert!(matches!(
        h.ledger
            .append_log(&h.owner, execution.id, None, "   ".into(), LogLevel::Info)
            .await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn test_detail_reports_workflow_and_version() {
    let h = harness().await;
    let execution = h.running().await;

    let detail = h.ledger.detail(&h.owner, execution.id).await.unwrap();
    assert_eq!(detail.workflow_id, h.workflow_id);
    assert_eq!(detail.version, 1);
    assert_eq!(detail.execution.id, execution.id);
}

#[tokio::test]
async fn test_other_caller_is_denied_everywhere() {
    let h = harness().await;
    let version = h.published().await;
    let execution = h.running().await;
    let stranger = Caller::new(2);

    assert!(matches!(
        h.ledger
            .start_execution(&stranger, h.workflow_id, version.version, None)
            .await,
        Err(Error::Permission(_))
    ));
    assert!(matches!(
        h.ledger.get(&stranger, execution.id).await,
        Err(Error::Permission(_))
    ));
    assert!(matches!(
        h.ledger.get_logs(&stranger, execution.id).await,
        Err(Error::Permission(_))
    ));
    assert!(matches!(
        h.ledger
            .append_log(&stranger, execution.id, None, "x".into(), LogLevel::Info)
            .await,
        Err(Error::Permission(_))
    ));
    assert!(matches!(
        h.ledger
            .finish(&stranger, execution.id, ExecutionStatus::Failed, None)
            .await,
        Err(Error::Permission(_))
    ));
    assert!(matches!(
        h.ledger
            .list_for_version(&stranger, h.workflow_id, version.version)
            .await,
        Err(Error::Permission(_))
    ));
}

#[tokio::test]
async fn test_missing_execution_is_not_found() {
    let h = harness().await;
    assert!(matches!(
        h.ledger.get(&h.owner, 4242).await,
        Err(Error::NotFound(_))
    ));
}
