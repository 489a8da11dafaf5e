use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::{AccessGate, Caller};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::*;

/// Longest workflow name the schema stores
pub const MAX_NAME_LEN: usize = 100;

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("workflow name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "workflow name exceeds {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

/// Service for the workflow aggregate root
#[derive(Clone)]
pub struct WorkflowService {
    store: Arc<dyn Store>,
    gate: AccessGate,
}

impl WorkflowService {
    pub fn new(store: Arc<dyn Store>, gate: AccessGate) -> Self {
        Self { store, gate }
    }

    pub async fn create(&self, caller: &Caller, workflow: NewWorkflow) -> Result<Workflow> {
        validate_name(&workflow.name)?;

        let workflow = self.store.insert_workflow(caller.user_id, workflow).await?;
        info!(workflow_id = workflow.id, owner = caller.user_id, "workflow created");
        Ok(workflow)
    }

    /// Workflows owned by the caller
    pub async fn list(&self, caller: &Caller) -> Result<Vec<Workflow>> {
        self.store.list_workflows(caller.user_id).await
    }

    /// Workflow with the summaries of all its versions
    pub async fn get(&self, caller: &Caller, workflow_id: WorkflowId) -> Result<WorkflowDetail> {
        let workflow = self.gate.workflow(caller, workflow_id).await?;
        let versions = self.store.list_versions(workflow_id).await?;
        debug!(workflow_id, versions = versions.len(), "workflow loaded");

        Ok(WorkflowDetail { workflow, versions })
    }

    pub async fn update(
        &self,
        caller: &Caller,
        workflow_id: WorkflowId,
        changes: WorkflowChanges,
    ) -> Result<Workflow> {
        let current = self.gate.workflow(caller, workflow_id).await?;
        if let Some(name) = &changes.name {
            validate_name(name)?;
        }
        if changes.is_empty() {
            return Ok(current);
        }

        let workflow = self
            .store
            .update_workflow(workflow_id, changes)
            .await?
            .ok_or_else(|| Error::not_found(format!("workflow {}", workflow_id)))?;
        info!(workflow_id, "workflow updated");
        Ok(workflow)
    }

    /// Delete the workflow and everything recorded under it
    pub async fn delete(&self, caller: &Caller, workflow_id: WorkflowId) -> Result<()> {
        self.gate.workflow(caller, workflow_id).await?;

        if !self.store.delete_workflow(workflow_id).await? {
            return Err(Error::not_found(format!("workflow {}", workflow_id)));
        }
        info!(workflow_id, "workflow deleted");
        Ok(())
    }
}
