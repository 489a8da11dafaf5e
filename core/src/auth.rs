//! Caller identity and ownership checks
//!
//! Credentials are resolved once per request by an [`Authenticator`]; the
//! resulting [`Caller`] is handed explicitly to every service call, and every
//! service funnels its ownership check through [`AccessGate`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::*;

/// The authenticated identity making a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Caller {
    pub user_id: UserId,
}

impl Caller {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve a bearer credential to a caller
    async fn authenticate(&self, credential: &str) -> Result<Caller>;
}

/// Maps configured bearer tokens to user ids
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenAuthenticator {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            tokens: config
                .tokens
                .iter()
                .map(|grant| (grant.token.clone(), grant.user_id))
                .collect(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: UserId) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, credential: &str) -> Result<Caller> {
        if credential.is_empty() {
            return Err(Error::Authentication("empty credential".to_string()));
        }
        self.tokens
            .get(credential)
            .map(|user_id| Caller::new(*user_id))
            .ok_or_else(|| Error::Authentication("unknown credential".to_string()))
    }
}

/// Owner-only access to workflows and everything beneath them
///
/// Lookups report `NotFound` for absent resources and `Permission` when
/// the resource exists but belongs to someone else.
#[derive(Clone)]
pub struct AccessGate {
    store: Arc<dyn Store>,
}

impl AccessGate {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn authorize(&self, caller: &Caller, workflow: &Workflow) -> Result<()> {
        if workflow.creator_id == caller.user_id {
            Ok(())
        } else {
            Err(Error::Permission(format!(
                "workflow {} belongs to another user",
                workflow.id
            )))
        }
    }

    pub async fn workflow(&self, caller: &Caller, workflow_id: WorkflowId) -> Result<Workflow> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("workflow {}", workflow_id)))?;

        self.authorize(caller, &workflow)?;
        Ok(workflow)
    }

    pub async fn version(
        &self,
        caller: &Caller,
        workflow_id: WorkflowId,
        version: i32,
    ) -> Result<(Workflow, WorkflowVersion)> {
        let workflow = self.workflow(caller, workflow_id).await?;
        let version = self
            .store
            .get_version(workflow_id, version)
            .await?
            .ok_or_else(|| {
                Error::not_found(format!("version {} of workflow {}", version, workflow_id))
            })?;

        Ok((workflow, version))
    }

    /// Resolve an execution up to its workflow and check ownership there
    pub async fn execution(
        &self,
        caller: &Caller,
        execution_id: ExecutionId,
    ) -> Result<(WorkflowVersion, WorkflowExecution)> {
        let execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("execution {}", execution_id)))?;

        let version = self
            .store
            .get_version_by_id(execution.version_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("version {}", execution.version_id)))?;

        self.workflow(caller, version.workflow_id).await?;
        Ok((version, execution))
    }
}
