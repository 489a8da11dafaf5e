//! Version status state machine
//!
//! ```text
//! draft --publish--> published
//!   \                   |
//!    \---archive--> archived <--archive--/
//! ```
//!
//! `archived` is terminal. Archiving is accepted from every state, including
//! `archived` itself.

use std::sync::Arc;
use tracing::info;

use crate::auth::{AccessGate, Caller};
use crate::error::{Error, Result};
use crate::store::{StatusUpdate, Store};
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Publish,
    Archive,
}

impl Transition {
    pub fn target(&self) -> VersionStatus {
        match self {
            Transition::Publish => VersionStatus::Published,
            Transition::Archive => VersionStatus::Archived,
        }
    }

    /// Status the version has to be in, `None` when any state is accepted
    pub fn required_source(&self) -> Option<VersionStatus> {
        match self {
            Transition::Publish => Some(VersionStatus::Draft),
            Transition::Archive => None,
        }
    }
}

#[derive(Clone)]
pub struct LifecycleController {
    store: Arc<dyn Store>,
    gate: AccessGate,
}

impl LifecycleController {
    pub fn new(store: Arc<dyn Store>, gate: AccessGate) -> Self {
        Self { store, gate }
    }

    pub async fn publish(
        &self,
        caller: &Caller,
        workflow_id: WorkflowId,
        version: i32,
    ) -> Result<WorkflowVersion> {
        self.apply(caller, workflow_id, version, Transition::Publish).await
    }

    pub async fn archive(
        &self,
        caller: &Caller,
        workflow_id: WorkflowId,
        version: i32,
    ) -> Result<WorkflowVersion> {
        self.apply(caller, workflow_id, version, Transition::Archive).await
    }

    /// Check ownership, then perform the transition as one conditional write
    pub async fn apply(
        &self,
        caller: &Caller,
        workflow_id: WorkflowId,
        version: i32,
        transition: Transition,
    ) -> Result<WorkflowVersion> {
        let (_, current) = self.gate.version(caller, workflow_id, version).await?;

        if let Some(required) = transition.required_source() {
            if current.status != required {
                return Err(illegal(transition, current.status));
            }
        }

        match self
            .store
            .update_version_status(current.id, transition.target(), transition.required_source())
            .await?
        {
            StatusUpdate::Applied(updated) => {
                info!(
                    workflow_id,
                    version,
                    from = %current.status,
                    to = %updated.status,
                    "version status changed"
                );
                Ok(updated)
            }
            // Lost a race with another transition between the read and the write
            StatusUpdate::Rejected { current } => Err(illegal(transition, current)),
            StatusUpdate::Missing => Err(Error::not_found(format!(
                "version {} of workflow {}",
                version, workflow_id
            ))),
        }
    }
}

fn illegal(transition: Transition, current: VersionStatus) -> Error {
    Error::StateConflict(format!(
        "cannot {} a {} version",
        match transition {
            Transition::Publish => "publish",
            Transition::Archive => "archive",
        },
        current
    ))
}
