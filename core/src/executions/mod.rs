// Execution ledger
//
// Records executions against published versions and their append-only logs:
// - Starting executions (only for published versions)
// - Appending ordered log entries
// - Finishing executions (completed / failed)
// - Querying executions and logs
//
// Executions are recorded here, never run.

mod create;
mod lifecycle;
mod logs;
mod query;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use crate::auth::AccessGate;
use crate::store::Store;

#[derive(Clone)]
pub struct ExecutionLedger {
    store: Arc<dyn Store>,
    gate: AccessGate,
}

impl ExecutionLedger {
    pub fn new(store: Arc<dyn Store>, gate: AccessGate) -> Self {
        Self { store, gate }
    }
}
