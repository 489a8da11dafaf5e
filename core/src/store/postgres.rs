//! PostgreSQL storage implementation

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::warn;

use super::*;
use crate::error::Error;

const VERSION_COLUMNS: &str =
    "id, workflow_id, version, definition, definition_hash, status, created_at";
const EXECUTION_COLUMNS: &str = "id, version_id, status, inputs, started_at, ended_at, result";
const LOG_COLUMNS: &str = "id, execution_id, node_id, message, level, timestamp";

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    max_conflict_retries: u32,
}

impl PgStore {
    pub fn new(pool: PgPool, max_conflict_retries: u32) -> Self {
        Self {
            pool,
            max_conflict_retries,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// One attempt at read-max-then-insert, serialized on the workflow row
    async fn try_insert_next_version(
        &self,
        workflow_id: WorkflowId,
        definition: &JsonValue,
        definition_hash: &str,
    ) -> std::result::Result<Option<WorkflowVersion>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Lock the parent row so concurrent creators for this workflow queue up here
        let locked: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM workflows WHERE id = $1 FOR UPDATE")
                .bind(workflow_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Ok(None);
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO workflow_versions (workflow_id, version, definition, definition_hash, status)
            SELECT $1, COALESCE(MAX(version), 0) + 1, $2, $3, 'draft'
            FROM workflow_versions
            WHERE workflow_id = $1
            RETURNING {}
            "#,
            VERSION_COLUMNS
        ))
        .bind(workflow_id)
        .bind(definition)
        .bind(definition_hash)
        .fetch_one(&mut *tx)
        .await?;

        let version = version_from_row(&row)?;
        tx.commit().await?;
        Ok(Some(version))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

fn workflow_from_row(row: &PgRow) -> std::result::Result<Workflow, sqlx::Error> {
    Ok(Workflow {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        creator_id: row.try_get("creator_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn version_from_row(row: &PgRow) -> std::result::Result<WorkflowVersion, sqlx::Error> {
    let definition: JsonValue = row.try_get("definition")?;
    let definition: Definition =
        serde_json::from_value(definition).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(WorkflowVersion {
        id: row.try_get("id")?,
        workflow_id: row.try_get("workflow_id")?,
        version: row.try_get("version")?,
        definition,
        definition_hash: row.try_get("definition_hash")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
    })
}

fn execution_from_row(row: &PgRow) -> std::result::Result<WorkflowExecution, sqlx::Error> {
    Ok(WorkflowExecution {
        id: row.try_get("id")?,
        version_id: row.try_get("version_id")?,
        status: row.try_get("status")?,
        inputs: row.try_get("inputs")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        result: row.try_get("result")?,
    })
}

fn log_from_row(row: &PgRow) -> std::result::Result<ExecutionLog, sqlx::Error> {
    Ok(ExecutionLog {
        id: row.try_get("id")?,
        execution_id: row.try_get("execution_id")?,
        node_id: row.try_get("node_id")?,
        message: row.try_get("message")?,
        level: row.try_get("level")?,
        timestamp: row.try_get("timestamp")?,
    })
}

#[async_trait]
impl WorkflowStorage for PgStore {
    async fn insert_workflow(&self, owner: UserId, workflow: NewWorkflow) -> Result<Workflow> {
        let row = sqlx::query(
            r#"
            INSERT INTO workflows (name, description, creator_id)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;

        Ok(workflow_from_row(&row)?)
    }

    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(workflow_from_row).transpose()?)
    }

    async fn list_workflows(&self, owner: UserId) -> Result<Vec<Workflow>> {
        let rows = sqlx::query("SELECT * FROM workflows WHERE creator_id = $1 ORDER BY id ASC")
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;

        let mut workflows = Vec::with_capacity(rows.len());
        for row in &rows {
            workflows.push(workflow_from_row(row)?);
        }
        Ok(workflows)
    }

    async fn update_workflow(
        &self,
        id: WorkflowId,
        changes: WorkflowChanges,
    ) -> Result<Option<Workflow>> {
        let row = sqlx::query(
            r#"
            UPDATE workflows
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.description)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(workflow_from_row).transpose()?)
    }

    async fn delete_workflow(&self, id: WorkflowId) -> Result<bool> {
        // Versions, executions and logs go with it through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl VersionStorage for PgStore {
    async fn insert_next_version(
        &self,
        workflow_id: WorkflowId,
        definition: Definition,
        definition_hash: String,
    ) -> Result<WorkflowVersion> {
        let document = definition.as_value();

        let mut attempt = 0;
        loop {
            match self
                .try_insert_next_version(workflow_id, document, &definition_hash)
                .await
            {
                Ok(Some(version)) => return Ok(version),
                Ok(None) => return Err(Error::not_found(format!("workflow {}", workflow_id))),
                Err(e) if is_unique_violation(&e) && attempt < self.max_conflict_retries => {
                    attempt += 1;
                    warn!(
                        workflow_id,
                        attempt, "version number conflict, retrying insert"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn get_version(
        &self,
        workflow_id: WorkflowId,
        version: i32,
    ) -> Result<Option<WorkflowVersion>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM workflow_versions WHERE workflow_id = $1 AND version = $2",
            VERSION_COLUMNS
        ))
        .bind(workflow_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(version_from_row).transpose()?)
    }

    async fn get_version_by_id(&self, id: VersionId) -> Result<Option<WorkflowVersion>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM workflow_versions WHERE id = $1",
            VERSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(version_from_row).transpose()?)
    }

    async fn list_versions(&self, workflow_id: WorkflowId) -> Result<Vec<VersionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, version, status, definition_hash, created_at
            FROM workflow_versions
            WHERE workflow_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            summaries.push(VersionSummary {
                id: row.try_get("id")?,
                version: row.try_get("version")?,
                status: row.try_get("status")?,
                definition_hash: row.try_get("definition_hash")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(summaries)
    }

    async fn update_version_status(
        &self,
        id: VersionId,
        to: VersionStatus,
        expected: Option<VersionStatus>,
    ) -> Result<StatusUpdate> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE workflow_versions
            SET status = $2
            WHERE id = $1
              AND ($3::text IS NULL OR status = $3::text)
            RETURNING {}
            "#,
            VERSION_COLUMNS
        ))
        .bind(id)
        .bind(to)
        .bind(expected)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(StatusUpdate::Applied(version_from_row(&row)?));
        }

        let current: Option<(VersionStatus,)> =
            sqlx::query_as("SELECT status FROM workflow_versions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match current {
            Some((current,)) => StatusUpdate::Rejected { current },
            None => StatusUpdate::Missing,
        })
    }
}

#[async_trait]
impl ExecutionStorage for PgStore {
    async fn insert_execution(
        &self,
        version_id: VersionId,
        inputs: JsonValue,
    ) -> Result<Option<WorkflowExecution>> {
        // The published check and the insert are one statement
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO workflow_executions (version_id, status, inputs, started_at)
            SELECT id, 'running', $2, NOW()
            FROM workflow_versions
            WHERE id = $1 AND status = 'published'
            RETURNING {}
            "#,
            EXECUTION_COLUMNS
        ))
        .bind(version_id)
        .bind(inputs)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(execution_from_row).transpose()?)
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<WorkflowExecution>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM workflow_executions WHERE id = $1",
            EXECUTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(execution_from_row).transpose()?)
    }

    async fn list_executions(&self, version_id: VersionId) -> Result<Vec<WorkflowExecution>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM workflow_executions WHERE version_id = $1 ORDER BY started_at ASC, id ASC",
            EXECUTION_COLUMNS
        ))
        .bind(version_id)
        .fetch_all(&self.pool)
        .await?;

        let mut executions = Vec::with_capacity(rows.len());
        for row in &rows {
            executions.push(execution_from_row(row)?);
        }
        Ok(executions)
    }

    async fn finish_execution(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        result: Option<JsonValue>,
    ) -> Result<Option<WorkflowExecution>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE workflow_executions
            SET status = $2,
                result = $3,
                ended_at = NOW()
            WHERE id = $1
              AND status IN ('pending', 'running')
            RETURNING {}
            "#,
            EXECUTION_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .bind(result)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(execution_from_row).transpose()?)
    }

    async fn append_log(&self, entry: NewLogEntry) -> Result<ExecutionLog> {
        let mut tx = self.pool.begin().await?;

        // Serializes appends per execution so timestamps follow call order
        let locked: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM workflow_executions WHERE id = $1 FOR UPDATE")
                .bind(entry.execution_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(Error::not_found(format!("execution {}", entry.execution_id)));
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO execution_logs (execution_id, node_id, message, level, timestamp)
            SELECT $1, $2, $3, $4,
                   GREATEST(clock_timestamp(), MAX(timestamp) + INTERVAL '1 microsecond')
            FROM execution_logs
            WHERE execution_id = $1
            RETURNING {}
            "#,
            LOG_COLUMNS
        ))
        .bind(entry.execution_id)
        .bind(&entry.node_id)
        .bind(&entry.message)
        .bind(entry.level)
        .fetch_one(&mut *tx)
        .await?;

        let log = log_from_row(&row)?;
        tx.commit().await?;
        Ok(log)
    }

    async fn list_logs(&self, execution_id: ExecutionId) -> Result<Vec<ExecutionLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM execution_logs WHERE execution_id = $1 ORDER BY timestamp ASC, id ASC",
            LOG_COLUMNS
        ))
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        let mut logs = Vec::with_capacity(rows.len());
        for row in &rows {
            logs.push(log_from_row(row)?);
        }
        Ok(logs)
    }
}
