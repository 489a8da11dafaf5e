//! Assistant-driven drafting of workflow definitions
//!
//! analyze (free text -> steps) -> confirm (resolve uncertain steps) ->
//! generate (definition stored as the next draft version). Stages are
//! correlated by an opaque `analysis_id`; nothing is kept between calls.

pub mod completion;
pub mod parser;
pub mod prompts;
pub mod retry;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::{AccessGate, Caller};
use crate::config::DraftingConfig;
use crate::definition::Definition;
use crate::error::{Error, Result};
use crate::types::*;
use crate::versions::VersionStore;

use completion::{CompletionRequest, CompletionService};
use parser::ReplyParser;
use retry::RetryPolicy;

/// Accept ids the model emits as either strings or numbers
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => Ok(s),
        JsonValue::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn optional_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<JsonValue>::deserialize(deserializer)? {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s)),
        Some(JsonValue::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisStep {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub is_uncertain: bool,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Analysis {
    pub analysis_id: String,
    pub steps: Vec<AnalysisStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Confirmation {
    #[serde(deserialize_with = "string_or_number")]
    pub step_id: String,
    pub choice: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfirmedAnalysis {
    pub analysis_id: String,
    pub updated_steps: Vec<AnalysisStep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDraft {
    pub workflow_id: WorkflowId,
    pub version_id: VersionId,
    pub version: i32,
    pub definition: Definition,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub description: String,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub knowledge_base_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalysisReply {
    #[serde(default, deserialize_with = "optional_string_or_number")]
    analysis_id: Option<String>,
    steps: Vec<AnalysisStep>,
}

#[derive(Debug, Deserialize)]
struct ConfirmationReply {
    updated_steps: Vec<AnalysisStep>,
}

pub struct DraftPipeline {
    completion: Arc<dyn CompletionService>,
    retry: RetryPolicy,
    parser: ReplyParser,
    gate: AccessGate,
    versions: VersionStore,
    analyze_max_tokens: u32,
    generate_max_tokens: u32,
}

impl DraftPipeline {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        config: &DraftingConfig,
        gate: AccessGate,
        versions: VersionStore,
    ) -> Self {
        Self {
            completion,
            retry: RetryPolicy::from_config(&config.retry),
            parser: ReplyParser,
            gate,
            versions,
            analyze_max_tokens: config.analyze_max_tokens,
            generate_max_tokens: config.generate_max_tokens,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Break a free-text requirement into steps
    pub async fn analyze(&self, caller: &Caller, request: AnalyzeRequest) -> Result<Analysis> {
        if request.description.trim().is_empty() {
            return Err(Error::Validation("description is required".to_string()));
        }

        let prompt = prompts::analyze(&request.description, request.knowledge_base_id.as_deref());
        let reply = self.ask(prompt, self.analyze_max_tokens).await?;
        let parsed: AnalysisReply = self.parser.parse(&reply)?;

        let analysis = Analysis {
            analysis_id: parsed
                .analysis_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            steps: parsed.steps,
        };
        info!(
            user_id = caller.user_id,
            analysis_id = %analysis.analysis_id,
            steps = analysis.steps.len(),
            "requirement analyzed"
        );
        Ok(analysis)
    }

    /// Apply the caller's choices to the uncertain steps of an analysis
    pub async fn confirm(
        &self,
        caller: &Caller,
        analysis_id: &str,
        confirmations: Vec<Confirmation>,
    ) -> Result<ConfirmedAnalysis> {
        if analysis_id.trim().is_empty() {
            return Err(Error::Validation("analysis_id is required".to_string()));
        }

        let prompt = prompts::confirm(analysis_id, &confirmations);
        let reply = self.ask(prompt, self.analyze_max_tokens).await?;
        let parsed: ConfirmationReply = self.parser.parse(&reply)?;

        info!(
            user_id = caller.user_id,
            analysis_id,
            confirmations = confirmations.len(),
            "analysis confirmed"
        );
        Ok(ConfirmedAnalysis {
            analysis_id: analysis_id.to_string(),
            updated_steps: parsed.updated_steps,
        })
    }

    /// Generate a definition and store it as the workflow's next draft
    pub async fn generate(
        &self,
        caller: &Caller,
        analysis_id: &str,
        workflow_id: WorkflowId,
    ) -> Result<GeneratedDraft> {
        if analysis_id.trim().is_empty() {
            return Err(Error::Validation("analysis_id is required".to_string()));
        }
        // Before spending a completion call
        self.gate.workflow(caller, workflow_id).await?;

        let reply = self
            .ask(prompts::generate(analysis_id), self.generate_max_tokens)
            .await?;
        let document: JsonValue = self.parser.parse(&reply)?;
        let definition = Definition::from_value(document).map_err(|e| match e {
            Error::Validation(reason) => {
                Error::ExternalService(format!("generated definition rejected: {}", reason))
            }
            other => other,
        })?;

        let version = self
            .versions
            .create_version(caller, workflow_id, definition)
            .await?;

        info!(
            workflow_id,
            version = version.version,
            analysis_id,
            "draft generated"
        );
        Ok(GeneratedDraft {
            workflow_id,
            version_id: version.id,
            version: version.version,
            definition: version.definition,
        })
    }

    async fn ask(&self, prompt: String, max_tokens: u32) -> Result<String> {
        let request = CompletionRequest { prompt, max_tokens };
        let reply = self
            .retry
            .run(|| self.completion.complete(request.clone()))
            .await?;
        debug!(reply_len = reply.len(), "completion received");
        Ok(reply)
    }
}
