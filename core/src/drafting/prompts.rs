//! Prompt templates for the three drafting stages

use super::Confirmation;

pub fn analyze(description: &str, knowledge_base_id: Option<&str>) -> String {
    let reference = knowledge_base_id
        .map(|id| format!("\nReference knowledge base: {}\n", id))
        .unwrap_or_default();

    format!(
        r#"Analyze the following workflow requirement and break it down into concrete steps:

{description}
{reference}
Return the result as JSON with these fields:
1. analysis_id: an analysis identifier (random string)
2. steps: an array of steps, each with the fields id, description, is_uncertain and options

Mark a step as is_uncertain when the requirement leaves a decision open, and list
the candidate choices in options."#
    )
}

pub fn confirm(analysis_id: &str, confirmations: &[Confirmation]) -> String {
    let choices = serde_json::to_string_pretty(confirmations).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"Update the workflow steps according to the user's confirmations.

Analysis ID: {analysis_id}
User confirmations:
{choices}

Return the updated result as JSON with these fields:
1. analysis_id: the same analysis ID as the input
2. updated_steps: the updated array of steps, each with the fields id, description, is_uncertain and options"#
    )
}

pub fn generate(analysis_id: &str) -> String {
    format!(
        r#"Generate the complete workflow definition for analysis ID {analysis_id}.

The definition must be a JSON object with this structure:
{{
  "nodes": [
    {{
      "id": "node-1",
      "type": "start",
      "position": {{"x": 100, "y": 100}},
      "data": {{}}
    }}
  ],
  "edges": [
    {{
      "id": "edge-1-2",
      "source": "node-1",
      "target": "node-2"
    }}
  ]
}}

Node ids and edge ids must be unique, and every edge must connect two nodes that
exist in the definition. Return valid JSON only."#
    )
}
