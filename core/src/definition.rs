//! Workflow definition documents
//!
//! A definition is the node/edge graph stored with every version. It is
//! validated once at the boundary through a typed view of the graph and
//! then persisted exactly as submitted: unknown fields, number formatting
//! and key set survive untouched. Nothing in the system interprets node
//! semantics.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value as JsonValue};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::types::{VersionId, WorkflowNode};

/// Schema version this build accepts; documents without one are taken as this
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

fn empty_object() -> JsonValue {
    JsonValue::Object(serde_json::Map::new())
}

/// A validated definition document
///
/// Serializes back to the document it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    document: JsonValue,
    graph: Graph,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
struct Graph {
    #[serde(default)]
    schema_version: Option<u32>,
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub position: Position,
    #[serde(default = "empty_object")]
    pub data: JsonValue,
}

/// Canvas coordinates, kept in the number form they were written in
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: Number,
    pub y: Number,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Default for Definition {
    fn default() -> Self {
        Self {
            document: serde_json::json!({"nodes": [], "edges": []}),
            graph: Graph::default(),
        }
    }
}

impl Serialize for Definition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.document.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Definition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let document = JsonValue::deserialize(deserializer)?;
        Definition::from_value(document).map_err(serde::de::Error::custom)
    }
}

impl Definition {
    /// Validate a raw JSON document and keep it as the definition
    pub fn from_value(document: JsonValue) -> Result<Self> {
        let graph = Graph::deserialize(&document)
            .map_err(|e| Error::Validation(format!("malformed definition: {}", e)))?;
        graph.validate()?;
        Ok(Self { document, graph })
    }

    /// The document exactly as submitted
    pub fn as_value(&self) -> &JsonValue {
        &self.document
    }

    pub fn into_value(self) -> JsonValue {
        self.document
    }

    pub fn schema_version(&self) -> u32 {
        self.graph.schema_version.unwrap_or(CURRENT_SCHEMA_VERSION)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.graph.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.graph.edges
    }

    /// SHA-256 of the stored document with object keys sorted, hex encoded
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::to_vec(&self.document).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        format!("{:x}", hasher.finalize())
    }

    /// Break the graph into per-node records with successor lists
    pub fn decompose(&self, version_id: VersionId) -> Vec<WorkflowNode> {
        self.graph
            .nodes
            .iter()
            .map(|node| WorkflowNode {
                version_id,
                id: node.id.clone(),
                node_type: node.node_type.clone(),
                config: node.data.clone(),
                position: node.position.clone(),
                next_nodes: self
                    .graph
                    .edges
                    .iter()
                    .filter(|edge| edge.source == node.id)
                    .map(|edge| edge.target.clone())
                    .collect(),
            })
            .collect()
    }
}

impl Graph {
    /// Check the graph is well formed
    ///
    /// Node ids and edge ids must be unique and non-empty, every node needs a
    /// type, `data` must be an object, and both ends of every edge must name
    /// an existing node.
    fn validate(&self) -> Result<()> {
        if let Some(version) = self.schema_version {
            if version != CURRENT_SCHEMA_VERSION {
                return Err(Error::Validation(format!(
                    "unsupported definition schema version {} (expected {})",
                    version, CURRENT_SCHEMA_VERSION
                )));
            }
        }

        let mut node_ids = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(Error::Validation("node id must not be empty".to_string()));
            }
            if node.node_type.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "node '{}' has an empty type",
                    node.id
                )));
            }
            if !node.data.is_object() {
                return Err(Error::Validation(format!(
                    "node '{}' data must be an object",
                    node.id
                )));
            }
            if !node_ids.insert(node.id.as_str()) {
                return Err(Error::Validation(format!("duplicate node id '{}'", node.id)));
            }
        }

        let mut edge_ids = HashSet::new();
        for edge in &self.edges {
            if edge.id.trim().is_empty() {
                return Err(Error::Validation("edge id must not be empty".to_string()));
            }
            if !edge_ids.insert(edge.id.as_str()) {
                return Err(Error::Validation(format!("duplicate edge id '{}'", edge.id)));
            }
            for endpoint in [&edge.source, &edge.target] {
                if !node_ids.contains(endpoint.as_str()) {
                    return Err(Error::Validation(format!(
                        "edge '{}' references unknown node '{}'",
                        edge.id, endpoint
                    )));
                }
            }
        }

        Ok(())
    }
}
