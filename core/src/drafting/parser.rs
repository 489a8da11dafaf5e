//! Extract a JSON document from a model reply

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

use crate::error::{Error, Result};

const NOT_PARSEABLE: &str = "response not parseable";

fn fenced_json() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```json\n(.*?)\n```").expect("fence pattern is valid"))
}

/// Two-stage reply parser
///
/// The whole reply is tried as JSON first. Failing that, only the content of
/// the first ```` ```json ```` fenced block is tried. Nothing else is
/// attempted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplyParser;

impl ReplyParser {
    pub fn parse<T: DeserializeOwned>(&self, reply: &str) -> Result<T> {
        if let Ok(value) = serde_json::from_str(reply) {
            return Ok(value);
        }

        let block = fenced_json()
            .captures(reply)
            .and_then(|captures| captures.get(1))
            .ok_or_else(|| Error::ExternalService(NOT_PARSEABLE.to_string()))?;

        serde_json::from_str(block.as_str())
            .map_err(|_| Error::ExternalService(NOT_PARSEABLE.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_plain_json() {
        let value: Value = ReplyParser.parse(r#"{"steps": []}"#).unwrap();
        assert_eq!(value, json!({"steps": []}));
    }

    #[test]
    fn test_fenced_block_after_prose() {
        let reply = "Here is the analysis you asked for:\n```json\n{\"analysis_id\": \"a1\", \"steps\": []}\n```\nLet me know if you need more.";
        let value: Value = ReplyParser.parse(reply).unwrap();
        assert_eq!(value["analysis_id"], "a1");
    }

    #[test]
    fn test_only_first_block_is_used() {
        let reply = "```json\n{\"n\": 1}\n```\nand\n```json\n{\"n\": 2}\n```";
        let value: Value = ReplyParser.parse(reply).unwrap();
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn test_multiline_block() {
        let reply = "Sure.\n```json\n{\n  \"nodes\": [],\n  \"edges\": []\n}\n```";
        let value: Value = ReplyParser.parse(reply).unwrap();
        assert_eq!(value, json!({"nodes": [], "edges": []}));
    }

    #[test]
    fn test_unparseable_reply() {
        let err = ReplyParser.parse::<Value>("I could not do that.").unwrap_err();
        assert!(matches!(err, Error::ExternalService(ref m) if m == NOT_PARSEABLE));
    }

    #[test]
    fn test_broken_first_block_is_not_repaired() {
        let reply = "```json\n{\"n\": \n```\n```json\n{\"n\": 2}\n```";
        assert!(ReplyParser.parse::<Value>(reply).is_err());
    }

    #[test]
    fn test_fence_without_language_tag_is_ignored() {
        let reply = "```\n{\"n\": 1}\n```";
        assert!(ReplyParser.parse::<Value>(reply).is_err());
    }
}
