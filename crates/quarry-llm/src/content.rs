//! Content blocks returned by generation services.
//!
//! Responses carry heterogeneous block shapes. They are decoded once, here,
//! into [`ContentBlock`] so downstream code matches on a closed set of variants.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ContentBlock {
    Text { text: String },
    /// Any non-text block, kept verbatim with its `type` tag.
    Other { kind: String, value: Value },
}

impl From<Value> for ContentBlock {
    fn from(value: Value) -> Self {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned();
        if kind == "text"
            && let Some(text) = value.get("text").and_then(Value::as_str)
        {
            return Self::Text {
                text: text.to_owned(),
            };
        }
        Self::Other { kind, value }
    }
}

impl From<ContentBlock> for Value {
    fn from(block: ContentBlock) -> Self {
        match block {
            ContentBlock::Text { text } => serde_json::json!({ "type": "text", "text": text }),
            ContentBlock::Other { value, .. } => value,
        }
    }
}

impl ContentBlock {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Other { .. } => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::Other { kind, .. } => kind,
        }
    }

    /// Concatenate the text of every text block, skipping all others.
    #[must_use]
    pub fn text_of(blocks: &[Self]) -> String {
        blocks.iter().filter_map(Self::as_text).collect()
    }

    /// Decode a JSON `content` field, which may be a plain string or an array of blocks.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not valid JSON.
    pub fn decode(raw: &str) -> Result<Vec<Self>, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_content(value))
    }

    #[must_use]
    pub fn from_content(value: Value) -> Vec<Self> {
        match value {
            Value::String(text) => vec![Self::Text { text }],
            Value::Array(items) => items.into_iter().map(Self::from).collect(),
            Value::Null => Vec::new(),
            other => vec![Self::from(other)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mixed_block_array() {
        let blocks = ContentBlock::decode(
            r#"[
                {"type": "text", "text": "Revenue grew "},
                {"type": "tool_use", "id": "t1", "name": "search"},
                {"type": "text", "text": "12%."}
            ]"#,
        )
        .unwrap();

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1].kind(), "tool_use");
        assert!(blocks[1].as_text().is_none());
        assert_eq!(ContentBlock::text_of(&blocks), "Revenue grew 12%.");
    }

    #[test]
    fn plain_string_content_is_one_text_block() {
        let blocks = ContentBlock::decode(r#""hello""#).unwrap();
        assert_eq!(
            blocks,
            vec![ContentBlock::Text {
                text: "hello".into()
            }]
        );
    }

    #[test]
    fn text_block_without_text_field_is_other() {
        let block = ContentBlock::from(serde_json::json!({"type": "text"}));
        assert_eq!(block.kind(), "text");
        assert!(matches!(block, ContentBlock::Other { .. }));
    }

    #[test]
    fn untagged_object_is_unknown_kind() {
        let block = ContentBlock::from(serde_json::json!({"foo": 1}));
        assert_eq!(block.kind(), "unknown");
    }

    #[test]
    fn serialization_keeps_original_shape() {
        let raw = serde_json::json!({"type": "image", "source": {"data": "..."}});
        let block: ContentBlock = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&block).unwrap(), raw);
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(ContentBlock::decode("{not json").is_err());
    }
}
