use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN: &str = "Unknown";

/// A paragraph-like unit of source text, as produced by a loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub text: String,
    pub page_number: Option<u32>,
}

impl Paragraph {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page_number: None,
        }
    }

    #[must_use]
    pub fn on_page(mut self, page: u32) -> Self {
        self.page_number = Some(page);
        self
    }
}

/// An ordered list of paragraphs from a single source.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: String,
    pub content_type: String,
    pub paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_file: String,
    pub section: String,
    pub heading: String,
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    pub token_count: usize,
    pub created_at: DateTime<Utc>,
    /// Set during context assembly when an adjacent chunk was folded in.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub merged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Stable point id derived from source and position.
    #[must_use]
    pub fn id(&self) -> String {
        chunk_id(&self.metadata.source_file, self.metadata.chunk_index)
    }
}

#[must_use]
pub fn chunk_id(source_file: &str, chunk_index: usize) -> String {
    let key = format!("{source_file}:{chunk_index}");
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ChunkMetadata {
        ChunkMetadata {
            source_file: "report.txt".into(),
            section: "2.1".into(),
            heading: "Revenue".into(),
            chunk_index: 3,
            page_number: None,
            token_count: 12,
            created_at: Utc::now(),
            merged: false,
            attribution: None,
        }
    }

    #[test]
    fn chunk_id_is_deterministic_and_position_sensitive() {
        assert_eq!(chunk_id("a.txt", 1), chunk_id("a.txt", 1));
        assert_ne!(chunk_id("a.txt", 1), chunk_id("a.txt", 2));
        assert_ne!(chunk_id("a.txt", 1), chunk_id("b.txt", 1));
        assert!(uuid::Uuid::parse_str(&chunk_id("a.txt", 1)).is_ok());
    }

    #[test]
    fn metadata_omits_unset_optionals() {
        let json = serde_json::to_value(meta()).unwrap();
        assert!(json.get("page_number").is_none());
        assert!(json.get("merged").is_none());
        assert!(json.get("attribution").is_none());
        assert_eq!(json["section"], "2.1");
    }

    #[test]
    fn metadata_deserializes_without_optionals() {
        let json = serde_json::to_value(meta()).unwrap();
        let back: ChunkMetadata = serde_json::from_value(json).unwrap();
        assert!(!back.merged);
        assert_eq!(back.chunk_index, 3);
    }
}
