//! Content items handed to the optimizer.

use serde::{Deserialize, Serialize};

use crate::tokens::estimate_tokens;

/// Items at or above this priority are never altered by the optimizer.
pub const EXEMPT_PRIORITY: u8 = 8;

/// Highest accepted priority; larger values are clamped.
pub const MAX_PRIORITY: u8 = 10;

// == Content Type ==
/// Kind of text an item carries; selects compression and summarization rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Documentation,
    Code,
    Error,
    Json,
    Text,
}

// == Technique ==
/// Provenance tag recording what a stage did to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    Deduplicated,
    Compressed,
    Summarized,
    Cached,
}

impl Technique {
    pub fn as_str(&self) -> &'static str {
        match self {
            Technique::Deduplicated => "deduplicated",
            Technique::Compressed => "compressed",
            Technique::Summarized => "summarized",
            Technique::Cached => "cached",
        }
    }
}

impl std::fmt::Display for Technique {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Item Metadata ==
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Techniques applied, in pipeline order
    pub provenance: Vec<Technique>,
    /// Set when the content was replaced by a back-reference
    pub duplicate_of: Option<String>,
}

// == Content Item ==
/// One fragment of context. Stages never mutate an item; they return new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub content_type: ContentType,
    /// 0 (least important) to 10
    pub priority: u8,
    pub content: String,
    pub token_estimate: usize,
    #[serde(default)]
    pub metadata: ItemMetadata,
}

impl ContentItem {
    pub fn new(
        id: impl Into<String>,
        content_type: ContentType,
        priority: u8,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            id: id.into(),
            content_type,
            priority: priority.min(MAX_PRIORITY),
            token_estimate: estimate_tokens(&content),
            content,
            metadata: ItemMetadata::default(),
        }
    }

    /// Items the optimizer must pass through byte-identical.
    pub fn is_exempt(&self) -> bool {
        self.priority >= EXEMPT_PRIORITY
    }

    /// Content was replaced by a pointer to an earlier item.
    pub fn is_back_reference(&self) -> bool {
        self.metadata.duplicate_of.is_some()
    }

    /// Copy whose `token_estimate` is recomputed from the content.
    ///
    /// Items deserialized from collaborators may carry a stale estimate.
    pub fn remeasured(&self) -> Self {
        Self {
            token_estimate: estimate_tokens(&self.content),
            ..self.clone()
        }
    }

    pub fn has_technique(&self, technique: Technique) -> bool {
        self.metadata.provenance.contains(&technique)
    }

    /// New item with replaced content, re-estimated tokens and one more
    /// provenance tag.
    pub fn rewritten(&self, content: String, technique: Technique) -> Self {
        let mut metadata = self.metadata.clone();
        if !metadata.provenance.contains(&technique) {
            metadata.provenance.push(technique);
        }
        Self {
            id: self.id.clone(),
            content_type: self.content_type,
            priority: self.priority,
            token_estimate: estimate_tokens(&content),
            content,
            metadata,
        }
    }
}
