//! Cache key derivation
//!
//! Deterministic, order-sensitive keys built from the parts that identify a
//! piece of assembled context.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a generated key in hex characters.
pub const KEY_LENGTH: usize = 16;

const PART_SEPARATOR: &str = "|";

// == Key Parts ==
/// Inputs to [`generate_key`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheKeyParts {
    pub command: String,
    pub layers: Vec<String>,
    pub version: String,
    pub context_hash: Option<String>,
}

impl CacheKeyParts {
    pub fn new(command: impl Into<String>, layers: Vec<String>, version: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            layers,
            version: version.into(),
            context_hash: None,
        }
    }

    pub fn with_context_hash(mut self, hash: impl Into<String>) -> Self {
        self.context_hash = Some(hash.into());
        self
    }

    /// Same parts with the version dropped.
    pub fn without_version(&self) -> Self {
        Self {
            version: String::new(),
            ..self.clone()
        }
    }

    /// Only the command survives.
    pub fn command_only(&self) -> Self {
        Self {
            command: self.command.clone(),
            ..Self::default()
        }
    }
}

// == Generate Key ==
/// Hashes the non-empty parts joined by a fixed separator and keeps the
/// first 16 hex characters of the SHA-256 digest.
///
/// Every part is tagged with its field and length before joining, so no two
/// distinct sets of parts share a preimage: `layers: ["1"]` never collides
/// with `version: "1"`, nor `["a,b"]` with `["a", "b"]`.
///
/// Layer order matters: `["a", "b"]` and `["b", "a"]` produce different keys.
pub fn generate_key(parts: &CacheKeyParts) -> String {
    let mut fields: Vec<String> = Vec::new();
    push_field(&mut fields, 'c', &parts.command);
    for layer in &parts.layers {
        fields.push(encode_field('l', layer));
    }
    push_field(&mut fields, 'v', &parts.version);
    if let Some(hash) = parts.context_hash.as_deref() {
        push_field(&mut fields, 'h', hash);
    }

    let mut hex = content_hash(&fields.join(PART_SEPARATOR));
    hex.truncate(KEY_LENGTH);
    hex
}

fn push_field(fields: &mut Vec<String>, tag: char, value: &str) {
    if !value.is_empty() {
        fields.push(encode_field(tag, value));
    }
}

fn encode_field(tag: char, value: &str) -> String {
    format!("{}{}:{}", tag, value.len(), value)
}

/// Full hex SHA-256 of arbitrary content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
