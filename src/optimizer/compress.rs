//! Compression stage
//!
//! Lossy rewrites that shave tokens without dropping meaning: whitespace
//! normalization, dictionary shorthand, comment stripping and JSON
//! minification. Nothing here is meant to be reversible.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{EngineError, Result};
use crate::models::{Aggressiveness, ContentItem, ContentType, Technique};

static INNER_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());

static BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

// `//` and `# ` full-line comments; `#[attr]`, `#!` and `#include` survive
static LINE_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?://.*|#(?:[ \t].*)?)$").unwrap());

static DICTIONARY: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        ("implementation", "impl"),
        ("configuration", "config"),
        ("documentation", "docs"),
        ("application", "app"),
        ("information", "info"),
        ("development", "dev"),
        ("environment", "env"),
        ("repository", "repo"),
        ("parameters", "params"),
        ("parameter", "param"),
        ("directory", "dir"),
        ("database", "db"),
        ("function", "fn"),
        ("reference", "ref"),
        ("requirements", "reqs"),
        ("for example", "e.g."),
        ("that is", "i.e."),
        ("in order to", "to"),
        ("as well as", "and"),
    ]
    .into_iter()
    .map(|(word, short)| (Regex::new(&format!(r"\b{}\b", word)).unwrap(), short))
    .collect()
});

/// Compresses one item. Returns `None` when nothing changed.
///
/// Fails only for a `Json` item whose content does not parse.
pub fn compress(item: &ContentItem, aggressiveness: Aggressiveness) -> Result<Option<ContentItem>> {
    let compressed = match item.content_type {
        ContentType::Json => minify_json(&item.content)?,
        ContentType::Code => {
            let text = if aggressiveness == Aggressiveness::Aggressive {
                strip_comments(&item.content)
            } else {
                item.content.clone()
            };
            normalize_whitespace(&text)
        }
        ContentType::Documentation | ContentType::Text => {
            let text = normalize_whitespace(&item.content);
            if aggressiveness == Aggressiveness::Conservative {
                text
            } else {
                apply_dictionary(&text)
            }
        }
        ContentType::Error => normalize_whitespace(&item.content),
    };

    if compressed == item.content {
        Ok(None)
    } else {
        Ok(Some(item.rewritten(compressed, Technique::Compressed)))
    }
}

/// Trims line ends, collapses inner runs of spaces and tabs, and squeezes
/// blank-line runs to one. Leading indentation is kept.
pub fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut previous_blank = true;

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            if !previous_blank {
                lines.push(String::new());
            }
            previous_blank = true;
            continue;
        }
        previous_blank = false;

        let body = line.trim_start();
        let indent = &line[..line.len() - body.len()];
        lines.push(format!("{}{}", indent, INNER_SPACES.replace_all(body, " ")));
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

pub fn strip_comments(code: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(code, "");
    LINE_COMMENT.replace_all(&without_blocks, "").into_owned()
}

pub fn apply_dictionary(text: &str) -> String {
    DICTIONARY
        .iter()
        .fold(text.to_string(), |acc, (pattern, short)| {
            pattern.replace_all(&acc, *short).into_owned()
        })
}

pub fn minify_json(text: &str) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| EngineError::Pipeline {
            stage: "compression",
            message: format!("invalid JSON content: {}", e),
        })?;
    serde_json::to_string(&value).map_err(|e| EngineError::Pipeline {
        stage: "compression",
        message: e.to_string(),
    })
}
