//! Summarization stage
//!
//! Type-specific reductions for items that still do not fit the budget, plus
//! the final hard fit that trims the lowest-priority items until the total is
//! under the ceiling.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{ContentItem, ContentType, Technique};
use crate::tokens::{estimate_tokens, CHARS_PER_TOKEN};

/// Fraction of the budget summarization aims for.
pub const SAFETY_RATIO: f64 = 0.8;

/// Appended to hard-truncated content.
pub const TRUNCATION_MARKER: &str = " [...]";

const SECTION_LINES_KEPT: usize = 2;

static STACK_FRAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*at\s+.*(?:\(.*\)|:\d+(?::\d+)?)\s*$").unwrap());

static IMPORT_OR_EXPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:import\s|export\s|from\s+\S+\s+import\s|use\s|pub\s+use\s|extern\s+crate\s|#include\s|require\(|const\s+\w+\s*=\s*require\()")
        .unwrap()
});

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:#\[|@\w+|(?:pub(?:\([^)]*\))?\s+)?(?:export\s+)?(?:default\s+)?(?:async\s+)?(?:unsafe\s+)?(?:fn|function|class|struct|enum|trait|impl|interface|type|mod|module|def|const|static|let|var)\b)")
        .unwrap()
});

/// Summarizes one item towards `ratio` of its current size. Returns the item
/// unchanged (same value) when its strategy cannot shrink it.
///
/// Back-references are already minimal and pass through.
pub fn summarize(item: &ContentItem, ratio: f64) -> ContentItem {
    if item.is_back_reference() {
        return item.clone();
    }
    let ratio = ratio.clamp(0.0, 1.0);
    let current = estimate_tokens(&item.content);
    let summary = match item.content_type {
        ContentType::Documentation => summarize_documentation(&item.content),
        ContentType::Code => summarize_code(&item.content),
        ContentType::Error => summarize_error(&item.content),
        ContentType::Json => {
            let allowed = (current as f64 * ratio).floor() as usize;
            truncate_to_tokens(&item.content, allowed)
        }
        ContentType::Text => summarize_sentences(&item.content, ratio),
    };

    if estimate_tokens(&summary) < current {
        item.rewritten(summary, Technique::Summarized)
    } else {
        item.clone()
    }
}

// == Documentation ==
/// Keeps every header and the first two non-blank lines of each section.
pub fn summarize_documentation(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut kept = 0usize;
    let mut elided = 0usize;

    for line in text.lines() {
        if line.trim_start().starts_with('#') {
            push_elision(&mut out, &mut elided, "lines omitted");
            out.push(line.to_string());
            kept = 0;
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        if kept < SECTION_LINES_KEPT {
            out.push(line.to_string());
            kept += 1;
        } else {
            elided += 1;
        }
    }
    push_elision(&mut out, &mut elided, "lines omitted");
    out.join("\n")
}

// == Code ==
/// Keeps imports, exports and top-level declaration lines; bodies collapse to
/// a placeholder once their brace depth returns to zero.
pub fn summarize_code(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut depth: i64 = 0;
    let mut in_body = false;

    for line in text.lines() {
        let opens = line.matches('{').count() as i64;
        let closes = line.matches('}').count() as i64;

        if depth == 0 {
            let keep = IMPORT_OR_EXPORT.is_match(line) || DECLARATION.is_match(line);
            depth = (opens - closes).max(0);
            if keep {
                out.push(line.to_string());
                in_body = depth > 0;
            }
            continue;
        }

        depth = (depth + opens - closes).max(0);
        if depth == 0 && in_body {
            let indent = &line[..line.len() - line.trim_start().len()];
            out.push(format!("{}    /* ... */", indent));
            out.push(line.to_string());
            in_body = false;
        }
    }
    out.join("\n")
}

// == Error ==
/// Keeps the message lines and folds each run of stack frames into one marker.
pub fn summarize_error(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut frames = 0usize;

    for line in text.lines() {
        if STACK_FRAME.is_match(line) {
            frames += 1;
            continue;
        }
        push_elision(&mut out, &mut frames, "lines truncated");
        out.push(line.to_string());
    }
    push_elision(&mut out, &mut frames, "lines truncated");
    out.join("\n")
}

// == Generic ==
/// Keeps the first and last sentence and an even sample of the interior.
pub fn summarize_sentences(text: &str, ratio: f64) -> String {
    let sentences = split_sentences(text);
    let n = sentences.len();
    if n <= 2 {
        return text.to_string();
    }

    let target = ((n as f64 * ratio).round() as usize).max(2);
    if target >= n {
        return text.to_string();
    }

    let interior = n - 2;
    let sample = target - 2;
    let mut kept = vec![sentences[0]];
    for i in 0..sample {
        // centre of the i-th of `sample` equal slices of the interior
        let idx = 1 + ((2 * i + 1) * interior) / (2 * sample);
        kept.push(sentences[idx]);
    }
    kept.push(sentences[n - 1]);
    kept.join(" ")
}

/// Splits on `.`, `!` or `?` followed by whitespace or end of text.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = end;
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

// == Hard Fit ==
/// Cuts content so its estimate is at most `allowed` tokens.
///
/// When the allowance cannot even hold the marker the content is elided
/// completely.
pub fn truncate_to_tokens(content: &str, allowed: usize) -> String {
    if estimate_tokens(content) <= allowed {
        return content.to_string();
    }
    let marker_chars = TRUNCATION_MARKER.chars().count();
    let budget_chars = allowed * CHARS_PER_TOKEN;
    if budget_chars <= marker_chars {
        return String::new();
    }

    let prefix: String = content.chars().take(budget_chars - marker_chars).collect();
    format!("{}{}", prefix.trim_end(), TRUNCATION_MARKER)
}

/// Shrinks non-exempt items, lowest priority and latest position first,
/// until the total estimate is within `max_tokens` or nothing is left to cut.
pub fn fit_to_budget(items: &[ContentItem], max_tokens: usize) -> Vec<ContentItem> {
    let mut out = items.to_vec();
    let mut total: usize = out.iter().map(|i| estimate_tokens(&i.content)).sum();
    if total <= max_tokens {
        return out;
    }

    let mut order: Vec<usize> = (0..out.len()).filter(|&i| !out[i].is_exempt()).collect();
    order.sort_by(|&a, &b| out[a].priority.cmp(&out[b].priority).then(b.cmp(&a)));

    for idx in order {
        if total <= max_tokens {
            break;
        }
        let current = estimate_tokens(&out[idx].content);
        if current == 0 {
            continue;
        }
        let allowed = current.saturating_sub(total - max_tokens);
        let trimmed = out[idx].rewritten(
            truncate_to_tokens(&out[idx].content, allowed),
            Technique::Summarized,
        );
        total = total - current + trimmed.token_estimate;
        out[idx] = trimmed;
    }
    out
}

fn push_elision(out: &mut Vec<String>, count: &mut usize, what: &str) {
    if *count > 0 {
        out.push(format!("[{} {}]", count, what));
        *count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documentation_keeps_headers_and_two_lines() {
        let doc = "# Title\nline one\n\nline two\nline three\nline four\n## Next\nonly line";
        assert_eq!(
            summarize_documentation(doc),
            "# Title\nline one\nline two\n[2 lines omitted]\n## Next\nonly line"
        );
    }

    #[test]
    fn test_code_elides_bodies() {
        let code = "use std::fmt;\n\nfn helper(x: u32) -> u32 {\n    let y = x * 2;\n    if y > 3 {\n        return y;\n    }\n    y\n}\nlet stray = 1;\nstruct Point { x: i32 }\n";
        let summary = summarize_code(code);

        assert_eq!(
            summary,
            "use std::fmt;\nfn helper(x: u32) -> u32 {\n    /* ... */\n}\nlet stray = 1;\nstruct Point { x: i32 }"
        );
    }

    #[test]
    fn test_code_javascript_exports() {
        let code = "import fs from 'fs';\nexport function load(path) {\n  return fs.readFileSync(path);\n}\nconsole.log('side effect');";
        let summary = summarize_code(code);
        assert!(summary.contains("import fs from 'fs';"));
        assert!(summary.contains("export function load(path) {"));
        assert!(!summary.contains("readFileSync"));
        assert!(!summary.contains("console.log"));
    }

    #[test]
    fn test_error_folds_stack_frames() {
        let err = "TypeError: x is undefined\n    at foo (app.js:10:5)\n    at bar (app.js:20:3)\n    at main (app.js:30:1)\nCaused by: boom\n    at baz (lib.js:1:1)";
        assert_eq!(
            summarize_error(err),
            "TypeError: x is undefined\n[3 lines truncated]\nCaused by: boom\n[1 lines truncated]"
        );
    }

    #[test]
    fn test_split_sentences() {
        let s = split_sentences("One. Two! Three? v1.2 stays. Tail without stop");
        assert_eq!(s, vec!["One.", "Two!", "Three?", "v1.2 stays.", "Tail without stop"]);
    }

    #[test]
    fn test_sentences_keep_first_and_last() {
        let text = "S0. S1. S2. S3. S4. S5. S6. S7. S8. S9.";
        let summary = summarize_sentences(text, 0.4);
        assert_eq!(summary, "S0. S3. S7. S9.");
    }

    #[test]
    fn test_sentences_short_text_unchanged() {
        assert_eq!(summarize_sentences("Only. Two.", 0.1), "Only. Two.");
    }

    #[test]
    fn test_truncate_to_tokens_respects_allowance() {
        let content = "x".repeat(400);
        for allowed in [0, 1, 2, 3, 10, 99] {
            let out = truncate_to_tokens(&content, allowed);
            assert!(estimate_tokens(&out) <= allowed, "allowed {}", allowed);
        }
        assert_eq!(truncate_to_tokens(&content, 1), "");
        assert!(truncate_to_tokens(&content, 10).ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_summarize_skips_when_not_smaller() {
        let item = ContentItem::new("e", ContentType::Error, 3, "plain message");
        let out = summarize(&item, 0.5);
        assert_eq!(out, item);
    }

    #[test]
    fn test_fit_trims_lowest_priority_first() {
        let items = vec![
            ContentItem::new("keep", ContentType::Text, 9, "k".repeat(40)),
            ContentItem::new("mid", ContentType::Text, 5, "m".repeat(40)),
            ContentItem::new("low", ContentType::Text, 1, "l".repeat(40)),
        ];

        let out = fit_to_budget(&items, 25);
        let total: usize = out.iter().map(|i| i.token_estimate).sum();

        assert!(total <= 25);
        assert_eq!(out[0], items[0]);
        assert_eq!(out[1], items[1]);
        assert!(out[2].has_technique(Technique::Summarized));
    }

    #[test]
    fn test_fit_never_touches_exempt_items() {
        let items = vec![
            ContentItem::new("a", ContentType::Text, 8, "a".repeat(80)),
            ContentItem::new("b", ContentType::Text, 2, "b".repeat(80)),
        ];

        let out = fit_to_budget(&items, 10);

        assert_eq!(out[0], items[0]);
        assert_eq!(out[1].content, "");
    }
}
