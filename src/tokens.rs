//! Token estimation
//!
//! Approximates LLM token counts with a fixed characters-per-token ratio.

/// Characters counted as one token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Returns `ceil(char_count / 4)`. An estimate, not a tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Sums the estimates of several fragments.
pub fn estimate_total<'a, I>(texts: I) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    texts.into_iter().map(estimate_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_estimate_counts_chars_not_bytes() {
        // four multi-byte characters
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn test_estimate_total() {
        assert_eq!(estimate_total(["abcd", "abcde", ""]), 3);
    }
}
