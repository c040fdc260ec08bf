//! Token estimation.
//!
//! A fixed four-characters-per-token heuristic, no tokenizer. The `SQLite`
//! triggers use the same rule (`length(content) / 4`), so stored and
//! recomputed estimates always agree.

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimates the token count of `text` as `floor(chars / 4)`.
///
/// Characters are Unicode scalar values, matching `SQLite` `length()` on TEXT.
///
/// ```rust
/// use kbase::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 0);
/// assert_eq!(estimate_tokens("abc"), 0);
/// assert_eq!(estimate_tokens("abcdefgh"), 2);
/// ```
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("", 0 ; "empty")]
    #[test_case("abc", 0 ; "below one token")]
    #[test_case("abcd", 1 ; "exactly one token")]
    #[test_case("abcdefghi", 2 ; "rounds down")]
    #[test_case("日本語のテキスト", 2 ; "counts characters not bytes")]
    fn test_estimate_tokens(text: &str, expected: usize) {
        assert_eq!(estimate_tokens(text), expected);
    }
}
