//! Text utilities for bounding diagnostic output.

/// Default word bound applied to retry hints.
pub const RETRY_TAIL_WORDS: usize = 100;

/// Returns the last `n` whitespace-separated words of `s`, joined by single
/// spaces.
///
/// The result is always a suffix of `s`'s tokens; an empty input yields an
/// empty string. Used to keep retry feedback bounded regardless of how
/// verbose an execution trace was.
pub fn last_n_words(s: &str, n: usize) -> String {
    let words: Vec<&str> = s.split_whitespace().collect();
    let start = words.len().saturating_sub(n);
    words[start..].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_n_words_shorter_input() {
        assert_eq!(last_n_words("one two three", 10), "one two three");
    }

    #[test]
    fn test_last_n_words_truncates_to_suffix() {
        assert_eq!(last_n_words("a b c d e", 2), "d e");
    }

    #[test]
    fn test_last_n_words_empty() {
        assert_eq!(last_n_words("", 5), "");
        assert_eq!(last_n_words("   ", 5), "");
    }

    #[test]
    fn test_last_n_words_zero() {
        assert_eq!(last_n_words("a b c", 0), "");
    }

    #[test]
    fn test_last_n_words_collapses_whitespace() {
        assert_eq!(last_n_words("a\n b\t\tc", 3), "a b c");
    }
}
