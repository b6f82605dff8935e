/// Rough token estimate: one token per four characters.
pub fn estimate_tokens(text: &str) -> f64 {
    text.chars().count() as f64 / 4.0
}

/// Normalized memory pressure of a token total against a budget, clamped to [0, 1].
pub fn memory_fraction(total_tokens: f64, budget: f64) -> f64 {
    if budget <= 0.0 {
        return 1.0;
    }
    (total_tokens / budget).clamp(0.0, 1.0)
}

/// Count of whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimation() {
        assert_eq!(estimate_tokens(""), 0.0);
        assert_eq!(estimate_tokens("abcd"), 1.0);
        assert_eq!(estimate_tokens("abcdef"), 1.5);
    }

    #[test]
    fn test_memory_fraction_is_clamped() {
        assert_eq!(memory_fraction(5_000.0, 10_000.0), 0.5);
        assert_eq!(memory_fraction(50_000.0, 10_000.0), 1.0);
        assert_eq!(memory_fraction(0.0, 10_000.0), 0.0);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  hello   there world "), 3);
        assert_eq!(word_count(""), 0);
    }
}
