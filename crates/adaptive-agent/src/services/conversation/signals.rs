use anyhow::Result;
use regex::Regex;

use super::types::CommunicationStyle;
use crate::utils::token_estimator::word_count;

const STOP_WORDS: [&str; 8] = ["this", "that", "with", "from", "they", "have", "been", "will"];

/// Derives topic tags and communication style from message text.
pub trait SignalExtractor: Send + Sync {
    /// Topic candidates from the first `limit` eligible words, in order of
    /// appearance with repeats collapsed.
    fn topics(&self, content: &str, limit: usize) -> Vec<String>;

    fn style(&self, content: &str) -> CommunicationStyle;
}

/// Word-length heuristic: lower-cased words of four or more characters,
/// minus a small stop list. Style comes from word count.
pub struct HeuristicSignals {
    word: Regex,
}

impl HeuristicSignals {
    pub fn new() -> Result<Self> {
        Ok(Self {
            word: Regex::new(r"\b\w{4,}\b")?,
        })
    }
}

impl SignalExtractor for HeuristicSignals {
    fn topics(&self, content: &str, limit: usize) -> Vec<String> {
        let lowered = content.to_lowercase();
        let mut topics: Vec<String> = Vec::with_capacity(limit);

        let candidates = self
            .word
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|word| !STOP_WORDS.contains(word))
            .take(limit);
        for word in candidates {
            if !topics.iter().any(|t| t == word) {
                topics.push(word.to_string());
            }
        }

        topics
    }

    fn style(&self, content: &str) -> CommunicationStyle {
        match word_count(content) {
            n if n < 5 => CommunicationStyle::Concise,
            n if n > 20 => CommunicationStyle::Detailed,
            _ => CommunicationStyle::Balanced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics_skip_stop_words_and_short_words() {
        let signals = HeuristicSignals::new().unwrap();
        let topics = signals.topics("This is about Rust with async runtimes and tokio", 3);
        assert_eq!(topics, vec!["about", "rust", "async"]);
    }

    #[test]
    fn test_topics_are_distinct() {
        let signals = HeuristicSignals::new().unwrap();
        let topics = signals.topics("cache eviction CACHE", 3);
        assert_eq!(topics, vec!["cache", "eviction"]);
    }

    #[test]
    fn test_repeats_count_against_the_limit() {
        let signals = HeuristicSignals::new().unwrap();
        let topics = signals.topics("cache cache CACHE eviction", 3);
        assert_eq!(topics, vec!["cache"]);

        let topics = signals.topics("this tokio tokio with runtime scheduling", 3);
        assert_eq!(topics, vec!["tokio", "runtime"]);
    }

    #[test]
    fn test_style_by_word_count() {
        let signals = HeuristicSignals::new().unwrap();
        assert_eq!(signals.style("short one"), CommunicationStyle::Concise);
        assert_eq!(
            signals.style("this is a perfectly ordinary question about caching"),
            CommunicationStyle::Balanced
        );
        let long = "word ".repeat(21);
        assert_eq!(signals.style(&long), CommunicationStyle::Detailed);
    }
}
