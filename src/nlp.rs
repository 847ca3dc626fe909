use std::collections::{HashMap, HashSet};

use regex::Regex;
use stop_words::{get, LANGUAGE};
use unicode_normalization::UnicodeNormalization;

use crate::config::ClassifierConfig;
use crate::error::{PulseError, Result};
use crate::models::GENERAL_TOPIC;

/// Chat filler that carries no topic even though it is not an English stopword
pub const DEFAULT_FILLER_WORDS: &[&str] = &[
    "just", "like", "really", "gonna", "wanna", "gotta", "yeah", "yes", "nope", "okay", "lol",
    "lmao", "haha", "thing", "things", "stuff", "also", "still", "even", "much", "well", "know",
    "think", "make", "want", "going", "getting", "dont", "cant", "wont", "didnt", "doesnt",
    "isnt", "thats", "youre", "theyre", "there", "here", "http", "https", "www", "amp",
];

/// Shortest content worth extracting topics from
const MIN_TOPIC_INPUT_CHARS: usize = 5;

/// Tokens this short are never topics
const MAX_DISCARDED_TOKEN_CHARS: usize = 3;

/// Text normalization shared by topic extraction and lexicon scoring
pub struct TextCleaner {
    url_regex: Regex,
    punctuation_regex: Regex,
    extra_spaces_regex: Regex,
}

impl TextCleaner {
    /// Compile the cleaning expressions
    pub fn new() -> Result<Self> {
        let url_regex = Regex::new(r"https?://\S+|www\.\S+")
            .map_err(|e| PulseError::Other(format!("Failed to compile URL regex: {e}")))?;
        let punctuation_regex = Regex::new(r"[^\w\s]")
            .map_err(|e| PulseError::Other(format!("Failed to compile punctuation regex: {e}")))?;
        let extra_spaces_regex = Regex::new(r"\s+")
            .map_err(|e| PulseError::Other(format!("Failed to compile spaces regex: {e}")))?;

        Ok(Self {
            url_regex,
            punctuation_regex,
            extra_spaces_regex,
        })
    }

    /// Lowercase, drop URLs and punctuation, collapse whitespace
    #[must_use]
    pub fn clean(&self, text: &str) -> String {
        let normalized = text.nfc().collect::<String>().to_lowercase();
        let no_urls = self.url_regex.replace_all(&normalized, " ");
        let no_punctuation = self.punctuation_regex.replace_all(&no_urls, "");
        self.extra_spaces_regex
            .replace_all(&no_punctuation, " ")
            .trim()
            .to_string()
    }
}

/// Keyword-frequency topic extraction.
///
/// Output depends only on the input text and the stopword configuration
/// fixed at construction.
pub struct TopicExtractor {
    cleaner: TextCleaner,
    stopwords: HashSet<String>,
    max_topics: usize,
    max_chars: usize,
}

impl TopicExtractor {
    /// Create an extractor with English stopwords plus `extra_stopwords`
    pub fn new(max_topics: usize, max_chars: usize, extra_stopwords: &[String]) -> Result<Self> {
        let mut stopwords: HashSet<String> = get(LANGUAGE::English)
            .iter()
            .map(ToString::to_string)
            .collect();
        stopwords.extend(extra_stopwords.iter().map(|word| word.to_lowercase()));

        Ok(Self {
            cleaner: TextCleaner::new()?,
            stopwords,
            max_topics,
            max_chars,
        })
    }

    /// Build from classifier configuration
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        Self::new(config.max_topics, config.max_topic_chars, &config.extra_stopwords)
    }

    /// Extract up to `max_topics` keywords as a comma-joined string.
    ///
    /// Returns [`GENERAL_TOPIC`] for short input or when nothing survives
    /// filtering. The joined string is cut at `max_chars` characters even
    /// when that splits a keyword.
    #[must_use]
    pub fn extract_topics(&self, content: &str) -> String {
        if content.chars().count() < MIN_TOPIC_INPUT_CHARS {
            return GENERAL_TOPIC.to_string();
        }

        let cleaned = self.cleaner.clean(content);
        let ranked = rank_by_frequency(self.tokenize(&cleaned));
        if ranked.is_empty() {
            return GENERAL_TOPIC.to_string();
        }

        let joined = ranked
            .into_iter()
            .take(self.max_topics)
            .collect::<Vec<_>>()
            .join(", ");
        joined.chars().take(self.max_chars).collect()
    }

    /// Split cleaned text and drop stopwords and short tokens
    #[must_use]
    pub fn tokenize<'a>(&self, cleaned: &'a str) -> Vec<&'a str> {
        cleaned
            .split_whitespace()
            .filter(|token| token.chars().count() > MAX_DISCARDED_TOKEN_CHARS)
            .filter(|token| !self.stopwords.contains(*token))
            .collect()
    }
}

/// Most frequent first; equal counts keep first-occurrence order
fn rank_by_frequency(tokens: Vec<&str>) -> Vec<&str> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for token in tokens {
        if let Some(&index) = positions.get(token) {
            counts[index].1 += 1;
        } else {
            positions.insert(token, counts.len());
            counts.push((token, 1));
        }
    }

    // sort_by is stable, so ties stay in first-seen order
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().map(|(token, _)| token).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> TopicExtractor {
        let filler: Vec<String> = DEFAULT_FILLER_WORDS.iter().map(ToString::to_string).collect();
        TopicExtractor::new(2, 95, &filler).expect("Failed to create topic extractor")
    }

    #[test]
    fn test_clean_text() {
        let cleaner = TextCleaner::new().expect("Failed to create cleaner");

        let cleaned = cleaner.clean("Check out https://example.com for more info");
        assert!(!cleaned.contains("https"));
        assert!(!cleaned.contains("example"));

        let cleaned = cleaner.clean("Hello, world! How are you?");
        assert_eq!(cleaned, "hello world how are you");

        let cleaned = cleaner.clean("  Too   many    spaces   ");
        assert_eq!(cleaned, "too many spaces");
    }

    #[test]
    fn test_short_and_empty_content() {
        let extractor = extractor();
        assert_eq!(extractor.extract_topics(""), GENERAL_TOPIC);
        assert_eq!(extractor.extract_topics("wow"), GENERAL_TOPIC);
        assert_eq!(extractor.extract_topics("the and of it"), GENERAL_TOPIC);
    }

    #[test]
    fn test_community_scenario() {
        let extractor = extractor();
        let topics =
            extractor.extract_topics("I just love this community, everyone is so kind!!! http://x.co");

        let allowed = ["love", "community", "everyone", "kind"];
        let parts: Vec<&str> = topics.split(", ").collect();
        assert_eq!(parts.len(), 2, "unexpected topics: {topics}");
        assert!(parts.iter().all(|part| allowed.contains(part)), "unexpected topics: {topics}");
        assert!(!topics.contains("http"));
        assert!(!topics.contains("just"));
    }

    #[test]
    fn test_frequency_then_first_occurrence() {
        let extractor = extractor();
        assert_eq!(
            extractor.extract_topics("mango zebra zebra apple apple"),
            "zebra, apple"
        );
    }

    #[test]
    fn test_hard_truncation() {
        let extractor = extractor();
        let long_a = "a".repeat(60);
        let long_b = "b".repeat(60);
        let topics = extractor.extract_topics(&format!("{long_a} {long_b}"));

        assert_eq!(topics.chars().count(), 95);
        assert!(topics.starts_with(&long_a));
        assert!(topics.ends_with(&"b".repeat(33)));
    }
}
