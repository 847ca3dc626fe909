//! Topic extraction, classification bounds and summary composition

use proptest::prelude::*;
use pulse_check::classifier::{LexiconModel, SentimentAnalyzer, SentimentModel};
use pulse_check::models::GENERAL_TOPIC;
use pulse_check::nlp::{TopicExtractor, DEFAULT_FILLER_WORDS};
use pulse_check::platforms::{compose_summary, snippet};
use pulse_check::Platform;

fn extractor() -> TopicExtractor {
    let filler: Vec<String> = DEFAULT_FILLER_WORDS.iter().map(ToString::to_string).collect();
    TopicExtractor::new(2, 95, &filler).expect("Failed to create topic extractor")
}

#[test]
fn test_topics_for_real_chat() {
    let extractor = extractor();

    let topics = extractor.extract_topics("The release party was great, release notes are up!");
    assert!(topics.starts_with("release"), "unexpected topics: {topics}");

    assert_eq!(extractor.extract_topics("ok"), GENERAL_TOPIC);
    assert_eq!(extractor.extract_topics("https://example.com/path"), GENERAL_TOPIC);
}

#[test]
fn test_summary_for_long_content() {
    let content = "c".repeat(51);
    let text = compose_summary("PulseCheck", Platform::Bluesky, &content, 0.9, "gardening");

    assert_eq!(
        text,
        format!("PulseCheck: Bluesky buzzing about gardening: '{}...' (Score: 0.90)", "c".repeat(50))
    );
}

#[test]
fn test_lexicon_classifies_through_analyzer() {
    let analyzer = SentimentAnalyzer::new(Box::new(LexiconModel::new().expect("model")), 512);

    let positive = analyzer.classify("I absolutely love this community").expect("classify");
    assert_eq!(positive.label, pulse_check::Sentiment::Positive);
    assert!(positive.confidence > 0.8);

    let negative = analyzer.classify("this update is terrible").expect("classify");
    assert_eq!(negative.label, pulse_check::Sentiment::Negative);
}

proptest! {
    #[test]
    fn prop_topics_are_deterministic_and_bounded(text in "\\PC{0,300}") {
        let extractor = extractor();
        let first = extractor.extract_topics(&text);
        prop_assert_eq!(&first, &extractor.extract_topics(&text));
        prop_assert!(!first.is_empty());
        prop_assert!(first.chars().count() <= 95);
    }

    #[test]
    fn prop_snippet_law(text in "\\PC{0,120}") {
        let cut = snippet(&text);
        let length = text.chars().count();
        if length <= 50 {
            prop_assert_eq!(cut, text);
        } else {
            prop_assert_eq!(cut.chars().count(), 53);
            prop_assert!(cut.ends_with("..."));
            let head: String = text.chars().take(50).collect();
            prop_assert!(cut.starts_with(&head));
        }
    }

    #[test]
    fn prop_lexicon_confidence_in_unit_range(text in "[a-z ]{1,200}") {
        let model = LexiconModel::new().expect("model");
        let result = model.score(&text).expect("score");
        prop_assert!((0.0..=1.0).contains(&result.confidence));
    }
}
