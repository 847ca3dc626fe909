//! Sentiment classification adapter
//!
//! [`SentimentAnalyzer`] wraps any [`SentimentModel`] and enforces the
//! input and output contract: blank input is refused, input is truncated to
//! the model's limit, and confidences outside `[0, 1]` are rejected.

use std::collections::HashMap;

use tracing::debug;

use crate::config::ClassifierConfig;
use crate::error::{PulseError, Result};
use crate::models::{Classification, Sentiment};
use crate::nlp::TextCleaner;

/// A pretrained or rule-based binary sentiment scorer
pub trait SentimentModel: Send + Sync {
    /// Short model identifier for logs
    fn name(&self) -> &str;

    /// Score already-truncated text
    fn score(&self, text: &str) -> Result<Classification>;
}

/// Weighted word-list model with intensifiers and negation
pub struct LexiconModel {
    cleaner: TextCleaner,
    weights: HashMap<&'static str, f32>,
    intensifiers: HashMap<&'static str, f32>,
}

const POSITIVE_WORDS: &[(&str, f32)] = &[
    ("good", 1.0),
    ("great", 1.5),
    ("excellent", 2.0),
    ("amazing", 2.0),
    ("wonderful", 1.8),
    ("fantastic", 1.8),
    ("happy", 1.2),
    ("joy", 1.5),
    ("love", 2.0),
    ("like", 1.0),
    ("best", 1.5),
    ("better", 1.2),
    ("awesome", 1.8),
    ("perfect", 2.0),
    ("brilliant", 1.8),
    ("kind", 1.2),
    ("helpful", 1.5),
    ("thanks", 1.2),
    ("thank", 1.2),
    ("nice", 1.0),
    ("beautiful", 1.8),
    ("delightful", 1.5),
    ("pleased", 1.2),
    ("excited", 1.5),
    ("thrilled", 1.8),
    ("grateful", 1.5),
    ("welcoming", 1.5),
    ("successful", 1.5),
    ("win", 1.5),
];

const NEGATIVE_WORDS: &[(&str, f32)] = &[
    ("bad", -1.0),
    ("terrible", -2.0),
    ("awful", -2.0),
    ("horrible", -2.0),
    ("worst", -2.0),
    ("hate", -2.0),
    ("dislike", -1.0),
    ("poor", -1.2),
    ("disappointing", -1.5),
    ("sad", -1.2),
    ("angry", -1.5),
    ("upset", -1.2),
    ("frustrated", -1.5),
    ("annoyed", -1.2),
    ("broken", -1.5),
    ("toxic", -1.8),
    ("rude", -1.5),
    ("scam", -2.0),
    ("spam", -1.2),
    ("useless", -1.5),
    ("worthless", -1.8),
    ("worried", -1.2),
    ("scared", -1.5),
];

const INTENSIFIERS: &[(&str, f32)] = &[
    ("very", 1.5),
    ("extremely", 2.0),
    ("incredibly", 2.0),
    ("absolutely", 2.0),
    ("totally", 1.8),
    ("really", 1.3),
    ("so", 1.2),
    ("quite", 1.2),
    ("somewhat", 0.8),
    ("slightly", 0.7),
    ("barely", 0.5),
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "none", "nothing", "nobody", "neither", "nor", "dont", "doesnt",
    "isnt", "wasnt", "cant", "wont",
];

impl LexiconModel {
    /// Build the default English lexicon
    pub fn new() -> Result<Self> {
        Ok(Self {
            cleaner: TextCleaner::new()?,
            weights: POSITIVE_WORDS.iter().chain(NEGATIVE_WORDS).copied().collect(),
            intensifiers: INTENSIFIERS.iter().copied().collect(),
        })
    }

    /// Polarity in `[-1.0, 1.0]`; zero when no sentiment words are present
    #[must_use]
    pub fn polarity(&self, text: &str) -> f32 {
        let cleaned = self.cleaner.clean(text);
        let words: Vec<&str> = cleaned.split_whitespace().collect();
        let mut total = 0.0_f32;
        let mut hits = 0.0_f32;

        for (i, word) in words.iter().enumerate() {
            let Some(weight) = self.weights.get(*word) else {
                continue;
            };
            let mut sentiment = *weight;

            if let Some(intensity) = i.checked_sub(1).and_then(|p| self.intensifiers.get(words[p])) {
                sentiment *= intensity;
            }

            let negated = words[i.saturating_sub(2)..i]
                .iter()
                .any(|previous| NEGATIONS.contains(previous));
            if negated {
                sentiment = -sentiment * 0.8; // Flip and reduce intensity
            }

            total += sentiment;
            hits += 1.0;
        }

        if hits == 0.0 {
            0.0
        } else {
            (total / hits).clamp(-1.0, 1.0)
        }
    }
}

impl SentimentModel for LexiconModel {
    fn name(&self) -> &str {
        "lexicon"
    }

    fn score(&self, text: &str) -> Result<Classification> {
        let polarity = f64::from(self.polarity(text));
        let label = if polarity < 0.0 {
            Sentiment::Negative
        } else {
            Sentiment::Positive
        };
        Ok(Classification {
            label,
            confidence: 0.5 + polarity.abs() / 2.0,
        })
    }
}

/// DistilBERT SST-2 sentiment pipeline
#[cfg(feature = "advanced-nlp")]
pub struct TransformerModel {
    model: std::sync::Mutex<rust_bert::pipelines::sentiment::SentimentModel>,
}

#[cfg(feature = "advanced-nlp")]
impl TransformerModel {
    /// Load the default pretrained weights
    pub fn new() -> Result<Self> {
        let model = rust_bert::pipelines::sentiment::SentimentModel::new(Default::default())
            .map_err(|e| PulseError::Classification(format!("Failed to load model: {e}")))?;
        Ok(Self {
            model: std::sync::Mutex::new(model),
        })
    }
}

#[cfg(feature = "advanced-nlp")]
impl SentimentModel for TransformerModel {
    fn name(&self) -> &str {
        "distilbert-sst2"
    }

    fn score(&self, text: &str) -> Result<Classification> {
        use rust_bert::pipelines::sentiment::SentimentPolarity;

        let model = self
            .model
            .lock()
            .map_err(|_| PulseError::Classification("model lock poisoned".to_string()))?;
        let output = model.predict([text]);
        let first = output
            .first()
            .ok_or_else(|| PulseError::Classification("model returned no prediction".to_string()))?;

        let label = match first.polarity {
            SentimentPolarity::Positive => Sentiment::Positive,
            SentimentPolarity::Negative => Sentiment::Negative,
        };
        Ok(Classification {
            label,
            confidence: first.score,
        })
    }
}

/// Contract-enforcing wrapper around a sentiment model
pub struct SentimentAnalyzer {
    model: Box<dyn SentimentModel>,
    max_input_chars: usize,
}

impl SentimentAnalyzer {
    /// Wrap a model with an input limit in characters
    #[must_use]
    pub fn new(model: Box<dyn SentimentModel>, max_input_chars: usize) -> Self {
        Self {
            model,
            max_input_chars,
        }
    }

    /// Pick the model compiled into this build
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        #[cfg(feature = "advanced-nlp")]
        let model: Box<dyn SentimentModel> = Box::new(TransformerModel::new()?);
        #[cfg(not(feature = "advanced-nlp"))]
        let model: Box<dyn SentimentModel> = Box::new(LexiconModel::new()?);

        Ok(Self::new(model, config.max_input_chars))
    }

    /// Name of the wrapped model
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Score content; only the model input is truncated
    pub fn classify(&self, content: &str) -> Result<Classification> {
        if content.trim().is_empty() {
            return Err(PulseError::EmptyContent);
        }

        let input = truncate_chars(content, self.max_input_chars);
        let classification = self.model.score(input)?;
        if !(0.0..=1.0).contains(&classification.confidence) {
            return Err(PulseError::Classification(format!(
                "{} returned confidence {} outside [0, 1]",
                self.model.name(),
                classification.confidence
            )));
        }

        debug!(
            model = self.model.name(),
            label = %classification.label,
            confidence = classification.confidence,
            "Classified content"
        );
        Ok(classification)
    }
}

/// Prefix of at most `max_chars` characters, cut on a char boundary
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
