use metrics::{counter, gauge, histogram};
use std::time::Duration;

use crate::models::{Platform, Sentiment};

/// Metric names and recording helpers for the pipeline.
///
/// Without an installed recorder every call is a no-op, so library users
/// and tests pay nothing.
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    /// Messages handed over by collectors
    pub messages_collected_total: &'static str,
    /// Blank messages stored without scoring
    pub messages_skipped_total: &'static str,
    /// Messages scored, per label
    pub messages_classified_total: &'static str,
    /// Records written
    pub records_stored_total: &'static str,
    /// Highlights posted, per target
    pub highlights_published_total: &'static str,
    /// Failures, per platform and stage
    pub errors_total: &'static str,
    /// Confidence distribution
    pub classification_confidence: &'static str,
    /// Cycle wall time
    pub cycle_duration: &'static str,
    /// Cycles finished, by outcome
    pub cycles_total: &'static str,
    /// Platforms taking part in the run
    pub active_platforms: &'static str,
    /// Messages written by `import`
    pub messages_imported_total: &'static str,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            messages_collected_total: "pulse_check_messages_collected_total",
            messages_skipped_total: "pulse_check_messages_skipped_total",
            messages_classified_total: "pulse_check_messages_classified_total",
            records_stored_total: "pulse_check_records_stored_total",
            highlights_published_total: "pulse_check_highlights_published_total",
            errors_total: "pulse_check_errors_total",
            classification_confidence: "pulse_check_classification_confidence",
            cycle_duration: "pulse_check_cycle_duration_seconds",
            cycles_total: "pulse_check_cycles_total",
            active_platforms: "pulse_check_active_platforms",
            messages_imported_total: "pulse_check_messages_imported_total",
        }
    }
}

impl PipelineMetrics {
    /// Fresh messages handed to the classifier
    pub fn record_collected(&self, platform: Platform, count: usize) {
        counter!(self.messages_collected_total, "platform" => platform.as_str()).increment(count as u64);
    }

    /// Messages stored without classification (empty content)
    pub fn record_skipped(&self, platform: Platform) {
        counter!(self.messages_skipped_total, "platform" => platform.as_str()).increment(1);
    }

    /// Count a scored message and record its confidence
    pub fn record_classified(&self, platform: Platform, sentiment: Sentiment, confidence: f64) {
        counter!(
            self.messages_classified_total,
            "platform" => platform.as_str(),
            "sentiment" => sentiment.as_str()
        )
        .increment(1);
        histogram!(self.classification_confidence, "platform" => platform.as_str()).record(confidence);
    }

    /// Count a written record
    pub fn record_stored(&self, platform: Platform) {
        counter!(self.records_stored_total, "platform" => platform.as_str()).increment(1);
    }

    /// A highlight posted to `target`
    pub fn record_published(&self, target: Platform) {
        counter!(self.highlights_published_total, "platform" => target.as_str()).increment(1);
    }

    /// A failure at a pipeline stage
    pub fn record_error(&self, platform: Platform, stage: &'static str) {
        counter!(self.errors_total, "platform" => platform.as_str(), "stage" => stage).increment(1);
    }

    /// Record a finished cycle
    pub fn record_cycle(&self, duration: Duration, success: bool) {
        let status = if success { "success" } else { "aborted" };
        counter!(self.cycles_total, "status" => status).increment(1);
        histogram!(self.cycle_duration).record(duration.as_secs_f64());
    }

    /// Platforms in the current session
    pub fn set_active_platforms(&self, count: usize) {
        gauge!(self.active_platforms).set(count as f64);
    }

    /// Count imported messages
    pub fn record_imported(&self, count: usize) {
        counter!(self.messages_imported_total).increment(count as u64);
    }
}
