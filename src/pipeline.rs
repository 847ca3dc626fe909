//! Collection cycle orchestration.
//!
//! One cycle collects from every available platform concurrently, then
//! classifies, stores and (in publish mode) selects and posts highlights.
//! [`Pipeline::run`] repeats cycles on a warm-up/steady schedule until the
//! duration elapses or the cancellation token fires.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::classifier::SentimentAnalyzer;
use crate::config::{AppConfig, PipelineConfig, PublishRoute, SelectionConfig};
use crate::db::ContentStore;
use crate::error::{PulseError, Result};
use crate::ledger::{DedupLedger, PROCESSED_NAMESPACE, PUBLISHED_NAMESPACE};
use crate::logging::OperationTimer;
use crate::metrics::PipelineMetrics;
use crate::models::{Message, Platform, RunMode, ScoredMessage, SelectionQuery, SentimentRecord};
use crate::nlp::TopicExtractor;
use crate::platforms::{collect_new, compose_summary, CollectContext, FallbackSource};
use crate::session::Session;

/// Where the orchestrator currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed, nothing run yet
    Idle,
    /// Logging in to platforms
    Authenticating,
    /// Fetching new messages
    Collecting,
    /// Scoring messages
    Classifying,
    /// Writing messages and records
    Storing,
    /// Picking highlights
    Selecting,
    /// Posting highlights
    Publishing,
    /// Waiting for the next cycle
    Sleeping,
    /// Loop finished
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Authenticating => "authenticating",
            Self::Collecting => "collecting",
            Self::Classifying => "classifying",
            Self::Storing => "storing",
            Self::Selecting => "selecting",
            Self::Publishing => "publishing",
            Self::Sleeping => "sleeping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Delay between cycles: short while warming up, then the steady interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSchedule {
    /// Delay during warm-up
    pub warmup_interval: Duration,
    /// Cycles run at the warm-up delay
    pub warmup_cycles: u32,
    /// Steady-state delay
    pub interval: Duration,
}

impl CycleSchedule {
    /// Schedule from pipeline settings
    #[must_use]
    pub const fn from_config(config: &PipelineConfig) -> Self {
        Self {
            warmup_interval: Duration::from_secs(config.warmup_interval_secs),
            warmup_cycles: config.warmup_cycles,
            interval: Duration::from_secs(config.interval_secs),
        }
    }

    /// Same delay for every cycle
    #[must_use]
    pub const fn fixed(interval: Duration) -> Self {
        Self {
            warmup_interval: interval,
            warmup_cycles: 0,
            interval,
        }
    }

    /// Sleep after `completed` cycles have run (1-based)
    #[must_use]
    pub const fn delay_after(&self, completed: u32) -> Duration {
        if completed <= self.warmup_cycles {
            self.warmup_interval
        } else {
            self.interval
        }
    }
}

/// When [`Pipeline::run`] stops on its own
#[derive(Debug, Clone, Copy, Default)]
pub struct StopCondition {
    /// Wall-clock budget for the whole run
    pub duration: Option<Duration>,
    /// Cycle budget
    pub max_cycles: Option<u32>,
}

impl StopCondition {
    /// Run for `minutes` of wall-clock time
    pub fn minutes(minutes: u64) -> Result<Self> {
        let secs = minutes
            .checked_mul(60)
            .ok_or_else(|| PulseError::InvalidConfig(format!("run duration of {minutes} minutes is too long")))?;
        Ok(Self {
            duration: Some(Duration::from_secs(secs)),
            max_cycles: None,
        })
    }

    /// A single cycle
    #[must_use]
    pub const fn single_cycle() -> Self {
        Self {
            duration: None,
            max_cycles: Some(1),
        }
    }
}

/// Counters for one platform in one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformReport {
    /// New messages handed over by the collector
    pub collected: usize,
    /// Blank messages stored without a record
    pub skipped_empty: usize,
    /// Messages the model scored
    pub classified: usize,
    /// Records written to the store
    pub stored: usize,
    /// Records a dry run held back from the store
    pub simulated: usize,
    /// Messages that failed classification or storage
    pub failed: usize,
    /// Highlights posted from this platform
    pub published: usize,
    /// Highlights whose post was rejected
    pub publish_failed: usize,
}

/// Outcome of one cycle, keyed by platform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Counters per participating platform
    pub platforms: BTreeMap<Platform, PlatformReport>,
    /// Posts a dry run composed instead of sending, as `(target, text)`
    pub previews: Vec<(Platform, String)>,
}

impl CycleReport {
    fn entry(&mut self, platform: Platform) -> &mut PlatformReport {
        self.platforms.entry(platform).or_default()
    }

    /// Report for one platform; zeros when it did not take part
    #[must_use]
    pub fn get(&self, platform: Platform) -> PlatformReport {
        self.platforms.get(&platform).copied().unwrap_or_default()
    }

    /// Records written across platforms
    #[must_use]
    pub fn total_stored(&self) -> usize {
        self.platforms.values().map(|r| r.stored).sum()
    }

    /// Highlights posted across platforms
    #[must_use]
    pub fn total_published(&self) -> usize {
        self.platforms.values().map(|r| r.published).sum()
    }
}

/// Totals for a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Cycles started
    pub cycles: u32,
    /// Cycles that ended in an error
    pub aborted_cycles: u32,
    /// Records written
    pub stored: usize,
    /// Highlights posted
    pub published: usize,
}

/// Cycle orchestrator
pub struct Pipeline {
    settings: PipelineConfig,
    selection: SelectionConfig,
    routes: Vec<PublishRoute>,
    context: CollectContext,
    store: Arc<dyn ContentStore>,
    processed: DedupLedger,
    published: DedupLedger,
    analyzer: SentimentAnalyzer,
    topics: TopicExtractor,
    session: Session,
    metrics: PipelineMetrics,
    state: PipelineState,
    /// Records a dry run would have stored; selection reads them with the store
    staged: Vec<ScoredMessage>,
}

impl Pipeline {
    /// Assemble a pipeline from configuration and an authenticated session
    pub fn new(config: &AppConfig, store: Arc<dyn ContentStore>, session: Session) -> Result<Self> {
        let analyzer = SentimentAnalyzer::from_config(&config.classifier)?;
        Self::with_analyzer(config, store, session, analyzer)
    }

    /// Same as [`Pipeline::new`] with a caller-supplied classifier
    pub fn with_analyzer(
        config: &AppConfig,
        store: Arc<dyn ContentStore>,
        session: Session,
        analyzer: SentimentAnalyzer,
    ) -> Result<Self> {
        let ledger_dir = &config.pipeline.ledger_dir;
        Ok(Self {
            settings: config.pipeline.clone(),
            selection: config.selection.clone(),
            routes: config.routes.clone(),
            context: CollectContext {
                channel_id: config.pipeline.channel_id.clone(),
            },
            store,
            processed: DedupLedger::open(ledger_dir, PROCESSED_NAMESPACE)?,
            published: DedupLedger::open(ledger_dir, PUBLISHED_NAMESPACE)?,
            analyzer,
            topics: TopicExtractor::from_config(&config.classifier)?,
            session,
            metrics: PipelineMetrics::default(),
            state: PipelineState::Idle,
            staged: Vec::new(),
        })
    }

    /// Current orchestrator state
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Identifiers already classified
    #[must_use]
    pub const fn processed_ledger(&self) -> &DedupLedger {
        &self.processed
    }

    /// Highlights already posted, keyed `source:message_id` per target
    #[must_use]
    pub const fn published_ledger(&self) -> &DedupLedger {
        &self.published
    }

    fn enter(&mut self, state: PipelineState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Pipeline state change");
            self.state = state;
        }
    }

    const fn fallback(&self) -> FallbackSource {
        if self.settings.dry_run {
            FallbackSource::Synthetic
        } else {
            FallbackSource::Empty
        }
    }

    /// Run one full cycle.
    ///
    /// Per-message failures are logged and counted. An error means the
    /// content store is unreachable or selection failed; the cycle is aborted.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let timer = OperationTimer::new("cycle");
        let result = self.cycle_inner().await;
        let duration = timer.finish();
        self.metrics.record_cycle(duration, result.is_ok());
        result
    }

    async fn cycle_inner(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let active = self.session.active_platforms();
        self.metrics.set_active_platforms(active.len());

        self.enter(PipelineState::Collecting);
        let batches = self.collect_all(&active).await;

        for (platform, messages) in batches {
            self.process_batch(platform, messages, &mut report)?;
        }

        if self.settings.mode == RunMode::Publish {
            self.publish_highlights(&mut report).await?;
        }

        for (platform, entry) in &report.platforms {
            info!(
                platform = %platform,
                collected = entry.collected,
                stored = entry.stored,
                simulated = entry.simulated,
                skipped = entry.skipped_empty,
                failed = entry.failed,
                published = entry.published,
                dry_run = self.settings.dry_run,
                "Cycle finished for platform"
            );
        }
        if !report.previews.is_empty() {
            info!(previews = report.previews.len(), "DRY-RUN: Composed posts not sent");
        }
        Ok(report)
    }

    async fn collect_all(&self, active: &[Platform]) -> Vec<(Platform, Vec<Message>)> {
        let ledger = &self.processed;
        let context = &self.context;
        let limit = self.settings.collect_limit;
        let fallback = self.fallback();

        let tasks = active.iter().filter_map(|&platform| {
            self.session.slot(platform).collector().map(move |collector| async move {
                let messages = collect_new(collector.as_ref(), context, ledger, limit, fallback).await;
                (platform, messages)
            })
        });
        join_all(tasks).await
    }

    fn process_batch(&mut self, platform: Platform, messages: Vec<Message>, report: &mut CycleReport) -> Result<()> {
        report.entry(platform).collected += messages.len();
        self.metrics.record_collected(platform, messages.len());

        self.enter(PipelineState::Classifying);
        let mut scored: Vec<(Message, Option<SentimentRecord>)> = Vec::with_capacity(messages.len());
        for message in messages {
            if message.is_blank() {
                debug!(platform = %platform, message_id = %message.message_id, "Empty content; storing without classification");
                report.entry(platform).skipped_empty += 1;
                self.metrics.record_skipped(platform);
                scored.push((message, None));
                continue;
            }

            match self.analyzer.classify(&message.content) {
                Ok(classification) => {
                    let topics = self.topics.extract_topics(&message.content);
                    self.metrics
                        .record_classified(platform, classification.label, classification.confidence);
                    report.entry(platform).classified += 1;
                    let record = SentimentRecord::from_classification(&message, classification, topics);
                    scored.push((message, Some(record)));
                }
                Err(e) => {
                    // Left unmarked so the next cycle retries it
                    warn!(platform = %platform, message_id = %message.message_id, error = %e, "Classification failed");
                    report.entry(platform).failed += 1;
                    self.metrics.record_error(platform, "classify");
                }
            }
        }

        self.enter(PipelineState::Storing);
        for (message, record) in scored {
            match self.store_one(&message, record.as_ref()) {
                Ok(()) if record.is_none() => {}
                Ok(()) if self.settings.dry_run => report.entry(platform).simulated += 1,
                Ok(()) => {
                    report.entry(platform).stored += 1;
                    self.metrics.record_stored(platform);
                }
                Err(e) if e.is_connectivity() => {
                    error!(platform = %platform, error = %e, "Content store unavailable; aborting cycle");
                    self.metrics.record_error(platform, "store");
                    return Err(e);
                }
                Err(e) => {
                    error!(platform = %platform, message_id = %message.message_id, error = %e, "Failed to store message");
                    report.entry(platform).failed += 1;
                    self.metrics.record_error(platform, "store");
                }
            }
        }
        Ok(())
    }

    /// Persist a message and its record, then mark it processed
    fn store_one(&mut self, message: &Message, record: Option<&SentimentRecord>) -> Result<()> {
        let platform = message.platform;

        if self.settings.dry_run {
            match record {
                Some(record) => info!(
                    platform = %platform,
                    message_id = %message.message_id,
                    sentiment = %record.sentiment,
                    confidence = record.confidence,
                    topics = %record.topics,
                    "DRY-RUN: Would store sentiment record"
                ),
                None => info!(platform = %platform, message_id = %message.message_id, "DRY-RUN: Would store message"),
            }
            if let Some(record) = record {
                let mut message = message.clone();
                // Untimed messages count as seen now
                message.timestamp.get_or_insert_with(Utc::now);
                self.staged.push(ScoredMessage {
                    message,
                    record: record.clone(),
                });
            }
            self.processed.mark_processed(platform, &message.message_id);
            return Ok(());
        }

        self.store.upsert_message(message)?;
        if let Some(record) = record {
            self.store.upsert_sentiment(record)?;
        }
        self.processed.mark_and_persist(platform, &message.message_id)?;
        Ok(())
    }

    async fn publish_highlights(&mut self, report: &mut CycleReport) -> Result<()> {
        let routes: Vec<PublishRoute> = self
            .routes
            .iter()
            .copied()
            .filter(|route| self.session.is_available(route.target))
            .collect();

        for route in routes {
            self.enter(PipelineState::Selecting);
            let since = self.selection.window_start(route.source, Utc::now()).ok_or_else(|| {
                PulseError::InvalidConfig(format!(
                    "{} selection window of {} days is out of range",
                    route.source,
                    self.selection.window_days(route.source)
                ))
            })?;
            let candidates = self.select_candidates(&SelectionQuery {
                platform: route.source,
                since,
                min_confidence: self.settings.confidence_floor,
                limit: self.settings.posts_per_platform.saturating_mul(2),
                order: self.settings.order,
            })?;

            let fresh: Vec<_> = candidates
                .into_iter()
                .filter(|item| {
                    !self
                        .published
                        .is_processed(route.target, &published_key(route.source, &item.message.message_id))
                })
                .take(self.settings.posts_per_platform)
                .collect();
            if fresh.is_empty() {
                debug!(source = %route.source, target = %route.target, "No new highlights");
                continue;
            }

            self.enter(PipelineState::Publishing);
            let publisher = self.session.slot(route.target).publisher();
            for item in fresh {
                let key = published_key(route.source, &item.message.message_id);
                let text = compose_summary(
                    &self.settings.summary_tag,
                    route.source,
                    &item.message.content,
                    item.record.confidence,
                    &item.record.topics,
                );

                if self.settings.dry_run {
                    info!(target_platform = %route.target, "DRY-RUN: Would post to {}: {text}", route.target.display_name());
                    self.published.mark_processed(route.target, &key);
                    report.previews.push((route.target, text));
                    continue;
                }

                let Some(publisher) = publisher.as_ref() else {
                    warn!(target_platform = %route.target, "No publisher for target platform");
                    break;
                };
                match publisher.publish(&text).await {
                    Ok(()) => {
                        report.entry(route.source).published += 1;
                        self.metrics.record_published(route.target);
                        if let Err(e) = self.published.mark_and_persist(route.target, &key) {
                            error!(error = %e, "Failed to persist published ledger");
                        }
                    }
                    Err(e) => {
                        error!(target_platform = %route.target, message_id = %item.message.message_id, error = %e, "Failed to publish highlight");
                        report.entry(route.source).publish_failed += 1;
                        self.metrics.record_error(route.target, "publish");
                    }
                }
            }
        }
        Ok(())
    }

    /// Store selection, plus records staged by a dry run under the same query
    fn select_candidates(&self, query: &SelectionQuery) -> Result<Vec<ScoredMessage>> {
        let mut candidates = self.store.select_top_positive(query)?;
        if self.staged.is_empty() {
            return Ok(candidates);
        }

        candidates.retain(|stored| {
            !self.staged.iter().any(|staged| {
                staged.message.platform == stored.message.platform
                    && staged.message.message_id == stored.message.message_id
            })
        });
        candidates.extend(self.staged.iter().filter(|item| query.matches(item)).cloned());
        query.order.sort(&mut candidates);
        candidates.truncate(query.limit);
        Ok(candidates)
    }

    /// Repeat cycles until the stop condition is met or `cancel` fires.
    ///
    /// Cancellation is honoured between cycles and during sleeps; a cycle in
    /// flight always completes. Aborted cycles are logged and retried on the
    /// next iteration.
    pub async fn run(&mut self, schedule: CycleSchedule, stop: StopCondition, cancel: CancellationToken) -> RunSummary {
        // A budget past the clock's range means no deadline
        let deadline = stop.duration.and_then(|budget| Instant::now().checked_add(budget));
        let mut summary = RunSummary::default();

        info!(
            platforms = ?self.session.active_platforms(),
            dry_run = self.settings.dry_run,
            mode = ?self.settings.mode,
            "Starting collection loop"
        );

        loop {
            if cancel.is_cancelled() {
                info!("Cancellation requested; stopping");
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                info!("Run duration elapsed; stopping");
                break;
            }

            summary.cycles += 1;
            match self.run_cycle().await {
                Ok(report) => {
                    summary.stored += report.total_stored();
                    summary.published += report.total_published();
                }
                Err(e) => {
                    summary.aborted_cycles += 1;
                    error!(cycle = summary.cycles, error = %e, "Cycle aborted; retrying next iteration");
                }
            }

            if stop.max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }

            let mut delay = schedule.delay_after(summary.cycles);
            if let Some(d) = deadline {
                delay = delay.min(d.saturating_duration_since(Instant::now()));
            }

            self.enter(PipelineState::Sleeping);
            debug!(delay_secs = delay.as_secs_f64(), "Sleeping until next cycle");
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Cancellation requested; stopping");
                    break;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        if let Err(e) = self.persist_ledgers() {
            error!(error = %e, "Failed to persist ledgers on shutdown");
        }
        self.enter(PipelineState::Stopped);
        info!(
            cycles = summary.cycles,
            aborted = summary.aborted_cycles,
            stored = summary.stored,
            published = summary.published,
            "Collection loop stopped"
        );
        summary
    }

    fn persist_ledgers(&self) -> Result<()> {
        if self.settings.dry_run {
            debug!("DRY-RUN: Would persist ledgers");
            return Ok(());
        }
        self.processed.persist_state()?;
        self.published.persist_state()
    }
}

/// Authenticate the requested platforms and assemble a pipeline.
///
/// Fails when no platform is available.
pub async fn start(config: &AppConfig, store: Arc<dyn ContentStore>, requested: &[Platform]) -> Result<Pipeline> {
    info!(state = %PipelineState::Authenticating, requested = ?requested, "Starting pipeline");
    let session = crate::session::authenticate(config, requested, config.pipeline.dry_run).await;
    session.require_any()?;
    Pipeline::new(config, store, session)
}

/// Ledger key for a published highlight; sources share a target ledger
fn published_key(source: Platform, message_id: &str) -> String {
    format!("{}:{message_id}", source.as_str())
}
