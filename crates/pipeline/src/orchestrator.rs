//! The control loop: queue → context → commands → templates → generation →
//! outbound sink.
//!
//! [`Pipeline`] is the single service object that owns the queue, the
//! per-channel context store and the command table. It is cheap to clone and
//! is handed to every worker task; there is no module-level state.
//!
//! Each event goes through two stages, each serialized per channel by a
//! [`ChannelLanes`] hand-off:
//!
//! - **react**: context append, command dispatch, templated reactions. Fast,
//!   no provider call. Runs in acceptance order per channel.
//! - **generate**: the rate-limited, timeout-bounded provider call. At most
//!   one in flight per channel, in the order the react stage queued them.
//!
//! A worker never waits for a busy channel. It parks the event in that
//! channel's lane and takes the next one from the queue, so a slow reply on
//! one channel holds up neither other channels nor this channel's commands.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use streamchat_config::{AppConfig, PipelineConfig, RespondTo};
use streamchat_core::{
    ChannelError, ChatEvent, ContextEntry, EventKind, OutboundMessage, OutboundSink, Provenance,
    Provider, ProviderError,
};
use streamchat_telemetry::{Counter, PipelineMetrics};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::commands::{CommandDispatcher, DispatchOutcome};
use crate::context::ContextStore;
use crate::generator::ResponseGenerator;
use crate::lanes::{Admission, ChannelLanes};
use crate::queue::{EnqueueOutcome, IngestionQueue, QueueItem};
use crate::rate_limit::RateLimiter;

/// What happened to one dequeued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A message was handed to the sink.
    Emitted(Provenance),
    /// A command ran but had nothing to say.
    CommandWithoutReply,
    /// A command matched and the author lacked the role; denial emitted.
    CommandDenied,
    /// Recorded in context, no reply wanted.
    ContextOnly,
    /// Too old to answer; recorded in context only.
    ShedStale,
    /// The provider failed or timed out; nothing emitted.
    GenerationFailed,
    /// Dropped without touching any state.
    Ignored,
}

struct PipelineInner {
    settings: PipelineConfig,
    bot_username: String,
    queue: IngestionQueue,
    context: ContextStore,
    dispatcher: CommandDispatcher,
    generator: ResponseGenerator,
    limiter: RateLimiter,
    sink: Arc<dyn OutboundSink>,
    metrics: Arc<PipelineMetrics>,
    react_lanes: ChannelLanes<QueueItem>,
    generation_lanes: ChannelLanes<QueueItem>,
}

/// Shared handle to the running pipeline.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Pipeline {
    /// Build a pipeline. The dispatcher's table is frozen from here on.
    pub fn new(
        config: &AppConfig,
        dispatcher: CommandDispatcher,
        provider: Arc<dyn Provider>,
        sink: Arc<dyn OutboundSink>,
    ) -> Self {
        let settings = config.pipeline.clone();
        let metrics = Arc::new(PipelineMetrics::new());

        let inner = PipelineInner {
            queue: IngestionQueue::new(
                settings.queue_capacity,
                settings.queue_shed_policy,
                metrics.clone(),
            ),
            context: ContextStore::with_max_age(
                settings.context_window_size,
                settings.context_max_age(),
            ),
            generator: ResponseGenerator::from_config(provider, config),
            limiter: RateLimiter::new(settings.generation_rate_limit),
            bot_username: config.bot_username.to_lowercase(),
            dispatcher,
            sink,
            metrics,
            react_lanes: ChannelLanes::new(settings.queue_capacity),
            generation_lanes: ChannelLanes::new(settings.queue_capacity),
            settings,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.inner.metrics
    }

    pub fn queue(&self) -> &IngestionQueue {
        &self.inner.queue
    }

    pub fn context(&self) -> &ContextStore {
        &self.inner.context
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.inner.dispatcher
    }

    pub fn settings(&self) -> &PipelineConfig {
        &self.inner.settings
    }

    /// Offer an event from a platform connector. Never blocks.
    pub fn enqueue(&self, event: ChatEvent) -> EnqueueOutcome {
        self.inner.queue.enqueue(event)
    }

    /// Channels with work in flight or parked, in either stage.
    pub fn busy_channels(&self) -> usize {
        self.inner.react_lanes.active() + self.inner.generation_lanes.active()
    }

    fn is_own_message(&self, event: &ChatEvent) -> bool {
        let bot = &self.inner.bot_username;
        event.author_name.to_lowercase() == *bot || event.author_id.to_lowercase() == *bot
    }

    async fn emit(&self, message: OutboundMessage) {
        let channel = message.channel.clone();
        let provenance = message.provenance;
        if let Err(e) = self.inner.sink.deliver(message).await {
            warn!(channel = %channel, %provenance, error = %e, "Failed to deliver outbound message");
        }
    }

    /// Record a bot line in context and hand it to the sink.
    async fn reply(&self, message: OutboundMessage) -> ProcessOutcome {
        let provenance = message.provenance;
        self.inner.context.append(
            &message.channel,
            ContextEntry::bot(&self.inner.bot_username, &message.text),
        );
        self.emit(message).await;
        ProcessOutcome::Emitted(provenance)
    }

    fn is_stale(&self, item: &QueueItem) -> bool {
        item.age() > self.inner.settings.staleness_threshold()
    }

    fn shed_stale(&self, item: &QueueItem) -> ProcessOutcome {
        self.inner.metrics.incr(Counter::GenerationsShedStale);
        debug!(
            channel = %item.event.channel,
            sequence = item.event.sequence,
            age_ms = item.age().as_millis() as u64,
            "Skipping generation for stale event"
        );
        ProcessOutcome::ShedStale
    }

    /// Handle one event end to end, inline. Workers split the same steps
    /// across the two lanes instead.
    pub async fn process(&self, item: QueueItem) -> ProcessOutcome {
        match self.react(&item).await {
            Some(outcome) => outcome,
            None => self.generate_reply(&item).await,
        }
    }

    /// Everything short of a provider call. `None` means the event wants a
    /// generated reply.
    async fn react(&self, item: &QueueItem) -> Option<ProcessOutcome> {
        let inner = &self.inner;
        let event = &item.event;

        if self.is_own_message(event) {
            return Some(ProcessOutcome::Ignored);
        }

        if event.kind == EventKind::Message {
            inner.context.append(
                &event.channel,
                ContextEntry::viewer(&event.author_name, &event.text),
            );
        }

        match inner.dispatcher.dispatch(event, &inner.context) {
            DispatchOutcome::Executed(reply) => {
                inner.metrics.incr(Counter::CommandsDispatched);
                return Some(match reply {
                    Some(message) => self.reply(message).await,
                    None => ProcessOutcome::CommandWithoutReply,
                });
            }
            DispatchOutcome::Denied(message) => {
                inner.metrics.incr(Counter::CommandsDenied);
                self.reply(message).await;
                return Some(ProcessOutcome::CommandDenied);
            }
            DispatchOutcome::NotACommand => {}
        }

        match event.kind {
            EventKind::Follow | EventKind::Subscription | EventKind::Raid => {
                return Some(match inner.generator.template_reaction(event) {
                    Some(text) => {
                        let message = OutboundMessage::new(
                            &event.channel,
                            text,
                            Provenance::TemplatedEvent,
                            event.sequence,
                        );
                        self.reply(message).await
                    }
                    None => ProcessOutcome::Ignored,
                });
            }
            EventKind::CommandInvocation => {
                debug!(channel = %event.channel, text = %event.text, "Unknown command invocation");
                return Some(ProcessOutcome::Ignored);
            }
            EventKind::Message => {}
        }

        if inner.settings.respond_to == RespondTo::Mentions
            && !event.mentions(&inner.bot_username)
        {
            return Some(ProcessOutcome::ContextOnly);
        }

        if self.is_stale(item) {
            return Some(self.shed_stale(item));
        }

        None
    }

    fn give_up(&self, item: &QueueItem, attempt: u32, error: &ProviderError) -> ProcessOutcome {
        self.inner.metrics.incr(Counter::GenerationsFailed);
        warn!(
            channel = %item.event.channel,
            sequence = item.event.sequence,
            provider = %self.inner.generator.provider_name(),
            attempt,
            error = %error,
            "Generation failed, staying silent"
        );
        ProcessOutcome::GenerationFailed
    }

    /// The provider call for one chat line, with at most one retry.
    async fn generate_reply(&self, item: &QueueItem) -> ProcessOutcome {
        let inner = &self.inner;
        let settings = &inner.settings;
        let event = &item.event;
        let attempts = 1 + settings.generation_max_retries.min(1);

        for attempt in 1..=attempts {
            inner.limiter.acquire().await;
            if self.is_stale(item) {
                return self.shed_stale(item);
            }

            let snapshot = inner.context.snapshot(&event.channel);
            let request = inner.generator.build_request(&snapshot, event);
            let result = tokio::time::timeout(
                settings.generation_timeout(),
                inner.generator.generate(request),
            )
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::Timeout(format!(
                    "no completion within {}ms",
                    settings.generation_timeout_ms
                )))
            });

            let error = match result {
                Ok(text) => {
                    inner.metrics.incr(Counter::GenerationsSucceeded);
                    let message = OutboundMessage::new(
                        &event.channel,
                        text,
                        Provenance::Generated,
                        event.sequence,
                    );
                    return self.reply(message).await;
                }
                Err(e) => e,
            };

            if attempt == attempts || !error.is_retryable() {
                return self.give_up(item, attempt, &error);
            }

            let mut backoff = settings.retry_backoff();
            if let ProviderError::RateLimited { retry_after_secs } = &error {
                backoff = backoff.max(Duration::from_secs(*retry_after_secs));
            }
            // A retry has to fit in one call's timeout and land before the
            // event goes stale.
            let budget = settings
                .staleness_threshold()
                .saturating_sub(item.age())
                .min(settings.generation_timeout());
            if backoff > budget {
                debug!(
                    channel = %event.channel,
                    backoff_ms = backoff.as_millis() as u64,
                    budget_ms = budget.as_millis() as u64,
                    "Retry would not fit the latency budget"
                );
                return self.give_up(item, attempt, &error);
            }

            debug!(
                channel = %event.channel,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Retrying generation"
            );
            tokio::time::sleep(backoff).await;
        }

        ProcessOutcome::GenerationFailed
    }

    /// Run `step` for one event, logging its outcome. A panic is logged and
    /// swallowed so the worker and its lanes carry on.
    async fn isolated<T: std::fmt::Debug>(
        worker_id: usize,
        event: &ChatEvent,
        step: impl Future<Output = T>,
    ) -> Option<T> {
        match AssertUnwindSafe(step).catch_unwind().await {
            Ok(outcome) => {
                debug!(
                    worker_id,
                    channel = %event.channel,
                    sequence = event.sequence,
                    ?outcome,
                    "Event step done"
                );
                Some(outcome)
            }
            Err(_) => {
                error!(
                    worker_id,
                    channel = %event.channel,
                    sequence = event.sequence,
                    "Event handling panicked"
                );
                None
            }
        }
    }

    fn count_parked_shed(&self, stage: &str, shed: Option<QueueItem>, counter: Counter) {
        if let Some(item) = shed {
            self.inner.metrics.incr(counter);
            debug!(
                stage,
                channel = %item.event.channel,
                sequence = item.event.sequence,
                "Channel backlog full, shed oldest parked event"
            );
        }
    }

    /// Own `channel`'s react lane: handle `first` and everything parked
    /// behind it, then run any generation this worker claimed.
    async fn drive_channel(&self, worker_id: usize, first: QueueItem) {
        let inner = &self.inner;
        let channel = first.event.channel.clone();
        let mut claimed = None;
        let mut next = Some(first);

        while let Some(item) = next {
            let reaction = Self::isolated(worker_id, &item.event, self.react(&item)).await;
            if let Some(None) = reaction {
                match inner.generation_lanes.admit(&channel, item) {
                    Admission::Run(job) => claimed = Some(job),
                    Admission::Parked { shed } => {
                        self.count_parked_shed("generate", shed, Counter::GenerationsShedStale)
                    }
                }
            }
            next = inner.react_lanes.next(&channel);
        }

        if let Some(job) = claimed {
            self.drive_generation(worker_id, &channel, job).await;
        }
    }

    /// Own `channel`'s generation lane until nothing is parked in it.
    async fn drive_generation(&self, worker_id: usize, channel: &str, first: QueueItem) {
        let mut next = Some(first);
        while let Some(item) = next {
            Self::isolated(worker_id, &item.event, self.generate_reply(&item)).await;
            next = self.inner.generation_lanes.next(channel);
        }
    }

    /// Pull from the queue until it is closed and drained.
    pub async fn run_worker(self, worker_id: usize) {
        debug!(worker_id, "Worker started");
        let inner = &self.inner;
        loop {
            let admission = inner
                .queue
                .dequeue_with(|item| {
                    let channel = item.event.channel.clone();
                    inner.react_lanes.admit(&channel, item)
                })
                .await;
            match admission {
                Some(Admission::Run(item)) => self.drive_channel(worker_id, item).await,
                Some(Admission::Parked { shed }) => {
                    self.count_parked_shed("react", shed, Counter::EventsDropped)
                }
                None => break,
            }
        }
        debug!(worker_id, "Worker stopped");
    }

    pub fn spawn_workers(&self, count: usize) -> Vec<JoinHandle<()>> {
        (0..count.max(1))
            .map(|id| tokio::spawn(self.clone().run_worker(id)))
            .collect()
    }

    /// Forward a connector stream into the queue. Ends when the stream does.
    pub fn spawn_intake(
        &self,
        mut events: mpsc::Receiver<Result<ChatEvent, ChannelError>>,
    ) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            while let Some(next) = events.recv().await {
                match next {
                    Ok(event) => {
                        let outcome = pipeline.enqueue(event);
                        if !outcome.is_accepted() {
                            debug!(?outcome, "Event not queued");
                        }
                    }
                    Err(e) => warn!(error = %e, "Connector reported an error"),
                }
            }
            info!("Connector stream ended");
        })
    }

    /// Drop context windows idle for longer than `max_idle`.
    pub fn reap_idle(&self, max_idle: Duration) -> usize {
        self.inner.context.evict_idle(max_idle)
    }

    /// Periodic [`Pipeline::reap_idle`] until the queue closes. `None` for a
    /// zero interval.
    pub fn spawn_reaper(&self, every: Duration, max_idle: Duration) -> Option<JoinHandle<()>> {
        if every.is_zero() {
            warn!("Idle reaper disabled: zero interval");
            return None;
        }
        let pipeline = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if pipeline.inner.queue.is_closed() {
                    break;
                }
                let evicted = pipeline.reap_idle(max_idle);
                if evicted > 0 {
                    info!(evicted, "Reaped idle channels");
                }
            }
        }))
    }

    /// Log a metrics snapshot every `every` until the queue closes. `None`
    /// for a zero interval, which means stats logging is off.
    pub fn spawn_stats_logger(&self, every: Duration) -> Option<JoinHandle<()>> {
        if every.is_zero() {
            return None;
        }
        let pipeline = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if pipeline.inner.queue.is_closed() {
                    break;
                }
                pipeline.inner.metrics.log_snapshot();
            }
        }))
    }

    /// Stop intake, let the workers drain what is buffered, and wait for them.
    pub async fn shutdown(&self, workers: Vec<JoinHandle<()>>) {
        self.inner.queue.close();
        let pending = self.inner.queue.len();
        info!(pending, "Draining pipeline");
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task failed");
            }
        }
        self.inner.metrics.log_snapshot();
    }
}
