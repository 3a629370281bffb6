//! The request router: every model call goes through here.
//!
//! Dispatch order: fingerprint → cache → in-flight dedup → priority queue →
//! token-bucket rate limiter → backend call with per-kind deadline → retry
//! with exponential backoff and jitter → validator → fallback. Background
//! work (enrichment, summarization) shares the queue at lower priority and
//! delivers its results over a completion channel drained at task-loop
//! checkpoints.

use crate::actors::NpcArchetype;
use crate::cache::{Claim, InFlight, ResponseCache};
use crate::context::ContextBundle;
use crate::fallback;
use crate::metrics::{MetricsSink, RequestOutcome};
use crate::validate::{self, ValidatedResponse};
use crate::world::{Biome, Coordinate};
use llm::{Backend, CompletionRequest};
use rand::Rng;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Semaphore};

/// The kinds of intelligence request the core issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    RoomDescription,
    NpcDialogue,
    CombatNarration,
    QuestGeneration,
    /// Background upgrade of procedural placeholder content.
    Enrichment,
    Summarization,
}

impl RequestKind {
    pub fn name(&self) -> &'static str {
        match self {
            RequestKind::RoomDescription => "room_description",
            RequestKind::NpcDialogue => "npc_dialogue",
            RequestKind::CombatNarration => "combat_narration",
            RequestKind::QuestGeneration => "quest_generation",
            RequestKind::Enrichment => "enrichment",
            RequestKind::Summarization => "summarization",
        }
    }

    pub fn temperature(&self) -> f32 {
        match self {
            RequestKind::RoomDescription | RequestKind::Enrichment => 0.8,
            RequestKind::NpcDialogue | RequestKind::QuestGeneration => 0.7,
            RequestKind::CombatNarration => 0.6,
            RequestKind::Summarization => 0.3,
        }
    }

    /// Queue priority; lower runs first.
    pub fn priority(&self) -> u8 {
        match self {
            RequestKind::NpcDialogue => 1,
            RequestKind::RoomDescription => 2,
            RequestKind::CombatNarration | RequestKind::QuestGeneration => 3,
            RequestKind::Enrichment => 4,
            RequestKind::Summarization => 5,
        }
    }

    /// Per-call completion deadline. Dialogue is tight, summarization
    /// generous.
    pub fn deadline(&self) -> Duration {
        match self {
            RequestKind::NpcDialogue => Duration::from_secs(8),
            RequestKind::CombatNarration => Duration::from_secs(6),
            RequestKind::RoomDescription => Duration::from_secs(12),
            RequestKind::QuestGeneration => Duration::from_secs(15),
            RequestKind::Enrichment => Duration::from_secs(20),
            RequestKind::Summarization => Duration::from_secs(30),
        }
    }

    pub fn max_tokens(&self) -> usize {
        match self {
            RequestKind::NpcDialogue => 300,
            RequestKind::CombatNarration => 150,
            RequestKind::RoomDescription | RequestKind::Enrichment => 800,
            RequestKind::QuestGeneration => 400,
            RequestKind::Summarization => 200,
        }
    }

    /// Soft cache lifetime for validated responses of this kind.
    pub fn cache_ttl(&self) -> Duration {
        match self {
            RequestKind::NpcDialogue => Duration::from_secs(120),
            RequestKind::CombatNarration => Duration::from_secs(300),
            RequestKind::RoomDescription | RequestKind::Enrichment => Duration::from_secs(600),
            RequestKind::QuestGeneration => Duration::from_secs(900),
            RequestKind::Summarization => Duration::from_secs(3600),
        }
    }

    /// How long a request may wait on the rate limiter before it elevates
    /// to fallback.
    pub fn rate_limit_wait(&self) -> Duration {
        match self {
            RequestKind::NpcDialogue | RequestKind::CombatNarration => Duration::from_secs(2),
            RequestKind::RoomDescription | RequestKind::QuestGeneration => Duration::from_secs(3),
            RequestKind::Enrichment => Duration::from_secs(10),
            RequestKind::Summarization => Duration::from_secs(30),
        }
    }
}

/// What the fallback engine needs to stand in for a failed request.
#[derive(Debug, Clone)]
pub enum FallbackSpec {
    Room {
        biome: Biome,
    },
    Dialogue {
        archetype: NpcArchetype,
    },
    Combat {
        action: String,
        enemy: String,
        outcome: String,
        is_crit: bool,
    },
    Quest {
        template_id: String,
    },
    Summary {
        lines: Vec<String>,
        max_tokens: usize,
    },
}

impl FallbackSpec {
    /// Produce the deterministic substitute, seeded by the fingerprint.
    pub fn generate(&self, seed: u64) -> ValidatedResponse {
        match self {
            FallbackSpec::Room { biome } => {
                ValidatedResponse::Room(fallback::room_description(*biome, seed))
            }
            FallbackSpec::Dialogue { archetype } => {
                ValidatedResponse::Dialogue(fallback::npc_dialogue(*archetype, seed))
            }
            FallbackSpec::Combat {
                action,
                enemy,
                outcome,
                is_crit,
            } => ValidatedResponse::Combat(fallback::combat_narration(
                action, enemy, outcome, *is_crit, seed,
            )),
            FallbackSpec::Quest { template_id } => {
                ValidatedResponse::Quest(fallback::quest_content(template_id, seed))
            }
            FallbackSpec::Summary { lines, max_tokens } => {
                ValidatedResponse::Summary(fallback::summary(lines, *max_tokens))
            }
        }
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Model,
    Fallback,
    Cache,
    Dedup,
}

/// A validated response plus its provenance.
#[derive(Debug, Clone)]
pub struct RouterResult {
    pub response: ValidatedResponse,
    pub source: ResponseSource,
}

/// Identifies what a completed background request was for.
#[derive(Debug, Clone)]
pub enum BackgroundTag {
    Enrichment { coord: Coordinate },
    QuestGeneration { quest: crate::quests::QuestId },
    Summarization,
}

/// A completed background request, delivered at task-loop checkpoints.
#[derive(Debug)]
pub struct BackgroundCompletion {
    pub tag: BackgroundTag,
    pub result: RouterResult,
}

/// Router tuning knobs.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub requests_per_minute: u32,
    pub per_kind_per_minute: u32,
    /// Concurrent backend calls.
    pub concurrency: usize,
    pub cache_capacity: usize,
    pub retry_attempts: u32,
    pub retry_base: Duration,
    pub retry_jitter: Duration,
    /// Overrides every kind's rate-limit wait; tests use this.
    pub wait_timeout_override: Option<Duration>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            per_kind_per_minute: 30,
            concurrency: 2,
            cache_capacity: 256,
            retry_attempts: 3,
            retry_base: Duration::from_millis(200),
            retry_jitter: Duration::from_millis(100),
            wait_timeout_override: None,
        }
    }
}

enum Delivery {
    Foreground(oneshot::Sender<RouterResult>),
    Background(BackgroundTag),
}

struct Job {
    kind: RequestKind,
    bundle: ContextBundle,
    fallback: FallbackSpec,
    delivery: Delivery,
    seq: u64,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}
impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap pops its maximum; invert so the lowest (priority, seq) pair is
// the maximum. Within a priority, lower seq pops first: FIFO.
impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .kind
            .priority()
            .cmp(&self.kind.priority())
            .then(other.seq.cmp(&self.seq))
    }
}

// ============================================================================
// Rate limiting
// ============================================================================

struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn per_minute(count: u32) -> Self {
        let capacity = count.max(1) as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        self.last_refill = Instant::now();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
    }

    fn available(&mut self) -> bool {
        self.refill();
        self.tokens >= 1.0
    }

    fn take(&mut self) {
        self.tokens -= 1.0;
    }

    /// Time until one token is available.
    fn eta(&self) -> Duration {
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_per_sec)
        }
    }
}

struct RateLimiter {
    total: TokenBucket,
    per_kind: HashMap<RequestKind, TokenBucket>,
    per_kind_per_minute: u32,
}

impl RateLimiter {
    fn new(config: &RouterConfig) -> Self {
        Self {
            total: TokenBucket::per_minute(config.requests_per_minute),
            per_kind: HashMap::new(),
            per_kind_per_minute: config.per_kind_per_minute,
        }
    }

    /// Take one token from both the total and the per-kind bucket, or
    /// report how long until both could have one.
    fn try_acquire(&mut self, kind: RequestKind) -> Result<(), Duration> {
        let per_kind_per_minute = self.per_kind_per_minute;
        let kind_bucket = self
            .per_kind
            .entry(kind)
            .or_insert_with(|| TokenBucket::per_minute(per_kind_per_minute));
        let total_ok = self.total.available();
        let kind_ok = kind_bucket.available();
        if total_ok && kind_ok {
            self.total.take();
            kind_bucket.take();
            Ok(())
        } else {
            Err(self.total.eta().max(kind_bucket.eta()))
        }
    }
}

// ============================================================================
// Router
// ============================================================================

struct RouterInner {
    backend: Arc<dyn Backend>,
    cache: ResponseCache,
    inflight: InFlight,
    limiter: Mutex<RateLimiter>,
    metrics: MetricsSink,
    config: RouterConfig,
    background_tx: mpsc::UnboundedSender<BackgroundCompletion>,
    seq: AtomicU64,
}

/// Handle to the dispatch pipeline. Cloning shares the pipeline.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
    job_tx: mpsc::UnboundedSender<Job>,
}

impl Router {
    /// Build a router over a backend and spawn its dispatcher. The returned
    /// receiver delivers completed background work; the engine drains it at
    /// task-loop checkpoints.
    pub fn new(
        backend: Arc<dyn Backend>,
        config: RouterConfig,
        metrics: MetricsSink,
    ) -> (Self, mpsc::UnboundedReceiver<BackgroundCompletion>) {
        let (background_tx, background_rx) = mpsc::unbounded_channel();
        let (job_tx, job_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(RouterInner {
            backend,
            cache: ResponseCache::new(config.cache_capacity),
            inflight: InFlight::new(),
            limiter: Mutex::new(RateLimiter::new(&config)),
            metrics,
            config,
            background_tx,
            seq: AtomicU64::new(0),
        });

        tokio::spawn(dispatch_loop(inner.clone(), job_rx));

        (Self { inner, job_tx }, background_rx)
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    pub fn metrics(&self) -> &MetricsSink {
        &self.inner.metrics
    }

    /// Foreground request: resolves to a validated response, from the
    /// cache, an overlapping request, the model, or the fallback engine.
    /// This never returns an error; that is the point.
    pub async fn request(
        &self,
        kind: RequestKind,
        bundle: ContextBundle,
        fallback: FallbackSpec,
    ) -> RouterResult {
        let fingerprint = bundle.fingerprint;

        if let Some(hit) = self.inner.cache.get(&fingerprint) {
            self.inner
                .metrics
                .record_outcome(kind, RequestOutcome::CacheHit, Duration::ZERO, None);
            return RouterResult {
                response: hit,
                source: ResponseSource::Cache,
            };
        }

        match self.inner.inflight.claim(fingerprint) {
            Claim::Follower(rx) => {
                self.inner
                    .metrics
                    .record_outcome(kind, RequestOutcome::Deduped, Duration::ZERO, None);
                match rx.await {
                    Ok((response, _)) => RouterResult {
                        response,
                        source: ResponseSource::Dedup,
                    },
                    Err(_) => self.emergency_fallback(&bundle, &fallback),
                }
            }
            Claim::Leader => {
                let (tx, rx) = oneshot::channel();
                self.enqueue(kind, bundle.clone(), fallback.clone(), Delivery::Foreground(tx));
                match rx.await {
                    Ok(result) => result,
                    Err(_) => self.emergency_fallback(&bundle, &fallback),
                }
            }
        }
    }

    /// Background request: fire and forget; the result arrives on the
    /// completion channel tagged with `tag`.
    pub fn schedule(
        &self,
        kind: RequestKind,
        bundle: ContextBundle,
        fallback: FallbackSpec,
        tag: BackgroundTag,
    ) {
        let fingerprint = bundle.fingerprint;

        if let Some(hit) = self.inner.cache.get(&fingerprint) {
            self.inner
                .metrics
                .record_outcome(kind, RequestOutcome::CacheHit, Duration::ZERO, None);
            let _ = self.inner.background_tx.send(BackgroundCompletion {
                tag,
                result: RouterResult {
                    response: hit,
                    source: ResponseSource::Cache,
                },
            });
            return;
        }

        match self.inner.inflight.claim(fingerprint) {
            Claim::Follower(rx) => {
                self.inner
                    .metrics
                    .record_outcome(kind, RequestOutcome::Deduped, Duration::ZERO, None);
                let tx = self.inner.background_tx.clone();
                tokio::spawn(async move {
                    if let Ok((response, _)) = rx.await {
                        let _ = tx.send(BackgroundCompletion {
                            tag,
                            result: RouterResult {
                                response,
                                source: ResponseSource::Dedup,
                            },
                        });
                    }
                });
            }
            Claim::Leader => {
                self.enqueue(kind, bundle, fallback, Delivery::Background(tag));
            }
        }
    }

    fn enqueue(
        &self,
        kind: RequestKind,
        bundle: ContextBundle,
        fallback: FallbackSpec,
        delivery: Delivery,
    ) {
        let seq = self.inner.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let job = Job {
            kind,
            bundle,
            fallback,
            delivery,
            seq,
        };
        if self.job_tx.send(job).is_err() {
            tracing::error!(kind = kind.name(), "dispatcher is gone; request dropped");
        }
    }

    /// Used only when the dispatcher vanished mid-request; still honors the
    /// never-stall contract.
    fn emergency_fallback(&self, bundle: &ContextBundle, fallback: &FallbackSpec) -> RouterResult {
        RouterResult {
            response: fallback.generate(bundle.fingerprint.seed()),
            source: ResponseSource::Fallback,
        }
    }
}

/// Pulls jobs in (priority, FIFO) order and runs them on a bounded number
/// of concurrent slots.
async fn dispatch_loop(inner: Arc<RouterInner>, mut job_rx: mpsc::UnboundedReceiver<Job>) {
    let semaphore = Arc::new(Semaphore::new(inner.config.concurrency.max(1)));
    let mut heap: BinaryHeap<Job> = BinaryHeap::new();

    loop {
        while let Ok(job) = job_rx.try_recv() {
            heap.push(job);
        }
        if heap.is_empty() {
            match job_rx.recv().await {
                Some(job) => {
                    heap.push(job);
                    continue;
                }
                None => break,
            }
        }

        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        // Work that arrived while waiting for a slot may outrank the heap top.
        while let Ok(job) = job_rx.try_recv() {
            heap.push(job);
        }
        let Some(job) = heap.pop() else {
            continue;
        };

        let inner = inner.clone();
        tokio::spawn(async move {
            let _permit = permit;
            execute_job(inner, job).await;
        });
    }
}

async fn execute_job(inner: Arc<RouterInner>, job: Job) {
    let kind = job.kind;
    let fingerprint = job.bundle.fingerprint;
    let started = Instant::now();

    let (response, from_fallback, usage) = generate(&inner, &job).await;

    let outcome = if from_fallback {
        RequestOutcome::Fallback
    } else {
        RequestOutcome::Success
    };
    inner
        .metrics
        .record_outcome(kind, outcome, started.elapsed(), usage);

    inner.cache.insert(fingerprint, kind, response.clone());
    inner
        .inflight
        .complete(&fingerprint, (response.clone(), from_fallback));

    let result = RouterResult {
        response,
        source: if from_fallback {
            ResponseSource::Fallback
        } else {
            ResponseSource::Model
        },
    };
    match job.delivery {
        Delivery::Foreground(tx) => {
            let _ = tx.send(result);
        }
        Delivery::Background(tag) => {
            let _ = inner.background_tx.send(BackgroundCompletion { tag, result });
        }
    }
}

/// The generation pipeline for one job: rate limit, retries, validation.
/// Always produces a response; failures become fallbacks, never errors.
async fn generate(
    inner: &Arc<RouterInner>,
    job: &Job,
) -> (ValidatedResponse, bool, Option<(u64, u64)>) {
    let kind = job.kind;
    let seed = job.bundle.fingerprint.seed();
    let wait_timeout = inner
        .config
        .wait_timeout_override
        .unwrap_or_else(|| kind.rate_limit_wait());

    if !acquire_rate_limit(inner, kind, wait_timeout).await {
        inner.metrics.record_rate_limit_timeout(kind);
        tracing::warn!(kind = kind.name(), "rate limit wait exceeded, serving fallback");
        return (job.fallback.generate(seed), true, None);
    }

    let request = CompletionRequest::new(job.bundle.system.clone(), job.bundle.payload.clone())
        .with_temperature(kind.temperature())
        .with_max_tokens(kind.max_tokens())
        .with_deadline(kind.deadline());

    for attempt in 1..=inner.config.retry_attempts {
        match inner.backend.complete(request.clone()).await {
            Ok(completion) => {
                let usage = Some((
                    completion.usage.prompt_tokens as u64,
                    completion.usage.completion_tokens as u64,
                ));
                match validate::validate(kind, &completion.text) {
                    Ok(validated) => return (validated, false, usage),
                    Err(error) => {
                        // Post-repair validation failure does not retry.
                        inner.metrics.record_validation_failure(kind);
                        tracing::warn!(
                            kind = kind.name(),
                            %error,
                            "validation failed, serving fallback"
                        );
                        return (job.fallback.generate(seed), true, usage);
                    }
                }
            }
            Err(error) if error.is_retryable() => {
                inner.metrics.record_retry(kind);
                tracing::debug!(
                    kind = kind.name(),
                    attempt,
                    %error,
                    "transient backend failure"
                );
                if attempt < inner.config.retry_attempts {
                    tokio::time::sleep(backoff_delay(&inner.config, attempt)).await;
                }
            }
            Err(error) => {
                tracing::warn!(
                    kind = kind.name(),
                    %error,
                    "non-retryable backend failure, serving fallback"
                );
                return (job.fallback.generate(seed), true, None);
            }
        }
    }

    (job.fallback.generate(seed), true, None)
}

async fn acquire_rate_limit(
    inner: &Arc<RouterInner>,
    kind: RequestKind,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let wait = {
            let mut limiter = inner.limiter.lock().expect("limiter lock");
            match limiter.try_acquire(kind) {
                Ok(()) => return true,
                Err(wait) => wait,
            }
        };
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        let sleep_for = wait
            .max(Duration::from_millis(10))
            .min(deadline - now);
        tokio::time::sleep(sleep_for).await;
    }
}

/// Exponential backoff with jitter: `base * 2^(attempt-1) + rand(jitter)`.
fn backoff_delay(config: &RouterConfig, attempt: u32) -> Duration {
    let exp = config.retry_base * 2u32.saturating_pow(attempt.saturating_sub(1));
    let jitter_ms = config.retry_jitter.as_millis() as u64;
    let jitter = if jitter_ms == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    };
    exp + jitter
}
