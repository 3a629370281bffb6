//! Testing utilities.
//!
//! `MockBackend` scripts the LLM seam so retry, validation, and fallback
//! paths run for real without a network; `TestHarness` wires a session
//! around it with a fixed seed. Both are public: downstream integrations
//! test against the same seam.

use crate::actions::{PlayerAction, ResponseBundle};
use crate::metrics::MetricsSink;
use crate::router::RouterConfig;
use crate::session::{GameSession, SessionConfig};
use crate::world::{Coordinate, Room};
use async_trait::async_trait;
use llm::{Backend, Completion, CompletionRequest, Error, Usage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A scripted backend result.
#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    Transient(String),
    RateLimited,
    Auth(String),
    Invalid(String),
}

impl Scripted {
    fn into_result(self, model: &str) -> Result<Completion, Error> {
        match self {
            Scripted::Text(text) => {
                let completion_tokens = text.chars().count() / 4;
                Ok(Completion {
                    text,
                    model: model.to_string(),
                    usage: Usage {
                        prompt_tokens: 100,
                        completion_tokens,
                    },
                })
            }
            Scripted::Transient(message) => Err(Error::Transient(message)),
            Scripted::RateLimited => Err(Error::RateLimited { retry_after: None }),
            Scripted::Auth(message) => Err(Error::Auth(message)),
            Scripted::Invalid(message) => Err(Error::Invalid(message)),
        }
    }
}

/// A scripted `llm::Backend`.
///
/// Results queue in FIFO order; when the queue runs dry the default
/// behavior applies. The default default is a transient failure, which
/// makes a bare mock behave like an unreachable model: everything falls
/// back deterministically.
pub struct MockBackend {
    queue: Mutex<VecDeque<Scripted>>,
    default: Mutex<Scripted>,
    delay: Mutex<Duration>,
    calls: AtomicU64,
    prompts: Mutex<Vec<(String, String)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default: Mutex::new(Scripted::Transient("mock backend is offline".into())),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicU64::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A backend that fails transiently on every call.
    pub fn always_transient() -> Self {
        Self::new()
    }

    /// Queue a text response.
    pub fn push_text(&self, text: impl Into<String>) {
        self.queue
            .lock()
            .expect("mock lock")
            .push_back(Scripted::Text(text.into()));
    }

    /// Queue a typed error.
    pub fn push_error(&self, error: Error) {
        let scripted = match error {
            Error::Transient(m) => Scripted::Transient(m),
            Error::RateLimited { .. } => Scripted::RateLimited,
            Error::Auth(m) => Scripted::Auth(m),
            Error::Invalid(m) => Scripted::Invalid(m),
        };
        self.queue.lock().expect("mock lock").push_back(scripted);
    }

    /// Set the response every call gets once the queue is empty.
    pub fn set_default_text(&self, text: impl Into<String>) {
        *self.default.lock().expect("mock lock") = Scripted::Text(text.into());
    }

    /// Simulated latency per call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("mock lock") = delay;
    }

    /// How many completions were attempted.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// The (system, prompt) pairs seen so far.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().expect("mock lock").clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, Error> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.prompts
            .lock()
            .expect("mock lock")
            .push((request.system.clone(), request.prompt.clone()));

        let delay = *self.delay.lock().expect("mock lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .queue
            .lock()
            .expect("mock lock")
            .pop_front()
            .unwrap_or_else(|| self.default.lock().expect("mock lock").clone());
        scripted.into_result(request.model.as_deref().unwrap_or("mock-model"))
    }
}

/// Router config tuned for tests: instant retries.
pub fn fast_router_config() -> RouterConfig {
    RouterConfig {
        retry_base: Duration::from_millis(1),
        retry_jitter: Duration::from_millis(1),
        ..RouterConfig::default()
    }
}

/// A full session over a `MockBackend`, with a fixed seed.
pub struct TestHarness {
    pub backend: Arc<MockBackend>,
    pub session: GameSession,
}

impl TestHarness {
    /// Harness with the default seed and player.
    pub async fn new() -> Self {
        Self::with_seed("test-seed").await
    }

    /// Harness with a specific world seed.
    pub async fn with_seed(seed: &str) -> Self {
        Self::with_config(
            SessionConfig::new("Test Campaign")
                .with_player_name("Hero")
                .with_seed(seed)
                .with_router(fast_router_config()),
        )
        .await
    }

    pub async fn with_config(config: SessionConfig) -> Self {
        let backend = Arc::new(MockBackend::new());
        let session = GameSession::new(backend.clone(), config).await;
        Self { backend, session }
    }

    /// Run one action to completion.
    pub async fn perform(&mut self, action: PlayerAction) -> ResponseBundle {
        self.session
            .perform(action)
            .await
            .expect("non-fatal action")
    }

    /// Let in-flight background work land.
    pub async fn settle(&mut self) {
        self.session
            .engine_mut()
            .settle(Duration::from_millis(100))
            .await;
    }

    pub fn metrics(&self) -> MetricsSink {
        self.session.metrics()
    }

    pub fn player_hp(&self) -> (i32, i32) {
        let derived = &self.session.engine().player().derived;
        (derived.hp, derived.max_hp)
    }

    pub fn position(&self) -> Coordinate {
        self.session.engine().world().current_position()
    }

    pub fn room_at(&self, coord: Coordinate) -> Option<&Room> {
        self.session.engine().world().room(coord)
    }

    pub fn current_room(&self) -> &Room {
        self.session
            .engine()
            .world()
            .current_room()
            .expect("player stands in a generated room")
    }

    pub fn event_count(&self) -> u64 {
        self.session.engine().memory().event_count()
    }

    /// Leave combat and strip the current room's enemies, so exploration
    /// tests can walk freely through whatever the seed spawned.
    pub fn clear_combat(&mut self) {
        let engine = self.session.engine_mut();
        engine.clear_combat();
        let position = engine.world().current_position();
        if let Some(room) = engine.world_mut().room_mut(position) {
            room.enemies.clear();
            room.cleared = true;
        }
    }
}

// ============================================================================
// Assertion helpers
// ============================================================================

/// Assert the player is at the given coordinates.
#[track_caller]
pub fn assert_position(harness: &TestHarness, x: i32, y: i32, z: i32) {
    let position = harness.position();
    assert_eq!(
        position,
        Coordinate::new(x, y, z),
        "Expected player at ({x}, {y}, {z}), found {position}"
    );
}

/// Assert a room exists at the given coordinates.
#[track_caller]
pub fn assert_room_exists(harness: &TestHarness, x: i32, y: i32, z: i32) {
    assert!(
        harness.room_at(Coordinate::new(x, y, z)).is_some(),
        "Expected a generated room at ({x}, {y}, {z})"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend_scripting() {
        let backend = MockBackend::new();
        backend.push_text("first");
        backend.push_error(Error::Auth("nope".into()));

        let request = CompletionRequest::new("sys", "user");
        let first = backend.complete(request.clone()).await.unwrap();
        assert_eq!(first.text, "first");

        let second = backend.complete(request.clone()).await;
        assert!(matches!(second, Err(Error::Auth(_))));

        // Queue empty: default transient.
        let third = backend.complete(request).await;
        assert!(matches!(third, Err(Error::Transient(_))));
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_harness_boots_a_playable_session() {
        let harness = TestHarness::new().await;
        assert_position(&harness, 0, 0, 0);
        assert_room_exists(&harness, 0, 0, 0);
        let (hp, max_hp) = harness.player_hp();
        assert_eq!(hp, max_hp);
    }
}
