//! GameSession: the primary public API.
//!
//! Wraps the engine, its configuration, and save-slot handling into one
//! session-scoped object. External collaborators talk to this; nothing in
//! the core is reachable through a global.

use crate::actions::{PlayerAction, ResponseBundle};
use crate::engine::{EngineConfig, GameEngine};
use crate::memory::MemoryConfig;
use crate::metrics::MetricsSink;
use crate::persist::{PersistError, SavedGame};
use crate::prefetch::PrefetchPolicy;
use crate::router::RouterConfig;
use llm::Backend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors from session operations. Only the fatal class surfaces here;
/// everything recoverable is inside the response bundles.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("No save directory configured")]
    NoSaveDir,
}

/// Configuration for creating a new game session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Campaign name; also the default save-slot stem.
    pub campaign_name: String,
    pub player_name: String,
    /// World seed. Fixing this makes the symbolic world reproducible.
    pub seed: String,
    pub model: String,
    pub token_budget: usize,
    pub memory: MemoryConfig,
    pub prefetch: PrefetchPolicy,
    pub router: RouterConfig,
    /// Where save slots live; `None` disables slot-based saving.
    pub save_dir: Option<PathBuf>,
}

impl SessionConfig {
    pub fn new(campaign_name: impl Into<String>) -> Self {
        Self {
            campaign_name: campaign_name.into(),
            player_name: "Adventurer".to_string(),
            seed: "wanderer".to_string(),
            model: "llama3.2".to_string(),
            token_budget: 2048,
            memory: MemoryConfig::default(),
            prefetch: PrefetchPolicy::default(),
            router: RouterConfig::default(),
            save_dir: None,
        }
    }

    pub fn with_player_name(mut self, name: impl Into<String>) -> Self {
        self.player_name = name.into();
        self
    }

    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.seed = seed.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_token_budget(mut self, budget: usize) -> Self {
        self.token_budget = budget;
        self
    }

    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_prefetch(mut self, prefetch: PrefetchPolicy) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_router(mut self, router: RouterConfig) -> Self {
        self.router = router;
        self
    }

    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            seed: self.seed.clone(),
            model_id: self.model.clone(),
            token_budget: self.token_budget,
            memory: self.memory.clone(),
            prefetch: self.prefetch.clone(),
            router: self.router.clone(),
        }
    }
}

/// One player's game session.
pub struct GameSession {
    config: SessionConfig,
    engine: GameEngine,
}

impl GameSession {
    /// Start a fresh session: builds the engine and plays the opening
    /// `NewGame` action.
    pub async fn new(backend: Arc<dyn Backend>, config: SessionConfig) -> Self {
        let mut engine = GameEngine::new(backend, config.engine_config());
        engine
            .perform(PlayerAction::NewGame {
                player_name: Some(config.player_name.clone()),
            })
            .await;
        Self { config, engine }
    }

    /// Start a session against the environment-configured HTTP backend.
    pub async fn from_env(config: SessionConfig) -> Self {
        Self::new(Arc::new(llm::HttpBackend::from_env()), config).await
    }

    /// Resume a session from a save file in a fresh process.
    pub async fn load(
        backend: Arc<dyn Backend>,
        config: SessionConfig,
        path: impl AsRef<Path>,
    ) -> Result<Self, SessionError> {
        let mut session = Self {
            engine: GameEngine::new(backend, config.engine_config()),
            config,
        };
        session.load_from(path).await?;
        Ok(session)
    }

    /// Process one player action. Save/load actions are intercepted here;
    /// everything else goes to the engine.
    pub async fn perform(&mut self, action: PlayerAction) -> Result<ResponseBundle, SessionError> {
        match action {
            PlayerAction::SaveGame { slot } => {
                let path = self.slot_path(slot.as_deref())?;
                self.save_to(&path).await?;
                Ok(self.engine.state_bundle(
                    format!("Saved to {}.", path.display()),
                    "You mark your progress.",
                ))
            }
            PlayerAction::LoadGame { slot } => {
                let path = self.slot_path(slot.as_deref())?;
                self.load_from(&path).await?;
                Ok(self.engine.state_bundle(
                    format!("Loaded {}.", path.display()),
                    "The world settles back into place.",
                ))
            }
            other => Ok(self.engine.perform(other).await),
        }
    }

    /// Save to an explicit path, snapshotting at the tick boundary.
    pub async fn save_to(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        SavedGame::new(self.engine.save_body())?
            .save_to(path)
            .await?;
        Ok(())
    }

    /// Write a minimal-emergency save.
    pub async fn save_emergency(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        SavedGame::emergency(self.engine.save_body())?
            .save_to(path)
            .await?;
        Ok(())
    }

    /// Load from an explicit path into this session.
    pub async fn load_from(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let saved = SavedGame::load_from(path).await?;
        if saved.emergency {
            self.engine.restore_emergency(saved.body);
        } else {
            self.engine.restore(saved.body);
        }
        Ok(())
    }

    fn slot_path(&self, slot: Option<&str>) -> Result<PathBuf, SessionError> {
        let dir = self.config.save_dir.as_ref().ok_or(SessionError::NoSaveDir)?;
        let stem = slot.unwrap_or(&self.config.campaign_name);
        let sanitized: String = stem
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        Ok(dir.join(format!("{sanitized}.json")))
    }

    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut GameEngine {
        &mut self.engine
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSink {
        self.engine.metrics()
    }

    pub fn player_name(&self) -> &str {
        &self.engine.player().name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::new("Depths")
            .with_player_name("Thorin")
            .with_seed("S0")
            .with_token_budget(1024);
        assert_eq!(config.campaign_name, "Depths");
        assert_eq!(config.player_name, "Thorin");
        assert_eq!(config.seed, "S0");
        assert_eq!(config.token_budget, 1024);
    }
}
