//! Headless driver: run a scripted action sequence without a frontend.
//!
//! Useful for demos, smoke tests, and reproducing bugs from an action
//! transcript.

use crate::actions::{PlayerAction, ResponseBundle};
use crate::session::{GameSession, SessionConfig, SessionError};
use llm::Backend;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a headless run.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    pub session: SessionConfig,
    /// How long to let background work settle after the script finishes.
    pub settle: Duration,
    /// Echo each step to stdout.
    pub echo: bool,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::new("Headless Run"),
            settle: Duration::from_millis(250),
            echo: false,
        }
    }
}

/// One step of a completed run.
#[derive(Debug)]
pub struct Step {
    pub action: PlayerAction,
    pub response: ResponseBundle,
}

/// A scripted, frontend-free game run.
pub struct HeadlessGame {
    session: GameSession,
    config: HeadlessConfig,
    transcript: Vec<Step>,
}

impl HeadlessGame {
    pub async fn new(backend: Arc<dyn Backend>, config: HeadlessConfig) -> Self {
        let session = GameSession::new(backend, config.session.clone()).await;
        Self {
            session,
            config,
            transcript: Vec::new(),
        }
    }

    /// Run a sequence of actions in order, recording each response.
    pub async fn run(&mut self, actions: Vec<PlayerAction>) -> Result<(), SessionError> {
        for action in actions {
            let response = self.session.perform(action.clone()).await?;
            if self.config.echo {
                println!("> {action:?}");
                println!("{}", response.narrative);
            }
            self.transcript.push(Step { action, response });
        }
        self.session.engine_mut().settle(self.config.settle).await;
        Ok(())
    }

    pub fn transcript(&self) -> &[Step] {
        &self.transcript
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut GameSession {
        &mut self.session
    }
}
