//! Tile-Crawler intelligence core.
//!
//! A turn-based dungeon crawler whose world and narrative are generated on
//! demand by an LLM, built so the game never waits on the model: rooms are
//! procedurally usable the instant they are generated, model content
//! upgrades them asynchronously, and every failed or slow request has a
//! deterministic fallback.
//!
//! This crate provides:
//! - The world state store and deterministic map generation
//! - Two-tier narrative memory with background condensation
//! - The context assembler, request router, validator and fallback engine
//! - Response caching, in-flight dedup, and prefetch scheduling
//! - Session persistence with versioned, checksummed saves
//!
//! # Quick Start
//!
//! ```ignore
//! use crawler_core::{GameSession, SessionConfig, PlayerAction};
//! use crawler_core::world::Direction;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SessionConfig::new("My Descent").with_player_name("Thorin");
//!     let mut session = GameSession::from_env(config).await;
//!
//!     let response = session
//!         .perform(PlayerAction::Move { direction: Direction::South })
//!         .await
//!         .unwrap();
//!     println!("{}", response.narrative);
//! }
//! ```

pub mod actions;
pub mod actors;
pub mod cache;
pub mod context;
pub mod engine;
pub mod events;
pub mod fallback;
pub mod glyphs;
pub mod headless;
pub mod items;
pub mod mapgen;
pub mod memory;
pub mod metrics;
pub mod persist;
pub mod player;
pub mod prefetch;
pub mod prompts;
pub mod quests;
pub mod router;
pub mod session;
pub mod testing;
pub mod validate;
pub mod world;

// Primary public API
pub use actions::{PlayerAction, ResponseBundle};
pub use engine::{EngineConfig, GameEngine};
pub use headless::{HeadlessConfig, HeadlessGame};
pub use session::{GameSession, SessionConfig, SessionError};
pub use testing::{MockBackend, TestHarness};
