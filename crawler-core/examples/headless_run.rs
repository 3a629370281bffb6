//! Run a short scripted descent against whatever backend the environment
//! points at (a local Ollama server by default).
//!
//!     cargo run --example headless_run

use crawler_core::headless::{HeadlessConfig, HeadlessGame};
use crawler_core::session::SessionConfig;
use crawler_core::world::Direction;
use crawler_core::PlayerAction;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = HeadlessConfig {
        session: SessionConfig::new("Headless Descent")
            .with_player_name("Wanderer")
            .with_seed("demo"),
        echo: true,
        ..HeadlessConfig::default()
    };

    let mut game = HeadlessGame::new(Arc::new(llm::HttpBackend::from_env()), config).await;
    game.run(vec![
        PlayerAction::Move {
            direction: Direction::South,
        },
        PlayerAction::Talk {
            npc: None,
            message: Some("Hello?".into()),
        },
        PlayerAction::Rest,
    ])
    .await
    .expect("headless run");

    let metrics = game.session().metrics().snapshot();
    println!("\n--- request metrics ---");
    for (kind, m) in metrics {
        println!(
            "{:?}: {} ok, {} fallback, {} cached, {} retries",
            kind, m.success, m.fallback, m.cache_hits, m.retries
        );
    }
}
