//! Save/load round-trips across fresh sessions.

use crawler_core::session::{GameSession, SessionConfig};
use crawler_core::testing::{fast_router_config, MockBackend, TestHarness};
use crawler_core::world::{Coordinate, Direction, Room};
use crawler_core::PlayerAction;
use std::sync::Arc;
use tempfile::TempDir;

fn config(seed: &str) -> SessionConfig {
    SessionConfig::new("Persist QA")
        .with_player_name("Hero")
        .with_seed(seed)
        .with_router(fast_router_config())
}

fn room_digest(room: &Room) -> (Coordinate, Vec<u32>, Vec<Direction>, String) {
    (
        room.coord,
        room.grid.tiles().iter().map(|g| g.0).collect(),
        room.exits.iter().copied().collect(),
        room.description.clone(),
    )
}

#[tokio::test]
async fn test_save_load_round_trip_in_fresh_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slot1.json");

    let mut harness = TestHarness::with_config(config("persist-seed")).await;

    // Play a while: wander, rest, poke at the world.
    for _ in 0..10 {
        let direction = *harness
            .current_room()
            .exits
            .iter()
            .next()
            .expect("rooms always have an exit");
        harness.perform(PlayerAction::Move { direction }).await;
        harness.clear_combat();
    }
    harness.perform(PlayerAction::Rest).await;
    harness.settle().await;

    // Snapshot what we expect to survive.
    let position = harness.position();
    let turn = harness.session.engine().turn();
    let player = harness.session.engine().player().clone();
    let summary = harness.session.engine().memory().summary().to_string();
    let events: Vec<String> = harness
        .session
        .engine()
        .memory()
        .short_term()
        .map(|e| e.summary.clone())
        .collect();
    let mut rooms: Vec<_> = harness
        .session
        .engine()
        .world()
        .rooms()
        .map(room_digest)
        .collect();
    rooms.sort_by_key(|(coord, ..)| *coord);

    harness.session.save_to(&path).await.unwrap();

    // A fresh process: new backend, new session, same save.
    let restored = GameSession::load(
        Arc::new(MockBackend::new()),
        config("persist-seed"),
        &path,
    )
    .await
    .unwrap();

    assert_eq!(restored.engine().world().current_position(), position);
    assert_eq!(restored.engine().turn(), turn);

    let loaded_player = restored.engine().player();
    assert_eq!(loaded_player.name, player.name);
    assert_eq!(loaded_player.level, player.level);
    assert_eq!(loaded_player.xp, player.xp);
    assert_eq!(loaded_player.derived.hp, player.derived.hp);
    assert_eq!(loaded_player.inventory.gold, player.inventory.gold);
    assert_eq!(loaded_player.inventory.len(), player.inventory.len());

    // Every generated room survives byte-identically.
    for (coord, tiles, exits, description) in &rooms {
        let room = restored
            .engine()
            .world()
            .room(*coord)
            .unwrap_or_else(|| panic!("missing room at {coord}"));
        let (_, loaded_tiles, loaded_exits, loaded_description) = room_digest(room);
        assert_eq!(&loaded_tiles, tiles, "tiles differ at {coord}");
        assert_eq!(&loaded_exits, exits, "exits differ at {coord}");
        assert_eq!(&loaded_description, description, "description differs at {coord}");
    }

    // Narrative memory round-trips exactly.
    assert_eq!(restored.engine().memory().summary(), summary);
    let loaded_events: Vec<String> = restored
        .engine()
        .memory()
        .short_term()
        .map(|e| e.summary.clone())
        .collect();
    assert_eq!(loaded_events, events);
}

#[tokio::test]
async fn test_corrupt_save_refuses_to_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slot1.json");

    let harness = TestHarness::with_config(config("corrupt-seed")).await;
    harness.session.save_to(&path).await.unwrap();

    // Flip a byte inside the body.
    let content = std::fs::read_to_string(&path).unwrap();
    let tampered = content.replacen("\"Hero\"", "\"Zero\"", 1);
    assert_ne!(content, tampered);
    std::fs::write(&path, tampered).unwrap();

    let result = GameSession::load(
        Arc::new(MockBackend::new()),
        config("corrupt-seed"),
        &path,
    )
    .await;
    assert!(result.is_err(), "corrupt save must be refused");
}

#[tokio::test]
async fn test_emergency_save_loads_reduced_fidelity() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("panic.json");

    let mut harness = TestHarness::with_config(config("emergency-seed")).await;
    for _ in 0..4 {
        let direction = *harness
            .current_room()
            .exits
            .iter()
            .next()
            .expect("rooms always have an exit");
        harness.perform(PlayerAction::Move { direction }).await;
        harness.clear_combat();
    }
    let position = harness.position();
    let player_name = harness.session.engine().player().name.clone();

    harness.session.save_emergency(&path).await.unwrap();

    let restored = GameSession::load(
        Arc::new(MockBackend::new()),
        config("emergency-seed"),
        &path,
    )
    .await
    .unwrap();

    // Player and position survive; the world regenerates from its seed.
    assert_eq!(restored.engine().player().name, player_name);
    assert_eq!(restored.engine().world().current_position(), position);
    assert!(restored.engine().world().room(position).is_some());
}

#[tokio::test]
async fn test_save_game_action_through_the_session() {
    let dir = TempDir::new().unwrap();

    let backend = Arc::new(MockBackend::new());
    let mut session = GameSession::new(
        backend,
        config("slot-seed").with_save_dir(dir.path()),
    )
    .await;

    let response = session
        .perform(PlayerAction::SaveGame { slot: Some("slot one".into()) })
        .await
        .unwrap();
    assert!(response.success);
    assert!(dir.path().join("slot_one.json").exists());

    let response = session
        .perform(PlayerAction::LoadGame { slot: Some("slot one".into()) })
        .await
        .unwrap();
    assert!(response.success);
}

#[tokio::test]
async fn test_save_without_directory_is_a_session_error() {
    let backend = Arc::new(MockBackend::new());
    let mut session = GameSession::new(backend, config("no-dir")).await;
    let result = session.perform(PlayerAction::SaveGame { slot: None }).await;
    assert!(result.is_err());
}
