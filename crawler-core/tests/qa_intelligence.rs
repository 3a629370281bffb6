//! The intelligence pipeline under adversity: dead backends, hostile
//! output, cache behavior, rate-limit pressure, and memory condensation.

use crawler_core::actors::{NpcArchetype, NpcInstance, NpcPersonality};
use crawler_core::fallback;
use crawler_core::memory::MemoryConfig;
use crawler_core::prefetch::PrefetchPolicy;
use crawler_core::router::{RequestKind, RouterConfig};
use crawler_core::session::SessionConfig;
use crawler_core::testing::{fast_router_config, TestHarness};
use crawler_core::world::Direction;
use crawler_core::PlayerAction;
use std::time::Duration;

/// Prefetch disabled, so foreground room requests are the only ones in
/// play and metrics deltas are exact.
fn no_prefetch() -> PrefetchPolicy {
    PrefetchPolicy {
        per_move_budget: 0,
        npc_radius: 2,
    }
}

fn hermit() -> NpcInstance {
    NpcInstance::new(
        NpcArchetype::Hermit,
        "Old Marn",
        NpcPersonality {
            traits: vec!["wary".into()],
            speech_style: "low and unhurried".into(),
            goals: vec!["keep the fire lit".into()],
            knowledge: Vec::new(),
            relationship: 0,
        },
        (2, 3),
    )
}

#[tokio::test]
async fn test_llm_unreachable_during_first_move() {
    // The mock backend's default is a transient failure on every call.
    let mut harness = TestHarness::with_config(
        SessionConfig::new("Offline")
            .with_player_name("Hero")
            .with_seed("S0")
            .with_prefetch(no_prefetch())
            .with_router(fast_router_config()),
    )
    .await;
    harness.settle().await;
    let metrics_before = harness.metrics().kind(RequestKind::RoomDescription);

    let response = harness
        .perform(PlayerAction::Move {
            direction: Direction::South,
        })
        .await;

    // The move itself succeeds; the player never sees an error.
    assert!(response.success);
    let room = harness.current_room();
    assert!(room.exits.contains(&Direction::North));

    // Let the background description request run its retries out.
    harness.settle().await;
    let metrics = harness.metrics().kind(RequestKind::RoomDescription);
    assert_eq!(metrics.retries - metrics_before.retries, 3);
    assert_eq!(metrics.fallback - metrics_before.fallback, 1);

    // The description is the deterministic procedural fallback for the
    // room's biome.
    let room = harness.current_room();
    let biome = room.biome;
    assert!(
        (0..8).any(|seed| fallback::biome_description(biome, seed) == room.description),
        "description {:?} is not from the {} pool",
        room.description,
        biome.name()
    );
}

#[tokio::test]
async fn test_dialogue_cache_hit_on_repeat() {
    let mut harness = TestHarness::with_seed("cache-seed").await;
    harness.settle().await;

    // Plant a known NPC in the starting room.
    let npc = hermit();
    let position = harness.position();
    harness
        .session
        .engine_mut()
        .world_mut()
        .room_mut(position)
        .unwrap()
        .npcs
        .push(npc);

    let first = harness
        .perform(PlayerAction::Talk {
            npc: None,
            message: Some("hello".into()),
        })
        .await;
    let second = harness
        .perform(PlayerAction::Talk {
            npc: None,
            message: Some("hello".into()),
        })
        .await;

    let a = first.dialogue.expect("first dialogue");
    let b = second.dialogue.expect("second dialogue");
    assert_eq!(a.dialogue, b.dialogue);

    let metrics = harness.metrics().kind(RequestKind::NpcDialogue);
    assert_eq!(metrics.cache_hits, 1);
}

#[tokio::test]
async fn test_changed_message_misses_the_cache() {
    let mut harness = TestHarness::with_seed("cache-seed-2").await;
    harness.settle().await;
    let position = harness.position();
    harness
        .session
        .engine_mut()
        .world_mut()
        .room_mut(position)
        .unwrap()
        .npcs
        .push(hermit());

    harness
        .perform(PlayerAction::Talk {
            npc: None,
            message: Some("hello".into()),
        })
        .await;
    harness
        .perform(PlayerAction::Talk {
            npc: None,
            message: Some("who are you?".into()),
        })
        .await;

    let metrics = harness.metrics().kind(RequestKind::NpcDialogue);
    assert_eq!(metrics.cache_hits, 0);
}

#[tokio::test]
async fn test_adversarial_room_description_is_rejected() {
    let mut harness = TestHarness::with_config(
        SessionConfig::new("Adversary")
            .with_seed("adversary")
            .with_prefetch(no_prefetch())
            .with_router(fast_router_config()),
    )
    .await;
    harness.settle().await;

    // Out-of-enum atmosphere and a non-legend tile grid.
    harness.backend.push_text(
        r#"{"description": "A perfectly normal room.", "atmosphere": "???",
            "tile_grid": [[4660, 4660]]}"#,
    );

    let response = harness
        .perform(PlayerAction::Move {
            direction: Direction::South,
        })
        .await;
    assert!(response.success);
    harness.settle().await;

    let metrics = harness.metrics().kind(RequestKind::RoomDescription);
    assert!(metrics.validation_failures >= 1);
    assert!(metrics.fallback >= 1);

    // The player got a biome-consistent description, not the injection.
    let room = harness.current_room();
    assert_ne!(room.description, "A perfectly normal room.");
    assert!(
        (0..8).any(|seed| fallback::biome_description(room.biome, seed) == room.description)
    );
}

#[tokio::test]
async fn test_rapid_movement_respects_the_rate_bucket() {
    let budget = 5u32;
    let mut harness = TestHarness::with_config(
        SessionConfig::new("Pressure")
            .with_seed("pressure")
            .with_router(RouterConfig {
                requests_per_minute: budget,
                per_kind_per_minute: budget,
                wait_timeout_override: Some(Duration::from_millis(40)),
                ..fast_router_config()
            }),
    )
    .await;

    // Bounce back and forth; every entry schedules background work.
    for _ in 0..20 {
        harness
            .perform(PlayerAction::Move {
                direction: Direction::South,
            })
            .await;
        harness.clear_combat();
        harness
            .perform(PlayerAction::Move {
                direction: Direction::North,
            })
            .await;
        harness.clear_combat();
    }
    harness.settle().await;

    // The backend never saw more calls than the bucket allows (plus the
    // trickle the refill rate admits while the test runs).
    assert!(
        harness.backend.call_count() <= (budget + 2) as u64,
        "bucket exceeded: {} calls",
        harness.backend.call_count()
    );
}

#[tokio::test]
async fn test_condensation_keeps_the_window_bounded() {
    let mut harness = TestHarness::with_config(
        SessionConfig::new("Condense")
            .with_seed("condense")
            .with_memory(MemoryConfig {
                window: 6,
                condense_batch: 3,
                summary_tokens: 60,
            })
            .with_router(fast_router_config()),
    )
    .await;

    for _ in 0..12 {
        // Always leave through a real exit; every room has at least one.
        let direction = *harness
            .current_room()
            .exits
            .iter()
            .next()
            .expect("rooms always have an exit");
        harness.perform(PlayerAction::Move { direction }).await;
        harness.clear_combat();
        harness.settle().await;
    }

    let memory = harness.session.engine().memory();
    assert!(
        memory.short_term_len() <= 7,
        "window grew to {}",
        memory.short_term_len()
    );
    // Backend is offline, so the summary came from the deterministic
    // fallback and carries its marker.
    assert!(memory.summary().contains("[abridged]"));
}

#[tokio::test]
async fn test_quest_trigger_accepts_and_enriches_a_quest() {
    let mut harness = TestHarness::with_seed("quest-seed").await;
    harness.settle().await;
    let position = harness.position();
    harness
        .session
        .engine_mut()
        .world_mut()
        .room_mut(position)
        .unwrap()
        .npcs
        .push(hermit());

    // Dialogue that triggers a known quest, then the generated quest text.
    harness.backend.push_text(
        r#"{"dialogue": "Something old is waiting below. Find it.",
            "emotion": "cryptic", "quest_trigger": "lost_relic"}"#,
    );
    harness.backend.push_text(
        r#"{"title": "What the Dark Kept", "description": "An old hermit wants a relic back.",
            "objectives": ["Find the cracked relic", "Bring it to Old Marn"],
            "rewards": {"gold": 90, "xp": 140}}"#,
    );

    let response = harness
        .perform(PlayerAction::Talk {
            npc: None,
            message: Some("Do you need anything?".into()),
        })
        .await;
    let dialogue = response.dialogue.expect("dialogue data");
    let quest_id = dialogue.quest_accepted.expect("quest accepted");

    // Accepted immediately with stock template text.
    let quest = harness.session.engine().quests().get(quest_id).unwrap();
    assert_eq!(quest.template_id, "lost_relic");

    // The background generation upgrades the wording.
    harness.settle().await;
    harness.perform(PlayerAction::Rest).await;
    let quest = harness.session.engine().quests().get(quest_id).unwrap();
    assert_eq!(quest.title, "What the Dark Kept");
    assert_eq!(quest.rewards.gold, 90);

    // An unknown trigger would have been rejected wholesale; sanity-check
    // the metric stayed clean for this exchange.
    assert_eq!(
        harness
            .metrics()
            .kind(RequestKind::NpcDialogue)
            .validation_failures,
        0
    );
}

#[tokio::test]
async fn test_npc_remembers_the_conversation() {
    let mut harness = TestHarness::with_seed("npc-memory").await;
    harness.settle().await;
    let position = harness.position();
    harness
        .session
        .engine_mut()
        .world_mut()
        .room_mut(position)
        .unwrap()
        .npcs
        .push(hermit());

    harness
        .perform(PlayerAction::Talk {
            npc: Some("Old Marn".into()),
            message: Some("I come from the surface.".into()),
        })
        .await;

    let room = harness.current_room();
    let npc = room.npcs.iter().find(|n| n.name == "Old Marn").unwrap();
    assert!(npc.remembered_events().count() >= 1);
    assert!(npc
        .dialogue_history()
        .any(|line| line.contains("I come from the surface.")));
}
