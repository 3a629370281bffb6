//! The prompt kernel: per-kind templates rendered with assembled context.
//!
//! Templates live beside this module as plain text and are filled by simple
//! substitution; the surrounding narrative context is supplied by the
//! context assembler, not here.

use crate::actors::NpcInstance;
use crate::quests::{self, QuestTemplate};
use crate::world::Room;

/// The system preamble shared by every request kind: base instructions plus
/// the tile legend rules.
pub fn preamble() -> String {
    format!(
        "{}\n{}",
        include_str!("prompts/system_base.txt"),
        crate::glyphs::legend_context()
    )
}

/// Task section for ROOM_DESCRIPTION and ENRICHMENT.
pub fn room_task(room: &Room) -> String {
    let exits: Vec<&str> = room.exits.iter().map(|d| d.name()).collect();
    let mut contents: Vec<String> = Vec::new();
    for enemy in &room.enemies {
        contents.push(format!("enemy: {}", enemy.name));
    }
    for item in &room.items {
        contents.push(format!("item: {}", item.name));
    }
    for npc in &room.npcs {
        contents.push(format!("npc: {}", npc.name));
    }
    for feature in &room.features {
        contents.push(format!("feature: {feature:?}"));
    }
    if contents.is_empty() {
        contents.push("nothing of note".to_string());
    }

    include_str!("prompts/room_description.txt")
        .replace("{coord}", &room.coord.to_string())
        .replace("{biome}", room.biome.name())
        .replace("{exits}", &exits.join(", "))
        .replace("{contents}", &contents.join("; "))
}

/// Task section for NPC_DIALOGUE.
pub fn dialogue_task(npc: &NpcInstance, message: &str) -> String {
    let history: Vec<&str> = npc.dialogue_history().collect();
    let history = if history.is_empty() {
        "No previous conversation.".to_string()
    } else {
        history.join("\n")
    };
    let quest_ids: Vec<&str> = quests::template_ids().collect();

    include_str!("prompts/npc_dialogue.txt")
        .replace("{name}", &npc.name)
        .replace("{archetype}", npc.archetype.name())
        .replace("{style}", &npc.personality.speech_style)
        .replace("{traits}", &npc.personality.traits.join(", "))
        .replace("{goals}", &npc.personality.goals.join(", "))
        .replace("{standing}", &standing(npc.personality.relationship))
        .replace("{history}", &history)
        .replace("{message}", message)
        .replace("{quest_ids}", &quest_ids.join(", "))
}

fn standing(relationship: i32) -> String {
    let word = match relationship {
        i32::MIN..=-50 => "hateful",
        -49..=-15 => "hostile",
        -14..=14 => "neutral",
        15..=49 => "warm",
        _ => "devoted",
    };
    word.to_string()
}

/// Task section for COMBAT_NARRATION.
pub fn combat_task(
    action: &str,
    enemy_name: &str,
    outcome: &str,
    player_hp: (i32, i32),
    enemy_hp: (i32, i32),
) -> String {
    include_str!("prompts/combat_narration.txt")
        .replace("{action}", action)
        .replace("{enemy}", enemy_name)
        .replace("{outcome}", outcome)
        .replace("{player_hp}", &format!("{}/{}", player_hp.0, player_hp.1))
        .replace("{enemy_hp}", &format!("{}/{}", enemy_hp.0, enemy_hp.1))
}

/// Task section for QUEST_GENERATION.
pub fn quest_task(template: &QuestTemplate) -> String {
    include_str!("prompts/quest_generation.txt")
        .replace("{template_title}", template.title)
        .replace("{template_description}", template.description)
        .replace("{objectives}", &template.objectives.join("; "))
}

/// Task section for SUMMARIZATION.
pub fn summary_task(event_lines: &[String], existing_summary: &str) -> String {
    let events: Vec<String> = event_lines.iter().map(|e| format!("- {e}")).collect();
    include_str!("prompts/summarization.txt")
        .replace("{events}", &events.join("\n"))
        .replace(
            "{summary}",
            if existing_summary.is_empty() {
                "(none yet)"
            } else {
                existing_summary
            },
        )
}
