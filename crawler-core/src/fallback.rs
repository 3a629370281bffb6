//! The fallback engine: deterministic procedural substitutes.
//!
//! Every request kind has a generator here, seeded by the request
//! fingerprint and keyed by biome, NPC archetype, combat action or quest
//! template. Fallbacks are always available and always schema-valid; they
//! are the contract that the game never stalls on the model.

use crate::actors::NpcArchetype;
use crate::quests::{self, QuestRewards};
use crate::validate::{
    Atmosphere, CombatNarration, Emotion, NpcDialogue, QuestContent, RoomDescription,
    SummaryContent,
};
use crate::world::Biome;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn pick<'a>(options: &[&'a str], seed: u64) -> &'a str {
    options[(seed % options.len() as u64) as usize]
}

/// A procedural room description for a biome. Also used for the placeholder
/// a freshly generated room carries before enrichment arrives.
pub fn biome_description(biome: Biome, seed: u64) -> String {
    let options: &[&str] = match biome {
        Biome::Dungeon => &[
            "A cold stone chamber stretches before you. Ancient dust covers the floor.",
            "Rough-hewn walls close in around a floor worn smooth by forgotten feet.",
            "Iron brackets rust on the walls of this silent hall.",
        ],
        Biome::Cave => &[
            "Stalactites drip overhead in this natural cavern. The air is damp.",
            "The cave narrows and widens like a throat. Somewhere, water moves.",
            "Pale roots reach through cracks in the cavern ceiling.",
        ],
        Biome::Crypt => &[
            "Tombs line the walls of this burial chamber. The dead rest uneasily here.",
            "Niches stacked with bones rise to the ceiling. The air tastes of dust.",
            "A sunken sarcophagus dominates the chamber, its lid askew.",
        ],
        Biome::Ruins => &[
            "Crumbling walls hint at former grandeur. Nature reclaims what was lost.",
            "Fallen columns litter the floor of what was once a great hall.",
            "Faded carvings crawl across the broken stonework.",
        ],
        Biome::Temple => &[
            "Corrupted symbols cover the walls. Dark power lingers in the air.",
            "An abandoned sanctuary, its sacred geometry warped by age.",
            "Candle stubs and old offerings crowd the base of a defaced shrine.",
        ],
        Biome::Forest => &[
            "Twisted trees form walls of wood and shadow. The path ahead is unclear.",
            "The underground forest grows in defiance of the dark.",
            "Luminous moss lights a clearing ringed by black trunks.",
        ],
        Biome::Volcano => &[
            "Heat radiates from every surface. Lava glows in the distance.",
            "The rock here is scorched black and warm to the touch.",
            "Veins of slow fire pulse beneath a floor of cracked basalt.",
        ],
        Biome::Void => &[
            "Reality seems uncertain here. The darkness between worlds surrounds you.",
            "The walls forget themselves at the edges of your sight.",
            "You stand in a place that is mostly an absence.",
        ],
    };
    pick(options, seed).to_string()
}

fn biome_atmosphere(biome: Biome) -> Atmosphere {
    match biome {
        Biome::Dungeon => Atmosphere::Cold,
        Biome::Cave => Atmosphere::Damp,
        Biome::Crypt => Atmosphere::Haunted,
        Biome::Ruins => Atmosphere::Ancient,
        Biome::Temple => Atmosphere::Sacred,
        Biome::Forest => Atmosphere::Overgrown,
        Biome::Volcano => Atmosphere::Scorching,
        Biome::Void => Atmosphere::Unearthly,
    }
}

fn biome_audio_hint(biome: Biome) -> &'static str {
    match biome {
        Biome::Dungeon => "distant_drips",
        Biome::Cave => "water_echo",
        Biome::Crypt => "low_whispers",
        Biome::Ruins => "wind_through_stone",
        Biome::Temple => "faint_chanting",
        Biome::Forest => "leaves_underground",
        Biome::Volcano => "magma_rumble",
        Biome::Void => "silence_pressure",
    }
}

/// Schema-valid room description fallback, biome-consistent and stable in
/// the fingerprint seed.
pub fn room_description(biome: Biome, seed: u64) -> RoomDescription {
    let mut rng = StdRng::seed_from_u64(seed);
    let pois: &[&str] = &[
        "a patch of disturbed dust",
        "scratch marks near the floor",
        "a draft from an unseen gap",
        "soot stains in one corner",
    ];
    let poi_count = rng.gen_range(0..=2);
    RoomDescription {
        description: biome_description(biome, seed),
        atmosphere: biome_atmosphere(biome),
        points_of_interest: (0..poi_count)
            .map(|_| pois[rng.gen_range(0..pois.len())].to_string())
            .collect(),
        audio_hint: Some(biome_audio_hint(biome).to_string()),
        npc_personalities: Vec::new(),
        tile_grid: None,
    }
}

/// Schema-valid dialogue fallback, keyed by NPC archetype.
pub fn npc_dialogue(archetype: NpcArchetype, seed: u64) -> NpcDialogue {
    let (lines, emotion): (&[&str], Emotion) = match archetype {
        NpcArchetype::Hermit => (
            &[
                "\"Few come this deep. Fewer leave. Warm yourself, if you must.\"",
                "\"I stopped counting the days. The dark doesn't keep them anyway.\"",
            ],
            Emotion::Neutral,
        ),
        NpcArchetype::Merchant => (
            &[
                "\"Coin for goods, goods for coin. Simplest honest thing down here.\"",
                "\"Everything's for sale except the way out. Still looking for that myself.\"",
            ],
            Emotion::Friendly,
        ),
        NpcArchetype::Ghost => (
            &[
                "\"You can hear me? Then it's been longer than I thought.\"",
                "\"I remember doors where you see walls. Trust neither.\"",
            ],
            Emotion::Cryptic,
        ),
        NpcArchetype::Scholar => (
            &[
                "\"Mind the inscriptions. They are older than the walls they're cut into.\"",
                "\"I am cataloguing the dark. It keeps adding rooms.\"",
            ],
            Emotion::Helpful,
        ),
        NpcArchetype::Warden => (
            &[
                "\"State your business. This floor is under watch, whatever it looks like.\"",
                "\"Keep your blade down and we'll have no quarrel.\"",
            ],
            Emotion::Suspicious,
        ),
        NpcArchetype::LostSoul => (
            &[
                "\"Is it still snowing, up above? I keep dreaming that it's snowing.\"",
                "\"Don't take the left stair. Or was it the right. Don't take stairs.\"",
            ],
            Emotion::Fearful,
        ),
    };
    NpcDialogue {
        dialogue: pick(lines, seed).to_string(),
        emotion,
        offers: Vec::new(),
        reveals: Vec::new(),
        quest_trigger: None,
        memory_update: None,
    }
}

/// Schema-valid combat narration fallback, keyed by the action taken.
pub fn combat_narration(
    action: &str,
    enemy_name: &str,
    outcome: &str,
    is_crit: bool,
    seed: u64,
) -> CombatNarration {
    let templates: &[&str] = match action {
        "attack" => &[
            "Your strike lands against the {enemy}. {outcome}",
            "Steel meets the {enemy} with a dull shock. {outcome}",
            "You press the attack on the {enemy}. {outcome}",
        ],
        "victory" => &[
            "The {enemy} collapses and does not rise. {outcome}",
            "A final blow, and the {enemy} is still. {outcome}",
        ],
        "defeat" => &[
            "The {enemy} stands over you as the dark closes in. {outcome}",
            "Your legs give way. The {enemy} has won. {outcome}",
        ],
        "flee" => &[
            "You break away from the {enemy} and run. {outcome}",
            "You slip out of the {enemy}'s reach. {outcome}",
        ],
        _ => &["The exchange with the {enemy} continues. {outcome}"],
    };
    let narrative = pick(templates, seed)
        .replace("{enemy}", enemy_name)
        .replace("{outcome}", outcome);
    CombatNarration {
        narrative,
        crit_flavor: if is_crit {
            Some("The blow lands harder than either of you expected.".to_string())
        } else {
            None
        },
    }
}

/// Schema-valid quest fallback: a known template with its stock text.
pub fn quest_content(template_id: &str, seed: u64) -> QuestContent {
    let template = quests::template(template_id).unwrap_or_else(|| {
        let ids: Vec<&str> = quests::template_ids().collect();
        quests::template(pick(&ids, seed)).expect("template registry is non-empty")
    });
    QuestContent {
        title: template.title.to_string(),
        description: template.description.to_string(),
        objectives: template.objectives.iter().map(|o| o.to_string()).collect(),
        rewards: QuestRewards {
            gold: template.reward_gold,
            xp: template.reward_xp,
            items: Vec::new(),
        },
    }
}

/// Deterministic summarization fallback over the raw event lines.
pub fn summary(lines: &[String], max_tokens: usize) -> SummaryContent {
    let joined = lines.join("; ");
    SummaryContent {
        summary: format!(
            "[abridged] {}",
            crate::memory::truncate_tokens(&joined, max_tokens)
        ),
    }
}
