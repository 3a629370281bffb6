//! Enemies and NPCs.
//!
//! NPCs remember past player interactions as narrative event ids, never as
//! event handles; events likewise refer to actors by id. Traversal is by
//! registry lookup, which keeps the object graph flat and serializable.

use crate::memory::EventId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

/// How many past interactions an NPC retains.
const NPC_MEMORY_CAP: usize = 8;
/// How many lines of recent dialogue an NPC retains.
const NPC_DIALOGUE_CAP: usize = 10;

/// Unique identifier for enemy instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnemyId(pub Uuid);

impl EnemyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EnemyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EnemyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for NPC instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NpcId(pub Uuid);

impl NpcId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NpcId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Enemy behavior archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiType {
    Brute,
    Skirmisher,
    Caster,
    Guardian,
    Swarm,
}

/// Coarse standing toward the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Faction {
    Hostile,
    Wary,
    Neutral,
    Friendly,
}

/// A living (for now) enemy in a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnemyInstance {
    pub id: EnemyId,
    pub archetype: String,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub attack: i32,
    pub defense: i32,
    pub xp_reward: u32,
    pub ai: AiType,
    pub faction: Faction,
    /// Tile position within the room grid.
    pub tile: (u32, u32),
    pub is_boss: bool,
}

impl EnemyInstance {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }
}

/// NPC archetypes; the closed set the fallback dialogue generator keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NpcArchetype {
    Hermit,
    Merchant,
    Ghost,
    Scholar,
    Warden,
    LostSoul,
}

impl NpcArchetype {
    pub fn all() -> [NpcArchetype; 6] {
        [
            NpcArchetype::Hermit,
            NpcArchetype::Merchant,
            NpcArchetype::Ghost,
            NpcArchetype::Scholar,
            NpcArchetype::Warden,
            NpcArchetype::LostSoul,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            NpcArchetype::Hermit => "hermit",
            NpcArchetype::Merchant => "merchant",
            NpcArchetype::Ghost => "ghost",
            NpcArchetype::Scholar => "scholar",
            NpcArchetype::Warden => "warden",
            NpcArchetype::LostSoul => "lost soul",
        }
    }
}

/// An NPC's personality record, as the dialogue prompts see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcPersonality {
    pub traits: Vec<String>,
    pub speech_style: String,
    pub goals: Vec<String>,
    pub knowledge: Vec<String>,
    /// Signed standing toward the player.
    pub relationship: i32,
}

impl NpcPersonality {
    /// Coarse relationship bucket. Dialogue fingerprints include the bucket
    /// rather than the raw score, so small drifts keep the cache warm while
    /// meaningful shifts invalidate it.
    pub fn relationship_bucket(&self) -> i32 {
        self.relationship.clamp(-100, 100) / 25
    }

    pub fn adjust_relationship(&mut self, delta: i32) {
        self.relationship = (self.relationship + delta).clamp(-100, 100);
    }
}

/// A persistent NPC in a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcInstance {
    pub id: NpcId,
    pub archetype: NpcArchetype,
    pub name: String,
    pub personality: NpcPersonality,
    pub faction: Faction,
    pub tile: (u32, u32),
    /// Ids of narrative events this NPC witnessed or took part in.
    interaction_memory: VecDeque<EventId>,
    /// Recent dialogue lines, oldest first.
    dialogue_history: VecDeque<String>,
}

impl NpcInstance {
    pub fn new(
        archetype: NpcArchetype,
        name: impl Into<String>,
        personality: NpcPersonality,
        tile: (u32, u32),
    ) -> Self {
        Self {
            id: NpcId::new(),
            archetype,
            name: name.into(),
            personality,
            faction: Faction::Neutral,
            tile,
            interaction_memory: VecDeque::new(),
            dialogue_history: VecDeque::new(),
        }
    }

    /// Remember an interaction by event id, bounded.
    pub fn remember_event(&mut self, id: EventId) {
        self.interaction_memory.push_back(id);
        while self.interaction_memory.len() > NPC_MEMORY_CAP {
            self.interaction_memory.pop_front();
        }
    }

    pub fn remembered_events(&self) -> impl Iterator<Item = EventId> + '_ {
        self.interaction_memory.iter().copied()
    }

    /// Record a dialogue exchange, bounded.
    pub fn record_dialogue(&mut self, speaker: &str, line: &str) {
        self.dialogue_history.push_back(format!("{speaker}: {line}"));
        while self.dialogue_history.len() > NPC_DIALOGUE_CAP {
            self.dialogue_history.pop_front();
        }
    }

    pub fn dialogue_history(&self) -> impl Iterator<Item = &str> {
        self.dialogue_history.iter().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn personality() -> NpcPersonality {
        NpcPersonality {
            traits: vec!["wary".into()],
            speech_style: "clipped".into(),
            goals: vec!["guard the stairwell".into()],
            knowledge: vec![],
            relationship: 0,
        }
    }

    #[test]
    fn test_relationship_buckets() {
        let mut p = personality();
        assert_eq!(p.relationship_bucket(), 0);
        p.adjust_relationship(30);
        assert_eq!(p.relationship_bucket(), 1);
        p.adjust_relationship(1000);
        assert_eq!(p.relationship, 100);
        assert_eq!(p.relationship_bucket(), 4);
        p.adjust_relationship(-1000);
        assert_eq!(p.relationship, -100);
    }

    #[test]
    fn test_npc_memory_is_bounded() {
        let mut npc = NpcInstance::new(NpcArchetype::Hermit, "Old Marn", personality(), (2, 2));
        for i in 0..20 {
            npc.remember_event(EventId(i));
        }
        let remembered: Vec<EventId> = npc.remembered_events().collect();
        assert_eq!(remembered.len(), NPC_MEMORY_CAP);
        assert_eq!(remembered[0], EventId(12));
    }

    #[test]
    fn test_dialogue_history_is_bounded() {
        let mut npc = NpcInstance::new(NpcArchetype::Ghost, "Pale Sela", personality(), (1, 1));
        for i in 0..15 {
            npc.record_dialogue("You", &format!("line {i}"));
        }
        assert_eq!(npc.dialogue_history().count(), NPC_DIALOGUE_CAP);
    }
}
