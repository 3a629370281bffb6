//! The player character: stats, progression, equipment, status effects.

use crate::items::{EquipSlot, Inventory, ItemInstance};
use crate::world::{Coordinate, Direction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const BASE_HP: i32 = 50;
const BASE_MP: i32 = 20;
const INVENTORY_CAPACITY: usize = 20;

/// Player character classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlayerClass {
    #[default]
    Adventurer,
    Warrior,
    Rogue,
    Mage,
}

impl PlayerClass {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerClass::Adventurer => "Adventurer",
            PlayerClass::Warrior => "Warrior",
            PlayerClass::Rogue => "Rogue",
            PlayerClass::Mage => "Mage",
        }
    }

    fn base_stats(&self) -> PrimaryStats {
        match self {
            PlayerClass::Adventurer => PrimaryStats::new(10, 10, 10, 10, 10, 10),
            PlayerClass::Warrior => PrimaryStats::new(14, 9, 13, 8, 9, 10),
            PlayerClass::Rogue => PrimaryStats::new(9, 14, 10, 11, 10, 11),
            PlayerClass::Mage => PrimaryStats::new(7, 10, 9, 15, 12, 10),
        }
    }
}

/// The six primary stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryStats {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl PrimaryStats {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }
}

/// Stats derived from primaries, level and equipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedStats {
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub attack: i32,
    pub defense: i32,
    pub crit_chance: f32,
    pub crit_multiplier: f32,
}

/// A temporary status effect on the player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEffect {
    pub id: String,
    pub name: String,
    pub kind: StatusKind,
    pub stat_modifiers: HashMap<String, i32>,
    /// Remaining duration in turns.
    pub duration: u32,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusKind {
    Buff,
    Poison,
    Regeneration,
}

/// The player character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub class: PlayerClass,
    pub level: u32,
    pub xp: u32,
    pub stats: PrimaryStats,
    pub derived: DerivedStats,
    pub equipment: HashMap<EquipSlot, ItemInstance>,
    pub inventory: Inventory,
    pub status_effects: Vec<StatusEffect>,
    pub position: Coordinate,
    pub facing: Direction,
    pub steps_taken: u32,
    pub enemies_defeated: u32,
    pub deaths: u32,
}

impl Player {
    pub fn new(name: impl Into<String>, class: PlayerClass) -> Self {
        let stats = class.base_stats();
        let mut player = Self {
            name: name.into(),
            class,
            level: 1,
            xp: 0,
            stats,
            derived: DerivedStats {
                hp: 0,
                max_hp: 0,
                mp: 0,
                max_mp: 0,
                attack: 0,
                defense: 0,
                crit_chance: 0.0,
                crit_multiplier: 2.0,
            },
            equipment: HashMap::new(),
            inventory: Inventory::new(INVENTORY_CAPACITY),
            status_effects: Vec::new(),
            position: Coordinate::ORIGIN,
            facing: Direction::South,
            steps_taken: 0,
            enemies_defeated: 0,
            deaths: 0,
        };
        player.recompute_derived();
        player.derived.hp = player.derived.max_hp;
        player.derived.mp = player.derived.max_mp;
        player
    }

    /// Recompute derived stats from primaries, level and equipment.
    /// HP/MP are clamped to the new maxima, not refilled.
    pub fn recompute_derived(&mut self) {
        let level = self.level as i32;
        let con = self.stats.constitution as i32;
        let int = self.stats.intelligence as i32;
        let str_ = self.stats.strength as i32;
        let dex = self.stats.dexterity as i32;

        let equip_attack: i32 = self
            .equipment
            .values()
            .filter_map(|i| i.definition())
            .map(|d| d.attack_bonus)
            .sum();
        let equip_defense: i32 = self
            .equipment
            .values()
            .filter_map(|i| i.definition())
            .map(|d| d.defense_bonus)
            .sum();

        self.derived.max_hp = BASE_HP + con * 3 + (level - 1) * 8;
        self.derived.max_mp = BASE_MP + int * 2 + (level - 1) * 4;
        self.derived.attack = 3 + str_ / 2 + level + equip_attack;
        self.derived.defense = 1 + dex / 3 + level / 2 + equip_defense;
        self.derived.crit_chance = 0.05 + dex as f32 * 0.005;
        self.derived.crit_multiplier = 2.0;

        self.derived.hp = self.derived.hp.min(self.derived.max_hp);
        self.derived.mp = self.derived.mp.min(self.derived.max_mp);
    }

    /// A stat after status-effect modifiers.
    pub fn effective_stat(&self, stat: &str) -> i32 {
        let base = match stat {
            "attack" => self.derived.attack,
            "defense" => self.derived.defense,
            "speed" => self.stats.dexterity as i32 / 2,
            _ => 0,
        };
        let modifier: i32 = self
            .status_effects
            .iter()
            .filter_map(|e| e.stat_modifiers.get(stat))
            .sum();
        base + modifier
    }

    /// Apply damage. Returns (actual damage, died, message).
    pub fn take_damage(&mut self, amount: i32, source: &str) -> (i32, bool, String) {
        let actual = amount.max(1);
        self.derived.hp -= actual;
        if self.derived.hp <= 0 {
            (actual, true, format!("{source} deals a mortal blow."))
        } else {
            (actual, false, format!("Took {actual} damage from {source}."))
        }
    }

    /// Heal up to max HP. Returns (actual healed, message).
    pub fn heal(&mut self, amount: i32, source: &str) -> (i32, String) {
        let actual = amount.min(self.derived.max_hp - self.derived.hp).max(0);
        self.derived.hp += actual;
        (actual, format!("{source} restores {actual} HP."))
    }

    pub fn restore_mana(&mut self, amount: i32) -> (i32, String) {
        let actual = amount.min(self.derived.max_mp - self.derived.mp).max(0);
        self.derived.mp += actual;
        (actual, format!("Restored {actual} MP."))
    }

    /// XP required to reach the next level.
    pub fn xp_to_next(&self) -> u32 {
        self.level * 100
    }

    /// Gain experience, possibly leveling. Returns (leveled, message).
    pub fn gain_experience(&mut self, amount: u32) -> (bool, String) {
        self.xp += amount;
        let mut leveled = false;
        while self.xp >= self.xp_to_next() {
            self.xp -= self.xp_to_next();
            self.level += 1;
            leveled = true;
            // Modest, flat growth; classes differentiate via base stats.
            self.stats.strength += 1;
            self.stats.constitution += 1;
            self.recompute_derived();
            self.derived.hp = self.derived.max_hp;
            self.derived.mp = self.derived.max_mp;
        }
        if leveled {
            (true, format!("Gained {amount} XP. Welcome to level {}!", self.level))
        } else {
            (false, format!("Gained {amount} XP."))
        }
    }

    /// Full recovery at a safe spot. Clears poison but keeps buffs.
    pub fn full_rest(&mut self) -> String {
        self.derived.hp = self.derived.max_hp;
        self.derived.mp = self.derived.max_mp;
        self.status_effects
            .retain(|e| e.kind != StatusKind::Poison);
        "HP and MP fully restored.".to_string()
    }

    /// Return from death: half health, effects cleared.
    pub fn respawn(&mut self) -> String {
        self.deaths += 1;
        self.status_effects.clear();
        self.derived.hp = self.derived.max_hp / 2;
        self.derived.mp = self.derived.max_mp / 2;
        "You awaken at the dungeon entrance, weakened but alive.".to_string()
    }

    pub fn add_status_effect(&mut self, effect: StatusEffect) -> String {
        let message = format!("{} takes hold ({} turns).", effect.name, effect.duration);
        self.status_effects.retain(|e| e.id != effect.id);
        self.status_effects.push(effect);
        message
    }

    pub fn remove_status_effect(&mut self, id: &str) {
        self.status_effects.retain(|e| e.id != id);
    }

    /// Advance status effects by one turn; returns messages for expiries
    /// and periodic damage.
    pub fn tick_status_effects(&mut self) -> Vec<String> {
        let mut messages = Vec::new();
        let mut damage = 0;
        for effect in &mut self.status_effects {
            match effect.kind {
                StatusKind::Poison => damage += 2,
                StatusKind::Regeneration => damage -= 2,
                StatusKind::Buff => {}
            }
            effect.duration = effect.duration.saturating_sub(1);
        }
        if damage > 0 {
            self.derived.hp = (self.derived.hp - damage).max(1);
            messages.push(format!("Poison saps {damage} HP."));
        } else if damage < 0 {
            let healed = (-damage).min(self.derived.max_hp - self.derived.hp);
            self.derived.hp += healed;
            if healed > 0 {
                messages.push(format!("Regeneration restores {healed} HP."));
            }
        }
        let expired: Vec<String> = self
            .status_effects
            .iter()
            .filter(|e| e.duration == 0)
            .map(|e| format!("{} wears off.", e.name))
            .collect();
        messages.extend(expired);
        self.status_effects.retain(|e| e.duration > 0);
        messages
    }

    pub fn record_step(&mut self) {
        self.steps_taken += 1;
    }

    pub fn record_enemy_defeated(&mut self) {
        self.enemies_defeated += 1;
    }

    /// One-line status for prompt context.
    pub fn summary(&self) -> String {
        format!(
            "{} the {} (level {}), HP {}/{}, MP {}/{}",
            self.name,
            self.class.name(),
            self.level,
            self.derived.hp,
            self.derived.max_hp,
            self.derived.mp,
            self.derived.max_mp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_player_starts_at_full_health() {
        let player = Player::new("Hero", PlayerClass::Warrior);
        assert_eq!(player.derived.hp, player.derived.max_hp);
        assert_eq!(player.derived.mp, player.derived.max_mp);
        assert_eq!(player.level, 1);
    }

    #[test]
    fn test_damage_and_heal() {
        let mut player = Player::new("Hero", PlayerClass::Adventurer);
        let (dealt, died, _) = player.take_damage(10, "a goblin");
        assert_eq!(dealt, 10);
        assert!(!died);
        let (healed, _) = player.heal(100, "Potion");
        assert_eq!(healed, 10);
        assert_eq!(player.derived.hp, player.derived.max_hp);
    }

    #[test]
    fn test_leveling_refills_health() {
        let mut player = Player::new("Hero", PlayerClass::Rogue);
        player.take_damage(20, "trap");
        let (leveled, msg) = player.gain_experience(150);
        assert!(leveled);
        assert!(msg.contains("level 2"));
        assert_eq!(player.level, 2);
        assert_eq!(player.xp, 50);
        assert_eq!(player.derived.hp, player.derived.max_hp);
    }

    #[test]
    fn test_status_effect_ticking() {
        let mut player = Player::new("Hero", PlayerClass::Adventurer);
        player.add_status_effect(StatusEffect {
            id: "poison".into(),
            name: "Poison".into(),
            kind: StatusKind::Poison,
            stat_modifiers: HashMap::new(),
            duration: 2,
            source: "spider bite".into(),
        });
        let hp = player.derived.hp;
        player.tick_status_effects();
        assert_eq!(player.derived.hp, hp - 2);
        let messages = player.tick_status_effects();
        assert!(messages.iter().any(|m| m.contains("wears off")));
        assert!(player.status_effects.is_empty());
    }

    #[test]
    fn test_poison_never_kills_outright() {
        let mut player = Player::new("Hero", PlayerClass::Adventurer);
        player.derived.hp = 2;
        player.add_status_effect(StatusEffect {
            id: "poison".into(),
            name: "Poison".into(),
            kind: StatusKind::Poison,
            stat_modifiers: HashMap::new(),
            duration: 5,
            source: "spider bite".into(),
        });
        player.tick_status_effects();
        assert_eq!(player.derived.hp, 1);
    }

    #[test]
    fn test_buff_modifies_effective_stat() {
        let mut player = Player::new("Hero", PlayerClass::Adventurer);
        let base = player.effective_stat("attack");
        player.add_status_effect(StatusEffect {
            id: "buff_attack".into(),
            name: "Strength Boost".into(),
            kind: StatusKind::Buff,
            stat_modifiers: HashMap::from([("attack".to_string(), 5)]),
            duration: 3,
            source: "tonic".into(),
        });
        assert_eq!(player.effective_stat("attack"), base + 5);
    }

    #[test]
    fn test_respawn_halves_health() {
        let mut player = Player::new("Hero", PlayerClass::Adventurer);
        player.take_damage(player.derived.max_hp + 10, "the boss");
        player.respawn();
        assert_eq!(player.deaths, 1);
        assert_eq!(player.derived.hp, player.derived.max_hp / 2);
    }
}
