//! The glyph legend: the world's symbolic substrate.
//!
//! The world is a grid of opaque glyph identifiers drawn from the private-use
//! codepoint space. The legend maps each identifier to its semantic
//! attributes and is immutable for the lifetime of a run. The core emits and
//! consumes only glyph identifiers; rendering them is someone else's problem.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// An opaque glyph identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Glyph(pub u32);

impl fmt::Display for Glyph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U+{:04X}", self.0)
    }
}

/// Glyph category, determined by codepoint range.
///
/// Ranges are stable across a run:
/// E000 empty, E100 ground, E200 walls, E300 doors, E400 fluids, E500 props,
/// E600 items, E700 entities, E800 effects, E900 UI, EA00 overlays,
/// EB00 animation frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlyphCategory {
    Empty,
    Ground,
    Wall,
    Door,
    Fluid,
    Prop,
    Item,
    Entity,
    Effect,
    Ui,
    Overlay,
    Animation,
}

impl GlyphCategory {
    /// Classify a codepoint by its range, if it falls in the legend space.
    pub fn of(glyph: Glyph) -> Option<GlyphCategory> {
        match glyph.0 {
            0xE000..=0xE0FF => Some(GlyphCategory::Empty),
            0xE100..=0xE1FF => Some(GlyphCategory::Ground),
            0xE200..=0xE2FF => Some(GlyphCategory::Wall),
            0xE300..=0xE3FF => Some(GlyphCategory::Door),
            0xE400..=0xE4FF => Some(GlyphCategory::Fluid),
            0xE500..=0xE5FF => Some(GlyphCategory::Prop),
            0xE600..=0xE6FF => Some(GlyphCategory::Item),
            0xE700..=0xE7FF => Some(GlyphCategory::Entity),
            0xE800..=0xE8FF => Some(GlyphCategory::Effect),
            0xE900..=0xE9FF => Some(GlyphCategory::Ui),
            0xEA00..=0xEAFF => Some(GlyphCategory::Overlay),
            0xEB00..=0xEBFF => Some(GlyphCategory::Animation),
            _ => None,
        }
    }
}

/// Semantic attributes of a legend glyph.
#[derive(Debug, Clone)]
pub struct GlyphInfo {
    pub name: &'static str,
    pub category: GlyphCategory,
    pub walkable: bool,
    pub solid: bool,
    pub interactable: bool,
    /// Debug character for readable dumps; never used by game logic.
    pub debug_char: char,
}

// Well-known glyph identifiers. Kept to the content the generators and
// validators actually reference; the category ranges leave room for more.
pub const VOID: Glyph = Glyph(0xE000);
pub const FLOOR: Glyph = Glyph(0xE100);
pub const RUBBLE: Glyph = Glyph(0xE101);
pub const MOSS: Glyph = Glyph(0xE102);
pub const ASH: Glyph = Glyph(0xE103);
pub const WALL: Glyph = Glyph(0xE200);
pub const PILLAR: Glyph = Glyph(0xE201);
pub const DOOR_CLOSED: Glyph = Glyph(0xE300);
pub const DOOR_OPEN: Glyph = Glyph(0xE301);
pub const STAIRS_DOWN: Glyph = Glyph(0xE302);
pub const STAIRS_UP: Glyph = Glyph(0xE303);
pub const WATER: Glyph = Glyph(0xE400);
pub const LAVA: Glyph = Glyph(0xE401);
pub const CHEST: Glyph = Glyph(0xE500);
pub const CHEST_OPEN: Glyph = Glyph(0xE501);
pub const ALTAR: Glyph = Glyph(0xE502);
pub const CAMPFIRE: Glyph = Glyph(0xE503);
pub const TRAP: Glyph = Glyph(0xE504);
pub const TORCH_SCONCE: Glyph = Glyph(0xE505);
pub const ITEM_DROP: Glyph = Glyph(0xE600);
pub const PLAYER: Glyph = Glyph(0xE700);
pub const ENEMY: Glyph = Glyph(0xE701);
pub const BOSS: Glyph = Glyph(0xE702);
pub const NPC: Glyph = Glyph(0xE703);

static LEGEND: Lazy<HashMap<Glyph, GlyphInfo>> = Lazy::new(|| {
    let mut m = HashMap::new();
    let mut add = |glyph: Glyph, name, walkable, solid, interactable, debug_char| {
        let category = GlyphCategory::of(glyph).expect("legend glyph outside category ranges");
        m.insert(
            glyph,
            GlyphInfo {
                name,
                category,
                walkable,
                solid,
                interactable,
                debug_char,
            },
        );
    };

    add(VOID, "void", true, false, false, ' ');
    add(FLOOR, "floor", true, false, false, '.');
    add(RUBBLE, "rubble", true, false, false, ',');
    add(MOSS, "mossy floor", true, false, false, '"');
    add(ASH, "ash-covered floor", true, false, false, '\'');
    add(WALL, "wall", false, true, false, '#');
    add(PILLAR, "pillar", false, true, false, 'I');
    add(DOOR_CLOSED, "closed door", false, true, true, '+');
    add(DOOR_OPEN, "open door", true, false, true, '/');
    add(STAIRS_DOWN, "stairs down", true, false, true, '>');
    add(STAIRS_UP, "stairs up", true, false, true, '<');
    add(WATER, "water", false, false, false, '~');
    add(LAVA, "lava", false, false, false, '%');
    add(CHEST, "chest", false, true, true, 'c');
    add(CHEST_OPEN, "open chest", false, true, true, 'o');
    add(ALTAR, "altar", false, true, true, 'A');
    add(CAMPFIRE, "campfire", false, false, true, 'f');
    add(TRAP, "trap", true, false, true, '^');
    add(TORCH_SCONCE, "torch sconce", false, true, false, 't');
    add(ITEM_DROP, "item", true, false, true, '$');
    add(PLAYER, "player", false, false, false, '@');
    add(ENEMY, "enemy", false, false, true, '&');
    add(BOSS, "boss", false, false, true, 'B');
    add(NPC, "npc", false, false, true, 'n');
    m
});

/// Look up a glyph's semantic attributes.
pub fn info(glyph: Glyph) -> Option<&'static GlyphInfo> {
    LEGEND.get(&glyph)
}

/// Whether the glyph is part of the legend.
pub fn is_known(glyph: Glyph) -> bool {
    LEGEND.contains_key(&glyph)
}

/// Whether an entity can stand on this glyph.
pub fn is_walkable(glyph: Glyph) -> bool {
    info(glyph).map(|i| i.walkable).unwrap_or(false)
}

/// Resolve a debug character back to its glyph, for readable test fixtures.
pub fn from_debug_char(c: char) -> Option<Glyph> {
    LEGEND
        .iter()
        .find(|(_, info)| info.debug_char == c)
        .map(|(glyph, _)| *glyph)
}

/// Compressed legend text for LLM context: one line per glyph the model is
/// allowed to use, plus the category range rules.
pub fn legend_context() -> String {
    let mut entries: Vec<(&Glyph, &GlyphInfo)> = LEGEND.iter().collect();
    entries.sort_by_key(|(glyph, _)| glyph.0);

    let mut out = String::from("Tile legend (use only these identifiers):\n");
    for (glyph, info) in entries {
        out.push_str(&format!(
            "- {glyph} `{}` {}{}\n",
            info.debug_char,
            info.name,
            if info.walkable { " (walkable)" } else { "" }
        ));
    }
    out.push_str(
        "\nCategory rules:\n\
         - E000-E0FF empty, always passable\n\
         - E100-E1FF ground, typically passable\n\
         - E200-E2FF walls, block movement\n\
         - E300-E3FF doors and stairs, passable when open\n\
         - E400-E4FF fluids, impassable or hazardous\n\
         - E500-E5FF props, static interactive objects\n\
         - E600-E6FF items, collectible\n\
         - E700-E7FF entities\n",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legend_glyphs_classify_into_their_ranges() {
        assert_eq!(GlyphCategory::of(FLOOR), Some(GlyphCategory::Ground));
        assert_eq!(GlyphCategory::of(WALL), Some(GlyphCategory::Wall));
        assert_eq!(GlyphCategory::of(NPC), Some(GlyphCategory::Entity));
        assert_eq!(GlyphCategory::of(Glyph(0x0041)), None);
    }

    #[test]
    fn test_semantics() {
        assert!(is_walkable(FLOOR));
        assert!(!is_walkable(WALL));
        assert!(info(CHEST).unwrap().interactable);
        assert!(!is_known(Glyph(0xF000)));
    }

    #[test]
    fn test_debug_char_round_trip() {
        assert_eq!(from_debug_char('#'), Some(WALL));
        assert_eq!(from_debug_char('.'), Some(FLOOR));
        assert_eq!(from_debug_char('?'), None);
    }

    #[test]
    fn test_legend_context_mentions_rules() {
        let ctx = legend_context();
        assert!(ctx.contains("Category rules"));
        assert!(ctx.contains("wall"));
    }
}
