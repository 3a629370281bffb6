//! Procedural room generation.
//!
//! Everything here is synchronous and deterministic in the world seed and
//! room coordinate: biome selection, layout carving, spawns and exits. The
//! intelligence core only ever upgrades the text around what this module
//! builds; it never touches tiles or exits.

use crate::actors::{
    AiType, EnemyId, EnemyInstance, Faction, NpcArchetype, NpcInstance, NpcPersonality,
};
use crate::fallback;
use crate::glyphs;
use crate::items::ItemInstance;
use crate::world::{Biome, Coordinate, Direction, Room, RoomFeature, TileGrid};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};

/// Chance an unconstrained cardinal direction opens into a new exit.
const EXIT_CHANCE: f64 = 0.45;
const STAIRS_DOWN_CHANCE: f64 = 0.10;
const STAIRS_UP_CHANCE: f64 = 0.08;
const NPC_CHANCE: f64 = 0.12;
const CAMPFIRE_CHANCE: f64 = 0.15;
const MAX_DEPTH: i32 = 10;

/// Inputs to room generation.
pub struct GenerationInput<'a> {
    pub seed: &'a str,
    pub coord: Coordinate,
    pub rng: StdRng,
    /// Directions with an already-generated neighbor: `true` means the
    /// neighbor has the reciprocal exit and this room must too; `false`
    /// means it does not and this room must not.
    pub exit_constraints: HashMap<Direction, bool>,
    pub player_level: u32,
}

/// Deterministic biome partition over `(x, y)`, with `z` selecting the
/// family. Lateral space is divided into coarse cells so biomes form
/// contiguous patches rather than per-room noise.
pub fn biome_at(seed: &str, coord: Coordinate) -> Biome {
    let families: &[Biome] = match coord.z {
        z if z <= 0 => &[Biome::Dungeon, Biome::Cave, Biome::Forest],
        1..=2 => &[Biome::Dungeon, Biome::Cave],
        3..=5 => &[Biome::Dungeon, Biome::Crypt, Biome::Ruins],
        6..=7 => &[Biome::Temple, Biome::Ruins, Biome::Crypt],
        8..=9 => &[Biome::Volcano, Biome::Temple],
        _ => &[Biome::Void],
    };

    let cell_x = coord.x.div_euclid(3);
    let cell_y = coord.y.div_euclid(3);
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(cell_x.to_le_bytes());
    hasher.update(cell_y.to_le_bytes());
    hasher.update(coord.z.to_le_bytes());
    let digest = hasher.finalize();
    let pick = u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"));
    families[(pick % families.len() as u64) as usize]
}

/// Difficulty scale for spawns: `1 + 0.1 * (zone_level - player_level)`,
/// clamped to [0.5, 2.0].
pub fn difficulty_scale(coord: Coordinate, player_level: u32) -> f32 {
    let zone_level = 1 + coord.z.max(0) + (coord.x.abs() + coord.y.abs()) / 4;
    let scale = 1.0 + 0.1 * (zone_level as f32 - player_level as f32);
    scale.clamp(0.5, 2.0)
}

/// Generate a room. Called exactly once per coordinate by the world store.
pub fn generate_room(input: GenerationInput<'_>) -> Room {
    let GenerationInput {
        seed,
        coord,
        mut rng,
        exit_constraints,
        player_level,
    } = input;

    if coord == Coordinate::ORIGIN {
        return origin_room(seed, coord, &mut rng);
    }

    let biome = biome_at(seed, coord);
    let (width, height) = biome.grid_size();

    let mut grid = match biome {
        Biome::Dungeon | Biome::Crypt | Biome::Ruins => carve_bsp(width, height, &mut rng),
        Biome::Cave | Biome::Forest | Biome::Volcano => carve_cellular(width, height, &mut rng),
        Biome::Temple | Biome::Void => carve_template(width, height, biome),
    };

    let exits = decide_exits(coord, &exit_constraints, &mut rng);
    carve_exits(&mut grid, &exits, biome);

    let scale = difficulty_scale(coord, player_level);
    let mut open = open_tiles(&grid);
    open.shuffle(&mut rng);

    let enemies = spawn_enemies(biome, coord, scale, &mut open, &mut grid, &mut rng);
    let items = spawn_items(biome, &mut open, &mut grid, &mut rng);
    let npcs = spawn_npcs(biome, &mut open, &mut grid, &mut rng);
    let features = spawn_features(biome, &mut open, &mut grid, &mut rng);

    let description = fallback::biome_description(biome, rng.gen());

    Room {
        coord,
        biome,
        grid,
        exits,
        description,
        description_enriched: false,
        items,
        enemies,
        npcs,
        features,
        visited: false,
        cleared: false,
        changes: Vec::new(),
    }
}

/// The starting room: a plain, safe chamber with a campfire and a single
/// southern exit.
fn origin_room(_seed: &str, coord: Coordinate, rng: &mut StdRng) -> Room {
    let biome = Biome::Dungeon;
    let (width, height) = biome.grid_size();
    let mut grid = walled_shell(width, height);

    let exits = BTreeSet::from([Direction::South]);
    carve_exits(&mut grid, &exits, biome);

    grid.set(2, 2, glyphs::CAMPFIRE).expect("in bounds");
    grid.set(width - 2, 1, glyphs::TORCH_SCONCE).expect("in bounds");

    Room {
        coord,
        biome,
        grid,
        exits,
        description: fallback::biome_description(biome, rng.gen()),
        description_enriched: false,
        items: Vec::new(),
        enemies: Vec::new(),
        npcs: Vec::new(),
        features: vec![RoomFeature::Campfire, RoomFeature::TorchSconce],
        visited: false,
        cleared: true,
        changes: Vec::new(),
    }
}

// ============================================================================
// Layout carving
// ============================================================================

fn walled_shell(width: u32, height: u32) -> TileGrid {
    let mut grid = TileGrid::filled(width, height, glyphs::FLOOR);
    for x in 0..width {
        grid.set(x, 0, glyphs::WALL).expect("in bounds");
        grid.set(x, height - 1, glyphs::WALL).expect("in bounds");
    }
    for y in 0..height {
        grid.set(0, y, glyphs::WALL).expect("in bounds");
        grid.set(width - 1, y, glyphs::WALL).expect("in bounds");
    }
    grid
}

/// Binary-space partition: one recursive split with a doorway, pillars in
/// larger cells. At room scale one split is plenty.
fn carve_bsp(width: u32, height: u32, rng: &mut StdRng) -> TileGrid {
    let mut grid = walled_shell(width, height);

    if rng.gen_bool(0.6) && width >= 8 {
        let split_x = rng.gen_range(3..width - 3);
        let gap_y = rng.gen_range(1..height - 1);
        for y in 1..height - 1 {
            if y != gap_y {
                grid.set(split_x, y, glyphs::WALL).expect("in bounds");
            }
        }
        grid.set(split_x, gap_y, glyphs::DOOR_OPEN).expect("in bounds");
    }

    if rng.gen_bool(0.4) {
        let px = rng.gen_range(2..width - 2);
        let py = rng.gen_range(2..height - 2);
        if grid.get(px, py) == Some(glyphs::FLOOR) {
            grid.set(px, py, glyphs::PILLAR).expect("in bounds");
        }
    }

    grid
}

/// Cellular automata: random interior fill, then two smoothing passes. The
/// center is cleared afterwards so the room can never close up entirely.
fn carve_cellular(width: u32, height: u32, rng: &mut StdRng) -> TileGrid {
    let mut grid = walled_shell(width, height);
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            if rng.gen_bool(0.38) {
                grid.set(x, y, glyphs::WALL).expect("in bounds");
            }
        }
    }

    for _ in 0..2 {
        let previous = grid.clone();
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let mut walls = 0;
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = x as i32 + dx;
                        let ny = y as i32 + dy;
                        if previous.get(nx as u32, ny as u32) == Some(glyphs::WALL) {
                            walls += 1;
                        }
                    }
                }
                let tile = if walls >= 5 { glyphs::WALL } else { glyphs::FLOOR };
                grid.set(x, y, tile).expect("in bounds");
            }
        }
    }

    // Keep a guaranteed corridor through the middle.
    let mid_y = height / 2;
    let mid_x = width / 2;
    for x in 1..width - 1 {
        grid.set(x, mid_y, glyphs::FLOOR).expect("in bounds");
    }
    for y in 1..height - 1 {
        grid.set(mid_x, y, glyphs::FLOOR).expect("in bounds");
    }
    grid
}

/// Structured layout for temples and the void: symmetric pillars, an altar
/// niche, fluid accents.
fn carve_template(width: u32, height: u32, biome: Biome) -> TileGrid {
    let mut grid = walled_shell(width, height);
    for &x in &[2, width - 3] {
        for &y in &[2, height - 3] {
            grid.set(x, y, glyphs::PILLAR).expect("in bounds");
        }
    }
    if biome == Biome::Temple {
        grid.set(width / 2, 1, glyphs::ALTAR).expect("in bounds");
    } else {
        grid.set(width / 2, height / 2, glyphs::VOID).expect("in bounds");
    }
    grid
}

// ============================================================================
// Exits
// ============================================================================

/// Decide the exit set. Constrained directions are copied verbatim to keep
/// reciprocity; unconstrained cardinals roll against a connectivity-biased
/// chance; stairs are rarer and depth-gated. A room never generates with no
/// exits at all.
fn decide_exits(
    coord: Coordinate,
    constraints: &HashMap<Direction, bool>,
    rng: &mut StdRng,
) -> BTreeSet<Direction> {
    let mut exits = BTreeSet::new();

    for direction in Direction::cardinal() {
        match constraints.get(&direction) {
            Some(true) => {
                exits.insert(direction);
            }
            Some(false) => {}
            None => {
                if rng.gen_bool(EXIT_CHANCE) {
                    exits.insert(direction);
                }
            }
        }
    }

    for (direction, gate, chance) in [
        (Direction::Down, coord.z < MAX_DEPTH, STAIRS_DOWN_CHANCE),
        (Direction::Up, coord.z > 0, STAIRS_UP_CHANCE),
    ] {
        match constraints.get(&direction) {
            Some(true) => {
                exits.insert(direction);
            }
            Some(false) => {}
            None => {
                if gate && rng.gen_bool(chance) {
                    exits.insert(direction);
                }
            }
        }
    }

    if exits.is_empty() {
        let open: Vec<Direction> = Direction::cardinal()
            .into_iter()
            .filter(|d| constraints.get(d) != Some(&false))
            .collect();
        if let Some(direction) = open.choose(rng) {
            exits.insert(*direction);
        } else {
            // Every lateral neighbor refused us; tunnel out instead.
            exits.insert(if coord.z < MAX_DEPTH {
                Direction::Down
            } else {
                Direction::Up
            });
        }
    }

    exits
}

/// Carve wall openings and stair tiles for the exit set.
fn carve_exits(grid: &mut TileGrid, exits: &BTreeSet<Direction>, biome: Biome) {
    let width = grid.width();
    let height = grid.height();
    let doorway = match biome {
        Biome::Dungeon | Biome::Crypt | Biome::Temple => glyphs::DOOR_OPEN,
        _ => glyphs::FLOOR,
    };

    for exit in exits {
        match exit {
            Direction::North => {
                grid.set(width / 2, 0, doorway).expect("in bounds");
                grid.set(width / 2, 1, glyphs::FLOOR).expect("in bounds");
            }
            Direction::South => {
                grid.set(width / 2, height - 1, doorway).expect("in bounds");
                grid.set(width / 2, height - 2, glyphs::FLOOR).expect("in bounds");
            }
            Direction::East => {
                grid.set(width - 1, height / 2, doorway).expect("in bounds");
                grid.set(width - 2, height / 2, glyphs::FLOOR).expect("in bounds");
            }
            Direction::West => {
                grid.set(0, height / 2, doorway).expect("in bounds");
                grid.set(1, height / 2, glyphs::FLOOR).expect("in bounds");
            }
            Direction::Down => {
                grid.set(width / 2 + 1, height / 2, glyphs::STAIRS_DOWN)
                    .expect("in bounds");
            }
            Direction::Up => {
                grid.set(width / 2 - 1, height / 2, glyphs::STAIRS_UP)
                    .expect("in bounds");
            }
        }
    }
}

// ============================================================================
// Spawns
// ============================================================================

fn open_tiles(grid: &TileGrid) -> Vec<(u32, u32)> {
    let mut open = Vec::new();
    for y in 1..grid.height() - 1 {
        for x in 1..grid.width() - 1 {
            if grid.get(x, y) == Some(glyphs::FLOOR) {
                open.push((x, y));
            }
        }
    }
    open
}

struct EnemySpawn {
    archetype: &'static str,
    name: &'static str,
    hp: i32,
    attack: i32,
    defense: i32,
    xp: u32,
    ai: AiType,
}

fn enemy_table(biome: Biome) -> &'static [EnemySpawn] {
    macro_rules! spawn {
        ($arch:expr, $name:expr, $hp:expr, $atk:expr, $def:expr, $xp:expr, $ai:expr) => {
            EnemySpawn {
                archetype: $arch,
                name: $name,
                hp: $hp,
                attack: $atk,
                defense: $def,
                xp: $xp,
                ai: $ai,
            }
        };
    }
    match biome {
        Biome::Dungeon => &[
            spawn!("rat_swarm", "Rat Swarm", 10, 3, 0, 15, AiType::Swarm),
            spawn!("goblin", "Goblin Scavenger", 14, 5, 2, 25, AiType::Skirmisher),
            spawn!("skeleton", "Rattling Skeleton", 18, 6, 3, 35, AiType::Brute),
        ],
        Biome::Cave => &[
            spawn!("cave_spider", "Cave Spider", 12, 4, 1, 20, AiType::Skirmisher),
            spawn!("bat_swarm", "Bat Swarm", 8, 3, 0, 12, AiType::Swarm),
            spawn!("troll", "Cave Troll", 30, 8, 4, 60, AiType::Brute),
        ],
        Biome::Crypt => &[
            spawn!("skeleton", "Rattling Skeleton", 18, 6, 3, 35, AiType::Brute),
            spawn!("wight", "Barrow Wight", 26, 8, 4, 55, AiType::Guardian),
            spawn!("ghoul", "Pale Ghoul", 20, 7, 2, 40, AiType::Skirmisher),
        ],
        Biome::Ruins => &[
            spawn!("bandit", "Ruin Bandit", 16, 6, 2, 30, AiType::Skirmisher),
            spawn!("animated_armor", "Animated Armor", 24, 6, 6, 50, AiType::Guardian),
        ],
        Biome::Temple => &[
            spawn!("cultist", "Hollow Cultist", 18, 7, 2, 40, AiType::Caster),
            spawn!("temple_guardian", "Temple Guardian", 32, 9, 6, 70, AiType::Guardian),
        ],
        Biome::Forest => &[
            spawn!("wolf", "Gaunt Wolf", 14, 6, 1, 25, AiType::Skirmisher),
            spawn!("treant_sapling", "Treant Sapling", 22, 5, 5, 45, AiType::Brute),
        ],
        Biome::Volcano => &[
            spawn!("magma_imp", "Magma Imp", 20, 9, 2, 55, AiType::Caster),
            spawn!("salamander", "Ember Salamander", 28, 10, 4, 70, AiType::Brute),
        ],
        Biome::Void => &[
            spawn!("hollow_one", "Hollow One", 35, 12, 5, 100, AiType::Caster),
            spawn!("unmade", "The Unmade", 40, 13, 6, 120, AiType::Guardian),
        ],
    }
}

fn spawn_enemies(
    biome: Biome,
    coord: Coordinate,
    scale: f32,
    open: &mut Vec<(u32, u32)>,
    grid: &mut TileGrid,
    rng: &mut StdRng,
) -> Vec<EnemyInstance> {
    let count = rng.gen_range(0..=2);
    let table = enemy_table(biome);
    let mut enemies = Vec::new();

    for _ in 0..count {
        let Some(tile) = open.pop() else { break };
        let spawn = &table[rng.gen_range(0..table.len())];
        let is_boss = coord.z >= 8 && rng.gen_bool(0.10);
        let boss_factor = if is_boss { 2.5 } else { 1.0 };
        grid.set(tile.0, tile.1, if is_boss { glyphs::BOSS } else { glyphs::ENEMY })
            .expect("open tile in bounds");
        enemies.push(EnemyInstance {
            id: EnemyId::new(),
            archetype: spawn.archetype.to_string(),
            name: if is_boss {
                format!("Dread {}", spawn.name)
            } else {
                spawn.name.to_string()
            },
            hp: scale_stat(spawn.hp, scale * boss_factor),
            max_hp: scale_stat(spawn.hp, scale * boss_factor),
            attack: scale_stat(spawn.attack, scale * boss_factor),
            defense: scale_stat(spawn.defense, scale),
            xp_reward: (spawn.xp as f32 * scale * boss_factor) as u32,
            ai: spawn.ai,
            faction: Faction::Hostile,
            tile,
            is_boss,
        });
    }
    enemies
}

fn scale_stat(base: i32, scale: f32) -> i32 {
    ((base as f32 * scale) as i32).max(1)
}

fn item_table(biome: Biome) -> &'static [&'static str] {
    match biome {
        Biome::Dungeon => &["health_potion", "torch", "rusty_sword", "old_coin"],
        Biome::Cave => &["health_potion", "antidote", "old_coin"],
        Biome::Crypt => &["mana_potion", "bone_blade", "old_coin", "dungeon_key"],
        Biome::Ruins => &["health_potion", "leather_armor", "old_coin", "iron_sword"],
        Biome::Temple => &["greater_health_potion", "mana_potion", "cracked_relic"],
        Biome::Forest => &["antidote", "health_potion", "strength_tonic"],
        Biome::Volcano => &["greater_health_potion", "smoke_bomb", "chainmail"],
        Biome::Void => &["greater_health_potion", "cracked_relic", "smoke_bomb"],
    }
}

fn spawn_items(
    biome: Biome,
    open: &mut Vec<(u32, u32)>,
    grid: &mut TileGrid,
    rng: &mut StdRng,
) -> Vec<ItemInstance> {
    let count = rng.gen_range(0..=2);
    let table = item_table(biome);
    let mut items = Vec::new();
    for _ in 0..count {
        let Some(tile) = open.pop() else { break };
        let key = table[rng.gen_range(0..table.len())];
        if let Ok(item) = ItemInstance::of(key, 1) {
            grid.set(tile.0, tile.1, glyphs::ITEM_DROP)
                .expect("open tile in bounds");
            items.push(item);
        }
    }
    items
}

fn npc_pool(biome: Biome) -> &'static [(NpcArchetype, &'static str)] {
    match biome {
        Biome::Dungeon | Biome::Ruins => &[
            (NpcArchetype::Hermit, "Old Marn"),
            (NpcArchetype::Merchant, "Sallow Pim"),
            (NpcArchetype::Warden, "Warden Oska"),
        ],
        Biome::Cave | Biome::Forest => &[
            (NpcArchetype::Hermit, "Root-Keeper Edda"),
            (NpcArchetype::LostSoul, "The Wanderer"),
        ],
        Biome::Crypt | Biome::Temple => &[
            (NpcArchetype::Ghost, "Pale Sela"),
            (NpcArchetype::Scholar, "Brother Quill"),
        ],
        Biome::Volcano | Biome::Void => &[
            (NpcArchetype::LostSoul, "The Remnant"),
            (NpcArchetype::Scholar, "Ash-Scribe Veth"),
        ],
    }
}

fn spawn_npcs(
    biome: Biome,
    open: &mut Vec<(u32, u32)>,
    grid: &mut TileGrid,
    rng: &mut StdRng,
) -> Vec<NpcInstance> {
    if !rng.gen_bool(NPC_CHANCE) {
        return Vec::new();
    }
    let Some(tile) = open.pop() else {
        return Vec::new();
    };
    let pool = npc_pool(biome);
    let (archetype, name) = pool[rng.gen_range(0..pool.len())];
    grid.set(tile.0, tile.1, glyphs::NPC)
        .expect("open tile in bounds");

    let traits_pool = [
        "wary", "garrulous", "secretive", "kindly", "bitter", "obsessive",
    ];
    let goals_pool = [
        "find a way out",
        "guard something precious",
        "finish an old tally",
        "atone for a failure",
        "trade for supplies",
    ];
    let mut traits: Vec<String> = traits_pool
        .choose_multiple(rng, 2)
        .map(|s| s.to_string())
        .collect();
    traits.sort();

    vec![NpcInstance::new(
        archetype,
        name,
        NpcPersonality {
            traits,
            speech_style: match archetype {
                NpcArchetype::Ghost => "faint and echoing".into(),
                NpcArchetype::Merchant => "quick and wheedling".into(),
                NpcArchetype::Scholar => "precise and distracted".into(),
                _ => "low and unhurried".into(),
            },
            goals: vec![goals_pool[rng.gen_range(0..goals_pool.len())].to_string()],
            knowledge: Vec::new(),
            relationship: 0,
        },
        tile,
    )]
}

fn spawn_features(
    biome: Biome,
    open: &mut Vec<(u32, u32)>,
    grid: &mut TileGrid,
    rng: &mut StdRng,
) -> Vec<RoomFeature> {
    let mut features = vec![RoomFeature::TorchSconce];

    if rng.gen_bool(CAMPFIRE_CHANCE) {
        if let Some(tile) = open.pop() {
            grid.set(tile.0, tile.1, glyphs::CAMPFIRE)
                .expect("open tile in bounds");
            features.push(RoomFeature::Campfire);
        }
    }
    if biome == Biome::Temple {
        features.push(RoomFeature::Altar);
    }
    if matches!(biome, Biome::Crypt | Biome::Ruins) && rng.gen_bool(0.3) {
        features.push(RoomFeature::BloodStains);
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng_for(n: u64) -> StdRng {
        StdRng::seed_from_u64(n)
    }

    fn generate(seed: &str, coord: Coordinate, constraints: HashMap<Direction, bool>) -> Room {
        generate_room(GenerationInput {
            seed,
            coord,
            rng: rng_for(7),
            exit_constraints: constraints,
            player_level: 1,
        })
    }

    #[test]
    fn test_biome_partition_is_deterministic() {
        let a = biome_at("s", Coordinate::new(5, 5, 3));
        let b = biome_at("s", Coordinate::new(5, 5, 3));
        assert_eq!(a, b);
        assert_eq!(biome_at("s", Coordinate::new(0, 0, 20)), Biome::Void);
    }

    #[test]
    fn test_difficulty_scale_clamps() {
        assert_eq!(difficulty_scale(Coordinate::ORIGIN, 30), 0.5);
        assert_eq!(difficulty_scale(Coordinate::new(40, 40, 10), 1), 2.0);
        let mid = difficulty_scale(Coordinate::new(0, 0, 2), 1);
        assert!((mid - 1.2).abs() < 1e-5);
    }

    #[test]
    fn test_origin_room_shape() {
        let room = generate("S0", Coordinate::ORIGIN, HashMap::new());
        assert_eq!(room.grid.width(), 10);
        assert_eq!(room.grid.height(), 7);
        assert_eq!(room.exits.len(), 1);
        assert!(room.exits.contains(&Direction::South));
        assert!(room.enemies.is_empty());
        assert!(room.has_feature(RoomFeature::Campfire));
        // Outer corners are wall.
        assert_eq!(room.grid.get(0, 0), Some(glyphs::WALL));
        assert_eq!(room.grid.get(9, 6), Some(glyphs::WALL));
        room.grid.validate().unwrap();
    }

    #[test]
    fn test_constraints_are_honored() {
        let mut constraints = HashMap::new();
        constraints.insert(Direction::North, true);
        constraints.insert(Direction::East, false);
        let room = generate("s", Coordinate::new(0, 1, 0), constraints);
        assert!(room.exits.contains(&Direction::North));
        assert!(!room.exits.contains(&Direction::East));
    }

    #[test]
    fn test_rooms_always_have_an_exit() {
        for i in 0..50 {
            let room = generate_room(GenerationInput {
                seed: "exit-test",
                coord: Coordinate::new(i, -i, (i % 5) as i32),
                rng: rng_for(i as u64),
                exit_constraints: HashMap::new(),
                player_level: 1,
            });
            assert!(!room.exits.is_empty(), "room {i} has no exits");
            room.grid.validate().unwrap();
        }
    }

    #[test]
    fn test_fully_refused_room_tunnels_out() {
        let mut constraints = HashMap::new();
        for direction in Direction::cardinal() {
            constraints.insert(direction, false);
        }
        let room = generate("s", Coordinate::new(3, 3, 0), constraints);
        assert!(room.exits.contains(&Direction::Down));
    }

    #[test]
    fn test_every_generated_tile_is_legend() {
        for i in 0..20 {
            let room = generate_room(GenerationInput {
                seed: "legend",
                coord: Coordinate::new(i, i, 4),
                rng: rng_for(i as u64 + 100),
                exit_constraints: HashMap::new(),
                player_level: 3,
            });
            room.grid.validate().unwrap();
        }
    }
}
