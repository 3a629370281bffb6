//! Item definitions and the player inventory.
//!
//! Item definitions are immutable and looked up by a stable key; instances
//! reference a definition and carry the mutable bits (quantity, durability,
//! enchantments).

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for item instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Inventory is full")]
    Full,

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Item is not usable: {0}")]
    NotUsable(String),

    #[error("Unknown item definition: {0}")]
    UnknownDefinition(String),
}

/// Item categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemCategory {
    Weapon,
    Armor,
    Consumable,
    Quest,
    Key,
    Misc,
}

/// Item rarity tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
}

/// Equipment slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquipSlot {
    Weapon,
    Armor,
    Trinket,
}

/// What using an item does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemEffect {
    Heal(i32),
    RestoreMana(i32),
    CurePoison,
    Buff {
        stat: String,
        value: i32,
        duration: u32,
    },
    Escape,
    Light,
}

/// An immutable item definition.
#[derive(Debug, Clone)]
pub struct ItemDef {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: ItemCategory,
    pub rarity: Rarity,
    pub stackable: bool,
    pub max_stack: u32,
    pub slot: Option<EquipSlot>,
    pub effect: Option<ItemEffect>,
    pub attack_bonus: i32,
    pub defense_bonus: i32,
}

macro_rules! item_def {
    ($key:expr, $name:expr, $desc:expr, $cat:expr, $rarity:expr => $($field:ident : $value:expr),* $(,)?) => {{
        let mut def = ItemDef {
            key: $key,
            name: $name,
            description: $desc,
            category: $cat,
            rarity: $rarity,
            stackable: true,
            max_stack: 99,
            slot: None,
            effect: None,
            attack_bonus: 0,
            defense_bonus: 0,
        };
        $(def.$field = $value;)*
        def
    }};
}

static ITEM_DEFS: Lazy<HashMap<&'static str, ItemDef>> = Lazy::new(|| {
    use ItemCategory::*;
    use Rarity::*;

    let defs = [
        item_def!("torch", "Torch", "A burning brand that pushes back the dark.",
            Misc, Common => effect: Some(ItemEffect::Light)),
        item_def!("health_potion", "Health Potion", "A warm red draught.",
            Consumable, Common => effect: Some(ItemEffect::Heal(30))),
        item_def!("greater_health_potion", "Greater Health Potion", "Thick and glowing faintly.",
            Consumable, Uncommon => effect: Some(ItemEffect::Heal(75))),
        item_def!("mana_potion", "Mana Potion", "Cold blue liquid that hums.",
            Consumable, Common => effect: Some(ItemEffect::RestoreMana(25))),
        item_def!("antidote", "Antidote", "Bitter herbs steeped in vinegar.",
            Consumable, Common => effect: Some(ItemEffect::CurePoison)),
        item_def!("strength_tonic", "Strength Tonic", "Tastes of iron and bad decisions.",
            Consumable, Uncommon => effect: Some(ItemEffect::Buff {
                stat: "attack".to_string(), value: 5, duration: 10 })),
        item_def!("smoke_bomb", "Smoke Bomb", "Guarantees a hasty exit.",
            Consumable, Uncommon => effect: Some(ItemEffect::Escape)),
        item_def!("rusty_sword", "Rusty Sword", "It has seen better centuries.",
            Weapon, Common => stackable: false, max_stack: 1,
            slot: Some(EquipSlot::Weapon), attack_bonus: 2),
        item_def!("iron_sword", "Iron Sword", "Plain, heavy, dependable.",
            Weapon, Uncommon => stackable: false, max_stack: 1,
            slot: Some(EquipSlot::Weapon), attack_bonus: 5),
        item_def!("bone_blade", "Bone Blade", "Carved from something large.",
            Weapon, Rare => stackable: false, max_stack: 1,
            slot: Some(EquipSlot::Weapon), attack_bonus: 8),
        item_def!("leather_armor", "Leather Armor", "Scuffed but serviceable.",
            Armor, Common => stackable: false, max_stack: 1,
            slot: Some(EquipSlot::Armor), defense_bonus: 2),
        item_def!("chainmail", "Chainmail", "Rings of dull steel.",
            Armor, Uncommon => stackable: false, max_stack: 1,
            slot: Some(EquipSlot::Armor), defense_bonus: 5),
        item_def!("dungeon_key", "Dungeon Key", "Black iron, strangely warm.",
            Key, Uncommon => stackable: false, max_stack: 1),
        item_def!("cracked_relic", "Cracked Relic", "It whispers when held.",
            Quest, Rare => stackable: false, max_stack: 1),
        item_def!("old_coin", "Old Coin", "Currency of a kingdom long gone.",
            Misc, Common =>),
    ];

    defs.into_iter().map(|d| (d.key, d)).collect()
});

/// Look up an item definition by key.
pub fn item_def(key: &str) -> Option<&'static ItemDef> {
    ITEM_DEFS.get(key)
}

/// All item definition keys, for spawn tables.
pub fn item_keys() -> impl Iterator<Item = &'static str> {
    ITEM_DEFS.keys().copied()
}

/// A concrete item in the world or an inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemInstance {
    pub id: ItemId,
    /// Key into the immutable definition registry.
    pub def: String,
    pub name: String,
    pub quantity: u32,
    pub durability: Option<u32>,
    pub enchantments: Vec<String>,
}

impl ItemInstance {
    /// Create an instance of a known definition.
    pub fn of(def_key: &str, quantity: u32) -> Result<Self, InventoryError> {
        let def =
            item_def(def_key).ok_or_else(|| InventoryError::UnknownDefinition(def_key.into()))?;
        let durability = match def.category {
            ItemCategory::Weapon | ItemCategory::Armor => Some(100),
            _ => None,
        };
        Ok(Self {
            id: ItemId::new(),
            def: def.key.to_string(),
            name: def.name.to_string(),
            quantity,
            durability,
            enchantments: Vec::new(),
        })
    }

    pub fn definition(&self) -> Option<&'static ItemDef> {
        item_def(&self.def)
    }
}

/// The player's inventory: an ordered list of stacked item references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    slots: Vec<ItemInstance>,
    pub gold: u32,
    pub capacity: usize,
}

impl Inventory {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            gold: 0,
            capacity,
        }
    }

    pub fn items(&self) -> &[ItemInstance] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn add_gold(&mut self, amount: u32) {
        self.gold += amount;
    }

    /// Remove up to `amount` gold; returns what was actually removed.
    pub fn remove_gold(&mut self, amount: u32) -> u32 {
        let removed = amount.min(self.gold);
        self.gold -= removed;
        removed
    }

    /// Add an item, stacking onto an existing slot where the definition
    /// allows it.
    pub fn add(&mut self, item: ItemInstance) -> Result<(), InventoryError> {
        let def = item
            .definition()
            .ok_or_else(|| InventoryError::UnknownDefinition(item.def.clone()))?;

        if def.stackable {
            if let Some(existing) = self
                .slots
                .iter_mut()
                .find(|s| s.def == item.def && s.quantity < def.max_stack)
            {
                let space = def.max_stack - existing.quantity;
                let moved = item.quantity.min(space);
                existing.quantity += moved;
                let remainder = item.quantity - moved;
                if remainder == 0 {
                    return Ok(());
                }
                let mut rest = item;
                rest.quantity = remainder;
                return self.add(rest);
            }
        }

        if self.slots.len() >= self.capacity {
            return Err(InventoryError::Full);
        }
        self.slots.push(item);
        Ok(())
    }

    /// Find an item by instance id or definition key.
    pub fn find(&self, key: &str) -> Option<&ItemInstance> {
        self.slots
            .iter()
            .find(|s| s.def == key || s.id.to_string() == key)
    }

    pub fn has(&self, def_key: &str) -> bool {
        self.slots.iter().any(|s| s.def == def_key)
    }

    /// Remove one unit of an item; drops the slot when the stack empties.
    pub fn remove_one(&mut self, key: &str) -> Result<ItemInstance, InventoryError> {
        let index = self
            .slots
            .iter()
            .position(|s| s.def == key || s.id.to_string() == key)
            .ok_or_else(|| InventoryError::NotFound(key.into()))?;

        let slot = &mut self.slots[index];
        if slot.quantity > 1 {
            slot.quantity -= 1;
            let mut single = slot.clone();
            single.id = ItemId::new();
            single.quantity = 1;
            Ok(single)
        } else {
            Ok(self.slots.remove(index))
        }
    }

    /// Consume one unit of a usable item and return its effect.
    pub fn consume(&mut self, key: &str) -> Result<(String, ItemEffect), InventoryError> {
        let item = self
            .find(key)
            .ok_or_else(|| InventoryError::NotFound(key.into()))?;
        let def = item
            .definition()
            .ok_or_else(|| InventoryError::UnknownDefinition(item.def.clone()))?;
        let effect = def
            .effect
            .clone()
            .ok_or_else(|| InventoryError::NotUsable(def.name.to_string()))?;
        let name = def.name.to_string();
        // Light sources are not consumed by use.
        if effect != ItemEffect::Light {
            self.remove_one(key)?;
        }
        Ok((name, effect))
    }

    /// One-line summary for prompt context.
    pub fn summary(&self) -> String {
        if self.slots.is_empty() {
            return format!("empty pack, {} gold", self.gold);
        }
        let mut parts: Vec<String> = self
            .slots
            .iter()
            .map(|s| {
                if s.quantity > 1 {
                    format!("{} x{}", s.name, s.quantity)
                } else {
                    s.name.clone()
                }
            })
            .collect();
        parts.push(format!("{} gold", self.gold));
        parts.join(", ")
    }
}
