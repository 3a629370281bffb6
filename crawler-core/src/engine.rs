//! The game engine: one session's task loop.
//!
//! Processes player actions strictly in submission order, applies completed
//! background work at tick checkpoints, and broadcasts a delta after every
//! resolved action. World mutation and narrative append always happen
//! before the response returns; model content that has not arrived yet is
//! stood in for by procedural text. Nothing here is global; a session owns
//! all of its state.

use crate::actions::{DialogueData, PlayerAction, ResponseBundle};
use crate::actors::{EnemyInstance, NpcInstance};
use crate::context::{AssemblerInput, ContextAssembler, Fingerprint};
use crate::events::{EventBus, PlayerDigest, StateDelta};
use crate::items::{ItemEffect, ItemInstance};
use crate::memory::{CondensationJob, EventKind, MemoryConfig, NarrativeMemory};
use crate::metrics::MetricsSink;
use crate::persist::SaveBody;
use crate::player::{Player, PlayerClass, StatusEffect, StatusKind};
use crate::prefetch::{PrefetchPolicy, PrefetchScheduler};
use crate::prompts;
use crate::quests::{self, Quest, QuestLog};
use crate::router::{
    BackgroundCompletion, BackgroundTag, FallbackSpec, RequestKind, Router, RouterConfig,
};
use crate::validate::{Emotion, NpcDialogue, ValidatedResponse};
use crate::world::{
    ChangeOutcome, Coordinate, MoveOutcome, Room, RoomChange, WorldError, WorldState,
};
use llm::Backend;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

const STARTER_ITEMS: &[(&str, u32)] = &[("torch", 1), ("health_potion", 2)];
const RECENT_ACTION_CAP: usize = 8;
const NPC_KNOWLEDGE_CAP: usize = 12;

/// Session-scoped engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub seed: String,
    pub model_id: String,
    pub token_budget: usize,
    pub memory: MemoryConfig,
    pub prefetch: PrefetchPolicy,
    pub router: RouterConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: "wanderer".to_string(),
            model_id: "llama3.2".to_string(),
            token_budget: 2048,
            memory: MemoryConfig::default(),
            prefetch: PrefetchPolicy::default(),
            router: RouterConfig::default(),
        }
    }
}

/// Live combat bookkeeping. Not persisted; saves drop out of combat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatState {
    pub enemy: crate::actors::EnemyId,
    pub enemy_name: String,
    pub enemy_hp: i32,
    pub enemy_max_hp: i32,
    pub enemy_attack: i32,
    pub enemy_defense: i32,
    pub xp_reward: u32,
    pub round: u32,
}

/// A handler's contribution to the tick; the engine wraps it into the
/// response bundle.
struct TickOutcome {
    success: bool,
    message: String,
    narrative: String,
    audio_hint: Option<String>,
    dialogue: Option<DialogueData>,
}

impl TickOutcome {
    fn ok(message: impl Into<String>, narrative: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            narrative: narrative.into(),
            audio_hint: None,
            dialogue: None,
        }
    }

    fn refuse(message: impl Into<String>, narrative: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            narrative: narrative.into(),
            audio_hint: None,
            dialogue: None,
        }
    }
}

/// One game session's engine.
pub struct GameEngine {
    config: EngineConfig,
    world: WorldState,
    player: Player,
    memory: NarrativeMemory,
    quests: QuestLog,
    router: Router,
    assembler: ContextAssembler,
    background_rx: mpsc::UnboundedReceiver<BackgroundCompletion>,
    prefetch: PrefetchScheduler,
    bus: EventBus,
    combat: Option<CombatState>,
    rng: StdRng,
    turn: u64,
    recent_actions: Vec<String>,
    pending_condensation: Option<CondensationJob>,
    room_audio: HashMap<Coordinate, String>,
    preamble: String,
    tick_changes: Vec<(Coordinate, RoomChange)>,
    tick_narrative: Vec<String>,
}

impl GameEngine {
    pub fn new(backend: Arc<dyn Backend>, config: EngineConfig) -> Self {
        let metrics = MetricsSink::new();
        let (router, background_rx) = Router::new(backend, config.router.clone(), metrics);
        let assembler = ContextAssembler::new(config.token_budget, config.model_id.clone());
        let rng = engine_rng(&config.seed);

        Self {
            world: WorldState::new(config.seed.clone()),
            player: Player::new("Adventurer", PlayerClass::Adventurer),
            memory: NarrativeMemory::new(config.memory.clone()),
            quests: QuestLog::new(),
            router,
            assembler,
            background_rx,
            prefetch: PrefetchScheduler::new(config.prefetch.clone()),
            bus: EventBus::new(),
            combat: None,
            rng,
            turn: 0,
            recent_actions: Vec::new(),
            pending_condensation: None,
            room_audio: HashMap::new(),
            preamble: prompts::preamble(),
            config,
            tick_changes: Vec::new(),
            tick_narrative: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Direct world access. Mutations made here bypass the tick pipeline;
    /// tests and tools only.
    pub fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    /// Direct player access; tests and tools only.
    pub fn player_mut(&mut self) -> &mut Player {
        &mut self.player
    }

    /// Drop out of combat without resolving it; tests and tools only.
    pub fn clear_combat(&mut self) {
        self.combat = None;
    }

    pub fn memory(&self) -> &NarrativeMemory {
        &self.memory
    }

    pub fn quests(&self) -> &QuestLog {
        &self.quests
    }

    pub fn metrics(&self) -> MetricsSink {
        self.router.metrics().clone()
    }

    pub fn in_combat(&self) -> bool {
        self.combat.is_some()
    }

    pub fn combat(&self) -> Option<&CombatState> {
        self.combat.as_ref()
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StateDelta> {
        self.bus.subscribe()
    }

    // ------------------------------------------------------------------
    // The tick
    // ------------------------------------------------------------------

    /// Process one player action. This is the only way state changes.
    ///
    /// Never returns an error: recoverable problems come back as
    /// `success: false`, model trouble is absorbed into fallbacks.
    pub async fn perform(&mut self, action: PlayerAction) -> ResponseBundle {
        self.apply_background_completions();
        self.turn += 1;
        self.record_action(&action);

        let outcome = match action {
            PlayerAction::Move { direction } => self.handle_move(direction).await,
            PlayerAction::Attack { target } => self.handle_attack(target).await,
            PlayerAction::Flee => self.handle_flee().await,
            PlayerAction::Take { item } => self.handle_take(&item).await,
            PlayerAction::Use { item, .. } => self.handle_use(&item).await,
            PlayerAction::Talk { npc, message } => self.handle_talk(npc, message).await,
            PlayerAction::Rest => self.handle_rest().await,
            PlayerAction::SaveGame { .. } | PlayerAction::LoadGame { .. } => TickOutcome::refuse(
                "Saving and loading are handled by the session layer.",
                "Nothing happens.",
            ),
            PlayerAction::NewGame { player_name } => self.handle_new_game(player_name).await,
        };

        self.maybe_condense();
        self.update_cache_pins();
        self.finish_tick(outcome)
    }

    /// Drain completed background work at the tick checkpoint. Enrichment
    /// upgrades descriptions and NPC personalities, never tiles or exits.
    pub fn apply_background_completions(&mut self) {
        while let Ok(completion) = self.background_rx.try_recv() {
            self.apply_completion(completion);
        }
    }

    /// Await background work until the channel stays quiet for `idle`.
    /// Hosts call this when the player is idle; tests use it to observe
    /// enrichment and condensation without racing them.
    pub async fn settle(&mut self, idle: std::time::Duration) {
        loop {
            match tokio::time::timeout(idle, self.background_rx.recv()).await {
                Ok(Some(completion)) => self.apply_completion(completion),
                Ok(None) | Err(_) => break,
            }
        }
    }

    fn apply_completion(&mut self, completion: BackgroundCompletion) {
        match completion.tag {
            BackgroundTag::Enrichment { coord } => {
                self.apply_enrichment(coord, completion.result.response);
            }
            BackgroundTag::QuestGeneration { quest } => {
                if let ValidatedResponse::Quest(content) = completion.result.response {
                    self.quests.apply_content(quest, &content);
                }
            }
            BackgroundTag::Summarization => {
                if let Some(job) = self.pending_condensation.take() {
                    let text = match completion.result.response {
                        ValidatedResponse::Summary(s) => s.summary,
                        _ => self.memory.fallback_condense(&job),
                    };
                    let collapsed = self.memory.complete_condensation(&job, &text);
                    tracing::debug!(collapsed, "condensation applied");
                }
            }
        }
    }

    fn apply_enrichment(&mut self, coord: Coordinate, response: ValidatedResponse) {
        let ValidatedResponse::Room(description) = response else {
            return;
        };
        if !self.world.room_exists(coord) {
            return;
        }
        let _ = self.change_room(
            coord,
            RoomChange::SetDescription {
                description: description.description,
            },
        );
        if let Some(hint) = description.audio_hint {
            self.room_audio.insert(coord, hint);
        }
        for update in description.npc_personalities {
            let Some(room) = self.world.room(coord) else {
                continue;
            };
            let Some(npc) = room.npcs.iter().find(|n| n.name == update.name) else {
                continue;
            };
            let npc_id = npc.id;
            let mut personality = npc.personality.clone();
            if !update.traits.is_empty() {
                personality.traits = update.traits;
            }
            if let Some(style) = update.speech_style {
                personality.speech_style = style;
            }
            if !update.goals.is_empty() {
                personality.goals = update.goals;
            }
            personality.knowledge.extend(update.knowledge);
            personality.knowledge.truncate(NPC_KNOWLEDGE_CAP);
            let _ = self.change_room(
                coord,
                RoomChange::SetNpcPersonality {
                    npc: npc_id,
                    personality,
                },
            );
        }
    }

    /// A response bundle reflecting current state without ticking the
    /// world; used for save/load acknowledgements at the session layer.
    pub fn state_bundle(
        &mut self,
        message: impl Into<String>,
        narrative: impl Into<String>,
    ) -> ResponseBundle {
        self.finish_tick(TickOutcome::ok(message, narrative))
    }

    fn finish_tick(&mut self, outcome: TickOutcome) -> ResponseBundle {
        let delta = StateDelta {
            turn: self.turn,
            position: self.world.current_position(),
            player: PlayerDigest {
                name: self.player.name.clone(),
                level: self.player.level,
                hp: self.player.derived.hp,
                max_hp: self.player.derived.max_hp,
                mp: self.player.derived.mp,
                max_mp: self.player.derived.max_mp,
                gold: self.player.inventory.gold,
            },
            room_changes: std::mem::take(&mut self.tick_changes),
            narrative: std::mem::take(&mut self.tick_narrative),
            audio_hint: outcome.audio_hint.clone(),
            in_combat: self.combat.is_some(),
        };
        self.bus.publish(&delta);

        ResponseBundle {
            success: outcome.success,
            message: outcome.message,
            narrative: outcome.narrative,
            updated_state: delta,
            audio_hint: outcome.audio_hint,
            dialogue: outcome.dialogue,
        }
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    async fn handle_new_game(&mut self, player_name: Option<String>) -> TickOutcome {
        let name = player_name.unwrap_or_else(|| "Adventurer".to_string());

        self.world = WorldState::new(self.config.seed.clone());
        self.player = Player::new(&name, PlayerClass::Adventurer);
        self.memory = NarrativeMemory::new(self.config.memory.clone());
        self.quests = QuestLog::new();
        self.combat = None;
        self.rng = engine_rng(self.config.seed.as_str());
        self.turn = 1;
        self.recent_actions.clear();
        self.pending_condensation = None;
        self.room_audio.clear();
        self.prefetch = PrefetchScheduler::new(self.config.prefetch.clone());
        self.tick_changes.clear();
        self.tick_narrative.clear();

        for (key, quantity) in STARTER_ITEMS {
            if let Ok(item) = ItemInstance::of(key, *quantity) {
                let _ = self.player.inventory.add(item);
            }
        }

        self.world.set_position(Coordinate::ORIGIN, self.player.level);
        self.player.position = Coordinate::ORIGIN;

        let room = self.world.current_room().expect("origin generated").clone();
        self.append_event(
            EventKind::RoomEntered,
            format!("{name} enters the dungeon, beginning the descent."),
            Coordinate::ORIGIN,
            json!({ "coord": "0,0,0" }),
        );

        self.schedule_enrichment(Coordinate::ORIGIN, RequestKind::RoomDescription);
        self.prefetch_now();

        TickOutcome::ok("A new adventure begins...", room.description)
    }

    async fn handle_move(&mut self, direction: crate::world::Direction) -> TickOutcome {
        if self.combat.is_some() {
            return TickOutcome::refuse(
                "Cannot move while in combat!",
                "You must defeat the enemy or flee before moving on.",
            );
        }

        match self.world.move_player(direction, self.player.level) {
            Err(error) => {
                tracing::error!(%error, "move refused by world store");
                TickOutcome::refuse(
                    format!("Move failed: {error}"),
                    "The dungeon itself seems to resist.",
                )
            }
            Ok(MoveOutcome::Blocked { reason }) => {
                TickOutcome::refuse(format!("Cannot go {direction} - no exit."), reason)
            }
            Ok(MoveOutcome::Moved { to, .. }) => {
                self.player.position = to;
                self.player.record_step();
                let effect_messages = self.player.tick_status_effects();

                let room = self.world.current_room().expect("moved into room").clone();
                self.append_event(
                    EventKind::RoomEntered,
                    format!("Traveled {direction} into a {} room.", room.biome.name()),
                    to,
                    json!({ "direction": direction.name() }),
                );

                let mut narrative = room.description.clone();
                for message in effect_messages {
                    narrative.push(' ');
                    narrative.push_str(&message);
                }

                if let Some(enemy) = room.enemies.first() {
                    self.start_combat(enemy);
                    narrative.push_str(&format!("\n\nA {} blocks your path!", enemy.name));
                }

                if !room.description_enriched {
                    self.schedule_enrichment(to, RequestKind::RoomDescription);
                }
                self.prefetch_now();

                let mut outcome = TickOutcome::ok(format!("Moved {direction}."), narrative);
                outcome.audio_hint = self.room_audio.get(&to).cloned();
                outcome
            }
        }
    }

    fn start_combat(&mut self, enemy: &EnemyInstance) {
        self.combat = Some(CombatState {
            enemy: enemy.id,
            enemy_name: enemy.name.clone(),
            enemy_hp: enemy.hp,
            enemy_max_hp: enemy.max_hp,
            enemy_attack: enemy.attack,
            enemy_defense: enemy.defense,
            xp_reward: enemy.xp_reward,
            round: 1,
        });
    }

    async fn handle_attack(&mut self, target: Option<String>) -> TickOutcome {
        let Some(mut combat) = self.combat.clone() else {
            return TickOutcome::refuse("Not in combat!", "There is nothing to attack here.");
        };
        if let Some(target) = target {
            if target != combat.enemy.to_string() && target != combat.enemy_name {
                return TickOutcome::refuse(
                    format!("No such target: {target}"),
                    "Your foe is right in front of you.",
                );
            }
        }

        let attack = self.player.effective_stat("attack");
        let mut damage = (attack - combat.enemy_defense / 2).max(1);
        let is_crit = self.rng.gen::<f32>() < self.player.derived.crit_chance;
        if is_crit {
            damage = (damage as f32 * self.player.derived.crit_multiplier) as i32;
        }
        combat.enemy_hp -= damage;
        let crit_note = if is_crit { " Critical hit!" } else { "" };

        if combat.enemy_hp <= 0 {
            return self.finish_combat_victory(combat, damage, is_crit).await;
        }

        let enemy_damage = (combat.enemy_attack - self.player.effective_stat("defense") / 2).max(1);
        let (taken, died, _) = self.player.take_damage(enemy_damage, &combat.enemy_name);

        if died {
            return self.finish_combat_defeat(combat).await;
        }

        combat.round += 1;
        let outcome_line = format!("Dealt {damage} damage.{crit_note} Took {taken} damage.");
        let position = self.world.current_position();
        self.append_event(
            EventKind::CombatResolved,
            format!("Traded blows with the {}.", combat.enemy_name),
            position,
            json!({ "round": combat.round }),
        );

        let (narrative, crit_flavor) = self
            .combat_narration("attack", &combat, &outcome_line, is_crit)
            .await;
        self.combat = Some(combat);
        self.player.tick_status_effects();

        let mut full = narrative;
        if let Some(flavor) = crit_flavor {
            full.push(' ');
            full.push_str(&flavor);
        }
        TickOutcome::ok(outcome_line, full)
    }

    async fn finish_combat_victory(
        &mut self,
        combat: CombatState,
        damage: i32,
        is_crit: bool,
    ) -> TickOutcome {
        let position = self.world.current_position();
        let _ = self.change_room(position, RoomChange::RemoveEnemy { enemy: combat.enemy });

        let (_, xp_message) = self.player.gain_experience(combat.xp_reward);
        self.player.record_enemy_defeated();
        let gold = self.rng.gen_range(5..=20);
        self.player.inventory.add_gold(gold);

        self.append_event(
            EventKind::CombatResolved,
            format!("Defeated the {}.", combat.enemy_name),
            position,
            json!({ "xp": combat.xp_reward, "gold": gold }),
        );

        let outcome_line = format!("The {} falls! Dealt {damage} damage.", combat.enemy_name);
        let (narrative, _) = self
            .combat_narration("victory", &combat, &outcome_line, is_crit)
            .await;

        self.combat = None;
        TickOutcome::ok(
            format!(
                "Defeated the {}! {xp_message} Found {gold} gold.",
                combat.enemy_name
            ),
            narrative,
        )
    }

    async fn finish_combat_defeat(&mut self, combat: CombatState) -> TickOutcome {
        let position = self.world.current_position();
        self.append_event(
            EventKind::Death,
            format!("Fell in battle against the {}.", combat.enemy_name),
            position,
            json!({ "enemy": combat.enemy_name }),
        );

        let respawn_message = self.player.respawn();
        let gold_lost = self.player.inventory.gold / 4;
        self.player.inventory.remove_gold(gold_lost);
        self.world.set_position(Coordinate::ORIGIN, self.player.level);
        self.player.position = Coordinate::ORIGIN;

        let outcome_line = format!("The {} stands victorious.", combat.enemy_name);
        let (narrative, _) = self
            .combat_narration("defeat", &combat, &outcome_line, false)
            .await;
        self.combat = None;

        TickOutcome {
            success: false,
            message: format!("Defeated by the {}...", combat.enemy_name),
            narrative: format!("{narrative} {respawn_message} You lost {gold_lost} gold."),
            audio_hint: None,
            dialogue: None,
        }
    }

    async fn handle_flee(&mut self) -> TickOutcome {
        let Some(combat) = self.combat.clone() else {
            return TickOutcome::refuse("Not in combat!", "There's nothing to flee from.");
        };

        let flee_chance = 50 + self.player.effective_stat("speed") * 5;
        let roll = self.rng.gen_range(1..=100);
        let position = self.world.current_position();

        if roll <= flee_chance {
            self.combat = None;
            self.append_event(
                EventKind::CombatResolved,
                format!("Fled from the {}.", combat.enemy_name),
                position,
                json!({ "fled": true }),
            );
            let (narrative, _) = self
                .combat_narration("flee", &combat, "It does not pursue.", false)
                .await;
            TickOutcome::ok("Escaped!", narrative)
        } else {
            let enemy_damage = combat.enemy_attack.max(1);
            let (taken, died, _) = self.player.take_damage(enemy_damage, &combat.enemy_name);
            if died {
                return self.finish_combat_defeat(combat).await;
            }
            self.append_event(
                EventKind::CombatResolved,
                format!("Failed to flee from the {}.", combat.enemy_name),
                position,
                json!({ "fled": false }),
            );
            TickOutcome::refuse(
                format!("Failed to flee! Took {taken} damage."),
                format!(
                    "You try to escape but the {} blocks your path!",
                    combat.enemy_name
                ),
            )
        }
    }

    async fn handle_take(&mut self, item_key: &str) -> TickOutcome {
        if self.combat.is_some() {
            return TickOutcome::refuse(
                "Cannot pick up items during combat!",
                "Focus on the battle at hand!",
            );
        }
        let position = self.world.current_position();
        let Some(room) = self.world.room(position) else {
            return TickOutcome::refuse("No room here.", "Something is wrong...");
        };
        let Some(item) = room
            .items
            .iter()
            .find(|i| i.def == item_key || i.id.to_string() == item_key)
            .cloned()
        else {
            return TickOutcome::refuse(
                format!("Item '{item_key}' is not here."),
                "You don't see that item here.",
            );
        };

        let item_id = item.id;
        let name = item.name.clone();
        let description = item
            .definition()
            .map(|d| d.description.to_string())
            .unwrap_or_default();

        if let Err(error) = self.player.inventory.add(item) {
            return TickOutcome::refuse(error.to_string(), "Your pack is too full.");
        }
        let _ = self.change_room(position, RoomChange::RemoveItem { item: item_id });

        self.append_event(
            EventKind::ItemAcquired,
            format!("Picked up the {name}."),
            position,
            json!({ "item": name }),
        );

        TickOutcome::ok(format!("Picked up the {name}."), description)
    }

    async fn handle_use(&mut self, item_key: &str) -> TickOutcome {
        let (name, effect) = match self.player.inventory.consume(item_key) {
            Ok(used) => used,
            Err(error) => {
                return TickOutcome::refuse(error.to_string(), "You can't use that.");
            }
        };

        let narrative = match effect {
            ItemEffect::Heal(amount) => {
                let (_, message) = self.player.heal(amount, &name);
                message
            }
            ItemEffect::RestoreMana(amount) => {
                let (_, message) = self.player.restore_mana(amount);
                message
            }
            ItemEffect::CurePoison => {
                self.player.remove_status_effect("poison");
                "The poison fades from your system.".to_string()
            }
            ItemEffect::Buff {
                stat,
                value,
                duration,
            } => self.player.add_status_effect(StatusEffect {
                id: format!("buff_{stat}"),
                name: format!("{} Boost", capitalize(&stat)),
                kind: StatusKind::Buff,
                stat_modifiers: HashMap::from([(stat, value)]),
                duration,
                source: name.clone(),
            }),
            ItemEffect::Escape => {
                if self.combat.take().is_some() {
                    "You vanish in a cloud of smoke and slip away.".to_string()
                } else {
                    "The smoke dissipates uselessly.".to_string()
                }
            }
            ItemEffect::Light => "The torch pushes the darkness back a little.".to_string(),
        };

        let position = self.world.current_position();
        self.append_event(
            EventKind::ItemAcquired,
            format!("Used the {name}."),
            position,
            json!({ "item": name, "used": true }),
        );

        TickOutcome::ok(format!("Used the {name}."), narrative)
    }

    async fn handle_talk(
        &mut self,
        npc_key: Option<String>,
        message: Option<String>,
    ) -> TickOutcome {
        if self.combat.is_some() {
            return TickOutcome::refuse(
                "Cannot talk during combat!",
                "Now is not the time for conversation!",
            );
        }
        let position = self.world.current_position();
        let Some(room) = self.world.room(position) else {
            return TickOutcome::refuse("No room here.", "Something is wrong...");
        };
        let npc = match &npc_key {
            Some(key) => room
                .npcs
                .iter()
                .find(|n| n.id.to_string() == *key || n.name == *key),
            None => room.npcs.first(),
        };
        let Some(npc) = npc.cloned() else {
            return TickOutcome::refuse(
                "No one to talk to here.",
                "You speak to the empty room. The dungeon does not answer.",
            );
        };

        let message = message.unwrap_or_else(|| "Hello".to_string());
        let bundle = self.dialogue_bundle(&npc, &message);
        let result = self
            .router
            .request(
                RequestKind::NpcDialogue,
                bundle,
                FallbackSpec::Dialogue {
                    archetype: npc.archetype,
                },
            )
            .await;
        let dialogue = match result.response {
            ValidatedResponse::Dialogue(d) => d,
            _ => crate::fallback::npc_dialogue(npc.archetype, 0),
        };

        let event_id = self.append_event(
            EventKind::NpcInteraction,
            format!("Spoke with {}.", npc.name),
            position,
            json!({ "npc": npc.id.to_string() }),
        );

        let quest_accepted = self.maybe_trigger_quest(&dialogue, position);

        if let Some(room) = self.world.room_mut(position) {
            if let Some(instance) = room.npc_mut(npc.id) {
                instance.record_dialogue("You", &message);
                let line = dialogue.dialogue.clone();
                instance.record_dialogue(&npc.name.clone(), &line);
                instance.remember_event(event_id);
                let drift = match dialogue.emotion {
                    Emotion::Friendly | Emotion::Helpful => 3,
                    Emotion::Hostile | Emotion::Suspicious => -3,
                    _ => 0,
                };
                if drift != 0 {
                    instance.personality.adjust_relationship(drift);
                }
                if let Some(fact) = &dialogue.memory_update {
                    instance.personality.knowledge.push(fact.clone());
                    instance
                        .personality
                        .knowledge
                        .truncate(NPC_KNOWLEDGE_CAP);
                }
            }
        }

        let narrative = format!("{}: \"{}\"", npc.name, dialogue.dialogue);
        let mut outcome = TickOutcome::ok(format!("Talking to {}.", npc.name), narrative);
        outcome.dialogue = Some(DialogueData {
            npc: npc.id,
            npc_name: npc.name,
            dialogue: dialogue.dialogue,
            emotion: dialogue.emotion,
            offers: dialogue.offers,
            reveals: dialogue.reveals,
            quest_accepted,
        });
        outcome
    }

    fn maybe_trigger_quest(
        &mut self,
        dialogue: &NpcDialogue,
        position: Coordinate,
    ) -> Option<crate::quests::QuestId> {
        let trigger = dialogue.quest_trigger.as_deref()?;
        let template = quests::template(trigger)?;
        let quest = Quest::from_template(template);
        let title = quest.title.clone();
        let id = self.quests.accept(quest)?;
        self.append_event(
            EventKind::QuestUpdated,
            format!("Accepted quest: {title}."),
            position,
            json!({ "quest": trigger }),
        );

        // The quest is playable with its stock text right away; generated
        // content upgrades it in the background.
        let canonical = BTreeMap::from([("template".to_string(), template.id.to_string())]);
        let bundle = self.assembler.assemble(
            AssemblerInput {
                kind: RequestKind::QuestGeneration,
                preamble: &self.preamble,
                tick_state: format!("Quest offered: {}.", template.title),
                canonical_state: canonical,
                recent_actions: &self.recent_actions,
                memory: &self.memory,
                retrieved_facts: Vec::new(),
                task: prompts::quest_task(template),
            },
            RequestKind::QuestGeneration.temperature(),
        );
        self.router.schedule(
            RequestKind::QuestGeneration,
            bundle,
            FallbackSpec::Quest {
                template_id: template.id.to_string(),
            },
            BackgroundTag::QuestGeneration { quest: id },
        );
        Some(id)
    }

    async fn handle_rest(&mut self) -> TickOutcome {
        if self.combat.is_some() {
            return TickOutcome::refuse("Cannot rest during combat!", "The enemy won't let you rest!");
        }
        let position = self.world.current_position();
        let safe = self
            .world
            .room(position)
            .map(|r| r.is_safe())
            .unwrap_or(false);
        if !safe {
            return TickOutcome::refuse(
                "Cannot rest here - not safe!",
                "This place is too dangerous to rest. Find a campfire first.",
            );
        }

        let message = self.player.full_rest();
        self.append_event(
            EventKind::Discovery,
            "Rested at a safe campfire.".to_string(),
            position,
            json!({ "rested": true }),
        );
        TickOutcome::ok(
            "Rested and recovered.",
            format!("You rest by the fire, letting the dark wait its turn. {message}"),
        )
    }

    // ------------------------------------------------------------------
    // Intelligence plumbing
    // ------------------------------------------------------------------

    async fn combat_narration(
        &mut self,
        action: &str,
        combat: &CombatState,
        outcome_line: &str,
        is_crit: bool,
    ) -> (String, Option<String>) {
        let canonical = BTreeMap::from([
            ("action".to_string(), action.to_string()),
            ("enemy".to_string(), combat.enemy_name.clone()),
            ("outcome".to_string(), outcome_line.to_string()),
        ]);
        let task = prompts::combat_task(
            action,
            &combat.enemy_name,
            outcome_line,
            (self.player.derived.hp, self.player.derived.max_hp),
            (combat.enemy_hp.max(0), combat.enemy_max_hp),
        );
        let bundle = self.assembler.assemble(
            AssemblerInput {
                kind: RequestKind::CombatNarration,
                preamble: &self.preamble,
                tick_state: format!(
                    "In combat with {} (round {}).",
                    combat.enemy_name, combat.round
                ),
                canonical_state: canonical,
                recent_actions: &self.recent_actions,
                memory: &self.memory,
                retrieved_facts: Vec::new(),
                task,
            },
            RequestKind::CombatNarration.temperature(),
        );
        let result = self
            .router
            .request(
                RequestKind::CombatNarration,
                bundle,
                FallbackSpec::Combat {
                    action: action.to_string(),
                    enemy: combat.enemy_name.clone(),
                    outcome: outcome_line.to_string(),
                    is_crit,
                },
            )
            .await;
        match result.response {
            ValidatedResponse::Combat(narration) => (narration.narrative, narration.crit_flavor),
            _ => {
                let narration = crate::fallback::combat_narration(
                    action,
                    &combat.enemy_name,
                    outcome_line,
                    is_crit,
                    0,
                );
                (narration.narrative, narration.crit_flavor)
            }
        }
    }

    fn room_bundle(&self, room: &Room, kind: RequestKind) -> crate::context::ContextBundle {
        let npc_names: Vec<String> = room.npcs.iter().map(|n| n.name.clone()).collect();
        let enemy_names: Vec<String> = room.enemies.iter().map(|e| e.name.clone()).collect();
        let canonical = BTreeMap::from([
            ("coord".to_string(), room.coord.to_string()),
            ("biome".to_string(), room.biome.name().to_string()),
            (
                "exits".to_string(),
                room.exits
                    .iter()
                    .map(|d| d.name())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            ("npcs".to_string(), npc_names.join(",")),
            ("enemies".to_string(), enemy_names.join(",")),
        ]);

        self.assembler.assemble(
            AssemblerInput {
                kind,
                preamble: &self.preamble,
                tick_state: format!(
                    "{} room at {} with {} exits.",
                    room.biome.name(),
                    room.coord,
                    room.exits.len()
                ),
                canonical_state: canonical,
                recent_actions: &self.recent_actions,
                memory: &self.memory,
                retrieved_facts: self.quests.context_lines(),
                task: prompts::room_task(room),
            },
            kind.temperature(),
        )
    }

    fn dialogue_bundle(&self, npc: &NpcInstance, message: &str) -> crate::context::ContextBundle {
        let canonical = BTreeMap::from([
            ("npc".to_string(), npc.id.to_string()),
            ("name".to_string(), npc.name.clone()),
            ("archetype".to_string(), npc.archetype.name().to_string()),
            (
                "standing".to_string(),
                npc.personality.relationship_bucket().to_string(),
            ),
            ("goals".to_string(), npc.personality.goals.join(",")),
            ("message".to_string(), message.to_string()),
        ]);

        let mut facts: Vec<String> = npc
            .remembered_events()
            .filter_map(|id| self.memory.get(id))
            .map(|e| e.summary.clone())
            .collect();
        facts.extend(npc.personality.knowledge.iter().cloned());

        self.assembler.assemble(
            AssemblerInput {
                kind: RequestKind::NpcDialogue,
                preamble: &self.preamble,
                tick_state: format!("Speaking with {} at {}.", npc.name, npc.tile.0),
                canonical_state: canonical,
                recent_actions: &self.recent_actions,
                memory: &self.memory,
                retrieved_facts: facts,
                task: prompts::dialogue_task(npc, message),
            },
            RequestKind::NpcDialogue.temperature(),
        )
    }

    fn schedule_enrichment(&mut self, coord: Coordinate, kind: RequestKind) {
        let Some(room) = self.world.room(coord) else {
            return;
        };
        let room = room.clone();
        let bundle = self.room_bundle(&room, kind);
        self.router.schedule(
            kind,
            bundle,
            FallbackSpec::Room { biome: room.biome },
            BackgroundTag::Enrichment { coord },
        );
    }

    fn prefetch_now(&mut self) {
        let candidates = self.prefetch.candidates(&self.world);
        for coord in candidates {
            self.world.get_or_generate_room(coord, self.player.level);
            let enriched = self
                .world
                .room(coord)
                .map(|r| r.description_enriched)
                .unwrap_or(true);
            if !enriched {
                self.schedule_enrichment(coord, RequestKind::Enrichment);
            }
        }
    }

    fn maybe_condense(&mut self) {
        if self.pending_condensation.is_some() || !self.memory.needs_condensation() {
            return;
        }
        let Some(job) = self.memory.begin_condensation() else {
            return;
        };
        let lines = job.event_lines();
        let canonical = BTreeMap::from([("events".to_string(), lines.join(";"))]);
        let task = prompts::summary_task(&lines, self.memory.summary());
        let bundle = self.assembler.assemble(
            AssemblerInput {
                kind: RequestKind::Summarization,
                preamble: &self.preamble,
                tick_state: String::new(),
                canonical_state: canonical,
                recent_actions: &self.recent_actions,
                memory: &self.memory,
                retrieved_facts: Vec::new(),
                task,
            },
            RequestKind::Summarization.temperature(),
        );
        self.router.schedule(
            RequestKind::Summarization,
            bundle,
            FallbackSpec::Summary {
                lines,
                max_tokens: self.memory.config().summary_tokens,
            },
            BackgroundTag::Summarization,
        );
        self.pending_condensation = Some(job);
    }

    /// Pin cache entries whose fingerprints describe the room the player is
    /// standing in; everything else becomes evictable.
    fn update_cache_pins(&mut self) {
        let Some(room) = self.world.current_room() else {
            return;
        };
        let room = room.clone();
        let pins: HashSet<Fingerprint> = [
            self.room_bundle(&room, RequestKind::RoomDescription)
                .fingerprint,
            self.room_bundle(&room, RequestKind::Enrichment).fingerprint,
        ]
        .into_iter()
        .collect();
        self.router.cache().set_pinned(&pins);
    }

    fn append_event(
        &mut self,
        kind: EventKind,
        summary: String,
        location: Coordinate,
        payload: serde_json::Value,
    ) -> crate::memory::EventId {
        self.tick_narrative.push(summary.clone());
        self.memory
            .append(self.turn, kind, summary, location, payload)
    }

    fn change_room(
        &mut self,
        coord: Coordinate,
        change: RoomChange,
    ) -> Result<ChangeOutcome, WorldError> {
        let outcome = self.world.apply_room_change(coord, change.clone());
        match &outcome {
            Ok(ChangeOutcome::Applied) => self.tick_changes.push((coord, change)),
            Ok(ChangeOutcome::NoOp) => {}
            Err(error) => {
                tracing::error!(%error, coord = %coord, "room change refused");
            }
        }
        outcome
    }

    fn record_action(&mut self, action: &PlayerAction) {
        let text = match action {
            PlayerAction::Move { direction } => format!("moved {direction}"),
            PlayerAction::Attack { .. } => "attacked".to_string(),
            PlayerAction::Flee => "tried to flee".to_string(),
            PlayerAction::Take { item } => format!("took {item}"),
            PlayerAction::Use { item, .. } => format!("used {item}"),
            PlayerAction::Talk { message, .. } => match message {
                Some(m) => format!("said \"{m}\""),
                None => "spoke to someone".to_string(),
            },
            PlayerAction::Rest => "rested".to_string(),
            PlayerAction::SaveGame { .. } => "saved".to_string(),
            PlayerAction::LoadGame { .. } => "loaded".to_string(),
            PlayerAction::NewGame { .. } => "began the descent".to_string(),
        };
        self.recent_actions.push(text);
        while self.recent_actions.len() > RECENT_ACTION_CAP {
            self.recent_actions.remove(0);
        }
    }

    // ------------------------------------------------------------------
    // Persistence hooks
    // ------------------------------------------------------------------

    /// A consistent snapshot of everything the save format carries. Called
    /// between ticks, which is the task-loop checkpoint.
    pub fn save_body(&self) -> SaveBody {
        SaveBody {
            turn: self.turn,
            world: self.world.clone(),
            player: self.player.clone(),
            memory: self.memory.clone(),
            quests: self.quests.clone(),
        }
    }

    /// Replace engine state from a loaded save.
    pub fn restore(&mut self, body: SaveBody) {
        self.turn = body.turn;
        self.world = body.world;
        self.player = body.player;
        self.memory = body.memory;
        self.quests = body.quests;
        self.combat = None;
        self.pending_condensation = None;
        self.prefetch = PrefetchScheduler::new(self.config.prefetch.clone());
        self.recent_actions.clear();
        self.tick_changes.clear();
        self.tick_narrative.clear();
        // Make sure the player is standing somewhere real.
        self.world
            .set_position(self.world.current_position(), self.player.level);
        self.prefetch_now();
    }

    /// Reduced-fidelity restore: player and position only; the world
    /// regenerates from its seed on demand.
    pub fn restore_emergency(&mut self, body: SaveBody) {
        let position = body.world.current_position();
        self.turn = body.turn;
        self.player = body.player;
        self.memory = body.memory;
        self.quests = body.quests;
        self.world = WorldState::new(self.config.seed.clone());
        self.combat = None;
        self.world.set_position(Coordinate::ORIGIN, self.player.level);
        self.world.set_position(position, self.player.level);
        self.player.position = position;
    }
}

fn engine_rng(seed: &str) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b"engine");
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    StdRng::from_seed(bytes)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
