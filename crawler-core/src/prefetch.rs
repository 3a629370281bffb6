//! Prefetch policy: which rooms get background enrichment, and when.
//!
//! After a move or a load, the likely-next rooms are generated eagerly (the
//! symbolic part is cheap and deterministic) and their descriptions
//! requested at prefetch priority. Work is never cancelled when the player
//! moves on; it stays useful for future visits and simply waits behind
//! foreground requests.

use crate::world::{Coordinate, WorldState};
use std::collections::HashSet;

/// Prefetch tuning.
#[derive(Debug, Clone)]
pub struct PrefetchPolicy {
    /// Most prefetches scheduled per player move.
    pub per_move_budget: usize,
    /// How far out NPC-rich rooms are considered.
    pub npc_radius: u32,
}

impl Default for PrefetchPolicy {
    fn default() -> Self {
        Self {
            per_move_budget: 4,
            npc_radius: 2,
        }
    }
}

/// Tracks what has already been handed to the router so a room is not
/// re-scheduled every time the player walks past it.
#[derive(Debug, Default)]
pub struct PrefetchScheduler {
    policy: PrefetchPolicy,
    scheduled: HashSet<Coordinate>,
}

impl PrefetchScheduler {
    pub fn new(policy: PrefetchPolicy) -> Self {
        Self {
            policy,
            scheduled: HashSet::new(),
        }
    }

    pub fn policy(&self) -> &PrefetchPolicy {
        &self.policy
    }

    /// Candidate coordinates for enrichment after a move, budget applied:
    /// ungenerated exit neighbors of the current room first, then NPC-rich
    /// rooms within the radius that still carry placeholder descriptions.
    pub fn candidates(&mut self, world: &WorldState) -> Vec<Coordinate> {
        let mut out = Vec::new();

        for coord in world.ungenerated_exit_neighbors() {
            if out.len() >= self.policy.per_move_budget {
                return out;
            }
            if self.scheduled.insert(coord) {
                out.push(coord);
            }
        }

        for coord in world.npc_rooms_within(self.policy.npc_radius) {
            if out.len() >= self.policy.per_move_budget {
                break;
            }
            let enriched = world
                .room(coord)
                .map(|r| r.description_enriched)
                .unwrap_or(true);
            if !enriched && self.scheduled.insert(coord) {
                out.push(coord);
            }
        }

        out
    }

    /// Forget a coordinate so it can be scheduled again (e.g. its TTL'd
    /// description expired).
    pub fn forget(&mut self, coord: Coordinate) {
        self.scheduled.remove(&coord);
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.len()
    }
}
