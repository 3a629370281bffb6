//! Narrative memory: the world's account of what has happened.
//!
//! Two tiers. A short-term window holds the last N events verbatim; a
//! long-term summary absorbs the rest. When the window overflows, the K
//! oldest events are condensed into the summary by a background
//! SUMMARIZATION request, with a deterministic fallback when the model is
//! unavailable. Events are append-only and remain addressable by id after
//! they leave the window.

use crate::world::Coordinate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// Stable identifier of a narrative event (its append index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

/// What kind of thing happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RoomEntered,
    CombatResolved,
    NpcInteraction,
    ItemAcquired,
    QuestUpdated,
    Death,
    Discovery,
}

/// A single append-only narrative record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeEvent {
    pub id: EventId,
    pub turn: u64,
    pub kind: EventKind,
    pub summary: String,
    pub location: Coordinate,
    #[serde(default)]
    pub payload: Value,
}

/// Configuration for the memory tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Short-term window size before condensation triggers.
    pub window: usize,
    /// How many oldest events a condensation collapses.
    pub condense_batch: usize,
    /// Token cap for the condensed replacement string.
    pub summary_tokens: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window: 16,
            condense_batch: 8,
            summary_tokens: 120,
        }
    }
}

/// A condensation launched against a snapshot of the window's prefix.
///
/// New events appended while the job is in flight are unaffected; completion
/// collapses exactly the events the job was launched against.
#[derive(Debug, Clone)]
pub struct CondensationJob {
    pub events: Vec<NarrativeEvent>,
    last_id: EventId,
}

impl CondensationJob {
    /// The events' one-line summaries, for the summarization prompt.
    pub fn event_lines(&self) -> Vec<String> {
        self.events.iter().map(|e| e.summary.clone()).collect()
    }
}

/// Two-tier narrative memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeMemory {
    config: MemoryConfig,
    short_term: VecDeque<NarrativeEvent>,
    long_term: String,
    next_id: u64,
    /// Count of events absorbed into the long-term summary.
    archived: u64,
    /// Summarization failures since the last success; two trips the fallback.
    #[serde(default)]
    condense_failures: u8,
}

impl NarrativeMemory {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            short_term: VecDeque::new(),
            long_term: String::new(),
            next_id: 0,
            archived: 0,
            condense_failures: 0,
        }
    }

    /// Append an event; returns its id. Events are visible in insertion
    /// order within the window.
    pub fn append(
        &mut self,
        turn: u64,
        kind: EventKind,
        summary: impl Into<String>,
        location: Coordinate,
        payload: Value,
    ) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.short_term.push_back(NarrativeEvent {
            id,
            turn,
            kind,
            summary: summary.into(),
            location,
            payload,
        });
        id
    }

    pub fn short_term(&self) -> impl Iterator<Item = &NarrativeEvent> {
        self.short_term.iter()
    }

    pub fn short_term_len(&self) -> usize {
        self.short_term.len()
    }

    /// Total number of events ever appended.
    pub fn event_count(&self) -> u64 {
        self.next_id
    }

    pub fn summary(&self) -> &str {
        &self.long_term
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.long_term = summary.into();
    }

    /// Look up an event still in the window by id.
    pub fn get(&self, id: EventId) -> Option<&NarrativeEvent> {
        self.short_term.iter().find(|e| e.id == id)
    }

    /// Whether the window has overflowed and a condensation should run.
    pub fn needs_condensation(&self) -> bool {
        self.short_term.len() > self.config.window
    }

    /// Snapshot the K oldest events into a condensation job, without
    /// removing them. The window keeps accepting appends while the job runs.
    pub fn begin_condensation(&mut self) -> Option<CondensationJob> {
        if !self.needs_condensation() {
            return None;
        }
        let k = self.config.condense_batch.min(self.short_term.len());
        let events: Vec<NarrativeEvent> = self.short_term.iter().take(k).cloned().collect();
        let last_id = events.last()?.id;
        Some(CondensationJob { events, last_id })
    }

    /// Collapse the job's prefix into the long-term summary, replacing it in
    /// the window with a single summary event. Returns the number of events
    /// collapsed.
    pub fn complete_condensation(&mut self, job: &CondensationJob, condensed: &str) -> usize {
        let condensed = truncate_tokens(condensed, self.config.summary_tokens);
        let mut removed = 0;
        while let Some(front) = self.short_term.front() {
            if front.id > job.last_id {
                break;
            }
            self.short_term.pop_front();
            removed += 1;
            self.archived += 1;
        }
        if !self.long_term.is_empty() {
            self.long_term.push(' ');
        }
        self.long_term.push_str(&condensed);

        // The summary re-enters the window as one event so recent context
        // keeps a continuous thread.
        let id = EventId(self.next_id);
        self.next_id += 1;
        let turn = job.events.last().map(|e| e.turn).unwrap_or(0);
        let location = job
            .events
            .last()
            .map(|e| e.location)
            .unwrap_or(Coordinate::ORIGIN);
        self.short_term.push_front(NarrativeEvent {
            id,
            turn,
            kind: EventKind::Discovery,
            summary: condensed,
            location,
            payload: Value::Null,
        });
        self.condense_failures = 0;
        removed
    }

    /// Record one summarization failure; returns true once the deterministic
    /// fallback should be used instead.
    pub fn record_condensation_failure(&mut self) -> bool {
        self.condense_failures = self.condense_failures.saturating_add(1);
        self.condense_failures >= 2
    }

    /// Deterministic condensation: join the event summaries, truncate to the
    /// token cap, and mark the result as abridged.
    pub fn fallback_condense(&self, job: &CondensationJob) -> String {
        let joined = job.event_lines().join("; ");
        format!(
            "[abridged] {}",
            truncate_tokens(&joined, self.config.summary_tokens)
        )
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }
}

impl Default for NarrativeMemory {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

/// Rough token-budget truncation (4 chars per token), on a char boundary.
pub fn truncate_tokens(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens * 4;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_with(window: usize, batch: usize) -> NarrativeMemory {
        NarrativeMemory::new(MemoryConfig {
            window,
            condense_batch: batch,
            summary_tokens: 50,
        })
    }

    fn fill(memory: &mut NarrativeMemory, count: usize) {
        for i in 0..count {
            memory.append(
                i as u64,
                EventKind::RoomEntered,
                format!("Event {i}"),
                Coordinate::ORIGIN,
                Value::Null,
            );
        }
    }

    #[test]
    fn test_insertion_order() {
        let mut memory = NarrativeMemory::default();
        fill(&mut memory, 5);
        let summaries: Vec<&str> = memory.short_term().map(|e| e.summary.as_str()).collect();
        assert_eq!(summaries, vec!["Event 0", "Event 1", "Event 2", "Event 3", "Event 4"]);
    }

    #[test]
    fn test_condensation_arithmetic() {
        // Window N, batch K: after condensation the count is N - K + 1.
        let mut memory = memory_with(10, 4);
        fill(&mut memory, 11);
        assert!(memory.needs_condensation());

        let job = memory.begin_condensation().unwrap();
        assert_eq!(job.events.len(), 4);

        let collapsed = memory.complete_condensation(&job, "the early going");
        assert_eq!(collapsed, 4);
        assert_eq!(memory.short_term_len(), 11 - 4 + 1);
        assert!(memory.summary().contains("the early going"));
    }

    #[test]
    fn test_condensation_preserves_concurrent_appends() {
        let mut memory = memory_with(6, 3);
        fill(&mut memory, 7);
        let job = memory.begin_condensation().unwrap();

        // Events arriving while the job is in flight.
        memory.append(100, EventKind::Discovery, "late event", Coordinate::ORIGIN, Value::Null);

        memory.complete_condensation(&job, "prefix summary");
        let summaries: Vec<&str> = memory.short_term().map(|e| e.summary.as_str()).collect();
        assert!(summaries.contains(&"late event"));
        assert_eq!(summaries[0], "prefix summary");
        // Only the launched prefix was collapsed.
        assert!(summaries.contains(&"Event 3"));
        assert!(!summaries.contains(&"Event 2"));
    }

    #[test]
    fn test_fallback_after_two_failures() {
        let mut memory = memory_with(4, 2);
        fill(&mut memory, 5);
        assert!(!memory.record_condensation_failure());
        assert!(memory.record_condensation_failure());

        let job = memory.begin_condensation().unwrap();
        let fallback = memory.fallback_condense(&job);
        assert!(fallback.starts_with("[abridged]"));
        assert!(fallback.contains("Event 0"));
    }

    #[test]
    fn test_truncation_respects_token_cap() {
        let long = "x".repeat(1000);
        let truncated = truncate_tokens(&long, 10);
        assert!(truncated.chars().count() <= 41);
    }

    #[test]
    fn test_event_ids_are_stable_and_monotonic() {
        let mut memory = NarrativeMemory::default();
        let a = memory.append(0, EventKind::RoomEntered, "a", Coordinate::ORIGIN, Value::Null);
        let b = memory.append(1, EventKind::Discovery, "b", Coordinate::ORIGIN, Value::Null);
        assert!(b > a);
        assert_eq!(memory.get(a).unwrap().summary, "a");
    }
}
