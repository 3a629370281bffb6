//! The context assembler: what the model gets to see.
//!
//! Builds the prompt payload for a request under a hard token budget, and a
//! normalized canonical form used solely to compute the request fingerprint.
//! The canonical form deliberately excludes the narrative window and turn
//! index, so two logically equivalent requests share a fingerprint even when
//! they happen on different turns.

use crate::memory::NarrativeMemory;
use crate::router::RequestKind;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// How many of the most recent player actions the payload carries.
const RECENT_ACTIONS: usize = 3;

/// A stable content hash identifying a request: the cache and dedup key,
/// and the seed for deterministic fallbacks.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// A seed for fallback generators, folded from the hash.
    pub fn seed(&self) -> u64 {
        u64::from_le_bytes(self.0[..8].try_into().expect("fingerprint is 32 bytes"))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

/// The assembled prompt context: system preamble, user payload, and the
/// canonical form the fingerprint was computed over.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub system: String,
    pub payload: String,
    pub canonical: String,
    pub fingerprint: Fingerprint,
}

/// Everything a request's context is assembled from.
pub struct AssemblerInput<'a> {
    pub kind: RequestKind,
    /// System preamble for the request kind.
    pub preamble: &'a str,
    /// Current tick state relevant to the request, already rendered.
    pub tick_state: String,
    /// The same state as canonical key/value pairs. Keys are sorted, values
    /// normalized; the turn index must not appear here.
    pub canonical_state: BTreeMap<String, String>,
    pub recent_actions: &'a [String],
    pub memory: &'a NarrativeMemory,
    /// Retrieved facts: relevant NPC memories, quest state.
    pub retrieved_facts: Vec<String>,
    /// The specific task instructions and output schema.
    pub task: String,
}

/// Assembles prompt contexts under a token budget.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    pub token_budget: usize,
    pub model_id: String,
}

impl ContextAssembler {
    pub fn new(token_budget: usize, model_id: impl Into<String>) -> Self {
        Self {
            token_budget,
            model_id: model_id.into(),
        }
    }

    /// Build the payload and fingerprint for a request.
    ///
    /// Sections are considered in fixed priority order; the preamble and the
    /// task section always ship, everything between is dropped back-to-front
    /// when the budget would overflow.
    pub fn assemble(&self, input: AssemblerInput<'_>, temperature: f32) -> ContextBundle {
        let canonical = self.canonical_form(input.kind, &input.canonical_state, temperature);
        let fingerprint = fingerprint_of(&canonical);

        let system = input.preamble.trim().to_string();

        let mut sections: Vec<(bool, String)> = Vec::new();
        if !input.tick_state.is_empty() {
            sections.push((false, format!("## Current State\n{}", input.tick_state)));
        }
        let actions: Vec<&String> = input
            .recent_actions
            .iter()
            .rev()
            .take(RECENT_ACTIONS)
            .collect();
        if !actions.is_empty() {
            let lines: Vec<String> = actions
                .iter()
                .rev()
                .map(|a| format!("- {a}"))
                .collect();
            sections.push((false, format!("## Recent Actions\n{}", lines.join("\n"))));
        }
        let window: Vec<String> = input
            .memory
            .short_term()
            .map(|e| format!("- {}", e.summary))
            .collect();
        if !window.is_empty() {
            sections.push((false, format!("## Recent Events\n{}", window.join("\n"))));
        }
        if !input.memory.summary().is_empty() {
            sections.push((
                false,
                format!("## Story So Far\n{}", input.memory.summary()),
            ));
        }
        if !input.retrieved_facts.is_empty() {
            let lines: Vec<String> = input
                .retrieved_facts
                .iter()
                .map(|f| format!("- {f}"))
                .collect();
            sections.push((false, format!("## Known Facts\n{}", lines.join("\n"))));
        }
        sections.push((true, format!("## Task\n{}", input.task)));

        let required: usize = estimate_tokens(&system)
            + sections
                .iter()
                .filter(|(required, _)| *required)
                .map(|(_, text)| estimate_tokens(text))
                .sum::<usize>();

        let mut payload = String::new();
        let mut spent = required;
        for (required_section, text) in &sections {
            let cost = estimate_tokens(text);
            if !required_section {
                if spent + cost > self.token_budget {
                    continue;
                }
                spent += cost;
            }
            if !payload.is_empty() {
                payload.push_str("\n\n");
            }
            payload.push_str(text);
        }

        ContextBundle {
            system,
            payload,
            canonical,
            fingerprint,
        }
    }

    /// The canonical form: request kind, sorted normalized state, model id
    /// and temperature bucket. No turn index, no narrative window.
    fn canonical_form(
        &self,
        kind: RequestKind,
        state: &BTreeMap<String, String>,
        temperature: f32,
    ) -> String {
        let mut canonical = format!("kind={}", kind.name());
        for (key, value) in state {
            canonical.push('\x1f');
            canonical.push_str(key);
            canonical.push('=');
            canonical.push_str(&collapse_whitespace(value));
        }
        canonical.push('\x1f');
        canonical.push_str(&format!("model={}", self.model_id));
        canonical.push('\x1f');
        canonical.push_str(&format!("temp={}", temperature_bucket(temperature)));
        canonical
    }
}

/// Build a fingerprint from raw bytes, for tests elsewhere in the crate.
#[cfg(test)]
pub(crate) fn test_fingerprint(bytes: [u8; 32]) -> Fingerprint {
    Fingerprint(bytes)
}

fn fingerprint_of(canonical: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    Fingerprint(bytes)
}

/// Rough token estimate: four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Round a floating stat to a stable 0.25 grid for canonicalization.
pub fn round_stat(value: f32) -> f32 {
    (value * 4.0).round() / 4.0
}

fn temperature_bucket(temperature: f32) -> i32 {
    (temperature * 10.0).round() as i32
}
