//! Quest templates and the player's quest log.
//!
//! Templates form the closed id set that validated dialogue may reference
//! through `quest_trigger`. Generated quest content fills a template's frame
//! with model-written text.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for quest instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestId(pub Uuid);

impl QuestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QuestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable quest template.
#[derive(Debug, Clone)]
pub struct QuestTemplate {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub objectives: &'static [&'static str],
    pub reward_gold: u32,
    pub reward_xp: u32,
}

const TEMPLATES: &[QuestTemplate] = &[
    QuestTemplate {
        id: "lost_relic",
        title: "The Lost Relic",
        description: "Something old and cracked is waiting to be found below.",
        objectives: &["Find the cracked relic", "Return it to whoever still cares"],
        reward_gold: 80,
        reward_xp: 120,
    },
    QuestTemplate {
        id: "cleanse_altar",
        title: "Cleanse the Altar",
        description: "A corrupted altar poisons the halls around it.",
        objectives: &["Reach the temple floor", "Cleanse the altar"],
        reward_gold: 60,
        reward_xp: 150,
    },
    QuestTemplate {
        id: "rat_cull",
        title: "The Rat Cull",
        description: "The upper halls crawl with vermin.",
        objectives: &["Defeat three rat swarms"],
        reward_gold: 30,
        reward_xp: 60,
    },
    QuestTemplate {
        id: "echoes_below",
        title: "Echoes Below",
        description: "A voice from the deep floors keeps repeating a name.",
        objectives: &["Descend past the fifth floor", "Find the source of the echo"],
        reward_gold: 100,
        reward_xp: 200,
    },
    QuestTemplate {
        id: "wardens_tally",
        title: "The Warden's Tally",
        description: "The warden's count never comes out right.",
        objectives: &["Speak with the warden", "Recover the missing ledger page"],
        reward_gold: 45,
        reward_xp: 80,
    },
];

/// Look up a quest template.
pub fn template(id: &str) -> Option<&'static QuestTemplate> {
    TEMPLATES.iter().find(|t| t.id == id)
}

/// Whether an id names a known template. `quest_trigger` values must pass
/// this or be null.
pub fn is_known_template(id: &str) -> bool {
    template(id).is_some()
}

pub fn template_ids() -> impl Iterator<Item = &'static str> {
    TEMPLATES.iter().map(|t| t.id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    Active,
    Completed,
    Failed,
}

/// One step of a quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub text: String,
    pub complete: bool,
}

/// Rewards granted on completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestRewards {
    #[serde(default)]
    pub gold: u32,
    #[serde(default)]
    pub xp: u32,
    #[serde(default)]
    pub items: Vec<String>,
}

/// A quest the player has accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub id: QuestId,
    pub template_id: String,
    pub title: String,
    pub description: String,
    pub objectives: Vec<Objective>,
    pub rewards: QuestRewards,
    pub status: QuestStatus,
}

impl Quest {
    /// Instantiate a template with its stock text.
    pub fn from_template(template: &QuestTemplate) -> Self {
        Self {
            id: QuestId::new(),
            template_id: template.id.to_string(),
            title: template.title.to_string(),
            description: template.description.to_string(),
            objectives: template
                .objectives
                .iter()
                .map(|o| Objective {
                    text: o.to_string(),
                    complete: false,
                })
                .collect(),
            rewards: QuestRewards {
                gold: template.reward_gold,
                xp: template.reward_xp,
                items: Vec::new(),
            },
            status: QuestStatus::Active,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.objectives.iter().all(|o| o.complete)
    }
}

/// The player's quest log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestLog {
    quests: Vec<Quest>,
}

impl QuestLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quests(&self) -> &[Quest] {
        &self.quests
    }

    pub fn active(&self) -> impl Iterator<Item = &Quest> {
        self.quests
            .iter()
            .filter(|q| q.status == QuestStatus::Active)
    }

    /// Accept a quest; a template can only be active once.
    pub fn accept(&mut self, quest: Quest) -> Option<QuestId> {
        if self
            .quests
            .iter()
            .any(|q| q.template_id == quest.template_id && q.status == QuestStatus::Active)
        {
            return None;
        }
        let id = quest.id;
        self.quests.push(quest);
        Some(id)
    }

    /// Mark the first incomplete objective done; completes the quest when
    /// all objectives are. Returns the rewards on completion.
    pub fn advance(&mut self, id: QuestId) -> Option<QuestRewards> {
        let quest = self.quests.iter_mut().find(|q| q.id == id)?;
        if quest.status != QuestStatus::Active {
            return None;
        }
        if let Some(objective) = quest.objectives.iter_mut().find(|o| !o.complete) {
            objective.complete = true;
        }
        if quest.is_complete() {
            quest.status = QuestStatus::Completed;
            Some(quest.rewards.clone())
        } else {
            None
        }
    }

    pub fn get(&self, id: QuestId) -> Option<&Quest> {
        self.quests.iter().find(|q| q.id == id)
    }

    /// Upgrade a quest's text from generated content. Only applies while
    /// the quest is untouched; progress freezes the wording the player saw.
    pub fn apply_content(&mut self, id: QuestId, content: &crate::validate::QuestContent) -> bool {
        let Some(quest) = self.quests.iter_mut().find(|q| q.id == id) else {
            return false;
        };
        if quest.status != QuestStatus::Active || quest.objectives.iter().any(|o| o.complete) {
            return false;
        }
        quest.title = content.title.clone();
        quest.description = content.description.clone();
        if content.objectives.len() == quest.objectives.len() {
            for (objective, text) in quest.objectives.iter_mut().zip(&content.objectives) {
                objective.text = text.clone();
            }
        }
        if content.rewards != QuestRewards::default() {
            quest.rewards = content.rewards.clone();
        }
        true
    }

    /// Compact rendering for prompt context.
    pub fn context_lines(&self) -> Vec<String> {
        self.active()
            .map(|q| {
                let done = q.objectives.iter().filter(|o| o.complete).count();
                format!("{} ({}/{} objectives)", q.title, done, q.objectives.len())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_lookup() {
        assert!(is_known_template("lost_relic"));
        assert!(!is_known_template("invented_quest"));
    }

    #[test]
    fn test_accept_rejects_duplicates() {
        let mut log = QuestLog::new();
        let template = template("rat_cull").unwrap();
        assert!(log.accept(Quest::from_template(template)).is_some());
        assert!(log.accept(Quest::from_template(template)).is_none());
    }

    #[test]
    fn test_advance_to_completion() {
        let mut log = QuestLog::new();
        let template = template("lost_relic").unwrap();
        let id = log.accept(Quest::from_template(template)).unwrap();

        assert!(log.advance(id).is_none());
        let rewards = log.advance(id).expect("second objective completes the quest");
        assert_eq!(rewards.gold, 80);
        assert_eq!(log.get(id).unwrap().status, QuestStatus::Completed);
        // Completed quests cannot advance further.
        assert!(log.advance(id).is_none());
    }
}
