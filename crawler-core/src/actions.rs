//! The inbound player-action interface and its response bundle.

use crate::actors::NpcId;
use crate::events::StateDelta;
use crate::quests::QuestId;
use crate::validate::Emotion;
use crate::world::Direction;
use serde::{Deserialize, Serialize};

/// Everything a player can ask the core to do. All actions are uniformly
/// asynchronous at the core boundary, `Rest` included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlayerAction {
    Move {
        direction: Direction,
    },
    Attack {
        #[serde(default)]
        target: Option<String>,
    },
    Flee,
    Take {
        item: String,
    },
    Use {
        item: String,
        #[serde(default)]
        target: Option<String>,
    },
    Talk {
        #[serde(default)]
        npc: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    Rest,
    SaveGame {
        #[serde(default)]
        slot: Option<String>,
    },
    LoadGame {
        #[serde(default)]
        slot: Option<String>,
    },
    NewGame {
        #[serde(default)]
        player_name: Option<String>,
    },
}

/// Dialogue payload attached to a `Talk` response.
#[derive(Debug, Clone, Serialize)]
pub struct DialogueData {
    pub npc: NpcId,
    pub npc_name: String,
    pub dialogue: String,
    pub emotion: Emotion,
    pub offers: Vec<String>,
    pub reveals: Vec<String>,
    pub quest_accepted: Option<QuestId>,
}

/// What every resolved action returns.
///
/// Recoverable failures (blocked move, invalid target, full inventory) come
/// back as `success: false` with a message and no state change; model
/// trouble never surfaces here at all.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseBundle {
    pub success: bool,
    pub message: String,
    pub narrative: String,
    pub updated_state: StateDelta,
    pub audio_hint: Option<String>,
    pub dialogue: Option<DialogueData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_format() {
        let action: PlayerAction =
            serde_json::from_str(r#"{"action": "move", "direction": "north"}"#).unwrap();
        assert_eq!(
            action,
            PlayerAction::Move {
                direction: Direction::North
            }
        );

        let action: PlayerAction = serde_json::from_str(r#"{"action": "talk"}"#).unwrap();
        assert_eq!(
            action,
            PlayerAction::Talk {
                npc: None,
                message: None
            }
        );
    }
}
