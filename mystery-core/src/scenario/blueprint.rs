//! The JSON contract spoken with the text generator when building a scenario.
//!
//! The engine sends a [`ScenarioBrief`] (cast, victim, killer, map) and gets
//! back a [`Blueprint`] (motive, timeline, clues, NPC knowledge, narration).

use super::ScenarioError;
use crate::world::PlayerRole;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Brief (outbound)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefCharacter {
    pub name: String,
    pub description: String,
    pub personality: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefLocation {
    pub key: String,
    pub name: String,
    pub description: String,
    pub connected_to: Vec<String>,
}

/// What the generator is told before designing the mystery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioBrief {
    pub player: BriefCharacter,
    pub player_role: PlayerRole,
    pub victim: BriefCharacter,
    pub killer: String,
    pub npcs: Vec<BriefCharacter>,
    pub locations: Vec<BriefLocation>,
    pub clue_count: usize,
}

impl ScenarioBrief {
    pub fn to_prompt(&self) -> Result<String, ScenarioError> {
        let brief = serde_json::to_string_pretty(self)
            .map_err(|e| ScenarioError::MalformedBlueprint(e.to_string()))?;
        Ok(include_str!("../prompts/scenario_user.txt")
            .replace("{brief}", &brief)
            .replace("{clue_count}", &self.clue_count.to_string()))
    }

    /// Recover the brief from a rendered prompt.
    pub fn from_prompt(prompt: &str) -> Option<Self> {
        let start = prompt.find('{')?;
        serde_json::Deserializer::from_str(&prompt[start..])
            .into_iter::<ScenarioBrief>()
            .next()?
            .ok()
    }
}

// ============================================================================
// Blueprint (inbound)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MurderBlueprint {
    pub method: String,
    pub motive: String,
    #[serde(default)]
    pub time_of_death: String,
    #[serde(default)]
    pub location_of_death: String,
    #[serde(default)]
    pub timeline: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClueBlueprint {
    #[serde(default)]
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub points_to: Option<String>,
    #[serde(default)]
    pub difficulty: String,
    pub found_at: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBlueprint {
    #[serde(default)]
    pub alibi: String,
    #[serde(default)]
    pub true_whereabouts: String,
    #[serde(default)]
    pub secrets: Vec<String>,
    #[serde(default)]
    pub attitude: String,
    #[serde(default)]
    pub suspicions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedHerring {
    pub description: String,
    #[serde(default)]
    pub implicates: String,
    #[serde(default)]
    pub truth: String,
}

/// A generated mystery design, before it is checked against the cast and map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub title: String,
    #[serde(default)]
    pub setting: String,
    pub opening_narration: String,
    pub murder: MurderBlueprint,
    #[serde(default)]
    pub clues: Vec<ClueBlueprint>,
    #[serde(default)]
    pub npc_knowledge: BTreeMap<String, KnowledgeBlueprint>,
    #[serde(default)]
    pub red_herrings: Vec<RedHerring>,
}

impl Blueprint {
    pub fn parse(text: &str) -> Result<Self, ScenarioError> {
        serde_json::from_str(extract_json(text))
            .map_err(|e| ScenarioError::MalformedBlueprint(e.to_string()))
    }
}

/// Extract JSON from a response that may be wrapped in code fences or prose.
pub(crate) fn extract_json(text: &str) -> &str {
    let text = text.trim();

    // ```json ... ```
    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // ``` ... ```
    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // Prose around a bare object
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}
