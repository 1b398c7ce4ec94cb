//! What NPCs do between the player's actions.
//!
//! Each living NPC is asked for one action per turn. The prompt is built from
//! their persona, their own memory partition and what was just said or done
//! in their room, so an NPC never acts on knowledge they do not hold.

use crate::generation::{GenerationPurpose, GenerationRequest};
use crate::memory::MemoryStore;
use crate::scenario::blueprint::extract_json;
use crate::world::{CharacterId, CharacterRole, LocationId, World};
use claude::Message;
use serde::Deserialize;

const ACTION_MAX_TOKENS: usize = 256;
const ACTION_TEMPERATURE: f32 = 0.8;

/// One NPC's decision for the turn.
#[derive(Debug, Clone, PartialEq)]
pub struct NpcAction {
    /// Spoken aloud to the room before anything else happens.
    pub says: Option<String>,
    pub step: NpcStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpcStep {
    Move(LocationId),
    Search,
    Stay,
}

impl NpcAction {
    pub fn stay() -> Self {
        Self {
            says: None,
            step: NpcStep::Stay,
        }
    }

    pub fn move_to(to: LocationId) -> Self {
        Self {
            says: None,
            step: NpcStep::Move(to),
        }
    }
}

/// Where an NPC stands when asked to act.
#[derive(Debug, Clone)]
pub struct NpcSituation<'a> {
    pub npc: CharacterId,
    pub turn: u32,
    pub setting: &'a str,
    /// What has already happened in the room during this NPC phase.
    pub recent: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ActionReply {
    #[serde(default)]
    action: String,
    #[serde(default)]
    target: String,
    #[serde(default)]
    dialogue: String,
}

/// Prompt for one NPC's action. `None` when the NPC is not on the map.
pub fn action_request(
    world: &World,
    memory: &MemoryStore,
    situation: &NpcSituation<'_>,
    top_k: usize,
    temperature: Option<f32>,
) -> Option<GenerationRequest> {
    let npc = world.character(situation.npc)?;
    let here = npc.location?;
    let place = world.location_name(here);

    let query = format!("{place} {}", situation.recent.join(" "));
    let memories = memory.retrieve(npc.id, &query, top_k);

    let mut system = String::from(include_str!("prompts/npc_action.txt"));
    system.push_str("\n## Who you are\n");
    system.push_str(&npc.persona.prompt_description());
    system.push('\n');
    if npc.role == CharacterRole::Killer {
        system.push_str("You are guilty and must not draw attention to yourself.\n");
    }
    if !situation.setting.is_empty() {
        system.push_str("\n## Setting\n");
        system.push_str(situation.setting);
        system.push('\n');
    }

    system.push_str("\n## What you remember\n");
    if memories.is_empty() {
        system.push_str("- Nothing of note.\n");
    }
    for record in &memories {
        system.push_str(&format!("- {}\n", record.content()));
    }

    let mut brief = format!("It is turn {}. You are in the {place}.\n", situation.turn);
    let company: Vec<&str> = world
        .occupants(here)
        .into_iter()
        .filter(|c| c.id != npc.id && c.alive)
        .map(|c| c.name())
        .collect();
    if company.is_empty() {
        brief.push_str("You are alone.\n");
    } else {
        brief.push_str(&format!("Also here: {}.\n", company.join(", ")));
    }
    let exits: Vec<String> = world
        .neighbors(here)
        .iter()
        .map(|l| format!("{} ({})", l.name, l.key))
        .collect();
    brief.push_str(&format!("Exits: {}.\n", exits.join(", ")));
    if !situation.recent.is_empty() {
        brief.push_str("\n## Just now\n");
        for line in situation.recent {
            brief.push_str(&format!("- {line}\n"));
        }
    }
    brief.push_str(&format!("\nWhat does {} do now?", npc.name()));

    Some(
        GenerationRequest::new(GenerationPurpose::NpcAction, system, vec![Message::user(brief)])
            .with_max_tokens(ACTION_MAX_TOKENS)
            .with_temperature(temperature.or(Some(ACTION_TEMPERATURE))),
    )
}

/// Read a generated action. `None` when the reply is unusable.
///
/// A move to somewhere that is not an exit becomes a wait.
pub fn parse_action(text: &str, world: &World, npc: CharacterId) -> Option<NpcAction> {
    let reply: ActionReply = serde_json::from_str(extract_json(text)).ok()?;
    let here = world.location_of(npc)?;
    let says = Some(reply.dialogue.trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string);

    let step = match reply.action.trim().to_lowercase().as_str() {
        "move" => match world.find_location(reply.target.trim()) {
            Some(to) if world.is_adjacent(here, to.id) => NpcStep::Move(to.id),
            _ => NpcStep::Stay,
        },
        "investigate" | "search" => NpcStep::Search,
        "talk" | "speak" | "wait" => NpcStep::Stay,
        _ => return None,
    };
    Some(NpcAction { says, step })
}
