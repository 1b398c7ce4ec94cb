//! NPC dialogue.
//!
//! Builds each NPC's prompt from three sources only: their persona, the top
//! records of their own memory partition, and their own conversation history
//! with the player. The reply comes back with the effects it implies, which
//! the engine applies in one step after generation has finished.

use crate::clues::ActionContext;
use crate::events::EventId;
use crate::generation::{generate_with_timeout, GenerationPurpose, GenerationRequest, TextGenerator};
use crate::memory::{similarity, MemoryRecord, MemorySource, MemoryStore};
use crate::propagation::PropagationCandidate;
use crate::world::{Character, CharacterId, CharacterRole, World};
use claude::{Message, Role};
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const DIALOGUE_MAX_TOKENS: usize = 400;
const COMPACT_MEMORY_LIMIT: usize = 2;
const COMPACT_HISTORY_LIMIT: usize = 2;

const FALLBACK_LINES: &[&str] = &[
    "*{name} looks away for a long moment.* \"Forgive me. I need a moment to collect my thoughts.\"",
    "*{name} shakes their head slowly.* \"Not now. Ask me again later.\"",
    "*{name} opens their mouth, then thinks better of it.* \"I... would rather not say.\"",
];

/// A consequence of a successful conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogueEffect {
    /// Write to the NPC's own memory.
    Remember { owner: CharacterId, record: MemoryRecord },
    /// Give the NPC's clues a chance to surface.
    AttemptReveal(ActionContext),
    /// Something the NPC may pass on to their connections.
    Propagate(PropagationCandidate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogueReply {
    pub text: String,
    /// True when generation failed and `text` is a canned line. No effects then.
    pub fallback: bool,
    pub effects: Vec<DialogueEffect>,
}

/// One player line addressed to one NPC.
#[derive(Debug, Clone)]
pub struct TalkRequest<'a> {
    pub npc: CharacterId,
    pub player: CharacterId,
    pub message: &'a str,
    pub turn: u32,
    /// Event the conversation will be logged under.
    pub event: EventId,
    pub setting: &'a str,
}

/// Per-NPC conversation state and prompt assembly.
#[derive(Debug, Clone)]
pub struct DialogueOrchestrator {
    top_k: usize,
    history_window: usize,
    timeout: Duration,
    temperature: Option<f32>,
    histories: HashMap<CharacterId, Vec<Message>>,
}

impl DialogueOrchestrator {
    pub fn new(top_k: usize, history_window: usize, timeout: Duration) -> Self {
        Self {
            top_k,
            history_window,
            timeout,
            temperature: None,
            histories: HashMap::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Conversation so far between the player and `npc`.
    pub fn history(&self, npc: CharacterId) -> &[Message] {
        self.histories.get(&npc).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Generate the NPC's reply to the player.
    ///
    /// Retries once with a shortened context. If that also fails the reply is
    /// a fixed in-character line and nothing else changes.
    pub async fn talk<R: Rng + Send>(
        &mut self,
        generator: &dyn TextGenerator,
        world: &World,
        memory: &MemoryStore,
        request: TalkRequest<'_>,
        rng: &mut R,
    ) -> DialogueReply {
        let Some(npc) = world.character(request.npc) else {
            return fallback_reply("Someone", request.turn);
        };

        let full = self.build_request(world, memory, npc, &request, false);
        let text = match generate_with_timeout(generator, full, self.timeout).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(npc = %npc.name(), error = %e, "Dialogue generation failed, retrying with shorter context");
                let compact = self.build_request(world, memory, npc, &request, true);
                match generate_with_timeout(generator, compact, self.timeout).await {
                    Ok(text) => Some(text),
                    Err(e) => {
                        warn!(npc = %npc.name(), error = %e, "Dialogue generation failed twice, using fallback line");
                        None
                    }
                }
            }
        };

        let Some(text) = text else {
            return fallback_reply(npc.name(), request.turn);
        };
        let text = text.trim().to_string();

        let history = self.histories.entry(npc.id).or_default();
        history.push(Message::user(request.message));
        history.push(Message::assistant(text.clone()));
        trim_history(history, self.history_window);

        let effects = derive_effects(world, npc, &request, rng.gen::<f64>());
        debug!(npc = %npc.name(), effects = effects.len(), "Dialogue turn complete");

        DialogueReply {
            text,
            fallback: false,
            effects,
        }
    }

    fn build_request(
        &self,
        world: &World,
        memory: &MemoryStore,
        npc: &Character,
        request: &TalkRequest<'_>,
        compact: bool,
    ) -> GenerationRequest {
        let location = npc
            .location
            .map(|l| world.location_name(l).to_string())
            .unwrap_or_default();
        let query = format!("{} {}", request.message, location);
        let k = if compact {
            self.top_k.min(COMPACT_MEMORY_LIMIT)
        } else {
            self.top_k
        };
        let memories = memory.retrieve(npc.id, &query, k);

        let mut system = String::from(include_str!("prompts/npc_dialogue.txt"));
        system.push_str("\n## Who you are\n");
        system.push_str(&npc.persona.prompt_description());
        system.push('\n');
        if !compact && !npc.persona.example_dialogue.is_empty() {
            system.push_str(&format!("How you speak: {}\n", npc.persona.example_dialogue));
        }
        if npc.role == CharacterRole::Killer {
            system.push_str("You are guilty. Protect yourself, deflect suspicion, and never confess unless the evidence leaves no way out.\n");
        }

        if !compact && !request.setting.is_empty() {
            system.push_str("\n## Setting\n");
            system.push_str(request.setting);
            system.push('\n');
        }
        if !location.is_empty() {
            system.push_str(&format!("\nYou are in the {location}.\n"));
        }

        system.push_str("\n## What you remember\n");
        if memories.is_empty() {
            system.push_str("- Nothing of note.\n");
        }
        for record in &memories {
            system.push_str(&format!("- {}\n", record.content()));
        }

        let player = world.character_name(request.player);
        system.push_str(&format!("\nYou are speaking with {player}.\n"));

        let history = self.history(npc.id);
        let history = if compact {
            tail_from_user(history, COMPACT_HISTORY_LIMIT)
        } else {
            history
        };
        let mut messages = history.to_vec();
        messages.push(Message::user(request.message));

        GenerationRequest::new(GenerationPurpose::NpcDialogue, system, messages)
            .with_max_tokens(DIALOGUE_MAX_TOKENS)
            .with_temperature(self.temperature)
    }
}

fn derive_effects(
    world: &World,
    npc: &Character,
    request: &TalkRequest<'_>,
    roll: f64,
) -> Vec<DialogueEffect> {
    let player = world.character_name(request.player);
    let topic = topic_of(request.message);

    let mut effects = vec![
        DialogueEffect::Remember {
            owner: npc.id,
            record: MemoryRecord::new(
                format!("{player} said to me: \"{}\"", request.message.trim()),
                request.turn,
                MemorySource::ToldByPlayer,
            )
            .with_event(request.event)
            .with_tags(topic.iter().cloned()),
        },
        DialogueEffect::AttemptReveal(ActionContext::Talk {
            turn: request.turn,
            message: request.message.to_string(),
            roll,
        }),
    ];

    if !topic.is_empty() {
        effects.push(DialogueEffect::Propagate(PropagationCandidate {
            source: npc.id,
            event: request.event,
            turn: request.turn,
            content: format!("{player} questioned {} about {}", npc.name(), topic.join(", ")),
        }));
    }
    effects
}

/// Up to three content words naming what the player asked about.
fn topic_of(message: &str) -> Vec<String> {
    let mut topic: Vec<String> = Vec::new();
    for token in similarity::tokenize(message) {
        if token.len() > 2 && !topic.contains(&token) {
            topic.push(token);
        }
        if topic.len() == 3 {
            break;
        }
    }
    topic
}

fn fallback_reply(name: &str, turn: u32) -> DialogueReply {
    let line = FALLBACK_LINES[turn as usize % FALLBACK_LINES.len()];
    DialogueReply {
        text: line.replace("{name}", name),
        fallback: true,
        effects: Vec::new(),
    }
}

/// Keep at most `window` messages, always starting on a player message.
fn trim_history(history: &mut Vec<Message>, window: usize) {
    let excess = history.len().saturating_sub(window);
    history.drain(..excess);
    while history.first().map(|m| m.role == Role::Assistant).unwrap_or(false) {
        history.remove(0);
    }
}

fn tail_from_user(history: &[Message], limit: usize) -> &[Message] {
    let mut start = history.len().saturating_sub(limit);
    while start < history.len() && history[start].role == Role::Assistant {
        start += 1;
    }
    &history[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationError;
    use crate::testing::ScriptedGenerator;
    use crate::world::{Persona, sample_cast};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Fixture {
        world: World,
        memory: MemoryStore,
        player: CharacterId,
        maid: CharacterId,
        cook: CharacterId,
    }

    fn fixture() -> Fixture {
        let mut world = World::new();
        let player = world.add_character(Character::player("Inspector Vale", "", Default::default()));
        let cast = sample_cast();
        let maid = world.add_character(Character::new(cast[1].clone(), CharacterRole::Witness));
        let cook = world.add_character(Character::new(Persona::new("Mrs. Pike"), CharacterRole::Suspect));
        let mut memory = MemoryStore::new();
        memory.write(maid, MemoryRecord::new("I saw muddy boots by the greenhouse", 0, MemorySource::Witnessed));
        memory.write(cook, MemoryRecord::new("The soufflé collapsed at nine", 0, MemorySource::Witnessed));
        Fixture {
            world,
            memory,
            player,
            maid,
            cook,
        }
    }

    fn talk_to<'a>(f: &Fixture, npc: CharacterId, message: &'a str, turn: u32) -> TalkRequest<'a> {
        TalkRequest {
            npc,
            player: f.player,
            message,
            turn,
            event: EventId::new(),
            setting: "A country manor",
        }
    }

    #[tokio::test]
    async fn test_prompt_uses_only_own_memory() {
        let f = fixture();
        let generator = ScriptedGenerator::new();
        generator.push_text(GenerationPurpose::NpcDialogue, "Boots, yes. Filthy ones.");
        let mut orchestrator = DialogueOrchestrator::new(5, 10, Duration::from_secs(5));
        let mut rng = StdRng::seed_from_u64(1);

        let reply = orchestrator
            .talk(&generator, &f.world, &f.memory, talk_to(&f, f.maid, "What did you see?", 1), &mut rng)
            .await;
        assert!(!reply.fallback);

        let request = &generator.requests_for(GenerationPurpose::NpcDialogue)[0];
        assert!(request.system.contains("muddy boots"));
        assert!(!request.system.contains("soufflé"));
        assert!(request.system.contains("Margaret Hale"));
        assert!(!request.system.contains("skimming"));
    }

    #[tokio::test]
    async fn test_history_is_per_npc() {
        let f = fixture();
        let generator = ScriptedGenerator::new();
        generator.push_text(GenerationPurpose::NpcDialogue, "I was in the kitchen.");
        generator.push_text(GenerationPurpose::NpcDialogue, "Pastry, mostly.");
        let mut orchestrator = DialogueOrchestrator::new(5, 10, Duration::from_secs(5));
        let mut rng = StdRng::seed_from_u64(1);

        orchestrator
            .talk(&generator, &f.world, &f.memory, talk_to(&f, f.maid, "Where were you?", 1), &mut rng)
            .await;
        orchestrator
            .talk(&generator, &f.world, &f.memory, talk_to(&f, f.cook, "What were you baking?", 2), &mut rng)
            .await;

        assert_eq!(orchestrator.history(f.maid).len(), 2);
        let cook_request = &generator.requests_for(GenerationPurpose::NpcDialogue)[1];
        assert_eq!(cook_request.messages.len(), 1);
        assert!(cook_request
            .messages
            .iter()
            .all(|m| !m.content.contains("kitchen") && !m.content.contains("Where were you")));
    }

    #[tokio::test]
    async fn test_success_yields_effects() {
        let f = fixture();
        let generator = ScriptedGenerator::new();
        generator.push_text(GenerationPurpose::NpcDialogue, "The greenhouse? Nobody goes there.");
        let mut orchestrator = DialogueOrchestrator::new(5, 10, Duration::from_secs(5));
        let mut rng = StdRng::seed_from_u64(1);

        let reply = orchestrator
            .talk(&generator, &f.world, &f.memory, talk_to(&f, f.maid, "Tell me about the greenhouse", 4), &mut rng)
            .await;

        assert!(reply.effects.iter().any(|e| matches!(
            e,
            DialogueEffect::Remember { owner, record }
                if *owner == f.maid && record.source() == MemorySource::ToldByPlayer
        )));
        assert!(reply
            .effects
            .iter()
            .any(|e| matches!(e, DialogueEffect::AttemptReveal(ActionContext::Talk { turn: 4, .. }))));
        assert!(reply.effects.iter().any(|e| matches!(
            e,
            DialogueEffect::Propagate(c) if c.source == f.maid && c.content.contains("greenhouse")
        )));
    }

    #[tokio::test]
    async fn test_retry_with_compact_context_then_succeed() {
        let f = fixture();
        let generator = ScriptedGenerator::new();
        generator.push_failure(GenerationPurpose::NpcDialogue, GenerationError::Timeout);
        generator.push_text(GenerationPurpose::NpcDialogue, "Sorry, where was I?");
        let mut orchestrator = DialogueOrchestrator::new(5, 10, Duration::from_secs(5));
        let mut rng = StdRng::seed_from_u64(1);

        let reply = orchestrator
            .talk(&generator, &f.world, &f.memory, talk_to(&f, f.maid, "Hello", 1), &mut rng)
            .await;
        assert!(!reply.fallback);
        assert_eq!(reply.text, "Sorry, where was I?");
        assert_eq!(generator.requests_for(GenerationPurpose::NpcDialogue).len(), 2);
    }

    #[tokio::test]
    async fn test_double_failure_falls_back_without_effects() {
        let f = fixture();
        let generator = ScriptedGenerator::new();
        generator.push_failure(GenerationPurpose::NpcDialogue, GenerationError::Timeout);
        generator.push_failure(GenerationPurpose::NpcDialogue, GenerationError::Backend("down".to_string()));
        let mut orchestrator = DialogueOrchestrator::new(5, 10, Duration::from_secs(5));
        let mut rng = StdRng::seed_from_u64(1);

        let reply = orchestrator
            .talk(&generator, &f.world, &f.memory, talk_to(&f, f.maid, "Hello", 1), &mut rng)
            .await;
        assert!(reply.fallback);
        assert!(reply.effects.is_empty());
        assert!(reply.text.contains("Margaret Hale"));
        assert!(orchestrator.history(f.maid).is_empty());
    }

    #[test]
    fn test_trim_history_keeps_window_starting_on_user() {
        let mut history = vec![
            Message::user("1"),
            Message::assistant("2"),
            Message::user("3"),
            Message::assistant("4"),
            Message::user("5"),
            Message::assistant("6"),
        ];
        trim_history(&mut history, 3);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "5");
    }

    #[test]
    fn test_fallback_is_deterministic() {
        assert_eq!(fallback_reply("Finch", 3), fallback_reply("Finch", 3));
        assert!(fallback_reply("Finch", 3).text.contains("Finch"));
    }
}
