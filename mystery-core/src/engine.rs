//! The game state machine.
//!
//! A [`Game`] moves through `Setup -> Active -> Results`. Every player action
//! goes through one guard that rejects it unless the game is active, and all
//! validation happens before anything is mutated. Each move, talk,
//! investigate or wait costs exactly one turn; an accusation ends the game, as
//! does reaching the turn limit.

use crate::clues::{ActionContext, ClueDifficulty, ClueId};
use crate::config::GameConfig;
use crate::dialogue::{DialogueEffect, DialogueOrchestrator, TalkRequest};
use crate::events::{Event, EventCategory, EventId, EventLog, Visibility};
use crate::generation::{
    generate_with_timeout, GenerationError, GenerationPurpose, GenerationRequest, TextGenerator,
};
use crate::memory::{MemoryRecord, MemorySource, MemoryStore};
use crate::npc_actions::{self, NpcAction, NpcSituation, NpcStep};
use crate::propagation::Propagation;
use crate::scenario::{GroundTruth, Scenario, ScenarioError, ScenarioGenerator, ScenarioInputs};
use crate::world::{CharacterId, LocationId, LocationTemplate, Persona, PlayerRole};
use claude::Message;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

const CLOSING_MAX_TOKENS: usize = 800;

/// Errors reported to the caller of a game operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GameError {
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    #[error("Text generation failed: {0}")]
    GenerationFailure(#[from] GenerationError),

    #[error("Scenario generation failed: {0}")]
    ScenarioGenerationFailure(#[from] ScenarioError),

    #[error("Invalid action: {0}")]
    InvalidAction(String),
}

// ============================================================================
// Public types
// ============================================================================

/// The human player's identity and chosen role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub name: String,
    pub description: String,
    pub role: PlayerRole,
}

impl PlayerProfile {
    pub fn new(name: impl Into<String>, role: PlayerRole) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            role,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A player-visible action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum PlayerAction {
    Move { to: String },
    Talk { character: String, message: String },
    Investigate,
    Wait,
    Accuse {
        suspect: String,
        #[serde(default)]
        reasoning: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Setup,
    Active,
    Results,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The accused is the killer.
    CorrectAccusation,
    /// The accused is innocent; the killer walks free.
    WrongAccusation,
    /// The turn limit was reached; the killer evades capture.
    TimeExpired,
}

impl Outcome {
    pub fn is_detective_favorable(&self) -> bool {
        matches!(self, Outcome::CorrectAccusation)
    }
}

/// Final resolution of a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccusationResult {
    pub outcome: Outcome,
    /// `None` when time ran out.
    pub accused: Option<String>,
    pub true_killer: String,
    pub turns_taken: u32,
    pub clues_found: usize,
    pub total_clues: usize,
    pub narrative: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationView {
    pub id: LocationId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterView {
    pub id: CharacterId,
    pub name: String,
    pub description: String,
    pub alive: bool,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClueView {
    pub id: ClueId,
    pub description: String,
    pub difficulty: ClueDifficulty,
    pub turn_discovered: Option<u32>,
}

/// Everything the UI may show. Contains no hidden facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub phase: GamePhase,
    pub title: Option<String>,
    pub player_name: Option<String>,
    pub player_role: Option<PlayerRole>,
    pub turn: u32,
    pub max_turns: u32,
    pub current_location: Option<LocationView>,
    pub adjacent_locations: Vec<LocationView>,
    pub characters_present: Vec<CharacterView>,
    pub clues_found: usize,
    pub total_clues: usize,
    pub clues: Vec<ClueView>,
    pub npcs: Vec<CharacterView>,
    pub result: Option<AccusationResult>,
}

impl StateSnapshot {
    /// Snapshot of a session with no game.
    pub fn empty(max_turns: u32) -> Self {
        Self {
            phase: GamePhase::Setup,
            title: None,
            player_name: None,
            player_role: None,
            turn: 0,
            max_turns,
            current_location: None,
            adjacent_locations: Vec::new(),
            characters_present: Vec::new(),
            clues_found: 0,
            total_clues: 0,
            clues: Vec::new(),
            npcs: Vec::new(),
            result: None,
        }
    }
}

/// Result of a mutating action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub response: String,
    /// Events the player could see this turn, in order.
    pub events: Vec<Event>,
    pub snapshot: StateSnapshot,
    /// Set when this action ended the game.
    pub resolution: Option<AccusationResult>,
}

/// What the player sees once the mystery has been generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioIntro {
    pub title: String,
    pub opening_narration: String,
    pub snapshot: StateSnapshot,
}

/// Compare an accusation with the truth. Pure.
pub fn evaluate_accusation(truth: &GroundTruth, accused: CharacterId) -> Outcome {
    if truth.is_killer(accused) {
        Outcome::CorrectAccusation
    } else {
        Outcome::WrongAccusation
    }
}

// ============================================================================
// Game
// ============================================================================

/// State of a game in progress.
struct ActiveGame {
    scenario: Scenario,
    memory: MemoryStore,
    events: EventLog,
    propagation: Propagation,
    dialogue: DialogueOrchestrator,
    turn: u32,
    searches: HashMap<LocationId, u32>,
}

enum Phase {
    Setup,
    Active(Box<ActiveGame>),
    Results(Box<ActiveGame>, AccusationResult),
}

/// One game from setup to results.
pub struct Game {
    config: GameConfig,
    generator: Arc<dyn TextGenerator>,
    rng: StdRng,
    profile: PlayerProfile,
    phase: Phase,
}

impl Game {
    /// A game in the setup phase. No scenario exists yet.
    pub fn new(generator: Arc<dyn TextGenerator>, config: GameConfig, profile: PlayerProfile) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            generator,
            rng,
            profile,
            phase: Phase::Setup,
        }
    }

    /// Create a game and generate its scenario in one step.
    pub async fn new_game(
        generator: Arc<dyn TextGenerator>,
        config: GameConfig,
        profile: PlayerProfile,
        pool: &[Persona],
        locations: &[LocationTemplate],
    ) -> Result<(Self, ScenarioIntro), GameError> {
        let mut game = Self::new(generator, config, profile);
        let intro = game.generate_scenario(pool, locations).await?;
        Ok((game, intro))
    }

    pub fn phase(&self) -> GamePhase {
        match self.phase {
            Phase::Setup => GamePhase::Setup,
            Phase::Active(_) => GamePhase::Active,
            Phase::Results(..) => GamePhase::Results,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn profile(&self) -> &PlayerProfile {
        &self.profile
    }

    /// The final result once the game is over.
    pub fn result(&self) -> Option<&AccusationResult> {
        match &self.phase {
            Phase::Results(_, result) => Some(result),
            _ => None,
        }
    }

    fn active(&self) -> Option<&ActiveGame> {
        match &self.phase {
            Phase::Setup => None,
            Phase::Active(active) | Phase::Results(active, _) => Some(active),
        }
    }

    #[cfg(any(test, feature = "testing"))]
    pub(crate) fn scenario(&self) -> Option<&Scenario> {
        self.active().map(|a| &a.scenario)
    }

    #[cfg(any(test, feature = "testing"))]
    pub(crate) fn memory(&self) -> Option<&MemoryStore> {
        self.active().map(|a| &a.memory)
    }

    #[cfg(any(test, feature = "testing"))]
    pub(crate) fn events(&self) -> Option<&EventLog> {
        self.active().map(|a| &a.events)
    }

    /// Build the mystery. Setup becomes Active only if generation fully succeeds.
    pub async fn generate_scenario(
        &mut self,
        pool: &[Persona],
        locations: &[LocationTemplate],
    ) -> Result<ScenarioIntro, GameError> {
        if !matches!(self.phase, Phase::Setup) {
            return Err(GameError::InvalidSessionState(
                "this game already has a scenario".to_string(),
            ));
        }

        let inputs = ScenarioInputs {
            player_name: &self.profile.name,
            player_description: &self.profile.description,
            player_role: self.profile.role,
            pool,
            locations,
        };
        let scenario = ScenarioGenerator::new(self.generator.as_ref(), &self.config)
            .generate(&inputs, &mut self.rng)
            .await?;

        let active = ActiveGame::start(scenario, &self.config, &mut self.rng);
        let intro = ScenarioIntro {
            title: active.scenario.title.clone(),
            opening_narration: active.scenario.opening_narration.clone(),
            snapshot: active.snapshot(&self.config, GamePhase::Active, None),
        };
        self.phase = Phase::Active(Box::new(active));
        info!(title = %intro.title, player = %self.profile.name, "Game started");
        Ok(intro)
    }

    /// Current state, safe to show the player.
    pub fn snapshot(&self) -> StateSnapshot {
        match &self.phase {
            Phase::Setup => {
                let mut snapshot = StateSnapshot::empty(self.config.max_turns);
                snapshot.player_name = Some(self.profile.name.clone());
                snapshot.player_role = Some(self.profile.role);
                snapshot
            }
            Phase::Active(active) => active.snapshot(&self.config, GamePhase::Active, None),
            Phase::Results(active, result) => {
                active.snapshot(&self.config, GamePhase::Results, Some(result.clone()))
            }
        }
    }

    /// Dispatch any player action.
    pub async fn act(&mut self, action: PlayerAction) -> Result<ActionResponse, GameError> {
        match action {
            PlayerAction::Move { to } => self.move_to(&to).await,
            PlayerAction::Talk { character, message } => self.talk(&character, &message).await,
            PlayerAction::Investigate => self.investigate().await,
            PlayerAction::Wait => self.wait().await,
            PlayerAction::Accuse { suspect, reasoning } => {
                self.accuse_with_reasoning(&suspect, reasoning.as_deref()).await
            }
        }
    }

    /// The active game and the session RNG, or the reason there is none.
    fn parts(&mut self) -> Result<(&mut ActiveGame, &mut StdRng), GameError> {
        let Game { phase, rng, .. } = self;
        match phase {
            Phase::Active(active) => Ok((&mut **active, rng)),
            Phase::Setup => Err(GameError::InvalidSessionState(
                "no mystery has been generated yet".to_string(),
            )),
            Phase::Results(..) => Err(GameError::InvalidSessionState(
                "the game is over".to_string(),
            )),
        }
    }

    /// Move the player to an adjacent location.
    pub async fn move_to(&mut self, destination: &str) -> Result<ActionResponse, GameError> {
        let name = self.profile.name.clone();
        let (active, rng) = self.parts()?;
        let player = active.scenario.player;
        let world = &active.scenario.world;
        let here = world
            .location_of(player)
            .ok_or_else(|| GameError::InvalidAction("you are nowhere".to_string()))?;
        let target = world
            .find_location(destination)
            .ok_or_else(|| GameError::InvalidAction(format!("there is no place called {destination}")))?
            .id;
        if target == here {
            return Err(GameError::InvalidAction("you are already there".to_string()));
        }
        if !world.is_adjacent(here, target) {
            return Err(GameError::InvalidAction(format!(
                "you cannot reach the {} from the {}",
                world.location_name(target),
                world.location_name(here)
            )));
        }

        active
            .scenario
            .world
            .move_character(player, target)
            .map_err(|e| GameError::InvalidAction(e.to_string()))?;
        let mark = active.events.len();
        active.turn += 1;
        let turn = active.turn;

        let world = &active.scenario.world;
        let left = Event::public(
            turn,
            EventCategory::Movement,
            format!("{name} left the {}.", world.location_name(here)),
        )
        .at(here);
        let arrived = Event::public(
            turn,
            EventCategory::Movement,
            format!("{name} arrived in the {}.", world.location_name(target)),
        )
        .at(target);
        active.log(left, Some(player), rng);
        active.log(arrived, Some(player), rng);

        let response = active.describe_location(target);
        debug!(turn, "Player moved");
        self.end_turn(mark, response).await
    }

    /// Speak to an NPC in the same location.
    pub async fn talk(&mut self, character: &str, message: &str) -> Result<ActionResponse, GameError> {
        let message = message.trim();
        let name = self.profile.name.clone();
        let generator = Arc::clone(&self.generator);
        let (active, rng) = self.parts()?;
        let player = active.scenario.player;
        let world = &active.scenario.world;
        let npc = world
            .find_character(character)
            .ok_or_else(|| GameError::InvalidAction(format!("there is no one called {character}")))?;
        if npc.is_player {
            return Err(GameError::InvalidAction("you cannot question yourself".to_string()));
        }
        if !npc.alive {
            return Err(GameError::InvalidAction(format!("{} cannot answer any more", npc.name())));
        }
        let here = match world.location_of(player) {
            Some(here) if npc.location == Some(here) => here,
            _ => return Err(GameError::InvalidAction(format!("{} is not here", npc.name()))),
        };
        if message.is_empty() {
            return Err(GameError::InvalidAction("say something".to_string()));
        }
        let npc_id = npc.id;
        let npc_name = npc.name().to_string();

        let mark = active.events.len();
        active.turn += 1;
        let turn = active.turn;
        let event_id = EventId::new();

        let request = TalkRequest {
            npc: npc_id,
            player,
            message,
            turn,
            event: event_id,
            setting: &active.scenario.setting,
        };
        let reply = active
            .dialogue
            .talk(
                generator.as_ref(),
                &active.scenario.world,
                &active.memory,
                request,
                rng,
            )
            .await;

        let mut event = Event::private(
            turn,
            EventCategory::DialogueBeat,
            vec![player, npc_id],
            format!("{name} spoke with {npc_name}."),
        )
        .at(here);
        event.id = event_id;
        active.log(event, Some(player), rng);

        let mut response = format!("{npc_name}: {}", reply.text);
        for effect in reply.effects {
            match effect {
                DialogueEffect::Remember { owner, record } => active.memory.write(owner, record),
                DialogueEffect::AttemptReveal(context) => {
                    let Some(clue) = active.scenario.clues.attempt_discovery(here, npc_id, &context)
                    else {
                        continue;
                    };
                    let found = Event::private(
                        turn,
                        EventCategory::Discovery,
                        vec![player],
                        format!("Clue discovered from {npc_name}: {}", clue.description),
                    )
                    .at(here);
                    active.log(found, Some(player), rng);
                    response.push_str(&format!("\n\nClue discovered: {}", clue.description));
                    info!(turn, difficulty = %clue.difficulty, "Clue revealed in conversation");
                }
                DialogueEffect::Propagate(candidate) => {
                    active
                        .propagation
                        .schedule(&candidate, &active.scenario.world, &[player], rng);
                }
            }
        }
        if reply.fallback {
            debug!(turn, npc = %npc_name, "Conversation fell back to a canned line");
        }

        self.end_turn(mark, response).await
    }

    /// Search the player's current location.
    pub async fn investigate(&mut self) -> Result<ActionResponse, GameError> {
        let name = self.profile.name.clone();
        let (active, rng) = self.parts()?;
        let player = active.scenario.player;
        let here = active
            .scenario
            .world
            .location_of(player)
            .ok_or_else(|| GameError::InvalidAction("you are nowhere".to_string()))?;

        let mark = active.events.len();
        active.turn += 1;
        let turn = active.turn;
        let depth = {
            let count = active.searches.entry(here).or_insert(0);
            *count += 1;
            *count
        };
        let context = ActionContext::Investigate {
            turn,
            search_depth: depth,
        };
        let found = active.scenario.clues.attempt_discovery(here, player, &context);
        let place = active.scenario.world.location_name(here).to_string();

        let search = Event::public(
            turn,
            EventCategory::Discovery,
            format!("{name} searched the {place}."),
        )
        .at(here);
        active.log(search, Some(player), rng);

        let response = match found {
            Some(clue) => {
                let event = Event::private(
                    turn,
                    EventCategory::Discovery,
                    vec![player],
                    format!("Clue discovered: {}", clue.description),
                )
                .at(here);
                active.log(event, Some(player), rng);
                info!(turn, difficulty = %clue.difficulty, "Clue found by searching");
                format!("You search the {place} and find something: {}", clue.description)
            }
            None => format!(
                "You search the {place} carefully but find nothing new. A more thorough search or the right questions might help."
            ),
        };
        self.end_turn(mark, response).await
    }

    /// Let a turn pass.
    pub async fn wait(&mut self) -> Result<ActionResponse, GameError> {
        let (active, rng) = self.parts()?;
        let player = active.scenario.player;
        let mark = active.events.len();
        active.turn += 1;
        let mut event = Event::private(
            active.turn,
            EventCategory::System,
            vec![player],
            "You wait and watch.",
        );
        event.location = active.scenario.world.location_of(player);
        active.log(event, Some(player), rng);
        self.end_turn(mark, "You wait and observe your surroundings.".to_string())
            .await
    }

    /// Name the killer. Ends the game whatever the outcome.
    pub async fn accuse(&mut self, suspect: &str) -> Result<ActionResponse, GameError> {
        self.accuse_with_reasoning(suspect, None).await
    }

    /// Name the killer and say why. The reasoning is handed to the closing
    /// narrative; it never changes the outcome.
    pub async fn accuse_with_reasoning(
        &mut self,
        suspect: &str,
        reasoning: Option<&str>,
    ) -> Result<ActionResponse, GameError> {
        let name = self.profile.name.clone();
        let (active, rng) = self.parts()?;
        let player = active.scenario.player;
        let world = &active.scenario.world;
        let accused = world
            .find_character(suspect)
            .ok_or_else(|| GameError::InvalidAction(format!("there is no one called {suspect}")))?;
        let accused_id = accused.id;
        let outcome = evaluate_accusation(&active.scenario.ground_truth, accused_id);

        let mark = active.events.len();
        let mut event = Event::public(
            active.turn,
            EventCategory::System,
            format!("{name} accused {} of the murder.", accused.name()),
        );
        event.location = world.location_of(player);
        active.log(event, Some(player), rng);
        info!(turn = active.turn, ?outcome, "Accusation made");

        let reasoning = reasoning.map(str::trim).filter(|r| !r.is_empty());
        let result = self.conclude(outcome, Some(accused_id), reasoning).await?;
        Ok(ActionResponse {
            response: result.narrative.clone(),
            events: self.visible_since(mark),
            snapshot: self.snapshot(),
            resolution: Some(result),
        })
    }

    /// Close out a turn: NPCs act, rumors spread, the clock is checked.
    async fn end_turn(&mut self, mark: usize, mut response: String) -> Result<ActionResponse, GameError> {
        let Game {
            config,
            generator,
            rng,
            phase,
            ..
        } = self;
        let Phase::Active(active) = phase else {
            return Err(GameError::InvalidSessionState("the game is over".to_string()));
        };
        active.npc_phase(&**generator, config, rng).await;
        let delivered = active.propagation.process(active.turn, &mut active.memory);
        if !delivered.is_empty() {
            debug!(turn = active.turn, delivered = delivered.len(), "Rumors delivered");
        }

        let resolution = if active.turn >= config.max_turns {
            info!(turn = active.turn, "Turn limit reached");
            let result = self.conclude(Outcome::TimeExpired, None, None).await?;
            response.push_str("\n\nTime has run out.");
            Some(result)
        } else {
            None
        };

        Ok(ActionResponse {
            response,
            events: self.visible_since(mark),
            snapshot: self.snapshot(),
            resolution,
        })
    }

    fn visible_since(&self, mark: usize) -> Vec<Event> {
        self.active()
            .map(|active| active.player_visible_since(mark))
            .unwrap_or_default()
    }

    async fn conclude(
        &mut self,
        outcome: Outcome,
        accused: Option<CharacterId>,
        reasoning: Option<&str>,
    ) -> Result<AccusationResult, GameError> {
        let Phase::Active(active) = &self.phase else {
            return Err(GameError::InvalidSessionState("the game is over".to_string()));
        };
        let world = &active.scenario.world;
        let accused_name = accused.map(|id| world.character_name(id).to_string());
        let killer_name = world
            .character_name(active.scenario.ground_truth.killer())
            .to_string();

        let request = active.closing_request(
            &self.profile,
            outcome,
            accused_name.as_deref(),
            reasoning,
            self.config.temperature,
        );
        let narrative =
            match generate_with_timeout(self.generator.as_ref(), request, self.config.generation_timeout)
                .await
            {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    warn!(error = %e, "Closing narrative failed, using template");
                    active.closing_template(outcome, accused_name.as_deref())
                }
            };

        let result = AccusationResult {
            outcome,
            accused: accused_name,
            true_killer: killer_name,
            turns_taken: active.turn,
            clues_found: active.scenario.clues.discovered_count(),
            total_clues: active.scenario.clues.total(),
            narrative,
        };

        self.phase = match std::mem::replace(&mut self.phase, Phase::Setup) {
            Phase::Active(mut active) => {
                let turn = active.turn;
                active.events.push(Event::system(turn, "The investigation is over."));
                Phase::Results(active, result.clone())
            }
            other => other,
        };
        info!(?outcome, turns = result.turns_taken, clues = result.clues_found, "Game over");
        Ok(result)
    }
}

impl ActiveGame {
    fn start(scenario: Scenario, config: &GameConfig, rng: &mut StdRng) -> Self {
        let mut memory = MemoryStore::new();
        for (owner, record) in scenario.knowledge.iter().cloned() {
            memory.write(owner, record);
        }

        let mut events = EventLog::new();
        events.push(Event::system(0, format!("{} begins.", scenario.title)));

        let mut game = Self {
            scenario,
            memory,
            events,
            propagation: Propagation::new(config.propagation),
            dialogue: DialogueOrchestrator::new(
                config.memory_top_k,
                config.history_window,
                config.generation_timeout,
            )
            .with_temperature(config.temperature),
            turn: 0,
            searches: HashMap::new(),
        };
        game.witness_the_body(rng);
        game
    }

    /// NPCs in the room where the victim lies know the body is there, and
    /// may tell their connections.
    fn witness_the_body(&mut self, rng: &mut StdRng) {
        let truth = &self.scenario.ground_truth;
        let world = &self.scenario.world;
        let victim = truth.victim();
        let Some(spot) = world.location_of(victim) else {
            return;
        };
        let event = Event::public(
            0,
            EventCategory::System,
            format!(
                "{} was found dead in the {}.",
                world.character_name(victim),
                world.location_name(spot)
            ),
        )
        .at(spot)
        .witnessed_by(world.living_npcs_at(spot));
        for &witness in &event.witnesses {
            self.memory.write(
                witness,
                MemoryRecord::new(event.description.clone(), 0, MemorySource::Witnessed)
                    .with_event(event.id)
                    .with_tags(["body"]),
            );
        }
        self.propagation.on_event(&event, &self.scenario.world, rng);
        self.events.push(event);
    }

    /// Append an event. Public events at a location are witnessed by the
    /// living NPCs there, who may pass them on.
    fn log(&mut self, mut event: Event, actor: Option<CharacterId>, rng: &mut StdRng) -> EventId {
        if let (Visibility::Public, Some(location)) = (&event.visibility, event.location) {
            event.witnesses = self
                .scenario
                .world
                .living_npcs_at(location)
                .into_iter()
                .filter(|c| Some(*c) != actor)
                .collect();
            for &witness in &event.witnesses {
                self.memory.write(
                    witness,
                    MemoryRecord::new(event.description.clone(), event.turn, MemorySource::Witnessed)
                        .with_event(event.id),
                );
            }
            self.propagation.on_event(&event, &self.scenario.world, rng);
        }
        self.events.push(event)
    }

    /// Every living NPC acts once, room by room. Later NPCs in a room hear
    /// what earlier ones said or did.
    async fn npc_phase(&mut self, generator: &dyn TextGenerator, config: &GameConfig, rng: &mut StdRng) {
        let world = &self.scenario.world;
        let rooms: Vec<Vec<CharacterId>> = world
            .locations()
            .iter()
            .map(|l| world.living_npcs_at(l.id))
            .filter(|npcs| !npcs.is_empty())
            .collect();

        for npcs in rooms {
            let mut recent = Vec::new();
            for npc in npcs {
                let decided = if config.npc_actions {
                    self.decide(generator, config, npc, &recent).await
                } else {
                    None
                };
                let action = match decided {
                    Some(action) => action,
                    None => self.wander(npc, config.npc_move_probability, rng),
                };
                self.perform(npc, action, &mut recent, rng);
            }
        }
    }

    async fn decide(
        &self,
        generator: &dyn TextGenerator,
        config: &GameConfig,
        npc: CharacterId,
        recent: &[String],
    ) -> Option<NpcAction> {
        let situation = NpcSituation {
            npc,
            turn: self.turn,
            setting: &self.scenario.setting,
            recent,
        };
        let request = npc_actions::action_request(
            &self.scenario.world,
            &self.memory,
            &situation,
            config.memory_top_k,
            config.temperature,
        )?;
        match generate_with_timeout(generator, request, config.generation_timeout).await {
            Ok(text) => {
                let action = npc_actions::parse_action(&text, &self.scenario.world, npc);
                if action.is_none() {
                    debug!(turn = self.turn, "Unusable NPC action, wandering instead");
                }
                action
            }
            Err(e) => {
                debug!(turn = self.turn, error = %e, "NPC action generation failed");
                None
            }
        }
    }

    /// Random fallback: move to a neighbouring room with `probability`.
    fn wander(&self, npc: CharacterId, probability: f64, rng: &mut StdRng) -> NpcAction {
        if rng.gen::<f64>() >= probability {
            return NpcAction::stay();
        }
        let world = &self.scenario.world;
        let options: Vec<LocationId> = world
            .location_of(npc)
            .map(|from| world.neighbors(from).iter().map(|l| l.id).collect())
            .unwrap_or_default();
        match options.choose(rng) {
            Some(&to) => NpcAction::move_to(to),
            None => NpcAction::stay(),
        }
    }

    fn perform(&mut self, npc: CharacterId, action: NpcAction, recent: &mut Vec<String>, rng: &mut StdRng) {
        let world = &self.scenario.world;
        let Some(here) = world.location_of(npc) else {
            return;
        };
        let name = world.character_name(npc).to_string();
        let turn = self.turn;

        if let Some(line) = action.says {
            let speech = Event::public(turn, EventCategory::DialogueBeat, format!("{name} said: \"{line}\""))
                .at(here);
            recent.push(speech.description.clone());
            self.log(speech, Some(npc), rng);
        }

        match action.step {
            NpcStep::Stay => {}
            NpcStep::Search => {
                let search = Event::public(
                    turn,
                    EventCategory::Discovery,
                    format!("{name} searched the {}.", self.scenario.world.location_name(here)),
                )
                .at(here);
                recent.push(search.description.clone());
                self.log(search, Some(npc), rng);
            }
            NpcStep::Move(to) => {
                if self.scenario.world.move_character(npc, to).is_err() {
                    return;
                }
                let world = &self.scenario.world;
                let left = Event::public(
                    turn,
                    EventCategory::Movement,
                    format!("{name} left the {}.", world.location_name(here)),
                )
                .at(here);
                let arrived = Event::public(
                    turn,
                    EventCategory::Movement,
                    format!("{name} entered the {}.", world.location_name(to)),
                )
                .at(to);
                recent.push(left.description.clone());
                self.log(left, Some(npc), rng);
                self.log(arrived, Some(npc), rng);
            }
        }
    }

    fn player_visible_since(&self, mark: usize) -> Vec<Event> {
        let player = self.scenario.player;
        let here = self.scenario.world.location_of(player);
        self.events
            .since(mark)
            .iter()
            .filter(|e| match &e.visibility {
                Visibility::Private { parties } => parties.contains(&player),
                Visibility::Public => e.location.is_none() || e.location == here,
            })
            .cloned()
            .collect()
    }

    fn describe_location(&self, location: LocationId) -> String {
        let world = &self.scenario.world;
        let Some(place) = world.location(location) else {
            return String::new();
        };
        let others: Vec<String> = world
            .occupants(location)
            .into_iter()
            .filter(|c| !c.is_player)
            .map(|c| {
                if c.alive {
                    c.name().to_string()
                } else {
                    format!("the body of {}", c.name())
                }
            })
            .collect();
        let company = if others.is_empty() {
            "There is no one else here.".to_string()
        } else {
            format!("Here you see: {}.", others.join(", "))
        };
        format!("You make your way to the {}. {}\n\n{company}", place.name, place.description)
    }

    fn snapshot(
        &self,
        config: &GameConfig,
        phase: GamePhase,
        result: Option<AccusationResult>,
    ) -> StateSnapshot {
        let world = &self.scenario.world;
        let player = world.character(self.scenario.player);
        let here = world.location_of(self.scenario.player);
        let view = |id: LocationId| {
            world.location(id).map(|l| LocationView {
                id: l.id,
                name: l.name.clone(),
                description: l.description.clone(),
            })
        };
        let character_view = |c: &crate::world::Character| CharacterView {
            id: c.id,
            name: c.name().to_string(),
            description: c.persona.description.clone(),
            alive: c.alive,
            location: c.location.map(|l| world.location_name(l).to_string()),
        };

        StateSnapshot {
            phase,
            title: Some(self.scenario.title.clone()),
            player_name: player.map(|p| p.name().to_string()),
            player_role: player.map(|p| match p.role {
                crate::world::CharacterRole::Killer => PlayerRole::Killer,
                _ => PlayerRole::Detective,
            }),
            turn: self.turn,
            max_turns: config.max_turns,
            current_location: here.and_then(view),
            adjacent_locations: here
                .map(|h| world.neighbors(h).iter().filter_map(|l| view(l.id)).collect())
                .unwrap_or_default(),
            characters_present: here
                .map(|h| {
                    world
                        .occupants(h)
                        .into_iter()
                        .filter(|c| !c.is_player)
                        .map(character_view)
                        .collect()
                })
                .unwrap_or_default(),
            clues_found: self.scenario.clues.discovered_count(),
            total_clues: self.scenario.clues.total(),
            clues: self
                .scenario
                .clues
                .discovered()
                .map(|c| ClueView {
                    id: c.id,
                    description: c.description.clone(),
                    difficulty: c.difficulty,
                    turn_discovered: c.discovered_turn(),
                })
                .collect(),
            npcs: world.npcs().map(character_view).collect(),
            result,
        }
    }

    fn closing_request(
        &self,
        profile: &PlayerProfile,
        outcome: Outcome,
        accused: Option<&str>,
        reasoning: Option<&str>,
        temperature: Option<f32>,
    ) -> GenerationRequest {
        let world = &self.scenario.world;
        let truth = &self.scenario.ground_truth;
        let mut brief = format!(
            "Mystery: {}\nVictim: {}\nKiller: {}\nMethod: {}\nMotive: {}\n",
            self.scenario.title,
            world.character_name(truth.victim()),
            world.character_name(truth.killer()),
            truth.method(),
            truth.motive(),
        );
        if !truth.time_of_death().is_empty() {
            brief.push_str(&format!("Time of death: {}\n", truth.time_of_death()));
        }
        if let Some(place) = truth.location_of_death() {
            brief.push_str(&format!("Place of death: {}\n", world.location_name(place)));
        }
        if !truth.timeline().is_empty() {
            brief.push_str("Timeline:\n");
            for line in truth.timeline() {
                brief.push_str(&format!("- {line}\n"));
            }
        }

        brief.push_str(&format!(
            "\nInvestigator: {} ({})\n",
            profile.name,
            match profile.role {
                PlayerRole::Detective => "detective",
                PlayerRole::Killer => "the killer, playing innocent",
            }
        ));
        brief.push_str(&match (outcome, accused) {
            (Outcome::TimeExpired, _) => "Outcome: time ran out before anyone was accused.\n".to_string(),
            (Outcome::CorrectAccusation, Some(name)) => format!("Outcome: {name} was accused, correctly.\n"),
            (_, Some(name)) => format!("Outcome: {name} was accused, wrongly.\n"),
            (_, None) => "Outcome: no accusation.\n".to_string(),
        });
        if let Some(reasoning) = reasoning {
            brief.push_str(&format!("Investigator's reasoning: {reasoning}\n"));
        }

        brief.push_str(&format!(
            "Clues found: {} of {}\n",
            self.scenario.clues.discovered_count(),
            self.scenario.clues.total()
        ));
        for clue in self.scenario.clues.discovered() {
            brief.push_str(&format!("- {}\n", clue.description));
        }
        if !self.scenario.red_herrings.is_empty() {
            brief.push_str("False leads:\n");
            for herring in &self.scenario.red_herrings {
                brief.push_str(&format!("- {} (truth: {})\n", herring.description, herring.truth));
            }
        }

        GenerationRequest::new(
            GenerationPurpose::ClosingNarrative,
            include_str!("prompts/closing_narrative.txt"),
            vec![Message::user(brief)],
        )
        .with_max_tokens(CLOSING_MAX_TOKENS)
        .with_temperature(temperature)
    }

    fn closing_template(&self, outcome: Outcome, accused: Option<&str>) -> String {
        let world = &self.scenario.world;
        let truth = &self.scenario.ground_truth;
        let killer = world.character_name(truth.killer());
        let victim = world.character_name(truth.victim());
        let found = self.scenario.clues.discovered_count();
        let total = self.scenario.clues.total();

        let verdict = match (outcome, accused) {
            (Outcome::CorrectAccusation, _) => format!(
                "The accusation holds. {killer} is led away, and the death of {victim} is finally answered for."
            ),
            (Outcome::WrongAccusation, Some(name)) => format!(
                "The accusation against {name} falls apart. In the confusion, {killer}, the one truly responsible for the death of {victim}, slips away."
            ),
            _ => format!(
                "The clock runs out before anyone is named. {killer}, the one truly responsible for the death of {victim}, walks free."
            ),
        };
        format!("{verdict}\n\nThe investigation uncovered {found} of {total} clues over {} turns.", self.turn)
    }
}
