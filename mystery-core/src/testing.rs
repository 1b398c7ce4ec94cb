//! Testing utilities for the mystery engine.
//!
//! This module provides tools for integration testing:
//! - `ScriptedGenerator` for deterministic text generation without API calls
//! - `blueprint_for` to produce a consistent mystery for any brief
//! - `TestHarness` for scripted games
//! - Assertion helpers for verifying game state

use crate::config::GameConfig;
use crate::engine::{AccusationResult, ActionResponse, Game, GamePhase, PlayerProfile, StateSnapshot};
use crate::events::{Event, EventId};
use crate::generation::{GenerationError, GenerationPurpose, GenerationRequest, TextGenerator};
use crate::memory::MemoryRecord;
use crate::scenario::{
    Blueprint, ClueBlueprint, KnowledgeBlueprint, MurderBlueprint, RedHerring, ScenarioBrief,
};
use crate::world::{sample_cast, sample_manor, CharacterId, CharacterRole, PlayerRole};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Scripted generator
// ============================================================================

/// One scripted answer from the generator.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    /// Answer after a delay on the tokio clock.
    Delayed(Duration, String),
    Fail(GenerationError),
    /// Never answer. Only a timeout gets the caller out.
    Hang,
}

#[derive(Default)]
struct Script {
    queues: HashMap<GenerationPurpose, VecDeque<ScriptedReply>>,
    defaults: HashMap<GenerationPurpose, String>,
    requests: Vec<GenerationRequest>,
    auto_blueprint: bool,
}

/// A text generator that answers from per-purpose queues.
///
/// When a queue runs dry it falls back to, in order: an automatic blueprint
/// built from the brief (if enabled), the purpose's default text, or an error.
/// Every request is recorded for later inspection.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<Script>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer unscripted blueprint requests with [`blueprint_for`].
    pub fn with_auto_blueprint(self) -> Self {
        self.lock().auto_blueprint = true;
        self
    }

    /// Text returned whenever the queue for `purpose` is empty.
    pub fn with_default(self, purpose: GenerationPurpose, text: impl Into<String>) -> Self {
        self.lock().defaults.insert(purpose, text.into());
        self
    }

    pub fn push(&self, purpose: GenerationPurpose, reply: ScriptedReply) {
        self.lock().queues.entry(purpose).or_default().push_back(reply);
    }

    pub fn push_text(&self, purpose: GenerationPurpose, text: impl Into<String>) {
        self.push(purpose, ScriptedReply::Text(text.into()));
    }

    pub fn push_delayed_text(&self, purpose: GenerationPurpose, delay: Duration, text: impl Into<String>) {
        self.push(purpose, ScriptedReply::Delayed(delay, text.into()));
    }

    pub fn push_failure(&self, purpose: GenerationPurpose, error: GenerationError) {
        self.push(purpose, ScriptedReply::Fail(error));
    }

    pub fn push_hang(&self, purpose: GenerationPurpose) {
        self.push(purpose, ScriptedReply::Hang);
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.lock().requests.clone()
    }

    pub fn requests_for(&self, purpose: GenerationPurpose) -> Vec<GenerationRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.purpose == purpose)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_reply(&self, request: &GenerationRequest) -> ScriptedReply {
        let mut script = self.lock();
        script.requests.push(request.clone());

        if let Some(reply) = script
            .queues
            .get_mut(&request.purpose)
            .and_then(|q| q.pop_front())
        {
            return reply;
        }
        if request.purpose == GenerationPurpose::ScenarioBlueprint && script.auto_blueprint {
            let brief = request.last_user_message().and_then(ScenarioBrief::from_prompt);
            if let Some(brief) = brief {
                if let Ok(json) = serde_json::to_string_pretty(&blueprint_for(&brief)) {
                    return ScriptedReply::Text(json);
                }
            }
        }
        match script.defaults.get(&request.purpose) {
            Some(text) => ScriptedReply::Text(text.clone()),
            None => ScriptedReply::Fail(GenerationError::Backend(format!(
                "no scripted reply for {:?}",
                request.purpose
            ))),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        // The guard is released inside next_reply, before any await.
        match self.next_reply(&request) {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            ScriptedReply::Fail(error) => Err(error),
            ScriptedReply::Hang => {
                std::future::pending::<()>().await;
                Err(GenerationError::Timeout)
            }
        }
    }
}

// ============================================================================
// Automatic blueprint
// ============================================================================

/// A consistent mystery for any brief.
///
/// With `L0` the first location, `L1` and `L2` its first two neighbours, and
/// `W0`, `W1` the first two NPCs who are not the killer, the clues are:
///
/// | # | found at | difficulty | points to |
/// |---|----------|------------|-----------|
/// | 1 | W0       | easy       | killer    |
/// | 2 | L1       | medium     | killer    |
/// | 3 | L0       | easy       |           |
/// | 4 | L0       | medium     | killer    |
/// | 5 | L0       | hard       | W0        |
/// | 6 | L1       | easy       |           |
/// | 7 | W1       | hard       | killer    |
/// | 8 | L2       | easy       |           |
///
/// Further clues, when more are asked for, are easy finds spread over the map.
pub fn blueprint_for(brief: &ScenarioBrief) -> Blueprint {
    let l0 = brief.locations.first();
    let l0_key = l0.map(|l| l.key.clone()).unwrap_or_default();
    let l0_name = l0.map(|l| l.name.clone()).unwrap_or_else(|| "Manor".to_string());
    let neighbour = |n: usize| {
        l0.and_then(|l| l.connected_to.get(n))
            .cloned()
            .unwrap_or_else(|| l0_key.clone())
    };
    let l1 = neighbour(0);
    let l2 = neighbour(1);

    let killer = brief.killer.clone();
    let victim = brief.victim.name.clone();
    let innocents: Vec<&str> = brief
        .npcs
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| *name != killer)
        .collect();
    let w0 = innocents.first().copied().unwrap_or_default().to_string();
    let w1 = innocents.get(1).copied().unwrap_or(w0.as_str()).to_string();

    let mut clues = vec![
        clue(
            "c1",
            format!("{w0} overheard {killer} arguing with {victim} after dinner."),
            &w0,
            "easy",
            Some(killer.as_str()),
            &["argument", "dinner"],
        ),
        clue(
            "c2",
            format!("A torn glove embroidered with the initials of {killer}."),
            &l1,
            "medium",
            Some(killer.as_str()),
            &["glove", "initials"],
        ),
        clue(
            "c3",
            "A shattered wine glass with a bitter smell.".to_string(),
            &l0_key,
            "easy",
            None,
            &["glass", "wine"],
        ),
        clue(
            "c4",
            format!("A diary page describing a quarrel between {victim} and {killer}."),
            &l0_key,
            "medium",
            Some(killer.as_str()),
            &["diary", "quarrel"],
        ),
        clue(
            "c5",
            format!("A pawn ticket made out to {w0}."),
            &l0_key,
            "hard",
            Some(w0.as_str()),
            &["pawn", "ticket"],
        ),
        clue(
            "c6",
            "Muddy footprints leading toward the window.".to_string(),
            &l1,
            "easy",
            None,
            &["footprints", "mud"],
        ),
        clue(
            "c7",
            format!("{w1} saw {killer} on the stairs at midnight."),
            &w1,
            "hard",
            Some(killer.as_str()),
            &["midnight"],
        ),
        clue(
            "c8",
            "A half-empty bottle of sleeping draught.".to_string(),
            &l2,
            "easy",
            None,
            &["bottle", "sleeping"],
        ),
    ];
    for i in clues.len()..brief.clue_count {
        let at = brief
            .locations
            .get(i % brief.locations.len().max(1))
            .map(|l| l.key.clone())
            .unwrap_or_default();
        clues.push(clue(
            &format!("c{}", i + 1),
            format!("A scrap of burnt paper, fragment {}.", i + 1),
            &at,
            "easy",
            None,
            &["paper"],
        ));
    }

    let mut npc_knowledge = BTreeMap::new();
    for npc in &brief.npcs {
        let knowledge = if npc.name == killer {
            KnowledgeBlueprint {
                alibi: "I retired early with a headache.".to_string(),
                true_whereabouts: format!("In the {l0_name} with {victim} just before midnight."),
                secrets: vec![],
                attitude: "Helpful on the surface, anxious underneath.".to_string(),
                suspicions: format!("I hint that {w0} needed money."),
            }
        } else {
            KnowledgeBlueprint {
                alibi: "I was playing cards until late.".to_string(),
                true_whereabouts: "Playing cards until late.".to_string(),
                secrets: vec![],
                attitude: "Shaken but willing to help.".to_string(),
                suspicions: String::new(),
            }
        };
        npc_knowledge.insert(npc.name.clone(), knowledge);
    }

    Blueprint {
        title: format!("The {l0_name} Affair"),
        setting: "A remote country house, cut off by a winter storm.".to_string(),
        opening_narration: format!(
            "{victim} has been found dead in the {l0_name}. The roads are closed by snow, and {} must work out who among the guests is responsible.",
            brief.player.name
        ),
        murder: MurderBlueprint {
            method: "A glass of port laced with sleeping draught".to_string(),
            motive: "Fear of being written out of the will".to_string(),
            time_of_death: "Shortly before midnight".to_string(),
            location_of_death: l0_key.clone(),
            timeline: vec![
                "Dinner ends in a raised-voice argument".to_string(),
                "The guests scatter through the house".to_string(),
                "The poisoned port is served just before midnight".to_string(),
            ],
        },
        clues,
        npc_knowledge,
        red_herrings: vec![RedHerring {
            description: format!("{w0} was seen pawning a silver candlestick."),
            implicates: w0.clone(),
            truth: "An old debt, unrelated to the murder.".to_string(),
        }],
    }
}

fn clue(
    id: &str,
    description: String,
    found_at: &str,
    difficulty: &str,
    points_to: Option<&str>,
    keywords: &[&str],
) -> ClueBlueprint {
    ClueBlueprint {
        id: id.to_string(),
        description,
        points_to: points_to.map(str::to_string),
        difficulty: difficulty.to_string(),
        found_at: found_at.to_string(),
        kind: String::new(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

// ============================================================================
// Test harness
// ============================================================================

/// Scripted game over the sample manor and cast.
pub struct TestHarness {
    pub game: Game,
    pub generator: Arc<ScriptedGenerator>,
}

impl TestHarness {
    /// The default test config: seeded, NPCs stay put, rumors always spread.
    pub fn config() -> GameConfig {
        GameConfig::new()
            .with_seed(42)
            .with_npc_move_probability(0.0)
            .with_propagation(1, 1.0)
    }

    /// A detective game, already active.
    pub async fn new() -> Self {
        Self::with_config(Self::config()).await
    }

    pub async fn with_config(config: GameConfig) -> Self {
        Self::start(
            config,
            PlayerProfile::new("Inspector Vale", PlayerRole::Detective)
                .with_description("A patient investigator from the county police."),
        )
        .await
    }

    pub async fn start(config: GameConfig, profile: PlayerProfile) -> Self {
        let generator = Arc::new(ScriptedGenerator::new().with_auto_blueprint());
        let (game, _intro) = Game::new_game(
            generator.clone(),
            config,
            profile,
            &sample_cast(),
            &sample_manor(),
        )
        .await
        .unwrap_or_else(|e| panic!("test scenario failed to generate: {e}"));
        Self { game, generator }
    }

    /// Queue the next NPC line.
    pub fn expect_dialogue(&self, text: impl Into<String>) -> &Self {
        self.generator.push_text(GenerationPurpose::NpcDialogue, text);
        self
    }

    pub async fn move_to(&mut self, destination: &str) -> ActionResponse {
        let result = self.game.move_to(destination).await;
        result.unwrap_or_else(|e| panic!("move to {destination} failed: {e}"))
    }

    pub async fn talk(&mut self, character: &str, message: &str) -> ActionResponse {
        let result = self.game.talk(character, message).await;
        result.unwrap_or_else(|e| panic!("talk to {character} failed: {e}"))
    }

    pub async fn investigate(&mut self) -> ActionResponse {
        let result = self.game.investigate().await;
        result.unwrap_or_else(|e| panic!("investigate failed: {e}"))
    }

    pub async fn wait(&mut self) -> ActionResponse {
        let result = self.game.wait().await;
        result.unwrap_or_else(|e| panic!("wait failed: {e}"))
    }

    pub async fn accuse(&mut self, suspect: &str) -> AccusationResult {
        let response = self.game.accuse(suspect).await;
        response
            .unwrap_or_else(|e| panic!("accusing {suspect} failed: {e}"))
            .resolution
            .unwrap_or_else(|| panic!("accusing {suspect} did not end the game"))
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.game.snapshot()
    }

    pub fn true_killer_name(&self) -> String {
        self.game
            .scenario()
            .map(|s| s.world.character_name(s.ground_truth.killer()).to_string())
            .unwrap_or_default()
    }

    /// A living NPC who did not do it.
    pub fn innocent_suspect_name(&self) -> String {
        self.game
            .scenario()
            .and_then(|s| {
                s.world
                    .npcs()
                    .find(|c| c.alive && !s.ground_truth.is_killer(c.id))
                    .map(|c| c.name().to_string())
            })
            .unwrap_or_default()
    }

    pub fn role_of(&self, name: &str) -> Option<CharacterRole> {
        self.game
            .scenario()
            .and_then(|s| s.world.find_character(name))
            .map(|c| c.role)
    }

    /// Everything an NPC remembers, in write order.
    pub fn memories_of(&self, name: &str) -> Vec<MemoryRecord> {
        let Some(scenario) = self.game.scenario() else {
            return Vec::new();
        };
        let Some(id) = scenario.world.find_character(name).map(|c| c.id) else {
            return Vec::new();
        };
        self.game
            .memory()
            .map(|m| m.records(id).to_vec())
            .unwrap_or_default()
    }

    /// Names of the NPCs `name` gossips with.
    pub fn connections_of(&self, name: &str) -> Vec<String> {
        let Some(scenario) = self.game.scenario() else {
            return Vec::new();
        };
        let mut names: Vec<String> = scenario
            .world
            .find_character(name)
            .map(|c| {
                c.connections
                    .iter()
                    .map(|id| scenario.world.character_name(*id).to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Where an NPC currently stands, by location key.
    pub fn location_key_of(&self, name: &str) -> Option<String> {
        let scenario = self.game.scenario()?;
        let id = scenario.world.find_character(name)?.location?;
        scenario.world.location(id).map(|l| l.key.clone())
    }

    pub fn character_id(&self, name: &str) -> Option<CharacterId> {
        self.game
            .scenario()
            .and_then(|s| s.world.find_character(name))
            .map(|c| c.id)
    }

    /// Names of every NPC still alive.
    pub fn living_npc_names(&self) -> Vec<String> {
        self.game
            .scenario()
            .map(|s| {
                s.world
                    .npcs()
                    .filter(|c| c.alive)
                    .map(|c| c.name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn event(&self, id: EventId) -> Option<Event> {
        self.game.events().and_then(|e| e.get(id)).cloned()
    }

    pub fn event_count(&self) -> usize {
        self.game.events().map(|e| e.len()).unwrap_or(0)
    }

    /// The system prompt of the most recent dialogue request.
    pub fn last_dialogue_prompt(&self) -> Option<String> {
        self.generator
            .requests_for(GenerationPurpose::NpcDialogue)
            .last()
            .map(|r| r.system.clone())
    }
}

// ============================================================================
// Assertions
// ============================================================================

#[track_caller]
pub fn assert_turn(harness: &TestHarness, turn: u32) {
    let actual = harness.snapshot().turn;
    assert_eq!(actual, turn, "Expected turn {turn}, got {actual}");
}

#[track_caller]
pub fn assert_clues(harness: &TestHarness, found: usize, total: usize) {
    let snapshot = harness.snapshot();
    assert_eq!(
        (snapshot.clues_found, snapshot.total_clues),
        (found, total),
        "Expected {found}/{total} clues, got {}/{}",
        snapshot.clues_found,
        snapshot.total_clues
    );
}

#[track_caller]
pub fn assert_phase(harness: &TestHarness, phase: GamePhase) {
    let actual = harness.snapshot().phase;
    assert_eq!(actual, phase, "Expected phase {phase:?}, got {actual:?}");
}
