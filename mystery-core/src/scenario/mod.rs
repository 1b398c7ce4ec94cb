//! Procedural mystery generation.
//!
//! The cast and killer are chosen locally from the character pool; the text
//! generator designs the rest (motive, timeline, clues, NPC knowledge,
//! narration) as a [`Blueprint`]. A blueprint is only accepted once it has been
//! checked against the cast and the map. Nothing is built until a blueprint
//! passes, so a failed generation leaves no trace.

pub mod blueprint;

use crate::clues::{Clue, ClueBoard, ClueDifficulty, DiscoveryPredicate};
use crate::config::GameConfig;
use crate::generation::{
    generate_with_timeout, GenerationError, GenerationPurpose, GenerationRequest, TextGenerator,
};
use crate::memory::{similarity, MemoryRecord, MemorySource};
use crate::world::{
    Character, CharacterId, CharacterRole, LocationId, LocationTemplate, Persona, PlayerRole,
    World, WorldError,
};
use claude::Message;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use blueprint::{
    Blueprint, BriefCharacter, BriefLocation, ClueBlueprint, KnowledgeBlueprint, MurderBlueprint,
    RedHerring, ScenarioBrief,
};

const BLUEPRINT_MAX_TOKENS: usize = 4096;
const BLUEPRINT_TEMPERATURE: f32 = 1.0;

/// Errors from scenario generation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScenarioError {
    #[error("Text generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Malformed blueprint: {0}")]
    MalformedBlueprint(String),

    #[error("Inconsistent scenario: {0}")]
    Inconsistent(String),

    #[error("Character pool too small: need {needed}, have {available}")]
    InsufficientCast { needed: usize, available: usize },

    #[error("Invalid map: {0}")]
    Map(#[from] WorldError),
}

// ============================================================================
// Ground truth
// ============================================================================

/// The hidden facts of the mystery. Fixed once the scenario exists.
///
/// `Debug` is redacted so the truth cannot leak through logs.
#[derive(Clone)]
pub struct GroundTruth {
    killer: CharacterId,
    victim: CharacterId,
    motive: String,
    method: String,
    time_of_death: String,
    location_of_death: Option<LocationId>,
    timeline: Vec<String>,
}

impl GroundTruth {
    /// Whether `character` is the true killer.
    pub fn is_killer(&self, character: CharacterId) -> bool {
        self.killer == character
    }

    pub(crate) fn killer(&self) -> CharacterId {
        self.killer
    }

    pub(crate) fn victim(&self) -> CharacterId {
        self.victim
    }

    pub(crate) fn motive(&self) -> &str {
        &self.motive
    }

    pub(crate) fn method(&self) -> &str {
        &self.method
    }

    pub(crate) fn time_of_death(&self) -> &str {
        &self.time_of_death
    }

    pub(crate) fn location_of_death(&self) -> Option<LocationId> {
        self.location_of_death
    }

    pub(crate) fn timeline(&self) -> &[String] {
        &self.timeline
    }
}

impl fmt::Debug for GroundTruth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GroundTruth { <hidden> }")
    }
}

// ============================================================================
// Scenario
// ============================================================================

/// A complete, validated mystery ready to be played.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub title: String,
    pub setting: String,
    pub opening_narration: String,
    pub(crate) world: World,
    pub(crate) player: CharacterId,
    pub(crate) clues: ClueBoard,
    pub(crate) ground_truth: GroundTruth,
    pub(crate) knowledge: Vec<(CharacterId, MemoryRecord)>,
    pub(crate) red_herrings: Vec<RedHerring>,
}

impl Scenario {
    pub fn total_clues(&self) -> usize {
        self.clues.total()
    }

    pub fn world(&self) -> &World {
        &self.world
    }
}

/// What the player brings to a new game.
#[derive(Debug, Clone)]
pub struct ScenarioInputs<'a> {
    pub player_name: &'a str,
    pub player_description: &'a str,
    pub player_role: PlayerRole,
    pub pool: &'a [Persona],
    pub locations: &'a [LocationTemplate],
}

#[derive(Debug)]
struct Cast {
    victim: Persona,
    npcs: Vec<Persona>,
    /// Index into `npcs`. `None` when the player is the killer.
    killer: Option<usize>,
}

impl Cast {
    fn killer_name<'a>(&'a self, player_name: &'a str) -> &'a str {
        match self.killer {
            Some(i) => &self.npcs[i].name,
            None => player_name,
        }
    }
}

/// Builds scenarios using a text generator.
pub struct ScenarioGenerator<'a> {
    generator: &'a dyn TextGenerator,
    config: &'a GameConfig,
}

impl<'a> ScenarioGenerator<'a> {
    pub fn new(generator: &'a dyn TextGenerator, config: &'a GameConfig) -> Self {
        Self { generator, config }
    }

    /// Generate one internally consistent mystery, or fail without side effects.
    pub async fn generate<R: Rng + Send>(
        &self,
        inputs: &ScenarioInputs<'_>,
        rng: &mut R,
    ) -> Result<Scenario, ScenarioError> {
        if inputs.locations.is_empty() {
            return Err(ScenarioError::Inconsistent("no locations to play in".to_string()));
        }
        // Fail on a broken map before spending a generation call.
        World::from_templates(inputs.locations)?;

        let cast = select_cast(inputs.pool, self.config.npc_count, inputs.player_role, rng)?;
        let brief = build_brief(inputs, &cast, self.config.clue_count);
        let prompt = brief.to_prompt()?;

        let attempts = self.config.scenario_attempts.max(1);
        let mut last_error = ScenarioError::Inconsistent("no attempt made".to_string());

        for attempt in 1..=attempts {
            let request = GenerationRequest::new(
                GenerationPurpose::ScenarioBlueprint,
                include_str!("../prompts/scenario_system.txt"),
                vec![Message::user(prompt.clone())],
            )
            .with_max_tokens(BLUEPRINT_MAX_TOKENS)
            .with_temperature(Some(BLUEPRINT_TEMPERATURE));

            let result = match generate_with_timeout(
                self.generator,
                request,
                self.config.generation_timeout,
            )
            .await
            {
                Ok(text) => Blueprint::parse(&text)
                    .and_then(|bp| assemble(inputs, &cast, bp, self.config, rng)),
                Err(e) => Err(e.into()),
            };

            match result {
                Ok(scenario) => {
                    info!(
                        title = %scenario.title,
                        npcs = cast.npcs.len(),
                        clues = scenario.total_clues(),
                        attempt,
                        "Scenario generated"
                    );
                    return Ok(scenario);
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Scenario attempt rejected");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

fn select_cast<R: Rng>(
    pool: &[Persona],
    npc_count: usize,
    player_role: PlayerRole,
    rng: &mut R,
) -> Result<Cast, ScenarioError> {
    let min_npcs = match player_role {
        PlayerRole::Detective => npc_count.max(1),
        PlayerRole::Killer => npc_count,
    };
    let needed = min_npcs + 1;
    if pool.len() < needed {
        return Err(ScenarioError::InsufficientCast {
            needed,
            available: pool.len(),
        });
    }

    let mut order: Vec<usize> = (0..pool.len()).collect();
    order.shuffle(rng);

    let victim_pos = order
        .iter()
        .position(|&i| pool[i].can_be(CharacterRole::Victim))
        .unwrap_or(0);
    let victim = pool[order.remove(victim_pos)].clone();

    order.truncate(min_npcs);
    let npcs: Vec<Persona> = order.into_iter().map(|i| pool[i].clone()).collect();

    let killer = match player_role {
        PlayerRole::Killer => None,
        PlayerRole::Detective => {
            let hinted: Vec<usize> = (0..npcs.len())
                .filter(|&i| npcs[i].can_be(CharacterRole::Killer))
                .collect();
            let candidates: Vec<usize> = if hinted.is_empty() {
                (0..npcs.len()).collect()
            } else {
                hinted
            };
            candidates.choose(rng).copied()
        }
    };

    Ok(Cast {
        victim,
        npcs,
        killer,
    })
}

fn brief_character(persona: &Persona) -> BriefCharacter {
    BriefCharacter {
        name: persona.name.clone(),
        description: persona.description.clone(),
        personality: persona.personality.clone(),
    }
}

fn build_brief(inputs: &ScenarioInputs<'_>, cast: &Cast, clue_count: usize) -> ScenarioBrief {
    // Connections are undirected, so list both directions for the generator.
    let locations = inputs
        .locations
        .iter()
        .map(|l| {
            let mut connected_to = l.connected_to.clone();
            for other in inputs.locations {
                if other.connected_to.iter().any(|k| k.eq_ignore_ascii_case(&l.key))
                    && !connected_to.iter().any(|k| k.eq_ignore_ascii_case(&other.key))
                {
                    connected_to.push(other.key.clone());
                }
            }
            BriefLocation {
                key: l.key.clone(),
                name: l.name.clone(),
                description: l.description.clone(),
                connected_to,
            }
        })
        .collect();

    ScenarioBrief {
        player: BriefCharacter {
            name: inputs.player_name.to_string(),
            description: inputs.player_description.to_string(),
            personality: String::new(),
        },
        player_role: inputs.player_role,
        victim: brief_character(&cast.victim),
        killer: cast.killer_name(inputs.player_name).to_string(),
        npcs: cast.npcs.iter().map(brief_character).collect(),
        locations,
        clue_count,
    }
}

fn role_from_hints(persona: &Persona) -> CharacterRole {
    persona
        .role_hints
        .iter()
        .copied()
        .find(|r| {
            matches!(
                r,
                CharacterRole::Suspect | CharacterRole::Witness | CharacterRole::RedHerring
            )
        })
        .unwrap_or(CharacterRole::Suspect)
}

fn derive_keywords(description: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for token in similarity::tokenize(description) {
        if token.len() > 3 && !keywords.contains(&token) {
            keywords.push(token);
        }
        if keywords.len() == 3 {
            break;
        }
    }
    keywords
}

/// Turn an accepted blueprint into a playable scenario.
fn assemble<R: Rng>(
    inputs: &ScenarioInputs<'_>,
    cast: &Cast,
    blueprint: Blueprint,
    config: &GameConfig,
    rng: &mut R,
) -> Result<Scenario, ScenarioError> {
    check_narrative(&blueprint)?;

    let mut world = World::from_templates(inputs.locations)?;
    let start = world
        .locations()
        .first()
        .map(|l| l.id)
        .ok_or_else(|| ScenarioError::Inconsistent("no locations to play in".to_string()))?;
    let all_locations: Vec<LocationId> = world.locations().iter().map(|l| l.id).collect();

    let player = world.add_character(Character::player(
        inputs.player_name,
        inputs.player_description,
        inputs.player_role,
    ));
    world.place(player, start)?;

    let location_of_death = world
        .find_location(&blueprint.murder.location_of_death)
        .map(|l| l.id);
    let mut victim_character = Character::new(cast.victim.clone(), CharacterRole::Victim);
    victim_character.alive = false;
    let victim = world.add_character(victim_character);
    let victim_spot = location_of_death
        .or_else(|| {
            cast.victim
                .default_location
                .as_deref()
                .and_then(|k| world.find_location(k))
                .map(|l| l.id)
        })
        .unwrap_or(start);
    world.place(victim, victim_spot)?;

    let mut npc_ids = Vec::with_capacity(cast.npcs.len());
    for (i, persona) in cast.npcs.iter().enumerate() {
        let role = if cast.killer == Some(i) {
            CharacterRole::Killer
        } else {
            role_from_hints(persona)
        };
        let spot = persona
            .default_location
            .as_deref()
            .and_then(|k| world.find_location(k))
            .map(|l| l.id)
            .or_else(|| all_locations.choose(&mut *rng).copied())
            .unwrap_or(start);
        let id = world.add_character(Character::new(persona.clone(), role));
        world.place(id, spot)?;
        npc_ids.push(id);
    }

    let killer = match cast.killer {
        Some(i) => npc_ids[i],
        None => player,
    };

    connect_cast(&mut world, &npc_ids);

    for herring in &blueprint.red_herrings {
        if let Some(id) = world.find_character(&herring.implicates).map(|c| c.id) {
            if let Some(c) = world.character_mut(id) {
                if c.role == CharacterRole::Suspect {
                    c.role = CharacterRole::RedHerring;
                }
            }
        }
    }

    let clues = place_clues(&world, &blueprint, config.clue_count)?;
    check_clue_chain(&clues, killer)?;

    let ground_truth = GroundTruth {
        killer,
        victim,
        motive: blueprint.murder.motive.trim().to_string(),
        method: blueprint.murder.method.trim().to_string(),
        time_of_death: blueprint.murder.time_of_death.trim().to_string(),
        location_of_death,
        timeline: blueprint.murder.timeline.clone(),
    };

    let knowledge = build_knowledge(&world, &blueprint, &ground_truth);

    Ok(Scenario {
        title: blueprint.title.trim().to_string(),
        setting: blueprint.setting.trim().to_string(),
        opening_narration: blueprint.opening_narration.trim().to_string(),
        world,
        player,
        clues: ClueBoard::new(clues),
        ground_truth,
        knowledge,
        red_herrings: blueprint.red_herrings,
    })
}

fn check_narrative(blueprint: &Blueprint) -> Result<(), ScenarioError> {
    if blueprint.title.trim().is_empty() {
        return Err(ScenarioError::Inconsistent("missing title".to_string()));
    }
    if blueprint.opening_narration.trim().is_empty() {
        return Err(ScenarioError::Inconsistent("missing opening narration".to_string()));
    }
    let motive = blueprint.murder.motive.trim();
    if motive.is_empty() || blueprint.murder.method.trim().is_empty() {
        return Err(ScenarioError::Inconsistent("missing motive or method".to_string()));
    }
    if blueprint
        .opening_narration
        .to_lowercase()
        .contains(&motive.to_lowercase())
    {
        return Err(ScenarioError::Inconsistent(
            "opening narration gives away the motive".to_string(),
        ));
    }
    Ok(())
}

/// Social links from personas, made symmetric. An NPC nobody links to is
/// paired with the next NPC in the cast so that news can reach everyone.
fn connect_cast(world: &mut World, npcs: &[CharacterId]) {
    let mut links = Vec::new();
    for &id in npcs {
        let Some(character) = world.character(id) else {
            continue;
        };
        for name in &character.persona.social_connections {
            if let Some(other) = world.find_character(name) {
                if other.id != id && npcs.contains(&other.id) {
                    links.push((id, other.id));
                }
            }
        }
    }
    for (i, &id) in npcs.iter().enumerate() {
        let linked = links.iter().any(|(a, b)| *a == id || *b == id);
        if !linked && npcs.len() > 1 {
            links.push((id, npcs[(i + 1) % npcs.len()]));
        }
    }
    for (a, b) in links {
        if let Some(c) = world.character_mut(a) {
            c.connections.insert(b);
        }
        if let Some(c) = world.character_mut(b) {
            c.connections.insert(a);
        }
    }
}

fn place_clues(
    world: &World,
    blueprint: &Blueprint,
    clue_count: usize,
) -> Result<Vec<Clue>, ScenarioError> {
    let mut clues = Vec::with_capacity(clue_count);

    for entry in &blueprint.clues {
        if clues.len() == clue_count {
            break;
        }
        let difficulty = ClueDifficulty::parse(&entry.difficulty).unwrap_or(ClueDifficulty::Medium);
        let predicate = if let Some(location) = world.find_location(&entry.found_at) {
            DiscoveryPredicate::Location {
                location: location.id,
            }
        } else if let Some(holder) = world
            .find_character(&entry.found_at)
            .filter(|c| c.is_npc() && c.alive)
        {
            match difficulty {
                ClueDifficulty::Easy => DiscoveryPredicate::Character { character: holder.id },
                _ => DiscoveryPredicate::Conversation { character: holder.id },
            }
        } else {
            debug!(clue = %entry.id, "Skipping clue with unknown location or holder");
            continue;
        };

        let keywords = if entry.keywords.is_empty() {
            derive_keywords(&entry.description)
        } else {
            entry.keywords.clone()
        };
        let mut clue = Clue::new(entry.description.trim(), difficulty, predicate).with_keywords(keywords);
        if let Some(target) = entry
            .points_to
            .as_deref()
            .and_then(|name| world.find_character(name))
        {
            clue = clue.pointing_to(target.id);
        }
        clues.push(clue);
    }

    if clues.len() < clue_count {
        return Err(ScenarioError::Inconsistent(format!(
            "only {} of {} clues could be placed",
            clues.len(),
            clue_count
        )));
    }
    Ok(clues)
}

/// At least two clues implicate the killer, and not all of them do.
fn check_clue_chain(clues: &[Clue], killer: CharacterId) -> Result<(), ScenarioError> {
    let pointing = clues.iter().filter(|c| c.points_to == Some(killer)).count();
    if pointing < 2 {
        return Err(ScenarioError::Inconsistent(
            "fewer than two clues implicate the killer".to_string(),
        ));
    }
    if pointing == clues.len() {
        return Err(ScenarioError::Inconsistent(
            "every clue implicates the killer".to_string(),
        ));
    }
    Ok(())
}

fn knowledge_records(knowledge: &KnowledgeBlueprint) -> Vec<MemoryRecord> {
    let mut records = Vec::new();
    let mut push = |text: &str, prefix: &str, tag: &str| {
        let text = text.trim();
        if !text.is_empty() {
            records.push(
                MemoryRecord::new(format!("{prefix}{text}"), 0, MemorySource::InnateSecret)
                    .with_tags([tag]),
            );
        }
    };
    push(&knowledge.alibi, "What I tell people about that night: ", "alibi");
    push(&knowledge.true_whereabouts, "Where I really was: ", "whereabouts");
    for secret in &knowledge.secrets {
        push(secret, "My secret: ", "secret");
    }
    push(&knowledge.attitude, "How I feel about the investigation: ", "attitude");
    push(&knowledge.suspicions, "Who I suspect: ", "suspicion");
    records
}

/// Innate records per NPC. Each record goes to exactly one character.
fn build_knowledge(
    world: &World,
    blueprint: &Blueprint,
    truth: &GroundTruth,
) -> Vec<(CharacterId, MemoryRecord)> {
    let mut knowledge = Vec::new();

    for npc in world.npcs().filter(|c| c.alive) {
        for secret in &npc.persona.secrets {
            knowledge.push((
                npc.id,
                MemoryRecord::new(format!("My secret: {secret}"), 0, MemorySource::InnateSecret)
                    .with_tags(["secret"]),
            ));
        }
        if let Some((_, k)) = blueprint
            .npc_knowledge
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(npc.name()))
        {
            knowledge.extend(knowledge_records(k).into_iter().map(|r| (npc.id, r)));
        }
        if truth.is_killer(npc.id) {
            let victim = world.character_name(truth.victim());
            knowledge.push((
                npc.id,
                MemoryRecord::new(
                    format!(
                        "The truth only I know: I killed {victim}. Method: {}. Motive: {}.",
                        truth.method(),
                        truth.motive()
                    ),
                    0,
                    MemorySource::InnateSecret,
                )
                .with_tags(["murder", "truth"]),
            ));
        }
    }
    knowledge
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{blueprint_for, ScriptedGenerator};
    use crate::world::{sample_cast, sample_manor};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn inputs<'a>(pool: &'a [Persona], locations: &'a [LocationTemplate]) -> ScenarioInputs<'a> {
        ScenarioInputs {
            player_name: "Inspector Vale",
            player_description: "A weary detective from Scotland Yard",
            player_role: PlayerRole::Detective,
            pool,
            locations,
        }
    }

    #[test]
    fn test_select_cast_prefers_victim_hint() {
        let pool = sample_cast();
        let mut rng = StdRng::seed_from_u64(3);
        let cast = select_cast(&pool, 7, PlayerRole::Detective, &mut rng).unwrap();
        assert_eq!(cast.victim.name, "Lord Ashworth");
        assert_eq!(cast.npcs.len(), 7);
        let killer = &cast.npcs[cast.killer.unwrap()];
        assert!(killer.can_be(CharacterRole::Killer));
    }

    #[test]
    fn test_select_cast_player_killer() {
        let pool = sample_cast();
        let mut rng = StdRng::seed_from_u64(3);
        let cast = select_cast(&pool, 5, PlayerRole::Killer, &mut rng).unwrap();
        assert!(cast.killer.is_none());
        assert_eq!(cast.killer_name("Me"), "Me");
    }

    #[test]
    fn test_insufficient_cast() {
        let pool = sample_cast();
        let mut rng = StdRng::seed_from_u64(3);
        let err = select_cast(&pool[..3], 7, PlayerRole::Detective, &mut rng).unwrap_err();
        assert_eq!(err, ScenarioError::InsufficientCast { needed: 8, available: 3 });
    }

    #[test]
    fn test_ground_truth_debug_is_redacted() {
        let truth = GroundTruth {
            killer: CharacterId::new(),
            victim: CharacterId::new(),
            motive: "Revenge for a ruined family".to_string(),
            method: "Arsenic".to_string(),
            time_of_death: String::new(),
            location_of_death: None,
            timeline: vec![],
        };
        let printed = format!("{truth:?}");
        assert!(!printed.contains("Revenge"));
        assert!(!printed.contains("Arsenic"));
    }

    #[test]
    fn test_derive_keywords() {
        assert_eq!(
            derive_keywords("A torn letter about the inheritance, letter signed E."),
            vec!["torn".to_string(), "letter".to_string(), "inheritance".to_string()]
        );
    }

    #[tokio::test]
    async fn test_generate_with_consistent_blueprint() {
        let pool = sample_cast();
        let locations = sample_manor();
        let config = GameConfig::new();
        let generator = ScriptedGenerator::new().with_auto_blueprint();
        let mut rng = StdRng::seed_from_u64(11);

        let scenario = ScenarioGenerator::new(&generator, &config)
            .generate(&inputs(&pool, &locations), &mut rng)
            .await
            .unwrap();

        assert!(!scenario.title.is_empty());
        assert_eq!(scenario.total_clues(), 8);
        let killer = scenario.ground_truth.killer();
        assert_eq!(scenario.world.character(killer).unwrap().role, CharacterRole::Killer);
        let chain = scenario
            .clues
            .clues()
            .iter()
            .filter(|c| c.points_to == Some(killer))
            .count();
        assert!(chain >= 2 && chain < 8);
        assert!(scenario
            .knowledge
            .iter()
            .any(|(owner, r)| *owner == killer && r.tags().contains(&"truth".to_string())));
        let victim = scenario.world.character(scenario.ground_truth.victim()).unwrap();
        assert!(!victim.alive);
    }

    #[tokio::test]
    async fn test_generation_failure_is_reported() {
        let pool = sample_cast();
        let locations = sample_manor();
        let config = GameConfig::new().with_scenario_attempts(2);
        let generator = ScriptedGenerator::new();
        generator.push_failure(
            GenerationPurpose::ScenarioBlueprint,
            GenerationError::Backend("offline".to_string()),
        );
        generator.push_failure(GenerationPurpose::ScenarioBlueprint, GenerationError::Timeout);
        let mut rng = StdRng::seed_from_u64(1);

        let err = ScenarioGenerator::new(&generator, &config)
            .generate(&inputs(&pool, &locations), &mut rng)
            .await
            .unwrap_err();
        assert_eq!(err, ScenarioError::Generation(GenerationError::Timeout));
        assert_eq!(generator.requests_for(GenerationPurpose::ScenarioBlueprint).len(), 2);
    }

    #[tokio::test]
    async fn test_retry_after_inconsistent_blueprint() {
        let pool = sample_cast();
        let locations = sample_manor();
        let config = GameConfig::new();
        let generator = ScriptedGenerator::new().with_auto_blueprint();
        generator.push_text(
            GenerationPurpose::ScenarioBlueprint,
            r#"{"title": "", "opening_narration": "", "murder": {"method": "", "motive": ""}}"#,
        );
        let mut rng = StdRng::seed_from_u64(5);

        let scenario = ScenarioGenerator::new(&generator, &config)
            .generate(&inputs(&pool, &locations), &mut rng)
            .await
            .unwrap();
        assert_eq!(scenario.total_clues(), 8);
        assert_eq!(generator.requests_for(GenerationPurpose::ScenarioBlueprint).len(), 2);
    }

    #[test]
    fn test_narration_must_not_reveal_motive() {
        let brief = ScenarioBrief {
            player: BriefCharacter {
                name: "Vale".to_string(),
                description: String::new(),
                personality: String::new(),
            },
            player_role: PlayerRole::Detective,
            victim: brief_character(&sample_cast()[0]),
            killer: "Eliza Crane".to_string(),
            npcs: vec![],
            locations: vec![],
            clue_count: 8,
        };
        let mut blueprint = blueprint_for(&brief);
        blueprint.opening_narration =
            format!("Everyone knows: {}", blueprint.murder.motive.to_uppercase());
        assert!(matches!(
            check_narrative(&blueprint),
            Err(ScenarioError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_clue_chain_rules() {
        let killer = CharacterId::new();
        let at = DiscoveryPredicate::Location { location: LocationId::new() };
        let clue = |points: bool| {
            let c = Clue::new("x", ClueDifficulty::Easy, at.clone());
            if points {
                c.pointing_to(killer)
            } else {
                c
            }
        };
        assert!(check_clue_chain(&[clue(true), clue(false)], killer).is_err());
        assert!(check_clue_chain(&[clue(true), clue(true)], killer).is_err());
        assert!(check_clue_chain(&[clue(true), clue(true), clue(false)], killer).is_ok());
    }
}
