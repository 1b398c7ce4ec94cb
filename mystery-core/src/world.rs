//! Mystery world types.
//!
//! Contains the cast and the map: character ids and personas, the location
//! graph with occupancy, and a small sample manor used by demos and tests.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for characters (NPCs and the player).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationId(pub Uuid);

impl LocationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from world queries and movement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("Unknown location: {0}")]
    UnknownLocation(String),

    #[error("Unknown character: {0}")]
    UnknownCharacter(String),

    #[error("{to} cannot be reached from {from}")]
    NotAdjacent { from: String, to: String },

    #[error("{0} has not been placed anywhere")]
    Unplaced(String),
}

// ============================================================================
// Characters
// ============================================================================

/// Role a character plays in one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterRole {
    Detective,
    Killer,
    Suspect,
    Witness,
    Victim,
    RedHerring,
}

impl CharacterRole {
    pub fn name(&self) -> &'static str {
        match self {
            CharacterRole::Detective => "detective",
            CharacterRole::Killer => "killer",
            CharacterRole::Suspect => "suspect",
            CharacterRole::Witness => "witness",
            CharacterRole::Victim => "victim",
            CharacterRole::RedHerring => "red herring",
        }
    }
}

impl fmt::Display for CharacterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The role the human chooses at the start of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlayerRole {
    #[default]
    Detective,
    Killer,
}

impl PlayerRole {
    pub fn character_role(&self) -> CharacterRole {
        match self {
            PlayerRole::Detective => CharacterRole::Detective,
            PlayerRole::Killer => CharacterRole::Killer,
        }
    }
}

/// An already-validated character persona, as handed over by the card loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub description: String,
    pub personality: String,
    #[serde(default)]
    pub example_dialogue: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub role_hints: Vec<CharacterRole>,
    #[serde(default)]
    pub secrets: Vec<String>,
    /// Location key or name this character prefers to start in.
    #[serde(default)]
    pub default_location: Option<String>,
    /// Names of characters this one would plausibly gossip with.
    #[serde(default)]
    pub social_connections: Vec<String>,
}

impl Persona {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            personality: String::new(),
            example_dialogue: String::new(),
            tags: Vec::new(),
            role_hints: Vec::new(),
            secrets: Vec::new(),
            default_location: None,
            social_connections: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        self.personality = personality.into();
        self
    }

    pub fn with_example_dialogue(mut self, dialogue: impl Into<String>) -> Self {
        self.example_dialogue = dialogue.into();
        self
    }

    pub fn with_role_hint(mut self, role: CharacterRole) -> Self {
        self.role_hints.push(role);
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secrets.push(secret.into());
        self
    }

    pub fn with_default_location(mut self, location: impl Into<String>) -> Self {
        self.default_location = Some(location.into());
        self
    }

    pub fn with_connection(mut self, name: impl Into<String>) -> Self {
        self.social_connections.push(name.into());
        self
    }

    pub fn can_be(&self, role: CharacterRole) -> bool {
        self.role_hints.contains(&role)
    }

    /// Short description block for prompts. Secrets are not included.
    pub fn prompt_description(&self) -> String {
        let mut parts = vec![format!("Name: {}", self.name)];
        if !self.description.is_empty() {
            parts.push(format!("Description: {}", self.description));
        }
        if !self.personality.is_empty() {
            parts.push(format!("Personality: {}", self.personality));
        }
        parts.join("\n")
    }
}

/// A character taking part in the current game.
///
/// The persona is fixed for the game; location and alive state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub persona: Persona,
    pub role: CharacterRole,
    pub location: Option<LocationId>,
    pub alive: bool,
    pub is_player: bool,
    /// Characters this one shares news with.
    pub connections: HashSet<CharacterId>,
}

impl Character {
    pub fn new(persona: Persona, role: CharacterRole) -> Self {
        Self {
            id: CharacterId::new(),
            persona,
            role,
            location: None,
            alive: true,
            is_player: false,
            connections: HashSet::new(),
        }
    }

    /// Build the player's own character.
    pub fn player(name: impl Into<String>, description: impl Into<String>, role: PlayerRole) -> Self {
        let name = name.into();
        let mut description = description.into();
        if description.trim().is_empty() {
            description = format!("A {} drawn into the mystery.", role.character_role());
        }
        let persona = Persona::new(name)
            .with_description(description)
            .with_personality("Determined, observant");
        let mut character = Self::new(persona, role.character_role());
        character.is_player = true;
        character
    }

    pub fn name(&self) -> &str {
        &self.persona.name
    }

    pub fn is_npc(&self) -> bool {
        !self.is_player
    }
}

// ============================================================================
// Locations
// ============================================================================

/// A location definition from the location pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationTemplate {
    pub key: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub connected_to: Vec<String>,
}

impl LocationTemplate {
    pub fn new(key: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            description: description.into(),
            connected_to: Vec::new(),
        }
    }

    pub fn connected_to(mut self, keys: &[&str]) -> Self {
        self.connected_to.extend(keys.iter().map(|k| k.to_string()));
        self
    }
}

/// A location in the game world with its current occupants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub key: String,
    pub name: String,
    pub description: String,
    pub neighbors: Vec<LocationId>,
    pub occupants: Vec<CharacterId>,
}

impl Location {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: LocationId::new(),
            key: key.into(),
            name: name.into(),
            description: String::new(),
            neighbors: Vec::new(),
            occupants: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        self.key.eq_ignore_ascii_case(query)
            || self.name.eq_ignore_ascii_case(query)
            || self.id.to_string() == query
    }
}

// ============================================================================
// World
// ============================================================================

/// The map and the cast.
///
/// The location graph is undirected: connecting `a` to `b` also connects `b`
/// to `a`. Occupancy is kept in sync with each character's `location`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct World {
    locations: Vec<Location>,
    location_index: HashMap<LocationId, usize>,
    characters: HashMap<CharacterId, Character>,
    roster: Vec<CharacterId>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the map from a location pool, resolving connections by key.
    pub fn from_templates(templates: &[LocationTemplate]) -> Result<Self, WorldError> {
        let mut world = Self::new();
        let mut by_key = HashMap::new();
        for template in templates {
            let location = Location::new(&template.key, &template.name)
                .with_description(&template.description);
            let id = world.add_location(location);
            by_key.insert(template.key.to_lowercase(), id);
        }
        for template in templates {
            let from = by_key[&template.key.to_lowercase()];
            for key in &template.connected_to {
                let to = by_key
                    .get(&key.to_lowercase())
                    .copied()
                    .ok_or_else(|| WorldError::UnknownLocation(key.clone()))?;
                world.connect(from, to);
            }
        }
        Ok(world)
    }

    pub fn add_location(&mut self, location: Location) -> LocationId {
        let id = location.id;
        self.location_index.insert(id, self.locations.len());
        self.locations.push(location);
        id
    }

    /// Connect two locations in both directions.
    pub fn connect(&mut self, a: LocationId, b: LocationId) {
        if a == b {
            return;
        }
        for (from, to) in [(a, b), (b, a)] {
            if let Some(location) = self.location_mut(from) {
                if !location.neighbors.contains(&to) {
                    location.neighbors.push(to);
                }
            }
        }
    }

    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.location_index.get(&id).map(|&i| &self.locations[i])
    }

    fn location_mut(&mut self, id: LocationId) -> Option<&mut Location> {
        self.location_index
            .get(&id)
            .copied()
            .map(move |i| &mut self.locations[i])
    }

    /// All locations in definition order.
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Find a location by key, name or id string (case-insensitive).
    pub fn find_location(&self, query: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.matches(query))
    }

    /// Locations directly reachable from `id`.
    pub fn neighbors(&self, id: LocationId) -> Vec<&Location> {
        self.location(id)
            .map(|l| l.neighbors.iter().filter_map(|n| self.location(*n)).collect())
            .unwrap_or_default()
    }

    pub fn is_adjacent(&self, from: LocationId, to: LocationId) -> bool {
        self.location(from)
            .map(|l| l.neighbors.contains(&to))
            .unwrap_or(false)
    }

    /// Characters currently at a location, in arrival order.
    pub fn occupants(&self, id: LocationId) -> Vec<&Character> {
        self.location(id)
            .map(|l| {
                l.occupants
                    .iter()
                    .filter_map(|c| self.characters.get(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Living NPCs at a location.
    pub fn living_npcs_at(&self, id: LocationId) -> Vec<CharacterId> {
        self.occupants(id)
            .into_iter()
            .filter(|c| c.alive && c.is_npc())
            .map(|c| c.id)
            .collect()
    }

    pub fn add_character(&mut self, character: Character) -> CharacterId {
        let id = character.id;
        self.roster.push(id);
        self.characters.insert(id, character);
        id
    }

    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(&id)
    }

    pub fn character_mut(&mut self, id: CharacterId) -> Option<&mut Character> {
        self.characters.get_mut(&id)
    }

    /// All characters in the order they joined the cast.
    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.roster.iter().filter_map(|id| self.characters.get(id))
    }

    pub fn npcs(&self) -> impl Iterator<Item = &Character> {
        self.characters().filter(|c| c.is_npc())
    }

    pub fn player(&self) -> Option<&Character> {
        self.characters().find(|c| c.is_player)
    }

    /// Find a character by name (case-insensitive) or id string.
    pub fn find_character(&self, query: &str) -> Option<&Character> {
        let query = query.trim();
        self.characters()
            .find(|c| c.name().eq_ignore_ascii_case(query) || c.id.to_string() == query)
    }

    pub fn location_of(&self, id: CharacterId) -> Option<LocationId> {
        self.characters.get(&id).and_then(|c| c.location)
    }

    /// Put a character somewhere, ignoring adjacency.
    pub fn place(&mut self, character: CharacterId, target: LocationId) -> Result<(), WorldError> {
        if self.location(target).is_none() {
            return Err(WorldError::UnknownLocation(target.to_string()));
        }
        let previous = self
            .characters
            .get(&character)
            .ok_or_else(|| WorldError::UnknownCharacter(character.to_string()))?
            .location;

        if let Some(previous) = previous {
            if let Some(location) = self.location_mut(previous) {
                location.occupants.retain(|c| *c != character);
            }
        }
        if let Some(location) = self.location_mut(target) {
            location.occupants.push(character);
        }
        if let Some(c) = self.characters.get_mut(&character) {
            c.location = Some(target);
        }
        Ok(())
    }

    /// Move a character to an adjacent location. Returns where they came from.
    pub fn move_character(
        &mut self,
        character: CharacterId,
        target: LocationId,
    ) -> Result<LocationId, WorldError> {
        let name = self
            .character(character)
            .map(|c| c.name().to_string())
            .ok_or_else(|| WorldError::UnknownCharacter(character.to_string()))?;
        let from = self
            .location_of(character)
            .ok_or_else(|| WorldError::Unplaced(name))?;
        if !self.is_adjacent(from, target) {
            return Err(WorldError::NotAdjacent {
                from: self.location_name(from).to_string(),
                to: self
                    .location(target)
                    .map(|l| l.name.clone())
                    .unwrap_or_else(|| target.to_string()),
            });
        }
        self.place(character, target)?;
        Ok(from)
    }

    pub fn location_name(&self, id: LocationId) -> &str {
        self.location(id).map(|l| l.name.as_str()).unwrap_or("somewhere")
    }

    pub fn character_name(&self, id: CharacterId) -> &str {
        self.character(id).map(|c| c.name()).unwrap_or("someone")
    }
}

// ============================================================================
// Sample data
// ============================================================================

/// A small country manor. Used by the demo and by tests.
pub fn sample_manor() -> Vec<LocationTemplate> {
    vec![
        LocationTemplate::new(
            "foyer",
            "Grand Foyer",
            "A marble entrance hall beneath a dripping chandelier.",
        )
        .connected_to(&["library", "dining_room", "garden"]),
        LocationTemplate::new(
            "library",
            "Library",
            "Floor-to-ceiling shelves and a cold fireplace.",
        )
        .connected_to(&["study"]),
        LocationTemplate::new(
            "study",
            "Study",
            "The late host's private study, papers strewn across the desk.",
        ),
        LocationTemplate::new(
            "dining_room",
            "Dining Room",
            "A long table still set for a dinner nobody finished.",
        )
        .connected_to(&["kitchen"]),
        LocationTemplate::new(
            "kitchen",
            "Kitchen",
            "Copper pots, a locked pantry and the smell of burnt sugar.",
        )
        .connected_to(&["garden"]),
        LocationTemplate::new(
            "garden",
            "Rose Garden",
            "Overgrown hedges and a greenhouse with a cracked pane.",
        ),
    ]
}

/// A cast of eight personas for the sample manor.
pub fn sample_cast() -> Vec<Persona> {
    vec![
        Persona::new("Lord Ashworth")
            .with_description("The ageing master of the manor, wealthy and feared.")
            .with_personality("Imperious, secretive")
            .with_role_hint(CharacterRole::Victim)
            .with_default_location("study"),
        Persona::new("Margaret Hale")
            .with_description("The housekeeper of thirty years.")
            .with_personality("Loyal, observant, sharp-tongued")
            .with_role_hint(CharacterRole::Witness)
            .with_secret("She has been skimming from the household accounts.")
            .with_default_location("kitchen")
            .with_connection("Thomas Reed")
            .with_connection("Eliza Crane"),
        Persona::new("Thomas Reed")
            .with_description("The young groundskeeper.")
            .with_personality("Nervous, honest")
            .with_role_hint(CharacterRole::Witness)
            .with_role_hint(CharacterRole::Suspect)
            .with_secret("He was meeting someone in the greenhouse that night.")
            .with_default_location("garden")
            .with_connection("Margaret Hale"),
        Persona::new("Eliza Crane")
            .with_description("Lord Ashworth's niece and presumed heir.")
            .with_personality("Charming, calculating")
            .with_role_hint(CharacterRole::Suspect)
            .with_role_hint(CharacterRole::Killer)
            .with_secret("She is deeply in debt to a London moneylender.")
            .with_default_location("library")
            .with_connection("Dr. Felix Marsh"),
        Persona::new("Dr. Felix Marsh")
            .with_description("The family physician, a guest for the weekend.")
            .with_personality("Precise, evasive")
            .with_role_hint(CharacterRole::Suspect)
            .with_role_hint(CharacterRole::Killer)
            .with_secret("He prescribed Lord Ashworth a sedative he should not have.")
            .with_default_location("dining_room")
            .with_connection("Eliza Crane")
            .with_connection("Colonel Briggs"),
        Persona::new("Colonel Briggs")
            .with_description("An old army friend of the host.")
            .with_personality("Blustering, proud")
            .with_role_hint(CharacterRole::RedHerring)
            .with_role_hint(CharacterRole::Suspect)
            .with_secret("He owes Lord Ashworth a great deal of money.")
            .with_default_location("foyer")
            .with_connection("Dr. Felix Marsh"),
        Persona::new("Sophie Lang")
            .with_description("A journalist who talked her way into the party.")
            .with_personality("Curious, reckless")
            .with_role_hint(CharacterRole::Witness)
            .with_secret("She is writing an exposé on the Ashworth fortune.")
            .with_default_location("foyer")
            .with_connection("Thomas Reed"),
        Persona::new("Albert Finch")
            .with_description("The butler, impeccable and silent.")
            .with_personality("Formal, watchful")
            .with_role_hint(CharacterRole::Suspect)
            .with_secret("He was dismissed that very afternoon.")
            .with_default_location("dining_room")
            .with_connection("Margaret Hale"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manor() -> World {
        World::from_templates(&sample_manor()).unwrap()
    }

    #[test]
    fn test_graph_is_undirected() {
        let world = manor();
        let foyer = world.find_location("foyer").unwrap().id;
        let library = world.find_location("Library").unwrap().id;
        assert!(world.is_adjacent(foyer, library));
        assert!(world.is_adjacent(library, foyer));
    }

    #[test]
    fn test_neighbors() {
        let world = manor();
        let study = world.find_location("study").unwrap().id;
        let names: Vec<_> = world.neighbors(study).iter().map(|l| l.name.clone()).collect();
        assert_eq!(names, vec!["Library".to_string()]);
    }

    #[test]
    fn test_unknown_connection_rejected() {
        let templates = vec![LocationTemplate::new("hall", "Hall", "").connected_to(&["attic"])];
        assert_eq!(
            World::from_templates(&templates).unwrap_err(),
            WorldError::UnknownLocation("attic".to_string())
        );
    }

    #[test]
    fn test_place_and_move_update_occupancy() {
        let mut world = manor();
        let foyer = world.find_location("foyer").unwrap().id;
        let library = world.find_location("library").unwrap().id;
        let id = world.add_character(Character::new(Persona::new("Albert Finch"), CharacterRole::Suspect));

        world.place(id, foyer).unwrap();
        assert_eq!(world.living_npcs_at(foyer), vec![id]);

        let from = world.move_character(id, library).unwrap();
        assert_eq!(from, foyer);
        assert!(world.occupants(foyer).is_empty());
        assert_eq!(world.location_of(id), Some(library));
    }

    #[test]
    fn test_move_to_non_adjacent_fails() {
        let mut world = manor();
        let foyer = world.find_location("foyer").unwrap().id;
        let study = world.find_location("study").unwrap().id;
        let id = world.add_character(Character::new(Persona::new("Thomas Reed"), CharacterRole::Witness));
        world.place(id, foyer).unwrap();

        let err = world.move_character(id, study).unwrap_err();
        assert!(matches!(err, WorldError::NotAdjacent { .. }));
        assert_eq!(world.location_of(id), Some(foyer));
    }

    #[test]
    fn test_find_character_case_insensitive() {
        let mut world = manor();
        world.add_character(Character::new(Persona::new("Eliza Crane"), CharacterRole::Suspect));
        assert!(world.find_character("eliza crane").is_some());
        assert!(world.find_character("Nobody").is_none());
    }

    #[test]
    fn test_player_character_defaults() {
        let player = Character::player("Inspector Vale", "", PlayerRole::Detective);
        assert!(player.is_player);
        assert_eq!(player.role, CharacterRole::Detective);
        assert!(player.persona.description.contains("detective"));
    }

    #[test]
    fn test_prompt_description_hides_secrets() {
        let persona = sample_cast().remove(1);
        let text = persona.prompt_description();
        assert!(text.contains("Margaret Hale"));
        assert!(!text.contains("skimming"));
    }
}
