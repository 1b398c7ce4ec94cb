//! Clues and discovery.
//!
//! Every clue carries a discovery predicate: it is found by searching a
//! location, by talking to the NPC who holds it, or only by asking that NPC
//! about the right topic. Discovery is deterministic given the action context;
//! any randomness (the conversational roll) is drawn by the caller and passed in.

use crate::memory::similarity;
use crate::world::{CharacterId, LocationId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Relevance floor for clues an NPC will share when asked almost anything.
pub const GENERAL_TESTIMONY_RELEVANCE: f64 = 0.3;

/// Unique identifier for clues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClueId(pub Uuid);

impl ClueId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClueId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClueDifficulty {
    Easy,
    Medium,
    Hard,
}

impl ClueDifficulty {
    /// Searches of the same location needed before a clue of this tier shows up.
    pub fn required_search_depth(&self) -> u32 {
        match self {
            ClueDifficulty::Easy => 1,
            ClueDifficulty::Medium => 2,
            ClueDifficulty::Hard => 3,
        }
    }

    fn reveal_base(&self) -> f64 {
        match self {
            ClueDifficulty::Easy => 0.9,
            ClueDifficulty::Medium => 0.6,
            ClueDifficulty::Hard => 0.35,
        }
    }

    fn relevance_gate(&self) -> f64 {
        match self {
            ClueDifficulty::Easy => 0.0,
            ClueDifficulty::Medium => 0.25,
            ClueDifficulty::Hard => 0.5,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Some(ClueDifficulty::Easy),
            "medium" => Some(ClueDifficulty::Medium),
            "hard" => Some(ClueDifficulty::Hard),
            _ => None,
        }
    }
}

impl fmt::Display for ClueDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClueDifficulty::Easy => "easy",
            ClueDifficulty::Medium => "medium",
            ClueDifficulty::Hard => "hard",
        };
        write!(f, "{name}")
    }
}

/// Chance that a conversation reveals a clue.
///
/// Zero below the tier's relevance gate, otherwise `base(tier) * relevance`.
/// Decreasing in difficulty and non-decreasing in relevance.
pub fn reveal_probability(difficulty: ClueDifficulty, relevance: f64) -> f64 {
    let relevance = relevance.clamp(0.0, 1.0);
    if relevance <= 0.0 || relevance < difficulty.relevance_gate() {
        return 0.0;
    }
    difficulty.reveal_base() * relevance
}

/// The condition under which a clue can be found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DiscoveryPredicate {
    /// Turned up by investigating a location.
    Location { location: LocationId },
    /// Part of an NPC's general testimony.
    Character { character: CharacterId },
    /// Only surfaces when the NPC is asked about the clue's keywords.
    Conversation { character: CharacterId },
}

/// What the player is doing when discovery is attempted.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionContext {
    Investigate {
        turn: u32,
        /// How many times the player has now searched this location, including this search.
        search_depth: u32,
    },
    Talk {
        turn: u32,
        message: String,
        /// Uniform draw in `[0, 1)` from the session RNG.
        roll: f64,
    },
}

impl ActionContext {
    pub fn turn(&self) -> u32 {
        match self {
            ActionContext::Investigate { turn, .. } | ActionContext::Talk { turn, .. } => *turn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clue {
    pub id: ClueId,
    pub description: String,
    pub difficulty: ClueDifficulty,
    pub predicate: DiscoveryPredicate,
    /// The character this clue implicates, if any.
    pub points_to: Option<CharacterId>,
    pub keywords: Vec<String>,
    discovered_turn: Option<u32>,
}

impl Clue {
    pub fn new(
        description: impl Into<String>,
        difficulty: ClueDifficulty,
        predicate: DiscoveryPredicate,
    ) -> Self {
        Self {
            id: ClueId::new(),
            description: description.into(),
            difficulty,
            predicate,
            points_to: None,
            keywords: Vec::new(),
            discovered_turn: None,
        }
    }

    pub fn pointing_to(mut self, character: CharacterId) -> Self {
        self.points_to = Some(character);
        self
    }

    pub fn with_keywords(mut self, keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.keywords.extend(keywords.into_iter().map(Into::into));
        self
    }

    pub fn is_discovered(&self) -> bool {
        self.discovered_turn.is_some()
    }

    pub fn discovered_turn(&self) -> Option<u32> {
        self.discovered_turn
    }

    /// How relevant `message` is to this clue.
    pub fn relevance(&self, message: &str) -> f64 {
        let overlap = similarity::keyword_overlap(message, &self.keywords);
        match self.predicate {
            DiscoveryPredicate::Character { .. } => overlap.max(GENERAL_TESTIMONY_RELEVANCE),
            _ => overlap,
        }
    }

    fn matches(&self, location: LocationId, character: CharacterId, context: &ActionContext) -> bool {
        match (&self.predicate, context) {
            (
                DiscoveryPredicate::Location { location: at },
                ActionContext::Investigate { search_depth, .. },
            ) => *at == location && *search_depth >= self.difficulty.required_search_depth(),
            (
                DiscoveryPredicate::Character { character: holder }
                | DiscoveryPredicate::Conversation { character: holder },
                ActionContext::Talk { message, roll, .. },
            ) => {
                *holder == character
                    && *roll < reveal_probability(self.difficulty, self.relevance(message))
            }
            _ => false,
        }
    }
}

/// The scenario's fixed clue set and what has been found so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClueBoard {
    clues: Vec<Clue>,
}

impl ClueBoard {
    pub fn new(clues: Vec<Clue>) -> Self {
        let clues = clues
            .into_iter()
            .map(|mut c| {
                c.discovered_turn = None;
                c
            })
            .collect();
        Self { clues }
    }

    /// Find at most one undiscovered clue matching this action.
    ///
    /// Clues are checked in definition order and the first match is marked
    /// discovered at the context's turn.
    pub fn attempt_discovery(
        &mut self,
        location: LocationId,
        character: CharacterId,
        context: &ActionContext,
    ) -> Option<Clue> {
        let clue = self
            .clues
            .iter_mut()
            .filter(|c| !c.is_discovered())
            .find(|c| c.matches(location, character, context))?;
        clue.discovered_turn = Some(context.turn());
        Some(clue.clone())
    }

    pub fn clues(&self) -> &[Clue] {
        &self.clues
    }

    pub fn discovered(&self) -> impl Iterator<Item = &Clue> {
        self.clues.iter().filter(|c| c.is_discovered())
    }

    pub fn discovered_count(&self) -> usize {
        self.discovered().count()
    }

    pub fn total(&self) -> usize {
        self.clues.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn investigate(turn: u32, depth: u32) -> ActionContext {
        ActionContext::Investigate {
            turn,
            search_depth: depth,
        }
    }

    fn talk(message: &str, roll: f64) -> ActionContext {
        ActionContext::Talk {
            turn: 2,
            message: message.to_string(),
            roll,
        }
    }

    #[test]
    fn test_reveal_probability_is_monotonic() {
        for relevance in [0.0, 0.2, 0.3, 0.5, 0.8, 1.0] {
            let easy = reveal_probability(ClueDifficulty::Easy, relevance);
            let medium = reveal_probability(ClueDifficulty::Medium, relevance);
            let hard = reveal_probability(ClueDifficulty::Hard, relevance);
            assert!(easy >= medium && medium >= hard);
        }
        let mut last = 0.0;
        for relevance in [0.0, 0.1, 0.25, 0.5, 0.75, 1.0] {
            let p = reveal_probability(ClueDifficulty::Medium, relevance);
            assert!(p >= last);
            last = p;
        }
        assert_eq!(reveal_probability(ClueDifficulty::Hard, 0.4), 0.0);
        assert_eq!(reveal_probability(ClueDifficulty::Easy, 0.0), 0.0);
    }

    #[test]
    fn test_location_clue_respects_search_depth() {
        let study = LocationId::new();
        let player = CharacterId::new();
        let mut board = ClueBoard::new(vec![
            Clue::new("A torn letter", ClueDifficulty::Medium, DiscoveryPredicate::Location { location: study }),
            Clue::new("Ink stains", ClueDifficulty::Easy, DiscoveryPredicate::Location { location: study }),
        ]);

        let first = board.attempt_discovery(study, player, &investigate(1, 1)).unwrap();
        assert_eq!(first.description, "Ink stains");
        assert_eq!(first.discovered_turn(), Some(1));

        let second = board.attempt_discovery(study, player, &investigate(2, 2)).unwrap();
        assert_eq!(second.description, "A torn letter");
        assert!(board.attempt_discovery(study, player, &investigate(3, 3)).is_none());
        assert_eq!(board.discovered_count(), 2);
    }

    #[test]
    fn test_at_most_one_per_attempt_in_definition_order() {
        let hall = LocationId::new();
        let player = CharacterId::new();
        let mut board = ClueBoard::new(vec![
            Clue::new("Footprints", ClueDifficulty::Easy, DiscoveryPredicate::Location { location: hall }),
            Clue::new("A button", ClueDifficulty::Easy, DiscoveryPredicate::Location { location: hall }),
        ]);
        let found = board.attempt_discovery(hall, player, &investigate(1, 1)).unwrap();
        assert_eq!(found.description, "Footprints");
        assert_eq!(board.discovered_count(), 1);
    }

    #[test]
    fn test_discovery_is_deterministic() {
        let hall = LocationId::new();
        let player = CharacterId::new();
        let clues = vec![
            Clue::new("Footprints", ClueDifficulty::Easy, DiscoveryPredicate::Location { location: hall }),
            Clue::new("A button", ClueDifficulty::Hard, DiscoveryPredicate::Location { location: hall }),
        ];
        let mut a = ClueBoard::new(clues.clone());
        let mut b = ClueBoard::new(clues);
        for depth in 1..=4 {
            let x = a.attempt_discovery(hall, player, &investigate(depth, depth)).map(|c| c.id);
            let y = b.attempt_discovery(hall, player, &investigate(depth, depth)).map(|c| c.id);
            assert_eq!(x, y);
        }
    }

    #[test]
    fn test_wrong_location_finds_nothing() {
        let hall = LocationId::new();
        let mut board = ClueBoard::new(vec![Clue::new(
            "Footprints",
            ClueDifficulty::Easy,
            DiscoveryPredicate::Location { location: hall },
        )]);
        assert!(board
            .attempt_discovery(LocationId::new(), CharacterId::new(), &investigate(1, 5))
            .is_none());
    }

    #[test]
    fn test_conversation_clue_needs_keywords() {
        let cook = CharacterId::new();
        let mut board = ClueBoard::new(vec![Clue::new(
            "The cook saw someone take rat poison",
            ClueDifficulty::Hard,
            DiscoveryPredicate::Conversation { character: cook },
        )
        .with_keywords(["poison", "pantry"])]);

        assert!(board.attempt_discovery(LocationId::new(), cook, &talk("How was dinner?", 0.0)).is_none());
        assert!(board
            .attempt_discovery(LocationId::new(), CharacterId::new(), &talk("Who took the poison from the pantry?", 0.0))
            .is_none());
        let found = board.attempt_discovery(LocationId::new(), cook, &talk("Who took the poison from the pantry?", 0.1));
        assert!(found.is_some());
    }

    #[test]
    fn test_general_testimony_has_relevance_floor() {
        let maid = CharacterId::new();
        let clue = Clue::new(
            "The maid heard an argument",
            ClueDifficulty::Easy,
            DiscoveryPredicate::Character { character: maid },
        )
        .with_keywords(["argument"]);
        assert_eq!(clue.relevance("Good evening"), GENERAL_TESTIMONY_RELEVANCE);
        assert_eq!(clue.relevance("Was there an argument?"), 1.0);
    }

    #[test]
    fn test_talk_roll_threshold() {
        let maid = CharacterId::new();
        let mut board = ClueBoard::new(vec![Clue::new(
            "The maid heard an argument",
            ClueDifficulty::Easy,
            DiscoveryPredicate::Character { character: maid },
        )]);
        // Floor relevance 0.3 on an easy clue gives p = 0.27.
        assert!(board.attempt_discovery(LocationId::new(), maid, &talk("Hello", 0.5)).is_none());
        assert!(board.attempt_discovery(LocationId::new(), maid, &talk("Hello", 0.2)).is_some());
        assert!(board.clues()[0].is_discovered());
    }
}
