//! Murder mystery game engine with AI-driven NPCs.
//!
//! This crate provides:
//! - Procedural mystery generation over a fixed map and character pool
//! - Per-NPC memory partitions that only social propagation can cross
//! - Tiered clue discovery through search and conversation
//! - A turn-limited game state machine with a single live session
//!
//! # Quick Start
//!
//! ```ignore
//! use mystery_core::{
//!     sample_cast, sample_manor, ClaudeGenerator, GameConfig, GameSession, PlayerProfile,
//!     PlayerRole,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = GameSession::new(Arc::new(ClaudeGenerator::from_env()?), GameConfig::from_env());
//!
//!     let intro = session
//!         .new_game(
//!             PlayerProfile::new("Inspector Vale", PlayerRole::Detective),
//!             &sample_cast(),
//!             &sample_manor(),
//!         )
//!         .await?;
//!     println!("{}", intro.opening_narration);
//!
//!     let response = session.talk("Margaret Hale", "Where were you after dinner?").await?;
//!     println!("{}", response.response);
//!     Ok(())
//! }
//! ```

pub mod clues;
pub mod config;
pub mod dialogue;
pub mod engine;
pub mod events;
pub mod generation;
pub mod memory;
pub mod npc_actions;
pub mod propagation;
pub mod scenario;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod world;

// Primary public API
pub use config::{GameConfig, PropagationPolicy};
pub use engine::{
    evaluate_accusation, AccusationResult, ActionResponse, Game, GameError, GamePhase, Outcome,
    PlayerAction, PlayerProfile, ScenarioIntro, StateSnapshot,
};
pub use generation::{ClaudeGenerator, GenerationError, GenerationRequest, TextGenerator};
pub use session::GameSession;
#[cfg(any(test, feature = "testing"))]
pub use testing::{ScriptedGenerator, TestHarness};
pub use world::{sample_cast, sample_manor, CharacterRole, LocationTemplate, Persona, PlayerRole};
