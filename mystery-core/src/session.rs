//! The live game session.
//!
//! One session holds at most one game. Every mutating operation takes the
//! session lock for its whole duration, including the text-generation round
//! trips inside it, so no two mutations ever interleave. Reads go through a
//! watch channel that is refreshed after each mutation and never take the lock.

use crate::config::GameConfig;
use crate::engine::{
    ActionResponse, Game, GameError, PlayerAction, PlayerProfile, ScenarioIntro,
    StateSnapshot,
};
use crate::generation::TextGenerator;
use crate::world::{LocationTemplate, Persona};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::info;

/// Cloneable handle to the single live game.
#[derive(Clone)]
pub struct GameSession {
    game: Arc<Mutex<Option<Game>>>,
    snapshots: Arc<watch::Sender<StateSnapshot>>,
    generator: Arc<dyn TextGenerator>,
    config: GameConfig,
}

impl GameSession {
    pub fn new(generator: Arc<dyn TextGenerator>, config: GameConfig) -> Self {
        let (tx, _rx) = watch::channel(StateSnapshot::empty(config.max_turns));
        Self {
            game: Arc::new(Mutex::new(None)),
            snapshots: Arc::new(tx),
            generator,
            config,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Latest published state. Never waits on an action in flight.
    pub fn snapshot(&self) -> StateSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receive a fresh snapshot after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.snapshots.subscribe()
    }

    /// Start a new game in setup, replacing any existing one.
    pub async fn create(&self, profile: PlayerProfile) -> StateSnapshot {
        let mut slot = self.game.lock().await;
        let game = Game::new(self.generator.clone(), self.config.clone(), profile);
        let snapshot = game.snapshot();
        if slot.replace(game).is_some() {
            info!("Previous game discarded");
        }
        self.snapshots.send_replace(snapshot.clone());
        snapshot
    }

    /// Generate the mystery for the game in setup.
    pub async fn generate_scenario(
        &self,
        pool: &[Persona],
        locations: &[LocationTemplate],
    ) -> Result<ScenarioIntro, GameError> {
        let mut slot = self.game.lock().await;
        let game = slot.as_mut().ok_or_else(no_game)?;
        let intro = game.generate_scenario(pool, locations).await?;
        self.snapshots.send_replace(intro.snapshot.clone());
        Ok(intro)
    }

    /// Create and generate in one step. The previous game, if any, is only
    /// replaced once the new mystery exists.
    pub async fn new_game(
        &self,
        profile: PlayerProfile,
        pool: &[Persona],
        locations: &[LocationTemplate],
    ) -> Result<ScenarioIntro, GameError> {
        let mut slot = self.game.lock().await;
        let (game, intro) = Game::new_game(
            self.generator.clone(),
            self.config.clone(),
            profile,
            pool,
            locations,
        )
        .await?;
        *slot = Some(game);
        self.snapshots.send_replace(intro.snapshot.clone());
        Ok(intro)
    }

    /// Drop the current game.
    pub async fn end(&self) {
        let mut slot = self.game.lock().await;
        *slot = None;
        self.snapshots
            .send_replace(StateSnapshot::empty(self.config.max_turns));
    }

    pub async fn act(&self, action: PlayerAction) -> Result<ActionResponse, GameError> {
        let mut slot = self.game.lock().await;
        let game = slot.as_mut().ok_or_else(no_game)?;
        let result = game.act(action).await;
        self.snapshots.send_replace(game.snapshot());
        result
    }

    pub async fn move_to(&self, destination: &str) -> Result<ActionResponse, GameError> {
        self.act(PlayerAction::Move {
            to: destination.to_string(),
        })
        .await
    }

    pub async fn talk(&self, character: &str, message: &str) -> Result<ActionResponse, GameError> {
        self.act(PlayerAction::Talk {
            character: character.to_string(),
            message: message.to_string(),
        })
        .await
    }

    pub async fn investigate(&self) -> Result<ActionResponse, GameError> {
        self.act(PlayerAction::Investigate).await
    }

    pub async fn wait(&self) -> Result<ActionResponse, GameError> {
        self.act(PlayerAction::Wait).await
    }

    pub async fn accuse(&self, suspect: &str) -> Result<ActionResponse, GameError> {
        self.accuse_with_reasoning(suspect, None).await
    }

    pub async fn accuse_with_reasoning(
        &self,
        suspect: &str,
        reasoning: Option<&str>,
    ) -> Result<ActionResponse, GameError> {
        self.act(PlayerAction::Accuse {
            suspect: suspect.to_string(),
            reasoning: reasoning.map(str::to_string),
        })
        .await
    }
}

fn no_game() -> GameError {
    GameError::InvalidSessionState("no game in progress".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GamePhase;
    use crate::testing::ScriptedGenerator;
    use crate::world::{sample_cast, sample_manor, PlayerRole};
    use std::time::Duration;

    fn session(generator: Arc<ScriptedGenerator>) -> GameSession {
        GameSession::new(
            generator,
            GameConfig::new().with_seed(9).with_npc_move_probability(0.0),
        )
    }

    #[tokio::test]
    async fn test_actions_without_game_are_rejected() {
        let session = session(Arc::new(ScriptedGenerator::new()));
        assert!(matches!(session.wait().await, Err(GameError::InvalidSessionState(_))));
        assert!(matches!(session.accuse("x").await, Err(GameError::InvalidSessionState(_))));
        assert_eq!(session.snapshot().phase, GamePhase::Setup);
    }

    #[tokio::test]
    async fn test_create_then_generate() {
        let session = session(Arc::new(ScriptedGenerator::new().with_auto_blueprint()));
        let snapshot = session
            .create(PlayerProfile::new("Inspector Vale", PlayerRole::Detective))
            .await;
        assert_eq!(snapshot.player_name.as_deref(), Some("Inspector Vale"));

        let intro = session
            .generate_scenario(&sample_cast(), &sample_manor())
            .await
            .unwrap();
        assert_eq!(session.snapshot().phase, GamePhase::Active);
        assert_eq!(session.snapshot().title, Some(intro.title));
    }

    #[tokio::test]
    async fn test_failed_new_game_keeps_previous_game() {
        let generator = Arc::new(ScriptedGenerator::new().with_auto_blueprint());
        let session = session(generator.clone());
        session
            .new_game(
                PlayerProfile::new("Inspector Vale", PlayerRole::Detective),
                &sample_cast(),
                &sample_manor(),
            )
            .await
            .unwrap();
        session.wait().await.unwrap();

        let err = session
            .new_game(
                PlayerProfile::new("Someone Else", PlayerRole::Detective),
                &sample_cast()[..2],
                &sample_manor(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::ScenarioGenerationFailure(_)));
        assert_eq!(session.snapshot().turn, 1);
        assert_eq!(session.snapshot().player_name.as_deref(), Some("Inspector Vale"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reads_do_not_wait_for_actions() {
        let generator = Arc::new(ScriptedGenerator::new().with_auto_blueprint());
        let session = session(generator.clone());
        session
            .new_game(
                PlayerProfile::new("Inspector Vale", PlayerRole::Detective),
                &sample_cast(),
                &sample_manor(),
            )
            .await
            .unwrap();
        let npc = session
            .snapshot()
            .characters_present
            .into_iter()
            .find(|c| c.alive)
            .unwrap()
            .name;
        generator.push_delayed_text(
            crate::generation::GenerationPurpose::NpcDialogue,
            Duration::from_secs(10),
            "At last, you ask.",
        );

        let talking = {
            let session = session.clone();
            tokio::spawn(async move { session.talk(&npc, "What happened?").await })
        };
        tokio::task::yield_now().await;
        assert_eq!(session.snapshot().turn, 0);

        let response = talking.await.unwrap().unwrap();
        assert_eq!(response.snapshot.turn, 1);
        assert_eq!(session.snapshot().turn, 1);
    }

    #[tokio::test]
    async fn test_concurrent_actions_are_serialized() {
        let session = session(Arc::new(ScriptedGenerator::new().with_auto_blueprint()));
        session
            .new_game(
                PlayerProfile::new("Inspector Vale", PlayerRole::Detective),
                &sample_cast(),
                &sample_manor(),
            )
            .await
            .unwrap();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let session = session.clone();
                tokio::spawn(async move { session.wait().await })
            })
            .collect();
        let mut turns = Vec::new();
        for handle in handles {
            turns.push(handle.await.unwrap().unwrap().snapshot.turn);
        }
        turns.sort();
        assert_eq!(turns, vec![1, 2, 3, 4, 5]);
    }
}
