//! Game configuration.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// How news of public events spreads between connected NPCs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropagationPolicy {
    /// Turns between an event and a connected NPC hearing about it.
    pub delay_turns: u32,
    /// Chance that a given connected NPC hears about a given event at all.
    pub probability: f64,
}

impl Default for PropagationPolicy {
    fn default() -> Self {
        Self {
            delay_turns: 1,
            probability: 0.6,
        }
    }
}

/// Configuration for one game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Turn limit. Reaching it ends the game with the killer escaping.
    pub max_turns: u32,

    /// Number of clues each scenario must define.
    pub clue_count: usize,

    /// Number of NPCs in the cast, not counting the victim.
    pub npc_count: usize,

    /// Memory records retrieved per dialogue turn.
    pub memory_top_k: usize,

    /// Messages of conversation history kept per NPC.
    pub history_window: usize,

    /// Upper bound on a single text-generation call.
    #[serde(with = "duration_secs")]
    pub generation_timeout: Duration,

    /// Attempts at building a consistent scenario before giving up.
    pub scenario_attempts: u32,

    /// Ask the generator what each NPC does after every player action.
    /// When off, or when an answer is unusable, NPCs only wander at random.
    pub npc_actions: bool,

    /// Chance that an NPC with no usable generated action wanders to a
    /// neighbouring room each turn.
    pub npc_move_probability: f64,

    pub propagation: PropagationPolicy,

    /// Seed for the session RNG. `None` seeds from entropy.
    pub seed: Option<u64>,

    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl GameConfig {
    pub fn new() -> Self {
        Self {
            max_turns: 30,
            clue_count: 8,
            npc_count: 7,
            memory_top_k: 5,
            history_window: 10,
            generation_timeout: Duration::from_secs(60),
            scenario_attempts: 2,
            npc_actions: true,
            npc_move_probability: 0.25,
            propagation: PropagationPolicy::default(),
            seed: None,
            model: None,
            temperature: Some(0.8),
        }
    }

    /// Defaults overridden by `MYSTERY_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(v) = env_value::<u32>("MYSTERY_MAX_TURNS") {
            config.max_turns = v.max(1);
        }
        if let Some(v) = env_value("MYSTERY_CLUE_COUNT") {
            config.clue_count = v;
        }
        if let Some(v) = env_value("MYSTERY_NPC_COUNT") {
            config.npc_count = v;
        }
        if let Some(v) = env_value("MYSTERY_SEED") {
            config.seed = Some(v);
        }
        if let Some(v) = env_value("MYSTERY_NPC_ACTIONS") {
            config.npc_actions = v;
        }
        if let Some(secs) = env_value::<u64>("MYSTERY_GENERATION_TIMEOUT_SECS") {
            config.generation_timeout = Duration::from_secs(secs);
        }
        if let Ok(model) = std::env::var("MYSTERY_MODEL") {
            if !model.trim().is_empty() {
                config.model = Some(model);
            }
        }
        config
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn with_clue_count(mut self, clue_count: usize) -> Self {
        self.clue_count = clue_count;
        self
    }

    pub fn with_npc_count(mut self, npc_count: usize) -> Self {
        self.npc_count = npc_count;
        self
    }

    pub fn with_memory_top_k(mut self, k: usize) -> Self {
        self.memory_top_k = k;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn with_scenario_attempts(mut self, attempts: u32) -> Self {
        self.scenario_attempts = attempts.max(1);
        self
    }

    pub fn with_npc_actions(mut self, enabled: bool) -> Self {
        self.npc_actions = enabled;
        self
    }

    pub fn with_npc_move_probability(mut self, probability: f64) -> Self {
        self.npc_move_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn with_propagation(mut self, delay_turns: u32, probability: f64) -> Self {
        self.propagation = PropagationPolicy {
            delay_turns,
            probability: probability.clamp(0.0, 1.0),
        };
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable config override");
            None
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
