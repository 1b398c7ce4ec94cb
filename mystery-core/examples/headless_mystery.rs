//! Play a short mystery from the terminal without a UI.
//!
//! Uses the Claude API when ANTHROPIC_API_KEY is set, otherwise a scripted
//! generator so the game runs offline.
//!
//! Run with: `RUST_LOG=mystery_core=debug cargo run -p mystery-core --example headless_mystery`

use mystery_core::generation::{GenerationPurpose, TextGenerator};
use mystery_core::{
    sample_cast, sample_manor, ClaudeGenerator, GameConfig, GameSession, PlayerProfile, PlayerRole,
    ScriptedGenerator, StateSnapshot,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn print_state(snapshot: &StateSnapshot) {
    let here = snapshot
        .current_location
        .as_ref()
        .map(|l| l.name.as_str())
        .unwrap_or("nowhere");
    let exits: Vec<&str> = snapshot.adjacent_locations.iter().map(|l| l.name.as_str()).collect();
    let present: Vec<&str> = snapshot
        .characters_present
        .iter()
        .filter(|c| c.alive)
        .map(|c| c.name.as_str())
        .collect();
    println!(
        "   [turn {}/{}] {} | exits: {} | here: {} | clues {}/{}",
        snapshot.turn,
        snapshot.max_turns,
        here,
        exits.join(", "),
        present.join(", "),
        snapshot.clues_found,
        snapshot.total_clues
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mystery_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    let _ = dotenvy::dotenv();

    let config = GameConfig::from_env().with_max_turns(8);
    let generator: Arc<dyn TextGenerator> = match ClaudeGenerator::from_config(&config) {
        Ok(generator) => {
            tracing::info!(model = generator.model(), "Using Claude");
            Arc::new(generator)
        }
        Err(e) => {
            tracing::info!(reason = %e, "No API access, using scripted generator");
            Arc::new(
                ScriptedGenerator::new()
                    .with_auto_blueprint()
                    .with_default(
                        GenerationPurpose::NpcDialogue,
                        "I have told you everything I know, Inspector.",
                    ),
            )
        }
    };

    let session = GameSession::new(generator, config);
    let intro = session
        .new_game(
            PlayerProfile::new("Inspector Vale", PlayerRole::Detective)
                .with_description("A patient investigator from the county police."),
            &sample_cast(),
            &sample_manor(),
        )
        .await?;

    println!("=== {} ===\n", intro.title);
    println!("{}\n", intro.opening_narration);
    print_state(&intro.snapshot);

    println!("\n> investigate");
    let response = session.investigate().await?;
    println!("{}", response.response);
    print_state(&response.snapshot);

    let witness = session
        .snapshot()
        .characters_present
        .into_iter()
        .find(|c| c.alive)
        .map(|c| c.name);
    if let Some(witness) = witness {
        println!("\n> talk {witness}");
        let response = session
            .talk(&witness, "Did you hear any argument after dinner?")
            .await?;
        println!("{}", response.response);
        print_state(&response.snapshot);
    }

    let exit = session
        .snapshot()
        .adjacent_locations
        .first()
        .map(|l| l.name.clone());
    if let Some(exit) = exit {
        println!("\n> move {exit}");
        let response = session.move_to(&exit).await?;
        println!("{}", response.response);
        for event in &response.events {
            println!("   * {}", event.description);
        }
        print_state(&response.snapshot);

        println!("\n> investigate");
        let response = session.investigate().await?;
        println!("{}", response.response);
        print_state(&response.snapshot);
    }

    let suspect = session
        .snapshot()
        .npcs
        .iter()
        .find(|c| c.alive)
        .map(|c| c.name.clone())
        .ok_or("nobody left to accuse")?;
    println!("\n> accuse {suspect}");
    let response = session
        .accuse_with_reasoning(&suspect, Some("Their story about the evening never held together."))
        .await?;
    for event in &response.events {
        println!("   * {}", event.description);
    }
    let result = response.resolution.ok_or("the accusation did not end the game")?;
    println!("\n=== {:?} ===", result.outcome);
    println!("The killer was {}.", result.true_killer);
    println!(
        "Turns: {} | Clues: {}/{}\n",
        result.turns_taken, result.clues_found, result.total_clues
    );
    println!("{}", result.narrative);
    Ok(())
}
