//! QA tests for NPC information isolation.
//!
//! These tests verify that each NPC only knows what reached them:
//! - Every memory record traces back to an event the owner was part of
//! - A private conversation stays out of unconnected NPCs' prompts
//! - Social propagation is the only way facts cross partitions
//!
//! Run with: `cargo test -p mystery-core --test qa_isolation`

use mystery_core::events::Visibility;
use mystery_core::memory::MemorySource;
use mystery_core::testing::TestHarness;

const SECRET: &str = "The brass astrolabe was hidden under the greenhouse bench.";

/// Two living NPCs in the player's room with no social link between them.
fn unlinked_pair(harness: &TestHarness) -> (String, String) {
    let present: Vec<String> = harness
        .snapshot()
        .characters_present
        .into_iter()
        .filter(|c| c.alive)
        .map(|c| c.name)
        .collect();
    for a in &present {
        for b in &present {
            if a != b && !harness.connections_of(a).contains(b) {
                return (a.clone(), b.clone());
            }
        }
    }
    panic!("no unlinked pair among {present:?}");
}

#[tokio::test]
async fn test_memory_records_trace_to_owned_events() {
    let mut harness = TestHarness::new().await;
    let (confidant, _) = unlinked_pair(&harness);

    harness.investigate().await;
    harness.expect_dialogue("I have no idea what you mean.");
    harness.talk(&confidant, SECRET).await;
    harness.move_to("library").await;
    harness.wait().await;
    harness.investigate().await;

    for name in harness.living_npc_names() {
        let owner = harness.character_id(&name).expect("npc exists");
        for record in harness.memories_of(&name) {
            assert_eq!(record.owner(), Some(owner));
            match record.source() {
                MemorySource::InnateSecret => {
                    assert_eq!(record.turn(), 0);
                    assert_eq!(record.event(), None);
                }
                MemorySource::Witnessed => {
                    let event = harness
                        .event(record.event().expect("witnessed record has an event"))
                        .expect("event is logged");
                    assert!(
                        event.witnesses.contains(&owner),
                        "{name} remembers an event they did not witness: {}",
                        event.description
                    );
                }
                MemorySource::ToldByPlayer => {
                    let event = harness
                        .event(record.event().expect("conversation record has an event"))
                        .expect("event is logged");
                    match event.visibility {
                        Visibility::Private { parties } => assert!(parties.contains(&owner)),
                        Visibility::Public => panic!("conversations are private"),
                    }
                }
                MemorySource::ToldByOtherNpc { from } => {
                    let from_name = harness
                        .living_npc_names()
                        .into_iter()
                        .find(|n| harness.character_id(n) == Some(from))
                        .expect("teller is a living npc");
                    assert!(harness.connections_of(&name).contains(&from_name));
                    assert!(harness.event(record.event().expect("rumor has an event")).is_some());
                }
            }
        }
    }
}

#[tokio::test]
async fn test_private_conversation_stays_out_of_unconnected_prompt() {
    let mut harness = TestHarness::new().await;
    let (confidant, outsider) = unlinked_pair(&harness);

    harness.expect_dialogue("An astrolabe? How curious.");
    harness.talk(&confidant, SECRET).await;
    assert!(harness
        .memories_of(&confidant)
        .iter()
        .any(|r| r.content().contains("astrolabe")));

    // Give any rumors time to land before questioning the outsider.
    harness.wait().await;
    harness.wait().await;

    harness.expect_dialogue("I saw nothing.");
    harness.talk(&outsider, "What do you know about the greenhouse?").await;

    let prompt = harness.last_dialogue_prompt().expect("outsider was prompted");
    assert!(prompt.contains(&outsider));
    assert!(!prompt.to_lowercase().contains("astrolabe"), "leaked into: {prompt}");
    assert!(!harness
        .memories_of(&outsider)
        .iter()
        .any(|r| r.content().contains("astrolabe")));
}

#[tokio::test]
async fn test_propagation_reaches_only_connections() {
    let mut harness = TestHarness::new().await;
    let (confidant, _) = unlinked_pair(&harness);
    let friends = harness.connections_of(&confidant);
    assert!(!friends.is_empty());

    harness.expect_dialogue("Hm.");
    harness.talk(&confidant, "Tell me about the brass astrolabe").await;

    // Delivered one turn later.
    for friend in &friends {
        assert!(!harness
            .memories_of(friend)
            .iter()
            .any(|r| r.content().contains("astrolabe")));
    }
    harness.wait().await;

    for name in harness.living_npc_names() {
        if name == confidant {
            continue;
        }
        let heard = harness
            .memories_of(&name)
            .into_iter()
            .find(|r| r.content().contains("astrolabe"));
        if friends.contains(&name) {
            let record = heard.unwrap_or_else(|| panic!("{name} should have heard"));
            assert_eq!(
                record.source(),
                MemorySource::ToldByOtherNpc {
                    from: harness.character_id(&confidant).expect("confidant exists")
                }
            );
            assert!(record.content().starts_with(&format!("{confidant} told me")));
        } else {
            assert!(heard.is_none(), "{name} is not linked to {confidant}");
        }
    }
}

#[tokio::test]
async fn test_prompt_uses_only_own_history() {
    let mut harness = TestHarness::new().await;
    let (first, second) = unlinked_pair(&harness);

    harness.expect_dialogue("The roses were trampled.");
    harness.talk(&first, "What about the garden?").await;
    harness.expect_dialogue("Nothing to add.");
    harness.talk(&second, "Anything to add?").await;

    let requests = harness
        .generator
        .requests_for(mystery_core::generation::GenerationPurpose::NpcDialogue);
    let second_request = requests.last().expect("second npc prompted");
    assert_eq!(second_request.messages.len(), 1);
    assert!(!second_request
        .messages
        .iter()
        .any(|m| m.content.contains("roses") || m.content.contains("garden")));
}
