//! Social propagation.
//!
//! The only way information crosses memory partitions. Public events and
//! facts surfaced in conversation are queued for the socially connected NPCs
//! of whoever knows them, each subject to a probability roll, and delivered a
//! fixed number of turns later. Delivery happens once per turn in queue order.

use crate::config::PropagationPolicy;
use crate::events::{Event, EventId};
use crate::memory::{MemoryRecord, MemorySource, MemoryStore};
use crate::world::{CharacterId, World};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// A fact one NPC might pass on to their connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationCandidate {
    pub source: CharacterId,
    pub event: EventId,
    pub turn: u32,
    pub content: String,
}

/// A fact on its way to one NPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRumor {
    pub recipient: CharacterId,
    pub from: CharacterId,
    pub event: EventId,
    pub content: String,
    pub due_turn: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Propagation {
    policy: PropagationPolicy,
    queue: Vec<PendingRumor>,
    /// Every (event, recipient) pair ever queued, so nobody hears the same thing twice.
    scheduled: HashSet<(EventId, CharacterId)>,
}

impl Propagation {
    pub fn new(policy: PropagationPolicy) -> Self {
        Self {
            policy,
            queue: Vec::new(),
            scheduled: HashSet::new(),
        }
    }

    /// Queue gossip about a public event for the connections of each witness.
    ///
    /// Private events are ignored. Returns how many rumors were queued.
    pub fn on_event<R: Rng>(&mut self, event: &Event, world: &World, rng: &mut R) -> usize {
        if !event.visibility.is_public() {
            return 0;
        }
        let mut queued = 0;
        for &witness in &event.witnesses {
            let candidate = PropagationCandidate {
                source: witness,
                event: event.id,
                turn: event.turn,
                content: event.description.clone(),
            };
            queued += self.schedule(&candidate, world, &event.witnesses, rng);
        }
        queued
    }

    /// Queue a fact for the living NPC connections of `candidate.source`,
    /// skipping anyone in `exclude`.
    pub fn schedule<R: Rng>(
        &mut self,
        candidate: &PropagationCandidate,
        world: &World,
        exclude: &[CharacterId],
        rng: &mut R,
    ) -> usize {
        let Some(source) = world.character(candidate.source) else {
            return 0;
        };
        // Roster order keeps the rolls reproducible under a fixed seed.
        let connections: Vec<CharacterId> = world
            .characters()
            .map(|c| c.id)
            .filter(|id| source.connections.contains(id))
            .collect();

        let mut queued = 0;
        for recipient in connections {
            if recipient == candidate.source
                || exclude.contains(&recipient)
                || self.scheduled.contains(&(candidate.event, recipient))
            {
                continue;
            }
            let eligible = world
                .character(recipient)
                .map(|c| c.alive && c.is_npc())
                .unwrap_or(false);
            if !eligible {
                continue;
            }
            if rng.gen::<f64>() >= self.policy.probability {
                continue;
            }

            self.scheduled.insert((candidate.event, recipient));
            self.queue.push(PendingRumor {
                recipient,
                from: candidate.source,
                event: candidate.event,
                content: format!(
                    "{} told me: {}",
                    world.character_name(candidate.source),
                    candidate.content
                ),
                due_turn: candidate.turn + self.policy.delay_turns,
            });
            queued += 1;
        }

        if queued > 0 {
            debug!(event = %candidate.event, queued, "Queued rumors");
        }
        queued
    }

    /// Deliver every rumor due by `turn` into its recipient's partition.
    pub fn process(&mut self, turn: u32, memory: &mut MemoryStore) -> Vec<PendingRumor> {
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition(|r| r.due_turn <= turn);
        self.queue = waiting;

        for rumor in &due {
            memory.write(
                rumor.recipient,
                MemoryRecord::new(
                    rumor.content.clone(),
                    turn,
                    MemorySource::ToldByOtherNpc { from: rumor.from },
                )
                .with_event(rumor.event)
                .with_tags(["rumor"]),
            );
        }
        due
    }

    pub fn pending(&self) -> &[PendingRumor] {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventCategory;
    use crate::world::{Character, CharacterRole, Persona};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn linked_world() -> (World, CharacterId, CharacterId, CharacterId) {
        let mut world = World::new();
        let a = world.add_character(Character::new(Persona::new("Ada"), CharacterRole::Witness));
        let b = world.add_character(Character::new(Persona::new("Ben"), CharacterRole::Suspect));
        let c = world.add_character(Character::new(Persona::new("Cal"), CharacterRole::Suspect));
        world.character_mut(a).unwrap().connections.insert(b);
        world.character_mut(b).unwrap().connections.insert(a);
        (world, a, b, c)
    }

    fn always() -> PropagationPolicy {
        PropagationPolicy {
            delay_turns: 1,
            probability: 1.0,
        }
    }

    #[test]
    fn test_public_event_reaches_connections_after_delay() {
        let (world, a, b, c) = linked_world();
        let mut propagation = Propagation::new(always());
        let mut memory = MemoryStore::new();
        let mut rng = StdRng::seed_from_u64(0);
        let event = Event::public(2, EventCategory::Movement, "Ben saw the butler run").witnessed_by(vec![a]);

        assert_eq!(propagation.on_event(&event, &world, &mut rng), 1);
        assert!(propagation.process(2, &mut memory).is_empty());
        assert!(memory.is_empty(b));

        let delivered = propagation.process(3, &mut memory);
        assert_eq!(delivered.len(), 1);
        let record = &memory.records(b)[0];
        assert_eq!(record.source(), MemorySource::ToldByOtherNpc { from: a });
        assert_eq!(record.event(), Some(event.id));
        assert!(memory.is_empty(c));
        assert!(propagation.pending().is_empty());
    }

    #[test]
    fn test_private_events_do_not_spread() {
        let (world, a, _b, _c) = linked_world();
        let mut propagation = Propagation::new(always());
        let mut rng = StdRng::seed_from_u64(0);
        let event = Event::private(1, EventCategory::DialogueBeat, vec![a], "A confession").witnessed_by(vec![a]);
        assert_eq!(propagation.on_event(&event, &world, &mut rng), 0);
    }

    #[test]
    fn test_witnesses_are_not_told_and_no_duplicates() {
        let (world, a, b, _c) = linked_world();
        let mut propagation = Propagation::new(always());
        let mut rng = StdRng::seed_from_u64(0);
        let event = Event::public(1, EventCategory::Movement, "A scream").witnessed_by(vec![a, b]);
        assert_eq!(propagation.on_event(&event, &world, &mut rng), 0);

        let solo = Event::public(1, EventCategory::Movement, "A crash").witnessed_by(vec![a]);
        assert_eq!(propagation.on_event(&solo, &world, &mut rng), 1);
        assert_eq!(propagation.on_event(&solo, &world, &mut rng), 0);
    }

    #[test]
    fn test_zero_probability_blocks_everything() {
        let (world, a, _b, _c) = linked_world();
        let mut propagation = Propagation::new(PropagationPolicy {
            delay_turns: 0,
            probability: 0.0,
        });
        let mut rng = StdRng::seed_from_u64(0);
        let event = Event::public(1, EventCategory::Movement, "A crash").witnessed_by(vec![a]);
        assert_eq!(propagation.on_event(&event, &world, &mut rng), 0);
    }

    #[test]
    fn test_dead_connections_hear_nothing() {
        let (mut world, a, b, _c) = linked_world();
        world.character_mut(b).unwrap().alive = false;
        let mut propagation = Propagation::new(always());
        let mut rng = StdRng::seed_from_u64(0);
        let event = Event::public(1, EventCategory::Movement, "A crash").witnessed_by(vec![a]);
        assert_eq!(propagation.on_event(&event, &world, &mut rng), 0);
    }
}
