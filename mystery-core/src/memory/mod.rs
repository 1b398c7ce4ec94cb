//! Per-character memory.
//!
//! Every character owns a separate partition. Records are appended and never
//! edited; the whole store is dropped with the game. Nothing in this module
//! copies records between partitions.

pub mod similarity;

use crate::events::EventId;
use crate::world::CharacterId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// How a character came to know something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MemorySource {
    /// Saw it happen.
    Witnessed,
    /// The player said it to them.
    ToldByPlayer,
    /// Heard it from a connected NPC.
    ToldByOtherNpc { from: CharacterId },
    /// Part of their backstory for this scenario.
    InnateSecret,
}

/// A single remembered fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    owner: Option<CharacterId>,
    content: String,
    turn: u32,
    source: MemorySource,
    tags: Vec<String>,
    event: Option<EventId>,
    sequence: u64,
}

impl MemoryRecord {
    pub fn new(content: impl Into<String>, turn: u32, source: MemorySource) -> Self {
        Self {
            owner: None,
            content: content.into(),
            turn,
            source,
            tags: Vec::new(),
            event: None,
            sequence: 0,
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Link the record to the event it describes.
    pub fn with_event(mut self, event: EventId) -> Self {
        self.event = Some(event);
        self
    }

    /// Partition this record was written to. `None` until written.
    pub fn owner(&self) -> Option<CharacterId> {
        self.owner
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn source(&self) -> MemorySource {
        self.source
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn event(&self) -> Option<EventId> {
        self.event
    }

    fn searchable_text(&self) -> String {
        if self.tags.is_empty() {
            self.content.clone()
        } else {
            format!("{} {}", self.content, self.tags.join(" "))
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Partition {
    records: Vec<MemoryRecord>,
}

/// Partitioned, append-only memory for all characters in a game.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    partitions: HashMap<CharacterId, Partition>,
    next_sequence: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to `owner`'s partition.
    pub fn write(&mut self, owner: CharacterId, mut record: MemoryRecord) {
        record.owner = Some(owner);
        record.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.partitions
            .entry(owner)
            .or_default()
            .records
            .push(record);
    }

    /// The `k` records of `owner` most similar to `query`.
    ///
    /// Ties, including records with no similarity at all, go to the more
    /// recent record. Unknown or empty partitions yield an empty list.
    pub fn retrieve(&self, owner: CharacterId, query: &str, k: usize) -> Vec<&MemoryRecord> {
        let Some(partition) = self.partitions.get(&owner) else {
            return Vec::new();
        };

        let mut scored: Vec<(f64, &MemoryRecord)> = partition
            .records
            .iter()
            .map(|r| (similarity::cosine(query, &r.searchable_text()), r))
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.turn.cmp(&a.turn))
                .then_with(|| b.sequence.cmp(&a.sequence))
        });

        scored.into_iter().take(k).map(|(_, r)| r).collect()
    }

    /// Every record in `owner`'s partition, oldest first.
    pub fn records(&self, owner: CharacterId) -> &[MemoryRecord] {
        self.partitions
            .get(&owner)
            .map(|p| p.records.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self, owner: CharacterId) -> usize {
        self.records(owner).len()
    }

    pub fn is_empty(&self, owner: CharacterId) -> bool {
        self.len(owner) == 0
    }

    /// Total records across all partitions.
    pub fn total(&self) -> usize {
        self.partitions.values().map(|p| p.records.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieve_missing_partition_is_empty() {
        let store = MemoryStore::new();
        assert!(store.retrieve(CharacterId::new(), "anything", 5).is_empty());
    }

    #[test]
    fn test_write_is_partitioned() {
        let mut store = MemoryStore::new();
        let butler = CharacterId::new();
        let maid = CharacterId::new();
        store.write(butler, MemoryRecord::new("I polished the silver", 1, MemorySource::Witnessed));

        assert_eq!(store.len(butler), 1);
        assert!(store.is_empty(maid));
        assert!(store.retrieve(maid, "silver", 5).is_empty());
        assert_eq!(store.records(butler)[0].owner(), Some(butler));
    }

    #[test]
    fn test_retrieve_ranks_by_similarity() {
        let mut store = MemoryStore::new();
        let owner = CharacterId::new();
        store.write(owner, MemoryRecord::new("The garden gate was left open", 1, MemorySource::Witnessed));
        store.write(owner, MemoryRecord::new("Someone took the poison from the pantry", 2, MemorySource::Witnessed));
        store.write(owner, MemoryRecord::new("Dinner was served late", 3, MemorySource::Witnessed));

        let results = store.retrieve(owner, "Who had access to the poison?", 2);
        assert_eq!(results.len(), 2);
        assert!(results[0].content().contains("poison"));
    }

    #[test]
    fn test_ties_go_to_more_recent() {
        let mut store = MemoryStore::new();
        let owner = CharacterId::new();
        store.write(owner, MemoryRecord::new("The clock struck nine", 1, MemorySource::Witnessed));
        store.write(owner, MemoryRecord::new("The clock struck ten", 4, MemorySource::Witnessed));
        store.write(owner, MemoryRecord::new("The clock struck eleven", 4, MemorySource::Witnessed));

        let results = store.retrieve(owner, "unrelated question", 3);
        let contents: Vec<_> = results.iter().map(|r| r.content()).collect();
        assert_eq!(
            contents,
            vec!["The clock struck eleven", "The clock struck ten", "The clock struck nine"]
        );
    }

    #[test]
    fn test_tags_are_searchable() {
        let mut store = MemoryStore::new();
        let owner = CharacterId::new();
        store.write(
            owner,
            MemoryRecord::new("I was not where I said I was", 0, MemorySource::InnateSecret)
                .with_tags(["alibi"]),
        );
        store.write(owner, MemoryRecord::new("The soup was cold", 1, MemorySource::Witnessed));

        let results = store.retrieve(owner, "alibi", 1);
        assert_eq!(results[0].source(), MemorySource::InnateSecret);
    }
}
