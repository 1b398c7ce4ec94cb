//! Game events.
//!
//! The event log is append-only. The UI reads it for display and social
//! propagation fans public events out to connected NPCs.

use crate::world::{CharacterId, LocationId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Movement,
    Discovery,
    DialogueBeat,
    System,
}

/// Who may see an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Visibility {
    /// Anyone present, and eventually anyone they gossip with.
    Public,
    /// Only the acting parties.
    Private { parties: Vec<CharacterId> },
}

impl Visibility {
    pub fn is_public(&self) -> bool {
        matches!(self, Visibility::Public)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub turn: u32,
    pub category: EventCategory,
    pub visibility: Visibility,
    pub location: Option<LocationId>,
    pub description: String,
    /// NPCs who saw the event first-hand.
    pub witnesses: Vec<CharacterId>,
}

impl Event {
    pub fn public(turn: u32, category: EventCategory, description: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            turn,
            category,
            visibility: Visibility::Public,
            location: None,
            description: description.into(),
            witnesses: Vec::new(),
        }
    }

    pub fn private(
        turn: u32,
        category: EventCategory,
        parties: Vec<CharacterId>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            visibility: Visibility::Private { parties },
            ..Self::public(turn, category, description)
        }
    }

    pub fn system(turn: u32, description: impl Into<String>) -> Self {
        Self::public(turn, EventCategory::System, description)
    }

    pub fn at(mut self, location: LocationId) -> Self {
        self.location = Some(location);
        self
    }

    pub fn witnessed_by(mut self, witnesses: Vec<CharacterId>) -> Self {
        self.witnesses = witnesses;
        self
    }

    /// Whether `character` could have seen this event.
    pub fn visible_to(&self, character: CharacterId) -> bool {
        match &self.visibility {
            Visibility::Public => true,
            Visibility::Private { parties } => parties.contains(&character),
        }
    }
}

/// Append-only event log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) -> EventId {
        let id = event.id;
        self.events.push(event);
        id
    }

    pub fn all(&self) -> &[Event] {
        &self.events
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events appended at or after `index`, in order.
    pub fn since(&self, index: usize) -> &[Event] {
        self.events.get(index..).unwrap_or(&[])
    }

    /// Events `character` could see, in order.
    pub fn visible_to(&self, character: CharacterId) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.visible_to(character))
    }
}
