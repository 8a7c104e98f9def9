//! Session and subject records.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::world::{Monster, WorldOracle};

/// Identifier handed to clients to bind requests to a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of the player a session controls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectId(String);

impl SubjectId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("player-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A server-side handle binding a connection to one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// The subject this session controls (always exactly one).
    pub subject_id: SubjectId,
    /// When the session was last looked up.
    pub last_active: DateTime<Utc>,
}

bitflags! {
    /// Boolean toggles on a subject.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SubjectFlags: u8 {
        /// The subject has accepted the quest and not yet turned it in.
        const ACTIVE_QUEST = 1;
        /// A monster the subject has not defeated shares its location.
        const HOSTILE_PRESENT = 1 << 1;
        /// The subject has turned in the quest.
        const QUEST_COMPLETED = 1 << 2;
    }
}

/// Per-player state that capability visibility depends on.
///
/// Values handed out by the registry are snapshots; changing one has no
/// effect on the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectState {
    /// Owner of this state.
    pub subject_id: SubjectId,
    /// Current location id.
    pub location: String,
    /// Held item ids.
    pub inventory: BTreeSet<String>,
    /// Boolean toggles.
    pub flags: SubjectFlags,
    /// Items lying in each location, as this subject has left them.
    pub room_items: BTreeMap<String, BTreeSet<String>>,
    /// Monsters this subject has beaten.
    pub defeated: BTreeSet<String>,
}

impl SubjectState {
    /// Default state for a newly created subject.
    #[must_use]
    pub fn new(subject_id: SubjectId, world: &dyn WorldOracle) -> Self {
        let mut state = Self {
            subject_id,
            location: world.start_location().to_string(),
            inventory: BTreeSet::new(),
            flags: SubjectFlags::empty(),
            room_items: world.initial_items(),
            defeated: BTreeSet::new(),
        };
        let hostile = state.hostile_here(world).is_some();
        state.flags.set(SubjectFlags::HOSTILE_PRESENT, hostile);
        state
    }

    /// Returns `true` if every bit of `flag` is set.
    #[must_use]
    pub const fn has(&self, flag: SubjectFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Items lying at the current location.
    #[must_use]
    pub fn items_here(&self) -> Option<&BTreeSet<String>> {
        self.room_items.get(&self.location).filter(|items| !items.is_empty())
    }

    /// Returns `true` if `item` is held.
    #[must_use]
    pub fn holds(&self, item: &str) -> bool {
        self.inventory.contains(item)
    }

    /// The undefeated monster at the current location, if any.
    #[must_use]
    pub fn hostile_here<'w>(&self, world: &'w dyn WorldOracle) -> Option<&'w Monster> {
        world
            .monster_at(&self.location)
            .filter(|m| !self.defeated.contains(m.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::StaticWorld;

    #[test]
    fn new_subject_starts_at_world_start() {
        let world = StaticWorld::new();
        let state = SubjectState::new(SubjectId::generate(), &world);
        assert_eq!(state.location, "entrance");
        assert!(state.inventory.is_empty());
        assert!(!state.has(SubjectFlags::HOSTILE_PRESENT));
        assert!(state.items_here().is_some_and(|i| i.contains("torch")));
    }

    #[test]
    fn defeated_monsters_are_not_hostile() {
        let world = StaticWorld::new();
        let mut state = SubjectState::new(SubjectId::generate(), &world);
        state.location = "armory".to_string();
        assert!(state.hostile_here(&world).is_some());
        state.defeated.insert("goblin".to_string());
        assert!(state.hostile_here(&world).is_none());
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
        assert!(SubjectId::generate().to_string().starts_with("player-"));
    }
}
