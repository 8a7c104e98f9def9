//! Typed change events emitted by the registry's mutators.

use super::{SessionId, SubjectId};

/// What changed in a subject's state.
///
/// This is a closed set: consumers match on it exhaustively, so adding a
/// variant forces every mapping to be revisited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    /// The subject moved.
    LocationChanged {
        /// Previous location id.
        from: String,
        /// New location id.
        to: String,
    },
    /// Items were added to or removed from the inventory.
    InventoryChanged,
    /// Items were added to or removed from a location.
    RoomItemsChanged {
        /// The location whose items changed.
        location: String,
    },
    /// A hostile entity appeared or went away.
    HostilePresenceChanged {
        /// Whether a hostile entity is now present.
        present: bool,
    },
    /// Quest progress changed.
    QuestChanged {
        /// Quest now active.
        active: bool,
        /// Quest now completed.
        completed: bool,
    },
}

/// A change event tagged with the session and subject it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// The session whose subject changed.
    pub session: SessionId,
    /// The subject that changed.
    pub subject: SubjectId,
    /// What changed.
    pub change: StateChange,
}
