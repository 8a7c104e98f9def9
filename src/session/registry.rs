//! The session registry: sole owner of session and subject state.
//!
//! Every mutation goes through one of the mutators below. Each mutator
//! validates the transition against current state and the world, applies it
//! to a working copy, commits the copy only if validation succeeded, and then
//! emits typed [`SessionEvent`]s describing what changed. The state lock is
//! never held across an `.await`; callers that suspend must call a mutator
//! again after resuming so the transition is re-validated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;

use super::{Session, SessionEvent, SessionId, StateChange, SubjectFlags, SubjectId, SubjectState};
use crate::world::WorldOracle;

/// Why a transition was refused.
///
/// The messages are written to be shown to the player as narrative.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The session does not exist.
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    /// No exit in that direction.
    #[error("You can't go {direction} from here.")]
    NoExit {
        /// The requested direction.
        direction: String,
    },

    /// The item is not lying at the current location.
    #[error("There is no {item} here to pick up.")]
    ItemNotHere {
        /// The requested item.
        item: String,
    },

    /// The item is not in the inventory.
    #[error("You aren't carrying any {item}.")]
    ItemNotHeld {
        /// The requested item.
        item: String,
    },

    /// Nothing hostile to fight.
    #[error("There is nothing here to fight.")]
    NoHostile,

    /// A target was named but is not the monster present.
    #[error("There is no {target} here.")]
    NoSuchTarget {
        /// The named target.
        target: String,
    },

    /// The quest cannot be accepted right now.
    #[error("{0}")]
    QuestUnavailable(&'static str),

    /// The quest cannot be completed right now.
    #[error("{0}")]
    QuestIncomplete(&'static str),
}

/// Result of a successful move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movement {
    /// Where the subject was.
    pub from: String,
    /// Where the subject is now.
    pub to: String,
}

struct Inner {
    sessions: HashMap<SessionId, Session>,
    subjects: HashMap<SubjectId, SubjectState>,
}

/// Owns every session and subject record for the lifetime of the process.
///
/// Constructed explicitly and shared by `Arc` handle; there is no global
/// instance.
pub struct SessionRegistry {
    world: Arc<dyn WorldOracle>,
    inner: Mutex<Inner>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
}

impl SessionRegistry {
    /// Creates an empty registry over `world`.
    #[must_use]
    pub fn new(world: Arc<dyn WorldOracle>) -> Self {
        Self {
            world,
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                subjects: HashMap::new(),
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// The world this registry validates transitions against.
    #[must_use]
    pub fn world(&self) -> &dyn WorldOracle {
        self.world.as_ref()
    }

    /// Registers a new event listener.
    ///
    /// Listeners whose receiver has been dropped are pruned on the next emit.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.listeners).push(tx);
        rx
    }

    /// Allocates a fresh subject and a session controlling it.
    pub fn create_session(&self) -> Session {
        let subject_id = SubjectId::generate();
        let state = SubjectState::new(subject_id.clone(), self.world());
        let session = Session {
            id: SessionId::generate(),
            subject_id: subject_id.clone(),
            last_active: Utc::now(),
        };

        let mut inner = lock(&self.inner);
        inner.subjects.insert(subject_id, state);
        inner.sessions.insert(session.id.clone(), session.clone());
        drop(inner);

        tracing::info!(session = %session.id, subject = %session.subject_id, "session created");
        session
    }

    /// Looks up a session, refreshing its last-active timestamp.
    pub fn session(&self, id: &SessionId) -> Option<Session> {
        let mut inner = lock(&self.inner);
        let session = inner.sessions.get_mut(id)?;
        session.last_active = Utc::now();
        Some(session.clone())
    }

    /// Snapshot of a subject's state.
    #[must_use]
    pub fn subject_state(&self, subject: &SubjectId) -> Option<SubjectState> {
        lock(&self.inner).subjects.get(subject).cloned()
    }

    /// Snapshot of the state of the subject a session controls.
    #[must_use]
    pub fn snapshot(&self, session: &SessionId) -> Option<SubjectState> {
        let inner = lock(&self.inner);
        let subject = &inner.sessions.get(session)?.subject_id;
        inner.subjects.get(subject).cloned()
    }

    /// Number of sessions created so far.
    #[must_use]
    pub fn session_count(&self) -> usize {
        lock(&self.inner).sessions.len()
    }

    /// Moves the subject through the exit in `direction`.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::NoExit`] if there is no such exit.
    pub fn move_subject(&self, session: &SessionId, direction: &str) -> Result<Movement, Rejection> {
        self.mutate(session, |world, state, changes| {
            let to = world
                .exit(&state.location, direction)
                .ok_or_else(|| Rejection::NoExit {
                    direction: direction.to_string(),
                })?
                .to_string();
            Ok(relocate(world, state, to, changes))
        })
    }

    /// Sends the subject back to the world's starting location.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::UnknownSession`] if the session does not exist.
    pub fn retreat(&self, session: &SessionId) -> Result<Movement, Rejection> {
        self.mutate(session, |world, state, changes| {
            let to = world.start_location().to_string();
            Ok(relocate(world, state, to, changes))
        })
    }

    /// Picks `item` up from the current location.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::ItemNotHere`] if the item is not lying here.
    pub fn grant_item(&self, session: &SessionId, item: &str) -> Result<(), Rejection> {
        self.mutate(session, |_, state, changes| {
            let location = state.location.clone();
            let removed = state
                .room_items
                .get_mut(&location)
                .is_some_and(|items| items.remove(item));
            if !removed {
                return Err(Rejection::ItemNotHere {
                    item: item.to_string(),
                });
            }
            state.inventory.insert(item.to_string());
            changes.push(StateChange::InventoryChanged);
            changes.push(StateChange::RoomItemsChanged { location });
            Ok(())
        })
    }

    /// Drops a held `item` at the current location.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::ItemNotHeld`] if the item is not in the inventory.
    pub fn drop_item(&self, session: &SessionId, item: &str) -> Result<(), Rejection> {
        self.mutate(session, |_, state, changes| {
            if !state.inventory.remove(item) {
                return Err(Rejection::ItemNotHeld {
                    item: item.to_string(),
                });
            }
            let location = state.location.clone();
            state
                .room_items
                .entry(location.clone())
                .or_default()
                .insert(item.to_string());
            changes.push(StateChange::InventoryChanged);
            changes.push(StateChange::RoomItemsChanged { location });
            Ok(())
        })
    }

    /// Sets or clears a flag. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::UnknownSession`] if the session does not exist.
    pub fn set_flag(
        &self,
        session: &SessionId,
        flag: SubjectFlags,
        value: bool,
    ) -> Result<bool, Rejection> {
        self.mutate(session, |_, state, changes| {
            let before = state.flags;
            state.flags.set(flag, value);
            if before == state.flags {
                return Ok(false);
            }
            let toggled = before ^ state.flags;
            if toggled.contains(SubjectFlags::HOSTILE_PRESENT) {
                changes.push(StateChange::HostilePresenceChanged {
                    present: state.has(SubjectFlags::HOSTILE_PRESENT),
                });
            }
            if toggled.intersects(SubjectFlags::ACTIVE_QUEST | SubjectFlags::QUEST_COMPLETED) {
                changes.push(quest_change(state));
            }
            Ok(true)
        })
    }

    /// Accepts the quest from its giver.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::QuestUnavailable`] unless the subject is at the
    /// giver's location with no active or completed quest.
    pub fn accept_quest(&self, session: &SessionId) -> Result<(), Rejection> {
        self.mutate(session, |world, state, changes| {
            if state.location != world.quest().giver_location {
                return Err(Rejection::QuestUnavailable("Nobody here has a task for you."));
            }
            if state.has(SubjectFlags::ACTIVE_QUEST) {
                return Err(Rejection::QuestUnavailable("You are already on a quest."));
            }
            if state.has(SubjectFlags::QUEST_COMPLETED) {
                return Err(Rejection::QuestUnavailable("The keeper has nothing more to ask."));
            }
            state.flags.insert(SubjectFlags::ACTIVE_QUEST);
            changes.push(quest_change(state));
            Ok(())
        })
    }

    /// Turns the quest item in to the giver.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::QuestIncomplete`] unless the quest is active, the
    /// subject is at the giver's location and holds the required item.
    pub fn complete_quest(&self, session: &SessionId) -> Result<(), Rejection> {
        self.mutate(session, |world, state, changes| {
            let quest = world.quest();
            if !state.has(SubjectFlags::ACTIVE_QUEST) {
                return Err(Rejection::QuestIncomplete("You have no quest to turn in."));
            }
            if state.location != quest.giver_location {
                return Err(Rejection::QuestIncomplete("The quest giver is not here."));
            }
            if !state.inventory.remove(quest.required_item) {
                return Err(Rejection::QuestIncomplete("You don't have what was asked for."));
            }
            state.flags.remove(SubjectFlags::ACTIVE_QUEST);
            state.flags.insert(SubjectFlags::QUEST_COMPLETED);
            changes.push(StateChange::InventoryChanged);
            changes.push(quest_change(state));
            Ok(())
        })
    }

    /// Marks the monster at the current location as defeated.
    ///
    /// If `target` is given it must name that monster. Returns the id of the
    /// defeated monster.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::NoHostile`] if nothing hostile is here, or
    /// [`Rejection::NoSuchTarget`] if `target` names something else.
    pub fn defeat_monster(
        &self,
        session: &SessionId,
        target: Option<&str>,
    ) -> Result<String, Rejection> {
        self.mutate(session, |world, state, changes| {
            let monster = state.hostile_here(world).ok_or(Rejection::NoHostile)?;
            if let Some(target) = target {
                if !target.eq_ignore_ascii_case(monster.id) {
                    return Err(Rejection::NoSuchTarget {
                        target: target.to_string(),
                    });
                }
            }
            let id = monster.id.to_string();
            state.defeated.insert(id.clone());
            sync_hostility(world, state, changes);
            Ok(id)
        })
    }

    /// Runs `apply` against a working copy of the session's subject state and
    /// commits it only on success, then emits the collected changes.
    fn mutate<T>(
        &self,
        session: &SessionId,
        apply: impl FnOnce(&dyn WorldOracle, &mut SubjectState, &mut Vec<StateChange>) -> Result<T, Rejection>,
    ) -> Result<T, Rejection> {
        let mut changes = Vec::new();
        let (subject, outcome) = {
            let mut inner = lock(&self.inner);
            let subject = inner
                .sessions
                .get(session)
                .map(|s| s.subject_id.clone())
                .ok_or_else(|| Rejection::UnknownSession(session.clone()))?;
            let state = inner
                .subjects
                .get_mut(&subject)
                .ok_or_else(|| Rejection::UnknownSession(session.clone()))?;

            let mut draft = state.clone();
            let outcome = match apply(self.world(), &mut draft, &mut changes) {
                Ok(outcome) => outcome,
                Err(rejection) => {
                    tracing::debug!(%session, %rejection, "transition rejected");
                    return Err(rejection);
                }
            };
            *state = draft;
            (subject, outcome)
        };

        self.emit(session, &subject, changes);
        Ok(outcome)
    }

    fn emit(&self, session: &SessionId, subject: &SubjectId, changes: Vec<StateChange>) {
        if changes.is_empty() {
            return;
        }

        let mut listeners = lock(&self.listeners);
        listeners.retain(|tx| {
            changes.iter().all(|change| {
                tx.send(SessionEvent {
                    session: session.clone(),
                    subject: subject.clone(),
                    change: change.clone(),
                })
                .is_ok()
            })
        });

        tracing::debug!(%session, count = changes.len(), "state change events emitted");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn relocate(
    world: &dyn WorldOracle,
    state: &mut SubjectState,
    to: String,
    changes: &mut Vec<StateChange>,
) -> Movement {
    let from = std::mem::replace(&mut state.location, to.clone());
    if from != to {
        changes.push(StateChange::LocationChanged {
            from: from.clone(),
            to: to.clone(),
        });
    }
    sync_hostility(world, state, changes);
    Movement { from, to }
}

fn sync_hostility(world: &dyn WorldOracle, state: &mut SubjectState, changes: &mut Vec<StateChange>) {
    let present = state.hostile_here(world).is_some();
    if present != state.has(SubjectFlags::HOSTILE_PRESENT) {
        state.flags.set(SubjectFlags::HOSTILE_PRESENT, present);
        changes.push(StateChange::HostilePresenceChanged { present });
    }
}

const fn quest_change(state: &SubjectState) -> StateChange {
    StateChange::QuestChanged {
        active: state.has(SubjectFlags::ACTIVE_QUEST),
        completed: state.has(SubjectFlags::QUEST_COMPLETED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::StaticWorld;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(StaticWorld::new()))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<StateChange> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event.change);
        }
        out
    }

    #[test]
    fn create_session_makes_state_queryable() {
        let registry = registry();
        let session = registry.create_session();

        let found = registry.session(&session.id).expect("session exists");
        assert_eq!(found.subject_id, session.subject_id);
        assert!(found.last_active >= session.last_active);

        let state = registry.subject_state(&session.subject_id).expect("state");
        assert_eq!(state.location, "entrance");
        assert_eq!(registry.snapshot(&session.id), Some(state));
    }

    #[test]
    fn unknown_session_is_absent() {
        let registry = registry();
        assert!(registry.session(&SessionId::from("nope")).is_none());
        assert_eq!(
            registry.move_subject(&SessionId::from("nope"), "north"),
            Err(Rejection::UnknownSession(SessionId::from("nope")))
        );
    }

    #[test]
    fn invalid_move_leaves_state_untouched() {
        let registry = registry();
        let session = registry.create_session();
        let mut rx = registry.subscribe();

        let err = registry.move_subject(&session.id, "west").unwrap_err();
        assert!(matches!(err, Rejection::NoExit { .. }));
        assert_eq!(registry.snapshot(&session.id).unwrap().location, "entrance");
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn moving_into_monster_room_raises_hostility() {
        let registry = registry();
        let session = registry.create_session();
        let mut rx = registry.subscribe();

        registry.move_subject(&session.id, "north").unwrap();
        registry.move_subject(&session.id, "east").unwrap();

        let state = registry.snapshot(&session.id).unwrap();
        assert_eq!(state.location, "armory");
        assert!(state.has(SubjectFlags::HOSTILE_PRESENT));

        let changes = drain(&mut rx);
        assert!(changes.contains(&StateChange::HostilePresenceChanged { present: true }));
        assert!(changes.contains(&StateChange::LocationChanged {
            from: "hall".to_string(),
            to: "armory".to_string(),
        }));
    }

    #[test]
    fn pickup_and_drop_move_items() {
        let registry = registry();
        let session = registry.create_session();

        assert!(registry.grant_item(&session.id, "map").is_err());
        registry.grant_item(&session.id, "torch").unwrap();
        let state = registry.snapshot(&session.id).unwrap();
        assert!(state.holds("torch"));
        assert!(state.items_here().is_none());

        registry.move_subject(&session.id, "east").unwrap();
        registry.drop_item(&session.id, "torch").unwrap();
        let state = registry.snapshot(&session.id).unwrap();
        assert!(!state.holds("torch"));
        assert!(state.room_items["garden"].contains("torch"));
        assert_eq!(
            registry.drop_item(&session.id, "torch"),
            Err(Rejection::ItemNotHeld {
                item: "torch".to_string()
            })
        );
    }

    #[test]
    fn quest_lifecycle() {
        let registry = registry();
        let session = registry.create_session();

        assert!(registry.accept_quest(&session.id).is_err());
        registry.move_subject(&session.id, "north").unwrap();
        registry.accept_quest(&session.id).unwrap();
        assert!(registry.accept_quest(&session.id).is_err());
        assert!(registry.complete_quest(&session.id).is_err());

        registry.move_subject(&session.id, "west").unwrap();
        registry.grant_item(&session.id, "key").unwrap();
        registry.move_subject(&session.id, "east").unwrap();
        registry.complete_quest(&session.id).unwrap();

        let state = registry.snapshot(&session.id).unwrap();
        assert!(state.has(SubjectFlags::QUEST_COMPLETED));
        assert!(!state.has(SubjectFlags::ACTIVE_QUEST));
        assert!(!state.holds("key"));
    }

    #[test]
    fn defeat_clears_hostility_for_good() {
        let registry = registry();
        let session = registry.create_session();
        registry.move_subject(&session.id, "north").unwrap();
        assert_eq!(registry.defeat_monster(&session.id, None), Err(Rejection::NoHostile));

        registry.move_subject(&session.id, "east").unwrap();
        assert!(matches!(
            registry.defeat_monster(&session.id, Some("dragon")),
            Err(Rejection::NoSuchTarget { .. })
        ));
        assert_eq!(registry.defeat_monster(&session.id, Some("Goblin")).unwrap(), "goblin");

        registry.move_subject(&session.id, "west").unwrap();
        registry.move_subject(&session.id, "east").unwrap();
        assert!(!registry.snapshot(&session.id).unwrap().has(SubjectFlags::HOSTILE_PRESENT));
    }

    #[test]
    fn retreat_returns_to_start() {
        let registry = registry();
        let session = registry.create_session();
        registry.move_subject(&session.id, "north").unwrap();
        registry.move_subject(&session.id, "north").unwrap();
        assert!(registry.snapshot(&session.id).unwrap().has(SubjectFlags::HOSTILE_PRESENT));

        let movement = registry.retreat(&session.id).unwrap();
        assert_eq!(movement.from, "lair");
        assert_eq!(movement.to, "entrance");
        assert!(!registry.snapshot(&session.id).unwrap().has(SubjectFlags::HOSTILE_PRESENT));
    }

    #[test]
    fn set_flag_emits_only_on_change() {
        let registry = registry();
        let session = registry.create_session();
        let mut rx = registry.subscribe();

        assert!(registry.set_flag(&session.id, SubjectFlags::HOSTILE_PRESENT, true).unwrap());
        assert!(!registry.set_flag(&session.id, SubjectFlags::HOSTILE_PRESENT, true).unwrap());
        assert_eq!(
            drain(&mut rx),
            vec![StateChange::HostilePresenceChanged { present: true }]
        );
    }

    #[test]
    fn dropped_listeners_are_pruned() {
        let registry = registry();
        let session = registry.create_session();
        let rx = registry.subscribe();
        drop(rx);
        let mut live = registry.subscribe();

        registry.grant_item(&session.id, "torch").unwrap();
        assert_eq!(lock(&registry.listeners).len(), 1);
        assert_eq!(drain(&mut live).len(), 2);
    }
}
