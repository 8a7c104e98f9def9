//! The resource provider: read-only documents about the subject.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::predicates;
use super::{find_visible, snapshot, visible, CapabilityError, CapabilityKind, Descriptor};
use super::{ParamSchema, ParamType};
use crate::session::{SessionId, SessionRegistry, StateChange, SubjectFlags, SubjectState};
use crate::world::{render_location, WorldOracle};

/// Where the player is, what they carry and how the quest stands.
pub const PLAYER_STATUS: &str = "game://player/status";
/// The current location.
pub const LOCATION: &str = "game://location";
/// One held item; takes an `item` parameter.
pub const INVENTORY_ITEM: &str = "game://inventory/item";
/// The monster at the current location.
pub const MONSTER: &str = "game://monster";
/// The quest journal.
pub const QUEST_LOG: &str = "game://quest/log";

const MIME_TYPE: &str = "text/plain";

/// Which document a resource renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Location, inventory size and quest progress.
    PlayerStatus,
    /// The current location.
    Location,
    /// Close-up of one held item.
    InventoryItem,
    /// The monster that is here.
    Monster,
    /// Quest progress.
    QuestLog,
}

/// One entry of a `resources/read` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceText {
    /// The uri that was read.
    pub uri: String,
    /// Always `text/plain`.
    pub mime_type: &'static str,
    /// The document.
    pub text: String,
}

/// Result of `resources/read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceContents {
    /// The documents read.
    pub contents: Vec<ResourceText>,
}

impl ResourceContents {
    fn single(uri: &str, text: String) -> Self {
        Self {
            contents: vec![ResourceText {
                uri: uri.to_string(),
                mime_type: MIME_TYPE,
                text,
            }],
        }
    }
}

/// The static resource catalog, in listing order.
#[must_use]
pub fn catalog() -> Vec<Descriptor<ResourceKind>> {
    vec![
        Descriptor {
            name: PLAYER_STATUS,
            title: "Player status",
            description: "Where the player is, what they carry and how the quest stands.",
            params: ParamSchema::empty(),
            visible: predicates::always,
            body: ResourceKind::PlayerStatus,
        },
        Descriptor {
            name: LOCATION,
            title: "Current location",
            description: "Full description of the player's current location.",
            params: ParamSchema::empty(),
            visible: predicates::always,
            body: ResourceKind::Location,
        },
        Descriptor {
            name: INVENTORY_ITEM,
            title: "Inventory item",
            description: "Close-up description of an item the player is carrying.",
            params: ParamSchema::empty().required("item", ParamType::String, "Id of a held item"),
            visible: predicates::holding_anything,
            body: ResourceKind::InventoryItem,
        },
        Descriptor {
            name: MONSTER,
            title: "Monster",
            description: "What the player knows about the creature at this location.",
            params: ParamSchema::empty(),
            visible: predicates::hostile_present,
            body: ResourceKind::Monster,
        },
        Descriptor {
            name: QUEST_LOG,
            title: "Quest log",
            description: "The player's quest journal.",
            params: ParamSchema::empty(),
            visible: predicates::quest_known,
            body: ResourceKind::QuestLog,
        },
    ]
}

/// Resources whose content a change may have altered.
#[must_use]
pub const fn uris_affected_by(change: &StateChange) -> &'static [&'static str] {
    match change {
        StateChange::LocationChanged { .. } => &[PLAYER_STATUS, LOCATION, MONSTER],
        StateChange::InventoryChanged => &[PLAYER_STATUS, INVENTORY_ITEM, QUEST_LOG],
        StateChange::RoomItemsChanged { .. } => &[LOCATION],
        StateChange::HostilePresenceChanged { .. } => &[LOCATION, MONSTER],
        StateChange::QuestChanged { .. } => &[PLAYER_STATUS, QUEST_LOG],
    }
}

/// Computes visible resources and reads them.
pub struct ResourceProvider {
    registry: Arc<SessionRegistry>,
    catalog: Vec<Descriptor<ResourceKind>>,
}

impl ResourceProvider {
    /// Creates a provider over `registry`.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            catalog: catalog(),
        }
    }

    /// Resources currently visible to `session`, in catalog order.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::UnknownSession`] if the session is gone.
    pub fn list(&self, session: &SessionId) -> Result<Vec<&Descriptor<ResourceKind>>, CapabilityError> {
        let state = snapshot(&self.registry, session)?;
        Ok(visible(&self.catalog, &self.registry, &state))
    }

    /// Whether `uri` is in the catalog at all, visible or not.
    #[must_use]
    pub fn is_known(&self, uri: &str) -> bool {
        self.catalog.iter().any(|d| d.name == uri)
    }

    /// Reads the resource at `uri` for `session`.
    ///
    /// # Errors
    ///
    /// - [`CapabilityError::NotFound`] if `uri` is not currently visible, or
    ///   names an item the subject does not hold
    /// - [`CapabilityError::Validation`] if `parameters` fail the schema
    /// - [`CapabilityError::UnknownSession`] if the session is gone
    pub fn read(
        &self,
        uri: &str,
        session: &SessionId,
        parameters: &Value,
    ) -> Result<ResourceContents, CapabilityError> {
        let (descriptor, state) = find_visible(
            CapabilityKind::Resources,
            &self.catalog,
            &self.registry,
            session,
            uri,
        )?;
        let params = descriptor.params.validate(parameters)?;
        let world = self.registry.world();

        let text = match descriptor.body {
            ResourceKind::PlayerStatus => player_status(world, &state),
            ResourceKind::Location => render_location(
                world,
                &state.location,
                state.items_here().into_iter().flatten(),
                state.hostile_here(world).map(|m| m.id),
            ),
            ResourceKind::InventoryItem => {
                let id = params.str("item").unwrap_or_default();
                let item = world
                    .item(id)
                    .filter(|_| state.holds(id))
                    .ok_or_else(|| CapabilityError::NotFound {
                        kind: CapabilityKind::Resources,
                        name: format!("{uri}?item={id}"),
                    })?;
                format!("{}\n{}", item.name, item.description)
            }
            ResourceKind::Monster => state
                .hostile_here(world)
                .map(|m| format!("{}\n{}", m.name, m.description))
                .ok_or_else(|| CapabilityError::NotFound {
                    kind: CapabilityKind::Resources,
                    name: uri.to_string(),
                })?,
            ResourceKind::QuestLog => quest_log(world, &state),
        };

        Ok(ResourceContents::single(uri, text))
    }
}

fn player_status(world: &dyn WorldOracle, state: &SubjectState) -> String {
    let location = world
        .location(&state.location)
        .map_or(state.location.as_str(), |l| l.name);
    let carrying = if state.inventory.is_empty() {
        "nothing".to_string()
    } else {
        state
            .inventory
            .iter()
            .map(|id| world.item(id).map_or(id.as_str(), |i| i.name))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "Location: {location}\nCarrying: {carrying}\nQuest: {}\nIn danger: {}",
        quest_status(state),
        if state.has(SubjectFlags::HOSTILE_PRESENT) { "yes" } else { "no" },
    )
}

fn quest_status(state: &SubjectState) -> &'static str {
    if state.has(SubjectFlags::QUEST_COMPLETED) {
        "completed"
    } else if state.has(SubjectFlags::ACTIVE_QUEST) {
        "in progress"
    } else {
        "none"
    }
}

fn quest_log(world: &dyn WorldOracle, state: &SubjectState) -> String {
    let quest = world.quest();
    let mut text = format!("{} ({})\n{}", quest.title, quest_status(state), quest.briefing);
    if state.has(SubjectFlags::QUEST_COMPLETED) {
        text.push_str("\n\n");
        text.push_str(quest.reward);
    }
    text
}
