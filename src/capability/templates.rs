//! The template provider: prompts rendered from the subject's state.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::predicates;
use super::{find_visible, snapshot, visible, Arguments, CapabilityError, CapabilityKind, Content};
use super::{Descriptor, ParamSchema, ParamType};
use crate::session::{SessionId, SessionRegistry, SubjectState};
use crate::world::{render_location, WorldOracle};

/// Which prompt a template renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Narrate the current scene.
    DescribeScene,
    /// Taunt the monster that is here.
    BattleTaunt,
    /// Recap the active quest.
    QuestBriefing,
    /// Tell the story of what is being carried.
    InventoryTale,
}

/// One message of a rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    /// `user` or `assistant`.
    pub role: &'static str,
    /// Message body.
    pub content: Content,
}

impl PromptMessage {
    fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: Content::text(text),
        }
    }
}

/// Result of `templates/get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateResult {
    /// What the prompt is for.
    pub description: String,
    /// The rendered messages.
    pub messages: Vec<PromptMessage>,
}

/// The static template catalog, in listing order.
#[must_use]
pub fn catalog() -> Vec<Descriptor<TemplateKind>> {
    vec![
        Descriptor {
            name: "describe_scene",
            title: "Describe scene",
            description: "Ask for a narration of the player's surroundings.",
            params: ParamSchema::empty().optional(
                "style",
                ParamType::String,
                "Narrative style, e.g. 'gothic' or 'whimsical'",
            ),
            visible: predicates::always,
            body: TemplateKind::DescribeScene,
        },
        Descriptor {
            name: "battle_taunt",
            title: "Battle taunt",
            description: "Ask for a taunt to hurl at the creature blocking the way.",
            params: ParamSchema::empty().optional(
                "tone",
                ParamType::String,
                "Tone of the taunt, e.g. 'heroic' or 'mocking'",
            ),
            visible: predicates::hostile_present,
            body: TemplateKind::BattleTaunt,
        },
        Descriptor {
            name: "quest_briefing",
            title: "Quest briefing",
            description: "Ask for a recap of the quest in progress.",
            params: ParamSchema::empty(),
            visible: predicates::quest_active,
            body: TemplateKind::QuestBriefing,
        },
        Descriptor {
            name: "inventory_tale",
            title: "Inventory tale",
            description: "Ask for the story behind the things the player is carrying.",
            params: ParamSchema::empty(),
            visible: predicates::holding_anything,
            body: TemplateKind::InventoryTale,
        },
    ]
}

/// Computes visible templates and renders them.
pub struct TemplateProvider {
    registry: Arc<SessionRegistry>,
    catalog: Vec<Descriptor<TemplateKind>>,
}

impl TemplateProvider {
    /// Creates a provider over `registry`.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            catalog: catalog(),
        }
    }

    /// Templates currently visible to `session`, in catalog order.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::UnknownSession`] if the session is gone.
    pub fn list(&self, session: &SessionId) -> Result<Vec<&Descriptor<TemplateKind>>, CapabilityError> {
        let state = snapshot(&self.registry, session)?;
        Ok(visible(&self.catalog, &self.registry, &state))
    }

    /// Renders the template `name` for `session`.
    ///
    /// # Errors
    ///
    /// - [`CapabilityError::NotFound`] if `name` is not currently visible
    /// - [`CapabilityError::Validation`] if `arguments` fail the schema
    /// - [`CapabilityError::UnknownSession`] if the session is gone
    pub fn get(
        &self,
        name: &str,
        session: &SessionId,
        arguments: &Value,
    ) -> Result<TemplateResult, CapabilityError> {
        let (descriptor, state) = find_visible(
            CapabilityKind::Templates,
            &self.catalog,
            &self.registry,
            session,
            name,
        )?;
        let args = descriptor.params.validate(arguments)?;
        let world = self.registry.world();

        let text = match descriptor.body {
            TemplateKind::DescribeScene => describe_scene(world, &state, &args),
            TemplateKind::BattleTaunt => battle_taunt(world, &state, &args),
            TemplateKind::QuestBriefing => quest_briefing(world, &state),
            TemplateKind::InventoryTale => inventory_tale(world, &state),
        };

        Ok(TemplateResult {
            description: descriptor.description.to_string(),
            messages: vec![PromptMessage::user(text)],
        })
    }
}

fn describe_scene(world: &dyn WorldOracle, state: &SubjectState, args: &Arguments) -> String {
    let style = args.str("style").unwrap_or("atmospheric");
    let scene = render_location(
        world,
        &state.location,
        state.items_here().into_iter().flatten(),
        state.hostile_here(world).map(|m| m.id),
    );
    format!(
        "Describe this scene from a text adventure in a {style} style, in the second \
         person. Keep every fact, invent no new exits or items.\n\n{scene}"
    )
}

fn battle_taunt(world: &dyn WorldOracle, state: &SubjectState, args: &Arguments) -> String {
    let tone = args.str("tone").unwrap_or("defiant");
    let foe = state
        .hostile_here(world)
        .map_or("an unseen enemy", |m| m.description);
    let weapons: Vec<&str> = state
        .inventory
        .iter()
        .filter_map(|id| world.item(id))
        .map(|i| i.name)
        .collect();
    let armed = if weapons.is_empty() {
        "bare hands".to_string()
    } else {
        weapons.join(", ")
    };
    format!(
        "Write a short, {tone} taunt the player shouts at this foe: {foe} \
         The player is armed with: {armed}."
    )
}

fn quest_briefing(world: &dyn WorldOracle, state: &SubjectState) -> String {
    let quest = world.quest();
    let giver = world
        .location(quest.giver_location)
        .map_or(quest.giver_location, |l| l.name);
    let wanted = world
        .item(quest.required_item)
        .map_or(quest.required_item, |i| i.name);
    let progress = if state.holds(quest.required_item) {
        format!("The player already carries the {wanted}; they must return to the {giver}.")
    } else {
        format!("The player has not found the {wanted} yet.")
    };
    format!(
        "Summarise the quest \"{}\" for the player as the quest giver would.\n\n{}\n\n{progress}",
        quest.title, quest.briefing
    )
}

fn inventory_tale(world: &dyn WorldOracle, state: &SubjectState) -> String {
    let items: Vec<String> = state
        .inventory
        .iter()
        .filter_map(|id| world.item(id))
        .map(|i| format!("- {}: {}", i.name, i.description))
        .collect();
    format!(
        "Invent a brief history for each of these items the player is carrying:\n{}",
        items.join("\n")
    )
}
