//! The action provider: callable capabilities that may change state.

use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use serde_json::Value;

use super::predicates;
use super::{find_visible, snapshot, visible, CapabilityError, CapabilityKind, Content, Descriptor};
use super::{Arguments, ParamSchema, ParamType};
use crate::config::{CombatConfig, DefeatEffect};
use crate::generation::{embellish, ContentGenerator, GenerationRequest};
use crate::session::{Rejection, SessionId, SessionRegistry, SubjectState};
use crate::world::{normalize_direction, render_location};

const NARRATOR: &str = "You are the narrator of a text adventure. Write two or three vivid \
                        sentences in second person. Do not invent exits or items.";

/// What an action does when invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Describe the current location.
    Look,
    /// Walk through an exit.
    Move,
    /// Pick an item up.
    Pickup,
    /// Put an item down.
    Drop,
    /// List held items.
    Inventory,
    /// Fight the monster here.
    Attack,
    /// Take on the quest.
    AcceptQuest,
    /// Hand in the quest item.
    CompleteQuest,
}

/// Source of combat randomness, in `[0.0, 1.0)`.
pub trait Dice: Send + Sync {
    /// Rolls once.
    fn roll(&self) -> f64;
}

/// Dice backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomDice;

impl Dice for RandomDice {
    fn roll(&self) -> f64 {
        rand::rng().random::<f64>()
    }
}

/// Dice that always roll the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedDice(pub f64);

impl Dice for FixedDice {
    fn roll(&self) -> f64 {
        self.0
    }
}

/// Result of `actions/call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    /// Content returned by the action.
    pub content: Vec<Content>,
    /// Whether the action failed in-world.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

impl ActionResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
        }
    }

    /// Creates an error-flagged text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
        }
    }

    /// Appends another text block.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.content.push(Content::text(text));
        self
    }
}

/// The static action catalog, in listing order.
#[must_use]
pub fn catalog() -> Vec<Descriptor<ActionKind>> {
    vec![
        Descriptor {
            name: "look",
            title: "Look around",
            description: "Describe your surroundings, including items, exits and any danger.",
            params: ParamSchema::empty(),
            visible: predicates::always,
            body: ActionKind::Look,
        },
        Descriptor {
            name: "move",
            title: "Move",
            description: "Walk through an exit of the current location.",
            params: ParamSchema::empty().required(
                "direction",
                ParamType::String,
                "Compass direction of the exit (north, south, east, west; n/s/e/w also work)",
            ),
            visible: predicates::has_exits,
            body: ActionKind::Move,
        },
        Descriptor {
            name: "pickup",
            title: "Pick up",
            description: "Pick up an item lying at the current location.",
            params: ParamSchema::empty().required("item", ParamType::String, "Id of the item"),
            visible: predicates::items_here,
            body: ActionKind::Pickup,
        },
        Descriptor {
            name: "drop",
            title: "Drop",
            description: "Put down an item you are carrying.",
            params: ParamSchema::empty().required("item", ParamType::String, "Id of the item"),
            visible: predicates::holding_anything,
            body: ActionKind::Drop,
        },
        Descriptor {
            name: "inventory",
            title: "Inventory",
            description: "List what you are carrying.",
            params: ParamSchema::empty(),
            visible: predicates::always,
            body: ActionKind::Inventory,
        },
        Descriptor {
            name: "attack",
            title: "Attack",
            description: "Fight the hostile creature at the current location.",
            params: ParamSchema::empty().optional(
                "target",
                ParamType::String,
                "Id of the creature to attack (defaults to whatever is here)",
            ),
            visible: predicates::hostile_present,
            body: ActionKind::Attack,
        },
        Descriptor {
            name: "accept_quest",
            title: "Accept quest",
            description: "Accept the task offered by someone at this location.",
            params: ParamSchema::empty(),
            visible: predicates::quest_offered,
            body: ActionKind::AcceptQuest,
        },
        Descriptor {
            name: "complete_quest",
            title: "Complete quest",
            description: "Hand over what the quest giver asked for.",
            params: ParamSchema::empty(),
            visible: predicates::quest_ready,
            body: ActionKind::CompleteQuest,
        },
    ]
}

/// Computes visible actions and executes them.
pub struct ActionProvider {
    registry: Arc<SessionRegistry>,
    catalog: Vec<Descriptor<ActionKind>>,
    combat: CombatConfig,
    dice: Arc<dyn Dice>,
    generator: Arc<dyn ContentGenerator>,
}

impl ActionProvider {
    /// Creates a provider using random dice.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        combat: CombatConfig,
        generator: Arc<dyn ContentGenerator>,
    ) -> Self {
        Self {
            registry,
            catalog: catalog(),
            combat,
            dice: Arc::new(RandomDice),
            generator,
        }
    }

    /// Replaces the combat dice.
    #[must_use]
    pub fn with_dice(mut self, dice: Arc<dyn Dice>) -> Self {
        self.dice = dice;
        self
    }

    /// Actions currently visible to `session`, in catalog order.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::UnknownSession`] if the session is gone.
    pub fn list(&self, session: &SessionId) -> Result<Vec<&Descriptor<ActionKind>>, CapabilityError> {
        let state = snapshot(&self.registry, session)?;
        Ok(visible(&self.catalog, &self.registry, &state))
    }

    /// Invokes the action `name` for `session`.
    ///
    /// In-world failures ("you can't go that way") come back as an
    /// error-flagged [`ActionResult`]; only protocol-level problems are
    /// returned as `Err`.
    ///
    /// # Errors
    ///
    /// - [`CapabilityError::NotFound`] if `name` is not currently visible
    /// - [`CapabilityError::Validation`] if `arguments` fail the schema
    /// - [`CapabilityError::UnknownSession`] if the session is gone
    pub async fn invoke(
        &self,
        name: &str,
        session: &SessionId,
        arguments: &Value,
    ) -> Result<ActionResult, CapabilityError> {
        let (descriptor, state) =
            find_visible(CapabilityKind::Actions, &self.catalog, &self.registry, session, name)?;
        let args = descriptor.params.validate(arguments)?;

        tracing::debug!(%session, action = name, "invoking action");

        match descriptor.body {
            ActionKind::Look => Ok(self.look(&state).await),
            ActionKind::Move => self.walk(session, &args),
            ActionKind::Pickup => self.pickup(session, &args),
            ActionKind::Drop => self.drop_item(session, &args),
            ActionKind::Inventory => Ok(self.inventory(&state)),
            ActionKind::Attack => self.attack(session, &state, &args).await,
            ActionKind::AcceptQuest => settle(self.registry.accept_quest(session), |()| {
                let quest = self.registry.world().quest();
                format!("Quest accepted: {}\n{}", quest.title, quest.briefing)
            }),
            ActionKind::CompleteQuest => settle(self.registry.complete_quest(session), |()| {
                let quest = self.registry.world().quest();
                format!("Quest complete: {}\n{}", quest.title, quest.reward)
            }),
        }
    }

    fn describe(&self, state: &SubjectState) -> String {
        let world = self.registry.world();
        let monster = state.hostile_here(world).map(|m| m.id);
        let items = state.items_here().into_iter().flatten();
        render_location(world, &state.location, items, monster)
    }

    async fn look(&self, state: &SubjectState) -> ActionResult {
        let description = self.describe(state);
        let request = GenerationRequest::new(
            NARRATOR,
            format!("Embellish this scene without changing any facts:\n{description}"),
        );
        let result = ActionResult::text(description);
        match embellish(self.generator.as_ref(), request).await {
            Some(flavour) => result.with_text(flavour),
            None => result,
        }
    }

    fn walk(&self, session: &SessionId, args: &Arguments) -> Result<ActionResult, CapabilityError> {
        let direction = args.str("direction").unwrap_or_default();
        settle(self.registry.move_subject(session, direction), |movement| {
            let arrived = self
                .registry
                .snapshot(session)
                .map(|state| self.describe(&state))
                .unwrap_or_default();
            let from = self
                .registry
                .world()
                .location(&movement.from)
                .map_or(movement.from.as_str(), |l| l.name);
            format!(
                "You head {} from the {from}.\n\n{arrived}",
                normalize_direction(direction)
            )
        })
    }

    fn pickup(&self, session: &SessionId, args: &Arguments) -> Result<ActionResult, CapabilityError> {
        let item = args.str("item").unwrap_or_default();
        settle(self.registry.grant_item(session, item), |()| {
            format!("You pick up the {}.", self.item_name(item))
        })
    }

    fn drop_item(&self, session: &SessionId, args: &Arguments) -> Result<ActionResult, CapabilityError> {
        let item = args.str("item").unwrap_or_default();
        settle(self.registry.drop_item(session, item), |()| {
            format!("You put down the {}.", self.item_name(item))
        })
    }

    fn inventory(&self, state: &SubjectState) -> ActionResult {
        if state.inventory.is_empty() {
            return ActionResult::text("You are empty-handed.");
        }
        let names: Vec<String> = state
            .inventory
            .iter()
            .map(|id| format!("- {} ({id})", self.item_name(id)))
            .collect();
        ActionResult::text(format!("You are carrying:\n{}", names.join("\n")))
    }

    /// Resolves a fight. The roll and any narration happen before anything is
    /// committed; the commit goes back through the registry, which re-checks
    /// that the monster is still here since the state may have moved on while
    /// this call was suspended.
    async fn attack(
        &self,
        session: &SessionId,
        state: &SubjectState,
        args: &Arguments,
    ) -> Result<ActionResult, CapabilityError> {
        let world = self.registry.world();
        let Some(monster) = state.hostile_here(world) else {
            return Ok(ActionResult::error(Rejection::NoHostile.to_string()));
        };
        let target = args.str("target");
        if let Some(target) = target {
            if !target.eq_ignore_ascii_case(monster.id) {
                return Ok(ActionResult::error(
                    Rejection::NoSuchTarget {
                        target: target.to_string(),
                    }
                    .to_string(),
                ));
            }
        }

        let won = self.dice.roll() < self.combat.win_probability;
        let outcome = if won { "wins" } else { "loses" };
        let narration = embellish(
            self.generator.as_ref(),
            GenerationRequest::new(
                NARRATOR,
                format!(
                    "Narrate a short fight against: {}. The player {outcome}.",
                    monster.description
                ),
            ),
        )
        .await;

        let result = if won {
            settle(self.registry.defeat_monster(session, Some(monster.id)), |_| {
                format!("You strike down the {}!", monster.name)
            })?
        } else {
            let still_here = self
                .registry
                .snapshot(session)
                .and_then(|s| s.hostile_here(world).map(|m| m.id))
                == Some(monster.id);
            if !still_here {
                return Ok(ActionResult::error(format!(
                    "The {} is no longer here.",
                    monster.name
                )));
            }
            match self.combat.on_defeat {
                DefeatEffect::Stay => {
                    ActionResult::text(format!("The {} fends you off.", monster.name))
                }
                DefeatEffect::Retreat => settle(self.registry.retreat(session), |movement| {
                    let place = world
                        .location(&movement.to)
                        .map_or(movement.to.as_str(), |l| l.name);
                    format!(
                        "The {} overpowers you. You stagger back to the {place}.",
                        monster.name
                    )
                })?,
            }
        };

        Ok(match narration {
            Some(text) if !result.is_error => result.with_text(text),
            _ => result,
        })
    }

    fn item_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.registry.world().item(id).map_or(id, |i| i.name)
    }
}

/// Turns a registry outcome into an action result: rejections become
/// error-flagged narrative, a vanished session becomes a hard error.
fn settle<T>(
    outcome: Result<T, Rejection>,
    describe: impl FnOnce(T) -> String,
) -> Result<ActionResult, CapabilityError> {
    match outcome {
        Ok(value) => Ok(ActionResult::text(describe(value))),
        Err(Rejection::UnknownSession(session)) => Err(CapabilityError::UnknownSession(session)),
        Err(rejection) => Ok(ActionResult::error(rejection.to_string())),
    }
}
