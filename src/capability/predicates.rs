//! Visibility predicates.
//!
//! Every catalog entry names one of these. They are pure functions of the
//! subject's current state and the world, so any two evaluations over the
//! same state agree.

use crate::session::{SubjectFlags, SubjectState};
use crate::world::WorldOracle;

/// What a predicate may look at.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    /// Current subject state.
    pub state: &'a SubjectState,
    /// World content.
    pub world: &'a dyn WorldOracle,
}

/// A visibility predicate.
pub type Predicate = fn(&Context<'_>) -> bool;

/// Visible in every state.
pub const fn always(_: &Context<'_>) -> bool {
    true
}

/// The current location has at least one exit.
pub fn has_exits(ctx: &Context<'_>) -> bool {
    ctx.world
        .location(&ctx.state.location)
        .is_some_and(|l| !l.exits.is_empty())
}

/// Something is lying at the current location.
pub fn items_here(ctx: &Context<'_>) -> bool {
    ctx.state.items_here().is_some()
}

/// The inventory is not empty.
pub fn holding_anything(ctx: &Context<'_>) -> bool {
    !ctx.state.inventory.is_empty()
}

/// An undefeated monster shares the location.
pub const fn hostile_present(ctx: &Context<'_>) -> bool {
    ctx.state.has(SubjectFlags::HOSTILE_PRESENT)
}

/// At the quest giver, with the quest neither active nor done.
pub fn quest_offered(ctx: &Context<'_>) -> bool {
    ctx.state.location == ctx.world.quest().giver_location && !quest_known(ctx)
}

/// The quest can be turned in right now.
pub fn quest_ready(ctx: &Context<'_>) -> bool {
    let quest = ctx.world.quest();
    ctx.state.has(SubjectFlags::ACTIVE_QUEST)
        && ctx.state.location == quest.giver_location
        && ctx.state.holds(quest.required_item)
}

/// The quest has been accepted and not yet completed.
pub const fn quest_active(ctx: &Context<'_>) -> bool {
    ctx.state.has(SubjectFlags::ACTIVE_QUEST)
}

/// The quest has been accepted at some point.
pub const fn quest_known(ctx: &Context<'_>) -> bool {
    ctx.state.flags.intersects(SubjectFlags::ACTIVE_QUEST.union(SubjectFlags::QUEST_COMPLETED))
}
