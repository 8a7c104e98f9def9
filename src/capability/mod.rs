//! Capability providers.
//!
//! A capability is a self-describing unit the client can discover and use:
//! an **action** (callable), a **template** (prompt to render) or a
//! **resource** (readable document). Each kind has a static catalog of
//! [`Descriptor`]s; which of them a session can see is decided on every call
//! by the descriptor's [`Predicate`](predicates::Predicate) over the
//! subject's current state. Nothing is cached between calls.
//!
//! Using a capability always starts by recomputing the visible list and
//! looking the name up in it, so a name that an earlier listing exposed but
//! that is no longer valid is refused with a not-found error.

mod actions;
pub mod predicates;
mod resources;
mod schema;
mod templates;

pub use actions::{ActionKind, ActionProvider, ActionResult, Dice, FixedDice, RandomDice};
pub use resources::{uris_affected_by, ResourceContents, ResourceKind, ResourceProvider, ResourceText};
pub use schema::{
    ArgumentDescriptor, Arguments, ParamSchema, ParamSpec, ParamType, ValidationError,
};
pub use templates::{PromptMessage, TemplateKind, TemplateProvider, TemplateResult};

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::session::{SessionId, SessionRegistry, SubjectState};
use predicates::{Context, Predicate};

/// The three capability kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CapabilityKind {
    /// Callable actions.
    Actions,
    /// Prompt templates.
    Templates,
    /// Readable resources.
    Resources,
}

impl CapabilityKind {
    /// Every kind, in notification order.
    pub const ALL: [Self; 3] = [Self::Actions, Self::Templates, Self::Resources];

    /// Method namespace (`actions`, `templates`, `resources`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Actions => "actions",
            Self::Templates => "templates",
            Self::Resources => "resources",
        }
    }

    /// Singular label used in error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Actions => "Action",
            Self::Templates => "Template",
            Self::Resources => "Resource",
        }
    }

    /// Method of the notification telling clients this kind's list changed.
    #[must_use]
    pub const fn list_changed_method(self) -> &'static str {
        match self {
            Self::Actions => "notifications/actions/list_changed",
            Self::Templates => "notifications/templates/list_changed",
            Self::Resources => "notifications/resources/list_changed",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable definition of one capability.
#[derive(Debug, Clone)]
pub struct Descriptor<K> {
    /// Unique key within its kind (the uri, for resources).
    pub name: &'static str,
    /// Short display title.
    pub title: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// Parameters accepted when the capability is used.
    pub params: ParamSchema,
    /// When the capability is visible.
    pub visible: Predicate,
    /// What using the capability does.
    pub body: K,
}

impl<K> Descriptor<K> {
    /// Evaluates the visibility predicate.
    #[must_use]
    pub fn is_visible(&self, ctx: &Context<'_>) -> bool {
        (self.visible)(ctx)
    }
}

/// Failures shared by all providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// The name is unknown or not visible to this session right now.
    #[error("{} not found: {name}", .kind.label())]
    NotFound {
        /// Which catalog was searched.
        kind: CapabilityKind,
        /// The requested name or uri.
        name: String,
    },

    /// The arguments failed the schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The session disappeared.
    #[error("Session not found: {0}")]
    UnknownSession(SessionId),
}

/// A piece of content in a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
}

impl Content {
    /// Creates text content.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Snapshot of the session's subject, or an unknown-session error.
pub(crate) fn snapshot(
    registry: &SessionRegistry,
    session: &SessionId,
) -> Result<SubjectState, CapabilityError> {
    registry
        .snapshot(session)
        .ok_or_else(|| CapabilityError::UnknownSession(session.clone()))
}

/// The visible subset of `catalog`, in catalog order.
pub(crate) fn visible<'c, K>(
    catalog: &'c [Descriptor<K>],
    registry: &SessionRegistry,
    state: &SubjectState,
) -> Vec<&'c Descriptor<K>> {
    let ctx = Context {
        state,
        world: registry.world(),
    };
    catalog.iter().filter(|d| d.is_visible(&ctx)).collect()
}

/// Finds `name` among the descriptors currently visible to `session`.
pub(crate) fn find_visible<'c, K>(
    kind: CapabilityKind,
    catalog: &'c [Descriptor<K>],
    registry: &SessionRegistry,
    session: &SessionId,
    name: &str,
) -> Result<(&'c Descriptor<K>, SubjectState), CapabilityError> {
    let state = snapshot(registry, session)?;
    let found = visible(catalog, registry, &state)
        .into_iter()
        .find(|d| d.name == name)
        .ok_or_else(|| CapabilityError::NotFound {
            kind,
            name: name.to_string(),
        })?;
    Ok((found, state))
}
