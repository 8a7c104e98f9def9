//! Sessions, subject state and the registry that owns them.
//!
//! ```text
//! create_session() ──▶ [Session] ──1:1──▶ [SubjectState]
//!                                              │
//!              move_subject / grant_item / ... │ validate, apply, emit
//!                                              ▼
//!                                       SessionEvent ──▶ subscribers
//! ```

mod events;
mod registry;
mod state;

pub use events::{SessionEvent, StateChange};
pub use registry::{Movement, Rejection, SessionRegistry};
pub use state::{Session, SessionId, SubjectFlags, SubjectId, SubjectState};
