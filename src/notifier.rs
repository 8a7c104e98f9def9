//! Change notifications.
//!
//! The notifier listens to the registry's typed events and turns them into
//! `notifications/{kind}/list_changed` messages for the sessions attached to
//! one connection. It never looks at list contents: the mapping from event to
//! affected kinds is static and errs on the side of notifying. Events that
//! are already queued when a batch starts are folded into that batch, so a
//! mutation that emits several events produces at most one notification per
//! kind and session.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::capability::{uris_affected_by, CapabilityKind};
use crate::mcp::protocol::OutgoingNotification;
use crate::mcp::transport::MessageSender;
use crate::session::{SessionEvent, SessionId, StateChange};

/// Capability kinds whose visible list a change may have altered.
#[must_use]
pub const fn kinds_affected_by(change: &StateChange) -> &'static [CapabilityKind] {
    use CapabilityKind::{Actions, Resources, Templates};

    match change {
        StateChange::RoomItemsChanged { .. } => &[Actions, Resources],
        StateChange::LocationChanged { .. }
        | StateChange::InventoryChanged
        | StateChange::HostilePresenceChanged { .. }
        | StateChange::QuestChanged { .. } => &[Actions, Templates, Resources],
    }
}

#[derive(Default)]
struct Interest {
    sessions: HashSet<SessionId>,
    subscriptions: HashMap<SessionId, BTreeSet<String>>,
}

/// What one connection cares about: the sessions it has bound and the
/// resource uris it subscribed to. Shared by the dispatcher, which records
/// interest, and the notifier, which consults it.
#[derive(Default)]
pub struct ConnectionInterest {
    inner: Mutex<Interest>,
}

impl ConnectionInterest {
    /// Creates an empty interest set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `session`'s events to this connection.
    pub fn attach(&self, session: &SessionId) {
        self.lock().sessions.insert(session.clone());
    }

    /// Whether `session` is attached.
    #[must_use]
    pub fn is_attached(&self, session: &SessionId) -> bool {
        self.lock().sessions.contains(session)
    }

    /// Records a resource subscription. Returns `false` if it already existed.
    pub fn subscribe(&self, session: &SessionId, uri: &str) -> bool {
        self.lock()
            .subscriptions
            .entry(session.clone())
            .or_default()
            .insert(uri.to_string())
    }

    /// Removes a resource subscription. Returns `false` if there was none.
    pub fn unsubscribe(&self, session: &SessionId, uri: &str) -> bool {
        self.lock()
            .subscriptions
            .get_mut(session)
            .is_some_and(|uris| uris.remove(uri))
    }

    /// Whether `session` subscribed to `uri`.
    #[must_use]
    pub fn is_subscribed(&self, session: &SessionId, uri: &str) -> bool {
        self.lock()
            .subscriptions
            .get(session)
            .is_some_and(|uris| uris.contains(uri))
    }

    fn lock(&self) -> MutexGuard<'_, Interest> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Turns registry events into notifications for one connection.
pub struct ChangeNotifier {
    interest: Arc<ConnectionInterest>,
    sender: Arc<dyn MessageSender>,
}

impl ChangeNotifier {
    /// Creates a notifier delivering through `sender`.
    #[must_use]
    pub fn new(interest: Arc<ConnectionInterest>, sender: Arc<dyn MessageSender>) -> Self {
        Self { interest, sender }
    }

    /// Consumes events until the registry side of the channel closes.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(first) = events.recv().await {
            let mut batch = vec![first];
            while let Ok(event) = events.try_recv() {
                batch.push(event);
            }
            self.publish(&batch);
        }
        tracing::debug!("event channel closed, notifier stopping");
    }

    /// Sends the notifications for one batch of events. Returns how many
    /// messages were handed to the transport.
    pub fn publish(&self, batch: &[SessionEvent]) -> usize {
        let mut kinds: BTreeSet<(&SessionId, CapabilityKind)> = BTreeSet::new();
        let mut uris: BTreeSet<(&SessionId, &'static str)> = BTreeSet::new();

        for event in batch {
            if !self.interest.is_attached(&event.session) {
                continue;
            }
            for kind in kinds_affected_by(&event.change) {
                kinds.insert((&event.session, *kind));
            }
            for uri in uris_affected_by(&event.change) {
                if self.interest.is_subscribed(&event.session, uri) {
                    uris.insert((&event.session, *uri));
                }
            }
        }

        let mut sent = 0;
        for (session, kind) in kinds {
            tracing::debug!(%session, %kind, "list changed");
            sent += usize::from(self.deliver(OutgoingNotification::list_changed(kind)));
        }
        for (session, uri) in uris {
            tracing::debug!(%session, uri, "subscribed resource updated");
            sent += usize::from(self.deliver(OutgoingNotification::resource_updated(uri)));
        }
        sent
    }

    /// Announces every kind as changed, prompting a full re-list.
    pub fn announce_all(&self) -> usize {
        CapabilityKind::ALL
            .into_iter()
            .map(|kind| usize::from(self.deliver(OutgoingNotification::list_changed(kind))))
            .sum()
    }

    fn deliver(&self, notification: OutgoingNotification) -> bool {
        let method = notification.method.clone();
        match self.sender.send(notification.into()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%method, error = %e, "dropping notification");
                false
            }
        }
    }
}
