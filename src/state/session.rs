//! Session state machine.
//!
//! Tracks the connection status, the id counters and the subscription table
//! of one client session.
//!
//! # State Diagram
//!
//! ```text
//! ┌──────────────┐   CONNECTED frame   ┌───────────┐
//! │ Disconnected │────────────────────▶│ Connected │
//! └──────────────┘                     └─────┬─────┘
//!        ▲                                   │
//!        │  ERROR frame / RECEIPT matching   │
//!        │  the pending DISCONNECT           │
//!        └───────────────────────────────────┘
//! ```
//!
//! `login` does not move the session by itself: a CONNECT that is still in
//! flight counts as disconnected until the server answers.

use std::collections::HashMap;
use std::fmt;

/// Connection status as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connected,
}

impl SessionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Inputs that move the session between states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Server answered CONNECT with CONNECTED.
    ConnectAccepted,
    /// Server sent ERROR and dropped the session.
    ErrorReceived,
    /// RECEIPT for the pending DISCONNECT arrived.
    LogoutConfirmed { receipt_id: u64 },
    /// Transport reached EOF or failed.
    ConnectionLost,
}

/// Error when a state transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: SessionStatus,
    pub event: SessionEvent,
    pub reason: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid transition from {} via {:?}: {}",
            self.from, self.event, self.reason
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// Ids allocated for a SUBSCRIBE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub subscription_id: u64,
    pub receipt_id: u64,
}

/// Per-session protocol state.
///
/// Subscription and receipt ids come from independent counters that only
/// ever increase, so no id is reused while the process lives.
#[derive(Debug, Clone, Default)]
pub struct Session {
    status: SessionStatus,

    /// Next subscription id to hand out
    next_subscription_id: u64,

    /// Next receipt id to hand out
    next_receipt_id: u64,

    /// Receipt id of the DISCONNECT sent by `logout`
    pending_disconnect: Option<u64>,

    /// User named in the last CONNECT that was sent
    current_user: Option<String>,

    /// Topic to subscription id
    subscriptions: HashMap<String, u64>,
}

impl Session {
    /// Create a disconnected session with both counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current connection status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Check if the server has accepted the CONNECT.
    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    /// User of the last CONNECT sent.
    pub fn current_user(&self) -> Option<&str> {
        self.current_user.as_deref()
    }

    /// Remember the user named in a CONNECT.
    pub fn set_current_user(&mut self, user: impl Into<String>) {
        self.current_user = Some(user.into());
    }

    /// Receipt id awaited for DISCONNECT, if a logout is in progress.
    pub fn pending_disconnect(&self) -> Option<u64> {
        self.pending_disconnect
    }

    /// Subscription id recorded for `topic`.
    pub fn subscription_id(&self, topic: &str) -> Option<u64> {
        self.subscriptions.get(topic).copied()
    }

    /// Check if `topic` has been joined.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.contains_key(topic)
    }

    /// Subscribed topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = self.subscriptions.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Allocate the next subscription id.
    pub fn next_subscription_id(&mut self) -> u64 {
        let id = self.next_subscription_id;
        self.next_subscription_id += 1;
        id
    }

    /// Allocate the next receipt id.
    pub fn next_receipt_id(&mut self) -> u64 {
        let id = self.next_receipt_id;
        self.next_receipt_id += 1;
        id
    }

    /// Allocate ids for `topic` and record the subscription. Joining a topic
    /// twice replaces the recorded id.
    pub fn subscribe(&mut self, topic: &str) -> Subscription {
        let subscription_id = self.next_subscription_id();
        let receipt_id = self.next_receipt_id();
        if let Some(old) = self.subscriptions.insert(topic.to_string(), subscription_id) {
            log::debug!("topic {} re-joined, replacing subscription {}", topic, old);
        }
        Subscription {
            subscription_id,
            receipt_id,
        }
    }

    /// Roll back a subscription whose SUBSCRIBE could not be sent.
    pub fn forget(&mut self, topic: &str, subscription_id: u64) {
        if self.subscriptions.get(topic) == Some(&subscription_id) {
            self.subscriptions.remove(topic);
        }
    }

    /// Forget the subscription for `topic` and allocate a receipt for the
    /// UNSUBSCRIBE. `None` when the topic was never joined.
    pub fn unsubscribe(&mut self, topic: &str) -> Option<Subscription> {
        let subscription_id = self.subscriptions.remove(topic)?;
        Some(Subscription {
            subscription_id,
            receipt_id: self.next_receipt_id(),
        })
    }

    /// Allocate and remember the receipt id for DISCONNECT.
    pub fn begin_logout(&mut self) -> u64 {
        let receipt_id = self.next_receipt_id();
        self.pending_disconnect = Some(receipt_id);
        receipt_id
    }

    /// Check if `receipt_id` answers the pending DISCONNECT.
    pub fn is_disconnect_receipt(&self, receipt_id: u64) -> bool {
        self.pending_disconnect == Some(receipt_id)
    }

    /// Apply an event in place, returning error if invalid.
    pub fn apply_mut(&mut self, event: SessionEvent) -> Result<(), InvalidTransition> {
        self.status = self.transition(&event)?;
        if !self.status.is_connected() {
            self.reset();
        }
        Ok(())
    }

    /// Calculate the new status for an event.
    fn transition(&self, event: &SessionEvent) -> Result<SessionStatus, InvalidTransition> {
        use SessionEvent::*;
        use SessionStatus::*;

        let invalid = |reason: &'static str| InvalidTransition {
            from: self.status,
            event: event.clone(),
            reason,
        };

        match (self.status, event) {
            (Disconnected, ConnectAccepted) => Ok(Connected),
            (Connected, ConnectAccepted) => Err(invalid("Already connected")),

            // The server may drop the session at any time
            (_, ErrorReceived) | (_, ConnectionLost) => Ok(Disconnected),

            (Connected, LogoutConfirmed { receipt_id }) => {
                if self.is_disconnect_receipt(*receipt_id) {
                    Ok(Disconnected)
                } else {
                    Err(invalid("Receipt does not match pending disconnect"))
                }
            }
            (Disconnected, LogoutConfirmed { .. }) => Err(invalid("Not connected")),
        }
    }

    /// Drop per-connection data. Counters keep running.
    fn reset(&mut self) {
        self.subscriptions.clear();
        self.pending_disconnect = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn connected() -> Session {
        let mut session = Session::new();
        session.apply_mut(SessionEvent::ConnectAccepted).unwrap();
        session
    }

    #[test]
    fn test_initial_state() {
        let session = Session::new();
        assert_eq!(session.status(), SessionStatus::Disconnected);
        assert!(session.current_user().is_none());
        assert!(session.pending_disconnect().is_none());
        assert!(session.topics().is_empty());
    }

    #[test]
    fn test_connect_and_error() {
        let mut session = connected();
        assert!(session.is_connected());

        session.subscribe("a_b");
        session.apply_mut(SessionEvent::ErrorReceived).unwrap();
        assert!(!session.is_connected());
        assert!(session.topics().is_empty());

        // ERROR while already disconnected is still accepted
        session.apply_mut(SessionEvent::ErrorReceived).unwrap();

        let mut session = connected();
        session.apply_mut(SessionEvent::ConnectionLost).unwrap();
        assert!(!session.is_connected());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut session = connected();
        let err = session.apply_mut(SessionEvent::ConnectAccepted).unwrap_err();
        assert_eq!(err.reason, "Already connected");

        let mut fresh = Session::new();
        let err = fresh
            .apply_mut(SessionEvent::LogoutConfirmed { receipt_id: 0 })
            .unwrap_err();
        assert_eq!(err.from, SessionStatus::Disconnected);
        assert_eq!(
            err.to_string(),
            "Invalid transition from Disconnected via LogoutConfirmed { receipt_id: 0 }: Not connected"
        );
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let mut session = connected();

        let a = session.subscribe("a_b");
        let c = session.subscribe("c_d");
        assert_eq!(a, Subscription { subscription_id: 0, receipt_id: 0 });
        assert_eq!(c, Subscription { subscription_id: 1, receipt_id: 1 });
        assert_eq!(session.topics(), vec!["a_b".to_string(), "c_d".to_string()]);

        let removed = session.unsubscribe("a_b").unwrap();
        assert_eq!(removed.subscription_id, 0);
        assert_eq!(removed.receipt_id, 2);
        assert!(!session.is_subscribed("a_b"));
        assert_eq!(session.subscription_id("c_d"), Some(1));

        assert!(session.unsubscribe("a_b").is_none());
        assert!(session.unsubscribe("never").is_none());
    }

    #[test]
    fn test_ids_strictly_increase() {
        let mut session = connected();
        let mut subscription_ids = Vec::new();
        let mut receipt_ids = Vec::new();

        for round in 0..5 {
            let topic = format!("t{}", round);
            let sub = session.subscribe(&topic);
            subscription_ids.push(sub.subscription_id);
            receipt_ids.push(sub.receipt_id);
            if round % 2 == 0 {
                receipt_ids.push(session.unsubscribe(&topic).unwrap().receipt_id);
            }
        }
        receipt_ids.push(session.begin_logout());

        assert!(subscription_ids.windows(2).all(|w| w[0] < w[1]));
        assert!(receipt_ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(session.topics(), vec!["t1".to_string(), "t3".to_string()]);
    }

    #[test]
    fn test_logout_receipt_matching() {
        let mut session = connected();
        session.subscribe("a_b");
        let receipt = session.begin_logout();
        assert_eq!(session.pending_disconnect(), Some(receipt));

        // A SUBSCRIBE receipt leaves the session alone
        let err = session
            .apply_mut(SessionEvent::LogoutConfirmed { receipt_id: 0 })
            .unwrap_err();
        assert_eq!(err.reason, "Receipt does not match pending disconnect");
        assert!(session.is_connected());

        session
            .apply_mut(SessionEvent::LogoutConfirmed { receipt_id: receipt })
            .unwrap();
        assert!(!session.is_connected());
        assert!(session.pending_disconnect().is_none());
        assert!(session.topics().is_empty());

        // Counters survive the reset
        let next = session.next_receipt_id();
        assert!(next > receipt);
    }
}
