//! Shared client state.
//!
//! - `session` - connection status, id counters, subscription table
//! - `game` - per (game, user) event histories and summaries
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          ClientState                          │
//! │                                                               │
//! │  ┌──────────────────────┐      ┌───────────────────────────┐  │
//! │  │   Mutex<Session>     │      │      GameAggregator       │  │
//! │  │                      │      │                           │  │
//! │  │ status               │      │ Mutex<                    │  │
//! │  │ subscription/receipt │      │   (game, user) →          │  │
//! │  │   counters           │      │     GameHistory           │  │
//! │  │ topic → sub id       │      │ >                         │  │
//! │  │ pending disconnect   │      │                           │  │
//! │  └──────────────────────┘      └───────────────────────────┘  │
//! │            ▲                                ▲                 │
//! │            │                                │                 │
//! │   command loop (user input)      server read loop (frames)    │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both loops lock each structure only for the duration of one state
//! change; neither lock is held while talking to the transport.

pub mod game;
pub mod session;

pub use game::{
    EventReport, GameAggregator, GameEvent, GameHistory, GameSummary, HistoryKey, Updates,
};
pub use session::{InvalidTransition, Session, SessionEvent, SessionStatus, Subscription};

use parking_lot::{Mutex, MutexGuard};

/// Combined state shared by the command loop and the read loop.
#[derive(Debug, Default)]
pub struct ClientState {
    session: Mutex<Session>,
    pub games: GameAggregator,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the session. Never hold the guard across a send.
    pub fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock()
    }

    /// Check if the session is connected.
    pub fn is_connected(&self) -> bool {
        self.session.lock().is_connected()
    }

    /// Apply a session event, logging rejected transitions.
    pub fn apply_session_event(&self, event: SessionEvent) -> Result<(), InvalidTransition> {
        let mut session = self.session.lock();
        let result = session.apply_mut(event);
        match &result {
            Ok(()) => log::info!("session is now {}", session.status()),
            Err(e) => log::warn!("{}", e),
        }
        result
    }
}
