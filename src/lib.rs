//! STOMP Game-Day Client Library
//!
//! This crate implements the client side of a small STOMP 1.2 dialect used
//! to publish and follow live sports-game events.
//!
//! # Overview
//!
//! - **Frame Codec** - Builds outgoing frames and decodes inbound ones
//!   (`frame`).
//!
//! - **Session State** - Connection status, subscription/receipt id counters
//!   and the topic table, with validated transitions (`state::session`).
//!
//! - **Protocol Engine** - Console commands to frames, inbound frames to
//!   session transitions (`protocol`).
//!
//! - **Game Aggregation** - Out-of-order event reports merged into a
//!   time-ordered history per (game, user) and summarized on demand
//!   (`state::game`).
//!
//! - **Client Loops** - The console loop and the socket read loop sharing
//!   one engine (`client`).
//!
//! # Design Principles
//!
//! 1. **State machines validate transitions** - The session only becomes
//!    connected when the server says so, and only a matching RECEIPT logs
//!    it out.
//!
//! 2. **Nothing escapes as an error** - Commands and frames produce notices
//!    for the console and a keep-going flag.
//!
//! 3. **Transport is a seam** - The engine talks to a [`transport::Transport`];
//!    [`transport::TcpTransport`] is the production implementation.
//!
//! # Example
//!
//! ```rust,no_run
//! use stomp_gameday::{client, ClientConfig, StompProtocol, TcpTransport};
//!
//! let config = ClientConfig::default();
//! let transport = TcpTransport::new(config.max_frame_size);
//! let mut client = client::Client::new(StompProtocol::new(transport, config), client::stdout_sink());
//!
//! let stdin = std::io::stdin();
//! client.run(stdin.lock()).unwrap();
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod protocol;
pub mod state;
pub mod transport;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{BodyParseError, EventFileError, SummaryError, TransportError};
pub use frame::{Frame, FrameCommand};
pub use protocol::{Command, CommandOutcome, Notice, ServerOutcome, StompProtocol};
pub use state::*;
pub use transport::{TcpTransport, Transport};
