//! Error types for the client engine.
//!
//! None of these escape the command dispatcher or the server handler; they
//! are turned into console notices or log lines at that boundary.

use std::path::PathBuf;

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// `send_frame`/`read_frame` called before a successful `connect`.
    #[error("not connected")]
    NotConnected,

    /// `connect` called while a connection is already open.
    #[error("already connected")]
    AlreadyConnected,

    /// A read loop still holds the previous connection's reader.
    #[error("previous connection is still being read")]
    ReaderBusy,

    /// An inbound frame grew past the configured limit.
    #[error("frame size exceeds maximum {max}")]
    FrameTooLarge { max: usize },

    /// An inbound frame was not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to load an events file for `report`.
#[derive(Debug, thiserror::Error)]
pub enum EventFileError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid events file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A report body that does not follow the labeled layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BodyParseError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid time value `{0}`")]
    InvalidTime(String),

    #[error("line {line}: expected `key:value`, got `{text}`")]
    MalformedUpdate { line: usize, text: String },
}

/// Failure to produce a summary file.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("no data available for game {game} from user {user}")]
    NoData { game: String, user: String },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
