//! STOMP frame codec.
//!
//! Frames are line-oriented text:
//!
//! ```text
//! COMMAND\n
//! header1:value1\n
//! header2:value2\n
//! \n
//! [body]
//! ```
//!
//! The encoders here produce frame text without the trailing NUL byte; the
//! transport appends the terminator when it writes the frame.

use std::fmt;

use crate::config::ClientConfig;

/// Frame terminator on the wire.
pub const FRAME_TERMINATOR: char = '\0';

/// Frame command tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameCommand {
    // Client -> server
    Connect,
    Subscribe,
    Unsubscribe,
    Send,
    Disconnect,

    // Server -> client
    Connected,
    Error,
    Receipt,
    Message,

    /// Anything else, kept verbatim (including the empty command).
    Other(String),
}

impl FrameCommand {
    pub fn parse(token: &str) -> Self {
        match token {
            "CONNECT" => Self::Connect,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "SEND" => Self::Send,
            "DISCONNECT" => Self::Disconnect,
            "CONNECTED" => Self::Connected,
            "ERROR" => Self::Error,
            "RECEIPT" => Self::Receipt,
            "MESSAGE" => Self::Message,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Connect => "CONNECT",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Send => "SEND",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Error => "ERROR",
            Self::Receipt => "RECEIPT",
            Self::Message => "MESSAGE",
            Self::Other(token) => token,
        }
    }
}

impl fmt::Display for FrameCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single decoded (or to-be-encoded) frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub command: String,

    /// Headers in wire order. Keys are unique; a repeated key replaces the
    /// earlier value in place.
    pub headers: Vec<(String, String)>,

    pub body: String,
}

impl Frame {
    /// Create an empty frame for `command`.
    pub fn new(command: FrameCommand) -> Self {
        Self {
            command: command.as_str().to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Builder-style header insertion.
    pub fn with_header(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set_header(key, value.to_string());
        self
    }

    /// Builder-style body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a header, replacing an existing value in place.
    pub fn set_header(&mut self, key: impl Into<String>, value: String) {
        let key = key.into();
        match self.headers.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((key, value)),
        }
    }

    /// Look up a header value.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Classify the command line.
    pub fn kind(&self) -> FrameCommand {
        FrameCommand::parse(&self.command)
    }

    /// Render the frame text (no terminator).
    pub fn to_wire(&self) -> String {
        let mut out = String::with_capacity(self.command.len() + self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (key, value) in &self.headers {
            out.push_str(key);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out
    }
}

/// CONNECT frame. `host` and `port` identify the socket endpoint only; the
/// `host` header carries the configured virtual host.
pub fn encode_connect(host: &str, port: u16, login: &str, passcode: &str) -> String {
    encode_connect_with(&ClientConfig::default(), host, port, login, passcode)
}

/// CONNECT frame using the virtual host and version from `config`.
pub fn encode_connect_with(
    config: &ClientConfig,
    host: &str,
    port: u16,
    login: &str,
    passcode: &str,
) -> String {
    log::trace!("building CONNECT for {}:{}", host, port);
    Frame::new(FrameCommand::Connect)
        .with_header("accept-version", &config.accept_version)
        .with_header("host", &config.stomp_host)
        .with_header("login", login)
        .with_header("passcode", passcode)
        .to_wire()
}

/// SUBSCRIBE frame for `/topic`, asking for a receipt.
pub fn encode_subscribe(topic: &str, subscription_id: u64, receipt_id: u64) -> String {
    Frame::new(FrameCommand::Subscribe)
        .with_header("destination", format!("/{}", topic))
        .with_header("id", subscription_id)
        .with_header("receipt", receipt_id)
        .to_wire()
}

/// UNSUBSCRIBE frame, asking for a receipt.
pub fn encode_unsubscribe(subscription_id: u64, receipt_id: u64) -> String {
    Frame::new(FrameCommand::Unsubscribe)
        .with_header("id", subscription_id)
        .with_header("receipt", receipt_id)
        .to_wire()
}

/// SEND frame; the body is newline-terminated.
pub fn encode_send(topic: &str, body: &str) -> String {
    Frame::new(FrameCommand::Send)
        .with_header("destination", format!("/{}", topic))
        .with_body(format!("{}\n", body))
        .to_wire()
}

/// DISCONNECT frame; its receipt marks the end of the session.
pub fn encode_disconnect(receipt_id: u64) -> String {
    Frame::new(FrameCommand::Disconnect)
        .with_header("receipt", receipt_id)
        .to_wire()
}

/// Decode raw frame text.
///
/// Never fails: header lines without a colon are skipped, a missing blank
/// line means there is no body, and a single trailing NUL is stripped from
/// the body.
pub fn decode(raw: &str) -> Frame {
    let mut frame = Frame::default();
    let mut rest = raw;

    let (first, remainder) = split_line(rest);
    frame.command = first.trim().to_string();
    rest = remainder.unwrap_or("");

    loop {
        if rest.is_empty() {
            return frame;
        }
        let (line, remainder) = split_line(rest);
        rest = remainder.unwrap_or("");

        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            frame.set_header(key.trim(), value.trim().to_string());
        }
        if remainder.is_none() {
            return frame;
        }
    }

    frame.body = rest
        .strip_suffix(FRAME_TERMINATOR)
        .unwrap_or(rest)
        .to_string();
    frame
}

fn split_line(text: &str) -> (&str, Option<&str>) {
    match text.split_once('\n') {
        Some((line, rest)) => (line, Some(rest)),
        None => (text, None),
    }
}
