//! Client configuration.

/// Protocol version announced in CONNECT.
pub const STOMP_VERSION: &str = "1.2";

/// Virtual host sent in the CONNECT `host` header.
pub const DEFAULT_STOMP_HOST: &str = "stomp.cs.bgu.ac.il";

/// Largest inbound frame accepted by the TCP transport (1 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1_048_576;

/// Tunables shared by the protocol engine and the TCP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Value of the CONNECT `host` header.
    pub stomp_host: String,

    /// Value of the CONNECT `accept-version` header.
    pub accept_version: String,

    /// Inbound frames larger than this end the read loop.
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            stomp_host: DEFAULT_STOMP_HOST.to_string(),
            accept_version: STOMP_VERSION.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stomp_host(mut self, host: impl Into<String>) -> Self {
        self.stomp_host = host.into();
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.max(1);
        self
    }
}
