//! Protocol engine.
//!
//! [`StompProtocol`] turns console commands into frames (the command side)
//! and inbound frames into session transitions (the server side). Both
//! sides run concurrently against the same [`ClientState`].
//!
//! Nothing here returns an error to the caller. Every outcome is a
//! [`Notice`] for the console plus a flag telling the calling loop whether
//! to keep going.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::ClientConfig;
use crate::error::{SummaryError, TransportError};
use crate::events::{decode_report_body, encode_report_body, parse_events_file};
use crate::frame::{self, Frame, FrameCommand};
use crate::state::{ClientState, SessionEvent};
use crate::transport::Transport;

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login {
        host: String,
        port: u16,
        user: String,
        passcode: String,
    },
    Join {
        topic: String,
    },
    Exit {
        topic: String,
    },
    Logout,
    Report {
        path: PathBuf,
    },
    Summary {
        game: String,
        user: String,
        output: PathBuf,
    },
}

impl Command {
    pub const LOGIN_USAGE: &'static str = "login {host:port} {username} {password}";
    pub const JOIN_USAGE: &'static str = "join {game_name}";
    pub const EXIT_USAGE: &'static str = "exit {game_name}";
    pub const REPORT_USAGE: &'static str = "report {file}";
    pub const SUMMARY_USAGE: &'static str = "summary {game_name} {user} {file}";

    /// Parse a console line. The first whitespace-delimited token names the
    /// command; extra trailing tokens are ignored.
    pub fn parse(line: &str) -> Result<Self, Notice> {
        let mut words = line.split_whitespace();
        let name = words.next().unwrap_or("");
        let args: Vec<&str> = words.collect();
        let usage = |usage: &'static str| Notice::Usage { usage };

        match name {
            "login" => {
                let [host_port, user, passcode, ..] = args[..] else {
                    return Err(usage(Self::LOGIN_USAGE));
                };
                let (host, port) = host_port
                    .split_once(':')
                    .ok_or(usage(Self::LOGIN_USAGE))?;
                let port = port
                    .parse::<u16>()
                    .map_err(|_| usage(Self::LOGIN_USAGE))?;
                Ok(Self::Login {
                    host: host.to_string(),
                    port,
                    user: user.to_string(),
                    passcode: passcode.to_string(),
                })
            }
            "join" => match args.first() {
                Some(topic) => Ok(Self::Join {
                    topic: topic.to_string(),
                }),
                None => Err(usage(Self::JOIN_USAGE)),
            },
            "exit" => match args.first() {
                Some(topic) => Ok(Self::Exit {
                    topic: topic.to_string(),
                }),
                None => Err(usage(Self::EXIT_USAGE)),
            },
            "logout" => Ok(Self::Logout),
            "report" => match args.first() {
                Some(path) => Ok(Self::Report {
                    path: PathBuf::from(path),
                }),
                None => Err(usage(Self::REPORT_USAGE)),
            },
            "summary" => {
                let [game, user, output, ..] = args[..] else {
                    return Err(usage(Self::SUMMARY_USAGE));
                };
                Ok(Self::Summary {
                    game: game.to_string(),
                    user: user.to_string(),
                    output: PathBuf::from(output),
                })
            }
            other => Err(Notice::UnknownCommand {
                command: other.to_string(),
            }),
        }
    }
}

/// User-visible outcome of a command or an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    // Command side
    AlreadyLoggedIn,
    LoginPending,
    ConnectFailed { host: String, port: u16, reason: String },
    LoginSent { user: String },
    NotLoggedIn,
    Joined { topic: String },
    NotSubscribed { topic: String },
    Exited { topic: String },
    LogoutSent,
    Reported { topic: String, events: usize },
    ReportFailed { path: PathBuf, reason: String },
    NoSummaryData { game: String, user: String },
    SummaryWritten { path: PathBuf },
    SummaryFailed { reason: String },
    SendFailed { reason: String },
    UnknownCommand { command: String },
    Usage { usage: &'static str },

    // Server side
    LoginSuccessful,
    ServerError { message: String, body: Option<String> },
    LoggedOut,
    ReceiptProcessed { receipt_id: String },
    Message { destination: String, body: String },
    ServerClosed,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyLoggedIn => {
                write!(f, "The client is already logged in, log out before trying again")
            }
            Self::LoginPending => {
                write!(f, "A login is already waiting for the server to answer")
            }
            Self::ConnectFailed { host, port, reason } => {
                write!(f, "Could not connect to server {}:{} ({})", host, port, reason)
            }
            Self::LoginSent { user } => write!(f, "Logging in as {}", user),
            Self::NotLoggedIn => write!(f, "User is not logged in"),
            Self::Joined { topic } => write!(f, "Joined channel {}", topic),
            Self::NotSubscribed { topic } => {
                write!(f, "User is not subscribed to channel {}", topic)
            }
            Self::Exited { topic } => write!(f, "Exited channel {}", topic),
            Self::LogoutSent => write!(f, "Logging out"),
            Self::Reported { topic, events } => {
                write!(f, "Reported {} events to {}", events, topic)
            }
            Self::ReportFailed { path, reason } => {
                write!(f, "Failed to parse events file {}: {}", path.display(), reason)
            }
            Self::NoSummaryData { game, user } => {
                write!(f, "No data available for game {} from user {}", game, user)
            }
            Self::SummaryWritten { path } => write!(f, "Summary written to {}", path.display()),
            Self::SummaryFailed { reason } => write!(f, "Failed to write summary: {}", reason),
            Self::SendFailed { reason } => write!(f, "Failed to send frame: {}", reason),
            Self::UnknownCommand { command } => write!(f, "Unknown command: {}", command),
            Self::Usage { usage } => write!(f, "Usage: {}", usage),
            Self::LoginSuccessful => write!(f, "Login successful"),
            Self::ServerError { message, body } => {
                write!(f, "Error from server: {}", message)?;
                if let Some(body) = body {
                    write!(f, "\n{}", body)?;
                }
                Ok(())
            }
            Self::LoggedOut => write!(f, "Logged out"),
            Self::ReceiptProcessed { receipt_id } => {
                write!(f, "Receipt {} processed", receipt_id)
            }
            Self::Message { destination, body } => {
                write!(f, "Message from {}:\n{}", destination, body)
            }
            Self::ServerClosed => write!(f, "Disconnected from server. Press enter to exit."),
        }
    }
}

/// Result of one console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// `false` when the transport is going down and the command loop should
    /// stop issuing commands.
    pub keep_running: bool,
    pub notice: Option<Notice>,
}

impl CommandOutcome {
    fn proceed(notice: Notice) -> Self {
        Self {
            keep_running: true,
            notice: Some(notice),
        }
    }

    fn stop(notice: Notice) -> Self {
        Self {
            keep_running: false,
            notice: Some(notice),
        }
    }
}

/// Result of one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOutcome {
    /// `false` once the server has ended the session.
    pub keep_reading: bool,
    pub notice: Option<Notice>,
}

impl ServerOutcome {
    fn proceed(notice: Option<Notice>) -> Self {
        Self {
            keep_reading: true,
            notice,
        }
    }

    fn stop(notice: Notice) -> Self {
        Self {
            keep_reading: false,
            notice: Some(notice),
        }
    }
}

/// Client protocol engine over a transport.
#[derive(Debug)]
pub struct StompProtocol<T: Transport> {
    transport: T,
    state: ClientState,
    config: ClientConfig,
}

impl<T: Transport> StompProtocol<T> {
    /// Create an engine with a fresh, disconnected session.
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            state: ClientState::new(),
            config,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // Command side

    /// Parse and execute one console line.
    pub fn handle_line(&self, line: &str) -> CommandOutcome {
        match Command::parse(line) {
            Ok(command) => self.handle_command(command),
            Err(notice) => CommandOutcome::proceed(notice),
        }
    }

    /// Execute a parsed command.
    pub fn handle_command(&self, command: Command) -> CommandOutcome {
        log::debug!("command: {:?}", RedactedCommand(&command));
        match command {
            Command::Login {
                host,
                port,
                user,
                passcode,
            } => self.login(&host, port, &user, &passcode),
            Command::Join { topic } => self.join(&topic),
            Command::Exit { topic } => self.exit(&topic),
            Command::Logout => self.logout(),
            Command::Report { path } => self.report(&path),
            Command::Summary { game, user, output } => self.summary(&game, &user, &output),
        }
    }

    fn login(&self, host: &str, port: u16, user: &str, passcode: &str) -> CommandOutcome {
        if self.state.is_connected() {
            return CommandOutcome::proceed(Notice::AlreadyLoggedIn);
        }
        // CONNECT sent, CONNECTED not yet received
        if self.transport.is_connected() {
            return CommandOutcome::proceed(Notice::LoginPending);
        }

        if let Err(e) = self.transport.connect(host, port) {
            log::error!("connect to {}:{} failed: {}", host, port, e);
            return CommandOutcome::proceed(Notice::ConnectFailed {
                host: host.to_string(),
                port,
                reason: e.to_string(),
            });
        }

        let frame = frame::encode_connect_with(&self.config, host, port, user, passcode);
        match self.send(&frame) {
            Ok(()) => {
                self.state.session().set_current_user(user);
                CommandOutcome::proceed(Notice::LoginSent {
                    user: user.to_string(),
                })
            }
            Err(e) => CommandOutcome::stop(Notice::SendFailed {
                reason: e.to_string(),
            }),
        }
    }

    fn join(&self, topic: &str) -> CommandOutcome {
        let subscription = {
            let mut session = self.state.session();
            if !session.is_connected() {
                return CommandOutcome::proceed(Notice::NotLoggedIn);
            }
            session.subscribe(topic)
        };

        let frame = frame::encode_subscribe(
            topic,
            subscription.subscription_id,
            subscription.receipt_id,
        );
        match self.send(&frame) {
            Ok(()) => CommandOutcome::proceed(Notice::Joined {
                topic: topic.to_string(),
            }),
            Err(e) => {
                self.state
                    .session()
                    .forget(topic, subscription.subscription_id);
                CommandOutcome::proceed(Notice::SendFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    fn exit(&self, topic: &str) -> CommandOutcome {
        let subscription = {
            let mut session = self.state.session();
            if !session.is_connected() {
                return CommandOutcome::proceed(Notice::NotLoggedIn);
            }
            match session.unsubscribe(topic) {
                Some(subscription) => subscription,
                None => {
                    return CommandOutcome::proceed(Notice::NotSubscribed {
                        topic: topic.to_string(),
                    })
                }
            }
        };

        let frame =
            frame::encode_unsubscribe(subscription.subscription_id, subscription.receipt_id);
        match self.send(&frame) {
            Ok(()) => CommandOutcome::proceed(Notice::Exited {
                topic: topic.to_string(),
            }),
            Err(e) => CommandOutcome::proceed(Notice::SendFailed {
                reason: e.to_string(),
            }),
        }
    }

    fn logout(&self) -> CommandOutcome {
        let receipt_id = {
            let mut session = self.state.session();
            if !session.is_connected() {
                return CommandOutcome::proceed(Notice::NotLoggedIn);
            }
            session.begin_logout()
        };

        match self.send(&frame::encode_disconnect(receipt_id)) {
            Ok(()) => CommandOutcome::proceed(Notice::LogoutSent),
            Err(e) => CommandOutcome::stop(Notice::SendFailed {
                reason: e.to_string(),
            }),
        }
    }

    fn report(&self, path: &Path) -> CommandOutcome {
        let user = {
            let session = self.state.session();
            if !session.is_connected() {
                return CommandOutcome::proceed(Notice::NotLoggedIn);
            }
            session.current_user().unwrap_or_default().to_string()
        };

        let report = match parse_events_file(path) {
            Ok(report) => report,
            Err(e) => {
                log::warn!("{}", e);
                return CommandOutcome::proceed(Notice::ReportFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        let topic = report.topic();
        for (sent, event) in report.events.iter().enumerate() {
            let body = encode_report_body(&user, event);
            if let Err(e) = self.send(&frame::encode_send(&topic, &body)) {
                log::error!("report aborted after {} of {} events", sent, report.events.len());
                return CommandOutcome::proceed(Notice::SendFailed {
                    reason: e.to_string(),
                });
            }
            // Recorded here; the server's echo is skipped in `on_message`
            self.state.games.record(&topic, &user, &body);
        }

        CommandOutcome::proceed(Notice::Reported {
            topic,
            events: report.events.len(),
        })
    }

    fn summary(&self, game: &str, user: &str, output: &Path) -> CommandOutcome {
        match self.state.games.write_summary(game, user, output) {
            Ok(()) => CommandOutcome::proceed(Notice::SummaryWritten {
                path: output.to_path_buf(),
            }),
            Err(SummaryError::NoData { game, user }) => {
                CommandOutcome::proceed(Notice::NoSummaryData { game, user })
            }
            Err(e) => {
                log::error!("{}", e);
                CommandOutcome::proceed(Notice::SummaryFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    fn send(&self, frame: &str) -> Result<(), TransportError> {
        log::debug!(
            "sending {}",
            frame.lines().next().unwrap_or_default()
        );
        self.transport.send_frame(frame).map_err(|e| {
            log::error!("send failed: {}", e);
            e
        })
    }

    // Server side

    /// Decode and handle raw frame text.
    pub fn handle_raw_frame(&self, raw: &str) -> ServerOutcome {
        self.handle_frame(&frame::decode(raw))
    }

    /// Handle one inbound frame.
    pub fn handle_frame(&self, frame: &Frame) -> ServerOutcome {
        log::debug!("received {}", frame.command);
        match frame.kind() {
            FrameCommand::Connected => {
                // A rejected transition is logged by `apply_session_event`
                self.state
                    .apply_session_event(SessionEvent::ConnectAccepted)
                    .ok();
                ServerOutcome::proceed(Some(Notice::LoginSuccessful))
            }
            FrameCommand::Error => {
                self.state
                    .apply_session_event(SessionEvent::ErrorReceived)
                    .ok();
                let body = frame.body.trim();
                ServerOutcome::stop(Notice::ServerError {
                    message: frame.header("message").unwrap_or_default().to_string(),
                    body: (!body.is_empty()).then(|| body.to_string()),
                })
            }
            FrameCommand::Receipt => self.on_receipt(frame),
            FrameCommand::Message => self.on_message(frame),
            other => {
                log::debug!("ignoring {} frame", other);
                ServerOutcome::proceed(None)
            }
        }
    }

    fn on_receipt(&self, frame: &Frame) -> ServerOutcome {
        let raw_id = frame.header("receipt-id").unwrap_or_default();
        let disconnect = raw_id
            .parse::<u64>()
            .ok()
            .filter(|id| self.state.session().is_disconnect_receipt(*id));

        match disconnect {
            Some(receipt_id) => {
                self.state
                    .apply_session_event(SessionEvent::LogoutConfirmed { receipt_id })
                    .ok();
                ServerOutcome::stop(Notice::LoggedOut)
            }
            None => ServerOutcome::proceed(Some(Notice::ReceiptProcessed {
                receipt_id: raw_id.to_string(),
            })),
        }
    }

    fn on_message(&self, frame: &Frame) -> ServerOutcome {
        let destination = frame.header("destination").unwrap_or_default();
        let topic = destination.strip_prefix('/').unwrap_or(destination);

        // The reference server does not stamp a user header on MESSAGE
        let user = match frame.header("user") {
            Some(user) => Some(user.to_string()),
            None => decode_report_body(&frame.body).ok().and_then(|r| r.user),
        };

        match user {
            Some(user) if !topic.is_empty() && !user.is_empty() => {
                let own = self.state.session().current_user() == Some(user.as_str());
                if own {
                    log::debug!("skipping echo of own report on {}", topic);
                } else {
                    self.state.games.record(topic, &user, &frame.body);
                }
            }
            _ => log::warn!("MESSAGE on {:?} without a reporting user", destination),
        }

        ServerOutcome::proceed(Some(Notice::Message {
            destination: destination.to_string(),
            body: frame.body.clone(),
        }))
    }
}

/// Debug view of a command that hides the passcode.
struct RedactedCommand<'a>(&'a Command);

impl fmt::Debug for RedactedCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Command::Login {
                host, port, user, ..
            } => f
                .debug_struct("Login")
                .field("host", host)
                .field("port", port)
                .field("user", user)
                .finish_non_exhaustive(),
            other => fmt::Debug::fmt(other, f),
        }
    }
}
