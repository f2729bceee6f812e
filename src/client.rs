//! Command loop and server read loop.
//!
//! The command loop runs on the caller's thread and reads console lines.
//! Once a `login` opens the transport, a read loop thread is started that
//! feeds inbound frames to the protocol engine. Either loop can end the
//! session by clearing the shared running flag and closing the transport,
//! which unblocks the other one.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::protocol::{Notice, StompProtocol};
use crate::state::SessionEvent;
use crate::transport::Transport;

/// Where notices from both loops end up.
pub type NoticeSink = Arc<dyn Fn(&Notice) + Send + Sync>;

/// Sink printing notices to stdout.
pub fn stdout_sink() -> NoticeSink {
    Arc::new(|notice: &Notice| println!("{}", notice))
}

/// Drives a [`StompProtocol`] from a line source.
pub struct Client<T: Transport + 'static> {
    protocol: Arc<StompProtocol<T>>,
    running: Arc<AtomicBool>,
    sink: NoticeSink,
    reader: Option<JoinHandle<()>>,
}

impl<T: Transport + 'static> Client<T> {
    /// Wrap a protocol engine; no thread is started until `run`.
    pub fn new(protocol: StompProtocol<T>, sink: NoticeSink) -> Self {
        Self {
            protocol: Arc::new(protocol),
            running: Arc::new(AtomicBool::new(true)),
            sink,
            reader: None,
        }
    }

    pub fn protocol(&self) -> &StompProtocol<T> {
        &self.protocol
    }

    /// Check if neither loop has stopped the session.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the command loop until the input ends or either loop stops the
    /// session, then wait for the read loop to finish.
    pub fn run<R: BufRead>(&mut self, input: R) -> std::io::Result<()> {
        let result = self.command_loop(input);

        self.running.store(false, Ordering::SeqCst);
        self.protocol.transport().close();
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                log::error!("read loop panicked");
            }
        }
        result
    }

    fn command_loop<R: BufRead>(&mut self, input: R) -> std::io::Result<()> {
        for line in input.lines() {
            if !self.is_running() {
                break;
            }
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let outcome = self.protocol.handle_line(line);
            if let Some(notice) = &outcome.notice {
                (self.sink)(notice);
            }

            if self.reader.is_none() && self.protocol.transport().is_connected() {
                self.spawn_reader();
            }

            if !outcome.keep_running {
                log::info!("command loop stopping");
                break;
            }
        }
        Ok(())
    }

    fn spawn_reader(&mut self) {
        let protocol = Arc::clone(&self.protocol);
        let running = Arc::clone(&self.running);
        let sink = Arc::clone(&self.sink);
        self.reader = Some(std::thread::spawn(move || {
            read_loop(&protocol, &running, &sink);
        }));
    }
}

impl<T: Transport + 'static> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("running", &self.is_running())
            .field("reader", &self.reader.is_some())
            .finish_non_exhaustive()
    }
}

/// Drop the session after EOF or a read failure.
fn lose_connection<T: Transport>(protocol: &StompProtocol<T>) {
    if let Err(e) = protocol
        .state()
        .apply_session_event(SessionEvent::ConnectionLost)
    {
        log::debug!("connection loss after teardown: {}", e);
    }
}

/// Read frames until the server ends the session or the transport closes.
pub fn read_loop<T: Transport>(
    protocol: &StompProtocol<T>,
    running: &AtomicBool,
    sink: &NoticeSink,
) {
    loop {
        match protocol.transport().read_frame() {
            Ok(Some(raw)) => {
                let outcome = protocol.handle_raw_frame(&raw);
                if let Some(notice) = &outcome.notice {
                    sink(notice);
                }
                if !outcome.keep_reading {
                    break;
                }
            }
            Ok(None) => {
                if running.load(Ordering::SeqCst) {
                    sink(&Notice::ServerClosed);
                }
                lose_connection(protocol);
                break;
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    log::error!("read failed: {}", e);
                    sink(&Notice::ServerClosed);
                }
                lose_connection(protocol);
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    protocol.transport().close();
    log::debug!("read loop finished");
}
