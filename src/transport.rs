//! Byte transport for STOMP frames.
//!
//! Frames travel as UTF-8 text terminated by a single NUL byte:
//!
//! ```text
//! +---------------------------+------+
//! | frame text (UTF-8)        | 0x00 |
//! +---------------------------+------+
//! ```
//!
//! [`Transport`] is the seam the protocol engine talks through; the engine
//! never touches sockets directly.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};

use parking_lot::Mutex;

use crate::error::TransportError;

const NUL: u8 = 0;

/// Connection used by the protocol engine.
///
/// `read_frame` is only ever called from the read loop; the other methods
/// may be called from either loop.
pub trait Transport: Send + Sync {
    /// Open the connection. Fails without blocking when one is already
    /// open.
    fn connect(&self, host: &str, port: u16) -> Result<(), TransportError>;

    /// Write one frame followed by the NUL terminator.
    fn send_frame(&self, frame: &str) -> Result<(), TransportError>;

    /// Block until the next frame arrives. `Ok(None)` means the peer closed
    /// the connection.
    fn read_frame(&self) -> Result<Option<String>, TransportError>;

    /// Close the connection, unblocking a pending `read_frame`.
    fn close(&self);

    fn is_connected(&self) -> bool;
}

/// Blocking TCP transport.
#[derive(Debug)]
pub struct TcpTransport {
    writer: Mutex<Option<TcpStream>>,
    reader: Mutex<Option<BufReader<TcpStream>>>,
    max_frame_size: usize,
}

impl TcpTransport {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            max_frame_size,
        }
    }
}

impl Transport for TcpTransport {
    fn connect(&self, host: &str, port: u16) -> Result<(), TransportError> {
        if self.is_connected() {
            return Err(TransportError::AlreadyConnected);
        }
        // `read_frame` keeps the reader locked while it blocks
        let mut reader = self.reader.try_lock().ok_or(TransportError::ReaderBusy)?;

        log::debug!("connecting to {}:{}", host, port);
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        let read_half = stream.try_clone()?;

        *reader = Some(BufReader::new(read_half));
        *self.writer.lock() = Some(stream);
        log::info!("connected to {}:{}", host, port);
        Ok(())
    }

    fn send_frame(&self, frame: &str) -> Result<(), TransportError> {
        let mut guard = self.writer.lock();
        let stream = guard.as_mut().ok_or(TransportError::NotConnected)?;

        let mut bytes = Vec::with_capacity(frame.len() + 1);
        bytes.extend_from_slice(frame.as_bytes());
        bytes.push(NUL);
        stream.write_all(&bytes)?;
        stream.flush()?;
        Ok(())
    }

    fn read_frame(&self) -> Result<Option<String>, TransportError> {
        let mut guard = self.reader.lock();
        let reader = guard.as_mut().ok_or(TransportError::NotConnected)?;
        read_nul_frame(reader, self.max_frame_size)
    }

    fn close(&self) {
        if let Some(stream) = self.writer.lock().take() {
            // Shutting down the shared socket also wakes the reader
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                log::debug!("shutdown: {}", e);
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.writer.lock().is_some()
    }
}

/// Read one NUL-terminated frame from `reader`.
///
/// Newlines between frames are skipped. Returns `Ok(None)` on a clean EOF.
pub fn read_nul_frame<R: BufRead>(
    reader: &mut R,
    max_frame_size: usize,
) -> Result<Option<String>, TransportError> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let limit = (max_frame_size as u64).saturating_add(1);
        let n = reader.by_ref().take(limit).read_until(NUL, &mut buf)?;
        if n == 0 {
            return Ok(None);
        }

        match buf.last() {
            Some(&NUL) => {
                buf.pop();
            }
            _ if buf.len() > max_frame_size => {
                return Err(TransportError::FrameTooLarge {
                    max: max_frame_size,
                });
            }
            _ => {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                )));
            }
        }

        let start = buf.iter().position(|b| *b != b'\n' && *b != b'\r');
        match start {
            Some(start) => {
                let text = String::from_utf8(buf.split_off(start))
                    .map_err(|_| TransportError::InvalidUtf8)?;
                return Ok(Some(text));
            }
            // Keepalive newlines only
            None => continue,
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::{Condvar, Mutex};

    use super::Transport;
    use crate::error::TransportError;

    /// In-memory transport recording outbound frames and replaying
    /// scripted inbound ones.
    #[derive(Debug, Default)]
    pub(crate) struct MockTransport {
        pub fail_connect: AtomicBool,
        pub fail_send: AtomicBool,
        connected: AtomicBool,
        closed: AtomicBool,
        sent: Mutex<Vec<String>>,
        inbound: Mutex<VecDeque<String>>,
        inbound_ready: Condvar,
        pub connects: Mutex<Vec<(String, u16)>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_connect() -> Self {
            let transport = Self::default();
            transport.fail_connect.store(true, Ordering::SeqCst);
            transport
        }

        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().clone()
        }

        pub fn push_inbound(&self, frame: impl Into<String>) {
            self.inbound.lock().push_back(frame.into());
            self.inbound_ready.notify_all();
        }

        pub fn was_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    impl Transport for MockTransport {
        fn connect(&self, host: &str, port: u16) -> Result<(), TransportError> {
            self.connects.lock().push((host.to_string(), port));
            if self.fail_connect.load(Ordering::SeqCst) {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )));
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn send_frame(&self, frame: &str) -> Result<(), TransportError> {
            if !self.connected.load(Ordering::SeqCst) {
                return Err(TransportError::NotConnected);
            }
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "broken pipe",
                )));
            }
            self.sent.lock().push(frame.to_string());
            Ok(())
        }

        /// Blocks until a frame is scripted or the transport is closed.
        fn read_frame(&self) -> Result<Option<String>, TransportError> {
            let mut inbound = self.inbound.lock();
            loop {
                if let Some(frame) = inbound.pop_front() {
                    return Ok(Some(frame));
                }
                if self.closed.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                self.inbound_ready.wait(&mut inbound);
            }
        }

        fn close(&self) {
            self.connected.store(false, Ordering::SeqCst);
            let _guard = self.inbound.lock();
            self.closed.store(true, Ordering::SeqCst);
            self.inbound_ready.notify_all();
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    /// Listener that accepts one client and never writes to it.
    fn silent_server() -> (u16, std::thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(socket);
            while let Ok(Some(_)) = read_nul_frame(&mut reader, 1024) {}
        });
        (port, server)
    }

    fn spawn_reader(
        transport: &Arc<TcpTransport>,
    ) -> mpsc::Receiver<Result<Option<String>, TransportError>> {
        let (tx, rx) = mpsc::channel();
        let transport = Arc::clone(transport);
        std::thread::spawn(move || {
            let _ = tx.send(transport.read_frame());
        });
        rx
    }

    #[test]
    fn test_read_nul_frames() {
        let mut input = Cursor::new(b"CONNECTED\nversion:1.2\n\n\0\nRECEIPT\nreceipt-id:3\n\n\0".to_vec());

        let first = read_nul_frame(&mut input, 1024).unwrap();
        assert_eq!(first.as_deref(), Some("CONNECTED\nversion:1.2\n\n"));

        let second = read_nul_frame(&mut input, 1024).unwrap();
        assert_eq!(second.as_deref(), Some("RECEIPT\nreceipt-id:3\n\n"));

        assert_eq!(read_nul_frame(&mut input, 1024).unwrap(), None);
    }

    #[test]
    fn test_read_skips_keepalive_newlines() {
        let mut input = Cursor::new(b"\n\0\n\nMESSAGE\n\nbody\0".to_vec());
        let frame = read_nul_frame(&mut input, 1024).unwrap();
        assert_eq!(frame.as_deref(), Some("MESSAGE\n\nbody"));
    }

    #[test]
    fn test_read_rejects_oversize_frame() {
        let mut input = Cursor::new(vec![b'x'; 64]);
        let err = read_nul_frame(&mut input, 16).unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { max: 16 }));
    }

    #[test]
    fn test_read_truncated_frame() {
        let mut input = Cursor::new(b"MESSAGE\n\npartial".to_vec());
        let err = read_nul_frame(&mut input, 1024).unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[test]
    fn test_send_requires_connect() {
        let transport = TcpTransport::new(1024);
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.send_frame("DISCONNECT\n\n"),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(socket.try_clone().unwrap());
            let received = read_nul_frame(&mut reader, 1024).unwrap();
            socket.write_all(b"CONNECTED\nversion:1.2\n\n\0").unwrap();
            received
        });

        let transport = TcpTransport::new(1024);
        transport.connect("127.0.0.1", port).unwrap();
        transport.send_frame("CONNECT\nlogin:alice\n\n").unwrap();

        let reply = transport.read_frame().unwrap();
        assert_eq!(reply.as_deref(), Some("CONNECTED\nversion:1.2\n\n"));
        assert_eq!(
            server.join().unwrap().as_deref(),
            Some("CONNECT\nlogin:alice\n\n")
        );

        transport.close();
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_close_unblocks_pending_read() {
        let (port, server) = silent_server();
        let transport = Arc::new(TcpTransport::new(1024));
        transport.connect("127.0.0.1", port).unwrap();

        let read = spawn_reader(&transport);
        std::thread::sleep(Duration::from_millis(100));
        assert!(read.try_recv().is_err(), "read returned before close");

        transport.close();
        let result = read
            .recv_timeout(Duration::from_secs(3))
            .expect("read still blocked after close");
        assert!(!matches!(result, Ok(Some(_))));
        server.join().unwrap();
    }

    #[test]
    fn test_connect_while_reading_does_not_block() {
        let (port, server) = silent_server();
        let transport = Arc::new(TcpTransport::new(1024));
        transport.connect("127.0.0.1", port).unwrap();
        let read = spawn_reader(&transport);
        std::thread::sleep(Duration::from_millis(100));

        let (tx, rx) = mpsc::channel();
        let second = Arc::clone(&transport);
        std::thread::spawn(move || {
            let _ = tx.send(second.connect("127.0.0.1", port));
        });
        let result = rx
            .recv_timeout(Duration::from_secs(3))
            .expect("second connect blocked");
        assert!(matches!(result, Err(TransportError::AlreadyConnected)));

        transport.close();
        read.recv_timeout(Duration::from_secs(3)).unwrap().ok();
        server.join().unwrap();
    }

    #[test]
    fn test_connect_refuses_busy_reader() {
        let transport = TcpTransport::new(1024);
        let _held = transport.reader.lock();
        assert!(matches!(
            transport.connect("127.0.0.1", 1),
            Err(TransportError::ReaderBusy)
        ));
    }
}
