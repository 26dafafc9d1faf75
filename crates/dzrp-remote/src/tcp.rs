//! Socket transport to a remote counterpart (hardware bridge or
//! companion plugin).

use std::io::Write;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::TransportError;
use crate::frame::Frame;
use crate::transport::{spawn_stream_workers, LinkEvent, Transport};

/// TCP-backed DZRP channel.
///
/// A reader thread moves raw bytes, the shared frame pump reassembles and
/// guards the stall timeout, and sends run under the configured send
/// timeout. Watchpoint groups and state files are not served by the
/// socket counterpart, so both capability probes report false.
pub struct TcpTransport {
    stream: TcpStream,
    writer: Mutex<TcpStream>,
    send_timeout: Duration,
    disconnect_grace: Duration,
    done: Mutex<Receiver<()>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("peer", &self.stream.peer_addr().ok())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl TcpTransport {
    /// Connects to `host:port` and starts the connection workers.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectFailed`] when resolution or the
    /// connection attempt (bounded by the connect timeout) fails.
    pub fn connect(
        host: &str,
        port: u16,
        config: &SessionConfig,
    ) -> Result<(Self, Receiver<LinkEvent>), TransportError> {
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|err| TransportError::ConnectFailed {
                detail: format!("{host}:{port}: {err}"),
            })?;

        let mut last_failure = None;
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, config.connect_timeout) {
                Ok(connected) => {
                    stream = Some(connected);
                    break;
                }
                Err(err) => last_failure = Some(err),
            }
        }
        let stream = stream.ok_or_else(|| TransportError::ConnectFailed {
            detail: match last_failure {
                Some(err) => format!("{host}:{port}: {err}"),
                None => format!("{host}:{port}: no addresses resolved"),
            },
        })?;

        let io_error = |err: std::io::Error| TransportError::Io(err.to_string());
        stream.set_nodelay(true).map_err(io_error)?;
        stream
            .set_write_timeout(Some(config.send_timeout))
            .map_err(io_error)?;
        let reader = stream.try_clone().map_err(io_error)?;
        let writer = stream.try_clone().map_err(io_error)?;

        let (events, done) = spawn_stream_workers(reader, config.stall_timeout);
        tracing::debug!(%host, port, "tcp transport connected");

        Ok((
            Self {
                stream,
                writer: Mutex::new(writer),
                send_timeout: config.send_timeout,
                disconnect_grace: config.disconnect_grace,
                done: Mutex::new(done),
                closed: AtomicBool::new(false),
            },
            events,
        ))
    }

    fn map_write_error(&self, err: &std::io::Error) -> TransportError {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                TransportError::CommandTimeout {
                    timeout: self.send_timeout,
                }
            }
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset => {
                TransportError::ConnectionClosed
            }
            _ => TransportError::Io(err.to_string()),
        }
    }
}

impl Transport for TcpTransport {
    fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        let bytes = frame.encode();
        tracing::trace!(seq = frame.seq, code = frame.code, len = bytes.len(), "frame sent");
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| TransportError::ConnectionClosed)?;
        writer
            .write_all(&bytes)
            .and_then(|()| writer.flush())
            .map_err(|err| self.map_write_error(&err))
    }

    fn disconnect(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("tcp transport disconnecting");
        let _ = self.stream.shutdown(Shutdown::Both);
        // Wait for the pump to drain, but never longer than the grace
        // period: a peer that ignores the shutdown cannot wedge us.
        if let Ok(done) = self.done.lock() {
            let _ = done.recv_timeout(self.disconnect_grace);
        }
    }

    fn supports_watchpoints(&self) -> bool {
        false
    }

    fn supports_state_files(&self) -> bool {
        false
    }

    fn kind(&self) -> &'static str {
        "tcp"
    }
}
