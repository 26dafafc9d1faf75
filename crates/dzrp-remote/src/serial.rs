//! Serial-device transport (USB/serial adapter to real hardware).
//!
//! The device path is opened as-is; line configuration (baud rate, raw
//! mode) is a caller/OS concern. Framing, stall handling, and the event
//! stream are shared with the socket transport.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::TransportError;
use crate::frame::Frame;
use crate::transport::{spawn_stream_workers, LinkEvent, Transport};

/// Serial-device DZRP channel.
///
/// The hardware counterpart serves watchpoint groups but has nowhere to
/// keep state files, so only the former capability probe reports true.
pub struct SerialTransport {
    writer: Mutex<File>,
    disconnect_grace: Duration,
    done: Mutex<Receiver<()>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SerialTransport {
    /// Opens the device read/write and starts the connection workers.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectFailed`] when the device cannot be
    /// opened, [`TransportError::Io`] when the read side cannot be cloned.
    pub fn open(
        path: &Path,
        config: &SessionConfig,
    ) -> Result<(Self, Receiver<LinkEvent>), TransportError> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| TransportError::ConnectFailed {
                detail: format!("{}: {err}", path.display()),
            })?;
        let reader = device
            .try_clone()
            .map_err(|err| TransportError::Io(err.to_string()))?;

        let (events, done) = spawn_stream_workers(reader, config.stall_timeout);
        tracing::debug!(path = %path.display(), "serial transport opened");

        Ok((
            Self {
                writer: Mutex::new(device),
                disconnect_grace: config.disconnect_grace,
                done: Mutex::new(done),
                closed: AtomicBool::new(false),
            },
            events,
        ))
    }
}

impl Transport for SerialTransport {
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
            .map_err(|err| TransportError::Io(err.to_string()))
    }

    fn disconnect(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("serial transport disconnecting");
        // A blocked device read cannot be interrupted portably; wait out
        // the grace period and detach. The worker exits with the handle.
        if let Ok(done) = self.done.lock() {
            let _ = done.recv_timeout(self.disconnect_grace);
        }
    }

    fn supports_watchpoints(&self) -> bool {
        true
    }

    fn supports_state_files(&self) -> bool {
        false
    }

    fn kind(&self) -> &'static str {
        "serial"
    }
}
