//! Request/response correlation over the frame transport.
//!
//! Commands are matched to responses by sequence number, not arrival
//! order, so a slow response never blocks unrelated notification frames.
//! Callers conventionally await one command at a time, but the pending map
//! correlates any number of outstanding requests (single-flight stays
//! advisory). A transport failure rejects every pending command before it
//! is surfaced; nothing is retried automatically.

use std::collections::HashMap;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::commands::{decode_notification, Notification};
use crate::config::SessionConfig;
use crate::error::{ProtocolError, RemoteError, TransportError};
use crate::frame::{CommandCode, Frame, STATUS_OK};
use crate::transport::{LinkEvent, Transport};

type PendingWaiter = Sender<Result<Frame, RemoteError>>;

#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<u8, PendingWaiter>>,
    lost: Mutex<Option<TransportError>>,
}

impl Shared {
    fn record_loss(&self, error: &TransportError) {
        if let Ok(mut lost) = self.lost.lock() {
            lost.get_or_insert_with(|| error.clone());
        }
        // Every pending command is rejected before the error propagates.
        if let Ok(mut pending) = self.pending.lock() {
            for (_, waiter) in pending.drain() {
                let _ = waiter.send(Err(RemoteError::Transport(error.clone())));
            }
        }
    }
}

/// One debug session: sequence allocation, pending-request correlation,
/// and the notification stream, over an owned transport.
pub struct RemoteProtocol {
    transport: Box<dyn Transport>,
    shared: Arc<Shared>,
    next_seq: Mutex<u8>,
    send_timeout: Duration,
    notifications: Mutex<Receiver<Notification>>,
}

impl std::fmt::Debug for RemoteProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProtocol")
            .field("transport", &self.transport.kind())
            .finish_non_exhaustive()
    }
}

impl RemoteProtocol {
    /// Wires a protocol instance onto a connected transport and starts the
    /// dispatcher that consumes the connection's event stream.
    #[must_use]
    pub fn new(
        transport: Box<dyn Transport>,
        events: Receiver<LinkEvent>,
        config: &SessionConfig,
    ) -> Self {
        let shared = Arc::new(Shared::default());
        let (notification_tx, notification_rx) = std::sync::mpsc::channel();

        let dispatcher_shared = Arc::clone(&shared);
        drop(std::thread::spawn(move || {
            for event in events {
                match event {
                    LinkEvent::Frame(frame) => {
                        dispatch_frame(&dispatcher_shared, &notification_tx, frame);
                    }
                    LinkEvent::ConnectionLost(error) => {
                        tracing::debug!(%error, "connection lost");
                        dispatcher_shared.record_loss(&error);
                        let _ = notification_tx.send(Notification::ConnectionLost { error });
                        return;
                    }
                }
            }
        }));

        Self {
            transport,
            shared,
            next_seq: Mutex::new(0),
            send_timeout: config.send_timeout,
            notifications: Mutex::new(notification_rx),
        }
    }

    /// Sends one command and blocks for its correlated response.
    ///
    /// Returns the response argument bytes on an OK status.
    ///
    /// # Errors
    ///
    /// [`TransportError`] when the connection is already lost, the write
    /// fails, or no response arrives within the command window (which
    /// terminates the connection); [`ProtocolError::CommandRejected`] when
    /// the remote answers with a non-OK status.
    pub fn send_command(&self, code: CommandCode, args: &[u8]) -> Result<Vec<u8>, RemoteError> {
        if let Some(error) = self.connection_error() {
            return Err(error.into());
        }

        let seq = self.allocate_seq();
        let (waiter_tx, waiter_rx) = std::sync::mpsc::channel();
        if let Ok(mut pending) = self.shared.pending.lock() {
            let _ = pending.insert(seq, waiter_tx);
        }

        let frame = Frame::new(seq, code.as_u8(), args.to_vec());
        if let Err(error) = self.transport.send(&frame) {
            self.forget_pending(seq);
            self.shared.record_loss(&error);
            return Err(error.into());
        }

        match waiter_rx.recv_timeout(self.send_timeout) {
            Ok(result) => {
                let response = result?;
                if response.code == STATUS_OK {
                    Ok(response.args)
                } else {
                    Err(ProtocolError::CommandRejected {
                        status: response.code,
                        message: String::from_utf8_lossy(&response.args).into_owned(),
                    }
                    .into())
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                self.forget_pending(seq);
                let error = TransportError::CommandTimeout {
                    timeout: self.send_timeout,
                };
                // A command timeout is fatal: resending a state-mutating
                // command without caller knowledge would be unsafe.
                self.shared.record_loss(&error);
                Err(error.into())
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.forget_pending(seq);
                Err(TransportError::ConnectionClosed.into())
            }
        }
    }

    /// Next notification, if one is already queued.
    #[must_use]
    pub fn try_notification(&self) -> Option<Notification> {
        self.notifications
            .lock()
            .ok()
            .and_then(|notifications| notifications.try_recv().ok())
    }

    /// Blocks up to `timeout` for the next notification.
    #[must_use]
    pub fn wait_notification(&self, timeout: Duration) -> Option<Notification> {
        self.notifications
            .lock()
            .ok()
            .and_then(|notifications| notifications.recv_timeout(timeout).ok())
    }

    /// The terminal transport error, once the connection has failed.
    #[must_use]
    pub fn connection_error(&self) -> Option<TransportError> {
        self.shared.lost.lock().ok().and_then(|lost| lost.clone())
    }

    /// True when the watchpoint group can be enabled on this session.
    #[must_use]
    pub fn supports_watchpoints(&self) -> bool {
        self.transport.supports_watchpoints()
    }

    /// True when save/restore state round-trips on this session.
    #[must_use]
    pub fn supports_state_files(&self) -> bool {
        self.transport.supports_state_files()
    }

    /// Kind name of the active transport.
    #[must_use]
    pub fn transport_kind(&self) -> &'static str {
        self.transport.kind()
    }

    /// Gracefully closes the transport. Idempotent.
    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    /// Monotonic mod-256 sequence allocation, skipping the reserved
    /// notification value 0: 1, 2, …, 255, 1, ….
    fn allocate_seq(&self) -> u8 {
        let mut guard = match self.next_seq.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = if *guard == u8::MAX { 1 } else { *guard + 1 };
        *guard
    }

    fn forget_pending(&self, seq: u8) {
        if let Ok(mut pending) = self.shared.pending.lock() {
            let _ = pending.remove(&seq);
        }
    }
}

fn dispatch_frame(shared: &Shared, notifications: &Sender<Notification>, frame: Frame) {
    if frame.is_notification() {
        match decode_notification(&frame) {
            Ok(notification) => {
                let _ = notifications.send(notification);
            }
            Err(error) => tracing::warn!(%error, "dropping unparsable notification frame"),
        }
        return;
    }

    let waiter = shared
        .pending
        .lock()
        .ok()
        .and_then(|mut pending| pending.remove(&frame.seq));
    match waiter {
        Some(waiter) => {
            let _ = waiter.send(Ok(frame));
        }
        None => {
            // Stale or duplicate response: logged and dropped, the
            // connection continues.
            tracing::warn!(
                seq = frame.seq,
                "dropping response frame with no pending request"
            );
        }
    }
}
