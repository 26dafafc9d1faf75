//! Polymorphic transport interface and the shared frame-pump worker.
//!
//! Each connection exposes one typed event stream consumed by a single
//! dispatcher; the separate `data`/`error`/`close` callback channels of a
//! raw socket collapse into [`LinkEvent`]. Close and error both end in one
//! terminal [`LinkEvent::ConnectionLost`].

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::error::TransportError;
use crate::frame::Frame;
use crate::reassembly::FrameAssembler;

/// Events delivered on a connection's single event stream.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// One complete reassembled frame, in byte-arrival order.
    Frame(Frame),
    /// Terminal signal; no further events follow.
    ConnectionLost(TransportError),
}

/// One debug channel: socket, serial device, or in-process simulator.
///
/// Constructed once per session by the factory and passed by reference;
/// there is no ambient global binding.
pub trait Transport: Send + Sync {
    /// Writes one frame, length prefix included, under the send timeout.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`TransportError`] when the write fails or times
    /// out; commands are never retried automatically.
    fn send(&self, frame: &Frame) -> Result<(), TransportError>;

    /// Requests a graceful close. Idempotent; resolves when the close
    /// completes or after the configured grace period, whichever is first.
    fn disconnect(&mut self);

    /// True when the watchpoint group can be enabled on this channel.
    fn supports_watchpoints(&self) -> bool;

    /// True when save/restore state round-trips on this channel.
    fn supports_state_files(&self) -> bool;

    /// Short kind name used in logs and configuration errors.
    fn kind(&self) -> &'static str;
}

/// Runs frame reassembly over a channel of raw byte chunks until the
/// source closes, a framing violation occurs, or the peer stalls
/// mid-frame for longer than `stall_timeout`.
///
/// The stall timer is armed only while a frame is partially received and
/// is cancelled by every full-frame dispatch, so an idle connection never
/// times out. No partial frame is ever dispatched.
pub(crate) fn pump_frames(
    chunks: &Receiver<Vec<u8>>,
    stall_timeout: Duration,
    events: &Sender<LinkEvent>,
) {
    let mut assembler = FrameAssembler::new();
    loop {
        let chunk = if assembler.mid_frame() {
            match chunks.recv_timeout(stall_timeout) {
                Ok(chunk) => chunk,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(?stall_timeout, "peer stalled mid-frame");
                    let _ = events.send(LinkEvent::ConnectionLost(TransportError::StallTimeout {
                        timeout: stall_timeout,
                    }));
                    return;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let _ = events.send(LinkEvent::ConnectionLost(TransportError::ConnectionClosed));
                    return;
                }
            }
        } else {
            match chunks.recv() {
                Ok(chunk) => chunk,
                Err(_) => {
                    let _ = events.send(LinkEvent::ConnectionLost(TransportError::ConnectionClosed));
                    return;
                }
            }
        };

        match assembler.feed(&chunk) {
            Ok(frames) => {
                for frame in frames {
                    tracing::trace!(seq = frame.seq, code = frame.code, "frame received");
                    if events.send(LinkEvent::Frame(frame)).is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                tracing::warn!(%err, "framing violation");
                let _ = events.send(LinkEvent::ConnectionLost(err));
                return;
            }
        }
    }
}

/// Spawns the per-connection worker pair for a byte-stream channel: a raw
/// reader thread that only moves bytes, and the frame pump that owns
/// reassembly and the stall timer. Returns the connection event stream and
/// a completion signal that fires when the pump exits.
pub(crate) fn spawn_stream_workers<R>(
    mut reader: R,
    stall_timeout: Duration,
) -> (Receiver<LinkEvent>, Receiver<()>)
where
    R: std::io::Read + Send + 'static,
{
    let (chunk_tx, chunk_rx) = std::sync::mpsc::channel::<Vec<u8>>();
    let (event_tx, event_rx) = std::sync::mpsc::channel();
    let (done_tx, done_rx) = std::sync::mpsc::channel();

    std::thread::spawn(move || {
        let mut buf = [0_u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if chunk_tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(_) => break,
            }
        }
        // Dropping the sender collapses close and error into the single
        // terminal signal emitted by the pump.
    });

    std::thread::spawn(move || {
        pump_frames(&chunk_rx, stall_timeout, &event_tx);
        let _ = done_tx.send(());
    });

    (event_rx, done_rx)
}
