//! Reframing of an arbitrary byte stream into discrete DZRP frames.
//!
//! Exactly one frame is assembled at a time per connection. The machine is
//! split-invariant: feeding a stream byte-by-byte or all at once yields the
//! identical sequence of frames. It performs no I/O and keeps no timers;
//! the owning transport arms its stall timer whenever [`FrameAssembler::mid_frame`]
//! reports a partially received frame.

use crate::error::TransportError;
use crate::frame::{Frame, FRAME_HEADER_BYTES, MAX_PAYLOAD_BYTES, MIN_PAYLOAD_BYTES};

/// Reassembly phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    /// Collecting the 4-byte little-endian length prefix.
    AwaitingHeader,
    /// Collecting the announced number of payload bytes.
    AccumulatingPayload,
    /// Terminal; all further input is rejected.
    Closed,
}

/// Incremental frame reassembler for one connection.
#[derive(Debug)]
pub struct FrameAssembler {
    state: AssemblerState,
    buffer: Vec<u8>,
    expected: usize,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    /// Creates an assembler in the fresh-connection state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AssemblerState::AwaitingHeader,
            buffer: Vec::new(),
            expected: FRAME_HEADER_BYTES,
        }
    }

    /// Resets to the fresh-connection state (reconnect path).
    pub fn reset(&mut self) {
        self.state = AssemblerState::AwaitingHeader;
        self.buffer.clear();
        self.expected = FRAME_HEADER_BYTES;
    }

    /// Current reassembly phase.
    #[must_use]
    pub const fn state(&self) -> AssemblerState {
        self.state
    }

    /// True while a frame is partially received (header or payload).
    ///
    /// The stall timer runs exactly while this holds; it is cancelled by
    /// every full-frame dispatch.
    #[must_use]
    pub const fn mid_frame(&self) -> bool {
        match self.state {
            AssemblerState::AccumulatingPayload => true,
            AssemblerState::AwaitingHeader => !self.buffer.is_empty(),
            AssemblerState::Closed => false,
        }
    }

    /// Moves to the terminal state; later feeds report a closed connection.
    pub fn close(&mut self) {
        self.state = AssemblerState::Closed;
        self.buffer.clear();
    }

    /// Appends received bytes and drains every frame they complete, in
    /// byte-arrival order.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`TransportError`] when fed after close or when the
    /// peer announces a length the framing layer refuses (shorter than
    /// sequence-plus-code or beyond [`MAX_PAYLOAD_BYTES`]); framing cannot
    /// resynchronize after such a violation. No partial frame is ever
    /// returned.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>, TransportError> {
        if self.state == AssemblerState::Closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while self.buffer.len() >= self.expected {
            match self.state {
                AssemblerState::AwaitingHeader => {
                    let announced = u32::from_le_bytes([
                        self.buffer[0],
                        self.buffer[1],
                        self.buffer[2],
                        self.buffer[3],
                    ]) as usize;
                    self.buffer.drain(..FRAME_HEADER_BYTES);
                    if !(MIN_PAYLOAD_BYTES..=MAX_PAYLOAD_BYTES).contains(&announced) {
                        self.close();
                        return Err(TransportError::Framing {
                            detail: format!("announced payload length {announced} is outside the accepted range"),
                        });
                    }
                    self.state = AssemblerState::AccumulatingPayload;
                    self.expected = announced;
                }
                AssemblerState::AccumulatingPayload => {
                    let payload: Vec<u8> = self.buffer.drain(..self.expected).collect();
                    self.state = AssemblerState::AwaitingHeader;
                    self.expected = FRAME_HEADER_BYTES;
                    match Frame::parse(&payload) {
                        Ok(frame) => frames.push(frame),
                        // Unreachable with the length floor above; kept so a
                        // parse change can never emit a partial frame.
                        Err(err) => {
                            self.close();
                            return Err(TransportError::Framing {
                                detail: err.to_string(),
                            });
                        }
                    }
                }
                AssemblerState::Closed => break,
            }
        }
        Ok(frames)
    }
}
