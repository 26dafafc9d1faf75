//! Typed command wrappers and notification decoding.
//!
//! Every wrapper is a thin encode/decode layer over
//! [`RemoteProtocol::send_command`]; the wire shapes here are the private
//! agreement both ends of the link compile against.

use crate::error::{ConfigurationError, ProtocolError, RemoteError, TransportError};
use crate::frame::{CommandCode, Frame, NotificationCode, NOTIFICATION_SEQ};
use crate::protocol::RemoteProtocol;

use z80_core::WIRE_REGISTER_SLOTS;

/// Version triple sent in the init handshake.
pub const PROGRAM_VERSION: [u8; 3] = [0, 1, 0];

const STOP_PAUSE: u8 = 0;
const STOP_BREAKPOINT: u8 = 1;
const STOP_WATCHPOINT: u8 = 2;
const STOP_HALT: u8 = 3;
const STOP_ERROR: u8 = 4;

/// Why execution stopped after a continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// A pause request was honored.
    Pause,
    /// A breakpoint was reached.
    Breakpoint {
        /// Address of the breakpoint.
        addr: u16,
    },
    /// A watched address was accessed.
    Watchpoint {
        /// Watched address that was hit.
        addr: u16,
    },
    /// The CPU halted with interrupts disabled; it can never resume.
    Halt,
    /// Execution failed fatally; state is as of the last full instruction.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

/// Decoded notification delivered on the session's notification stream.
#[derive(Debug, Clone)]
pub enum Notification {
    /// Execution stopped.
    Stopped {
        /// Decoded stop reason.
        reason: StopReason,
    },
    /// Code coverage addresses reported by the remote.
    Coverage {
        /// Executed addresses since the last report.
        addresses: Vec<u16>,
    },
    /// Log line emitted by the remote.
    Log {
        /// Log text.
        message: String,
    },
    /// Terminal connection failure; no further notifications follow.
    ConnectionLost {
        /// The fatal transport error.
        error: TransportError,
    },
}

/// Register image decoded from a get-registers response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSnapshot {
    slots: [u16; WIRE_REGISTER_SLOTS],
}

impl RegisterSnapshot {
    /// Decodes the 15-slot little-endian wire image.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedFrame`] on a length mismatch.
    pub fn from_wire(args: &[u8]) -> Result<Self, ProtocolError> {
        if args.len() != WIRE_REGISTER_SLOTS * 2 {
            return Err(ProtocolError::MalformedFrame {
                detail: format!(
                    "register image is {} bytes, expected {}",
                    args.len(),
                    WIRE_REGISTER_SLOTS * 2
                ),
            });
        }
        let mut slots = [0_u16; WIRE_REGISTER_SLOTS];
        for (index, slot) in slots.iter_mut().enumerate() {
            *slot = u16::from_le_bytes([args[index * 2], args[index * 2 + 1]]);
        }
        Ok(Self { slots })
    }

    /// Raw slot access in wire order.
    #[must_use]
    pub const fn slot(&self, index: usize) -> u16 {
        self.slots[index]
    }

    /// Program counter.
    #[must_use]
    pub const fn pc(&self) -> u16 {
        self.slots[0]
    }

    /// Stack pointer.
    #[must_use]
    pub const fn sp(&self) -> u16 {
        self.slots[1]
    }

    /// `AF` pair.
    #[must_use]
    pub const fn af(&self) -> u16 {
        self.slots[2]
    }

    /// `BC` pair.
    #[must_use]
    pub const fn bc(&self) -> u16 {
        self.slots[3]
    }

    /// `DE` pair.
    #[must_use]
    pub const fn de(&self) -> u16 {
        self.slots[4]
    }

    /// `HL` pair.
    #[must_use]
    pub const fn hl(&self) -> u16 {
        self.slots[5]
    }

    /// `IX` index register.
    #[must_use]
    pub const fn ix(&self) -> u16 {
        self.slots[6]
    }

    /// `IY` index register.
    #[must_use]
    pub const fn iy(&self) -> u16 {
        self.slots[7]
    }

    /// Interrupt vector base `I`.
    #[must_use]
    pub const fn i(&self) -> u8 {
        (self.slots[12] & 0xFF) as u8
    }

    /// Refresh register `R`.
    #[must_use]
    pub const fn r(&self) -> u8 {
        (self.slots[13] & 0xFF) as u8
    }

    /// Interrupt mode slot value.
    #[must_use]
    pub const fn im(&self) -> u8 {
        (self.slots[14] & 0xFF) as u8
    }
}

/// Decodes a sequence-0 frame into a [`Notification`].
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedFrame`] for unknown notification
/// codes or argument shapes; the caller logs and drops such frames.
pub fn decode_notification(frame: &Frame) -> Result<Notification, ProtocolError> {
    let code = NotificationCode::from_u8(frame.code).ok_or_else(|| {
        ProtocolError::MalformedFrame {
            detail: format!("unknown notification code {:#04x}", frame.code),
        }
    })?;
    match code {
        NotificationCode::Pause => decode_stop(&frame.args).map(|reason| Notification::Stopped { reason }),
        NotificationCode::Coverage => {
            if frame.args.len() % 2 != 0 {
                return Err(ProtocolError::MalformedFrame {
                    detail: "coverage payload has an odd byte count".into(),
                });
            }
            let addresses = frame
                .args
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            Ok(Notification::Coverage { addresses })
        }
        NotificationCode::Log => Ok(Notification::Log {
            message: String::from_utf8_lossy(&frame.args).into_owned(),
        }),
    }
}

fn decode_stop(args: &[u8]) -> Result<StopReason, ProtocolError> {
    let (&reason, rest) = args.split_first().ok_or_else(|| ProtocolError::MalformedFrame {
        detail: "empty stop notification".into(),
    })?;
    let addr = match rest {
        [lo, hi, ..] => u16::from_le_bytes([*lo, *hi]),
        _ => 0,
    };
    match reason {
        STOP_PAUSE => Ok(StopReason::Pause),
        STOP_BREAKPOINT => Ok(StopReason::Breakpoint { addr }),
        STOP_WATCHPOINT => Ok(StopReason::Watchpoint { addr }),
        STOP_HALT => Ok(StopReason::Halt),
        STOP_ERROR => Ok(StopReason::Error {
            message: String::from_utf8_lossy(rest.get(2..).unwrap_or_default()).into_owned(),
        }),
        other => Err(ProtocolError::MalformedFrame {
            detail: format!("unknown stop reason {other:#04x}"),
        }),
    }
}

/// Builds the sequence-0 pause notification frame for a stop reason.
pub(crate) fn encode_stop_notification(reason: &StopReason) -> Frame {
    let mut args = Vec::new();
    match reason {
        StopReason::Pause => args.extend_from_slice(&[STOP_PAUSE, 0, 0]),
        StopReason::Breakpoint { addr } => {
            args.push(STOP_BREAKPOINT);
            args.extend_from_slice(&addr.to_le_bytes());
        }
        StopReason::Watchpoint { addr } => {
            args.push(STOP_WATCHPOINT);
            args.extend_from_slice(&addr.to_le_bytes());
        }
        StopReason::Halt => args.extend_from_slice(&[STOP_HALT, 0, 0]),
        StopReason::Error { message } => {
            args.extend_from_slice(&[STOP_ERROR, 0, 0]);
            args.extend_from_slice(message.as_bytes());
        }
    }
    Frame::new(NOTIFICATION_SEQ, NotificationCode::Pause as u8, args)
}

impl RemoteProtocol {
    /// Init handshake; returns the remote program's version triple.
    ///
    /// # Errors
    ///
    /// Transport/protocol errors from the command exchange, or a malformed
    /// version payload.
    pub fn init(&self) -> Result<[u8; 3], RemoteError> {
        let response = self.send_command(CommandCode::Init, &PROGRAM_VERSION)?;
        match response.as_slice() {
            [major, minor, patch] => Ok([*major, *minor, *patch]),
            _ => Err(ProtocolError::MalformedFrame {
                detail: format!("init response is {} bytes, expected 3", response.len()),
            }
            .into()),
        }
    }

    /// Orderly session end; the caller still disconnects the transport.
    ///
    /// # Errors
    ///
    /// Transport/protocol errors from the command exchange.
    pub fn close_session(&self) -> Result<(), RemoteError> {
        let _ = self.send_command(CommandCode::Close, &[])?;
        Ok(())
    }

    /// Reads the full register image.
    ///
    /// # Errors
    ///
    /// Transport/protocol errors, or a malformed register payload.
    pub fn get_registers(&self) -> Result<RegisterSnapshot, RemoteError> {
        let response = self.send_command(CommandCode::GetRegisters, &[])?;
        Ok(RegisterSnapshot::from_wire(&response)?)
    }

    /// Writes one wire-order register slot.
    ///
    /// # Errors
    ///
    /// Transport/protocol errors; an invalid slot is rejected remotely.
    pub fn set_register(&self, slot: u8, value: u16) -> Result<(), RemoteError> {
        let mut args = vec![slot];
        args.extend_from_slice(&value.to_le_bytes());
        let _ = self.send_command(CommandCode::SetRegister, &args)?;
        Ok(())
    }

    /// Reads `len` bytes starting at `addr` (wrapping at the 64 KiB end).
    ///
    /// # Errors
    ///
    /// Transport/protocol errors, or a response of the wrong length.
    pub fn read_memory(&self, addr: u16, len: u16) -> Result<Vec<u8>, RemoteError> {
        let mut args = Vec::with_capacity(4);
        args.extend_from_slice(&addr.to_le_bytes());
        args.extend_from_slice(&len.to_le_bytes());
        let response = self.send_command(CommandCode::ReadMemory, &args)?;
        if response.len() != usize::from(len) {
            return Err(ProtocolError::MalformedFrame {
                detail: format!(
                    "memory read returned {} bytes, expected {len}",
                    response.len()
                ),
            }
            .into());
        }
        Ok(response)
    }

    /// Writes `data` starting at `addr` (wrapping at the 64 KiB end).
    ///
    /// # Errors
    ///
    /// Transport/protocol errors from the command exchange.
    pub fn write_memory(&self, addr: u16, data: &[u8]) -> Result<(), RemoteError> {
        let mut args = Vec::with_capacity(2 + data.len());
        args.extend_from_slice(&addr.to_le_bytes());
        args.extend_from_slice(data);
        let _ = self.send_command(CommandCode::WriteMemory, &args)?;
        Ok(())
    }

    /// Installs a breakpoint and returns its identifier.
    ///
    /// # Errors
    ///
    /// Transport/protocol errors, or a malformed identifier payload.
    pub fn add_breakpoint(&self, addr: u16) -> Result<u16, RemoteError> {
        let response = self.send_command(CommandCode::AddBreakpoint, &addr.to_le_bytes())?;
        match response.as_slice() {
            [lo, hi] => Ok(u16::from_le_bytes([*lo, *hi])),
            _ => Err(ProtocolError::MalformedFrame {
                detail: "breakpoint response is not a 16-bit identifier".into(),
            }
            .into()),
        }
    }

    /// Removes a breakpoint by identifier.
    ///
    /// # Errors
    ///
    /// Transport/protocol errors; unknown identifiers are rejected remotely.
    pub fn remove_breakpoint(&self, id: u16) -> Result<(), RemoteError> {
        let _ = self.send_command(CommandCode::RemoveBreakpoint, &id.to_le_bytes())?;
        Ok(())
    }

    /// Resumes execution with up to two temporary breakpoints.
    ///
    /// The response acknowledges the resume; the eventual stop arrives as
    /// a pause notification (see [`RemoteProtocol::wait_for_stop`]).
    /// Step-over/into/out are built by the caller from the two temporary
    /// breakpoints.
    ///
    /// # Errors
    ///
    /// Transport/protocol errors from the command exchange.
    pub fn continue_with(
        &self,
        temp_bp1: Option<u16>,
        temp_bp2: Option<u16>,
    ) -> Result<(), RemoteError> {
        let mut args = Vec::with_capacity(6);
        for bp in [temp_bp1, temp_bp2] {
            match bp {
                Some(addr) => {
                    args.push(1);
                    args.extend_from_slice(&addr.to_le_bytes());
                }
                None => args.extend_from_slice(&[0, 0, 0]),
            }
        }
        let _ = self.send_command(CommandCode::Continue, &args)?;
        Ok(())
    }

    /// Requests a stop at the next instruction boundary.
    ///
    /// # Errors
    ///
    /// Transport/protocol errors from the command exchange.
    pub fn pause(&self) -> Result<(), RemoteError> {
        let _ = self.send_command(CommandCode::Pause, &[])?;
        Ok(())
    }

    /// Enables or disables the watchpoint group.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::UnsupportedFeature`] when the active
    /// transport cannot serve watchpoints (rejected before anything is
    /// sent); otherwise transport/protocol errors.
    pub fn enable_watchpoints(&self, enable: bool) -> Result<(), RemoteError> {
        if !self.supports_watchpoints() {
            return Err(ConfigurationError::UnsupportedFeature {
                feature: "watchpoints",
                transport: self.transport_kind(),
            }
            .into());
        }
        let _ = self.send_command(CommandCode::EnableWatchpoints, &[u8::from(enable)])?;
        Ok(())
    }

    /// Captures serialized CPU state plus the memory image.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::UnsupportedFeature`] when the active
    /// transport cannot serve state capture; otherwise transport/protocol
    /// errors.
    pub fn save_state(&self) -> Result<Vec<u8>, RemoteError> {
        if !self.supports_state_files() {
            return Err(ConfigurationError::UnsupportedFeature {
                feature: "state save/restore",
                transport: self.transport_kind(),
            }
            .into());
        }
        self.send_command(CommandCode::SaveState, &[])
    }

    /// Restores a previously captured state blob.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::UnsupportedFeature`] when the active
    /// transport cannot serve state restore; otherwise transport/protocol
    /// errors.
    pub fn restore_state(&self, state: &[u8]) -> Result<(), RemoteError> {
        if !self.supports_state_files() {
            return Err(ConfigurationError::UnsupportedFeature {
                feature: "state save/restore",
                transport: self.transport_kind(),
            }
            .into());
        }
        let _ = self.send_command(CommandCode::RestoreState, state)?;
        Ok(())
    }

    /// Blocks until execution stops, skipping over interleaved coverage
    /// and log notifications.
    ///
    /// Returns `None` when `timeout` elapses first.
    ///
    /// # Errors
    ///
    /// Returns the terminal transport error when the connection is lost
    /// while waiting.
    pub fn wait_for_stop(
        &self,
        timeout: std::time::Duration,
    ) -> Result<Option<StopReason>, RemoteError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match self.wait_notification(remaining) {
                Some(Notification::Stopped { reason }) => return Ok(Some(reason)),
                Some(Notification::ConnectionLost { error }) => return Err(error.into()),
                Some(Notification::Coverage { .. } | Notification::Log { .. }) => {}
                None => return Ok(None),
            }
        }
    }
}
