//! DZRP wire frame: `[length:u32-LE][seq:u8][code:u8][args...]`.
//!
//! The length prefix counts everything after itself, so a structurally
//! valid payload is at least two bytes. Sequence number 0 is reserved for
//! notification frames; command allocation never produces it. The numeric
//! code assignments are a private agreement with the remote counterpart
//! and carry no external compatibility guarantee.

use crate::error::ProtocolError;

/// Byte length of the frame length prefix.
pub const FRAME_HEADER_BYTES: usize = 4;

/// Smallest valid announced payload length (sequence + code).
pub const MIN_PAYLOAD_BYTES: usize = 2;

/// Largest announced payload length the framing layer will buffer.
///
/// A 64 KiB memory image plus serialized registers fits comfortably; a
/// peer announcing more than this is treated as a framing violation, not
/// buffered to exhaustion.
pub const MAX_PAYLOAD_BYTES: usize = 0x11_0000;

/// Sequence number carried by notification frames.
pub const NOTIFICATION_SEQ: u8 = 0;

/// Response status: command executed.
pub const STATUS_OK: u8 = 0x00;
/// Response status: command understood but rejected.
pub const STATUS_REJECTED: u8 = 0x01;
/// Response status: command code unknown to the remote.
pub const STATUS_UNKNOWN_COMMAND: u8 = 0x02;

/// Command codes understood by both sides of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandCode {
    /// Handshake; exchanges program versions.
    Init = 0x01,
    /// Orderly session end.
    Close = 0x02,
    /// Full register image in wire order.
    GetRegisters = 0x03,
    /// Write one wire-order register slot.
    SetRegister = 0x04,
    /// Resume execution, with up to two temporary breakpoints.
    Continue = 0x05,
    /// Request a stop at the next instruction boundary.
    Pause = 0x06,
    /// Read a span of memory.
    ReadMemory = 0x07,
    /// Write a span of memory.
    WriteMemory = 0x08,
    /// Install a breakpoint, returning its identifier.
    AddBreakpoint = 0x09,
    /// Remove a breakpoint by identifier.
    RemoveBreakpoint = 0x0A,
    /// Enable or disable the watchpoint group.
    EnableWatchpoints = 0x0B,
    /// Capture serialized CPU state plus the memory image.
    SaveState = 0x0C,
    /// Restore a previously captured state blob.
    RestoreState = 0x0D,
}

impl CommandCode {
    /// Stable wire byte for this command.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a wire byte into a command code.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Init),
            0x02 => Some(Self::Close),
            0x03 => Some(Self::GetRegisters),
            0x04 => Some(Self::SetRegister),
            0x05 => Some(Self::Continue),
            0x06 => Some(Self::Pause),
            0x07 => Some(Self::ReadMemory),
            0x08 => Some(Self::WriteMemory),
            0x09 => Some(Self::AddBreakpoint),
            0x0A => Some(Self::RemoveBreakpoint),
            0x0B => Some(Self::EnableWatchpoints),
            0x0C => Some(Self::SaveState),
            0x0D => Some(Self::RestoreState),
            _ => None,
        }
    }
}

/// Notification codes carried by sequence-0 frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NotificationCode {
    /// Execution stopped; arguments carry the stop reason.
    Pause = 0x01,
    /// Code coverage addresses recorded since the last notification.
    Coverage = 0x02,
    /// Log text emitted by the remote.
    Log = 0x03,
}

impl NotificationCode {
    /// Decodes a wire byte into a notification code.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Pause),
            0x02 => Some(Self::Coverage),
            0x03 => Some(Self::Log),
            _ => None,
        }
    }
}

/// One reassembled DZRP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Correlation sequence number; 0 for notifications.
    pub seq: u8,
    /// Command code on requests, status code on responses, notification
    /// code on sequence-0 frames.
    pub code: u8,
    /// Command-specific argument bytes.
    pub args: Vec<u8>,
}

impl Frame {
    /// Builds a frame from its parts.
    #[must_use]
    pub const fn new(seq: u8, code: u8, args: Vec<u8>) -> Self {
        Self { seq, code, args }
    }

    /// Encodes the frame with its little-endian length prefix.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let payload_len = MIN_PAYLOAD_BYTES + self.args.len();
        let mut out = Vec::with_capacity(FRAME_HEADER_BYTES + payload_len);
        let length = u32::try_from(payload_len).unwrap_or(u32::MAX);
        out.extend_from_slice(&length.to_le_bytes());
        out.push(self.seq);
        out.push(self.code);
        out.extend_from_slice(&self.args);
        out
    }

    /// Parses one complete payload (the bytes after the length prefix).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedFrame`] when the payload is
    /// shorter than sequence-plus-code.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < MIN_PAYLOAD_BYTES {
            return Err(ProtocolError::MalformedFrame {
                detail: format!("payload of {} bytes lacks sequence and code", payload.len()),
            });
        }
        Ok(Self {
            seq: payload[0],
            code: payload[1],
            args: payload[2..].to_vec(),
        })
    }

    /// True for a notification frame (reserved sequence number).
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.seq == NOTIFICATION_SEQ
    }
}

#[cfg(test)]
mod tests {
    use super::{CommandCode, Frame, NotificationCode, FRAME_HEADER_BYTES, NOTIFICATION_SEQ};

    #[test]
    fn encode_prefixes_the_payload_length() {
        let frame = Frame::new(1, CommandCode::ReadMemory.as_u8(), vec![0xAA, 0xBB]);
        let bytes = frame.encode();
        assert_eq!(&bytes[..FRAME_HEADER_BYTES], &[4, 0, 0, 0]);
        assert_eq!(&bytes[FRAME_HEADER_BYTES..], &[1, 0x07, 0xAA, 0xBB]);
    }

    #[test]
    fn parse_inverts_encode() {
        let frame = Frame::new(0x7F, 0x05, vec![1, 2, 3]);
        let bytes = frame.encode();
        let parsed = Frame::parse(&bytes[FRAME_HEADER_BYTES..]).expect("valid payload");
        assert_eq!(parsed, frame);
    }

    #[test]
    fn empty_args_are_valid() {
        let parsed = Frame::parse(&[9, 0x06]).expect("minimal payload");
        assert_eq!(parsed.seq, 9);
        assert_eq!(parsed.code, 0x06);
        assert!(parsed.args.is_empty());
    }

    #[test]
    fn short_payloads_are_malformed() {
        assert!(Frame::parse(&[]).is_err());
        assert!(Frame::parse(&[1]).is_err());
    }

    #[test]
    fn notification_frames_use_the_reserved_sequence() {
        let frame = Frame::new(NOTIFICATION_SEQ, 0x01, Vec::new());
        assert!(frame.is_notification());
        let frame = Frame::new(1, 0x01, Vec::new());
        assert!(!frame.is_notification());
    }

    #[test]
    fn command_codes_roundtrip_through_their_wire_bytes() {
        for code in [
            CommandCode::Init,
            CommandCode::Close,
            CommandCode::GetRegisters,
            CommandCode::SetRegister,
            CommandCode::Continue,
            CommandCode::Pause,
            CommandCode::ReadMemory,
            CommandCode::WriteMemory,
            CommandCode::AddBreakpoint,
            CommandCode::RemoveBreakpoint,
            CommandCode::EnableWatchpoints,
            CommandCode::SaveState,
            CommandCode::RestoreState,
        ] {
            assert_eq!(CommandCode::from_u8(code.as_u8()), Some(code));
        }
        assert_eq!(CommandCode::from_u8(0xEE), None);
        assert_eq!(NotificationCode::from_u8(0x01), Some(NotificationCode::Pause));
        assert_eq!(NotificationCode::from_u8(0x09), None);
    }
}
