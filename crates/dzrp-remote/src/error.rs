//! Error taxonomy for the transport and protocol layers.
//!
//! Transport errors are fatal to the connection: every pending command is
//! rejected before the error is surfaced. Protocol errors concern single
//! frames and leave the connection usable. Configuration errors reject one
//! operation synchronously. No layer retries anything on its own.

use std::time::Duration;

use thiserror::Error;

/// Connection-fatal transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The initial connection attempt failed.
    #[error("connect failed: {detail}")]
    ConnectFailed {
        /// Human-readable connect failure description.
        detail: String,
    },
    /// The peer closed or reset the connection.
    #[error("connection lost")]
    ConnectionClosed,
    /// Raw I/O failure on the underlying stream.
    #[error("transport i/o failure: {0}")]
    Io(String),
    /// A frame header announced a length but the payload stopped arriving.
    #[error("peer stalled mid-frame for longer than {timeout:?}")]
    StallTimeout {
        /// Configured stall window that expired.
        timeout: Duration,
    },
    /// The peer announced a frame length the framing layer refuses to buffer.
    #[error("framing violation: {detail}")]
    Framing {
        /// Human-readable framing violation description.
        detail: String,
    },
    /// A command was sent but no matching response arrived in time.
    #[error("command timed out after {timeout:?}")]
    CommandTimeout {
        /// Configured command window that expired.
        timeout: Duration,
    },
}

/// Per-frame protocol failures; logged, dropped, and survived.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A complete frame did not decode to a valid message.
    #[error("malformed frame: {detail}")]
    MalformedFrame {
        /// Human-readable decode failure description.
        detail: String,
    },
    /// A response arrived for a sequence number with no pending request.
    #[error("no pending request for sequence number {seq}")]
    UnmatchedSequence {
        /// Sequence number carried by the stale or duplicate frame.
        seq: u8,
    },
    /// The remote answered a command with a non-OK status.
    #[error("command rejected by remote (status {status:#04x}): {message}")]
    CommandRejected {
        /// Wire status byte.
        status: u8,
        /// Message text carried in the response payload, if any.
        message: String,
    },
}

/// Synchronous rejection of an operation the active session cannot serve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The active transport does not support the requested feature.
    #[error("{feature} is not supported by the {transport} transport")]
    UnsupportedFeature {
        /// Feature the caller asked for.
        feature: &'static str,
        /// Kind name of the active transport.
        transport: &'static str,
    },
    /// A snapshot name is empty or would escape the snapshot directory.
    #[error("invalid snapshot name {name:?}")]
    InvalidSnapshotName {
        /// Offending name.
        name: String,
    },
}

/// Umbrella error returned by the command API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Connection-fatal transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Frame-level protocol failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Feature not available on the active session.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// Serialized CPU state failed layout validation.
    #[error(transparent)]
    State(#[from] z80_core::SnapshotLayoutError),
}
