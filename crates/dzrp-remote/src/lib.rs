//! DZRP remote-debug transport and protocol layer.
//!
//! Reframes an unreliable byte stream into discrete length-prefixed
//! frames, correlates responses to pending commands by sequence number,
//! and exposes a typed command API over a polymorphic transport: socket,
//! serial device, or the in-process simulator backed by `z80-core`.

/// Wire frame model and code assignments.
pub mod frame;
pub use frame::{
    CommandCode, Frame, NotificationCode, FRAME_HEADER_BYTES, MAX_PAYLOAD_BYTES, MIN_PAYLOAD_BYTES,
    NOTIFICATION_SEQ, STATUS_OK, STATUS_REJECTED, STATUS_UNKNOWN_COMMAND,
};

/// Byte-stream reframing state machine.
pub mod reassembly;
pub use reassembly::{AssemblerState, FrameAssembler};

/// Session configuration.
pub mod config;
pub use config::{
    SessionConfig, TransportSelect, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DISCONNECT_GRACE,
    DEFAULT_SEND_TIMEOUT, DEFAULT_STALL_TIMEOUT,
};

/// Transport interface and connection event stream.
pub mod transport;
pub use transport::{LinkEvent, Transport};

/// Socket transport.
pub mod tcp;
pub use tcp::TcpTransport;

/// Serial-device transport.
pub mod serial;
pub use serial::SerialTransport;

/// In-process simulator transport.
pub mod simulator;
pub use simulator::SimTransport;

/// Request/response correlation.
pub mod protocol;
pub use protocol::RemoteProtocol;

/// Typed command wrappers and notifications.
pub mod commands;
pub use commands::{
    decode_notification, Notification, RegisterSnapshot, StopReason, PROGRAM_VERSION,
};

/// Per-session transport construction.
pub mod factory;
pub use factory::{connect, create_transport};

/// Named snapshot files.
pub mod snapshot;
pub use snapshot::{load_state_file, save_state_file};

/// Error taxonomy.
pub mod error;
pub use error::{ConfigurationError, ProtocolError, RemoteError, TransportError};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use tempfile as _;
