//! Session configuration resolved once at connect time.

use std::path::PathBuf;
use std::time::Duration;

use z80_core::CpuTimingConfig;

/// Default window for one command: the write plus the response wait.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(3000);
/// Default window a peer may stall mid-frame before the connection fails.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_millis(1000);
/// Default bound on waiting for a graceful close to complete.
pub const DEFAULT_DISCONNECT_GRACE: Duration = Duration::from_millis(1000);
/// Default window for the initial connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Which channel backs the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSelect {
    /// Socket connection to a remote counterpart.
    Tcp {
        /// Host name or address.
        host: String,
        /// TCP port.
        port: u16,
    },
    /// Character-device connection (USB/serial adapter).
    Serial {
        /// Device path, e.g. `/dev/ttyUSB0`.
        path: PathBuf,
    },
    /// In-process simulator; commands execute synchronously.
    Simulator,
}

/// Immutable per-session configuration.
///
/// Resolved once when the session is created and passed by reference; no
/// ambient global carries any of these values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Transport selection.
    pub select: TransportSelect,
    /// Initial connection window.
    pub connect_timeout: Duration,
    /// Per-command window covering the write and the response wait.
    pub send_timeout: Duration,
    /// Mid-frame stall window.
    pub stall_timeout: Duration,
    /// Bound on graceful-close completion.
    pub disconnect_grace: Duration,
    /// Interrupt period and load-window parameters for the simulator.
    pub timing: CpuTimingConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            select: TransportSelect::Simulator,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            disconnect_grace: DEFAULT_DISCONNECT_GRACE,
            timing: CpuTimingConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Configuration for an in-process simulator session.
    #[must_use]
    pub fn simulator() -> Self {
        Self::default()
    }

    /// Configuration for a socket session with default timeouts.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            select: TransportSelect::Tcp {
                host: host.into(),
                port,
            },
            ..Self::default()
        }
    }

    /// Configuration for a serial-device session with default timeouts.
    #[must_use]
    pub fn serial(path: impl Into<PathBuf>) -> Self {
        Self {
            select: TransportSelect::Serial { path: path.into() },
            ..Self::default()
        }
    }
}
