//! Per-session transport construction.
//!
//! One explicit constructor call per session replaces any ambient global
//! binding: the selected transport is built once from the resolved
//! configuration and handed to the protocol layer by value.

use std::sync::mpsc::Receiver;

use crate::config::{SessionConfig, TransportSelect};
use crate::error::{RemoteError, TransportError};
use crate::protocol::RemoteProtocol;
use crate::serial::SerialTransport;
use crate::simulator::SimTransport;
use crate::tcp::TcpTransport;
use crate::transport::{LinkEvent, Transport};

/// Builds the transport selected by `config` and returns it with the
/// connection's event stream.
///
/// # Errors
///
/// Returns [`TransportError`] when the socket connection or device open
/// fails; the simulator variant cannot fail.
pub fn create_transport(
    config: &SessionConfig,
) -> Result<(Box<dyn Transport>, Receiver<LinkEvent>), TransportError> {
    match &config.select {
        TransportSelect::Tcp { host, port } => {
            let (transport, events) = TcpTransport::connect(host, *port, config)?;
            Ok((Box::new(transport), events))
        }
        TransportSelect::Serial { path } => {
            let (transport, events) = SerialTransport::open(path, config)?;
            Ok((Box::new(transport), events))
        }
        TransportSelect::Simulator => {
            let (transport, events) = SimTransport::new(config);
            Ok((Box::new(transport), events))
        }
    }
}

/// Builds the selected transport and wires a protocol session onto it.
///
/// # Errors
///
/// Propagates transport construction failures.
pub fn connect(config: &SessionConfig) -> Result<RemoteProtocol, RemoteError> {
    let (transport, events) = create_transport(config)?;
    tracing::debug!(kind = transport.kind(), "session transport created");
    Ok(RemoteProtocol::new(transport, events, config))
}

#[cfg(test)]
mod tests {
    use super::connect;
    use crate::config::SessionConfig;

    #[test]
    fn simulator_sessions_construct_without_io() {
        let protocol = connect(&SessionConfig::simulator()).expect("simulator never fails");
        assert_eq!(protocol.transport_kind(), "simulator");
        assert!(protocol.supports_watchpoints());
        assert!(protocol.supports_state_files());
    }
}
