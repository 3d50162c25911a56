//! CAN bus support: frame type, actuator protocol and transports

mod frame;
pub mod protocol;
#[cfg(target_os = "linux")]
mod socket;
mod transport;

pub use frame::{CanFrame, EFF_MAX_ID, MAX_PAYLOAD, SFF_MAX_ID};
#[cfg(target_os = "linux")]
pub use socket::SocketCanTransport;
pub use transport::{CanTransport, NoopTransport, TransportError};

use crate::Result;
use crate::config::CanConfig;

/// Open the transport selected by configuration
///
/// A disabled bus yields a [`NoopTransport`] so the rest of the pipeline can
/// be exercised on a bench without hardware.
///
/// # Errors
///
/// Returns error if CAN is enabled and the interface cannot be bound
pub fn open_transport(config: &CanConfig) -> Result<Box<dyn CanTransport>> {
    if !config.enabled {
        tracing::info!("CAN disabled, actuator commands will not be sent");
        return Ok(Box::new(NoopTransport));
    }

    open_socket(&config.interface)
}

#[cfg(target_os = "linux")]
fn open_socket(interface: &str) -> Result<Box<dyn CanTransport>> {
    Ok(Box::new(SocketCanTransport::open(interface)?))
}

#[cfg(not(target_os = "linux"))]
fn open_socket(interface: &str) -> Result<Box<dyn CanTransport>> {
    Err(crate::Error::Can(format!(
        "cannot open {interface}: SocketCAN is only available on Linux"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_bus_uses_noop_transport() {
        let config = CanConfig {
            enabled: false,
            interface: "can0".to_string(),
        };
        let mut transport = open_transport(&config).unwrap();
        let frame = protocol::encode_tail(0);
        assert!(transport.send(&frame).is_ok());
    }

    #[test]
    fn enabled_bus_with_missing_interface_fails() {
        let config = CanConfig {
            enabled: true,
            interface: "helmsman-missing0".to_string(),
        };
        assert!(open_transport(&config).is_err());
    }
}
