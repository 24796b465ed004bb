//! Wake-on-LAN magic packets.

use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::{ControlError, Result};

/// Broadcasts a wake signal for a hardware address.
#[async_trait]
pub trait WakeSignal: Send + Sync {
    async fn wake(&self, mac_address: &str) -> Result<()>;
}

/// Parse `AA:BB:CC:DD:EE:FF` or `AA-BB-CC-DD-EE-FF`.
pub fn parse_mac(mac_address: &str) -> Result<[u8; 6]> {
    let parts: Vec<&str> = mac_address.split(|c| c == ':' || c == '-').collect();
    if parts.len() != 6 {
        return Err(ControlError::WakeFailed(format!(
            "invalid MAC address: {}",
            mac_address
        )));
    }

    let mut bytes = [0u8; 6];
    for (byte, part) in bytes.iter_mut().zip(parts) {
        *byte = u8::from_str_radix(part, 16).map_err(|_| {
            ControlError::WakeFailed(format!("invalid MAC address: {}", mac_address))
        })?;
    }
    Ok(bytes)
}

/// Six 0xFF bytes followed by the address repeated sixteen times.
pub fn magic_packet(mac: [u8; 6]) -> Vec<u8> {
    let mut packet = vec![0xFF; 6];
    for _ in 0..16 {
        packet.extend_from_slice(&mac);
    }
    packet
}

/// UDP broadcaster.
#[derive(Debug, Clone)]
pub struct MagicPacketWaker {
    target: SocketAddr,
}

impl MagicPacketWaker {
    pub fn new() -> Self {
        Self {
            target: SocketAddr::from((Ipv4Addr::BROADCAST, 9)),
        }
    }

    /// Send to a specific address instead of the limited broadcast.
    pub fn with_target(target: SocketAddr) -> Self {
        Self { target }
    }
}

impl Default for MagicPacketWaker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WakeSignal for MagicPacketWaker {
    async fn wake(&self, mac_address: &str) -> Result<()> {
        let packet = magic_packet(parse_mac(mac_address)?);

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| ControlError::WakeFailed(e.to_string()))?;
        socket
            .set_broadcast(true)
            .map_err(|e| ControlError::WakeFailed(e.to_string()))?;
        socket
            .send_to(&packet, self.target)
            .await
            .map_err(|e| ControlError::WakeFailed(e.to_string()))?;

        debug!(mac = %mac_address, target = %self.target, "magic packet sent");
        Ok(())
    }
}
