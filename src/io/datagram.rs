//! UDP/JSON transport to the simulator and from the controller process.
//!
//! Outbound messages carry a numeric `type` discriminator and a payload:
//! stick events (0), target updates (1), target resets (2) and reticle
//! size changes (3). Inbound datagrams are bare stick events. Any peer
//! that speaks this shape can stand in for the simulator.

use crate::error::{GuidanceError, Result};
use crate::io::{Axis, StickEvent, StickSink, TargetReport, TargetSink};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::UdpSocket;

#[derive(Debug, Serialize, Deserialize)]
struct WireStickEvent {
    axis: u8,
    value: i32,
}

/// Sender half of the link: both the virtual stick output and the overlay
/// target channel ride the same socket. Delivery failures are logged here;
/// a dropped datagram is no worse than a dropped video frame.
pub struct DatagramLink {
    socket: UdpSocket,
    peer: String,
}

impl DatagramLink {
    /// Opens a link towards `peer` (e.g. `127.0.0.1:9001`).
    pub fn connect(peer: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(DatagramLink {
            socket,
            peer: peer.to_string(),
        })
    }

    fn transmit(&self, message: serde_json::Value) {
        let encoded = message.to_string();
        if let Err(err) = self.socket.send_to(encoded.as_bytes(), &self.peer) {
            error!("datagram to {} failed: {}", self.peer, err);
        }
    }
}

impl StickSink for DatagramLink {
    fn send(&self, axis: Axis, value: i32) {
        self.transmit(json!({
            "type": 0,
            "payload": { "axis": axis.code(), "value": value },
        }));
    }
}

impl TargetSink for DatagramLink {
    fn update_target(&self, target: Option<TargetReport>) {
        match target {
            Some(report) => self.transmit(json!({
                "type": 1,
                "payload": { "x": report.x, "y": report.y, "size": report.size },
            })),
            None => self.transmit(json!({ "type": 2 })),
        }
    }

    fn update_reticle_size(&self, size: i32) {
        self.transmit(json!({
            "type": 3,
            "payload": { "size": size },
        }));
    }
}

/// Receiver half: yields stick events sent by the controller process.
pub struct EventListener {
    socket: UdpSocket,
}

impl EventListener {
    /// Binds the listening socket (e.g. `127.0.0.1:9002`).
    pub fn bind(address: &str) -> Result<Self> {
        let socket = UdpSocket::bind(address)?;
        Ok(EventListener { socket })
    }

    /// The bound address; useful when binding to an ephemeral port.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Blocks for the next well-formed stick event. Malformed datagrams
    /// and unknown axis codes are reported as link errors; the caller
    /// decides whether to keep listening.
    pub fn recv(&self) -> Result<StickEvent> {
        let mut buffer = [0u8; 512];
        let (length, _) = self.socket.recv_from(&mut buffer)?;

        let wire: WireStickEvent = serde_json::from_slice(&buffer[..length])
            .map_err(|err| GuidanceError::Link(format!("malformed stick event: {}", err)))?;

        let axis = Axis::from_code(wire.axis)
            .ok_or_else(|| GuidanceError::Link(format!("unknown axis code {}", wire.axis)))?;

        Ok(StickEvent {
            axis,
            value: wire.value,
        })
    }
}
