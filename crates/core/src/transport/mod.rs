//! Outbound packet delivery seam.
//!
//! The engine never touches sockets. A sender session hands each finished
//! packet to a [`PacketSink`], tagged with the [`Channel`] it belongs on:
//! media packets go to the client's RTP port, FEC packets to the FEC
//! destination (the same port, or a separate one, depending on the SETUP
//! negotiation). Loss injection for testing also lives behind this trait.

use crate::error::Result;

/// Logical stream a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Media,
    Fec,
}

/// Destination for outgoing RTP and FEC packets.
pub trait PacketSink {
    /// Deliver one complete packet.
    fn send(&mut self, channel: Channel, packet: &[u8]) -> Result<()>;
}

/// Sink that keeps every packet in memory, in send order.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub packets: Vec<(Channel, Vec<u8>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets sent on `channel`, in order.
    pub fn on(&self, channel: Channel) -> impl Iterator<Item = &[u8]> {
        self.packets
            .iter()
            .filter(move |(c, _)| *c == channel)
            .map(|(_, p)| p.as_slice())
    }
}

impl PacketSink for MemorySink {
    fn send(&mut self, channel: Channel, packet: &[u8]) -> Result<()> {
        self.packets.push((channel, packet.to_vec()));
        Ok(())
    }
}
