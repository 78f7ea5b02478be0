//! MJPEG RTP packetizer (RFC 2435).
//!
//! Each JPEG frame travels in a single RTP packet with the marker bit set,
//! so one lost datagram costs exactly one frame and one FEC group member.
//! Uses static payload type 26 (`a=rtpmap:26 JPEG/90000`) and the 90 kHz
//! video clock.

use super::Packetizer;
use super::rtp::{RTP_HEADER_LEN, RtpHeader, RtpPacket};
use crate::error::{FecError, Result};

/// Static RTP payload type for JPEG (RFC 3551 §6).
pub const MJPEG_PAYLOAD_TYPE: u8 = 26;

/// Video clock rate in Hz (RFC 3551 §4).
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Largest UDP payload over IPv4 (65535 - 8 byte UDP - 20 byte IP header).
const MAX_DATAGRAM: usize = 65_507;

/// Largest JPEG frame that still fits a single RTP datagram.
pub const MAX_FRAME_LEN: usize = MAX_DATAGRAM - RTP_HEADER_LEN;

#[derive(Debug)]
pub struct MjpegPacketizer {
    header: RtpHeader,
}

impl MjpegPacketizer {
    /// Create with explicit payload type and SSRC.
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self {
            header: RtpHeader::new(pt, ssrc),
        }
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(pt: u8) -> Self {
        Self {
            header: RtpHeader::with_random_ssrc(pt),
        }
    }

    /// Start numbering at `sequence` instead of 0.
    pub fn starting_at(mut self, sequence: u16) -> Self {
        self.header = self.header.starting_at(sequence);
        self
    }
}

impl Packetizer for MjpegPacketizer {
    fn packetize(&mut self, frame: &[u8], timestamp_increment: u32) -> Result<RtpPacket> {
        if frame.len() > MAX_FRAME_LEN {
            tracing::warn!(
                frame_len = frame.len(),
                max = MAX_FRAME_LEN,
                "JPEG frame too large for one datagram"
            );
            return Err(FecError::PayloadTooLarge(frame.len()));
        }

        let packet = self.header.packet(true, frame.to_vec());
        self.header.advance_timestamp(timestamp_increment);

        tracing::trace!(
            seq = packet.sequence,
            ts = packet.timestamp,
            frame_len = frame.len(),
            "packetized JPEG frame"
        );
        Ok(packet)
    }

    fn codec_name(&self) -> &'static str {
        "JPEG"
    }

    fn clock_rate(&self) -> u32 {
        VIDEO_CLOCK_RATE
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    fn ssrc(&self) -> u32 {
        self.header.ssrc
    }

    fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }

    fn next_rtp_timestamp(&self) -> u32 {
        self.header.timestamp() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0xff, 0xd9];

    #[test]
    fn one_packet_per_frame_with_marker() {
        let mut p = MjpegPacketizer::new(MJPEG_PAYLOAD_TYPE, 0x1234);
        let pkt = p.packetize(JPEG, 3600).unwrap();
        assert!(pkt.marker);
        assert_eq!(pkt.payload_type, 26);
        assert_eq!(pkt.ssrc, 0x1234);
        assert_eq!(pkt.payload, JPEG);
    }

    #[test]
    fn sequence_and_timestamp_advance_per_frame() {
        let mut p = MjpegPacketizer::new(MJPEG_PAYLOAD_TYPE, 1).starting_at(100);
        let a = p.packetize(JPEG, 3600).unwrap();
        let b = p.packetize(JPEG, 3600).unwrap();
        assert_eq!((a.sequence, a.timestamp), (100, 0));
        assert_eq!((b.sequence, b.timestamp), (101, 3600));
        assert_eq!(p.next_sequence(), 102);
        assert_eq!(p.next_rtp_timestamp(), 7200);
    }

    #[test]
    fn oversized_frame_rejected_without_consuming_sequence() {
        let mut p = MjpegPacketizer::new(MJPEG_PAYLOAD_TYPE, 1);
        let big = vec![0u8; MAX_FRAME_LEN + 1];
        assert!(matches!(
            p.packetize(&big, 3600),
            Err(FecError::PayloadTooLarge(n)) if n == MAX_FRAME_LEN + 1
        ));
        assert_eq!(p.next_sequence(), 0);
    }

    #[test]
    fn codec_metadata() {
        let p = MjpegPacketizer::with_random_ssrc(MJPEG_PAYLOAD_TYPE);
        assert_eq!(p.codec_name(), "JPEG");
        assert_eq!(p.clock_rate(), 90_000);
        assert_eq!(p.payload_type(), 26);
    }
}
