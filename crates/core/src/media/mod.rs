//! Media framing and RTP packetization.
//!
//! This module provides the [`Packetizer`] trait, the MJPEG implementation
//! and the [`FrameSource`] seam through which encoded frames enter the
//! engine.
//!
//! ## RTP overview (RFC 3550)
//!
//! Every RTP packet carries a 12-byte fixed header ([`rtp::RtpPacket`])
//! containing:
//!
//! - **Sequence number** (16-bit, wrapping): for reordering and loss detection.
//! - **Timestamp** (32-bit): media clock, 90 kHz for video.
//! - **SSRC** (32-bit): randomly chosen to identify the sender.
//! - **Marker bit**: set on the last packet of a frame.
//!
//! ## Supported codecs
//!
//! | Codec | Module | RFC | Payload type |
//! |-------|--------|-----|--------------|
//! | MJPEG | [`mjpeg`] | [RFC 2435](https://tools.ietf.org/html/rfc2435) | 26 |

pub mod mjpeg;
pub mod rtp;

use crate::error::Result;
use rtp::RtpPacket;

/// Codec-specific RTP packetizer.
///
/// The generic header state is handled by [`rtp::RtpHeader`]; packetizers
/// compose it rather than reimplementing sequence and timestamp tracking.
pub trait Packetizer: Send {
    /// Wrap one encoded frame into an RTP packet.
    ///
    /// `timestamp_increment` advances the RTP timestamp after this frame,
    /// typically `clock_rate / fps` (e.g. 3600 for 25 fps at 90 kHz).
    fn packetize(&mut self, frame: &[u8], timestamp_increment: u32) -> Result<RtpPacket>;

    /// Codec name used in log output (e.g. `"JPEG"`).
    fn codec_name(&self) -> &'static str;

    /// RTP clock rate in Hz.
    fn clock_rate(&self) -> u32;

    /// RTP payload type number (RFC 3551).
    fn payload_type(&self) -> u8;

    /// SSRC stamped on every packet of this stream.
    fn ssrc(&self) -> u32;

    /// Sequence number the next packet will carry.
    fn next_sequence(&self) -> u16;

    /// Timestamp the next packet will carry.
    fn next_rtp_timestamp(&self) -> u32;
}

/// Supplier of encoded video frames, one per sender tick.
///
/// Container parsing (AVI, QuickTime, raw MJPEG) lives behind this trait.
pub trait FrameSource {
    /// Next encoded frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<Vec<u8>>;

    /// Nominal frame rate in frames per second.
    fn frame_rate(&self) -> u32;
}
