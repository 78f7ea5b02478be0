use rand::Rng;

use crate::error::{FecError, MalformedKind, Result};

/// Size of the fixed RTP header in bytes (RFC 3550 §5.1).
pub const RTP_HEADER_LEN: usize = 12;

/// RTP protocol version carried in the top two bits of byte 0.
pub const RTP_VERSION: u8 = 2;

/// Largest CSRC list the 4-bit CC field can describe.
pub const MAX_CSRCS: usize = 15;

/// A single RTP packet (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            CSRC list (CC entries, 32 bits each)               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Packets built by this crate never carry padding or a header extension.
/// [`decode`](Self::decode) accepts both: the extension is skipped and the
/// padding stripped, so only the payload proper ends up in [`payload`](Self::payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub marker: bool,
    /// 7-bit payload type (RFC 3551).
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    csrcs: Vec<u32>,
    pub payload: Vec<u8>,
}

impl RtpPacket {
    pub fn new(payload_type: u8, sequence: u16, timestamp: u32, ssrc: u32, payload: Vec<u8>) -> Self {
        Self {
            marker: false,
            payload_type: payload_type & 0x7f,
            sequence,
            timestamp,
            ssrc,
            csrcs: Vec::new(),
            payload,
        }
    }

    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    /// Attach contributing sources.
    ///
    /// Fails with [`FecError::TooManyCsrcs`] above [`MAX_CSRCS`] entries.
    pub fn with_csrcs(mut self, csrcs: Vec<u32>) -> Result<Self> {
        if csrcs.len() > MAX_CSRCS {
            return Err(FecError::TooManyCsrcs(csrcs.len()));
        }
        self.csrcs = csrcs;
        Ok(self)
    }

    /// Contributing sources, at most [`MAX_CSRCS`].
    pub fn csrcs(&self) -> &[u32] {
        &self.csrcs
    }

    /// Total encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        RTP_HEADER_LEN + self.body_len()
    }

    /// Length of everything after the fixed header (CSRC list and payload).
    pub fn body_len(&self) -> usize {
        self.csrcs.len() * 4 + self.payload.len()
    }

    /// Serialize to wire bytes, big-endian.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        let cc = self.csrcs.len() as u8;
        buf.push((RTP_VERSION << 6) | cc);
        buf.push(((self.marker as u8) << 7) | (self.payload_type & 0x7f));
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.ssrc.to_be_bytes());
        for csrc in &self.csrcs {
            buf.extend_from_slice(&csrc.to_be_bytes());
        }
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse wire bytes.
    ///
    /// Fails with [`FecError::Malformed`] if the buffer is shorter than the
    /// fixed header, the version is not 2, or the CSRC count, extension
    /// length or padding count point past the end of the buffer.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < RTP_HEADER_LEN {
            return Err(FecError::truncated(RTP_HEADER_LEN, buf.len()));
        }

        let version = buf[0] >> 6;
        if version != RTP_VERSION {
            return Err(FecError::malformed(MalformedKind::BadVersion(version)));
        }
        let padding = buf[0] & 0x20 != 0;
        let extension = buf[0] & 0x10 != 0;
        let cc = (buf[0] & 0x0f) as usize;

        let marker = buf[1] & 0x80 != 0;
        let payload_type = buf[1] & 0x7f;
        let sequence = u16::from_be_bytes([buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        let mut offset = RTP_HEADER_LEN;
        if buf.len() < offset + cc * 4 {
            return Err(FecError::malformed(MalformedKind::CsrcOverrun));
        }
        let csrcs = buf[offset..offset + cc * 4]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        offset += cc * 4;

        if extension {
            // 16-bit profile, 16-bit length in 32-bit words, then the words.
            if buf.len() < offset + 4 {
                return Err(FecError::malformed(MalformedKind::ExtensionOverrun));
            }
            let words = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]) as usize;
            offset += 4 + words * 4;
            if buf.len() < offset {
                return Err(FecError::malformed(MalformedKind::ExtensionOverrun));
            }
        }

        let mut end = buf.len();
        if padding {
            let count = buf[end - 1] as usize;
            if count == 0 || offset + count > end {
                return Err(FecError::malformed(MalformedKind::BadPadding));
            }
            end -= count;
        }

        Ok(Self {
            marker,
            payload_type,
            sequence,
            timestamp,
            ssrc,
            csrcs,
            payload: buf[offset..end].to_vec(),
        })
    }
}

/// Generic RTP header state for an outgoing stream.
///
/// Every packet built through it gets the next sequence number and the
/// current timestamp:
/// - **Sequence number**: 16-bit, wrapping, incremented on every packet.
/// - **Timestamp**: stored as u64 internally to avoid wrapping arithmetic
///   during duration calculations; the lower 32 bits are written to the wire.
/// - **SSRC**: randomly generated per RFC 3550 §8.1 to avoid collisions.
#[derive(Debug)]
pub struct RtpHeader {
    /// RTP payload type (7-bit, RFC 3551).
    pub pt: u8,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
    sequence: u16,
    timestamp: u64,
}

impl RtpHeader {
    /// Create a new RTP header state with explicit SSRC.
    pub fn new(pt: u8, ssrc: u32) -> Self {
        tracing::debug!(
            pt,
            ssrc = format_args!("{:#010X}", ssrc),
            "RTP header state created"
        );
        Self {
            pt,
            ssrc,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// Create with a random SSRC.
    ///
    /// Per RFC 3550 §8.1, the SSRC should be chosen randomly to minimize
    /// the probability of collisions between independent sessions.
    pub fn with_random_ssrc(pt: u8) -> Self {
        let ssrc = rand::rng().random::<u32>();
        Self::new(pt, ssrc)
    }

    /// Start numbering at `sequence` instead of 0.
    pub fn starting_at(mut self, sequence: u16) -> Self {
        self.sequence = sequence;
        self
    }

    /// Current sequence number (before the next [`packet`](Self::packet) call).
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Current timestamp (internal u64 representation).
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Build the next packet around `payload` and advance the sequence number.
    ///
    /// The `marker` bit (RFC 3550 §5.1) signals the last packet of a frame.
    pub fn packet(&mut self, marker: bool, payload: Vec<u8>) -> RtpPacket {
        let packet = RtpPacket::new(self.pt, self.sequence, self.timestamp as u32, self.ssrc, payload)
            .with_marker(marker);
        self.sequence = self.sequence.wrapping_add(1);
        packet
    }

    /// Advance the RTP timestamp by the given increment.
    ///
    /// For video at 90 kHz clock rate, the increment per frame is
    /// `90000 / fps` (e.g. 3000 for 30 fps, 3600 for 25 fps).
    pub fn advance_timestamp(&mut self, increment: u32) {
        self.timestamp = self.timestamp.wrapping_add(increment as u64);
    }
}
