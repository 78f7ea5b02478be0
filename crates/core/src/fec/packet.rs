use std::collections::HashMap;

use crate::error::{FecError, MalformedKind, Result};
use crate::media::rtp::{RTP_HEADER_LEN, RTP_VERSION, RtpPacket};
use crate::seq;

use super::{DEFAULT_FEC_PAYLOAD_TYPE, MAX_GROUP_SIZE};

/// Size of the FEC header that follows the outer RTP header (RFC 5109 §7.3).
pub const FEC_HEADER_LEN: usize = 10;

/// ULP level header size with the short (16-bit) mask.
const ULP_SHORT_LEN: usize = 4;

/// ULP level header size with the long (48-bit) mask.
const ULP_LONG_LEN: usize = 8;

/// Group sizes above this need the long mask (L bit).
const SHORT_MASK_BITS: usize = 16;

/// Mask bits live in the low 48 bits; offset 0 is the most significant.
const MASK_TOP_BIT: u32 = MAX_GROUP_SIZE as u32 - 1;

/// XOR of the header fields of every protected packet.
///
/// Each field is the running XOR of the corresponding bits of the RTP
/// packets folded so far (RFC 5109 §10.1). With every member folded in
/// except one, the fields hold that member's values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Recovery {
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub timestamp: u32,
    /// XOR of the body lengths (CSRC list + payload) in bytes.
    pub length: u16,
}

/// An RTP-framed FEC packet (RFC 5109 §7).
///
/// ```text
///  outer RTP header (12 bytes, PT = FEC payload type)
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |E|L|P|X|  CC   |M| PT recovery |            SN base            |  byte 12
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          TS recovery                          |  byte 16
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |        length recovery        |       Protection Length       |  byte 20
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |             mask              |  mask cont. (L = 1 only) ...  |  byte 24
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      XOR-folded payload                       |
/// ```
///
/// Mask bit `i` (most significant first) marks `SN base + i` as protected.
/// The sender always protects one contiguous run, so the mask is
/// `group_size` leading ones; the long 48-bit mask is used for groups
/// larger than 16. The protection length is the length of the folded
/// payload, i.e. the longest protected body.
///
/// On the sender the packet doubles as the open accumulator:
/// [`new_group`](Self::new_group), [`fold`](Self::fold) each member once,
/// then [`encode`](Self::encode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FecPacket {
    /// Sequence number in the FEC stream's own numbering.
    pub sequence: u16,
    /// Timestamp of the last packet folded in.
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload_type: u8,
    /// First protected media sequence number.
    pub sn_base: u16,
    mask: u64,
    recovery: Recovery,
    payload: Vec<u8>,
}

impl FecPacket {
    /// Open an accumulator protecting `group_size` media packets starting at
    /// `first_media_seq`.
    ///
    /// `group_size` is clamped to `1..=48`; callers validate it beforehand.
    pub fn new_group(fec_seq: u16, first_media_seq: u16, group_size: usize) -> Self {
        let n = group_size.clamp(1, MAX_GROUP_SIZE) as u32;
        let ones = (1u64 << n) - 1;
        Self {
            sequence: fec_seq,
            timestamp: 0,
            ssrc: 0,
            payload_type: DEFAULT_FEC_PAYLOAD_TYPE,
            sn_base: first_media_seq,
            mask: ones << (MASK_TOP_BIT + 1 - n),
            recovery: Recovery::default(),
            payload: Vec::new(),
        }
    }

    pub fn with_payload_type(mut self, pt: u8) -> Self {
        self.payload_type = pt & 0x7f;
        self
    }

    /// Fold a protected media packet into the accumulator.
    ///
    /// XORs its header fields into the recovery fields and its body into the
    /// payload buffer, growing the buffer with zeros when the body is longer.
    /// The outer timestamp and SSRC follow the folded packet, so after the
    /// last fold they carry the last member's timestamp.
    ///
    /// XOR cancels on repetition: every member must be folded exactly once.
    pub fn fold(&mut self, packet: &RtpPacket) -> Result<()> {
        xor_fold(&mut self.recovery, &mut self.payload, packet)?;
        self.timestamp = packet.timestamp;
        self.ssrc = packet.ssrc;
        Ok(())
    }

    /// Number of protected media packets.
    pub fn group_size(&self) -> usize {
        self.mask.count_ones() as usize
    }

    /// Protected media sequence numbers, in sequence order.
    pub fn protected_sequence_numbers(&self) -> Vec<u16> {
        (0..MAX_GROUP_SIZE)
            .filter(|i| self.mask & (1u64 << (MASK_TOP_BIT as usize - i)) != 0)
            .map(|i| self.sn_base.wrapping_add(i as u16))
            .collect()
    }

    /// `true` if `media_seq` is one of the protected sequence numbers.
    pub fn protects(&self, media_seq: u16) -> bool {
        let offset = seq::distance(self.sn_base, media_seq);
        (0..MAX_GROUP_SIZE as i16).contains(&offset)
            && self.mask & (1u64 << (MASK_TOP_BIT as i16 - offset)) != 0
    }

    pub fn recovery(&self) -> &Recovery {
        &self.recovery
    }

    /// XOR-folded payload; its length is the protection length.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn long_mask(&self) -> bool {
        self.mask & ((1u64 << (MAX_GROUP_SIZE - SHORT_MASK_BITS)) - 1) != 0
    }

    /// Serialize header and payload to wire bytes (finalizes a sender group).
    pub fn encode(&self) -> Vec<u8> {
        let long = self.long_mask();
        let ulp_len = if long { ULP_LONG_LEN } else { ULP_SHORT_LEN };
        let mut buf =
            Vec::with_capacity(RTP_HEADER_LEN + FEC_HEADER_LEN + ulp_len + self.payload.len());

        // Outer RTP header: V=2, no padding/extension/CSRC, M=0.
        buf.push(RTP_VERSION << 6);
        buf.push(self.payload_type & 0x7f);
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.ssrc.to_be_bytes());

        // FEC header. E = 0.
        let r = &self.recovery;
        buf.push(
            ((long as u8) << 6)
                | ((r.padding as u8) << 5)
                | ((r.extension as u8) << 4)
                | (r.csrc_count & 0x0f),
        );
        buf.push(((r.marker as u8) << 7) | (r.payload_type & 0x7f));
        buf.extend_from_slice(&self.sn_base.to_be_bytes());
        buf.extend_from_slice(&r.timestamp.to_be_bytes());
        buf.extend_from_slice(&r.length.to_be_bytes());

        // ULP level 0 header.
        buf.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        let mask = self.mask.to_be_bytes();
        if long {
            buf.extend_from_slice(&mask[2..8]);
        } else {
            buf.extend_from_slice(&mask[2..4]);
        }

        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse wire bytes received on the FEC stream.
    ///
    /// Fails with [`FecError::Malformed`] on a truncated header, an empty
    /// mask, or a payload shorter than the declared protection length.
    /// Truncation lengths count the outer header and body, not RTP padding.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let outer = RtpPacket::decode(buf)?;
        let body = &outer.payload;
        let header_offset = outer_header_len(buf, &outer);
        let unpadded = header_offset + body.len();

        if body.len() < FEC_HEADER_LEN + ULP_SHORT_LEN {
            return Err(FecError::truncated(
                header_offset + FEC_HEADER_LEN + ULP_SHORT_LEN,
                unpadded,
            ));
        }

        let long = body[0] & 0x40 != 0;
        let recovery = Recovery {
            padding: body[0] & 0x20 != 0,
            extension: body[0] & 0x10 != 0,
            csrc_count: body[0] & 0x0f,
            marker: body[1] & 0x80 != 0,
            payload_type: body[1] & 0x7f,
            timestamp: u32::from_be_bytes([body[4], body[5], body[6], body[7]]),
            length: u16::from_be_bytes([body[8], body[9]]),
        };
        let sn_base = u16::from_be_bytes([body[2], body[3]]);

        let ulp_len = if long { ULP_LONG_LEN } else { ULP_SHORT_LEN };
        if body.len() < FEC_HEADER_LEN + ulp_len {
            return Err(FecError::truncated(header_offset + FEC_HEADER_LEN + ulp_len, unpadded));
        }
        let ulp = &body[FEC_HEADER_LEN..FEC_HEADER_LEN + ulp_len];
        let protection_len = u16::from_be_bytes([ulp[0], ulp[1]]) as usize;

        let mut mask_bytes = [0u8; 8];
        mask_bytes[2..2 + ulp_len - 2].copy_from_slice(&ulp[2..]);
        let mask = u64::from_be_bytes(mask_bytes);
        if mask == 0 {
            return Err(FecError::malformed(MalformedKind::EmptyMask));
        }

        let data = &body[FEC_HEADER_LEN + ulp_len..];
        if data.len() < protection_len {
            return Err(FecError::truncated(
                header_offset + FEC_HEADER_LEN + ulp_len + protection_len,
                unpadded,
            ));
        }

        Ok(Self {
            sequence: outer.sequence,
            timestamp: outer.timestamp,
            ssrc: outer.ssrc,
            payload_type: outer.payload_type,
            sn_base,
            mask,
            recovery,
            payload: data[..protection_len].to_vec(),
        })
    }

    /// Rebuild the media packet `missing` from this FEC packet and the other
    /// members of its group.
    ///
    /// Every packet in `present` that this packet protects, other than
    /// `missing`, is XOR-folded out of the recovery state; what remains is
    /// the missing packet. The result is only correct when `missing` is the
    /// sole absent member: a second gap goes undetected here and yields a
    /// corrupt packet. [`FecReceiver::is_repairable`](super::FecReceiver::is_repairable)
    /// guards that precondition.
    pub fn reconstruct(&self, present: &HashMap<u16, RtpPacket>, missing: u16) -> Result<RtpPacket> {
        if !self.protects(missing) {
            return Err(FecError::NotRepairable(missing));
        }
        let mut recovery = self.recovery;
        let mut payload = self.payload.clone();

        for seq in self.protected_sequence_numbers() {
            if seq == missing {
                continue;
            }
            if let Some(packet) = present.get(&seq) {
                xor_fold(&mut recovery, &mut payload, packet)?;
            }
        }

        let len = recovery.length as usize;
        if len > payload.len() {
            return Err(FecError::malformed(MalformedKind::LengthRecovery));
        }

        let mut buf = Vec::with_capacity(RTP_HEADER_LEN + len);
        buf.push(
            (RTP_VERSION << 6)
                | ((recovery.padding as u8) << 5)
                | ((recovery.extension as u8) << 4)
                | (recovery.csrc_count & 0x0f),
        );
        buf.push(((recovery.marker as u8) << 7) | (recovery.payload_type & 0x7f));
        buf.extend_from_slice(&missing.to_be_bytes());
        buf.extend_from_slice(&recovery.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.ssrc.to_be_bytes());
        buf.extend_from_slice(&payload[..len]);

        tracing::trace!(
            seq = missing,
            fec_seq = self.sequence,
            len,
            "reconstructed media packet"
        );
        RtpPacket::decode(&buf)
    }
}

/// XOR one packet's bit string into the recovery fields and payload buffer.
fn xor_fold(recovery: &mut Recovery, payload: &mut Vec<u8>, packet: &RtpPacket) -> Result<()> {
    let body_len = packet.body_len();
    let length = u16::try_from(body_len).map_err(|_| FecError::PayloadTooLarge(body_len))?;

    recovery.csrc_count ^= packet.csrcs().len() as u8;
    recovery.marker ^= packet.marker;
    recovery.payload_type ^= packet.payload_type & 0x7f;
    recovery.timestamp ^= packet.timestamp;
    recovery.length ^= length;

    if payload.len() < body_len {
        payload.resize(body_len, 0);
    }
    let mut offset = 0;
    for csrc in packet.csrcs() {
        xor_bytes(&mut payload[offset..offset + 4], &csrc.to_be_bytes());
        offset += 4;
    }
    xor_bytes(&mut payload[offset..], &packet.payload);
    Ok(())
}

/// Length of the outer RTP header of an already decoded `buf`: fixed
/// header, CSRC list and header extension.
fn outer_header_len(buf: &[u8], outer: &RtpPacket) -> usize {
    let mut len = RTP_HEADER_LEN + outer.csrcs().len() * 4;
    if buf[0] & 0x10 != 0 {
        let words = u16::from_be_bytes([buf[len + 2], buf[len + 3]]) as usize;
        len += 4 + words * 4;
    }
    len
}

fn xor_bytes(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}
