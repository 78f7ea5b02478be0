use crate::config::FecConfig;
use crate::error::{FecError, Result};
use crate::media::rtp::RtpPacket;

use super::FecPacket;

/// Where the encoder stands within the current group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    /// No group open; the next packet starts one.
    Empty,
    /// Some, but not all, members folded.
    Accumulating,
    /// `group_size` members folded; the FEC packet must be taken.
    Ready,
}

/// Sender-side FEC grouping.
///
/// ```text
/// Empty --add--> Accumulating --add (k-th)--> Ready --take_packet--> Empty
/// ```
///
/// Owned by exactly one sender session and driven once per frame tick, so
/// no locking is involved. A group size change requested mid-group is held
/// back until the open group has been emitted, so every emitted packet
/// protects exactly as many members as its mask declares.
#[derive(Debug)]
pub struct FecEncoder {
    config: FecConfig,
    pending_group_size: Option<usize>,
    fec_seq: u16,
    open: Option<FecPacket>,
    folded: usize,
}

impl FecEncoder {
    pub fn new(config: &FecConfig) -> Result<Self> {
        config.validate_group_size(config.group_size)?;
        Ok(Self {
            config: config.clone(),
            pending_group_size: None,
            fec_seq: 0,
            open: None,
            folded: 0,
        })
    }

    pub fn state(&self) -> EncoderState {
        match &self.open {
            None => EncoderState::Empty,
            Some(_) if self.folded == self.config.group_size => EncoderState::Ready,
            Some(_) => EncoderState::Accumulating,
        }
    }

    /// Group size of the open group, or of the next one when none is open.
    pub fn group_size(&self) -> usize {
        self.config.group_size
    }

    /// Sequence number the next emitted FEC packet will carry.
    pub fn next_sequence(&self) -> u16 {
        self.fec_seq
    }

    /// Change the group size.
    ///
    /// Out-of-range values are rejected and the current size is kept. A valid
    /// size takes effect immediately when no group is open, otherwise at the
    /// next group boundary.
    pub fn set_group_size(&mut self, size: usize) -> Result<()> {
        self.config.validate_group_size(size)?;
        if self.open.is_none() {
            self.config.group_size = size;
            self.pending_group_size = None;
        } else {
            self.pending_group_size = Some(size);
        }
        tracing::info!(size, deferred = self.open.is_some(), "FEC group size changed");
        Ok(())
    }

    /// Fold the next media packet into the open group, opening one if needed.
    ///
    /// Fails with [`FecError::GroupFull`] while a completed group has not been
    /// taken. A packet that does not continue the open group's run abandons
    /// that group and starts a new one.
    pub fn add(&mut self, packet: &RtpPacket) -> Result<()> {
        if self.state() == EncoderState::Ready {
            return Err(FecError::GroupFull(self.folded));
        }

        if let Some(open) = &self.open {
            let expected = open.sn_base.wrapping_add(self.folded as u16);
            if packet.sequence != expected {
                tracing::warn!(
                    expected,
                    actual = packet.sequence,
                    folded = self.folded,
                    "sequence gap, abandoning FEC group"
                );
                self.discard();
            }
        }

        if self.open.is_none() {
            if let Some(size) = self.pending_group_size.take() {
                self.config.group_size = size;
            }
            tracing::trace!(
                fec_seq = self.fec_seq,
                sn_base = packet.sequence,
                group_size = self.config.group_size,
                "FEC group opened"
            );
        }

        let (fec_seq, group_size, pt) = (
            self.fec_seq,
            self.config.group_size,
            self.config.fec_payload_type,
        );
        let open = self.open.get_or_insert_with(|| {
            FecPacket::new_group(fec_seq, packet.sequence, group_size).with_payload_type(pt)
        });
        open.fold(packet)?;
        self.folded += 1;
        Ok(())
    }

    /// `true` once every member of the open group has been folded.
    pub fn is_ready(&self) -> bool {
        self.state() == EncoderState::Ready
    }

    /// Finalize and return the FEC packet if the group is complete.
    ///
    /// Resets to [`EncoderState::Empty`] and advances the FEC sequence number.
    pub fn take_packet(&mut self) -> Option<Vec<u8>> {
        if !self.is_ready() {
            return None;
        }
        let fec = self.open.take()?;
        self.folded = 0;
        self.fec_seq = self.fec_seq.wrapping_add(1);

        tracing::debug!(
            fec_seq = fec.sequence,
            sn_base = fec.sn_base,
            group_size = fec.group_size(),
            "FEC packet emitted"
        );
        Some(fec.encode())
    }

    /// Drop the open group without emitting it (session teardown).
    pub fn discard(&mut self) {
        if self.open.take().is_some() {
            tracing::debug!(folded = self.folded, "FEC group discarded");
        }
        self.folded = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder(group_size: usize) -> FecEncoder {
        FecEncoder::new(&FecConfig {
            group_size,
            ..FecConfig::default()
        })
        .unwrap()
    }

    fn media(seq: u16) -> RtpPacket {
        RtpPacket::new(26, seq, seq as u32 * 3600, 7, vec![seq as u8; 4])
    }

    #[test]
    fn becomes_ready_after_group_size_packets() {
        let mut enc = encoder(3);
        assert_eq!(enc.state(), EncoderState::Empty);
        enc.add(&media(10)).unwrap();
        assert_eq!(enc.state(), EncoderState::Accumulating);
        assert!(enc.take_packet().is_none());
        enc.add(&media(11)).unwrap();
        enc.add(&media(12)).unwrap();
        assert_eq!(enc.state(), EncoderState::Ready);

        let bytes = enc.take_packet().unwrap();
        let fec = FecPacket::decode(&bytes).unwrap();
        assert_eq!(fec.sequence, 0);
        assert_eq!(fec.payload_type, 127);
        assert_eq!(fec.protected_sequence_numbers(), vec![10, 11, 12]);
        assert_eq!(fec.timestamp, 12 * 3600);
        assert_eq!(enc.state(), EncoderState::Empty);
        assert_eq!(enc.next_sequence(), 1);
    }

    #[test]
    fn fold_after_emit_starts_new_group() {
        let mut enc = encoder(2);
        enc.add(&media(0)).unwrap();
        enc.add(&media(1)).unwrap();
        enc.take_packet().unwrap();
        enc.add(&media(2)).unwrap();
        assert_eq!(enc.state(), EncoderState::Accumulating);
    }

    #[test]
    fn refuses_to_overfill_group() {
        let mut enc = encoder(2);
        enc.add(&media(0)).unwrap();
        enc.add(&media(1)).unwrap();
        assert!(matches!(enc.add(&media(2)), Err(FecError::GroupFull(2))));
        assert!(enc.is_ready());
    }

    #[test]
    fn group_size_change_waits_for_boundary() {
        let mut enc = encoder(2);
        enc.add(&media(0)).unwrap();
        enc.set_group_size(4).unwrap();
        assert_eq!(enc.group_size(), 2);
        enc.add(&media(1)).unwrap();
        let first = FecPacket::decode(&enc.take_packet().unwrap()).unwrap();
        assert_eq!(first.group_size(), 2);

        for seq in 2..6 {
            enc.add(&media(seq)).unwrap();
        }
        assert_eq!(enc.group_size(), 4);
        let second = FecPacket::decode(&enc.take_packet().unwrap()).unwrap();
        assert_eq!(second.protected_sequence_numbers(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn group_size_change_applies_immediately_when_empty() {
        let mut enc = encoder(2);
        enc.set_group_size(5).unwrap();
        assert_eq!(enc.group_size(), 5);
    }

    #[test]
    fn invalid_group_size_keeps_previous() {
        let mut enc = encoder(3);
        assert!(matches!(
            enc.set_group_size(1),
            Err(FecError::InvalidGroupSize { size: 1, .. })
        ));
        assert!(enc.set_group_size(49).is_err());
        assert_eq!(enc.group_size(), 3);
    }

    #[test]
    fn sequence_gap_restarts_group() {
        let mut enc = encoder(2);
        enc.add(&media(0)).unwrap();
        enc.add(&media(5)).unwrap();
        assert_eq!(enc.state(), EncoderState::Accumulating);
        enc.add(&media(6)).unwrap();
        let fec = FecPacket::decode(&enc.take_packet().unwrap()).unwrap();
        assert_eq!(fec.protected_sequence_numbers(), vec![5, 6]);
    }

    #[test]
    fn discard_abandons_partial_group() {
        let mut enc = encoder(4);
        enc.add(&media(0)).unwrap();
        enc.discard();
        assert_eq!(enc.state(), EncoderState::Empty);
        assert_eq!(enc.next_sequence(), 0);
    }

    #[test]
    fn group_wraps_sequence_space() {
        let mut enc = encoder(2);
        enc.add(&media(u16::MAX)).unwrap();
        enc.add(&media(0)).unwrap();
        let fec = FecPacket::decode(&enc.take_packet().unwrap()).unwrap();
        assert_eq!(fec.protected_sequence_numbers(), vec![u16::MAX, 0]);
    }
}
