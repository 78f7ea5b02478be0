use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{FecError, Result};
use crate::media::rtp::RtpPacket;
use crate::seq;

use super::FecPacket;

/// Receiver-side FEC bookkeeping.
///
/// Three maps describe every known group and always change together:
///
/// - `fec_by_seq`: FEC sequence number → FEC packet.
/// - `group_of_media`: protected media sequence number → FEC sequence number.
/// - `members_of_media`: protected media sequence number → the whole ordered
///   member list of its group (shared between the members).
///
/// Groups leave the maps in one piece, either once every member has been
/// resolved through [`forget`](Self::forget) or once their last member falls
/// `window` media packets or more behind the newest protected sequence
/// number. The window is counted in media packets, like the receiver's media
/// retention, so a group stays while its members can still be played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FecReceiver {
    fec_by_seq: HashMap<u16, FecPacket>,
    group_of_media: HashMap<u16, u16>,
    members_of_media: HashMap<u16, Arc<[u16]>>,
    resolved: HashMap<u16, HashSet<u16>>,
    window: u16,
    newest: Option<u16>,
}

impl FecReceiver {
    /// `window` is the media sequence span kept, clamped to `1..=32767`.
    pub fn new(window: usize) -> Self {
        Self {
            fec_by_seq: HashMap::new(),
            group_of_media: HashMap::new(),
            members_of_media: HashMap::new(),
            resolved: HashMap::new(),
            window: window.clamp(1, i16::MAX as usize) as u16,
            newest: None,
        }
    }

    /// Decode a FEC packet from the wire and register it.
    ///
    /// Malformed bytes are rejected without touching the bookkeeping.
    /// Returns the FEC sequence number.
    pub fn observe(&mut self, bytes: &[u8]) -> Result<u16> {
        let fec = FecPacket::decode(bytes)?;
        let fec_seq = fec.sequence;
        self.insert(fec);
        Ok(fec_seq)
    }

    /// Register a decoded FEC packet.
    ///
    /// Registering the same packet twice is a no-op. A different packet under
    /// an already known FEC sequence number, or one covering media sequence
    /// numbers already claimed by another group, replaces the stale group.
    pub fn insert(&mut self, fec: FecPacket) {
        let fec_seq = fec.sequence;
        match self.fec_by_seq.get(&fec_seq) {
            Some(known) if *known == fec => return,
            Some(_) => {
                tracing::debug!(fec_seq, "replacing stale FEC group");
                self.evict(fec_seq);
            }
            None => {}
        }

        let members: Arc<[u16]> = fec.protected_sequence_numbers().into();
        for media_seq in members.iter() {
            if let Some(&other) = self.group_of_media.get(media_seq) {
                tracing::debug!(fec_seq, other, media_seq, "overlapping FEC group evicted");
                self.evict(other);
            }
        }

        for &media_seq in members.iter() {
            self.group_of_media.insert(media_seq, fec_seq);
            self.members_of_media.insert(media_seq, members.clone());
        }
        tracing::trace!(fec_seq, sn_base = fec.sn_base, group_size = members.len(), "FEC group registered");
        self.fec_by_seq.insert(fec_seq, fec);

        if let Some(&last) = members.last() {
            if self.newest.is_none_or(|newest| seq::is_newer(last, newest)) {
                self.newest = Some(last);
            }
        }
        self.evict_outdated();
    }

    /// FEC packet protecting `media_seq`, if known.
    pub fn fec_for(&self, media_seq: u16) -> Option<&FecPacket> {
        self.group_of_media
            .get(&media_seq)
            .and_then(|fec_seq| self.fec_by_seq.get(fec_seq))
    }

    /// Ordered member list of the group containing `media_seq`.
    pub fn group_of(&self, media_seq: u16) -> Option<&[u16]> {
        self.members_of_media.get(&media_seq).map(|m| &m[..])
    }

    /// Whether `missing` can be rebuilt from what is held.
    ///
    /// True only if a FEC packet covering `missing` is known, the group has
    /// at least one other member, and every other member is in `available`.
    pub fn is_repairable(&self, missing: u16, available: &HashMap<u16, RtpPacket>) -> bool {
        if self.fec_for(missing).is_none() {
            return false;
        }
        let Some(members) = self.members_of_media.get(&missing) else {
            return false;
        };

        let mut rest = members.iter().filter(|&&s| s != missing).peekable();
        if rest.peek().is_none() {
            return false;
        }
        rest.all(|s| available.contains_key(s))
    }

    /// Rebuild `missing` from its FEC packet and the other group members.
    ///
    /// Fails with [`FecError::NotRepairable`] unless
    /// [`is_repairable`](Self::is_repairable) holds for the same arguments.
    pub fn repair(&self, missing: u16, available: &HashMap<u16, RtpPacket>) -> Result<RtpPacket> {
        if !self.is_repairable(missing, available) {
            tracing::error!(seq = missing, "repair attempted on unrepairable packet");
            return Err(FecError::NotRepairable(missing));
        }
        let fec = self.fec_for(missing).ok_or(FecError::NotRepairable(missing))?;
        let packet = fec.reconstruct(available, missing)?;
        tracing::debug!(seq = missing, fec_seq = fec.sequence, "media packet repaired");
        Ok(packet)
    }

    /// Mark `media_seq` as permanently resolved (played or given up on).
    ///
    /// Once every member of its group is resolved the group is evicted and
    /// its member list returned, so the caller can release the buffered media
    /// packets. Other groups are left untouched.
    pub fn forget(&mut self, media_seq: u16) -> Vec<u16> {
        let Some(&fec_seq) = self.group_of_media.get(&media_seq) else {
            return Vec::new();
        };
        let group_size = self
            .members_of_media
            .get(&media_seq)
            .map_or(0, |m| m.len());

        let resolved = self.resolved.entry(fec_seq).or_default();
        resolved.insert(media_seq);
        if resolved.len() < group_size {
            return Vec::new();
        }

        tracing::trace!(fec_seq, "FEC group fully resolved");
        self.evict(fec_seq)
    }

    /// Number of FEC groups currently held.
    pub fn len(&self) -> usize {
        self.fec_by_seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fec_by_seq.is_empty()
    }

    /// Drop all bookkeeping (session teardown).
    pub fn clear(&mut self) {
        self.fec_by_seq.clear();
        self.group_of_media.clear();
        self.members_of_media.clear();
        self.resolved.clear();
        self.newest = None;
    }

    /// Evict groups whose last member is `window` or more packets behind the
    /// newest protected media sequence number, oldest first.
    fn evict_outdated(&mut self) {
        let Some(newest) = self.newest else {
            return;
        };
        while let Some((fec_seq, last)) = self.oldest_group() {
            if seq::distance(last, newest) < self.window as i16 {
                break;
            }
            tracing::debug!(fec_seq, last, newest, "FEC group fell out of window");
            self.evict(fec_seq);
        }
    }

    /// FEC sequence number and last protected media sequence number of the
    /// group with the oldest base.
    fn oldest_group(&self) -> Option<(u16, u16)> {
        self.fec_by_seq
            .values()
            .min_by(|a, b| seq::compare(a.sn_base, b.sn_base))
            .map(|fec| {
                let last = fec.sn_base.wrapping_add(fec.group_size() as u16 - 1);
                (fec.sequence, last)
            })
    }

    /// Remove one group from all maps; returns its members.
    fn evict(&mut self, fec_seq: u16) -> Vec<u16> {
        self.resolved.remove(&fec_seq);
        let Some(fec) = self.fec_by_seq.remove(&fec_seq) else {
            return Vec::new();
        };
        let members = fec.protected_sequence_numbers();
        for media_seq in &members {
            if self.group_of_media.get(media_seq) == Some(&fec_seq) {
                self.group_of_media.remove(media_seq);
                self.members_of_media.remove(media_seq);
            }
        }
        members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(seq: u16) -> RtpPacket {
        RtpPacket::new(26, seq, seq as u32 * 3600, 0x1234, format!("frame-{seq}").into_bytes())
            .with_marker(true)
    }

    fn fec_bytes(fec_seq: u16, base: u16, size: usize) -> Vec<u8> {
        let mut fec = FecPacket::new_group(fec_seq, base, size);
        for i in 0..size {
            fec.fold(&media(base.wrapping_add(i as u16))).unwrap();
        }
        fec.encode()
    }

    fn held(seqs: &[u16]) -> HashMap<u16, RtpPacket> {
        seqs.iter().map(|&s| (s, media(s))).collect()
    }

    #[test]
    fn observe_builds_all_maps() {
        let mut rx = FecReceiver::new(16);
        assert_eq!(rx.observe(&fec_bytes(25, 100, 4)).unwrap(), 25);
        for s in 100..104 {
            assert_eq!(rx.fec_for(s).map(|f| f.sequence), Some(25));
            assert_eq!(rx.group_of(s), Some(&[100, 101, 102, 103][..]));
        }
        assert!(rx.fec_for(104).is_none());
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn observe_is_idempotent() {
        let bytes = fec_bytes(25, 100, 4);
        let mut rx = FecReceiver::new(16);
        rx.observe(&bytes).unwrap();
        rx.forget(100);
        let before = rx.clone();
        rx.observe(&bytes).unwrap();
        assert_eq!(rx, before);
    }

    #[test]
    fn malformed_bytes_leave_maps_untouched() {
        let mut rx = FecReceiver::new(16);
        let bytes = fec_bytes(25, 100, 4);
        assert!(rx.observe(&bytes[..15]).is_err());
        assert!(rx.is_empty());
    }

    #[test]
    fn single_loss_is_repairable() {
        let mut rx = FecReceiver::new(16);
        rx.observe(&fec_bytes(25, 100, 4)).unwrap();
        let available = held(&[100, 102, 103]);

        assert!(rx.is_repairable(101, &available));
        let repaired = rx.repair(101, &available).unwrap();
        assert_eq!(repaired, media(101));
    }

    #[test]
    fn double_loss_is_not_repairable() {
        let mut rx = FecReceiver::new(16);
        rx.observe(&fec_bytes(25, 100, 4)).unwrap();
        let available = held(&[100, 103]);

        assert!(!rx.is_repairable(101, &available));
        assert!(!rx.is_repairable(102, &available));
        assert!(matches!(
            rx.repair(101, &available),
            Err(FecError::NotRepairable(101))
        ));
    }

    #[test]
    fn missing_fec_is_not_repairable() {
        let rx = FecReceiver::new(16);
        assert!(!rx.is_repairable(101, &held(&[100, 102, 103])));
    }

    #[test]
    fn single_member_group_is_not_repairable() {
        let mut rx = FecReceiver::new(16);
        rx.observe(&fec_bytes(1, 50, 1)).unwrap();
        assert!(!rx.is_repairable(50, &HashMap::new()));
    }

    #[test]
    fn forget_evicts_only_fully_resolved_group() {
        let mut rx = FecReceiver::new(16);
        rx.observe(&fec_bytes(1, 0, 2)).unwrap();
        rx.observe(&fec_bytes(2, 2, 2)).unwrap();

        assert!(rx.forget(0).is_empty());
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.forget(1), vec![0, 1]);
        assert_eq!(rx.len(), 1);
        assert!(rx.fec_for(0).is_none());
        assert!(rx.group_of(1).is_none());
        assert_eq!(rx.fec_for(2).map(|f| f.sequence), Some(2));
    }

    #[test]
    fn forget_unknown_sequence_is_noop() {
        let mut rx = FecReceiver::new(16);
        rx.observe(&fec_bytes(1, 0, 2)).unwrap();
        assert!(rx.forget(77).is_empty());
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn window_evicts_oldest_group() {
        let mut rx = FecReceiver::new(4);
        rx.observe(&fec_bytes(1, 0, 2)).unwrap();
        rx.observe(&fec_bytes(2, 2, 2)).unwrap();
        rx.observe(&fec_bytes(3, 4, 2)).unwrap();
        assert_eq!(rx.len(), 2);
        assert!(rx.fec_for(0).is_none());
        assert!(rx.fec_for(2).is_some());
        assert!(rx.fec_for(4).is_some());
    }

    #[test]
    fn window_eviction_is_wrap_aware() {
        let mut rx = FecReceiver::new(4);
        rx.observe(&fec_bytes(u16::MAX, 65534, 2)).unwrap();
        rx.observe(&fec_bytes(0, 0, 2)).unwrap();
        rx.observe(&fec_bytes(1, 2, 2)).unwrap();
        assert!(rx.fec_for(65534).is_none());
        assert_eq!(rx.fec_for(0).map(|f| f.sequence), Some(0));
        assert_eq!(rx.fec_for(3).map(|f| f.sequence), Some(1));
    }

    #[test]
    fn window_is_measured_in_packets() {
        let mut rx = FecReceiver::new(40);
        for i in 0..20u16 {
            rx.observe(&fec_bytes(i, i * 2, 2)).unwrap();
        }
        assert_eq!(rx.len(), 20);
        assert!(rx.is_repairable(1, &held(&[0])));

        rx.observe(&fec_bytes(20, 40, 2)).unwrap();
        assert_eq!(rx.len(), 20);
        assert!(rx.fec_for(1).is_none());
        assert!(rx.fec_for(2).is_some());
    }

    #[test]
    fn late_group_does_not_move_window_back() {
        let mut rx = FecReceiver::new(8);
        rx.observe(&fec_bytes(5, 10, 2)).unwrap();
        rx.observe(&fec_bytes(4, 8, 2)).unwrap();
        rx.observe(&fec_bytes(1, 0, 2)).unwrap();
        assert!(rx.fec_for(8).is_some());
        assert!(rx.fec_for(0).is_none());
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn overlapping_group_replaces_stale_one() {
        let mut rx = FecReceiver::new(16);
        rx.observe(&fec_bytes(1, 100, 4)).unwrap();
        rx.observe(&fec_bytes(9, 102, 2)).unwrap();
        assert_eq!(rx.len(), 1);
        assert!(rx.fec_for(100).is_none());
        assert_eq!(rx.group_of(103), Some(&[102, 103][..]));
    }

    #[test]
    fn clear_drops_everything() {
        let mut rx = FecReceiver::new(16);
        rx.observe(&fec_bytes(1, 0, 2)).unwrap();
        rx.clear();
        assert!(rx.is_empty());
        assert!(rx.fec_for(0).is_none());
    }
}
