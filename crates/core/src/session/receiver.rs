use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::FecConfig;
use crate::error::Result;
use crate::fec::{FecPacket, FecReceiver};
use crate::media::rtp::RtpPacket;
use crate::seq;
use crate::stats::ReceiverStats;

/// Outcome of one play-out request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayoutFrame {
    /// The packet arrived.
    Received(RtpPacket),
    /// The packet was lost and rebuilt from FEC.
    Corrected(RtpPacket),
    /// The packet was lost for good. `concealment` repeats the last good
    /// payload, if any frame has been played yet.
    Lost { seq: u16, concealment: Option<Vec<u8>> },
}

impl PlayoutFrame {
    pub fn seq(&self) -> u16 {
        match self {
            Self::Received(p) | Self::Corrected(p) => p.sequence,
            Self::Lost { seq, .. } => *seq,
        }
    }

    /// Payload to display: the frame itself or its concealment.
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Self::Received(p) | Self::Corrected(p) => Some(&p.payload),
            Self::Lost { concealment, .. } => concealment.as_deref(),
        }
    }
}

/// Receiving half of a stream: jitter buffer, FEC bookkeeping, play cursor
/// and statistics.
///
/// Cheap to clone; clones share state. Packet arrival and play-out may run
/// on different threads: all state sits behind one mutex, so a repair never
/// observes a half-registered FEC group.
#[derive(Clone)]
pub struct ReceiverSession {
    inner: Arc<Mutex<ReceiverState>>,
}

struct ReceiverState {
    fec: FecReceiver,
    media: HashMap<u16, RtpPacket>,
    stats: ReceiverStats,
    play_cursor: Option<u16>,
    last_received: Option<u16>,
    last_payload: Option<Vec<u8>>,
    use_fec: bool,
    /// Packets further than this behind the play cursor are dropped.
    retention: u16,
}

impl ReceiverSession {
    pub fn new(config: &FecConfig) -> Self {
        let retention = config.window_packets() as u16;
        tracing::debug!(use_fec = config.use_fec, retention, "receiver session created");
        Self {
            inner: Arc::new(Mutex::new(ReceiverState {
                fec: FecReceiver::new(config.window_packets()),
                media: HashMap::new(),
                stats: ReceiverStats::default(),
                play_cursor: None,
                last_received: None,
                last_payload: None,
                use_fec: config.use_fec,
                retention,
            })),
        }
    }

    /// Store an incoming media packet in the jitter buffer.
    ///
    /// The first packet ever received sets the play cursor. Malformed bytes
    /// are rejected and counted nowhere. Returns the sequence number.
    pub fn receive_media(&self, bytes: &[u8]) -> Result<u16> {
        let packet = RtpPacket::decode(bytes).inspect_err(|e| {
            tracing::warn!(error = %e, len = bytes.len(), "dropping malformed media packet");
        })?;
        let seq = packet.sequence;

        let mut state = self.inner.lock();
        state.stats.nr_received += 1;
        if state.play_cursor.is_none() {
            tracing::debug!(seq, "play cursor initialized");
            state.play_cursor = Some(seq);
        }
        if state.last_received.is_none_or(|last| seq::is_newer(seq, last)) {
            state.last_received = Some(seq);
        }
        tracing::trace!(seq, len = bytes.len(), "media packet received");
        state.media.insert(seq, packet);
        Ok(seq)
    }

    /// Register an incoming FEC packet.
    ///
    /// Malformed bytes are rejected and leave the bookkeeping untouched.
    /// Returns the FEC sequence number.
    pub fn receive_fec(&self, bytes: &[u8]) -> Result<u16> {
        let fec = FecPacket::decode(bytes).inspect_err(|e| {
            tracing::warn!(error = %e, len = bytes.len(), "dropping malformed FEC packet");
        })?;
        let fec_seq = fec.sequence;

        let mut state = self.inner.lock();
        state.stats.nr_fec_received += 1;
        if state.use_fec {
            state.fec.insert(fec);
        }
        Ok(fec_seq)
    }

    /// Play out the packet at the cursor and advance it.
    ///
    /// A missing packet is repaired from FEC when its group allows it,
    /// otherwise reported as lost. Returns `None` until the first media
    /// packet has arrived.
    pub fn next_frame(&self) -> Option<PlayoutFrame> {
        let mut state = self.inner.lock();
        let seq = state.play_cursor?;
        state.play_cursor = Some(seq.wrapping_add(1));
        state.stats.nr_frames_requested += 1;

        let frame = match state.media.get(&seq).cloned() {
            Some(packet) => PlayoutFrame::Received(packet),
            None => state.recover(seq),
        };

        if let PlayoutFrame::Received(p) | PlayoutFrame::Corrected(p) = &frame {
            state.last_payload = Some(p.payload.clone());
        }
        state.resolve(seq);
        Some(frame)
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> ReceiverStats {
        let state = self.inner.lock();
        ReceiverStats {
            last_received_seq: state.last_received,
            play_cursor: state.play_cursor,
            ..state.stats
        }
    }

    /// Number of media packets held in the jitter buffer.
    pub fn buffered(&self) -> usize {
        self.inner.lock().media.len()
    }

    /// Number of FEC groups held.
    pub fn fec_groups(&self) -> usize {
        self.inner.lock().fec.len()
    }

    /// Discard every buffered packet and all FEC bookkeeping (RTSP TEARDOWN).
    ///
    /// Counters survive; the next media packet re-initializes the cursor.
    pub fn teardown(&self) {
        let mut state = self.inner.lock();
        state.fec.clear();
        state.media.clear();
        state.play_cursor = None;
        state.last_received = None;
        state.last_payload = None;
        tracing::info!(stats = ?state.stats, "receiver session torn down");
    }
}

impl ReceiverState {
    fn recover(&mut self, seq: u16) -> PlayoutFrame {
        self.stats.nr_lost += 1;

        if self.use_fec && self.fec.is_repairable(seq, &self.media) {
            match self.fec.repair(seq, &self.media) {
                Ok(packet) => {
                    self.stats.nr_corrected += 1;
                    return PlayoutFrame::Corrected(packet);
                }
                Err(e) => tracing::warn!(seq, error = %e, "FEC repair failed"),
            }
        }

        self.stats.nr_not_corrected += 1;
        self.stats.nr_frames_lost += 1;
        tracing::debug!(seq, "media packet lost");
        PlayoutFrame::Lost {
            seq,
            concealment: self.last_payload.clone(),
        }
    }

    /// Retire `seq`: release groups whose members are all resolved and drop
    /// packets that fell out of the retention window.
    fn resolve(&mut self, seq: u16) {
        for released in self.fec.forget(seq) {
            self.media.remove(&released);
        }
        if let Some(cursor) = self.play_cursor {
            let retention = self.retention as i16;
            self.media
                .retain(|&s, _| seq::distance(s, cursor) <= retention);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(seq: u16) -> RtpPacket {
        RtpPacket::new(26, seq, seq as u32 * 3600, 9, vec![seq as u8, 0xaa, 0x55]).with_marker(true)
    }

    fn fec_for(fec_seq: u16, base: u16, size: usize) -> Vec<u8> {
        let mut fec = FecPacket::new_group(fec_seq, base, size);
        for i in 0..size {
            fec.fold(&media(base + i as u16)).unwrap();
        }
        fec.encode()
    }

    #[test]
    fn nothing_to_play_before_first_packet() {
        let rx = ReceiverSession::new(&FecConfig::default());
        assert!(rx.next_frame().is_none());
        assert_eq!(rx.stats().nr_frames_requested, 0);
    }

    #[test]
    fn first_packet_sets_cursor() {
        let rx = ReceiverSession::new(&FecConfig::default());
        rx.receive_media(&media(500).encode()).unwrap();
        assert_eq!(rx.stats().play_cursor, Some(500));
        assert_eq!(rx.next_frame(), Some(PlayoutFrame::Received(media(500))));
        assert_eq!(rx.stats().play_cursor, Some(501));
    }

    #[test]
    fn last_received_is_wrap_aware() {
        let rx = ReceiverSession::new(&FecConfig::default());
        rx.receive_media(&media(65535).encode()).unwrap();
        rx.receive_media(&media(0).encode()).unwrap();
        rx.receive_media(&media(65534).encode()).unwrap();
        assert_eq!(rx.stats().last_received_seq, Some(0));
    }

    #[test]
    fn malformed_input_is_rejected() {
        let rx = ReceiverSession::new(&FecConfig::default());
        assert!(rx.receive_media(&[0x80, 0x1a]).is_err());
        assert!(rx.receive_fec(&[0x80; 13]).is_err());
        assert_eq!(rx.stats(), ReceiverStats::default());
        assert_eq!(rx.fec_groups(), 0);
    }

    #[test]
    fn lost_frame_is_concealed_with_last_payload() {
        let rx = ReceiverSession::new(&FecConfig::default());
        rx.receive_media(&media(10).encode()).unwrap();
        rx.receive_media(&media(12).encode()).unwrap();

        rx.next_frame();
        let frame = rx.next_frame().unwrap();
        assert_eq!(frame.seq(), 11);
        assert_eq!(frame.payload(), Some(&media(10).payload[..]));

        let stats = rx.stats();
        assert_eq!(stats.nr_lost, 1);
        assert_eq!(stats.nr_not_corrected, 1);
        assert_eq!(stats.nr_frames_lost, 1);
    }

    #[test]
    fn repaired_frame_counts_as_corrected() {
        let rx = ReceiverSession::new(&FecConfig::default());
        rx.receive_media(&media(20).encode()).unwrap();
        rx.receive_fec(&fec_for(3, 20, 2)).unwrap();

        rx.next_frame();
        assert_eq!(rx.next_frame(), Some(PlayoutFrame::Corrected(media(21))));
        let stats = rx.stats();
        assert_eq!((stats.nr_lost, stats.nr_corrected, stats.nr_frames_lost), (1, 1, 0));
    }

    #[test]
    fn loss_in_oldest_group_repaired_when_playout_trails() {
        let rx = ReceiverSession::new(&FecConfig::default());
        for seq in (0..40).filter(|&s| s != 1) {
            rx.receive_media(&media(seq).encode()).unwrap();
        }
        for i in 0..20 {
            rx.receive_fec(&fec_for(i, i * 2, 2)).unwrap();
        }
        assert_eq!(rx.fec_groups(), 20);

        assert_eq!(rx.next_frame(), Some(PlayoutFrame::Received(media(0))));
        assert_eq!(rx.next_frame(), Some(PlayoutFrame::Corrected(media(1))));
        assert_eq!(rx.stats().nr_frames_lost, 0);
    }

    #[test]
    fn repair_disabled_without_fec() {
        let config = FecConfig {
            use_fec: false,
            ..FecConfig::default()
        };
        let rx = ReceiverSession::new(&config);
        rx.receive_media(&media(20).encode()).unwrap();
        rx.receive_fec(&fec_for(3, 20, 2)).unwrap();

        rx.next_frame();
        assert!(matches!(rx.next_frame(), Some(PlayoutFrame::Lost { seq: 21, .. })));
        assert_eq!(rx.stats().nr_fec_received, 1);
    }

    #[test]
    fn resolved_group_releases_buffer() {
        let rx = ReceiverSession::new(&FecConfig::default());
        for s in 0..4 {
            rx.receive_media(&media(s).encode()).unwrap();
        }
        rx.receive_fec(&fec_for(0, 0, 2)).unwrap();
        rx.receive_fec(&fec_for(1, 2, 2)).unwrap();

        rx.next_frame();
        assert_eq!(rx.buffered(), 4);
        rx.next_frame();
        assert_eq!(rx.buffered(), 2);
        assert_eq!(rx.fec_groups(), 1);
    }

    #[test]
    fn teardown_keeps_counters() {
        let rx = ReceiverSession::new(&FecConfig::default());
        rx.receive_media(&media(1).encode()).unwrap();
        rx.receive_fec(&fec_for(0, 1, 2)).unwrap();
        rx.teardown();

        assert_eq!(rx.buffered(), 0);
        assert_eq!(rx.fec_groups(), 0);
        assert!(rx.next_frame().is_none());
        assert_eq!(rx.stats().nr_received, 1);
    }

    #[test]
    fn shared_between_threads() {
        let rx = ReceiverSession::new(&FecConfig::default());
        let arrival = rx.clone();
        let handle = std::thread::spawn(move || {
            for s in 0..8 {
                arrival.receive_media(&media(s).encode()).unwrap();
            }
        });
        handle.join().unwrap();
        assert_eq!(rx.stats().nr_received, 8);
    }
}
