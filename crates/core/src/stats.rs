/// Receiver-side counters, as seen by the play-out loop.
///
/// Every counter only grows. Snapshots are handed out by
/// [`ReceiverSession::stats`](crate::session::ReceiverSession::stats); the
/// session is the only writer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Media packets received and stored in the jitter buffer.
    pub nr_received: u64,
    /// FEC packets received.
    pub nr_fec_received: u64,
    /// Media packets missing at play-out time.
    pub nr_lost: u64,
    /// Missing media packets rebuilt from FEC.
    pub nr_corrected: u64,
    /// Missing media packets FEC could not rebuild.
    pub nr_not_corrected: u64,
    /// Frames requested by the play-out loop.
    pub nr_frames_requested: u64,
    /// Requested frames that could not be delivered.
    pub nr_frames_lost: u64,
    /// Newest media sequence number received so far.
    pub last_received_seq: Option<u16>,
    /// Media sequence number the next play-out request will return.
    pub play_cursor: Option<u16>,
}

impl ReceiverStats {
    /// Fraction of played-out packets that were missing, in `0.0..=1.0`.
    pub fn loss_ratio(&self) -> f64 {
        ratio(self.nr_lost, self.nr_frames_requested)
    }

    /// Fraction of missing packets that FEC recovered, in `0.0..=1.0`.
    pub fn correction_ratio(&self) -> f64 {
        ratio(self.nr_corrected, self.nr_lost)
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_handle_zero() {
        let stats = ReceiverStats::default();
        assert_eq!(stats.loss_ratio(), 0.0);
        assert_eq!(stats.correction_ratio(), 0.0);
    }

    #[test]
    fn ratios() {
        let stats = ReceiverStats {
            nr_frames_requested: 10,
            nr_lost: 2,
            nr_corrected: 1,
            ..ReceiverStats::default()
        };
        assert_eq!(stats.loss_ratio(), 0.2);
        assert_eq!(stats.correction_ratio(), 0.5);
    }
}
