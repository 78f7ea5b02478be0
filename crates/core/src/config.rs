use crate::error::{FecError, Result};
use crate::fec::{DEFAULT_FEC_PAYLOAD_TYPE, MAX_GROUP_SIZE, MIN_GROUP_SIZE};
use crate::media::mjpeg::MJPEG_PAYLOAD_TYPE;

/// Default nominal frame rate when the source carries no metadata (40 ms per frame).
pub const DEFAULT_FRAME_RATE: u32 = 25;

/// Engine configuration shared by the sender and receiver sessions.
#[derive(Debug, Clone)]
pub struct FecConfig {
    /// Number of media packets protected by one FEC packet.
    pub group_size: usize,
    /// Upper bound for [`group_size`](Self::group_size); at most
    /// [`MAX_GROUP_SIZE`], the width of the long ULP mask.
    pub max_group_size: usize,
    /// RTP payload type stamped on FEC packets.
    pub fec_payload_type: u8,
    /// RTP payload type of the protected media stream.
    pub media_payload_type: u8,
    /// Nominal frame rate used to advance the RTP clock.
    pub frame_rate: u32,
    /// Receiver retention in groups of `max_group_size` media packets; see
    /// [`window_packets`](Self::window_packets).
    pub window_groups: usize,
    /// Receiver side: repair losses from FEC packets.
    pub use_fec: bool,
}

impl Default for FecConfig {
    fn default() -> Self {
        Self {
            group_size: MIN_GROUP_SIZE,
            max_group_size: MAX_GROUP_SIZE,
            fec_payload_type: DEFAULT_FEC_PAYLOAD_TYPE,
            media_payload_type: MJPEG_PAYLOAD_TYPE,
            frame_rate: DEFAULT_FRAME_RATE,
            window_groups: 16,
            use_fec: true,
        }
    }
}

impl FecConfig {
    /// Check that `size` is an acceptable group size under this configuration.
    pub fn validate_group_size(&self, size: usize) -> Result<()> {
        let max = self.max_group_size.min(MAX_GROUP_SIZE);
        if !(MIN_GROUP_SIZE..=max).contains(&size) {
            return Err(FecError::InvalidGroupSize { size, max });
        }
        Ok(())
    }

    /// Media sequence span the receiver keeps buffered packets and FEC
    /// groups for, clamped to `1..=32767`.
    pub fn window_packets(&self) -> usize {
        (self.max_group_size.min(MAX_GROUP_SIZE) * self.window_groups).clamp(1, i16::MAX as usize)
    }

    /// Check every field; used when a session is created.
    pub fn validate(&self) -> Result<()> {
        self.validate_group_size(self.group_size)?;
        if self.frame_rate == 0 {
            return Err(FecError::InvalidFrameRate(0));
        }
        Ok(())
    }
}
