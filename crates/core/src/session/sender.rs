use crate::config::FecConfig;
use crate::error::{FecError, Result};
use crate::fec::FecEncoder;
use crate::media::mjpeg::MjpegPacketizer;
use crate::media::{FrameSource, Packetizer};
use crate::transport::{Channel, PacketSink};

/// Wire bytes produced by one frame tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    /// The RTP media packet carrying the frame.
    pub media: Vec<u8>,
    /// The FEC packet, when this frame completed a group.
    pub fec: Option<Vec<u8>>,
}

/// Sending half of a stream: packetizer plus FEC grouping.
///
/// Driven by a frame timer, one [`tick`](Self::tick) per frame interval.
/// Ticks must not overlap; the session is owned by the timer task and is
/// not shared.
pub struct SenderSession {
    packetizer: Box<dyn Packetizer>,
    encoder: FecEncoder,
    frame_rate: u32,
    timestamp_increment: u32,
    frames_sent: u64,
}

impl SenderSession {
    /// MJPEG sender with a random SSRC.
    pub fn new(config: &FecConfig) -> Result<Self> {
        let packetizer = MjpegPacketizer::with_random_ssrc(config.media_payload_type);
        Self::with_packetizer(config, Box::new(packetizer))
    }

    /// Sender around a custom packetizer.
    pub fn with_packetizer(config: &FecConfig, packetizer: Box<dyn Packetizer>) -> Result<Self> {
        config.validate()?;
        let encoder = FecEncoder::new(config)?;
        let timestamp_increment = packetizer.clock_rate() / config.frame_rate;
        tracing::info!(
            ssrc = format_args!("{:#010X}", packetizer.ssrc()),
            codec = packetizer.codec_name(),
            pt = packetizer.payload_type(),
            group_size = config.group_size,
            frame_rate = config.frame_rate,
            "sender session created"
        );
        Ok(Self {
            packetizer,
            encoder,
            frame_rate: config.frame_rate,
            timestamp_increment,
            frames_sent: 0,
        })
    }

    /// Change the nominal frame rate; the RTP clock advances by
    /// `clock_rate / fps` per frame.
    pub fn set_frame_rate(&mut self, fps: u32) -> Result<()> {
        if fps == 0 {
            return Err(FecError::InvalidFrameRate(fps));
        }
        if fps != self.frame_rate {
            self.frame_rate = fps;
            self.timestamp_increment = self.packetizer.clock_rate() / fps;
            tracing::debug!(fps, increment = self.timestamp_increment, "frame rate changed");
        }
        Ok(())
    }

    /// Change the FEC group size, effective from the next group.
    ///
    /// Values outside `2..=max` are rejected and the current size is kept.
    pub fn configure_fec_group_size(&mut self, size: usize) -> Result<()> {
        self.encoder.set_group_size(size)
    }

    /// Packetize one frame and fold it into the current FEC group.
    pub fn packetize_frame(&mut self, frame: &[u8]) -> Result<Outgoing> {
        let packet = self.packetizer.packetize(frame, self.timestamp_increment)?;
        self.encoder.add(&packet)?;
        let media = packet.encode();
        let fec = self.encoder.take_packet();
        self.frames_sent += 1;
        Ok(Outgoing { media, fec })
    }

    /// One frame interval: pull a frame, send its RTP packet and, when a
    /// group completes, the FEC packet.
    ///
    /// Returns `false` once the source is exhausted.
    pub fn tick(&mut self, source: &mut dyn FrameSource, sink: &mut dyn PacketSink) -> Result<bool> {
        self.set_frame_rate(source.frame_rate())?;
        let Some(frame) = source.next_frame() else {
            tracing::debug!(frames_sent = self.frames_sent, "frame source exhausted");
            return Ok(false);
        };

        let out = self.packetize_frame(&frame)?;
        sink.send(Channel::Media, &out.media)?;
        if let Some(fec) = &out.fec {
            sink.send(Channel::Fec, fec)?;
        }
        Ok(true)
    }

    /// Abandon the open FEC group (RTSP TEARDOWN). Nothing is flushed.
    pub fn teardown(&mut self) {
        self.encoder.discard();
        tracing::info!(frames_sent = self.frames_sent, "sender session torn down");
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn ssrc(&self) -> u32 {
        self.packetizer.ssrc()
    }

    pub fn encoder(&self) -> &FecEncoder {
        &self.encoder
    }

    /// Sequence number of the next media packet.
    pub fn next_sequence(&self) -> u16 {
        self.packetizer.next_sequence()
    }

    /// Timestamp of the next media packet.
    pub fn next_rtp_timestamp(&self) -> u32 {
        self.packetizer.next_rtp_timestamp()
    }
}
