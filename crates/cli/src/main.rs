use std::process::ExitCode;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rtpfec::transport::{Channel, PacketSink};
use rtpfec::{FecConfig, FrameSource, PlayoutFrame, ReceiverSession, SenderSession};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "fec-sim",
    about = "Stream synthetic MJPEG frames over a lossy link and report FEC recovery"
)]
struct Args {
    /// Media packets protected by one FEC packet
    #[arg(long, short, default_value_t = 4)]
    group_size: usize,

    /// Probability that any single packet is dropped (0.0 - 1.0)
    #[arg(long, short, default_value_t = 0.05)]
    loss: f64,

    /// Number of frames to send
    #[arg(long, short, default_value_t = 500, value_parser = clap::value_parser!(u16).range(1..))]
    frames: u16,

    /// Nominal frame rate
    #[arg(long, default_value_t = 25)]
    fps: u32,

    /// Seed for frame contents and the loss pattern
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Disable FEC repair on the receiver
    #[arg(long)]
    no_fec: bool,

    /// Log every repair and loss
    #[arg(long, short)]
    verbose: bool,
}

/// JPEG-shaped frame `index` of the clip: SOI, seeded noise, EOI.
fn synthetic_frame(seed: u64, index: u16) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed ^ ((index as u64) << 32));
    let mut data = vec![0u8; rng.random_range(200..2000)];
    rng.fill(&mut data[..]);
    data[..2].copy_from_slice(&[0xFF, 0xD8]);
    let end = data.len() - 2;
    data[end..].copy_from_slice(&[0xFF, 0xD9]);
    data
}

struct SyntheticClip {
    seed: u64,
    next: u16,
    count: u16,
    fps: u32,
}

impl FrameSource for SyntheticClip {
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.next == self.count {
            return None;
        }
        let frame = synthetic_frame(self.seed, self.next);
        self.next += 1;
        Some(frame)
    }

    fn frame_rate(&self) -> u32 {
        self.fps
    }
}

/// Drops packets at random, hands the rest straight to the receiver.
struct LossyLink {
    receiver: ReceiverSession,
    rng: StdRng,
    loss: f64,
    dropped: [u64; 2],
}

impl PacketSink for LossyLink {
    fn send(&mut self, channel: Channel, packet: &[u8]) -> rtpfec::Result<()> {
        if self.rng.random::<f64>() < self.loss {
            self.dropped[channel as usize] += 1;
            tracing::debug!(?channel, "packet dropped on link");
            return Ok(());
        }
        match channel {
            Channel::Media => self.receiver.receive_media(packet)?,
            Channel::Fec => self.receiver.receive_fec(packet)?,
        };
        Ok(())
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config = FecConfig {
        group_size: args.group_size,
        frame_rate: args.fps,
        use_fec: !args.no_fec,
        ..FecConfig::default()
    };

    let mut sender = match SenderSession::new(&config) {
        Ok(sender) => sender,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let receiver = ReceiverSession::new(&config);
    let mut clip = SyntheticClip {
        seed: args.seed,
        next: 0,
        count: args.frames,
        fps: args.fps,
    };
    let mut link = LossyLink {
        receiver: receiver.clone(),
        rng: StdRng::seed_from_u64(args.seed.wrapping_add(1)),
        loss: args.loss.clamp(0.0, 1.0),
        dropped: [0; 2],
    };

    // Play-out trails the sender by two groups so FEC packets can arrive.
    let delay = 2 * args.group_size as u64;
    let mut corrupt = 0u64;
    let mut check = |frame: PlayoutFrame| {
        if let PlayoutFrame::Received(p) | PlayoutFrame::Corrected(p) = &frame {
            if p.payload != synthetic_frame(args.seed, p.sequence) {
                tracing::error!(seq = p.sequence, "played frame differs from original");
                corrupt += 1;
            }
        }
    };

    loop {
        match sender.tick(&mut clip, &mut link) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                eprintln!("Send failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
        if sender.frames_sent() > delay {
            if let Some(frame) = receiver.next_frame() {
                check(frame);
            }
        }
    }
    sender.teardown();

    while receiver
        .stats()
        .play_cursor
        .is_some_and(|cursor| cursor != args.frames)
    {
        if let Some(frame) = receiver.next_frame() {
            check(frame);
        }
    }

    let stats = receiver.stats();
    println!("frames sent        {}", sender.frames_sent());
    println!("media dropped      {}", link.dropped[Channel::Media as usize]);
    println!("fec dropped        {}", link.dropped[Channel::Fec as usize]);
    println!("frames played      {}", stats.nr_frames_requested);
    println!("lost at play-out   {}", stats.nr_lost);
    println!(
        "repaired           {} ({:.1}%)",
        stats.nr_corrected,
        stats.correction_ratio() * 100.0
    );
    println!("unrecoverable      {}", stats.nr_frames_lost);
    println!("corrupt            {}", corrupt);

    if corrupt > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
