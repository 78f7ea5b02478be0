pub mod config;
pub mod error;
pub mod fec;
pub mod media;
pub mod seq;
pub mod session;
pub mod stats;
pub mod transport;

pub use config::FecConfig;
pub use error::{FecError, Result};
pub use fec::{FecEncoder, FecPacket, FecReceiver};
pub use media::{FrameSource, Packetizer};
pub use session::{Outgoing, PlayoutFrame, ReceiverSession, SenderSession};
pub use stats::ReceiverStats;
