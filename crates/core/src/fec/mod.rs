//! XOR parity forward error correction for RTP (RFC 5109).
//!
//! The sender groups `k` consecutive media packets and transmits one extra
//! RTP packet carrying the bitwise XOR of the whole group. Because XOR is
//! its own inverse, the receiver can rebuild any *single* missing member by
//! XOR-ing the parity with the `k - 1` members that did arrive.
//!
//! ```text
//!  media:  100   101   102   103          FEC 25 = 100 ^ 101 ^ 102 ^ 103
//!                 X (lost)
//!  repair: 101 = FEC 25 ^ 100 ^ 102 ^ 103
//! ```
//!
//! Only the flat scheme is implemented: one protection level, one parity
//! packet per group, groups of 2 to 48 contiguous sequence numbers.
//!
//! - [`packet`]: the FEC packet codec and the fold/reconstruct math.
//! - [`sender`]: the group accumulator driven once per frame.
//! - [`receiver`]: bookkeeping of received FEC packets and repairability.

pub mod packet;
pub mod receiver;
pub mod sender;

pub use packet::FecPacket;
pub use receiver::FecReceiver;
pub use sender::{EncoderState, FecEncoder};

/// RTP payload type used for FEC packets.
pub const DEFAULT_FEC_PAYLOAD_TYPE: u8 = 127;

/// Smallest useful group: one parity packet per two media packets.
pub const MIN_GROUP_SIZE: usize = 2;

/// Largest group the 48-bit ULP mask can describe.
pub const MAX_GROUP_SIZE: usize = 48;
