//! Per-stream sender and receiver state.
//!
//! ## Sender lifecycle
//!
//! ```text
//! new              -> idle, encoder Empty
//! tick / packetize -> RTP packet out; FEC packet out every `group_size` frames
//! configure_fec_group_size -> applies at the next group boundary
//! teardown         -> open group discarded
//! ```
//!
//! ## Receiver lifecycle
//!
//! ```text
//! receive_media    -> jitter buffer (first packet sets the play cursor)
//! receive_fec      -> FEC group registered
//! next_frame       -> Received | Corrected | Lost, cursor + 1
//! teardown         -> buffers and groups cleared, counters kept
//! ```

pub mod receiver;
pub mod sender;

pub use receiver::{PlayoutFrame, ReceiverSession};
pub use sender::{Outgoing, SenderSession};
