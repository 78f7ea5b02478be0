//! Error types for the RTP/FEC engine.

use std::fmt;

/// Errors that can occur in the RTP/FEC engine.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Codec**: [`Malformed`](Self::Malformed) when a received buffer could
///   not be decoded; [`PayloadTooLarge`](Self::PayloadTooLarge) when a frame
///   does not fit a single datagram; [`TooManyCsrcs`](Self::TooManyCsrcs)
///   when a packet is built with more CSRCs than the header can count.
/// - **Configuration**: [`InvalidGroupSize`](Self::InvalidGroupSize),
///   [`InvalidFrameRate`](Self::InvalidFrameRate).
/// - **FEC grouping**: [`GroupFull`](Self::GroupFull).
/// - **Repair**: [`NotRepairable`](Self::NotRepairable).
/// - **Transport**: [`Io`](Self::Io), raised by [`PacketSink`](crate::transport::PacketSink)
///   implementations.
///
/// An unrepairable loss during play-out is not an error: it is counted in
/// [`ReceiverStats`](crate::stats::ReceiverStats).
#[derive(Debug, thiserror::Error)]
pub enum FecError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Buffer too short or internally inconsistent.
    #[error("malformed packet: {kind}")]
    Malformed { kind: MalformedKind },

    /// FEC group size outside `[2, max]`.
    #[error("invalid FEC group size {size} (allowed 2..={max})")]
    InvalidGroupSize { size: usize, max: usize },

    /// Nominal frame rate of zero.
    #[error("invalid frame rate: {0}")]
    InvalidFrameRate(u32),

    /// Payload exceeds what one RTP packet (and its FEC length field) can carry.
    #[error("payload of {0} bytes does not fit a single RTP packet")]
    PayloadTooLarge(usize),

    /// CSRC list longer than the 4-bit CC field allows.
    #[error("{0} CSRCs exceed the RTP limit of 15")]
    TooManyCsrcs(usize),

    /// A packet was folded into a group that already holds `group_size` members.
    #[error("FEC group already holds {0} packets")]
    GroupFull(usize),

    /// Repair requested for a packet whose group is not repairable.
    #[error("media packet {0} is not repairable")]
    NotRepairable(u16),
}

/// Specific kind of decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    /// Fewer bytes than the fixed header requires.
    Truncated { needed: usize, actual: usize },
    /// RTP version field is not 2.
    BadVersion(u8),
    /// CSRC count implies more bytes than present.
    CsrcOverrun,
    /// Header extension length implies more bytes than present.
    ExtensionOverrun,
    /// Padding count is zero or larger than the remaining bytes.
    BadPadding,
    /// ULP mask protects no packet.
    EmptyMask,
    /// Recovered length exceeds the XOR payload.
    LengthRecovery,
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed, actual } => {
                write!(f, "truncated ({actual} bytes, need {needed})")
            }
            Self::BadVersion(v) => write!(f, "unsupported RTP version {v}"),
            Self::CsrcOverrun => write!(f, "CSRC list overruns buffer"),
            Self::ExtensionOverrun => write!(f, "header extension overruns buffer"),
            Self::BadPadding => write!(f, "invalid padding"),
            Self::EmptyMask => write!(f, "empty protection mask"),
            Self::LengthRecovery => write!(f, "recovered length exceeds FEC payload"),
        }
    }
}

impl FecError {
    pub(crate) fn malformed(kind: MalformedKind) -> Self {
        Self::Malformed { kind }
    }

    pub(crate) fn truncated(needed: usize, actual: usize) -> Self {
        Self::malformed(MalformedKind::Truncated { needed, actual })
    }
}

/// Convenience alias for `Result<T, FecError>`.
pub type Result<T> = std::result::Result<T, FecError>;
