//! Error types for every subsystem in the pipeline, composed into a
//! single [`PipelineError`] at the driver-loop boundary.

use thiserror::Error;

/// Errors raised by the bounded wire codec (`codec` module).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// A read or write would have advanced the cursor past `buffer_len`.
    #[error("codec: read/write at cursor would exceed buffer length")]
    BoundsError,
}

/// Errors raised by the fixed-capacity object pool (`pool` module).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// No free slot remains in the pool.
    #[error("pool: exhausted, no free blocks remain")]
    Exhausted,
    /// `release` was called with a null/foreign pointer.
    #[error("pool: release of a null pointer")]
    NullPointer,
}

/// Errors raised by the buddy allocator (`buddy` module).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuddyError {
    /// The requested size exceeds the arena.
    #[error("buddy: requested size exceeds total arena size")]
    TooLarge,
    /// No block could be produced even after exhausting all splits.
    #[error("buddy: exhausted, no block available at any order")]
    Exhausted,
    /// `deallocate` was called with a null pointer.
    #[error("buddy: deallocate of a null pointer")]
    NullPointer,
}

/// Errors raised while parsing or replying to an ARP message.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpError {
    /// `hwType` field was not `1` (Ethernet).
    #[error("arp: unsupported hardware type")]
    UnsupportedHwType,
    /// `proType` field was not `0x0800` (IPv4).
    #[error("arp: unsupported protocol type")]
    UnsupportedProtocol,
    /// Opcode was not `1` (request); this core never originates requests.
    #[error("arp: unsupported opcode, only requests are answered")]
    UnsupportedOpcode,
    /// Underlying codec bounds failure while parsing.
    #[error("arp: {0}")]
    Codec(#[from] CodecError),
}

/// Errors raised while parsing or validating an IPv4 header.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ipv4Error {
    /// `version` field was not 4.
    #[error("ipv4: header version is not 4")]
    BadVersion,
    /// `ihl` field was below the minimum of 5.
    #[error("ipv4: header length (ihl) below minimum of 5")]
    BadIhl,
    /// `ttl` field was zero.
    #[error("ipv4: time-to-live is zero")]
    TtlZero,
    /// One's-complement header checksum did not verify to zero.
    #[error("ipv4: header checksum does not verify")]
    BadChecksum,
    /// `protocol` field named a transport this core does not handle.
    #[error("ipv4: unsupported protocol")]
    UnsupportedProtocol,
    /// Underlying codec bounds failure while parsing.
    #[error("ipv4: {0}")]
    Codec(#[from] CodecError),
}

/// Errors raised while dispatching or replying to an ICMPv4 message.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpError {
    /// ICMP type was recognized as "destination unreachable" (type 3);
    /// this core parses it but never synthesizes a reply.
    #[error("icmp: destination unreachable")]
    Unreachable,
    /// ICMP type is recognized format but not handled by this core.
    #[error("icmp: unsupported icmp type")]
    UnsupportedIcmpType,
    /// Underlying codec bounds failure while parsing.
    #[error("icmp: {0}")]
    Codec(#[from] CodecError),
}

/// Errors raised by the device adapter.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The underlying syscall failed.
    #[error("device: {0}")]
    Io(#[from] std::io::Error),
    /// The ioctl to query the hardware address failed.
    #[error("device: could not query hardware address")]
    HwAddrQuery,
}

/// The union of all per-subsystem errors, surfaced at the driver loop.
///
/// Per spec.md section 7: parse-time validation errors here are
/// fatal-for-this-frame (the driver logs and drops the frame, no reply
/// is emitted). Pool/allocator errors are fatal-for-the-process (the
/// driver loop terminates).
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bounds violation in the wire codec.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Object pool exhaustion or misuse.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Buddy allocator exhaustion, oversize request, or misuse.
    #[error(transparent)]
    Buddy(#[from] BuddyError),
    /// ARP-layer failure.
    #[error(transparent)]
    Arp(#[from] ArpError),
    /// IPv4-layer failure.
    #[error(transparent)]
    Ipv4(#[from] Ipv4Error),
    /// ICMP-layer failure.
    #[error(transparent)]
    Icmp(#[from] IcmpError),
    /// Device adapter failure.
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// EtherType was neither ARP nor IPv4; this core has nothing to do
    /// with the frame.
    #[error("pipeline: unhandled ethertype {0:#06x}")]
    UnhandledEtherType(u16),
}

impl PipelineError {
    /// True when this error should terminate the driver loop (pool and
    /// allocator errors) rather than merely drop the current frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Pool(_) | PipelineError::Buddy(_))
    }
}
