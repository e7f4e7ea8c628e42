//! Runtime configuration, built exclusively from CLI flags.
//!
//! Shaped like `huginn-proxy-lib`'s `Config` (a plain struct the rest of
//! the crate borrows from), but without that crate's `serde`+`toml` file
//! loader: spec.md section 6 is explicit that no files are persisted and
//! no environment variables are consumed by the core, so `Config` is
//! populated directly from `cli::Args` in `bin/tapcored.rs`.

use crate::codec::Ipv4Addr;

/// Whether an ARP reply's CRC is seeded from the received frame's FCS
/// (the behaviour preserved from `original_source`) or computed
/// independently, as a strict reading of Ethernet framing would require.
/// See `DESIGN.md` for why this is exposed as a flag rather than a fixed
/// choice, per spec.md's Design Notes open question.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrcChaining {
    /// Seed ARP replies with the inbound frame's FCS (source-compatible).
    ChainedWithRequest,
    /// Always seed with 0 (spec-conformant, independent FCS per frame).
    Independent,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// TAP interface name; `None` lets the kernel assign one.
    pub interface_name: Option<String>,
    /// This host's IPv4 address on the virtual link, used to decide
    /// which ARP requests and ICMP echoes are ours to answer.
    pub device_ip: Ipv4Addr,
    /// Capacity of the shared Ethernet packet buffer pool.
    pub pool_capacity: usize,
    pub arp_crc_chaining: CrcChaining,
    /// `size` argument to `BuddyAllocator::new` (count of the largest
    /// block the arena holds). The pipeline's packet buffers are served
    /// by the object pool, not this allocator; this field exists so a
    /// future sized-block subsystem can be sized from `Config` the same
    /// way the packet pool is.
    pub buddy_arena_size: usize,
    /// `order` argument to `BuddyAllocator::new`.
    pub buddy_arena_order: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            interface_name: None,
            device_ip: Ipv4Addr::new(10, 0, 0, 4),
            pool_capacity: crate::pool::DEFAULT_CAPACITY,
            arp_crc_chaining: CrcChaining::Independent,
            buddy_arena_size: crate::buddy::DEFAULT_SIZE,
            buddy_arena_order: crate::buddy::DEFAULT_ORDER,
        }
    }
}
