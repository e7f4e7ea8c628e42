//! Userspace Ethernet/ARP/IPv4/ICMP packet-processing core for a
//! TAP-attached link: a zero-copy frame/packet parser, an ARP
//! cache-and-reply state machine, an IPv4/ICMP handler, and the two
//! memory substrates (object pool, buddy allocator) that back them.
//!
//! The device, CLI, and process `main` loop live in `bin/tapcored.rs` and
//! depend only on the [`device::Device`] trait and [`pipeline::Pipeline`]
//! exposed here; everything below the driver loop is pure request/response
//! transformation over one inbound frame at a time.

pub mod arp;
pub mod buddy;
pub mod codec;
pub mod config;
pub mod device;
pub mod enet;
pub mod error;
pub mod icmp;
pub mod ipv4;
pub mod pipeline;
pub mod pool;
