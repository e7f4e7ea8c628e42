//! CLI entry point: open a TAP interface, build a `Pipeline` around it,
//! and run the driver loop until the device errors out.

use clap::Parser;

use tapcore::codec::Ipv4Addr;
use tapcore::config::{Config, CrcChaining};
use tapcore::device::{Device, TapDevice};
use tapcore::pipeline::{self, Pipeline};

/// Userspace Ethernet/ARP/IPv4/ICMP responder over a TAP interface.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TAP interface name to bind; if omitted the kernel assigns one.
    #[arg(long)]
    interface: Option<String>,

    /// IPv4 address this host answers ARP requests and ICMP echoes for.
    #[arg(long, default_value = "10.0.0.4")]
    device_ip: std::net::Ipv4Addr,

    /// Capacity of the shared Ethernet packet buffer pool.
    #[arg(long, default_value_t = tapcore::pool::DEFAULT_CAPACITY)]
    pool_capacity: usize,

    /// Seed ARP reply CRCs from the request frame's FCS instead of
    /// computing each reply's CRC independently.
    #[arg(long)]
    chain_arp_crc: bool,

    /// `size` argument to the buddy allocator's arena (count of its
    /// largest block).
    #[arg(long, default_value_t = tapcore::buddy::DEFAULT_SIZE)]
    buddy_arena_size: usize,

    /// `order` argument to the buddy allocator's arena.
    #[arg(long, default_value_t = tapcore::buddy::DEFAULT_ORDER)]
    buddy_arena_order: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let octets = args.device_ip.octets();

    let config = Config {
        interface_name: args.interface.clone(),
        device_ip: Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]),
        pool_capacity: args.pool_capacity,
        arp_crc_chaining: if args.chain_arp_crc {
            CrcChaining::ChainedWithRequest
        } else {
            CrcChaining::Independent
        },
        buddy_arena_size: args.buddy_arena_size,
        buddy_arena_order: args.buddy_arena_order,
    };

    let mut device = TapDevice::open(config.interface_name.as_deref())?;
    tracing::info!(interface = device.name(), device_ip = %config.device_ip, "tap interface ready");

    let mut pipeline = Pipeline::new(&config, device.mac_address());
    pipeline::run(&mut pipeline, &mut device)?;
    Ok(())
}
