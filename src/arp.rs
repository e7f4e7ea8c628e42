//! ARP: header+payload parsing, an upsert-only IP→MAC cache, and reply
//! synthesis for requests addressed to this host.
//!
//! Grounded on `original_source/src/arp.cpp`'s `CacheManager::handleMessage`
//! / `replyMessage` and `original_source/src/include/arp.hpp`'s `Cache`
//! map. This core only answers requests; it never originates one
//! (spec.md section 1's explicit non-goal).

use std::collections::HashMap;

use crate::codec::{
    read_ipv4, read_mac, read_u16, read_u8, write_ipv4, write_mac, write_u16, write_u8, Ipv4Addr,
    MacAddr,
};
use crate::enet;
use crate::error::{ArpError, CodecError};

pub const HW_ETHERNET: u16 = 1;
pub const PRO_IPV4: u16 = 0x0800;
pub const OP_REQUEST: u16 = 1;
pub const OP_REPLY: u16 = 2;

/// The fixed ARP header, plus a borrowed view of whatever payload follows
/// it (just the IPv4/Ethernet payload in this core, per `hwType`/`proType`
/// validation below).
#[derive(Debug)]
pub struct Header<'a> {
    pub hw_type: u16,
    pub pro_type: u16,
    pub hw_size: u8,
    pub pro_size: u8,
    pub op_code: u16,
    pub payload: &'a [u8],
}

/// The IPv4-over-Ethernet ARP payload: sender and target hardware/protocol
/// address pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayloadIpv4 {
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

/// Parse the fixed ARP header out of an Ethernet frame's payload.
pub fn parse_header(buffer: &[u8]) -> Result<Header<'_>, CodecError> {
    let len = buffer.len();
    let mut cursor = 0usize;
    let hw_type = read_u16(buffer, &mut cursor, len)?;
    let pro_type = read_u16(buffer, &mut cursor, len)?;
    let hw_size = read_u8(buffer, &mut cursor, len)?;
    let pro_size = read_u8(buffer, &mut cursor, len)?;
    let op_code = read_u16(buffer, &mut cursor, len)?;
    let payload = &buffer[cursor..];
    Ok(Header {
        hw_type,
        pro_type,
        hw_size,
        pro_size,
        op_code,
        payload,
    })
}

/// Parse `{senderMac, senderIp, targetMac, targetIp}` out of an ARP
/// header's payload view.
pub fn parse_payload_ipv4(buffer: &[u8]) -> Result<PayloadIpv4, CodecError> {
    let len = buffer.len();
    let mut cursor = 0usize;
    let sender_mac = read_mac(buffer, &mut cursor, len)?;
    let sender_ip = read_ipv4(buffer, &mut cursor, len)?;
    let target_mac = read_mac(buffer, &mut cursor, len)?;
    let target_ip = read_ipv4(buffer, &mut cursor, len)?;
    Ok(PayloadIpv4 {
        sender_mac,
        sender_ip,
        target_mac,
        target_ip,
    })
}

/// One learned IP→MAC mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub hw_type: u16,
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
}

/// IP→MAC resolution table. Upsert-only: entries are created on first
/// sight of an IP and refreshed on every later message from a matching
/// `hwType`; nothing is ever evicted (spec.md section 3).
#[derive(Default)]
pub struct Cache {
    entries: HashMap<Ipv4Addr, CacheEntry>,
}

impl Cache {
    pub fn new() -> Self {
        Cache::default()
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<&CacheEntry> {
        self.entries.get(&ip)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn upsert(&mut self, hw_type: u16, ip: Ipv4Addr, mac: MacAddr) {
        self.entries
            .entry(ip)
            .and_modify(|entry| {
                if entry.hw_type == hw_type {
                    entry.mac = mac;
                }
            })
            .or_insert(CacheEntry { hw_type, ip, mac });
    }
}

/// Validate the header, parse its IPv4 payload, upsert the cache, and
/// return the fields needed to synthesize a reply if this was a request.
///
/// Returns `Ok(Some(payload))` for a request, `Ok(None)` is never
/// produced (non-request opcodes are an error per spec.md section 4.5);
/// the split exists so the driver can build the Ethernet reply header
/// with `frame.fcs` as the CRC seed without this module depending on
/// `enet::PacketPool`.
pub fn handle<'a>(
    cache: &mut Cache,
    payload: &'a [u8],
) -> Result<(Header<'a>, PayloadIpv4), ArpError> {
    let header = parse_header(payload)?;
    if header.hw_type != HW_ETHERNET {
        return Err(ArpError::UnsupportedHwType);
    }
    if header.pro_type != PRO_IPV4 {
        return Err(ArpError::UnsupportedProtocol);
    }
    let data = parse_payload_ipv4(header.payload)?;
    cache.upsert(header.hw_type, data.sender_ip, data.sender_mac);

    if header.op_code != OP_REQUEST {
        return Err(ArpError::UnsupportedOpcode);
    }
    Ok((header, data))
}

/// Write an ARP reply frame into `buffer`: Ethernet header addressed back
/// to the requester, then the ARP body with sender/target swapped and the
/// device's own address substituted as sender. Returns the total frame
/// length (padded and CRC'd) per `enet::pad_and_finish`.
pub fn write_reply(
    buffer: &mut [u8],
    buffer_len: usize,
    device_mac: MacAddr,
    header: &Header<'_>,
    data: &PayloadIpv4,
    crc_seed: u32,
) -> Result<usize, CodecError> {
    let mut cursor = 0usize;
    enet::write_header(
        buffer,
        &mut cursor,
        buffer_len,
        data.sender_mac,
        device_mac,
        enet::ETHERTYPE_ARP,
    )?;

    write_u16(buffer, &mut cursor, buffer_len, header.hw_type)?;
    write_u16(buffer, &mut cursor, buffer_len, header.pro_type)?;
    write_u8(buffer, &mut cursor, buffer_len, header.hw_size)?;
    write_u8(buffer, &mut cursor, buffer_len, header.pro_size)?;
    write_u16(buffer, &mut cursor, buffer_len, OP_REPLY)?;

    write_mac(buffer, &mut cursor, buffer_len, device_mac)?;
    write_ipv4(buffer, &mut cursor, buffer_len, data.target_ip)?;
    write_mac(buffer, &mut cursor, buffer_len, data.sender_mac)?;
    write_ipv4(buffer, &mut cursor, buffer_len, data.sender_ip)?;

    enet::pad_and_finish(buffer, &mut cursor, buffer_len, crc_seed)
}
