//! Internet layer: IPv4 header parsing and validation, protocol dispatch.
//!
//! Grounded on `original_source/src/ip.cpp`'s `Manager::handleMessage` and
//! `Header::readFromBuffer`. Supersedes the teacher's `ip.rs`, which built
//! fixed-layout headers with `byte_struct`'s `bitfields!` macro for
//! emission only — this core also has to validate an inbound header's
//! checksum and reject malformed ones, which needs the bounds-checked
//! cursor codec from `codec.rs`.

use crate::codec::{
    ones_complement_sum, read_ipv4, read_ipv4_fields1, read_ipv4_fields2, read_u16, read_u8,
    Ipv4Addr, Ipv4Fields1, Ipv4Fields2,
};
use crate::error::{CodecError, Ipv4Error};

pub const VERSION: u8 = 4;
pub const HEADER_SIZE: usize = 20;
pub const PROTO_ICMP: u8 = 1;

/// A parsed and already-validated IPv4 header, with the payload borrowed
/// from the caller's buffer.
#[derive(Debug)]
pub struct Header<'a> {
    pub ihl: u8,
    pub tos: u8,
    pub total_length: u16,
    pub id: u16,
    pub flags: u16,
    pub frag_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub payload: &'a [u8],
}

/// Parse and validate the fixed 20-byte header (no options support, per
/// spec.md's scope): version must be 4, `ihl` at least 5, `ttl` nonzero,
/// and the one's-complement sum over the header must verify to zero.
pub fn parse(buffer: &[u8]) -> Result<Header<'_>, Ipv4Error> {
    if buffer.len() < HEADER_SIZE {
        return Err(Ipv4Error::Codec(CodecError::BoundsError));
    }

    let len = buffer.len();
    let mut cursor = 0usize;
    let Ipv4Fields1 { version, ihl } = read_ipv4_fields1(buffer, &mut cursor, len)?;
    let tos = read_u8(buffer, &mut cursor, len)?;
    let total_length = read_u16(buffer, &mut cursor, len)?;
    let id = read_u16(buffer, &mut cursor, len)?;
    let Ipv4Fields2 { flags, frag_offset } = read_ipv4_fields2(buffer, &mut cursor, len)?;
    let ttl = read_u8(buffer, &mut cursor, len)?;
    let protocol = read_u8(buffer, &mut cursor, len)?;
    let checksum = read_u16(buffer, &mut cursor, len)?;
    let src_ip = read_ipv4(buffer, &mut cursor, len)?;
    let dst_ip = read_ipv4(buffer, &mut cursor, len)?;

    if version != VERSION {
        return Err(Ipv4Error::BadVersion);
    }
    if ihl < 5 {
        return Err(Ipv4Error::BadIhl);
    }
    if ttl == 0 {
        return Err(Ipv4Error::TtlZero);
    }
    if ones_complement_sum(&buffer[..HEADER_SIZE], HEADER_SIZE) != 0 {
        return Err(Ipv4Error::BadChecksum);
    }

    Ok(Header {
        ihl,
        tos,
        total_length,
        id,
        flags,
        frag_offset,
        ttl,
        protocol,
        checksum,
        src_ip,
        dst_ip,
        payload: &buffer[HEADER_SIZE..],
    })
}
