//! Link layer: Ethernet II framing, CRC-32, and the packet buffer pool.
//!
//! Ground truth for field order and the length/EtherType disambiguation is
//! `original_source/src/ethernet.cpp`'s `Frame::parseBuffer`. The CRC keeps
//! the original's reflected `0xEDB88320` polynomial but is computed with
//! `crc32fast` rather than a from-scratch bit loop, since chaining via
//! `Hasher::new_with_initial` gives the request/reply CRC-seeding behaviour
//! spec.md calls for directly.

use crate::codec::{borrow_bytes, read_mac, read_u16, read_u32, write_mac, write_u16, MacAddr};
use crate::error::CodecError;
use crate::pool::ObjectPool;

/// Largest frame this core will ever parse or emit: 1500-byte MTU payload
/// plus the 14-byte header and 4-byte FCS.
pub const MAX_FRAME_SIZE: usize = 1518;
/// Total on-wire size below which a frame must be zero-padded.
pub const MIN_FRAME_SIZE: usize = 64;
pub const HEADER_SIZE: usize = 14;
pub const FCS_SIZE: usize = 4;
/// EtherType values below this are IEEE 802.3 length fields, not types.
pub const ETHERTYPE_MIN: u16 = 0x0600;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;

/// A fixed-size, pool-managed packet buffer. Wrapping `Vec<u8>` in a named
/// type gives it a `Default` impl sized to `MAX_FRAME_SIZE` up front —
/// `[u8; MAX_FRAME_SIZE]` has no such impl for arbitrary `N` on stable Rust.
#[derive(Clone)]
pub struct PacketBuffer(pub Vec<u8>);

impl Default for PacketBuffer {
    fn default() -> Self {
        PacketBuffer(vec![0u8; MAX_FRAME_SIZE])
    }
}

/// The process-wide pool backing every in-flight Ethernet frame.
pub type PacketPool = ObjectPool<PacketBuffer>;

/// EtherType tag values relevant to this core.
///
/// See https://en.wikipedia.org/wiki/EtherType
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum EtherType {
    Ipv4 = ETHERTYPE_IPV4,
    Arp = ETHERTYPE_ARP,
    /// Any other value, including 802.3 length fields (`< 0x0600`).
    Other(u16),
}

impl From<u16> for EtherType {
    fn from(value: u16) -> Self {
        match value {
            ETHERTYPE_IPV4 => EtherType::Ipv4,
            ETHERTYPE_ARP => EtherType::Arp,
            other => EtherType::Other(other),
        }
    }
}

/// The three fixed header fields, already byte-order-converted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub dst_mac: MacAddr,
    pub src_mac: MacAddr,
    pub ethertype: u16,
}

/// A frame parsed out of a caller-owned buffer. `payload` borrows from
/// that buffer — the "borrowed view into an owned buffer" spec.md's
/// Design Notes call for, rather than a copy.
#[derive(Debug)]
pub struct ParsedFrame<'a> {
    pub header: Header,
    pub payload: &'a [u8],
    /// The FCS trailer as read off the wire, used verbatim as the CRC
    /// seed when an ARP reply chains off this frame (section 4.5).
    pub fcs: u32,
}

/// Read `{dstMac, srcMac, etherType, payload, FCS}` out of `buffer`.
///
/// When `etherType < 0x0600` it is an 802.3 length field and the payload
/// spans exactly that many bytes; otherwise the payload runs from the
/// cursor to `len - FCS_SIZE` and the trailing 4 bytes are the FCS.
pub fn parse(buffer: &[u8]) -> Result<ParsedFrame<'_>, CodecError> {
    let len = buffer.len();
    let mut cursor = 0usize;
    let dst_mac = read_mac(buffer, &mut cursor, len)?;
    let src_mac = read_mac(buffer, &mut cursor, len)?;
    let ethertype = read_u16(buffer, &mut cursor, len)?;

    let payload_len = if ethertype < ETHERTYPE_MIN {
        ethertype as usize
    } else {
        len.checked_sub(cursor)
            .and_then(|rest| rest.checked_sub(FCS_SIZE))
            .ok_or(CodecError::BoundsError)?
    };
    let payload = borrow_bytes(buffer, &mut cursor, len, payload_len)?;
    let fcs = read_u32(buffer, &mut cursor, len)?;

    Ok(ParsedFrame {
        header: Header {
            dst_mac,
            src_mac,
            ethertype,
        },
        payload,
        fcs,
    })
}

/// Write the 14-byte Ethernet header at the cursor.
pub fn write_header(
    buffer: &mut [u8],
    cursor: &mut usize,
    buffer_len: usize,
    dst_mac: MacAddr,
    src_mac: MacAddr,
    ethertype: u16,
) -> Result<(), CodecError> {
    write_mac(buffer, cursor, buffer_len, dst_mac)?;
    write_mac(buffer, cursor, buffer_len, src_mac)?;
    write_u16(buffer, cursor, buffer_len, ethertype)?;
    Ok(())
}

/// Pad the frame body with zero bytes up to `MIN_FRAME_SIZE - FCS_SIZE`,
/// append the CRC-32 of everything written so far (seeded with
/// `crc_seed`), and return the frame's total used length.
pub fn pad_and_finish(
    buffer: &mut [u8],
    cursor: &mut usize,
    buffer_len: usize,
    crc_seed: u32,
) -> Result<usize, CodecError> {
    while *cursor < MIN_FRAME_SIZE - FCS_SIZE {
        if *cursor >= buffer_len {
            return Err(CodecError::BoundsError);
        }
        buffer[*cursor] = 0;
        *cursor += 1;
    }
    let crc = crc32(crc_seed, &buffer[..*cursor]);
    crate::codec::write_u32(buffer, cursor, buffer_len, crc)?;
    Ok(*cursor)
}

/// Reflected CRC-32 (polynomial `0xEDB88320`) over `bytes`, continuing
/// from `seed`. `seed = 0` gives an independent computation; passing a
/// previously-finalized CRC chains the two runs, matching the source's
/// request/reply seeding (sections 4.5, 4.6).
pub fn crc32(seed: u32, bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(seed);
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn crc32_matches_standard_test_vector() {
        assert_eq!(crc32(0, b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn ethertype_classifies_known_values() {
        assert_eq!(EtherType::from(0x0800), EtherType::Ipv4);
        assert_eq!(EtherType::from(0x0806), EtherType::Arp);
        assert_eq!(EtherType::from(0x0042), EtherType::Other(0x0042));
    }

    #[test]
    fn parse_reads_header_and_splits_payload_from_fcs() {
        let mut buf = vec![0u8; 18];
        let mut cursor = 0;
        write_header(
            &mut buf,
            &mut cursor,
            18,
            MacAddr([1, 2, 3, 4, 5, 6]),
            MacAddr([7, 8, 9, 10, 11, 12]),
            ETHERTYPE_IPV4,
        )
        .unwrap();
        buf[14] = 0xAB;

        let frame = parse(&buf).unwrap();
        assert_eq!(frame.header.ethertype, ETHERTYPE_IPV4);
        assert_eq!(frame.payload, &[0xAB]);
        assert_eq!(frame.fcs, 0);
    }

    #[test]
    fn parse_treats_small_ethertype_as_length_field() {
        let mut buf = vec![0u8; 14 + 5];
        let mut cursor = 0;
        let buf_len = buf.len();
        write_header(
            &mut buf,
            &mut cursor,
            buf_len,
            MacAddr::BROADCAST,
            MacAddr::ZERO,
            5,
        )
        .unwrap();
        buf[14..19].copy_from_slice(&[1, 2, 3, 4, 5]);
        let frame = parse(&buf).unwrap();
        assert_eq!(frame.payload, &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn pad_and_finish_pads_to_minimum_frame_size() {
        let mut buf = vec![0u8; MIN_FRAME_SIZE];
        let mut cursor = 20usize;
        let buf_len = buf.len();
        let len = pad_and_finish(&mut buf, &mut cursor, buf_len, 0).unwrap();
        assert_eq!(len, MIN_FRAME_SIZE);
    }

    #[test]
    fn crc_chaining_with_nonzero_seed_differs_from_independent() {
        let data = b"hello";
        assert_ne!(crc32(0, data), crc32(0xDEAD_BEEF, data));
    }

    #[test]
    fn packet_buffer_default_is_max_frame_sized() {
        assert_eq!(PacketBuffer::default().0.len(), MAX_FRAME_SIZE);
    }
}
