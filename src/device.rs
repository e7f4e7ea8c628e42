//! TAP device adapter: open a `/dev/net/tun` endpoint in TAP mode, query
//! its hardware address, and read/write whole Ethernet frames.
//!
//! Grounded on `original_source/src/device/tun.cpp`'s `TunDevice` (the
//! `TUNSETIFF`/`SIOCGIFHWADDR` ioctl dance) and on the raw-`libc`-ioctl
//! style of `other_examples/.../ethercrab__src-std-unix-bpf.rs.rs`'s BPF
//! adapter, since no crate in the retrieval pack wraps TAP creation
//! itself. Per spec.md section 1 this is an interface-only boundary —
//! the pipeline depends on the [`Device`] trait, not this Linux impl, so
//! tests exercise the pipeline against an in-memory fake instead of a
//! real character device.

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;

use crate::codec::MacAddr;
use crate::error::DeviceError;

const TAP_PATH: &str = "/dev/net/tun";
const IFNAMSIZ: usize = 16;
const IFF_TAP: libc::c_short = 0x0002;
const IFF_NO_PI: libc::c_short = 0x1000;
const TUNSETIFF: libc::c_ulong = 0x4004_54ca;
const SIOCGIFHWADDR: libc::c_ulong = 0x8927;

/// `struct ifreq`, laid out the way the Linux kernel headers declare it:
/// a 16-byte interface name followed by a union whose largest variant
/// used here is `struct sockaddr` (16 bytes) for hardware-address
/// queries, or a `short flags` for `TUNSETIFF`.
#[repr(C)]
struct IfReq {
    name: [libc::c_char; IFNAMSIZ],
    union: IfReqUnion,
}

#[repr(C)]
union IfReqUnion {
    flags: libc::c_short,
    hwaddr: libc::sockaddr,
}

/// What the pipeline needs from a link endpoint: read one frame, write
/// one frame, and report the MAC address queried at open time.
pub trait Device {
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError>;
    fn write_frame(&mut self, buf: &[u8]) -> Result<usize, DeviceError>;
    fn mac_address(&self) -> MacAddr;
}

/// A real Linux TAP endpoint. Move-only by construction (no `Clone`);
/// `Drop` closes the descriptor, making close idempotent the same way
/// the source's destructor does after a moved-from `_fd = -1`.
pub struct TapDevice {
    fd: RawFd,
    name: String,
    mac: MacAddr,
}

impl TapDevice {
    /// Open the TAP endpoint. If `name` is given the kernel is asked to
    /// bind that interface name; otherwise it assigns one and we read it
    /// back out of the post-ioctl `ifreq`.
    pub fn open(name: Option<&str>) -> Result<Self, DeviceError> {
        let path = CString::new(TAP_PATH).expect("constant path has no interior NUL");
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            return Err(DeviceError::Io(io::Error::last_os_error()));
        }

        let mut ifr = IfReq {
            name: [0; IFNAMSIZ],
            union: IfReqUnion {
                flags: IFF_TAP | IFF_NO_PI,
            },
        };
        if let Some(name) = name {
            copy_name(&mut ifr.name, name);
        }

        let res = unsafe { libc::ioctl(fd, TUNSETIFF, &mut ifr as *mut IfReq) };
        if res < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(DeviceError::Io(err));
        }

        let bound_name = read_name(&ifr.name);
        let mac = query_mac_address(fd, &bound_name)?;

        Ok(TapDevice {
            fd,
            name: bound_name,
            mac,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn query_mac_address(fd: RawFd, name: &str) -> Result<MacAddr, DeviceError> {
    let mut ifr = IfReq {
        name: [0; IFNAMSIZ],
        union: IfReqUnion { flags: 0 },
    };
    copy_name(&mut ifr.name, name);

    let res = unsafe { libc::ioctl(fd, SIOCGIFHWADDR, &mut ifr as *mut IfReq) };
    if res != 0 {
        return Err(DeviceError::HwAddrQuery);
    }
    let sa_data = unsafe { ifr.union.hwaddr.sa_data };
    let mut bytes = [0u8; 6];
    for (dst, src) in bytes.iter_mut().zip(sa_data.iter()) {
        *dst = *src as u8;
    }
    Ok(MacAddr(bytes))
}

fn copy_name(dst: &mut [libc::c_char; IFNAMSIZ], name: &str) {
    for (slot, byte) in dst.iter_mut().zip(name.bytes().take(IFNAMSIZ - 1)) {
        *slot = byte as libc::c_char;
    }
}

fn read_name(src: &[libc::c_char; IFNAMSIZ]) -> String {
    src.iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8 as char)
        .collect()
}

impl Device for TapDevice {
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            return Err(DeviceError::Io(io::Error::last_os_error()));
        }
        Ok(n as usize)
    }

    fn write_frame(&mut self, buf: &[u8]) -> Result<usize, DeviceError> {
        let n = unsafe { libc::write(self.fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if n < 0 {
            return Err(DeviceError::Io(io::Error::last_os_error()));
        }
        Ok(n as usize)
    }

    fn mac_address(&self) -> MacAddr {
        self.mac
    }
}

impl Drop for TapDevice {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct FakeDevice {
        mac: MacAddr,
        inbox: Vec<Vec<u8>>,
        outbox: Vec<Vec<u8>>,
    }

    impl Device for FakeDevice {
        fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
            let frame = self.inbox.remove(0);
            buf[..frame.len()].copy_from_slice(&frame);
            Ok(frame.len())
        }

        fn write_frame(&mut self, buf: &[u8]) -> Result<usize, DeviceError> {
            self.outbox.push(buf.to_vec());
            Ok(buf.len())
        }

        fn mac_address(&self) -> MacAddr {
            self.mac
        }
    }

    #[test]
    fn fake_device_round_trips_frames() {
        let mut dev = FakeDevice {
            mac: MacAddr([2, 0, 0, 0, 0, 1]),
            inbox: vec![vec![1, 2, 3]],
            outbox: Vec::new(),
        };
        let mut buf = [0u8; 16];
        let n = dev.read_frame(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);

        dev.write_frame(&[4, 5, 6]).unwrap();
        assert_eq!(dev.outbox, vec![vec![4, 5, 6]]);
    }

    #[test]
    fn name_round_trips_through_fixed_buffer() {
        let mut raw = [0 as libc::c_char; IFNAMSIZ];
        copy_name(&mut raw, "tap0");
        assert_eq!(read_name(&raw), "tap0");
    }

    #[test]
    fn name_longer_than_buffer_is_truncated() {
        let mut raw = [0 as libc::c_char; IFNAMSIZ];
        copy_name(&mut raw, "a-very-long-interface-name");
        assert_eq!(read_name(&raw).len(), IFNAMSIZ - 1);
    }
}
