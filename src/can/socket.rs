//! Raw `SocketCAN` transport (Linux)

use std::ffi::CString;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use super::transport::{CanTransport, TransportError};
use super::{CanFrame, MAX_PAYLOAD};
use crate::{Error, Result};

/// Kernel `struct can_frame`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct RawFrame {
    can_id: u32,
    len: u8,
    pad: u8,
    res0: u8,
    res1: u8,
    data: [u8; MAX_PAYLOAD],
}

const RAW_FRAME_SIZE: usize = mem::size_of::<RawFrame>();

/// A raw CAN socket bound to one interface
#[derive(Debug)]
pub struct SocketCanTransport {
    fd: OwnedFd,
    interface: String,
}

impl SocketCanTransport {
    /// Open a raw CAN socket and bind it to `interface` (e.g. "can0")
    ///
    /// # Errors
    ///
    /// Returns error if the socket cannot be created, the interface does not
    /// exist, or binding fails
    #[allow(unsafe_code)]
    pub fn open(interface: &str) -> Result<Self> {
        let name = CString::new(interface)
            .map_err(|_| Error::Can(format!("invalid interface name: {interface:?}")))?;

        // SAFETY: plain socket(2) call; the returned descriptor is checked
        // before being wrapped so ownership is taken exactly once.
        let raw = unsafe { libc::socket(libc::PF_CAN, libc::SOCK_RAW, libc::CAN_RAW) };
        if raw < 0 {
            return Err(Error::Can(format!(
                "socket: {}",
                std::io::Error::last_os_error()
            )));
        }
        // SAFETY: `raw` is a freshly created, valid descriptor owned by nobody else
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: `name` is a valid NUL-terminated string for the call's duration
        let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if index == 0 {
            return Err(Error::Can(format!(
                "interface {interface}: {}",
                std::io::Error::last_os_error()
            )));
        }

        // SAFETY: `sockaddr_can` is plain old data; all-zero is a valid value
        let mut addr: libc::sockaddr_can = unsafe { mem::zeroed() };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let family = libc::AF_CAN as libc::sa_family_t;
        addr.can_family = family;
        addr.can_ifindex = libc::c_int::try_from(index)
            .map_err(|_| Error::Can(format!("interface index out of range: {index}")))?;

        #[allow(clippy::cast_possible_truncation)]
        let addr_len = mem::size_of::<libc::sockaddr_can>() as libc::socklen_t;

        // SAFETY: `addr` outlives the call and `addr_len` is its exact size
        let bound = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                std::ptr::addr_of!(addr).cast::<libc::sockaddr>(),
                addr_len,
            )
        };
        if bound < 0 {
            return Err(Error::Can(format!(
                "bind {interface}: {}",
                std::io::Error::last_os_error()
            )));
        }

        tracing::info!(interface, "CAN interface configured");

        Ok(Self {
            fd,
            interface: interface.to_string(),
        })
    }

    /// Name of the bound interface
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Block until one data frame arrives
    ///
    /// # Errors
    ///
    /// Returns error if the read fails or yields a remote/error frame
    #[allow(unsafe_code)]
    pub fn receive(&mut self) -> std::result::Result<CanFrame, TransportError> {
        let mut raw = RawFrame::default();

        // SAFETY: `raw` is a `repr(C)` buffer of exactly RAW_FRAME_SIZE bytes
        let read = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                std::ptr::addr_of_mut!(raw).cast::<libc::c_void>(),
                RAW_FRAME_SIZE,
            )
        };
        let read = usize::try_from(read).map_err(|_| std::io::Error::last_os_error())?;
        if read != RAW_FRAME_SIZE {
            return Err(TransportError::InvalidFrame(format!(
                "read {read} of {RAW_FRAME_SIZE} bytes"
            )));
        }

        let frame = from_raw(&raw)?;
        tracing::debug!(frame = %frame, "CAN frame received");
        Ok(frame)
    }
}

impl CanTransport for SocketCanTransport {
    #[allow(unsafe_code)]
    fn send(&mut self, frame: &CanFrame) -> std::result::Result<(), TransportError> {
        let raw = to_raw(frame);

        // SAFETY: `raw` is a `repr(C)` buffer of exactly RAW_FRAME_SIZE bytes
        let written = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                std::ptr::addr_of!(raw).cast::<libc::c_void>(),
                RAW_FRAME_SIZE,
            )
        };
        let written = usize::try_from(written).map_err(|_| std::io::Error::last_os_error())?;
        if written != RAW_FRAME_SIZE {
            return Err(TransportError::ShortWrite {
                written,
                expected: RAW_FRAME_SIZE,
            });
        }

        tracing::debug!(id = format_args!("0x{:X}", frame.id()), "CAN frame sent");
        Ok(())
    }
}

impl Drop for SocketCanTransport {
    fn drop(&mut self) {
        tracing::info!(interface = %self.interface, "CAN socket closed");
    }
}

fn to_raw(frame: &CanFrame) -> RawFrame {
    let mut can_id = frame.id();
    if frame.is_extended() {
        can_id |= libc::CAN_EFF_FLAG;
    }

    #[allow(clippy::cast_possible_truncation)]
    let len = frame.len() as u8;

    RawFrame {
        can_id,
        len,
        data: *frame.data(),
        ..RawFrame::default()
    }
}

fn from_raw(raw: &RawFrame) -> std::result::Result<CanFrame, TransportError> {
    if raw.can_id & (libc::CAN_RTR_FLAG | libc::CAN_ERR_FLAG) != 0 {
        return Err(TransportError::InvalidFrame(format!(
            "remote or error frame 0x{:08X}",
            raw.can_id
        )));
    }

    let id = if raw.can_id & libc::CAN_EFF_FLAG == 0 {
        raw.can_id & libc::CAN_SFF_MASK
    } else {
        raw.can_id & libc::CAN_EFF_MASK
    };

    let len = usize::from(raw.len);
    let payload = raw
        .data
        .get(..len)
        .ok_or_else(|| TransportError::InvalidFrame(format!("dlc {len}")))?;

    CanFrame::new(id, payload)
        .ok_or_else(|| TransportError::InvalidFrame(format!("id 0x{id:X}")))
}
