//! Classic Bluetooth transport over an RFCOMM socket (Linux).
//!
//! Connects an `AF_BLUETOOTH` stream socket to channel 1 of the paired
//! printer, the channel NIIMBOT devices expose for SPP. Only one
//! connection per device is possible; the kernel refuses a second socket
//! to the same address.

use crate::transport::{Transport, TransportError, TransportKind};

#[cfg(target_os = "linux")]
const RFCOMM_CHANNEL: u8 = 1;

#[cfg(target_os = "linux")]
const BTPROTO_RFCOMM: libc::c_int = 3;

/// `sockaddr_rc` from `<bluetooth/rfcomm.h>`; bdaddr octets are stored
/// little-endian, i.e. reversed relative to the printed MAC.
#[cfg(target_os = "linux")]
#[repr(C)]
struct SockaddrRc {
    rc_family: libc::sa_family_t,
    rc_bdaddr: [u8; 6],
    rc_channel: u8,
}

/// RFCOMM socket channel to the printer.
pub struct BluetoothSocketTransport {
    fd: Option<i32>,
}

impl BluetoothSocketTransport {
    /// Connect to the given MAC address on the SPP channel.
    #[cfg(target_os = "linux")]
    pub fn open(address: &str) -> Result<Self, TransportError> {
        let octets = crate::transport::parse_mac(address)?;
        let mut bdaddr = octets;
        bdaddr.reverse();

        tracing::info!(address, "connecting RFCOMM socket");
        let fd = unsafe {
            libc::socket(
                libc::AF_BLUETOOTH,
                libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
                BTPROTO_RFCOMM,
            )
        };
        if fd < 0 {
            return Err(TransportError::ConnectFailed(
                std::io::Error::last_os_error().to_string(),
            ));
        }

        let addr = SockaddrRc {
            rc_family: libc::AF_BLUETOOTH as libc::sa_family_t,
            rc_bdaddr: bdaddr,
            rc_channel: RFCOMM_CHANNEL,
        };
        let rc = unsafe {
            libc::connect(
                fd,
                &addr as *const SockaddrRc as *const libc::sockaddr,
                std::mem::size_of::<SockaddrRc>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(TransportError::ConnectFailed(format!("{address}: {err}")));
        }
        Ok(Self { fd: Some(fd) })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn open(_address: &str) -> Result<Self, TransportError> {
        Err(TransportError::ConnectFailed(
            "RFCOMM sockets are only supported on Linux".into(),
        ))
    }
}

impl Transport for BluetoothSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::BluetoothSocket
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let fd = self.fd.ok_or(TransportError::Disconnected)?;
        #[cfg(target_os = "linux")]
        {
            let mut sent = 0usize;
            while sent < data.len() {
                let rc = unsafe {
                    libc::send(
                        fd,
                        data[sent..].as_ptr() as *const libc::c_void,
                        data.len() - sent,
                        libc::MSG_NOSIGNAL,
                    )
                };
                if rc < 0 {
                    let err = std::io::Error::last_os_error();
                    if err.kind() == std::io::ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(TransportError::WriteFailed(err.to_string()));
                }
                sent += rc as usize;
            }
            Ok(())
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = (fd, data);
            Err(TransportError::Disconnected)
        }
    }

    fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        let fd = self.fd.ok_or(TransportError::Disconnected)?;
        #[cfg(target_os = "linux")]
        {
            let mut buf = vec![0u8; 1024];
            let rc = unsafe {
                libc::recv(
                    fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    libc::MSG_DONTWAIT,
                )
            };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                return match err.kind() {
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted => {
                        Ok(Vec::new())
                    }
                    _ => Err(TransportError::Disconnected),
                };
            }
            if rc == 0 {
                // Orderly shutdown from the peer.
                return Err(TransportError::Disconnected);
            }
            buf.truncate(rc as usize);
            Ok(buf)
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = fd;
            Err(TransportError::Disconnected)
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(fd) = self.fd.take() {
            #[cfg(target_os = "linux")]
            unsafe {
                libc::close(fd);
            }
            #[cfg(not(target_os = "linux"))]
            let _ = fd;
            tracing::debug!("RFCOMM socket closed");
        }
        Ok(())
    }
}

impl Drop for BluetoothSocketTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
