use crate::error::{ErrorKind, IoError, IoOperation, IoResult};
use crate::net::socket::Socket;
use itertools::Itertools;
use nix::Error;
use socket2::{Domain, Protocol, SockAddr, Type};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::instrument;

/// A raw ICMP network socket.
pub struct SocketImpl {
    inner: socket2::Socket,
}

impl SocketImpl {
    fn new(domain: Domain, protocol: Protocol) -> IoResult<Self> {
        Ok(Self {
            inner: socket2::Socket::new(domain, Type::RAW, Some(protocol))
                .map_err(|err| IoError::Other(err, IoOperation::NewSocket))?,
        })
    }
}

impl Socket for SocketImpl {
    #[instrument(level = "trace")]
    fn new_icmp_socket_ipv4() -> IoResult<Self> {
        Self::new(Domain::IPV4, Protocol::ICMPV4)
    }
    #[instrument(level = "trace")]
    fn new_icmp_socket_ipv6() -> IoResult<Self> {
        Self::new(Domain::IPV6, Protocol::ICMPV6)
    }
    #[instrument(skip(self), level = "trace")]
    fn set_header_included(&mut self, included: bool) -> IoResult<()> {
        self.inner
            .set_header_included_v4(included)
            .map_err(|err| IoError::Other(err, IoOperation::SetHeaderIncluded))
    }
    #[instrument(skip(self), level = "trace")]
    fn set_unicast_hops_v6(&mut self, hops: u8) -> IoResult<()> {
        self.inner
            .set_unicast_hops_v6(u32::from(hops))
            .map_err(|err| IoError::Other(err, IoOperation::SetUnicastHopsV6))
    }
    #[instrument(skip(self), level = "trace")]
    fn set_read_timeout(&mut self, timeout: Duration) -> IoResult<()> {
        self.inner
            .set_read_timeout(Some(timeout))
            .map_err(|err| IoError::Other(err, IoOperation::SetReadTimeout))
    }
    #[instrument(skip(self, buf), level = "trace")]
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> IoResult<()> {
        tracing::trace!(buf = format!("{:02x?}", buf.iter().format(" ")), ?addr);
        self.inner
            .send_to(buf, &SockAddr::from(addr))
            .map_err(|err| IoError::SendTo(err, addr))?;
        Ok(())
    }
    #[instrument(skip(self, buf), level = "trace")]
    fn recv_from(&mut self, buf: &mut [u8]) -> IoResult<(usize, Option<SocketAddr>)> {
        let (bytes_read, addr) = self
            .inner
            .recv_from_into_buf(buf)
            .map_err(|err| IoError::Other(err, IoOperation::RecvFrom))?;
        tracing::trace!(
            buf = format!("{:02x?}", buf[..bytes_read].iter().format(" ")),
            bytes_read,
            ?addr
        );
        Ok((bytes_read, addr))
    }
}

impl From<&io::Error> for ErrorKind {
    fn from(value: &io::Error) -> Self {
        if value.raw_os_error() == io::Error::from(Error::EHOSTUNREACH).raw_os_error() {
            Self::HostUnreachable
        } else if value.raw_os_error() == io::Error::from(Error::ENETUNREACH).raw_os_error() {
            Self::NetUnreachable
        } else {
            Self::Std(value.kind())
        }
    }
}

/// An extension trait to allow `recv_from` method which writes to a `&mut [u8]`.
///
/// This is required for `socket2::Socket` which [does not currently provide] this method.
///
/// [does not currently provide]: https://github.com/rust-lang/socket2/issues/223
trait RecvFrom {
    fn recv_from_into_buf(&self, buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddr>)>;
}

impl RecvFrom for socket2::Socket {
    // Safety: the `recv` implementation promises not to write uninitialised
    // bytes to the `buf`fer, so this casting is safe.
    #![allow(unsafe_code)]
    fn recv_from_into_buf(&self, buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddr>)> {
        let buf = unsafe {
            &mut *(std::ptr::from_mut::<[u8]>(buf) as *mut [std::mem::MaybeUninit<u8>])
        };
        self.recv_from(buf)
            .map(|(size, addr)| (size, addr.as_socket()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Error::EHOSTUNREACH => ErrorKind::HostUnreachable; "host unreachable")]
    #[test_case(Error::ENETUNREACH => ErrorKind::NetUnreachable; "net unreachable")]
    #[test_case(Error::EAGAIN => ErrorKind::Std(io::ErrorKind::WouldBlock); "would block")]
    #[test_case(Error::EPERM => ErrorKind::Std(io::ErrorKind::PermissionDenied); "permission denied")]
    fn test_error_kind(errno: Error) -> ErrorKind {
        ErrorKind::from(&io::Error::from(errno))
    }

    #[test]
    fn test_read_timeout_kinds() {
        assert!(ErrorKind::from(&io::Error::from(Error::EAGAIN)).is_timeout());
        assert!(!ErrorKind::from(&io::Error::from(Error::EPERM)).is_timeout());
    }
}
