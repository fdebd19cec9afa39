use crate::error::IoResult as Result;
use std::net::SocketAddr;
use std::time::Duration;

/// A socket able to send and receive ICMP messages.
#[cfg_attr(test, mockall::automock)]
pub trait Socket
where
    Self: Sized,
{
    /// Create a raw IPv4 socket for ICMP echo probes.
    fn new_icmp_socket_ipv4() -> Result<Self>;
    /// Create a raw IPv6 socket for ICMPv6 echo probes.
    fn new_icmp_socket_ipv6() -> Result<Self>;
    fn set_header_included(&mut self, included: bool) -> Result<()>;
    fn set_unicast_hops_v6(&mut self, hops: u8) -> Result<()>;
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()>;
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> Result<()>;
    fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, Option<SocketAddr>)>;
}
