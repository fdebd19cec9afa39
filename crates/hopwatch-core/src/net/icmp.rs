use crate::error::{ErrorKind, IoError, IoResult};
use crate::net::packet::{self, IcmpKind};
use crate::net::platform::SocketImpl;
use crate::net::socket::Socket;
use crate::probe::{ProbeReply, ProbeRequest, ProbeSender, ProbeStatus};
use std::io;
use std::marker::PhantomData;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Instant;
use tracing::instrument;

/// The maximum size of a received datagram.
const MAX_PACKET_SIZE: usize = 1024;

/// Sends ICMP echo requests over raw sockets.
///
/// Every probe opens its own socket, which is closed when the probe
/// completes.  Replies are matched to the probe by echo identifier (the
/// process id) and a per-sender sequence number.
pub struct IcmpProbeSender<S = SocketImpl> {
    identifier: u16,
    sequence: AtomicU16,
    socket: PhantomData<fn() -> S>,
}

impl IcmpProbeSender {
    #[must_use]
    pub fn new() -> Self {
        Self::with_identifier(std::process::id() as u16)
    }
}

impl Default for IcmpProbeSender {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Socket> IcmpProbeSender<S> {
    #[must_use]
    pub fn with_identifier(identifier: u16) -> Self {
        Self {
            identifier,
            sequence: AtomicU16::new(0),
            socket: PhantomData,
        }
    }

    #[instrument(skip(self, start), level = "trace")]
    fn probe(&self, request: &ProbeRequest, start: Instant) -> IoResult<ProbeReply> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut socket = self.dispatch(request, sequence)?;
        let deadline = start + request.timeout;
        let mut buf = [0_u8; MAX_PACKET_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(ProbeReply::timed_out(start.elapsed()));
            }
            socket.set_read_timeout(remaining)?;
            let (bytes_read, from) = match socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(err) if err.kind().is_timeout() => {
                    return Ok(ProbeReply::timed_out(start.elapsed()))
                }
                Err(err) => return Err(err),
            };
            let response = match request.target {
                IpAddr::V4(_) => packet::parse_ipv4(&buf[..bytes_read]),
                IpAddr::V6(_) => packet::parse_ipv6(&buf[..bytes_read]),
            };
            let Some(response) = response
                .filter(|resp| resp.identifier == self.identifier && resp.sequence == sequence)
            else {
                continue;
            };
            let elapsed = start.elapsed();
            let addr = from.map(|addr| addr.ip());
            tracing::trace!(?response, ?addr, ?elapsed);
            return Ok(match response.kind {
                IcmpKind::EchoReply => ProbeReply::new(addr, ProbeStatus::Success, elapsed),
                IcmpKind::TimeExceeded => ProbeReply::new(addr, ProbeStatus::TtlExpired, elapsed),
                IcmpKind::DestinationUnreachable => ProbeReply::failed(elapsed),
            });
        }
    }

    fn dispatch(&self, request: &ProbeRequest, sequence: u16) -> IoResult<S> {
        let dest = SocketAddr::new(request.target, 0);
        match request.target {
            IpAddr::V4(target) => {
                let mut socket = S::new_icmp_socket_ipv4()?;
                socket.set_header_included(true)?;
                let datagram =
                    packet::echo_request_v4(self.identifier, sequence, request.payload_size.0)
                        .and_then(|echo| {
                            packet::ipv4_datagram(
                                target,
                                request.ttl.0,
                                request.dont_fragment,
                                sequence,
                                &echo,
                            )
                        })
                        .ok_or_else(|| malformed(dest))?;
                socket.send_to(&datagram, dest)?;
                Ok(socket)
            }
            IpAddr::V6(_) => {
                let mut socket = S::new_icmp_socket_ipv6()?;
                socket.set_unicast_hops_v6(request.ttl.0)?;
                let echo =
                    packet::echo_request_v6(self.identifier, sequence, request.payload_size.0)
                        .ok_or_else(|| malformed(dest))?;
                socket.send_to(&echo, dest)?;
                Ok(socket)
            }
        }
    }
}

fn malformed(dest: SocketAddr) -> IoError {
    IoError::SendTo(
        io::Error::new(io::ErrorKind::InvalidInput, "failed to build datagram"),
        dest,
    )
}

impl<S: Socket> ProbeSender for IcmpProbeSender<S> {
    fn send(&self, request: &ProbeRequest) -> ProbeReply {
        let start = Instant::now();
        match self.probe(request, start) {
            Ok(reply) => reply,
            Err(err) => {
                match err.kind() {
                    ErrorKind::HostUnreachable | ErrorKind::NetUnreachable => {
                        tracing::debug!(addr = %request.target, ttl = request.ttl.0, %err, "probe unreachable");
                    }
                    ErrorKind::Std(_) => {
                        tracing::warn!(addr = %request.target, ttl = request.ttl.0, %err, "probe failed");
                    }
                }
                ProbeReply::failed(start.elapsed())
            }
        }
    }
}
