//! Encoding of ICMP echo requests and decoding of the replies they provoke.
//!
//! Outgoing IPv4 headers leave the source address and header checksum zeroed
//! for the kernel to fill in.

use pnet_packet::icmp::destination_unreachable::DestinationUnreachablePacket;
use pnet_packet::icmp::echo_reply::EchoReplyPacket;
use pnet_packet::icmp::echo_request::{EchoRequestPacket, MutableEchoRequestPacket};
use pnet_packet::icmp::time_exceeded::TimeExceededPacket;
use pnet_packet::icmp::{self, echo_request, IcmpPacket, IcmpTypes};
use pnet_packet::icmpv6::{self, Icmpv6Code, Icmpv6Packet, Icmpv6Types};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::{Ipv4Flags, Ipv4Packet, MutableIpv4Packet};
use pnet_packet::ipv6::Ipv6Packet;
use pnet_packet::Packet;
use std::net::Ipv4Addr;

const IPV4_HEADER_LEN: usize = 20;
const ICMP_HEADER_LEN: usize = 8;

/// ICMPv6 error messages carry 4 unused bytes before the invoking packet.
const ICMPV6_ERROR_UNUSED_LEN: usize = 4;

/// The kind of ICMP message received in response to an echo request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpKind {
    EchoReply,
    TimeExceeded,
    DestinationUnreachable,
}

/// A decoded response, carrying the identifier and sequence of the echo
/// request which provoked it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpResponse {
    pub kind: IcmpKind,
    pub identifier: u16,
    pub sequence: u16,
}

/// An ICMP echo request with a zeroed payload of `payload_size` bytes.
pub fn echo_request_v4(identifier: u16, sequence: u16, payload_size: u16) -> Option<Vec<u8>> {
    let mut buf = vec![0_u8; ICMP_HEADER_LEN + usize::from(payload_size)];
    let mut echo = MutableEchoRequestPacket::new(&mut buf)?;
    echo.set_icmp_type(IcmpTypes::EchoRequest);
    echo.set_icmp_code(echo_request::IcmpCodes::NoCode);
    echo.set_identifier(identifier);
    echo.set_sequence_number(sequence);
    let checksum = icmp::checksum(&IcmpPacket::new(echo.packet())?);
    echo.set_checksum(checksum);
    Some(buf)
}

/// An ICMPv6 echo request; the kernel computes the checksum over the
/// pseudo-header for raw ICMPv6 sockets.
pub fn echo_request_v6(identifier: u16, sequence: u16, payload_size: u16) -> Option<Vec<u8>> {
    let mut buf = vec![0_u8; ICMP_HEADER_LEN + usize::from(payload_size)];
    let mut echo = icmpv6::echo_request::MutableEchoRequestPacket::new(&mut buf)?;
    echo.set_icmpv6_type(Icmpv6Types::EchoRequest);
    echo.set_icmpv6_code(Icmpv6Code::new(0));
    echo.set_identifier(identifier);
    echo.set_sequence_number(sequence);
    Some(buf)
}

/// Wrap an ICMP message in an IPv4 header with the given ttl and flags.
///
/// Returns `None` if the datagram would exceed the IPv4 length limit.
pub fn ipv4_datagram(
    dest: Ipv4Addr,
    ttl: u8,
    dont_fragment: bool,
    identification: u16,
    icmp: &[u8],
) -> Option<Vec<u8>> {
    let total_length = u16::try_from(IPV4_HEADER_LEN + icmp.len()).ok()?;
    let mut buf = vec![0_u8; usize::from(total_length)];
    let mut ipv4 = MutableIpv4Packet::new(&mut buf)?;
    ipv4.set_version(4);
    ipv4.set_header_length(5);
    ipv4.set_total_length(total_length);
    ipv4.set_identification(identification);
    if dont_fragment {
        ipv4.set_flags(Ipv4Flags::DontFragment);
    }
    ipv4.set_ttl(ttl);
    ipv4.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
    ipv4.set_destination(dest);
    ipv4.set_payload(icmp);
    Some(buf)
}

/// Decode an IPv4 datagram, as read from a raw ICMP socket.
pub fn parse_ipv4(buf: &[u8]) -> Option<IcmpResponse> {
    let ipv4 = icmp_in_ipv4(buf)?;
    let icmp = IcmpPacket::new(ipv4.payload())?;
    match icmp.get_icmp_type() {
        IcmpTypes::EchoReply => {
            let echo = EchoReplyPacket::new(icmp.packet())?;
            Some(IcmpResponse {
                kind: IcmpKind::EchoReply,
                identifier: echo.get_identifier(),
                sequence: echo.get_sequence_number(),
            })
        }
        IcmpTypes::TimeExceeded => {
            let packet = TimeExceededPacket::new(icmp.packet())?;
            nested_echo_v4(packet.payload(), IcmpKind::TimeExceeded)
        }
        IcmpTypes::DestinationUnreachable => {
            let packet = DestinationUnreachablePacket::new(icmp.packet())?;
            nested_echo_v4(packet.payload(), IcmpKind::DestinationUnreachable)
        }
        _ => None,
    }
}

/// Decode an ICMPv6 message, as read from a raw ICMPv6 socket (which strips
/// the outer IPv6 header).
pub fn parse_ipv6(buf: &[u8]) -> Option<IcmpResponse> {
    let icmp = Icmpv6Packet::new(buf)?;
    match icmp.get_icmpv6_type() {
        Icmpv6Types::EchoReply => {
            let echo = icmpv6::echo_reply::EchoReplyPacket::new(icmp.packet())?;
            Some(IcmpResponse {
                kind: IcmpKind::EchoReply,
                identifier: echo.get_identifier(),
                sequence: echo.get_sequence_number(),
            })
        }
        Icmpv6Types::TimeExceeded => nested_echo_v6(icmp.payload(), IcmpKind::TimeExceeded),
        Icmpv6Types::DestinationUnreachable => {
            nested_echo_v6(icmp.payload(), IcmpKind::DestinationUnreachable)
        }
        _ => None,
    }
}

/// An IPv4 packet carrying ICMP with a well-formed header.
fn icmp_in_ipv4(buf: &[u8]) -> Option<Ipv4Packet<'_>> {
    let ipv4 = Ipv4Packet::new(buf)?;
    let header_len = usize::from(ipv4.get_header_length()) * 4;
    let valid = ipv4.get_version() == 4
        && header_len >= IPV4_HEADER_LEN
        && header_len <= buf.len()
        && ipv4.get_next_level_protocol() == IpNextHeaderProtocols::Icmp;
    valid.then_some(ipv4)
}

/// The echo request quoted in the payload of an ICMP error.
fn nested_echo_v4(payload: &[u8], kind: IcmpKind) -> Option<IcmpResponse> {
    let ipv4 = icmp_in_ipv4(payload)?;
    let echo = EchoRequestPacket::new(ipv4.payload())?;
    (echo.get_icmp_type() == IcmpTypes::EchoRequest).then(|| IcmpResponse {
        kind,
        identifier: echo.get_identifier(),
        sequence: echo.get_sequence_number(),
    })
}

/// The echo request quoted in the payload of an ICMPv6 error.
fn nested_echo_v6(payload: &[u8], kind: IcmpKind) -> Option<IcmpResponse> {
    let ipv6 = Ipv6Packet::new(payload.get(ICMPV6_ERROR_UNUSED_LEN..)?)?;
    if ipv6.get_version() != 6 || ipv6.get_next_header() != IpNextHeaderProtocols::Icmpv6 {
        return None;
    }
    let echo = icmpv6::echo_request::EchoRequestPacket::new(ipv6.payload())?;
    (echo.get_icmpv6_type() == Icmpv6Types::EchoRequest).then(|| IcmpResponse {
        kind,
        identifier: echo.get_identifier(),
        sequence: echo.get_sequence_number(),
    })
}
