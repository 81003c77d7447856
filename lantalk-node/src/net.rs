//! Socket setup and local address lookup.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Receive buffer; larger than any valid frame so oversized datagrams are seen whole and dropped.
pub const RECV_BUFFER_LEN: usize = 4096;

/// Bind the protocol socket with address reuse and broadcast enabled.
pub fn bind_protocol_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

/// Outward-facing IPv4 address: the source address the OS would route towards a public host.
/// No packet is sent. Falls back to loopback when there is no route.
pub fn outward_ip() -> IpAddr {
    let route_lookup = || -> io::Result<IpAddr> {
        let s = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        s.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        Ok(s.local_addr()?.ip())
    };
    route_lookup().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
