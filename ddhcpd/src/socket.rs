//! Raw socket setup. DHCP needs a broadcast-capable IPv4 socket bound to
//! port 67; the cluster bridge uses a plain IPv6 UDP socket for
//! RENEWLEASE/RENEWACK/RENEWNAK.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;

pub fn bind_dhcp_socket(port: u16, interface: Option<&str>) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None).context("creating DHCP socket")?;
    socket.set_reuse_address(true).context("setting SO_REUSEADDR on DHCP socket")?;
    socket.set_broadcast(true).context("setting SO_BROADCAST on DHCP socket")?;

    #[cfg(target_os = "linux")]
    if let Some(iface) = interface {
        socket
            .bind_device(Some(iface.as_bytes()))
            .with_context(|| format!("binding DHCP socket to device {iface}"))?;
    }
    #[cfg(not(target_os = "linux"))]
    let _ = interface;

    let addr: SocketAddr = format!("0.0.0.0:{port}").parse().expect("valid wildcard address");
    socket.bind(&addr.into()).with_context(|| format!("binding DHCP socket to {addr}"))?;
    socket.set_nonblocking(true).context("setting DHCP socket non-blocking")?;

    UdpSocket::from_std(socket.into()).context("handing DHCP socket to tokio")
}

pub fn bind_cluster_socket(port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, None).context("creating cluster socket")?;
    socket.set_reuse_address(true).context("setting SO_REUSEADDR on cluster socket")?;
    socket.set_only_v6(true).context("restricting cluster socket to IPv6")?;

    let addr: SocketAddr = format!("[::]:{port}").parse().expect("valid wildcard address");
    socket.bind(&addr.into()).with_context(|| format!("binding cluster socket to {addr}"))?;
    socket.set_nonblocking(true).context("setting cluster socket non-blocking")?;

    UdpSocket::from_std(socket.into()).context("handing cluster socket to tokio")
}
