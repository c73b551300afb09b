//! `ddhcpd`: one partition of a distributed DHCP pool.
//!
//! A single tokio task multiplexes the DHCP socket, the cluster socket used
//! to bridge requests to a peer's block, and a periodic tick that expires
//! leases and parked peer requests. The core logic in `ddhcp_core` does no
//! I/O of its own; everything here is the thin async shell around it.

mod cluster;
mod config;
mod socket;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use ddhcp_core::{packet, peer, reply, router};
use ddhcp_core::{BlockTable, DhcpPacket, OptionStore, PendingCache, RouterAction, StaticBlockPlane};
use tokio::net::UdpSocket;
use tokio::time;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn init_tracing(filter: &str) {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(filter)).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::DaemonConfig::load().context("loading daemon configuration")?;
    init_tracing(&config.log_filter);

    let num_blocks = config.pool.number_of_blocks().context("deriving block count from pool geometry")?;
    let pool_size = config.pool.pool_size() as u32;

    // A single daemon instance claims the whole pool by default. A real
    // multi-daemon deployment assigns claims through its own block plane;
    // see `ddhcp_core::BlockPlane`.
    let mut plane = StaticBlockPlane::new(num_blocks, config.pool.block_size, pool_size);
    for index in 0..num_blocks {
        plane.claim(index).expect("index within computed block count");
    }

    let mut blocks = BlockTable::new(plane, config.pool.prefix, config.pool.block_size);
    let mut store = OptionStore::with_pool_defaults(config.pool.prefix, config.pool.prefix_len);
    config.pool.apply_overrides(&mut store).context("applying configured DHCP option overrides")?;
    let mut pending = PendingCache::new();

    let dhcp_socket = socket::bind_dhcp_socket(config.dhcp_port, config.pool.interface.as_deref())?;
    let cluster_socket = socket::bind_cluster_socket(config.cluster_port)?;

    info!(
        blocks = num_blocks,
        prefix = %config.pool.prefix,
        prefix_len = config.pool.prefix_len,
        dhcp_port = config.dhcp_port,
        cluster_port = config.cluster_port,
        "ddhcpd ready"
    );

    let mut tick = time::interval(Duration::from_secs(1));
    let mut dhcp_buf = [0u8; 1500];
    let mut cluster_buf = [0u8; 1500];

    loop {
        tokio::select! {
            received = dhcp_socket.recv_from(&mut dhcp_buf) => {
                match received {
                    Ok((len, _from)) => {
                        if let Err(err) = handle_dhcp_datagram(
                            &dhcp_buf[..len],
                            &dhcp_socket,
                            &cluster_socket,
                            &mut blocks,
                            &config,
                            &store,
                            &mut pending,
                        ).await {
                            warn!(%err, "failed to handle inbound DHCP packet");
                        }
                    }
                    Err(err) => warn!(%err, "error receiving on DHCP socket"),
                }
            }
            received = cluster_socket.recv_from(&mut cluster_buf) => {
                match received {
                    Ok((len, from)) => {
                        if let Err(err) = handle_cluster_datagram(
                            &cluster_buf[..len],
                            from,
                            &dhcp_socket,
                            &cluster_socket,
                            &mut blocks,
                            &mut pending,
                            &store,
                            &config,
                        ).await {
                            warn!(%err, "failed to handle inbound cluster message");
                        }
                    }
                    Err(err) => warn!(%err, "error receiving on cluster socket"),
                }
            }
            _ = tick.tick() => {
                let now = now_secs();
                blocks.check_timeouts(now);
                peer::expire_timeouts(&mut blocks, &mut pending, now);
            }
        }
    }
}

async fn handle_dhcp_datagram(
    data: &[u8],
    dhcp_socket: &UdpSocket,
    cluster_socket: &UdpSocket,
    blocks: &mut BlockTable<StaticBlockPlane>,
    config: &config::DaemonConfig,
    store: &OptionStore,
    pending: &mut PendingCache,
) -> Result<()> {
    let request = DhcpPacket::parse(data).context("parsing DHCP packet")?;
    let pool = &config.pool;
    let now = now_secs();

    let mac: Vec<String> = request.mac_bytes().iter().map(|b| format!("{b:02x}")).collect();
    debug!(xid = request.xid, mac = %mac.join(":"), message_type = ?request.message_type(), "handling DHCP packet");

    let action = match request.message_type() {
        Some(packet::DHCPDISCOVER) => {
            router::handle_discover(blocks, pool.prefix, pool.block_size, request.chaddr, request.xid, now, pool.t_offer)
        }
        Some(packet::DHCPREQUEST) => router::handle_request(
            blocks,
            pool.prefix,
            pool.block_size,
            request.requested_ip(),
            request.ciaddr,
            request.chaddr,
            request.xid,
            now,
            pool.t_lease,
            pool.t_delta,
        ),
        Some(packet::DHCPRELEASE) => {
            router::handle_release(blocks, pool.prefix, pool.block_size, request.ciaddr, request.chaddr)
        }
        _ => RouterAction::Drop,
    };

    match action {
        RouterAction::Offer { address } => {
            let reply = reply::build_offer(&request, address, pool.t_lease as u32, store);
            send_reply(dhcp_socket, &reply, &request, false).await?;
        }
        RouterAction::Ack { address } => {
            let reply = reply::build_ack(&request, address, pool.t_lease as u32, store);
            send_reply(dhcp_socket, &reply, &request, false).await?;
        }
        RouterAction::Nak => {
            let reply = reply::build_nak(&request);
            send_reply(dhcp_socket, &reply, &request, true).await?;
        }
        RouterAction::Forward { block_index, owner } => {
            let address = request.requested_ip().unwrap_or(request.ciaddr);
            let msg = peer::begin_forward(blocks, pending, block_index, owner, address, request, now, pool.t_offer, pool.pending_ttl);
            let dest = SocketAddr::new(IpAddr::V6(owner), config.cluster_port);
            cluster_socket
                .send_to(&cluster::ClusterMessage::RenewLease(msg).encode(), dest)
                .await
                .context("forwarding RENEWLEASE to block owner")?;
        }
        RouterAction::Drop => {}
    }

    Ok(())
}

async fn handle_cluster_datagram(
    data: &[u8],
    from: SocketAddr,
    dhcp_socket: &UdpSocket,
    cluster_socket: &UdpSocket,
    blocks: &mut BlockTable<StaticBlockPlane>,
    pending: &mut PendingCache,
    store: &OptionStore,
    config: &config::DaemonConfig,
) -> Result<()> {
    let Some(message) = cluster::ClusterMessage::decode(data) else {
        anyhow::bail!("malformed cluster message from {from}");
    };
    let pool = &config.pool;
    let now = now_secs();

    match message {
        cluster::ClusterMessage::RenewLease(msg) => {
            let outcome = peer::handle_renew_lease(blocks, pool.prefix, pool.block_size, &msg, now, pool.t_lease, pool.t_delta);
            let encoded = match outcome {
                Ok(ack) => cluster::ClusterMessage::RenewAck(ack).encode(),
                Err(nak) => cluster::ClusterMessage::RenewNak(nak).encode(),
            };
            cluster_socket.send_to(&encoded, from).await.context("replying to RENEWLEASE")?;
        }
        cluster::ClusterMessage::RenewAck(ack) => {
            if let Some((request, address, lease_seconds)) = peer::resolve_ack(pending, &ack) {
                let reply = reply::build_ack(&request, address, lease_seconds, store);
                send_reply(dhcp_socket, &reply, &request, false).await?;
            }
        }
        cluster::ClusterMessage::RenewNak(nak) => {
            if let Some(request) = peer::resolve_nak(blocks, pending, &nak) {
                let reply = reply::build_nak(&request);
                send_reply(dhcp_socket, &reply, &request, true).await?;
            }
        }
    }

    Ok(())
}

/// Broadcasts when the reply is a NAK, the client's broadcast flag is set,
/// or the client has no address yet to be unicast to; otherwise unicasts to
/// the address just granted.
async fn send_reply(socket: &UdpSocket, reply: &DhcpPacket, request: &DhcpPacket, is_nak: bool) -> Result<()> {
    let broadcast = is_nak || (request.flags & 0x8000) != 0 || request.ciaddr == Ipv4Addr::UNSPECIFIED;
    let dest_ip = if broadcast { Ipv4Addr::BROADCAST } else { reply.yiaddr };
    let dest = SocketAddr::new(IpAddr::V4(dest_ip), 68);
    socket.send_to(&reply.to_bytes(), dest).await.context("sending DHCP reply")?;
    Ok(())
}
