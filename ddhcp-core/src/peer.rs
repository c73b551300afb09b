//! Peer bridge (C7): when a REQUEST targets a block owned by another daemon,
//! the request is relayed over RENEWLEASE/RENEWACK/RENEWNAK rather than
//! answered locally, and the original client-facing reply is parked until
//! the owner responds or the park times out.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use tracing::{debug, warn};

use crate::block::{BlockPlane, BlockTable, PeerId};
use crate::packet::DhcpPacket;
use crate::router::{self, AddressLocation};

/// A client REQUEST parked while its answer is being fetched from a peer.
/// The full original packet is kept so the eventual RENEWACK/RENEWNAK can be
/// turned back into a reply to the actual client.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub block_index: u32,
    pub owner: PeerId,
    pub address: Ipv4Addr,
    pub request: DhcpPacket,
    pub deadline: u64,
}

/// Requests in flight to a peer, keyed by the same `(xid, chaddr)` pair the
/// client and the peer's reply both carry.
#[derive(Debug, Default)]
pub struct PendingCache {
    entries: HashMap<(u32, [u8; 16]), PendingRequest>,
}

impl PendingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, request: PendingRequest) {
        self.entries.insert((request.request.xid, request.request.chaddr), request);
    }

    pub fn take(&mut self, xid: u32, chaddr: [u8; 16]) -> Option<PendingRequest> {
        self.entries.remove(&(xid, chaddr))
    }

    /// Removes and returns every entry whose deadline has passed.
    pub fn expire(&mut self, now: u64) -> Vec<PendingRequest> {
        let expired: Vec<(u32, [u8; 16])> =
            self.entries.iter().filter(|(_, r)| r.deadline < now).map(|(k, _)| *k).collect();
        expired.into_iter().filter_map(|k| self.entries.remove(&k)).collect()
    }
}

const RENEW_PAYLOAD_LEN: usize = 16 + 4 + 4 + 4;
const NAK_PAYLOAD_LEN: usize = 16 + 4;

/// Forwarded REQUEST, sent from the daemon that received the client's
/// packet to the block's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewLease {
    pub chaddr: [u8; 16],
    pub address: Ipv4Addr,
    pub xid: u32,
}

impl RenewLease {
    pub fn to_bytes(&self) -> [u8; RENEW_PAYLOAD_LEN] {
        let mut buf = [0u8; RENEW_PAYLOAD_LEN];
        buf[0..16].copy_from_slice(&self.chaddr);
        buf[16..20].copy_from_slice(&self.address.octets());
        buf[20..24].copy_from_slice(&self.xid.to_be_bytes());
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < RENEW_PAYLOAD_LEN {
            return None;
        }
        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[0..16]);
        let address = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
        let xid = u32::from_be_bytes(data[20..24].try_into().unwrap());
        Some(Self { chaddr, address, xid })
    }
}

/// The owner's confirmation, echoing the granted lease time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewAck {
    pub chaddr: [u8; 16],
    pub address: Ipv4Addr,
    pub xid: u32,
    pub lease_seconds: u32,
}

impl RenewAck {
    pub fn to_bytes(&self) -> [u8; RENEW_PAYLOAD_LEN] {
        let mut buf = [0u8; RENEW_PAYLOAD_LEN];
        buf[0..16].copy_from_slice(&self.chaddr);
        buf[16..20].copy_from_slice(&self.address.octets());
        buf[20..24].copy_from_slice(&self.xid.to_be_bytes());
        buf[24..28].copy_from_slice(&self.lease_seconds.to_be_bytes());
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < RENEW_PAYLOAD_LEN {
            return None;
        }
        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[0..16]);
        let address = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
        let xid = u32::from_be_bytes(data[20..24].try_into().unwrap());
        let lease_seconds = u32::from_be_bytes(data[24..28].try_into().unwrap());
        Some(Self { chaddr, address, xid, lease_seconds })
    }
}

/// The owner's refusal (address already taken by someone else, or no
/// longer ours by the time the request arrived).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewNak {
    pub chaddr: [u8; 16],
    pub xid: u32,
}

impl RenewNak {
    pub fn to_bytes(&self) -> [u8; NAK_PAYLOAD_LEN] {
        let mut buf = [0u8; NAK_PAYLOAD_LEN];
        buf[0..16].copy_from_slice(&self.chaddr);
        buf[16..20].copy_from_slice(&self.xid.to_be_bytes());
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < NAK_PAYLOAD_LEN {
            return None;
        }
        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[0..16]);
        let xid = u32::from_be_bytes(data[16..20].try_into().unwrap());
        Some(Self { chaddr, xid })
    }
}

/// Originator side: materializes a transient OFFERED lease on the peer's
/// block (so a concurrent local scan doesn't double-allocate it), parks the
/// request, and returns the RENEWLEASE message to send.
pub fn begin_forward<P: BlockPlane>(
    blocks: &mut BlockTable<P>,
    pending: &mut PendingCache,
    block_index: u32,
    owner: PeerId,
    address: Ipv4Addr,
    request: DhcpPacket,
    now: u64,
    t_offer: u64,
    pending_ttl: u64,
) -> RenewLease {
    let subnet = blocks.subnet(block_index);
    let lease_index = u32::from(address).wrapping_sub(u32::from(subnet));
    blocks.leases_mut(block_index).get_mut(lease_index).offer(request.chaddr, request.xid, now, t_offer);

    let msg = RenewLease { chaddr: request.chaddr, address, xid: request.xid };
    debug!(block_index, %address, owner = %owner, "forwarding request to block owner");
    pending.insert(PendingRequest { block_index, owner, address, request, deadline: now + pending_ttl });
    msg
}

/// Owner side: processes an inbound RENEWLEASE the same way a local REQUEST
/// for that address would be processed, and answers with RENEWACK or
/// RENEWNAK.
pub fn handle_renew_lease<P: BlockPlane>(
    blocks: &mut BlockTable<P>,
    prefix: Ipv4Addr,
    block_size: u32,
    msg: &RenewLease,
    now: u64,
    t_lease: u64,
    t_delta: u64,
) -> Result<RenewAck, RenewNak> {
    match router::locate(blocks, msg.address, prefix, block_size) {
        AddressLocation::Ours { block_index, lease_index } => {
            let table = blocks.leases_mut(block_index);
            let lease = table.get_mut(lease_index);
            if lease.state == crate::lease::LeaseState::Free || lease.matches_client(&msg.chaddr) {
                lease.confirm(msg.chaddr, msg.xid, now, t_lease, t_delta);
                Ok(RenewAck { chaddr: msg.chaddr, address: msg.address, xid: msg.xid, lease_seconds: t_lease as u32 })
            } else {
                Err(RenewNak { chaddr: msg.chaddr, xid: msg.xid })
            }
        }
        AddressLocation::Foreign { .. } | AddressLocation::OutOfPool => {
            warn!(address = %msg.address, "RENEWLEASE for an address we no longer own");
            Err(RenewNak { chaddr: msg.chaddr, xid: msg.xid })
        }
    }
}

/// Originator side: resolves a RENEWACK against the pending cache, handing
/// back the original client packet plus the granted lease seconds so the
/// caller can build and send the client-facing ACK.
pub fn resolve_ack(pending: &mut PendingCache, ack: &RenewAck) -> Option<(DhcpPacket, Ipv4Addr, u32)> {
    let request = pending.take(ack.xid, ack.chaddr)?;
    Some((request.request, ack.address, ack.lease_seconds))
}

/// Originator side: resolves a RENEWNAK, releasing the transient offer we
/// made on the peer's block while the request was in flight, and handing
/// back the original client packet so the caller can build the NAK.
pub fn resolve_nak<P: BlockPlane>(blocks: &mut BlockTable<P>, pending: &mut PendingCache, nak: &RenewNak) -> Option<DhcpPacket> {
    let pending_request = pending.take(nak.xid, nak.chaddr)?;
    let subnet = blocks.subnet(pending_request.block_index);
    let lease_index = u32::from(pending_request.address).wrapping_sub(u32::from(subnet));
    blocks.leases_mut(pending_request.block_index).release(lease_index);
    Some(pending_request.request)
}

/// Clears parked requests that never got an answer in time, releasing their
/// transient offers so the address isn't held forever.
pub fn expire_timeouts<P: BlockPlane>(blocks: &mut BlockTable<P>, pending: &mut PendingCache, now: u64) {
    for request in pending.expire(now) {
        warn!(address = %request.address, owner = %request.owner, "peer did not answer RENEWLEASE in time");
        let subnet = blocks.subnet(request.block_index);
        let lease_index = u32::from(request.address).wrapping_sub(u32::from(subnet));
        blocks.leases_mut(request.block_index).release(lease_index);
    }
}
