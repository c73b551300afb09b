//! DHCP request routing (C6): maps an inbound DISCOVER/REQUEST/RELEASE to the
//! block that must serve it and drives that block's lease state machine.

use std::net::Ipv4Addr;

use tracing::{debug, warn};

use crate::addr;
use crate::block::{BlockPlane, BlockState, BlockTable, PeerId};

/// Where an address resolves to, replacing the original implementation's
/// overloaded 0/1/2 integer return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressLocation {
    Ours { block_index: u32, lease_index: u32 },
    Foreign { block_index: u32, owner: PeerId },
    OutOfPool,
}

/// What the caller (the daemon event loop, via `reply`/`peer`) must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterAction {
    Offer { address: Ipv4Addr },
    Ack { address: Ipv4Addr },
    Nak,
    Forward { block_index: u32, owner: PeerId },
    Drop,
}

/// Resolves `addr` against the pool geometry and current block ownership.
/// A block with no current owner (`Free`/`Claiming`) is treated the same as
/// out-of-pool: there is no authority to answer for it yet.
pub fn locate<P: BlockPlane>(blocks: &BlockTable<P>, addr: Ipv4Addr, prefix: Ipv4Addr, block_size: u32) -> AddressLocation {
    let Some(coords) = addr::resolve(addr, prefix, block_size, blocks.num_blocks()) else {
        return AddressLocation::OutOfPool;
    };

    match blocks.state(coords.block_index) {
        BlockState::Ours => AddressLocation::Ours { block_index: coords.block_index, lease_index: coords.lease_index },
        BlockState::ClaimedByPeer => {
            let owner = blocks
                .owner(coords.block_index)
                .expect("a ClaimedByPeer block always carries an owner");
            AddressLocation::Foreign { block_index: coords.block_index, owner }
        }
        BlockState::Free | BlockState::Claiming => AddressLocation::OutOfPool,
    }
}

/// Picks the block to serve a DISCOVER from: among our blocks with at least
/// one free address, the one with the *smallest* positive free count. This
/// packs usage into already-busy blocks, leaving emptier ones available for
/// a future release back to the pool — at the cost of worse fragmentation
/// behavior under bursty churn.
pub fn handle_discover<P: BlockPlane>(
    blocks: &mut BlockTable<P>,
    prefix: Ipv4Addr,
    block_size: u32,
    chaddr: [u8; 16],
    xid: u32,
    now: u64,
    t_offer: u64,
) -> RouterAction {
    let candidates: Vec<u32> = blocks.ours().collect();

    let mut best: Option<(u32, u32)> = None;
    for index in candidates {
        let free = blocks.leases_mut(index).num_free();
        if free == 0 {
            continue;
        }
        if best.map(|(_, best_free)| free < best_free).unwrap_or(true) {
            best = Some((index, free));
        }
    }

    let Some((block_index, _)) = best else {
        warn!("no free address available across owned blocks, dropping DISCOVER");
        return RouterAction::Drop;
    };

    let table = blocks.leases_mut(block_index);
    let lease_index = table.first_free();
    table.get_mut(lease_index).offer(chaddr, xid, now, t_offer);

    let address = addr::address_at(blocks.subnet(block_index), lease_index);
    debug!(block_index, lease_index, %address, "offering address");
    RouterAction::Offer { address }
}

/// Finds the address a REQUEST targets, in the priority order the protocol
/// specifies: the explicit requested-address option, then `ciaddr` for a
/// renewing client, then a scan of our own blocks for an OFFERED lease whose
/// `(xid, chaddr)` matches (the case of a client that lost its OFFER's
/// address before sending REQUEST).
fn requested_address<P: BlockPlane>(
    blocks: &BlockTable<P>,
    requested_ip: Option<Ipv4Addr>,
    ciaddr: Ipv4Addr,
    chaddr: &[u8; 16],
    xid: u32,
) -> Option<Ipv4Addr> {
    if let Some(ip) = requested_ip {
        return Some(ip);
    }
    if ciaddr != Ipv4Addr::UNSPECIFIED {
        return Some(ciaddr);
    }
    for block_index in blocks.ours() {
        if let Some(table) = blocks.leases(block_index) {
            for lease_index in 0..table.len() {
                let lease = table.get(lease_index);
                if lease.state == crate::lease::LeaseState::Offered && lease.xid == xid && lease.matches_client(chaddr) {
                    return Some(addr::address_at(blocks.subnet(block_index), lease_index));
                }
            }
        }
    }
    None
}

pub fn handle_request<P: BlockPlane>(
    blocks: &mut BlockTable<P>,
    prefix: Ipv4Addr,
    block_size: u32,
    requested_ip: Option<Ipv4Addr>,
    ciaddr: Ipv4Addr,
    chaddr: [u8; 16],
    xid: u32,
    now: u64,
    t_lease: u64,
    t_delta: u64,
) -> RouterAction {
    let Some(target) = requested_address(blocks, requested_ip, ciaddr, &chaddr, xid) else {
        warn!("REQUEST carries no resolvable address and matches no OFFERED lease, NAK");
        return RouterAction::Nak;
    };

    match locate(blocks, target, prefix, block_size) {
        AddressLocation::Ours { block_index, lease_index } => {
            let table = blocks.leases_mut(block_index);
            let lease = table.get_mut(lease_index);
            if lease.state == crate::lease::LeaseState::Free || lease.matches_client(&chaddr) {
                lease.confirm(chaddr, xid, now, t_lease, t_delta);
                RouterAction::Ack { address: target }
            } else {
                warn!(%target, "REQUEST for an address leased to a different client, NAK");
                RouterAction::Nak
            }
        }
        AddressLocation::Foreign { block_index, owner } => {
            debug!(%target, block_index, "REQUEST targets a peer's block, forwarding");
            RouterAction::Forward { block_index, owner }
        }
        AddressLocation::OutOfPool => {
            warn!(%target, "REQUEST for an address outside any owned or claimed block, NAK");
            RouterAction::Nak
        }
    }
}

pub fn handle_release<P: BlockPlane>(
    blocks: &mut BlockTable<P>,
    prefix: Ipv4Addr,
    block_size: u32,
    address: Ipv4Addr,
    chaddr: [u8; 16],
) -> RouterAction {
    match locate(blocks, address, prefix, block_size) {
        AddressLocation::Ours { block_index, lease_index } => {
            let table = blocks.leases_mut(block_index);
            let lease = table.get_mut(lease_index);
            if lease.matches_client(&chaddr) {
                table.release(lease_index);
            } else {
                debug!(%address, "RELEASE from a client that does not hold this lease, ignoring");
            }
            RouterAction::Drop
        }
        AddressLocation::Foreign { .. } => {
            // The original client-to-owner RELEASE forward is unspecified by
            // this implementation; a lease on a peer's block simply expires
            // on its own timeout instead of being released early.
            debug!(%address, "RELEASE for a peer's block, not forwarded");
            RouterAction::Drop
        }
        AddressLocation::OutOfPool => RouterAction::Drop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::StaticBlockPlane;

    const PREFIX: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 0);

    fn table_with_one_owned_block() -> BlockTable<StaticBlockPlane> {
        let mut plane = StaticBlockPlane::new(2, 16, 32);
        plane.claim(0).unwrap();
        BlockTable::new(plane, PREFIX, 16)
    }

    #[test]
    fn discover_offers_from_owned_block() {
        let mut blocks = table_with_one_owned_block();
        let action = handle_discover(&mut blocks, PREFIX, 16, [1; 16], 0xAA, 0, 12);
        assert_eq!(action, RouterAction::Offer { address: Ipv4Addr::new(10, 0, 0, 0) });
    }

    #[test]
    fn discover_prefers_smallest_positive_free_block() {
        let mut plane = StaticBlockPlane::new(2, 16, 32);
        plane.claim(0).unwrap();
        plane.claim(1).unwrap();
        let mut blocks = BlockTable::new(plane, PREFIX, 16);
        // Fill block 0 down to 1 free, block 1 stays at 16 free.
        for i in 0..15 {
            blocks.leases_mut(0).get_mut(i).offer([9; 16], i, 0, 1000);
        }

        let action = handle_discover(&mut blocks, PREFIX, 16, [1; 16], 1, 0, 12);
        assert_eq!(action, RouterAction::Offer { address: Ipv4Addr::new(10, 0, 0, 15) });
    }

    #[test]
    fn request_confirms_offered_lease_by_requested_ip() {
        let mut blocks = table_with_one_owned_block();
        blocks.leases_mut(0).get_mut(0).offer([1; 16], 0xAA, 0, 12);

        let action = handle_request(
            &mut blocks,
            PREFIX,
            16,
            Some(Ipv4Addr::new(10, 0, 0, 0)),
            Ipv4Addr::UNSPECIFIED,
            [1; 16],
            0xAA,
            1,
            3600,
            100,
        );
        assert_eq!(action, RouterAction::Ack { address: Ipv4Addr::new(10, 0, 0, 0) });
    }

    #[test]
    fn request_naks_address_held_by_another_client() {
        let mut blocks = table_with_one_owned_block();
        blocks.leases_mut(0).get_mut(0).confirm([1; 16], 0xAA, 0, 3600, 100);

        let action = handle_request(
            &mut blocks,
            PREFIX,
            16,
            Some(Ipv4Addr::new(10, 0, 0, 0)),
            Ipv4Addr::UNSPECIFIED,
            [2; 16],
            0xBB,
            1,
            3600,
            100,
        );
        assert_eq!(action, RouterAction::Nak);
    }

    #[test]
    fn request_forwards_to_peer_owned_block() {
        let mut plane = StaticBlockPlane::new(2, 16, 32);
        let owner: PeerId = "fe80::2".parse().unwrap();
        plane.assign_to_peer(1, owner).unwrap();
        let mut blocks = BlockTable::new(plane, PREFIX, 16);

        let action = handle_request(
            &mut blocks,
            PREFIX,
            16,
            Some(Ipv4Addr::new(10, 0, 0, 20)),
            Ipv4Addr::UNSPECIFIED,
            [1; 16],
            1,
            0,
            3600,
            100,
        );
        assert_eq!(action, RouterAction::Forward { block_index: 1, owner });
    }

    #[test]
    fn request_naks_when_no_address_resolves_and_no_offer_matches() {
        let mut blocks = table_with_one_owned_block();

        let action = handle_request(
            &mut blocks,
            PREFIX,
            16,
            None,
            Ipv4Addr::UNSPECIFIED,
            [1; 16],
            0xAA,
            1,
            3600,
            100,
        );
        assert_eq!(action, RouterAction::Nak);
    }

    #[test]
    fn request_confirms_via_offered_lease_scan_by_xid_and_chaddr() {
        let mut blocks = table_with_one_owned_block();
        blocks.leases_mut(0).get_mut(2).offer([3; 16], 0xCC, 0, 12);

        let action = handle_request(
            &mut blocks,
            PREFIX,
            16,
            None,
            Ipv4Addr::UNSPECIFIED,
            [3; 16],
            0xCC,
            1,
            3600,
            100,
        );
        assert_eq!(action, RouterAction::Ack { address: Ipv4Addr::new(10, 0, 0, 2) });
    }

    #[test]
    fn request_scan_ignores_a_leased_binding_matching_only_by_chaddr() {
        let mut blocks = table_with_one_owned_block();
        // Lease 4 is LEASED (not OFFERED) to this chaddr under a different xid.
        blocks.leases_mut(0).get_mut(4).confirm([5; 16], 0x11, 0, 3600, 100);

        let action = handle_request(
            &mut blocks,
            PREFIX,
            16,
            None,
            Ipv4Addr::UNSPECIFIED,
            [5; 16],
            0x22,
            1,
            3600,
            100,
        );
        assert_eq!(action, RouterAction::Nak);
    }

    #[test]
    fn release_frees_a_matching_lease() {
        let mut blocks = table_with_one_owned_block();
        blocks.leases_mut(0).get_mut(3).confirm([7; 16], 1, 0, 3600, 100);

        handle_release(&mut blocks, PREFIX, 16, Ipv4Addr::new(10, 0, 0, 3), [7; 16]);

        assert_eq!(blocks.leases(0).unwrap().get(3).state, crate::lease::LeaseState::Free);
    }
}
