//! Block view (C5): a read-mostly projection of block ownership, consumed
//! by the core through the [`BlockPlane`] trait so the full claim/heartbeat
//! protocol that actually elects owners stays a pluggable collaborator.

use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::net::Ipv4Addr;

use crate::error::CoreError;
use crate::lease::LeaseTable;

/// Ownership state of a block. Only `Ours` and `ClaimedByPeer` are material
/// to the core; `Free`/`Claiming` are pass-through from the block plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Free,
    Claiming,
    Ours,
    ClaimedByPeer,
}

/// Peers are addressed by their link-local cluster identity. The DHCP pool
/// itself stays IPv4-only (see Non-goals); the cluster plane this crate was
/// distilled from runs its own protocol over IPv6 multicast, so peer
/// identities are naturally IPv6 addresses.
pub type PeerId = Ipv6Addr;

/// Read projection of one block's ownership, independent of whether its
/// lease array has been materialized yet.
pub trait BlockPlane {
    fn num_blocks(&self) -> u32;
    fn state(&self, index: u32) -> BlockState;
    fn owner(&self, index: u32) -> Option<PeerId>;
    fn subnet_len(&self, index: u32) -> u32;
}

/// Materializes and owns the per-block lease arrays on top of a [`BlockPlane`],
/// and derives each block's starting address from the pool prefix/block size.
pub struct BlockTable<P> {
    plane: P,
    prefix: Ipv4Addr,
    block_size: u32,
    materialized: Vec<Option<LeaseTable>>,
}

impl<P: BlockPlane> BlockTable<P> {
    pub fn new(plane: P, prefix: Ipv4Addr, block_size: u32) -> Self {
        let num_blocks = plane.num_blocks();
        Self { plane, prefix, block_size, materialized: (0..num_blocks).map(|_| None).collect() }
    }

    pub fn num_blocks(&self) -> u32 {
        self.plane.num_blocks()
    }

    pub fn state(&self, index: u32) -> BlockState {
        self.plane.state(index)
    }

    pub fn owner(&self, index: u32) -> Option<PeerId> {
        self.plane.owner(index)
    }

    pub fn subnet(&self, index: u32) -> Ipv4Addr {
        crate::addr::address_at(self.prefix, index * self.block_size)
    }

    pub fn subnet_len(&self, index: u32) -> u32 {
        self.plane.subnet_len(index)
    }

    /// Returns the lease array if already materialized, without touching a
    /// `FREE`/`CLAIMING` block (invariant 2: the core must never consult
    /// `addresses` for those states).
    pub fn leases(&self, index: u32) -> Option<&LeaseTable> {
        self.materialized[index as usize].as_ref()
    }

    /// Materializes the lease array on first touch (invariant 1) and returns
    /// a mutable handle to it. Only valid for `Ours`/`ClaimedByPeer` blocks.
    pub fn leases_mut(&mut self, index: u32) -> &mut LeaseTable {
        let len = self.subnet_len(index);
        self.materialized[index as usize].get_or_insert_with(|| LeaseTable::new(len))
    }

    /// Indices of every block this daemon owns, in index order.
    pub fn ours(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.num_blocks()).filter(move |&i| self.state(i) == BlockState::Ours)
    }

    pub fn check_timeouts(&mut self, now: u64) {
        for table in self.materialized.iter_mut().flatten() {
            table.check_timeouts(now);
        }
    }
}

/// A fixed block→owner assignment, read once at startup.
///
/// This stands in for the full multicast claim/heartbeat election (out of
/// scope for this core — see SPEC_FULL.md §2) and is suitable for a
/// single-owner deployment or a manually partitioned cluster.
#[derive(Debug, Clone)]
pub struct StaticBlockPlane {
    num_blocks: u32,
    subnet_len: u32,
    last_block_len: u32,
    ours: HashMap<u32, ()>,
    peers: HashMap<u32, PeerId>,
}

impl StaticBlockPlane {
    pub fn new(num_blocks: u32, block_size: u32, pool_size: u32) -> Self {
        let last_block_len = if num_blocks == 0 {
            0
        } else {
            let covered = (num_blocks - 1) * block_size;
            pool_size.saturating_sub(covered).min(block_size).max(1)
        };
        Self {
            num_blocks,
            subnet_len: block_size,
            last_block_len,
            ours: HashMap::new(),
            peers: HashMap::new(),
        }
    }

    fn check_range(&self, index: u32) -> Result<(), CoreError> {
        if index >= self.num_blocks {
            return Err(CoreError::BlockOutOfRange { index, num_blocks: self.num_blocks });
        }
        Ok(())
    }

    pub fn claim(&mut self, index: u32) -> Result<(), CoreError> {
        self.check_range(index)?;
        self.peers.remove(&index);
        self.ours.insert(index, ());
        Ok(())
    }

    pub fn assign_to_peer(&mut self, index: u32, owner: PeerId) -> Result<(), CoreError> {
        self.check_range(index)?;
        self.ours.remove(&index);
        self.peers.insert(index, owner);
        Ok(())
    }
}

impl BlockPlane for StaticBlockPlane {
    fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    fn state(&self, index: u32) -> BlockState {
        if self.ours.contains_key(&index) {
            BlockState::Ours
        } else if self.peers.contains_key(&index) {
            BlockState::ClaimedByPeer
        } else {
            BlockState::Free
        }
    }

    fn owner(&self, index: u32) -> Option<PeerId> {
        self.peers.get(&index).copied()
    }

    fn subnet_len(&self, index: u32) -> u32 {
        if index + 1 == self.num_blocks {
            self.last_block_len
        } else {
            self.subnet_len
        }
    }
}
