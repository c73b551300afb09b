//! Per-block lease table (C3) and the lease state machine (C4).

/// A lease's position in its DHCP message lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Free,
    Offered,
    Leased,
}

/// One address's binding state within a block.
#[derive(Debug, Clone, Copy)]
pub struct Lease {
    pub state: LeaseState,
    pub chaddr: [u8; 16],
    pub xid: u32,
    pub lease_end: u64,
}

impl Lease {
    pub fn free() -> Self {
        Self { state: LeaseState::Free, chaddr: [0u8; 16], xid: 0, lease_end: 0 }
    }

    pub fn matches_client(&self, chaddr: &[u8; 16]) -> bool {
        &self.chaddr == chaddr
    }

    /// FREE -> OFFERED: record the requester and set the offer deadline.
    pub fn offer(&mut self, chaddr: [u8; 16], xid: u32, now: u64, t_offer: u64) {
        self.state = LeaseState::Offered;
        self.chaddr = chaddr;
        self.xid = xid;
        self.lease_end = now + t_offer;
    }

    /// OFFERED/FREE -> LEASED: commit the binding with the full lease deadline.
    pub fn confirm(&mut self, chaddr: [u8; 16], xid: u32, now: u64, t_lease: u64, t_delta: u64) {
        self.state = LeaseState::Leased;
        self.chaddr = chaddr;
        self.xid = xid;
        self.lease_end = now + t_lease + t_delta;
    }

    /// LEASED -> LEASED: refresh the deadline on renewal from the same client.
    pub fn renew(&mut self, now: u64, t_lease: u64, t_delta: u64) {
        self.lease_end = now + t_lease + t_delta;
    }

    /// Any state -> FREE. Deliberately drops `chaddr`/`xid` rather than retaining
    /// them for reuse (RFC 2131 §4.3.4 only SHOULDs retention; this diverges).
    pub fn release(&mut self) {
        *self = Lease::free();
    }
}

/// A block's densely-indexed lease array plus free/used accounting.
#[derive(Debug, Clone)]
pub struct LeaseTable {
    leases: Vec<Lease>,
}

impl LeaseTable {
    pub fn new(subnet_len: u32) -> Self {
        Self { leases: vec![Lease::free(); subnet_len as usize] }
    }

    pub fn len(&self) -> u32 {
        self.leases.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    pub fn get(&self, index: u32) -> &Lease {
        &self.leases[index as usize]
    }

    pub fn get_mut(&mut self, index: u32) -> &mut Lease {
        &mut self.leases[index as usize]
    }

    pub fn has_free(&self) -> bool {
        self.leases.iter().any(|l| l.state == LeaseState::Free)
    }

    pub fn num_free(&self) -> u32 {
        self.leases.iter().filter(|l| l.state == LeaseState::Free).count() as u32
    }

    /// Lowest-indexed FREE lease, or `len()` (a sentinel matching the
    /// original's "no free lease" return) if the block is full.
    pub fn first_free(&self) -> u32 {
        self.leases
            .iter()
            .position(|l| l.state == LeaseState::Free)
            .map(|i| i as u32)
            .unwrap_or(self.len())
    }

    pub fn release(&mut self, index: u32) {
        self.leases[index as usize].release();
    }

    /// Releases every lease whose `lease_end` has passed; returns the
    /// resulting free count.
    pub fn check_timeouts(&mut self, now: u64) -> u32 {
        for lease in &mut self.leases {
            if lease.state != LeaseState::Free && lease.lease_end < now {
                lease.release();
            }
        }
        self.num_free()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_table_is_all_free() {
        let table = LeaseTable::new(4);
        assert_eq!(table.num_free(), 4);
        assert!(table.has_free());
        assert_eq!(table.first_free(), 0);
    }

    #[test]
    fn offer_then_confirm_tracks_used_count() {
        let mut table = LeaseTable::new(4);
        let i = table.first_free();
        table.get_mut(i).offer([1; 16], 0xAA, 100, 12);
        assert_eq!(table.num_free(), 3);
        table.get_mut(i).confirm([1; 16], 0xAA, 100, 3600, 100);
        assert_eq!(table.get(i).state, LeaseState::Leased);
        assert_eq!(table.num_free(), 3);
    }

    #[test]
    fn check_timeouts_frees_expired_offers_not_live_ones() {
        let mut table = LeaseTable::new(2);
        table.get_mut(0).offer([1; 16], 1, 0, 12); // expires at 12
        table.get_mut(1).offer([2; 16], 2, 0, 12);
        table.get_mut(1).confirm([2; 16], 2, 0, 3600, 100); // expires at 3700

        let free = table.check_timeouts(13);
        assert_eq!(table.get(0).state, LeaseState::Free);
        assert_eq!(table.get(1).state, LeaseState::Leased);
        assert_eq!(free, 1);
    }

    #[test]
    fn release_zeroes_chaddr_and_xid() {
        let mut table = LeaseTable::new(1);
        table.get_mut(0).offer([9; 16], 42, 0, 12);
        table.release(0);
        let lease = table.get(0);
        assert_eq!(lease.state, LeaseState::Free);
        assert_eq!(lease.chaddr, [0u8; 16]);
        assert_eq!(lease.xid, 0);
    }
}
