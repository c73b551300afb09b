//! DHCP option codec: wire-level (code, length, payload) triples plus the
//! server-wide option store whose defaults are merged into every reply.

use std::collections::HashMap;
use std::net::Ipv4Addr;

pub const OPT_PAD: u8 = 0;
pub const OPT_SUBNET_MASK: u8 = 1;
pub const OPT_TIME_OFFSET: u8 = 2;
pub const OPT_ROUTER: u8 = 3;
pub const OPT_BROADCAST_ADDRESS: u8 = 28;
pub const OPT_REQUESTED_ADDRESS: u8 = 50;
pub const OPT_ADDRESS_LEASE_TIME: u8 = 51;
pub const OPT_MESSAGE_TYPE: u8 = 53;
pub const OPT_SERVER_IDENTIFIER: u8 = 54;
pub const OPT_PARAMETER_REQUEST_LIST: u8 = 55;
pub const OPT_END: u8 = 255;

/// A single parsed or to-be-serialized DHCP option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpOption {
    pub code: u8,
    pub data: Vec<u8>,
}

impl DhcpOption {
    pub fn new(code: u8, data: Vec<u8>) -> Self {
        Self { code, data }
    }

    fn empty() -> Self {
        Self::new(OPT_PAD, Vec::new())
    }

    pub fn as_u8(&self) -> Option<u8> {
        self.data.first().copied()
    }

    pub fn as_ipv4(&self) -> Option<Ipv4Addr> {
        <[u8; 4]>::try_from(self.data.as_slice()).ok().map(Ipv4Addr::from)
    }
}

/// Linear scan for the first option with `code`.
pub fn find(options: &[DhcpOption], code: u8) -> Option<&DhcpOption> {
    options.iter().find(|o| o.code == code)
}

/// Overwrites the option at `code` in-place, or the first free (`code = 0`) slot.
/// Returns `false` if neither exists — the caller under-sized the reply array.
pub fn set(options: &mut [DhcpOption], code: u8, data: Vec<u8>) -> bool {
    if let Some(opt) = options.iter_mut().find(|o| o.code == code) {
        opt.data = data;
        return true;
    }
    if let Some(opt) = options.iter_mut().find(|o| o.code == OPT_PAD) {
        opt.code = code;
        opt.data = data;
        return true;
    }
    false
}

/// Reads the client's Parameter-Request-List and copies every code the store
/// carries into a freshly allocated array, leaving `headroom` empty (`code = 0`)
/// slots at the front for the caller to [`set`] (message type, lease time).
pub fn fill(client_options: &[DhcpOption], store: &OptionStore, headroom: usize) -> Vec<DhcpOption> {
    let mut out = Vec::with_capacity(headroom);
    out.resize_with(headroom, DhcpOption::empty);

    let Some(prl) = find(client_options, OPT_PARAMETER_REQUEST_LIST) else {
        return out;
    };

    for &code in &prl.data {
        if let Some(payload) = store.get(code) {
            out.push(DhcpOption::new(code, payload.to_vec()));
        }
    }

    out
}

pub fn parse_options(data: &[u8]) -> Vec<DhcpOption> {
    let mut options = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let code = data[i];
        if code == OPT_END {
            break;
        }
        if code == OPT_PAD {
            i += 1;
            continue;
        }

        i += 1;
        if i >= data.len() {
            break;
        }
        let len = data[i] as usize;
        i += 1;
        if i + len > data.len() {
            break;
        }

        options.push(DhcpOption::new(code, data[i..i + len].to_vec()));
        i += len;
    }

    options
}

pub fn encode_options(options: &[DhcpOption]) -> Vec<u8> {
    let mut buf = Vec::new();
    for opt in options {
        if opt.code == OPT_PAD {
            continue;
        }
        buf.push(opt.code);
        buf.push(opt.data.len() as u8);
        buf.extend_from_slice(&opt.data);
    }
    buf.push(OPT_END);
    buf
}

/// Server-wide defaults merged into every reply, keyed uniquely by option code.
/// Set-on-write replaces the prior payload; a `HashMap` entry overwrite drops
/// the old `Vec<u8>` for us, so there is no payload to release by hand.
#[derive(Debug, Clone, Default)]
pub struct OptionStore {
    options: HashMap<u8, Vec<u8>>,
}

impl OptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, code: u8) -> Option<&[u8]> {
        self.options.get(&code).map(Vec::as_slice)
    }

    pub fn has(&self, code: u8) -> bool {
        self.options.contains_key(&code)
    }

    pub fn set(&mut self, code: u8, payload: Vec<u8>) {
        self.options.insert(code, payload);
    }

    /// Builds a store with the wire-standard defaults synthesized from the
    /// pool prefix/length whenever the caller hasn't already set them.
    pub fn with_pool_defaults(prefix: Ipv4Addr, prefix_len: u8) -> Self {
        let mut store = Self::new();
        store.seed_pool_defaults(prefix, prefix_len);
        store
    }

    pub fn seed_pool_defaults(&mut self, prefix: Ipv4Addr, prefix_len: u8) {
        if !self.has(OPT_SUBNET_MASK) {
            self.set(OPT_SUBNET_MASK, subnet_mask_bytes(prefix_len).to_vec());
        }
        if !self.has(OPT_BROADCAST_ADDRESS) {
            self.set(OPT_BROADCAST_ADDRESS, broadcast_bytes(prefix, prefix_len).to_vec());
        }
        if !self.has(OPT_SERVER_IDENTIFIER) {
            // Known quirk inherited from the reference implementation: absent a
            // configured interface address, the identifier is the prefix with
            // its last octet forced to 1. See DESIGN.md.
            let mut octets = prefix.octets();
            octets[3] = 1;
            self.set(OPT_SERVER_IDENTIFIER, octets.to_vec());
        }
        if !self.has(OPT_TIME_OFFSET) {
            self.set(OPT_TIME_OFFSET, vec![0, 0, 0, 0]);
        }
    }
}

fn clamp8(v: i32) -> u32 {
    v.clamp(0, 8) as u32
}

fn subnet_mask_bytes(prefix_len: u8) -> [u8; 4] {
    let l = prefix_len as i32;
    std::array::from_fn(|k| {
        let bits = clamp8(l - 8 * k as i32);
        (255u16 - (255u16 >> bits)) as u8
    })
}

fn broadcast_bytes(prefix: Ipv4Addr, prefix_len: u8) -> [u8; 4] {
    let l = prefix_len as i32;
    let prefix_octets = prefix.octets();
    std::array::from_fn(|k| {
        let bits = clamp8(8 - (l - 8 * k as i32));
        prefix_octets[k] | ((1u16 << bits) - 1) as u8
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnet_mask_for_slash_24() {
        assert_eq!(subnet_mask_bytes(24), [255, 255, 255, 0]);
    }

    #[test]
    fn subnet_mask_for_slash_23() {
        assert_eq!(subnet_mask_bytes(23), [255, 255, 254, 0]);
    }

    #[test]
    fn broadcast_for_slash_24() {
        let bytes = broadcast_bytes(Ipv4Addr::new(10, 0, 0, 0), 24);
        assert_eq!(bytes, [10, 0, 0, 255]);
    }

    #[test]
    fn store_seeds_all_defaults_once() {
        let store = OptionStore::with_pool_defaults(Ipv4Addr::new(10, 0, 0, 0), 24);
        assert_eq!(store.get(OPT_SUBNET_MASK), Some(&[255, 255, 255, 0][..]));
        assert_eq!(store.get(OPT_BROADCAST_ADDRESS), Some(&[10, 0, 0, 255][..]));
        assert_eq!(store.get(OPT_SERVER_IDENTIFIER), Some(&[10, 0, 0, 1][..]));
        assert_eq!(store.get(OPT_TIME_OFFSET), Some(&[0, 0, 0, 0][..]));
    }

    #[test]
    fn store_set_overwrites_without_touching_others() {
        let mut store = OptionStore::with_pool_defaults(Ipv4Addr::new(10, 0, 0, 0), 24);
        store.set(OPT_SERVER_IDENTIFIER, vec![10, 0, 0, 254]);
        assert_eq!(store.get(OPT_SERVER_IDENTIFIER), Some(&[10, 0, 0, 254][..]));
        assert_eq!(store.get(OPT_SUBNET_MASK), Some(&[255, 255, 255, 0][..]));
    }

    #[test]
    fn parse_then_encode_round_trips() {
        let opts = vec![DhcpOption::new(53, vec![1]), DhcpOption::new(55, vec![1, 3, 6])];
        let bytes = encode_options(&opts);
        let parsed = parse_options(&bytes);
        assert_eq!(parsed, opts);
    }

    #[test]
    fn fill_reserves_headroom_and_copies_requested_codes() {
        let mut store = OptionStore::new();
        store.set(OPT_ROUTER, vec![10, 0, 0, 1]);
        let client_options = vec![DhcpOption::new(OPT_PARAMETER_REQUEST_LIST, vec![OPT_ROUTER, OPT_SUBNET_MASK])];

        let filled = fill(&client_options, &store, 2);

        assert_eq!(filled.len(), 3); // 2 headroom + 1 matched (subnet mask absent from store)
        assert_eq!(filled[2].code, OPT_ROUTER);
    }
}
