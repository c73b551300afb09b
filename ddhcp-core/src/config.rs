//! Pool configuration (C9): the geometry and timers that describe a single
//! DHCP pool, plus parsing for operator-supplied option overrides.
//!
//! This module only validates and derives values; reading the file and
//! applying environment overrides is the daemon's job (see `ddhcpd::config`),
//! keeping the core free of I/O.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::options::OptionStore;

fn default_t_offer() -> u64 {
    12
}

fn default_t_lease() -> u64 {
    3600
}

fn default_t_delta() -> u64 {
    100
}

fn default_pending_ttl() -> u64 {
    default_t_offer()
}

/// One DHCP pool's geometry, renewal timers, and operator-facing knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub prefix: Ipv4Addr,
    pub prefix_len: u8,
    pub block_size: u32,

    /// Seconds an OFFER reserves an address before it reverts to FREE.
    #[serde(default = "default_t_offer")]
    pub t_offer: u64,
    /// Seconds a confirmed lease is valid for.
    #[serde(default = "default_t_lease")]
    pub t_lease: u64,
    /// Grace period added on top of `t_lease` before a daemon reclaims the
    /// address, covering clock skew between cooperating daemons.
    #[serde(default = "default_t_delta")]
    pub t_delta: u64,
    /// Seconds a RENEWLEASE forwarded to a peer is given to answer.
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl: u64,

    /// Network interface the DHCP and cluster sockets bind to.
    pub interface: Option<String>,
    /// IPv6 scope id for the cluster multicast group, required on
    /// link-local interfaces with more than one candidate link.
    pub mcast_scope_id: Option<u32>,

    /// Raw `code;len;b0,b1,...,b(len-1)` option overrides, applied over the
    /// pool-derived defaults in `OptionStore`.
    #[serde(default)]
    pub option_overrides: Vec<String>,
}

impl PoolConfig {
    pub fn pool_size(&self) -> u64 {
        1u64 << (32 - self.prefix_len as u32)
    }

    /// Number of fixed-size blocks the pool divides into. Fails if
    /// `block_size` does not evenly divide the pool.
    pub fn number_of_blocks(&self) -> Result<u32, CoreError> {
        let pool_size = self.pool_size();
        if pool_size % self.block_size as u64 != 0 {
            return Err(CoreError::IndivisiblePool { pool_size, block_size: self.block_size });
        }
        Ok((pool_size / self.block_size as u64) as u32)
    }

    pub fn parsed_overrides(&self) -> Result<Vec<(u8, Vec<u8>)>, CoreError> {
        self.option_overrides.iter().map(|raw| parse_option_override(raw)).collect()
    }

    /// Applies every configured override onto `store`, replacing whatever
    /// pool-derived default occupied that code.
    pub fn apply_overrides(&self, store: &mut OptionStore) -> Result<(), CoreError> {
        for (code, data) in self.parsed_overrides()? {
            store.set(code, data);
        }
        Ok(())
    }
}

fn malformed(raw: &str, reason: &'static str) -> CoreError {
    CoreError::MalformedOptionOverride { raw: raw.to_string(), reason }
}

/// Parses `code;len;b0,b1,...,b(len-1)`, e.g. `3;4;10,0,0,1` for a router
/// option pointing at 10.0.0.1.
fn parse_option_override(raw: &str) -> Result<(u8, Vec<u8>), CoreError> {
    let parts: Vec<&str> = raw.splitn(3, ';').collect();
    let [code_str, len_str, bytes_str] = parts.as_slice() else {
        return Err(malformed(raw, "expected the form code;len;b0,b1,...,b(len-1)"));
    };

    let code: u8 = code_str.parse().map_err(|_| malformed(raw, "code is not a valid u8"))?;
    let len: usize = len_str.parse().map_err(|_| malformed(raw, "len is not a valid usize"))?;

    let bytes: Vec<u8> = if bytes_str.is_empty() {
        Vec::new()
    } else {
        bytes_str
            .split(',')
            .map(|b| b.trim().parse::<u8>())
            .collect::<Result<_, _>>()
            .map_err(|_| malformed(raw, "byte list contains a value that is not a u8"))?
    };

    if bytes.len() != len {
        return Err(malformed(raw, "declared len does not match the number of bytes given"));
    }

    Ok((code, bytes))
}
