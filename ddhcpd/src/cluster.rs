//! Wire framing for the peer bridge: a one-byte type tag in front of
//! whichever RENEWLEASE/RENEWACK/RENEWNAK payload `ddhcp_core::peer` defines.

use ddhcp_core::{RenewAck, RenewLease, RenewNak};

const TAG_RENEWLEASE: u8 = 1;
const TAG_RENEWACK: u8 = 2;
const TAG_RENEWNAK: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterMessage {
    RenewLease(RenewLease),
    RenewAck(RenewAck),
    RenewNak(RenewNak),
}

impl ClusterMessage {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ClusterMessage::RenewLease(msg) => {
                let mut buf = vec![TAG_RENEWLEASE];
                buf.extend_from_slice(&msg.to_bytes());
                buf
            }
            ClusterMessage::RenewAck(msg) => {
                let mut buf = vec![TAG_RENEWACK];
                buf.extend_from_slice(&msg.to_bytes());
                buf
            }
            ClusterMessage::RenewNak(msg) => {
                let mut buf = vec![TAG_RENEWNAK];
                buf.extend_from_slice(&msg.to_bytes());
                buf
            }
        }
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let (&tag, rest) = data.split_first()?;
        match tag {
            TAG_RENEWLEASE => RenewLease::from_bytes(rest).map(ClusterMessage::RenewLease),
            TAG_RENEWACK => RenewAck::from_bytes(rest).map(ClusterMessage::RenewAck),
            TAG_RENEWNAK => RenewNak::from_bytes(rest).map(ClusterMessage::RenewNak),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn renew_lease_round_trips_through_the_wire_tag() {
        let msg = ClusterMessage::RenewLease(RenewLease { chaddr: [1; 16], address: Ipv4Addr::new(10, 0, 0, 5), xid: 7 });
        let decoded = ClusterMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn unknown_tag_fails_to_decode() {
        assert!(ClusterMessage::decode(&[0xFF, 0, 0, 0]).is_none());
    }
}
