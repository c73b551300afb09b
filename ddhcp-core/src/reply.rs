//! Reply assembly (C8): turns a router decision into an OFFER/ACK/NAK wire
//! packet.
//!
//! The reference implementation this was distilled from encodes the lease
//! time as `{0, 0, 0, seconds_low_byte}`, truncating anything past 255
//! seconds. That bug is not reproduced here: lease time is always the full
//! big-endian 32-bit seconds count (see DESIGN.md).

use crate::options::{self, DhcpOption, OptionStore, OPT_ADDRESS_LEASE_TIME, OPT_MESSAGE_TYPE};
use crate::packet::{DhcpPacket, DHCPACK, DHCPNAK, DHCPOFFER};
use std::net::Ipv4Addr;

const HEADROOM: usize = 2;

fn build_lease_reply(request: &DhcpPacket, msg_type: u8, yiaddr: Ipv4Addr, lease_seconds: u32, store: &OptionStore) -> DhcpPacket {
    let mut reply = request.reply_skeleton();
    reply.yiaddr = yiaddr;

    let mut opts = options::fill(&request.options, store, HEADROOM);
    options::set(&mut opts, OPT_MESSAGE_TYPE, vec![msg_type]);
    options::set(&mut opts, OPT_ADDRESS_LEASE_TIME, lease_seconds.to_be_bytes().to_vec());
    reply.options = opts;
    reply
}

pub fn build_offer(request: &DhcpPacket, address: Ipv4Addr, lease_seconds: u32, store: &OptionStore) -> DhcpPacket {
    build_lease_reply(request, DHCPOFFER, address, lease_seconds, store)
}

pub fn build_ack(request: &DhcpPacket, address: Ipv4Addr, lease_seconds: u32, store: &OptionStore) -> DhcpPacket {
    build_lease_reply(request, DHCPACK, address, lease_seconds, store)
}

/// A NAK carries no lease information, only the message type.
pub fn build_nak(request: &DhcpPacket) -> DhcpPacket {
    let mut reply = request.reply_skeleton();
    reply.yiaddr = Ipv4Addr::UNSPECIFIED;
    reply.options = vec![DhcpOption::new(OPT_MESSAGE_TYPE, vec![DHCPNAK])];
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OPT_REQUESTED_ADDRESS;
    use crate::packet::DHCPDISCOVER;

    fn make_request() -> DhcpPacket {
        let mut pkt = DhcpPacket {
            op: crate::packet::BOOTREQUEST,
            htype: 1,
            hlen: 6,
            hops: 0,
            xid: 0x1234,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: [0xAA; 16],
            sname: [0; 64],
            file: [0; 128],
            options: vec![DhcpOption::new(OPT_REQUESTED_ADDRESS, vec![10, 0, 0, 5])],
        };
        pkt.options.push(DhcpOption::new(crate::packet::BOOTREQUEST, vec![DHCPDISCOVER]));
        pkt
    }

    #[test]
    fn offer_carries_full_width_lease_time() {
        let request = make_request();
        let store = OptionStore::with_pool_defaults(Ipv4Addr::new(10, 0, 0, 0), 24);
        let reply = build_offer(&request, Ipv4Addr::new(10, 0, 0, 5), 86400, &store);

        assert_eq!(reply.yiaddr, Ipv4Addr::new(10, 0, 0, 5));
        let lease_opt = reply.get_option(OPT_ADDRESS_LEASE_TIME).unwrap();
        assert_eq!(lease_opt.data, 86400u32.to_be_bytes().to_vec());
        assert_eq!(reply.message_type(), Some(DHCPOFFER));
    }

    #[test]
    fn nak_has_only_the_message_type_option() {
        let request = make_request();
        let reply = build_nak(&request);
        assert_eq!(reply.options.len(), 1);
        assert_eq!(reply.message_type(), Some(DHCPNAK));
        assert_eq!(reply.yiaddr, Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn ack_echoes_requester_chaddr_and_xid() {
        let request = make_request();
        let store = OptionStore::with_pool_defaults(Ipv4Addr::new(10, 0, 0, 0), 24);
        let reply = build_ack(&request, Ipv4Addr::new(10, 0, 0, 5), 3600, &store);
        assert_eq!(reply.xid, request.xid);
        assert_eq!(reply.chaddr, request.chaddr);
        assert_eq!(reply.message_type(), Some(DHCPACK));
    }
}
