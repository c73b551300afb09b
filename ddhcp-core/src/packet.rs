//! DHCPv4 packet parser/serializer (RFC 2131 framing).

use std::net::Ipv4Addr;
use thiserror::Error;

use crate::options::{self, DhcpOption};

pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;

pub const DHCPDISCOVER: u8 = 1;
pub const DHCPOFFER: u8 = 2;
pub const DHCPREQUEST: u8 = 3;
pub const DHCPACK: u8 = 5;
pub const DHCPNAK: u8 = 6;
pub const DHCPRELEASE: u8 = 7;

#[derive(Error, Debug)]
pub enum PacketParseError {
    #[error("packet too short: {0} bytes (minimum 240)")]
    TooShort(usize),
    #[error("invalid magic cookie")]
    InvalidMagic,
}

/// A parsed DHCPv4/BOOTP packet.
#[derive(Debug, Clone)]
pub struct DhcpPacket {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; 16],
    pub sname: [u8; 64],
    pub file: [u8; 128],
    pub options: Vec<DhcpOption>,
}

impl DhcpPacket {
    pub fn parse(data: &[u8]) -> Result<Self, PacketParseError> {
        if data.len() < 240 {
            return Err(PacketParseError::TooShort(data.len()));
        }
        if data[236..240] != MAGIC_COOKIE {
            return Err(PacketParseError::InvalidMagic);
        }

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[28..44]);
        let mut sname = [0u8; 64];
        sname.copy_from_slice(&data[44..108]);
        let mut file = [0u8; 128];
        file.copy_from_slice(&data[108..236]);

        let options = if data.len() > 240 { options::parse_options(&data[240..]) } else { Vec::new() };

        Ok(DhcpPacket {
            op: data[0],
            htype: data[1],
            hlen: data[2],
            hops: data[3],
            xid: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            secs: u16::from_be_bytes([data[8], data[9]]),
            flags: u16::from_be_bytes([data[10], data[11]]),
            ciaddr: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            yiaddr: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
            siaddr: Ipv4Addr::new(data[20], data[21], data[22], data[23]),
            giaddr: Ipv4Addr::new(data[24], data[25], data[26], data[27]),
            chaddr,
            sname,
            file,
            options,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(300);
        buf.push(self.op);
        buf.push(self.htype);
        buf.push(self.hlen);
        buf.push(self.hops);
        buf.extend_from_slice(&self.xid.to_be_bytes());
        buf.extend_from_slice(&self.secs.to_be_bytes());
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&self.ciaddr.octets());
        buf.extend_from_slice(&self.yiaddr.octets());
        buf.extend_from_slice(&self.siaddr.octets());
        buf.extend_from_slice(&self.giaddr.octets());
        buf.extend_from_slice(&self.chaddr);
        buf.extend_from_slice(&self.sname);
        buf.extend_from_slice(&self.file);
        buf.extend_from_slice(&MAGIC_COOKIE);
        buf.extend_from_slice(&options::encode_options(&self.options));

        while buf.len() < 300 {
            buf.push(0);
        }
        buf
    }

    pub fn mac_bytes(&self) -> &[u8] {
        let len = self.hlen.min(16) as usize;
        &self.chaddr[..len]
    }

    pub fn get_option(&self, code: u8) -> Option<&DhcpOption> {
        options::find(&self.options, code)
    }

    pub fn message_type(&self) -> Option<u8> {
        self.get_option(options::OPT_MESSAGE_TYPE)?.as_u8()
    }

    pub fn requested_ip(&self) -> Option<Ipv4Addr> {
        self.get_option(options::OPT_REQUESTED_ADDRESS)?.as_ipv4()
    }

    /// Initializes a reply from this request, copying the fields RFC 2131
    /// requires the server to echo, and sets `op = BOOTREPLY`.
    pub fn reply_skeleton(&self) -> DhcpPacket {
        DhcpPacket {
            op: BOOTREPLY,
            htype: self.htype,
            hlen: self.hlen,
            hops: self.hops,
            xid: self.xid,
            secs: 0,
            flags: self.flags,
            ciaddr: self.ciaddr,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: self.giaddr,
            chaddr: self.chaddr,
            sname: [0u8; 64],
            file: [0u8; 128],
            options: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_discover() -> Vec<u8> {
        let mut pkt = vec![0u8; 300];
        pkt[0] = BOOTREQUEST;
        pkt[1] = 1;
        pkt[2] = 6;
        pkt[4..8].copy_from_slice(&0x12345678u32.to_be_bytes());
        pkt[28..34].copy_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        pkt[236..240].copy_from_slice(&MAGIC_COOKIE);
        pkt[240] = options::OPT_MESSAGE_TYPE;
        pkt[241] = 1;
        pkt[242] = DHCPDISCOVER;
        pkt[243] = options::OPT_END;
        pkt
    }

    #[test]
    fn parses_discover() {
        let pkt = DhcpPacket::parse(&make_discover()).unwrap();
        assert_eq!(pkt.op, BOOTREQUEST);
        assert_eq!(pkt.xid, 0x12345678);
        assert_eq!(pkt.message_type(), Some(DHCPDISCOVER));
    }

    #[test]
    fn round_trips_through_serialize_parse() {
        let pkt = DhcpPacket::parse(&make_discover()).unwrap();
        let reparsed = DhcpPacket::parse(&pkt.to_bytes()).unwrap();
        assert_eq!(reparsed.xid, pkt.xid);
        assert_eq!(reparsed.message_type(), pkt.message_type());
    }

    #[test]
    fn rejects_short_packet() {
        assert!(matches!(DhcpPacket::parse(&[0u8; 10]), Err(PacketParseError::TooShort(10))));
    }

    #[test]
    fn reply_skeleton_echoes_required_fields() {
        let pkt = DhcpPacket::parse(&make_discover()).unwrap();
        let reply = pkt.reply_skeleton();
        assert_eq!(reply.op, BOOTREPLY);
        assert_eq!(reply.xid, pkt.xid);
        assert_eq!(reply.chaddr, pkt.chaddr);
    }
}
