//! Header decoders for common capture formats, written as field lists.
//!
//! Ethernet II (with an optional 802.1Q tag), Linux cooked capture, IPv4, IPv6
//! and UDP. Each decoder returns the header and a cursor over its payload;
//! [`summarize`] walks a captured frame down to UDP.

use crate::bits::BitCursor;
use crate::error::MatchError;
use crate::matcher::bitmatch;
use crate::notation::{parse_fields, FieldList, NotationError};
use crate::value::Bindings;
use pcap_parser::Linktype;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86dd;
pub const ETHERTYPE_VLAN: u16 = 0x8100;
pub const IPPROTO_UDP: u8 = 17;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("header layout: {0}")]
    Layout(#[from] NotationError),
    #[error(transparent)]
    NoMatch(#[from] MatchError),
    #[error("unsupported link type {0}")]
    Linktype(i32),
}

fn get(b: &Bindings<'_>, name: &str) -> u64 {
    b.u64(name).unwrap_or_default()
}

/// The `..payload` tail, cut to at most `bits` when the header declares a length.
fn payload<'a>(b: &Bindings<'a>, bits: Option<u64>) -> BitCursor<'a> {
    let tail = b.bits("payload").unwrap_or(BitCursor::empty());
    match bits {
        Some(n) if n < tail.len() => tail.take_bits(n).unwrap_or(tail),
        _ => tail,
    }
}

type Layouts<const N: usize> = OnceLock<Result<[FieldList; N], NotationError>>;

/// Field lists are parsed on first use and kept for the life of the process.
fn layouts<const N: usize>(cell: &'static Layouts<N>, sources: [&str; N]) -> Result<&'static [FieldList; N], PacketError> {
    cell.get_or_init(|| {
        let lists = sources.iter().map(|s| parse_fields(s)).collect::<Result<Vec<_>, _>>()?;
        lists
            .try_into()
            .map_err(|_| NotationError::Syntax("field list count".to_string()))
    })
    .as_ref()
    .map_err(|e| e.clone().into())
}

/// MAC addresses are kept as 48-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr(pub u64);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", b[2], b[3], b[4], b[5], b[6], b[7])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    /// VLAN id from an 802.1Q tag.
    pub vlan: Option<u16>,
    pub ethertype: u16,
}

fn ethernet_header<'a>(b: &Bindings<'a>, vlan: Option<u16>) -> (EthernetHeader, BitCursor<'a>) {
    let header = EthernetHeader {
        dst: MacAddr(get(b, "dst")),
        src: MacAddr(get(b, "src")),
        vlan,
        ethertype: get(b, "ethertype") as u16,
    };
    (header, payload(b, None))
}

/// Decode an Ethernet II header.
pub fn ethernet(frame: BitCursor<'_>) -> Result<(EthernetHeader, BitCursor<'_>), PacketError> {
    static LAYOUTS: Layouts<2> = OnceLock::new();
    let [tagged, plain] = layouts(
        &LAYOUTS,
        [
            "dst : 48 ; src : 48 ; 0x8100 : 16 ; _ : 4 ; vid : 12 ; ethertype : 16 ; ..payload",
            "dst : 48 ; src : 48 ; ethertype : 16 ; ..payload",
        ],
    )?;
    let cases = [
        tagged.case(|b| ethernet_header(b, Some(get(b, "vid") as u16))),
        plain
            .case(|b| ethernet_header(b, None))
            .guard(|b| get(b, "ethertype") >= 0x0600),
    ];
    Ok(bitmatch(frame, &cases)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SllHeader {
    pub packet_type: u16,
    pub arphrd: u16,
    pub protocol: u16,
}

/// Decode a Linux cooked-capture (SLL) header.
pub fn linux_sll(frame: BitCursor<'_>) -> Result<(SllHeader, BitCursor<'_>), PacketError> {
    static LAYOUTS: Layouts<1> = OnceLock::new();
    let [sll] = layouts(
        &LAYOUTS,
        ["packet_type : 16 ; arphrd : 16 ; addr_len : 16 ; addr : 64 : bitstring ; protocol : 16 ; ..payload"],
    )?;
    let cases = [sll.case(|b| {
        let header = SllHeader {
            packet_type: get(b, "packet_type") as u16,
            arphrd: get(b, "arphrd") as u16,
            protocol: get(b, "protocol") as u16,
        };
        (header, payload(b, None))
    })];
    Ok(bitmatch(frame, &cases)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Header length in 32-bit words.
    pub hdrlen: u8,
    pub tos: u8,
    pub length: u16,
    pub id: u16,
    pub flags: u8,
    pub fragoff: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub options: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Header {
    pub traffic_class: u8,
    pub flow_label: u32,
    pub payload_len: u16,
    pub next_header: u8,
    pub hop_limit: u8,
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpHeader {
    V4(Ipv4Header),
    V6(Ipv6Header),
}

impl IpHeader {
    /// Protocol of the payload (IPv4 protocol / IPv6 next header).
    pub fn protocol(&self) -> u8 {
        match self {
            IpHeader::V4(h) => h.protocol,
            IpHeader::V6(h) => h.next_header,
        }
    }
}

const IPV4: &str = "4 : 4 ; hdrlen : 4 ; tos : 8 ; length : 16 ;
                    id : 16 ; flags : 3 ; fragoff : 13 ;
                    ttl : 8 ; protocol : 8 ; checksum : 16 ;
                    src : 32 ; dst : 32 ;
                    options : (hdrlen - 5) * 32 : bitstring ;
                    ..payload";

const IPV6: &str = "6 : 4 ; tclass : 8 ; flow : 20 ;
                    plen : 16 ; next : 8 ; hops : 8 ;
                    src_hi : 64 ; src_lo : 64 ; dst_hi : 64 ; dst_lo : 64 ;
                    ..payload";

fn ipv4_header<'a>(b: &Bindings<'a>) -> (IpHeader, BitCursor<'a>) {
    let hdrlen = get(b, "hdrlen");
    let length = get(b, "length");
    let header = Ipv4Header {
        hdrlen: hdrlen as u8,
        tos: get(b, "tos") as u8,
        length: length as u16,
        id: get(b, "id") as u16,
        flags: get(b, "flags") as u8,
        fragoff: get(b, "fragoff") as u16,
        ttl: get(b, "ttl") as u8,
        protocol: get(b, "protocol") as u8,
        checksum: get(b, "checksum") as u16,
        src: Ipv4Addr::from(get(b, "src") as u32),
        dst: Ipv4Addr::from(get(b, "dst") as u32),
        options: b.bits("options").map(|c| c.to_bytes()).unwrap_or_default(),
    };
    let body = length.saturating_sub(hdrlen * 4) * 8;
    (IpHeader::V4(header), payload(b, Some(body)))
}

fn ipv6_header<'a>(b: &Bindings<'a>) -> (IpHeader, BitCursor<'a>) {
    let addr = |hi: &str, lo: &str| Ipv6Addr::from(((get(b, hi) as u128) << 64) | get(b, lo) as u128);
    let plen = get(b, "plen");
    let header = Ipv6Header {
        traffic_class: get(b, "tclass") as u8,
        flow_label: get(b, "flow") as u32,
        payload_len: plen as u16,
        next_header: get(b, "next") as u8,
        hop_limit: get(b, "hops") as u8,
        src: addr("src_hi", "src_lo"),
        dst: addr("dst_hi", "dst_lo"),
    };
    (IpHeader::V6(header), payload(b, Some(plen * 8)))
}

/// Decode an IPv4 or IPv6 header; the payload is cut to the length the header declares.
pub fn ip(packet: BitCursor<'_>) -> Result<(IpHeader, BitCursor<'_>), PacketError> {
    static LAYOUTS: Layouts<2> = OnceLock::new();
    let [v4, v6] = layouts(&LAYOUTS, [IPV4, IPV6])?;
    let cases = [
        v4.case(ipv4_header).guard(|b| get(b, "length") >= get(b, "hdrlen") * 4),
        v6.case(ipv6_header),
    ];
    Ok(bitmatch(packet, &cases)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpHeader {
    pub sport: u16,
    pub dport: u16,
    pub length: u16,
    pub checksum: u16,
}

/// Decode a UDP header.
pub fn udp(datagram: BitCursor<'_>) -> Result<(UdpHeader, BitCursor<'_>), PacketError> {
    static LAYOUTS: Layouts<1> = OnceLock::new();
    let [layout] = layouts(&LAYOUTS, ["sport : 16 ; dport : 16 ; length : 16 ; checksum : 16 ; ..payload"])?;
    let cases = [layout
        .case(|b| {
            let length = get(b, "length");
            let header = UdpHeader {
                sport: get(b, "sport") as u16,
                dport: get(b, "dport") as u16,
                length: length as u16,
                checksum: get(b, "checksum") as u16,
            };
            (header, payload(b, Some((length - 8) * 8)))
        })
        .guard(|b| get(b, "length") >= 8)];
    Ok(bitmatch(datagram, &cases)?)
}

/// What could be decoded from one captured frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Summary {
    pub ethernet: Option<EthernetHeader>,
    pub ip: Option<IpHeader>,
    pub udp: Option<UdpHeader>,
    /// Bytes left after the innermost decoded header.
    pub payload_len: u64,
}

/// Decode a frame as far as UDP. Frames that are not IP stop after the link header.
pub fn summarize(linktype: Linktype, frame: &[u8]) -> Result<Summary, PacketError> {
    let input = BitCursor::from_bytes(frame);
    let mut summary = Summary::default();
    let (ethertype, l3) = match linktype.0 {
        1 => {
            let (eth, rest) = ethernet(input)?;
            let ethertype = eth.ethertype;
            summary.ethernet = Some(eth);
            (Some(ethertype), rest)
        }
        113 => {
            let (sll, rest) = linux_sll(input)?;
            (Some(sll.protocol), rest)
        }
        // raw IP, IPv4, IPv6
        101 | 228 | 229 => (None, input),
        other => return Err(PacketError::Linktype(other)),
    };
    summary.payload_len = l3.len() / 8;
    if !matches!(ethertype, None | Some(ETHERTYPE_IPV4) | Some(ETHERTYPE_IPV6)) {
        return Ok(summary);
    }
    let (iph, l4) = ip(l3)?;
    let protocol = iph.protocol();
    summary.ip = Some(iph);
    summary.payload_len = l4.len() / 8;
    if protocol == IPPROTO_UDP {
        let (udph, payload) = udp(l4)?;
        summary.udp = Some(udph);
        summary.payload_len = payload.len() / 8;
    }
    Ok(summary)
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(eth) = &self.ethernet {
            let vlan = eth.vlan.map(|v| format!(" vlan {}", v)).unwrap_or_default();
            parts.push(format!("{} > {}{} type 0x{:04x}", eth.src, eth.dst, vlan, eth.ethertype));
        }
        match &self.ip {
            Some(IpHeader::V4(h)) => parts.push(format!("IPv4 {} > {} proto {} ttl {}", h.src, h.dst, h.protocol, h.ttl)),
            Some(IpHeader::V6(h)) => parts.push(format!("IPv6 {} > {} next {} hops {}", h.src, h.dst, h.next_header, h.hop_limit)),
            None => {}
        }
        if let Some(u) = &self.udp {
            parts.push(format!("UDP {} > {}", u.sport, u.dport));
        }
        parts.push(format!("{} bytes", self.payload_len));
        f.write_str(&parts.join(", "))
    }
}
