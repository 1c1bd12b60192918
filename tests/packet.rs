//! Packet decoder tests over frames built with layouts, plus capture loading.

use bitmatch::packet::{self, IpHeader, MacAddr, PacketError};
use bitmatch::pcap::read_frames;
use bitmatch::{parse_layout, BitCursor, Bindings, Bitstring};
use pcap_parser::Linktype;
use std::io::Write;
use std::net::{Ipv4Addr, Ipv6Addr};

const ETHERNET: &str = "dst : 48 ; src : 48 ; ethertype : 16 ; body : -1 : bitstring";
const VLAN: &str = "dst : 48 ; src : 48 ; 0x8100 : 16 ; 0 : 4 ; vid : 12 ; ethertype : 16 ; body : -1 : bitstring";
const IPV4: &str = "4 : 4 ; hdrlen : 4 ; 0 : 8 ; length : 16 ; 1 : 16 ; 2 : 3 ; 0 : 13 ;
                    64 : 8 ; protocol : 8 ; 0 : 16 ; src : 32 ; dst : 32 ;
                    options : -1 : bitstring ; body : -1 : bitstring";
const UDP: &str = "sport : 16 ; dport : 16 ; length : 16 ; 0 : 16 ; payload : -1 : string";

fn build(layout: &str, values: Bindings<'_>) -> Bitstring {
    parse_layout(layout).expect("layout").build(&values).expect("build")
}

fn udp(sport: u16, dport: u16, payload: &[u8]) -> Bitstring {
    let values = Bindings::new()
        .with("sport", sport)
        .with("dport", dport)
        .with("length", 8 + payload.len() as u16)
        .with("payload", payload);
    build(UDP, values)
}

fn ipv4(protocol: u8, options: &[u8], body: &Bitstring) -> Bitstring {
    let options = Bitstring::from_bytes(options.to_vec());
    let hdrlen = 5 + options.len() / 32;
    let values = Bindings::new()
        .with("hdrlen", hdrlen)
        .with("length", hdrlen * 4 + body.len() / 8)
        .with("protocol", protocol)
        .with("src", 0x0a00_0001u32)
        .with("dst", 0xc0a8_0102u32)
        .with("options", &options)
        .with("body", body);
    build(IPV4, values)
}

fn ethernet(ethertype: u16, body: &Bitstring) -> Bitstring {
    let values = Bindings::new()
        .with("dst", 0xffff_ffff_ffffu64)
        .with("src", 0x0200_0000_0001u64)
        .with("ethertype", ethertype)
        .with("body", body);
    build(ETHERNET, values)
}

#[test]
fn test_ethernet_ipv4_udp() {
    let frame = ethernet(0x0800, &ipv4(17, &[], &udp(5353, 53, b"query")));
    let summary = packet::summarize(Linktype::ETHERNET, frame.as_bytes()).expect("summarize");
    let eth = summary.ethernet.as_ref().expect("ethernet");
    assert_eq!(eth.src, MacAddr(0x0200_0000_0001));
    assert_eq!(eth.vlan, None);
    match summary.ip.as_ref().expect("ip") {
        IpHeader::V4(h) => {
            assert_eq!(h.src, Ipv4Addr::new(10, 0, 0, 1));
            assert_eq!(h.dst, Ipv4Addr::new(192, 168, 1, 2));
            assert_eq!(h.ttl, 64);
            assert_eq!(h.flags, 2);
            assert!(h.options.is_empty());
        }
        other => panic!("expected IPv4, got {:?}", other),
    }
    let udp = summary.udp.as_ref().expect("udp");
    assert_eq!((udp.sport, udp.dport, udp.length), (5353, 53, 13));
    assert_eq!(summary.payload_len, 5);
    assert_eq!(
        summary.to_string(),
        "02:00:00:00:00:01 > ff:ff:ff:ff:ff:ff type 0x0800, IPv4 10.0.0.1 > 192.168.1.2 proto 17 ttl 64, UDP 5353 > 53, 5 bytes"
    );
}

#[test]
fn test_ipv4_options_and_trailer() {
    let mut frame = ethernet(0x0800, &ipv4(17, &[1, 1, 1, 0], &udp(1, 2, b"xy"))).into_bytes();
    // Ethernet padding after the IP datagram is not payload.
    frame.extend_from_slice(&[0; 6]);
    let cur = BitCursor::from_bytes(&frame);
    let (_, l3) = packet::ethernet(cur).expect("ethernet");
    let (ip, l4) = packet::ip(l3).expect("ip");
    match &ip {
        IpHeader::V4(h) => {
            assert_eq!(h.hdrlen, 6);
            assert_eq!(h.options, vec![1, 1, 1, 0]);
        }
        other => panic!("expected IPv4, got {:?}", other),
    }
    assert_eq!(l4.len(), 10 * 8);
    let (_, payload) = packet::udp(l4).expect("udp");
    assert_eq!(payload.to_bytes(), b"xy".to_vec());
    // payloads are views into the captured frame
    assert!(std::ptr::eq(payload.data(), &frame[..]));
    assert_eq!(payload.offset(), (14 + 24 + 8) * 8);
}

#[test]
fn test_vlan_tag() {
    let inner = ipv4(6, &[], &Bitstring::from_bytes(vec![0; 20]));
    let values = Bindings::new()
        .with("dst", 1u64)
        .with("src", 2u64)
        .with("vid", 100u16)
        .with("ethertype", 0x0800u16)
        .with("body", &inner);
    let frame = build(VLAN, values);
    let summary = packet::summarize(Linktype::ETHERNET, frame.as_bytes()).expect("summarize");
    assert_eq!(summary.ethernet.as_ref().and_then(|e| e.vlan), Some(100));
    assert_eq!(summary.ip.as_ref().map(IpHeader::protocol), Some(6));
    assert!(summary.udp.is_none());
    assert_eq!(summary.payload_len, 20);
}

#[test]
fn test_non_ip_ethertype_stops_at_link_layer() {
    let frame = ethernet(0x0806, &Bitstring::from_bytes(vec![0; 28]));
    let summary = packet::summarize(Linktype::ETHERNET, frame.as_bytes()).expect("summarize");
    assert!(summary.ip.is_none());
    assert_eq!(summary.payload_len, 28);
}

#[test]
fn test_length_ethertype_is_rejected() {
    let frame = ethernet(0x0040, &Bitstring::from_bytes(vec![0; 64]));
    assert!(matches!(
        packet::summarize(Linktype::ETHERNET, frame.as_bytes()),
        Err(PacketError::NoMatch(_))
    ));
}

#[test]
fn test_truncated_udp_header() {
    let mut frame = ethernet(0x0800, &ipv4(17, &[], &udp(1, 2, b""))).into_bytes();
    frame.truncate(14 + 20 + 4);
    // total length still claims the full datagram; the UDP header is cut short
    assert!(packet::summarize(Linktype::ETHERNET, &frame).is_err());
}

#[test]
fn test_raw_ipv6() {
    let src: Ipv6Addr = "2001:db8::1".parse().expect("addr");
    let dst: Ipv6Addr = "fe80::2".parse().expect("addr");
    let datagram = udp(546, 547, b"dhcp");
    let split = |a: Ipv6Addr| {
        let v = u128::from(a);
        ((v >> 64) as u64, v as u64)
    };
    let values = Bindings::new()
        .with("plen", datagram.len() / 8)
        .with("src_hi", split(src).0)
        .with("src_lo", split(src).1)
        .with("dst_hi", split(dst).0)
        .with("dst_lo", split(dst).1)
        .with("body", &datagram);
    let frame = build(
        "6 : 4 ; 0 : 8 ; 0x12345 : 20 ; plen : 16 ; 17 : 8 ; 255 : 8 ;
         src_hi : 64 ; src_lo : 64 ; dst_hi : 64 ; dst_lo : 64 ; body : -1 : bitstring",
        values,
    );
    let summary = packet::summarize(Linktype::RAW, frame.as_bytes()).expect("summarize");
    match summary.ip.as_ref().expect("ip") {
        IpHeader::V6(h) => {
            assert_eq!(h.src, src);
            assert_eq!(h.dst, dst);
            assert_eq!(h.flow_label, 0x12345);
            assert_eq!(h.hop_limit, 255);
        }
        other => panic!("expected IPv6, got {:?}", other),
    }
    assert_eq!(summary.udp.as_ref().map(|u| u.dport), Some(547));
    assert_eq!(summary.payload_len, 4);
}

#[test]
fn test_linux_sll() {
    let inner = ipv4(17, &[], &udp(7, 9, b"echo"));
    let values = Bindings::new().with("protocol", 0x0800u16).with("body", &inner);
    let frame = build(
        "0 : 16 ; 1 : 16 ; 6 : 16 ; 0x0200000000010000 : 64 ; protocol : 16 ; body : -1 : bitstring",
        values,
    );
    let summary = packet::summarize(Linktype::LINUX_SLL, frame.as_bytes()).expect("summarize");
    assert!(summary.ethernet.is_none());
    assert_eq!(summary.udp.as_ref().map(|u| u.sport), Some(7));
    assert_eq!(summary.payload_len, 4);
}

#[test]
fn test_unsupported_linktype() {
    assert_eq!(
        packet::summarize(Linktype(147), &[0; 40]),
        Err(PacketError::Linktype(147))
    );
}

fn legacy_pcap(linktype: u32, frames: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&linktype.to_le_bytes());
    for (i, frame) in frames.iter().enumerate() {
        out.extend_from_slice(&(1_700_000_000 + i as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        out.extend_from_slice(frame);
    }
    out
}

#[test]
fn test_read_legacy_pcap() {
    let a = ethernet(0x0800, &ipv4(17, &[], &udp(1000, 2000, b"first")));
    let b = ethernet(0x0806, &Bitstring::from_bytes(vec![0; 28]));
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(&legacy_pcap(1, &[a.as_bytes(), b.as_bytes()])).expect("write");
    file.flush().expect("flush");

    let frames = read_frames(file.path()).expect("read");
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].0, Linktype::ETHERNET);
    assert_eq!(frames[0].1, a.as_bytes());
    let summary = packet::summarize(frames[0].0, &frames[0].1).expect("summarize");
    assert_eq!(summary.udp.as_ref().map(|u| u.dport), Some(2000));
    assert_eq!(frames[1].1.len(), 14 + 28);
}

#[test]
fn test_read_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(read_frames(dir.path().join("absent.pcap")).is_err());
}
