//! Load every frame of a legacy pcap or pcapng capture.

use pcap_parser::pcapng::Block as PcapNgBlock;
use pcap_parser::traits::{PcapNGPacketBlock, PcapReaderIterator};
use pcap_parser::{Linktype, PcapBlockOwned};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];
const BUFFER_SIZE: usize = 1 << 20;

#[derive(Debug, thiserror::Error)]
pub enum PcapError {
    #[error("capture i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("pcap read error: {0}")]
    Read(String),
}

fn read_error(context: &str, e: impl std::fmt::Debug) -> PcapError {
    PcapError::Read(format!("{}: {:?}", context, e))
}

/// Frames with the link type of the interface they were captured on.
/// The format is chosen from the file's magic number.
pub fn read_frames(path: impl AsRef<Path>) -> Result<Vec<(Linktype, Vec<u8>)>, PcapError> {
    let path = path.as_ref();
    let mut probe = [0u8; 4];
    File::open(path)?.read_exact(&mut probe)?;
    let file = File::open(path)?;
    let frames = if probe == PCAPNG_MAGIC {
        read_pcapng(file)?
    } else {
        read_legacy(file)?
    };
    tracing::debug!(path = %path.display(), frames = frames.len(), "capture loaded");
    Ok(frames)
}

fn read_legacy<R: Read>(file: R) -> Result<Vec<(Linktype, Vec<u8>)>, PcapError> {
    let mut reader =
        pcap_parser::pcap::LegacyPcapReader::new(BUFFER_SIZE, file).map_err(|e| read_error("pcap header", e))?;
    let mut linktype = Linktype::ETHERNET;
    let mut frames = Vec::new();
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(h) => linktype = h.network,
                    PcapBlockOwned::Legacy(b) => frames.push((linktype, b.data.to_vec())),
                    PcapBlockOwned::NG(_) => {}
                }
                reader.consume(offset);
            }
            Err(pcap_parser::PcapError::Eof) => break,
            Err(pcap_parser::PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| read_error("pcap refill", e))?;
            }
            Err(e) => return Err(read_error("pcap", e)),
        }
    }
    Ok(frames)
}

fn read_pcapng<R: Read>(file: R) -> Result<Vec<(Linktype, Vec<u8>)>, PcapError> {
    let mut reader =
        pcap_parser::pcapng::PcapNGReader::new(BUFFER_SIZE, file).map_err(|e| read_error("pcapng header", e))?;
    let mut if_linktypes: Vec<Linktype> = Vec::new();
    let mut frames = Vec::new();
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                if let PcapBlockOwned::NG(b) = block {
                    match &b {
                        PcapNgBlock::SectionHeader(_) => if_linktypes.clear(),
                        PcapNgBlock::InterfaceDescription(idb) => if_linktypes.push(idb.linktype),
                        PcapNgBlock::EnhancedPacket(epb) => {
                            let lt = if_linktypes.get(epb.if_id as usize).copied().unwrap_or(Linktype::ETHERNET);
                            frames.push((lt, epb.packet_data().to_vec()));
                        }
                        PcapNgBlock::SimplePacket(spb) => {
                            let lt = if_linktypes.first().copied().unwrap_or(Linktype::ETHERNET);
                            frames.push((lt, spb.packet_data().to_vec()));
                        }
                        _ => {}
                    }
                }
                reader.consume(offset);
            }
            Err(pcap_parser::PcapError::Eof) => break,
            Err(pcap_parser::PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| read_error("pcapng refill", e))?;
            }
            Err(e) => return Err(read_error("pcapng", e)),
        }
    }
    Ok(frames)
}
