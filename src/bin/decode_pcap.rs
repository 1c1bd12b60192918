use bitmatch::packet::summarize;
use bitmatch::pcap::read_frames;
use std::path::PathBuf;

const USAGE: &str = "usage: decode_pcap [--verbose|-v] [--frame=N] FILE";

struct Args {
    verbose: bool,
    /// 1-based frame number to decode alone.
    frame: Option<u64>,
    pcap_path: PathBuf,
}

fn parse_args(mut raw_args: Vec<String>) -> anyhow::Result<Args> {
    let verbose = if let Some(pos) = raw_args.iter().position(|a| a == "--verbose" || a == "-v") {
        raw_args.remove(pos);
        true
    } else {
        false
    };
    let frame = match raw_args.iter().position(|a| a.starts_with("--frame=")) {
        Some(pos) => {
            let arg = raw_args.remove(pos);
            let value = &arg["--frame=".len()..];
            match value.parse::<u64>() {
                Ok(n) if n > 0 => Some(n),
                _ => anyhow::bail!("--frame expects a frame number from 1, got {:?}\n{}", value, USAGE),
            }
        }
        None => None,
    };
    let pcap_path = raw_args
        .into_iter()
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!(USAGE))?;
    Ok(Args {
        verbose,
        frame,
        pcap_path,
    })
}

fn main() -> anyhow::Result<()> {
    let Args {
        verbose,
        frame: frame_filter,
        pcap_path,
    } = parse_args(std::env::args().skip(1).collect())?;

    if verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(std::io::stderr)
            .init();
    }

    let frames = read_frames(&pcap_path)?;
    let mut decoded: u64 = 0;
    let mut udp_count: u64 = 0;
    let mut failed: u64 = 0;
    for (i, (linktype, data)) in frames.iter().enumerate() {
        let number = i as u64 + 1;
        if frame_filter.is_some_and(|n| n != number) {
            continue;
        }
        match summarize(*linktype, data) {
            Ok(summary) => {
                decoded += 1;
                if summary.udp.is_some() {
                    udp_count += 1;
                }
                println!("{:6} {}", number, summary);
            }
            Err(e) => {
                failed += 1;
                println!("{:6} error: {}", number, e);
            }
        }
    }

    eprintln!("pcap: {}", pcap_path.display());
    eprintln!("frames: {}", frames.len());
    eprintln!("decoded: {}", decoded);
    eprintln!("udp: {}", udp_count);
    eprintln!("failed: {}", failed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn frame_and_verbose() {
        let parsed = parse_args(args(&["-v", "--frame=3", "capture.pcap"])).unwrap();
        assert!(parsed.verbose);
        assert_eq!(parsed.frame, Some(3));
        assert_eq!(parsed.pcap_path, PathBuf::from("capture.pcap"));
    }

    #[test]
    fn bad_frame_number_is_an_error() {
        for bad in ["--frame=abc", "--frame=", "--frame=0", "--frame=-2"] {
            let err = parse_args(args(&[bad, "capture.pcap"])).err().expect("rejected");
            assert!(err.to_string().starts_with("--frame expects"), "{}", err);
        }
    }

    #[test]
    fn missing_file_is_a_usage_error() {
        let err = parse_args(args(&["--frame=1"])).err().expect("rejected");
        assert_eq!(err.to_string(), USAGE);
    }
}
