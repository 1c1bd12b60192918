//! Decoder fuzz target: arbitrary frames through the packet decoders.
//! Matching must fail with an error, never panic. Build with: cargo fuzz run match_fuzz

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    use pcap_parser::Linktype;
    for lt in [Linktype::ETHERNET, Linktype::LINUX_SLL, Linktype::RAW] {
        let _ = bitmatch::packet::summarize(lt, data);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run match_fuzz");
}
