//! Notation fuzz target: arbitrary text through both field-list parsers.
//! Neither may panic. Build with: cargo fuzz run notation_fuzz

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    let _ = bitmatch::parse_fields(s);
    let _ = bitmatch::parse_layout(s);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run notation_fuzz");
}
