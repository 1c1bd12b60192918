//! # bitmatch: bit-level pattern matching and construction
//!
//! Binary data is described as a sequence of fields, each with a pattern, a
//! width in bits and qualifiers for type, signedness and endianness. The same
//! descriptors drive two engines:
//!
//! - **Match**: try an ordered list of cases against a [`BitCursor`] and run the
//!   first case whose fields and guard succeed ([`bitmatch`], [`Matcher`]).
//! - **Construct**: append typed values to a fresh bit buffer and return a
//!   [`Bitstring`] ([`construct`], [`Construct`]).
//!
//! Bits are numbered most significant first. Fields need not be byte aligned,
//! and widths may be arithmetic over names bound by earlier fields.
//!
//! ## Notation
//!
//! ```text
//! 4 : 4 ; hdrlen : 4 ; tos : 8 ; length : 16 ;
//! options : (hdrlen - 5) * 32 : bitstring ; ..payload
//! ```
//!
//! See [`notation`] for the grammar and [`packet`] for decoders written with it.

pub mod bits;
pub mod buffer;
pub mod codec;
pub mod construct;
pub mod error;
pub mod field;
pub mod matcher;
pub mod notation;
pub mod packet;
pub mod pcap;
pub mod value;

pub use bits::{BitCursor, Bitstring};
pub use buffer::BitBuffer;
pub use codec::Endian;
pub use construct::{construct, Construct, ConstructField};
pub use error::{
    BitsError, ConstructError, ConstructFailure, DefinitionError, EvalError, MatchError, SourceLoc,
};
pub use field::{FieldSpec, Kind, Literal, MatchField, Pattern, Qualifier, Width, WidthExpr, REST};
pub use matcher::{bitmatch, Case, Matcher};
pub use notation::{parse_fields, parse_layout, FieldList, Layout, NotationError};
pub use value::{Bindings, Value};
