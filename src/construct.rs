//! Construct engine: append typed field values to a fresh [`BitBuffer`].
//!
//! Construction is strictly sequential. The first width, length or range
//! violation aborts the whole call with a [`ConstructError`] naming the field
//! and the call site; no partial buffer is returned.

use crate::bits::Bitstring;
use crate::buffer::BitBuffer;
use crate::codec::{append_bits, append_int, append_text};
use crate::error::{ConstructError, ConstructFailure, DefinitionError, SourceLoc};
use crate::field::{FieldSpec, Kind, Width, REST};
use crate::value::{Bindings, Value};

/// A descriptor paired with the value to write.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructField<'a> {
    spec: FieldSpec,
    value: Value<'a>,
}

impl<'a> ConstructField<'a> {
    /// Match-only qualifiers (`save_offset_to`) are rejected.
    pub fn new(spec: FieldSpec, value: impl Into<Value<'a>>) -> Result<Self, DefinitionError> {
        if spec.save_offset_to().is_some() {
            return Err(DefinitionError::MatchOnly("save_offset_to".to_string()));
        }
        Ok(ConstructField {
            spec,
            value: value.into(),
        })
    }

    /// Caller has already rejected match-only qualifiers.
    pub(crate) fn from_parts(spec: FieldSpec, value: Value<'a>) -> Self {
        debug_assert!(spec.save_offset_to().is_none());
        ConstructField { spec, value }
    }

    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }

    pub fn value(&self) -> &Value<'a> {
        &self.value
    }
}

fn resolve_width(spec: &FieldSpec, env: &Bindings<'_>) -> Result<i64, ConstructFailure> {
    match spec.width() {
        Width::Const(w) => Ok(*w),
        Width::Dynamic(expr) => Ok(expr.eval(env)?),
    }
}

fn wrong_value(kind: Kind, value: &Value<'_>) -> ConstructFailure {
    ConstructFailure::ValueKind {
        kind,
        value: value.type_name(),
    }
}

fn append_field(buf: &mut BitBuffer, field: &ConstructField<'_>, env: &Bindings<'_>) -> Result<(), ConstructFailure> {
    let spec = &field.spec;
    let dynamic = matches!(spec.width(), Width::Dynamic(_));
    let width = resolve_width(spec, env)?;
    match spec.kind() {
        Kind::Int => {
            if !(1..=64).contains(&width) {
                if !dynamic {
                    unreachable!("int field with unvalidated constant width {}", width);
                }
                return Err(ConstructFailure::IntWidth(width));
            }
            let value = field.value.as_int().ok_or_else(|| wrong_value(Kind::Int, &field.value))?;
            append_int(buf, value, width as u32, spec.endian(), spec.is_signed())
        }
        Kind::Text => {
            let bytes = field.value.as_bytes().ok_or_else(|| wrong_value(Kind::Text, &field.value))?;
            let actual = bytes.len() as u64 * 8;
            if !dynamic && width == REST {
                append_text(buf, bytes);
                return Ok(());
            }
            if width <= 0 || width % 8 != 0 {
                if !dynamic {
                    unreachable!("string field with unvalidated constant width {}", width);
                }
                return Err(ConstructFailure::TextWidth(width));
            }
            if width as u64 != actual {
                return Err(ConstructFailure::TextLength { declared: width, actual });
            }
            append_text(buf, bytes);
            Ok(())
        }
        Kind::Bits => {
            let bits = field.value.as_bits().ok_or_else(|| wrong_value(Kind::Bits, &field.value))?;
            if !dynamic && width == REST {
                append_bits(buf, bits);
                return Ok(());
            }
            if dynamic && width <= 0 {
                return Err(ConstructFailure::BitsWidth(width));
            }
            // a constant zero width produces an empty region whatever the value
            if width == 0 {
                return Ok(());
            }
            if width as u64 != bits.len() {
                return Err(ConstructFailure::BitsLength {
                    declared: width,
                    actual: bits.len(),
                });
            }
            append_bits(buf, bits);
            Ok(())
        }
    }
}

fn run_fields<'a>(
    fields: &[ConstructField<'a>],
    env: &Bindings<'_>,
    loc: SourceLoc,
) -> Result<Bitstring, ConstructError> {
    let mut buf = BitBuffer::new();
    for (index, field) in fields.iter().enumerate() {
        if let Err(reason) = append_field(&mut buf, field, env) {
            tracing::debug!(target: "bitmatch::construct", field = index, %reason, %loc, "construct failed");
            return Err(ConstructError {
                reason,
                field: index,
                loc,
            });
        }
        tracing::trace!(target: "bitmatch::construct", field = index, bits = buf.len(), "field appended");
    }
    Ok(buf.finish())
}

/// Build a bitstring from `fields` in order.
#[track_caller]
pub fn construct(fields: &[ConstructField<'_>]) -> Result<Bitstring, ConstructError> {
    run_fields(fields, &Bindings::new(), SourceLoc::caller())
}

/// Fluent form of [`construct`]. Run-time widths are evaluated against the
/// environment given to [`with_env`](Self::with_env).
#[derive(Debug, Clone)]
pub struct Construct<'a> {
    fields: Vec<ConstructField<'a>>,
    env: Bindings<'a>,
    loc: SourceLoc,
}

impl<'a> Construct<'a> {
    #[track_caller]
    pub fn new() -> Self {
        Construct {
            fields: Vec::new(),
            env: Bindings::new(),
            loc: SourceLoc::caller(),
        }
    }

    pub fn with_env(mut self, env: Bindings<'a>) -> Self {
        self.env = env;
        self
    }

    pub fn field(mut self, spec: FieldSpec, value: impl Into<Value<'a>>) -> Result<Self, DefinitionError> {
        self.fields.push(ConstructField::new(spec, value)?);
        Ok(self)
    }

    pub fn push(&mut self, field: ConstructField<'a>) {
        self.fields.push(field);
    }

    pub fn fields(&self) -> &[ConstructField<'a>] {
        &self.fields
    }

    pub fn build(&self) -> Result<Bitstring, ConstructError> {
        run_fields(&self.fields, &self.env, self.loc)
    }
}

impl Default for Construct<'_> {
    #[track_caller]
    fn default() -> Self {
        Construct::new()
    }
}
