//! Runtime values bound by a match or supplied to a construction.

use crate::bits::{BitCursor, Bitstring};
use std::collections::HashMap;

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<'a> {
    Unsigned(u64),
    Signed(i64),
    /// Bytes of a string field (not necessarily UTF-8).
    Text(Vec<u8>),
    Bits(BitCursor<'a>),
}

impl<'a> Value<'a> {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Unsigned(x) => Some(*x),
            Value::Signed(x) => (*x).try_into().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Signed(x) => Some(*x),
            Value::Unsigned(x) => (*x).try_into().ok(),
            _ => None,
        }
    }

    /// Any integer value, widened losslessly.
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Unsigned(x) => Some(*x as i128),
            Value::Signed(x) => Some(*x as i128),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_int().map(|v| v != 0)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Text(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_bits(&self) -> Option<BitCursor<'a>> {
        match self {
            Value::Bits(c) => Some(*c),
            _ => None,
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Unsigned(_) => "unsigned",
            Value::Signed(_) => "signed",
            Value::Text(_) => "string",
            Value::Bits(_) => "bitstring",
        }
    }
}

macro_rules! from_int {
    ($variant:ident, $wide:ty, $($t:ty),*) => {
        $(impl From<$t> for Value<'_> {
            fn from(v: $t) -> Self {
                Value::$variant(v as $wide)
            }
        })*
    };
}

from_int!(Unsigned, u64, u8, u16, u32, u64, usize);
from_int!(Signed, i64, i8, i16, i32, i64, isize);

impl From<bool> for Value<'_> {
    fn from(v: bool) -> Self {
        Value::Unsigned(v as u64)
    }
}

impl From<&str> for Value<'_> {
    fn from(v: &str) -> Self {
        Value::Text(v.as_bytes().to_vec())
    }
}

impl From<String> for Value<'_> {
    fn from(v: String) -> Self {
        Value::Text(v.into_bytes())
    }
}

impl From<&[u8]> for Value<'_> {
    fn from(v: &[u8]) -> Self {
        Value::Text(v.to_vec())
    }
}

impl From<Vec<u8>> for Value<'_> {
    fn from(v: Vec<u8>) -> Self {
        Value::Text(v)
    }
}

impl<'a> From<BitCursor<'a>> for Value<'a> {
    fn from(v: BitCursor<'a>) -> Self {
        Value::Bits(v)
    }
}

impl<'a> From<&'a Bitstring> for Value<'a> {
    fn from(v: &'a Bitstring) -> Self {
        Value::Bits(v.as_cursor())
    }
}

/// Named values in scope: the fields bound so far in a case, or the
/// variables available to a construction's width expressions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings<'a> {
    values: HashMap<String, Value<'a>>,
}

impl<'a> Bindings<'a> {
    pub fn new() -> Self {
        Bindings::default()
    }

    /// Bind `name`, shadowing any earlier binding.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value<'a>>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value<'a>>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value<'a>> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_u64)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn int(&self, name: &str) -> Option<i128> {
        self.get(name).and_then(Value::as_int)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        self.get(name).and_then(Value::as_bytes)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn bits(&self, name: &str) -> Option<BitCursor<'a>> {
        self.get(name).and_then(Value::as_bits)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value<'a>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
