//! Three-valued bit model used by encoding diagrams, plus its textual codec.
//!
//! A diagram box lists one token per bit: `x` for a don't-care, `0`/`1` for a fixed bit, and
//! `(0)`/`(1)` for a bit the architecture fixes but documents as unpredictable when violated.

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

use super::error::IsaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bit {
    Zero,
    One,
}

impl Bit {
    pub fn from_u32(value: u32) -> Self {
        if value & 1 == 0 { Bit::Zero } else { Bit::One }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Bit::Zero => 0,
            Bit::One => 1,
        }
    }
}

impl fmt::Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Bit::Zero => "0",
            Bit::One => "1",
        })
    }
}

/// Value of one diagram position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitValue {
    Unbound,
    Bound(Bit),
    Unpredictable(Bit),
}

impl BitValue {
    /// The listed bit, for both bound and unpredictably bound positions.
    pub fn bit(self) -> Option<Bit> {
        match self {
            BitValue::Unbound => None,
            BitValue::Bound(bit) | BitValue::Unpredictable(bit) => Some(bit),
        }
    }

    pub fn is_unbound(self) -> bool {
        matches!(self, BitValue::Unbound)
    }

    /// Strictly bound: unpredictable bits do not count.
    pub fn is_bound(self) -> bool {
        matches!(self, BitValue::Bound(_))
    }

    /// Whether a word carrying `bit` at this position can belong to the encoding.
    pub fn admits(self, bit: Bit) -> bool {
        match self {
            BitValue::Unbound => true,
            BitValue::Bound(own) | BitValue::Unpredictable(own) => own == bit,
        }
    }
}

impl FromStr for BitValue {
    type Err = IsaError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "x" => Ok(BitValue::Unbound),
            "0" => Ok(BitValue::Bound(Bit::Zero)),
            "1" => Ok(BitValue::Bound(Bit::One)),
            "(0)" => Ok(BitValue::Unpredictable(Bit::Zero)),
            "(1)" => Ok(BitValue::Unpredictable(Bit::One)),
            other => Err(IsaError::Format(other.to_string())),
        }
    }
}

impl fmt::Display for BitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitValue::Unbound => f.write_str("x"),
            BitValue::Bound(bit) => write!(f, "{bit}"),
            BitValue::Unpredictable(bit) => write!(f, "({bit})"),
        }
    }
}

pub fn parse(text: &str) -> Result<BitValue, IsaError> {
    text.parse()
}

pub fn render(value: BitValue) -> String {
    value.to_string()
}

pub type BitPattern = SmallVec<[BitValue; 8]>;

/// Splits a concatenated pattern such as `1(0)x0` into per-bit values.
pub fn parse_pattern(text: &str) -> Result<BitPattern, IsaError> {
    let mut values = BitPattern::new();
    let mut rest = text;
    while !rest.is_empty() {
        let token_len = if rest.starts_with('(') {
            match rest.find(')') {
                Some(close) => close + 1,
                None => return Err(IsaError::Format(rest.to_string())),
            }
        } else {
            rest.chars().next().map(char::len_utf8).unwrap_or(1)
        };
        let (token, tail) = rest.split_at(token_len);
        values.push(parse(token)?);
        rest = tail;
    }
    Ok(values)
}

pub fn render_pattern(values: &[BitValue]) -> String {
    values.iter().map(|value| value.to_string()).collect()
}
