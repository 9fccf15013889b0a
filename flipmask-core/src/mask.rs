//! Mask and bit-list parsing.
//!
//! Both modes collapse to a single XOR byte. Parsing follows the C library
//! conventions operators already use on the command line: `mask` accepts any
//! `strtoul(.., 0)` literal (`0x0F`, `017`, `15`) and keeps the low eight
//! bits, while `bits` takes a comma or space separated list of positions.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

/// Errors produced while turning a `<mode> <param>` pair into a mask.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaskError {
    #[error("unknown mode '{0}' (expected 'mask' or 'bits')")]
    UnknownMode(String),

    #[error("invalid mask parameter: {0}")]
    InvalidMask(String),

    #[error("invalid bitlist parameter: {0}")]
    InvalidBitList(String),
}

/// How the operator expressed the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskMode {
    Mask,
    Bits,
}

impl MaskMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mask => "mask",
            Self::Bits => "bits",
        }
    }
}

impl FromStr for MaskMode {
    type Err = MaskError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "mask" => Ok(Self::Mask),
            "bits" => Ok(Self::Bits),
            other => Err(MaskError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for MaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single XOR key. Immutable once parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaskSpec(u8);

impl MaskSpec {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// Parse a `<mode> <param>` pair.
    pub fn parse(mode: &str, param: &str) -> Result<Self, MaskError> {
        match mode.parse::<MaskMode>()? {
            MaskMode::Mask => Self::from_mask_literal(param),
            MaskMode::Bits => Self::from_bit_list(param),
        }
    }

    /// Parse an integer literal the way `strtoul(s, &end, 0)` does and keep the
    /// low eight bits. Fails only when no digits are consumed.
    pub fn from_mask_literal(param: &str) -> Result<Self, MaskError> {
        let literal = scan_c_unsigned(param.as_bytes())
            .ok_or_else(|| MaskError::InvalidMask(param.to_string()))?;
        if literal.consumed < param.len() {
            debug!(
                param,
                ignored = &param[literal.consumed..],
                "ignoring trailing characters after mask literal"
            );
        }
        Ok(Self(literal.value.to_le_bytes()[0]))
    }

    /// Parse a list of bit positions (`0,3,7` or `0 3 7`) into a mask with
    /// those bits set. An empty list yields `0x00`.
    pub fn from_bit_list(param: &str) -> Result<Self, MaskError> {
        let invalid = || MaskError::InvalidBitList(param.to_string());
        let bytes = param.as_bytes();
        let mut pos = 0;
        let mut mask = 0u8;

        loop {
            pos = skip_blanks(bytes, pos);
            if pos >= bytes.len() {
                break;
            }
            let (bit, next) = scan_c_signed_decimal(bytes, pos).ok_or_else(invalid)?;
            if !(0..=7).contains(&bit) {
                return Err(invalid());
            }
            mask |= 1u8 << bit;
            pos = skip_blanks(bytes, next);
            if bytes.get(pos) == Some(&b',') {
                pos += 1;
            }
        }

        Ok(Self(mask))
    }

    /// XOR `buf` in place and return how many bytes changed value.
    pub fn apply(self, buf: &mut [u8]) -> u64 {
        let mut changed = 0u64;
        for byte in buf.iter_mut() {
            let after = *byte ^ self.0;
            if after != *byte {
                changed += 1;
            }
            *byte = after;
        }
        changed
    }
}

impl fmt::Display for MaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

impl From<u8> for MaskSpec {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

struct CLiteral {
    value: u64,
    consumed: usize,
}

fn is_c_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

fn skip_blanks(bytes: &[u8], mut pos: usize) -> usize {
    while matches!(bytes.get(pos), Some(b' ' | b'\t')) {
        pos += 1;
    }
    pos
}

/// `strtoul` with base 0: whitespace, optional sign, radix prefix, then the
/// longest run of digits. Overflow saturates, a leading `-` negates modulo
/// 2^64.
fn scan_c_unsigned(bytes: &[u8]) -> Option<CLiteral> {
    let mut pos = 0;
    while bytes.get(pos).copied().is_some_and(is_c_space) {
        pos += 1;
    }

    let negative = match bytes.get(pos) {
        Some(b'-') => {
            pos += 1;
            true
        }
        Some(b'+') => {
            pos += 1;
            false
        }
        _ => false,
    };

    let starts_hex = bytes.get(pos) == Some(&b'0')
        && matches!(bytes.get(pos + 1), Some(b'x' | b'X'))
        && bytes.get(pos + 2).is_some_and(u8::is_ascii_hexdigit);

    let (radix, digits_start) = if starts_hex {
        (16, pos + 2)
    } else if bytes.get(pos) == Some(&b'0') {
        (8, pos)
    } else {
        (10, pos)
    };

    let mut end = digits_start;
    let mut value = 0u64;
    let mut overflowed = false;
    while let Some(digit) = bytes
        .get(end)
        .and_then(|byte| char::from(*byte).to_digit(radix))
    {
        match value
            .checked_mul(u64::from(radix))
            .and_then(|v| v.checked_add(u64::from(digit)))
        {
            Some(next) => value = next,
            None => overflowed = true,
        }
        end += 1;
    }

    if end == digits_start {
        return None;
    }

    let value = if overflowed {
        u64::MAX
    } else if negative {
        value.wrapping_neg()
    } else {
        value
    };
    Some(CLiteral {
        value,
        consumed: end,
    })
}

/// `strtol(.., 10)` starting at `pos`; returns the value and the index after
/// the last digit.
fn scan_c_signed_decimal(bytes: &[u8], mut pos: usize) -> Option<(i64, usize)> {
    while bytes.get(pos).copied().is_some_and(is_c_space) {
        pos += 1;
    }
    let negative = match bytes.get(pos) {
        Some(b'-') => {
            pos += 1;
            true
        }
        Some(b'+') => {
            pos += 1;
            false
        }
        _ => false,
    };

    let start = pos;
    let mut value = 0i64;
    while let Some(byte) = bytes.get(pos).filter(|byte| byte.is_ascii_digit()) {
        value = value
            .saturating_mul(10)
            .saturating_add(i64::from(byte - b'0'));
        pos += 1;
    }
    if pos == start {
        return None;
    }
    Some((if negative { -value } else { value }, pos))
}
