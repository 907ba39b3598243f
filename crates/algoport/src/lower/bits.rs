//! Fixed-width integer facts shared by the bitwise lowerings.
//!
//! JavaScript bitwise operators work on 32-bit two's complement integers;
//! Perl's are 64-bit unsigned and Ruby's are unbounded, so every target
//! masks and sign-extends explicitly.

use crate::input::JsNode;

/// Sign bit of a 32-bit word.
pub const INT32_SIGN: u64 = 0x8000_0000;

/// A rotation of a `bits`-wide word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    pub bits: u32,
    /// All `bits` low bits set.
    pub mask: u64,
    pub left: bool,
}

impl Rotation {
    /// `None` for widths outside `1..=64`.
    pub fn new(bits: u32, left: bool) -> Option<Self> {
        if !(1..=64).contains(&bits) {
            return None;
        }
        Some(Self {
            bits,
            mask: u64::MAX >> (64 - bits),
            left,
        })
    }

    /// Whether a literal amount is already below the width, so it needs no
    /// `% bits` reduction.
    pub fn in_range(&self, literal: &str) -> bool {
        literal.parse::<u32>().is_ok_and(|v| v < self.bits)
    }
}

/// A rotation width read from an input field (possibly fractional or
/// negative), or `None` when no target can express it.
pub fn rotation_width(value: f64) -> Option<u32> {
    (value.fract() == 0.0 && (1.0..=64.0).contains(&value)).then_some(value as u32)
}

/// A non-negative integer literal below the 32-bit sign bit. `x & m` with
/// such an `m` is already a valid int32, so it needs no sign restoration.
pub fn is_int31_literal(node: JsNode<'_>) -> bool {
    let node = node.unwrapped();
    node.js_type() == "Literal"
        && node
            .number_field("value")
            .is_some_and(|v| v.fract() == 0.0 && (0.0..INT32_SIGN as f64).contains(&v))
}

/// The sign bit of a 32-bit word after an arithmetic right shift by `amount`.
pub fn shifted_sign(amount: u32) -> u64 {
    INT32_SIGN >> (amount & 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rotation_mask_covers_full_width() {
        assert_eq!(Rotation::new(64, true).map(|r| r.mask), Some(u64::MAX));
        assert_eq!(Rotation::new(32, false).map(|r| r.mask), Some(0xFFFF_FFFF));
        assert_eq!(Rotation::new(8, true).map(|r| r.mask), Some(0xFF));
        assert_eq!(Rotation::new(1, true).map(|r| r.mask), Some(1));
    }

    #[test]
    fn test_rotation_rejects_unusable_widths() {
        assert!(Rotation::new(0, true).is_none());
        assert!(Rotation::new(65, false).is_none());
        assert_eq!(rotation_width(64.0), Some(64));
        assert_eq!(rotation_width(0.0), None);
        assert_eq!(rotation_width(-8.0), None);
        assert_eq!(rotation_width(12.5), None);
    }

    #[test]
    fn test_rotation_literal_range() {
        let r = Rotation::new(64, false).unwrap();
        assert!(r.in_range("24"));
        assert!(r.in_range("63"));
        assert!(!r.in_range("64"));
        assert!(!r.in_range("n"));
    }

    #[test]
    fn test_int31_literal() {
        let cases = [
            (json!({"type": "Literal", "value": 255}), true),
            (json!({"type": "Literal", "value": 0x7FFF_FFFF_u32}), true),
            (json!({"type": "Literal", "value": 0x8000_0000_u32}), false),
            (json!({"type": "Literal", "value": -1}), false),
            (json!({"type": "Literal", "value": 1.5}), false),
            (json!({"type": "Identifier", "name": "m"}), false),
        ];
        for (value, expected) in cases {
            let node = JsNode::new(&value).unwrap();
            assert_eq!(is_int31_literal(node), expected, "{value}");
        }
    }

    #[test]
    fn test_shifted_sign() {
        assert_eq!(shifted_sign(0), 0x8000_0000);
        assert_eq!(shifted_sign(1), 0x4000_0000);
        assert_eq!(shifted_sign(31), 1);
        assert_eq!(shifted_sign(33), 0x4000_0000);
    }
}
