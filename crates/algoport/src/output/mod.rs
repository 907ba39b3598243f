//! Per-language transformers and emitters.
//!
//! Each target lives in its own module with the same three parts: `ast`
//! (the closed target tree), `transform` (input tree to target tree) and
//! `emit` (target tree to text), plus a plugin type tying them together.

#[cfg(feature = "target-perl")]
pub mod perl;
#[cfg(feature = "target-ruby")]
pub mod ruby;

use crate::options::{BraceStyle, GenerationOptions};

/// Rendering parameters fixed for one emit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitterConfig {
    pub indent: String,
    pub line_ending: String,
    pub brace_style: BraceStyle,
}

impl EmitterConfig {
    pub fn new(indent: &str) -> Self {
        Self {
            indent: indent.to_string(),
            line_ending: "\n".to_string(),
            brace_style: BraceStyle::SameLine,
        }
    }

    /// Take rendering settings from `options`, using `default_indent` when
    /// the options leave indentation unset.
    pub fn from_options(options: &GenerationOptions, default_indent: &str) -> Self {
        Self {
            indent: options.indent_or(default_indent).to_string(),
            line_ending: options.line_ending.clone(),
            brace_style: options.brace_style,
        }
    }
}

/// Source text of a numeric literal: the JavaScript spelling when the
/// target reads it the same way, else a normalized decimal.
pub(crate) fn number_text(value: f64, raw: Option<&str>) -> String {
    if let Some(raw) = raw {
        let raw = raw.trim_end_matches('n');
        let lower = raw.to_ascii_lowercase();
        let portable = if let Some(hex) = lower.strip_prefix("0x") {
            !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit() || c == '_')
        } else if let Some(bin) = lower.strip_prefix("0b") {
            !bin.is_empty() && bin.chars().all(|c| matches!(c, '0' | '1' | '_'))
        } else {
            // Plain decimal integers, without a leading zero (octal in both targets).
            !lower.is_empty()
                && lower.chars().all(|c| c.is_ascii_digit() || c == '_')
                && (lower == "0" || !lower.starts_with('0'))
        };
        if portable {
            return raw.to_string();
        }
    }
    format_number(value)
}

/// Decimal rendering of a finite number; integers print without a fraction.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_text_keeps_portable_spellings() {
        assert_eq!(number_text(255.0, Some("0xFF")), "0xFF");
        assert_eq!(number_text(5.0, Some("0b101")), "0b101");
        assert_eq!(number_text(1000.0, Some("1_000")), "1_000");
        assert_eq!(number_text(42.0, Some("42")), "42");
    }

    #[test]
    fn test_number_text_normalizes_the_rest() {
        assert_eq!(number_text(15.0, Some("0o17")), "15");
        assert_eq!(number_text(0.5, Some(".5")), "0.5");
        assert_eq!(number_text(8.0, Some("010")), "8");
        assert_eq!(number_text(1000.0, Some("1e3")), "1000");
        assert_eq!(number_text(2.5, None), "2.5");
        assert_eq!(number_text(-3.0, None), "-3");
    }
}
