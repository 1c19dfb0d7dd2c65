//! Cell text formatting.
//!
//! Everything here measures display width with `unicode-width`, so tier
//! symbols such as `◆` or `✸` pad the same as ASCII.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// Truncates a string with `…` if it exceeds `max_width` columns.
pub fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    if max_width == 0 {
        return String::new();
    }
    if max_width == 1 {
        return "…".to_string();
    }
    let mut truncated = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if used + ch_width + 1 > max_width {
            break;
        }
        truncated.push(ch);
        used += ch_width;
    }
    truncated.push('…');
    truncated
}

/// Pads or truncates `text` to exactly `width` display columns.
pub fn fit(text: &str, width: usize, align: Align) -> String {
    let text = truncate_with_ellipsis(text, width);
    let pad = width.saturating_sub(text.width());
    match align {
        Align::Left => format!("{text}{}", " ".repeat(pad)),
        Align::Right => format!("{}{text}", " ".repeat(pad)),
    }
}

/// Inserts `,` between groups of three digits.
fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Formats `value` with `decimals` places and grouped thousands.
fn grouped(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (formatted.as_str(), None),
    };
    let sign = if value < 0.0 && formatted.bytes().any(|b| matches!(b, b'1'..=b'9')) {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{sign}{}.{frac}", group_thousands(int_part)),
        None => format!("{sign}{}", group_thousands(int_part)),
    }
}

/// Notional value in whole quote units, e.g. `$1,250,000`.
pub fn format_value(value: f64) -> String {
    format!("${}", grouped(value, 0))
}

/// Price with precision scaled to its magnitude.
pub fn format_price(price: f64) -> String {
    let decimals = match price.abs() {
        p if p >= 1_000.0 => 2,
        p if p >= 1.0 => 4,
        _ => 6,
    };
    grouped(price, decimals)
}

pub fn format_quantity(quantity: f64) -> String {
    let decimals = if quantity.abs() >= 1_000.0 { 2 } else { 4 };
    grouped(quantity, decimals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_with_ellipsis_short() {
        assert_eq!(truncate_with_ellipsis("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_with_ellipsis_truncated() {
        assert_eq!(truncate_with_ellipsis("LIQUIDATION", 6), "LIQUI…");
    }

    #[test]
    fn test_truncate_with_ellipsis_degenerate_widths() {
        assert_eq!(truncate_with_ellipsis("hello", 1), "…");
        assert_eq!(truncate_with_ellipsis("hello", 0), "");
    }

    #[test]
    fn test_fit_pads_by_display_width() {
        let cell = fit("◆ WHALE", 11, Align::Left);
        assert_eq!(cell.width(), 11);
        assert!(cell.starts_with("◆ WHALE"));

        assert_eq!(fit("42", 5, Align::Right), "   42");
    }

    #[test]
    fn test_fit_wide_chars() {
        // Each CJK glyph takes two columns.
        let cell = fit("鯨鯨鯨鯨", 5, Align::Left);
        assert_eq!(cell.width(), 5);
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(1_250_000.4), "$1,250,000");
        assert_eq!(format_value(999.6), "$1,000");
        assert_eq!(format_value(0.0), "$0");
    }

    #[test]
    fn test_format_price_precision() {
        assert_eq!(format_price(67_123.456), "67,123.46");
        assert_eq!(format_price(2.5), "2.5000");
        assert_eq!(format_price(0.123_456_7), "0.123457");
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(0.5), "0.5000");
        assert_eq!(format_quantity(120_000.0), "120,000.00");
    }

    #[test]
    fn test_non_finite_and_negative() {
        assert_eq!(format_price(f64::NAN), "-");
        assert_eq!(format_quantity(-1_500.0), "-1,500.00");
        assert_eq!(format_value(-0.2), "$0");
    }
}
