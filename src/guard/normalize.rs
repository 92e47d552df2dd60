//! Input normalization for the risk gate.
//!
//! Raw request text is folded to NFKC, stripped of bidirectional-override
//! and zero-width code points, then stripped of any remaining control or
//! format characters except newline and tab. The result is the canonical
//! `cleaned` text every downstream component operates on.

use unicode_normalization::UnicodeNormalization;

/// Bidirectional control characters (LRE, RLE, LRO, RLO, LRI, RLI, FSI, PDI).
const BIDI_CONTROLS: [char; 8] = [
    '\u{202A}', '\u{202B}', '\u{202D}', '\u{202E}', '\u{2066}', '\u{2067}', '\u{2068}', '\u{2069}',
];

/// Zero-width characters (ZWSP, ZWNJ, ZWJ, WJ, BOM).
const ZERO_WIDTH: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

/// Unicode `Cf` (format) ranges not already covered by the explicit sets.
const FORMAT_RANGES: [(u32, u32); 17] = [
    (0x00AD, 0x00AD),
    (0x0600, 0x0605),
    (0x061C, 0x061C),
    (0x06DD, 0x06DD),
    (0x070F, 0x070F),
    (0x08E2, 0x08E2),
    (0x180E, 0x180E),
    (0x200B, 0x200F),
    (0x202A, 0x202E),
    (0x2060, 0x2064),
    (0x2066, 0x206F),
    (0xFEFF, 0xFEFF),
    (0xFFF9, 0xFFFB),
    (0x110BD, 0x110CD),
    (0x1D173, 0x1D17A),
    (0xE0001, 0xE0001),
    (0xE0020, 0xE007F),
];

fn is_format_char(c: char) -> bool {
    let cp = c as u32;
    FORMAT_RANGES.iter().any(|&(lo, hi)| cp >= lo && cp <= hi)
}

fn remove_bidi_zero_width(s: &str) -> String {
    s.chars()
        .filter(|c| !BIDI_CONTROLS.contains(c) && !ZERO_WIDTH.contains(c))
        .collect()
}

fn strip_control_chars(s: &str) -> String {
    s.chars()
        .filter(|&c| c == '\n' || c == '\t' || (!c.is_control() && !is_format_char(c)))
        .collect()
}

/// Normalize raw input into cleaned text.
///
/// Order matters: NFKC first (so compatibility forms fold before pattern
/// matching), then the explicit bidi/zero-width strip, then the general
/// control/format strip.
pub fn clean_input(raw: &str) -> String {
    let folded: String = raw.nfkc().collect();
    let without_invisibles = remove_bidi_zero_width(&folded);
    strip_control_chars(&without_invisibles)
}
