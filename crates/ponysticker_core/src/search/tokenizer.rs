//! Multilingual text normalization for the full-text index.
//!
//! # Responsibility
//! - Turn titles, authors and user queries into one space-joined token stream.
//! - Keep indexing and querying symmetric: both sides call [`normalize`].
//!
//! # Invariants
//! - Every code point lands in at most one lane (latin, ideographic, digit).
//! - Output tokens are never empty and are separated by exactly one space.
//! - Output order is latin tokens, then ideographic tokens, then the digit
//!   token.

use once_cell::sync::Lazy;
use rust_stemmers::{Algorithm, Stemmer};
use std::ops::RangeInclusive;
use unicode_general_category::{get_general_category, GeneralCategory};

/// Words at least this long (after stemming) are split into trigrams.
const SHINGLE_MIN_LEN: usize = 4;
const SHINGLE_WIDTH: usize = 3;

static ENGLISH: Lazy<Stemmer> = Lazy::new(|| Stemmer::create(Algorithm::English));

/// Code point blocks that are tokenized one character at a time.
const IDEOGRAPHIC_RANGES: &[RangeInclusive<u32>] = &[
    0x4E00..=0x9FFF,   // CJK Unified Ideographs
    0x3400..=0x4DBF,   // Extension A
    0x20000..=0x2A6DF, // Extension B
    0x2A700..=0x2B73F, // Extension C
    0x2B740..=0x2B81F, // Extension D
    0x2E80..=0x2EFF,   // CJK Radicals Supplement
    0x2F00..=0x2FDF,   // Kangxi Radicals
    0x2FF0..=0x2FFF,   // Ideographic Description Characters
    0x3000..=0x303F,   // CJK Symbols and Punctuation
    0x31C0..=0x31EF,   // CJK Strokes
    0x3200..=0x32FF,   // Enclosed CJK Letters and Months
    0x3300..=0x33FF,   // CJK Compatibility
    0xF900..=0xFAFF,   // CJK Compatibility Ideographs
    0xFE30..=0xFE4F,   // CJK Compatibility Forms
    0x2F800..=0x2FA1F, // CJK Compatibility Ideographs Supplement
    0x3040..=0x309F,   // Hiragana
    0x30A0..=0x30FF,   // Katakana
    0xAC00..=0xD7A3,   // Hangul Syllables
];

/// Normalizes free text into a full-text match token stream.
///
/// ```
/// use ponysticker_core::search::tokenizer::normalize;
///
/// assert_eq!(normalize("Running ponies"), "run pon oni");
/// assert_eq!(normalize("魔法1"), "魔 法 1");
/// ```
pub fn normalize(text: &str) -> String {
    let mut latin = String::with_capacity(text.len());
    let mut ideographs = Vec::new();
    let mut digits = String::new();

    for ch in text.chars() {
        if ch.is_ascii_alphabetic() {
            latin.push(ch.to_ascii_lowercase());
            continue;
        }
        // Keep lane positions aligned so words never merge across other lanes.
        latin.push(' ');
        if is_decimal_digit(ch) {
            digits.push(ch);
        } else if is_ideographic(ch) {
            ideographs.push(ch.to_string());
        }
    }

    let mut tokens = Vec::new();
    for word in latin.split_whitespace() {
        let stemmed = ENGLISH.stem(word);
        push_shingles(&mut tokens, &stemmed);
    }
    tokens.extend(ideographs);
    if !digits.is_empty() {
        tokens.push(digits);
    }

    tokens.join(" ")
}

/// Returns whether `ch` belongs to one of the per-character token blocks.
pub fn is_ideographic(ch: char) -> bool {
    let code = u32::from(ch);
    IDEOGRAPHIC_RANGES.iter().any(|range| range.contains(&code))
}

/// Returns whether `ch` is a decimal digit in any script (`Nd`).
pub fn is_decimal_digit(ch: char) -> bool {
    ch.is_ascii_digit() || get_general_category(ch) == GeneralCategory::DecimalNumber
}

fn push_shingles(tokens: &mut Vec<String>, word: &str) {
    // Stemmer output for ASCII input stays ASCII, so byte windows are chars.
    if word.len() < SHINGLE_MIN_LEN {
        tokens.push(word.to_string());
        return;
    }
    tokens.extend(
        word.as_bytes()
            .windows(SHINGLE_WIDTH)
            .map(|window| String::from_utf8_lossy(window).into_owned()),
    );
}
