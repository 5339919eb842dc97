// 🔤 Collation - locale-aware string ordering for catalog sorts
//
// Three comparison levels, the way an English collation orders text:
// 1. Primary: whitespace < punctuation < symbols < digits < letters, with
//    letters case-folded and accents stripped ("resume" == "Résumé")
// 2. Secondary: accents ("resume" < "résumé")
// 3. Tertiary: case, lowercase first ("city" < "City")
//
// Registered on every SQLite connection as `CATALOG` so ORDER BY and the
// in-memory re-sort of joined rows agree on one ordering.

use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Collation name used in SQL (`ORDER BY name COLLATE CATALOG`)
pub const COLLATION_NAME: &str = "CATALOG";

/// ASCII punctuation and symbols in root collation order
const PUNCTUATION_ORDER: &str = "_-,;:!?.'\"()[]{}@*/\\&#%`^+<=>|~$";

/// Compare two strings under the catalog collation
pub fn collate(a: &str, b: &str) -> Ordering {
    primary_weights(a)
        .cmp(primary_weights(b))
        .then_with(|| accent_weights(a).cmp(&accent_weights(b)))
        .then_with(|| case_weights(a).cmp(case_weights(b)))
}

/// Base characters of `s`, decomposed with the combining marks dropped
fn base_chars(s: &str) -> impl Iterator<Item = char> + '_ {
    s.nfd().filter(|c| !is_combining_mark(*c))
}

fn primary_weights(s: &str) -> impl Iterator<Item = (u8, u32)> + '_ {
    base_chars(s).flat_map(char::to_lowercase).map(primary_weight)
}

fn primary_weight(c: char) -> (u8, u32) {
    if c.is_whitespace() {
        (0, c as u32)
    } else if let Some(rank) = PUNCTUATION_ORDER.find(c) {
        (1, rank as u32)
    } else if c.is_numeric() {
        (3, c.to_digit(10).unwrap_or(c as u32))
    } else if c.is_alphabetic() {
        (4, c as u32)
    } else {
        (2, c as u32)
    }
}

/// One weight per base character: 0 when bare, otherwise its marks
fn accent_weights(s: &str) -> Vec<Vec<char>> {
    s.nfd().fold(Vec::new(), |mut weights: Vec<Vec<char>>, c| {
        match weights.last_mut() {
            Some(marks) if is_combining_mark(c) => marks.push(c),
            _ => weights.push(Vec::new()),
        }
        weights
    })
}

fn case_weights(s: &str) -> impl Iterator<Item = u8> + '_ {
    base_chars(s).map(|c| u8::from(c.is_uppercase()))
}
