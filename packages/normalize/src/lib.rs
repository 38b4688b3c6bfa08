#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Street-address normalization for cross-source matching.
//!
//! Produces a canonical address string usable as a join key across the
//! municipal open-data sources. The pipeline is deterministic, stateless,
//! and idempotent: `normalize_address(x)` run on its own output returns
//! the same string.
//!
//! Pass order matters in two places: dotted directionals (`S.W.`) must be
//! collapsed before periods are stripped, and street suffixes (`ST.`)
//! must be rewritten before split ordinals (`1 ST` → `1ST`) are rejoined.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Trailing `", CITY, STATE zip"` tail, tolerating missing parts.
static CITY_STATE_ZIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r",?\s*(?:SEATTLE)?\s*,?\s*(?:WA|WASHINGTON)?\s*,?\s*\d{5}(?:-\d{4})?\s*$")
        .expect("valid regex")
});

/// Unit designator plus its following token (`APT 3B`, `SUITE 200`, ...).
static UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:UNIT|APT|SUITE|STE|#|BLDG|BUILDING|FLOOR|FL|RM|ROOM)\s*[#.]?\s*\S*")
        .expect("valid regex")
});

/// Bare hash-number (`#201`) that the unit pattern cannot reach because
/// `\b` never matches between whitespace and `#`.
static HASH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\s*\w+").expect("valid regex"));

/// Dotted compound directionals: `S.W.`, `N.E`, etc.
static DIR_DOTTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([SN])\.([EW])\b\.?").expect("valid regex"));

/// Word-form directionals, longest alternatives first so that
/// `SOUTH WEST` collapses to `SW` before `SOUTH` → `S` can fire.
static DIR_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(SOUTH WEST|SOUTH EAST|NORTH WEST|NORTH EAST|SOUTHWEST|SOUTHEAST|NORTHWEST|NORTHEAST|S WEST|S EAST|N WEST|N EAST|SOUTH|NORTH|EAST|WEST)\b",
    )
    .expect("valid regex")
});

/// Single-letter directional with a trailing period (`S.`, `N.`).
static DIR_SINGLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([SNEW])\.").expect("valid regex"));

/// Street-type suffixes, optionally period-terminated. Longer spellings
/// precede their abbreviations so alternation picks the full word.
static SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(STREET|STR|ST|AVENUE|AVE|AV|DRIVE|DR|BOULEVARD|BLVD|PLACE|PL|COURT|CT|LANE|LN|ROAD|RD|CIRCLE|CIR|TERRACE|TER|PARKWAY|PKWY|WAY)\b\.?",
    )
    .expect("valid regex")
});

/// Ordinal street-name words.
static ORDINAL_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(FIRST|SECOND|THIRD|FOURTH|FIFTH|SIXTH|SEVENTH|EIGHTH|NINTH|TENTH)\b")
        .expect("valid regex")
});

/// Ordinal suffix split from its number: `1 ST` → `1ST`.
static SPLIT_ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)\s+(ST|ND|RD|TH)\b").expect("valid regex"));

/// Runs of whitespace.
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

fn dir_abbrev(word: &str) -> &'static str {
    match word {
        "SOUTH WEST" | "SOUTHWEST" | "S WEST" => "SW",
        "SOUTH EAST" | "SOUTHEAST" | "S EAST" => "SE",
        "NORTH WEST" | "NORTHWEST" | "N WEST" => "NW",
        "NORTH EAST" | "NORTHEAST" | "N EAST" => "NE",
        "SOUTH" => "S",
        "NORTH" => "N",
        "EAST" => "E",
        _ => "W",
    }
}

fn suffix_abbrev(word: &str) -> &'static str {
    match word {
        "STREET" | "STR" | "ST" => "ST",
        "AVENUE" | "AVE" | "AV" => "AVE",
        "DRIVE" | "DR" => "DR",
        "BOULEVARD" | "BLVD" => "BLVD",
        "PLACE" | "PL" => "PL",
        "COURT" | "CT" => "CT",
        "LANE" | "LN" => "LN",
        "ROAD" | "RD" => "RD",
        "CIRCLE" | "CIR" => "CIR",
        "TERRACE" | "TER" => "TER",
        "PARKWAY" | "PKWY" => "PKWY",
        _ => "WAY",
    }
}

fn ordinal_rewrite(word: &str) -> &'static str {
    match word {
        "FIRST" => "1ST",
        "SECOND" => "2ND",
        "THIRD" => "3RD",
        "FOURTH" => "4TH",
        "FIFTH" => "5TH",
        "SIXTH" => "6TH",
        "SEVENTH" => "7TH",
        "EIGHTH" => "8TH",
        "NINTH" => "9TH",
        _ => "10TH",
    }
}

/// Normalizes a raw address string to its canonical form.
///
/// Returns `None` if the input is empty or reduces to an empty string.
#[must_use]
pub fn normalize_address(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }

    // ── Pass 1: flatten, uppercase, strip the city/state/zip tail ────
    let addr = raw.trim().replace(['\n', '\r'], " ").to_uppercase();
    let addr = CITY_STATE_ZIP_RE.replace(&addr, "");

    // ── Pass 2: remove unit designators, hash-numbers, and commas ───
    let addr = UNIT_RE.replace_all(&addr, "");
    let addr = HASH_RE.replace_all(&addr, " ");
    let addr = addr.replace(',', " ");
    let addr = WHITESPACE_RE.replace_all(addr.trim(), " ");

    // ── Pass 3: directionals, dotted compounds before periods go ────
    let addr = DIR_DOTTED_RE.replace_all(&addr, "$1$2");
    let addr = DIR_WORD_RE.replace_all(&addr, |c: &Captures<'_>| dir_abbrev(&c[1]).to_owned());
    let addr = DIR_SINGLE_RE.replace_all(&addr, "$1 ");

    // ── Pass 4: street-type suffixes, tolerating trailing periods ───
    let addr = SUFFIX_RE.replace_all(&addr, |c: &Captures<'_>| suffix_abbrev(&c[1]).to_owned());

    // ── Pass 5: strip remaining periods ─────────────────────────────
    let addr = addr.replace('.', " ");

    // ── Pass 6: ordinal words, then rejoin split ordinals ───────────
    let addr = ORDINAL_WORD_RE.replace_all(&addr, |c: &Captures<'_>| ordinal_rewrite(&c[1]));
    let addr = SPLIT_ORDINAL_RE.replace_all(&addr, "$1$2");

    // ── Pass 7: final whitespace collapse ───────────────────────────
    let addr = WHITESPACE_RE.replace_all(addr.trim(), " ");
    let addr = addr.trim();

    if addr.is_empty() {
        None
    } else {
        Some(addr.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_already_canonical_input() {
        assert_eq!(
            normalize_address("5812 SW Spokane St").as_deref(),
            Some("5812 SW SPOKANE ST")
        );
    }

    #[test]
    fn collapses_dotted_compound_directional() {
        assert_eq!(
            normalize_address("5812 S.W. Spokane Street").as_deref(),
            Some("5812 SW SPOKANE ST")
        );
    }

    #[test]
    fn collapses_word_compound_directional() {
        assert_eq!(
            normalize_address("5812 South West Spokane St.").as_deref(),
            Some("5812 SW SPOKANE ST")
        );
    }

    #[test]
    fn strips_city_state_zip_tail() {
        assert_eq!(
            normalize_address("5812 sw spokane street, seattle, wa 98106").as_deref(),
            Some("5812 SW SPOKANE ST")
        );
        assert_eq!(
            normalize_address("5812 South West Spokane Street, Seattle, WA 98106").as_deref(),
            Some("5812 SW SPOKANE ST")
        );
    }

    #[test]
    fn keeps_trailing_directional() {
        assert_eq!(normalize_address("4th Ave SW").as_deref(), Some("4TH AVE SW"));
    }

    #[test]
    fn removes_hash_unit() {
        assert_eq!(
            normalize_address("123 NE 45th Street #201").as_deref(),
            Some("123 NE 45TH ST")
        );
    }

    #[test]
    fn removes_apartment_and_tail() {
        assert_eq!(
            normalize_address("456 S. Main Ave, Apt 3B, Seattle, WA 98136").as_deref(),
            Some("456 S MAIN AVE")
        );
    }

    #[test]
    fn rewrites_ordinal_words() {
        assert_eq!(
            normalize_address("789 First Avenue S").as_deref(),
            Some("789 1ST AVE S")
        );
    }

    #[test]
    fn handles_split_word_directional_with_ordinal() {
        assert_eq!(
            normalize_address("100 North West 3rd Place").as_deref(),
            Some("100 NW 3RD PL")
        );
    }

    #[test]
    fn flattens_embedded_newline() {
        assert_eq!(
            normalize_address("222 N.W. Market Street\nSeattle WA 98107").as_deref(),
            Some("222 NW MARKET ST")
        );
    }

    #[test]
    fn empty_input_is_none() {
        assert_eq!(normalize_address(""), None);
        assert_eq!(normalize_address("   "), None);
    }

    #[test]
    fn idempotent_on_canonical_output() {
        let samples = [
            "5812 South West Spokane Street, Seattle, WA 98106",
            "222 N.W. Market Street\nSeattle WA 98107",
            "789 First Avenue S",
            "123 NE 45th Street #201",
            "4th Ave SW",
        ];
        for raw in samples {
            let once = normalize_address(raw).unwrap();
            let twice = normalize_address(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }
}
