//! Instructor name canonicalization.
//!
//! The canonical form is `"Last, First"`. Names without a comma are only
//! whitespace-trimmed: reversing "First Last" order is left to the caller
//! (see [`to_last_first`]), since the normalizer cannot tell the two orders
//! apart on its own.

/// Canonicalize an instructor name.
///
/// Splits on the first comma and capitalizes each word of both segments
/// (first letter upper, remainder lower). An empty last-name segment is
/// dropped and the remainder canonicalized on its own. Idempotent:
/// `normalize_name(&normalize_name(s)) == normalize_name(s)`.
pub fn normalize_name(raw: &str) -> String {
    let trimmed = raw.trim();

    let Some((last_raw, first_raw)) = trimmed.split_once(',') else {
        return trimmed.to_string();
    };

    let last = capitalize_words(last_raw);
    if last.is_empty() {
        // No last name: the remainder is the whole name and may hold its own comma.
        return if first_raw.contains(',') {
            normalize_name(first_raw)
        } else {
            capitalize_words(first_raw)
        };
    }

    let first = capitalize_words(first_raw);
    if first.is_empty() {
        last
    } else {
        format!("{last}, {first}")
    }
}

/// Rewrite a "First Middle Last" name into "Last, First Middle".
///
/// Input already containing a comma is returned trimmed. Generational
/// suffixes stay with the given names: "John Doe Jr." becomes "Doe, John Jr.".
pub fn to_last_first(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains(',') {
        return trimmed.to_string();
    }

    let mut words: Vec<&str> = trimmed.split_whitespace().collect();
    let suffix = match words.last() {
        Some(w) if words.len() > 2 && is_suffix(w) => words.pop(),
        _ => None,
    };

    let Some(last) = words.pop() else {
        return String::new();
    };
    if words.is_empty() {
        return last.to_string();
    }

    let mut given = words.join(" ");
    if let Some(suffix) = suffix {
        given.push(' ');
        given.push_str(suffix);
    }
    format!("{last}, {given}")
}

fn is_suffix(word: &str) -> bool {
    matches!(
        word.trim_end_matches('.').to_ascii_lowercase().as_str(),
        "jr" | "sr" | "ii" | "iii" | "iv"
    )
}

/// Capitalize every whitespace-separated word and join with single spaces.
fn capitalize_words(segment: &str) -> String {
    segment
        .split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// First character upper, remainder lower.
///
/// A first character whose uppercase form expands to several characters
/// (e.g. `ß`) is kept as-is so the result stays a fixed point.
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    let Some(head) = chars.next() else {
        return String::new();
    };

    let mut upper = head.to_uppercase();
    let mut out = match (upper.next(), upper.next()) {
        (Some(u), None) => u.to_string(),
        _ => head.to_string(),
    };
    out.push_str(&chars.as_str().to_lowercase());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_last_first() {
        assert_eq!(normalize_name("doe, john"), "Doe, John");
        assert_eq!(normalize_name("  DOE ,   JOHN  "), "Doe, John");
        assert_eq!(normalize_name("smith, mary   ann"), "Smith, Mary Ann");
    }

    #[test]
    fn no_comma_passes_through_trimmed() {
        assert_eq!(normalize_name("  john doe "), "john doe");
        assert_eq!(normalize_name("Staff"), "Staff");
    }

    #[test]
    fn only_first_comma_splits() {
        assert_eq!(normalize_name("doe, john, jr."), "Doe, John, Jr.");
    }

    #[test]
    fn empty_segments_collapse() {
        assert_eq!(normalize_name("Doe,"), "Doe");
        assert_eq!(normalize_name(", John"), "John");
        assert_eq!(normalize_name(" , "), "");
    }

    #[test]
    fn leading_comma_reparses_remainder() {
        assert_eq!(normalize_name(",a,b"), "A, B");
        assert_eq!(normalize_name(", doe,john"), "Doe, John");
        assert_eq!(normalize_name(",, john"), "John");
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "doe, john",
            "DOE,JOHN Q.",
            "o'brien, sean",
            "van der berg, anna-lena",
            "  Jane   Smith  ",
            "Doe,",
            ",",
            "a,b,c",
            ",a,b",
            ", doe,john",
            ",,,x,y",
            "Doe,,",
            "straße, ßtefan",
            "İstanbul, ırmak",
            "\tDOE ,\njohn ",
            "",
        ];
        for s in samples {
            let once = normalize_name(s);
            assert_eq!(normalize_name(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn reorders_first_last() {
        assert_eq!(to_last_first("Hal Sadofsky"), "Sadofsky, Hal");
        assert_eq!(to_last_first("Jane Q. Public"), "Public, Jane Q.");
        assert_eq!(to_last_first("John Doe Jr."), "Doe, John Jr.");
        assert_eq!(to_last_first("Cher"), "Cher");
        assert_eq!(to_last_first("Doe, John"), "Doe, John");
        assert_eq!(to_last_first("   "), "");
    }
}
