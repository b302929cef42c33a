// src/core/minmatch.rs

//! Minimum-match name abbreviation.
//!
//! Any unambiguous prefix of a declared name may stand in for the full name.
//! An exact match always wins, even when it is also a prefix of longer names.

/// Outcome of a minimum-match lookup over a fixed candidate set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MinMatch<'a> {
    /// No candidate starts with the abbreviation.
    NoMatch,
    /// Exactly one candidate matched (or the abbreviation matched one exactly).
    Unique(&'a str),
    /// Several candidates share the prefix.
    Ambiguous(Vec<&'a str>),
}

/// Returns every candidate that starts with `abbrev`, in candidate order.
fn matching<'a, I>(abbrev: &str, candidates: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .filter(|candidate| candidate.starts_with(abbrev))
        .collect()
}

/// Resolves `abbrev` against `candidates`.
pub fn min_match<'a, I>(abbrev: &str, candidates: I) -> MinMatch<'a>
where
    I: IntoIterator<Item = &'a str>,
{
    let hits = matching(abbrev, candidates);
    if let Some(exact) = hits.iter().find(|hit| **hit == abbrev) {
        return MinMatch::Unique(*exact);
    }
    match hits.as_slice() {
        [] => MinMatch::NoMatch,
        [only] => MinMatch::Unique(*only),
        _ => MinMatch::Ambiguous(hits),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GET_FIELDS;

    #[test]
    fn test_unique_prefix_resolves() {
        assert_eq!(min_match("p_val", GET_FIELDS.iter().copied()), MinMatch::Unique("p_value"));
    }

    #[test]
    fn test_shared_prefix_is_ambiguous() {
        let fields = ["p_value", "p_minimum", "p_maximum"];
        match min_match("p_m", fields.iter().copied()) {
            MinMatch::Ambiguous(hits) => assert_eq!(hits, vec!["p_minimum", "p_maximum"]),
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_no_match_is_distinct_from_ambiguity() {
        assert_eq!(min_match("zz", ["alpha", "beta"].iter().copied()), MinMatch::NoMatch);
    }

    #[test]
    fn test_exact_match_beats_longer_names() {
        let names = ["mode", "modes", "model"];
        assert_eq!(min_match("mode", names.iter().copied()), MinMatch::Unique("mode"));
    }
}
