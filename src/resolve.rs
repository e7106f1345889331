//! Fuzzy matching of loosely typed names onto a fixed candidate list.
//!
//! Used for command words, algorithm names, encoding names and hash names.
//! Matching runs in three tiers and stops at the first tier that yields
//! anything:
//!
//! 1. exact match (case-sensitive, then case-insensitive when allowed)
//! 2. substring containment in either direction
//! 3. every character of the query, `-` excluded, appears in order
//!
//! A tier producing more than one candidate is ambiguous; the caller has to
//! disambiguate, nothing is picked silently.

use regex::RegexBuilder;

use crate::error::{Error, Result};

/// Which tier produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Partial,
    Pattern,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    Found { name: &'a str, kind: MatchKind },
    Ambiguous(Vec<&'a str>),
    NotFound,
}

pub fn best_match<'a>(
    query: &str,
    candidates: &[&'a str],
    ignore_case: bool,
) -> Resolution<'a> {
    if query.is_empty() {
        return Resolution::NotFound;
    }

    if let Some(name) = candidates.iter().copied().find(|c| *c == query) {
        return Resolution::Found {
            name,
            kind: MatchKind::Exact,
        };
    }
    if ignore_case {
        if let Some(name) = candidates
            .iter()
            .copied()
            .find(|c| c.eq_ignore_ascii_case(query))
        {
            return Resolution::Found {
                name,
                kind: MatchKind::Exact,
            };
        }
    }

    let fold = |s: &str| {
        if ignore_case {
            s.to_ascii_uppercase()
        } else {
            s.to_string()
        }
    };
    let q = fold(query);
    let partial: Vec<&'a str> = candidates
        .iter()
        .copied()
        .filter(|c| {
            let c = fold(*c);
            c.contains(&q) || q.contains(&c)
        })
        .collect();
    if !partial.is_empty() {
        return settle(partial, MatchKind::Partial);
    }

    let pattern: String = query
        .chars()
        .filter(|c| *c != '-')
        .map(|c| format!(".*{}", regex::escape(&c.to_string())))
        .collect();
    let Ok(re) = RegexBuilder::new(&pattern)
        .case_insensitive(ignore_case)
        .build()
    else {
        return Resolution::NotFound;
    };
    let found: Vec<&'a str> = candidates
        .iter()
        .copied()
        .filter(|c| re.is_match(c))
        .collect();
    if found.is_empty() {
        return Resolution::NotFound;
    }
    settle(found, MatchKind::Pattern)
}

fn settle(mut found: Vec<&str>, kind: MatchKind) -> Resolution<'_> {
    if found.len() == 1 {
        Resolution::Found {
            name: found.remove(0),
            kind,
        }
    } else {
        Resolution::Ambiguous(found)
    }
}

/// Like [`best_match`] but turns non-matches into typed errors naming `kind`.
pub fn resolve<'a>(
    kind: &'static str,
    query: &str,
    candidates: &[&'a str],
    ignore_case: bool,
) -> Result<&'a str> {
    match best_match(query, candidates, ignore_case) {
        Resolution::Found { name, kind: how } => {
            if how != MatchKind::Exact {
                tracing::debug!(query, name, ?how, "resolved {kind}");
            }
            Ok(name)
        }
        Resolution::Ambiguous(found) => Err(Error::Ambiguous {
            kind,
            name: query.to_string(),
            candidates: found.into_iter().map(str::to_string).collect(),
        }),
        Resolution::NotFound => Err(Error::NotFound {
            kind,
            name: query.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMANDS: &[&str] = &["encrypt", "decrypt", "encode", "decode", "hash", "pubkey"];
    const ENCODINGS: &[&str] = &["base64", "base64url", "hex", "rawbase64url"];

    #[test]
    fn exact_match_wins_over_substrings() {
        assert_eq!(
            best_match("base64", ENCODINGS, true),
            Resolution::Found {
                name: "base64",
                kind: MatchKind::Exact
            }
        );
    }

    #[test]
    fn case_insensitive_exact_when_allowed() {
        assert_eq!(
            best_match("HEX", ENCODINGS, true),
            Resolution::Found {
                name: "hex",
                kind: MatchKind::Exact
            }
        );
        assert_eq!(best_match("HEX", ENCODINGS, false), Resolution::NotFound);
    }

    #[test]
    fn substring_in_either_direction() {
        assert_eq!(
            best_match("raw", ENCODINGS, true),
            Resolution::Found {
                name: "rawbase64url",
                kind: MatchKind::Partial
            }
        );
        assert_eq!(
            best_match("hexadecimal", ENCODINGS, true),
            Resolution::Found {
                name: "hex",
                kind: MatchKind::Partial
            }
        );
    }

    #[test]
    fn ambiguous_substring_lists_all() {
        match best_match("url", ENCODINGS, true) {
            Resolution::Ambiguous(found) => assert_eq!(found, vec!["base64url", "rawbase64url"]),
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn subsequence_fallback() {
        assert_eq!(
            best_match("ency", COMMANDS, false),
            Resolution::Found {
                name: "encrypt",
                kind: MatchKind::Pattern
            }
        );
        assert_eq!(
            best_match("pbk", COMMANDS, false),
            Resolution::Found {
                name: "pubkey",
                kind: MatchKind::Pattern
            }
        );
    }

    #[test]
    fn prefix_shared_by_two_commands_is_ambiguous() {
        assert_eq!(
            best_match("dec", COMMANDS, false),
            Resolution::Ambiguous(vec!["decrypt", "decode"])
        );
    }

    #[test]
    fn nothing_matches() {
        assert_eq!(best_match("zzz", COMMANDS, true), Resolution::NotFound);
        assert_eq!(best_match("", COMMANDS, true), Resolution::NotFound);
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        assert_eq!(best_match("h.sh", COMMANDS, false), Resolution::NotFound);
    }

    #[test]
    fn resolve_maps_to_typed_errors() {
        assert_eq!(resolve("command", "hash", COMMANDS, false).unwrap(), "hash");
        assert!(matches!(
            resolve("command", "dec", COMMANDS, false),
            Err(Error::Ambiguous { candidates, .. }) if candidates.len() == 2
        ));
        assert!(matches!(
            resolve("command", "zzz", COMMANDS, false),
            Err(Error::NotFound { .. })
        ));
    }
}
