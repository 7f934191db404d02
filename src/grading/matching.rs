//! Player-name reconciliation between predictions and a results feed.
//!
//! Names from two independent sources rarely agree byte for byte
//! ("J.Kulich" vs "J. Kulich", "Jean-Gabriel" vs "Jean Gabriel"). Each
//! [`MatchTier`] is tried in order and the first that finds a candidate
//! wins; the winning tier is recorded on the outcome.

use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

/// Similarity must be strictly above this to count.
pub const SIMILARITY_THRESHOLD: f64 = 0.85;

const SCORE_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    CaseInsensitive,
    Normalized,
    Stripped,
    Similarity,
}

impl MatchTier {
    /// Tiers that compare a derived key for equality, in cascade order.
    const KEYED: [MatchTier; 4] = [
        MatchTier::Exact,
        MatchTier::CaseInsensitive,
        MatchTier::Normalized,
        MatchTier::Stripped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Exact => "exact",
            MatchTier::CaseInsensitive => "case_insensitive",
            MatchTier::Normalized => "normalized",
            MatchTier::Stripped => "stripped",
            MatchTier::Similarity => "similarity",
        }
    }

    fn key(&self, name: &str) -> String {
        match self {
            MatchTier::Exact => name.to_string(),
            MatchTier::CaseInsensitive => name.to_lowercase(),
            MatchTier::Normalized | MatchTier::Similarity => normalize_name(name),
            MatchTier::Stripped => strip_name(name),
        }
    }
}

/// Space after an initial's dot, whitespace collapsed, lower-cased.
///
/// `"J.Kulich"` → `"j. kulich"`, `"  Connor   McDavid "` → `"connor mcdavid"`.
pub fn normalize_name(name: &str) -> String {
    let mut spaced = String::with_capacity(name.len() + 2);
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        spaced.push(c);
        if c == '.' && chars.peek().is_some_and(|n| n.is_uppercase()) {
            spaced.push(' ');
        }
    }
    spaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lower-cased with dots, spaces and hyphens removed.
pub fn strip_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '.' | '-') && !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq)]
pub enum NameMatch {
    Found { index: usize, tier: MatchTier },
    /// More than one candidate at the first tier that matched.
    Ambiguous { tier: MatchTier, names: Vec<String> },
    NotFound,
}

struct Candidate {
    name: String,
    team: String,
    keys: [String; 4],
    normalized: String,
}

/// Searchable set of result names, keys precomputed per tier.
pub struct NameIndex {
    candidates: Vec<Candidate>,
}

impl NameIndex {
    /// `entries` are `(player name, team)` pairs; the returned indices refer
    /// to positions in this list.
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let candidates = entries
            .into_iter()
            .map(|(name, team)| Candidate {
                name: name.to_string(),
                team: team.to_string(),
                keys: MatchTier::KEYED.map(|t| t.key(name)),
                normalized: normalize_name(name),
            })
            .collect();
        NameIndex { candidates }
    }

    /// Run the cascade for `target`. When a tier yields several candidates
    /// and `team` is given, candidates from other teams are dropped before
    /// declaring the match ambiguous.
    pub fn resolve(&self, target: &str, team: Option<&str>) -> NameMatch {
        for (slot, tier) in MatchTier::KEYED.iter().enumerate() {
            let key = tier.key(target);
            let hits: Vec<usize> = self
                .candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| c.keys[slot] == key)
                .map(|(i, _)| i)
                .collect();
            if let Some(found) = self.pick(hits, *tier, team) {
                return found;
            }
        }

        let target = normalize_name(target);
        let mut best = SIMILARITY_THRESHOLD;
        let mut hits: Vec<usize> = Vec::new();
        for (i, c) in self.candidates.iter().enumerate() {
            let score = normalized_levenshtein(&target, &c.normalized);
            if score <= SIMILARITY_THRESHOLD {
                continue;
            }
            if score > best + SCORE_EPS || hits.is_empty() {
                best = score;
                hits = vec![i];
            } else if (score - best).abs() <= SCORE_EPS {
                hits.push(i);
            }
        }
        self.pick(hits, MatchTier::Similarity, team)
            .unwrap_or(NameMatch::NotFound)
    }

    fn pick(&self, hits: Vec<usize>, tier: MatchTier, team: Option<&str>) -> Option<NameMatch> {
        match hits.len() {
            0 => None,
            1 => Some(NameMatch::Found {
                index: hits[0],
                tier,
            }),
            _ => {
                let narrowed: Vec<usize> = match team {
                    Some(team) => hits
                        .iter()
                        .copied()
                        .filter(|&i| self.candidates[i].team.eq_ignore_ascii_case(team))
                        .collect(),
                    None => Vec::new(),
                };
                if narrowed.len() == 1 {
                    return Some(NameMatch::Found {
                        index: narrowed[0],
                        tier,
                    });
                }
                Some(NameMatch::Ambiguous {
                    tier,
                    names: hits
                        .iter()
                        .map(|&i| format!("{} ({})", self.candidates[i].name, self.candidates[i].team))
                        .collect(),
                })
            }
        }
    }
}
