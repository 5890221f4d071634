//! Name resolution: canonicalising raw OCR text against the known roster.
//!
//! Rules are applied in a fixed order and the first applicable one wins:
//! length check, literal replacement rules, name-shape validation with roster
//! fuzzy search, and finally a punctuation-stripping fallback.

pub mod fuzz;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

/// Capitalised Latin or Cyrillic word, with at most two trailing non-letters.
static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\W?([A-ZА-ЯЁ][a-zа-яё]+)(?:\.{0,2}[^a-zа-я]?|[^a-zа-я]?\.{0,2}|[^a-zа-я]{0,2}\.?)?$",
    )
    .unwrap()
});

/// Punctuation removed by the fallback rule.
static FALLBACK_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.,_\-—"]"#).unwrap());

/// How a name was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchKind {
    /// Found verbatim in the roster (score 100)
    Exact,
    /// Accepted roster match below 100
    Fuzzy,
    /// Well-formed name with no roster confirmation
    New,
    /// Produced by a literal replacement rule
    Replaced,
    /// No usable signal
    Unknown,
}

impl MatchKind {
    /// Anything but `Unknown` identifies a participant.
    pub fn is_usable(self) -> bool {
        self != MatchKind::Unknown
    }

    /// Confirmed against the roster.
    pub fn is_roster_match(self) -> bool {
        matches!(self, MatchKind::Exact | MatchKind::Fuzzy)
    }
}

/// Outcome of resolving one piece of raw text.
///
/// `name` is `Some` for every kind except `Unknown`. An `Unknown` result may
/// still carry the cleaned text in `residual` for manual review.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub name: Option<String>,
    pub score: u8,
    pub kind: MatchKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residual: Option<String>,
}

impl MatchResult {
    pub fn roster(name: &str, score: u8) -> Self {
        let kind = if score == 100 {
            MatchKind::Exact
        } else {
            MatchKind::Fuzzy
        };
        Self {
            name: Some(name.to_string()),
            score,
            kind,
            residual: None,
        }
    }

    pub fn new_name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            score: 0,
            kind: MatchKind::New,
            residual: None,
        }
    }

    pub fn replaced(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            score: 100,
            kind: MatchKind::Replaced,
            residual: None,
        }
    }

    pub fn unknown() -> Self {
        Self {
            name: None,
            score: 0,
            kind: MatchKind::Unknown,
            residual: None,
        }
    }

    /// Unknown, keeping the cleaned text for review.
    pub fn unknown_with(residual: String) -> Self {
        Self {
            residual: Some(residual),
            ..Self::unknown()
        }
    }

    pub fn is_usable(&self) -> bool {
        self.kind.is_usable()
    }

    /// The best textual guess: the name, or the residual of an unknown result.
    pub fn candidate(&self) -> Option<&str> {
        self.name.as_deref().or(self.residual.as_deref())
    }
}

/// Boundary values of the fuzzy acceptance rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchThresholds {
    /// Minimum score for a shape-valid candidate
    pub min_score: u8,
    /// Length difference must stay below this
    pub max_len_diff: usize,
    /// Candidate length must exceed this for the length rule to apply
    pub min_candidate_len: usize,
    /// Score the fallback rule must exceed
    pub fallback_min_score: u8,
    /// Length the fallback residual must exceed
    pub fallback_min_len: usize,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            min_score: 75,
            max_len_diff: 7,
            min_candidate_len: 2,
            fallback_min_score: 80,
            fallback_min_len: 4,
        }
    }
}

/// Regex pattern mapped to a literal name. Matches only at the start of the text.
#[derive(Clone, Debug)]
pub struct ReplacementRule {
    pattern: Regex,
    source: String,
    replacement: String,
}

impl ReplacementRule {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(&format!("^(?:{})", pattern))?,
            source: pattern.to_string(),
            replacement: replacement.to_string(),
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    pub fn pattern(&self) -> &str {
        &self.source
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }
}

/// Parses replacement rules, one `<pattern> <replacement>` per line.
///
/// Lines without a replacement are ignored; invalid patterns are logged and skipped.
pub fn parse_replacements(contents: &str) -> Vec<ReplacementRule> {
    let mut rules = Vec::new();

    for (line_num, line) in contents.lines().enumerate() {
        let Some((pattern, replacement)) = line.trim().split_once(char::is_whitespace) else {
            continue;
        };

        match ReplacementRule::new(pattern, replacement.trim_start()) {
            Ok(rule) => rules.push(rule),
            Err(e) => {
                tracing::warn!(
                    "Skipping replacement rule on line {}: invalid pattern '{}': {}",
                    line_num + 1,
                    pattern,
                    e
                );
            }
        }
    }

    rules
}

/// Loads replacement rules from a file. A missing or unreadable file yields no rules.
pub fn load_replacements(path: &Path) -> Vec<ReplacementRule> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let rules = parse_replacements(&contents);
            tracing::info!("Loaded {} replacement rules from {}", rules.len(), path.display());
            rules
        }
        Err(e) => {
            tracing::warn!("Failed to load replacements from {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Resolves raw OCR text to a canonical participant name.
///
/// The roster and rules are fixed for the lifetime of a resolver; build a new
/// one between runs when the roster changes.
#[derive(Clone, Debug, Default)]
pub struct NameResolver {
    roster: Vec<String>,
    rules: Vec<ReplacementRule>,
    thresholds: MatchThresholds,
}

impl NameResolver {
    pub fn new(
        roster: Vec<String>,
        rules: Vec<ReplacementRule>,
        thresholds: MatchThresholds,
    ) -> Self {
        Self {
            roster,
            rules,
            thresholds,
        }
    }

    pub fn with_roster(roster: Vec<String>) -> Self {
        Self::new(roster, Vec::new(), MatchThresholds::default())
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn resolve(&self, raw_text: &str) -> MatchResult {
        if raw_text.chars().count() <= 2 {
            return MatchResult::unknown();
        }

        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(raw_text)) {
            return MatchResult::replaced(rule.replacement());
        }

        if let Some(captures) = NAME_PATTERN.captures(raw_text) {
            let clean = &captures[1];
            return self.resolve_shaped(clean);
        }

        self.resolve_fallback(raw_text)
    }

    /// Candidate passed shape validation: roster match or new name.
    fn resolve_shaped(&self, clean: &str) -> MatchResult {
        if self.roster.is_empty() {
            return MatchResult::new_name(clean);
        }

        if let Some((best, score)) = fuzz::best_match(clean, &self.roster) {
            if self.accepts(clean, best, score) {
                return MatchResult::roster(best, score);
            }
        }

        MatchResult::new_name(clean)
    }

    fn accepts(&self, candidate: &str, best: &str, score: u8) -> bool {
        let t = &self.thresholds;
        let candidate_len = candidate.chars().count();
        let len_diff = candidate_len.abs_diff(best.chars().count());

        score >= t.min_score
            && ((len_diff < t.max_len_diff && candidate_len > t.min_candidate_len)
                || best.starts_with(candidate)
                || score == 100)
    }

    /// Shape validation failed: strip punctuation and try a stricter roster match.
    fn resolve_fallback(&self, raw_text: &str) -> MatchResult {
        let cleaned = FALLBACK_PUNCTUATION.replace_all(raw_text, "");
        let len = cleaned.chars().count();
        if len <= 1 {
            return MatchResult::unknown();
        }

        let mut chars = cleaned.chars();
        let titled: String = match chars.next() {
            Some(first) => first
                .to_uppercase()
                .chain(chars.as_str().to_lowercase().chars())
                .collect(),
            None => return MatchResult::unknown(),
        };

        if let Some((best, score)) = fuzz::best_match(&titled, &self.roster) {
            let t = &self.thresholds;
            if len > t.fallback_min_len && score > t.fallback_min_score {
                return MatchResult::roster(best, score);
            }
        }

        MatchResult::unknown_with(titled)
    }
}
