/// Normalised edit similarity in 0–100.
///
/// Based on the indel distance (insertions and deletions only), so a single
/// substituted character costs two edits: `ratio("Smlth", "Smith") == 80`.
/// Two empty strings are identical (100).
pub fn ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100;
    }

    let lcs = lcs_len(&a, &b);
    let score = 100.0 * (2 * lcs) as f64 / total as f64;
    score.round_ties_even() as u8
}

/// Length of the longest common subsequence.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Lowercases and replaces every non-alphanumeric character with a space.
fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Finds the roster entry most similar to `query`.
///
/// Comparison is case-insensitive and ignores punctuation; the returned name
/// keeps its roster spelling. On ties the earliest roster entry wins.
pub fn best_match<'a>(query: &str, roster: &'a [String]) -> Option<(&'a str, u8)> {
    let query = normalize(query);
    let mut best: Option<(&'a str, u8)> = None;

    for name in roster {
        let score = ratio(&query, &normalize(name));
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((name.as_str(), score));
        }
        if score == 100 {
            break;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_identical() {
        assert_eq!(ratio("Smith", "Smith"), 100);
        assert_eq!(ratio("", ""), 100);
    }

    #[test]
    fn test_ratio_substitution() {
        assert_eq!(ratio("Smlth", "Smith"), 80);
    }

    #[test]
    fn test_ratio_disjoint() {
        assert_eq!(ratio("abc", "xyz"), 0);
        assert_eq!(ratio("abc", ""), 0);
    }

    #[test]
    fn test_ratio_cyrillic_truncation() {
        // 2 * 8 / 17 = 94.1
        assert_eq!(ratio("Бомбилаа", "Бомбилаат"), 94);
        // 2 * 7 / 15 = 93.3
        assert_eq!(ratio("Самрешу", "Самарешу"), 93);
    }

    #[test]
    fn test_ratio_rounds_half_to_even() {
        // 2 * 3 / 16 = 37.5 -> 38, 2 * 1 / 16 = 12.5 -> 12
        let long = format!("abc{}", "x".repeat(10));
        assert_eq!(ratio("abc", &long), 38);
        let long = format!("a{}", "x".repeat(14));
        assert_eq!(ratio("a", &long), 12);
        assert_eq!(ratio("ab", "axxxxx"), 25);
    }

    #[test]
    fn test_best_match_case_insensitive() {
        let roster = vec!["Jones".to_string(), "Smith".to_string()];
        assert_eq!(best_match("SMITH", &roster), Some(("Smith", 100)));
    }

    #[test]
    fn test_best_match_first_wins_ties() {
        let roster = vec!["Abcx".to_string(), "Abcy".to_string()];
        assert_eq!(best_match("Abcz", &roster), Some(("Abcx", 75)));
    }

    #[test]
    fn test_best_match_empty_roster() {
        assert_eq!(best_match("Smith", &[]), None);
    }
}
