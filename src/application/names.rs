//! Name normalization and similarity scoring.
//!
//! Shared by the event resolver (team names) and the market resolver
//! (selection names). Normalization lowercases, strips punctuation, and
//! collapses whitespace; similarity runs exact, substring, word-overlap,
//! and character-bigram comparisons in that order.

/// Normalize a team or selection name for comparison.
#[must_use]
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = true;
    for c in name.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_space = false;
        } else if (c.is_whitespace() || c.is_ascii_punctuation()) && !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Similarity between two normalized names, in [0, 1].
///
/// 1.0 on exact match; 0.95 when one side contains the other ("tigers" vs
/// "detroit tigers"); otherwise Jaccard over word sets, boosted by 0.2 and
/// capped at 0.95 when any word overlaps; character bigrams as a last
/// resort for single-word typos.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.contains(b) || b.contains(a) {
        return 0.95;
    }

    let words_a: Vec<&str> = a.split_whitespace().collect();
    let words_b: Vec<&str> = b.split_whitespace().collect();
    if !words_a.is_empty() && !words_b.is_empty() {
        let overlap = words_a.iter().filter(|w| words_b.contains(w)).count();
        let union = {
            let mut all: Vec<&str> = words_a.clone();
            for w in &words_b {
                if !all.contains(w) {
                    all.push(w);
                }
            }
            all.len()
        };
        let jaccard = overlap as f64 / union as f64;
        if overlap > 0 {
            return (jaccard + 0.2).min(0.95);
        }
        if words_a.len() > 1 || words_b.len() > 1 {
            return jaccard;
        }
    }

    bigram_similarity(a, b)
}

/// Sørensen–Dice coefficient over character bigrams.
fn bigram_similarity(a: &str, b: &str) -> f64 {
    let bigrams = |s: &str| -> Vec<(char, char)> {
        let chars: Vec<char> = s.chars().collect();
        chars.windows(2).map(|w| (w[0], w[1])).collect()
    };

    let mut grams_a = bigrams(a);
    let grams_b = bigrams(b);
    if grams_a.is_empty() || grams_b.is_empty() {
        return 0.0;
    }

    let total = grams_a.len() + grams_b.len();
    let mut shared = 0usize;
    for gram in &grams_b {
        if let Some(pos) = grams_a.iter().position(|g| g == gram) {
            grams_a.swap_remove(pos);
            shared += 1;
        }
    }

    2.0 * shared as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_strips_punctuation() {
        assert_eq!(normalize("St. Louis Cardinals"), "st louis cardinals");
        assert_eq!(normalize("  Tampa   Bay  Rays "), "tampa bay rays");
        assert_eq!(normalize("O'Neill"), "o neill");
    }

    #[test]
    fn identical_names_score_one() {
        assert_eq!(similarity("detroit tigers", "detroit tigers"), 1.0);
    }

    #[test]
    fn substring_scores_near_one() {
        let score = similarity("tigers", "detroit tigers");
        assert!((score - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn word_overlap_boosted() {
        // "detroit tigers" vs "tigers detroit jr": overlap 2, union 3.
        let score = similarity("detroit tigers", "tigers detroit jr");
        assert!(score > 0.8);
        assert!(score <= 0.95);
    }

    #[test]
    fn disjoint_names_score_low() {
        let score = similarity("detroit tigers", "houston astros");
        assert!(score < 0.3);
    }

    #[test]
    fn single_word_typo_uses_bigrams() {
        let score = similarity("yankees", "yankes");
        assert!(score > 0.6);
    }

    #[test]
    fn empty_name_scores_zero() {
        assert_eq!(similarity("", "tigers"), 0.0);
        assert_eq!(similarity("tigers", ""), 0.0);
    }
}
