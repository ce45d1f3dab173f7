//! Token-set (Jaccard) similarity between two headline strings.
//! Pure and deterministic; the cheap first line of the dedup pipeline.

use std::collections::HashSet;

/// Jaccard index over the token sets of `a` and `b`, in `[0, 1]`.
/// Returns 0 when either side has no usable tokens.
pub fn similarity(a: &str, b: &str) -> f64 {
    let set_a = token_set(a);
    let set_b = token_set(b);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.len() + set_b.len() - intersection;
    intersection as f64 / union as f64
}

/// Lowercase, strip punctuation, split on whitespace, drop one-character
/// tokens ("a", "&", digits like "5" carry no signal for headline identity).
fn token_set(s: &str) -> HashSet<String> {
    let cleaned: String = s
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() > 1)
        .map(str::to_string)
        .collect()
}
