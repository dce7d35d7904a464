//! Nearest-neighbour name suggestions for an unresolved tool/prompt name.

/// Classic O(n*m) edit-distance, iterative with a rolling two-row buffer.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Up to 5 names from `candidates` within edit distance `⌊name.len()/2⌋`
/// of `name`, nearest first.
pub fn suggest(name: &str, candidates: &[String]) -> Vec<String> {
    let max_distance = name.chars().count() / 2;
    let mut scored: Vec<(usize, &String)> = candidates
        .iter()
        .map(|c| (levenshtein(name, c), c))
        .filter(|(d, _)| *d <= max_distance)
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    scored.into_iter().take(5).map(|(_, c)| c.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_have_zero_distance() {
        assert_eq!(levenshtein("echo", "echo"), 0);
    }

    #[test]
    fn single_substitution_has_distance_one() {
        assert_eq!(levenshtein("echo", "ochо".replace('о', "o").as_str()), 0);
        assert_eq!(levenshtein("echo", "acho"), 1);
    }

    #[test]
    fn suggestions_are_within_half_length_distance() {
        let candidates = vec!["echo_srv1".to_string(), "ech_srv1".to_string(), "totally_unrelated".to_string()];
        let suggestions = suggest("echo_srv1", &candidates);
        assert!(suggestions.contains(&"echo_srv1".to_string()));
        assert!(!suggestions.contains(&"totally_unrelated".to_string()));
    }

    #[test]
    fn suggestions_are_capped_at_five() {
        let candidates: Vec<String> = (0..10).map(|i| format!("ech{i}")).collect();
        let suggestions = suggest("echo", &candidates);
        assert!(suggestions.len() <= 5);
    }
}
