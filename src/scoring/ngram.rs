//! N-gram Jaccard similarity over activation example texts.

use std::collections::HashSet;

/// Character n-gram size for repetition checks.
pub const CHAR_NGRAM_SIZE: usize = 3;
/// Word n-gram size for repetition checks.
pub const WORD_NGRAM_SIZE: usize = 2;

/// Mean pairwise Jaccard similarity of character n-gram sets across the
/// example texts. `None` with fewer than two non-empty gram sets.
pub fn char_ngram_jaccard(examples: &[String], n: usize) -> Option<f32> {
    let grams: Vec<HashSet<String>> = examples
        .iter()
        .map(|text| char_ngrams(text, n))
        .filter(|set| !set.is_empty())
        .collect();
    mean_pairwise_jaccard(&grams)
}

/// Mean pairwise Jaccard similarity of word n-gram sets across the example
/// texts. `None` with fewer than two non-empty gram sets.
pub fn word_ngram_jaccard(examples: &[String], n: usize) -> Option<f32> {
    let grams: Vec<HashSet<String>> = examples
        .iter()
        .map(|text| word_ngrams(text, n))
        .filter(|set| !set.is_empty())
        .collect();
    mean_pairwise_jaccard(&grams)
}

fn char_ngrams(text: &str, n: usize) -> HashSet<String> {
    let chars: Vec<char> = text.to_lowercase().chars().collect();
    if n == 0 || chars.len() < n {
        return HashSet::new();
    }
    chars
        .windows(n)
        .map(|window| window.iter().collect())
        .collect()
}

fn word_ngrams(text: &str, n: usize) -> HashSet<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if n == 0 || words.len() < n {
        return HashSet::new();
    }
    words
        .windows(n)
        .map(|window| window.join(" ").to_lowercase())
        .collect()
}

fn mean_pairwise_jaccard(sets: &[HashSet<String>]) -> Option<f32> {
    if sets.len() < 2 {
        return None;
    }
    let mut sum = 0.0_f32;
    let mut pairs = 0usize;
    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            sum += jaccard(&sets[i], &sets[j]);
            pairs += 1;
        }
    }
    Some(sum / pairs as f32)
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f32 / union as f32
}
