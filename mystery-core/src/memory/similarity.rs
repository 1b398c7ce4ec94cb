//! Lexical similarity used for memory retrieval and clue relevance.
//!
//! Term-frequency cosine over lowercased word tokens with stopwords removed.
//! Cheap, deterministic and good enough to rank a few dozen records per NPC.

use std::collections::{HashMap, HashSet};

lazy_static::lazy_static! {
    static ref STOPWORDS: HashSet<&'static str> = [
        "a", "about", "all", "am", "an", "and", "any", "are", "as", "at", "be", "been",
        "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has",
        "have", "he", "her", "him", "his", "how", "i", "if", "in", "into", "is", "it",
        "its", "just", "me", "my", "no", "not", "of", "on", "or", "our", "she", "so",
        "that", "the", "their", "them", "then", "there", "they", "this", "to", "us",
        "was", "we", "were", "what", "when", "where", "which", "who", "why", "will",
        "with", "would", "you", "your", "tell", "know", "anything", "something",
    ]
    .into_iter()
    .collect();
}

/// Split text into normalized content words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
        .map(|w| w.strip_suffix("'s").map(str::to_string).unwrap_or(w))
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(w.as_str()))
        .collect()
}

fn term_frequencies(tokens: &[String]) -> HashMap<&str, f64> {
    let mut tf = HashMap::new();
    for token in tokens {
        *tf.entry(token.as_str()).or_insert(0.0) += 1.0;
    }
    tf
}

/// Cosine similarity of two texts in `[0, 1]`. Zero when either has no content words.
pub fn cosine(a: &str, b: &str) -> f64 {
    let a_tokens = tokenize(a);
    let b_tokens = tokenize(b);
    let a_tf = term_frequencies(&a_tokens);
    let b_tf = term_frequencies(&b_tokens);
    if a_tf.is_empty() || b_tf.is_empty() {
        return 0.0;
    }

    let dot: f64 = a_tf
        .iter()
        .filter_map(|(term, a)| b_tf.get(term).map(|b| a * b))
        .sum();
    let norm = |tf: &HashMap<&str, f64>| tf.values().map(|v| v * v).sum::<f64>().sqrt();
    dot / (norm(&a_tf) * norm(&b_tf))
}

/// Share of `keywords` that appear in `text`, in `[0, 1]`.
///
/// Multi-word keywords count when all of their words appear.
pub fn keyword_overlap(text: &str, keywords: &[String]) -> f64 {
    let words: HashSet<String> = tokenize(text).into_iter().collect();
    let keyword_tokens: Vec<Vec<String>> = keywords
        .iter()
        .map(|k| tokenize(k))
        .filter(|t| !t.is_empty())
        .collect();
    if keyword_tokens.is_empty() {
        return 0.0;
    }
    let hits = keyword_tokens
        .iter()
        .filter(|k| k.iter().all(|w| words.contains(w)))
        .count();
    hits as f64 / keyword_tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stopwords_and_possessives() {
        assert_eq!(
            tokenize("Where was the Colonel's revolver?"),
            vec!["colonel".to_string(), "revolver".to_string()]
        );
    }

    #[test]
    fn test_cosine_bounds() {
        assert_eq!(cosine("", "poison in the tea"), 0.0);
        assert_eq!(cosine("the and of", "poison"), 0.0);
        let same = cosine("poison in the tea", "tea with poison");
        assert!((same - 1.0).abs() < 1e-9);
        let partial = cosine("poison in the tea", "the tea was cold");
        assert!(partial > 0.0 && partial < 1.0);
    }

    #[test]
    fn test_keyword_overlap() {
        let keywords = vec!["greenhouse".to_string(), "muddy boots".to_string()];
        assert_eq!(keyword_overlap("Were you in the greenhouse?", &keywords), 0.5);
        assert_eq!(
            keyword_overlap("Whose muddy boots were by the greenhouse door?", &keywords),
            1.0
        );
        assert_eq!(keyword_overlap("Nice weather", &keywords), 0.0);
        assert_eq!(keyword_overlap("anything", &[]), 0.0);
    }
}
