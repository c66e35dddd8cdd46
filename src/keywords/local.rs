use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Minimum token length, in characters, for a word to count as a keyword
pub const MIN_WORD_LEN: usize = 3;

/// Default number of keywords returned per page
pub const DEFAULT_MAX_KEYWORDS: usize = 10;

/// A word and the number of times it occurs in a text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCount {
    pub word: String,
    pub count: usize,
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "him", "his", "how", "its", "may", "new", "now", "old", "see",
    "two", "way", "who", "did", "get", "got", "let", "say", "she", "too", "use", "via", "yes",
    "yet", "off", "own", "per", "why", "also", "been", "from", "have", "here", "into", "just",
    "like", "more", "most", "much", "must", "only", "over", "some", "such", "than", "that",
    "them", "then", "they", "this", "very", "want", "were", "what", "when", "will", "with",
    "your", "about", "after", "again", "being", "below", "could", "does", "doing", "down",
    "each", "few", "further", "having", "their", "theirs", "there", "these", "those", "through",
    "under", "until", "where", "which", "while", "whom", "would", "should", "shall", "other",
    "ours", "same", "both", "because", "before", "between", "above", "against", "during",
    "itself", "myself", "yourself", "themselves", "ourselves", "herself", "himself", "cannot",
    "make", "made", "many", "every", "even", "well", "back", "still", "need", "know", "take",
    "come", "help", "page", "click", "home", "read", "learn", "menu", "skip", "content",
];

fn stopwords() -> &'static HashSet<&'static str> {
    static STOPWORD_SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    STOPWORD_SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

fn non_word() -> &'static Regex {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    NON_WORD.get_or_init(|| Regex::new(r"[^\w\s-]").expect("static regex is valid"))
}

/// Rank the most frequent non-stopword terms of `text`.
///
/// Words are lowercased, stripped of punctuation (hyphens survive), and
/// filtered by [`MIN_WORD_LEN`] and the stopword list. Ties keep the order in
/// which the words first appeared, so the output is fully deterministic.
pub fn extract(text: &str, max_keywords: usize) -> Vec<KeywordCount> {
    let lowered = text.to_lowercase();
    let cleaned = non_word().replace_all(&lowered, " ");

    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<KeywordCount> = Vec::new();

    for token in cleaned.split_whitespace() {
        let token = token.trim_matches('-');
        if token.chars().count() < MIN_WORD_LEN || stopwords().contains(token) {
            continue;
        }
        if token.chars().all(|c| c.is_ascii_digit() || c == '-') {
            continue;
        }

        match positions.get(token) {
            Some(&index) => counts[index].count += 1,
            None => {
                positions.insert(token, counts.len());
                counts.push(KeywordCount {
                    word: token.to_string(),
                    count: 1,
                });
            }
        }
    }

    // Stable sort keeps first-seen order among equal counts
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(max_keywords);
    counts
}

/// Merge per-page keyword counts into one ranking across the whole crawl
pub fn aggregate<'a, I>(per_page: I, max_keywords: usize) -> Vec<KeywordCount>
where
    I: IntoIterator<Item = &'a [KeywordCount]>,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<KeywordCount> = Vec::new();

    for keywords in per_page {
        for keyword in keywords {
            match positions.get(&keyword.word) {
                Some(&index) => merged[index].count += keyword.count,
                None => {
                    positions.insert(keyword.word.clone(), merged.len());
                    merged.push(keyword.clone());
                }
            }
        }
    }

    merged.sort_by(|a, b| b.count.cmp(&a.count));
    merged.truncate(max_keywords);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_term_ranks_first() {
        let keywords = extract("SEO tools help SEO teams rank better, SEO matters", 5);

        assert_eq!(
            keywords[0],
            KeywordCount {
                word: "seo".to_string(),
                count: 3
            }
        );
        assert!(keywords.len() <= 5);
        assert!(keywords[1..].iter().all(|k| k.count == 1));
        assert!(!keywords.iter().any(|k| k.word == "help"));
    }

    #[test]
    fn test_filters_short_words_and_stopwords() {
        let keywords = extract("An ox and the cat: to be or not to be", 10);
        let words: Vec<&str> = keywords.iter().map(|k| k.word.as_str()).collect();

        assert_eq!(words, vec!["cat"]);
    }

    #[test]
    fn test_keeps_hyphenated_terms_and_strips_punctuation() {
        let keywords = extract("Long-tail keywords! long-tail (keywords) drive traffic.", 10);

        assert_eq!(keywords[0].word, "long-tail");
        assert_eq!(keywords[0].count, 2);
        assert_eq!(keywords[1].word, "keywords");
        assert_eq!(keywords[1].count, 2);
        assert!(keywords.iter().any(|k| k.word == "traffic"));
    }

    #[test]
    fn test_is_deterministic_and_bounded() {
        let text = "alpha beta gamma delta alpha beta alpha epsilon zeta";
        let first = extract(text, 3);
        let second = extract(text, 3);

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].word, "alpha");
        assert_eq!(first[1].word, "beta");
        assert_eq!(first[2].word, "gamma");
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(extract("", 10).is_empty());
        assert!(extract("   ...  !!", 10).is_empty());
    }

    #[test]
    fn test_aggregate_sums_counts_across_pages() {
        let page_a = vec![
            KeywordCount { word: "audit".to_string(), count: 2 },
            KeywordCount { word: "rank".to_string(), count: 1 },
        ];
        let page_b = vec![
            KeywordCount { word: "rank".to_string(), count: 4 },
        ];

        let merged = aggregate([page_a.as_slice(), page_b.as_slice()], 10);

        assert_eq!(merged[0], KeywordCount { word: "rank".to_string(), count: 5 });
        assert_eq!(merged[1], KeywordCount { word: "audit".to_string(), count: 2 });
    }
}
