//! Canonical keyword report shapes.
//!
//! Every field has a safe default so partially filled analysis replies still
//! produce a schema-stable report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default relevance for entries that carry no score
pub const DEFAULT_RELEVANCE: f64 = 50.0;

/// Sentinel used for metrics the source did not provide
pub const NOT_AVAILABLE: &str = "N/A";

/// A keyword metric that may arrive as a number or as free text ("high", "1.2K")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metric {
    Number(f64),
    Text(String),
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Text(NOT_AVAILABLE.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub monthly: Vec<f64>,
}

/// One search engine result attached to a keyword
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerpEntry {
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordEntry {
    pub keyword: String,
    pub intent: String,
    pub difficulty: Metric,
    pub search_volume: Metric,
    pub cpc: Metric,
    pub competition: Metric,
    pub relevance_score: f64,
    pub trend: Trend,
    pub related_keywords: Vec<String>,
    pub serps: Vec<SerpEntry>,
}

impl KeywordEntry {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            intent: "unknown".to_string(),
            difficulty: Metric::default(),
            search_volume: Metric::default(),
            cpc: Metric::default(),
            competition: Metric::default(),
            relevance_score: DEFAULT_RELEVANCE,
            trend: Trend::default(),
            related_keywords: Vec::new(),
            serps: Vec::new(),
        }
    }

    /// Deduplication key
    pub fn key(&self) -> String {
        self.keyword.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordSummary {
    pub primary_keywords: Vec<String>,
    pub secondary_keywords: Vec<String>,
    pub long_tail_keywords: Vec<String>,
    pub total_keywords: usize,
    pub intent_breakdown: BTreeMap<String, usize>,
}

/// Keyword attribution for one crawled page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInsight {
    pub title: String,
    pub keyword_count: usize,
    pub top_keywords: Vec<String>,
    pub content_score: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordReport {
    pub keywords: Vec<KeywordEntry>,
    pub summary: KeywordSummary,
    pub recommendations: Vec<String>,
    pub pages: BTreeMap<String, PageInsight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_uses_sentinels() {
        let entry = KeywordEntry::new("  SEO Audit ");

        assert_eq!(entry.key(), "seo audit");
        assert_eq!(entry.intent, "unknown");
        assert_eq!(entry.relevance_score, DEFAULT_RELEVANCE);
        assert_eq!(entry.difficulty, Metric::default());

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["difficulty"], "N/A");
        assert_eq!(json["searchVolume"], "N/A");
        assert_eq!(json["relevanceScore"], 50.0);
    }

    #[test]
    fn test_metric_accepts_numbers_and_text() {
        let number: Metric = serde_json::from_str("1200").unwrap();
        let text: Metric = serde_json::from_str("\"high\"").unwrap();

        assert_eq!(number, Metric::Number(1200.0));
        assert_eq!(text, Metric::Text("high".to_string()));
        assert_ne!(text, Metric::default());
    }
}
