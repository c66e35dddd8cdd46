//! Mapping of loosely shaped analysis JSON onto [`KeywordEntry`] values.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::analysis::report::{
    KeywordEntry, KeywordSummary, Metric, SerpEntry, Trend, DEFAULT_RELEVANCE,
};

pub const PRIMARY_LIMIT: usize = 10;
pub const SECONDARY_LIMIT: usize = 20;
pub const LONG_TAIL_INTENT: &str = "long-tail";

/// Which list of the reply an entry was pulled from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordGroup {
    General,
    Primary,
    Secondary,
    LongTail,
}

impl KeywordGroup {
    /// Intent given to entries of this group that carry none of their own
    pub fn default_intent(&self) -> &'static str {
        match self {
            KeywordGroup::General => "unknown",
            KeywordGroup::Primary => "commercial",
            KeywordGroup::Secondary => "informational",
            KeywordGroup::LongTail => LONG_TAIL_INTENT,
        }
    }
}

const GROUP_KEYS: &[(&str, KeywordGroup)] = &[
    ("keywords", KeywordGroup::General),
    ("primary_keywords", KeywordGroup::Primary),
    ("primaryKeywords", KeywordGroup::Primary),
    ("secondary_keywords", KeywordGroup::Secondary),
    ("secondaryKeywords", KeywordGroup::Secondary),
    ("long_tail_keywords", KeywordGroup::LongTail),
    ("longTailKeywords", KeywordGroup::LongTail),
    ("longtail_keywords", KeywordGroup::LongTail),
];

/// Wrapper keys searched when the root holds no keyword lists
const NESTED_KEYS: &[&str] = &["data", "analysis", "result", "report", "keyword_analysis", "keywordAnalysis"];

const KEYWORD_FIELDS: &[&str] = &["keyword", "text", "word"];
const INTENT_FIELDS: &[&str] = &["intent", "search_intent", "searchIntent"];
const DIFFICULTY_FIELDS: &[&str] = &["difficulty", "keyword_difficulty", "keywordDifficulty"];
const VOLUME_FIELDS: &[&str] = &["search_volume", "volume", "searchVolume"];
const CPC_FIELDS: &[&str] = &["cpc", "cost_per_click", "costPerClick"];
const COMPETITION_FIELDS: &[&str] = &["competition", "competitiveness"];
const RELEVANCE_FIELDS: &[&str] = &["relevance_score", "score", "relevanceScore"];
const RELATED_FIELDS: &[&str] = &["related_keywords", "related", "relatedKeywords"];
const SERP_FIELDS: &[&str] = &["serps", "top_results", "topResults"];

/// Lists the reply assigned explicitly
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplicitGroups {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
    pub long_tail: Vec<String>,
}

impl ExplicitGroups {
    fn push(&mut self, group: KeywordGroup, keyword: &str) {
        let list = match group {
            KeywordGroup::Primary => &mut self.primary,
            KeywordGroup::Secondary => &mut self.secondary,
            KeywordGroup::LongTail => &mut self.long_tail,
            KeywordGroup::General => return,
        };
        let key = keyword.trim().to_lowercase();
        if !list.iter().any(|existing| existing.to_lowercase() == key) {
            list.push(keyword.trim().to_string());
        }
    }
}

/// Keyword data pulled out of a recovered reply, before deduplication
#[derive(Debug, Clone, Default)]
pub struct NormalizedResponse {
    pub keywords: Vec<KeywordEntry>,
    pub explicit: ExplicitGroups,
    pub recommendations: Vec<String>,
}

/// Collect every keyword-like object from the reply
pub fn normalize_response(value: &Value) -> NormalizedResponse {
    let mut normalized = NormalizedResponse::default();
    collect(value, &mut normalized, 0);
    normalized
}

fn collect(value: &Value, out: &mut NormalizedResponse, depth: usize) {
    if depth > 3 {
        return;
    }

    match value {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(map) if has_group_keys(map) => collect(item, out, depth + 1),
                    _ => {
                        if let Some(entry) = parse_entry(item, KeywordGroup::General) {
                            out.keywords.push(entry);
                        }
                    }
                }
            }
        }
        Value::Object(map) => {
            if !has_group_keys(map) {
                for key in NESTED_KEYS {
                    if let Some(nested @ (Value::Object(_) | Value::Array(_))) = map.get(*key) {
                        collect(nested, out, depth + 1);
                        return;
                    }
                }
            }

            collect_groups(map, out);

            if let Some(Value::Object(summary)) = map.get("summary") {
                collect_groups(summary, out);
                collect_recommendations(summary.get("recommendations"), out);
            }
            collect_recommendations(map.get("recommendations"), out);
        }
        _ => {}
    }
}

fn has_group_keys(map: &Map<String, Value>) -> bool {
    GROUP_KEYS.iter().any(|(key, _)| map.contains_key(*key))
}

fn collect_groups(map: &Map<String, Value>, out: &mut NormalizedResponse) {
    for (key, group) in GROUP_KEYS {
        let Some(Value::Array(items)) = map.get(*key) else {
            continue;
        };
        for item in items {
            if let Some(entry) = parse_entry(item, *group) {
                out.explicit.push(*group, &entry.keyword);
                out.keywords.push(entry);
            }
        }
    }
}

fn collect_recommendations(value: Option<&Value>, out: &mut NormalizedResponse) {
    let Some(Value::Array(items)) = value else {
        return;
    };
    for item in items {
        let text = match item {
            Value::String(text) => Some(text.trim().to_string()),
            Value::Object(map) => ["recommendation", "text", "title", "description"]
                .iter()
                .find_map(|field| map.get(*field).and_then(Value::as_str))
                .map(|text| text.trim().to_string()),
            _ => None,
        };
        if let Some(text) = text.filter(|text| !text.is_empty()) {
            if !out.recommendations.contains(&text) {
                out.recommendations.push(text);
            }
        }
    }
}

/// Map one raw item onto the canonical entry shape
pub fn parse_entry(item: &Value, group: KeywordGroup) -> Option<KeywordEntry> {
    let map = match item {
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            let mut entry = KeywordEntry::new(text);
            entry.intent = group.default_intent().to_string();
            return Some(entry);
        }
        Value::Object(map) => map,
        _ => return None,
    };

    let keyword = first(map, KEYWORD_FIELDS)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())?;

    let mut entry = KeywordEntry::new(keyword);

    entry.intent = first(map, INTENT_FIELDS)
        .and_then(Value::as_str)
        .map(|intent| intent.trim().to_lowercase())
        .filter(|intent| !intent.is_empty())
        .unwrap_or_else(|| group.default_intent().to_string());

    entry.difficulty = metric(first(map, DIFFICULTY_FIELDS));
    entry.search_volume = metric(first(map, VOLUME_FIELDS));
    entry.cpc = metric(first(map, CPC_FIELDS));
    entry.competition = metric(first(map, COMPETITION_FIELDS));
    entry.relevance_score = first(map, RELEVANCE_FIELDS)
        .and_then(number)
        .unwrap_or(DEFAULT_RELEVANCE);
    entry.trend = trend(map.get("trend"));
    entry.related_keywords = related(first(map, RELATED_FIELDS));
    entry.serps = serps(first(map, SERP_FIELDS));

    Some(entry)
}

fn first<'a>(map: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .filter_map(|field| map.get(*field))
        .find(|value| !value.is_null())
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').replace(',', "").parse().ok(),
        _ => None,
    };
    parsed.filter(|n: &f64| n.is_finite())
}

fn metric(value: Option<&Value>) -> Metric {
    match value {
        Some(Value::Number(n)) => n.as_f64().map(Metric::Number).unwrap_or_default(),
        Some(Value::String(s)) if !s.trim().is_empty() => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Metric::Number(n),
            _ => Metric::Text(s.trim().to_string()),
        },
        _ => Metric::default(),
    }
}

fn trend(value: Option<&Value>) -> Trend {
    let monthly = match value {
        Some(Value::Object(map)) => ["monthly", "monthly_searches", "monthlySearches"]
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_array)),
        Some(Value::Array(items)) => Some(items),
        _ => None,
    };

    Trend {
        monthly: monthly
            .map(|items| items.iter().filter_map(number).collect())
            .unwrap_or_default(),
    }
}

fn related(value: Option<&Value>) -> Vec<String> {
    let texts: Vec<String> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text.clone()),
                Value::Object(map) => first(map, KEYWORD_FIELDS)
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        Some(Value::String(text)) => text.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    texts
        .into_iter()
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

fn serps(value: Option<&Value>) -> Vec<SerpEntry> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(url) => Some(SerpEntry {
                url: url.clone(),
                ..SerpEntry::default()
            }),
            Value::Object(map) => {
                let text = |fields: &[&str]| {
                    first(map, fields)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                Some(SerpEntry {
                    title: text(&["title", "name"]),
                    url: text(&["url", "link"]),
                    position: first(map, &["position", "rank"])
                        .and_then(number)
                        .map(|n| n as u32),
                })
            }
            _ => None,
        })
        .collect()
}

/// Collapse entries sharing a lowercase keyword; the higher relevance wins.
/// The surviving entry keeps the position of the first occurrence.
pub fn dedup_keywords(entries: Vec<KeywordEntry>) -> Vec<KeywordEntry> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<KeywordEntry> = Vec::with_capacity(entries.len());

    for entry in entries {
        let key = entry.key();
        match positions.get(&key) {
            Some(&index) => {
                if entry.relevance_score > unique[index].relevance_score {
                    unique[index] = entry;
                }
            }
            None => {
                positions.insert(key, unique.len());
                unique.push(entry);
            }
        }
    }

    unique
}

/// Build the summary, honoring explicit groups when the reply supplied them
pub fn build_summary(keywords: &[KeywordEntry], explicit: &ExplicitGroups) -> KeywordSummary {
    let texts: Vec<String> = keywords.iter().map(|entry| entry.keyword.clone()).collect();

    let primary_keywords = if explicit.primary.is_empty() {
        texts.iter().take(PRIMARY_LIMIT).cloned().collect()
    } else {
        explicit.primary.clone()
    };

    let secondary_keywords = if explicit.secondary.is_empty() {
        texts
            .iter()
            .skip(PRIMARY_LIMIT)
            .take(SECONDARY_LIMIT)
            .cloned()
            .collect()
    } else {
        explicit.secondary.clone()
    };

    let long_tail_keywords = if explicit.long_tail.is_empty() {
        keywords
            .iter()
            .filter(|entry| is_long_tail_intent(&entry.intent))
            .map(|entry| entry.keyword.clone())
            .collect()
    } else {
        explicit.long_tail.clone()
    };

    let mut intent_breakdown = BTreeMap::new();
    for entry in keywords {
        *intent_breakdown.entry(entry.intent.clone()).or_insert(0) += 1;
    }

    KeywordSummary {
        primary_keywords,
        secondary_keywords,
        long_tail_keywords,
        total_keywords: keywords.len(),
        intent_breakdown,
    }
}

fn is_long_tail_intent(intent: &str) -> bool {
    matches!(intent, "long-tail" | "long_tail" | "longtail" | "long tail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_synonyms_map_to_canonical_shape() {
        let item = json!({
            "text": "Keyword Research Tool",
            "search_intent": "Commercial",
            "keyword_difficulty": 42,
            "volume": "1,200",
            "cost_per_click": "2.35",
            "competitiveness": "high",
            "score": "87",
            "related": ["keyword tool", {"keyword": "seo research"}],
            "top_results": [{"title": "Best tools", "link": "https://a.example", "rank": 1}, "https://b.example"],
            "trend": {"monthly": [10, "20", 30]}
        });

        let entry = parse_entry(&item, KeywordGroup::General).unwrap();

        assert_eq!(entry.keyword, "Keyword Research Tool");
        assert_eq!(entry.intent, "commercial");
        assert_eq!(entry.difficulty, Metric::Number(42.0));
        assert_eq!(entry.search_volume, Metric::Text("1,200".to_string()));
        assert_eq!(entry.cpc, Metric::Number(2.35));
        assert_eq!(entry.competition, Metric::Text("high".to_string()));
        assert_eq!(entry.relevance_score, 87.0);
        assert_eq!(entry.related_keywords, vec!["keyword tool", "seo research"]);
        assert_eq!(entry.serps.len(), 2);
        assert_eq!(entry.serps[0].url, "https://a.example");
        assert_eq!(entry.serps[0].position, Some(1));
        assert_eq!(entry.serps[1].url, "https://b.example");
        assert_eq!(entry.trend.monthly, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let entry = parse_entry(&json!({"word": "audit"}), KeywordGroup::General).unwrap();

        assert_eq!(entry.intent, "unknown");
        assert_eq!(entry.relevance_score, DEFAULT_RELEVANCE);
        assert_eq!(entry.search_volume, Metric::default());
        assert!(entry.related_keywords.is_empty());

        assert!(parse_entry(&json!({"intent": "commercial"}), KeywordGroup::General).is_none());
        assert!(parse_entry(&json!("   "), KeywordGroup::General).is_none());
        assert!(parse_entry(&json!(12), KeywordGroup::General).is_none());
    }

    #[test]
    fn test_group_entries_inherit_intent() {
        let reply = json!({
            "primary_keywords": ["seo agency"],
            "long_tail_keywords": [
                {"keyword": "how to run an seo audit"},
                {"keyword": "seo audit checklist pdf", "intent": "Informational"}
            ]
        });

        let normalized = normalize_response(&reply);
        let intents: Vec<(&str, &str)> = normalized
            .keywords
            .iter()
            .map(|entry| (entry.keyword.as_str(), entry.intent.as_str()))
            .collect();

        assert_eq!(
            intents,
            vec![
                ("seo agency", "commercial"),
                ("how to run an seo audit", "long-tail"),
                ("seo audit checklist pdf", "informational"),
            ]
        );
        assert_eq!(normalized.explicit.primary, vec!["seo agency"]);
        assert_eq!(normalized.explicit.long_tail.len(), 2);
    }

    #[test]
    fn test_camel_case_and_nested_roots() {
        let reply = json!({
            "data": {
                "keywords": [{"keyword": "rank tracker", "relevanceScore": 70}],
                "longTailKeywords": ["free rank tracker for small sites"],
                "recommendations": ["Add FAQ sections", {"text": "Improve internal linking"}]
            }
        });

        let normalized = normalize_response(&reply);

        assert_eq!(normalized.keywords.len(), 2);
        assert_eq!(normalized.keywords[0].relevance_score, 70.0);
        assert_eq!(normalized.keywords[1].intent, "long-tail");
        assert_eq!(
            normalized.recommendations,
            vec!["Add FAQ sections", "Improve internal linking"]
        );
    }

    #[test]
    fn test_top_level_array_of_entries() {
        let reply = json!([{"keyword": "a"}, "b", 3, {"intent": "x"}]);
        let normalized = normalize_response(&reply);

        let words: Vec<&str> = normalized.keywords.iter().map(|k| k.keyword.as_str()).collect();
        assert_eq!(words, vec!["a", "b"]);
    }

    #[test]
    fn test_dedup_keeps_higher_relevance() {
        let mut low = KeywordEntry::new("seo audit");
        low.relevance_score = 40.0;
        let mut high = KeywordEntry::new("SEO Audit");
        high.relevance_score = 70.0;
        let other = KeywordEntry::new("backlinks");

        let unique = dedup_keywords(vec![low, other, high]);

        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].key(), "seo audit");
        assert_eq!(unique[0].relevance_score, 70.0);
        assert_eq!(unique[1].keyword, "backlinks");
    }

    #[test]
    fn test_summary_derived_by_position_and_intent() {
        let keywords: Vec<KeywordEntry> = (0..35)
            .map(|i| {
                let mut entry = KeywordEntry::new(format!("keyword {}", i));
                entry.intent = if i % 5 == 0 { "long-tail" } else { "informational" }.to_string();
                entry
            })
            .collect();

        let summary = build_summary(&keywords, &ExplicitGroups::default());

        assert_eq!(summary.primary_keywords.len(), 10);
        assert_eq!(summary.primary_keywords[0], "keyword 0");
        assert_eq!(summary.secondary_keywords.len(), 20);
        assert_eq!(summary.secondary_keywords[0], "keyword 10");
        assert_eq!(summary.long_tail_keywords.len(), 7);
        assert_eq!(summary.total_keywords, 35);
        assert_eq!(summary.intent_breakdown.get("informational"), Some(&28));
        assert_eq!(summary.intent_breakdown.get("long-tail"), Some(&7));
    }

    #[test]
    fn test_summary_honors_explicit_groups() {
        let keywords = vec![KeywordEntry::new("a"), KeywordEntry::new("b")];
        let explicit = ExplicitGroups {
            primary: vec!["b".to_string()],
            secondary: Vec::new(),
            long_tail: vec!["a".to_string()],
        };

        let summary = build_summary(&keywords, &explicit);

        assert_eq!(summary.primary_keywords, vec!["b"]);
        assert!(summary.secondary_keywords.is_empty());
        assert_eq!(summary.long_tail_keywords, vec!["a"]);
    }
}
