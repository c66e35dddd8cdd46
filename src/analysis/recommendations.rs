use crate::analysis::report::KeywordSummary;
use crate::crawler::task::PageResult;

pub const MIN_LONG_TAIL: usize = 5;
pub const SUBSTANTIAL_CONTENT_CHARS: usize = 100;
pub const MIN_COVERAGE_RATIO: f64 = 0.7;

const BEST_PRACTICES: &[&str] = &[
    "Place primary keywords in page titles, H1 headings and meta descriptions",
    "Link related pages together using descriptive, keyword-rich anchor text",
    "Review keyword rankings regularly and refresh content that loses visibility",
];

/// Heuristic advice derived from crawl and keyword signals.
///
/// Used when the analysis service did not supply its own list.
pub fn synthesize(summary: &KeywordSummary, pages: &[&PageResult]) -> Vec<String> {
    let mut recommendations = Vec::new();

    let commercial = intent_count(summary, "commercial") + intent_count(summary, "transactional");
    let informational = intent_count(summary, "informational");
    if commercial > informational * 2 {
        recommendations.push(format!(
            "Balance keyword intent: {} commercial keywords against {} informational. \
             Add guides, how-tos and FAQ content to capture research-stage searches",
            commercial, informational
        ));
    }

    let long_tail = summary.long_tail_keywords.len();
    if long_tail < MIN_LONG_TAIL {
        recommendations.push(format!(
            "Expand long-tail coverage: only {} long-tail keywords found. \
             Target specific multi-word phrases with lower competition",
            long_tail
        ));
    }

    if let Some(ratio) = coverage_ratio(pages) {
        if ratio < MIN_COVERAGE_RATIO {
            recommendations.push(format!(
                "Improve content depth: only {:.0}% of crawled pages have substantial text content",
                ratio * 100.0
            ));
        }
    }

    recommendations.extend(BEST_PRACTICES.iter().map(|tip| tip.to_string()));
    recommendations
}

fn intent_count(summary: &KeywordSummary, intent: &str) -> usize {
    summary.intent_breakdown.get(intent).copied().unwrap_or(0)
}

/// Share of crawled pages carrying more than [`SUBSTANTIAL_CONTENT_CHARS`] of text
pub fn coverage_ratio(pages: &[&PageResult]) -> Option<f64> {
    if pages.is_empty() {
        return None;
    }
    let substantial = pages
        .iter()
        .filter(|page| page.content_length > SUBSTANTIAL_CONTENT_CHARS)
        .count();
    Some(substantial as f64 / pages.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::extract::ExtractedPage;
    use std::collections::BTreeMap;

    fn page(content_length: usize) -> PageResult {
        PageResult::loaded(
            "https://example.com/",
            0,
            ExtractedPage {
                content_length,
                ..ExtractedPage::default()
            },
        )
    }

    fn summary(intents: &[(&str, usize)], long_tail: usize) -> KeywordSummary {
        KeywordSummary {
            long_tail_keywords: (0..long_tail).map(|i| format!("phrase {}", i)).collect(),
            intent_breakdown: intents
                .iter()
                .map(|(intent, count)| (intent.to_string(), *count))
                .collect::<BTreeMap<_, _>>(),
            ..KeywordSummary::default()
        }
    }

    #[test]
    fn test_flags_intent_imbalance_and_thin_long_tail() {
        let (a, b) = (page(500), page(600));
        let pages = [&a, &b];
        let recs = synthesize(&summary(&[("commercial", 7), ("informational", 2)], 1), &pages);

        assert!(recs[0].starts_with("Balance keyword intent"));
        assert!(recs[1].starts_with("Expand long-tail coverage"));
        assert_eq!(recs.len(), 2 + BEST_PRACTICES.len());
    }

    #[test]
    fn test_flags_low_content_coverage() {
        let (a, b, c) = (page(500), page(20), page(0));
        let pages = [&a, &b, &c];
        let recs = synthesize(&summary(&[("informational", 3)], 8), &pages);

        assert_eq!(recs.len(), 1 + BEST_PRACTICES.len());
        assert!(recs[0].contains("33%"));
    }

    #[test]
    fn test_healthy_site_gets_only_best_practices() {
        let (a, b) = (page(500), page(300));
        let pages = [&a, &b];
        let recs = synthesize(&summary(&[("commercial", 2), ("informational", 2)], 6), &pages);

        assert_eq!(recs.len(), BEST_PRACTICES.len());
        assert_eq!(coverage_ratio(&[]), None);
    }
}
