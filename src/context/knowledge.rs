//! Keyword relevance search over uploaded knowledge documents.

use serde::Serialize;
use std::collections::BTreeSet;

use super::KnowledgeDoc;

/// Direct substring containment of the whole query in the content.
const SUBSTRING_WEIGHT: f64 = 0.5;
/// Each distinct query word found among the document's top keywords.
const KEYWORD_WEIGHT: f64 = 0.2;
/// Only the document's ten most frequent keywords participate.
const KEYWORD_DEPTH: usize = 10;
/// Snippets at or below this score are not worth including.
const SCORE_FLOOR: f64 = 0.3;

/// One snippet selected for prompt assembly.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeSnippet {
    pub content: String,
    pub category: String,
    pub score: f64,
}

/// Score each document against the query and return the best matches.
///
/// Scoring: +0.5 when the content contains the query verbatim, +0.2 per
/// distinct query word matching one of the document's top-10 keywords,
/// capped at 1.0. Only scores above 0.3 are eligible; at most `limit`
/// snippets come back, sorted descending by score.
pub fn search_knowledge(docs: &[KnowledgeDoc], query: &str, limit: usize) -> Vec<KnowledgeSnippet> {
    let query_lower = query.to_lowercase();
    let query_words: BTreeSet<&str> = query_lower.split_whitespace().collect();

    let mut scored: Vec<KnowledgeSnippet> = docs
        .iter()
        .filter_map(|doc| {
            let score = score_document(doc, &query_lower, &query_words);
            (score > SCORE_FLOOR).then(|| KnowledgeSnippet {
                content: doc.content.clone(),
                category: doc.category.clone(),
                score,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);
    scored
}

fn score_document(doc: &KnowledgeDoc, query_lower: &str, query_words: &BTreeSet<&str>) -> f64 {
    let mut score = 0.0;

    if !query_lower.is_empty() && doc.content.to_lowercase().contains(query_lower) {
        score += SUBSTRING_WEIGHT;
    }

    let top_keywords: Vec<String> = doc
        .keywords
        .iter()
        .take(KEYWORD_DEPTH)
        .map(|k| k.to_lowercase())
        .collect();

    for word in query_words {
        if top_keywords.iter().any(|keyword| keyword == word) {
            score += KEYWORD_WEIGHT;
        }
    }

    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str, keywords: &[&str]) -> KnowledgeDoc {
        KnowledgeDoc {
            content: content.to_owned(),
            keywords: keywords.iter().map(|k| (*k).to_owned()).collect(),
            category: "pricing".to_owned(),
        }
    }

    #[test]
    fn substring_match_alone_is_below_the_floor_plus_keywords_clears_it() {
        let docs = vec![doc("our roi calculator shows payback in six months", &["roi"])];

        // Substring only: 0.5 > 0.3, eligible
        let hits = search_knowledge(&docs, "roi calculator", 3);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 0.7).abs() < 1e-9); // 0.5 substring + 0.2 keyword "roi"
    }

    #[test]
    fn keyword_overlap_is_monotonic() {
        let docs = vec![doc(
            "enterprise deployment guide",
            &["security", "compliance", "integration"],
        )];

        let one = search_knowledge(&docs, "zzz security", 3);
        let two = search_knowledge(&docs, "zzz security compliance", 3);

        // One keyword (0.2) is below the floor, two (0.4) clear it
        assert!(one.is_empty());
        assert_eq!(two.len(), 1);
        assert!((two[0].score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn score_is_capped_at_one() {
        let docs = vec![doc(
            "roi",
            &["roi", "cost", "budget", "price", "payback", "value"],
        )];

        let hits = search_knowledge(&docs, "roi cost budget price payback value", 3);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score <= 1.0);
    }

    #[test]
    fn repeated_query_words_count_once() {
        let docs = vec![doc("general notes", &["security", "compliance"])];

        let hits = search_knowledge(&docs, "security security security compliance", 3);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn only_top_ten_keywords_participate() {
        let keywords: Vec<String> = (0..12).map(|i| format!("kw{i}")).collect();
        let refs: Vec<&str> = keywords.iter().map(String::as_str).collect();
        let docs = vec![doc("irrelevant body", &refs)];

        // kw10 and kw11 sit beyond the depth cut
        assert!(search_knowledge(&docs, "kw10 kw11", 3).is_empty());
        assert!(!search_knowledge(&docs, "kw0 kw1", 3).is_empty());
    }

    #[test]
    fn results_are_sorted_descending_and_limited_to_three() {
        let docs = vec![
            doc("alpha", &["alpha", "beta"]),
            doc("query text appears here: alpha beta", &["alpha", "beta"]),
            doc("unrelated", &["alpha", "beta", "gamma"]),
            doc("nothing at all", &[]),
        ];

        let hits = search_knowledge(&docs, "alpha beta gamma", 3);
        assert!(hits.len() <= 3);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert!(hits.iter().all(|hit| hit.score > 0.3));
    }

    #[test]
    fn empty_query_matches_nothing() {
        let docs = vec![doc("anything", &["anything"])];
        assert!(search_knowledge(&docs, "", 3).is_empty());
    }
}
