//! Citation extraction from generated answers

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::ScoredChunk;

fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Chunk ids look like "document#0042"; whitespace or brackets never
    // appear inside one.
    PATTERN.get_or_init(|| Regex::new(r"\[([^\[\]\s]+#\d+)\]").expect("valid citation regex"))
}

/// Chunk ids the answer explicitly cites, in first-mention order.
///
/// Only ids that were actually retrieved count; a hallucinated id is
/// dropped.
pub fn cited_ids(answer: &str, retrieved: &[ScoredChunk]) -> Vec<String> {
    let known: HashSet<&str> = retrieved.iter().map(|s| s.chunk.id.as_str()).collect();

    let mut seen = HashSet::new();
    let mut cited = Vec::new();
    for capture in citation_pattern().captures_iter(answer) {
        let id = &capture[1];
        if known.contains(id) && seen.insert(id.to_string()) {
            cited.push(id.to_string());
        }
    }
    cited
}

/// Like [`cited_ids`], but when the model cites nothing at all the top
/// retrieved chunks stand in so the caller can still show provenance.
pub fn extract_citations(answer: &str, retrieved: &[ScoredChunk]) -> Vec<String> {
    let cited = cited_ids(answer, retrieved);
    if !cited.is_empty() {
        return cited;
    }
    retrieved
        .iter()
        .take(3)
        .map(|s| s.chunk.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn scored(document_id: &str, ordinal: u32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new(document_id, "text".to_string(), 0, 4, 0, ordinal),
            similarity: 0.9,
        }
    }

    #[test]
    fn test_cited_ids_in_mention_order() {
        let retrieved = vec![scored("a", 0), scored("b", 2)];
        let answer = "Second point [b#0002], first point [a#0000].";
        assert_eq!(extract_citations(answer, &retrieved), vec!["b#0002", "a#0000"]);
    }

    #[test]
    fn test_repeated_citation_counted_once() {
        let retrieved = vec![scored("a", 0)];
        let answer = "As noted [a#0000], and again [a#0000].";
        assert_eq!(extract_citations(answer, &retrieved), vec!["a#0000"]);
    }

    #[test]
    fn test_hallucinated_id_dropped() {
        let retrieved = vec![scored("a", 0)];
        let answer = "See [ghost#0042] and [a#0000].";
        assert_eq!(extract_citations(answer, &retrieved), vec!["a#0000"]);
    }

    #[test]
    fn test_no_citations_falls_back_to_top_retrieved() {
        let retrieved = vec![scored("a", 0), scored("b", 1), scored("c", 2), scored("d", 3)];
        let answer = "An answer with no brackets at all.";
        assert_eq!(
            extract_citations(answer, &retrieved),
            vec!["a#0000", "b#0001", "c#0002"]
        );
    }

    #[test]
    fn test_empty_retrieval_yields_no_citations() {
        assert!(extract_citations("whatever [a#0000]", &[]).is_empty());
    }
}
