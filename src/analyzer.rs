//! Term matching over fetched page text.
//!
//! Scans content for search terms case-insensitively and reports, per term,
//! the occurrence count and the sentences containing it in document order.
//! Sentences are split naively on `.`, `!`, and `?`, keeping the delimiter.

use serde::Serialize;

/// Occurrences of a search term within one page.
#[derive(Debug, Clone, Serialize)]
pub struct TermMatch {
    pub term: String,
    pub url: String,
    pub domain: String,
    pub count: usize,
    pub sentences: Vec<String>,
}

struct Sentence {
    original: String,
    lower: String,
}

/// Scans `content` for each term and returns the matches. Terms with no
/// occurrences are omitted. Content and sentences are lowercased once up
/// front so the per-term scan works over precomputed data.
pub fn find_term_matches(
    content: &str,
    url: &str,
    domain: &str,
    terms: &[String],
) -> Vec<TermMatch> {
    if content.is_empty() || terms.is_empty() {
        return Vec::new();
    }

    let lower_content = content.to_lowercase();
    let sentences = split_into_sentences(content);

    let mut results = Vec::with_capacity(terms.len());
    for term in terms {
        let lower_term = term.to_lowercase();
        if lower_term.is_empty() {
            continue;
        }

        let count = lower_content.matches(&lower_term).count();
        if count == 0 {
            continue;
        }

        let matched: Vec<String> = sentences
            .iter()
            .filter(|sentence| sentence.lower.contains(&lower_term))
            .map(|sentence| sentence.original.clone())
            .collect();

        results.push(TermMatch {
            term: term.clone(),
            url: url.to_string(),
            domain: domain.to_string(),
            count,
            sentences: matched,
        });
    }

    results
}

fn split_into_sentences(text: &str) -> Vec<Sentence> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut sentences = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        if byte == b'.' || byte == b'!' || byte == b'?' {
            // Include the delimiter and any following whitespace.
            let mut end = i + 1;
            while end < bytes.len() && bytes[end].is_ascii_whitespace() {
                end += 1;
            }
            push_sentence(&mut sentences, &text[start..end]);
            start = end;
        }
    }

    if start < text.len() {
        push_sentence(&mut sentences, &text[start..]);
    }

    sentences
}

fn push_sentence(sentences: &mut Vec<Sentence>, raw: &str) {
    let original = raw.trim().to_string();
    let lower = original.to_lowercase();
    sentences.push(Sentence { original, lower });
}
