//! Concept extraction: recognizable entities in canonical text.
//!
//! Independent pattern matchers scan the text once each; deterministic
//! matches (email, phone, document reference) carry confidence 1.0, the
//! name and phrase heuristics less. Identical (kind, value) pairs are
//! deduplicated within one document. The derived key→location map is what
//! downstream retrieval consults to find where a matched concept lives.

use std::collections::BTreeSet;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::models::{ConceptEntry, ConceptKind, ConceptMap};

/// Confidence assigned to the capitalized-name heuristic.
const NAME_CONFIDENCE: f64 = 0.6;
/// Confidence assigned to the quoted-phrase heuristic.
const PHRASE_CONFIDENCE: f64 = 0.5;

/// Compiled matchers. Construct once and reuse across documents.
pub struct ConceptExtractor {
    email: Regex,
    phone: Regex,
    document_ref: Regex,
    name: Regex,
    phrase: Regex,
}

impl Default for ConceptExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConceptExtractor {
    pub fn new() -> Self {
        Self {
            email: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap(),
            // International or US-style numbers with at least 7 digits.
            phone: Regex::new(r"\+?\d[\d\s().-]{5,}\d").unwrap(),
            // JIRA-style keys (ABC-123) and bare issue references (#123).
            document_ref: Regex::new(r"\b[A-Z]{2,10}-\d{1,6}\b|#\d{1,6}\b").unwrap(),
            // Two or more consecutive capitalized words.
            name: Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+\b").unwrap(),
            phrase: Regex::new(r#""([^"]{3,80})""#).unwrap(),
        }
    }

    /// Scan canonical text for concepts. A single text may yield zero or
    /// many entries per kind; duplicates are collapsed.
    pub fn extract_concepts(&self, text: &str) -> Vec<ConceptEntry> {
        let mut entries = Vec::new();
        let mut seen: BTreeSet<(ConceptKind, String)> = BTreeSet::new();

        let mut push = |entries: &mut Vec<ConceptEntry>, kind, value: String, confidence| {
            if seen.insert((kind, value.clone())) {
                entries.push(ConceptEntry {
                    kind,
                    value,
                    confidence,
                });
            }
        };

        for m in self.email.find_iter(text) {
            push(&mut entries, ConceptKind::Email, m.as_str().to_string(), 1.0);
        }

        for m in self.phone.find_iter(text) {
            let digits = m.as_str().chars().filter(|c| c.is_ascii_digit()).count();
            if (7..=15).contains(&digits) {
                push(
                    &mut entries,
                    ConceptKind::Phone,
                    m.as_str().trim().to_string(),
                    1.0,
                );
            }
        }

        for m in self.document_ref.find_iter(text) {
            push(
                &mut entries,
                ConceptKind::DocumentRef,
                m.as_str().to_string(),
                1.0,
            );
        }

        for m in self.name.find_iter(text) {
            push(
                &mut entries,
                ConceptKind::Name,
                m.as_str().to_string(),
                NAME_CONFIDENCE,
            );
        }

        for c in self.phrase.captures_iter(text) {
            push(
                &mut entries,
                ConceptKind::Phrase,
                c[1].trim().to_string(),
                PHRASE_CONFIDENCE,
            );
        }

        entries
    }
}

/// Derive the concept/location map for a document.
///
/// Each concept gets a stable key hashed from kind + value + document
/// identity, pointing at `{document_id}_{kind}` location references.
pub fn build_concept_map(document_id: &str, entries: &[ConceptEntry]) -> ConceptMap {
    let mut map = ConceptMap::new();
    for entry in entries {
        let key = concept_key(document_id, entry.kind, &entry.value);
        let location = format!("{}_{}", document_id, entry.kind.as_str());
        let locations = map.entry(key).or_insert_with(Vec::new);
        if !locations.contains(&location) {
            locations.push(location);
        }
    }
    map
}

/// Stable 16-hex key for one (kind, value) pair within a document.
pub fn concept_key(document_id: &str, kind: ConceptKind, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(value.as_bytes());
    hasher.update(b"|");
    hasher.update(document_id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_extracted_from_example_text() {
        let extractor = ConceptExtractor::new();
        let entries = extractor.extract_concepts("Contact john@example.com for the Q3 report");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, ConceptKind::Email);
        assert_eq!(entries[0].value, "john@example.com");
        assert_eq!(entries[0].confidence, 1.0);
    }

    #[test]
    fn phone_numbers_matched_with_bounds() {
        let extractor = ConceptExtractor::new();
        let entries = extractor.extract_concepts("Call +1 (555) 123-4567 before noon.");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, ConceptKind::Phone);

        // Too few digits: not a phone number.
        let entries = extractor.extract_concepts("room 12-345 6");
        assert!(entries.iter().all(|e| e.kind != ConceptKind::Phone));
    }

    #[test]
    fn document_refs_matched() {
        let extractor = ConceptExtractor::new();
        let entries = extractor.extract_concepts("See PROJ-142 and #77 for details.");
        let refs: Vec<&str> = entries
            .iter()
            .filter(|e| e.kind == ConceptKind::DocumentRef)
            .map(|e| e.value.as_str())
            .collect();
        assert_eq!(refs, vec!["PROJ-142", "#77"]);
    }

    #[test]
    fn names_use_heuristic_confidence() {
        let extractor = ConceptExtractor::new();
        let entries = extractor.extract_concepts("Forwarded to Grace Hopper yesterday.");
        let names: Vec<&ConceptEntry> = entries
            .iter()
            .filter(|e| e.kind == ConceptKind::Name)
            .collect();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].value, "Grace Hopper");
        assert_eq!(names[0].confidence, NAME_CONFIDENCE);
    }

    #[test]
    fn quoted_phrases_extracted() {
        let extractor = ConceptExtractor::new();
        let entries = extractor.extract_concepts(r#"Flagged as "urgent escalation" by support."#);
        let phrases: Vec<&ConceptEntry> = entries
            .iter()
            .filter(|e| e.kind == ConceptKind::Phrase)
            .collect();
        assert_eq!(phrases.len(), 1);
        assert_eq!(phrases[0].value, "urgent escalation");
    }

    #[test]
    fn duplicates_collapsed() {
        let extractor = ConceptExtractor::new();
        let entries =
            extractor.extract_concepts("a@b.co wrote to a@b.co and again a@b.co");
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn concept_map_keys_are_stable_and_scoped() {
        let entries = vec![
            ConceptEntry {
                kind: ConceptKind::Email,
                value: "a@b.co".to_string(),
                confidence: 1.0,
            },
            ConceptEntry {
                kind: ConceptKind::Phone,
                value: "555-123-4567".to_string(),
                confidence: 1.0,
            },
        ];
        let map = build_concept_map("doc-1", &entries);
        assert_eq!(map.len(), 2);
        for (key, locations) in &map {
            assert_eq!(key.len(), 16);
            assert_eq!(locations.len(), 1);
            assert!(locations[0].starts_with("doc-1_"));
        }
        // Same value under a different document derives a different key.
        let other = build_concept_map("doc-2", &entries);
        assert!(map.keys().all(|k| !other.contains_key(k)));
    }
}
