//! Section indexer: inverted index, anchor map and path trie over a corpus.
//!
//! The build is a pure function of the corpus. Sections are numbered in
//! corpus order and every posting list is ordered by that number, so the
//! serialised index is byte-identical for identical input.
pub mod tokenizer;
pub mod trie;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::corpus::Corpus;
use tokenizer::tokenize;
use trie::PathTrie;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SectionId(pub u32);

/// Where a section lives in the corpus, plus what ranking needs about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionRef {
    pub document: u32,
    pub section: u32,
    pub depth: u8,
    /// Number of indexed tokens.
    pub length: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Posting {
    pub section: SectionId,
    pub tf: u32,
    pub length: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Index {
    sections: Vec<SectionRef>,
    postings: BTreeMap<String, Vec<Posting>>,
    paths: PathTrie,
    // Derived from `sections`; left out of the serialised form.
    #[serde(skip)]
    anchors: HashMap<String, HashMap<String, SectionId>>,
}

impl Index {
    #[must_use]
    pub fn build(corpus: &Corpus) -> Self {
        let mut index = Self::default();

        for (d, document) in corpus.documents.iter().enumerate() {
            let document_id = d as u32;
            index.paths.insert(&document.path, document_id);
            let anchors = index.anchors.entry(document.path.clone()).or_default();

            for (s, section) in document.sections.iter().enumerate() {
                let id = SectionId(index.sections.len() as u32);
                let tokens = tokenize(&section.plain);
                let length = tokens.len() as u32;

                let mut counts: BTreeMap<String, u32> = BTreeMap::new();
                for token in tokens {
                    *counts.entry(token).or_default() += 1;
                }
                for (token, tf) in counts {
                    index.postings.entry(token).or_default().push(Posting {
                        section: id,
                        tf,
                        length,
                    });
                }

                anchors.insert(section.slug.clone(), id);
                index.sections.push(SectionRef {
                    document: document_id,
                    section: s as u32,
                    depth: section.depth,
                    length,
                });
            }
        }

        index
    }

    #[must_use]
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    #[must_use]
    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }

    #[must_use]
    pub fn section(&self, id: SectionId) -> &SectionRef {
        &self.sections[id.0 as usize]
    }

    /// Posting list of a token; empty if the token is not in the vocabulary.
    #[must_use]
    pub fn postings(&self, token: &str) -> &[Posting] {
        self.postings
            .get(token)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Exact `(path, slug)` lookup.
    #[must_use]
    pub fn anchor(&self, path: &str, slug: &str) -> Option<SectionId> {
        self.anchors.get(path)?.get(slug).copied()
    }

    #[must_use]
    pub fn has_document(&self, path: &str) -> bool {
        self.anchors.contains_key(path)
    }

    /// Document indices at or below a path prefix.
    #[must_use]
    pub fn documents_under(&self, prefix: &str) -> Vec<u32> {
        self.paths.under(prefix)
    }

    /// Canonical serialised form, used to compare builds.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Corpus {
        Corpus::from_pages(
            "stable",
            &[
                (
                    "kerning.md",
                    "# Kerning\n\nKerning kerning-group pairs.\n\n## Kerning Groups\n\nGroups share kerning.\n",
                ),
                ("spacing.md", "# Spacing\n\nSidebearings and metrics.\n"),
            ],
        )
    }

    #[test]
    fn test_postings_and_frequencies() {
        let index = Index::build(&corpus());
        assert_eq!(index.section_count(), 3);

        let kerning = index.postings("kerning");
        assert_eq!(kerning.len(), 2);
        // "Kerning" heading + "Kerning" + part of "kerning-group"
        assert_eq!(kerning[0].section, SectionId(0));
        assert_eq!(kerning[0].tf, 3);
        assert_eq!(kerning[1].section, SectionId(1));

        assert_eq!(index.postings("kerning-group").len(), 1);
        assert!(index.postings("the").is_empty());
        assert!(index.postings("missing").is_empty());
    }

    #[test]
    fn test_anchor_map() {
        let index = Index::build(&corpus());
        let id = index.anchor("kerning.md", "kerning-groups").unwrap();
        let sref = index.section(id);
        assert_eq!(sref.document, 0);
        assert_eq!(sref.section, 1);
        assert_eq!(sref.depth, 2);

        assert!(index.anchor("kerning.md", "spacing").is_none());
        assert!(index.anchor("other.md", "kerning").is_none());
        assert!(index.has_document("spacing.md"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = Index::build(&corpus()).to_bytes().unwrap();
        let b = Index::build(&corpus()).to_bytes().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_documents_under() {
        let index = Index::build(&corpus());
        assert_eq!(index.documents_under("spacing.md"), vec![1]);
        assert_eq!(index.documents_under(""), vec![0, 1]);
    }
}
