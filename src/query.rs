//! Query engine: anchor lookup, ranked keyword search and prefix listing.
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::corpus::{Corpus, CorpusDocument, Section};
use crate::error::RetrievalError;
use crate::index::tokenizer::tokenize;
use crate::index::{Index, SectionId, SectionRef};

pub const DEFAULT_EXCERPT_CHARS: usize = 400;

/// Appended to excerpts that were cut short.
pub const CONTINUES_MARKER: &str = "…[continues]";

/// A section together with the document that owns it.
#[derive(Debug, Clone, Copy)]
pub struct SectionView<'a> {
    pub document: &'a CorpusDocument,
    pub section: &'a Section,
}

impl<'a> SectionView<'a> {
    #[must_use]
    pub fn path(&self) -> &'a str {
        &self.document.path
    }

    #[must_use]
    pub fn slug(&self) -> &'a str {
        &self.section.slug
    }

    #[must_use]
    pub fn heading(&self) -> &'a str {
        &self.section.heading
    }

    #[must_use]
    pub fn depth(&self) -> u8 {
        self.section.depth
    }

    /// Verbatim markdown, heading line included.
    #[must_use]
    pub fn content(&self) -> &'a str {
        self.document.display(self.section)
    }

    #[must_use]
    pub fn body(&self) -> &'a str {
        self.document.body(self.section)
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSection {
    pub path: String,
    pub slug: String,
    pub heading: String,
    pub depth: u8,
    pub excerpt: String,
    pub truncated: bool,
    pub score: f64,
}

pub struct QueryEngine<'a> {
    corpus: &'a Corpus,
    index: &'a Index,
    excerpt_chars: usize,
}

impl<'a> QueryEngine<'a> {
    #[must_use]
    pub fn new(corpus: &'a Corpus, index: &'a Index) -> Self {
        Self {
            corpus,
            index,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }

    #[must_use]
    pub fn with_excerpt_chars(mut self, excerpt_chars: usize) -> Self {
        self.excerpt_chars = excerpt_chars;
        self
    }

    /// Exact lookup of a section by document path and anchor slug.
    pub fn get_by_anchor(&self, path: &str, slug: &str) -> Result<SectionView<'a>, RetrievalError> {
        match self.index.anchor(path, slug) {
            Some(id) => Ok(self.view(id)),
            None if self.index.has_document(path) => Err(RetrievalError::NotFound(format!(
                "no section '{slug}' in {path}"
            ))),
            None => Err(RetrievalError::NotFound(format!("no document at {path}"))),
        }
    }

    /// TF-IDF keyword search.
    ///
    /// Each section scores `Σ tf × ln(N / df)` over the distinct query
    /// tokens. Equal scores go to the section with more query-token
    /// occurrences, then the shallower heading, then the lower document
    /// path, then the shorter section. A token found in every section has
    /// an idf of zero, so the occurrence count alone orders those hits. A
    /// query without searchable tokens returns nothing.
    #[must_use]
    pub fn search(&self, query: &str, limit: usize) -> Vec<ScoredSection> {
        if limit == 0 {
            return Vec::new();
        }

        let terms: BTreeSet<String> = tokenize(query).into_iter().collect();
        if terms.is_empty() {
            debug!("Query {query:?} has no searchable tokens");
            return Vec::new();
        }

        let total = self.index.section_count() as f64;
        // Per section: (tf-idf score, raw occurrences of query tokens).
        let mut scores: BTreeMap<SectionId, (f64, u32)> = BTreeMap::new();
        for term in &terms {
            let postings = self.index.postings(term);
            if postings.is_empty() {
                continue;
            }
            let idf = (total / postings.len() as f64).ln();
            for posting in postings {
                let entry = scores.entry(posting.section).or_default();
                entry.0 += f64::from(posting.tf) * idf;
                entry.1 += posting.tf;
            }
        }

        let mut ranked: Vec<(SectionId, (f64, u32))> = scores.into_iter().collect();
        ranked.sort_by(|(a, (score_a, tf_a)), (b, (score_b, tf_b))| {
            let (ra, rb) = (self.index.section(*a), self.index.section(*b));
            score_b
                .total_cmp(score_a)
                .then_with(|| tf_b.cmp(tf_a))
                .then_with(|| ra.depth.cmp(&rb.depth))
                .then_with(|| self.path_of(ra).cmp(self.path_of(rb)))
                .then_with(|| ra.length.cmp(&rb.length))
                .then_with(|| a.cmp(b))
        });
        ranked.truncate(limit);

        debug!(
            "Query {query:?}: {} terms, {} hits returned",
            terms.len(),
            ranked.len()
        );

        ranked
            .into_iter()
            .map(|(id, (score, _))| self.scored(id, score))
            .collect()
    }

    /// Every section of every document at or below `prefix`, in corpus order.
    pub fn sections_under(&self, prefix: &str) -> Result<Vec<SectionView<'a>>, RetrievalError> {
        let documents = self.index.documents_under(prefix);
        if documents.is_empty() {
            return Err(RetrievalError::NotFound(format!(
                "no documents under '{prefix}'"
            )));
        }

        Ok(documents
            .into_iter()
            .map(|d| &self.corpus.documents[d as usize])
            .flat_map(|document| {
                document
                    .sections
                    .iter()
                    .map(move |section| SectionView { document, section })
            })
            .collect())
    }

    fn view(&self, id: SectionId) -> SectionView<'a> {
        let sref = self.index.section(id);
        let document = &self.corpus.documents[sref.document as usize];
        SectionView {
            document,
            section: &document.sections[sref.section as usize],
        }
    }

    fn path_of(&self, sref: &SectionRef) -> &'a str {
        &self.corpus.documents[sref.document as usize].path
    }

    fn scored(&self, id: SectionId, score: f64) -> ScoredSection {
        let view = self.view(id);
        let (excerpt, truncated) = excerpt(view.body(), self.excerpt_chars);
        ScoredSection {
            path: view.path().to_string(),
            slug: view.slug().to_string(),
            heading: view.heading().to_string(),
            depth: view.depth(),
            excerpt,
            truncated,
            score,
        }
    }
}

/// Trims `text` to at most `max_chars` characters, preferring a word
/// boundary, and appends [`CONTINUES_MARKER`] when anything was cut.
#[must_use]
pub fn excerpt(text: &str, max_chars: usize) -> (String, bool) {
    let text = text.trim();
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return (text.to_string(), false);
    };

    let head = &text[..cut];
    let head = match head.rfind(char::is_whitespace) {
        Some(ws) if ws >= cut / 2 => &head[..ws],
        _ => head,
    };
    (format!("{} {CONTINUES_MARKER}", head.trim_end()), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serving::ServingState;

    fn state() -> ServingState {
        let corpus = Corpus::from_pages(
            "stable",
            &[
                (
                    "components.md",
                    "# Components\n\nReuse shapes across glyphs.\n\n\
                     #### Building Composites\n\nChoose Glyph > Create Composite.\n",
                ),
                (
                    "kerning.md",
                    "# Kerning\n\nkerning kerning metrics\n\n## Groups\n\nkerning spacing metrics\n",
                ),
                ("spacing.md", "# Spacing\n\nSidebearings and metrics.\n"),
                ("notes.md", "No headings here, only kerning."),
            ],
        );
        ServingState::build(corpus, None)
    }

    #[test]
    fn test_get_by_anchor() {
        let state = state();
        let view = state
            .query()
            .get_by_anchor("components.md", "building-composites")
            .unwrap();
        assert_eq!(view.heading(), "Building Composites");
        assert_eq!(view.depth(), 4);
        assert!(view.content().starts_with("#### Building Composites"));
        assert!(view.content().contains("Create Composite"));
    }

    #[test]
    fn test_get_by_anchor_is_exact() {
        let state = state();
        let engine = state.query();
        assert!(matches!(
            engine.get_by_anchor("components.md", "building"),
            Err(RetrievalError::NotFound(_))
        ));
        assert!(matches!(
            engine.get_by_anchor("components.md", "Building-Composites"),
            Err(RetrievalError::NotFound(_))
        ));
        let err = engine.get_by_anchor("missing.md", "x").unwrap_err();
        assert_eq!(err.to_string(), "no document at missing.md");
    }

    #[test]
    fn test_synthetic_section_lookup() {
        let state = state();
        let view = state.query().get_by_anchor("notes.md", "").unwrap();
        assert_eq!(view.heading(), "notes");
        assert_eq!(view.depth(), 0);
    }

    #[test]
    fn test_search_ranks_by_term_frequency() {
        let state = state();
        let results = state.query().search("kerning", 10);
        assert_eq!(results[0].path, "kerning.md");
        assert_eq!(results[0].slug, "kerning");
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_more_occurrences_rank_higher() {
        // Both sections are four tokens long; only some sections hold the term.
        let corpus = Corpus::from_pages(
            "stable",
            &[
                ("a.md", "# Beta\n\nkerning pairs groups"),
                ("b.md", "# Alpha\n\nkerning kerning kerning"),
                ("c.md", "# Gamma\n\nspacing metrics sidebearings"),
            ],
        );
        let state = ServingState::build(corpus, None);
        let paths: Vec<String> = state
            .query()
            .search("kerning", 10)
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(paths, vec!["b.md", "a.md"]);
    }

    #[test]
    fn test_more_occurrences_rank_higher_when_term_is_everywhere() {
        let corpus = Corpus::from_pages(
            "stable",
            &[
                ("a.md", "# Beta\n\nkerning pairs groups"),
                ("b.md", "# Alpha\n\nkerning kerning kerning"),
            ],
        );
        let state = ServingState::build(corpus, None);
        let results = state.query().search("kerning", 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "b.md");
        assert_eq!(results[1].path, "a.md");
        assert_eq!(results[0].score, results[1].score);
    }

    #[test]
    fn test_search_tie_breaks_on_depth_then_path() {
        let corpus = Corpus::from_pages(
            "stable",
            &[
                ("b.md", "# Anchor point\n"),
                ("a.md", "## Anchor point\n"),
                ("c.md", "# Anchor point\n"),
                ("d.md", "# Other\n"),
            ],
        );
        let state = ServingState::build(corpus, None);
        let paths: Vec<String> = state
            .query()
            .search("anchor", 10)
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(paths, vec!["b.md", "c.md", "a.md"]);
    }

    #[test]
    fn test_search_guards() {
        let state = state();
        let engine = state.query();
        assert!(engine.search("", 10).is_empty());
        assert!(engine.search("the of and", 10).is_empty());
        assert!(engine.search("zzzunknown", 10).is_empty());
        assert!(engine.search("kerning", 0).is_empty());
        assert_eq!(engine.search("kerning metrics", 2).len(), 2);
    }

    #[test]
    fn test_sections_under() {
        let state = state();
        let engine = state.query();
        let slugs: Vec<&str> = engine
            .sections_under("kerning.md")
            .unwrap()
            .iter()
            .map(|v| v.slug())
            .collect();
        assert_eq!(slugs, vec!["kerning", "groups"]);
        assert_eq!(engine.sections_under("").unwrap().len(), 6);
        assert!(engine.sections_under("nope").is_err());
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("  short text ", 50), ("short text".to_string(), false));

        let (text, truncated) = excerpt("alpha beta gamma delta", 13);
        assert!(truncated);
        assert_eq!(text, format!("alpha beta {CONTINUES_MARKER}"));

        let (text, truncated) = excerpt("ääääääääää", 4);
        assert!(truncated);
        assert_eq!(text, format!("ääää {CONTINUES_MARKER}"));
    }
}
