//! The corpus, index and manifest that readers see as one snapshot.
//!
//! A [`ServingState`] is never mutated after it is built; refreshes replace
//! it wholesale, so an index can never point into a different corpus.
use std::collections::BTreeSet;

use serde::Serialize;

use crate::corpus::Corpus;
use crate::index::Index;
use crate::query::QueryEngine;

/// Identity of the loaded cache, used to detect staleness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheManifest {
    pub channel: String,
    /// Upstream version the state was built for, or the content hash when
    /// no upstream version was known.
    pub version: String,
    /// The upstream version, when one was known at build time.
    pub upstream_version: Option<String>,
    pub content_hash: String,
    pub documents: BTreeSet<String>,
}

impl CacheManifest {
    #[must_use]
    pub fn from_corpus(corpus: &Corpus, version: Option<String>) -> Self {
        Self {
            channel: corpus.channel.clone(),
            version: version
                .clone()
                .unwrap_or_else(|| corpus.content_hash.clone()),
            upstream_version: version,
            content_hash: corpus.content_hash.clone(),
            documents: corpus.documents.iter().map(|d| d.path.clone()).collect(),
        }
    }
}

#[derive(Debug)]
pub struct ServingState {
    pub corpus: Corpus,
    pub index: Index,
    pub manifest: CacheManifest,
}

impl ServingState {
    /// Index `corpus` and wrap it with its manifest.
    #[must_use]
    pub fn build(corpus: Corpus, version: Option<String>) -> Self {
        let index = Index::build(&corpus);
        let manifest = CacheManifest::from_corpus(&corpus, version);
        Self {
            corpus,
            index,
            manifest,
        }
    }

    #[must_use]
    pub fn empty(channel: &str) -> Self {
        Self::build(Corpus::empty(channel), None)
    }

    #[must_use]
    pub fn query(&self) -> QueryEngine<'_> {
        QueryEngine::new(&self.corpus, &self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_defaults_to_content_hash() {
        let corpus = Corpus::from_pages("stable", &[("a.md", "# A"), ("b.md", "# B")]);
        let state = ServingState::build(corpus, None);
        assert_eq!(state.manifest.version, state.manifest.content_hash);
        assert_eq!(state.manifest.upstream_version, None);
        assert_eq!(state.manifest.channel, "stable");
        assert_eq!(state.manifest.documents.len(), 2);
    }

    #[test]
    fn test_manifest_uses_upstream_version() {
        let corpus = Corpus::from_pages("stable", &[("a.md", "# A")]);
        let state = ServingState::build(corpus, Some("3.2.1".into()));
        assert_eq!(state.manifest.version, "3.2.1");
        assert_eq!(state.manifest.upstream_version.as_deref(), Some("3.2.1"));
        assert_ne!(state.manifest.content_hash, "3.2.1");
    }

    #[test]
    fn test_empty_state() {
        let state = ServingState::empty("beta");
        assert_eq!(state.index.section_count(), 0);
        assert!(state.query().search("kerning", 5).is_empty());
    }
}
