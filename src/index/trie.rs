//! Path-segment trie for "everything under this path" lookups.
use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Default, Clone, Serialize)]
pub struct PathTrie {
    root: TrieNode,
}

#[derive(Debug, Default, Clone, Serialize)]
struct TrieNode {
    children: BTreeMap<String, TrieNode>,
    documents: Vec<u32>,
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl PathTrie {
    pub fn insert(&mut self, path: &str, document: u32) {
        let mut node = &mut self.root;
        for segment in segments(path) {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.documents.push(document);
    }

    /// Documents at or below `prefix`, sorted by document index.
    ///
    /// Matching is per whole segment: `guide` does not match `guides/x.md`.
    /// An empty prefix returns every document.
    #[must_use]
    pub fn under(&self, prefix: &str) -> Vec<u32> {
        let mut node = &self.root;
        for segment in segments(prefix) {
            match node.children.get(segment) {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }

        let mut found = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            found.extend_from_slice(&n.documents);
            stack.extend(n.children.values());
        }
        found.sort_unstable();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PathTrie {
        let mut trie = PathTrie::default();
        trie.insert("components.md", 0);
        trie.insert("components.md/2", 1);
        trie.insert("guides/kerning.md", 2);
        trie.insert("guides/spacing.md", 3);
        trie.insert("guides-extra.md", 4);
        trie
    }

    #[test]
    fn test_file_prefix_includes_split_parts() {
        assert_eq!(sample().under("components.md"), vec![0, 1]);
    }

    #[test]
    fn test_directory_prefix() {
        let trie = sample();
        assert_eq!(trie.under("guides"), vec![2, 3]);
        assert_eq!(trie.under("guides/"), vec![2, 3]);
        assert_eq!(trie.under("guides/kerning.md"), vec![2]);
    }

    #[test]
    fn test_partial_segment_does_not_match() {
        assert!(sample().under("guide").is_empty());
        assert!(sample().under("missing/x.md").is_empty());
    }

    #[test]
    fn test_empty_prefix_returns_all() {
        assert_eq!(sample().under(""), vec![0, 1, 2, 3, 4]);
    }
}
