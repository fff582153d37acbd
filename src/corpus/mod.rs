//! Document loader: reads a channel of the handbook cache into memory.
//!
//! Each `*.md` file under `<cache_root>/<channel>` is split on the page
//! delimiter into one or more [`CorpusDocument`]s, and each document is
//! segmented into [`Section`]s at its ATX headings.
pub mod markdown;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{LoadError, LoadWarning};

pub use markdown::Section;

/// Where a corpus is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusSource {
    pub root: PathBuf,
    pub channel: String,
    pub delimiter: String,
}

impl CorpusSource {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: PathBuf::from(&config.cache_root),
            channel: config.channel.clone(),
            delimiter: config.document_delimiter.clone(),
        }
    }

    #[must_use]
    pub fn channel_dir(&self) -> PathBuf {
        self.root.join(&self.channel)
    }
}

/// One logical page of the cache.
///
/// A source file that holds several concatenated pages produces several
/// documents: the first keeps the file's relative path, the following ones
/// are addressed as `<file>/2`, `<file>/3`, ...
#[derive(Debug, Clone)]
pub struct CorpusDocument {
    pub path: String,
    pub source_path: String,
    pub part: usize,
    pub channel: String,
    pub text: String,
    pub modified: Option<DateTime<Utc>>,
    pub content_hash: String,
    pub sections: Vec<Section>,
}

impl CorpusDocument {
    /// Verbatim markdown of a section, heading line included.
    #[must_use]
    pub fn display(&self, section: &Section) -> &str {
        &self.text[section.start..section.end]
    }

    /// Verbatim markdown of a section below its heading line.
    #[must_use]
    pub fn body(&self, section: &Section) -> &str {
        &self.text[section.body_start..section.end]
    }
}

/// All documents of a channel plus the warnings collected while loading.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub channel: String,
    pub documents: Vec<CorpusDocument>,
    pub warnings: Vec<LoadWarning>,
    /// SHA-256 over every readable source file, see [`fingerprint`].
    pub content_hash: String,
    by_path: HashMap<String, usize>,
}

impl Corpus {
    #[must_use]
    pub fn empty(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            content_hash: FingerprintBuilder::default().finish(),
            ..Self::default()
        }
    }

    /// Builds a corpus from in-memory `(path, markdown)` pages, one document
    /// per page and no delimiter splitting.
    #[must_use]
    pub fn from_pages(channel: &str, pages: &[(&str, &str)]) -> Self {
        let mut corpus = Self::empty(channel);
        let mut fingerprint = FingerprintBuilder::default();
        for &(path, text) in pages {
            fingerprint.add(path, text.as_bytes());
            let stem = file_stem(path);
            corpus.push(CorpusDocument {
                path: path.to_string(),
                source_path: path.to_string(),
                part: 1,
                channel: channel.to_string(),
                text: text.to_string(),
                modified: None,
                content_hash: sha256_hex(text.as_bytes()),
                sections: markdown::parse_sections(text, &stem),
            });
        }
        corpus.content_hash = fingerprint.finish();
        corpus
    }

    #[must_use]
    pub fn document(&self, path: &str) -> Option<&CorpusDocument> {
        self.by_path.get(path).map(|&i| &self.documents[i])
    }

    #[must_use]
    pub fn section_count(&self) -> usize {
        self.documents.iter().map(|d| d.sections.len()).sum()
    }

    fn push(&mut self, document: CorpusDocument) {
        self.by_path
            .insert(document.path.clone(), self.documents.len());
        self.documents.push(document);
    }
}

/// Load every markdown file of the source's channel.
pub fn load(source: &CorpusSource) -> Result<Corpus, LoadError> {
    load_cancellable(source, &CancellationToken::new())
}

/// Like [`load`], but gives up with [`LoadError::Cancelled`] between files
/// once `token` is cancelled.
pub fn load_cancellable(
    source: &CorpusSource,
    token: &CancellationToken,
) -> Result<Corpus, LoadError> {
    let dir = source.channel_dir();
    let files = scan_markdown_files(&dir)?;

    let mut corpus = Corpus {
        channel: source.channel.clone(),
        ..Corpus::default()
    };
    let mut fingerprint = FingerprintBuilder::default();

    for (rel, path) in files {
        if token.is_cancelled() {
            return Err(LoadError::Cancelled);
        }

        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                skip_file(&mut corpus, &rel, format!("unreadable: {e}"));
                continue;
            }
        };
        fingerprint.add(&rel, &bytes);

        let text = match String::from_utf8(bytes) {
            Ok(t) => t,
            Err(e) => {
                skip_file(&mut corpus, &rel, format!("not valid UTF-8: {e}"));
                continue;
            }
        };

        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        for document in split_file(&rel, &text, source, modified) {
            debug!(
                "Loaded {} ({} sections)",
                document.path,
                document.sections.len()
            );
            corpus.push(document);
        }
    }

    corpus.content_hash = fingerprint.finish();
    info!(
        "Loaded channel '{}': {} documents, {} sections, {} skipped files",
        corpus.channel,
        corpus.documents.len(),
        corpus.section_count(),
        corpus.warnings.len()
    );

    Ok(corpus)
}

/// Content hash of the channel directory as [`load`] would compute it,
/// without parsing any markdown.
pub fn fingerprint(source: &CorpusSource) -> Result<String, LoadError> {
    let mut builder = FingerprintBuilder::default();
    for (rel, path) in scan_markdown_files(&source.channel_dir())? {
        if let Ok(bytes) = fs::read(&path) {
            builder.add(&rel, &bytes);
        }
    }
    Ok(builder.finish())
}

// ── Internal helpers ─────────────────────────────────────────────────

fn skip_file(corpus: &mut Corpus, rel: &str, reason: String) {
    warn!("Skipping {rel}: {reason}");
    corpus.warnings.push(LoadWarning {
        path: rel.to_string(),
        reason,
    });
}

fn file_stem(rel: &str) -> String {
    Path::new(rel)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn split_file(
    rel: &str,
    text: &str,
    source: &CorpusSource,
    modified: Option<DateTime<Utc>>,
) -> Vec<CorpusDocument> {
    let stem = file_stem(rel);

    markdown::split_pages(text, &source.delimiter)
        .into_iter()
        .enumerate()
        .map(|(i, range)| {
            let part = i + 1;
            let page = text[range].to_string();
            CorpusDocument {
                path: if part == 1 {
                    rel.to_string()
                } else {
                    format!("{rel}/{part}")
                },
                source_path: rel.to_string(),
                part,
                channel: source.channel.clone(),
                content_hash: sha256_hex(page.as_bytes()),
                sections: markdown::parse_sections(&page, &stem),
                text: page,
                modified,
            }
        })
        .collect()
}

/// Markdown files below `dir` as `(relative path, absolute path)`, sorted by
/// relative path. Relative paths always use `/`.
fn scan_markdown_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::ChannelNotFound(dir.to_path_buf()));
    }

    // The cache is usually git-ignored, so the standard filters stay off.
    let walker = WalkBuilder::new(dir).standard_filters(false).build();
    let mut files = Vec::new();

    for entry in walker {
        let entry = entry.map_err(|e| LoadError::Io {
            path: dir.to_path_buf(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
        })?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Ok(rel) = path.strip_prefix(dir) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        files.push((rel, path.to_path_buf()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

#[derive(Default)]
struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    fn add(&mut self, rel: &str, bytes: &[u8]) {
        self.hasher.update(rel.as_bytes());
        self.hasher.update([0u8]);
        self.hasher.update(sha256_hex(bytes).as_bytes());
        self.hasher.update(b"\n");
    }

    fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
