//! In-memory retrieval index over the repository and its PR history.
//!
//! Documents are embedded once per run and ranked by cosine similarity.

use std::fmt;
use std::path::Path;

use ignore::WalkBuilder;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::{Embedder, LlmError};
use crate::pr::PastPull;

/// Lines per repository chunk.
const CHUNK_LINES: usize = 60;
/// Upper bound on a chunk's text, well under embedding input limits.
const CHUNK_BYTES: usize = 4_000;
/// Texts per embedding request.
const EMBED_BATCH: usize = 64;
/// Text bytes per embedding request.
const EMBED_BATCH_BYTES: usize = 128_000;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Failed to walk repository: {0}")]
    Walk(#[from] ignore::Error),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] LlmError),
}

/// Where a document came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File { path: String, start_line: usize },
    PullRequest { number: u64 },
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File { path, start_line } => write!(f, "{path}:{start_line}"),
            Source::PullRequest { number } => write!(f, "PR #{number}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub source: Source,
    pub text: String,
}

/// Chunk every text file under `root`, respecting .gitignore.
///
/// Binary files (NUL in the content) and files above `max_file_bytes` are skipped.
pub fn repository_documents(root: &Path, max_file_bytes: u64) -> Result<Vec<Document>, IndexError> {
    let mut docs = Vec::new();

    for entry in WalkBuilder::new(root).standard_filters(true).build() {
        let entry = entry?;
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let too_big = entry
            .metadata()
            .map(|m| m.len() > max_file_bytes)
            .unwrap_or(true);
        if too_big {
            continue;
        }

        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        if content.contains('\0') {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        docs.extend(chunk_file(&rel, &content));
    }

    debug!(documents = docs.len(), root = %root.display(), "collected repository documents");
    Ok(docs)
}

/// Split a file into windows of at most `CHUNK_LINES` lines and `CHUNK_BYTES`
/// bytes. Lines longer than `CHUNK_BYTES` (minified code) are cut into pieces.
fn chunk_file(path: &str, content: &str) -> Vec<Document> {
    let mut docs = Vec::new();
    let mut text = String::new();
    let mut start_line = 1;
    let mut pieces = 0;

    for (idx, line) in content.lines().enumerate() {
        for piece in split_long_line(line, CHUNK_BYTES) {
            let full = pieces == CHUNK_LINES || text.len() + piece.len() + 1 > CHUNK_BYTES;
            if pieces > 0 && full {
                push_chunk(&mut docs, path, start_line, &mut text);
                pieces = 0;
            }
            if pieces == 0 {
                start_line = idx + 1;
            } else {
                text.push('\n');
            }
            text.push_str(piece);
            pieces += 1;
        }
    }
    if pieces > 0 {
        push_chunk(&mut docs, path, start_line, &mut text);
    }
    docs
}

fn push_chunk(docs: &mut Vec<Document>, path: &str, start_line: usize, text: &mut String) {
    let text = std::mem::take(text);
    if text.trim().is_empty() {
        return;
    }
    docs.push(Document {
        source: Source::File {
            path: path.to_string(),
            start_line,
        },
        text,
    });
}

/// `line` cut at char boundaries into pieces of at most `max` bytes.
fn split_long_line(line: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = line;
    while rest.len() > max {
        let mut cut = max;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let (head, tail) = rest.split_at(cut);
        pieces.push(head);
        rest = tail;
    }
    if pieces.is_empty() || !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

/// One document per past pull request (title plus description).
pub fn history_documents(pulls: &[PastPull]) -> Vec<Document> {
    pulls
        .iter()
        .map(|p| Document {
            source: Source::PullRequest { number: p.number },
            text: format!("{}\n\n{}", p.title, p.body).trim().to_string(),
        })
        .collect()
}

/// Documents with their embeddings.
#[derive(Debug, Default)]
pub struct ContextIndex {
    entries: Vec<(Document, Vec<f32>)>,
}

impl ContextIndex {
    pub async fn build(docs: Vec<Document>, embedder: &dyn Embedder) -> Result<Self, IndexError> {
        let mut entries = Vec::with_capacity(docs.len());
        let mut docs = docs.into_iter().peekable();

        while docs.peek().is_some() {
            let mut batch: Vec<Document> = Vec::new();
            let mut bytes = 0;
            while let Some(doc) = docs.next_if(|d| {
                batch.is_empty()
                    || (batch.len() < EMBED_BATCH && bytes + d.text.len() <= EMBED_BATCH_BYTES)
            }) {
                bytes += doc.text.len();
                batch.push(doc);
            }
            debug!(documents = batch.len(), bytes, "embedding batch");
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            let vectors = embedder.embed(&texts).await?;
            entries.extend(batch.into_iter().zip(vectors));
        }

        info!(documents = entries.len(), "context index built");
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Up to `top_k` documents closest to `query`, best first.
    pub fn nearest(&self, query: &[f32], top_k: usize) -> Vec<&Document> {
        let mut scored: Vec<(f32, &Document)> = self
            .entries
            .iter()
            .map(|(doc, v)| (cosine(query, v), doc))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().take(top_k).map(|(_, doc)| doc).collect()
    }
}

/// Index plus the embedder used to build it.
pub struct Retriever<'a> {
    index: &'a ContextIndex,
    embedder: &'a dyn Embedder,
    top_k: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a ContextIndex, embedder: &'a dyn Embedder, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k,
        }
    }

    /// Documents related to `text`; an embedding failure yields no context.
    pub async fn retrieve(&self, text: &str) -> Vec<&'a Document> {
        if self.index.is_empty() || self.top_k == 0 {
            return Vec::new();
        }
        match self.embedder.embed(&[text.to_string()]).await {
            Ok(mut vectors) => match vectors.pop() {
                Some(query) => self.index.nearest(&query, self.top_k),
                None => Vec::new(),
            },
            Err(e) => {
                warn!(error = %e, "context lookup failed, reviewing without context");
                Vec::new()
            }
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Embeds text as letter-frequency counts over a..z.
    pub struct LetterEmbedder;

    #[async_trait]
    impl Embedder for LetterEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; 26];
                    for c in t.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
                        v[(c - b'a') as usize] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    pub struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
            Err(LlmError::EmptyChoices)
        }
    }

    fn doc(text: &str) -> Document {
        Document {
            source: Source::File {
                path: format!("{text}.txt"),
                start_line: 1,
            },
            text: text.to_string(),
        }
    }

    #[test]
    fn test_cosine() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_chunk_file_line_windows() {
        let content = (1..=130).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = chunk_file("src/a.rs", &content);
        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks[1].source,
            Source::File {
                path: "src/a.rs".to_string(),
                start_line: 61
            }
        );
        assert!(chunks[2].text.starts_with("line 121"));
    }

    #[test]
    fn test_chunk_file_caps_bytes() {
        // One minified line well past the byte cap, then a short line.
        let content = format!("{}\nfn tail() {{}}", "x".repeat(CHUNK_BYTES * 2 + 10));
        let chunks = chunk_file("app.min.js", &content);
        assert!(chunks.iter().all(|c| c.text.len() <= CHUNK_BYTES));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.len(), CHUNK_BYTES);
        assert!(chunks[2].text.ends_with("fn tail() {}"));
        assert_eq!(
            chunks[2].source,
            Source::File {
                path: "app.min.js".to_string(),
                start_line: 1
            }
        );
    }

    #[test]
    fn test_split_long_line_respects_char_boundaries() {
        let line = "é".repeat(5);
        let pieces = split_long_line(&line, 3);
        assert!(pieces.iter().all(|p| p.len() <= 3));
        assert_eq!(pieces.concat(), line);
        assert_eq!(split_long_line("", 3), vec![""]);
    }

    #[test]
    fn test_history_documents() {
        let docs = history_documents(&[PastPull {
            number: 7,
            title: "Fix login".to_string(),
            body: String::new(),
        }]);
        assert_eq!(docs[0].text, "Fix login");
        assert_eq!(docs[0].source.to_string(), "PR #7");
    }

    #[test]
    fn test_repository_documents_skips_binary() {
        let root = std::env::temp_dir().join("pr_reviewer_index_test");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("code.rs"), "fn main() {}\n").unwrap();
        std::fs::write(root.join("blob.bin"), b"ab\0cd").unwrap();

        let docs = repository_documents(&root, 10_000).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source.to_string(), "code.rs:1");

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_build_and_retrieve() {
        let docs = vec![doc("aaaa"), doc("zzzz"), doc("aazz")];
        let index = ContextIndex::build(docs, &LetterEmbedder).await.unwrap();
        assert_eq!(index.nearest(&[1.0; 26], 10).len(), 3);

        let retriever = Retriever::new(&index, &LetterEmbedder, 2);
        let hits = retriever.retrieve("zz").await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "zzzz");
        assert_eq!(hits[1].text, "aazz");
    }

    /// Records the size of every embedding request.
    struct BatchRecorder(std::sync::Mutex<Vec<usize>>);

    #[async_trait]
    impl Embedder for BatchRecorder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
            self.0.lock().unwrap().push(texts.len());
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_build_splits_batches_by_bytes() {
        let big = "a".repeat(EMBED_BATCH_BYTES / 2);
        let docs = vec![doc(&big), doc(&big), doc(&big), doc("b")];
        let recorder = BatchRecorder(std::sync::Mutex::new(Vec::new()));
        let index = ContextIndex::build(docs, &recorder).await.unwrap();
        assert_eq!(index.nearest(&[1.0], 10).len(), 4);
        assert_eq!(*recorder.0.lock().unwrap(), vec![2, 2]);
    }

    #[tokio::test]
    async fn test_retrieve_survives_embedding_failure() {
        let index = ContextIndex::build(vec![doc("abc")], &LetterEmbedder).await.unwrap();
        let retriever = Retriever::new(&index, &FailingEmbedder, 3);
        assert!(retriever.retrieve("abc").await.is_empty());
    }
}
