pub mod lang;

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::{CompletionModel, LlmError};
use crate::pr::position::parse_hunks;
use crate::pr::FilePatch;
use lang::Language;

const TESTGEN_SYSTEM: &str = "You write unit tests. Given one source file, reply with a single \
test file that exercises its public functions, including edge cases. \
Reply with code only, no explanations.";

#[derive(Debug, Error)]
pub enum TestGenError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Test generation failed for {path}: {source}")]
    Completion {
        path: String,
        #[source]
        source: LlmError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenStatus {
    Written,
    Skipped(String),
}

#[derive(Debug, Clone)]
pub struct GeneratedTest {
    pub source: String,
    pub output: PathBuf,
    pub status: GenStatus,
}

/// Changed files worth generating tests for: known source languages that
/// still exist and are not tests already.
pub fn select_candidates(files: &[FilePatch]) -> Vec<(&FilePatch, &'static Language)> {
    files
        .iter()
        .filter(|f| !f.is_deleted)
        .filter(|f| !lang::is_test_file(Path::new(&f.path)))
        .filter_map(|f| lang::language_for(Path::new(&f.path)).map(|l| (f, l)))
        .collect()
}

pub struct TestGenerator<'a> {
    model: &'a dyn CompletionModel,
    repo_root: &'a Path,
    output_dir: &'a Path,
    framework_hints: &'a HashMap<String, String>,
}

impl<'a> TestGenerator<'a> {
    pub fn new(
        model: &'a dyn CompletionModel,
        repo_root: &'a Path,
        output_dir: &'a Path,
        framework_hints: &'a HashMap<String, String>,
    ) -> Self {
        Self {
            model,
            repo_root,
            output_dir,
            framework_hints,
        }
    }

    /// Generate one test skeleton per candidate file, sequentially.
    pub async fn generate(&self, files: &[FilePatch]) -> Result<Vec<GeneratedTest>, TestGenError> {
        let candidates = select_candidates(files);
        info!(candidates = candidates.len(), changed = files.len(), "selected files for test generation");

        let mut out = Vec::with_capacity(candidates.len());
        for (file, language) in candidates {
            out.push(self.generate_one(file, language).await?);
        }
        Ok(out)
    }

    async fn generate_one(
        &self,
        file: &FilePatch,
        language: &Language,
    ) -> Result<GeneratedTest, TestGenError> {
        let rel = Path::new(&file.path);
        let output = self.output_path(rel, language);
        let skipped = |reason: &str| GeneratedTest {
            source: file.path.clone(),
            output: output.clone(),
            status: GenStatus::Skipped(reason.to_string()),
        };

        if output.exists() {
            debug!(output = %output.display(), "test file already exists");
            return Ok(skipped("test file already exists"));
        }

        let source_path = self.repo_root.join(rel);
        let source = match std::fs::read_to_string(&source_path) {
            Ok(source) => source,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %file.path, "changed file missing from checkout");
                return Ok(skipped("source not found in checkout"));
            }
            Err(source) => {
                return Err(TestGenError::Read {
                    path: source_path,
                    source,
                })
            }
        };

        let framework = self
            .framework_hints
            .get(language.name)
            .map(String::as_str)
            .unwrap_or(language.framework);
        let mut prompt = format!(
            "Language: {}\nTest framework: {}\nFile: {}\n",
            language.name, framework, file.path
        );
        if let Some(ranges) = file.patch.as_deref().and_then(added_ranges) {
            prompt.push_str(&format!("Lines changed in this pull request: {ranges}\n"));
        }
        prompt.push_str(&format!("\n```\n{source}\n```"));

        let reply = self
            .model
            .complete(TESTGEN_SYSTEM, &prompt)
            .await
            .map_err(|source| TestGenError::Completion {
                path: file.path.clone(),
                source,
            })?;
        let code = strip_code_fence(&reply);
        if code.trim().is_empty() {
            return Ok(skipped("model returned no code"));
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(|source| TestGenError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&output, format!("{}\n", code.trim_end())).map_err(|source| {
            TestGenError::Write {
                path: output.clone(),
                source,
            }
        })?;
        info!(source = %file.path, output = %output.display(), "wrote test skeleton");

        Ok(GeneratedTest {
            source: file.path.clone(),
            output,
            status: GenStatus::Written,
        })
    }

    /// `<output_dir>/<source dir>/<test file name>`
    fn output_path(&self, rel: &Path, language: &Language) -> PathBuf {
        let stem = rel.file_stem().and_then(|s| s.to_str()).unwrap_or("source");
        let ext = rel.extension().and_then(|s| s.to_str()).unwrap_or_default();
        let dir = match rel.parent() {
            Some(parent) => self.output_dir.join(parent),
            None => self.output_dir.to_path_buf(),
        };
        dir.join(language.test_file_name(stem, ext))
    }
}

/// Runs of added new-file lines, e.g. `3-5, 40`. None for unusable patches.
fn added_ranges(patch: &str) -> Option<String> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    // parse_hunks rejects numbering past usize::MAX, so saturating never skews a run.
    for hunk in parse_hunks(patch).ok()? {
        if hunk.new_count == 0 {
            continue;
        }
        let mut new_line = hunk.new_start;
        for line in &hunk.lines {
            match line.as_bytes().first() {
                Some(b'+') => {
                    match runs.last_mut() {
                        Some((_, end)) if end.checked_add(1) == Some(new_line) => *end = new_line,
                        _ => runs.push((new_line, new_line)),
                    }
                    new_line = new_line.saturating_add(1);
                }
                Some(b'-') | Some(b'\\') => {}
                _ => new_line = new_line.saturating_add(1),
            }
        }
    }
    if runs.is_empty() {
        return None;
    }
    let ranges: Vec<String> = runs
        .into_iter()
        .map(|(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}-{end}")
            }
        })
        .collect();
    Some(ranges.join(", "))
}

/// Body of the first fenced code block, or the whole reply if there is none.
fn strip_code_fence(reply: &str) -> &str {
    let Some(start) = reply.find("```") else {
        return reply.trim();
    };
    let after = &reply[start + 3..];
    // Skip the info string (e.g. ```python).
    let body = match after.find('\n') {
        Some(nl) => &after[nl + 1..],
        None => return "",
    };
    match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    }
}
