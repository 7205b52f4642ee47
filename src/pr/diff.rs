use super::position::{LineKind, PatchLines, ResolveError};
use super::types::FilePatch;
use super::PrError;

/// Split a multi-file unified diff (`git diff` output) into per-file patches.
///
/// Each file section starts with:
///   diff --git a/{path} b/{path}
///
/// New files have: `--- /dev/null`
/// Deleted files have: `+++ /dev/null`
///
/// The `patch` of every file keeps only the text from the first `@@` on,
/// which is what GitHub's files listing returns and what diff positions
/// are counted against.
pub fn parse_diff(raw_diff: &str) -> Result<Vec<FilePatch>, PrError> {
    if raw_diff.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut current_file: Option<FilePatch> = None;
    let mut body: Vec<&str> = Vec::new();

    let finish_file =
        |files: &mut Vec<FilePatch>, file: &mut Option<FilePatch>, body: &mut Vec<&str>| {
            if let Some(mut file) = file.take() {
                while body.last().is_some_and(|l| l.is_empty()) {
                    body.pop();
                }
                if !body.is_empty() {
                    let patch = body.join("\n");
                    let (additions, deletions) = count_changes(&file.path, &patch)?;
                    file.additions = additions;
                    file.deletions = deletions;
                    file.patch = Some(patch);
                }
                files.push(file);
            }
            body.clear();
            Ok::<(), PrError>(())
        };

    for line in raw_diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            finish_file(&mut files, &mut current_file, &mut body)?;
            let mut parts = rest.split_whitespace();
            let a_path = parts
                .next()
                .ok_or_else(|| PrError::DiffParse("Missing a/ path in diff header".to_string()))?;
            let b_path = parts
                .next()
                .ok_or_else(|| PrError::DiffParse("Missing b/ path in diff header".to_string()))?;
            let path = b_path
                .strip_prefix("b/")
                .or_else(|| a_path.strip_prefix("a/"))
                .unwrap_or(b_path)
                .to_string();
            current_file = Some(FilePatch {
                path,
                is_new: false,
                is_deleted: false,
                additions: 0,
                deletions: 0,
                patch: None,
            });
            continue;
        }

        let Some(file) = current_file.as_mut() else {
            continue;
        };

        if body.is_empty() {
            if line.starts_with("@@") {
                body.push(line);
            } else if let Some(path) = line.strip_prefix("--- ") {
                file.is_new |= path.trim() == "/dev/null";
            } else if let Some(path) = line.strip_prefix("+++ ") {
                file.is_deleted |= path.trim() == "/dev/null";
            }
            continue;
        }

        body.push(line);
    }

    finish_file(&mut files, &mut current_file, &mut body)?;
    Ok(files)
}

fn count_changes(path: &str, patch: &str) -> Result<(usize, usize), PrError> {
    let malformed = |e: ResolveError| PrError::DiffParse(format!("{path}: {e}"));
    let mut additions = 0;
    let mut deletions = 0;
    for line in PatchLines::new(patch) {
        match line.map_err(malformed)?.kind {
            LineKind::Added => additions += 1,
            LineKind::Removed => deletions += 1,
            _ => {}
        }
    }
    Ok((additions, deletions))
}
