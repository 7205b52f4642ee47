use serde::Serialize;

use super::position::DiffPosition;

/// A pull request with the per-file patches needed for review.
/// Note: Not Deserialize — built from the GitHub metadata response plus the
/// paginated files listing, or from a local diff.
#[derive(Debug, Clone)]
pub struct PullRequest {
    /// PR number (e.g., 42)
    pub number: u64,
    /// PR title
    pub title: String,
    /// PR description, empty when none was given
    pub body: String,
    /// Author's GitHub login
    pub author: String,
    /// Head commit the review comments are attached to
    pub head_sha: String,
    /// Changed files
    pub files: Vec<FilePatch>,
}

impl PullRequest {
    pub fn additions(&self) -> usize {
        self.files.iter().map(|f| f.additions).sum()
    }

    pub fn deletions(&self) -> usize {
        self.files.iter().map(|f| f.deletions).sum()
    }
}

/// A single changed file.
#[derive(Debug, Clone)]
pub struct FilePatch {
    /// File path in the new revision (e.g., "src/auth/config.rs")
    pub path: String,
    /// Whether this is a new file
    pub is_new: bool,
    /// Whether this file was deleted
    pub is_deleted: bool,
    /// Lines added in this file
    pub additions: usize,
    /// Lines deleted in this file
    pub deletions: usize,
    /// Hunk text starting at the first `@@`. GitHub omits it for binary
    /// and very large files.
    pub patch: Option<String>,
}

/// A merged or closed pull request, used as review history.
#[derive(Debug, Clone)]
pub struct PastPull {
    pub number: u64,
    pub title: String,
    pub body: String,
}

/// Inline comment payload for `POST /repos/{owner}/{repo}/pulls/{n}/comments`.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewComment {
    pub body: String,
    pub commit_id: String,
    pub path: String,
    #[serde(serialize_with = "serialize_position")]
    pub position: DiffPosition,
}

fn serialize_position<S: serde::Serializer>(
    position: &DiffPosition,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(position.get() as u64)
}

/// Represents the parsed components of a GitHub PR URL.
#[derive(Debug, Clone)]
pub struct PrUrl {
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
}
