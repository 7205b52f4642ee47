use crate::pr::PullRequest;
use crate::review::{FileReview, Outcome, PublishSummary};
use crate::testgen::GeneratedTest;

/// PR metadata shown at the top of every report.
#[derive(Debug, Clone)]
pub struct PrSummary {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub files_changed: usize,
    pub additions: usize,
    pub deletions: usize,
}

impl From<&PullRequest> for PrSummary {
    fn from(pr: &PullRequest) -> Self {
        Self {
            number: pr.number,
            title: pr.title.clone(),
            author: pr.author.clone(),
            files_changed: pr.files.len(),
            additions: pr.additions(),
            deletions: pr.deletions(),
        }
    }
}

/// Comment outcomes of one or more files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub anchored: usize,
    pub fell_back: usize,
    pub dropped: usize,
}

impl Tally {
    pub fn of(reviews: &[FileReview]) -> Self {
        let mut tally = Tally::default();
        for comment in reviews.iter().flat_map(|r| &r.comments) {
            match comment.outcome {
                Outcome::Anchored(_) => tally.anchored += 1,
                Outcome::FellBack(_) => tally.fell_back += 1,
                Outcome::Dropped(_) => tally.dropped += 1,
            }
        }
        tally
    }
}

/// Result of a review run.
#[derive(Debug)]
pub struct ReviewReport {
    pub pr: PrSummary,
    pub files: Vec<FileReview>,
    pub tally: Tally,
    /// None for dry runs.
    pub published: Option<PublishSummary>,
}

/// Result of a test generation run.
#[derive(Debug)]
pub struct TestGenReport {
    pub pr: PrSummary,
    pub tests: Vec<GeneratedTest>,
}
