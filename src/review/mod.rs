pub mod feedback;
pub mod prompt;

use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::NotFoundPolicy;
use crate::index::Retriever;
use crate::llm::{CompletionModel, LlmError};
use crate::pr::position::{DiffPosition, DiffPositionResolver, ResolveError};
use crate::pr::{FilePatch, GitHubClient, PrUrl, PullRequest, ReviewComment};

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Review completion failed for {path}: {source}")]
    Completion {
        path: String,
        #[source]
        source: LlmError,
    },
}

/// What happened to one `Line <N>:` comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Resolved to the position of the named line.
    Anchored(DiffPosition),
    /// Line not in the patch; attached to the fallback position instead.
    FellBack(DiffPosition),
    /// Not postable as an inline comment.
    Dropped(String),
}

impl Outcome {
    pub fn position(&self) -> Option<DiffPosition> {
        match self {
            Outcome::Anchored(p) | Outcome::FellBack(p) => Some(*p),
            Outcome::Dropped(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DraftComment {
    pub line: usize,
    pub body: String,
    pub outcome: Outcome,
}

/// Review of one changed file.
#[derive(Debug, Clone)]
pub struct FileReview {
    pub path: String,
    /// Set when the file was not sent to the model.
    pub skipped: Option<String>,
    /// Raw model feedback.
    pub feedback: String,
    pub comments: Vec<DraftComment>,
}

impl FileReview {
    fn skipped(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            skipped: Some(reason.into()),
            feedback: String::new(),
            comments: Vec::new(),
        }
    }
}

/// Drives one completion per changed file and maps the feedback onto diff positions.
pub struct Reviewer<'a> {
    model: &'a dyn CompletionModel,
    retriever: Option<Retriever<'a>>,
    resolver: DiffPositionResolver,
    not_found: NotFoundPolicy,
}

impl<'a> Reviewer<'a> {
    pub fn new(
        model: &'a dyn CompletionModel,
        retriever: Option<Retriever<'a>>,
        resolver: DiffPositionResolver,
        not_found: NotFoundPolicy,
    ) -> Self {
        Self {
            model,
            retriever,
            resolver,
            not_found,
        }
    }

    /// Review every file of the PR, one after the other.
    pub async fn run(&self, pr: &PullRequest) -> Result<Vec<FileReview>, ReviewError> {
        let mut reviews = Vec::with_capacity(pr.files.len());
        for file in &pr.files {
            let review = self
                .review_file(pr, file)
                .instrument(info_span!("review_file", path = %file.path))
                .await?;
            reviews.push(review);
        }
        Ok(reviews)
    }

    pub async fn review_file(&self, pr: &PullRequest, file: &FilePatch) -> Result<FileReview, ReviewError> {
        if file.is_deleted {
            return Ok(FileReview::skipped(&file.path, "file deleted"));
        }
        let Some(patch) = file.patch.as_deref() else {
            return Ok(FileReview::skipped(&file.path, "no patch (binary or too large)"));
        };

        let numbered = match prompt::render_numbered_patch(patch, self.resolver.anchor()) {
            Ok(numbered) => numbered,
            Err(e) => {
                warn!(error = %e, "unusable patch, skipping file");
                return Ok(FileReview::skipped(&file.path, e.to_string()));
            }
        };

        let context = match &self.retriever {
            Some(retriever) => retriever.retrieve(&format!("{}\n{}", file.path, patch)).await,
            None => Vec::new(),
        };
        debug!(context = context.len(), "retrieved context");

        let user_prompt = prompt::review_prompt(pr, file, &numbered, &context);
        let feedback = self
            .model
            .complete(prompt::REVIEW_SYSTEM, &user_prompt)
            .await
            .map_err(|source| ReviewError::Completion {
                path: file.path.clone(),
                source,
            })?;

        let comments = self.place_comments(patch, &feedback);
        info!(comments = comments.len(), "file reviewed");

        Ok(FileReview {
            path: file.path.clone(),
            skipped: None,
            feedback,
            comments,
        })
    }

    /// Resolve each `Line <N>:` entry of `feedback` against `patch`.
    pub fn place_comments(&self, patch: &str, feedback: &str) -> Vec<DraftComment> {
        feedback::extract_targets(feedback)
            .into_iter()
            .map(|target| {
                let outcome = match self.resolver.resolve(patch, target.line) {
                    Ok(position) => Outcome::Anchored(position),
                    Err(ResolveError::NotFound { .. }) => match self.not_found {
                        NotFoundPolicy::FirstLine => Outcome::FellBack(DiffPosition::FIRST),
                        NotFoundPolicy::Drop => Outcome::Dropped("line not in diff".to_string()),
                    },
                    Err(e @ ResolveError::MalformedPatch { .. }) => Outcome::Dropped(e.to_string()),
                };
                debug!(line = target.line, ?outcome, "placed comment");
                DraftComment {
                    line: target.line,
                    body: target.comment,
                    outcome,
                }
            })
            .collect()
    }
}

/// Post every placed comment. Failures are logged and counted, not fatal.
pub async fn publish(
    client: &GitHubClient,
    pr_url: &PrUrl,
    pr: &PullRequest,
    reviews: &[FileReview],
) -> PublishSummary {
    let mut summary = PublishSummary::default();

    for review in reviews {
        for draft in &review.comments {
            let Some(position) = draft.outcome.position() else {
                continue;
            };
            let body = match draft.outcome {
                Outcome::FellBack(_) => format!("(line {}) {}", draft.line, draft.body),
                _ => draft.body.clone(),
            };
            let comment = ReviewComment {
                body,
                commit_id: pr.head_sha.clone(),
                path: review.path.clone(),
                position,
            };
            match client.post_review_comment(pr_url, &comment).await {
                Ok(()) => summary.posted += 1,
                Err(e) => {
                    warn!(path = %review.path, line = draft.line, error = %e, "failed to post comment");
                    summary.failed += 1;
                }
            }
        }
    }

    info!(posted = summary.posted, failed = summary.failed, "published review comments");
    summary
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub posted: usize,
    pub failed: usize,
}
