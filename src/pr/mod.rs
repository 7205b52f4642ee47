pub mod diff;
pub mod position;
pub mod types;

pub use types::{FilePatch, PastPull, PrUrl, PullRequest, ReviewComment};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::Config;

/// GitHub caps the files listing at 3000 entries (30 pages of 100).
const FILES_PER_PAGE: usize = 100;
const MAX_FILE_PAGES: usize = 30;

#[derive(Debug, Error)]
pub enum PrError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("Invalid PR URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to parse diff: {0}")]
    DiffParse(String),

    #[error("GitHub token not found in environment")]
    MissingToken,
}

/// Parse a GitHub PR URL into its component parts.
///
/// Expected format: https://github.com/{owner}/{repo}/pull/{number}
pub fn parse_pr_url(url: &str) -> Result<PrUrl, PrError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| PrError::InvalidUrl(url.to_string()))?;

    if parsed.host_str() != Some("github.com") {
        return Err(PrError::InvalidUrl(url.to_string()));
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(|| PrError::InvalidUrl(url.to_string()))?
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() != 4 || segments[2] != "pull" {
        return Err(PrError::InvalidUrl(url.to_string()));
    }

    let pr_number = segments[3]
        .parse::<u64>()
        .map_err(|_| PrError::InvalidUrl(url.to_string()))?;

    Ok(PrUrl {
        owner: segments[0].to_string(),
        repo: segments[1].to_string(),
        pr_number,
    })
}

#[derive(Deserialize)]
struct User {
    login: String,
}

#[derive(Deserialize)]
struct Head {
    sha: String,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    title: String,
    body: Option<String>,
    user: User,
    head: Head,
}

#[derive(Deserialize)]
struct FileResponse {
    filename: String,
    status: String,
    additions: usize,
    deletions: usize,
    patch: Option<String>,
}

impl From<FileResponse> for FilePatch {
    fn from(file: FileResponse) -> Self {
        FilePatch {
            is_new: file.status == "added",
            is_deleted: file.status == "removed",
            path: file.filename,
            additions: file.additions,
            deletions: file.deletions,
            patch: file.patch.filter(|p| !p.trim().is_empty()),
        }
    }
}

/// Thin client for the GitHub REST endpoints the reviewer needs.
pub struct GitHubClient {
    client: reqwest::Client,
    api_base: String,
}

impl GitHubClient {
    pub fn new(config: &Config) -> Result<Self, PrError> {
        let token = config.github_token().ok_or(PrError::MissingToken)?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("pr-reviewer"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        let auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| PrError::MissingToken)?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_base: config.github.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn repo_url(&self, pr_url: &PrUrl) -> String {
        format!("{}/repos/{}/{}", self.api_base, pr_url.owner, pr_url.repo)
    }

    /// Fetch PR metadata and every changed file with its patch.
    #[instrument(skip(self), fields(owner = %pr_url.owner, repo = %pr_url.repo, pr = pr_url.pr_number))]
    pub async fn fetch_pull_request(&self, pr_url: &PrUrl) -> Result<PullRequest, PrError> {
        let url = format!("{}/pulls/{}", self.repo_url(pr_url), pr_url.pr_number);

        debug!("fetching PR metadata from GitHub API");
        let metadata = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<PullResponse>()
            .await?;
        debug!(title = %metadata.title, head = %metadata.head.sha, "received PR metadata");

        let files = self.list_files(pr_url).await?;

        Ok(PullRequest {
            number: metadata.number,
            title: metadata.title,
            body: metadata.body.unwrap_or_default(),
            author: metadata.user.login,
            head_sha: metadata.head.sha,
            files,
        })
    }

    /// Paginated `pulls/{n}/files` listing.
    pub async fn list_files(&self, pr_url: &PrUrl) -> Result<Vec<FilePatch>, PrError> {
        let url = format!("{}/pulls/{}/files", self.repo_url(pr_url), pr_url.pr_number);
        let mut files = Vec::new();

        for page in 1..=MAX_FILE_PAGES {
            let batch = self
                .client
                .get(&url)
                .query(&[("per_page", FILES_PER_PAGE), ("page", page)])
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<FileResponse>>()
                .await?;
            let len = batch.len();
            debug!(page, files = len, "received files page");
            files.extend(batch.into_iter().map(FilePatch::from));
            if len < FILES_PER_PAGE {
                break;
            }
        }

        Ok(files)
    }

    /// Most recently updated closed pull requests, newest first.
    pub async fn list_recent_pulls(
        &self,
        pr_url: &PrUrl,
        limit: usize,
    ) -> Result<Vec<PastPull>, PrError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let url = format!("{}/pulls", self.repo_url(pr_url));
        let per_page = limit.min(100).to_string();
        let pulls = self
            .client
            .get(&url)
            .query(&[
                ("state", "closed"),
                ("sort", "updated"),
                ("direction", "desc"),
                ("per_page", per_page.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<PullResponse>>()
            .await?;
        debug!(pulls = pulls.len(), "received PR history");

        Ok(pulls
            .into_iter()
            .filter(|p| p.number != pr_url.pr_number)
            .take(limit)
            .map(|p| PastPull {
                number: p.number,
                title: p.title,
                body: p.body.unwrap_or_default(),
            })
            .collect())
    }

    /// Attach an inline comment at a diff position.
    #[instrument(skip(self, comment), fields(path = %comment.path, position = %comment.position))]
    pub async fn post_review_comment(
        &self,
        pr_url: &PrUrl,
        comment: &ReviewComment,
    ) -> Result<(), PrError> {
        let url = format!("{}/pulls/{}/comments", self.repo_url(pr_url), pr_url.pr_number);
        self.client
            .post(&url)
            .json(comment)
            .send()
            .await?
            .error_for_status()?;
        debug!("posted review comment");
        Ok(())
    }
}
