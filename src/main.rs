mod config;
mod index;
mod llm;
mod pr;
mod report;
mod review;
mod testgen;

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn};
use tracing_subscriber::EnvFilter;

/// PR Reviewer — CI tool that reviews a GitHub Pull Request with an LLM,
/// posting line-level comments, and drafts unit tests for changed files.
#[derive(Parser, Debug)]
#[command(name = "pr-reviewer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Review a pull request and post inline comments
    Review {
        #[command(flatten)]
        target: Target,

        /// Print comments instead of posting them
        #[arg(long)]
        dry_run: bool,

        /// Optional output file path for markdown report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate unit-test skeletons for changed source files
    Testgen {
        #[command(flatten)]
        target: Target,

        /// Directory for generated tests (overrides config)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Optional output file path for markdown report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct Target {
    /// GitHub Pull Request URL (e.g., https://github.com/org/repo/pull/42)
    pr_url: String,

    /// Local checkout of the repository
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Read changes from a local `git diff` file instead of the GitHub API.
    /// Nothing is posted in this mode.
    #[arg(long)]
    diff: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = config::Config::load()?;

    match cli.command {
        Command::Review {
            target,
            dry_run,
            output,
        } => run_review(&config, &target, dry_run, output.as_deref()).await,
        Command::Testgen {
            target,
            out_dir,
            output,
        } => run_testgen(&config, &target, out_dir, output.as_deref()).await,
    }
}

async fn run_review(
    config: &config::Config,
    target: &Target,
    dry_run: bool,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let _main_span = info_span!("review", pr_url = %target.pr_url).entered();

    let pr_url = pr::parse_pr_url(&target.pr_url)?;
    debug!(owner = %pr_url.owner, repo = %pr_url.repo, pr = pr_url.pr_number, "parsed PR URL");

    let github = match &target.diff {
        Some(_) => None,
        None => Some(pr::GitHubClient::new(config)?),
    };
    let pull_request = load_pull_request(github.as_ref(), &pr_url, target).await?;
    info!(files = pull_request.files.len(), additions = pull_request.additions(), deletions = pull_request.deletions(), "loaded pull request");

    let llm = llm::OpenAiClient::new(config.llm.clone())?;

    let context_index = if config.review.top_k > 0 {
        let history = match &github {
            Some(github) => match github.list_recent_pulls(&pr_url, config.review.history_limit).await {
                Ok(history) => history,
                Err(e) => {
                    warn!(error = %e, "could not load PR history, indexing repository only");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        build_context_index(config, &target.repo, &history, &llm).await
    } else {
        None
    };

    let retriever = context_index
        .as_ref()
        .map(|idx| index::Retriever::new(idx, &llm, config.review.top_k));
    let reviewer = review::Reviewer::new(
        &llm,
        retriever,
        pr::position::DiffPositionResolver::new(config.review.anchor),
        config.review.not_found,
    );

    info!("reviewing changed files");
    let reviews = reviewer.run(&pull_request).await?;

    let published = match &github {
        Some(github) if !dry_run => {
            Some(review::publish(github, &pr_url, &pull_request, &reviews).await)
        }
        _ => None,
    };

    let built_report = report::build_review(&pull_request, reviews, published);
    report::output_review(&built_report, output)?;
    info!(anchored = built_report.tally.anchored, fell_back = built_report.tally.fell_back, dropped = built_report.tally.dropped, "done");

    Ok(())
}

/// Index of the checkout and PR history. Any failure is logged and the
/// review goes on without retrieved context.
async fn build_context_index(
    config: &config::Config,
    repo: &Path,
    history: &[pr::PastPull],
    embedder: &dyn llm::Embedder,
) -> Option<index::ContextIndex> {
    info!("building context index");
    let mut docs = match index::repository_documents(repo, config.review.max_file_bytes) {
        Ok(docs) => docs,
        Err(e) => {
            warn!(error = %e, repo = %repo.display(), "could not walk repository, indexing PR history only");
            Vec::new()
        }
    };
    docs.extend(index::history_documents(history));

    match index::ContextIndex::build(docs, embedder).await {
        Ok(context_index) => Some(context_index),
        Err(e) => {
            warn!(error = %e, "could not build context index, reviewing without context");
            None
        }
    }
}

async fn run_testgen(
    config: &config::Config,
    target: &Target,
    out_dir: Option<PathBuf>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let _main_span = info_span!("testgen", pr_url = %target.pr_url).entered();

    let pr_url = pr::parse_pr_url(&target.pr_url)?;
    let github = match &target.diff {
        Some(_) => None,
        None => Some(pr::GitHubClient::new(config)?),
    };
    let pull_request = load_pull_request(github.as_ref(), &pr_url, target).await?;

    let llm = llm::OpenAiClient::new(config.llm.clone())?;
    let out_dir = out_dir.unwrap_or_else(|| target.repo.join(&config.testgen.output_dir));
    let generator = testgen::TestGenerator::new(
        &llm,
        &target.repo,
        &out_dir,
        &config.testgen.framework_hints,
    );

    info!(out_dir = %out_dir.display(), "generating tests");
    let tests = generator.generate(&pull_request.files).await?;

    let built_report = report::build_testgen(&pull_request, tests);
    report::output_testgen(&built_report, output)?;
    info!("done");

    Ok(())
}

async fn load_pull_request(
    github: Option<&pr::GitHubClient>,
    pr_url: &pr::PrUrl,
    target: &Target,
) -> Result<pr::PullRequest, Box<dyn std::error::Error>> {
    match (github, &target.diff) {
        (Some(github), _) => {
            info!("fetching pull request from GitHub");
            Ok(github.fetch_pull_request(pr_url).await?)
        }
        (None, Some(path)) => {
            info!(path = %path.display(), "reading local diff");
            let raw = std::fs::read_to_string(path)?;
            local_pull_request(pr_url, &raw)
        }
        (None, None) => Err("either a GitHub client or --diff is required".into()),
    }
}

/// Build a PullRequest from a local diff, e.g. `git diff origin/main...HEAD`.
fn local_pull_request(
    pr_url: &pr::PrUrl,
    raw_diff: &str,
) -> Result<pr::PullRequest, Box<dyn std::error::Error>> {
    let files = pr::diff::parse_diff(raw_diff)?;
    Ok(pr::PullRequest {
        number: pr_url.pr_number,
        title: format!("{}/{} local diff", pr_url.owner, pr_url.repo),
        body: String::new(),
        author: "local".to_string(),
        head_sha: String::new(),
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::{FailingEmbedder, LetterEmbedder};
    use crate::llm::{CompletionModel, LlmError};
    use async_trait::async_trait;

    struct NitModel;

    #[async_trait]
    impl CompletionModel for NitModel {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
            Ok("Line 40: handle the refresh error".to_string())
        }
    }

    #[tokio::test]
    async fn test_index_failure_still_reviews() {
        let repo = std::env::temp_dir().join("pr_reviewer_main_index");
        std::fs::create_dir_all(&repo).unwrap();
        std::fs::write(repo.join("lib.rs"), "fn login() {}\n").unwrap();
        let config = config::Config::default();
        let history = vec![pr::PastPull {
            number: 7,
            title: "Session store".to_string(),
            body: String::new(),
        }];

        let built = build_context_index(&config, &repo, &history, &LetterEmbedder).await;
        assert!(built.is_some_and(|i| !i.is_empty()));

        let context_index = build_context_index(&config, &repo, &history, &FailingEmbedder).await;
        assert!(context_index.is_none());

        let retriever = context_index
            .as_ref()
            .map(|idx| index::Retriever::new(idx, &FailingEmbedder, config.review.top_k));
        let reviewer = review::Reviewer::new(
            &NitModel,
            retriever,
            pr::position::DiffPositionResolver::default(),
            config.review.not_found,
        );
        let pr_url = pr::parse_pr_url("https://github.com/org/repo/pull/42").unwrap();
        let raw = include_str!("../tests/fixtures/sample_diff.patch");
        let pull = local_pull_request(&pr_url, raw).unwrap();
        let reviews = reviewer.run(&pull).await.unwrap();
        assert_eq!(reviews.len(), 3);
        let oauth = reviews.iter().find(|r| r.path == "src/auth/oauth.rs").unwrap();
        assert_eq!(oauth.comments[0].outcome.position().map(|p| p.get()), Some(10));

        std::fs::remove_dir_all(&repo).ok();
    }

    #[test]
    fn test_local_pull_request_from_fixture() {
        let pr_url = pr::parse_pr_url("https://github.com/org/repo/pull/42").unwrap();
        let raw = include_str!("../tests/fixtures/sample_diff.patch");
        let pull = local_pull_request(&pr_url, raw).unwrap();
        assert_eq!(pull.number, 42);
        assert_eq!(pull.files.len(), 3);
        assert!(pull.files.iter().any(|f| f.is_new));
        assert!(pull.files.iter().all(|f| f.patch.is_some()));
    }

    #[test]
    fn test_fixture_positions() {
        let raw = include_str!("../tests/fixtures/sample_diff.patch");
        let files = pr::diff::parse_diff(raw).unwrap();
        let auth = files.iter().find(|f| f.path == "src/auth/oauth.rs").unwrap();
        let patch = auth.patch.as_deref().unwrap();
        // Second hunk header is position 7; its first added line (new line 40) is 10.
        assert_eq!(pr::position::resolve(patch, 40).map(|p| p.get()), Ok(10));
    }

    #[test]
    fn test_cli_parses_review() {
        let cli = Cli::parse_from([
            "pr-reviewer",
            "review",
            "https://github.com/org/repo/pull/42",
            "--dry-run",
            "--diff",
            "changes.patch",
        ]);
        match cli.command {
            Command::Review { target, dry_run, .. } => {
                assert!(dry_run);
                assert_eq!(target.diff, Some(PathBuf::from("changes.patch")));
                assert_eq!(target.repo, PathBuf::from("."));
            }
            Command::Testgen { .. } => panic!("expected review"),
        }
    }
}
