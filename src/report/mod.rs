pub mod types;

pub use types::{PrSummary, ReviewReport, Tally, TestGenReport};

use crate::pr::PullRequest;
use crate::review::{FileReview, Outcome, PublishSummary};
use crate::testgen::{GenStatus, GeneratedTest};
use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

pub fn build_review(
    pr: &PullRequest,
    files: Vec<FileReview>,
    published: Option<PublishSummary>,
) -> ReviewReport {
    ReviewReport {
        pr: PrSummary::from(pr),
        tally: Tally::of(&files),
        files,
        published,
    }
}

pub fn build_testgen(pr: &PullRequest, tests: Vec<GeneratedTest>) -> TestGenReport {
    TestGenReport {
        pr: PrSummary::from(pr),
        tests,
    }
}

/// Print to the terminal when `output_path` is None, otherwise write markdown.
pub fn output_review(report: &ReviewReport, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing review report to terminal");
            print_review(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing review report to file");
            std::fs::write(path, review_markdown(report))?;
            Ok(())
        }
    }
}

pub fn output_testgen(report: &TestGenReport, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing testgen report to terminal");
            print_testgen(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing testgen report to file");
            std::fs::write(path, testgen_markdown(report))?;
            Ok(())
        }
    }
}

/// PR #42: "Add OAuth2 login flow"
/// Author: alice | Files changed: 7 | +320 -45
fn print_header(pr: &PrSummary) {
    println!();
    println!("PR #{}: \"{}\"", pr.number, pr.title);
    println!(
        "Author: {} | Files changed: {} | +{} -{}",
        pr.author, pr.files_changed, pr.additions, pr.deletions
    );
    println!();
}

fn print_review(report: &ReviewReport) {
    print_header(&report.pr);

    for file in &report.files {
        println!("═══ {} ═══", file.path);
        if let Some(reason) = &file.skipped {
            println!("  {} {}", "skipped:".dimmed(), reason);
        } else if file.comments.is_empty() {
            println!("  No line comments.");
        } else {
            for comment in &file.comments {
                println!(
                    "  • {} line {}: {}",
                    colorize_outcome(&comment.outcome),
                    comment.line,
                    comment.body
                );
            }
        }
        println!();
    }

    let tally = report.tally;
    println!(
        "═══ Comments: {} anchored, {} fell back, {} dropped ═══",
        tally.anchored.to_string().green().bold(),
        tally.fell_back.to_string().yellow().bold(),
        tally.dropped.to_string().red().bold()
    );
    match report.published {
        Some(p) => println!("Posted {} comment(s), {} failed", p.posted, p.failed),
        None => println!("{}", "Dry run: nothing was posted".dimmed()),
    }
    println!();
}

fn print_testgen(report: &TestGenReport) {
    print_header(&report.pr);

    if report.tests.is_empty() {
        println!("  No source files eligible for test generation.");
    }
    for test in &report.tests {
        let status = match &test.status {
            GenStatus::Written => "WRITTEN".green().bold(),
            GenStatus::Skipped(_) => "SKIPPED".yellow().bold(),
        };
        let detail = match &test.status {
            GenStatus::Written => test.output.display().to_string(),
            GenStatus::Skipped(reason) => reason.clone(),
        };
        println!("  • {} {} ({})", status, test.source, detail);
    }
    println!();
}

fn review_markdown(report: &ReviewReport) -> String {
    let pr = &report.pr;
    let mut md = String::new();
    md.push_str(&format!("# PR #{}: \"{}\"\n\n", pr.number, pr.title));
    md.push_str(&format!(
        "**Author:** {} | **Files changed:** {} | **+{} -{}**\n\n",
        pr.author, pr.files_changed, pr.additions, pr.deletions
    ));

    for file in &report.files {
        md.push_str(&format!("## `{}`\n\n", file.path));
        if let Some(reason) = &file.skipped {
            md.push_str(&format!("_Skipped: {}_\n\n", reason));
            continue;
        }
        if file.comments.is_empty() {
            md.push_str("No line comments.\n\n");
        } else {
            for comment in &file.comments {
                md.push_str(&format!(
                    "- **[{}]** line {}: {}\n",
                    outcome_label(&comment.outcome),
                    comment.line,
                    comment.body
                ));
            }
            md.push('\n');
        }
        if !file.feedback.trim().is_empty() {
            md.push_str(&format!(
                "<details><summary>Model feedback</summary>\n\n{}\n\n</details>\n\n",
                file.feedback.trim()
            ));
        }
    }

    let tally = report.tally;
    md.push_str(&format!(
        "## Summary\n\n{} anchored, {} fell back, {} dropped\n",
        tally.anchored, tally.fell_back, tally.dropped
    ));
    match report.published {
        Some(p) => md.push_str(&format!("\nPosted {} comment(s), {} failed\n", p.posted, p.failed)),
        None => md.push_str("\nDry run: nothing was posted\n"),
    }
    md
}

fn testgen_markdown(report: &TestGenReport) -> String {
    let pr = &report.pr;
    let mut md = format!("# Test generation for PR #{}: \"{}\"\n\n", pr.number, pr.title);
    for test in &report.tests {
        match &test.status {
            GenStatus::Written => md.push_str(&format!(
                "- `{}` → `{}`\n",
                test.source,
                test.output.display()
            )),
            GenStatus::Skipped(reason) => {
                md.push_str(&format!("- `{}` skipped: {}\n", test.source, reason))
            }
        }
    }
    md
}

fn outcome_label(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Anchored(p) => format!("position {p}"),
        Outcome::FellBack(p) => format!("fallback {p}"),
        Outcome::Dropped(reason) => format!("dropped: {reason}"),
    }
}

/// Helper to colorize an outcome label for terminal output.
fn colorize_outcome(outcome: &Outcome) -> colored::ColoredString {
    let label = outcome_label(outcome);
    match outcome {
        Outcome::Anchored(_) => label.green().bold(),
        Outcome::FellBack(_) => label.yellow().bold(),
        Outcome::Dropped(_) => label.red().bold(),
    }
}
