use std::fmt::Write;

use crate::index::Document;
use crate::pr::position::{AnchorPolicy, LineKind, PatchLines, ResolveError};
use crate::pr::{FilePatch, PullRequest};

pub const REVIEW_SYSTEM: &str = "You are a senior engineer reviewing a pull request. \
Point out bugs, risky changes and unclear code in the diff you are given. \
Only lines with a number in the left column can take a comment; \
lines with an empty left column are shown for context only. \
Write every comment on its own line as `Line <N>: <comment>`, where <N> is the \
number shown in the left column. \
If the change looks fine, reply with a short summary and no `Line` entries.";

/// Patch with each commentable line prefixed by its new-file line number.
///
/// Only lines `anchor` accepts get a number, so every number the model can
/// cite resolves to a diff position. Everything else gets a blank gutter.
pub fn render_numbered_patch(patch: &str, anchor: AnchorPolicy) -> Result<String, ResolveError> {
    let mut out = String::new();
    for line in PatchLines::new(patch) {
        let line = line?;
        match (line.kind, line.new_line) {
            (LineKind::Header(_), _) => {
                let _ = writeln!(out, "{}", line.text);
            }
            (kind, Some(n)) if anchor.accepts(kind) => {
                let _ = writeln!(out, "{n:>6} {}", line.text);
            }
            _ => {
                let _ = writeln!(out, "{:>6} {}", "", line.text);
            }
        }
    }
    Ok(out)
}

pub fn review_prompt(pr: &PullRequest, file: &FilePatch, numbered_patch: &str, context: &[&Document]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Pull request #{}: {}", pr.number, pr.title);
    if !pr.body.trim().is_empty() {
        let _ = writeln!(prompt, "\nDescription:\n{}", pr.body.trim());
    }

    if !context.is_empty() {
        prompt.push_str("\nRelated code and past pull requests:\n");
        for doc in context {
            let _ = writeln!(prompt, "--- {} ---\n{}", doc.source, doc.text);
        }
    }

    let kind = if file.is_new { " (new file)" } else { "" };
    let _ = writeln!(
        prompt,
        "\nDiff of `{}`{}:\n```diff\n{}```",
        file.path, kind, numbered_patch
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Source;
    use crate::pr::position::DiffPositionResolver;

    const PATCH: &str = "@@ -1,3 +1,4 @@\n line1\n+added line\n line2\n line3";

    /// Numbers shown in the left column of a rendered patch.
    fn gutter_numbers(rendered: &str) -> Vec<usize> {
        rendered
            .lines()
            .filter_map(|l| l.get(..6)?.trim().parse().ok())
            .collect()
    }

    fn sample_pr() -> PullRequest {
        PullRequest {
            number: 42,
            title: "Add OAuth2 login flow".to_string(),
            body: "Adds the login endpoint.".to_string(),
            author: "alice".to_string(),
            head_sha: "abc".to_string(),
            files: vec![],
        }
    }

    #[test]
    fn test_render_numbered_patch() {
        let patch = "@@ -1,2 +1,2 @@\n keep\n-old\n+new";
        let rendered = render_numbered_patch(patch, AnchorPolicy::AddedOrContext).unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "@@ -1,2 +1,2 @@");
        assert_eq!(lines[1], "     1  keep");
        assert_eq!(lines[2], "       -old");
        assert_eq!(lines[3], "     2 +new");

        let rendered = render_numbered_patch(patch, AnchorPolicy::Added).unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[1], "        keep");
        assert_eq!(lines[3], "     2 +new");
    }

    #[test]
    fn test_gutter_numbers_match_resolver() {
        for anchor in [AnchorPolicy::Added, AnchorPolicy::AddedOrContext] {
            let resolver = DiffPositionResolver::new(anchor);
            let shown = gutter_numbers(&render_numbered_patch(PATCH, anchor).unwrap());
            let resolvable: Vec<usize> = (1..=10)
                .filter(|&n| resolver.resolve(PATCH, n).is_ok())
                .collect();
            assert_eq!(shown, resolvable, "{anchor:?}");
        }
        assert_eq!(
            gutter_numbers(&render_numbered_patch(PATCH, AnchorPolicy::Added).unwrap()),
            vec![2]
        );
    }

    #[test]
    fn test_render_rejects_malformed_patch() {
        assert!(render_numbered_patch("+no header", AnchorPolicy::Added).is_err());
    }

    #[test]
    fn test_review_prompt_contents() {
        let file = FilePatch {
            path: "src/auth.rs".to_string(),
            is_new: false,
            is_deleted: false,
            additions: 1,
            deletions: 0,
            patch: None,
        };
        let doc = Document {
            source: Source::PullRequest { number: 7 },
            text: "Introduce session store".to_string(),
        };
        let prompt = review_prompt(&sample_pr(), &file, "@@ -1 +1 @@\n", &[&doc]);
        assert!(prompt.contains("Pull request #42: Add OAuth2 login flow"));
        assert!(prompt.contains("Adds the login endpoint."));
        assert!(prompt.contains("--- PR #7 ---\nIntroduce session store"));
        assert!(prompt.contains("Diff of `src/auth.rs`"));
    }
}
