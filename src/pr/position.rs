//! Mapping between new-file line numbers and GitHub "diff positions".
//!
//! A diff position is a 1-based counter over the displayed lines of one
//! file's patch. The first `@@` header is not a position (the line right
//! below it is position 1); every later `@@` header and every body line
//! (`+`, `-`, ` ` and `\ No newline at end of file`) takes one position.
//! Removed lines advance the position but never the new-file line counter.
//!
//! Nothing in here logs or performs I/O.

use serde::Deserialize;
use thiserror::Error;

/// 1-based position of a line inside one file's patch.
///
/// Only meaningful for the exact patch text it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiffPosition(usize);

impl DiffPosition {
    /// Position of the first line below the first hunk header.
    pub const FIRST: DiffPosition = DiffPosition(1);

    pub fn get(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for DiffPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("malformed patch at line {line}: {reason}")]
    MalformedPatch { line: usize, reason: String },

    #[error("line {target_line} is not a commentable line of the patch")]
    NotFound { target_line: usize },
}

/// Which new-side lines a target line number may anchor to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPolicy {
    /// Only `+` lines.
    #[default]
    Added,
    /// `+` lines and unchanged context lines.
    AddedOrContext,
}

impl AnchorPolicy {
    /// Whether a line of this kind can carry a comment.
    pub fn accepts(self, kind: LineKind) -> bool {
        match kind {
            LineKind::Added => true,
            LineKind::Context => self == AnchorPolicy::AddedOrContext,
            _ => false,
        }
    }
}

/// Parsed `@@ -a,b +c,d @@` header. The old start is validated but not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader {
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Header(HunkHeader),
    Added,
    Removed,
    Context,
    /// `\ No newline at end of file`
    NoNewline,
}

/// One displayed line of a patch together with its coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchLine<'a> {
    pub kind: LineKind,
    pub text: &'a str,
    /// `None` only for the first hunk header.
    pub position: Option<DiffPosition>,
    /// New-file line number, set for added and context lines.
    pub new_line: Option<usize>,
}

/// One `@@` block of a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedDiffHunk {
    pub new_start: usize,
    pub new_count: usize,
    /// Raw body lines, prefix included.
    pub lines: Vec<String>,
}

/// Lazily walks a patch, yielding every displayed line in order.
///
/// Git meta lines (`diff --git`, `index`, `---`/`+++` file headers, mode
/// lines) are skipped while no hunk body is open. A content line before the
/// first hunk header, or an unparsable header, yields `MalformedPatch` and
/// ends the walk.
pub struct PatchLines<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    position: usize,
    seen_header: bool,
    /// Next new-file line number; `None` once it would exceed `usize::MAX`.
    new_line: Option<usize>,
    old_remaining: usize,
    new_remaining: usize,
    failed: bool,
}

impl<'a> PatchLines<'a> {
    pub fn new(patch: &'a str) -> Self {
        Self {
            lines: patch.lines().enumerate(),
            position: 0,
            seen_header: false,
            new_line: None,
            old_remaining: 0,
            new_remaining: 0,
            failed: false,
        }
    }

    fn in_body(&self) -> bool {
        self.old_remaining > 0 || self.new_remaining > 0
    }

    fn malformed(&mut self, line: usize, reason: impl Into<String>) -> ResolveError {
        self.failed = true;
        ResolveError::MalformedPatch {
            line,
            reason: reason.into(),
        }
    }

    fn advance(&mut self) -> DiffPosition {
        self.position += 1;
        DiffPosition(self.position)
    }
}

impl<'a> Iterator for PatchLines<'a> {
    type Item = Result<PatchLine<'a>, ResolveError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let (idx, raw) = self.lines.next()?;
            let line_no = idx + 1;

            if raw.starts_with("@@") {
                let header = match parse_hunk_header(raw) {
                    Ok(header) => header,
                    Err(reason) => return Some(Err(self.malformed(line_no, reason))),
                };
                let position = if self.seen_header {
                    Some(self.advance())
                } else {
                    None
                };
                self.seen_header = true;
                self.new_line = Some(header.new_start);
                self.old_remaining = header.old_count;
                self.new_remaining = header.new_count;
                return Some(Ok(PatchLine {
                    kind: LineKind::Header(header),
                    text: raw,
                    position,
                    new_line: None,
                }));
            }

            let in_body = self.in_body();
            if !in_body && (is_meta_line(raw) || raw.trim().is_empty()) {
                continue;
            }

            if !self.seen_header {
                return Some(Err(
                    self.malformed(line_no, "content line before the first hunk header")
                ));
            }

            if raw.starts_with('\\') {
                let position = self.advance();
                return Some(Ok(PatchLine {
                    kind: LineKind::NoNewline,
                    text: raw,
                    position: Some(position),
                    new_line: None,
                }));
            }

            let position = self.advance();
            let line = match raw.as_bytes().first() {
                Some(b'-') => {
                    self.old_remaining = self.old_remaining.saturating_sub(1);
                    PatchLine {
                        kind: LineKind::Removed,
                        text: raw,
                        position: Some(position),
                        new_line: None,
                    }
                }
                first => {
                    let kind = if first == Some(&b'+') {
                        LineKind::Added
                    } else {
                        // A blank line inside a body is context that lost its leading space.
                        self.old_remaining = self.old_remaining.saturating_sub(1);
                        LineKind::Context
                    };
                    self.new_remaining = self.new_remaining.saturating_sub(1);
                    let Some(new_line) = self.new_line else {
                        return Some(Err(
                            self.malformed(line_no, "new-file line number overflows")
                        ));
                    };
                    self.new_line = new_line.checked_add(1);
                    PatchLine {
                        kind,
                        text: raw,
                        position: Some(position),
                        new_line: Some(new_line),
                    }
                }
            };
            return Some(Ok(line));
        }
    }
}

/// Resolves new-file line numbers to diff positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffPositionResolver {
    anchor: AnchorPolicy,
}

impl DiffPositionResolver {
    pub fn new(anchor: AnchorPolicy) -> Self {
        Self { anchor }
    }

    pub fn anchor(&self) -> AnchorPolicy {
        self.anchor
    }

    /// Find the diff position of `target_line` (new-file numbering) in `patch`.
    ///
    /// Single left-to-right pass; the first matching line wins. Never
    /// substitutes a default position: a miss is `NotFound`.
    pub fn resolve(&self, patch: &str, target_line: usize) -> Result<DiffPosition, ResolveError> {
        for line in PatchLines::new(patch) {
            let line = line?;
            if self.anchor.accepts(line.kind) && line.new_line == Some(target_line) {
                if let Some(position) = line.position {
                    return Ok(position);
                }
            }
        }
        Err(ResolveError::NotFound { target_line })
    }
}

/// Resolve against `+` lines only.
pub fn resolve(patch: &str, target_line: usize) -> Result<DiffPosition, ResolveError> {
    DiffPositionResolver::default().resolve(patch, target_line)
}

/// Split one file's patch into hunks.
pub fn parse_hunks(patch: &str) -> Result<Vec<UnifiedDiffHunk>, ResolveError> {
    let mut hunks: Vec<UnifiedDiffHunk> = Vec::new();
    for line in PatchLines::new(patch) {
        let line = line?;
        match (line.kind, hunks.last_mut()) {
            (LineKind::Header(header), _) => hunks.push(UnifiedDiffHunk {
                new_start: header.new_start,
                new_count: header.new_count,
                lines: Vec::new(),
            }),
            (_, Some(hunk)) => hunk.lines.push(line.text.to_string()),
            // PatchLines fails before yielding body lines without a header.
            (_, None) => {}
        }
    }
    Ok(hunks)
}

/// Parse `@@ -<old_start>[,<old_count>] +<new_start>[,<new_count>] @@[ section]`.
pub fn parse_hunk_header(line: &str) -> Result<HunkHeader, String> {
    let header = line
        .trim()
        .strip_prefix("@@")
        .ok_or_else(|| "invalid hunk header".to_string())?;
    let ranges = match header.find("@@") {
        Some(end) => &header[..end],
        None => return Err(format!("unterminated hunk header: {line}")),
    };
    let mut parts = ranges.split_whitespace();
    let old_part = parts
        .next()
        .ok_or_else(|| "missing old range".to_string())?;
    let new_part = parts
        .next()
        .ok_or_else(|| "missing new range".to_string())?;

    let (_, old_count) = parse_range(old_part, '-')?;
    let (new_start, new_count) = parse_range(new_part, '+')?;

    Ok(HunkHeader {
        old_count,
        new_start,
        new_count,
    })
}

fn parse_range(part: &str, prefix: char) -> Result<(usize, usize), String> {
    let range = part
        .strip_prefix(prefix)
        .ok_or_else(|| format!("invalid range prefix in {part}"))?;
    let (start_str, count_str) = match range.split_once(',') {
        Some((start, count)) => (start, count),
        None => (range, "1"),
    };
    let start = start_str
        .parse::<usize>()
        .map_err(|_| format!("invalid range start in {part}"))?;
    let count = count_str
        .parse::<usize>()
        .map_err(|_| format!("invalid range count in {part}"))?;
    if start.checked_add(count).is_none() {
        return Err(format!("line number overflows in {part}"));
    }
    Ok((start, count))
}

fn is_meta_line(line: &str) -> bool {
    const META_PREFIXES: &[&str] = &[
        "diff --git ",
        "index ",
        "--- ",
        "+++ ",
        "new file mode",
        "deleted file mode",
        "old mode",
        "new mode",
        "similarity index",
        "rename from",
        "rename to",
        "Binary files",
    ];
    META_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_HUNK: &str = "@@ -1,3 +1,4 @@\n line1\n+added line\n line2\n line3";

    const TWO_HUNKS: &str = "@@ -1,4 +1,4 @@\n a\n b\n-c\n+C\n d\n@@ -20,2 +20,4 @@\n+first\n+second\n t\n u";

    fn pos(n: usize) -> DiffPosition {
        DiffPosition(n)
    }

    #[test]
    fn test_single_added_line() {
        assert_eq!(resolve(SINGLE_HUNK, 2), Ok(pos(2)));
    }

    #[test]
    fn test_line_outside_patch_is_not_found() {
        assert_eq!(
            resolve(SINGLE_HUNK, 99),
            Err(ResolveError::NotFound { target_line: 99 })
        );
    }

    #[test]
    fn test_context_line_not_anchored_by_default() {
        assert_eq!(
            resolve(SINGLE_HUNK, 1),
            Err(ResolveError::NotFound { target_line: 1 })
        );
    }

    #[test]
    fn test_context_line_with_added_or_context_policy() {
        let resolver = DiffPositionResolver::new(AnchorPolicy::AddedOrContext);
        assert_eq!(resolver.resolve(SINGLE_HUNK, 1), Ok(pos(1)));
        assert_eq!(resolver.resolve(SINGLE_HUNK, 4), Ok(pos(4)));
    }

    #[test]
    fn test_second_hunk_counts_first_hunk_and_its_own_header() {
        // Hunk 1 body: a, b, -c, +C, d at positions 1..=5.
        assert_eq!(resolve(TWO_HUNKS, 3), Ok(pos(4)));
        // Header of hunk 2 is position 6, "+first" 7, "+second" 8.
        assert_eq!(resolve(TWO_HUNKS, 20), Ok(pos(7)));
        assert_eq!(resolve(TWO_HUNKS, 21), Ok(pos(8)));
    }

    #[test]
    fn test_second_added_line_of_second_hunk() {
        // Four body lines in hunk 1, hunk 2 header at position 5.
        let patch = "@@ -1,3 +1,4 @@\n x\n+y\n z\n w\n@@ -10,1 +11,3 @@\n+p\n+q\n r";
        assert_eq!(resolve(patch, 12), Ok(pos(7)));
    }

    #[test]
    fn test_removed_line_does_not_take_new_line_number() {
        let patch = "@@ -1,3 +1,2 @@\n keep\n-gone\n last";
        let resolver = DiffPositionResolver::new(AnchorPolicy::AddedOrContext);
        // "last" is new line 2 even though "-gone" sits between.
        assert_eq!(resolver.resolve(patch, 2), Ok(pos(3)));
        assert_eq!(resolve(patch, 2), Err(ResolveError::NotFound { target_line: 2 }));
    }

    #[test]
    fn test_target_only_removed_is_not_found() {
        let patch = "@@ -1,2 +1,1 @@\n keep\n-gone";
        assert_eq!(resolve(patch, 2), Err(ResolveError::NotFound { target_line: 2 }));
    }

    #[test]
    fn test_replacement_resolves_to_added_side() {
        let patch = "@@ -5,2 +5,2 @@\n-old\n+new\n same";
        assert_eq!(resolve(patch, 5), Ok(pos(2)));
    }

    #[test]
    fn test_content_before_header_is_malformed() {
        let patch = "\n+orphan\n@@ -1 +1 @@\n+x";
        assert!(matches!(
            resolve(patch, 1),
            Err(ResolveError::MalformedPatch { line: 2, .. })
        ));
    }

    #[test]
    fn test_bad_header_is_malformed() {
        let patch = "@@ -1,2 +x,3 @@\n+a";
        assert!(matches!(
            resolve(patch, 1),
            Err(ResolveError::MalformedPatch { line: 1, .. })
        ));
    }

    #[test]
    fn test_header_range_overflow_is_malformed() {
        let patch = "@@ -1 +18446744073709551615,2 @@\n+a\n+b";
        assert!(matches!(
            resolve(patch, 1),
            Err(ResolveError::MalformedPatch { line: 1, .. })
        ));
    }

    #[test]
    fn test_new_line_past_usize_max_is_malformed() {
        // The header declares no new lines but the body carries two.
        let patch = format!("@@ -1 +{},0 @@\n+a\n+b", usize::MAX);
        assert_eq!(resolve(&patch, usize::MAX), Ok(pos(1)));
        assert!(matches!(
            resolve(&patch, 1),
            Err(ResolveError::MalformedPatch { line: 3, .. })
        ));
    }

    #[test]
    fn test_header_without_counts() {
        let patch = "@@ -3 +3 @@\n-old\n+new";
        assert_eq!(resolve(patch, 3), Ok(pos(2)));
    }

    #[test]
    fn test_git_file_headers_are_skipped() {
        let patch = "diff --git a/x.rs b/x.rs\nindex 1..2 100644\n--- a/x.rs\n+++ b/x.rs\n@@ -1,1 +1,2 @@\n a\n+b";
        assert_eq!(resolve(patch, 2), Ok(pos(2)));
    }

    #[test]
    fn test_plus_plus_plus_inside_body_is_an_addition() {
        let patch = "@@ -1,1 +1,2 @@\n a\n+++ counter";
        assert_eq!(resolve(patch, 2), Ok(pos(2)));
    }

    #[test]
    fn test_no_newline_marker_takes_a_position() {
        let patch = "@@ -1,1 +1,1 @@\n-a\n\\ No newline at end of file\n+b";
        assert_eq!(resolve(patch, 1), Ok(pos(3)));
    }

    #[test]
    fn test_first_match_wins_and_is_idempotent() {
        let first = resolve(TWO_HUNKS, 20);
        let second = resolve(TWO_HUNKS, 20);
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_hunks() {
        let hunks = parse_hunks(TWO_HUNKS).unwrap();
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].new_start, 1);
        assert_eq!(hunks[0].lines.len(), 5);
        assert_eq!(hunks[1].new_start, 20);
        assert_eq!(hunks[1].new_count, 4);
        assert_eq!(hunks[1].lines, vec!["+first", "+second", " t", " u"]);
    }

    #[test]
    fn test_parse_hunk_header_with_section() {
        let header = parse_hunk_header("@@ -10,7 +12,9 @@ fn main() {").unwrap();
        assert_eq!(
            header,
            HunkHeader {
                old_count: 7,
                new_start: 12,
                new_count: 9
            }
        );
    }

    #[test]
    fn test_patch_lines_numbering() {
        let lines: Vec<_> = PatchLines::new(SINGLE_HUNK)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[2].kind, LineKind::Added);
        assert_eq!(lines[2].new_line, Some(2));
        assert_eq!(lines[4].new_line, Some(4));
        assert_eq!(lines[4].position, Some(pos(4)));
    }
}
