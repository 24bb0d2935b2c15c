//! Classification of raw `patch` tool output.
//!
//! GNU patch and BSD/Apple patch report the same events with different
//! wording. Each wording is described by a [`PatchDialect`], and an
//! [`OutputClassifier`] runs any number of dialects over the output to build
//! a single [`ParsedPatchOutput`].

use log::trace;
use once_cell::sync::Lazy;
use regex::bytes::{Captures, Regex};

/// Conflict lines are worded the same by every supported implementation,
/// differing only in case and spacing around `--`.
const CONFLICTS_PATTERN: &str = r"(?-u)(?P<num_hunks>\d+) out of (?P<total_hunks>\d+) hunks? (?:failed|FAILED)\s?--\s?saving rejects to (?:file )?(?P<filename>.+)\.rej";

static GNU_DIALECT: Lazy<PatchDialect> = Lazy::new(|| {
    PatchDialect::new(
        "gnu",
        r"(?-u)patching file (?P<filename>.+)",
        CONFLICTS_PATTERN,
        r"(?-u)[A-Za-z0-9_-]+: \*{4} Only garbage was found in the patch input\.",
        r"(?s-u)[A-Za-z0-9_-]+: \*{4}.*",
    )
    .expect("valid GNU patch regexes")
});

static BSD_DIALECT: Lazy<PatchDialect> = Lazy::new(|| {
    PatchDialect::new(
        "bsd",
        r"(?m-u)Patching file (?P<filename>.+?)(?: using Plan [A-Z]\.\.\.)?$",
        CONFLICTS_PATTERN,
        r"(?-u)I can't seem to find a patch in there anywhere\.",
        r"(?s-u)I can't seem to find a patch in there anywhere\..*",
    )
    .expect("valid BSD patch regexes")
});

/// The four patterns that describe one `patch` implementation's output.
///
/// `patching_file` and `conflicts` must have a `filename` capture group.
/// `conflicts` should also have `num_hunks` and `total_hunks` groups so that
/// partially applied files can be detected.
#[derive(Debug, Clone)]
pub struct PatchDialect {
    name: String,
    patching_file: Regex,
    conflicts: Regex,
    empty_files: Regex,
    fatal_error: Regex,
}

impl PatchDialect {
    /// Builds a dialect from its patterns.
    ///
    /// # Example
    ///
    /// ```
    /// # use revpatch::{OutputClassifier, PatchDialect};
    /// let dialect = PatchDialect::new(
    ///     "busybox",
    ///     r"patching file (?P<filename>.+)",
    ///     r"(?P<num_hunks>\d+) of (?P<total_hunks>\d+) hunks? FAILED in (?P<filename>.+)\.rej",
    ///     r"no patch found",
    ///     r"(?s)patch: can't.*",
    /// )
    /// .unwrap();
    ///
    /// let classifier = OutputClassifier::new(vec![dialect]);
    /// let parsed = classifier.classify(b"patching file a.c\n1 of 2 hunks FAILED in a.c.rej\n");
    /// assert_eq!(parsed.conflicting_files, vec!["a.c"]);
    /// assert!(parsed.has_partial_applied_files);
    /// ```
    pub fn new(
        name: impl Into<String>,
        patching_file: &str,
        conflicts: &str,
        empty_files: &str,
        fatal_error: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            patching_file: Regex::new(patching_file)?,
            conflicts: Regex::new(conflicts)?,
            empty_files: Regex::new(empty_files)?,
            fatal_error: Regex::new(fatal_error)?,
        })
    }

    /// GNU patch.
    pub fn gnu() -> Self {
        GNU_DIALECT.clone()
    }

    /// BSD and Apple patch.
    pub fn bsd() -> Self {
        BSD_DIALECT.clone()
    }

    /// The name the dialect was created with.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Information parsed from `patch` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPatchOutput {
    /// Files that had conflicts, in the order they were reported.
    pub conflicting_files: Vec<String>,
    /// The fatal error text, from the error marker to the end of the output.
    pub fatal_error: Option<String>,
    /// Whether the patch contained nothing but empty files (or garbage).
    pub has_empty_files: bool,
    /// Whether some hunks applied while others failed.
    pub has_partial_applied_files: bool,
    /// Files that the tool reported patching, in order.
    pub patched_files: Vec<String>,
}

/// Turns raw `patch` output into a [`ParsedPatchOutput`].
#[derive(Debug, Clone)]
pub struct OutputClassifier {
    dialects: Vec<PatchDialect>,
}

impl Default for OutputClassifier {
    /// A classifier that understands both GNU and BSD/Apple patch.
    fn default() -> Self {
        Self::new(vec![PatchDialect::gnu(), PatchDialect::bsd()])
    }
}

impl OutputClassifier {
    /// Creates a classifier that runs each of `dialects` over the output.
    pub fn new(dialects: Vec<PatchDialect>) -> Self {
        Self { dialects }
    }

    /// The dialects this classifier understands.
    pub fn dialects(&self) -> &[PatchDialect] {
        &self.dialects
    }

    /// Parses the output of a patch run.
    ///
    /// Output is trimmed before matching. When several dialects match at the
    /// same position, the match is counted once.
    ///
    /// # Example
    ///
    /// ```
    /// # use revpatch::OutputClassifier;
    /// let output = b"patching file foo.txt\n\
    ///                patching file bar.txt\n\
    ///                2 out of 2 hunks failed--saving rejects to bar.txt.rej\n";
    ///
    /// let parsed = OutputClassifier::default().classify(output);
    /// assert_eq!(parsed.patched_files, vec!["foo.txt", "bar.txt"]);
    /// assert_eq!(parsed.conflicting_files, vec!["bar.txt"]);
    /// assert!(parsed.has_partial_applied_files);
    /// assert_eq!(parsed.fatal_error, None);
    /// ```
    pub fn classify(&self, raw_output: &[u8]) -> ParsedPatchOutput {
        let output = raw_output.trim_ascii();

        let patched_files: Vec<String> = self
            .matches(output, |d| &d.patching_file)
            .into_iter()
            .map(|(_, caps)| capture_filename(&caps))
            .collect();

        let mut conflicting_files = Vec::new();
        let mut has_partial_applied_files = false;
        for (_, caps) in self.matches(output, |d| &d.conflicts) {
            if let (Some(num), Some(total)) = (caps.name("num_hunks"), caps.name("total_hunks")) {
                if num.as_bytes() != total.as_bytes() {
                    has_partial_applied_files = true;
                }
            }
            conflicting_files.push(capture_filename(&caps));
        }

        // Every hunk in each conflicting file failed. If other files were
        // patched cleanly, the patch as a whole still partially applied.
        if !has_partial_applied_files && !conflicting_files.is_empty() {
            has_partial_applied_files = conflicting_files.len() != patched_files.len();
        }

        let has_empty_files = self
            .dialects
            .iter()
            .any(|d| d.empty_files.is_match(output));

        let fatal_error = self
            .dialects
            .iter()
            .filter_map(|d| d.fatal_error.find(output))
            .min_by_key(|m| m.start())
            .map(|m| String::from_utf8_lossy(&output[m.start()..]).into_owned());

        let parsed = ParsedPatchOutput {
            conflicting_files,
            fatal_error,
            has_empty_files,
            has_partial_applied_files,
            patched_files,
        };
        trace!("  Classified patch output: {:?}", parsed);
        parsed
    }

    /// All matches of one pattern across dialects, ordered by position, with
    /// duplicates at the same position removed.
    fn matches<'h>(
        &self,
        output: &'h [u8],
        pattern: impl Fn(&PatchDialect) -> &Regex,
    ) -> Vec<(usize, Captures<'h>)> {
        let mut found: Vec<(usize, Captures<'h>)> = self
            .dialects
            .iter()
            .flat_map(|d| pattern(d).captures_iter(output))
            .filter_map(|caps| caps.get(0).map(|m| (m.start(), caps)))
            .collect();
        found.sort_by_key(|(start, _)| *start);
        found.dedup_by_key(|(start, _)| *start);
        found
    }
}

/// Parses `patch` output with the default GNU and BSD/Apple dialects.
pub fn parse_patch_output(raw_output: &[u8]) -> ParsedPatchOutput {
    OutputClassifier::default().classify(raw_output)
}

fn capture_filename(caps: &Captures<'_>) -> String {
    let raw = caps
        .name("filename")
        .map(|m| String::from_utf8_lossy(m.as_bytes()))
        .unwrap_or_default();
    let name = raw.trim_end();
    // GNU patch reports git renames and copies as `new (renamed from old)`.
    let name = name
        .strip_suffix(')')
        .and_then(|rest| {
            [" (renamed from ", " (copied from "]
                .iter()
                .find_map(|marker| rest.split_once(*marker))
        })
        .map_or(name, |(new_name, _)| new_name);
    // GNU patch quotes names that contain spaces or special characters.
    let name = name.strip_prefix('\'').unwrap_or(name);
    let name = name.strip_suffix('\'').unwrap_or(name);
    name.to_string()
}
