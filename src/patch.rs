//! Patches, their authors, and the results of applying them.

use crate::binary::BinaryFileChange;
use crate::error::{map_io_error, PatchError};
use log::trace;
use once_cell::unsync::OnceCell;
use similar::TextDiff;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use thiserror::Error;

/// The author of a patch or commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchAuthor {
    /// The full name of the author.
    pub full_name: String,
    /// The e-mail address of the author.
    pub email: String,
}

impl PatchAuthor {
    /// Creates an author from a full name and an e-mail address.
    pub fn new(full_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            email: email.into(),
        }
    }
}

impl fmt::Display for PatchAuthor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.full_name, self.email)
    }
}

/// An author string was not in the `Full Name <email>` form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Author '{0}' must be in the form 'Full Name <email@example.com>'")]
pub struct ParseAuthorError(String);

impl FromStr for PatchAuthor {
    type Err = ParseAuthorError;

    /// Parses `Full Name <email>`.
    ///
    /// ```
    /// # use revpatch::PatchAuthor;
    /// let author: PatchAuthor = "Jane Doe <jane@example.com>".parse().unwrap();
    /// assert_eq!(author, PatchAuthor::new("Jane Doe", "jane@example.com"));
    /// assert!("jane@example.com".parse::<PatchAuthor>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseAuthorError(s.to_string());
        let s_trimmed = s.trim();
        let open = s_trimmed.rfind('<').ok_or_else(err)?;
        let email = s_trimmed[open + 1..]
            .strip_suffix('>')
            .ok_or_else(err)?
            .trim();
        let full_name = s_trimmed[..open].trim();
        if full_name.is_empty() || email.is_empty() {
            return Err(err());
        }
        Ok(PatchAuthor::new(full_name, email))
    }
}

#[derive(Clone)]
enum PatchSource {
    Content(Vec<u8>),
    Path(PathBuf),
}

/// A patch to a repository that can be applied.
///
/// This consolidates metadata on the patch (the author and message) with what
/// is needed to apply it: the base directory within the repository the diff
/// was generated in, the prefix strip level, the diff content, and any binary
/// file changes the diff can't express.
///
/// The content source (in-memory bytes or a file path) is fixed at
/// construction. Use [`Patch::open`] to read it.
pub struct Patch {
    /// The author of the patch, if known.
    pub author: Option<PatchAuthor>,
    /// The commit message describing the patch, if known.
    pub message: Option<String>,
    /// The directory in the repository where the patch was generated.
    pub base_dir: Option<String>,
    /// The number of leading path components to strip (`patch -p<N>`).
    ///
    /// `None` lets the patcher compute a default.
    pub prefix_level: Option<u32>,
    /// Binary file changes to apply alongside the text diff.
    pub binary_changes: Vec<BinaryFileChange>,
    source: PatchSource,
}

impl Patch {
    /// Creates a patch from in-memory diff content.
    pub fn from_content(content: impl Into<Vec<u8>>) -> Self {
        Self::with_source(PatchSource::Content(content.into()))
    }

    /// Creates a patch backed by a diff file on disk.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::with_source(PatchSource::Path(path.into()))
    }

    /// Creates a new `Patch` by comparing two texts.
    ///
    /// The generated diff uses bare file names in the `---`/`+++` headers, so
    /// it applies with a prefix level of `0`, which is set on the patch.
    ///
    /// # Example
    ///
    /// ```
    /// # use revpatch::Patch;
    /// let patch = Patch::from_texts("hello.txt", "1\n", "2\n", 3);
    /// let opened = patch.open().unwrap();
    /// let content = String::from_utf8_lossy(opened.content().unwrap()).into_owned();
    /// assert!(content.starts_with("--- hello.txt\n+++ hello.txt\n"));
    /// assert!(content.contains("-1\n+2\n"));
    /// assert_eq!(patch.prefix_level, Some(0));
    /// ```
    pub fn from_texts(file_path: &str, old_text: &str, new_text: &str, context_len: usize) -> Self {
        let diff = TextDiff::from_lines(old_text, new_text);
        let diff_text = diff
            .unified_diff()
            .context_radius(context_len)
            .header(file_path, file_path)
            .to_string();
        Self::from_content(diff_text).with_prefix_level(0)
    }

    fn with_source(source: PatchSource) -> Self {
        Self {
            author: None,
            message: None,
            base_dir: None,
            prefix_level: None,
            binary_changes: Vec::new(),
            source,
        }
    }

    /// Sets the author of the patch.
    pub fn with_author(mut self, author: PatchAuthor) -> Self {
        self.author = Some(author);
        self
    }

    /// Sets the commit message describing the patch.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the directory in the repository the patch was generated in.
    pub fn with_base_dir(mut self, base_dir: impl Into<String>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Sets an explicit prefix strip level, overriding any default.
    pub fn with_prefix_level(mut self, prefix_level: u32) -> Self {
        self.prefix_level = Some(prefix_level);
        self
    }

    /// Adds a binary file change to apply after the text diff.
    pub fn with_binary_change(mut self, change: BinaryFileChange) -> Self {
        self.binary_changes.push(change);
        self
    }

    /// The on-disk path of the patch, if it was created from one.
    pub fn source_path(&self) -> Option<&Path> {
        match &self.source {
            PatchSource::Path(path) => Some(path),
            PatchSource::Content(_) => None,
        }
    }

    /// Opens the patch for reading.
    ///
    /// The returned handle lazily provides the content and a file path for
    /// it. If the patch only has in-memory content, the path is a temporary
    /// file that is deleted when the handle is dropped.
    pub fn open(&self) -> Result<OpenedPatch<'_>, PatchError> {
        if let PatchSource::Path(path) = &self.source {
            if !path.is_file() {
                return Err(PatchError::Io {
                    path: path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "patch file does not exist",
                    ),
                });
            }
        }
        Ok(OpenedPatch {
            patch: self,
            content: OnceCell::new(),
            temp_file: OnceCell::new(),
        })
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Patch");
        match &self.source {
            PatchSource::Path(path) => s.field("path", path),
            PatchSource::Content(content) => {
                let preview = String::from_utf8_lossy(&content[..content.len().min(30)]);
                s.field("content", &format!("{}[...]", preview))
            }
        };
        s.field("base_dir", &self.base_dir)
            .field("prefix_level", &self.prefix_level)
            .field("author", &self.author)
            .field("message", &self.message)
            .field("binary_changes", &self.binary_changes.len())
            .finish()
    }
}

/// A [`Patch`] opened for reading.
///
/// Any temporary state is cleaned up when this is dropped.
pub struct OpenedPatch<'a> {
    patch: &'a Patch,
    content: OnceCell<Vec<u8>>,
    temp_file: OnceCell<NamedTempFile>,
}

impl<'a> OpenedPatch<'a> {
    /// The patch this handle was opened from.
    pub fn patch(&self) -> &'a Patch {
        self.patch
    }

    /// The raw diff content.
    pub fn content(&self) -> Result<&[u8], PatchError> {
        match &self.patch.source {
            PatchSource::Content(content) => Ok(content),
            PatchSource::Path(path) => self
                .content
                .get_or_try_init(|| {
                    trace!("  Reading patch file '{}'", path.display());
                    fs::read(path).map_err(|e| map_io_error(path.clone(), e))
                })
                .map(Vec::as_slice),
        }
    }

    /// A path to the diff content on disk.
    ///
    /// This may be a temporary file that only lives as long as this handle.
    pub fn path(&self) -> Result<&Path, PatchError> {
        match &self.patch.source {
            PatchSource::Path(path) => Ok(path),
            PatchSource::Content(content) => self
                .temp_file
                .get_or_try_init(|| write_temp_patch(content))
                .map(NamedTempFile::path),
        }
    }

    /// Whether the patch has any textual diff content to hand to a patch tool.
    pub fn has_text_changes(&self) -> Result<bool, PatchError> {
        Ok(!self.content()?.trim_ascii().is_empty())
    }
}

fn write_temp_patch(content: &[u8]) -> Result<NamedTempFile, PatchError> {
    let temp_dir = std::env::temp_dir();
    let mut file = tempfile::Builder::new()
        .prefix("revpatch-")
        .suffix(".diff")
        .tempfile()
        .map_err(|e| map_io_error(temp_dir.clone(), e))?;
    file.write_all(content)
        .and_then(|_| file.flush())
        .map_err(|e| map_io_error(file.path().to_path_buf(), e))?;
    trace!(
        "  Wrote {} bytes of patch content to '{}'",
        content.len(),
        file.path().display()
    );
    Ok(file)
}

/// The result of a patch operation.
///
/// This stores whether the patch applied (fully or partially), whether there
/// were conflicts and in which files, the patch tool's output, and which
/// binary files were written or failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchResult {
    /// Whether any file was modified, even partially.
    ///
    /// Check [`success`](Self::success) for a clean application.
    pub applied: bool,
    /// Whether the applied patch included conflicts.
    pub has_conflicts: bool,
    /// The files containing conflicts, in the order they were reported.
    pub conflicting_files: Vec<String>,
    /// The combined stdout/stderr of the patch tool.
    pub patch_output: Vec<u8>,
    /// The 1-based, inclusive range of patches this result represents.
    pub patch_range: (usize, usize),
    /// The index of the patch in the patcher's input list, if known.
    pub patch_index: Option<usize>,
    /// Binary files that were written, moved, or removed.
    pub binary_applied: Vec<String>,
    /// Binary files that failed to apply, with the reason.
    pub binary_failed: BTreeMap<String, String>,
}

impl PatchResult {
    /// Creates a result with no conflicts, output, or binary changes.
    pub fn new(applied: bool, patch_range: (usize, usize)) -> Self {
        Self {
            applied,
            has_conflicts: false,
            conflicting_files: Vec::new(),
            patch_output: Vec::new(),
            patch_range,
            patch_index: None,
            binary_applied: Vec::new(),
            binary_failed: BTreeMap::new(),
        }
    }

    /// Whether this was a successful patch application.
    ///
    /// # Example
    ///
    /// ```
    /// # use revpatch::PatchResult;
    /// let mut result = PatchResult::new(true, (1, 1));
    /// assert!(result.success());
    ///
    /// result.binary_failed.insert("logo.png".into(), "download failed".into());
    /// assert!(!result.success());
    /// ```
    pub fn success(&self) -> bool {
        self.applied && !self.has_conflicts && self.binary_failed.is_empty()
    }

    /// The patch tool output, decoded lossily and trimmed.
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(self.patch_output.trim_ascii()).into_owned()
    }
}
