//! Binary file changes, which a text patch tool can't represent.
//!
//! Each [`BinaryFileChange`] carries its own lazily loaded content. Loading
//! happens at most once per change, and the outcome (including a failure) is
//! cached, so a change that failed to download isn't fetched again.

use crate::error::{map_io_error, BinaryContentError, PatchError};
use log::{debug, trace, warn};
use once_cell::unsync::OnceCell;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// What a binary file change does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryFileStatus {
    /// A new file is written at `new_path`.
    Added,
    /// The file at `old_path` is removed.
    Deleted,
    /// The file at `new_path` is overwritten.
    Modified,
    /// The file at `old_path` is renamed to `new_path` and overwritten.
    Moved,
}

impl BinaryFileStatus {
    /// The lowercase name of the status, as used in diffs and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryFileStatus::Added => "added",
            BinaryFileStatus::Deleted => "deleted",
            BinaryFileStatus::Modified => "modified",
            BinaryFileStatus::Moved => "moved",
        }
    }

    /// Whether content is needed to apply a change with this status.
    pub fn requires_content(&self) -> bool {
        !matches!(self, BinaryFileStatus::Deleted)
    }
}

impl fmt::Display for BinaryFileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BinaryFileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(BinaryFileStatus::Added),
            "deleted" => Ok(BinaryFileStatus::Deleted),
            "modified" => Ok(BinaryFileStatus::Modified),
            "moved" => Ok(BinaryFileStatus::Moved),
            other => Err(format!("Unknown binary file status '{}'", other)),
        }
    }
}

type ContentLoader = Box<dyn Fn() -> Result<Vec<u8>, String>>;

/// A single binary file operation.
///
/// The content is the bytes to write at the destination of the operation
/// (`new_path`, or `old_path` when reverting a deletion).
pub struct BinaryFileChange {
    /// The path before the change, relative to the tree root.
    pub old_path: Option<String>,
    /// The path after the change, relative to the tree root.
    pub new_path: Option<String>,
    /// What the change does.
    pub status: BinaryFileStatus,
    loader: Option<ContentLoader>,
    content: OnceCell<Result<Vec<u8>, BinaryContentError>>,
}

impl BinaryFileChange {
    /// Creates a change with no content attached.
    pub fn new(status: BinaryFileStatus, old_path: Option<String>, new_path: Option<String>) -> Self {
        Self {
            old_path,
            new_path,
            status,
            loader: None,
            content: OnceCell::new(),
        }
    }

    /// A file added at `path`.
    pub fn added(path: impl Into<String>) -> Self {
        Self::new(BinaryFileStatus::Added, None, Some(path.into()))
    }

    /// A file removed from `path`.
    pub fn deleted(path: impl Into<String>) -> Self {
        Self::new(BinaryFileStatus::Deleted, Some(path.into()), None)
    }

    /// A file changed in place at `path`.
    pub fn modified(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(BinaryFileStatus::Modified, Some(path.clone()), Some(path))
    }

    /// A file moved from `old_path` to `new_path`.
    pub fn moved(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
        Self::new(
            BinaryFileStatus::Moved,
            Some(old_path.into()),
            Some(new_path.into()),
        )
    }

    /// Attaches content that is already in memory.
    pub fn with_content(self, content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: OnceCell::with_value(Ok(content.into())),
            loader: None,
            ..self
        }
    }

    /// Attaches content read from a local file on first access.
    pub fn with_content_path(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.with_content_loader(move || {
            fs::read(&path).map_err(|e| format!("could not read '{}': {}", path.display(), e))
        })
    }

    /// Attaches a loader (for example, a download) that runs on first access.
    ///
    /// # Example
    ///
    /// ```
    /// # use revpatch::BinaryFileChange;
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// let calls = Rc::new(Cell::new(0));
    /// let counter = calls.clone();
    /// let change = BinaryFileChange::added("logo.png").with_content_loader(move || {
    ///     counter.set(counter.get() + 1);
    ///     Err("server returned 404".to_string())
    /// });
    ///
    /// assert!(change.content().is_err());
    /// assert!(change.content().is_err());
    /// assert_eq!(calls.get(), 1);
    /// ```
    pub fn with_content_loader<F>(self, loader: F) -> Self
    where
        F: Fn() -> Result<Vec<u8>, String> + 'static,
    {
        Self {
            loader: Some(Box::new(loader)),
            content: OnceCell::new(),
            ..self
        }
    }

    /// The content of the file, loading it on first access.
    pub fn content(&self) -> Result<&[u8], BinaryContentError> {
        self.content
            .get_or_init(|| match &self.loader {
                Some(loader) => {
                    debug!("  Loading content for binary file '{}'", self.display_path());
                    loader().map_err(BinaryContentError::Load)
                }
                None => Err(BinaryContentError::Missing),
            })
            .as_ref()
            .map(Vec::as_slice)
            .map_err(Clone::clone)
    }

    /// The path used to identify this change in results and logs.
    pub fn display_path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or("<unknown>")
    }

    fn required_old_path(&self) -> Result<&str, PatchError> {
        self.old_path.as_deref().ok_or(PatchError::MissingBinaryPath {
            status: self.status,
            which: "old",
        })
    }

    fn required_new_path(&self) -> Result<&str, PatchError> {
        self.new_path.as_deref().ok_or(PatchError::MissingBinaryPath {
            status: self.status,
            which: "new",
        })
    }

    fn required_content(&self) -> Result<&[u8], PatchError> {
        self.content().map_err(|source| PatchError::BinaryContent {
            path: self.display_path().to_string(),
            source,
        })
    }
}

impl fmt::Debug for BinaryFileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryFileChange")
            .field("status", &self.status)
            .field("old_path", &self.old_path)
            .field("new_path", &self.new_path)
            .field("content_loaded", &self.content.get().is_some())
            .finish()
    }
}

/// Applies a single binary change beneath `dest_path`.
///
/// When `revert` is set the change is undone instead: additions are removed,
/// deletions restored, and moves renamed back.
///
/// Returns the path that was written or removed, relative to `dest_path`.
pub fn apply_binary_change(
    change: &BinaryFileChange,
    dest_path: &Path,
    revert: bool,
) -> Result<String, PatchError> {
    use BinaryFileStatus::*;

    trace!(
        "  Applying binary change ({}{}) for '{}'",
        change.status,
        if revert { ", reverted" } else { "" },
        change.display_path()
    );

    match (change.status, revert) {
        (Deleted, false) => remove_file(dest_path, change.required_old_path()?),
        (Added, true) => remove_file(dest_path, change.required_new_path()?),
        (Added, false) | (Modified, _) => {
            let path = change.required_new_path()?;
            write_file(dest_path, path, change.required_content()?)?;
            Ok(path.to_string())
        }
        (Deleted, true) => {
            let path = change.required_old_path()?;
            write_file(dest_path, path, change.required_content()?)?;
            Ok(path.to_string())
        }
        (Moved, _) => {
            let (from, to) = if revert {
                (change.required_new_path()?, change.required_old_path()?)
            } else {
                (change.required_old_path()?, change.required_new_path()?)
            };
            let content = change.required_content()?;
            let from_path = dest_path.join(ensure_relative_path(Path::new(from))?);
            let to_path = ensure_path_is_safe(dest_path, Path::new(to))?;
            // A git rename header in the text diff makes `patch` do the move itself.
            if !from_path.exists() && to_path.exists() {
                warn!(
                    "  Binary file '{}' was already moved to '{}'; writing its content in place.",
                    from, to
                );
            } else {
                fs::rename(&from_path, &to_path)
                    .map_err(|e| map_io_error(from_path.clone(), e))?;
            }
            write_file(dest_path, to, content)?;
            Ok(to.to_string())
        }
    }
}

/// Removes a file, treating an already-missing file as removed.
///
/// A missing file is logged but still counts as applied: the tree is already in
/// the state the deletion asks for.
fn remove_file(dest_path: &Path, relative: &str) -> Result<String, PatchError> {
    let full_path = dest_path.join(ensure_relative_path(Path::new(relative))?);
    match fs::remove_file(&full_path) {
        Ok(()) => {
            debug!("  Removed binary file '{}'", relative);
            Ok(relative.to_string())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "  Binary file '{}' was already removed; treating the deletion as applied.",
                relative
            );
            Ok(relative.to_string())
        }
        Err(e) => Err(map_io_error(full_path, e)),
    }
}

fn write_file(dest_path: &Path, relative: &str, content: &[u8]) -> Result<(), PatchError> {
    let full_path = ensure_path_is_safe(dest_path, Path::new(relative))?;
    if full_path.is_dir() {
        return Err(PatchError::TargetIsDirectory { path: full_path });
    }
    fs::write(&full_path, content).map_err(|e| map_io_error(full_path.clone(), e))?;
    debug!("  Wrote {} bytes to binary file '{}'", content.len(), relative);
    Ok(())
}

/// Rejects absolute paths and paths that climb above their starting point.
fn ensure_relative_path(relative_path: &Path) -> Result<&Path, PatchError> {
    let mut depth: usize = 0;
    for component in relative_path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir if depth > 0 => depth -= 1,
            _ => return Err(PatchError::PathTraversal(relative_path.to_path_buf())),
        }
    }
    Ok(relative_path)
}

/// Ensures a relative path, when joined to a base directory, resolves to a
/// location that is still inside that base directory.
///
/// Parent directories of the target are created as needed. Both the base
/// directory and the target's parent are canonicalized, so symlinks can't be
/// used to escape the tree.
///
/// # Example
///
/// ```
/// # use revpatch::{ensure_path_is_safe, PatchError};
/// # use std::path::Path;
/// # use std::fs;
/// # use tempfile::tempdir;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempdir()?;
/// let base_dir = dir.path();
///
/// let resolved_path = ensure_path_is_safe(base_dir, Path::new("images/logo.png"))?;
/// assert!(resolved_path.starts_with(fs::canonicalize(base_dir)?));
/// assert!(base_dir.join("images").is_dir());
///
/// let result = ensure_path_is_safe(base_dir, Path::new("../secret.txt"));
/// assert!(matches!(result, Err(PatchError::PathTraversal(_))));
/// # Ok(())
/// # }
/// ```
pub fn ensure_path_is_safe(base_dir: &Path, relative_path: &Path) -> Result<PathBuf, PatchError> {
    trace!(
        "  Checking path safety for base '{}' and relative path '{}'",
        base_dir.display(),
        relative_path.display()
    );
    ensure_relative_path(relative_path)?;
    let base_path =
        fs::canonicalize(base_dir).map_err(|e| map_io_error(base_dir.to_path_buf(), e))?;
    let target_file_path = base_dir.join(relative_path);
    let parent = target_file_path.parent().unwrap_or(Path::new(""));
    fs::create_dir_all(parent).map_err(|e| map_io_error(parent.to_path_buf(), e))?;
    let final_path = fs::canonicalize(parent)
        .map_err(|e| map_io_error(parent.to_path_buf(), e))?
        .join(target_file_path.file_name().unwrap_or_default());
    if !final_path.starts_with(&base_path) {
        return Err(PatchError::PathTraversal(relative_path.to_path_buf()));
    }
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::tempdir;

    #[test]
    fn deleted_never_needs_content() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("old.bin"), [0u8, 1, 2]).unwrap();

        let change = BinaryFileChange::deleted("old.bin");
        assert_eq!(apply_binary_change(&change, dir.path(), false).unwrap(), "old.bin");
        assert!(!dir.path().join("old.bin").exists());
        // Nothing ever tried to load content.
        assert!(change.content.get().is_none());
    }

    #[test]
    fn deleting_missing_file_counts_as_applied() {
        let dir = tempdir().unwrap();
        let change = BinaryFileChange::deleted("gone/already.bin");
        assert_eq!(
            apply_binary_change(&change, dir.path(), false).unwrap(),
            "gone/already.bin"
        );
    }

    #[test]
    fn added_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let change = BinaryFileChange::added("assets/img/logo.png").with_content(vec![0x89, b'P']);
        apply_binary_change(&change, dir.path(), false).unwrap();
        assert_eq!(
            fs::read(dir.path().join("assets/img/logo.png")).unwrap(),
            vec![0x89, b'P']
        );
    }

    #[test]
    fn added_without_content_fails() {
        let dir = tempdir().unwrap();
        let change = BinaryFileChange::added("logo.png");
        let err = apply_binary_change(&change, dir.path(), false).unwrap_err();
        assert!(matches!(
            err,
            PatchError::BinaryContent {
                source: BinaryContentError::Missing,
                ..
            }
        ));
        assert!(!dir.path().join("logo.png").exists());
    }

    #[test]
    fn moved_renames_then_writes_content() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), b"old").unwrap();

        let change = BinaryFileChange::moved("a.bin", "sub/b.bin").with_content(b"new".to_vec());
        assert_eq!(apply_binary_change(&change, dir.path(), false).unwrap(), "sub/b.bin");
        assert!(!dir.path().join("a.bin").exists());
        assert_eq!(fs::read(dir.path().join("sub/b.bin")).unwrap(), b"new");
    }

    #[test]
    fn moved_without_source_file_fails() {
        let dir = tempdir().unwrap();
        let change = BinaryFileChange::moved("a.bin", "b.bin").with_content(b"x".to_vec());
        assert!(matches!(
            apply_binary_change(&change, dir.path(), false),
            Err(PatchError::Io { .. })
        ));
    }

    #[test]
    fn moved_onto_already_renamed_file_writes_content() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.bin"), b"stale").unwrap();

        let change = BinaryFileChange::moved("a.bin", "b.bin").with_content(b"fresh".to_vec());
        assert_eq!(apply_binary_change(&change, dir.path(), false).unwrap(), "b.bin");
        assert_eq!(fs::read(dir.path().join("b.bin")).unwrap(), b"fresh");
        assert!(!dir.path().join("a.bin").exists());
    }

    #[test]
    fn revert_inverts_added_and_moved() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("new.bin"), b"data").unwrap();
        let added = BinaryFileChange::added("new.bin");
        apply_binary_change(&added, dir.path(), true).unwrap();
        assert!(!dir.path().join("new.bin").exists());

        fs::write(dir.path().join("b.bin"), b"moved").unwrap();
        let moved = BinaryFileChange::moved("a.bin", "b.bin").with_content(b"orig".to_vec());
        assert_eq!(apply_binary_change(&moved, dir.path(), true).unwrap(), "a.bin");
        assert_eq!(fs::read(dir.path().join("a.bin")).unwrap(), b"orig");
        assert!(!dir.path().join("b.bin").exists());
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = tempdir().unwrap();
        let change = BinaryFileChange::added("../escape.bin").with_content(b"x".to_vec());
        assert!(matches!(
            apply_binary_change(&change, dir.path(), false),
            Err(PatchError::PathTraversal(_))
        ));

        let change = BinaryFileChange::deleted("/etc/passwd");
        assert!(matches!(
            apply_binary_change(&change, dir.path(), false),
            Err(PatchError::PathTraversal(_))
        ));
    }

    #[test]
    fn content_is_loaded_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let change = BinaryFileChange::modified("x.bin").with_content_loader(move || {
            counter.set(counter.get() + 1);
            Ok(b"payload".to_vec())
        });
        assert_eq!(change.content().unwrap(), b"payload");
        assert_eq!(change.content().unwrap(), b"payload");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn content_path_reports_read_errors() {
        let dir = tempdir().unwrap();
        let change =
            BinaryFileChange::added("x.bin").with_content_path(dir.path().join("missing.bin"));
        assert!(matches!(change.content(), Err(BinaryContentError::Load(_))));
    }

    #[test]
    fn status_parses_from_str() {
        assert_eq!("moved".parse::<BinaryFileStatus>(), Ok(BinaryFileStatus::Moved));
        assert!("renamed".parse::<BinaryFileStatus>().is_err());
        assert!(!BinaryFileStatus::Deleted.requires_content());
    }
}
