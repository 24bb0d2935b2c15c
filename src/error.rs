//! Error types for patch files, patch application, and SCM operations.

use crate::patch::PatchResult;
use std::path::PathBuf;
use thiserror::Error;

/// Represents errors that can occur while reading, materializing, or writing
/// files on behalf of a patch.
#[derive(Error, Debug)]
pub enum PatchError {
    /// The patch attempted to access a path outside the target directory.
    /// This is a security measure to prevent malicious patches from modifying
    /// unintended files (e.g., `../../etc/passwd`).
    #[error("Path '{0}' resolves outside the target directory. Aborting for security.")]
    PathTraversal(PathBuf),
    /// The user does not have permission to read or write to the specified path.
    #[error("Permission denied for path: {path:?}")]
    PermissionDenied { path: PathBuf },
    /// The target path exists but is a directory, not a file.
    #[error("Target path is a directory, not a file: {path:?}")]
    TargetIsDirectory { path: PathBuf },
    /// A binary file change did not carry the path its status requires.
    #[error("Binary file change with status '{status}' is missing its {which} path")]
    MissingBinaryPath {
        status: crate::binary::BinaryFileStatus,
        which: &'static str,
    },
    /// The content for a binary file change could not be loaded.
    #[error("Content for binary file '{path}' is unavailable: {source}")]
    BinaryContent {
        path: String,
        #[source]
        source: BinaryContentError,
    },
    /// An I/O error occurred while reading or writing a file.
    #[error("I/O error while processing {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The reason the content of a binary file change could not be resolved.
///
/// This is cached alongside successful loads, so it must be cheap to clone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BinaryContentError {
    /// No content source was ever attached to the change.
    #[error("no content source was provided")]
    Missing,
    /// The content loader ran and failed.
    #[error("{0}")]
    Load(String),
}

/// The category of an [`ApplyPatchError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyPatchErrorKind {
    /// Some files were modified, but hunks in at least one file conflicted.
    Conflicts,
    /// The text portion applied, but one or more binary files failed.
    BinaryFiles,
    /// Nothing was applied. The patch may be stale or target missing files.
    NotApplied,
    /// The patch tool rejected the input itself as malformed.
    Fatal {
        /// The trimmed output of the patch tool.
        output: String,
    },
}

/// A patch (or range of patches) failed to apply or revert.
///
/// The rendered message names the failing patch relative to the total, e.g.
/// `Could not apply patch 2 of 3. ...` or `... patches 2-4 of 5 ...`.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ApplyPatchError {
    /// What kind of failure occurred.
    pub kind: ApplyPatchErrorKind,
    /// The result of the failed patch, when the failure happened while patching.
    pub failed_patch_result: Option<PatchResult>,
    /// The total number of patches in the run.
    pub total_patches: usize,
    message: String,
}

impl ApplyPatchError {
    /// Builds an error for a failed patch result, rendering the message for
    /// the given total and direction.
    ///
    /// # Example
    ///
    /// ```
    /// # use revpatch::{ApplyPatchError, ApplyPatchErrorKind, PatchResult};
    /// let result = PatchResult::new(false, (2, 2));
    /// let error = ApplyPatchError::new(ApplyPatchErrorKind::NotApplied, Some(result), 2, false);
    /// assert_eq!(
    ///     error.to_string(),
    ///     "Could not apply patch 2 of 2. The patch may be invalid, or there may be \
    ///      conflicts that could not be resolved."
    /// );
    /// ```
    pub fn new(
        kind: ApplyPatchErrorKind,
        failed_patch_result: Option<PatchResult>,
        total_patches: usize,
        revert: bool,
    ) -> Self {
        let subject = match &failed_patch_result {
            Some(result) => patch_subject(result.patch_range, total_patches),
            None => format!("{} patches", total_patches),
        };
        let message = render_message(&kind, &subject, revert);
        Self {
            kind,
            failed_patch_result,
            total_patches,
            message,
        }
    }

    /// Picks the error kind for an unsuccessful (non-fatal) result.
    pub(crate) fn for_result(result: PatchResult, total_patches: usize, revert: bool) -> Self {
        let kind = if result.applied && result.has_conflicts {
            ApplyPatchErrorKind::Conflicts
        } else if result.applied && !result.binary_failed.is_empty() {
            ApplyPatchErrorKind::BinaryFiles
        } else {
            ApplyPatchErrorKind::NotApplied
        };
        Self::new(kind, Some(result), total_patches, revert)
    }

    /// The rendered, user-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Describes a patch range relative to the total number of patches.
///
/// # Example
///
/// ```
/// # use revpatch::patch_subject;
/// assert_eq!(patch_subject((3, 3), 5), "patch 3 of 5");
/// assert_eq!(patch_subject((2, 4), 5), "patches 2-4 of 5");
/// ```
pub fn patch_subject(patch_range: (usize, usize), total_patches: usize) -> String {
    let (start, end) = patch_range;
    if start == end {
        format!("patch {} of {}", start, total_patches)
    } else {
        format!("patches {}-{} of {}", start, end, total_patches)
    }
}

fn render_message(kind: &ApplyPatchErrorKind, subject: &str, revert: bool) -> String {
    match kind {
        ApplyPatchErrorKind::Conflicts => format!(
            "Partially {} {}, but there were conflicts.",
            if revert { "reverted" } else { "applied" },
            subject
        ),
        ApplyPatchErrorKind::BinaryFiles => format!(
            "Could not {} the binary files in {}.",
            if revert { "revert" } else { "apply" },
            subject
        ),
        ApplyPatchErrorKind::NotApplied => format!(
            "Could not {} {}. The patch may be invalid, or there may be conflicts that \
             could not be resolved.",
            if revert { "revert" } else { "apply" },
            subject
        ),
        ApplyPatchErrorKind::Fatal { output } => format!(
            "There was an error {} {}: {}",
            if revert { "reverting" } else { "applying" },
            subject,
            output
        ),
    }
}

/// Errors raised by SCM adapters.
#[derive(Error, Debug)]
pub enum ScmError {
    /// The SCM command could not be started.
    #[error("Could not run '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// The SCM command ran but reported failure.
    #[error("'{command}' failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },
    /// No client is registered under the requested ID.
    #[error("No SCM client is registered with ID '{0}'")]
    UnknownClient(String),
    /// The client does not implement the requested operation.
    #[error("{client} does not support {operation}")]
    Unsupported {
        client: &'static str,
        operation: &'static str,
    },
    /// A commit was requested for a patch without an author or message.
    #[error("Cannot commit without {0}")]
    MissingCommitMetadata(&'static str),
}

/// Represents the errors produced while preparing or running a [`Patcher`](crate::Patcher).
#[derive(Error, Debug)]
pub enum PatcherError {
    /// A patch failed to apply or had conflicts.
    #[error(transparent)]
    Apply(Box<ApplyPatchError>),
    /// A patch file could not be read, materialized, or written.
    #[error(transparent)]
    Patch(#[from] PatchError),
    /// A required tool is not installed.
    #[error("The '{tool}' command is missing. Make sure it is installed and on the PATH.")]
    MissingDependency { tool: String },
    /// The patch tool could not be started for a reason other than being missing.
    #[error("Could not run '{command}': {source}")]
    ToolInvocation {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// Committing was requested, but the backend can't create commits.
    #[error("This patcher does not support committing applied patches.")]
    CommitUnsupported,
    /// The backend failed to create a commit for an applied patch.
    #[error("Could not commit {subject}: {source}")]
    Commit {
        subject: String,
        #[source]
        source: ScmError,
    },
    /// An empty-file patch could not be handled by the backend.
    #[error("Could not apply empty files: {0}")]
    EmptyFiles(#[source] ScmError),
}

impl From<ApplyPatchError> for PatcherError {
    fn from(e: ApplyPatchError) -> Self {
        PatcherError::Apply(Box::new(e))
    }
}

impl PatcherError {
    /// Returns the apply error if this is a patch failure.
    pub fn as_apply_error(&self) -> Option<&ApplyPatchError> {
        match self {
            PatcherError::Apply(e) => Some(e),
            _ => None,
        }
    }
}

/// Converts a `std::io::Error` into a more specific `PatchError`.
pub(crate) fn map_io_error(path: PathBuf, e: std::io::Error) -> PatchError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => PatchError::PermissionDenied { path },
        std::io::ErrorKind::IsADirectory => PatchError::TargetIsDirectory { path },
        _ => PatchError::Io { path, source: e },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_uses_direction() {
        let mut result = PatchResult::new(true, (1, 1));
        result.has_conflicts = true;
        result.conflicting_files = vec!["a.txt".to_string()];

        let error = ApplyPatchError::for_result(result.clone(), 2, false);
        assert_eq!(error.kind, ApplyPatchErrorKind::Conflicts);
        assert_eq!(
            error.message(),
            "Partially applied patch 1 of 2, but there were conflicts."
        );

        let error = ApplyPatchError::for_result(result, 2, true);
        assert_eq!(
            error.message(),
            "Partially reverted patch 1 of 2, but there were conflicts."
        );
    }

    #[test]
    fn range_subject_in_message() {
        let result = PatchResult::new(false, (2, 4));
        let error = ApplyPatchError::for_result(result, 5, true);
        assert_eq!(
            error.message(),
            "Could not revert patches 2-4 of 5. The patch may be invalid, or there may be \
             conflicts that could not be resolved."
        );
    }

    #[test]
    fn binary_failure_message() {
        let mut result = PatchResult::new(true, (1, 1));
        result
            .binary_failed
            .insert("logo.png".to_string(), "no content".to_string());
        let error = ApplyPatchError::for_result(result, 1, false);
        assert_eq!(error.kind, ApplyPatchErrorKind::BinaryFiles);
        assert_eq!(error.message(), "Could not apply the binary files in patch 1 of 1.");
    }

    #[test]
    fn fatal_message_embeds_output() {
        let error = ApplyPatchError::new(
            ApplyPatchErrorKind::Fatal {
                output: "patch: **** Only garbage was found in the patch input.".to_string(),
            },
            Some(PatchResult::new(false, (1, 1))),
            1,
            false,
        );
        assert_eq!(
            error.to_string(),
            "There was an error applying patch 1 of 1: \
             patch: **** Only garbage was found in the patch input."
        );
    }
}
