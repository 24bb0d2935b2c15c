//! Applies and reverts review patches against a local tree, with structured
//! reporting of what happened.
//!
//! `revpatch` drives the system `patch` tool (GNU or BSD/Apple) over one or
//! more unified diffs, in order, and turns its free-form output into a
//! [`PatchResult`]: whether the patch applied, which files conflicted, and
//! which binary files were written. Binary file changes, which `patch` can't
//! express, are applied separately with lazily loaded content.
//!
//! Applied patches can optionally be committed through an SCM backend, either
//! one commit per patch or squashed into a single commit.
//!
//! ## Getting Started
//!
//! ````rust
//! use revpatch::{Patch, Patcher, PatcherOptions};
//! use std::fs;
//! use tempfile::tempdir;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # if std::process::Command::new("patch").arg("--version").output().is_err() {
//! #     return Ok(());
//! # }
//! // 1. Set up a tree with a file to patch.
//! let dir = tempdir()?;
//! fs::write(dir.path().join("greeting.txt"), "Hello, world!\n")?;
//!
//! // 2. Build a patch. This one is generated from two texts; patches can also
//! //    come from raw diff bytes or a file on disk.
//! let patch = Patch::from_texts("greeting.txt", "Hello, world!\n", "Hello, revpatch!\n", 3);
//!
//! // 3. Apply it. Each step of the run applies one patch.
//! let options = PatcherOptions::builder().dest_path(dir.path()).build();
//! let patcher = Patcher::new(vec![patch], options);
//!
//! for result in patcher.patch() {
//!     let result = result?;
//!     assert!(result.success());
//!     assert_eq!(result.patch_range, (1, 1));
//! }
//!
//! assert_eq!(fs::read_to_string(dir.path().join("greeting.txt"))?, "Hello, revpatch!\n");
//! # Ok(())
//! # }
//! ````
//!
//! ## Key Concepts
//!
//! ### Patch runs
//!
//! [`Patcher::patch`] consumes the patcher and returns a [`PatchRun`]. Each
//! call to `next()` applies one patch. When a patch fails, the run yields a
//! [`PatcherError::Apply`] describing it and then stops; the patches applied
//! before it stay applied, and their results are available through
//! [`PatchRun::applied_patch_results`].
//!
//! When reverting, patches are processed last to first.
//!
//! ### Failures
//!
//! A patch that doesn't apply cleanly is reported as an [`ApplyPatchError`]
//! with an [`ApplyPatchErrorKind`]:
//!
//! - `Conflicts`: some hunks applied, others were rejected.
//! - `BinaryFiles`: the text applied, but a binary file failed.
//! - `NotApplied`: nothing applied.
//! - `Fatal`: `patch` rejected the input itself, for example a malformed hunk.
//!
//! The message names the failing patch, e.g. `Could not apply patch 2 of 2.`
//!
//! ### Output classification
//!
//! [`OutputClassifier`] parses raw `patch` output. It knows GNU and BSD/Apple
//! wording out of the box, and more [`PatchDialect`]s can be added.
//!
//! ### Backends and SCMs
//!
//! A [`PatcherBackend`] supplies SCM-specific behavior: default prefix
//! levels, handling of empty-file patches, and commits. [`DefaultBackend`]
//! works on any directory; [`GitPatcherBackend`] adds Git support.
//! [`ScmRegistry`] finds the right [`ScmClient`] for a directory.

mod binary;
mod commit;
mod error;
mod output;
mod patch;
mod patcher;
mod scm;

pub use binary::{apply_binary_change, ensure_path_is_safe, BinaryFileChange, BinaryFileStatus};
pub use commit::{
    extract_commit_message, prepare_patches_for_commit, CommitDefaults, ReviewRequestInfo,
};
pub use error::{
    patch_subject, ApplyPatchError, ApplyPatchErrorKind, BinaryContentError, PatchError,
    PatcherError, ScmError,
};
pub use output::{parse_patch_output, OutputClassifier, ParsedPatchOutput, PatchDialect};
pub use patch::{OpenedPatch, ParseAuthorError, Patch, PatchAuthor, PatchResult};
pub use patcher::{
    default_prefix_level, DefaultBackend, PatchContext, PatchRun, Patcher, PatcherBackend,
    PatcherOptions, PatcherOptionsBuilder, DEFAULT_PATCH_COMMAND, PATCH_COMMAND_ENV,
};
pub use scm::{
    CommitRequest, DiffRequest, DiffResult, GitClient, GitPatcherBackend, RepositoryInfo,
    ScmClient, ScmClientFactory, ScmRegistry,
};
