//! Applies a sequence of patches to a directory tree.
//!
//! A [`Patcher`] is configured up front, optionally prepared for committing,
//! and then consumed by [`Patcher::patch`], which returns a [`PatchRun`]
//! iterator. Each call to `next()` applies one patch with the system `patch`
//! tool, applies its binary changes, and yields the result.

use crate::binary::apply_binary_change;
use crate::commit::{prepare_patches_for_commit, CommitDefaults};
use crate::error::{
    map_io_error, patch_subject, ApplyPatchError, ApplyPatchErrorKind, PatchError, PatcherError,
    ScmError,
};
use crate::output::OutputClassifier;
use crate::patch::{OpenedPatch, Patch, PatchResult};
use crate::scm::RepositoryInfo;
use log::{debug, info, trace, warn};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Environment variable that overrides the `patch` command.
pub const PATCH_COMMAND_ENV: &str = "REVPATCH_PATCH_COMMAND";

/// The `patch` command used when nothing else is configured.
pub const DEFAULT_PATCH_COMMAND: &str = "patch";

// --- Configuration ---

/// Options for configuring a [`Patcher`].
#[derive(Debug, Clone)]
pub struct PatcherOptions {
    /// The directory the patches are applied in.
    pub dest_path: PathBuf,
    /// Whether to revert the patches instead of applying them.
    pub revert: bool,
    /// Whether to squash all patches into a single commit.
    pub squash: bool,
    /// The `patch`-compatible command to run.
    pub patch_command: String,
    /// Information on the repository the patches are applied to.
    pub repository_info: Option<RepositoryInfo>,
}

impl Default for PatcherOptions {
    fn default() -> Self {
        Self {
            dest_path: PathBuf::from("."),
            revert: false,
            squash: false,
            patch_command: std::env::var(PATCH_COMMAND_ENV)
                .ok()
                .filter(|command| !command.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PATCH_COMMAND.to_string()),
            repository_info: None,
        }
    }
}

impl PatcherOptions {
    /// Creates a new builder for `PatcherOptions`.
    ///
    /// # Example
    ///
    /// ```
    /// # use revpatch::PatcherOptions;
    /// let options = PatcherOptions::builder()
    ///     .dest_path("/tmp/checkout")
    ///     .revert(true)
    ///     .patch_command("gpatch")
    ///     .build();
    ///
    /// assert!(options.revert);
    /// assert!(!options.squash);
    /// assert_eq!(options.patch_command, "gpatch");
    /// ```
    pub fn builder() -> PatcherOptionsBuilder {
        PatcherOptionsBuilder::default()
    }
}

/// A builder for creating `PatcherOptions`.
#[derive(Debug, Default)]
pub struct PatcherOptionsBuilder {
    dest_path: Option<PathBuf>,
    revert: Option<bool>,
    squash: Option<bool>,
    patch_command: Option<String>,
    repository_info: Option<RepositoryInfo>,
}

impl PatcherOptionsBuilder {
    /// The directory to apply patches in. Defaults to the current directory.
    pub fn dest_path(mut self, dest_path: impl Into<PathBuf>) -> Self {
        self.dest_path = Some(dest_path.into());
        self
    }

    /// If `true`, patches are reverted in reverse order.
    pub fn revert(mut self, revert: bool) -> Self {
        self.revert = Some(revert);
        self
    }

    /// If `true`, a single commit is made after the last patch.
    pub fn squash(mut self, squash: bool) -> Self {
        self.squash = Some(squash);
        self
    }

    /// Overrides the `patch` command (and `REVPATCH_PATCH_COMMAND`).
    pub fn patch_command(mut self, patch_command: impl Into<String>) -> Self {
        self.patch_command = Some(patch_command.into());
        self
    }

    /// Information on the repository, used to compute default prefix levels.
    pub fn repository_info(mut self, repository_info: RepositoryInfo) -> Self {
        self.repository_info = Some(repository_info);
        self
    }

    /// Builds the `PatcherOptions`.
    pub fn build(self) -> PatcherOptions {
        let default = PatcherOptions::default();
        PatcherOptions {
            dest_path: self.dest_path.unwrap_or(default.dest_path),
            revert: self.revert.unwrap_or(default.revert),
            squash: self.squash.unwrap_or(default.squash),
            patch_command: self.patch_command.unwrap_or(default.patch_command),
            repository_info: self.repository_info.or(default.repository_info),
        }
    }
}

// --- Backends ---

/// Per-patch state handed to a backend.
#[derive(Debug, Clone, Copy)]
pub struct PatchContext<'a> {
    /// The directory patches are applied in.
    pub dest_path: &'a Path,
    /// The prefix level used for this patch, if any.
    pub prefix_level: Option<u32>,
    /// Whether the patch is being reverted.
    pub revert: bool,
}

/// SCM-specific behavior plugged into a [`Patcher`].
///
/// Every method has a default suitable for a plain directory tree.
pub trait PatcherBackend {
    /// Whether this backend can turn applied patches into commits.
    fn can_commit(&self) -> bool {
        false
    }

    /// Whether this backend can apply patches made only of empty files,
    /// which `patch` itself rejects.
    fn can_patch_empty_files(&self) -> bool {
        false
    }

    /// The prefix level to use for a patch that doesn't set one.
    fn default_prefix_level(
        &self,
        patch: &Patch,
        repository_info: Option<&RepositoryInfo>,
    ) -> Option<u32> {
        default_prefix_level(patch, repository_info)
    }

    /// Applies the empty files in a patch.
    ///
    /// Returns whether anything was applied.
    fn apply_empty_files(
        &mut self,
        _patch: &OpenedPatch<'_>,
        _context: &PatchContext<'_>,
    ) -> Result<bool, PatcherError> {
        Ok(false)
    }

    /// Creates a commit for an applied patch.
    fn create_commit(
        &mut self,
        _patch: &Patch,
        _result: &PatchResult,
        _run_commit_editor: bool,
    ) -> Result<(), ScmError> {
        Err(ScmError::Unsupported {
            client: "This patcher",
            operation: "creating commits",
        })
    }
}

impl PatcherBackend for Box<dyn PatcherBackend> {
    fn can_commit(&self) -> bool {
        (**self).can_commit()
    }

    fn can_patch_empty_files(&self) -> bool {
        (**self).can_patch_empty_files()
    }

    fn default_prefix_level(
        &self,
        patch: &Patch,
        repository_info: Option<&RepositoryInfo>,
    ) -> Option<u32> {
        (**self).default_prefix_level(patch, repository_info)
    }

    fn apply_empty_files(
        &mut self,
        patch: &OpenedPatch<'_>,
        context: &PatchContext<'_>,
    ) -> Result<bool, PatcherError> {
        (**self).apply_empty_files(patch, context)
    }

    fn create_commit(
        &mut self,
        patch: &Patch,
        result: &PatchResult,
        run_commit_editor: bool,
    ) -> Result<(), ScmError> {
        (**self).create_commit(patch, result, run_commit_editor)
    }
}

/// A backend for plain directories, with no SCM integration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBackend;

impl PatcherBackend for DefaultBackend {}

/// The default prefix level for a patch.
///
/// If the repository has a base path and the patch was generated within it,
/// the level is the number of components in the base path plus one.
/// Otherwise there's no default, and `patch` is run without `-p`.
///
/// # Example
///
/// ```
/// # use revpatch::{default_prefix_level, Patch, RepositoryInfo};
/// let repository_info = RepositoryInfo::new("https://example.com/repo").with_base_path("/src");
///
/// let patch = Patch::from_content("...").with_base_dir("/src/test");
/// assert_eq!(default_prefix_level(&patch, Some(&repository_info)), Some(2));
///
/// let patch = Patch::from_content("...").with_base_dir("/lib");
/// assert_eq!(default_prefix_level(&patch, Some(&repository_info)), None);
/// ```
pub fn default_prefix_level(
    patch: &Patch,
    repository_info: Option<&RepositoryInfo>,
) -> Option<u32> {
    let base_path = repository_info?
        .base_path
        .as_deref()
        .filter(|base_path| !base_path.is_empty())?;
    let base_dir = patch.base_dir.as_deref()?;

    if base_dir.starts_with(base_path) {
        Some(base_path.matches('/').count() as u32 + 1)
    } else {
        None
    }
}

// --- Patcher ---

/// Applies one or more patches to a tree.
///
/// # Example
///
/// ```no_run
/// # use revpatch::{Patch, Patcher, PatcherOptions};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let patches = vec![
///     Patch::from_path("0001-first.diff"),
///     Patch::from_path("0002-second.diff"),
/// ];
/// let options = PatcherOptions::builder().dest_path("checkout").build();
///
/// let patcher = Patcher::new(patches, options);
/// patcher.check_dependencies()?;
///
/// for result in patcher.patch() {
///     let result = result?;
///     println!("{}", result.output_text());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Patcher<B: PatcherBackend = DefaultBackend> {
    patches: Vec<Patch>,
    options: PatcherOptions,
    backend: B,
    classifier: OutputClassifier,
    commit: bool,
    run_commit_editor: bool,
}

impl Patcher<DefaultBackend> {
    /// Creates a patcher for a plain directory tree.
    pub fn new(patches: Vec<Patch>, options: PatcherOptions) -> Self {
        Self::with_backend(patches, options, DefaultBackend)
    }
}

impl<B: PatcherBackend> Patcher<B> {
    /// Creates a patcher that uses `backend` for SCM-specific behavior.
    pub fn with_backend(patches: Vec<Patch>, options: PatcherOptions, backend: B) -> Self {
        Self {
            patches,
            options,
            backend,
            classifier: OutputClassifier::default(),
            commit: false,
            run_commit_editor: false,
        }
    }

    /// Replaces the output classifier (for example, to add a dialect).
    pub fn with_classifier(mut self, classifier: OutputClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// The patches to apply, in input order.
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// The options this patcher was created with.
    pub fn options(&self) -> &PatcherOptions {
        &self.options
    }

    /// The backend used for SCM-specific behavior.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether the backend can commit applied patches.
    pub fn can_commit(&self) -> bool {
        self.backend.can_commit()
    }

    /// Whether applied patches will be committed.
    pub fn will_commit(&self) -> bool {
        self.commit
    }

    /// Checks that the `patch` command can be run.
    pub fn check_dependencies(&self) -> Result<(), PatcherError> {
        let command = &self.options.patch_command;
        trace!("  Checking for '{}'", command);
        Command::new(command)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| tool_error(command, e))?;
        Ok(())
    }

    /// Prepares the patches to be committed once applied.
    ///
    /// Patches without an author or message receive the defaults. See
    /// [`prepare_patches_for_commit`] for the rules.
    pub fn prepare_for_commit(
        &mut self,
        defaults: &CommitDefaults,
        run_commit_editor: bool,
    ) -> Result<(), PatcherError> {
        if !self.can_commit() {
            return Err(PatcherError::CommitUnsupported);
        }

        prepare_patches_for_commit(
            &mut self.patches,
            defaults,
            self.options.squash,
            self.options.revert,
        );
        self.commit = true;
        self.run_commit_editor = run_commit_editor;
        Ok(())
    }

    /// Starts applying the patches.
    ///
    /// Patches are applied in order (or reverse order when reverting) as the
    /// returned iterator is advanced. The first failure is yielded as an
    /// error, after which the iterator ends.
    pub fn patch(self) -> PatchRun<B> {
        let total_patches = self.patches.len();
        let mut order: Vec<usize> = (0..total_patches).collect();
        if self.options.revert {
            order.reverse();
        }

        info!(
            "{} {} patch(es) in '{}'",
            if self.options.revert { "Reverting" } else { "Applying" },
            total_patches,
            self.options.dest_path.display()
        );

        PatchRun {
            patches: self.patches,
            options: self.options,
            backend: self.backend,
            classifier: self.classifier,
            commit: self.commit,
            run_commit_editor: self.run_commit_editor,
            order,
            position: 0,
            applied_patch_results: Vec::new(),
            finished: false,
        }
    }
}

// --- Patch runs ---

/// An in-progress patch run.
///
/// Yields the result of each patch. Results that were applied before a
/// failure stay available through
/// [`applied_patch_results`](Self::applied_patch_results); nothing is rolled
/// back.
#[derive(Debug)]
pub struct PatchRun<B: PatcherBackend = DefaultBackend> {
    patches: Vec<Patch>,
    options: PatcherOptions,
    backend: B,
    classifier: OutputClassifier,
    commit: bool,
    run_commit_editor: bool,
    order: Vec<usize>,
    position: usize,
    applied_patch_results: Vec<PatchResult>,
    finished: bool,
}

impl<B: PatcherBackend> PatchRun<B> {
    /// Results of the patches that applied (and, when committing, were
    /// committed) successfully so far.
    pub fn applied_patch_results(&self) -> &[PatchResult] {
        &self.applied_patch_results
    }

    /// The patches in this run, in input order.
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// The backend, including any state it recorded during the run.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The number of patches in this run.
    pub fn total_patches(&self) -> usize {
        self.patches.len()
    }

    fn step(&mut self, index: usize, patch_num: usize) -> Result<PatchResult, PatcherError> {
        let total_patches = self.total_patches();
        let revert = self.options.revert;

        info!(
            "{} patch {} of {}",
            if revert { "Reverting" } else { "Applying" },
            patch_num,
            total_patches
        );

        let result = self.apply_single_patch(index, patch_num)?;
        if !result.success() {
            return Err(ApplyPatchError::for_result(result, total_patches, revert).into());
        }

        let (_, end_patch_num) = result.patch_range;
        if self.commit && (!self.options.squash || end_patch_num == total_patches) {
            debug!("  Committing {}", patch_subject(result.patch_range, total_patches));
            self.backend
                .create_commit(&self.patches[index], &result, self.run_commit_editor)
                .map_err(|source| PatcherError::Commit {
                    subject: patch_subject(result.patch_range, total_patches),
                    source,
                })?;
        }

        self.applied_patch_results.push(result.clone());
        Ok(result)
    }

    /// Applies one patch: text hunks through the `patch` tool, then binary
    /// changes.
    fn apply_single_patch(
        &mut self,
        index: usize,
        patch_num: usize,
    ) -> Result<PatchResult, PatcherError> {
        let patch = &self.patches[index];
        let dest_path = self.options.dest_path.as_path();
        let revert = self.options.revert;
        let patch_range = (patch_num, patch_num);

        if !dest_path.is_dir() {
            return Err(PatcherError::Patch(PatchError::Io {
                path: dest_path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "destination is not a directory"),
            }));
        }

        let prefix_level = patch.prefix_level.or_else(|| {
            self.backend
                .default_prefix_level(patch, self.options.repository_info.as_ref())
        });
        let context = PatchContext {
            dest_path,
            prefix_level,
            revert,
        };

        let opened = patch.open()?;
        let mut applied = false;
        let mut conflicting_files = Vec::new();
        let mut patch_output = Vec::new();

        // A patch carrying only binary changes has nothing for the patch tool.
        let run_tool = opened.has_text_changes()? || patch.binary_changes.is_empty();
        if run_tool {
            let (exit_ok, output) =
                run_patch_tool(&self.options.patch_command, &opened, &context)?;
            patch_output = output;

            if exit_ok {
                applied = true;
            } else {
                let parsed = self.classifier.classify(&patch_output);

                let has_fatal_error =
                    if self.backend.can_patch_empty_files() && parsed.has_empty_files {
                        debug!("  Patch contains only empty files; handing off to the backend");
                        applied = self.backend.apply_empty_files(&opened, &context)?;
                        !applied
                    } else {
                        parsed.fatal_error.is_some()
                    };

                if has_fatal_error {
                    let output = String::from_utf8_lossy(patch_output.trim_ascii()).into_owned();
                    let mut result = PatchResult::new(false, patch_range);
                    result.patch_output = patch_output;
                    result.patch_index = Some(index);
                    return Err(ApplyPatchError::new(
                        ApplyPatchErrorKind::Fatal { output },
                        Some(result),
                        self.patches.len(),
                        revert,
                    )
                    .into());
                }

                conflicting_files = parsed.conflicting_files;
                if parsed.has_partial_applied_files {
                    applied = true;
                }
            }
        } else {
            debug!("  Patch has no text changes; skipping the patch tool");
        }

        let mut binary_applied = Vec::new();
        let mut binary_failed = BTreeMap::new();
        for change in &patch.binary_changes {
            match apply_binary_change(change, dest_path, revert) {
                Ok(path) => binary_applied.push(path),
                Err(e) => {
                    warn!(
                        "Could not {} binary file '{}': {}",
                        if revert { "revert" } else { "apply" },
                        change.display_path(),
                        e
                    );
                    binary_failed.insert(change.display_path().to_string(), e.to_string());
                }
            }
        }

        if !binary_applied.is_empty() {
            applied = true;
        }

        let mut result = PatchResult::new(applied, patch_range);
        result.has_conflicts = !conflicting_files.is_empty();
        result.conflicting_files = conflicting_files;
        result.patch_output = patch_output;
        result.patch_index = Some(index);
        result.binary_applied = binary_applied;
        result.binary_failed = binary_failed;

        debug!(
            "  Patch {} result: applied={}, conflicts={:?}, binary failures={}",
            patch_num,
            result.applied,
            result.conflicting_files,
            result.binary_failed.len()
        );
        Ok(result)
    }
}

impl<B: PatcherBackend> Iterator for PatchRun<B> {
    type Item = Result<PatchResult, PatcherError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let Some(&index) = self.order.get(self.position) else {
            self.finished = true;
            return None;
        };
        self.position += 1;

        let step = self.step(index, self.position);
        if step.is_err() {
            self.finished = true;
        }
        Some(step)
    }
}

impl<B: PatcherBackend> std::iter::FusedIterator for PatchRun<B> {}

/// Runs `<patch> -f [-R] [-p<N>] -i <file>` in the destination directory.
///
/// Returns whether the tool exited successfully, along with its stdout and
/// stderr interleaved as written. A failing exit code is expected for
/// conflicts, so it isn't an error here.
fn run_patch_tool(
    patch_command: &str,
    patch: &OpenedPatch<'_>,
    context: &PatchContext<'_>,
) -> Result<(bool, Vec<u8>), PatcherError> {
    let patch_path = patch.path()?;

    let mut args: Vec<String> = vec!["-f".to_string()];
    if context.revert {
        args.push("-R".to_string());
    }
    if let Some(prefix_level) = context.prefix_level {
        args.push(format!("-p{}", prefix_level));
    }
    args.push("-i".to_string());
    args.push(patch_path.display().to_string());

    debug!(
        "  Running '{} {}' in '{}'",
        patch_command,
        args.join(" "),
        context.dest_path.display()
    );

    let mut output_file = tempfile::tempfile()
        .map_err(|e| PatcherError::Patch(map_io_error(std::env::temp_dir(), e)))?;
    let stdout = clone_output_file(&output_file)?;
    let stderr = clone_output_file(&output_file)?;

    let status = Command::new(patch_command)
        .args(&args)
        .current_dir(context.dest_path)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .status()
        .map_err(|e| tool_error(patch_command, e))?;

    let mut output = Vec::new();
    output_file
        .seek(SeekFrom::Start(0))
        .and_then(|_| output_file.read_to_end(&mut output))
        .map_err(|e| PatcherError::Patch(map_io_error(std::env::temp_dir(), e)))?;

    trace!("  '{}' exited with {}", patch_command, status);
    Ok((status.success(), output))
}

fn clone_output_file(file: &File) -> Result<Stdio, PatcherError> {
    file.try_clone()
        .map(Stdio::from)
        .map_err(|e| PatcherError::Patch(map_io_error(std::env::temp_dir(), e)))
}

fn tool_error(command: &str, e: io::Error) -> PatcherError {
    if e.kind() == io::ErrorKind::NotFound {
        PatcherError::MissingDependency {
            tool: command.to_string(),
        }
    } else {
        PatcherError::ToolInvocation {
            command: command.to_string(),
            source: e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn repo_info(base_path: &str) -> RepositoryInfo {
        RepositoryInfo::new("https://example.com/repo").with_base_path(base_path)
    }

    #[test]
    fn default_prefix_level_requires_matching_base_dir() {
        let patch = Patch::from_content("x").with_base_dir("/src");
        assert_eq!(default_prefix_level(&patch, Some(&repo_info("/src/"))), None);

        let patch = Patch::from_content("x").with_base_dir("/src/");
        assert_eq!(default_prefix_level(&patch, Some(&repo_info("/src/test"))), None);

        let patch = Patch::from_content("x").with_base_dir("/src/test");
        assert_eq!(default_prefix_level(&patch, Some(&repo_info("/src"))), Some(2));
    }

    #[test]
    fn default_prefix_level_without_repository_info() {
        let patch = Patch::from_content("x").with_base_dir("/src");
        assert_eq!(default_prefix_level(&patch, None), None);
        assert_eq!(default_prefix_level(&patch, Some(&repo_info(""))), None);
    }

    #[test]
    fn prepare_for_commit_requires_commit_support() {
        let mut patcher = Patcher::new(vec![Patch::from_content("x")], PatcherOptions::default());
        let defaults = CommitDefaults::new(crate::PatchAuthor::new("A", "a@example.com"), "msg");
        assert!(matches!(
            patcher.prepare_for_commit(&defaults, false),
            Err(PatcherError::CommitUnsupported)
        ));
        assert!(!patcher.will_commit());
    }

    #[test]
    fn missing_patch_command_is_a_dependency_error() {
        let options = PatcherOptions::builder()
            .patch_command("revpatch-no-such-patch-tool")
            .build();
        let patcher = Patcher::new(Vec::new(), options);
        assert!(matches!(
            patcher.check_dependencies(),
            Err(PatcherError::MissingDependency { .. })
        ));
    }

    #[test]
    fn missing_patch_command_fails_run_without_retry() {
        let dir = tempdir().unwrap();
        let options = PatcherOptions::builder()
            .dest_path(dir.path())
            .patch_command("revpatch-no-such-patch-tool")
            .build();
        let patcher = Patcher::new(
            vec![Patch::from_content("--- a\n+++ a\n"), Patch::from_content("x")],
            options,
        );
        let mut run = patcher.patch();
        assert!(matches!(
            run.next(),
            Some(Err(PatcherError::MissingDependency { .. }))
        ));
        assert!(run.next().is_none());
        assert!(run.applied_patch_results().is_empty());
    }

    #[test]
    fn binary_only_patch_skips_patch_tool() {
        let dir = tempdir().unwrap();
        let options = PatcherOptions::builder()
            .dest_path(dir.path())
            .patch_command("revpatch-no-such-patch-tool")
            .build();
        let patch = Patch::from_content("")
            .with_binary_change(crate::BinaryFileChange::added("logo.png").with_content(vec![1, 2]));
        let results: Vec<_> = Patcher::new(vec![patch], options).patch().collect();

        assert_eq!(results.len(), 1);
        let result = results[0].as_ref().unwrap();
        assert!(result.success());
        assert_eq!(result.binary_applied, vec!["logo.png"]);
        assert_eq!(result.patch_index, Some(0));
        assert_eq!(std::fs::read(dir.path().join("logo.png")).unwrap(), vec![1, 2]);
    }

    #[test]
    fn binary_failure_yields_binary_files_error() {
        let dir = tempdir().unwrap();
        let options = PatcherOptions::builder()
            .dest_path(dir.path())
            .patch_command("revpatch-no-such-patch-tool")
            .build();
        let patch = Patch::from_content("")
            .with_binary_change(crate::BinaryFileChange::added("a.bin").with_content(vec![1]))
            .with_binary_change(crate::BinaryFileChange::added("b.bin"));
        let mut run = Patcher::new(vec![patch], options).patch();

        let err = run.next().unwrap().unwrap_err();
        let apply_error = err.as_apply_error().unwrap();
        assert_eq!(apply_error.kind, ApplyPatchErrorKind::BinaryFiles);
        let failed = apply_error.failed_patch_result.as_ref().unwrap();
        assert!(failed.applied);
        assert_eq!(failed.binary_applied, vec!["a.bin"]);
        assert!(failed.binary_failed.contains_key("b.bin"));
        assert!(run.next().is_none());
    }
}
