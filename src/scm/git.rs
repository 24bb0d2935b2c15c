//! Git support.

use super::{CommitRequest, DiffRequest, DiffResult, RepositoryInfo, ScmClient};
use crate::error::{PatcherError, ScmError};
use crate::patch::{OpenedPatch, Patch, PatchResult};
use crate::patcher::{default_prefix_level, PatchContext, PatcherBackend};
use log::{debug, trace};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// A client for Git working trees.
#[derive(Debug, Clone)]
pub struct GitClient {
    cwd: PathBuf,
}

impl GitClient {
    /// Creates a client that runs `git` in `cwd`.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }

    /// The directory `git` is run in.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.cwd).stdin(Stdio::null());
        cmd
    }

    /// Runs git, returning its output whatever the exit code.
    fn run_git(&self, args: &[&str]) -> Result<Output, ScmError> {
        trace!("  Running 'git {}' in '{}'", args.join(" "), self.cwd.display());
        self.command(args).output().map_err(|source| ScmError::Io {
            command: render_command(args),
            source,
        })
    }

    /// Runs git, failing on a non-zero exit code.
    fn run_git_checked(&self, args: &[&str]) -> Result<Output, ScmError> {
        let output = self.run_git(args)?;
        if !output.status.success() {
            return Err(ScmError::CommandFailed {
                command: render_command(args),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Runs git and returns its trimmed stdout, or `None` on a non-zero exit.
    fn git_stdout(&self, args: &[&str]) -> Result<Option<String>, ScmError> {
        let output = self.run_git(args)?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }
}

impl ScmClient for GitClient {
    fn scmclient_id(&self) -> &'static str {
        "git"
    }

    fn name(&self) -> &'static str {
        "Git"
    }

    fn check_dependencies(&self) -> Result<(), ScmError> {
        self.run_git_checked(&["--version"]).map(|_| ())
    }

    fn get_repository_info(&self) -> Result<Option<RepositoryInfo>, ScmError> {
        let Some(top_level) = self.git_stdout(&["rev-parse", "--show-toplevel"])? else {
            debug!("  '{}' is not inside a Git repository", self.cwd.display());
            return Ok(None);
        };

        let prefix = self
            .git_stdout(&["rev-parse", "--show-prefix"])?
            .unwrap_or_default();
        let prefix = prefix.trim_end_matches('/');

        let path = self
            .git_stdout(&["config", "--get", "remote.origin.url"])?
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| top_level.clone());

        let mut repository_info = RepositoryInfo::new(path).with_local_path(top_level);
        if !prefix.is_empty() {
            repository_info = repository_info.with_base_path(prefix);
        }
        Ok(Some(repository_info))
    }

    fn diff(&self, request: &DiffRequest) -> Result<DiffResult, ScmError> {
        let base = request.base.as_deref().unwrap_or("HEAD");
        let excludes: Vec<String> = request
            .exclude_patterns
            .iter()
            .map(|pattern| format!(":(exclude){}", pattern))
            .collect();
        let mut args = vec![
            "diff",
            "--no-color",
            "--no-ext-diff",
            "--full-index",
            "--binary",
            "--ignore-submodules",
            base,
        ];
        if let Some(tip) = request.tip.as_deref() {
            args.push(tip);
        }
        if !request.include_files.is_empty() || !excludes.is_empty() {
            args.push("--");
            args.extend(request.include_files.iter().map(String::as_str));
            args.extend(excludes.iter().map(String::as_str));
        }

        let output = self.run_git_checked(&args)?;
        let commit_id = match request.tip.as_deref() {
            Some(tip) => self.git_stdout(&["rev-parse", tip])?,
            None => None,
        };
        Ok(DiffResult {
            diff: output.stdout,
            // Every commit git diffs against is local, so there's no parent diff.
            parent_diff: None,
            commit_id,
            base_commit_id: self.git_stdout(&["rev-parse", base])?,
        })
    }

    fn has_pending_changes(&self) -> Result<bool, ScmError> {
        let output = self.run_git_checked(&["status", "--porcelain", "--untracked-files=no"])?;
        Ok(!output.stdout.trim_ascii().is_empty())
    }

    fn get_current_branch(&self) -> Result<Option<String>, ScmError> {
        Ok(self
            .git_stdout(&["symbolic-ref", "--short", "-q", "HEAD"])?
            .filter(|branch| !branch.is_empty()))
    }

    fn create_commit(&self, request: &CommitRequest<'_>) -> Result<(), ScmError> {
        if request.all_files {
            self.run_git_checked(&["add", "-A"])?;
        } else if !request.files.is_empty() {
            let mut args = vec!["add", "--"];
            args.extend(request.files.iter().map(String::as_str));
            self.run_git_checked(&args)?;
        }

        let author = request.author.to_string();
        let mut args = vec!["commit", "-m", request.message, "--author", author.as_str()];

        if request.run_editor {
            args.push("-e");
            // The editor needs the terminal.
            let status = Command::new("git")
                .args(&args)
                .current_dir(&self.cwd)
                .status()
                .map_err(|source| ScmError::Io {
                    command: render_command(&args),
                    source,
                })?;
            if !status.success() {
                return Err(ScmError::CommandFailed {
                    command: render_command(&args),
                    code: status.code().unwrap_or(-1),
                    stderr: String::new(),
                });
            }
        } else {
            self.run_git_checked(&args)?;
        }

        debug!("Created commit '{}'", request.message.lines().next().unwrap_or_default());
        Ok(())
    }

    fn patcher_backend(&self) -> Box<dyn PatcherBackend> {
        Box::new(GitPatcherBackend::new(self.clone()))
    }
}

/// Applies patches to Git working trees, with commit support.
#[derive(Debug, Clone)]
pub struct GitPatcherBackend {
    client: GitClient,
}

impl GitPatcherBackend {
    /// Creates a backend that commits through `client`.
    pub fn new(client: GitClient) -> Self {
        Self { client }
    }
}

impl PatcherBackend for GitPatcherBackend {
    fn can_commit(&self) -> bool {
        true
    }

    fn can_patch_empty_files(&self) -> bool {
        true
    }

    /// Adds one to the default level to strip Git's `a/` and `b/` prefixes.
    fn default_prefix_level(
        &self,
        patch: &Patch,
        repository_info: Option<&RepositoryInfo>,
    ) -> Option<u32> {
        Some(default_prefix_level(patch, repository_info).map_or(1, |level| level + 1))
    }

    /// `patch` can't create or delete empty files, but `git apply` can.
    fn apply_empty_files(
        &mut self,
        patch: &OpenedPatch<'_>,
        context: &PatchContext<'_>,
    ) -> Result<bool, PatcherError> {
        let patch_path = patch.path()?.display().to_string();
        let prefix_arg = format!("-p{}", context.prefix_level.unwrap_or(1));

        let mut args = vec!["apply", prefix_arg.as_str()];
        if context.revert {
            args.push("-R");
        }
        args.push(&patch_path);

        let output = GitClient::new(context.dest_path)
            .run_git(&args)
            .map_err(PatcherError::EmptyFiles)?;
        if !output.status.success() {
            debug!(
                "  'git apply' could not apply empty files: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.status.success())
    }

    fn create_commit(
        &mut self,
        patch: &Patch,
        _result: &PatchResult,
        run_commit_editor: bool,
    ) -> Result<(), ScmError> {
        let author = patch
            .author
            .as_ref()
            .ok_or(ScmError::MissingCommitMetadata("an author"))?;
        let message = patch
            .message
            .as_deref()
            .ok_or(ScmError::MissingCommitMetadata("a commit message"))?;

        self.client.create_commit(&CommitRequest {
            message,
            author,
            files: &[],
            all_files: true,
            run_editor: run_commit_editor,
        })
    }
}

fn render_command(args: &[&str]) -> String {
    format!("git {}", args.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_prefix_level_accounts_for_a_b_prefixes() {
        let backend = GitPatcherBackend::new(GitClient::new("."));
        let patch = Patch::from_content("x");
        assert_eq!(backend.default_prefix_level(&patch, None), Some(1));

        let info = RepositoryInfo::new("origin").with_base_path("src");
        let patch = Patch::from_content("x").with_base_dir("src/lib");
        assert_eq!(backend.default_prefix_level(&patch, Some(&info)), Some(2));
    }

    #[test]
    fn commit_requires_metadata() {
        let mut backend = GitPatcherBackend::new(GitClient::new("."));
        let result = PatchResult::new(true, (1, 1));
        assert!(matches!(
            backend.create_commit(&Patch::from_content("x"), &result, false),
            Err(ScmError::MissingCommitMetadata("an author"))
        ));
    }
}
