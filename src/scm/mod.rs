//! Source-control adapters.
//!
//! Adapters implement [`ScmClient`] and are looked up by a stable string ID
//! through a [`ScmRegistry`].

mod git;

pub use git::{GitClient, GitPatcherBackend};

use crate::error::ScmError;
use crate::patch::PatchAuthor;
use crate::patcher::{DefaultBackend, PatcherBackend};
use log::debug;
use std::path::{Path, PathBuf};

/// Information about a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// The path (or URL) identifying the repository.
    pub path: String,
    /// The path within the repository that the local checkout maps to.
    pub base_path: Option<String>,
    /// The root of the local checkout.
    pub local_path: Option<PathBuf>,
}

impl RepositoryInfo {
    /// Creates repository info with only the repository path set.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            base_path: None,
            local_path: None,
        }
    }

    /// Sets the path within the repository of the local checkout.
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    /// Sets the root of the local checkout.
    pub fn with_local_path(mut self, local_path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(local_path.into());
        self
    }
}

/// What to include in a diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffRequest {
    /// The revision to diff against. `None` means the current HEAD.
    pub base: Option<String>,
    /// The revision to diff up to. `None` means the working tree.
    pub tip: Option<String>,
    /// Limit the diff to these files.
    pub include_files: Vec<String>,
    /// Leave out files matching these patterns.
    pub exclude_patterns: Vec<String>,
}

/// A generated diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// The diff between the base and the tip.
    pub diff: Vec<u8>,
    /// A diff from the upstream revision to the base, for SCMs whose base
    /// may not exist upstream.
    pub parent_diff: Option<Vec<u8>>,
    /// The commit the diff ends at, when the tip is a commit.
    pub commit_id: Option<String>,
    /// The commit the diff is based on, when known.
    pub base_commit_id: Option<String>,
}

/// A request to create a commit.
#[derive(Debug, Clone, Copy)]
pub struct CommitRequest<'a> {
    /// The commit message.
    pub message: &'a str,
    /// The commit author.
    pub author: &'a PatchAuthor,
    /// The files to commit. Ignored when `all_files` is set.
    pub files: &'a [String],
    /// Commit every change in the tree, including new and removed files.
    pub all_files: bool,
    /// Let the user edit the message before committing.
    pub run_editor: bool,
}

/// A client for a source-control system.
pub trait ScmClient {
    /// The stable ID this client is registered under.
    fn scmclient_id(&self) -> &'static str;

    /// The display name of the SCM.
    fn name(&self) -> &'static str;

    /// Checks that the SCM's tools are installed.
    fn check_dependencies(&self) -> Result<(), ScmError>;

    /// Returns information on the repository, or `None` if the working
    /// directory isn't in one.
    fn get_repository_info(&self) -> Result<Option<RepositoryInfo>, ScmError>;

    /// Generates a diff of local changes.
    fn diff(&self, request: &DiffRequest) -> Result<DiffResult, ScmError>;

    /// Whether the working tree has uncommitted changes.
    fn has_pending_changes(&self) -> Result<bool, ScmError>;

    /// The name of the current branch, if there is one.
    fn get_current_branch(&self) -> Result<Option<String>, ScmError> {
        Err(ScmError::Unsupported {
            client: self.name(),
            operation: "branches",
        })
    }

    /// Creates a commit of local changes.
    fn create_commit(&self, _request: &CommitRequest<'_>) -> Result<(), ScmError> {
        Err(ScmError::Unsupported {
            client: self.name(),
            operation: "creating commits",
        })
    }

    /// The patcher backend to apply patches to this SCM's trees with.
    fn patcher_backend(&self) -> Box<dyn PatcherBackend> {
        Box::new(DefaultBackend)
    }
}

/// Builds a client rooted at a working directory.
pub type ScmClientFactory = fn(&Path) -> Box<dyn ScmClient>;

/// The set of known SCM clients, keyed by ID.
#[derive(Clone, Default)]
pub struct ScmRegistry {
    clients: Vec<(&'static str, ScmClientFactory)>,
}

impl std::fmt::Debug for ScmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl ScmRegistry {
    /// A registry with an empty client list.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with all built-in clients.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("git", |cwd| Box::new(GitClient::new(cwd)));
        registry
    }

    /// Registers a client. A client already registered under `id` is replaced.
    pub fn register(&mut self, id: &'static str, factory: ScmClientFactory) {
        match self.clients.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = factory,
            None => self.clients.push((id, factory)),
        }
    }

    /// The registered IDs, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.clients.iter().map(|(id, _)| *id)
    }

    /// Creates the client registered under `id`, rooted at `cwd`.
    ///
    /// # Example
    ///
    /// ```
    /// # use revpatch::{ScmError, ScmRegistry};
    /// # use std::path::Path;
    /// let registry = ScmRegistry::with_defaults();
    /// let client = registry.get("git", Path::new(".")).unwrap();
    /// assert_eq!(client.name(), "Git");
    ///
    /// assert!(matches!(
    ///     registry.get("bzr", Path::new(".")),
    ///     Err(ScmError::UnknownClient(_))
    /// ));
    /// ```
    pub fn get(&self, id: &str, cwd: &Path) -> Result<Box<dyn ScmClient>, ScmError> {
        self.clients
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, factory)| factory(cwd))
            .ok_or_else(|| ScmError::UnknownClient(id.to_string()))
    }

    /// Finds the first client whose repository contains `cwd`.
    pub fn detect(&self, cwd: &Path) -> Option<(Box<dyn ScmClient>, RepositoryInfo)> {
        for (id, factory) in &self.clients {
            let client = factory(cwd);
            match client.get_repository_info() {
                Ok(Some(repository_info)) => {
                    debug!("Detected {} repository at '{}'", client.name(), cwd.display());
                    return Some((client, repository_info));
                }
                Ok(None) => {}
                Err(e) => debug!("  Skipping SCM client '{}': {}", id, e),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullClient;

    impl ScmClient for NullClient {
        fn scmclient_id(&self) -> &'static str {
            "null"
        }

        fn name(&self) -> &'static str {
            "Null"
        }

        fn check_dependencies(&self) -> Result<(), ScmError> {
            Ok(())
        }

        fn get_repository_info(&self) -> Result<Option<RepositoryInfo>, ScmError> {
            Ok(Some(RepositoryInfo::new("null://")))
        }

        fn diff(&self, _request: &DiffRequest) -> Result<DiffResult, ScmError> {
            Ok(DiffResult::default())
        }

        fn has_pending_changes(&self) -> Result<bool, ScmError> {
            Ok(false)
        }
    }

    #[test]
    fn registry_lookup_and_detection() {
        let mut registry = ScmRegistry::new();
        registry.register("null", |_| Box::new(NullClient));
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["null"]);

        let client = registry.get("null", Path::new(".")).unwrap();
        assert_eq!(client.scmclient_id(), "null");
        assert!(!client.patcher_backend().can_commit());
        assert!(matches!(
            client.get_current_branch(),
            Err(ScmError::Unsupported { .. })
        ));

        let (client, info) = registry.detect(Path::new(".")).unwrap();
        assert_eq!(client.name(), "Null");
        assert_eq!(info.path, "null://");
    }

    #[test]
    fn register_replaces_existing_id() {
        let mut registry = ScmRegistry::with_defaults();
        registry.register("git", |_| Box::new(NullClient));
        assert_eq!(registry.ids().count(), 1);
        assert_eq!(registry.get("git", Path::new(".")).unwrap().name(), "Null");
    }
}
