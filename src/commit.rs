//! Commit metadata for applied patches.

use crate::patch::{Patch, PatchAuthor};
use log::debug;

const REVIEWED_AT_PREFIX: &str = "Reviewed at ";
const REVERT_PREFIX: &str = "[Revert] ";

/// The parts of a review request used to build commit metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequestInfo {
    /// The review request ID.
    pub id: u64,
    /// The one-line summary.
    pub summary: String,
    /// The full description.
    pub description: String,
    /// Notes on how the change was tested. May be empty.
    pub testing_done: String,
    /// IDs of the bugs the change closes.
    pub bugs_closed: Vec<String>,
    /// The URL of the review request.
    pub absolute_url: String,
    /// The user who posted the review request.
    pub submitter: PatchAuthor,
}

/// Builds a commit message from a review request.
///
/// The message contains the summary (unless the description already starts
/// with it), the description, testing notes, closed bugs, and a link back to
/// the review request, separated by blank lines.
///
/// # Example
///
/// ```
/// # use revpatch::{extract_commit_message, PatchAuthor, ReviewRequestInfo};
/// let review_request = ReviewRequestInfo {
///     id: 42,
///     summary: "Fix the frobnicator".to_string(),
///     description: "It was broken.".to_string(),
///     testing_done: "Ran the tests.".to_string(),
///     bugs_closed: vec!["123".to_string(), "456".to_string()],
///     absolute_url: "https://reviews.example.com/r/42/".to_string(),
///     submitter: PatchAuthor::new("Jane Doe", "jane@example.com"),
/// };
///
/// assert_eq!(
///     extract_commit_message(&review_request),
///     "Fix the frobnicator\n\n\
///      It was broken.\n\n\
///      Testing Done:\nRan the tests.\n\n\
///      Bugs closed: 123, 456\n\n\
///      Reviewed at https://reviews.example.com/r/42/"
/// );
/// ```
pub fn extract_commit_message(review_request: &ReviewRequestInfo) -> String {
    let mut info = Vec::new();

    if !review_request
        .description
        .starts_with(&review_request.summary)
    {
        info.push(review_request.summary.clone());
    }

    info.push(review_request.description.clone());

    if !review_request.testing_done.is_empty() {
        info.push(format!("Testing Done:\n{}", review_request.testing_done));
    }

    if !review_request.bugs_closed.is_empty() {
        info.push(format!(
            "Bugs closed: {}",
            review_request.bugs_closed.join(", ")
        ));
    }

    info.push(format!("{}{}", REVIEWED_AT_PREFIX, review_request.absolute_url));
    info.join("\n\n")
}

/// The author and message given to patches that don't carry their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitDefaults {
    /// The default commit author.
    pub author: PatchAuthor,
    /// The default commit message.
    pub message: String,
}

impl CommitDefaults {
    /// Uses an explicit author and message.
    pub fn new(author: PatchAuthor, message: impl Into<String>) -> Self {
        Self {
            author,
            message: message.into(),
        }
    }

    /// Uses the submitter of a review request as the author, and
    /// [`extract_commit_message`] as the message.
    pub fn from_review_request(review_request: &ReviewRequestInfo) -> Self {
        Self::new(
            review_request.submitter.clone(),
            extract_commit_message(review_request),
        )
    }
}

/// Fills in commit metadata on a list of patches.
///
/// - A single patch always takes the defaults as-is.
/// - When squashing several patches, every patch takes the default author
///   and a numbered default message (`[i/N] message`).
/// - Otherwise only patches missing an author or message take the defaults,
///   again with a numbered message.
///
/// When reverting, every message is then prefixed with `[Revert] `.
///
/// # Example
///
/// ```
/// # use revpatch::{prepare_patches_for_commit, CommitDefaults, Patch, PatchAuthor};
/// let author = PatchAuthor::new("Jane Doe", "jane@example.com");
/// let defaults = CommitDefaults::new(author.clone(), "Fix things");
///
/// let mut patches = vec![
///     Patch::from_content("...").with_author(author.clone()).with_message("Own message"),
///     Patch::from_content("..."),
/// ];
/// prepare_patches_for_commit(&mut patches, &defaults, false, false);
///
/// assert_eq!(patches[0].message.as_deref(), Some("Own message"));
/// assert_eq!(patches[1].message.as_deref(), Some("[2/2] Fix things"));
/// assert_eq!(patches[1].author, Some(author));
/// ```
pub fn prepare_patches_for_commit(
    patches: &mut [Patch],
    defaults: &CommitDefaults,
    squash: bool,
    revert: bool,
) {
    let total_patches = patches.len();

    if total_patches == 1 {
        patches[0].author = Some(defaults.author.clone());
        patches[0].message = Some(defaults.message.clone());
    } else {
        for (i, patch) in patches.iter_mut().enumerate() {
            if squash || patch.author.is_none() || patch.message.is_none() {
                debug!(
                    "  Using default commit metadata for patch {} of {}",
                    i + 1,
                    total_patches
                );
                patch.author = Some(defaults.author.clone());
                patch.message = Some(format!("[{}/{}] {}", i + 1, total_patches, defaults.message));
            }
        }
    }

    if revert {
        for patch in patches.iter_mut() {
            let message = patch.message.as_deref().unwrap_or_default();
            patch.message = Some(format!("{}{}", REVERT_PREFIX, message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(name: &str) -> PatchAuthor {
        PatchAuthor::new(name, format!("{}@example.com", name.to_lowercase()))
    }

    fn defaults() -> CommitDefaults {
        CommitDefaults::new(author("Default"), "Default message")
    }

    fn messages(patches: &[Patch]) -> Vec<Option<&str>> {
        patches.iter().map(|p| p.message.as_deref()).collect()
    }

    #[test]
    fn single_patch_always_overwritten() {
        let mut patches =
            vec![Patch::from_content("x").with_author(author("Own")).with_message("Own message")];
        prepare_patches_for_commit(&mut patches, &defaults(), false, false);
        assert_eq!(patches[0].author, Some(author("Default")));
        assert_eq!(messages(&patches), vec![Some("Default message")]);
    }

    #[test]
    fn squash_numbers_every_patch() {
        let mut patches = vec![
            Patch::from_content("x").with_author(author("Own")).with_message("Own message"),
            Patch::from_content("y"),
            Patch::from_content("z"),
        ];
        prepare_patches_for_commit(&mut patches, &defaults(), true, false);
        assert_eq!(
            messages(&patches),
            vec![
                Some("[1/3] Default message"),
                Some("[2/3] Default message"),
                Some("[3/3] Default message"),
            ]
        );
        assert!(patches.iter().all(|p| p.author == Some(author("Default"))));
    }

    #[test]
    fn only_missing_metadata_is_filled() {
        let mut patches = vec![
            Patch::from_content("x").with_message("Has message only"),
            Patch::from_content("y").with_author(author("Own")).with_message("Complete"),
        ];
        prepare_patches_for_commit(&mut patches, &defaults(), false, false);
        assert_eq!(
            messages(&patches),
            vec![Some("[1/2] Default message"), Some("Complete")]
        );
        assert_eq!(patches[1].author, Some(author("Own")));
    }

    #[test]
    fn revert_prefixes_every_message() {
        let mut patches = vec![
            Patch::from_content("x").with_author(author("Own")).with_message("First"),
            Patch::from_content("y"),
        ];
        prepare_patches_for_commit(&mut patches, &defaults(), false, true);
        assert_eq!(
            messages(&patches),
            vec![Some("[Revert] First"), Some("[Revert] [2/2] Default message")]
        );
    }

    #[test]
    fn summary_omitted_when_description_repeats_it() {
        let review_request = ReviewRequestInfo {
            id: 1,
            summary: "Add caching".to_string(),
            description: "Add caching to the loader.".to_string(),
            testing_done: String::new(),
            bugs_closed: Vec::new(),
            absolute_url: "https://reviews.example.com/r/1/".to_string(),
            submitter: author("Submitter"),
        };
        let defaults = CommitDefaults::from_review_request(&review_request);
        assert_eq!(
            defaults.message,
            "Add caching to the loader.\n\nReviewed at https://reviews.example.com/r/1/"
        );
        assert_eq!(defaults.author, author("Submitter"));
    }
}
