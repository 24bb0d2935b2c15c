use indoc::indoc;
use revpatch::{parse_patch_output, OutputClassifier, ParsedPatchOutput, PatchDialect};

fn files(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[test]
fn test_parse_empty_output() {
    assert_eq!(parse_patch_output(b""), ParsedPatchOutput::default());
}

#[test]
fn test_parse_successful_output() {
    let output = indoc! {"
        patching file foo.c
        patching file subdir/bar.txt
    "};
    assert_eq!(
        parse_patch_output(output.as_bytes()),
        ParsedPatchOutput {
            patched_files: files(&["foo.c", "subdir/bar.txt"]),
            ..Default::default()
        }
    );
}

#[test]
fn test_parse_gnu_fatal_error() {
    let output = indoc! {"
        patch: **** something bad happened
        oh no.
    "};
    assert_eq!(
        parse_patch_output(output.as_bytes()),
        ParsedPatchOutput {
            fatal_error: Some("patch: **** something bad happened\noh no.".to_string()),
            ..Default::default()
        }
    );
}

#[test]
fn test_parse_bsd_fatal_error() {
    let output = indoc! {"
        I can't seem to find a patch in there anywhere.
        oh no.
    "};
    assert_eq!(
        parse_patch_output(output.as_bytes()),
        ParsedPatchOutput {
            fatal_error: Some("I can't seem to find a patch in there anywhere.\noh no.".to_string()),
            has_empty_files: true,
            ..Default::default()
        }
    );
}

#[test]
fn test_parse_gnu_empty_files() {
    let parsed = parse_patch_output(b"patch: **** Only garbage was found in the patch input.");
    assert!(parsed.has_empty_files);
    assert_eq!(
        parsed.fatal_error.as_deref(),
        Some("patch: **** Only garbage was found in the patch input.")
    );
}

#[test]
fn test_parse_empty_files_with_custom_tool_name() {
    let parsed = parse_patch_output(b"gpatch: **** Only garbage was found in the patch input.");
    assert!(parsed.has_empty_files);
    assert!(parsed.fatal_error.is_some());
}

#[test]
fn test_parse_bsd_empty_files() {
    let parsed = parse_patch_output(b"I can't seem to find a patch in there anywhere.");
    assert!(parsed.has_empty_files);
    assert_eq!(
        parsed.fatal_error.as_deref(),
        Some("I can't seem to find a patch in there anywhere.")
    );
}

#[test]
fn test_parse_gnu_conflicts() {
    let output = indoc! {"
        patching file subdir/bar.txt
        2 out of 2 hunks failed--saving rejects to subdir/bar.txt.rej
    "};
    assert_eq!(
        parse_patch_output(output.as_bytes()),
        ParsedPatchOutput {
            conflicting_files: files(&["subdir/bar.txt"]),
            patched_files: files(&["subdir/bar.txt"]),
            ..Default::default()
        }
    );
}

#[test]
fn test_parse_bsd_conflicts() {
    let output = indoc! {"
        patching file subdir/bar.txt
        2 out of 2 hunks FAILED -- saving rejects to file subdir/bar.txt.rej
    "};
    assert_eq!(
        parse_patch_output(output.as_bytes()),
        ParsedPatchOutput {
            conflicting_files: files(&["subdir/bar.txt"]),
            patched_files: files(&["subdir/bar.txt"]),
            ..Default::default()
        }
    );
}

#[test]
fn test_parse_gnu_conflicts_partial() {
    let output = indoc! {"
        patching file subdir/bar.txt
        1 out of 2 hunks failed--saving rejects to subdir/bar.txt.rej
    "};
    let parsed = parse_patch_output(output.as_bytes());
    assert_eq!(parsed.conflicting_files, files(&["subdir/bar.txt"]));
    assert!(parsed.has_partial_applied_files);
}

#[test]
fn test_parse_bsd_conflicts_partial() {
    let output = indoc! {"
        patching file subdir/bar.txt
        1 out of 2 hunks FAILED -- saving rejects to file subdir/bar.txt.rej
    "};
    let parsed = parse_patch_output(output.as_bytes());
    assert_eq!(parsed.conflicting_files, files(&["subdir/bar.txt"]));
    assert!(parsed.has_partial_applied_files);
}

#[test]
fn test_parse_conflicts_in_one_of_several_files_is_partial() {
    let output = indoc! {"
        patching file test1.txt
        Hunk #1 FAILED at 1.
        1 out of 1 hunk FAILED -- saving rejects to file test1.txt.rej
        patching file test2.txt
    "};
    let parsed = parse_patch_output(output.as_bytes());
    assert_eq!(parsed.patched_files, files(&["test1.txt", "test2.txt"]));
    assert_eq!(parsed.conflicting_files, files(&["test1.txt"]));
    assert!(parsed.has_partial_applied_files);
    assert_eq!(parsed.fatal_error, None);
}

#[test]
fn test_parse_renamed_and_copied_files() {
    let output = indoc! {"
        patching file new_binary.bin (renamed from old_binary.bin)
        patching file 'copy of a.txt' (copied from a.txt)
    "};
    let parsed = parse_patch_output(output.as_bytes());
    assert_eq!(
        parsed.patched_files,
        files(&["new_binary.bin", "copy of a.txt"])
    );
    assert!(parsed.conflicting_files.is_empty());
}

#[test]
fn test_parse_is_idempotent() {
    let output = indoc! {"
        patching file a.txt
        patching file b.txt
        1 out of 3 hunks FAILED -- saving rejects to file b.txt.rej
    "};
    let classifier = OutputClassifier::default();
    assert_eq!(
        classifier.classify(output.as_bytes()),
        classifier.classify(output.as_bytes())
    );
}

#[test]
fn test_parse_invalid_utf8_is_lossy() {
    let parsed = parse_patch_output(b"patching file caf\xe9.txt\n");
    assert_eq!(parsed.patched_files, files(&["caf\u{fffd}.txt"]));
}

#[test]
fn test_classifier_with_single_dialect() {
    let classifier = OutputClassifier::new(vec![PatchDialect::bsd()]);
    let parsed = classifier.classify(b"patch: **** Only garbage was found in the patch input.");
    assert!(!parsed.has_empty_files);
    assert_eq!(parsed.fatal_error, None);

    let parsed = classifier.classify(b"Patching file foo.txt using Plan A...\n");
    assert_eq!(parsed.patched_files, files(&["foo.txt"]));
}
