use std::path::Path;

use restorepoint::workspace::validate_workspace_path;
use restorepoint::AppError;

#[test]
fn allows_path_inside_workspace() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();

    let validated = validate_workspace_path(root, "src/lib.rs").expect("path valid");

    let canonical_root = root.canonicalize().expect("canonicalize root");
    assert!(validated.starts_with(&canonical_root));
    assert!(validated.ends_with(Path::new("src/lib.rs")));
}

#[test]
fn rejects_traversal() {
    let temp = tempfile::tempdir().expect("tempdir");

    let result = validate_workspace_path(temp.path(), "../secret.txt");

    assert!(matches!(result, Err(AppError::PathViolation(_))));
}

#[test]
fn rejects_deep_traversal() {
    let temp = tempfile::tempdir().expect("tempdir");

    let result = validate_workspace_path(temp.path(), "src/../../secret.txt");

    assert!(result.is_err());
}

#[test]
fn inner_parent_segments_are_normalized() {
    let temp = tempfile::tempdir().expect("tempdir");

    let validated =
        validate_workspace_path(temp.path(), "src/utils/../lib.rs").expect("path valid");

    assert!(validated.ends_with("src/lib.rs"));
}

#[test]
fn rejects_empty_and_root_paths() {
    let temp = tempfile::tempdir().expect("tempdir");

    assert!(validate_workspace_path(temp.path(), "").is_err());
    assert!(validate_workspace_path(temp.path(), ".").is_err());
    assert!(validate_workspace_path(temp.path(), "src/..").is_err());
}

#[cfg(unix)]
#[test]
fn rejects_symlink_escaping_workspace() {
    use std::os::unix::fs::symlink;

    let outside = tempfile::tempdir().expect("outside");
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(outside.path().join("secret.txt"), "secret").expect("write");
    symlink(outside.path().join("secret.txt"), temp.path().join("link.txt")).expect("symlink");

    let result = validate_workspace_path(temp.path(), "link.txt");

    assert!(matches!(result, Err(AppError::PathViolation(_))));
}

#[test]
fn missing_root_is_rejected() {
    let result = validate_workspace_path(Path::new("/no/such/workspace/root"), "a.txt");

    assert!(matches!(result, Err(AppError::PathViolation(_))));
}
