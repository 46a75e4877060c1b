//! From a failed `go` run to diagnostics on the manifest.

use modcache::core::ModError;
use modcache::diagnostic::{DiagnosticCategory, DiagnosticKind};
use modcache::test_utils::ScriptedRunner;
use serde_json::json;

use crate::common::{MANIFEST, TestSession};

#[tokio::test]
async fn test_failed_listing_maps_to_require_statement() {
    let t = TestSession::new(
        "s1",
        ScriptedRunner::new().fail("list", "go: example.com@v1.2.2: module lookup disabled by GOPROXY=off"),
    );
    let fh = t.write("/w/go.mod", MANIFEST);
    let snapshot = t.snapshot("/w");

    let ModError::GoCommand {
        stderr,
        ..
    } = snapshot.mod_upgrade(&fh).await.unwrap_err()
    else {
        panic!("expected a go command failure");
    };
    let diagnostics = snapshot.extract_go_command_errors(&fh, &stderr).await;

    assert_eq!(diagnostics.len(), 1);
    let diagnostic = &diagnostics[0];
    assert_eq!(diagnostic.message, "example.com@v1.2.2 has not been downloaded");
    assert_eq!((diagnostic.range.start.line, diagnostic.range.start.column), (7, 2));
    assert_eq!(diagnostic.suggested_fixes[0].title, "Download example.com@v1.2.2");
}

#[tokio::test]
async fn test_exclude_and_replace_statements_are_found() {
    let t = TestSession::new("s1", ScriptedRunner::new());
    let fh = t.write("/w/go.mod", MANIFEST);
    let snapshot = t.snapshot("/w");

    let excluded = snapshot.extract_go_command_errors(&fh, "go: bad.com/x@v1.0.0: invalid zip file").await;
    assert_eq!(excluded[0].range.start.line, 10);
    assert!(excluded[0].suggested_fixes.is_empty());

    let replaced = snapshot
        .extract_go_command_errors(&fh, "go: new.com/y@v1.1.0: missing go.sum entry; to add it:")
        .await;
    assert_eq!(replaced[0].range.start.line, 12);
    assert_eq!(replaced[0].message, "go: new.com/y@v1.1.0: missing go.sum entry; to add it:");
    assert_eq!(replaced[0].suggested_fixes.len(), 1);
}

#[tokio::test]
async fn test_unknown_dependency_falls_back_to_module_statement() {
    let t = TestSession::new("s1", ScriptedRunner::new());
    let fh = t.write("/w/go.mod", MANIFEST);
    let snapshot = t.snapshot("/w");

    let diagnostics = snapshot
        .extract_go_command_errors(&fh, "go: other.org/z@v0.1.0: reading go.mod: 404 Not Found")
        .await;
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].range.start.line, 1);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::ListError);
}

#[tokio::test]
async fn test_positions_map_against_overlay_content() {
    let t = TestSession::new("s1", ScriptedRunner::new());
    let fh = t.write("/w/go.mod", MANIFEST);
    let snapshot = t.snapshot("/w");

    // A relative path resolves next to the manifest and reads the unsaved
    // buffer, not the disk.
    let diagnostics = snapshot
        .extract_go_command_errors(&fh, "go.mod:12:1: replacement module directory does not exist")
        .await;
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].category, DiagnosticCategory::Syntax);
    assert_eq!(diagnostics[0].uri.path().to_str(), Some("/w/go.mod"));
    assert_eq!((diagnostics[0].range.start.line, diagnostics[0].range.start.column), (12, 1));
}

#[tokio::test]
async fn test_out_of_range_position_falls_through() {
    let t = TestSession::new("s1", ScriptedRunner::new());
    let fh = t.write("/w/go.mod", MANIFEST);
    let snapshot = t.snapshot("/w");

    // Line 40 is past the end, so the dependency match decides.
    let diagnostics = snapshot
        .extract_go_command_errors(&fh, "go.mod:40:1: example.com@v1.2.2: module lookup disabled by GOPROXY=off")
        .await;
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].category, DiagnosticCategory::ToolError);
    assert_eq!(diagnostics[0].range.start.line, 7);

    assert!(snapshot.extract_go_command_errors(&fh, "go.mod:40:1: boom").await.is_empty());
}

#[tokio::test]
async fn test_workspace_placeholder_is_skipped() {
    let t = TestSession::new("s1", ScriptedRunner::new());
    let fh = t.write("/w/go.mod", MANIFEST);
    let snapshot = t.snapshot("/w");

    let diagnostics = snapshot
        .extract_go_command_errors(
            &fh,
            "go: example.com/app@v0.0.0-workspace requires golang.org/x/mod@v0.4.0: missing go.sum entry; to add it:",
        )
        .await;
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].range.start.line, 6);
    assert_eq!(diagnostics[0].suggested_fixes[0].title, "Download golang.org/x/mod@v0.4.0");
}

#[tokio::test]
async fn test_diagnostic_serializes_camel_case() {
    let t = TestSession::new("s1", ScriptedRunner::new());
    let fh = t.write("/w/go.mod", MANIFEST);
    let snapshot = t.snapshot("/w");

    let diagnostics = snapshot
        .extract_go_command_errors(&fh, "go: example.com@v1.2.2: module lookup disabled by GOPROXY=off")
        .await;
    let value = serde_json::to_value(&diagnostics[0]).unwrap();

    assert_eq!(value["category"], "tool-error");
    assert_eq!(value["kind"], "listError");
    assert_eq!(value["uri"], "/w/go.mod");
    assert_eq!(value["range"]["start"]["line"], 7);
    assert_eq!(value["suggestedFixes"][0]["command"]["arguments"], json!(["/w/go.mod", false, ["example.com@v1.2.2"]]));
}
