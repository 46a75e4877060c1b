//! Handle inheritance across snapshots.

use anyhow::Result;
use modcache::span::Uri;
use std::sync::Arc;

use crate::common::{MANIFEST, TestSession, runner};

#[tokio::test]
async fn test_unrelated_change_keeps_derived_results() -> Result<()> {
    let t = TestSession::new("s1", runner());
    let fh = t.write("/w/go.mod", MANIFEST);
    let first = t.snapshot("/w");
    let why = first.mod_why(&fh).await?;
    let parsed = first.parse_manifest(&fh).await?;

    let second = first.clone_with_changes(&[Uri::from_path("/w/main.go")]);
    drop(first);

    assert!(Arc::ptr_eq(&why, &second.mod_why(&fh).await?));
    assert!(Arc::ptr_eq(&parsed, &second.parse_manifest(&fh).await?));
    assert_eq!(t.runner.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_manifest_edit_recomputes() -> Result<()> {
    let t = TestSession::new("s1", runner());
    let fh = t.write("/w/go.mod", MANIFEST);
    let first = t.snapshot("/w");
    first.mod_why(&fh).await?;

    let edited = t.write("/w/go.mod", &MANIFEST.replace("go 1.21", "go 1.22"));
    let second = first.clone_with_changes(&[Uri::from_path("/w/go.mod")]);
    drop(first);

    let parsed = second.parse_manifest(&edited).await?;
    assert_eq!(parsed.file.go.as_ref().map(|g| g.version.as_str()), Some("1.22"));
    second.mod_why(&edited).await?;
    assert_eq!(t.runner.call_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_sum_change_drops_derived_handles() -> Result<()> {
    let t = TestSession::new("s1", runner());
    let fh = t.write("/w/go.mod", MANIFEST);
    let first = t.snapshot("/w");
    let upgrades = first.mod_upgrade(&fh).await?;

    // Relative paths resolve against the view root.
    let second = first.clone_with_changes(&[Uri::from_path("go.sum")]);

    // The old snapshot still holds the handle, so the same key is shared
    // rather than recomputed.
    assert!(Arc::ptr_eq(&upgrades, &second.mod_upgrade(&fh).await?));
    assert_eq!(t.runner.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_dropping_last_snapshot_evicts() -> Result<()> {
    let t = TestSession::new("s1", runner());
    let fh = t.write("/w/go.mod", MANIFEST);
    let snapshot = t.snapshot("/w");
    snapshot.parse_manifest(&fh).await?;
    assert_eq!(t.session.store().len(), 1);

    let next = snapshot.clone_with_changes(&[Uri::from_path("/w/go.mod")]);
    drop(snapshot);
    assert!(t.session.store().is_empty());

    next.parse_manifest(&fh).await?;
    assert_eq!(t.session.store().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_go_sum_follows_overlays() {
    let t = TestSession::new("s1", runner());
    let snapshot = t.snapshot("/w");
    let manifest = Uri::from_path("/w/go.mod");
    assert!(snapshot.go_sum(&manifest).await.is_none());

    t.write("/w/go.sum", "example.com v1.2.2 h1:abc=\n");
    let sum = snapshot.go_sum(&manifest).await.unwrap();
    assert_eq!(&*sum, b"example.com v1.2.2 h1:abc=\n");
}
