//! Derived-info caches: one `go` run per key, shared by every caller.

use anyhow::Result;
use futures::future::join_all;
use modcache::core::ModError;
use modcache::gocmd::RunMode;
use modcache::test_utils::{ManifestFixture, ProjectFixture, ScriptedRunner};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{MANIFEST, TestSession, WHY_OUTPUT, runner};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_why_runs_go_once() -> Result<()> {
    let t = TestSession::new("s1", runner().with_delay(Duration::from_millis(50)));
    let fh = t.write("/w/go.mod", MANIFEST);
    let snapshot = t.snapshot("/w");

    let results = join_all((0..8).map(|_| {
        let snapshot = snapshot.clone();
        let fh = fh.clone();
        tokio::spawn(async move { snapshot.mod_why(&fh).await })
    }))
    .await;

    let first = results[0].as_ref().unwrap().as_ref().unwrap().clone();
    for result in &results {
        assert!(Arc::ptr_eq(&first, result.as_ref().unwrap().as_ref().unwrap()));
    }
    assert_eq!(t.runner.call_count(), 1);
    assert_eq!(first.len(), 2);
    assert!(first["golang.org/x/mod"].starts_with("# golang.org/x/mod"));
    assert!(first["example.com"].contains("does not need"));
    Ok(())
}

#[tokio::test]
async fn test_why_invocation_shape() -> Result<()> {
    let env = BTreeMap::from([("GOFLAGS".to_string(), "-mod=mod".to_string())]);
    let t = TestSession::new("s1", runner());
    let fh = t.write("/w/go.mod", MANIFEST);
    let snapshot = t.snapshot_with_env("/w", env);

    snapshot.mod_why(&fh).await?;

    let invocations = t.runner.invocations();
    assert_eq!(invocations.len(), 1);
    let why = &invocations[0];
    assert_eq!(why.verb, "mod");
    assert_eq!(why.args, ["why", "-m", "golang.org/x/mod", "example.com"]);
    assert_eq!(why.working_dir, Some(PathBuf::from("/w")));
    assert_eq!(why.mod_flag, None);
    assert_eq!(why.run_mode, RunMode::NORMAL);
    assert!(why.env.contains(&("GOFLAGS".to_string(), "-mod=mod".to_string())));
    assert!(why.effective_env().contains(&("GOPROXY".to_string(), "off".to_string())));
    Ok(())
}

#[tokio::test]
async fn test_upgrade_lists_with_network_and_readonly() -> Result<()> {
    let t = TestSession::new("s1", runner());
    let fh = t.write("/w/go.mod", MANIFEST);
    let snapshot = t.snapshot("/w");

    let upgrades = snapshot.mod_upgrade(&fh).await?;
    assert_eq!(upgrades.len(), 1);
    assert_eq!(upgrades["golang.org/x/mod"], "v0.17.0");

    let list = &t.runner.invocations()[0];
    assert_eq!(list.command_line(), ["list", "-mod=readonly", "-u", "-m", "-json", "all"]);
    assert_eq!(list.run_mode, RunMode::ALLOW_NETWORK);
    assert!(!list.effective_env().iter().any(|(k, _)| k == "GOPROXY"));
    Ok(())
}

#[tokio::test]
async fn test_upgrade_readonly_follows_temp_modfile_and_vendor() -> Result<()> {
    let project = ProjectFixture::new(&ManifestFixture::basic())?;
    let t = TestSession::new("s1", runner());
    let view = modcache::cache::View::new(project.root(), BTreeMap::new(), true);
    let snapshot = t.session.new_snapshot(Arc::new(view));
    let fh = snapshot.get_file(&modcache::span::Uri::from_path(&project.manifest)).await?;

    snapshot.mod_upgrade(&fh).await?;
    assert_eq!(t.runner.invocations()[0].mod_flag, None);

    // The vendor directory is not part of the key; a second session forces a
    // fresh run.
    let project = project.with_vendor()?;
    let t = TestSession::new("s2", runner());
    let view = modcache::cache::View::new(project.root(), BTreeMap::new(), true);
    let snapshot = t.session.new_snapshot(Arc::new(view));
    let fh = snapshot.get_file(&modcache::span::Uri::from_path(&project.manifest)).await?;

    snapshot.mod_upgrade(&fh).await?;
    assert_eq!(t.runner.invocations()[0].mod_flag.as_deref(), Some("readonly"));
    Ok(())
}

#[tokio::test]
async fn test_key_changes_force_new_runs() -> Result<()> {
    let t = TestSession::new("s1", runner());
    let fh = t.write("/w/go.mod", MANIFEST);

    let base = t.snapshot("/w");
    base.mod_why(&fh).await?;
    assert_eq!(t.runner.call_count(), 1);

    // Another snapshot of the same view shares the key.
    let same = t.snapshot("/w");
    same.mod_why(&fh).await?;
    assert_eq!(t.runner.call_count(), 1);

    // Different environment fingerprint.
    let env = BTreeMap::from([("GOFLAGS".to_string(), "-tags=x".to_string())]);
    let with_env = t.snapshot_with_env("/w", env);
    with_env.mod_why(&fh).await?;
    assert_eq!(t.runner.call_count(), 2);

    // Different view root.
    let other_root = t.snapshot("/other");
    other_root.mod_why(&fh).await?;
    assert_eq!(t.runner.call_count(), 3);

    // Different content.
    let edited = t.write("/w/go.mod", &MANIFEST.replace("v1.2.2", "v1.2.3"));
    base.mod_why(&edited).await?;
    assert_eq!(t.runner.call_count(), 4);

    // Different session, same everything else.
    let other = TestSession::new("s2", runner());
    let fh = other.write("/w/go.mod", MANIFEST);
    other.snapshot("/w").mod_why(&fh).await?;
    assert_eq!(other.runner.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_why_and_upgrade_are_independent_keys() -> Result<()> {
    let t = TestSession::new("s1", runner());
    let fh = t.write("/w/go.mod", MANIFEST);
    let snapshot = t.snapshot("/w");

    snapshot.mod_why(&fh).await?;
    snapshot.mod_upgrade(&fh).await?;
    snapshot.mod_why(&fh).await?;
    snapshot.mod_upgrade(&fh).await?;

    let verbs: Vec<String> = t.runner.invocations().into_iter().map(|i| i.verb).collect();
    assert_eq!(verbs, ["mod", "list"]);
    Ok(())
}

#[tokio::test]
async fn test_non_manifest_is_rejected_without_running() {
    let t = TestSession::new("s1", runner());
    let fh = t.write("/w/main.go", "package main\n");
    let snapshot = t.snapshot("/w");

    assert!(matches!(snapshot.mod_why(&fh).await, Err(ModError::NotAManifest { .. })));
    assert!(matches!(snapshot.mod_upgrade(&fh).await, Err(ModError::NotAManifest { .. })));
    assert_eq!(t.runner.call_count(), 0);
}

#[tokio::test]
async fn test_no_requirements_skips_the_tool() -> Result<()> {
    let t = TestSession::new("s1", runner());
    let fh = t.write("/w/go.mod", "module example.com/app\n\ngo 1.21\n");
    let snapshot = t.snapshot("/w");

    assert!(snapshot.mod_why(&fh).await?.is_empty());
    assert!(snapshot.mod_upgrade(&fh).await?.is_empty());
    assert_eq!(t.runner.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_mismatched_why_output_is_cached_error() {
    let t = TestSession::new("s1", ScriptedRunner::new().respond("mod", "# golang.org/x/mod\nexample.com/app\n"));
    let fh = t.write("/w/go.mod", MANIFEST);
    let snapshot = t.snapshot("/w");

    for _ in 0..2 {
        assert!(matches!(
            snapshot.mod_why(&fh).await,
            Err(ModError::MismatchedWhyResults { got: 1, want: 2 })
        ));
    }
    assert_eq!(t.runner.call_count(), 1);
}

#[tokio::test]
async fn test_tool_failure_is_cached_and_reported_raw() {
    let stderr = "go: example.com@v1.2.2: missing go.sum entry; to add it:\n\tgo mod download example.com";
    let t = TestSession::new("s1", ScriptedRunner::new().fail("list", stderr));
    let fh = t.write("/w/go.mod", MANIFEST);
    let snapshot = t.snapshot("/w");

    let first = snapshot.mod_upgrade(&fh).await.unwrap_err();
    let second = snapshot.mod_upgrade(&fh).await.unwrap_err();
    assert_eq!(first.to_string(), stderr);
    assert_eq!(second.to_string(), stderr);
    assert_eq!(t.runner.call_count(), 1);
}

#[tokio::test]
async fn test_grammar_error_fails_derived_without_running() {
    let t = TestSession::new("s1", runner());
    let fh = t.write("/w/go.mod", "module example.com/app\nrequire\n");
    let snapshot = t.snapshot("/w");

    let error = snapshot.mod_why(&fh).await.unwrap_err();
    assert!(matches!(error, ModError::ManifestSyntax { .. }));
    assert_eq!(t.runner.call_count(), 0);
}

#[tokio::test]
async fn test_why_blocks_pair_positionally() -> Result<()> {
    let t = TestSession::new("s1", runner());
    let fh = t.write("/w/go.mod", MANIFEST);
    let why = t.snapshot("/w").mod_why(&fh).await?;

    let blocks: Vec<&str> = WHY_OUTPUT.split("\n\n").collect();
    assert_eq!(why["golang.org/x/mod"], blocks[0]);
    assert_eq!(why["example.com"], blocks[1]);
    Ok(())
}
