//! The `modcache` binary against temporary projects.

use anyhow::Result;
use assert_cmd::Command;
use modcache::test_utils::fixtures::BASIC_SUM;
use modcache::test_utils::{ManifestFixture, ProjectFixture};
use predicates::prelude::*;
use std::path::{Path, PathBuf};

/// `modcache` with a config file pointing at `go_binary`.
fn modcache(project: &ProjectFixture, go_binary: &str) -> Result<Command> {
    let config = project.root().join("modcache.toml");
    std::fs::write(&config, format!("go_binary = {go_binary:?}\ncommand_timeout_secs = 30\n"))?;

    let mut cmd = Command::cargo_bin("modcache")?;
    cmd.env_remove("MODCACHE_GO").env_remove("RUST_LOG").arg("--config").arg(config);
    Ok(cmd)
}

/// Writes an executable shell script standing in for `go`.
#[cfg(unix)]
fn fake_go(dir: &Path, body: &str) -> Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-go");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

#[test]
fn test_parse_summary() -> Result<()> {
    let project = ProjectFixture::new(&ManifestFixture::basic())?.with_sum(BASIC_SUM)?;

    modcache(&project, "go")?
        .arg("parse")
        .arg(&project.manifest)
        .assert()
        .success()
        .stdout(predicate::str::contains("example.com/app"))
        .stdout(predicate::str::contains("golang.org/x/mod"))
        .stdout(predicate::str::contains("4 entries"));
    Ok(())
}

#[test]
fn test_parse_json() -> Result<()> {
    let project = ProjectFixture::new(&ManifestFixture::basic())?;

    let output = modcache(&project, "go")?.arg("parse").arg(&project.manifest).arg("--json").output()?;
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(summary["module"], "example.com/app");
    assert_eq!(summary["require"].as_array().map(Vec::len), Some(2));
    assert_eq!(summary["require"][1]["indirect"], true);
    assert!(summary["sum_entries"].is_null());
    Ok(())
}

#[test]
fn test_parse_syntax_error_reports_position() -> Result<()> {
    let project = ProjectFixture::new(&ManifestFixture::invalid_syntax())?;

    modcache(&project, "go")?
        .arg("parse")
        .arg(&project.manifest)
        .assert()
        .failure()
        .stdout(predicate::str::contains(":3:1: unknown directive: frobnicate [syntax]"))
        .stderr(predicate::str::contains("line 3, column 1"));
    Ok(())
}

#[test]
fn test_non_manifest_is_rejected() -> Result<()> {
    let project = ProjectFixture::new(&ManifestFixture::basic())?;
    let other = project.root().join("main.go");
    std::fs::write(&other, "package main\n")?;

    modcache(&project, "go")?
        .arg("why")
        .arg(&other)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Pass the path to a go.mod file"));
    Ok(())
}

#[test]
fn test_diagnose_maps_error_to_statement() -> Result<()> {
    let project = ProjectFixture::new(&ManifestFixture::basic())?;

    modcache(&project, "go")?
        .arg("diagnose")
        .arg(&project.manifest)
        .arg("go: example.com@v1.2.2: module lookup disabled by GOPROXY=off")
        .assert()
        .success()
        .stdout(predicate::str::contains(":7:2: example.com@v1.2.2 has not been downloaded [tool-error]"))
        .stdout(predicate::str::contains("Download example.com@v1.2.2"));
    Ok(())
}

#[test]
fn test_diagnose_reads_message_from_stdin() -> Result<()> {
    let project = ProjectFixture::new(&ManifestFixture::basic())?;

    modcache(&project, "go")?
        .arg("diagnose")
        .arg(&project.manifest)
        .arg("-")
        .write_stdin("go: example.com@v1.2.2: module lookup disabled by GOPROXY=off\n")
        .assert()
        .success()
        .stdout(predicate::str::contains(":7:2: example.com@v1.2.2 has not been downloaded [tool-error]"));
    Ok(())
}

#[test]
fn test_diagnose_without_match() -> Result<()> {
    let project = ProjectFixture::new(&ManifestFixture::basic())?;

    modcache(&project, "go")?
        .arg("diagnose")
        .arg(&project.manifest)
        .arg("go: something unrelated")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
    Ok(())
}

#[test]
fn test_missing_go_binary() -> Result<()> {
    let project = ProjectFixture::new(&ManifestFixture::basic())?;

    modcache(&project, "modcache-no-such-go-binary")?
        .arg("upgrades")
        .arg(&project.manifest)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Install Go"));
    Ok(())
}

#[test]
fn test_config_path_from_environment() -> Result<()> {
    let project = ProjectFixture::new(&ManifestFixture::basic())?;
    let config = project.root().join("env.toml");
    std::fs::write(&config, "go_binary = \"modcache-no-such-go-binary\"\n")?;

    Command::cargo_bin("modcache")?
        .env_remove("MODCACHE_GO")
        .env_remove("RUST_LOG")
        .env("MODCACHE_CONFIG", &config)
        .arg("upgrades")
        .arg(&project.manifest)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Install Go"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_upgrades_with_fake_go() -> Result<()> {
    let project = ProjectFixture::new(&ManifestFixture::basic())?;
    let go = fake_go(
        project.root(),
        r#"echo '{"Path": "example.com/app", "Main": true}'
echo '{"Path": "golang.org/x/mod", "Version": "v0.4.0", "Update": {"Version": "v0.17.0"}}'
echo '{"Path": "example.com", "Version": "v1.2.2"}'"#,
    )?;

    let output = modcache(&project, &go.display().to_string())?
        .arg("upgrades")
        .arg(&project.manifest)
        .arg("--json")
        .output()?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let upgrades: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(upgrades, serde_json::json!({"golang.org/x/mod": "v0.17.0"}));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_why_failure_prints_diagnostics() -> Result<()> {
    let project = ProjectFixture::new(&ManifestFixture::basic())?;
    let go = fake_go(
        project.root(),
        "echo 'go: golang.org/x/mod@v0.4.0: missing go.sum entry; to add it:' >&2\nexit 1",
    )?;

    modcache(&project, &go.display().to_string())?
        .arg("why")
        .arg(&project.manifest)
        .assert()
        .failure()
        .stdout(predicate::str::contains(":6:2: go: golang.org/x/mod@v0.4.0: missing go.sum entry"))
        .stderr(predicate::str::contains("missing go.sum entry"));
    Ok(())
}
