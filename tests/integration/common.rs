//! Shared setup for the integration tests.

use modcache::cache::{Session, Snapshot, View};
use modcache::source::{FileHandle, OverlayFileSource};
use modcache::span::Uri;
use modcache::test_utils::{ScriptedRunner, init_test_logging};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const MANIFEST: &str = "module example.com/app

go 1.21

require (
\tgolang.org/x/mod v0.4.0
\texample.com v1.2.2
)

exclude bad.com/x v1.0.0

replace old.com/y v1.0.0 => new.com/y v1.1.0
";

/// Two blocks, one per requirement of [`MANIFEST`].
pub const WHY_OUTPUT: &str = "# golang.org/x/mod\nexample.com/app\ngolang.org/x/mod/modfile\n\n\
# example.com\n(main module does not need module example.com)\n";

pub const LIST_OUTPUT: &str = r#"{"Path": "example.com/app", "Main": true}
{"Path": "golang.org/x/mod", "Version": "v0.4.0", "Update": {"Path": "golang.org/x/mod", "Version": "v0.17.0"}}
{"Path": "example.com", "Version": "v1.2.2"}
"#;

/// A runner that knows both derived verbs.
pub fn runner() -> ScriptedRunner {
    ScriptedRunner::new().respond("mod", WHY_OUTPUT).respond("list", LIST_OUTPUT)
}

/// One session over an overlay file source.
pub struct TestSession {
    pub files: Arc<OverlayFileSource>,
    pub runner: Arc<ScriptedRunner>,
    pub session: Arc<Session>,
}

impl TestSession {
    pub fn new(id: &str, runner: ScriptedRunner) -> Self {
        init_test_logging(None);
        let files = Arc::new(OverlayFileSource::new());
        let runner = Arc::new(runner);
        let session = Session::new(id, files.clone(), runner.clone());
        Self {
            files,
            runner,
            session,
        }
    }

    pub fn snapshot(&self, root: &str) -> Arc<Snapshot> {
        self.snapshot_with_env(root, BTreeMap::new())
    }

    pub fn snapshot_with_env(&self, root: &str, env: BTreeMap<String, String>) -> Arc<Snapshot> {
        self.session.new_snapshot(Arc::new(View::new(root, env, false)))
    }

    /// Sets `path` to `content` and returns its handle.
    pub fn write(&self, path: &str, content: &str) -> Arc<dyn FileHandle> {
        self.files.set_overlay(Uri::from_path(path), content.as_bytes().to_vec())
    }
}
