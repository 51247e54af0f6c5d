//! Test-runner integration: browsers created during a test register here so
//! their state can be dumped when the test fails.

use crate::core::config::ArtifactConfig;
use crate::core::driver::Driver;
use crate::errors::Result;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Weak;
use tracing::{info, warn};

/// Anything that can write its current state to disk.
pub trait StateDump {
    fn dump_state(&mut self, artifacts: &ArtifactConfig, name: &str) -> Result<Vec<PathBuf>>;
}

impl<D: Driver> StateDump for D {
    fn dump_state(&mut self, artifacts: &ArtifactConfig, name: &str) -> Result<Vec<PathBuf>> {
        self.save_state(artifacts, name)
    }
}

struct Registered {
    session: Weak<RefCell<dyn StateDump>>,
    artifacts: ArtifactConfig,
}

thread_local! {
    static REGISTRY: RefCell<Vec<Registered>> = RefCell::new(Vec::new());
}

pub fn register(session: Weak<RefCell<dyn StateDump>>, artifacts: ArtifactConfig) {
    REGISTRY.with(|registry| registry.borrow_mut().push(Registered { session, artifacts }));
}

/// Browsers registered on this thread that are still alive.
pub fn registered() -> usize {
    REGISTRY.with(|registry| {
        registry
            .borrow()
            .iter()
            .filter(|entry| entry.session.strong_count() > 0)
            .count()
    })
}

fn drain() -> Vec<Registered> {
    REGISTRY.with(|registry| registry.borrow_mut().drain(..).collect())
}

/// Dumps every live registered browser under `test_name` and empties the
/// registry. Dump errors are logged, never raised.
pub fn dump_registered(test_name: &str) -> Vec<PathBuf> {
    let name = normalize_test_name(test_name);
    let mut written = Vec::new();
    for (index, entry) in drain().into_iter().enumerate() {
        let session = match entry.session.upgrade() {
            Some(session) => session,
            None => continue,
        };
        let file_name = if index == 0 {
            name.clone()
        } else {
            format!("{}-{}", name, index)
        };
        // a test that panicked mid-interaction may still hold the session
        let result = match session.try_borrow_mut() {
            Ok(mut session) => session.dump_state(&entry.artifacts, &file_name),
            Err(_) => {
                warn!(test = %name, "browser busy, state not dumped");
                continue;
            }
        };
        match result {
            Ok(paths) => written.extend(paths),
            Err(e) => warn!(test = %name, error = %e, "failed to dump browser state"),
        }
    }
    if !written.is_empty() {
        info!(test = %name, files = written.len(), "dumped browser state");
    }
    written
}

/// File-system friendly test identifier: data-set suffixes go, `::` becomes
/// `_`, path separators become `-`.
pub fn normalize_test_name(name: &str) -> String {
    let mut name = name.trim();
    if let Some(index) = name.find(" with data set") {
        name = &name[..index];
    }
    if name.ends_with(']') {
        if let Some(index) = name.rfind('[') {
            name = &name[..index];
        }
    }
    name.trim()
        .replace("::", "_")
        .replace(['/', '\\'], "-")
        .replace(char::is_whitespace, "_")
}

/// The four hook points, for harnesses that call them explicitly.
pub struct Hooks;

impl Hooks {
    pub fn before_first_test() {
        drain();
    }

    pub fn before_test() {
        drain();
    }

    pub fn after_test() {
        drain();
    }

    pub fn after_test_failure(test_name: &str) -> Vec<PathBuf> {
        dump_registered(test_name)
    }
}

/// Guard for plain `#[test]` functions: dumps registered browsers when the
/// test unwinds, forgets them otherwise.
pub struct FailureDump {
    name: String,
}

impl FailureDump {
    pub fn new(test_name: impl Into<String>) -> Self {
        Hooks::before_test();
        Self {
            name: test_name.into(),
        }
    }

    /// Named after the current thread, which the test harness names after
    /// the test.
    pub fn current() -> Self {
        let name = std::thread::current()
            .name()
            .unwrap_or("unnamed-test")
            .to_string();
        Self::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for FailureDump {
    fn drop(&mut self) {
        if std::thread::panicking() {
            Hooks::after_test_failure(&self.name);
        } else {
            Hooks::after_test();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    struct Fake {
        source: String,
    }

    impl StateDump for Fake {
        fn dump_state(&mut self, artifacts: &ArtifactConfig, name: &str) -> Result<Vec<PathBuf>> {
            std::fs::create_dir_all(&artifacts.source_dir)?;
            let path = artifacts.source_dir.join(format!("{}.txt", name));
            std::fs::write(&path, &self.source)?;
            Ok(vec![path])
        }
    }

    fn artifacts(dir: &tempfile::TempDir) -> ArtifactConfig {
        ArtifactConfig {
            source_dir: dir.path().join("source"),
            screenshot_dir: dir.path().join("shots"),
        }
    }

    #[test]
    fn test_normalize_test_name() {
        assert_eq!(
            normalize_test_name("tests::login::test_submit with data set #2"),
            "tests_login_test_submit"
        );
        assert_eq!(normalize_test_name("suite/case::run[3]"), "suite-case_run");
        assert_eq!(normalize_test_name("a\\b c"), "a-b_c");
    }

    #[test]
    fn test_failure_dumps_live_browsers() {
        let dir = tempfile::tempdir().unwrap();
        Hooks::before_first_test();

        let session: Rc<RefCell<dyn StateDump>> = Rc::new(RefCell::new(Fake {
            source: "<p>boom</p>".into(),
        }));
        register(Rc::downgrade(&session), artifacts(&dir));
        assert_eq!(registered(), 1);

        let written = Hooks::after_test_failure("tests::boom");
        assert_eq!(written.len(), 1);
        assert_eq!(std::fs::read_to_string(&written[0]).unwrap(), "<p>boom</p>");
        assert!(written[0].ends_with("tests_boom.txt"));
        assert_eq!(registered(), 0);
    }

    #[test]
    fn test_dropped_browsers_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        Hooks::before_test();
        {
            let session: Rc<RefCell<dyn StateDump>> =
                Rc::new(RefCell::new(Fake { source: String::new() }));
            register(Rc::downgrade(&session), artifacts(&dir));
        }
        assert_eq!(registered(), 0);
        assert!(dump_registered("gone").is_empty());
    }

    #[test]
    fn test_guard_forgets_browsers_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let session: Rc<RefCell<dyn StateDump>> =
            Rc::new(RefCell::new(Fake { source: "ok".into() }));
        {
            let guard = FailureDump::current();
            assert!(!guard.name().is_empty());
            register(Rc::downgrade(&session), artifacts(&dir));
        }
        assert_eq!(registered(), 0);
        assert!(!dir.path().join("source").exists());
    }
}
