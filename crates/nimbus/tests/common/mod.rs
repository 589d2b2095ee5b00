use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Config with polling fast enough for the simulator
pub const FAST_CONFIG: &str = "poll:\n  interval_ms: 5\n  max_attempts: 50\ndelete_poll:\n  interval_ms: 5\n  max_attempts: 50\nscope: cli-test\n";

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_config(&self, content: &str) -> PathBuf {
        let path = self.root.path().join("nimbus.yaml");
        fs::write(&path, content).unwrap();
        path
    }

    pub fn fast(&self) -> PathBuf {
        self.write_config(FAST_CONFIG)
    }
}
