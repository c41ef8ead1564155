//! Shared harness for CLI specs: an isolated meow home per test.

use assert_cmd::Command;
use std::path::{Path, PathBuf};

pub struct MeowHome {
    pub dir: tempfile::TempDir,
}

impl MeowHome {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("workflows")).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a workflow file into the isolated workflow dir.
    pub fn workflow(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path().join("workflows").join(format!("{}.toml", name));
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.path().join("runs")
    }

    /// A `meow` command wired to this isolated home.
    pub fn meow(&self) -> Command {
        let mut cmd = Command::cargo_bin("meow").unwrap();
        cmd.env("MEOW_RUNS_DIR", self.runs_dir())
            .env("MEOW_WORKFLOW_DIR", self.path().join("workflows"))
            .env("MEOW_ADAPTER_DIR", self.path().join("adapters"))
            .env("XDG_STATE_HOME", self.path().join("state"))
            .env_remove("MEOW_SOCKET")
            .env_remove("MEOW_AGENT_ID")
            .current_dir(self.path());
        cmd
    }

    /// Load a persisted run document as JSON.
    pub fn run_doc(&self, run_id: &str) -> serde_json::Value {
        let raw = std::fs::read_to_string(self.runs_dir().join(format!("{}.json", run_id)))
            .unwrap();
        serde_json::from_str(&raw).unwrap()
    }
}

/// Extract the run id a successful `meow run` printed on stdout.
pub fn run_id_from(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
