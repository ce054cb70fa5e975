//! Shared helpers for driving a real `agentd` subprocess against an
//! isolated state directory.

use assert_cmd::cargo::CommandCargoExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::{Duration, Instant};

/// A disposable `agentd` deployment: its own state directory and config
/// file, pointed at by a spawned (but not yet started) `Command`.
pub struct Harness {
    pub tmp: tempfile::TempDir,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
}

impl Harness {
    /// Writes a config TOML overriding only `state_dir` plus fast poll and
    /// heartbeat intervals, so tests don't wait out the production
    /// defaults (250ms poll / 5s heartbeat).
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let state_dir = tmp.path().join("state");
        let config_path = tmp.path().join("agentd.toml");
        let body =
            format!("state_dir = {:?}\ndaemon_poll_ms = 20\ndaemon_heartbeat_interval_ms = 50\n", state_dir);
        fs::write(&config_path, body).expect("write config");
        Self { tmp, state_dir, config_path }
    }

    pub fn request_dir(&self) -> PathBuf {
        self.state_dir.join("agent_requests")
    }

    pub fn response_dir(&self) -> PathBuf {
        self.state_dir.join("agent_responses")
    }

    pub fn heartbeat_path(&self) -> PathBuf {
        self.state_dir.join("heartbeat")
    }

    pub fn daemon_status_path(&self) -> PathBuf {
        self.state_dir.join("daemon_status.json")
    }

    /// Writes `<id>.json` into the request spool, creating the directory
    /// if this is the first request.
    pub fn write_request(&self, id: &str, prompt: &str) {
        fs::create_dir_all(self.request_dir()).expect("create request dir");
        let body = serde_json::json!({
            "id": "ignored-by-pickup",
            "prompt": prompt,
            "modelCapabilities": { "contextLength": 8000 },
        });
        fs::write(
            self.request_dir().join(format!("{id}.json")),
            serde_json::to_vec_pretty(&body).unwrap(),
        )
        .expect("write request file");
    }

    pub fn write_cancel(&self, id: &str) {
        fs::create_dir_all(self.request_dir()).expect("create request dir");
        fs::write(self.request_dir().join(format!("{id}.cancel")), b"").expect("write cancel marker");
    }

    /// Spawns `agentd` pointed at this harness's config file, wrapped in a
    /// [`ChildGuard`] so a panicking test still can't leak the process.
    pub fn spawn(&self) -> ChildGuard {
        let mut cmd = Command::cargo_bin("agentd").expect("locate agentd binary");
        cmd.arg(&self.config_path);
        ChildGuard(cmd.spawn().expect("spawn agentd"))
    }
}

/// Kills the wrapped child on drop so a test that panics mid-assertion
/// never leaves a live `agentd` polling a deleted temp directory.
pub struct ChildGuard(pub Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// Sends SIGTERM (or, off unix, kills outright) and waits for the process
/// to exit, returning its exit status.
pub fn stop(child: &mut ChildGuard) -> std::process::ExitStatus {
    #[cfg(unix)]
    {
        let pid = nix::unistd::Pid::from_raw(child.0.id() as i32);
        let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
    }
    #[cfg(not(unix))]
    {
        let _ = child.0.kill();
    }
    child.0.wait().expect("wait for agentd to exit")
}

/// Polls `predicate` every 10ms until it returns true or `timeout` elapses.
/// Returns whether it converged, so callers can assert with a clear
/// message instead of panicking deep inside this helper.
pub fn wait_for(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    loop {
        if predicate() {
            return true;
        }
        if start.elapsed() > timeout {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

pub fn read_json(path: &Path) -> serde_json::Value {
    let content = fs::read_to_string(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()));
    serde_json::from_str(&content).unwrap_or_else(|e| panic!("parse {}: {e}", path.display()))
}
