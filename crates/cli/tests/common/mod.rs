//! Common utilities for integration tests

#![allow(dead_code)]

use cycle::testing::{FakeEngine, FakeVcs, RecordingNotifier};
use cycle::Collaborators;
use reqwest::StatusCode;
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use vault_core::{Config, WatchConfig};

/// Vault and state directories kept apart, so state writes never reach the watcher
pub struct TestVault {
    _temp_dir: TempDir,
    pub vault: PathBuf,
    pub state: PathBuf,
}

impl TestVault {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let vault = temp_dir.path().join("vault");
        let state = temp_dir.path().join("state");
        std::fs::create_dir_all(&vault).unwrap();
        std::fs::create_dir_all(&state).unwrap();
        Self {
            _temp_dir: temp_dir,
            vault,
            state,
        }
    }

    /// Write a note, creating parent folders
    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.vault.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    /// Shortest debounce and poll interval the configuration accepts
    pub fn config(&self) -> Config {
        let mut config = Config {
            vault_path: self.vault.clone(),
            state_dir: self.state.clone(),
            watch: WatchConfig {
                debounce_secs: 1,
                poll_interval_secs: 1,
                ..WatchConfig::default()
            },
            ..Config::default()
        };
        config.health.bind = "127.0.0.1".to_string();
        config.llm.timeout_secs = 1;
        config
    }
}

pub struct Fakes {
    pub vcs: Arc<FakeVcs>,
    pub engine: Arc<FakeEngine>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Fakes {
    pub fn new(engine: FakeEngine) -> Self {
        Self {
            vcs: Arc::new(FakeVcs::new()),
            engine: Arc::new(engine),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            vcs: self.vcs.clone(),
            engine: self.engine.clone(),
            summarizer: None,
            notifier: self.notifier.clone(),
        }
    }
}

pub async fn local_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// GET a JSON endpoint of the health server
pub async fn get_json(addr: SocketAddr, path: &str) -> (StatusCode, Value) {
    let response = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
    let status = response.status();
    (status, response.json::<Value>().await.unwrap())
}

/// Poll `condition` every 100ms until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    condition()
}

/// Fail the test instead of hanging when a scenario stalls
pub async fn bounded<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(60), fut)
        .await
        .expect("scenario timed out")
}

pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn read_state_file(state: &Path, name: &str) -> Option<String> {
    std::fs::read_to_string(state.join(name)).ok()
}

/// Shell script standing in for restic. Snapshot `deadbeef` holds every
/// requested file with the contents "snapshot copy".
#[cfg(unix)]
pub fn fake_restic(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("restic");
    std::fs::write(
        &path,
        r#"#!/bin/sh
case "$1" in
  dump) [ "$2" = deadbeef ] || exit 1; printf 'snapshot copy' ;;
  restore) [ "$2" = deadbeef ] || exit 1
           mkdir -p "$4$(dirname "$6")"; printf 'snapshot copy' > "$4$6" ;;
  *) exit 1 ;;
esac
"#,
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
