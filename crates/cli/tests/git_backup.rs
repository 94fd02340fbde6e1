//! Manual cycles against a real git working tree (skipped without git)

mod common;

use adapters::GitRepo;
use cli_lib::daemon;
use common::{git_available, read_state_file, Fakes, TestVault};
use cycle::testing::FakeEngine;
use cycle::{Collaborators, CycleOutcome};
use std::sync::Arc;

async fn setup() -> Option<(TestVault, Fakes, Collaborators)> {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return None;
    }
    let vault = TestVault::new();
    let config = vault.config();
    let git = GitRepo::new(&vault.vault, &config.git, config.command_timeout(), false);
    git.ensure_repository().await.unwrap();

    let fakes = Fakes::new(FakeEngine::initialized());
    let collaborators = Collaborators {
        vcs: Arc::new(git),
        ..fakes.collaborators()
    };
    Some((vault, fakes, collaborators))
}

fn git_log(vault: &TestVault) -> Vec<String> {
    let out = std::process::Command::new("git")
        .args(["log", "--format=%s"])
        .current_dir(&vault.vault)
        .output()
        .unwrap();
    String::from_utf8_lossy(&out.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_manual_cycle_commits_and_archives() {
    let Some((vault, fakes, collaborators)) = setup().await else {
        return;
    };
    vault.write("projects/garden.md", "# Garden\n");
    vault.write("todo.md", "- [ ] seeds\n");

    let run = daemon::run_once(&vault.config(), collaborators).await;

    assert_eq!(run.outcome, CycleOutcome::Success);
    assert_eq!(run.staged_files.len(), 2);
    assert!(run.commit_id.is_some());
    assert_eq!(fakes.engine.snapshots(), vec![vec!["obsidian".to_string(), "auto-backup".to_string()]]);

    let log = git_log(&vault);
    assert_eq!(log.len(), 1);
    assert!(log[0].starts_with("vault: auto-backup"));
    assert!(log[0].ends_with("(2 files)"));

    assert!(read_state_file(&vault.state, "last_commit").is_some());
    assert!(read_state_file(&vault.state, "last_backup").is_some());
}

#[tokio::test]
async fn test_clean_tree_is_noop() {
    let Some((vault, fakes, collaborators)) = setup().await else {
        return;
    };

    let run = daemon::run_once(&vault.config(), collaborators).await;

    assert_eq!(run.outcome, CycleOutcome::NoOp);
    assert!(git_log(&vault).is_empty());
    assert!(fakes.engine.snapshots().is_empty());
    assert!(fakes.notifier.sent().is_empty());
}
