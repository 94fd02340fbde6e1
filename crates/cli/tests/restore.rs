//! Restoring vault files from commits and snapshots (skipped without git)

#![cfg(unix)]

mod common;

use adapters::{GitRepo, ResticRepo};
use cli_lib::{Origin, Recovery};
use common::{fake_restic, git_available, TestVault};
use std::fs;
use vault_core::VersionControl;

struct Setup {
    vault: TestVault,
    recovery: Recovery,
    first_commit: String,
}

async fn setup() -> Option<Setup> {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return None;
    }
    let vault = TestVault::new();
    let config = vault.config();
    let git = GitRepo::new(&vault.vault, &config.git, config.command_timeout(), false);
    git.ensure_repository().await.unwrap();

    vault.write("garden.md", "tomatoes\n");
    git.stage_all().await.unwrap();
    git.commit("vault: plant garden").await.unwrap();
    vault.write("garden.md", "tomatoes\nbasil\n");
    git.stage_all().await.unwrap();
    git.commit("vault: add basil").await.unwrap();

    let log = git.log(10).await.unwrap();
    assert_eq!(log.len(), 2);
    let first_commit = log[1].id.clone();

    let restic = ResticRepo::new(
        &vault.vault,
        &config.backup.tags,
        config.command_timeout(),
        false,
    )
    .with_binary(fake_restic(&vault.state).to_string_lossy());

    Some(Setup {
        vault,
        recovery: Recovery::new(git, restic),
        first_commit,
    })
}

#[tokio::test]
async fn test_restore_from_commit_over_vault_copy() {
    let Some(s) = setup().await else {
        return;
    };
    let target = s.recovery.vault_target("garden.md").unwrap();
    assert_eq!(target, s.vault.vault.join("garden.md"));

    let origin = s
        .recovery
        .restore(&s.first_commit[..7], "garden.md", &target)
        .await
        .unwrap();

    assert_eq!(origin, Origin::Commit);
    assert_eq!(fs::read_to_string(&target).unwrap(), "tomatoes\n");
}

#[tokio::test]
async fn test_eight_hex_id_prefers_commit() {
    let Some(s) = setup().await else {
        return;
    };
    let (origin, contents) = s
        .recovery
        .contents(&s.first_commit[..8], "garden.md")
        .await
        .unwrap();
    assert_eq!(origin, Origin::Commit);
    assert_eq!(contents, b"tomatoes\n");
}

#[tokio::test]
async fn test_eight_hex_id_falls_back_to_snapshot() {
    let Some(s) = setup().await else {
        return;
    };
    let target = s.vault.state.join("restored/garden.md");

    let origin = s
        .recovery
        .restore("deadbeef", "garden.md", &target)
        .await
        .unwrap();
    assert_eq!(origin, Origin::Snapshot);
    assert_eq!(fs::read_to_string(&target).unwrap(), "snapshot copy");

    let (origin, contents) = s.recovery.contents("deadbeef", "garden.md").await.unwrap();
    assert_eq!(origin, Origin::Snapshot);
    assert_eq!(contents, b"snapshot copy");
}

#[tokio::test]
async fn test_unknown_id_reports_both_sources() {
    let Some(s) = setup().await else {
        return;
    };
    let err = s
        .recovery
        .contents("0badc0de", "garden.md")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("did not resolve as a commit"));

    // Not hex: restic only
    assert!(s.recovery.contents("latest", "garden.md").await.is_err());
}

#[tokio::test]
async fn test_paths_outside_vault_are_refused() {
    let Some(s) = setup().await else {
        return;
    };
    assert!(s.recovery.vault_target("../escape.md").is_err());
    let target = s.vault.state.join("x.md");
    assert!(s
        .recovery
        .restore(&s.first_commit, "../../etc/passwd", &target)
        .await
        .is_err());
    assert!(!target.exists());
}
