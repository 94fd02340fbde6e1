//! Read side of the vault's history
//!
//! Commits and snapshots as listed by git and restic, the files inside
//! them, and the checks applied to user-supplied paths and ids before they
//! reach a subprocess.

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path};

/// `git log` format: one commit per line, unit-separated fields
pub(crate) const LOG_FORMAT: &str = "--format=%H%x1f%h%x1f%aI%x1f%s";
const LOG_SEP: char = '\u{1f}';

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitEntry {
    pub id: String,
    pub short_id: String,
    pub date: DateTime<Utc>,
    pub subject: String,
}

pub fn parse_log(output: &str) -> Vec<CommitEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(4, LOG_SEP);
            let id = fields.next()?;
            let short_id = fields.next()?;
            let date = DateTime::parse_from_rfc3339(fields.next()?).ok()?;
            let subject = fields.next()?;
            Some(CommitEntry {
                id: id.to_string(),
                short_id: short_id.to_string(),
                date: date.with_timezone(&Utc),
                subject: subject.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    TypeChanged,
}

impl FileStatus {
    fn from_code(code: char) -> Self {
        match code {
            'A' => Self::Added,
            'D' => Self::Deleted,
            'R' => Self::Renamed,
            'C' => Self::Copied,
            'T' => Self::TypeChanged,
            _ => Self::Modified,
        }
    }

    /// Single-letter code as git prints it
    pub fn code(&self) -> char {
        match self {
            Self::Added => 'A',
            Self::Modified => 'M',
            Self::Deleted => 'D',
            Self::Renamed => 'R',
            Self::Copied => 'C',
            Self::TypeChanged => 'T',
        }
    }
}

/// A file touched by a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub status: FileStatus,
    pub path: String,
}

/// `git diff-tree --name-status` output. Renames and copies report the new path.
pub fn parse_name_status(output: &str) -> Vec<FileChange> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let code = fields.next()?.chars().next()?;
            let path = fields.last()?;
            Some(FileChange {
                status: FileStatus::from_code(code),
                path: path.to_string(),
            })
        })
        .collect()
}

/// Entry of `restic snapshots --json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    #[serde(default)]
    pub short_id: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Snapshots newest first
pub fn parse_snapshots(output: &str) -> anyhow::Result<Vec<Snapshot>> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: Option<Vec<Snapshot>> =
        serde_json::from_str(output).context("Unexpected restic snapshots output")?;
    let mut snapshots = parsed.unwrap_or_default();
    for snapshot in &mut snapshots {
        if snapshot.short_id.is_empty() {
            snapshot.short_id = snapshot.id.chars().take(8).collect();
        }
    }
    snapshots.sort_by(|a, b| b.time.cmp(&a.time));
    Ok(snapshots)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    #[serde(other)]
    Other,
}

/// File or directory inside a snapshot, with its absolute snapshot path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mtime: Option<DateTime<Utc>>,
}

impl SnapshotEntry {
    fn synthetic_dir(path: String) -> Self {
        Self {
            path,
            kind: EntryKind::Dir,
            size: 0,
            mtime: None,
        }
    }
}

/// `restic ls --json` output: one object per line, the snapshot header skipped
pub fn parse_ls(output: &str) -> Vec<SnapshotEntry> {
    output
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter(|obj| {
            let header = |key: &str| obj.get(key).and_then(Value::as_str) == Some("snapshot");
            !header("struct_type") && !header("message_type")
        })
        .filter_map(|obj| serde_json::from_value(obj).ok())
        .collect()
}

/// Immediate children of `prefix`, directories first, each group sorted
/// case-insensitively. Directories implied by deeper paths are synthesized.
pub fn children_of(entries: &[SnapshotEntry], prefix: &str) -> Vec<SnapshotEntry> {
    let base = format!("{}/", prefix.trim_end_matches('/'));
    let mut dirs: BTreeMap<String, SnapshotEntry> = BTreeMap::new();
    let mut files = Vec::new();

    for entry in entries {
        let Some(relative) = entry.path.strip_prefix(&base) else {
            continue;
        };
        if relative.is_empty() {
            continue;
        }
        match relative.split_once('/') {
            Some((dir, _)) => {
                dirs.entry(dir.to_string())
                    .or_insert_with(|| SnapshotEntry::synthetic_dir(format!("{base}{dir}")));
            }
            None if entry.kind == EntryKind::Dir => {
                // An explicit entry wins over a synthesized one
                dirs.insert(relative.to_string(), entry.clone());
            }
            None => files.push(entry.clone()),
        }
    }

    let mut dirs: Vec<SnapshotEntry> = dirs.into_values().collect();
    dirs.sort_by_key(|e| e.path.to_lowercase());
    files.sort_by_key(|e| e.path.to_lowercase());
    dirs.extend(files);
    dirs
}

/// Where a restore id points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Commit,
    Snapshot,
    /// 8 hex digits: a short commit id or a restic short id
    Either,
}

pub fn detect_source(id: &str) -> Source {
    let hex = !id.is_empty() && id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'));
    match id.len() {
        8 if hex => Source::Either,
        7..=40 if hex => Source::Commit,
        _ => Source::Snapshot,
    }
}

/// Normalize a vault-relative path, refusing anything that escapes the vault
pub fn vault_relative(path: &str) -> anyhow::Result<String> {
    let trimmed = path.trim().trim_start_matches("./");
    if trimmed.is_empty() {
        bail!("Path must not be empty");
    }
    let mut parts = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => bail!("Path '{path}' must stay inside the vault"),
        }
    }
    if parts.is_empty() {
        bail!("Path must not be empty");
    }
    Ok(parts.join("/"))
}

/// Reject ids that git or restic would read as an option or a range
pub fn check_revision(id: &str) -> anyhow::Result<()> {
    if id.is_empty()
        || id.starts_with('-')
        || id.contains("..")
        || id.chars().any(|c| c.is_whitespace() || c.is_control() || c == ':')
    {
        bail!("Invalid commit or snapshot id '{id}'");
    }
    Ok(())
}

/// Replace `target` with `contents` in one rename
pub fn write_atomically(target: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(target)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(path: &str, kind: EntryKind) -> SnapshotEntry {
        SnapshotEntry {
            path: path.to_string(),
            kind,
            size: 1,
            mtime: None,
        }
    }

    #[test]
    fn test_parse_log() {
        let out = "a1b2c3d4e5f60718293a4b5c6d7e8f9012345678\u{1f}a1b2c3d\u{1f}2024-03-01T13:00:00+01:00\u{1f}vault: add garden notes\n\
                   garbage line\n";
        let commits = parse_log(out);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].short_id, "a1b2c3d");
        assert_eq!(commits[0].date, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        assert_eq!(commits[0].subject, "vault: add garden notes");
    }

    #[test]
    fn test_parse_name_status() {
        let out = "A\tnew.md\nM\tdaily/2024-03-01.md\nD\told.md\nR087\tdrafts/a.md\tposts/a.md\n";
        let changes = parse_name_status(out);
        assert_eq!(
            changes.iter().map(|c| (c.status.code(), c.path.as_str())).collect::<Vec<_>>(),
            vec![
                ('A', "new.md"),
                ('M', "daily/2024-03-01.md"),
                ('D', "old.md"),
                ('R', "posts/a.md"),
            ]
        );
    }

    #[test]
    fn test_parse_snapshots_newest_first() {
        let out = r#"[
            {"id":"1111111111111111","time":"2024-03-01T10:00:00.5+00:00","paths":["/vault"],"tags":["obsidian"]},
            {"id":"2222222222222222","short_id":"22222222","time":"2024-03-02T10:00:00Z","paths":["/vault"]}
        ]"#;
        let snapshots = parse_snapshots(out).unwrap();
        assert_eq!(snapshots[0].short_id, "22222222");
        assert!(snapshots[0].tags.is_empty());
        assert_eq!(snapshots[1].short_id, "11111111");
        assert_eq!(snapshots[1].tags, vec!["obsidian"]);

        assert!(parse_snapshots("null").unwrap().is_empty());
        assert!(parse_snapshots("").unwrap().is_empty());
        assert!(parse_snapshots("not json").is_err());
    }

    #[test]
    fn test_parse_ls_skips_header() {
        let out = concat!(
            r#"{"time":"2024-03-01T10:00:00Z","paths":["/vault"],"id":"abc","struct_type":"snapshot"}"#,
            "\n",
            r#"{"name":"vault","type":"dir","path":"/vault","mtime":"2024-03-01T09:00:00Z","struct_type":"node"}"#,
            "\n",
            r#"{"name":"a.md","type":"file","path":"/vault/a.md","size":12,"message_type":"node"}"#,
            "\n",
            "restic: warning\n",
        );
        let entries = parse_ls(out);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Dir);
        assert!(entries[0].mtime.is_some());
        assert_eq!(entries[1].path, "/vault/a.md");
        assert_eq!(entries[1].size, 12);
    }

    #[test]
    fn test_children_of_synthesizes_directories() {
        let entries = vec![
            entry("/vault", EntryKind::Dir),
            entry("/vault/Zettel.md", EntryKind::File),
            entry("/vault/inbox.md", EntryKind::File),
            entry("/vault/projects/garden/plan.md", EntryKind::File),
            entry("/vault/daily", EntryKind::Dir),
            entry("/vault/daily/2024-03-01.md", EntryKind::File),
        ];

        let top: Vec<(String, EntryKind)> = children_of(&entries, "/vault/")
            .into_iter()
            .map(|e| (e.path, e.kind))
            .collect();
        assert_eq!(
            top,
            vec![
                ("/vault/daily".to_string(), EntryKind::Dir),
                ("/vault/projects".to_string(), EntryKind::Dir),
                ("/vault/inbox.md".to_string(), EntryKind::File),
                ("/vault/Zettel.md".to_string(), EntryKind::File),
            ]
        );

        let nested = children_of(&entries, "/vault/projects");
        assert_eq!(nested, vec![SnapshotEntry::synthetic_dir("/vault/projects/garden".into())]);
    }

    #[test]
    fn test_detect_source() {
        assert_eq!(detect_source(&"a".repeat(40)), Source::Commit);
        assert_eq!(detect_source("a1b2c3d"), Source::Commit);
        assert_eq!(detect_source("a1b2c3d4"), Source::Either);
        assert_eq!(detect_source(&"f".repeat(64)), Source::Snapshot);
        assert_eq!(detect_source("latest"), Source::Snapshot);
        assert_eq!(detect_source("A1B2C3D4"), Source::Snapshot);
    }

    #[test]
    fn test_vault_relative() {
        assert_eq!(vault_relative("notes/a.md").unwrap(), "notes/a.md");
        assert_eq!(vault_relative("./notes//a.md").unwrap(), "notes/a.md");
        assert!(vault_relative("../etc/passwd").is_err());
        assert!(vault_relative("notes/../../x").is_err());
        assert!(vault_relative("/etc/passwd").is_err());
        assert!(vault_relative("  ").is_err());
    }

    #[test]
    fn test_check_revision() {
        assert!(check_revision("a1b2c3d").is_ok());
        assert!(check_revision("latest").is_ok());
        assert!(check_revision("--output=/tmp/x").is_err());
        assert!(check_revision("HEAD~1..HEAD").is_err());
        assert!(check_revision("abc:secret.md").is_err());
        assert!(check_revision("").is_err());
    }

    #[test]
    fn test_write_atomically_replaces_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let target = temp_dir.path().join("nested/note.md");
        write_atomically(&target, b"first").unwrap();
        write_atomically(&target, b"second").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        assert_eq!(std::fs::read_dir(target.parent().unwrap()).unwrap().count(), 1);
    }
}
