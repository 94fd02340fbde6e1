//! Ignore rules for vault change events
//!
//! Three sources, checked in order:
//! 1. Path segments (`.git`, `.trash`), matched as whole path components
//! 2. Exact relative paths (`.obsidian/workspace.json`), matched as a path suffix
//! 3. Gitignore-style patterns from `[watch].ignore_patterns`

use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};
use vault_core::WatchConfig;

/// Ignore rule set for one watched root
pub struct IgnoreRules {
    /// Watched root; event paths are made relative to it before matching
    root: PathBuf,

    /// Whole path components that cause a path to be ignored
    segments: Vec<String>,

    /// Relative paths ignored wherever they appear as a suffix
    paths: Vec<PathBuf>,

    /// Compiled `ignore_patterns`, if any were configured
    patterns: Option<Gitignore>,
}

impl IgnoreRules {
    /// Build rules for `root` from the watch configuration
    pub fn load(root: &Path, config: &WatchConfig) -> Result<Self> {
        let patterns = if config.ignore_patterns.is_empty() {
            None
        } else {
            let mut builder = GitignoreBuilder::new(root);
            for pattern in &config.ignore_patterns {
                builder
                    .add_line(None, pattern)
                    .with_context(|| format!("Invalid ignore pattern '{pattern}'"))?;
            }
            Some(builder.build().context("Failed to compile ignore patterns")?)
        };

        Ok(Self {
            root: root.to_path_buf(),
            segments: config.ignore_segments.clone(),
            paths: config.ignore_paths.iter().map(PathBuf::from).collect(),
            patterns,
        })
    }

    /// Check if a change at `path` should be dropped
    ///
    /// `path` may be absolute (under the root) or already relative to it.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);

        // `.gitignore` must not match the `.git` segment, so compare components
        if relative.components().any(|component| {
            let component = component.as_os_str();
            self.segments.iter().any(|segment| component == segment.as_str())
        }) {
            return true;
        }

        if self.paths.iter().any(|ignored| relative.ends_with(ignored)) {
            return true;
        }

        if let Some(patterns) = &self.patterns {
            if relative.is_relative()
                && patterns
                    .matched_path_or_any_parents(relative, false)
                    .is_ignore()
            {
                return true;
            }
        }

        false
    }

    /// Get watched root
    pub fn root(&self) -> &Path {
        &self.root
    }
}
