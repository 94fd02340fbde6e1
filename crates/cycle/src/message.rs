//! Commit message composition

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, warn};
use vault_core::{StagedChanges, Summarizer};

/// Every commit subject starts with this
pub const PREFIX: &str = "vault: ";

/// Longest summary kept from the summarizer, in characters
pub const SUMMARY_MAX_CHARS: usize = 72;

/// Deterministic message used whenever no usable summary is available
pub fn fallback_message(staged: &StagedChanges, now: DateTime<Utc>) -> String {
    format!(
        "{PREFIX}auto-backup {} UTC ({} files)\n\n{}",
        now.format("%Y-%m-%d %H:%M:%S"),
        staged.files.len(),
        staged.stats
    )
}

/// Normalize a summarizer reply into a commit subject. `None` when nothing
/// usable is left.
pub fn format_summary(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_matches(|c| matches!(c, '"' | '\'' | '`')).trim();
    // Models sometimes echo the prefix back
    let line = line
        .strip_prefix(PREFIX.trim_end())
        .map(str::trim_start)
        .unwrap_or(line);
    let line = line.trim_end_matches('.').trim();
    if line.is_empty() {
        return None;
    }

    let summary: String = line.chars().take(SUMMARY_MAX_CHARS).collect();
    Some(format!("{PREFIX}{}", summary.trim_end()))
}

/// Ask the summarizer for a subject, bounded by `timeout`, falling back on any failure
pub async fn compose(
    summarizer: Option<&dyn Summarizer>,
    staged: &StagedChanges,
    timeout: Duration,
    now: DateTime<Utc>,
) -> String {
    let Some(summarizer) = summarizer else {
        return fallback_message(staged, now);
    };

    let reply = tokio::time::timeout(
        timeout,
        summarizer.summarize(&staged.files, &staged.stats, timeout),
    )
    .await;

    match reply {
        Ok(Ok(raw)) => match format_summary(&raw) {
            Some(message) => {
                info!(message = %message, "AI commit message generated");
                message
            }
            None => {
                warn!("Summarizer returned an empty message, falling back to timestamp");
                fallback_message(staged, now)
            }
        },
        Ok(Err(e)) => {
            warn!(error = %e, "AI commit message generation failed, falling back to timestamp");
            fallback_message(staged, now)
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "Summarizer timed out, falling back to timestamp");
            fallback_message(staged, now)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSummarizer;
    use chrono::TimeZone;

    fn staged() -> StagedChanges {
        StagedChanges {
            files: vec!["daily/2024-01-15.md".into(), "projects/garden.md".into()],
            stats: "2 files changed, 14 insertions(+), 3 deletions(-)".into(),
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 5).unwrap()
    }

    #[test]
    fn test_fallback_message_format() {
        assert_eq!(
            fallback_message(&staged(), noon()),
            "vault: auto-backup 2024-01-15 12:30:05 UTC (2 files)\n\n\
             2 files changed, 14 insertions(+), 3 deletions(-)"
        );
    }

    #[test]
    fn test_format_summary_cleans_reply() {
        assert_eq!(
            format_summary("  \"update garden project notes.\"\n\nextra prose"),
            Some("vault: update garden project notes".to_string())
        );
        assert_eq!(
            format_summary("vault: add daily note"),
            Some("vault: add daily note".to_string())
        );
        assert_eq!(format_summary("   \n ''  "), None);
    }

    #[test]
    fn test_format_summary_truncates() {
        let long = "x".repeat(200);
        let message = format_summary(&long).unwrap();
        assert_eq!(message.len(), PREFIX.len() + SUMMARY_MAX_CHARS);
    }

    #[tokio::test]
    async fn test_compose_without_summarizer_uses_fallback() {
        let message = compose(None, &staged(), Duration::from_secs(10), noon()).await;
        assert!(message.starts_with("vault: auto-backup 2024-01-15 12:30:05 UTC"));
    }

    #[tokio::test]
    async fn test_compose_uses_summary() {
        let summarizer = FakeSummarizer::replying("Update garden notes");
        let message = compose(Some(&summarizer), &staged(), Duration::from_secs(10), noon()).await;
        assert_eq!(message, "vault: Update garden notes");

        // Only filenames and the stat line are handed over
        let calls = summarizer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, staged().files);
        assert_eq!(calls[0].1, staged().stats);
    }

    #[tokio::test]
    async fn test_compose_falls_back_on_error() {
        let summarizer = FakeSummarizer::failing("HTTP 529 overloaded");
        let message = compose(Some(&summarizer), &staged(), Duration::from_secs(10), noon()).await;
        assert_eq!(message, fallback_message(&staged(), noon()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_compose_enforces_timeout() {
        // The fake ignores the timeout it is given
        let summarizer = FakeSummarizer::replying("too late").with_delay(Duration::from_secs(60));
        let message = compose(Some(&summarizer), &staged(), Duration::from_secs(10), noon()).await;
        assert_eq!(message, fallback_message(&staged(), noon()));
    }
}
