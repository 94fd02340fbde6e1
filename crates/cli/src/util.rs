//! Shared formatting helpers for CLI output

use chrono::{DateTime, SecondsFormat, Utc};
use owo_colors::OwoColorize;
use vault_core::HealthStatus;

/// Format a timestamp relative to `now` ("2 hours ago")
pub fn format_relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let Ok(elapsed) = (now - ts).to_std() else {
        return "in the future".to_string();
    };
    let seconds = elapsed.as_secs();

    if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}

/// "2 hours ago (2024-01-03T14:30:00Z)", or a dimmed "never"
pub fn format_timestamp(ts: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match ts {
        Some(ts) => format!(
            "{} ({})",
            format_relative_time(ts, now),
            ts.to_rfc3339_opts(SecondsFormat::Secs, true).dimmed()
        ),
        None => "never".dimmed().to_string(),
    }
}

pub fn format_status(status: HealthStatus) -> String {
    match status {
        HealthStatus::Healthy => "healthy ✓".green().to_string(),
        HealthStatus::Unhealthy => "unhealthy ✗".red().to_string(),
    }
}

/// Format an uptime as "3d 4h 12m"
pub fn format_duration(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", secs)
    }
}

/// Human-readable size, e.g. "1.5 KB"
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_format_relative_time() {
        let now = now();
        assert_eq!(format_relative_time(now - Duration::seconds(5), now), "5 seconds ago");
        assert_eq!(format_relative_time(now - Duration::minutes(3), now), "3 minutes ago");
        assert_eq!(format_relative_time(now - Duration::hours(2), now), "2 hours ago");
        assert_eq!(format_relative_time(now - Duration::days(4), now), "4 days ago");
        assert_eq!(format_relative_time(now - Duration::days(21), now), "3 weeks ago");
        assert_eq!(format_relative_time(now + Duration::minutes(1), now), "in the future");
    }

    #[test]
    fn test_format_timestamp() {
        let now = now();
        let shown = format_timestamp(Some(now - Duration::hours(1)), now);
        assert!(shown.starts_with("1 hours ago ("));
        assert!(shown.contains("2024-03-01T11:00:00Z"));
        assert!(format_timestamp(None, now).contains("never"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m");
        assert_eq!(format_duration(3 * 3600 + 60), "3h 1m");
        assert_eq!(format_duration(2 * 86400 + 5 * 3600 + 7 * 60), "2d 5h 7m");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
