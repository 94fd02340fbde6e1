//! Health HTTP endpoint
//!
//! - `GET /health`: the `HealthReport` as JSON, always 200
//! - `GET /ready`: `{"ready": true}`
//! - anything else: 404 `{"error": "Not Found"}`

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info};
use vault_core::{Config, HealthReport, HealthState, HealthTracker, VersionControl};

/// Bound on the commit count query made while answering a health request
const COMMIT_COUNT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a health report is built from
pub struct HealthContext {
    tracker: Arc<HealthTracker>,
    vcs: Option<Arc<dyn VersionControl>>,
    vault: PathBuf,
    threshold: Duration,
}

impl HealthContext {
    pub fn new(
        tracker: Arc<HealthTracker>,
        vcs: Option<Arc<dyn VersionControl>>,
        vault: impl Into<PathBuf>,
        threshold: Duration,
    ) -> Self {
        Self {
            tracker,
            vcs,
            vault: vault.into(),
            threshold,
        }
    }

    pub fn tracker(&self) -> &Arc<HealthTracker> {
        &self.tracker
    }

    pub async fn report(&self, now: DateTime<Utc>) -> HealthReport {
        let state = self.tracker.snapshot();
        let commits = self.commits_since_backup(&state).await;
        HealthReport::new(&state, now, self.threshold, commits, self.tracker.uptime(now))
            .with_sync_state(read_sync_state(&self.vault).await)
    }

    /// Counted only when a commit landed after the last backup; 0 on any failure
    async fn commits_since_backup(&self, state: &HealthState) -> u64 {
        let (Some(commit), Some(backup), Some(vcs)) =
            (state.last_commit_at, state.last_backup_at, &self.vcs)
        else {
            return 0;
        };
        if commit <= backup {
            return 0;
        }

        match tokio::time::timeout(COMMIT_COUNT_TIMEOUT, vcs.commits_since(backup)).await {
            Ok(Ok(count)) => count,
            Ok(Err(e)) => {
                debug!(error = %e, "Failed to count commits since backup");
                0
            }
            Err(_) => {
                debug!("Commit count timed out");
                0
            }
        }
    }
}

/// Parsed `.obsidian/sync.json`, or `None` when missing or malformed
pub async fn read_sync_state(vault: &Path) -> Option<Value> {
    let path = vault.join(".obsidian").join("sync.json");
    let raw = tokio::fs::read_to_string(&path).await.ok()?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Obsidian sync.json is malformed");
            None
        }
    }
}

pub fn router(ctx: Arc<HealthContext>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/", get(health))
        .route("/ready", get(ready))
        .route("/ready/", get(ready))
        .fallback(not_found)
        .with_state(ctx)
}

async fn health(State(ctx): State<Arc<HealthContext>>) -> Json<HealthReport> {
    Json(ctx.report(Utc::now()).await)
}

async fn ready() -> Json<Value> {
    Json(json!({"ready": true}))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not Found"})))
}

pub async fn bind(config: &Config) -> Result<TcpListener> {
    let addr = (config.health.bind.as_str(), config.health.port);
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind health endpoint on {}:{}", addr.0, addr.1))
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, ctx: Arc<HealthContext>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Health endpoint listening");
    }
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Health endpoint failed")
}
