//! Cache-first analysis flow: consult the cache, otherwise run one
//! upload/poll cycle, persist the result, and render. The rendered document
//! is written next to the cached JSON with the extension swapped to `.html`.

use crate::api;
use crate::auth::ApiKey;
use crate::cache::{Artifact, ReportCache};
use crate::job::{Outcome, UploadPoll};
use crate::report;
use crate::transport::Transport;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct AnalysisResult {
    pub html: String,
    pub json_path: Option<PathBuf>,
    pub html_path: Option<PathBuf>,
    pub from_cache: bool,
}

fn html_path_for(json_path: &Path) -> PathBuf {
    json_path.with_extension("html")
}

/// Persist the derived document; a failure here degrades like a cache
/// persistence failure, the in-memory report is still returned.
fn write_html(json_path: &Path, html: &str) -> Option<PathBuf> {
    let path = html_path_for(json_path);
    match fs::write(&path, html) {
        Ok(()) => Some(path),
        Err(err) => {
            warn!("[cache] failed to write {}: {}", path.display(), err);
            None
        }
    }
}

fn render_raw(raw: &[u8]) -> anyhow::Result<String> {
    let root = api::parse_root(raw).context("cached report is not valid JSON")?;
    Ok(report::render(api::report_data(&root)))
}

/// Returns `None` when a newer submission preempted this one.
pub async fn analyze<T: Transport>(
    cache: &mut ReportCache,
    controller: &UploadPoll<T>,
    artifact: &Artifact,
    key: &ApiKey,
) -> anyhow::Result<Option<AnalysisResult>> {
    if let Some(json_path) = cache.lookup(&artifact.identity) {
        info!("[cache] hit: {}", json_path.display());
        let raw = fs::read(&json_path)
            .with_context(|| format!("failed to read {}", json_path.display()))?;
        let html = render_raw(&raw)?;
        let html_path = write_html(&json_path, &html);
        return Ok(Some(AnalysisResult {
            html,
            json_path: Some(json_path),
            html_path,
            from_cache: true,
        }));
    }

    let delivery = match controller.analyze(artifact, key).await? {
        Outcome::Delivered(delivery) => delivery,
        Outcome::Superseded => return Ok(None),
    };

    // degraded durability is not a hard failure, keep going with the
    // in-memory payload
    let json_path = match cache.store(&delivery.identity, &delivery.raw) {
        Ok(path) => Some(path),
        Err(err) => {
            warn!("[cache] {}", err);
            None
        }
    };

    let html = report::render(&delivery.payload);
    let html_path = json_path.as_deref().and_then(|p| write_html(p, &html));

    Ok(Some(AnalysisResult {
        html,
        json_path,
        html_path,
        from_cache: false,
    }))
}

/// Render an already-cached report without touching the network.
pub fn render_cached(json_path: &Path) -> anyhow::Result<AnalysisResult> {
    let raw =
        fs::read(json_path).with_context(|| format!("failed to read {}", json_path.display()))?;
    let html = render_raw(&raw)?;
    let html_path = write_html(json_path, &html);
    Ok(AnalysisResult {
        html,
        json_path: Some(json_path.to_path_buf()),
        html_path,
        from_cache: true,
    })
}
