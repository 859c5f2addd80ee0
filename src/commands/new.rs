//! Create a new post or draft

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Timelike, Utc};
use std::fs;
use std::path::PathBuf;

use crate::content::{FrontMatter, Timestamp};
use crate::Site;

/// Create a new post under `_posts`, or a draft under `_drafts`.
/// `path` overrides the file name (without extension).
pub fn create_post(site: &Site, title: &str, draft: bool, path: Option<&str>) -> Result<PathBuf> {
    let now = Utc::now().with_timezone(&site.config.tz()?).naive_local();
    create_post_at(site, title, draft, path, now)
}

fn create_post_at(
    site: &Site,
    title: &str,
    draft: bool,
    path: Option<&str>,
    now: NaiveDateTime,
) -> Result<PathBuf> {
    let target_dir = site
        .source_dir
        .join(if draft { "_drafts" } else { "_posts" });

    let name = match path {
        Some(p) => p.trim_end_matches(".md").to_string(),
        None => slug::slugify(title),
    };
    if name.trim_matches('/').is_empty() {
        anyhow::bail!("Cannot derive a file name from title {:?}", title);
    }
    let file_path = target_dir.join(format!("{}.md", name));
    if file_path.exists() {
        anyhow::bail!("File already exists: {:?}", file_path);
    }

    let fm = FrontMatter {
        title: Some(title.to_string()),
        date: Some(Timestamp::Local(now.with_nanosecond(0).unwrap_or(now))),
        draft,
        ..Default::default()
    };
    let content = format!("{}\n", fm.to_yaml()?);

    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create dir {:?}", parent))?;
    }
    fs::write(&file_path, content).with_context(|| format!("Failed to write {:?}", file_path))?;
    tracing::info!("Created: {:?}", file_path);

    Ok(file_path)
}
