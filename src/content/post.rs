//! Post model

use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use serde::Serialize;
use std::path::PathBuf;

/// A blog post: one parsed and rendered source document
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    /// Post title
    pub title: String,

    /// Publication date
    pub date: DateTime<FixedOffset>,

    /// Last updated date
    pub updated: Option<DateTime<FixedOffset>>,

    /// Excluded from the published site unless drafts are requested
    pub draft: bool,

    /// Post tags, de-duplicated in written order
    pub tags: Vec<String>,

    /// Post categories, de-duplicated in written order
    pub categories: Vec<String>,

    /// Cover image as written in the front-matter
    pub image: Option<String>,

    /// Short description for listings and meta tags
    pub description: Option<String>,

    /// Raw markdown body (teaser marker included)
    pub raw: String,

    /// Raw markdown before the teaser marker
    pub teaser: Option<String>,

    /// Rendered HTML content
    pub content: String,

    /// Rendered teaser
    pub excerpt: Option<String>,

    /// Source file path relative to the source dir, `/`-separated
    pub source: String,

    /// Full source file path
    pub full_source: PathBuf,

    /// Slug (URL-friendly name)
    pub slug: String,

    /// URL path relative to the site root, e.g. `2019/01/07/hello/`
    pub path: String,

    /// Full permalink URL
    pub permalink: String,

    /// Custom front-matter fields
    pub extra: IndexMap<String, serde_yaml::Value>,
}

impl Post {
    /// Create a new post with minimal required fields
    pub fn new(title: String, date: DateTime<FixedOffset>, source: String) -> Self {
        let slug = slug::slugify(&title);
        Self {
            title,
            date,
            updated: None,
            draft: false,
            tags: Vec::new(),
            categories: Vec::new(),
            image: None,
            description: None,
            raw: String::new(),
            teaser: None,
            content: String::new(),
            excerpt: None,
            full_source: PathBuf::from(&source),
            source,
            slug,
            path: String::new(),
            permalink: String::new(),
            extra: IndexMap::new(),
        }
    }

    /// Directory of the source file relative to the source dir, `/`-terminated
    /// (empty for files at the top level)
    pub fn source_dir(&self) -> &str {
        match self.source.rfind('/') {
            Some(pos) => &self.source[..=pos],
            None => "",
        }
    }

    /// Site-relative path of the cover image, if any. Relative image paths
    /// are resolved against the post's own source directory, where assets are
    /// copied alongside it.
    pub fn image_path(&self) -> Option<String> {
        let image = self.image.as_deref()?.trim();
        if image.is_empty() {
            return None;
        }
        if crate::helpers::is_absolute_url(image) || image.starts_with('/') {
            Some(image.to_string())
        } else {
            Some(format!("{}{}", self.source_dir(), image))
        }
    }
}

/// Keep the first occurrence of every label
pub fn dedup_labels(labels: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    labels
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && seen.insert(l.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post(source: &str) -> Post {
        let date = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2019, 1, 7, 0, 0, 0)
            .unwrap();
        Post::new("Title".to_string(), date, source.to_string())
    }

    #[test]
    fn test_image_path() {
        let mut p = post("post/docker-go/index.md");
        assert_eq!(p.image_path(), None);

        p.image = Some("cover.png".to_string());
        assert_eq!(p.image_path().as_deref(), Some("post/docker-go/cover.png"));

        p.image = Some("/images/cover.png".to_string());
        assert_eq!(p.image_path().as_deref(), Some("/images/cover.png"));

        let mut top = post("hello.md");
        top.image = Some("a.png".to_string());
        assert_eq!(top.image_path().as_deref(), Some("a.png"));
    }

    #[test]
    fn test_dedup_labels() {
        let labels = vec![
            "news".to_string(),
            "git".to_string(),
            " news ".to_string(),
            "".to_string(),
        ];
        assert_eq!(dedup_labels(labels), vec!["news", "git"]);
    }
}
