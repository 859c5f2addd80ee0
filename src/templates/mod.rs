//! Built-in templates using the Tera template engine
//!
//! The default theme is embedded in the binary. HTML and XML templates are
//! autoescaped; rendered post bodies are passed through `safe`.

use anyhow::Result;
use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write;
use tera::{Context, Tera};

use crate::config::SiteConfig;
use crate::content::Post;
use crate::helpers::{full_url_for, strip_html, truncate, url_for};

/// Template renderer with the embedded default theme
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// Create a new renderer with all default templates loaded
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();

        tera.add_raw_templates(vec![
            ("layout.html", include_str!("default/layout.html")),
            ("index.html", include_str!("default/index.html")),
            ("post.html", include_str!("default/post.html")),
            ("terms.html", include_str!("default/terms.html")),
            ("term.html", include_str!("default/term.html")),
            ("archive.html", include_str!("default/archive.html")),
            ("atom.xml", include_str!("default/atom.xml")),
            (
                "partials/post_list.html",
                include_str!("default/partials/post_list.html"),
            ),
            (
                "partials/pager.html",
                include_str!("default/partials/pager.html"),
            ),
        ])?;

        tera.register_filter("strip_html", strip_html_filter);
        tera.register_filter("truncate_chars", truncate_chars_filter);

        Ok(Self { tera })
    }

    /// Render a template with given context
    pub fn render(&self, template_name: &str, context: &Context) -> Result<String> {
        Ok(self.tera.render(template_name, context)?)
    }
}

/// Tera filter: strip HTML tags
fn strip_html_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("strip_html", "value", String, value);
    Ok(tera::Value::String(strip_html(&s)))
}

/// Tera filter: truncate by character count
fn truncate_chars_filter(
    value: &tera::Value,
    args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("truncate_chars", "value", String, value);
    let length = match args.get("length") {
        Some(val) => tera::try_get_value!("truncate_chars", "length", usize, val),
        None => 150,
    };
    let omission = match args.get("omission") {
        Some(val) => tera::try_get_value!("truncate_chars", "omission", String, val),
        None => "...".to_string(),
    };
    Ok(tera::Value::String(truncate(&s, length, &omission)))
}

/// Format a date with a strftime pattern, falling back to ISO 8601 when the
/// pattern cannot be rendered
pub fn format_date(date: &DateTime<FixedOffset>, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", date.format(format)).is_err() {
        return date_iso(date);
    }
    out
}

/// RFC 3339 timestamp with seconds precision
pub fn date_iso(date: &DateTime<FixedOffset>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, false)
}

// Data structures for template context

#[derive(Debug, Clone, Serialize)]
pub struct SiteData {
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub author: String,
    pub language: String,
    pub url: String,
    pub home: String,
    pub tags_url: String,
    pub categories_url: String,
    pub archives_url: String,
    pub feed_url: String,
}

impl SiteData {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            title: config.title.clone(),
            subtitle: config.subtitle.clone(),
            description: config.description.clone(),
            author: config.author.clone(),
            language: config.language.clone(),
            url: config.url.trim_end_matches('/').to_string(),
            home: url_for(config, ""),
            tags_url: url_for(config, &format!("{}/", config.tag_dir)),
            categories_url: url_for(config, &format!("{}/", config.category_dir)),
            archives_url: url_for(config, &format!("{}/", config.archive_dir)),
            feed_url: url_for(config, "atom.xml"),
        }
    }
}

/// Link to a tag or category page
#[derive(Debug, Clone, Serialize)]
pub struct TermLink {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostData {
    pub title: String,
    pub date: String,
    pub date_iso: String,
    pub updated: Option<String>,
    pub updated_iso: Option<String>,
    pub url: String,
    pub permalink: String,
    pub draft: bool,
    pub tags: Vec<TermLink>,
    pub categories: Vec<TermLink>,
    pub image: Option<String>,
    pub description: Option<String>,
    pub excerpt: Option<String>,
    pub content: String,
}

impl PostData {
    pub fn new(config: &SiteConfig, post: &Post) -> Self {
        Self {
            title: post.title.clone(),
            date: format_date(&post.date, &config.date_format),
            date_iso: date_iso(&post.date),
            updated: post
                .updated
                .as_ref()
                .map(|updated| format_date(updated, &config.date_format)),
            updated_iso: post.updated.as_ref().map(date_iso),
            url: url_for(config, &post.path),
            permalink: post.permalink.clone(),
            draft: post.draft,
            tags: term_links(config, &config.tag_dir, &post.tags),
            categories: term_links(config, &config.category_dir, &post.categories),
            image: post.image_path().map(|image| url_for(config, &image)),
            description: post.description.clone(),
            excerpt: post.excerpt.clone(),
            content: post.content.clone(),
        }
    }
}

fn term_links(config: &SiteConfig, dir: &str, labels: &[String]) -> Vec<TermLink> {
    labels
        .iter()
        .filter_map(|label| {
            let slug = slug::slugify(label);
            if slug.is_empty() {
                return None;
            }
            Some(TermLink {
                name: label.clone(),
                url: url_for(config, &format!("{}/{}/", dir, slug)),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationData {
    pub per_page: usize,
    pub total: usize,
    pub current: usize,
    pub prev_link: Option<String>,
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavPost {
    pub title: String,
    pub url: String,
}

/// One tag or category on an overview page
#[derive(Debug, Clone, Serialize)]
pub struct TermData {
    pub name: String,
    pub slug: String,
    pub url: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveYearData {
    pub year: i32,
    pub posts: Vec<PostData>,
}

/// One `<entry>` of the Atom feed
#[derive(Debug, Clone, Serialize)]
pub struct FeedEntry {
    pub title: String,
    pub id: String,
    pub link: String,
    pub published: String,
    pub updated: String,
    pub summary: Option<String>,
    /// Body with absolute URLs, safe to place in a CDATA section
    pub content: String,
    pub categories: Vec<String>,
}

pub fn site_context(config: &SiteConfig) -> Context {
    let mut context = Context::new();
    context.insert("site", &SiteData::new(config));
    context
}

/// Absolute URL of the site home page
pub fn home_permalink(config: &SiteConfig) -> String {
    full_url_for(config, "")
}
