//! Content loader - reads the source directory into a collection of posts

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use super::{dedup_labels, Collection, DocumentError, FrontMatter, MarkdownRenderer, Post};
use crate::config::SiteConfig;
use crate::helpers::full_url_for;
use crate::Site;

/// Everything read from the source directory
#[derive(Debug, Default)]
pub struct Loaded {
    /// Successfully parsed and rendered posts
    pub collection: Collection,
    /// Documents that failed to parse or render
    pub failures: Vec<DocumentError>,
    /// Non-markdown files, relative to the source dir, `/`-separated
    pub assets: Vec<String>,
}

/// Loads content from the source directory
pub struct ContentLoader<'a> {
    site: &'a Site,
    renderer: MarkdownRenderer,
    tz: Tz,
}

impl<'a> ContentLoader<'a> {
    /// Create a new content loader
    pub fn new(site: &'a Site) -> Result<Self> {
        Ok(Self {
            site,
            renderer: MarkdownRenderer::new(&site.config),
            tz: site.config.tz()?,
        })
    }

    /// Read every document and asset below the source directory.
    /// I/O errors abort loading; per-document errors are collected.
    pub fn load(&self) -> Result<Loaded> {
        let source_dir = &self.site.source_dir;
        if !source_dir.is_dir() {
            return Err(anyhow!("Source directory {:?} does not exist", source_dir));
        }

        let mut documents = Vec::new();
        let mut assets = Vec::new();

        for entry in WalkDir::new(source_dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        {
            let entry = entry.with_context(|| format!("Failed to walk {:?}", source_dir))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let source = relative_source(source_dir, path);
            if is_markdown_file(path) {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {:?}", path))?;
                documents.push((source, path.to_path_buf(), text));
            } else {
                assets.push(source);
            }
        }

        tracing::debug!(
            "Found {} documents and {} assets in {:?}",
            documents.len(),
            assets.len(),
            source_dir
        );

        let results: Vec<Result<Post, DocumentError>> = documents
            .par_iter()
            .map(|(source, full_source, text)| self.parse_document(source, full_source, text))
            .collect();

        let mut posts = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(post) => posts.push(post),
                Err(e) => {
                    tracing::error!("{}", e);
                    failures.push(e);
                }
            }
        }

        Ok(Loaded {
            collection: Collection::new(posts),
            failures,
            assets,
        })
    }

    /// Turn one document's text into a post
    pub fn parse_document(
        &self,
        source: &str,
        full_source: &Path,
        text: &str,
    ) -> Result<Post, DocumentError> {
        let parse_error = |e| DocumentError::Parse {
            path: source.to_string(),
            source: e,
        };

        let split = super::split(text).map_err(parse_error)?;
        let fm = FrontMatter::from_split(&split).map_err(parse_error)?;
        let date = fm.resolved_date(&self.tz).map_err(parse_error)?;
        let updated = fm.resolved_updated(&self.tz).map_err(parse_error)?;

        let render_error = |e: super::RenderError| DocumentError::Render {
            path: source.to_string(),
            source: e.offset_lines(split.body_line - 1),
        };

        let body = split.body;
        let (teaser, full) = MarkdownRenderer::split_excerpt(body);
        let content = self.renderer.render(&full).map_err(render_error)?;
        let excerpt = match &teaser {
            Some(teaser) => Some(self.renderer.render(teaser).map_err(render_error)?),
            None => None,
        };

        let title = fm
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| file_stem(full_source));

        let slug = fm
            .slug
            .as_deref()
            .map(slug::slugify)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_slug(full_source));

        let categories = dedup_labels(fm.categories);
        let path = generate_permalink(&self.site.config, &date, &slug, &categories);

        let mut post = Post::new(title, date, source.to_string());
        post.updated = updated;
        post.draft = fm.draft;
        post.tags = dedup_labels(fm.tags);
        post.categories = categories;
        post.image = fm.image;
        post.description = fm.description;
        post.raw = body.to_string();
        post.teaser = teaser;
        post.content = content;
        post.excerpt = excerpt;
        post.full_source = full_source.to_path_buf();
        post.slug = slug;
        post.permalink = full_url_for(&self.site.config, &path);
        post.path = path;
        post.extra = fm.extra;

        Ok(post)
    }
}

/// Build a post's route from the configured pattern
pub fn generate_permalink(
    config: &SiteConfig,
    date: &DateTime<FixedOffset>,
    slug: &str,
    categories: &[String],
) -> String {
    let category = categories
        .iter()
        .map(|c| slug::slugify(c))
        .find(|c| !c.is_empty())
        .unwrap_or_else(|| "uncategorized".to_string());

    let result = config
        .permalink
        .replace(":year", &date.format("%Y").to_string())
        .replace(":month", &date.format("%m").to_string())
        .replace(":day", &date.format("%d").to_string())
        .replace(":i_month", &date.format("%-m").to_string())
        .replace(":i_day", &date.format("%-d").to_string())
        .replace(":hour", &date.format("%H").to_string())
        .replace(":minute", &date.format("%M").to_string())
        .replace(":second", &date.format("%S").to_string())
        .replace(":title", slug)
        .replace(":slug", slug)
        .replace(":category", &category);

    let mut path = result.trim_start_matches('/').to_string();
    if !path.ends_with('/') && !path.ends_with(".html") {
        path.push('/');
    }
    path
}

/// Check if a file is a markdown file
fn is_markdown_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
        .unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// `/`-separated path of `path` below `root`
fn relative_source(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled")
        .to_string()
}

/// Slug from the file name; `post/docker-go/index.md` bundles use the
/// directory name
fn default_slug(path: &Path) -> String {
    let stem = file_stem(path);
    let name = if stem == "index" || stem == "_index" {
        path.parent()
            .and_then(|p| p.file_name())
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .unwrap_or(stem)
    } else {
        stem
    };

    let slug = slug::slugify(name);
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ParseError;
    use crate::content::RenderError;

    fn site_in(dir: &Path) -> Site {
        Site::new(dir).unwrap()
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join("source").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_parse_document_example() {
        let dir = tempfile::tempdir().unwrap();
        let site = site_in(dir.path());
        let loader = ContentLoader::new(&site).unwrap();

        let text = "---\ntitle: X\ndate: 2019-01-07\ntags: [news, git]\n---\nA<!--more-->B";
        let post = loader
            .parse_document("x.md", Path::new("source/x.md"), text)
            .unwrap();

        assert_eq!(post.title, "X");
        assert_eq!(post.tags, vec!["news", "git"]);
        assert_eq!(post.teaser.as_deref(), Some("A"));
        assert_eq!(post.excerpt.as_deref(), Some("<p>A</p>\n"));
        assert_eq!(post.content, "<p>AB</p>\n");
        assert_eq!(post.raw, "A<!--more-->B");
        assert_eq!(post.path, "2019/01/07/x/");
        assert_eq!(post.permalink, "http://example.com/2019/01/07/x/");
    }

    #[test]
    fn test_title_and_slug_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let site = site_in(dir.path());
        let loader = ContentLoader::new(&site).unwrap();

        let text = "---\ndate: 2019-01-07\n---\nbody";
        let post = loader
            .parse_document(
                "post/Docker Go/index.md",
                Path::new("source/post/Docker Go/index.md"),
                text,
            )
            .unwrap();
        assert_eq!(post.title, "index");
        assert_eq!(post.slug, "docker-go");

        let text = "---\ndate: 2019-01-07\nslug: Custom Slug\n---\nbody";
        let post = loader
            .parse_document("a.md", Path::new("source/a.md"), text)
            .unwrap();
        assert_eq!(post.slug, "custom-slug");
    }

    #[test]
    fn test_render_error_reports_file_line() {
        let dir = tempfile::tempdir().unwrap();
        let site = site_in(dir.path());
        let loader = ContentLoader::new(&site).unwrap();

        let text = "---\ntitle: Broken\ndate: 2019-01-07\n---\nintro\n\n```go\nfunc main() {}\n";
        let err = loader
            .parse_document("broken.md", Path::new("source/broken.md"), text)
            .unwrap_err();
        match err {
            DocumentError::Render {
                path,
                source: RenderError::UnterminatedFence { line },
            } => {
                assert_eq!(path, "broken.md");
                assert_eq!(line, 7);
            }
            other => panic!("unexpected: {}", other),
        }
    }

    #[test]
    fn test_load_continues_past_bad_documents() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "_posts/good.md",
            "---\ntitle: Good\ndate: 2024-01-02\n---\nHello",
        );
        write(
            dir.path(),
            "_posts/unclosed.md",
            "---\ntitle: Unclosed\ndate: 2024-01-01\n\nHello",
        );
        write(dir.path(), "_posts/undated.md", "---\ntitle: Undated\n---\n");
        write(dir.path(), "images/logo.png", "png");
        write(dir.path(), ".hidden/secret.md", "not front matter");

        let site = site_in(dir.path());
        let loaded = ContentLoader::new(&site).unwrap().load().unwrap();

        assert_eq!(loaded.collection.len(), 1);
        assert_eq!(loaded.collection.posts()[0].title, "Good");
        assert_eq!(loaded.assets, vec!["images/logo.png"]);

        let mut failed: Vec<_> = loaded.failures.iter().map(|f| f.path().to_string()).collect();
        failed.sort();
        assert_eq!(failed, vec!["_posts/unclosed.md", "_posts/undated.md"]);
        assert!(loaded.failures.iter().any(|f| matches!(
            f,
            DocumentError::Parse {
                source: ParseError::Unterminated { .. },
                ..
            }
        )));
    }

    #[test]
    fn test_missing_source_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let site = site_in(dir.path());
        assert!(ContentLoader::new(&site).unwrap().load().is_err());
    }

    #[test]
    fn test_generate_permalink() {
        let config = SiteConfig {
            permalink: ":category/:year/:i_month/:slug".to_string(),
            ..Default::default()
        };
        let date = DateTime::parse_from_rfc3339("2019-01-07T10:00:00+08:00").unwrap();
        let path = generate_permalink(&config, &date, "hello", &["Go Lang".to_string()]);
        assert_eq!(path, "go-lang/2019/1/hello/");

        let config = SiteConfig {
            permalink: "/posts/:title.html".to_string(),
            ..Default::default()
        };
        assert_eq!(
            generate_permalink(&config, &date, "hello", &[]),
            "posts/hello.html"
        );
    }
}
