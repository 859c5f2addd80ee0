//! Generator module - assembles the site from a collection of posts
//!
//! Assembly is pure: it renders every output file into memory. Writing to
//! the public directory is a separate step that leaves files whose bytes are
//! already up to date untouched.

use anyhow::{Context as _, Result};
use chrono::Datelike;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tera::Context;

use crate::config::SiteConfig;
use crate::content::{Collection, DocumentError, Post, Taxonomy, TaxonomyIndex};
use crate::helpers::{full_url_for, host_of, strip_html, strip_invalid_xml_chars, url_for};
use crate::templates::{
    date_iso, home_permalink, site_context, ArchiveYearData, FeedEntry, NavPost, PaginationData,
    PostData, TemplateRenderer, TermData,
};
use crate::Site;

lazy_static! {
    /// Root-relative `href`/`src` attributes (but not protocol-relative `//host`)
    static ref ROOT_RELATIVE_URL: Regex =
        Regex::new(r#"(href|src)=(["'])/([^/])"#).unwrap();
}

/// Output files that are not post pages
const RESERVED_FILES: &[&str] = &["index.html", "atom.xml", "search.json"];

/// One rendered output file, relative to the public directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: String,
    pub contents: Vec<u8>,
}

/// Result of assembling a collection
#[derive(Debug, Default)]
pub struct Assembly {
    /// Output files ordered by path
    pub files: Vec<OutputFile>,
    /// Posts dropped during assembly
    pub failures: Vec<DocumentError>,
    /// Number of post pages produced
    pub published: usize,
}

impl Assembly {
    pub fn get(&self, path: &str) -> Option<&OutputFile> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// Counters reported by [`Generator::write`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    /// Files created or replaced
    pub written: usize,
    /// Files skipped because their bytes were already current
    pub unchanged: usize,
    /// Assets processed (included in the two counters above)
    pub assets: usize,
}

#[derive(Debug, Serialize)]
struct SearchEntry {
    title: String,
    url: String,
    date: String,
    text: String,
}

/// Static site generator using Tera templates
pub struct Generator {
    config: SiteConfig,
    source_dir: PathBuf,
    public_dir: PathBuf,
    renderer: TemplateRenderer,
}

impl Generator {
    /// Create a new generator
    pub fn new(site: &Site) -> Result<Self> {
        Ok(Self {
            config: site.config.clone(),
            source_dir: site.source_dir.clone(),
            public_dir: site.public_dir.clone(),
            renderer: TemplateRenderer::new()?,
        })
    }

    /// Render every output file for the collection
    pub fn assemble(&self, collection: &Collection) -> Result<Assembly> {
        let candidates = collection.published(self.config.render_drafts);
        let (posts, failures) = self.claim_routes(&candidates);

        let mut files = BTreeMap::new();
        self.render_index_pages(&posts, &mut files)?;
        self.render_post_pages(&posts, &mut files)?;
        self.render_taxonomy(&posts, Taxonomy::Tags, &mut files)?;
        self.render_taxonomy(&posts, Taxonomy::Categories, &mut files)?;
        self.render_archive(&posts, &mut files)?;
        self.render_feed(&posts, &mut files)?;
        self.render_search_index(&posts, &mut files)?;

        tracing::debug!(
            "Assembled {} files from {} posts",
            files.len(),
            posts.len()
        );

        Ok(Assembly {
            files: files
                .into_iter()
                .map(|(path, contents)| OutputFile { path, contents })
                .collect(),
            failures,
            published: posts.len(),
        })
    }

    /// Write assembled files and copy assets into the public directory
    pub fn write(&self, assembly: &Assembly, assets: &[String]) -> Result<WriteStats> {
        fs::create_dir_all(&self.public_dir)
            .with_context(|| format!("Failed to create {:?}", self.public_dir))?;

        let mut stats = WriteStats::default();
        let mut record = |changed: bool| {
            if changed {
                stats.written += 1;
            } else {
                stats.unchanged += 1;
            }
        };

        let generated: HashSet<&str> = assembly.files.iter().map(|f| f.path.as_str()).collect();
        for file in &assembly.files {
            record(write_if_changed(&self.public_dir.join(&file.path), &file.contents)?);
        }

        let mut copied = 0;
        for asset in assets {
            if generated.contains(asset.as_str()) {
                tracing::warn!("Asset {} is shadowed by a generated page, skipping", asset);
                continue;
            }
            let src = self.source_dir.join(asset);
            let bytes = fs::read(&src).with_context(|| format!("Failed to read {:?}", src))?;
            record(write_if_changed(&self.public_dir.join(asset), &bytes)?);
            copied += 1;
        }
        stats.assets = copied;

        Ok(stats)
    }

    /// Give each post its output route. A post whose route is taken by an
    /// earlier post, or by a generated page, is dropped.
    fn claim_routes<'a>(&self, candidates: &[&'a Post]) -> (Vec<&'a Post>, Vec<DocumentError>) {
        let reserved_dirs: Vec<&str> = [
            &self.config.tag_dir,
            &self.config.category_dir,
            &self.config.archive_dir,
            &self.config.pagination_dir,
        ]
        .into_iter()
        .map(|d| d.trim_matches('/'))
        .collect();

        let mut claimed: HashMap<String, &str> = HashMap::new();
        let mut posts = Vec::with_capacity(candidates.len());
        let mut failures = Vec::new();

        for &post in candidates {
            let file = route_file(&post.path);
            let first_segment = post.path.trim_start_matches('/').split('/').next().unwrap_or("");

            let taken_by = if RESERVED_FILES.contains(&file.as_str())
                || (file.contains('/') && reserved_dirs.contains(&first_segment))
            {
                Some("a generated page".to_string())
            } else {
                claimed.get(&file).map(|source| source.to_string())
            };

            match taken_by {
                Some(other) => {
                    let err = DocumentError::DuplicateRoute {
                        path: post.source.clone(),
                        route: post.path.clone(),
                        other,
                    };
                    tracing::error!("{}", err);
                    failures.push(err);
                }
                None => {
                    claimed.insert(file, &post.source);
                    posts.push(post);
                }
            }
        }

        (posts, failures)
    }

    fn post_data(&self, posts: &[&Post]) -> Vec<PostData> {
        posts
            .iter()
            .map(|p| PostData::new(&self.config, p))
            .collect()
    }

    fn render_page(
        &self,
        template: &str,
        context: &Context,
        file: String,
        files: &mut BTreeMap<String, Vec<u8>>,
    ) -> Result<()> {
        let html = self
            .renderer
            .render(template, context)
            .with_context(|| format!("Failed to render {} with {}", file, template))?;
        tracing::debug!("Generated: {}", file);
        files.insert(file, html.into_bytes());
        Ok(())
    }

    /// Route of listing page `n` (1-based)
    fn listing_route(&self, n: usize) -> String {
        if n <= 1 {
            String::new()
        } else {
            format!("{}/{}/", self.config.pagination_dir.trim_matches('/'), n)
        }
    }

    /// Generate index pages with pagination
    fn render_index_pages(
        &self,
        posts: &[&Post],
        files: &mut BTreeMap<String, Vec<u8>>,
    ) -> Result<()> {
        let per_page = match self.config.per_page {
            0 => posts.len().max(1),
            n => n,
        };
        let pages: Vec<&[&Post]> = if posts.is_empty() {
            vec![posts]
        } else {
            posts.chunks(per_page).collect()
        };
        let total = pages.len();

        for (i, page_posts) in pages.iter().enumerate() {
            let current = i + 1;
            let pagination = PaginationData {
                per_page,
                total,
                current,
                prev_link: (current > 1)
                    .then(|| url_for(&self.config, &self.listing_route(current - 1))),
                next_link: (current < total)
                    .then(|| url_for(&self.config, &self.listing_route(current + 1))),
            };

            let mut context = site_context(&self.config);
            context.insert("page_title", "");
            context.insert("posts", &self.post_data(page_posts));
            context.insert("pagination", &pagination);

            let file = route_file(&self.listing_route(current));
            self.render_page("index.html", &context, file, files)?;
        }

        Ok(())
    }

    /// Generate individual post pages
    fn render_post_pages(
        &self,
        posts: &[&Post],
        files: &mut BTreeMap<String, Vec<u8>>,
    ) -> Result<()> {
        let nav = |post: &Post| NavPost {
            title: post.title.clone(),
            url: url_for(&self.config, &post.path),
        };

        for (i, post) in posts.iter().enumerate() {
            let newer = i.checked_sub(1).map(|j| nav(posts[j]));
            let older = posts.get(i + 1).map(|&p| nav(p));

            let mut context = site_context(&self.config);
            context.insert("page_title", &post.title);
            context.insert("post", &PostData::new(&self.config, post));
            context.insert("newer", &newer);
            context.insert("older", &older);

            self.render_page("post.html", &context, route_file(&post.path), files)?;
        }

        Ok(())
    }

    /// Generate the overview and per-term pages for tags or categories
    fn render_taxonomy(
        &self,
        posts: &[&Post],
        taxonomy: Taxonomy,
        files: &mut BTreeMap<String, Vec<u8>>,
    ) -> Result<()> {
        let (dir, title, kind) = match taxonomy {
            Taxonomy::Tags => (&self.config.tag_dir, "Tags", "Tag"),
            Taxonomy::Categories => (&self.config.category_dir, "Categories", "Category"),
        };
        let dir = dir.trim_matches('/');

        let index = TaxonomyIndex::build(posts.iter().copied(), taxonomy);
        let by_source: HashMap<&str, &Post> =
            posts.iter().map(|p| (p.source.as_str(), *p)).collect();

        let mut terms = Vec::with_capacity(index.len());
        for term in index.terms() {
            let route = format!("{}/{}/", dir, term.slug);
            let data = TermData {
                name: term.name.clone(),
                slug: term.slug.clone(),
                url: url_for(&self.config, &route),
                count: term.sources.len(),
            };

            let members: Vec<&Post> = term
                .sources
                .iter()
                .filter_map(|source| by_source.get(source.as_str()).copied())
                .collect();

            let mut context = site_context(&self.config);
            context.insert("page_title", &format!("{}: {}", kind, term.name));
            context.insert("kind", kind);
            context.insert("term", &data);
            context.insert("posts", &self.post_data(&members));
            self.render_page("term.html", &context, route_file(&route), files)?;

            terms.push(data);
        }

        let mut context = site_context(&self.config);
        context.insert("page_title", title);
        context.insert("terms", &terms);
        self.render_page("terms.html", &context, format!("{}/index.html", dir), files)
    }

    /// Generate the archive page, grouped by year
    fn render_archive(
        &self,
        posts: &[&Post],
        files: &mut BTreeMap<String, Vec<u8>>,
    ) -> Result<()> {
        let mut years: Vec<ArchiveYearData> = Vec::new();
        for post in posts {
            let year = post.date.year();
            let data = PostData::new(&self.config, post);
            match years.last_mut() {
                Some(last) if last.year == year => last.posts.push(data),
                _ => years.push(ArchiveYearData {
                    year,
                    posts: vec![data],
                }),
            }
        }

        let mut context = site_context(&self.config);
        context.insert("page_title", "Archives");
        context.insert("years", &years);
        let file = format!("{}/index.html", self.config.archive_dir.trim_matches('/'));
        self.render_page("archive.html", &context, file, files)
    }

    /// Generate the Atom feed
    fn render_feed(&self, posts: &[&Post], files: &mut BTreeMap<String, Vec<u8>>) -> Result<()> {
        let limit = match self.config.feed_limit {
            0 => posts.len(),
            n => n,
        };
        let recent = &posts[..posts.len().min(limit)];

        let origin = origin_of(&self.config.url);
        let entries: Vec<FeedEntry> = recent
            .iter()
            .map(|post| FeedEntry {
                title: post.title.clone(),
                id: post.permalink.clone(),
                link: post.permalink.clone(),
                published: date_iso(&post.date),
                updated: date_iso(&post.updated.unwrap_or(post.date)),
                summary: post
                    .excerpt
                    .as_deref()
                    .map(|html| feed_html(html, &origin)),
                content: feed_html(&post.content, &origin),
                categories: post
                    .categories
                    .iter()
                    .chain(post.tags.iter())
                    .cloned()
                    .collect(),
            })
            .collect();

        let updated = recent
            .iter()
            .map(|p| p.updated.unwrap_or(p.date).max(p.date))
            .max()
            .map(|d| date_iso(&d))
            .unwrap_or_else(|| "1970-01-01T00:00:00+00:00".to_string());

        let mut context = site_context(&self.config);
        context.insert("home", &home_permalink(&self.config));
        context.insert("feed_link", &full_url_for(&self.config, "atom.xml"));
        context.insert("updated", &updated);
        context.insert("entries", &entries);
        self.render_page("atom.xml", &context, "atom.xml".to_string(), files)
    }

    /// Generate the search index (JSON)
    fn render_search_index(
        &self,
        posts: &[&Post],
        files: &mut BTreeMap<String, Vec<u8>>,
    ) -> Result<()> {
        let entries: Vec<SearchEntry> = posts
            .iter()
            .map(|p| SearchEntry {
                title: p.title.clone(),
                url: url_for(&self.config, &p.path),
                date: date_iso(&p.date),
                text: collapse_whitespace(&strip_html(&p.content)),
            })
            .collect();

        let json = serde_json::to_string_pretty(&entries)?;
        files.insert("search.json".to_string(), json.into_bytes());
        Ok(())
    }
}

/// Output file of a route: directories get an `index.html`
fn route_file(route: &str) -> String {
    let route = route.trim_start_matches('/');
    if route.is_empty() || route.ends_with('/') {
        format!("{}index.html", route)
    } else if route.ends_with(".html") {
        route.to_string()
    } else {
        format!("{}/index.html", route)
    }
}

/// `scheme://host[:port]` of a site URL
fn origin_of(url: &str) -> String {
    let url = url.trim_end_matches('/');
    match (url.find("://"), host_of(url)) {
        (Some(scheme_end), Some(_)) => {
            let rest = &url[scheme_end + 3..];
            let authority = rest.split('/').next().unwrap_or(rest);
            format!("{}{}", &url[..scheme_end + 3], authority)
        }
        _ => url.to_string(),
    }
}

/// Make root-relative links absolute and keep the HTML safe inside CDATA
fn feed_html(html: &str, origin: &str) -> String {
    let absolute = ROOT_RELATIVE_URL.replace_all(html, |caps: &Captures| {
        format!("{}={}{}/{}", &caps[1], &caps[2], origin, &caps[3])
    });
    strip_invalid_xml_chars(&absolute).replace("]]>", "]]]]><![CDATA[>")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Write `contents` unless the file already holds exactly these bytes.
/// Returns whether the file was written.
fn write_if_changed(path: &Path, contents: &[u8]) -> Result<bool> {
    if let Ok(existing) = fs::read(path) {
        if existing == contents {
            return Ok(false);
        }
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create dir {:?}", parent))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(true)
}
