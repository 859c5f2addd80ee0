//! pressmark: a small static blog generator
//!
//! Reads Markdown documents with YAML or TOML front-matter from a source
//! directory and writes a static site: one page per post, tag and category
//! indexes, a paginated listing, an archive, an Atom feed and a search index.

pub mod commands;
pub mod config;
pub mod content;
pub mod generator;
pub mod helpers;
pub mod templates;

use anyhow::Result;
use std::path::{Path, PathBuf};

pub use commands::build::BuildReport;

/// Command line overrides applied on top of `_config.yml`
#[derive(Debug, Clone, Default)]
struct Overrides {
    source_dir: Option<PathBuf>,
    public_dir: Option<PathBuf>,
    drafts: bool,
}

/// The main application: a site rooted at a base directory
#[derive(Debug, Clone)]
pub struct Site {
    /// Site configuration
    pub config: config::SiteConfig,
    /// Base directory
    pub base_dir: PathBuf,
    /// Source directory
    pub source_dir: PathBuf,
    /// Public (output) directory
    pub public_dir: PathBuf,
    overrides: Overrides,
}

impl Site {
    /// Create a new site from a directory, reading `_config.yml` if present
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let config_path = base_dir.join("_config.yml");

        let config = if config_path.exists() {
            config::SiteConfig::load(&config_path)?
        } else {
            let config = config::SiteConfig::default();
            config.validate()?;
            config
        };

        let source_dir = base_dir.join(&config.source_dir);
        let public_dir = base_dir.join(&config.public_dir);

        Ok(Self {
            config,
            base_dir,
            source_dir,
            public_dir,
            overrides: Overrides::default(),
        })
    }

    /// Read the source documents from `dir` instead of the configured one
    pub fn with_source_dir(mut self, dir: PathBuf) -> Self {
        self.source_dir = self.base_dir.join(&dir);
        self.overrides.source_dir = Some(dir);
        self
    }

    /// Write the site to `dir` instead of the configured one
    pub fn with_public_dir(mut self, dir: PathBuf) -> Self {
        self.public_dir = self.base_dir.join(&dir);
        self.overrides.public_dir = Some(dir);
        self
    }

    /// Publish draft posts as well
    pub fn with_drafts(mut self, drafts: bool) -> Self {
        if drafts {
            self.config.render_drafts = true;
            self.overrides.drafts = true;
        }
        self
    }

    /// Re-read the configuration from disk, keeping command line overrides
    pub fn reload(&self) -> Result<Self> {
        let mut site = Site::new(&self.base_dir)?;
        if let Some(dir) = &self.overrides.source_dir {
            site = site.with_source_dir(dir.clone());
        }
        if let Some(dir) = &self.overrides.public_dir {
            site = site.with_public_dir(dir.clone());
        }
        Ok(site.with_drafts(self.overrides.drafts))
    }

    /// Initialize a new site
    pub fn init(&self) -> Result<()> {
        commands::init::init_site(&self.base_dir)
    }

    /// Generate the static site
    pub fn build(&self) -> Result<BuildReport> {
        commands::build::run(self)
    }

    /// Rebuild on every change below the source directory
    pub fn watch(&self) -> Result<()> {
        commands::build::watch(self)
    }

    /// Clean the public directory
    pub fn clean(&self) -> Result<bool> {
        commands::clean::run(self)
    }

    /// Create a new post
    pub fn new_post(&self, title: &str, draft: bool) -> Result<PathBuf> {
        commands::new::create_post(self, title, draft, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_site_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let site = Site::new(dir.path()).unwrap();
        assert_eq!(site.source_dir, dir.path().join("source"));
        assert_eq!(site.public_dir, dir.path().join("public"));
        assert!(!site.config.render_drafts);
    }

    #[test]
    fn test_overrides_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("_config.yml"), "public_dir: out\n").unwrap();

        let site = Site::new(dir.path())
            .unwrap()
            .with_source_dir(PathBuf::from("content"))
            .with_drafts(true);
        assert_eq!(site.public_dir, dir.path().join("out"));

        fs::write(dir.path().join("_config.yml"), "public_dir: dist\n").unwrap();
        let reloaded = site.reload().unwrap();
        assert_eq!(reloaded.source_dir, dir.path().join("content"));
        assert_eq!(reloaded.public_dir, dir.path().join("dist"));
        assert!(reloaded.config.render_drafts);
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("_config.yml"), "per_page: many\n").unwrap();
        assert!(Site::new(dir.path()).is_err());
    }

    #[test]
    fn test_new_post_then_build() {
        let dir = tempfile::tempdir().unwrap();
        let site = Site::new(dir.path()).unwrap();
        let path = site.new_post("First Steps", false).unwrap();
        assert!(path.ends_with("_posts/first-steps.md"));

        let report = site.build().unwrap();
        assert!(report.is_success());
        assert_eq!(report.published, 1);
        assert!(site.clean().unwrap());
    }
}
