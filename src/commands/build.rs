//! Build the static site

use anyhow::Result;
use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::new_debouncer;
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

use crate::content::loader::ContentLoader;
use crate::content::DocumentError;
use crate::generator::Generator;
use crate::Site;

/// Outcome of one build
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Post pages in the output
    pub published: usize,
    /// Files created or replaced
    pub written: usize,
    /// Files left alone because they were already current
    pub unchanged: usize,
    /// Static assets copied
    pub assets: usize,
    /// Documents that were skipped, ordered by source path
    pub failures: Vec<DocumentError>,
}

impl BuildReport {
    /// True when every document made it into the site
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Load, assemble and write the site
pub fn run(site: &Site) -> Result<BuildReport> {
    let start = Instant::now();

    let loaded = ContentLoader::new(site)?.load()?;
    tracing::info!(
        "Loaded {} posts ({} drafts), {} assets",
        loaded.collection.len(),
        loaded.collection.drafts().len(),
        loaded.assets.len()
    );

    let generator = Generator::new(site)?;
    let assembly = generator.assemble(&loaded.collection)?;
    let stats = generator.write(&assembly, &loaded.assets)?;

    let mut failures = loaded.failures;
    failures.extend(assembly.failures);
    failures.sort_by(|a, b| a.path().cmp(b.path()));

    tracing::info!(
        "Generated {} posts: {} files written, {} unchanged in {:.2}s",
        assembly.published,
        stats.written,
        stats.unchanged,
        start.elapsed().as_secs_f64()
    );
    if !failures.is_empty() {
        tracing::warn!("{} documents failed", failures.len());
    }

    Ok(BuildReport {
        published: assembly.published,
        written: stats.written,
        unchanged: stats.unchanged,
        assets: stats.assets,
        failures,
    })
}

/// Watch the source directory and config file, rebuilding on change.
/// Blocks until the watcher shuts down.
pub fn watch(site: &Site) -> Result<()> {
    let (tx, rx) = channel();
    let mut debouncer = new_debouncer(Duration::from_millis(300), tx)?;

    debouncer
        .watcher()
        .watch(&site.source_dir, RecursiveMode::Recursive)?;
    let config_path = site.base_dir.join("_config.yml");
    if config_path.exists() {
        debouncer
            .watcher()
            .watch(&config_path, RecursiveMode::NonRecursive)?;
    }

    tracing::info!("Watching {:?} for changes. Press Ctrl+C to stop.", site.source_dir);

    for result in rx {
        let events = match result {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("Watch error: {:?}", e);
                continue;
            }
        };
        if events.is_empty() {
            continue;
        }
        for event in &events {
            tracing::debug!("Changed: {:?}", event.path);
        }

        // Config edits may move directories, so reload the site from disk
        // and keep the command line overrides.
        match site.reload().and_then(|fresh| run(&fresh)) {
            Ok(report) => {
                for failure in &report.failures {
                    tracing::error!("{}", failure);
                }
            }
            Err(e) => tracing::error!("Build failed: {:#}", e),
        }
    }

    Ok(())
}
