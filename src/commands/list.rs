//! List site content

use anyhow::Result;
use std::fmt::Write;

use crate::content::loader::ContentLoader;
use crate::content::{Collection, Post, Taxonomy, TaxonomyIndex};
use crate::Site;

/// What `list` prints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Posts,
    Drafts,
    Tags,
    Categories,
}

impl std::str::FromStr for ListKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "post" | "posts" => Ok(ListKind::Posts),
            "draft" | "drafts" => Ok(ListKind::Drafts),
            "tag" | "tags" => Ok(ListKind::Tags),
            "category" | "categories" => Ok(ListKind::Categories),
            _ => anyhow::bail!(
                "Unknown type: {}. Available: post, draft, tag, category",
                s
            ),
        }
    }
}

/// Print site content of the given kind to stdout
pub fn run(site: &Site, kind: ListKind) -> Result<()> {
    let loaded = ContentLoader::new(site)?.load()?;
    for failure in &loaded.failures {
        tracing::warn!("{}", failure);
    }
    print!("{}", render(&loaded.collection, kind));
    Ok(())
}

/// Text listing of a collection
pub fn render(collection: &Collection, kind: ListKind) -> String {
    let mut out = String::new();
    match kind {
        ListKind::Posts => {
            let posts = collection.published(false);
            let _ = writeln!(out, "Posts ({}):", posts.len());
            write_posts(&mut out, &posts);
        }
        ListKind::Drafts => {
            let drafts = collection.drafts();
            let _ = writeln!(out, "Drafts ({}):", drafts.len());
            write_posts(&mut out, &drafts);
        }
        ListKind::Tags | ListKind::Categories => {
            let (taxonomy, label) = if kind == ListKind::Tags {
                (Taxonomy::Tags, "Tags")
            } else {
                (Taxonomy::Categories, "Categories")
            };
            let index = TaxonomyIndex::build(collection.published(false), taxonomy);
            let mut terms: Vec<_> = index.terms().collect();
            terms.sort_by(|a, b| b.sources.len().cmp(&a.sources.len()));

            let _ = writeln!(out, "{} ({}):", label, terms.len());
            for term in terms {
                let _ = writeln!(out, "  {} ({})", term.name, term.sources.len());
            }
        }
    }
    out
}

fn write_posts(out: &mut String, posts: &[&Post]) {
    for post in posts {
        let _ = writeln!(
            out,
            "  {} - {} [{}]",
            post.date.format("%Y-%m-%d"),
            post.title,
            post.source
        );
    }
}
