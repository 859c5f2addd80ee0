//! The ordered set of loaded posts and the tag/category indexes derived from it

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use super::Post;

/// Posts ordered newest first, ties broken by source path
#[derive(Debug, Clone, Default)]
pub struct Collection {
    posts: Vec<Post>,
}

/// Collection order: date descending, then source path ascending
pub fn collection_order(a: &Post, b: &Post) -> Ordering {
    b.date
        .cmp(&a.date)
        .then_with(|| a.source.cmp(&b.source))
}

impl Collection {
    /// Build a collection. Posts sharing a source path are dropped after the
    /// first one in collection order.
    pub fn new(mut posts: Vec<Post>) -> Self {
        posts.sort_by(collection_order);

        let mut seen = HashSet::new();
        posts.retain(|post| {
            let first = seen.insert(post.source.clone());
            if !first {
                tracing::warn!("Duplicate source path {:?}, keeping the first", post.source);
            }
            first
        });

        Self { posts }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Posts that go into the site, in collection order
    pub fn published(&self, include_drafts: bool) -> Vec<&Post> {
        self.posts
            .iter()
            .filter(|p| include_drafts || !p.draft)
            .collect()
    }

    /// Draft posts, in collection order
    pub fn drafts(&self) -> Vec<&Post> {
        self.posts.iter().filter(|p| p.draft).collect()
    }
}

/// Which post labels an index is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Taxonomy {
    Tags,
    Categories,
}

impl Taxonomy {
    fn labels(self, post: &Post) -> &[String] {
        match self {
            Taxonomy::Tags => &post.tags,
            Taxonomy::Categories => &post.categories,
        }
    }
}

/// One tag or category and the posts carrying it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    /// Display name, as first written
    pub name: String,
    pub slug: String,
    /// Source paths of member posts, in collection order
    pub sources: Vec<String>,
}

/// Label -> posts mapping, keyed by slug so that `Go` and `go` share a page
#[derive(Debug, Clone, Default)]
pub struct TaxonomyIndex {
    terms: BTreeMap<String, Term>,
}

impl TaxonomyIndex {
    /// Build the index from posts given in collection order
    pub fn build<'a, I>(posts: I, taxonomy: Taxonomy) -> Self
    where
        I: IntoIterator<Item = &'a Post>,
    {
        let mut terms: BTreeMap<String, Term> = BTreeMap::new();

        for post in posts {
            for label in taxonomy.labels(post) {
                let slug = slug::slugify(label);
                if slug.is_empty() {
                    tracing::warn!("Skipping label {:?} in {}: empty slug", label, post.source);
                    continue;
                }
                let term = terms.entry(slug.clone()).or_insert_with(|| Term {
                    name: label.clone(),
                    slug,
                    sources: Vec::new(),
                });
                if !term.sources.contains(&post.source) {
                    term.sources.push(post.source.clone());
                }
            }
        }

        Self { terms }
    }

    /// Terms ordered by slug
    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.values()
    }

    pub fn get(&self, slug: &str) -> Option<&Term> {
        self.terms.get(slug)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn post(source: &str, day: u32, tags: &[&str]) -> Post {
        let date = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2019, 1, day, 12, 0, 0)
            .unwrap();
        let mut p = Post::new(source.to_string(), date, source.to_string());
        p.tags = tags.iter().map(|t| t.to_string()).collect();
        p
    }

    #[test]
    fn test_order_is_date_descending_then_path() {
        let collection = Collection::new(vec![
            post("b.md", 7, &[]),
            post("old.md", 1, &[]),
            post("a.md", 7, &[]),
            post("new.md", 20, &[]),
        ]);
        let order: Vec<_> = collection.posts().iter().map(|p| p.source.as_str()).collect();
        assert_eq!(order, vec!["new.md", "a.md", "b.md", "old.md"]);

        for pair in collection.posts().windows(2) {
            assert!(pair[0].date >= pair[1].date);
        }
    }

    #[test]
    fn test_duplicate_sources_dropped() {
        let collection = Collection::new(vec![post("a.md", 2, &[]), post("a.md", 1, &[])]);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.posts()[0].date.format("%d").to_string(), "02");
    }

    #[test]
    fn test_drafts_excluded_from_published() {
        let mut draft = post("draft.md", 9, &[]);
        draft.draft = true;
        let collection = Collection::new(vec![draft, post("live.md", 8, &[])]);

        let published: Vec<_> = collection.published(false).iter().map(|p| p.source.clone()).collect();
        assert_eq!(published, vec!["live.md"]);
        assert_eq!(collection.published(true).len(), 2);
        assert_eq!(collection.drafts().len(), 1);
    }

    #[test]
    fn test_taxonomy_index() {
        let collection = Collection::new(vec![
            post("git.md", 3, &["news", "git"]),
            post("docker.md", 5, &["Docker", "go"]),
            post("go.md", 4, &["Go", "news"]),
        ]);
        let index = TaxonomyIndex::build(collection.posts(), Taxonomy::Tags);

        let slugs: Vec<_> = index.terms().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, vec!["docker", "git", "go", "news"]);

        let go = index.get("go").unwrap();
        assert_eq!(go.name, "go");
        assert_eq!(go.sources, vec!["docker.md", "go.md"]);

        let news = index.get("news").unwrap();
        assert_eq!(news.sources, vec!["go.md", "git.md"]);

        assert!(TaxonomyIndex::build(collection.posts(), Taxonomy::Categories).is_empty());
    }

    #[test]
    fn test_unsluggable_labels_skipped() {
        let collection = Collection::new(vec![post("a.md", 1, &["???"])]);
        let index = TaxonomyIndex::build(collection.posts(), Taxonomy::Tags);
        assert!(index.is_empty());
    }
}
