//! Content module - handles documents, front-matter and markdown processing

mod collection;
mod frontmatter;
mod highlight;
pub mod loader;
mod markdown;
mod post;

use thiserror::Error;

pub use collection::{collection_order, Collection, Taxonomy, TaxonomyIndex, Term};
pub use frontmatter::{split, Format, FrontMatter, ParseError, Split, Timestamp};
pub use highlight::{CodeInfo, DirectiveError, Highlighter};
pub use markdown::{find_more_marker, MarkdownRenderer, RenderError};
pub use post::{dedup_labels, Post};

/// A document that could not be turned into a page.
/// Aborts that document only; the rest of the site is still built.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("{path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ParseError,
    },

    #[error("{path}: {source}")]
    Render {
        path: String,
        #[source]
        source: RenderError,
    },

    #[error("{path}: output route `{route}` is already taken by {other}")]
    DuplicateRoute {
        path: String,
        route: String,
        other: String,
    },
}

impl DocumentError {
    /// Source path of the offending document
    pub fn path(&self) -> &str {
        match self {
            DocumentError::Parse { path, .. }
            | DocumentError::Render { path, .. }
            | DocumentError::DuplicateRoute { path, .. } => path,
        }
    }
}
