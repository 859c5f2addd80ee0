//! Helper functions shared by the renderer, the templates and the generator

mod html;
mod url;

pub use html::*;
pub use url::*;
