//! Markdown rendering with syntax highlighting

use lazy_static::lazy_static;
use pulldown_cmark::{
    html, CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd,
};
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;
use thiserror::Error;

use super::highlight::{CodeInfo, DirectiveError, Highlighter};
use crate::config::SiteConfig;
use crate::helpers::{html_escape, is_external_link};

lazy_static! {
    /// `<!--more-->`, also written `<!-- more -->`
    static ref MORE_MARKER: Regex = Regex::new(r"<!--[ \t]*more[ \t]*-->").unwrap();
}

/// Body markup errors. Lines count from the first line of the body.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("unterminated code fence opened on line {line}")]
    UnterminatedFence { line: usize },

    #[error("invalid code block directive on line {line}: {source}")]
    InvalidDirective {
        line: usize,
        #[source]
        source: DirectiveError,
    },

    #[error("failed to highlight code block on line {line}: {source}")]
    Highlight {
        line: usize,
        #[source]
        source: syntect::Error,
    },
}

impl RenderError {
    pub fn line(&self) -> usize {
        match self {
            RenderError::UnterminatedFence { line }
            | RenderError::InvalidDirective { line, .. }
            | RenderError::Highlight { line, .. } => *line,
        }
    }

    /// Move the reported line by `offset`, e.g. from body lines to file lines
    pub fn offset_lines(mut self, offset: usize) -> Self {
        match &mut self {
            RenderError::UnterminatedFence { line }
            | RenderError::InvalidDirective { line, .. }
            | RenderError::Highlight { line, .. } => *line += offset,
        }
        self
    }
}

/// Markdown renderer with syntax highlighting
pub struct MarkdownRenderer {
    config: SiteConfig,
    highlighter: Highlighter,
}

struct PendingCode {
    info: CodeInfo,
    source: String,
    line: usize,
}

struct PendingHeading<'a> {
    level: HeadingLevel,
    id: Option<CowStr<'a>>,
    classes: Vec<CowStr<'a>>,
    attrs: Vec<(CowStr<'a>, Option<CowStr<'a>>)>,
    events: Vec<Event<'a>>,
}

impl MarkdownRenderer {
    /// Create a renderer for a site
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            config: config.clone(),
            highlighter: Highlighter::new(&config.highlight),
        }
    }

    /// Render markdown to HTML
    pub fn render(&self, markdown: &str) -> Result<String, RenderError> {
        let parser = Parser::new_ext(markdown, parser_options()).into_offset_iter();

        let mut events: Vec<Event> = Vec::new();
        let mut code: Option<PendingCode> = None;
        let mut heading: Option<PendingHeading> = None;
        let mut external_links: Vec<bool> = Vec::new();
        let mut heading_ids = HeadingIds::default();

        for (event, range) in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let line = line_of(markdown, range.start);
                    let info = match kind {
                        CodeBlockKind::Fenced(_) if !fence_is_closed(markdown, &range) => {
                            return Err(RenderError::UnterminatedFence { line });
                        }
                        CodeBlockKind::Fenced(info) => CodeInfo::parse(&info)
                            .map_err(|source| RenderError::InvalidDirective { line, source })?,
                        CodeBlockKind::Indented => CodeInfo::default(),
                    };
                    code = Some(PendingCode {
                        info,
                        source: String::new(),
                        line,
                    });
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some(block) = code.take() {
                        let highlighted = self
                            .highlighter
                            .render(&block.source, &block.info)
                            .map_err(|source| RenderError::Highlight {
                                line: block.line,
                                source,
                            })?;
                        events.push(Event::Html(CowStr::from(highlighted)));
                    }
                }
                Event::Text(text) if code.is_some() => {
                    if let Some(block) = code.as_mut() {
                        block.source.push_str(&text);
                    }
                }
                Event::Start(Tag::Heading {
                    level,
                    id,
                    classes,
                    attrs,
                }) => {
                    heading = Some(PendingHeading {
                        level,
                        id,
                        classes,
                        attrs,
                        events: Vec::new(),
                    });
                }
                Event::End(TagEnd::Heading(_)) => {
                    if let Some(pending) = heading.take() {
                        self.push_heading(&mut events, pending, &mut heading_ids);
                    }
                }
                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    let external = self.config.external_link.enable
                        && is_external_link(&self.config, &dest_url);
                    external_links.push(external);
                    let event = if external {
                        Event::Html(CowStr::from(external_link_open(&dest_url, &title)))
                    } else {
                        Event::Start(Tag::Link {
                            link_type,
                            dest_url,
                            title,
                            id,
                        })
                    };
                    emit(&mut events, &mut heading, event);
                }
                Event::End(TagEnd::Link) => {
                    let event = if external_links.pop().unwrap_or(false) {
                        Event::Html(CowStr::from("</a>"))
                    } else {
                        Event::End(TagEnd::Link)
                    };
                    emit(&mut events, &mut heading, event);
                }
                other => emit(&mut events, &mut heading, other),
            }
        }

        let mut html_output = String::new();
        html::push_html(&mut html_output, events.into_iter());

        Ok(html_output)
    }

    fn push_heading<'a>(
        &self,
        events: &mut Vec<Event<'a>>,
        pending: PendingHeading<'a>,
        ids: &mut HeadingIds,
    ) {
        let id = match pending.id {
            Some(id) => ids.claim(id.to_string()),
            None => ids.claim(slug::slugify(heading_text(&pending.events))),
        };

        let mut open = format!(r#"<{} id="{}""#, pending.level, html_escape(&id));
        if !pending.classes.is_empty() {
            let classes: Vec<&str> = pending.classes.iter().map(|c| c.as_ref()).collect();
            open.push_str(&format!(r#" class="{}""#, html_escape(&classes.join(" "))));
        }
        for (key, value) in &pending.attrs {
            match value {
                Some(value) => open.push_str(&format!(
                    r#" {}="{}""#,
                    html_escape(key),
                    html_escape(value)
                )),
                None => open.push_str(&format!(" {}", html_escape(key))),
            }
        }
        open.push('>');

        events.push(Event::Html(CowStr::from(open)));
        events.extend(pending.events);
        events.push(Event::Html(CowStr::from(format!("</{}>\n", pending.level))));
    }

    /// Split the body at the teaser marker.
    /// Returns (teaser, full body without the marker).
    pub fn split_excerpt(content: &str) -> (Option<String>, String) {
        match find_more_marker(content) {
            Some(marker) => {
                let teaser = content[..marker.start].to_string();
                let full = format!("{}{}", teaser, &content[marker.end..]);
                (Some(teaser), full)
            }
            None => (None, content.to_string()),
        }
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(&SiteConfig::default())
    }
}

/// Route an event into the heading being collected, if any
fn emit<'a>(
    events: &mut Vec<Event<'a>>,
    heading: &mut Option<PendingHeading<'a>>,
    event: Event<'a>,
) {
    match heading {
        Some(pending) => pending.events.push(event),
        None => events.push(event),
    }
}

fn external_link_open(href: &str, title: &str) -> String {
    let title = if title.is_empty() {
        String::new()
    } else {
        format!(r#" title="{}""#, html_escape(title))
    };
    format!(
        r#"<a href="{}"{} target="_blank" rel="noopener">"#,
        html_escape(href),
        title
    )
}

fn heading_text(events: &[Event]) -> String {
    let mut text = String::new();
    for event in events {
        if let Event::Text(t) | Event::Code(t) = event {
            text.push_str(t);
        }
    }
    text
}

/// Hands out document-unique heading ids: `intro`, `intro-1`, `intro-2`
#[derive(Default)]
struct HeadingIds {
    seen: HashMap<String, usize>,
}

impl HeadingIds {
    fn claim(&mut self, base: String) -> String {
        let base = if base.is_empty() {
            "section".to_string()
        } else {
            base
        };
        let Some(&used) = self.seen.get(&base) else {
            self.seen.insert(base.clone(), 0);
            return base;
        };

        let mut n = used;
        loop {
            n += 1;
            let candidate = format!("{}-{}", base, n);
            if !self.seen.contains_key(&candidate) {
                self.seen.insert(base, n);
                self.seen.insert(candidate.clone(), 0);
                return candidate;
            }
        }
    }
}

/// 1-based line containing byte `offset`
fn line_of(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}

/// Parser options shared by rendering and the code range scan.
/// YAML metadata blocks stay off: front-matter is split off beforehand.
fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_SMART_PUNCTUATION
        | Options::ENABLE_HEADING_ATTRIBUTES
        | Options::ENABLE_DEFINITION_LIST
        | Options::ENABLE_GFM
}

/// Whether the fenced code block at `range` ends with its own closing fence.
///
/// pulldown-cmark also ends a fenced block at the end of its container or of
/// the document, so the block's last source line has to be checked: a run of
/// the opening fence character at least as long as the opening run, behind
/// nothing but indentation and the same number of `>` markers.
fn fence_is_closed(markdown: &str, range: &Range<usize>) -> bool {
    let line_start = markdown[..range.start].rfind('\n').map_or(0, |i| i + 1);
    let block = markdown[line_start..range.end].trim_end_matches(['\n', '\r']);
    let mut lines = block.lines();

    let Some(opening) = lines.next() else {
        return false;
    };
    let Some(at) = opening.find(['`', '~']) else {
        return false;
    };
    let fence = &opening[at..];
    let ch = if fence.starts_with('`') { '`' } else { '~' };
    let len = fence.len() - fence.trim_start_matches(ch).len();
    let depth = opening[..at].matches('>').count();

    let Some(closing) = lines.last() else {
        return false;
    };
    let closing = closing.trim_end();
    let prefix = closing.trim_end_matches(ch);
    closing.len() - prefix.len() >= len
        && prefix.chars().all(|c| c == ' ' || c == '\t' || c == '>')
        && prefix.matches('>').count() == depth
}

/// Byte ranges of code blocks and inline code spans
fn code_ranges(markdown: &str) -> Vec<Range<usize>> {
    Parser::new_ext(markdown, parser_options())
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Start(Tag::CodeBlock(_)) | Event::Code(_) => Some(range),
            _ => None,
        })
        .collect()
}

/// Byte range of the first teaser marker outside code
pub fn find_more_marker(markdown: &str) -> Option<Range<usize>> {
    let code = code_ranges(markdown);
    MORE_MARKER
        .find_iter(markdown)
        .find(|m| !code.iter().any(|r| r.contains(&m.start())))
        .map(|m| m.range())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> MarkdownRenderer {
        MarkdownRenderer::default()
    }

    #[test]
    fn test_render_basic_markdown() {
        let html = renderer()
            .render("# Hello World\n\nThis is *a* **test** with `code`.")
            .unwrap();
        assert!(html.contains(r#"<h1 id="hello-world">Hello World</h1>"#));
        assert!(html.contains("<em>a</em>"));
        assert!(html.contains("<strong>test</strong>"));
        assert!(html.contains("<code>code</code>"));
    }

    #[test]
    fn test_heading_ids_are_unique() {
        let html = renderer()
            .render("## Setup\n\n## Setup\n\n## Custom {#mine}\n")
            .unwrap();
        assert!(html.contains(r#"<h2 id="setup">"#));
        assert!(html.contains(r#"<h2 id="setup-1">"#));
        assert!(html.contains(r#"<h2 id="mine">"#));
    }

    #[test]
    fn test_render_code_block() {
        let html = renderer().render("```rust\nfn main() {}\n```").unwrap();
        assert!(html.contains("highlight rust"));
        assert!(!html.contains("```"));
    }

    #[test]
    fn test_code_block_directives() {
        let md = "```go {hl_lines=[2]}\npackage main\nfunc main() {}\n```\n";
        let html = renderer().render(md).unwrap();
        assert_eq!(html.matches(r#"class="line hl""#).count(), 1);
    }

    #[test]
    fn test_invalid_directive_reports_line() {
        let md = "intro\n\n```go {bogus=1}\nx\n```\n";
        match renderer().render(md) {
            Err(RenderError::InvalidDirective { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unterminated_fence() {
        let md = "Some text\n\n```sh\ngo build -o app\nupx app\n";
        match renderer().render(md) {
            Err(RenderError::UnterminatedFence { line }) => assert_eq!(line, 3),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }

        // A shorter run does not close a longer fence
        assert!(renderer().render("````\ncode\n```\n").is_err());
        assert!(renderer().render("````\ncode\n`````\n").is_ok());
        assert!(renderer().render("~~~\n```\n~~~\n").is_ok());
        // Four spaces of indent is indented code, not a fence
        assert!(renderer().render("    ```\n").is_ok());
    }

    #[test]
    fn test_fence_inside_list_item() {
        // The closing fence may be indented further than the opening one
        let md = "- step\n\n  ```sh\n  go build\n    ```\n\nafter\n";
        let html = renderer().render(md).unwrap();
        assert!(html.contains("go build"));
        assert!(html.contains("<p>after</p>"));
    }

    #[test]
    fn test_fence_inside_blockquote() {
        let html = renderer().render("> ```sh\n> go build\n> ```\n").unwrap();
        assert!(html.contains("<blockquote>"));
        assert!(html.contains("go build"));

        match renderer().render("> ```sh\n> go build\n") {
            Err(RenderError::UnterminatedFence { line }) => assert_eq!(line, 1),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }

        // Leaving the quote ends the block without a closing fence
        match renderer().render("intro\n\n> ```sh\n> go build\n\n```\n") {
            Err(RenderError::UnterminatedFence { line }) => assert_eq!(line, 3),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_huge_line_start_does_not_overflow() {
        let md = "```go {linenostart=18446744073709551615}\na\nb\n```\n";
        let html = renderer().render(md).unwrap();
        assert!(html.contains(r#"<span class="line-number">18446744073709551615</span>"#));
    }

    #[test]
    fn test_links_and_images() {
        let md = "[docs](https://docs.docker.com/) and [home](/about/)\n\n![logo](/images/logo.png \"Logo\")";
        let html = renderer().render(md).unwrap();
        assert!(html.contains(
            r#"<a href="https://docs.docker.com/" target="_blank" rel="noopener">docs</a>"#
        ));
        assert!(html.contains(r#"<a href="/about/">home</a>"#));
        assert!(html.contains(r#"<img src="/images/logo.png" alt="logo" title="Logo" />"#));
    }

    #[test]
    fn test_external_links_can_be_disabled() {
        let mut config = SiteConfig::default();
        config.external_link.enable = false;
        let html = MarkdownRenderer::new(&config)
            .render("[go](https://go.dev/)")
            .unwrap();
        assert!(html.contains(r#"<a href="https://go.dev/">go</a>"#));
    }

    #[test]
    fn test_split_excerpt() {
        let (teaser, full) = MarkdownRenderer::split_excerpt("A<!--more-->B");
        assert_eq!(teaser.as_deref(), Some("A"));
        assert_eq!(full, "AB");

        let content = "This is excerpt.\n<!-- more -->\nThis is more content.";
        let (teaser, full) = MarkdownRenderer::split_excerpt(content);
        assert_eq!(teaser.as_deref(), Some("This is excerpt.\n"));
        assert_eq!(full, "This is excerpt.\n\nThis is more content.");

        let (teaser, full) = MarkdownRenderer::split_excerpt("no marker");
        assert_eq!(teaser, None);
        assert_eq!(full, "no marker");
    }

    #[test]
    fn test_marker_inside_code_is_ignored() {
        let content = "Intro\n\n```html\n<!--more-->\n```\n\nTail<!--more-->End";
        let (teaser, full) = MarkdownRenderer::split_excerpt(content);
        assert_eq!(
            teaser.as_deref(),
            Some("Intro\n\n```html\n<!--more-->\n```\n\nTail")
        );
        assert!(full.ends_with("TailEnd"));

        // Markers in indented code, inline code and quoted fences are text
        let content = "    <!--more-->\n\nSee `<!--more-->`.\n\n> ```\n> <!--more-->\n> ```\n";
        assert_eq!(find_more_marker(content), None);

        let content = "- item\n\n  ```\n  <!--more-->\n    ```\n\nA<!--more-->B";
        let (teaser, full) = MarkdownRenderer::split_excerpt(content);
        assert!(teaser.unwrap().ends_with("A"));
        assert!(full.ends_with("AB"));
    }

    #[test]
    fn test_render_error_offset() {
        let err = RenderError::UnterminatedFence { line: 2 }.offset_lines(4);
        assert_eq!(err.line(), 6);
    }
}
