//! Fenced code blocks: info-string directives and syntax highlighting
//!
//! An info string looks like `go {hl_lines=[2,"4-5"], linenos=false}` or the
//! shorter `go{2,4-5}`. Line numbers in directives count from the first line
//! of the block.

use std::ops::RangeInclusive;

use syntect::easy::HighlightLines;
use syntect::highlighting::{Style, Theme, ThemeSet};
use syntect::html::{styled_line_to_highlighted_html, IncludeBackground};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use thiserror::Error;

use crate::config::HighlightConfig;
use crate::helpers::html_escape;

/// A directive in a code fence info string that could not be understood
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct DirectiveError(pub String);

/// Parsed code fence info string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeInfo {
    pub lang: Option<String>,
    pub hl_lines: Vec<RangeInclusive<usize>>,
    pub line_numbers: Option<bool>,
    pub line_start: Option<usize>,
}

impl CodeInfo {
    /// Parse the text following the opening fence
    pub fn parse(info: &str) -> Result<Self, DirectiveError> {
        let info = info.trim();

        let (lang, directives) = match info.find('{') {
            Some(open) => {
                let close = info
                    .rfind('}')
                    .filter(|&close| close > open)
                    .ok_or_else(|| DirectiveError(format!("unclosed `{{` in `{}`", info)))?;
                if !info[close + 1..].trim().is_empty() {
                    return Err(DirectiveError(format!(
                        "unexpected text after directives in `{}`",
                        info
                    )));
                }
                (&info[..open], Some(&info[open + 1..close]))
            }
            None => (info, None),
        };

        let mut code_info = CodeInfo {
            lang: lang.split_whitespace().next().map(str::to_string),
            ..Default::default()
        };

        if let Some(directives) = directives {
            for entry in split_top_level(directives) {
                code_info.apply(entry)?;
            }
        }

        Ok(code_info)
    }

    fn apply(&mut self, entry: &str) -> Result<(), DirectiveError> {
        let Some((key, value)) = entry.split_once('=') else {
            // Bare `3` or `4-6`
            self.hl_lines.push(parse_range(entry)?);
            return Ok(());
        };

        let value = unquote(value.trim());
        match key.trim() {
            "hl_lines" => {
                let list = value
                    .strip_prefix('[')
                    .and_then(|v| v.strip_suffix(']'))
                    .unwrap_or(value);
                for item in list.split([',', ' ']).filter(|s| !s.trim().is_empty()) {
                    self.hl_lines.push(parse_range(unquote(item.trim()))?);
                }
            }
            "linenos" => {
                self.line_numbers = Some(match value {
                    "true" | "table" | "inline" => true,
                    "false" => false,
                    other => {
                        return Err(DirectiveError(format!(
                            "invalid linenos value `{}`",
                            other
                        )))
                    }
                });
            }
            "linenostart" => {
                let start = value
                    .parse::<usize>()
                    .map_err(|_| DirectiveError(format!("invalid linenostart `{}`", value)))?;
                self.line_start = Some(start);
            }
            other => {
                return Err(DirectiveError(format!("unknown directive `{}`", other)));
            }
        }

        Ok(())
    }

    /// Whether the 1-based line `n` of the block is highlighted
    pub fn is_highlighted(&self, n: usize) -> bool {
        self.hl_lines.iter().any(|r| r.contains(&n))
    }
}

/// Split on commas that are not inside `[...]`
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);

    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn unquote(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'')
}

fn parse_range(s: &str) -> Result<RangeInclusive<usize>, DirectiveError> {
    let invalid = || DirectiveError(format!("invalid line range `{}`", s));
    let s = s.trim();

    let (start, end) = match s.split_once('-') {
        Some((a, b)) => (
            a.trim().parse::<usize>().map_err(|_| invalid())?,
            b.trim().parse::<usize>().map_err(|_| invalid())?,
        ),
        None => {
            let n = s.parse::<usize>().map_err(|_| invalid())?;
            (n, n)
        }
    };

    if start == 0 || start > end {
        return Err(invalid());
    }
    Ok(start..=end)
}

/// Renders code blocks to HTML
pub struct Highlighter {
    syntax_set: SyntaxSet,
    theme: Theme,
    enabled: bool,
    line_numbers: bool,
}

impl Highlighter {
    pub fn new(config: &HighlightConfig) -> Self {
        let mut theme_set = ThemeSet::load_defaults();
        let theme = match theme_set.themes.remove(&config.theme) {
            Some(theme) => theme,
            None => {
                tracing::warn!(
                    "Unknown highlight theme {:?}, using base16-ocean.dark",
                    config.theme
                );
                theme_set
                    .themes
                    .remove("base16-ocean.dark")
                    .unwrap_or_default()
            }
        };

        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme,
            enabled: config.enable,
            line_numbers: config.line_number,
        }
    }

    /// Render one code block
    pub fn render(&self, code: &str, info: &CodeInfo) -> Result<String, syntect::Error> {
        let lang = info.lang.as_deref().unwrap_or("text");
        let lines = if self.enabled {
            self.highlight_lines(code, lang)?
        } else {
            LinesWithEndings::from(code)
                .map(|line| html_escape(line.trim_end_matches(['\n', '\r'])))
                .collect()
        };

        let first = info.line_start.unwrap_or(1);
        let mut gutter = Vec::with_capacity(lines.len());
        let mut body = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            gutter.push(format!(
                r#"<span class="line-number">{}</span>"#,
                first.saturating_add(i)
            ));
            let class = if info.is_highlighted(i + 1) {
                "line hl"
            } else {
                "line"
            };
            body.push(format!(r#"<span class="{}">{}</span>"#, class, line));
        }

        let lang = html_escape(lang);
        if info.line_numbers.unwrap_or(self.line_numbers) {
            Ok(format!(
                r#"<figure class="highlight {}"><table><tr><td class="gutter"><pre>{}</pre></td><td class="code"><pre>{}</pre></td></tr></table></figure>"#,
                lang,
                gutter.join("\n"),
                body.join("\n")
            ))
        } else {
            Ok(format!(
                r#"<figure class="highlight {}"><pre><code class="language-{}">{}</code></pre></figure>"#,
                lang,
                lang,
                body.join("\n")
            ))
        }
    }

    fn highlight_lines(&self, code: &str, lang: &str) -> Result<Vec<String>, syntect::Error> {
        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang))
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());

        let mut highlighter = HighlightLines::new(syntax, &self.theme);
        let mut lines = Vec::new();

        for line in LinesWithEndings::from(code) {
            let regions = highlighter.highlight_line(line, &self.syntax_set)?;
            // The line ending is re-added when lines are joined
            let regions: Vec<(Style, &str)> = regions
                .into_iter()
                .map(|(style, text)| (style, text.trim_end_matches(['\n', '\r'])))
                .collect();
            lines.push(styled_line_to_highlighted_html(
                &regions[..],
                IncludeBackground::No,
            )?);
        }

        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_language() {
        let info = CodeInfo::parse("go").unwrap();
        assert_eq!(info.lang.as_deref(), Some("go"));
        assert!(info.hl_lines.is_empty());
        assert_eq!(CodeInfo::parse("").unwrap(), CodeInfo::default());
    }

    #[test]
    fn test_parse_hugo_directives() {
        let info = CodeInfo::parse(r#"go {hl_lines=[2,"4-5"], linenos=false, linenostart=10}"#)
            .unwrap();
        assert_eq!(info.lang.as_deref(), Some("go"));
        assert_eq!(info.hl_lines, vec![2..=2, 4..=5]);
        assert_eq!(info.line_numbers, Some(false));
        assert_eq!(info.line_start, Some(10));

        let info = CodeInfo::parse(r#"sh {hl_lines="1 3-4"}"#).unwrap();
        assert_eq!(info.hl_lines, vec![1..=1, 3..=4]);
    }

    #[test]
    fn test_parse_short_form() {
        let info = CodeInfo::parse("dockerfile{1,3-4}").unwrap();
        assert_eq!(info.lang.as_deref(), Some("dockerfile"));
        assert!(info.is_highlighted(1));
        assert!(!info.is_highlighted(2));
        assert!(info.is_highlighted(4));
    }

    #[test]
    fn test_invalid_directives() {
        assert!(CodeInfo::parse("go {colour=red}").is_err());
        assert!(CodeInfo::parse("go {hl_lines=[a]}").is_err());
        assert!(CodeInfo::parse("go {5-2}").is_err());
        assert!(CodeInfo::parse("go {0}").is_err());
        assert!(CodeInfo::parse("go {linenos=maybe}").is_err());
        assert!(CodeInfo::parse("go {1").is_err());
    }

    #[test]
    fn test_render_marks_highlighted_lines() {
        let highlighter = Highlighter::new(&HighlightConfig::default());
        let info = CodeInfo::parse("go {2}").unwrap();
        let html = highlighter
            .render("package main\nfunc main() {}\n", &info)
            .unwrap();

        assert!(html.contains(r#"<figure class="highlight go">"#));
        assert_eq!(html.matches(r#"class="line hl""#).count(), 1);
        assert!(html.contains(r#"<span class="line-number">2</span>"#));
    }

    #[test]
    fn test_render_without_line_numbers() {
        let highlighter = Highlighter::new(&HighlightConfig {
            enable: false,
            line_number: false,
            ..Default::default()
        });
        let html = highlighter
            .render("a < b\n", &CodeInfo::parse("text").unwrap())
            .unwrap();
        assert_eq!(
            html,
            r#"<figure class="highlight text"><pre><code class="language-text"><span class="line">a &lt; b</span></code></pre></figure>"#
        );
    }

    #[test]
    fn test_line_numbers_saturate() {
        let highlighter = Highlighter::new(&HighlightConfig::default());
        let info = CodeInfo::parse(&format!("text {{linenostart={}}}", usize::MAX)).unwrap();
        let html = highlighter.render("a\nb\nc\n", &info).unwrap();
        let last = format!(r#"<span class="line-number">{}</span>"#, usize::MAX);
        assert_eq!(html.matches(&last).count(), 3);
    }

    #[test]
    fn test_unknown_language_falls_back() {
        let highlighter = Highlighter::new(&HighlightConfig::default());
        let info = CodeInfo::parse("no-such-language").unwrap();
        let html = highlighter.render("upx --best app\n", &info).unwrap();
        assert!(html.contains("upx --best app"));
    }
}
