//! Markdown rendering
//!
//! pulldown-cmark for parsing, syntect for fenced code blocks. Post and
//! project bodies are rendered once on write and stored as HTML.
//!
//! ```
//! use folio::services::markdown::MarkdownRenderer;
//!
//! let renderer = MarkdownRenderer::new();
//! let html = renderer.render("# Hello\n\nSome **bold** text.");
//! assert!(html.contains("<h1>"));
//! ```

use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use std::sync::Arc;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

const DEFAULT_THEME: &str = "base16-ocean.dark";

/// Average adult reading speed used for reading-time estimates
pub const WORDS_PER_MINUTE: usize = 200;

/// Thread-safe Markdown renderer with syntax highlighting.
///
/// Enabled extensions: tables, footnotes, strikethrough, task lists and
/// smart punctuation.
#[derive(Clone)]
pub struct MarkdownRenderer {
    syntax_set: Arc<SyntaxSet>,
    theme_set: Arc<ThemeSet>,
    theme_name: String,
}

impl std::fmt::Debug for MarkdownRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkdownRenderer")
            .field("theme_name", &self.theme_name)
            .finish_non_exhaustive()
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self::with_theme(DEFAULT_THEME)
    }

    /// Use a specific syntect theme, falling back to the default if unknown
    pub fn with_theme(theme_name: &str) -> Self {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let theme_set = ThemeSet::load_defaults();

        let theme_name = if theme_set.themes.contains_key(theme_name) {
            theme_name.to_string()
        } else {
            tracing::warn!("Unknown highlight theme '{}', using {}", theme_name, DEFAULT_THEME);
            DEFAULT_THEME.to_string()
        };

        Self {
            syntax_set: Arc::new(syntax_set),
            theme_set: Arc::new(theme_set),
            theme_name,
        }
    }

    fn options() -> Options {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        options
    }

    /// Render Markdown to HTML
    pub fn render(&self, markdown: &str) -> String {
        let parser = Parser::new_ext(markdown, Self::options());
        let events = self.highlight_code_blocks(parser);

        let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut html_output, events.into_iter());
        html_output
    }

    /// Plain text of a Markdown document, used for excerpts and word counts
    pub fn plain_text(&self, markdown: &str) -> String {
        let mut text = String::new();
        for event in Parser::new_ext(markdown, Self::options()) {
            match event {
                Event::Text(t) | Event::Code(t) => text.push_str(&t),
                Event::SoftBreak | Event::HardBreak => text.push(' '),
                Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item) => {
                    text.push(' ')
                }
                _ => {}
            }
        }
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Estimated reading time in whole minutes, never less than one
    pub fn reading_time_minutes(&self, markdown: &str) -> usize {
        let words = self.plain_text(markdown).split_whitespace().count();
        words.div_ceil(WORDS_PER_MINUTE).max(1)
    }

    /// First `max_chars` characters of the plain text, cut at a word boundary
    pub fn excerpt(&self, markdown: &str, max_chars: usize) -> String {
        let text = self.plain_text(markdown);
        if text.chars().count() <= max_chars {
            return text;
        }
        let cut: String = text.chars().take(max_chars).collect();
        let trimmed = match cut.rfind(' ') {
            Some(idx) if idx > 0 => &cut[..idx],
            _ => cut.as_str(),
        };
        format!("{}…", trimmed.trim_end())
    }

    fn highlight_code_blocks<'a>(&self, parser: Parser<'a>) -> Vec<Event<'a>> {
        let mut events = Vec::new();
        let mut in_code_block = false;
        let mut code_lang: Option<String> = None;
        let mut code = String::new();

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    in_code_block = true;
                    code.clear();
                    code_lang = match kind {
                        CodeBlockKind::Fenced(lang) if !lang.is_empty() => {
                            // info strings may carry attributes after the language
                            lang.split(|c: char| c.is_whitespace() || c == ',')
                                .next()
                                .filter(|l| !l.is_empty())
                                .map(str::to_string)
                        }
                        _ => None,
                    };
                }
                Event::End(TagEnd::CodeBlock) => {
                    in_code_block = false;
                    let block = match code_lang.take() {
                        Some(lang) => self.highlight(&code, &lang),
                        None => format!("<pre><code>{}</code></pre>", html_escape(&code)),
                    };
                    events.push(Event::Html(block.into()));
                }
                Event::Text(text) if in_code_block => code.push_str(&text),
                other => events.push(other),
            }
        }

        events
    }

    fn highlight(&self, code: &str, lang: &str) -> String {
        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang));

        let plain = || {
            format!(
                "<pre><code class=\"language-{}\">{}</code></pre>",
                html_escape(lang),
                html_escape(code)
            )
        };

        let (Some(syntax), Some(theme)) = (syntax, self.theme_set.themes.get(&self.theme_name))
        else {
            return plain();
        };

        highlighted_html_for_string(code, &self.syntax_set, syntax, theme).unwrap_or_else(|e| {
            tracing::debug!("Highlighting failed for {}: {}", lang, e);
            plain()
        })
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_theme_falls_back() {
        let renderer = MarkdownRenderer::with_theme("nonexistent-theme");
        assert_eq!(renderer.theme_name, DEFAULT_THEME);
        let renderer = MarkdownRenderer::with_theme("InspiredGitHub");
        assert_eq!(renderer.theme_name, "InspiredGitHub");
    }

    #[test]
    fn test_render_basic_markup() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("# Title\n\nSome **bold** and *italic*, ~~gone~~.\n\n> quoted");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<em>italic</em>"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("<blockquote>"));
    }

    #[test]
    fn test_render_extensions() {
        let renderer = MarkdownRenderer::new();

        let table = renderer.render("| A | B |\n|---|---|\n| 1 | 2 |");
        assert!(table.contains("<table>"));
        assert!(table.contains("<td>"));

        let tasks = renderer.render("- [x] Done\n- [ ] Todo");
        assert!(tasks.contains("type=\"checkbox\""));
        assert!(tasks.contains("checked"));

        let footnote = renderer.render("A claim.[^1]\n\n[^1]: The source.");
        assert!(footnote.contains("footnote-reference"));
        assert!(footnote.contains("footnote-definition"));
    }

    #[test]
    fn test_code_blocks() {
        let renderer = MarkdownRenderer::new();

        let rust = renderer.render("```rust\nfn main() {}\n```");
        assert!(rust.contains("<pre"));
        assert!(rust.contains("style="));

        let with_attrs = renderer.render("```rust,ignore\nfn main() {}\n```");
        assert!(with_attrs.contains("style="));
        let no_run = renderer.render("```rust,no_run\nfn main() {}\n```");
        assert_eq!(no_run, rust);
        let spaced = renderer.render("```rust title=\"main.rs\"\nfn main() {}\n```");
        assert_eq!(spaced, rust);

        let unknown = renderer.render("```klingon\nqapla'\n```");
        assert!(unknown.contains("language-klingon"));

        let plain = renderer.render("```\n<script>alert(1)</script>\n```");
        assert!(plain.contains("<pre><code>"));
        assert!(!plain.contains("<script>"));
        assert!(plain.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_render_empty_input() {
        assert!(MarkdownRenderer::new().render("").is_empty());
    }

    #[test]
    fn test_plain_text_strips_markup() {
        let renderer = MarkdownRenderer::new();
        let text = renderer.plain_text("# Intro\n\nHello **world**, see `code`.\n\n- one\n- two");
        assert_eq!(text, "Intro Hello world, see code. one two");
    }

    #[test]
    fn test_reading_time() {
        let renderer = MarkdownRenderer::new();
        assert_eq!(renderer.reading_time_minutes(""), 1);
        assert_eq!(renderer.reading_time_minutes(&"word ".repeat(200)), 1);
        assert_eq!(renderer.reading_time_minutes(&"word ".repeat(201)), 2);
        assert_eq!(renderer.reading_time_minutes(&"word ".repeat(1000)), 5);
    }

    #[test]
    fn test_excerpt_cuts_at_word_boundary() {
        let renderer = MarkdownRenderer::new();
        assert_eq!(renderer.excerpt("Short text", 50), "Short text");
        assert_eq!(renderer.excerpt("The quick brown fox jumps", 12), "The quick…");
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<>&\"'"), "&lt;&gt;&amp;&quot;&#x27;");
    }
}
